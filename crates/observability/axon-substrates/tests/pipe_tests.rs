//! Pipes and in-line flows exercised through circuits and channels.

use axon_substrates::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn name(path: &str) -> Name {
    Name::from_path(path).unwrap()
}

/// Conduit handing out channels, so tests can build flow pipes directly
fn channel_conduit(circuit: &Circuit) -> Conduit<Channel<i64>, i64> {
    circuit.conduit(ChannelComposer).unwrap()
}

fn recording_subscriber(circuit: &Circuit, seen: Arc<Mutex<Vec<i64>>>) -> Arc<Subscriber<i64>> {
    circuit.subscriber(name("recorder"), move |_subject, registrar| {
        let seen = seen.clone();
        registrar.register(Arc::new(FunctionPipe::new(move |v: i64| {
            seen.lock().push(v);
        })));
    })
}

#[test]
fn test_channel_flow_pipe_applies_operators() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = channel_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let channel = conduit.percept(&name("metrics")).unwrap();
    let pipe = channel.pipe_with_flow(|flow| flow.skip(2).limit(3));
    for v in 0..10 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![2, 3, 4]);
    circuit.close();
}

#[test]
fn test_plain_root_pipe_bypasses_flows_of_other_pipes() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = channel_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let channel = conduit.percept(&name("metrics")).unwrap();
    let limited = channel.pipe_with_flow(|flow| flow.limit(1));
    let plain = channel.pipe();

    limited.emit(1);
    limited.emit(2);
    plain.emit(3);
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![1, 3]);
    circuit.close();
}

#[test]
fn test_conduit_configurer_shapes_every_channel() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit: Conduit<Arc<dyn Pipe<i64>>, i64> = circuit
        .conduit_configured(name("deduped"), PipeComposer, |flow: Flow<i64>| flow.diff())
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let pipe = conduit.percept(&name("left")).unwrap();
    for v in [1, 1, 2, 2, 3, 3, 3, 1] {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![1, 2, 3, 1]);
    circuit.close();
}

#[test]
fn test_circuit_pipe_with_flow_guard() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipe = {
        let seen = seen.clone();
        circuit.pipe_configured(
            move |v: i64| {
                seen.lock().push(v);
            },
            |flow| flow.guard(|v| v % 2 == 0),
        )
    };
    for v in 0..6 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![0, 2, 4]);
    circuit.close();
}

#[test]
fn test_reduce_over_channel_emissions() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = channel_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let channel = conduit.percept(&name("totals")).unwrap();
    let pipe = channel.pipe_with_flow(|flow| flow.reduce(0, |acc, v| acc + v));
    for v in [1, 2, 3, 4] {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![1, 3, 6, 10]);
    circuit.close();
}

#[test]
fn test_forward_taps_into_second_pipe() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = channel_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let tapped = Arc::new(AtomicUsize::new(0));
    let side = {
        let tapped = tapped.clone();
        circuit.pipe(move |_: i64| {
            tapped.fetch_add(1, Ordering::SeqCst);
        })
    };

    let channel = conduit.percept(&name("tapped")).unwrap();
    let pipe = channel.pipe_with_flow(move |flow| flow.forward(side));
    for v in 0..5 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(seen.lock().len(), 5);
    assert_eq!(tapped.load(Ordering::SeqCst), 5);
    circuit.close();
}

#[test]
fn test_sift_high_through_channel() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = channel_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let channel = conduit.percept(&name("records")).unwrap();
    let pipe = channel.pipe_with_flow(|flow| flow.sift(Sift::high));
    for v in [5, 3, 7, 7, 9, 1] {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![5, 7, 9]);
    circuit.close();
}

#[test]
fn test_deep_pipe_chain_is_stack_safe() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let mut head: Arc<dyn Pipe<i64>> = {
        let count = count.clone();
        circuit.pipe(move |_: i64| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    for _ in 0..1000 {
        let next = head.clone();
        head = circuit.pipe(move |v: i64| next.emit(v));
    }

    head.emit(7);
    circuit.await_empty().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    circuit.close();
}

#[test]
fn test_emission_with_no_subscribers_is_a_noop() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit: Conduit<Arc<dyn Pipe<i64>>, i64> = circuit.conduit(PipeComposer).unwrap();

    let pipe = conduit.percept(&name("silent")).unwrap();
    for v in 0..1000 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();
    circuit.close();
}

#[test]
fn test_empty_pipe_can_be_registered() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit: Conduit<Arc<dyn Pipe<i64>>, i64> = circuit.conduit(PipeComposer).unwrap();

    let observer = circuit.subscriber(name("null"), |_subject, registrar| {
        registrar.register(EmptyPipe::shared());
    });
    conduit.subscribe(observer).unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    pipe.emit(1);
    circuit.await_empty().unwrap();
    circuit.close();
}
