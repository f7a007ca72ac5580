//! Engine behavior: ordering, cascades, fan-out, confinement, shutdown.

use axon_substrates::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn name(path: &str) -> Name {
    Name::from_path(path).unwrap()
}

fn pipe_conduit(circuit: &Circuit) -> Conduit<Arc<dyn Pipe<i64>>, i64> {
    circuit.conduit(PipeComposer).unwrap()
}

/// Subscriber that appends every emission to a shared list
fn recording_subscriber(circuit: &Circuit, seen: Arc<Mutex<Vec<i64>>>) -> Arc<Subscriber<i64>> {
    circuit.subscriber(name("recorder"), move |_subject, registrar| {
        let seen = seen.clone();
        registrar.register(Arc::new(FunctionPipe::new(move |v: i64| {
            seen.lock().push(v);
        })));
    })
}

#[test]
fn test_single_emitter_ordering() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    for v in 1..=5 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    circuit.close();
}

#[test]
fn test_cascade_runs_to_completion() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);
    let pipe = conduit.percept(&name("loopback")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = seen.clone();
        let pipe = pipe.clone();
        circuit.subscriber(name("cascader"), move |_subject, registrar| {
            let seen = seen.clone();
            let pipe = pipe.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |v: i64| {
                seen.lock().push(v);
                if v < 10 {
                    pipe.emit(v + 1);
                }
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    pipe.emit(1);
    circuit.await_empty().unwrap();

    assert_eq!(*seen.lock(), (1..=10).collect::<Vec<_>>());
    circuit.close();
}

#[test]
fn test_cascade_precedes_next_ingress() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);
    let pipe = conduit.percept(&name("priority")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = seen.clone();
        let pipe = pipe.clone();
        circuit.subscriber(name("cascader"), move |_subject, registrar| {
            let seen = seen.clone();
            let pipe = pipe.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |v: i64| {
                seen.lock().push(v);
                if v < 3 {
                    pipe.emit(v + 1);
                }
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    // both land on ingress before the worker begins the first cascade
    pipe.emit(1);
    pipe.emit(100);
    circuit.await_empty().unwrap();

    // the whole cascade of 1 must finish before 100 is processed
    assert_eq!(*seen.lock(), vec![1, 2, 3, 100]);
    circuit.close();
}

#[test]
fn test_fanout_reaches_every_subscriber() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let counters: Vec<Arc<AtomicUsize>> = (0..2).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for counter in &counters {
        let counter = counter.clone();
        let observer = circuit.subscriber(name("counting"), move |_subject, registrar| {
            let counter = counter.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
            })));
        });
        conduit.subscribe(observer).unwrap();
    }

    let pipe = conduit.percept(&name("events")).unwrap();
    for v in 0..100 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
    circuit.close();
}

#[test]
fn test_dynamic_subscribe_is_not_retroactive() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);
    let pipe = conduit.percept(&name("events")).unwrap();

    for v in 0..50 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let observer = {
        let count = count.clone();
        circuit.subscriber(name("late"), move |_subject, registrar| {
            let count = count.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                count.fetch_add(1, Ordering::SeqCst);
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    for v in 0..50 {
        pipe.emit(v);
    }
    circuit.await_empty().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 50);
    circuit.close();
}

#[test]
fn test_no_loss_under_concurrent_ingress() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let count = Arc::new(AtomicUsize::new(0));
    let observer = {
        let count = count.clone();
        circuit.subscriber(name("counter"), move |_subject, registrar| {
            let count = count.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                count.fetch_add(1, Ordering::SeqCst);
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    let emitters = 8usize;
    let per_emitter = 500usize;
    let handles: Vec<_> = (0..emitters)
        .map(|_| {
            let pipe = pipe.clone();
            thread::spawn(move || {
                for v in 0..per_emitter {
                    pipe.emit(v as i64);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    circuit.await_empty().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), emitters * per_emitter);
    circuit.close();
}

#[test]
fn test_fifo_per_emitter_across_threads() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let seen = Arc::new(Mutex::new(Vec::new()));
    conduit
        .subscribe(recording_subscriber(&circuit, seen.clone()))
        .unwrap();

    // two emitters, values tagged by parity
    let pipe = conduit.percept(&name("events")).unwrap();
    let handles: Vec<_> = (0..2i64)
        .map(|tag| {
            let pipe = pipe.clone();
            thread::spawn(move || {
                for i in 0..200i64 {
                    pipe.emit(i * 2 + tag);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    circuit.await_empty().unwrap();

    let seen = seen.lock();
    for tag in 0..2i64 {
        let lane: Vec<i64> = seen.iter().copied().filter(|v| v % 2 == tag).collect();
        let expected: Vec<i64> = (0..200).map(|i| i * 2 + tag).collect();
        assert_eq!(lane, expected);
    }
    circuit.close();
}

#[test]
fn test_receptors_never_overlap() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let observer = {
        let busy = busy.clone();
        let overlapped = overlapped.clone();
        circuit.subscriber(name("exclusive"), move |_subject, registrar| {
            let busy = busy.clone();
            let overlapped = overlapped.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                if busy.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::hint::spin_loop();
                busy.store(false, Ordering::SeqCst);
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipe = pipe.clone();
            thread::spawn(move || {
                for v in 0..250 {
                    pipe.emit(v);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    circuit.await_empty().unwrap();

    assert!(!overlapped.load(Ordering::SeqCst));
    circuit.close();
}

#[test]
fn test_receptors_run_confined_to_one_thread() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let threads = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let observer = {
        let threads = threads.clone();
        circuit.subscriber(name("confined"), move |_subject, registrar| {
            let threads = threads.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                threads.lock().insert(thread::current().id());
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipe = pipe.clone();
            thread::spawn(move || {
                for v in 0..100 {
                    pipe.emit(v);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    circuit.await_empty().unwrap();

    let threads = threads.lock();
    assert_eq!(threads.len(), 1);
    assert!(!threads.contains(&thread::current().id()));
    circuit.close();
}

#[test]
fn test_await_inside_receptor_is_illegal_and_survivable() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();

    let outcome = Arc::new(Mutex::new(None));
    let finished = Arc::new(AtomicBool::new(false));
    let pipe = {
        let circuit = circuit.clone();
        let outcome = outcome.clone();
        let finished = finished.clone();
        circuit.clone().pipe(move |_: i64| {
            *outcome.lock() = Some(circuit.await_empty());
            finished.store(true, Ordering::SeqCst);
        })
    };
    pipe.emit(1);
    circuit.await_empty().unwrap();

    let outcome = outcome.lock().take().unwrap();
    assert!(matches!(outcome, Err(SubstratesError::IllegalState(_))));
    let message = outcome.unwrap_err().to_string();
    assert!(message.contains("Cannot await from circuit's own thread"));
    assert!(finished.load(Ordering::SeqCst));
    circuit.close();
}

#[test]
fn test_emission_after_close_is_dropped() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);

    let count = Arc::new(AtomicUsize::new(0));
    let observer = {
        let count = count.clone();
        circuit.subscriber(name("counter"), move |_subject, registrar| {
            let count = count.clone();
            registrar.register(Arc::new(FunctionPipe::new(move |_: i64| {
                count.fetch_add(1, Ordering::SeqCst);
            })));
        })
    };
    conduit.subscribe(observer).unwrap();

    let pipe = conduit.percept(&name("events")).unwrap();
    pipe.emit(1);
    circuit.await_empty().unwrap();
    circuit.close();
    circuit.await_empty().unwrap();

    pipe.emit(2);
    pipe.emit(3);
    circuit.await_empty().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_await_after_close_returns_quickly() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let conduit = pipe_conduit(&circuit);
    let pipe = conduit.percept(&name("events")).unwrap();

    for v in 0..10_000 {
        pipe.emit(v);
    }
    circuit.close();
    circuit.await_empty().unwrap();

    let start = Instant::now();
    circuit.await_empty().unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_close_is_idempotent_across_threads() {
    let cortex = create_cortex();
    let circuit = cortex.circuit().unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let circuit = circuit.clone();
            thread::spawn(move || circuit.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    circuit.await_empty().unwrap();
}
