//! In-line flow operators.
//!
//! A flow is a linear chain of stateful operators applied to emissions
//! before they reach their downstream pipes. Operator state is owned by the
//! stage and only ever touched on the worker thread of the circuit the flow
//! belongs to. Composition is left-to-right: each value passes the stages in
//! the order they were added, and any stage may drop it.

use crate::pipe::Pipe;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// Fixed seed so rate sampling is reproducible across runs
const SAMPLE_SEED: u64 = 0x0051_7EED;

type Stage<E> = Box<dyn FnMut(E) -> Option<E> + Send>;

/// Builder for an operator chain.
///
/// Handed to flow configurers; every method appends one operator and
/// returns the builder for further chaining.
pub struct Flow<E> {
    stages: Vec<Stage<E>>,
}

impl<E: Send + 'static> Flow<E> {
    /// Create an empty flow that forwards everything
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Forward only values that differ from the previously forwarded value
    pub fn diff(self) -> Self
    where
        E: Clone + PartialEq,
    {
        self.diff_seeded(None)
    }

    /// Like [`diff`], with an initial comparison value
    ///
    /// [`diff`]: Flow::diff
    pub fn diff_from(self, initial: E) -> Self
    where
        E: Clone + PartialEq,
    {
        self.diff_seeded(Some(initial))
    }

    fn diff_seeded(mut self, mut prev: Option<E>) -> Self
    where
        E: Clone + PartialEq,
    {
        self.stages.push(Box::new(move |value| {
            if prev.as_ref() == Some(&value) {
                return None;
            }
            prev = Some(value.clone());
            Some(value)
        }));
        self
    }

    /// Forward only values for which the predicate holds
    pub fn guard<P>(mut self, mut predicate: P) -> Self
    where
        P: FnMut(&E) -> bool + Send + 'static,
    {
        self.stages.push(Box::new(move |value| {
            predicate(&value).then_some(value)
        }));
        self
    }

    /// Forward values accepted by a predicate over (previous, current);
    /// the previous value advances only when the predicate passes
    pub fn guard_from<P>(mut self, initial: E, mut predicate: P) -> Self
    where
        E: Clone,
        P: FnMut(&E, &E) -> bool + Send + 'static,
    {
        let mut prev = initial;
        self.stages.push(Box::new(move |value| {
            if predicate(&prev, &value) {
                prev = value.clone();
                Some(value)
            } else {
                None
            }
        }));
        self
    }

    /// Forward the first `limit` values, then drop the rest
    pub fn limit(mut self, limit: u64) -> Self {
        let mut remaining = limit;
        self.stages.push(Box::new(move |value| {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            Some(value)
        }));
        self
    }

    /// Drop the first `count` values, then forward the rest
    pub fn skip(mut self, count: u64) -> Self {
        let mut remaining = count;
        self.stages.push(Box::new(move |value| {
            if remaining > 0 {
                remaining -= 1;
                return None;
            }
            Some(value)
        }));
        self
    }

    /// Forward every `every`-th value, starting with the first
    ///
    /// # Panics
    ///
    /// Panics when `every` is zero.
    pub fn sample_every(mut self, every: u32) -> Self {
        assert!(every > 0, "sample interval must be positive");
        let every = u64::from(every);
        let mut index = 0u64;
        self.stages.push(Box::new(move |value| {
            let pass = index % every == 0;
            index += 1;
            pass.then_some(value)
        }));
        self
    }

    /// Forward each value with the given probability, using a
    /// deterministically seeded generator created on first use
    ///
    /// # Panics
    ///
    /// Panics when `rate` is outside `0.0..=1.0`.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&rate),
            "sample rate must be within 0.0..=1.0"
        );
        let mut rng: Option<StdRng> = None;
        self.stages.push(Box::new(move |value| {
            let rng = rng.get_or_insert_with(|| StdRng::seed_from_u64(SAMPLE_SEED));
            (rng.gen::<f64>() < rate).then_some(value)
        }));
        self
    }

    /// Fold values into an accumulator and forward the accumulator after
    /// each application
    pub fn reduce<O>(mut self, initial: E, mut op: O) -> Self
    where
        E: Clone,
        O: FnMut(&E, E) -> E + Send + 'static,
    {
        let mut accumulator = initial;
        self.stages.push(Box::new(move |value| {
            accumulator = op(&accumulator, value);
            Some(accumulator.clone())
        }));
        self
    }

    /// Map each value; a `None` result drops the emission
    pub fn replace<F>(mut self, mut map: F) -> Self
    where
        F: FnMut(E) -> Option<E> + Send + 'static,
    {
        self.stages.push(Box::new(move |value| map(value)));
        self
    }

    /// Observe each value without altering it
    pub fn peek<F>(mut self, observe: F) -> Self
    where
        F: Fn(&E) + Send + 'static,
    {
        self.stages.push(Box::new(move |value| {
            observe(&value);
            Some(value)
        }));
        self
    }

    /// Insert a fan-out tap: every passing value is also emitted on the pipe
    pub fn forward(mut self, pipe: Arc<dyn Pipe<E>>) -> Self
    where
        E: Clone,
    {
        self.stages.push(Box::new(move |value| {
            pipe.emit(value.clone());
            Some(value)
        }));
        self
    }

    /// Filter values by comparison criteria built from a [`Sift`]
    pub fn sift<C>(mut self, configure: C) -> Self
    where
        E: PartialOrd + Clone,
        C: FnOnce(Sift<E>) -> Sift<E>,
    {
        let sift = configure(Sift::new());
        let Sift {
            above,
            below,
            min,
            max,
            high,
            low,
        } = sift;
        let mut best_high: Option<E> = None;
        let mut best_low: Option<E> = None;
        self.stages.push(Box::new(move |value| {
            if let Some(bound) = &above {
                if value <= *bound {
                    return None;
                }
            }
            if let Some(bound) = &below {
                if value >= *bound {
                    return None;
                }
            }
            if let Some(bound) = &min {
                if value < *bound {
                    return None;
                }
            }
            if let Some(bound) = &max {
                if value > *bound {
                    return None;
                }
            }
            if high {
                match &best_high {
                    Some(best) if value <= *best => return None,
                    _ => best_high = Some(value.clone()),
                }
            }
            if low {
                match &best_low {
                    Some(best) if value >= *best => return None,
                    _ => best_low = Some(value.clone()),
                }
            }
            Some(value)
        }));
        self
    }

    /// True when no operators were added
    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn into_stages(self) -> FlowStages<E> {
        FlowStages {
            stages: Mutex::new(self.stages),
        }
    }
}

impl<E: Send + 'static> Default for Flow<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Flow<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Comparison criteria for [`Flow::sift`].
///
/// `above`/`below` are strict bounds, `min`/`max` inclusive, `range` is
/// shorthand for both, and `high`/`low` pass only values that set a new
/// running extreme.
pub struct Sift<E> {
    above: Option<E>,
    below: Option<E>,
    min: Option<E>,
    max: Option<E>,
    high: bool,
    low: bool,
}

impl<E: PartialOrd> Sift<E> {
    fn new() -> Self {
        Self {
            above: None,
            below: None,
            min: None,
            max: None,
            high: false,
            low: false,
        }
    }

    /// Pass only values strictly above the bound
    pub fn above(mut self, lower: E) -> Self {
        self.above = Some(lower);
        self
    }

    /// Pass only values strictly below the bound
    pub fn below(mut self, upper: E) -> Self {
        self.below = Some(upper);
        self
    }

    /// Pass only values at or above the bound
    pub fn min(mut self, min: E) -> Self {
        self.min = Some(min);
        self
    }

    /// Pass only values at or below the bound
    pub fn max(mut self, max: E) -> Self {
        self.max = Some(max);
        self
    }

    /// Pass only values within the inclusive range
    pub fn range(self, lower: E, upper: E) -> Self {
        self.min(lower).max(upper)
    }

    /// Pass only values that set a new running high
    pub fn high(mut self) -> Self {
        self.high = true;
        self
    }

    /// Pass only values that set a new running low
    pub fn low(mut self) -> Self {
        self.low = true;
        self
    }
}

/// A built operator chain, shared by the pipe that executes it.
///
/// Operator state lives behind a mutex that is only ever taken on the
/// owning circuit's worker thread, so it is never contended.
pub struct FlowStages<E> {
    stages: Mutex<Vec<Stage<E>>>,
}

impl<E> FlowStages<E> {
    /// Run a value through the chain; `None` means some stage dropped it
    pub(crate) fn process(&self, emission: E) -> Option<E> {
        let mut stages = self.stages.lock();
        let mut value = emission;
        for stage in stages.iter_mut() {
            value = stage(value)?;
        }
        Some(value)
    }
}

impl<E> fmt::Debug for FlowStages<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStages")
            .field("stages", &self.stages.lock().len())
            .finish()
    }
}
