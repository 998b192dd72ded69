//! Wall-clock timing of kernel calls.

use std::time::{Duration, Instant};

/// A result paired with the wall-clock time it took to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    /// Split into the `(result, elapsed)` pair.
    pub fn into_parts(self) -> (T, Duration) {
        (self.value, self.elapsed)
    }
}

impl<T, E> Timed<Result<T, E>> {
    /// Move a fallible result out so that `?` can be applied to the call.
    pub fn transpose(self) -> Result<Timed<T>, E> {
        let elapsed = self.elapsed;
        self.value.map(|value| Timed { value, elapsed })
    }
}

/// Run `f` and measure how long it takes.
pub fn timed<T>(f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}
