//! Progress sinks for validation passes (values in `0..=100`).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

type Sink = dyn Fn(f64) + Send + Sync;

/// Cloneable progress sink.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<Sink>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::silent()
    }
}

impl Progress {
    pub fn from_fn(sink: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn silent() -> Self {
        Self::from_fn(|_| {})
    }

    /// Sink paired with a stream of the latest reported value. Slow
    /// consumers observe coalesced updates, never out-of-order ones.
    pub fn channel() -> (Self, WatchStream<f64>) {
        let (tx, rx) = watch::channel(0.0);
        let progress = Self::from_fn(move |value| {
            tx.send_replace(value);
        });
        (progress, WatchStream::new(rx))
    }

    pub fn report(&self, value: f64) {
        (self.sink)(value)
    }

    /// Wrap this sink so reported values are clamped to `0..=100` and never
    /// decrease.
    pub fn monotonic(self) -> Self {
        let high_water = Mutex::new(0.0_f64);
        Self::from_fn(move |value| {
            let value = if value.is_nan() { 0.0 } else { value };
            // Held across the report so concurrent callers stay ordered.
            let mut high = high_water.lock();
            let next = value.clamp(0.0, 100.0).max(*high);
            *high = next;
            self.report(next);
        })
    }

    /// Map a nested `0..=100` range onto `start..=start + span` of this
    /// sink.
    pub fn scoped(&self, start: f64, span: f64) -> Self {
        let parent = self.clone();
        Self::from_fn(move |value| {
            parent.report(start + span * (value.clamp(0.0, 100.0) / 100.0));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Progress, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Progress::from_fn(move |v| sink.lock().push(v)), seen)
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let (progress, seen) = recorder();
        let progress = progress.monotonic();
        for value in [5.0, 3.0, 50.0, 120.0, 99.0] {
            progress.report(value);
        }
        assert_eq!(*seen.lock(), vec![5.0, 5.0, 50.0, 100.0, 100.0]);
    }

    #[test]
    fn monotonic_is_ordered_across_threads() {
        let (progress, seen) = recorder();
        let progress = progress.monotonic();
        std::thread::scope(|scope| {
            for offset in 0..4 {
                let progress = &progress;
                scope.spawn(move || {
                    for step in 0..250 {
                        progress.report(f64::from(step * 4 + offset) / 10.0);
                    }
                });
            }
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 1000);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(99.9));
    }

    #[test]
    fn scoped_maps_into_slice() {
        let (progress, seen) = recorder();
        let inner = progress.scoped(10.0, 90.0);
        inner.report(0.0);
        inner.report(50.0);
        inner.report(100.0);
        assert_eq!(*seen.lock(), vec![10.0, 55.0, 100.0]);
    }

    #[tokio::test]
    async fn channel_yields_latest_value() {
        use tokio_stream::StreamExt;

        let (progress, mut stream) = Progress::channel();
        progress.report(42.0);
        assert_eq!(stream.next().await, Some(42.0));
    }
}
