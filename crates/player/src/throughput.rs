use std::{collections::VecDeque, sync::Mutex, time::Duration};

/// Sliding window of recent download rates, shared by every stream of a provider.
///
/// Samples are kept most recent first. The estimate averages the latest few samples and
/// widens the window while consecutive samples differ a lot.
#[derive(Debug, Default)]
pub struct ThroughputHistory {
    samples: Mutex<VecDeque<f64>>,
}

impl ThroughputHistory {
    pub const MAX_SAMPLES: usize = 20;
    pub const AVERAGE_SAMPLES: usize = 4;
    pub const MIN_SAMPLES: usize = 2;
    pub const INCREASE_SCALE: f64 = 1.3;
    pub const DECREASE_SCALE: f64 = 1.3;

    pub fn new() -> Self {
        Self::default()
    }

    /// Records one download of `bytes` that took `elapsed`.
    pub fn push(&self, bytes: u64, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64().max(0.001);
        let bits_per_second = 8.0 * bytes as f64 / seconds;

        let mut samples = self.lock();
        samples.push_front(bits_per_second);
        samples.truncate(Self::MAX_SAMPLES);
    }

    /// Average throughput in bits per second, 0 while there are too few samples.
    pub fn average_throughput(&self) -> f64 {
        let samples = self.lock();
        let count = Self::sample_count(&samples);
        if count == 0 {
            return 0.0;
        }
        samples.iter().take(count).sum::<f64>() / count as f64
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<f64>> {
        // push and clear never leave the deque half-updated, poisoning is ignored
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sample_count(samples: &VecDeque<f64>) -> usize {
        if samples.len() < Self::MIN_SAMPLES {
            return 0;
        }

        let mut size = Self::AVERAGE_SAMPLES;
        if size >= samples.len() {
            return samples.len();
        }

        let mut i = 0;
        while i + 1 < size {
            let ratio = samples[i] / samples[i + 1];
            if ratio >= Self::INCREASE_SCALE || ratio <= 1.0 / Self::DECREASE_SCALE {
                size += 1;
                if size == samples.len() {
                    break;
                }
            }
            i += 1;
        }
        size
    }
}
