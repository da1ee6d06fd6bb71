use std::sync::Arc;

use crate::{period::StreamGroup, throughput::ThroughputHistory};

/// Picks one stream out of a [`StreamGroup`].
#[derive(Debug, Clone)]
pub enum StreamSelector {
    /// Highest bitrate sustainable at the measured throughput, scaled by a safety factor.
    Throughput {
        history: Arc<ThroughputHistory>,
        safety_factor: f64,
    },
    /// Always the same stream.
    Fixed(usize),
}

impl StreamSelector {
    pub const DEFAULT_SAFETY_FACTOR: f64 = 0.9;

    pub fn throughput(history: Arc<ThroughputHistory>) -> Self {
        Self::Throughput {
            history,
            safety_factor: Self::DEFAULT_SAFETY_FACTOR,
        }
    }

    pub fn fixed(index: usize) -> Self {
        Self::Fixed(index)
    }

    /// Index of the selected stream. Always valid for a non-empty group.
    pub fn select(&self, group: &StreamGroup) -> usize {
        match self {
            Self::Fixed(index) => (*index).min(group.streams.len().saturating_sub(1)),
            Self::Throughput {
                history,
                safety_factor,
            } => {
                let budget = history.average_throughput() * safety_factor;
                let bitrate = |i: &usize| group.streams[*i].format.bitrate.unwrap_or(0);

                let affordable = (0..group.streams.len())
                    .filter(|i| (bitrate(i) as f64) < budget)
                    .max_by_key(bitrate);
                affordable
                    .or_else(|| (0..group.streams.len()).min_by_key(bitrate))
                    .unwrap_or(0)
            }
        }
    }

    pub fn is_throughput(&self) -> bool {
        matches!(self, Self::Throughput { .. })
    }
}
