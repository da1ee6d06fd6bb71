use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    download::DEFAULT_CHUNK_SIZE, selector::StreamSelector, stream::DEFAULT_MAX_BUFFER_TIME,
};

/// Player wide knobs.
///
/// Durations are (de)serialized as fractional seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Download ahead of playback up to this much media.
    #[serde(with = "seconds")]
    pub max_buffer_time: Duration,
    /// Throughput selection only picks bitrates below `average * factor`.
    pub throughput_safety_factor: f64,
    /// Whether the renderer can switch audio representations without a gap.
    pub supports_seamless_audio_change: bool,
    pub download_chunk_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_buffer_time: DEFAULT_MAX_BUFFER_TIME,
            throughput_safety_factor: StreamSelector::DEFAULT_SAFETY_FACTOR,
            supports_seamless_audio_change: false,
            download_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
