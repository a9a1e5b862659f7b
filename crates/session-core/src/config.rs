//! Configuration types
//!
//! Loading (files, flags, environment) is the embedding application's
//! concern; these are the typed destinations it deserializes into.

use serde::{Deserialize, Serialize};

/// Top-level node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_builder: SampleBuilderConfig,
    pub webrtc: WebRtcConfig,
    pub webm: WebmConfig,
}

/// Out-of-order tolerance windows for the per-track sample builders,
/// in packets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleBuilderConfig {
    pub audio_max_late: usize,
    pub video_max_late: usize,
}

impl Default for SampleBuilderConfig {
    fn default() -> Self {
        Self {
            audio_max_late: 100,
            video_max_late: 200,
        }
    }
}

/// Transport-facing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// Keyframe request cycle in milliseconds; zero disables the loop
    pub pli_cycle_ms: u64,

    /// Ephemeral UDP port range handed to the transport, `[start, end]`
    pub ice_port_range: Vec<u16>,

    /// STUN/TURN servers handed to the transport
    pub ice_servers: Vec<IceServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            pli_cycle_ms: 1000,
            ice_port_range: Vec::new(),
            ice_servers: Vec::new(),
        }
    }
}

/// One STUN/TURN server entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Settings for the stock WebM recording element
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebmConfig {
    pub enabled: bool,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"webrtc": {"pli_cycle_ms": 500}}"#).unwrap();
        assert_eq!(config.webrtc.pli_cycle_ms, 500);
        assert_eq!(config.sample_builder.audio_max_late, 100);
        assert_eq!(config.sample_builder.video_max_late, 200);
        assert!(!config.webm.enabled);
    }
}
