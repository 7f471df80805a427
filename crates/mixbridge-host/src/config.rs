use std::time::Duration;

use mixbridge_channel::ChannelConfig;

/// Display name of the host application, used in notification titles.
pub const DEFAULT_HOST_NAME: &str = "MIDI Mixer";

/// Configuration for [`crate::HostApi`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub channel: ChannelConfig,
    /// Coalescing window for volume and meter indicators. Default: 50 ms.
    pub indicator_window: Duration,
    /// Period of the stats heartbeat. Default: 5 s.
    pub stats_interval: Duration,
    /// Whether to run the stats heartbeat at all. Default: true.
    pub stats_enabled: bool,
    /// Default: [`DEFAULT_HOST_NAME`].
    pub host_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            indicator_window: Duration::from_millis(50),
            stats_interval: Duration::from_secs(5),
            stats_enabled: true,
            host_name: DEFAULT_HOST_NAME.to_string(),
        }
    }
}
