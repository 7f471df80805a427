#![allow(dead_code)]

use mixbridge::channel::ChannelTasks;
use mixbridge::frame::OutboundFrame;
use mixbridge::{HostApi, HostConfig};
pub use mixbridge_channel::testing::FakeHost;
use serde_json::Value;

/// Wait until every frame written so far has been dispatched, returning the
/// frames the plugin sent meanwhile.
pub async fn sync(host: &mut FakeHost, api: &HostApi) -> Vec<OutboundFrame> {
    let call = tokio::spawn({
        let api = api.clone();
        async move { api.get_settings().await }
    });
    let before = host.answer("plugin-getSettings", Value::Null).await;
    call.await.unwrap().unwrap();
    before
}

pub fn connect() -> (HostApi, ChannelTasks, FakeHost) {
    let config = HostConfig {
        stats_enabled: false,
        ..HostConfig::default()
    };
    let (plugin, host) = FakeHost::pair();
    let (api, tasks) = HostApi::connect(plugin, config).unwrap();
    (api, tasks, host)
}
