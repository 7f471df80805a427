//! The process-wide host binding.
//!
//! Entity objects take an explicit [`HostApi`]; this binding is only a
//! convenience for plugins that want one shared instance.

use std::sync::{Mutex, PoisonError};

use mixbridge_channel::ChannelTasks;
use mixbridge_host::{HostApi, HostConfig, Result};
use tracing::{error, info};

static BINDING: Mutex<Option<HostApi>> = Mutex::new(None);

/// Install the binding with the default configuration.
///
/// See [`install_with`].
pub fn install() -> Result<Option<HostApi>> {
    install_with(HostConfig::default())
}

/// Attach to the host channel and install the process-wide binding.
///
/// The first call in a plugin worker process opens the inherited channel and
/// starts the stats heartbeat; later calls return the same binding and ignore
/// `config`. In a process that was not launched as a worker this returns
/// `Ok(None)` and installs nothing. Must be called from within a Tokio
/// runtime.
pub fn install_with(config: HostConfig) -> Result<Option<HostApi>> {
    let mut binding = BINDING.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(api) = binding.as_ref() {
        return Ok(Some(api.clone()));
    }

    let Some((api, tasks)) = HostApi::from_worker(config)? else {
        return Ok(None);
    };
    tokio::spawn(watch_channel(tasks));
    *binding = Some(api.clone());
    info!("host binding installed");
    Ok(Some(api))
}

/// The installed binding, if any.
pub fn installed() -> Option<HostApi> {
    BINDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

async fn watch_channel(tasks: ChannelTasks) {
    match tasks.closed().await {
        Ok(()) => info!("host closed the channel"),
        Err(err) => error!(error = %err, "host channel failed"),
    }
}
