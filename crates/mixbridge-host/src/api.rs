use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mixbridge_channel::{ChannelTasks, IpcChannel, WeakChannel};
use mixbridge_frame::{Button, Channel, Indicator, Topic};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::data::{AssignmentData, ButtonTypeData, Manifest};
use crate::error::{HostError, Result};
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::stats;
use crate::throttle::IndicatorThrottle;

/// Lowest accepted host-side volume throttle, in milliseconds.
pub const MIN_THROTTLE_MS: u32 = 50;
/// Highest accepted host-side volume throttle, in milliseconds.
pub const MAX_THROTTLE_MS: u32 = 1000;

/// The host capability surface, backed by a plugin channel.
///
/// Cheap to clone. Structural updates go straight to the channel; volume and
/// meter indicators go through an [`IndicatorThrottle`].
#[derive(Clone)]
pub struct HostApi {
    inner: Arc<Inner>,
}

struct Inner {
    channel: IpcChannel,
    throttle: IndicatorThrottle<IpcChannel>,
    config: HostConfig,
    manifest: Mutex<Option<Manifest>>,
    notifier: Mutex<Arc<dyn Notifier>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl HostApi {
    /// Wrap a channel.
    ///
    /// Installs the default close handler and, if enabled, starts the stats
    /// heartbeat. Must be called from within a Tokio runtime.
    pub fn new(channel: IpcChannel, config: HostConfig) -> Result<Self> {
        require_runtime()?;
        stats::mark_process_start();

        let heartbeat = config
            .stats_enabled
            .then(|| stats::spawn_heartbeat(channel.clone(), config.stats_interval));
        let throttle = IndicatorThrottle::new(channel.clone(), config.indicator_window);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let api = Self {
            inner: Arc::new(Inner {
                channel,
                throttle,
                config,
                manifest: Mutex::new(None),
                notifier: Mutex::new(notifier),
                heartbeat: Mutex::new(heartbeat),
            }),
        };
        api.install_default_close_handler();
        Ok(api)
    }

    /// Open a channel over `stream` and wrap it.
    ///
    /// The close handler is in place before the first inbound frame is read.
    pub fn connect<S>(stream: S, config: HostConfig) -> Result<(Self, ChannelTasks)>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        require_runtime()?;
        let (channel, starter) = IpcChannel::unstarted(config.channel.clone());
        let api = Self::new(channel, config)?;
        Ok((api, starter.start(stream)))
    }

    /// Attach to the channel inherited from the host, if this process is a
    /// plugin worker.
    pub fn from_worker(config: HostConfig) -> Result<Option<(Self, ChannelTasks)>> {
        require_runtime()?;
        match mixbridge_channel::worker_stream()? {
            Some(stream) => {
                info!("attached to host channel");
                Self::connect(stream, config).map(Some)
            }
            None => {
                debug!("not running as a plugin worker");
                Ok(None)
            }
        }
    }

    /// Fetch the plugin manifest and cache it for notifications.
    pub async fn get_manifest(&self) -> Result<Manifest> {
        let value = self
            .inner
            .channel
            .invoke(Channel::GetManifest, vec![])
            .await?;
        let manifest: Manifest = serde_json::from_value(value)?;
        *lock(&self.inner.manifest) = Some(manifest.clone());
        Ok(manifest)
    }

    /// The manifest from the last successful [`HostApi::get_manifest`].
    pub fn cached_manifest(&self) -> Option<Manifest> {
        lock(&self.inner.manifest).clone()
    }

    /// Fetch the plugin's settings as the host stores them.
    pub async fn get_settings(&self) -> Result<Value> {
        let value = self
            .inner
            .channel
            .invoke(Channel::GetSettings, vec![])
            .await?;
        Ok(value)
    }

    /// Fetch the plugin's settings into a typed structure.
    pub async fn get_settings_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.get_settings().await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Tell the host the plugin has finished starting.
    pub fn ready(&self) -> Result<()> {
        self.send(Channel::Ready, vec![])
    }

    /// Replace the close handler.
    ///
    /// When the host asks the plugin to close, `teardown` runs in its own
    /// task. Whether it succeeds, fails or panics, the close acknowledgement
    /// is sent exactly once afterwards.
    pub fn on_close<F, Fut, E>(&self, teardown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let channel = self.inner.channel.downgrade();
        let teardown = Mutex::new(Some(teardown));

        self.inner.channel.remove_all_listeners(&Topic::Close);
        self.inner.channel.once(Topic::Close, move |_args| {
            let Some(teardown) = lock(&teardown).take() else {
                return;
            };
            let channel = channel.clone();
            info!("host requested close, running teardown");
            tokio::spawn(async move {
                match tokio::spawn(async move { teardown().await }).await {
                    Ok(Ok(())) => debug!("teardown complete"),
                    Ok(Err(err)) => error!(error = %err, "teardown failed"),
                    Err(err) => error!(error = %err, "teardown panicked"),
                }
                acknowledge_close(&channel);
            });
        });
    }

    /// Register or update an assignment. Resets its indicator window.
    pub fn update_assignment(&self, id: &str, data: &AssignmentData) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.inner.throttle.register(id);
        self.send(Channel::UpdateAssignment, vec![json!(id), data])
    }

    /// Remove an assignment (or button type) from the host.
    pub fn remove_assignment(&self, id: &str) -> Result<()> {
        self.inner.throttle.remove(id);
        self.send(Channel::RemoveAssignment, vec![json!(id)])
    }

    /// Register or update a generic button type. Resets its indicator window.
    pub fn update_button_type(&self, id: &str, data: &ButtonTypeData) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.inner.throttle.register(id);
        self.send(Channel::UpdateButtonType, vec![json!(id), data])
    }

    /// Light or clear a button indicator. Unknown button kinds are ignored.
    pub fn set_button_indicator(&self, id: &str, button: impl AsRef<str>, on: bool) -> Result<()> {
        let Some(button) = known_button(button.as_ref()) else {
            return Ok(());
        };
        self.send(Channel::SetButtonIndicator(button), vec![json!(id), json!(on)])
    }

    /// Set a volume or meter level. Unknown indicator kinds are ignored.
    ///
    /// Fails with [`HostError::UnknownEntity`] if `id` has not been
    /// registered through [`HostApi::update_assignment`] or
    /// [`HostApi::update_button_type`].
    pub fn set_indicator(&self, id: &str, indicator: impl AsRef<str>, level: f64) -> Result<()> {
        let kind = indicator.as_ref();
        let Some(indicator) = Indicator::parse(kind) else {
            debug!(entity = id, indicator = kind, "ignoring unknown indicator kind");
            return Ok(());
        };
        self.inner.throttle.set(id, indicator, level)
    }

    /// Handle presses of one button on one entity. Replaces any previous
    /// handler for the pair. Unknown button kinds are ignored.
    pub fn on_press<F>(&self, id: &str, button: impl AsRef<str>, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let Some(button) = known_button(button.as_ref()) else {
            return;
        };
        self.subscribe(Topic::press(id, button), move |_args| handler());
    }

    /// Handle fader movements for one entity. Replaces any previous handler.
    pub fn on_volume<F>(&self, id: &str, handler: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let entity = id.to_string();
        self.subscribe(Topic::volume(id), move |args| {
            match args.first().and_then(Value::as_f64) {
                Some(volume) => handler(volume),
                None => warn!(entity = %entity, ?args, "ignoring volume event without a level"),
            }
        });
    }

    /// Handle the settings button of one entity. Replaces any previous
    /// handler.
    pub fn on_settings_button_press<F>(&self, id: &str, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(Topic::settings_button_press(id), move |_args| handler());
    }

    /// Ask the host to send volume updates for `id` at most every `ms`
    /// milliseconds, clamped to 50..=1000.
    pub fn set_throttle(&self, id: &str, ms: u32) -> Result<()> {
        let ms = clamp_throttle(ms);
        self.send(Channel::SetThrottle, vec![json!(id), json!(ms)])
    }

    /// Show a status line next to the entity's settings button.
    pub fn set_settings_status(&self, id: &str, text: &str) -> Result<()> {
        self.send(Channel::SetSettingsStatus, vec![json!(id), json!(text)])
    }

    /// Format a notification and hand it to the installed [`Notifier`].
    pub fn show_notification(&self, message: impl Into<String>) -> Notification {
        let manifest = self.cached_manifest();
        let notification = Notification::new(
            &self.inner.config.host_name,
            manifest.as_ref().and_then(Manifest::display_name),
            message,
        );
        let notifier = Arc::clone(&*lock(&self.inner.notifier));
        notifier.notify(&notification);
        notification
    }

    pub fn set_notifier(&self, notifier: impl Notifier) {
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);
        *lock(&self.inner.notifier) = notifier;
    }

    /// Stop the stats heartbeat and cancel open indicator windows.
    pub fn shutdown(&self) {
        if let Some(heartbeat) = lock(&self.inner.heartbeat).take() {
            heartbeat.abort();
        }
        self.inner.throttle.shutdown();
        debug!("host api shut down");
    }

    pub fn channel(&self) -> &IpcChannel {
        &self.inner.channel
    }

    pub fn throttle(&self) -> &IndicatorThrottle<IpcChannel> {
        &self.inner.throttle
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    fn send(&self, channel: Channel, args: Vec<Value>) -> Result<()> {
        self.inner.channel.send(channel, args)?;
        Ok(())
    }

    fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.channel.remove_all_listeners(&topic);
        self.inner.channel.on(topic, handler);
    }

    fn install_default_close_handler(&self) {
        let channel = self.inner.channel.downgrade();
        self.inner.channel.once(Topic::Close, move |_args| {
            info!("host requested close");
            acknowledge_close(&channel);
        });
    }
}

impl std::fmt::Debug for HostApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostApi")
            .field("channel", &self.inner.channel)
            .field("throttle", &self.inner.throttle)
            .finish()
    }
}

/// Clamp a host-side volume throttle to 50..=1000 ms.
pub fn clamp_throttle(ms: u32) -> u32 {
    ms.clamp(MIN_THROTTLE_MS, MAX_THROTTLE_MS)
}

fn require_runtime() -> Result<()> {
    tokio::runtime::Handle::try_current()
        .map(drop)
        .map_err(|_| HostError::NoRuntime)
}

fn known_button(kind: &str) -> Option<Button> {
    let button = Button::parse(kind);
    if button.is_none() {
        debug!(button = kind, "ignoring unknown button kind");
    }
    button
}

fn acknowledge_close(channel: &WeakChannel) {
    let Some(channel) = channel.upgrade() else {
        return;
    };
    if let Err(err) = channel.send(Channel::Close, vec![]) {
        warn!(error = %err, "failed to acknowledge close");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_is_clamped() {
        assert_eq!(clamp_throttle(0), 50);
        assert_eq!(clamp_throttle(200), 200);
        assert_eq!(clamp_throttle(5_000), 1000);
    }

    #[test]
    fn unknown_buttons_are_rejected() {
        assert_eq!(known_button("mute"), Some(Button::Mute));
        assert_eq!(known_button("solo"), None);
    }

    #[test]
    fn new_requires_runtime() {
        let (channel, _starter) = IpcChannel::unstarted(Default::default());
        let err = HostApi::new(channel, HostConfig::default()).unwrap_err();
        assert!(matches!(err, HostError::NoRuntime));

        let (plugin, _host) = tokio::io::duplex(1024);
        let err = HostApi::connect(plugin, HostConfig::default()).unwrap_err();
        assert!(matches!(err, HostError::NoRuntime));
    }
}
