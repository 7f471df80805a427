//! User-facing notifications.
//!
//! The SDK only formats notifications; displaying them is up to the
//! installed [`Notifier`].

use tracing::info;

/// A formatted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    /// Build a notification titled `"<host> - <plugin>"`, or just the host
    /// name when the plugin name is unknown.
    pub fn new(host_name: &str, plugin_name: Option<&str>, body: impl Into<String>) -> Self {
        let title = match plugin_name {
            Some(plugin) => format!("{host_name} - {plugin}"),
            None => host_name.to_string(),
        };
        Self {
            title,
            body: body.into(),
        }
    }
}

/// Displays notifications.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: &Notification);
}

impl<F> Notifier for F
where
    F: Fn(&Notification) + Send + Sync + 'static,
{
    fn notify(&self, notification: &Notification) {
        self(notification)
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        info!(title = %notification.title, body = %notification.body, "notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_names_host_and_plugin() {
        let n = Notification::new("MIDI Mixer", Some("Spotify"), "Connected");
        assert_eq!(n.title, "MIDI Mixer - Spotify");
        assert_eq!(n.body, "Connected");
    }

    #[test]
    fn title_without_manifest() {
        let n = Notification::new("MIDI Mixer", None, "hello");
        assert_eq!(n.title, "MIDI Mixer");
    }
}
