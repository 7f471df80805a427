//! Channel and topic names used on the plugin channel.
//!
//! Every name on the wire lives under the `plugin-` namespace. Outbound
//! channels are named by [`Channel`]; broadcast events the host sends back
//! are named by [`Topic`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace prefix shared by all channel and topic names.
pub const CHANNEL_PREFIX: &str = "plugin-";

/// A discrete control on an entity with an on/off indicator and a press signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Mute,
    Assign,
    Run,
    Generic,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Mute, Button::Assign, Button::Run, Button::Generic];

    pub fn as_str(self) -> &'static str {
        match self {
            Button::Mute => "mute",
            Button::Assign => "assign",
            Button::Run => "run",
            Button::Generic => "generic",
        }
    }

    /// Look up a button kind by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.as_str() == name)
    }
}

impl AsRef<str> for Button {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A continuous-valued display in the range `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Volume,
    Meter,
}

impl Indicator {
    pub const ALL: [Indicator; 2] = [Indicator::Volume, Indicator::Meter];

    pub fn as_str(self) -> &'static str {
        match self {
            Indicator::Volume => "volume",
            Indicator::Meter => "meter",
        }
    }

    /// Look up an indicator kind by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|indicator| indicator.as_str() == name)
    }
}

impl AsRef<str> for Indicator {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin → host channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    GetManifest,
    GetSettings,
    Ready,
    /// Close acknowledgement.
    Close,
    UpdateAssignment,
    RemoveAssignment,
    SetButtonIndicator(Button),
    SetIndicator(Indicator),
    SetThrottle,
    UpdateButtonType,
    SetSettingsStatus,
    Stats,
}

impl Channel {
    /// The full wire name, including the namespace prefix.
    pub fn wire_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CHANNEL_PREFIX)?;
        match self {
            Channel::GetManifest => f.write_str("getManifest"),
            Channel::GetSettings => f.write_str("getSettings"),
            Channel::Ready => f.write_str("ready"),
            Channel::Close => f.write_str("close"),
            Channel::UpdateAssignment => f.write_str("updateAssignment"),
            Channel::RemoveAssignment => f.write_str("removeAssignment"),
            Channel::SetButtonIndicator(button) => write!(f, "setButtonIndicator-{button}"),
            Channel::SetIndicator(indicator) => write!(f, "setIndicator-{indicator}"),
            Channel::SetThrottle => f.write_str("setThrottle"),
            Channel::UpdateButtonType => f.write_str("updateButtonType"),
            Channel::SetSettingsStatus => f.write_str("setSettingsStatus"),
            Channel::Stats => f.write_str("stats"),
        }
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

/// Host → plugin broadcast events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The host asks the plugin process to shut down.
    Close,
    /// A hardware button bound to an entity was pressed.
    Press { button: Button, id: String },
    /// A fader bound to an entity moved.
    Volume { id: String },
    /// The settings button of an entity was pressed.
    SettingsButtonPress { id: String },
}

impl Topic {
    pub fn press(id: impl Into<String>, button: Button) -> Self {
        Topic::Press {
            button,
            id: id.into(),
        }
    }

    pub fn volume(id: impl Into<String>) -> Self {
        Topic::Volume { id: id.into() }
    }

    pub fn settings_button_press(id: impl Into<String>) -> Self {
        Topic::SettingsButtonPress { id: id.into() }
    }

    /// The full wire name, including the namespace prefix.
    pub fn wire_name(&self) -> String {
        self.to_string()
    }

    /// Parse a wire topic. Returns `None` for anything outside the known set.
    pub fn parse(wire: &str) -> Option<Self> {
        let name = wire.strip_prefix(CHANNEL_PREFIX)?;

        if name == "close" {
            return Some(Topic::Close);
        }
        if let Some(rest) = name.strip_prefix("onPress-") {
            let (button, id) = rest.split_once('-')?;
            let button = Button::parse(button)?;
            return (!id.is_empty()).then(|| Topic::press(id, button));
        }
        if let Some(id) = name.strip_prefix("onVolume-") {
            return (!id.is_empty()).then(|| Topic::volume(id));
        }
        if let Some(id) = name.strip_prefix("onSettingsButtonPress-") {
            return (!id.is_empty()).then(|| Topic::settings_button_press(id));
        }
        None
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CHANNEL_PREFIX)?;
        match self {
            Topic::Close => f.write_str("close"),
            Topic::Press { button, id } => write!(f, "onPress-{button}-{id}"),
            Topic::Volume { id } => write!(f, "onVolume-{id}"),
            Topic::SettingsButtonPress { id } => write!(f, "onSettingsButtonPress-{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_wire_names() {
        assert_eq!(Channel::GetManifest.wire_name(), "plugin-getManifest");
        assert_eq!(Channel::Close.wire_name(), "plugin-close");
        assert_eq!(
            Channel::SetIndicator(Indicator::Volume).wire_name(),
            "plugin-setIndicator-volume"
        );
        assert_eq!(
            Channel::SetButtonIndicator(Button::Generic).wire_name(),
            "plugin-setButtonIndicator-generic"
        );
        assert_eq!(Channel::Stats.wire_name(), "plugin-stats");
    }

    #[test]
    fn parses_press_topic_with_dashed_id() {
        let topic = Topic::parse("plugin-onPress-mute-output-device-2").unwrap();
        assert_eq!(topic, Topic::press("output-device-2", Button::Mute));
        assert_eq!(topic.wire_name(), "plugin-onPress-mute-output-device-2");
    }

    #[test]
    fn parses_every_topic_kind() {
        assert_eq!(Topic::parse("plugin-close"), Some(Topic::Close));
        assert_eq!(
            Topic::parse("plugin-onVolume-ch1"),
            Some(Topic::volume("ch1"))
        );
        assert_eq!(
            Topic::parse("plugin-onSettingsButtonPress-login"),
            Some(Topic::settings_button_press("login"))
        );
    }

    #[test]
    fn rejects_unknown_topics() {
        for wire in [
            "close",
            "plugin-onPress-solo-ch1",
            "plugin-onPress-mute-",
            "plugin-onVolume-",
            "plugin-somethingElse",
            "0190b5a2c3d47e8f9a0b1c2d3e4f5a6b",
        ] {
            assert_eq!(Topic::parse(wire), None, "parsed {wire}");
        }
    }

    #[test]
    fn kinds_parse_from_wire_names() {
        assert_eq!(Button::parse("assign"), Some(Button::Assign));
        assert_eq!(Button::parse("solo"), None);
        assert_eq!(Indicator::parse("meter"), Some(Indicator::Meter));
        assert_eq!(Indicator::parse("pan"), None);
    }
}
