use mixbridge_frame::Button;
use mixbridge_host::{ButtonTypeData, HostApi};
use tokio::sync::broadcast;

use crate::error::{EntityError, Result};

const EVENT_CAPACITY: usize = 16;

/// Signals the host sends for a [`ButtonType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTypeEvent {
    Pressed,
}

/// One option in the host's list of generic buttons.
#[derive(Debug)]
pub struct ButtonType {
    host: HostApi,
    id: String,
    name: String,
    active: bool,
    events: broadcast::Sender<ButtonTypeEvent>,
}

impl ButtonType {
    /// Register a new button type with the host.
    pub fn new(host: &HostApi, id: impl Into<String>, data: ButtonTypeData) -> Result<Self> {
        let id = id.into();
        let name = data.name.trim();
        if id.is_empty() || name.is_empty() {
            return Err(EntityError::MissingIdOrName { kind: "button type" });
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut button = Self {
            host: host.clone(),
            id,
            name: String::new(),
            active: false,
            events,
        };
        button.set_name(name)?;
        button.set_active(data.active.unwrap_or(false))?;

        let events = button.events.clone();
        button.host.on_press(&button.id, Button::Generic, move || {
            let _ = events.send(ButtonTypeEvent::Pressed);
        });

        Ok(button)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the button type. Sends nothing if the name is unchanged.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EntityError::BlankName { kind: "button type" });
        }
        if self.name == name {
            return Ok(());
        }
        self.name = name.to_string();
        self.host
            .update_button_type(&self.id, &ButtonTypeData::named(name))?;
        Ok(())
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Light or clear the button's indicator. Sends nothing if unchanged.
    pub fn set_active(&mut self, active: bool) -> Result<()> {
        if self.active == active {
            return Ok(());
        }
        self.active = active;
        self.host
            .set_button_indicator(&self.id, Button::Generic, active)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ButtonTypeEvent> {
        self.events.subscribe()
    }

    /// Remove the button type from the host.
    pub fn remove(&self) -> Result<()> {
        self.host.remove_assignment(&self.id)?;
        Ok(())
    }
}
