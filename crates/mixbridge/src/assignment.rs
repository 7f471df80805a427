use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mixbridge_frame::{Button, Indicator};
use mixbridge_host::{clamp_level, clamp_throttle, AssignmentData, HostApi};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{EntityError, Result};

/// How long a meter level is shown before it falls back to zero.
pub const METER_FALLOFF: Duration = Duration::from_millis(150);

const EVENT_CAPACITY: usize = 64;

/// Signals the host sends for an [`Assignment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentEvent {
    /// The fader moved; carries the new level in `[0, 1]`.
    VolumeChanged(f64),
    MutePressed,
    AssignPressed,
    RunPressed,
}

/// One plugin-scoped entry in the host's assignment list.
///
/// Setters update the local value and forward it to the host. Hardware input
/// for the entry arrives as [`AssignmentEvent`]s through
/// [`Assignment::subscribe`].
///
/// ```no_run
/// # async fn demo(host: mixbridge::HostApi) -> mixbridge::error::Result<()> {
/// use mixbridge::{Assignment, AssignmentData, AssignmentEvent};
///
/// let mut foo = Assignment::new(&host, "foo", AssignmentData::named("Foo Entry"))?;
/// foo.set_volume(0.5)?;
/// foo.set_muted(true)?;
///
/// let mut events = foo.subscribe();
/// while let Ok(event) = events.recv().await {
///     if event == AssignmentEvent::MutePressed {
///         let muted = !foo.muted();
///         foo.set_muted(muted)?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Assignment {
    host: HostApi,
    id: String,
    name: String,
    volume: f64,
    meter: Arc<Mutex<Meter>>,
    muted: bool,
    assigned: bool,
    running: bool,
    throttle: u32,
    events: broadcast::Sender<AssignmentEvent>,
}

#[derive(Debug, Default)]
struct Meter {
    level: f64,
    falloff: Option<JoinHandle<()>>,
}

impl Assignment {
    /// Register a new assignment with the host.
    ///
    /// Must be called from within a Tokio runtime. Fails if `id` is empty or
    /// `data.name` is blank. Unset fields default to volume 1, not muted, not
    /// assigned, not running and a 50 ms throttle.
    pub fn new(host: &HostApi, id: impl Into<String>, data: AssignmentData) -> Result<Self> {
        let id = id.into();
        let name = data.name.trim();
        if id.is_empty() || name.is_empty() {
            return Err(EntityError::MissingIdOrName { kind: "assignment" });
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut assignment = Self {
            host: host.clone(),
            id,
            name: String::new(),
            volume: 1.0,
            meter: Arc::default(),
            muted: false,
            assigned: false,
            running: false,
            throttle: 50,
            events,
        };

        assignment.set_name(name)?;
        assignment.set_volume(data.volume.unwrap_or(1.0))?;
        assignment.set_meter(0.0)?;
        assignment.set_muted(data.muted.unwrap_or(false))?;
        assignment.set_assigned(data.assigned.unwrap_or(false))?;
        assignment.set_running(data.running.unwrap_or(false))?;
        assignment.set_throttle(data.throttle.unwrap_or(50))?;
        assignment.subscribe_host_events();

        Ok(assignment)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the entry. Blank names are rejected.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EntityError::BlankName { kind: "assignment" });
        }
        self.name = name.to_string();
        self.host
            .update_assignment(&self.id, &AssignmentData::named(name))?;
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Set the volume indicator, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, level: f64) -> Result<()> {
        self.volume = clamp_level(level);
        self.host
            .set_indicator(&self.id, Indicator::Volume, self.volume)?;
        Ok(())
    }

    /// The meter level, or zero once [`METER_FALLOFF`] has passed since the
    /// last update.
    pub fn meter(&self) -> f64 {
        lock(&self.meter).level
    }

    /// Set the meter indicator, clamped to `[0, 1]`.
    pub fn set_meter(&mut self, level: f64) -> Result<()> {
        let level = clamp_level(level);
        {
            let mut meter = lock(&self.meter);
            if let Some(falloff) = meter.falloff.take() {
                falloff.abort();
            }
            meter.level = level;
        }

        self.host.set_indicator(&self.id, Indicator::Meter, level)?;

        let meter = Arc::clone(&self.meter);
        let falloff = tokio::spawn(async move {
            tokio::time::sleep(METER_FALLOFF).await;
            lock(&meter).level = 0.0;
        });
        lock(&self.meter).falloff = Some(falloff);
        Ok(())
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        self.host.set_button_indicator(&self.id, Button::Mute, muted)?;
        Ok(())
    }

    pub fn assigned(&self) -> bool {
        self.assigned
    }

    pub fn set_assigned(&mut self, assigned: bool) -> Result<()> {
        self.assigned = assigned;
        self.host
            .set_button_indicator(&self.id, Button::Assign, assigned)?;
        Ok(())
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) -> Result<()> {
        self.running = running;
        self.host.set_button_indicator(&self.id, Button::Run, running)?;
        Ok(())
    }

    /// Minimum milliseconds between volume updates from the host.
    pub fn throttle(&self) -> u32 {
        self.throttle
    }

    /// Set the host-side volume throttle, clamped to 50..=1000 ms.
    pub fn set_throttle(&mut self, ms: u32) -> Result<()> {
        self.throttle = clamp_throttle(ms);
        self.host.set_throttle(&self.id, self.throttle)?;
        Ok(())
    }

    /// Receive hardware events for this entry.
    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentEvent> {
        self.events.subscribe()
    }

    /// Remove the entry from the host.
    pub fn remove(&self) -> Result<()> {
        self.host.remove_assignment(&self.id)?;
        Ok(())
    }

    fn subscribe_host_events(&self) {
        let events = self.events.clone();
        self.host.on_volume(&self.id, move |level| {
            // No receivers is fine; the event is simply dropped.
            let _ = events.send(AssignmentEvent::VolumeChanged(level));
        });

        for (button, event) in [
            (Button::Mute, AssignmentEvent::MutePressed),
            (Button::Assign, AssignmentEvent::AssignPressed),
            (Button::Run, AssignmentEvent::RunPressed),
        ] {
            let events = self.events.clone();
            self.host.on_press(&self.id, button, move || {
                let _ = events.send(event);
            });
        }
    }
}

impl Drop for Assignment {
    fn drop(&mut self) {
        if let Some(falloff) = lock(&self.meter).falloff.take() {
            falloff.abort();
        }
    }
}

fn lock(meter: &Mutex<Meter>) -> MutexGuard<'_, Meter> {
    meter.lock().unwrap_or_else(PoisonError::into_inner)
}
