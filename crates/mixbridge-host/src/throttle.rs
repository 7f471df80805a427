//! Per-entity rate limiting for volume and meter indicators.
//!
//! The first update in a window goes out immediately and opens the window.
//! Updates inside the window only overwrite the pending value for their
//! indicator. When the window closes every pending indicator is flushed with
//! its latest value. A flush never opens a new window; the next update does.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mixbridge_channel::FrameSink;
use mixbridge_frame::{Channel, Indicator};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, trace, warn};

use crate::error::{HostError, Result};

/// Default coalescing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

type Records = Arc<Mutex<HashMap<String, ThrottleRecord>>>;

#[derive(Debug)]
struct ThrottleRecord {
    /// Distinguishes this record from an earlier one registered under the
    /// same id, so a stale timer never flushes a newer record.
    epoch: u64,
    pending: BTreeMap<Indicator, f64>,
    timer: Option<JoinHandle<()>>,
}

impl ThrottleRecord {
    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.clear();
    }
}

/// Coalesces indicator updates per entity.
pub struct IndicatorThrottle<S: FrameSink> {
    sink: S,
    window: Duration,
    next_epoch: AtomicU64,
    records: Records,
}

impl<S: FrameSink> IndicatorThrottle<S> {
    pub fn new(sink: S, window: Duration) -> Self {
        Self {
            sink,
            window,
            next_epoch: AtomicU64::new(0),
            records: Arc::default(),
        }
    }

    /// Create or reset the record for `id`, cancelling any open window.
    pub fn register(&self, id: &str) {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let previous = lock(&self.records).insert(
            id.to_string(),
            ThrottleRecord {
                epoch,
                pending: BTreeMap::new(),
                timer: None,
            },
        );
        if let Some(mut previous) = previous {
            previous.cancel();
        }
        trace!(entity = id, "throttle record initialized");
    }

    /// Delete the record for `id`. Returns whether one existed.
    pub fn remove(&self, id: &str) -> bool {
        match lock(&self.records).remove(id) {
            Some(mut record) => {
                record.cancel();
                true
            }
            None => false,
        }
    }

    /// Update an indicator, sending now or at the end of the current window.
    ///
    /// `level` is clamped to `[0, 1]`; NaN becomes 0. Fails with
    /// [`HostError::UnknownEntity`] if `id` was never registered or has been
    /// removed, and must be called from within a Tokio runtime.
    pub fn set(&self, id: &str, indicator: Indicator, level: f64) -> Result<()> {
        let level = clamp_level(level);
        {
            let mut records = lock(&self.records);
            let Some(record) = records.get_mut(id) else {
                error!(entity = id, %indicator, "indicator update for unregistered entity");
                return Err(HostError::UnknownEntity(id.to_string()));
            };

            if record.timer.is_some() {
                record.pending.insert(indicator, level);
                trace!(entity = id, %indicator, level, "indicator update coalesced");
                return Ok(());
            }

            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| HostError::NoRuntime)?;
            // The window is measured from this send, not from when the timer
            // task first runs.
            let deadline = Instant::now() + self.window;
            record.timer = Some(runtime.spawn(close_window(
                self.sink.clone(),
                Arc::clone(&self.records),
                id.to_string(),
                record.epoch,
                deadline,
            )));
        }

        trace!(entity = id, %indicator, level, "indicator update sent");
        send_level(&self.sink, id, indicator, level)?;
        Ok(())
    }

    /// Cancel every open window and drop pending values. Records stay
    /// registered.
    pub fn shutdown(&self) {
        for record in lock(&self.records).values_mut() {
            record.cancel();
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_registered(&self, id: &str) -> bool {
        lock(&self.records).contains_key(id)
    }

    /// True while a window is open for `id`.
    pub fn window_open(&self, id: &str) -> bool {
        lock(&self.records)
            .get(id)
            .is_some_and(|record| record.timer.is_some())
    }

    /// Values waiting for the current window to close.
    pub fn pending(&self, id: &str) -> Option<BTreeMap<Indicator, f64>> {
        lock(&self.records)
            .get(id)
            .map(|record| record.pending.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: FrameSink> std::fmt::Debug for IndicatorThrottle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorThrottle")
            .field("window", &self.window)
            .field("entities", &self.len())
            .finish()
    }
}

impl<S: FrameSink> Drop for IndicatorThrottle<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clamp an indicator level to `[0, 1]`.
pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

async fn close_window<S: FrameSink>(
    sink: S,
    records: Records,
    id: String,
    epoch: u64,
    deadline: Instant,
) {
    tokio::time::sleep_until(deadline).await;

    let flushed = {
        let mut records = lock(&records);
        match records.get_mut(&id) {
            Some(record) if record.epoch == epoch => {
                record.timer = None;
                std::mem::take(&mut record.pending)
            }
            _ => return,
        }
    };

    for (indicator, level) in flushed {
        trace!(entity = %id, %indicator, level, "indicator window flushed");
        if let Err(err) = send_level(&sink, &id, indicator, level) {
            warn!(entity = %id, %indicator, error = %err, "failed to flush indicator");
        }
    }
}

fn send_level<S: FrameSink>(
    sink: &S,
    id: &str,
    indicator: Indicator,
    level: f64,
) -> mixbridge_channel::Result<()> {
    let args: Vec<Value> = vec![json!(id), json!(level)];
    sink.send(Channel::SetIndicator(indicator), args)
}

fn lock(
    records: &Mutex<HashMap<String, ThrottleRecord>>,
) -> MutexGuard<'_, HashMap<String, ThrottleRecord>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use mixbridge_channel::MemorySink;
    use tokio::time::sleep;

    use super::*;

    fn throttle() -> (IndicatorThrottle<MemorySink>, MemorySink) {
        let sink = MemorySink::new();
        (IndicatorThrottle::new(sink.clone(), DEFAULT_WINDOW), sink)
    }

    fn levels(sink: &MemorySink, channel: &str) -> Vec<Value> {
        sink.sent_on(channel)
            .into_iter()
            .map(|frame| frame.args[1].clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn first_update_is_immediate_and_last_is_flushed() {
        let (throttle, sink) = throttle();
        throttle.register("ch1");

        throttle.set("ch1", Indicator::Volume, 0.75).unwrap();
        assert_eq!(levels(&sink, "plugin-setIndicator-volume"), vec![json!(0.75)]);

        sleep(Duration::from_millis(10)).await;
        throttle.set("ch1", Indicator::Volume, 0.30).unwrap();
        assert_eq!(sink.frames().len(), 1);

        sleep(Duration::from_millis(50)).await;
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].args, vec![json!("ch1"), json!(0.30)]);
        assert!(frames[1].reply_to.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_sends_at_most_two_values() {
        let (throttle, sink) = throttle();
        throttle.register("a");

        for i in 1..=20 {
            throttle.set("a", Indicator::Volume, f64::from(i) / 20.0).unwrap();
        }
        sleep(Duration::from_millis(60)).await;

        assert_eq!(
            levels(&sink, "plugin-setIndicator-volume"),
            vec![json!(0.05), json!(1.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_immediate_send_per_entity_window() {
        let (throttle, sink) = throttle();
        throttle.register("a");

        throttle.set("a", Indicator::Volume, 0.5).unwrap();
        throttle.set("a", Indicator::Meter, 0.9).unwrap();
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(
            throttle.pending("a").unwrap(),
            BTreeMap::from([(Indicator::Meter, 0.9)])
        );

        sleep(Duration::from_millis(51)).await;
        assert_eq!(levels(&sink, "plugin-setIndicator-meter"), vec![json!(0.9)]);
        assert!(!throttle.window_open("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_runs_from_the_opening_send() {
        let (throttle, sink) = throttle();
        throttle.register("a");

        throttle.set("a", Indicator::Volume, 0.1).unwrap();
        // Move the clock before the timer task has had a chance to run.
        tokio::time::advance(Duration::from_millis(30)).await;
        throttle.set("a", Indicator::Volume, 0.2).unwrap();

        sleep(Duration::from_millis(30)).await;
        assert_eq!(
            levels(&sink, "plugin-setIndicator-volume"),
            vec![json!(0.1), json!(0.2)]
        );
        assert!(!throttle.window_open("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn entities_have_independent_windows() {
        let (throttle, sink) = throttle();
        throttle.register("a");
        throttle.register("b");

        throttle.set("a", Indicator::Volume, 0.1).unwrap();
        throttle.set("b", Indicator::Volume, 0.2).unwrap();
        assert_eq!(sink.frames().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_closes_silently() {
        let (throttle, sink) = throttle();
        throttle.register("a");
        throttle.set("a", Indicator::Meter, 0.4).unwrap();

        sleep(Duration::from_millis(51)).await;
        assert_eq!(sink.frames().len(), 1);
        assert!(!throttle.window_open("a"));

        // The next update starts a fresh window and goes out immediately.
        throttle.set("a", Indicator::Meter, 0.6).unwrap();
        assert_eq!(sink.frames().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn levels_are_clamped() {
        let (throttle, sink) = throttle();
        throttle.register("a");
        throttle.set("a", Indicator::Volume, 3.0).unwrap();
        sleep(Duration::from_millis(60)).await;
        throttle.set("a", Indicator::Volume, -1.0).unwrap();
        sleep(Duration::from_millis(60)).await;
        throttle.set("a", Indicator::Volume, f64::NAN).unwrap();

        assert_eq!(
            levels(&sink, "plugin-setIndicator-volume"),
            vec![json!(1.0), json!(0.0), json!(0.0)]
        );
    }

    #[tokio::test]
    async fn unregistered_entity_is_rejected() {
        let (throttle, sink) = throttle();
        let err = throttle.set("ghost", Indicator::Volume, 0.5).unwrap_err();
        assert!(matches!(err, HostError::UnknownEntity(id) if id == "ghost"));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn register_discards_pending_window() {
        let (throttle, sink) = throttle();
        throttle.register("a");
        throttle.set("a", Indicator::Volume, 0.1).unwrap();
        throttle.set("a", Indicator::Volume, 0.2).unwrap();

        throttle.register("a");
        assert!(!throttle.window_open("a"));
        assert!(throttle.pending("a").unwrap().is_empty());

        sleep(Duration::from_millis(60)).await;
        assert_eq!(levels(&sink, "plugin-setIndicator-volume"), vec![json!(0.1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_cancels_window() {
        let (throttle, sink) = throttle();
        throttle.register("a");
        throttle.set("a", Indicator::Volume, 0.1).unwrap();
        throttle.set("a", Indicator::Volume, 0.2).unwrap();

        assert!(throttle.remove("a"));
        assert!(!throttle.remove("a"));
        assert!(!throttle.is_registered("a"));

        sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.frames().len(), 1);
        assert!(throttle.set("a", Indicator::Volume, 0.3).is_err());
    }

    #[test]
    fn no_runtime_is_reported() {
        let (throttle, _sink) = throttle();
        throttle.register("a");
        assert!(matches!(
            throttle.set("a", Indicator::Volume, 0.5),
            Err(HostError::NoRuntime)
        ));
    }
}
