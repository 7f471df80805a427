//! Correlation table for in-flight invocations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mixbridge_frame::ReplyToken;
use serde_json::Value;
use tokio::sync::oneshot;

/// Reply token → waiting invocation.
///
/// Every removal path (reply, timeout, dropped future, shutdown) goes through
/// `HashMap::remove`, so an entry is resolved at most once.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<ReplyToken, oneshot::Sender<Value>>>,
}

impl PendingTable {
    pub(crate) fn register(&self, token: ReplyToken) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(token, tx);
        rx
    }

    /// Resolve the invocation addressed by `topic`, if there is one.
    pub(crate) fn resolve(&self, topic: &str, value: Value) -> bool {
        let Some(tx) = self.lock().remove(topic) else {
            return false;
        };
        // The receiver may already be gone if the caller gave up.
        let _ = tx.send(value);
        true
    }

    pub(crate) fn remove(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    pub(crate) fn contains(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop every waiting invocation; their callers observe a closed channel.
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ReplyToken, oneshot::Sender<Value>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_once() {
        let table = PendingTable::default();
        let token = ReplyToken::from_wire("t1");
        let mut rx = table.register(token);

        assert!(table.resolve("t1", json!(1)));
        assert!(!table.resolve("t1", json!(2)));
        assert_eq!(rx.try_recv().unwrap(), json!(1));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn removal_is_idempotent() {
        let table = PendingTable::default();
        let _rx = table.register(ReplyToken::from_wire("t2"));

        assert!(table.contains("t2"));
        assert!(table.remove("t2"));
        assert!(!table.remove("t2"));
        assert!(!table.resolve("t2", json!(null)));
    }

    #[test]
    fn clear_closes_receivers() {
        let table = PendingTable::default();
        let mut rx = table.register(ReplyToken::from_wire("t3"));
        table.clear();
        assert!(rx.try_recv().is_err());
    }
}
