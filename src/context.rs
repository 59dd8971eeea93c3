//! Context Store (SPEC_FULL.md §4.2, component C2).

use serde_json::{Map, Value};

/// The mutable key/value store backing a running machine's extended state.
/// Values are `serde_json::Value` (SPEC_FULL.md §1.1) so context snapshots,
/// `_doneData`, and error payloads share one dynamic value type.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Map<String, Value>,
    /// Events queued by [`Context::raise`] during the action call in
    /// progress. Drained by the microstep executor immediately after each
    /// action returns and appended to the event loop's internal queue
    /// (SPEC_FULL.md §4.6 step 4).
    raised: Vec<String>,
}

impl Context {
    pub fn new(initial: Map<String, Value>) -> Self {
        Self { values: initial, raised: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// A deep copy of the current context, suitable for later `restore`.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.clone()
    }

    /// Full replacement by a prior snapshot (SPEC_FULL.md open question,
    /// resolved in favor of full replacement rather than a merge).
    pub fn restore(&mut self, snapshot: Map<String, Value>) {
        self.values = snapshot;
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Populate the `_lastError`/`_errorType`/`_errorMessage` triple per
    /// SPEC_FULL.md §7.
    pub fn record_error(&mut self, error_type: &str, message: &str) {
        self.set("_errorType", error_type);
        self.set("_errorMessage", message);
        self.set("_lastError", message);
    }

    /// Populate `_doneData` with a service's completion value (SPEC_FULL.md §4.8).
    pub fn record_done_data(&mut self, data: Value) {
        self.set("_doneData", data);
    }

    /// Queue an internal event from inside an action. Delivered after the
    /// current microstep's remaining actions finish, ahead of the next
    /// externally sent event (SPEC_FULL.md §4.6 step 4).
    pub fn raise(&mut self, event: impl Into<String>) {
        self.raised.push(event.into());
    }

    pub(crate) fn take_raised(&mut self) -> Vec<String> {
        std::mem::take(&mut self.raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_restore_round_trips() {
        let mut ctx = Context::new(Map::new());
        ctx.set("count", json!(0));
        let snap = ctx.snapshot();
        ctx.set("count", json!(5));
        ctx.set("added_later", json!(true));
        assert_eq!(ctx.get("count"), Some(&json!(5)));
        ctx.restore(snap);
        assert_eq!(ctx.get("count"), Some(&json!(0)));
        // Full replacement: keys added after the snapshot are gone.
        assert!(!ctx.contains("added_later"));
    }

    #[test]
    fn raised_events_drain_once_and_preserve_order() {
        let mut ctx = Context::new(Map::new());
        ctx.raise("to_b");
        ctx.raise("to_c");
        assert_eq!(ctx.take_raised(), vec!["to_b".to_string(), "to_c".to_string()]);
        assert!(ctx.take_raised().is_empty());
    }
}
