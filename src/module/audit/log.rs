//! Call audit log
//!
//! Bounded, append-only record of every cross-module call attempt. Entries
//! are evicted oldest-first once the configured maximum is exceeded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::utils::time::current_timestamp_millis;

/// Default maximum number of retained entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Duration recorded for an entry whose call has not completed yet
pub const IN_PROGRESS: i64 = -1;

/// One attempted cross-module call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub caller: String,
    pub module: String,
    pub method: String,
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds; `IN_PROGRESS` until completed
    pub duration: i64,
}

impl AuditLogEntry {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_in_progress(&self) -> bool {
        self.duration < 0
    }
}

/// Query filter; every present field must match
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub caller: Option<String>,
    pub module: Option<String>,
    pub method: Option<String>,
    /// Inclusive lower bound on `timestamp`
    pub since: Option<u64>,
    /// Inclusive upper bound on `timestamp`
    pub until: Option<u64>,
    /// `Some(true)` for failed calls only, `Some(false)` for successful only
    pub has_error: Option<bool>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.caller.as_ref().map_or(true, |c| *c == entry.caller)
            && self.module.as_ref().map_or(true, |m| *m == entry.module)
            && self.method.as_ref().map_or(true, |m| *m == entry.method)
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
            && self.has_error.map_or(true, |e| entry.is_error() == e)
    }
}

/// Per-module aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCallStats {
    pub calls: usize,
    pub errors: usize,
    /// Mean over completed entries (milliseconds)
    pub avg_duration: f64,
    #[serde(skip)]
    timed: usize,
}

/// Aggregate over the retained entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_calls: usize,
    pub error_count: usize,
    pub per_module: BTreeMap<String, ModuleCallStats>,
}

/// Handle returned by [`AuditLog::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&AuditLogEntry) + Send + Sync>;

struct AuditState {
    entries: VecDeque<AuditLogEntry>,
    next_id: u64,
    enabled: bool,
    max_entries: usize,
}

/// Audit log shared by the dispatch path
pub struct AuditLog {
    state: Mutex<AuditState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: Mutex<u64>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(AuditState {
                entries: VecDeque::new(),
                next_id: 1,
                enabled: true,
                max_entries: max_entries.max(1),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: Mutex::new(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AuditState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn set_max_entries(&self, max_entries: usize) {
        let mut state = self.state();
        state.max_entries = max_entries.max(1);
        Self::trim(&mut state);
    }

    pub fn max_entries(&self) -> usize {
        self.state().max_entries
    }

    /// Record a completed call. Returns `None` when the log is disabled.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        caller: &str,
        module: &str,
        method: &str,
        args: &[Value],
        result: Option<Value>,
        error: Option<String>,
        duration: i64,
    ) -> Option<AuditLogEntry> {
        let entry = {
            let mut state = self.state();
            if !state.enabled {
                return None;
            }
            let entry = AuditLogEntry {
                id: state.next_id,
                timestamp: current_timestamp_millis(),
                caller: caller.to_string(),
                module: module.to_string(),
                method: method.to_string(),
                args: args.to_vec(),
                result,
                error,
                duration,
            };
            state.next_id += 1;
            state.entries.push_back(entry.clone());
            Self::trim(&mut state);
            entry
        };

        self.notify(&entry);
        Some(entry)
    }

    /// Open an in-progress entry; complete it with [`complete_record`](Self::complete_record).
    ///
    /// The id is allocated even when disabled; completing it is then a no-op.
    pub fn start_record(&self, caller: &str, module: &str, method: &str, args: &[Value]) -> u64 {
        let entry = {
            let mut state = self.state();
            let id = state.next_id;
            state.next_id += 1;
            if !state.enabled {
                return id;
            }
            let entry = AuditLogEntry {
                id,
                timestamp: current_timestamp_millis(),
                caller: caller.to_string(),
                module: module.to_string(),
                method: method.to_string(),
                args: args.to_vec(),
                result: None,
                error: None,
                duration: IN_PROGRESS,
            };
            state.entries.push_back(entry.clone());
            Self::trim(&mut state);
            entry
        };

        let id = entry.id;
        self.notify(&entry);
        id
    }

    /// Fill in the outcome of an entry opened by `start_record`.
    pub fn complete_record(
        &self,
        id: u64,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<AuditLogEntry> {
        let entry = {
            let mut state = self.state();
            let entry = state.entries.iter_mut().rev().find(|e| e.id == id)?;
            let now = current_timestamp_millis();
            entry.duration = now.saturating_sub(entry.timestamp) as i64;
            entry.result = result;
            entry.error = error;
            entry.clone()
        };

        self.notify(&entry);
        Some(entry)
    }

    fn trim(state: &mut AuditState) {
        let excess = state.entries.len().saturating_sub(state.max_entries);
        if excess > 0 {
            state.entries.drain(..excess);
            debug!("Audit log trimmed {} oldest entries", excess);
        }
    }

    fn notify(&self, entry: &AuditLogEntry) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(entry))).is_err() {
                warn!("Audit listener panicked on entry {}", entry.id);
            }
        }
    }

    /// Register a listener invoked synchronously for every new or completed entry
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&AuditLogEntry) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_listener.lock().unwrap_or_else(|e| e.into_inner());
            let id = ListenerId(*next);
            *next += 1;
            id
        };
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Matching entries, oldest first
    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditLogEntry> {
        let state = self.state();
        let mut matched: Vec<AuditLogEntry> = state
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            let start = matched.len().saturating_sub(limit);
            matched.drain(..start);
        }
        matched
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.state().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state().entries.clear();
    }

    pub fn stats(&self) -> AuditStats {
        let state = self.state();
        let mut stats = AuditStats {
            total_calls: state.entries.len(),
            ..Default::default()
        };

        for entry in &state.entries {
            let module = stats.per_module.entry(entry.module.clone()).or_default();
            module.calls += 1;
            if entry.is_error() {
                module.errors += 1;
                stats.error_count += 1;
            }
            if !entry.is_in_progress() {
                module.timed += 1;
                module.avg_duration +=
                    (entry.duration as f64 - module.avg_duration) / module.timed as f64;
            }
        }
        stats
    }

    /// All entries as a pretty-printed JSON array
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_record_and_trim_oldest_first() {
        let log = AuditLog::with_max_entries(3);
        for i in 0..5 {
            log.record("shell", "orders", "openOrder", &[json!(i)], Some(json!(i)), None, 1);
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].args, vec![json!(2)]);
        assert_eq!(entries[2].args, vec![json!(4)]);
    }

    #[test]
    fn test_disabled_log_records_nothing() {
        let log = AuditLog::new();
        log.set_enabled(false);
        assert!(log.record("a", "b", "c", &[], None, None, 0).is_none());
        let id = log.start_record("a", "b", "c", &[]);
        assert!(log.complete_record(id, Some(json!(1)), None).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_start_and_complete() {
        let log = AuditLog::new();
        let id = log.start_record("shell", "auth", "login", &[json!("ada")]);
        assert!(log.entries()[0].is_in_progress());

        let done = log.complete_record(id, Some(json!({"ok": true})), None).unwrap();
        assert!(done.duration >= 0);
        assert_eq!(done.result, Some(json!({"ok": true})));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_query_filters_and_limit() {
        let log = AuditLog::new();
        log.record("shell", "orders", "openOrder", &[], Some(json!(1)), None, 2);
        log.record("reporting", "orders", "openOrder", &[], None, Some("denied".into()), 0);
        log.record("shell", "auth", "login", &[], Some(json!(true)), None, 4);
        log.record("shell", "orders", "setStatus", &[], Some(json!(true)), None, 3);

        let orders = log.query(&AuditQuery {
            module: Some("orders".into()),
            ..Default::default()
        });
        assert_eq!(orders.len(), 3);

        let failures = log.query(&AuditQuery {
            has_error: Some(true),
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].caller, "reporting");

        let recent = log.query(&AuditQuery {
            caller: Some("shell".into()),
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].method, "setStatus");
    }

    #[test]
    fn test_stats_exclude_in_progress_from_mean() {
        let log = AuditLog::new();
        log.record("shell", "orders", "a", &[], None, None, 10);
        log.record("shell", "orders", "b", &[], None, Some("boom".into()), 20);
        log.start_record("shell", "orders", "c", &[]);

        let stats = log.stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.error_count, 1);
        let orders = &stats.per_module["orders"];
        assert_eq!(orders.calls, 3);
        assert_eq!(orders.errors, 1);
        assert!((orders.avg_duration - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_listener_panic_is_contained() {
        let log = AuditLog::new();
        let seen = Arc::new(AtomicUsize::new(0));
        log.subscribe(|_| panic!("listener failure"));
        let counter = Arc::clone(&seen);
        let id = log.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(log.record("shell", "auth", "login", &[], None, None, 1).is_some());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(log.unsubscribe(id));
        log.record("shell", "auth", "login", &[], None, None, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_export_json() {
        let log = AuditLog::new();
        log.record("shell", "auth", "login", &[json!("ada")], Some(json!(true)), None, 1);
        let exported: Vec<AuditLogEntry> = serde_json::from_str(&log.export_json().unwrap()).unwrap();
        assert_eq!(exported, log.entries());
    }
}
