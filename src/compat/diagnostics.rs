//! Compatibility Diagnostics
//!
//! Write-only record of what each capability found on the running host. The
//! engine never reads these back to make decisions; they exist for support
//! and debugging, and are mirrored to the `log` facade as they arrive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;
use super::version::HostVersion;

/// Log target used for diagnostic lines
pub const DIAGNOSTICS_TARGET: &str = "hostcompat::diagnostics";

/// Default number of records kept in memory for reports
pub const DEFAULT_CAPACITY: usize = 256;

/// What happened to a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticEvent {
    /// Binding finished with an active strategy
    Bound,
    /// Binding finished without a usable target
    Unavailable,
    /// The direct strategy faulted at call time and was disabled
    Demoted,
}

/// One entry in the compatibility log
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRecord {
    pub id: Uuid,
    pub capability: String,
    pub host_version: HostVersion,
    pub compatible: bool,
    pub event: DiagnosticEvent,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticRecord {
    pub fn new<C: Into<String>, D: Into<String>>(
        capability: C,
        host_version: HostVersion,
        compatible: bool,
        event: DiagnosticEvent,
        details: D,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            capability: capability.into(),
            host_version,
            compatible,
            event,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for diagnostic records
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, record: DiagnosticRecord);
}

/// Bounded in-memory sink that also writes every record to the log
pub struct CompatibilityLog {
    capacity: usize,
    retained: Mutex<VecDeque<DiagnosticRecord>>,
    total: AtomicU64,
}

impl CompatibilityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retained: Mutex::new(VecDeque::new()),
            total: AtomicU64::new(0),
        }
    }

    /// Process-wide log shared by bindings that were not given their own
    pub fn global() -> Arc<CompatibilityLog> {
        static GLOBAL: OnceLock<Arc<CompatibilityLog>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CompatibilityLog::new(DEFAULT_CAPACITY))))
    }

    /// Copy of the retained records, oldest first
    pub fn snapshot(&self) -> Vec<DiagnosticRecord> {
        self.retained.lock().iter().cloned().collect()
    }

    /// Records ever written, including ones evicted from memory
    pub fn total_recorded(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Retained records for one capability and event
    pub fn count(&self, capability: &str, event: DiagnosticEvent) -> usize {
        self.retained
            .lock()
            .iter()
            .filter(|r| r.capability == capability && r.event == event)
            .count()
    }

    /// Retained records as JSON lines
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for record in self.retained.lock().iter() {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Default for CompatibilityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DiagnosticsSink for CompatibilityLog {
    fn record(&self, record: DiagnosticRecord) {
        if record.compatible {
            info!(
                target: DIAGNOSTICS_TARGET,
                "[{}] host {} compatible ({:?}): {}",
                record.capability, record.host_version, record.event, record.details
            );
        } else {
            warn!(
                target: DIAGNOSTICS_TARGET,
                "[{}] host {} incompatible ({:?}): {}",
                record.capability, record.host_version, record.event, record.details
            );
        }

        self.total.fetch_add(1, Ordering::Relaxed);
        let mut retained = self.retained.lock();
        if retained.len() == self.capacity {
            retained.pop_front();
        }
        retained.push_back(record);
    }
}
