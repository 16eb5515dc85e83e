//! Call auditing

pub mod log;

pub use log::{
    AuditLog, AuditLogEntry, AuditQuery, AuditStats, ListenerId, ModuleCallStats,
    DEFAULT_MAX_ENTRIES, IN_PROGRESS,
};
