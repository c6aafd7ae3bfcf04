//! A single structured log entry: the unit passed to backends and
//! fanned out to subscribers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::level::Level;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    pub message: String,
    pub fields: IndexMap<String, String>,
}

impl LogEntry {
    /// Single-line text rendering used by the file backend's text mode
    /// and as a human-readable fallback.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {:<5} {} {}",
            self.timestamp.to_rfc3339(),
            self.level.as_str(),
            self.component,
            self.message
        );
        for (k, v) in &self.fields {
            line.push_str(&format!(" {k}={v}"));
        }
        line
    }
}
