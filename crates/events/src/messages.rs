use chrono::{DateTime, Utc};
use core_types::{AlgoId, AlgoRunStatus, TradeMode};
use serde::{Deserialize, Serialize};

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A structured log line published on the diagnostics topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Announces a change in an owner's algo day state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoStatusUpdate {
    pub timestamp: DateTime<Utc>,
    pub owner_id: String,
    pub algo: AlgoId,
    pub mode: TradeMode,
    pub status: AlgoRunStatus,
}

/// A component-level failure that downstream consumers may want to surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub message: String,
}

/// The diagnostics topic family.
///
/// The `#[serde(tag = "type", content = "payload")]` attribute serializes
/// each variant into a clean `{ "type": ..., "payload": ... }` object, so a
/// future transport can forward these without re-encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Diagnostic {
    /// A structured log line.
    SystemLog(LogMessage),
    /// An algo day state transition.
    AlgoStatus(AlgoStatusUpdate),
    /// A component failure.
    Error(ErrorMessage),
}
