//! Core types for the job queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Uuid;

/// Status of a job record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns true if this status represents a terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of deferred work owned by a bookmark entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub entry_id: Uuid,
    pub payload_json: Option<String>,
    pub attempts: i64,
    pub locked_at: Option<String>,
    pub finished_at: Option<String>,
    pub last_error: Option<String>,
    pub last_response: Option<String>,
    pub created_at: String,
}

impl Job {
    /// Parsed payload. Absent or malformed payloads degrade to `None`;
    /// handlers fall back to default behavior rather than failing the job.
    pub fn payload(&self) -> Option<Value> {
        let raw = self.payload_json.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }

    /// Convenience accessor for a boolean payload flag.
    pub fn payload_flag(&self, key: &str) -> bool {
        self.payload()
            .and_then(|v| v.get(key).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    /// Convenience accessor for a string payload field.
    pub fn payload_str(&self, key: &str) -> Option<String> {
        self.payload()
            .and_then(|v| v.get(key).and_then(Value::as_str).map(str::to_owned))
    }
}
