//! Sync Operation Module
//!
//! Queued mutating requests and the results of replaying them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::current_timestamp_ms;

// == HTTP Method ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

// == Priority ==
/// Queue priority. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

// == Operation Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Awaiting a (re)try
    #[default]
    Pending,
    /// Retries exhausted; kept for inspection until cleared or retried
    Failed,
}

// == New Operation ==
/// Caller-supplied part of an operation; id, timestamp and retry state are
/// assigned on enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
    pub operation_type: String,
    pub method: HttpMethod,
    pub endpoint: String,
    pub data: Value,
    pub max_retries: u32,
    pub priority: Priority,
    pub dependencies: Vec<String>,
}

impl NewOperation {
    pub fn new(
        operation_type: impl Into<String>,
        method: HttpMethod,
        endpoint: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            method,
            endpoint: endpoint.into(),
            data,
            max_retries: 3,
            priority: Priority::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

// == Sync Operation ==
/// A persisted queued request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub method: HttpMethod,
    pub endpoint: String,
    pub data: Value,
    /// Enqueue time (Unix milliseconds)
    pub timestamp: u64,
    pub retry_count: u32,
    /// Total attempts allowed
    pub max_retries: u32,
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: OperationStatus,
    /// Earliest time of the next attempt (Unix milliseconds, 0 = now)
    #[serde(default)]
    pub next_attempt_at: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Stamps a new operation with a fresh id and the current time.
    pub fn from_new(op: NewOperation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_type: op.operation_type,
            method: op.method,
            endpoint: op.endpoint,
            data: op.data,
            timestamp: current_timestamp_ms(),
            retry_count: 0,
            max_retries: op.max_retries,
            priority: op.priority,
            dependencies: op.dependencies,
            status: OperationStatus::Pending,
            next_attempt_at: 0,
            last_error: None,
        }
    }

    /// True once retries are exhausted.
    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed || self.retry_count >= self.max_retries
    }

    /// True if the operation may be attempted at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        !self.is_failed() && self.next_attempt_at <= now
    }
}

// == Sync Result ==
/// Outcome of one attempt to replay an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub operation_id: String,
    pub success: bool,
    /// Response body on success
    pub response: Option<Value>,
    pub error: Option<String>,
}

impl SyncResult {
    pub fn success(operation_id: impl Into<String>, response: Value) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn failure(operation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }
}

// == Queue Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_operations: usize,
    pub pending_operations: usize,
    pub failed_operations: usize,
    pub last_sync_attempt: Option<u64>,
    pub last_successful_sync: Option<u64>,
}
