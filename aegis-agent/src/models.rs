use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format shared with `aegis_server::routes::ingest` — field names and
/// shapes must match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub message: String,
    #[serde(default)]
    pub fields: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub agent_id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub cpu: Value,
    pub memory: Value,
    pub disk: Value,
    pub network: Value,
    pub process: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: i64,
    pub name: String,
    pub ppid: i64,
    pub username: Option<String>,
    pub status: Option<String>,
    pub cmdline: Option<String>,
    pub exe: Option<String>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_rss: i64,
    pub memory_vms: i64,
    pub num_threads: i32,
    pub num_fds: i32,
    pub num_connections: i32,
    #[serde(default)]
    pub connection_details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshotBatch {
    pub collected_at: DateTime<Utc>,
    pub processes: Vec<ProcessSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub command: String,
    pub shell: String,
    pub source: String,
    pub working_directory: Option<String>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAlert {
    pub rule_name: String,
    pub severity: Severity,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}
