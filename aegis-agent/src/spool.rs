use std::sync::Mutex;

use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use crate::models::{AgentAlert, CommandEvent, LogRecord, MetricSample};

/// Embedded single-node store for buffered telemetry and locally-generated
/// alerts. One writer-safe connection behind a mutex; collectors and the
/// forwarder share it.
pub struct Spool {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Logs,
    Commands,
    Metrics,
    Alerts,
    Processes,
}

impl Stream {
    fn table(&self) -> &'static str {
        match self {
            Stream::Logs => "logs",
            Stream::Commands => "commands",
            Stream::Metrics => "metrics",
            Stream::Alerts => "alerts",
            Stream::Processes => "processes",
        }
    }
}

fn parse_ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

impl Spool {
    pub fn open(path: &std::path::Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL, hostname TEXT,
                message TEXT, fields TEXT, forwarded INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS commands (
                id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL, user TEXT,
                command TEXT, shell TEXT, source TEXT, working_directory TEXT,
                exit_code INTEGER, forwarded INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL, cpu TEXT,
                memory TEXT, disk TEXT, network TEXT, process TEXT,
                forwarded INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY, rule_name TEXT NOT NULL, severity TEXT NOT NULL,
                details TEXT, timestamp TEXT NOT NULL, forwarded INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE IF NOT EXISTS processes (
                id INTEGER PRIMARY KEY, collected_at TEXT NOT NULL, body TEXT NOT NULL,
                forwarded INTEGER NOT NULL DEFAULT 0
             );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn write_log(&self, log: &LogRecord) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO logs (timestamp, hostname, message, fields) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                log.timestamp.to_rfc3339(),
                log.hostname,
                log.message,
                log.fields.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn write_command(&self, cmd: &CommandEvent) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO commands (timestamp, user, command, shell, source, working_directory, exit_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                cmd.timestamp.to_rfc3339(),
                cmd.user,
                cmd.command,
                cmd.shell,
                cmd.source,
                cmd.working_directory,
                cmd.exit_code,
            ],
        )?;
        Ok(())
    }

    pub fn write_metric(&self, sample: &MetricSample) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metrics (timestamp, cpu, memory, disk, network, process)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                sample.timestamp.to_rfc3339(),
                sample.cpu.to_string(),
                sample.memory.to_string(),
                sample.disk.to_string(),
                sample.network.to_string(),
                sample.process.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn write_processes(&self, collected_at: chrono::DateTime<chrono::Utc>, body: &Value) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO processes (collected_at, body) VALUES (?1, ?2)",
            rusqlite::params![collected_at.to_rfc3339(), body.to_string()],
        )?;
        Ok(())
    }

    pub fn write_alert(&self, alert: &AgentAlert) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts (rule_name, severity, details, timestamp) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                alert.rule_name,
                alert.severity.as_str(),
                alert.details.to_string(),
                alert.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn take_unforwarded_logs(&self, limit: i64) -> rusqlite::Result<Vec<(i64, LogRecord)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, hostname, message, fields FROM logs WHERE forwarded = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let fields: String = row.get(4)?;
            Ok((
                id,
                LogRecord {
                    timestamp: parse_ts(&timestamp),
                    hostname: row.get(2)?,
                    message: row.get(3)?,
                    fields: serde_json::from_str(&fields).unwrap_or(Value::Null),
                },
            ))
        })?;
        rows.collect()
    }

    pub fn take_unforwarded_commands(&self, limit: i64) -> rusqlite::Result<Vec<(i64, CommandEvent)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, user, command, shell, source, working_directory, exit_code
             FROM commands WHERE forwarded = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            Ok((
                id,
                CommandEvent {
                    timestamp: parse_ts(&timestamp),
                    user: row.get(2)?,
                    command: row.get(3)?,
                    shell: row.get(4)?,
                    source: row.get(5)?,
                    working_directory: row.get(6)?,
                    exit_code: row.get(7)?,
                },
            ))
        })?;
        rows.collect()
    }

    pub fn take_unforwarded_metrics(&self, limit: i64) -> rusqlite::Result<Vec<(i64, MetricSample)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, cpu, memory, disk, network, process
             FROM metrics WHERE forwarded = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let cpu: String = row.get(2)?;
            let memory: String = row.get(3)?;
            let disk: String = row.get(4)?;
            let network: String = row.get(5)?;
            let process: String = row.get(6)?;
            Ok((
                id,
                MetricSample {
                    agent_id: uuid::Uuid::nil(),
                    timestamp: parse_ts(&timestamp),
                    cpu: serde_json::from_str(&cpu).unwrap_or(Value::Null),
                    memory: serde_json::from_str(&memory).unwrap_or(Value::Null),
                    disk: serde_json::from_str(&disk).unwrap_or(Value::Null),
                    network: serde_json::from_str(&network).unwrap_or(Value::Null),
                    process: serde_json::from_str(&process).unwrap_or(Value::Null),
                },
            ))
        })?;
        rows.collect()
    }

    pub fn take_unforwarded_alerts(&self, limit: i64) -> rusqlite::Result<Vec<(i64, AgentAlert)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, rule_name, severity, details, timestamp FROM alerts WHERE forwarded = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let severity: String = row.get(2)?;
            let details: String = row.get(3)?;
            let timestamp: String = row.get(4)?;
            Ok((
                id,
                AgentAlert {
                    rule_name: row.get(1)?,
                    severity: match severity.as_str() {
                        "critical" => crate::models::Severity::Critical,
                        "high" => crate::models::Severity::High,
                        "medium" => crate::models::Severity::Medium,
                        _ => crate::models::Severity::Low,
                    },
                    details: serde_json::from_str(&details).unwrap_or(Value::Null),
                    timestamp: parse_ts(&timestamp),
                },
            ))
        })?;
        rows.collect()
    }

    pub fn take_unforwarded_processes(&self, limit: i64) -> rusqlite::Result<Vec<(i64, chrono::DateTime<chrono::Utc>, Value)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, collected_at, body FROM processes WHERE forwarded = 0 ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let collected_at: String = row.get(1)?;
            let body: String = row.get(2)?;
            Ok((id, parse_ts(&collected_at), serde_json::from_str(&body).unwrap_or(Value::Null)))
        })?;
        rows.collect()
    }

    pub fn mark_forwarded(&self, stream: Stream, ids: &[i64]) -> rusqlite::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("UPDATE {} SET forwarded = 1 WHERE id IN ({placeholders})", stream.table());
        conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(())
    }
}
