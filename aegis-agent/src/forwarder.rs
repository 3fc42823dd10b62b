use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::collectors::{is_shutting_down, ShutdownFlag};
use crate::spool::{Spool, Stream};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Periodically drains the spool and POSTs each stream's unforwarded batch
/// to the server. At-least-once: a batch is marked forwarded only after a
/// 2xx response, so a crash mid-send just re-sends on the next tick. A
/// batch that fails to send is logged and left in place — it's retried
/// next tick rather than blocking later streams.
pub struct Forwarder {
    client: Client,
    server_url: String,
    agent_id: Uuid,
    spool: Arc<Spool>,
    interval: Duration,
    batch_size: i64,
}

impl Forwarder {
    pub fn new(server_url: String, agent_id: Uuid, spool: Arc<Spool>, interval: Duration, batch_size: i64) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().expect("failed to build http client");
        Self { client, server_url, agent_id, spool, interval, batch_size }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url.trim_end_matches('/'))
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> bool {
        let result = self
            .client
            .post(self.url(path))
            .header("X-Aegis-Agent-ID", self.agent_id.to_string())
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                log::warn!("forward to {path} rejected: status {}", resp.status());
                false
            }
            Err(e) => {
                log::warn!("forward to {path} failed: {e}");
                false
            }
        }
    }

    /// Fetches the server's last-known command timestamp so the command
    /// collector's first run doesn't replay everything it's already seen.
    pub async fn fetch_last_command_sync(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let url = self.url(&format!("/api/commands/last-sync/{}", self.agent_id));
        let resp = self
            .client
            .get(url)
            .header("X-Aegis-Agent-ID", self.agent_id.to_string())
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: serde_json::Value = resp.json().await.ok()?;
        body.get("timestamp").and_then(|v| v.as_str()).and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&chrono::Utc))
        })
    }

    async fn forward_logs(&self) {
        let Ok(rows) = self.spool.take_unforwarded_logs(self.batch_size) else { return };
        if rows.is_empty() {
            return;
        }
        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let records: Vec<_> = rows.into_iter().map(|(_, r)| r).collect();
        if self.post_json("/api/ingest", json!(records)).await {
            let _ = self.spool.mark_forwarded(Stream::Logs, &ids);
        }
    }

    async fn forward_metrics(&self) {
        let Ok(rows) = self.spool.take_unforwarded_metrics(self.batch_size) else { return };
        for (id, mut sample) in rows {
            sample.agent_id = self.agent_id;
            if self.post_json("/api/metrics", json!(sample)).await {
                let _ = self.spool.mark_forwarded(Stream::Metrics, &[id]);
            } else {
                break;
            }
        }
    }

    async fn forward_processes(&self) {
        let Ok(rows) = self.spool.take_unforwarded_processes(self.batch_size) else { return };
        for (id, collected_at, body) in rows {
            let payload = json!({ "collected_at": collected_at, "processes": body.get("processes").cloned().unwrap_or(json!([])) });
            if self.post_json("/api/processes", payload).await {
                let _ = self.spool.mark_forwarded(Stream::Processes, &[id]);
            } else {
                break;
            }
        }
    }

    async fn forward_commands(&self) {
        let Ok(rows) = self.spool.take_unforwarded_commands(self.batch_size) else { return };
        if rows.is_empty() {
            return;
        }
        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let commands: Vec<_> = rows.into_iter().map(|(_, c)| c).collect();
        if self.post_json("/api/commands", json!(commands)).await {
            let _ = self.spool.mark_forwarded(Stream::Commands, &ids);
        }
    }

    async fn forward_alerts(&self) {
        let Ok(rows) = self.spool.take_unforwarded_alerts(self.batch_size) else { return };
        for (id, alert) in rows {
            if self.post_json("/api/alerts", json!(alert)).await {
                let _ = self.spool.mark_forwarded(Stream::Alerts, &[id]);
            } else {
                break;
            }
        }
    }

    pub async fn run(&self, shutdown: ShutdownFlag) {
        let mut elapsed = self.interval;
        while !is_shutting_down(&shutdown) {
            if elapsed >= self.interval {
                self.forward_logs().await;
                self.forward_metrics().await;
                self.forward_processes().await;
                self.forward_commands().await;
                self.forward_alerts().await;
                elapsed = Duration::ZERO;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
            elapsed += SHUTDOWN_POLL;
        }
    }
}
