use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

use crate::models::{AgentAlert, Severity};

const WINDOW_SECS: i64 = 300;
const THRESHOLD: usize = 3;
const RING_LEN: usize = 10;

static SOURCE_IP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"from (\S+) port").unwrap());

fn is_failed_ssh(message: &str) -> bool {
    if message.contains("Failed password for") {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("authentication failure") && lower.contains("sshd")
}

/// Streaming detector, keyed by source IP, with a bounded ring buffer of
/// recent attempts per key.
pub struct SshBruteForceDetector {
    attempts: HashMap<String, VecDeque<(DateTime<Utc>, String)>>,
}

impl SshBruteForceDetector {
    pub fn new() -> Self {
        Self { attempts: HashMap::new() }
    }

    pub fn check(&mut self, message: &str, hostname: &str, timestamp: DateTime<Utc>) -> Option<AgentAlert> {
        if !is_failed_ssh(message) {
            return None;
        }
        let source_ip = SOURCE_IP_RE.captures(message)?.get(1)?.as_str().to_string();

        let ring = self.attempts.entry(source_ip.clone()).or_default();
        ring.push_back((timestamp, message.to_string()));
        while ring.len() > RING_LEN {
            ring.pop_front();
        }
        let cutoff = timestamp - chrono::Duration::seconds(WINDOW_SECS);
        while ring.front().is_some_and(|(ts, _)| *ts < cutoff) {
            ring.pop_front();
        }

        if ring.len() < THRESHOLD {
            return None;
        }

        Some(AgentAlert {
            rule_name: "Agent: SSH Brute Force Detected".to_string(),
            severity: Severity::High,
            details: json!({
                "source_ip": source_ip,
                "attempt_count": ring.len(),
                "window_seconds": WINDOW_SECS,
                "sample_message": message,
                "hostname": hostname,
            }),
            timestamp,
        })
    }
}

impl Default for SshBruteForceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_threshold_attempts_from_same_ip() {
        let mut det = SshBruteForceDetector::new();
        let now = Utc::now();
        let msg = "Failed password for root from 1.2.3.4 port 22 ssh2";
        assert!(det.check(msg, "host", now).is_none());
        assert!(det.check(msg, "host", now).is_none());
        let alert = det.check(msg, "host", now).expect("third attempt should fire");
        assert_eq!(alert.rule_name, "Agent: SSH Brute Force Detected");
    }

    #[test]
    fn ignores_unrelated_messages() {
        let mut det = SshBruteForceDetector::new();
        assert!(det.check("Accepted password for root from 1.2.3.4 port 22 ssh2", "host", Utc::now()).is_none());
    }
}
