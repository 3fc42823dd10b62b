pub mod command_rules;
pub mod cpu_spike;
pub mod ssh_brute_force;

use std::collections::HashMap;

use chrono::Utc;

use crate::models::{AgentAlert, CommandEvent};
use cpu_spike::CpuSpikeDetector;
use ssh_brute_force::SshBruteForceDetector;

const COOLDOWN_SECS: i64 = 300;

/// Combines the three detectors (R1/R2/R3) and a shared `(rule, key) →
/// last_fired_at` cooldown table, so the same condition does not re-alert
/// every tick while it persists.
pub struct RuleEngine {
    ssh: SshBruteForceDetector,
    cpu: CpuSpikeDetector,
    cooldowns: HashMap<(String, String), chrono::DateTime<chrono::Utc>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            ssh: SshBruteForceDetector::new(),
            cpu: CpuSpikeDetector::new(),
            cooldowns: HashMap::new(),
        }
    }

    fn in_cooldown(&self, rule: &str, key: &str, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.cooldowns
            .get(&(rule.to_string(), key.to_string()))
            .is_some_and(|last| (now - *last).num_seconds() < COOLDOWN_SECS)
    }

    fn mark_fired(&mut self, rule: &str, key: &str, now: chrono::DateTime<chrono::Utc>) {
        self.cooldowns.insert((rule.to_string(), key.to_string()), now);
    }

    pub fn analyze_log(&mut self, hostname: &str, message: &str, timestamp: chrono::DateTime<chrono::Utc>) -> Option<AgentAlert> {
        let alert = self.ssh.check(message, hostname, timestamp)?;
        let key = alert.details.get("source_ip").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if self.in_cooldown(&alert.rule_name, &key, timestamp) {
            return None;
        }
        self.mark_fired(&alert.rule_name, &key, timestamp);
        Some(alert)
    }

    pub fn analyze_metric(&mut self, cpu_percent: f64, timestamp: chrono::DateTime<chrono::Utc>) -> Option<AgentAlert> {
        let alert = self.cpu.check(cpu_percent, timestamp)?;
        if self.in_cooldown(&alert.rule_name, "system", timestamp) {
            return None;
        }
        self.mark_fired(&alert.rule_name, "system", timestamp);
        Some(alert)
    }

    pub fn analyze_command(&mut self, cmd: &CommandEvent) -> Option<AgentAlert> {
        let alert = command_rules::analyze_command(cmd)?;
        let key: String = cmd.command.chars().take(50).collect();
        let now = Utc::now();
        if self.in_cooldown(&alert.rule_name, &key, now) {
            return None;
        }
        self.mark_fired(&alert.rule_name, &key, now);
        Some(alert)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
