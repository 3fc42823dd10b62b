use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{AgentAlert, Severity};

const WINDOW_SECS: i64 = 120;
const THRESHOLD: f64 = 90.0;
const RING_LEN: usize = 20;
const MIN_SAMPLES: usize = 3;

pub struct CpuSpikeDetector {
    history: VecDeque<(DateTime<Utc>, f64)>,
}

impl CpuSpikeDetector {
    pub fn new() -> Self {
        Self { history: VecDeque::new() }
    }

    pub fn check(&mut self, cpu_percent: f64, timestamp: DateTime<Utc>) -> Option<AgentAlert> {
        self.history.push_back((timestamp, cpu_percent));
        while self.history.len() > RING_LEN {
            self.history.pop_front();
        }
        let cutoff = timestamp - chrono::Duration::seconds(WINDOW_SECS);
        while self.history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.history.pop_front();
        }

        if self.history.len() < MIN_SAMPLES {
            return None;
        }
        if !self.history.iter().all(|(_, cpu)| *cpu >= THRESHOLD) {
            return None;
        }

        let avg: f64 = self.history.iter().map(|(_, c)| c).sum::<f64>() / self.history.len() as f64;
        let duration = (timestamp - self.history.front().unwrap().0).num_seconds();

        Some(AgentAlert {
            rule_name: "Agent: Sustained High CPU Usage".to_string(),
            severity: Severity::Medium,
            details: json!({
                "average_cpu": (avg * 100.0).round() / 100.0,
                "threshold": THRESHOLD,
                "duration_seconds": duration,
                "sample_count": self.history.len(),
            }),
            timestamp,
        })
    }
}

impl Default for CpuSpikeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_when_all_samples_exceed_threshold() {
        let mut det = CpuSpikeDetector::new();
        let now = Utc::now();
        assert!(det.check(95.0, now).is_none());
        assert!(det.check(96.0, now).is_none());
        let alert = det.check(97.0, now).expect("third high sample should fire");
        assert_eq!(alert.rule_name, "Agent: Sustained High CPU Usage");
    }

    #[test]
    fn does_not_fire_when_one_sample_is_low() {
        let mut det = CpuSpikeDetector::new();
        let now = Utc::now();
        det.check(95.0, now);
        det.check(50.0, now);
        assert!(det.check(96.0, now).is_none());
    }
}
