use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};

use crate::models::MetricSample;
use crate::rules::RuleEngine;
use crate::spool::Spool;

use super::{is_shutting_down, Collector, ShutdownFlag};

/// Samples every `interval` (default 60s).
pub struct MetricsCollector {
    spool: Arc<Spool>,
    rules: Arc<tokio::sync::Mutex<RuleEngine>>,
    interval: Duration,
    system: System,
}

impl MetricsCollector {
    pub fn new(spool: Arc<Spool>, rules: Arc<tokio::sync::Mutex<RuleEngine>>, interval: Duration) -> Self {
        Self {
            spool,
            rules,
            interval,
            system: System::new_all(),
        }
    }

    /// Returns the sample along with the overall CPU percent the rule
    /// engine needs for the sustained-spike detector.
    fn sample(&mut self) -> (MetricSample, f64) {
        self.system.refresh_cpu();
        std::thread::sleep(Duration::from_millis(200));
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_disks_list();
        self.system.refresh_disks();
        self.system.refresh_networks_list();
        self.system.refresh_networks();

        let cpu_percent: f32 =
            self.system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / self.system.cpus().len().max(1) as f32;

        let cpu = json!({
            "cpu_percent": cpu_percent,
            "cpu_count": self.system.cpus().len(),
            "load_avg": [self.system.load_average().one, self.system.load_average().five, self.system.load_average().fifteen],
        });
        let memory = json!({
            "memory_total": self.system.total_memory(),
            "memory_available": self.system.available_memory(),
            "memory_percent": if self.system.total_memory() > 0 {
                self.system.used_memory() as f64 / self.system.total_memory() as f64 * 100.0
            } else { 0.0 },
            "swap_total": self.system.total_swap(),
            "swap_used": self.system.used_swap(),
        });
        let (disk_total, disk_used) = self
            .system
            .disks()
            .iter()
            .map(|d| (d.total_space(), d.total_space() - d.available_space()))
            .fold((0u64, 0u64), |(t, u), (dt, du)| (t + dt, u + du));
        let disk = json!({
            "disk_total": disk_total,
            "disk_used": disk_used,
            "disk_percent": if disk_total > 0 { disk_used as f64 / disk_total as f64 * 100.0 } else { 0.0 },
        });
        let (rx, tx): (u64, u64) = self
            .system
            .networks()
            .iter()
            .map(|(_, n)| (n.total_received(), n.total_transmitted()))
            .fold((0, 0), |(r, t), (nr, nt)| (r + nr, t + nt));
        let network = json!({ "net_bytes_recv": rx, "net_bytes_sent": tx });
        let process = json!({ "process_count": self.system.processes().len() });

        let sample = MetricSample {
            agent_id: uuid::Uuid::nil(),
            timestamp: chrono::Utc::now(),
            cpu,
            memory,
            disk,
            network,
            process,
        };
        (sample, cpu_percent as f64)
    }
}

impl Collector for MetricsCollector {
    async fn start(&mut self, shutdown: ShutdownFlag) {
        while !is_shutting_down(&shutdown) {
            let (sample, cpu_percent) = self.sample();
            let timestamp = sample.timestamp;

            if let Err(e) = self.spool.write_metric(&sample) {
                log::error!("failed to write metric to spool: {e}");
            }

            let mut rules = self.rules.lock().await;
            if let Some(alert) = rules.analyze_metric(cpu_percent, timestamp) {
                if let Err(e) = self.spool.write_alert(&alert) {
                    log::error!("failed to write metric-rule alert to spool: {e}");
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
