use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::models::CommandEvent;
use crate::rules::RuleEngine;
use crate::spool::Spool;

use super::{is_shutting_down, Collector, ShutdownFlag};

const SEEN_CAP: usize = 10_000;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

static ZSH_HISTORY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:\s*(\d+):(\d+);(.+)$").unwrap());

fn dedup_key(user: &str, timestamp: &DateTime<Utc>, command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(command.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct TrackedFile {
    path: PathBuf,
    username: String,
    shell: &'static str,
    offset: u64,
}

/// Tails per-user shell history files. First run fetches the server's last
/// sync timestamp (falling back to 180 days ago) and seeds file offsets at
/// EOF so old content is never replayed; after that it's pure tail-append.
pub struct CommandCollector {
    spool: Arc<Spool>,
    rules: Arc<tokio::sync::Mutex<RuleEngine>>,
    tracked: Vec<TrackedFile>,
    seen: VecDeque<String>,
    seen_set: HashSet<String>,
    last_sync: DateTime<Utc>,
    initialized: bool,
}

impl CommandCollector {
    pub fn new(spool: Arc<Spool>, rules: Arc<tokio::sync::Mutex<RuleEngine>>, last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            spool,
            rules,
            tracked: Vec::new(),
            seen: VecDeque::new(),
            seen_set: HashSet::new(),
            last_sync: last_sync.unwrap_or_else(|| Utc::now() - chrono::Duration::days(180)),
            initialized: false,
        }
    }

    fn discover_history_files(&mut self) {
        for home in system_user_homes() {
            for (file, shell) in [(".bash_history", "bash"), (".zsh_history", "zsh"), (".sh_history", "sh")] {
                let path = home.join(file);
                if path.exists() {
                    let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    let username = home.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
                    self.tracked.push(TrackedFile { path, username, shell, offset });
                }
            }
        }
    }

    fn remember(&mut self, key: String) -> bool {
        if self.seen_set.contains(&key) {
            return false;
        }
        self.seen_set.insert(key.clone());
        self.seen.push_back(key);
        if self.seen.len() > SEEN_CAP {
            let half = SEEN_CAP / 2;
            while self.seen.len() > half {
                if let Some(old) = self.seen.pop_front() {
                    self.seen_set.remove(&old);
                }
            }
        }
        true
    }

    async fn poll_once(&mut self) {
        if !self.initialized {
            self.discover_history_files();
            self.initialized = true;
        }

        let mut new_events = Vec::new();

        for tracked in &mut self.tracked {
            let Ok(metadata) = std::fs::metadata(&tracked.path) else { continue };
            let size = metadata.len();
            if size < tracked.offset {
                tracked.offset = 0;
            }
            if size == tracked.offset {
                continue;
            }

            let contents = match std::fs::read_to_string(&tracked.path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let bytes = contents.as_bytes();
            let start = (tracked.offset as usize).min(bytes.len());
            let new_content = String::from_utf8_lossy(&bytes[start..]).to_string();
            tracked.offset = size;

            for line in new_content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                let event = if tracked.shell == "zsh" {
                    parse_zsh_line(line, &tracked.username, &tracked.path, self.last_sync)
                } else {
                    parse_bash_line(line, &tracked.username, &tracked.path)
                };

                if let Some(event) = event {
                    new_events.push(event);
                }
            }
        }

        for event in new_events {
            let key = dedup_key(&event.user, &event.timestamp, &event.command);
            if !self.remember(key) {
                continue;
            }

            if let Err(e) = self.spool.write_command(&event) {
                log::error!("failed to write command to spool: {e}");
            }

            let mut rules = self.rules.lock().await;
            if let Some(alert) = rules.analyze_command(&event) {
                if let Err(e) = self.spool.write_alert(&alert) {
                    log::error!("failed to write command-rule alert to spool: {e}");
                }
            }
        }
    }
}

fn parse_zsh_line(line: &str, username: &str, source: &std::path::Path, last_sync: DateTime<Utc>) -> Option<CommandEvent> {
    let (timestamp, command) = match ZSH_HISTORY_RE.captures(line) {
        Some(caps) => {
            let secs: i64 = caps[1].parse().ok()?;
            (Utc.timestamp_opt(secs, 0).single()?, caps[3].to_string())
        }
        None => (Utc::now(), line.to_string()),
    };

    if timestamp <= last_sync {
        return None;
    }

    Some(CommandEvent {
        timestamp,
        user: username.to_string(),
        command: command.trim().to_string(),
        shell: "zsh".to_string(),
        source: source.to_string_lossy().to_string(),
        working_directory: None,
        exit_code: None,
    })
}

fn parse_bash_line(line: &str, username: &str, source: &std::path::Path) -> Option<CommandEvent> {
    // Bash history has no timestamps by default, so every new line is
    // collected regardless of last-sync — there's nothing to filter on.
    Some(CommandEvent {
        timestamp: Utc::now(),
        user: username.to_string(),
        command: line.trim().to_string(),
        shell: "bash".to_string(),
        source: source.to_string_lossy().to_string(),
        working_directory: None,
        exit_code: None,
    })
}

#[cfg(unix)]
fn system_user_homes() -> Vec<PathBuf> {
    let mut homes = Vec::new();
    if let Some(home) = dirs::home_dir() {
        homes.push(home);
    }
    homes
}

#[cfg(not(unix))]
fn system_user_homes() -> Vec<PathBuf> {
    dirs::home_dir().into_iter().collect()
}

impl Collector for CommandCollector {
    async fn start(&mut self, shutdown: ShutdownFlag) {
        while !is_shutting_down(&shutdown) {
            self.poll_once().await;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zsh_line_parses_timestamp_and_command() {
        let event = parse_zsh_line(": 1700000000:0;ls -la", "alice", std::path::Path::new("x"), Utc.timestamp_opt(0, 0).unwrap());
        let event = event.unwrap();
        assert_eq!(event.command, "ls -la");
        assert_eq!(event.shell, "zsh");
    }

    #[test]
    fn zsh_line_filtered_by_last_sync() {
        let last_sync = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let event = parse_zsh_line(": 1700000000:0;ls -la", "alice", std::path::Path::new("x"), last_sync);
        assert!(event.is_none());
    }

    #[test]
    fn dedup_key_is_stable_for_same_input() {
        let ts = Utc::now();
        assert_eq!(dedup_key("alice", &ts, "ls"), dedup_key("alice", &ts, "ls"));
        assert_ne!(dedup_key("alice", &ts, "ls"), dedup_key("bob", &ts, "ls"));
    }
}
