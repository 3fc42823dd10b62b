use regex::{Regex, RegexBuilder};
use serde_json::json;
use std::sync::LazyLock;

use crate::models::{AgentAlert, Severity};

type CommandCheck = fn(&str) -> Option<(String, Severity, serde_json::Value)>;

struct Category {
    name: &'static str,
    severity: Severity,
    reason: &'static str,
    patterns: &'static [&'static str],
}

const DANGEROUS_COMMANDS: &[Category] = &[
    Category {
        name: "data_destruction",
        severity: Severity::Critical,
        reason: "Command can destroy data or system files",
        patterns: &[r"\brm\s+-rf\s+/", r"\bdd\s+if=", r"\bmkfs\.", r"\bshred\b", r":\(\)\{.*:\|:&\};:"],
    },
    Category {
        name: "privilege_escalation",
        severity: Severity::High,
        reason: "Attempt to gain elevated privileges",
        patterns: &[r"\bsudo\s+", r"\bsu\s+", r"\bsudo\s+-i", r"\bsudo\s+su", r"chmod\s+[u+]?s\b"],
    },
    Category {
        name: "network_recon",
        severity: Severity::Medium,
        reason: "Network reconnaissance or scanning activity",
        patterns: &[r"\bnmap\b", r"\bnc\s+-l", r"\bnetcat\b", r"\bmasscan\b", r"\bping\s+-c\s+\d+"],
    },
    Category {
        name: "data_exfiltration",
        severity: Severity::Critical,
        reason: "Potential data theft to external system",
        patterns: &[r"\bscp\s+.*@\d+\.\d+", r"\brsync\s+.*@", r"\bcurl\s+.*-F", r"\bwget\s+.*-O-\s+\|", r"\bbase64\b.*\|.*curl"],
    },
    Category {
        name: "reverse_shell",
        severity: Severity::Critical,
        reason: "Reverse shell or remote access attempt",
        patterns: &[r"bash\s+-i\s+>&\s+/dev/tcp/", r"nc.*-e\s+/bin/[bs]h", r"python.*socket.*connect", r"perl.*Socket.*connect", r"/bin/sh.*0>&1"],
    },
    Category {
        name: "crypto_mining",
        severity: Severity::High,
        reason: "Unauthorized cryptocurrency mining",
        patterns: &[r"\bxmrig\b", r"\bminerd\b", r"\bcpuminer\b", r"\bccminer\b", r"stratum\+tcp://"],
    },
    Category {
        name: "persistence",
        severity: Severity::High,
        reason: "Attempt to establish persistence on system",
        patterns: &[r"crontab\s+-e", r"at\s+now\s+\+", r"systemctl\s+(enable|start)", r"\.bashrc", r"\.bash_profile", r"authorized_keys"],
    },
    Category {
        name: "credential_access",
        severity: Severity::Critical,
        reason: "Accessing credential files or clearing audit trail",
        patterns: &[r"/etc/shadow", r"/etc/passwd", r"\.ssh/id_rsa", r"\.aws/credentials", r"\.docker/config\.json", r"history\s+-c"],
    },
];

const SUSPICIOUS_ARGS: &[&str] = &[r"--no-check-certificate", r"-k\b", r"--insecure", r"/dev/null\s+2>&1", r"&\s*$"];

const OBFUSCATION_PATTERNS: &[&str] = &[
    r"\\x[0-9a-f]{2}",
    r"\$\([^)]{50,}\)",
    r"eval\s+",
    r"base64\s+-d",
    r"\$\{.*:.*:.*\}",
];

const MASS_FILE_PATTERNS: &[&str] = &[r"find\s+.*-exec\s+.*\{\}", r"for.*in.*\*.*do", r"xargs\s+"];
const MASS_FILE_OPS: &[&str] = &["rm", "mv", "chmod", "chown", "encrypt", "openssl"];

fn case_insensitive_regex(pattern: &str) -> Regex {
    RegexBuilder::new(pattern).case_insensitive(true).build().unwrap()
}

static DANGEROUS_RE: LazyLock<Vec<(&'static Category, Vec<Regex>)>> = LazyLock::new(|| {
    DANGEROUS_COMMANDS
        .iter()
        .map(|c| (c, c.patterns.iter().map(|p| case_insensitive_regex(p)).collect()))
        .collect()
});
static SUSPICIOUS_ARGS_RE: LazyLock<Vec<Regex>> =
    LazyLock::new(|| SUSPICIOUS_ARGS.iter().map(|p| Regex::new(p).unwrap()).collect());
static OBFUSCATION_RE: LazyLock<Vec<Regex>> =
    LazyLock::new(|| OBFUSCATION_PATTERNS.iter().map(|p| case_insensitive_regex(p)).collect());
static MASS_FILE_RE: LazyLock<Vec<Regex>> =
    LazyLock::new(|| MASS_FILE_PATTERNS.iter().map(|p| Regex::new(p).unwrap()).collect());

fn check_dangerous_command(command: &str) -> Option<(String, Severity, serde_json::Value)> {
    for (cat, patterns) in DANGEROUS_RE.iter() {
        for re in patterns {
            if re.is_match(command) {
                return Some((
                    format!("Dangerous Command Detected: {}", title_case(cat.name)),
                    cat.severity,
                    json!({ "command": command, "category": cat.name, "pattern_matched": re.as_str(), "reason": cat.reason }),
                ));
            }
        }
    }
    None
}

fn check_suspicious_arguments(command: &str) -> Option<(String, Severity, serde_json::Value)> {
    for (pattern, re) in SUSPICIOUS_ARGS.iter().zip(SUSPICIOUS_ARGS_RE.iter()) {
        if re.is_match(command) {
            return Some((
                "Suspicious Command Arguments".to_string(),
                Severity::Medium,
                json!({ "command": command, "suspicious_arg": pattern, "reason": "Command uses potentially malicious arguments" }),
            ));
        }
    }
    None
}

fn check_obfuscation(command: &str) -> Option<(String, Severity, serde_json::Value)> {
    for (pattern, re) in OBFUSCATION_PATTERNS.iter().zip(OBFUSCATION_RE.iter()) {
        if re.is_match(command) {
            return Some((
                "Obfuscated Command Detected".to_string(),
                Severity::High,
                json!({ "command": command, "obfuscation_type": pattern, "reason": "Command uses obfuscation to hide intent" }),
            ));
        }
    }
    None
}

fn check_mass_file_operation(command: &str) -> Option<(String, Severity, serde_json::Value)> {
    let lower = command.to_lowercase();
    for re in MASS_FILE_RE.iter() {
        if re.is_match(command) {
            for op in MASS_FILE_OPS {
                if lower.contains(op) {
                    return Some((
                        "Mass File Operation Detected".to_string(),
                        Severity::High,
                        json!({ "command": command, "operation": op, "reason": "Command performs operations on multiple files (potential ransomware)" }),
                    ));
                }
            }
        }
    }
    None
}

fn title_case(s: &str) -> String {
    s.split('_')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First matching check wins: dangerous command, suspicious args,
/// obfuscation, then mass-file-operation.
pub fn analyze_command(cmd: &crate::models::CommandEvent) -> Option<AgentAlert> {
    if cmd.command.is_empty() {
        return None;
    }

    let checks: [CommandCheck; 4] = [
        check_dangerous_command,
        check_suspicious_arguments,
        check_obfuscation,
        check_mass_file_operation,
    ];

    for check in checks {
        if let Some((rule_name, severity, mut details)) = check(&cmd.command) {
            if let Some(obj) = details.as_object_mut() {
                obj.insert("user".into(), json!(cmd.user));
                obj.insert("timestamp".into(), json!(cmd.timestamp));
                obj.insert("shell".into(), json!(cmd.shell));
                obj.insert("working_directory".into(), json!(cmd.working_directory));
            }
            return Some(AgentAlert {
                rule_name,
                severity,
                details,
                timestamp: chrono::Utc::now(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommandEvent;

    fn cmd(command: &str) -> CommandEvent {
        CommandEvent {
            timestamp: chrono::Utc::now(),
            user: "alice".to_string(),
            command: command.to_string(),
            shell: "bash".to_string(),
            source: "test".to_string(),
            working_directory: None,
            exit_code: None,
        }
    }

    #[test]
    fn dangerous_command_matches_regardless_of_case() {
        assert!(analyze_command(&cmd("RM -RF /")).is_some());
        assert!(analyze_command(&cmd("DD IF=/dev/zero of=/dev/sda")).is_some());
    }

    #[test]
    fn obfuscation_matches_regardless_of_case() {
        assert!(analyze_command(&cmd("EVAL $(echo aGVsbG8= | BASE64 -D)")).is_some());
    }

    #[test]
    fn suspicious_args_stay_case_sensitive() {
        assert!(check_suspicious_arguments("curl --insecure https://example.com").is_some());
        assert!(check_suspicious_arguments("curl --INSECURE https://example.com").is_none());
    }
}
