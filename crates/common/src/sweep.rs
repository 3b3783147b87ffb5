//! Crash recovery sweep
//!
//! A session that dies without running its cleanup leaves a tunnel process
//! and possibly a rule behind. Both carry the reserved prefix in their
//! names, so a later run can find them by name alone. This is a heuristic:
//! anything that happens to use the prefix is treated as ours.

use std::ffi::OsString;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::constants::RULE_NAME_PREFIX;
use crate::error::Result;
use crate::rules::{RuleManager, RuleStore};

/// What a sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rules_removed: Vec<String>,
    pub processes_killed: usize,
}

/// Remove leftover rules on the bucket, then leftover tunnel processes
pub async fn sweep<S: RuleStore>(rules: &RuleManager<S>, tunnel_command: &str) -> Result<SweepReport> {
    let rules_removed = rules.cleanup_rules().await?;
    let processes_killed = ProcessSweeper::new().sweep(tunnel_command);
    Ok(SweepReport {
        rules_removed,
        processes_killed,
    })
}

/// Whether a command line belongs to a tunnel started by this tool
pub fn is_orphan_tunnel<S: AsRef<str>>(cmdline: &[S], tunnel_command: &str) -> bool {
    match cmdline.split_first() {
        Some((program, args)) => {
            program.as_ref() == tunnel_command
                && args.iter().any(|a| a.as_ref().contains(RULE_NAME_PREFIX))
        }
        None => false,
    }
}

/// Kills leftover tunnel processes
pub struct ProcessSweeper {
    system: System,
}

impl Default for ProcessSweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSweeper {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Kill every process running `tunnel_command` with a session label; returns the count
    pub fn sweep(&mut self, tunnel_command: &str) -> usize {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(sysinfo::UpdateKind::Always),
        );

        let mut killed = 0;
        for (pid, process) in self.system.processes() {
            if process.thread_kind().is_some() {
                continue;
            }
            // Processes we may not inspect come back with an empty command line
            let cmdline: Vec<String> = process.cmd().iter().map(lossy).collect();
            if !is_orphan_tunnel(&cmdline, tunnel_command) {
                continue;
            }

            info!(
                "Killing process {} with command line \"{}\"",
                pid,
                cmdline.join(" ")
            );
            if process.kill() {
                killed += 1;
            } else {
                // Exited between listing and kill, or not ours to kill
                warn!("Could not kill process {}", pid);
            }
        }

        if killed == 0 {
            info!(
                "Could not find any processes with {} in the command line",
                RULE_NAME_PREFIX
            );
        } else {
            debug!("Killed {} processes", killed);
        }
        killed
    }
}

fn lossy(arg: &OsString) -> String {
    arg.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationRule, RuleSpec};
    use crate::rules::MemoryRuleStore;

    #[test]
    fn test_is_orphan_tunnel() {
        let cmd = [
            "cloudflared",
            "--no-autoupdate",
            "tunnel",
            "--url",
            "http://localhost:8080",
            "--label",
            "--autocreated-b2listen-2024-01-01-00-00-00-000000--",
        ];
        assert!(is_orphan_tunnel(&cmd, "cloudflared"));
        assert!(!is_orphan_tunnel(&cmd, "/usr/local/bin/cloudflared"));
    }

    #[test]
    fn test_is_orphan_tunnel_substring_match() {
        let cmd = ["cloudflared", "--label=--autocreated-b2listen-x--"];
        assert!(is_orphan_tunnel(&cmd, "cloudflared"));
    }

    #[test]
    fn test_is_orphan_tunnel_rejects_unlabelled() {
        let cmd = ["cloudflared", "tunnel", "--url", "http://localhost:8080"];
        assert!(!is_orphan_tunnel(&cmd, "cloudflared"));

        // Prefix in argv[0] alone does not count
        let cmd = ["--autocreated-b2listen-"];
        assert!(!is_orphan_tunnel(&cmd, "--autocreated-b2listen-"));

        let empty: [&str; 0] = [];
        assert!(!is_orphan_tunnel(&empty, "cloudflared"));
    }

    #[test]
    fn test_process_sweep_without_matches() {
        let mut sweeper = ProcessSweeper::new();
        assert_eq!(sweeper.sweep("b2listen-test-no-such-command"), 0);
    }

    #[tokio::test]
    async fn test_sweep_reports_rules() {
        let spec = RuleSpec::default();
        let store = MemoryRuleStore::new(vec![
            NotificationRule::new("--autocreated-b2listen-a--", "https://a.example.com", &spec),
            NotificationRule::new("mine", "https://b.example.com", &spec),
        ]);
        let manager = RuleManager::new(store);

        let report = sweep(&manager, "b2listen-test-no-such-command").await.unwrap();
        assert_eq!(report.rules_removed, vec!["--autocreated-b2listen-a--"]);
        assert_eq!(report.processes_killed, 0);
        assert_eq!(manager.store().rules().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_sweep_kills_labelled_process() {
        use std::os::unix::fs::PermissionsExt;

        // A uniquely named copy of `sh`, so no unrelated process matches
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("b2listen-fake-tunnel");
        std::fs::copy("/bin/sh", &exe).unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        let exe = exe.to_string_lossy().to_string();

        let mut child = tokio::process::Command::new(&exe)
            .arg("-c")
            .arg("while :; do sleep 1; done")
            .arg("--autocreated-b2listen-sweep-test--")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let killed = ProcessSweeper::new().sweep(&exe);
        assert_eq!(killed, 1);

        let status = tokio::time::timeout(std::time::Duration::from_secs(10), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }
}
