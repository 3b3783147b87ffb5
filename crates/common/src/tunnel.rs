//! cloudflared quick tunnel supervision
//!
//! cloudflared reports its public URL and its connection registrations on
//! stderr. A supervisor task reads that stream line by line, hands the URL
//! over through a one-shot channel, and kills the process when it is
//! cancelled or when the stream ends.

use std::process::{ExitStatus, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ListenError, Result};

/// `2024-01-01T00:00:00Z INF |  https://abc.trycloudflare.com  |`
static URL_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z\sINF\s\|\s+(https://[a-z0-9.\-]+)\s+\|$")
        .unwrap()
});

/// `2024-01-01T00:00:00Z INF Registered tunnel connection connIndex=0 ...`
static REGISTERED_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z\sINF\s(Registered tunnel connection .+)$")
        .unwrap()
});

/// How to launch the tunnel
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Executable, normally "cloudflared"
    pub command: String,

    /// cloudflared's own log level
    pub log_level: String,

    /// Local service the tunnel forwards to
    pub service_url: String,

    /// Session label, findable later in the process list
    pub label: String,
}

impl TunnelConfig {
    pub fn args(&self) -> Vec<String> {
        vec![
            "--no-autoupdate".to_string(),
            "tunnel".to_string(),
            "--url".to_string(),
            self.service_url.clone(),
            "--loglevel".to_string(),
            self.log_level.clone(),
            "--label".to_string(),
            self.label.clone(),
        ]
    }
}

/// What a line of cloudflared output means to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelLine {
    /// First report of the public URL
    Url(String),
    /// A connection registration after the URL was seen
    Registered(String),
    Other,
}

/// Classifies cloudflared output, reporting the URL at most once
#[derive(Debug, Default)]
pub struct OutputParser {
    url_found: bool,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> TunnelLine {
        let line = line.trim();
        if !self.url_found {
            if let Some(caps) = URL_LINE_REGEX.captures(line) {
                self.url_found = true;
                return TunnelLine::Url(caps[1].to_string());
            }
        } else if let Some(caps) = REGISTERED_LINE_REGEX.captures(line) {
            return TunnelLine::Registered(caps[1].to_string());
        }
        TunnelLine::Other
    }

    pub fn url_found(&self) -> bool {
        self.url_found
    }
}

/// A running tunnel process and its supervisor
pub struct Tunnel {
    pid: Option<u32>,
    service_url: String,
    public_url: Option<String>,
    url_rx: Option<oneshot::Receiver<String>>,
    cancel: CancellationToken,
    task: JoinHandle<Option<ExitStatus>>,
}

impl Tunnel {
    /// Launch the tunnel; cancelling `cancel` kills it
    pub fn spawn(config: &TunnelConfig, cancel: CancellationToken) -> Result<Self> {
        info!("Starting {} for {}", config.command, config.service_url);

        let mut child = Command::new(&config.command)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ListenError::TunnelSpawn(format!("{}: {}", config.command, e)))?;

        let pid = child.id();
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ListenError::TunnelSpawn("stderr was not captured".to_string()))?;

        let (url_tx, url_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            child,
            stderr,
            config.service_url.clone(),
            url_tx,
            cancel.clone(),
        ));

        Ok(Self {
            pid,
            service_url: config.service_url.clone(),
            public_url: None,
            url_rx: Some(url_rx),
            cancel,
            task,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Wait for the public URL
    ///
    /// Returns `None` if the process ended before reporting one. Once
    /// known, the URL never changes.
    pub async fn url(&mut self) -> Option<String> {
        if let Some(url) = &self.public_url {
            return Some(url.clone());
        }
        let rx = self.url_rx.take()?;
        let url = rx.await.ok()?;
        self.public_url = Some(url.clone());
        Some(url)
    }

    /// Ask the supervisor to kill the process
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the process has been killed and reaped
    pub async fn wait(self) -> Option<ExitStatus> {
        match self.task.await {
            Ok(status) => status,
            Err(e) => {
                warn!("Tunnel supervisor failed: {}", e);
                None
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    stderr: ChildStderr,
    service_url: String,
    url_tx: oneshot::Sender<String>,
    cancel: CancellationToken,
) -> Option<ExitStatus> {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut parser = OutputParser::new();
    let mut url_tx = Some(url_tx);

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Tunnel stop requested");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("cloudflared closed its output");
                break;
            }
            Ok(_) => {
                // cloudflared output is not guaranteed to be UTF-8
                let line = String::from_utf8_lossy(&buf);
                match parser.feed(&line) {
                    TunnelLine::Url(url) => {
                        info!("Tunnel URL: {}", url);
                        if let Some(tx) = url_tx.take() {
                            let _ = tx.send(url);
                        }
                    }
                    TunnelLine::Registered(message) => {
                        info!("{}", message);
                        info!("Ready to deliver events to {}", service_url);
                    }
                    TunnelLine::Other => debug!("{}", line.trim()),
                }
            }
            Err(e) => {
                warn!("Failed to read cloudflared output: {}", e);
                break;
            }
        }
    }

    info!("Stopping cloudflared");
    if let Err(e) = child.kill().await {
        debug!("Kill failed, process already gone: {}", e);
    }
    match child.wait().await {
        Ok(status) => {
            debug!("cloudflared exited with {}", status);
            Some(status)
        }
        Err(e) => {
            warn!("Could not reap cloudflared: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_LINE: &str =
        "2024-05-01T12:34:56Z INF |  https://abc123.example.com                                  |";
    const REGISTERED_LINE: &str = "2024-05-01T12:34:57Z INF Registered tunnel connection connIndex=0 connection=8a1f event=0 ip=198.41.200.13 location=lhr01 protocol=quic";

    #[test]
    fn test_args() {
        let config = TunnelConfig {
            command: "cloudflared".to_string(),
            log_level: "info".to_string(),
            service_url: "http://localhost:8080".to_string(),
            label: "--autocreated-b2listen-x--".to_string(),
        };
        assert_eq!(
            config.args(),
            vec![
                "--no-autoupdate",
                "tunnel",
                "--url",
                "http://localhost:8080",
                "--loglevel",
                "info",
                "--label",
                "--autocreated-b2listen-x--"
            ]
        );
    }

    #[test]
    fn test_parse_url_line() {
        let mut parser = OutputParser::new();
        assert_eq!(
            parser.feed(URL_LINE),
            TunnelLine::Url("https://abc123.example.com".to_string())
        );
        assert!(parser.url_found());
    }

    #[test]
    fn test_url_reported_once() {
        let mut parser = OutputParser::new();
        assert!(matches!(parser.feed(URL_LINE), TunnelLine::Url(_)));
        assert_eq!(parser.feed(URL_LINE), TunnelLine::Other);
    }

    #[test]
    fn test_registration_ignored_before_url() {
        let mut parser = OutputParser::new();
        assert_eq!(parser.feed(REGISTERED_LINE), TunnelLine::Other);
        parser.feed(URL_LINE);
        match parser.feed(REGISTERED_LINE) {
            TunnelLine::Registered(msg) => {
                assert!(msg.starts_with("Registered tunnel connection connIndex=0"))
            }
            other => panic!("Expected Registered, got {:?}", other),
        }
    }

    #[test]
    fn test_other_lines() {
        let mut parser = OutputParser::new();
        for line in [
            "",
            "2024-05-01T12:34:56Z INF Requesting new quick Tunnel on trycloudflare.com...",
            "2024-05-01T12:34:56Z INF +----------------------------------------------+",
            "2024-05-01T12:34:56Z ERR |  https://abc123.example.com  |",
            "INF |  https://abc123.example.com  |",
            "2024-05-01T12:34:56Z INF |  http://abc123.example.com  |",
        ] {
            assert_eq!(parser.feed(line), TunnelLine::Other, "line: {:?}", line);
        }
        assert!(!parser.url_found());
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        let mut parser = OutputParser::new();
        assert!(matches!(
            parser.feed(&format!("{}\r\n", URL_LINE)),
            TunnelLine::Url(_)
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = TunnelConfig {
            command: "/nonexistent/b2listen-test/cloudflared".to_string(),
            log_level: "info".to_string(),
            service_url: "http://localhost:8080".to_string(),
            label: "label".to_string(),
        };
        let err = Tunnel::spawn(&config, CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, ListenError::TunnelSpawn(_)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        fn fake_cloudflared(dir: &tempfile::TempDir, body: &str) -> String {
            let path = dir.path().join("cloudflared");
            {
                let mut file = std::fs::File::create(&path).unwrap();
                writeln!(file, "#!/bin/sh").unwrap();
                file.write_all(body.as_bytes()).unwrap();
                file.sync_all().unwrap();
            }
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        fn config(command: String) -> TunnelConfig {
            TunnelConfig {
                command,
                log_level: "info".to_string(),
                service_url: "http://localhost:8080".to_string(),
                label: "--autocreated-b2listen-test--".to_string(),
            }
        }

        #[tokio::test]
        async fn test_discovers_url_and_stops() {
            let dir = tempfile::tempdir().unwrap();
            let script = format!(
                "echo 'starting' >&2\necho '{URL_LINE}' >&2\necho '{REGISTERED_LINE}' >&2\n\
                 echo '2024-05-01T12:35:00Z INF |  https://second.example.com  |' >&2\nexec sleep 60\n"
            );
            let cancel = CancellationToken::new();
            let mut tunnel = Tunnel::spawn(&config(fake_cloudflared(&dir, &script)), cancel).unwrap();
            assert!(tunnel.pid().is_some());
            assert_eq!(tunnel.service_url(), "http://localhost:8080");

            let url = tokio::time::timeout(Duration::from_secs(10), tunnel.url())
                .await
                .unwrap();
            assert_eq!(url.as_deref(), Some("https://abc123.example.com"));
            // Write-once: later lines never replace it
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(
                tunnel.url().await.as_deref(),
                Some("https://abc123.example.com")
            );

            tunnel.stop();
            let status = tokio::time::timeout(Duration::from_secs(10), tunnel.wait())
                .await
                .unwrap();
            assert!(status.is_some());
            assert!(!status.unwrap().success());
        }

        #[tokio::test]
        async fn test_non_utf8_output_is_not_fatal() {
            let dir = tempfile::tempdir().unwrap();
            let script = format!(
                "echo '{URL_LINE}' >&2\nprintf 'DBG bad \\377\\376 bytes\\n' >&2\n\
                 echo 'still talking' >&2\nexec sleep 60\n"
            );
            let mut tunnel =
                Tunnel::spawn(&config(fake_cloudflared(&dir, &script)), CancellationToken::new())
                    .unwrap();

            let url = tokio::time::timeout(Duration::from_secs(10), tunnel.url())
                .await
                .unwrap();
            assert_eq!(url.as_deref(), Some("https://abc123.example.com"));

            // The bad line must not end supervision
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(!tunnel.task.is_finished());

            tunnel.stop();
            let status = tokio::time::timeout(Duration::from_secs(10), tunnel.wait())
                .await
                .unwrap();
            assert!(status.is_some());
        }

        #[tokio::test]
        async fn test_exit_without_url() {
            let dir = tempfile::tempdir().unwrap();
            let script = "echo 'failed to connect' >&2\nexit 3\n";
            let mut tunnel =
                Tunnel::spawn(&config(fake_cloudflared(&dir, script)), CancellationToken::new())
                    .unwrap();

            let url = tokio::time::timeout(Duration::from_secs(10), tunnel.url())
                .await
                .unwrap();
            assert!(url.is_none());

            let status = tokio::time::timeout(Duration::from_secs(10), tunnel.wait())
                .await
                .unwrap();
            assert!(status.is_some());
        }

        #[tokio::test]
        async fn test_passes_label_on_command_line() {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("args");
            let script = format!(
                "echo \"$@\" > '{}'\necho '{URL_LINE}' >&2\nexec sleep 60\n",
                out.display()
            );
            let mut tunnel =
                Tunnel::spawn(&config(fake_cloudflared(&dir, &script)), CancellationToken::new())
                    .unwrap();
            tunnel.url().await.unwrap();

            let args = std::fs::read_to_string(&out).unwrap();
            assert!(args.contains("--label --autocreated-b2listen-test--"));
            assert!(args.starts_with("--no-autoupdate tunnel --url http://localhost:8080"));

            tunnel.stop();
            tunnel.wait().await;
        }
    }
}
