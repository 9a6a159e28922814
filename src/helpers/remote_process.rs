use crate::bridge::BridgeError;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use log::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_ATTEMPTS: u32 = 60;
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// The host application that embeds the remote client
///
/// Detection and launching use blocking process calls and always run on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct RemoteProcess {
    process_name: String,
    executable: Option<PathBuf>,
    launch: bool,
    poll_interval: Duration,
    launch_timeout: Duration,
    settle_delay: Duration,
}

impl RemoteProcess {
    pub fn new(process_name: &str, executable: Option<PathBuf>, launch: bool) -> Self {
        Self {
            process_name: process_name.to_string(),
            executable,
            launch,
            poll_interval: POLL_INTERVAL,
            launch_timeout: LAUNCH_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the wait timings (tests and slow machines)
    pub fn with_timings(mut self, poll_interval: Duration, launch_timeout: Duration, settle_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.launch_timeout = launch_timeout;
        self.settle_delay = settle_delay;
        self
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Check whether the application is running (blocking)
    pub fn is_running_blocking(&self) -> bool {
        let output = if cfg!(windows) {
            Command::new("tasklist")
                .args(["/FI", &format!("IMAGENAME eq {}", self.process_name), "/NH"])
                .stderr(Stdio::null())
                .output()
        } else {
            Command::new("pgrep")
                .args(["-x", &self.process_name])
                .stderr(Stdio::null())
                .output()
        };

        match output {
            Ok(output) if cfg!(windows) => {
                let listing = String::from_utf8_lossy(&output.stdout).to_lowercase();
                listing.contains(&self.process_name.to_lowercase())
            }
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("Error checking for process {}: {}", self.process_name, e);
                false
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        let probe = self.clone();
        tokio::task::spawn_blocking(move || probe.is_running_blocking())
            .await
            .unwrap_or(false)
    }

    fn launch_blocking(&self) -> Result<(), BridgeError> {
        let executable = self.executable.as_ref().ok_or_else(|| {
            BridgeError::RemoteProcessUnavailable("no executable configured".to_string())
        })?;
        Command::new(executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| BridgeError::RemoteProcessUnavailable(format!("failed to launch {}: {}", executable.display(), e)))
    }

    /// Make sure the application is running, launching it if allowed
    ///
    /// After a launch the process is polled until it shows up, bounded both
    /// by attempt count and by an overall timeout, then given time to settle.
    pub async fn ensure_running(&self) -> Result<(), BridgeError> {
        if self.is_running().await {
            debug!("{} is already running", self.process_name);
            return Ok(());
        }

        if !self.launch {
            return Err(BridgeError::RemoteProcessUnavailable(format!(
                "{} is not running and launching is disabled",
                self.process_name
            )));
        }

        info!("{} is not running, starting it", self.process_name);
        let launcher = self.clone();
        tokio::task::spawn_blocking(move || launcher.launch_blocking())
            .await
            .map_err(|e| BridgeError::RemoteProcessUnavailable(e.to_string()))??;

        let wait = async {
            let mut attempts = 0;
            while !self.is_running().await {
                attempts += 1;
                if attempts > MAX_ATTEMPTS {
                    return Err(BridgeError::RemoteProcessUnavailable(format!(
                        "{} did not start after {} attempts",
                        self.process_name, MAX_ATTEMPTS
                    )));
                }
                debug!("Waiting for {}... attempt {}", self.process_name, attempts);
                tokio::time::sleep(self.poll_interval).await;
            }
            Ok(())
        };

        match tokio::time::timeout(self.launch_timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                error!("{} did not start within {:?}", self.process_name, self.launch_timeout);
                return Err(BridgeError::RemoteProcessUnavailable(format!(
                    "{} did not start within {} s",
                    self.process_name,
                    self.launch_timeout.as_secs()
                )));
            }
        }

        tokio::time::sleep(self.settle_delay).await;
        info!("{} has started", self.process_name);
        Ok(())
    }
}
