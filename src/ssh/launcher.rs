//! Session launcher
//!
//! Turns a [`ConnectionProfile`] into the command text for one interactive
//! SSH session:
//! 1. Validates the profile
//! 2. Sends a plain invocation when there is no secret to type
//! 3. Otherwise probes for an automation strategy, renders and stages the
//!    script, and sends the line that runs it
//! 4. Schedules deletion of the staged files
//!
//! Anything that goes wrong before the session is handed over is reported
//! once through the [`LaunchObserver`]; remote authentication is not
//! observable from here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::invocation::SshInvocation;
use super::profile::ConnectionProfile;
use super::script::{AutomationScript, ScriptBuilder, DEFAULT_PROMPT_TIMEOUT};
use super::sink::InteractiveCommandSink;
use super::staging::{
    discard, remove_artifact, schedule_cleanup, ArtifactHandle, ArtifactKind, SecretStaging,
    StagingSession,
};
use super::strategy::{select_strategy, PlatformFamily, PlatformStrategy, ToolProbe};
use crate::error::Result;

/// Default delay before staged files are deleted
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(10);

/// Per-run launcher knobs
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Platform the session runs on
    pub platform: PlatformFamily,

    /// Upper bound for the scripted prompt exchange
    pub prompt_timeout: Duration,

    /// How long staged files live after the command is sent
    pub cleanup_delay: Duration,

    /// Where staged files are written
    pub temp_dir: PathBuf,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            platform: PlatformFamily::current(),
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Who the session was opened for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    pub username: String,
    pub host: String,
    pub strategy: Option<PlatformStrategy>,
}

/// Why a secret could not be automated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No helper tool installed; the user types the secret
    NoAutomationTool,
    /// No automation exists for this platform; the secret is shown instead
    UnknownPlatform,
    /// The script could not be written
    StagingFailed(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoAutomationTool => {
                f.write_str("no password automation tool found")
            }
            FallbackReason::UnknownPlatform => {
                f.write_str("no automation available on this platform")
            }
            FallbackReason::StagingFailed(e) => {
                write!(f, "automation script could not be staged ({})", e)
            }
        }
    }
}

/// Notice that the session falls back to a plain invocation
#[derive(Clone)]
pub struct PlainFallbackNotice {
    pub profile_name: String,
    pub reason: FallbackReason,

    /// Secret to show the user; set only for [`FallbackReason::UnknownPlatform`]
    pub secret: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for PlainFallbackNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainFallbackNotice")
            .field("profile_name", &self.profile_name)
            .field("reason", &self.reason)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Receives launch outcomes
pub trait LaunchObserver: Send + Sync {
    /// The session was handed to the sink
    fn connected(&self, summary: &SessionSummary);

    /// Nothing was handed over
    fn failed(&self, reason: &str);

    /// The session runs without credential automation
    fn plain_fallback(&self, notice: &PlainFallbackNotice);
}

/// Prints outcomes to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl LaunchObserver for ConsoleObserver {
    fn connected(&self, summary: &SessionSummary) {
        eprintln!(
            "Connecting to {} ({}@{})...",
            summary.name, summary.username, summary.host
        );
    }

    fn failed(&self, reason: &str) {
        eprintln!("Connection failed: {}", reason);
    }

    fn plain_fallback(&self, notice: &PlainFallbackNotice) {
        match notice.secret {
            Some(ref secret) => eprintln!(
                "Plain fallback for {} ({}). Secret: {}",
                notice.profile_name,
                notice.reason,
                secret.as_str()
            ),
            None => eprintln!(
                "Plain fallback for {} ({}). Enter the secret when prompted.",
                notice.profile_name, notice.reason
            ),
        }
    }
}

/// Result of one `connect` call
#[derive(Debug, Default)]
pub struct LaunchReport {
    /// Strategy used when a secret had to be supplied
    pub strategy: Option<PlatformStrategy>,

    /// Set when a secret was present but not automated
    pub fallback: Option<FallbackReason>,

    /// Staged files, in staging order
    pub artifacts: Vec<PathBuf>,

    /// Lines handed to the sink
    pub commands: Vec<String>,

    /// Detached deletion tasks
    pub cleanup: Vec<JoinHandle<()>>,
}

impl LaunchReport {
    /// True when the secret is fed by a staged script
    pub fn is_automated(&self) -> bool {
        !self.artifacts.is_empty()
    }

    /// Wait for scheduled deletions, e.g. before the process exits
    pub async fn wait_for_cleanup(&mut self) {
        for task in self.cleanup.drain(..) {
            if let Err(e) = task.await {
                debug!("Cleanup task did not finish: {}", e);
            }
        }
    }

    /// Delete the staged files now instead of after the delay, e.g. when the
    /// session never started or was interrupted.
    pub async fn discard_artifacts(&mut self) {
        for task in self.cleanup.drain(..) {
            task.abort();
        }
        for path in &self.artifacts {
            remove_artifact(path).await;
        }
    }
}

/// Launches one interactive SSH session per `connect` call
pub struct SessionLauncher {
    settings: LaunchSettings,
    staging: SecretStaging,
    builder: ScriptBuilder,
    probe: Arc<dyn ToolProbe>,
    observer: Arc<dyn LaunchObserver>,
}

impl SessionLauncher {
    pub fn new(
        settings: LaunchSettings,
        probe: Arc<dyn ToolProbe>,
        observer: Arc<dyn LaunchObserver>,
    ) -> Self {
        Self {
            staging: SecretStaging::new(settings.temp_dir.clone()),
            builder: ScriptBuilder::new(settings.prompt_timeout),
            settings,
            probe,
            observer,
        }
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Open one session for `profile` through `sink`.
    ///
    /// Invalid profiles are rejected before anything is sent. Staging
    /// failures fall back to a plain invocation. Sink failures are returned
    /// after any staged files have been removed.
    pub async fn connect(
        &self,
        profile: &ConnectionProfile,
        sink: &mut dyn InteractiveCommandSink,
    ) -> Result<LaunchReport> {
        if let Err(e) = profile.validate() {
            warn!("Refusing to connect: {}", e);
            self.observer.failed(&e.to_string());
            return Err(e);
        }

        info!(
            "Connecting to {} ({}@{}:{}) on {}",
            profile.name, profile.username, profile.host, profile.port, self.settings.platform
        );

        match self.launch(profile, sink).await {
            Ok(report) => {
                self.observer.connected(&SessionSummary {
                    name: profile.name.clone(),
                    username: profile.username.clone(),
                    host: profile.host.clone(),
                    strategy: report.strategy,
                });
                Ok(report)
            }
            Err(e) => {
                error!("Failed to launch session for {}: {}", profile.name, e);
                self.observer
                    .failed(&format!("Failed to connect to {}: {}", profile.name, e));
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        profile: &ConnectionProfile,
        sink: &mut dyn InteractiveCommandSink,
    ) -> Result<LaunchReport> {
        let plain = SshInvocation::for_profile(profile).render(self.settings.platform.dialect());
        let mut report = LaunchReport::default();

        let Some(secret) = profile.auth.secret() else {
            debug!("No stored secret, sending plain invocation");
            sink.send_text(&plain).await?;
            report.commands.push(plain);
            return Ok(report);
        };

        let strategy = select_strategy(self.settings.platform, self.probe.as_ref()).await;
        report.strategy = Some(strategy);

        let session = self.staging.session();
        let script = match self.builder.build(profile, strategy, &session) {
            Some(script) => script,
            None => {
                let reason = if self.settings.platform == PlatformFamily::Unknown {
                    FallbackReason::UnknownPlatform
                } else {
                    FallbackReason::NoAutomationTool
                };
                return self
                    .send_plain_fallback(profile, secret, reason, plain, report, sink)
                    .await;
            }
        };

        let handles = match self.stage(&session, &script).await {
            Ok(handles) => handles,
            Err(e) => {
                let reason = FallbackReason::StagingFailed(e.to_string());
                return self
                    .send_plain_fallback(profile, secret, reason, plain, report, sink)
                    .await;
            }
        };

        if let Err(e) = sink.send_text(&script.command).await {
            for handle in &handles {
                discard(handle).await;
            }
            return Err(e);
        }

        info!("Session for {} started with {}", profile.name, strategy);
        report.commands.push(script.command.clone());
        for handle in handles {
            report.artifacts.push(handle.path.clone());
            report
                .cleanup
                .push(schedule_cleanup(handle, self.settings.cleanup_delay));
        }
        Ok(report)
    }

    /// Stage the side-file (if any) and the script. On failure nothing is
    /// left on disk.
    async fn stage(
        &self,
        session: &StagingSession,
        script: &AutomationScript,
    ) -> Result<Vec<ArtifactHandle>> {
        let mut handles = Vec::new();

        if let Some(ref secret) = script.secret_file {
            handles.push(session.stage(ArtifactKind::SecretFile, secret.as_bytes()).await?);
        }

        match session.stage(script.kind, script.script.as_bytes()).await {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for handle in &handles {
                    discard(handle).await;
                }
                return Err(e);
            }
        }

        Ok(handles)
    }

    async fn send_plain_fallback(
        &self,
        profile: &ConnectionProfile,
        secret: &str,
        reason: FallbackReason,
        plain: String,
        mut report: LaunchReport,
        sink: &mut dyn InteractiveCommandSink,
    ) -> Result<LaunchReport> {
        warn!("Plain fallback for {}: {}", profile.name, reason);

        let shown = match reason {
            FallbackReason::UnknownPlatform => Some(Zeroizing::new(secret.to_string())),
            _ => None,
        };
        self.observer.plain_fallback(&PlainFallbackNotice {
            profile_name: profile.name.clone(),
            reason: reason.clone(),
            secret: shown,
        });

        sink.send_text(&plain).await?;
        report.commands.push(plain);
        report.fallback = Some(reason);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LaunchError;
    use crate::ssh::sink::MemorySink;
    use crate::ssh::strategy::ToolAvailability;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Connected(SessionSummary),
        Failed(String),
        Fallback(FallbackReason, Option<String>),
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LaunchObserver for RecordingObserver {
        fn connected(&self, summary: &SessionSummary) {
            self.events.lock().unwrap().push(Event::Connected(summary.clone()));
        }

        fn failed(&self, reason: &str) {
            self.events.lock().unwrap().push(Event::Failed(reason.to_string()));
        }

        fn plain_fallback(&self, notice: &PlainFallbackNotice) {
            self.events.lock().unwrap().push(Event::Fallback(
                notice.reason.clone(),
                notice.secret.as_ref().map(|s| s.to_string()),
            ));
        }
    }

    struct FailingSink;

    #[async_trait]
    impl InteractiveCommandSink for FailingSink {
        async fn send_text(&mut self, _text: &str) -> Result<()> {
            Err(LaunchError::sink("terminal closed"))
        }
    }

    struct Harness {
        launcher: SessionLauncher,
        observer: Arc<RecordingObserver>,
        dir: tempfile::TempDir,
    }

    fn harness(platform: PlatformFamily, tools: ToolAvailability) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        harness_in(platform, tools, dir.path().to_path_buf(), dir)
    }

    fn harness_in(
        platform: PlatformFamily,
        tools: ToolAvailability,
        temp_dir: PathBuf,
        dir: tempfile::TempDir,
    ) -> Harness {
        let observer = Arc::new(RecordingObserver::default());
        let settings = LaunchSettings {
            platform,
            prompt_timeout: Duration::from_secs(30),
            cleanup_delay: Duration::from_secs(60),
            temp_dir,
        };
        let launcher = SessionLauncher::new(settings, Arc::new(tools), observer.clone());
        Harness {
            launcher,
            observer,
            dir,
        }
    }

    fn none() -> ToolAvailability {
        ToolAvailability::none()
    }

    fn expect_only() -> ToolAvailability {
        ToolAvailability {
            sshpass: false,
            expect: true,
        }
    }

    fn password_profile() -> ConnectionProfile {
        ConnectionProfile::new("10.0.0.5", "root")
            .with_name("prod")
            .with_password("secret")
    }

    fn staged_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_invalid_profile_sends_nothing() {
        let h = harness(PlatformFamily::Linux, expect_only());
        for profile in [
            ConnectionProfile::new("", "root").with_password("secret"),
            ConnectionProfile::new("10.0.0.5", "").with_password("secret"),
        ] {
            let mut sink = MemorySink::new();
            let err = h.launcher.connect(&profile, &mut sink).await.unwrap_err();
            assert!(err.is_invalid_profile());
            assert!(sink.lines.is_empty());
        }
        assert_eq!(staged_files(h.dir.path()), 0);

        // One report per failed call
        let events = h.observer.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, Event::Failed(_))));
    }

    #[tokio::test]
    async fn test_linux_without_tools_sends_plain() {
        let h = harness(PlatformFamily::Linux, none());
        let mut sink = MemorySink::new();

        let report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert_eq!(
            sink.lines,
            vec!["ssh -o StrictHostKeyChecking=no root@10.0.0.5"]
        );
        assert!(sink.lines.iter().all(|l| !l.contains("secret")));
        assert_eq!(report.strategy, Some(PlatformStrategy::PosixPlain));
        assert_eq!(report.fallback, Some(FallbackReason::NoAutomationTool));
        assert!(!report.is_automated());
        assert_eq!(staged_files(h.dir.path()), 0);

        let events = h.observer.events();
        assert_eq!(events[0], Event::Fallback(FallbackReason::NoAutomationTool, None));
        assert!(matches!(events[1], Event::Connected(_)));
    }

    #[tokio::test]
    async fn test_custom_port_in_plain_invocation() {
        let h = harness(PlatformFamily::Linux, none());
        let mut sink = MemorySink::new();
        let profile = password_profile().with_port(2222);

        h.launcher.connect(&profile, &mut sink).await.unwrap();

        assert_eq!(
            sink.lines,
            vec!["ssh -p 2222 -o StrictHostKeyChecking=no root@10.0.0.5"]
        );
    }

    #[tokio::test]
    async fn test_key_without_passphrase_is_plain() {
        let h = harness(PlatformFamily::Linux, expect_only());
        let mut sink = MemorySink::new();
        let profile =
            ConnectionProfile::new("10.0.0.5", "root").with_key("/home/u/.ssh/id_rsa.pub", None);

        let report = h.launcher.connect(&profile, &mut sink).await.unwrap();

        assert_eq!(
            sink.lines,
            vec!["ssh -i /home/u/.ssh/id_rsa -o StrictHostKeyChecking=no root@10.0.0.5"]
        );
        assert!(report.strategy.is_none());
        assert!(report.cleanup.is_empty());
        assert_eq!(staged_files(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_password_is_plain() {
        let h = harness(PlatformFamily::MacOs, expect_only());
        let mut sink = MemorySink::new();
        let profile = ConnectionProfile::new("h", "u").with_password("");

        let report = h.launcher.connect(&profile, &mut sink).await.unwrap();

        assert_eq!(sink.lines, vec!["ssh -o StrictHostKeyChecking=no u@h"]);
        assert!(report.fallback.is_none());
    }

    #[tokio::test]
    async fn test_key_passphrase_is_staged() {
        let h = harness(PlatformFamily::Linux, expect_only());
        let mut sink = MemorySink::new();
        let profile = ConnectionProfile::new("10.0.0.5", "root")
            .with_key("/home/u/.ssh/id_rsa.pub", Some("correct horse".into()));

        let report = h.launcher.connect(&profile, &mut sink).await.unwrap();

        assert_eq!(report.strategy, Some(PlatformStrategy::PosixExpectWrapper));
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.cleanup.len(), 1);

        let content = std::fs::read_to_string(&report.artifacts[0]).unwrap();
        assert_eq!(content.matches("correct horse").count(), 1);
        assert!(content.contains("-i /home/u/.ssh/id_rsa "));
        assert!(content.contains("\"Enter passphrase\""));

        assert_eq!(sink.lines.len(), 1);
        assert!(sink.lines[0].starts_with("expect -f "));
        assert!(!sink.lines[0].contains("correct horse"));
    }

    #[tokio::test]
    async fn test_sshpass_strategy_on_linux() {
        let h = harness(
            PlatformFamily::Linux,
            ToolAvailability {
                sshpass: true,
                expect: true,
            },
        );
        let mut sink = MemorySink::new();

        let report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert_eq!(report.strategy, Some(PlatformStrategy::PosixSshpass));
        let content = std::fs::read_to_string(&report.artifacts[0]).unwrap();
        assert!(content.contains("exec sshpass -p 'secret' ssh"));
        assert!(sink.lines[0].starts_with("sh "));
        assert!(!sink.lines[0].contains("secret"));
    }

    #[tokio::test]
    async fn test_windows_batch_stages_side_file() {
        let h = harness(PlatformFamily::Windows, none());
        let mut sink = MemorySink::new();

        let report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert_eq!(report.strategy, Some(PlatformStrategy::WindowsBatchPipe));
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.cleanup.len(), 2);

        let secret_file = std::fs::read_to_string(&report.artifacts[0]).unwrap();
        let batch = std::fs::read_to_string(&report.artifacts[1]).unwrap();
        assert_eq!(secret_file, "secret");
        assert!(!batch.contains("secret"));
        assert!(batch.contains(&report.artifacts[0].to_string_lossy().into_owned()));
        assert!(sink.lines[0].starts_with("call "));
    }

    #[tokio::test]
    async fn test_unknown_platform_surfaces_secret_in_notice_only() {
        let h = harness(PlatformFamily::Unknown, expect_only());
        let mut sink = MemorySink::new();

        let report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert_eq!(report.fallback, Some(FallbackReason::UnknownPlatform));
        assert_eq!(
            sink.lines,
            vec!["ssh -o StrictHostKeyChecking=no root@10.0.0.5"]
        );
        assert_eq!(
            h.observer.events()[0],
            Event::Fallback(FallbackReason::UnknownPlatform, Some("secret".to_string()))
        );
    }

    #[tokio::test]
    async fn test_staging_failure_falls_back_to_plain() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let h = harness_in(PlatformFamily::Linux, expect_only(), missing, dir);
        let mut sink = MemorySink::new();

        let report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert!(matches!(report.fallback, Some(FallbackReason::StagingFailed(_))));
        assert!(report.artifacts.is_empty());
        assert_eq!(
            sink.lines,
            vec!["ssh -o StrictHostKeyChecking=no root@10.0.0.5"]
        );
        let events = h.observer.events();
        assert!(matches!(events[0], Event::Fallback(FallbackReason::StagingFailed(_), None)));
        assert!(matches!(events[1], Event::Connected(_)));
    }

    #[tokio::test]
    async fn test_sink_failure_removes_staged_files() {
        let h = harness(PlatformFamily::Windows, none());
        let mut sink = FailingSink;

        let err = h
            .launcher
            .connect(&password_profile(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, LaunchError::Sink(_)));
        assert_eq!(staged_files(h.dir.path()), 0);
        match &h.observer.events()[0] {
            Event::Failed(reason) => assert!(reason.contains("prod")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cleanup_deletes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let settings = LaunchSettings {
            platform: PlatformFamily::MacOs,
            prompt_timeout: Duration::from_secs(30),
            cleanup_delay: Duration::from_millis(10),
            temp_dir: dir.path().to_path_buf(),
        };
        let launcher = SessionLauncher::new(settings, Arc::new(expect_only()), observer);
        let mut sink = MemorySink::new();

        let mut report = launcher.connect(&password_profile(), &mut sink).await.unwrap();
        assert_eq!(staged_files(dir.path()), 1);

        report.wait_for_cleanup().await;
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_discard_artifacts_skips_the_delay() {
        let h = harness(PlatformFamily::Windows, none());
        let mut sink = MemorySink::new();

        let mut report = h.launcher.connect(&password_profile(), &mut sink).await.unwrap();
        assert_eq!(staged_files(h.dir.path()), 2);

        report.discard_artifacts().await;
        assert_eq!(staged_files(h.dir.path()), 0);
        assert!(report.cleanup.is_empty());

        // Nothing left to wait for
        report.wait_for_cleanup().await;
    }

    #[tokio::test]
    async fn test_connected_summary() {
        let h = harness(PlatformFamily::MacOs, expect_only());
        let mut sink = MemorySink::new();
        h.launcher.connect(&password_profile(), &mut sink).await.unwrap();

        assert_eq!(
            h.observer.events(),
            vec![Event::Connected(SessionSummary {
                name: "prod".to_string(),
                username: "root".to_string(),
                host: "10.0.0.5".to_string(),
                strategy: Some(PlatformStrategy::PosixExpectWrapper),
            })]
        );
    }
}
