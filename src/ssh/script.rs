//! Prompt automation script rendering
//!
//! Produces the text of the artifact that carries the secret into the
//! interactive prompt for a given [`PlatformStrategy`], together with the
//! command line that runs it inside the session.
//!
//! The secret is embedded exactly once per rendered bundle and is never
//! echoed by the scripts themselves.

use std::time::Duration;

use zeroize::Zeroizing;

use super::invocation::{
    escape_for_shell, escape_for_tcl, quote_cmd, quote_posix, ShellDialect, SshInvocation,
};
use super::profile::{ConnectionProfile, PromptKind};
use super::staging::{ArtifactKind, StagingSession};
use super::strategy::PlatformStrategy;

/// Default upper bound for the prompt exchange
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Host authenticity confirmation
pub const HOST_KEY_PROMPT: &str = "yes/no";

/// Password prompts, English then Russian
pub const PASSWORD_PROMPTS: &[&str] = &["password:", "Password:", "пароль:", "Пароль:"];

/// Key passphrase prompts, English then Russian
pub const PASSPHRASE_PROMPTS: &[&str] =
    &["Enter passphrase", "passphrase", "Введите парольную фразу"];

/// Tcl variable holding the secret inside expect scripts
const EXPECT_REPLY_VAR: &str = "reply";

/// Environment variable holding the secret inside batch scripts
const BATCH_REPLY_VAR: &str = "SSB_REPLY";

impl PromptKind {
    /// Prompt texts answered with the secret
    pub fn prompts(self) -> &'static [&'static str] {
        match self {
            PromptKind::Password => PASSWORD_PROMPTS,
            PromptKind::KeyPassphrase => PASSPHRASE_PROMPTS,
        }
    }
}

/// A rendered, not yet staged, automation bundle
pub struct AutomationScript {
    pub strategy: PlatformStrategy,

    /// Artifact kind of the main script
    pub kind: ArtifactKind,

    /// Script text
    pub script: Zeroizing<String>,

    /// Plaintext side-file content, for strategies that read the secret from disk
    pub secret_file: Option<Zeroizing<String>>,

    /// Line sent to the session to run the script
    pub command: String,
}

impl std::fmt::Debug for AutomationScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationScript")
            .field("strategy", &self.strategy)
            .field("kind", &self.kind)
            .field("has_secret_file", &self.secret_file.is_some())
            .field("command", &self.command)
            .finish()
    }
}

/// Renders automation scripts
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    prompt_timeout: Duration,
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TIMEOUT)
    }
}

impl ScriptBuilder {
    pub fn new(prompt_timeout: Duration) -> Self {
        Self { prompt_timeout }
    }

    /// Script answering a password prompt with the profile's secret.
    ///
    /// Returns `None` for [`PlatformStrategy::PosixPlain`] or when the
    /// profile carries no secret.
    pub fn build_password_script(
        &self,
        profile: &ConnectionProfile,
        strategy: PlatformStrategy,
        session: &StagingSession,
    ) -> Option<AutomationScript> {
        self.render(profile, PromptKind::Password, strategy, session)
    }

    /// Script answering a key passphrase prompt with the profile's secret
    pub fn build_key_passphrase_script(
        &self,
        profile: &ConnectionProfile,
        strategy: PlatformStrategy,
        session: &StagingSession,
    ) -> Option<AutomationScript> {
        self.render(profile, PromptKind::KeyPassphrase, strategy, session)
    }

    /// Script for the profile's own authentication mode
    pub fn build(
        &self,
        profile: &ConnectionProfile,
        strategy: PlatformStrategy,
        session: &StagingSession,
    ) -> Option<AutomationScript> {
        self.render(profile, profile.auth.prompt_kind(), strategy, session)
    }

    fn render(
        &self,
        profile: &ConnectionProfile,
        prompts: PromptKind,
        strategy: PlatformStrategy,
        session: &StagingSession,
    ) -> Option<AutomationScript> {
        let secret = profile.auth.secret()?;
        let invocation = SshInvocation::for_profile(profile);

        match strategy {
            PlatformStrategy::PosixPlain => None,
            PlatformStrategy::PosixExpectWrapper => {
                let kind = match prompts {
                    PromptKind::Password => ArtifactKind::PasswordScript,
                    PromptKind::KeyPassphrase => ArtifactKind::PassphraseScript,
                };
                let path = session.path_for(kind);
                Some(AutomationScript {
                    strategy,
                    kind,
                    script: self.expect_script(&invocation, secret, prompts),
                    secret_file: None,
                    command: format!("expect -f {}", quote_posix(&path.to_string_lossy())),
                })
            }
            PlatformStrategy::PosixSshpass => {
                let kind = ArtifactKind::SshpassScript;
                let path = session.path_for(kind);
                Some(AutomationScript {
                    strategy,
                    kind,
                    script: sshpass_script(&invocation, secret, prompts),
                    secret_file: None,
                    command: format!("sh {}", quote_posix(&path.to_string_lossy())),
                })
            }
            PlatformStrategy::WindowsBatchPipe => {
                let kind = ArtifactKind::BatchScript;
                let script_path = session.path_for(kind).to_string_lossy().into_owned();
                let secret_path = session
                    .path_for(ArtifactKind::SecretFile)
                    .to_string_lossy()
                    .into_owned();
                Some(AutomationScript {
                    strategy,
                    kind,
                    script: batch_script(&invocation, &script_path, &secret_path),
                    secret_file: Some(Zeroizing::new(secret.to_string())),
                    command: format!("call {}", quote_cmd(&script_path)),
                })
            }
        }
    }

    /// expect script: spawn ssh, confirm the host key, answer the first
    /// credential prompt once, then hand the terminal to the user.
    fn expect_script(
        &self,
        invocation: &SshInvocation,
        secret: &str,
        prompts: PromptKind,
    ) -> Zeroizing<String> {
        let mut s = Zeroizing::new(String::new());
        s.push_str("#!/usr/bin/expect -f\n");
        s.push_str(&format!("set timeout {}\n", self.prompt_timeout.as_secs()));
        s.push_str(&format!(
            "set {} \"{}\"\n",
            EXPECT_REPLY_VAR,
            escape_for_tcl(secret)
        ));
        s.push_str(&format!("spawn {}\n", invocation.render_tcl()));
        s.push_str("expect {\n");
        s.push_str(&format!(
            "    \"{}\" {{ send \"yes\\r\"; exp_continue }}\n",
            HOST_KEY_PROMPT
        ));
        for prompt in prompts.prompts() {
            s.push_str(&format!(
                "    \"{}\" {{ send -- \"${}\\r\" }}\n",
                escape_for_tcl(prompt),
                EXPECT_REPLY_VAR
            ));
        }
        s.push_str("    timeout { exit 1 }\n");
        s.push_str("    eof { exit 1 }\n");
        s.push_str("}\n");
        s.push_str(&format!("unset {}\n", EXPECT_REPLY_VAR));
        s.push_str("interact\n");
        s
    }
}

/// One-line sshpass wrapper. `-P` narrows sshpass to the passphrase prompt.
fn sshpass_script(invocation: &SshInvocation, secret: &str, prompts: PromptKind) -> Zeroizing<String> {
    let mut s = Zeroizing::new(String::from("#!/bin/sh\n"));
    s.push_str("exec sshpass ");
    if prompts == PromptKind::KeyPassphrase {
        s.push_str("-P passphrase ");
    }
    s.push_str(&format!(
        "-p '{}' {}\n",
        escape_for_shell(secret),
        invocation.render(ShellDialect::Posix)
    ));
    s
}

/// Batch driver: load the secret from the side-file into a variable, delete
/// the side-file, pipe the variable into ssh, retry once without it, then
/// clear the variable and delete itself.
fn batch_script(invocation: &SshInvocation, script_path: &str, secret_path: &str) -> Zeroizing<String> {
    let piped = invocation
        .clone()
        .with_option("PasswordAuthentication=yes")
        .render(ShellDialect::Cmd);
    let interactive = invocation.render(ShellDialect::Cmd);

    let lines = [
        "@echo off".to_string(),
        format!("set \"{}=\"", BATCH_REPLY_VAR),
        format!(
            "for /f \"usebackq delims=\" %%i in (\"{}\") do set \"{}=%%i\"",
            secret_path, BATCH_REPLY_VAR
        ),
        format!("del /q \"{}\" 2>nul", secret_path),
        format!("echo %{}%| {}", BATCH_REPLY_VAR, piped),
        "if errorlevel 1 (".to_string(),
        "    echo Retrying interactively...".to_string(),
        format!("    {}", interactive),
        ")".to_string(),
        format!("set \"{}=\"", BATCH_REPLY_VAR),
        format!("del /q \"{}\" 2>nul", script_path),
    ];

    let mut s = Zeroizing::new(String::new());
    for line in lines {
        s.push_str(&line);
        s.push_str("\r\n");
    }
    s
}
