//! Automation strategy selection
//!
//! Picks how a secret gets into the interactive prompt, from the platform
//! family and whichever helper tools are installed right now. Tools are
//! probed on every call; nothing is cached between attempts.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::invocation::ShellDialect;

/// Host operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    MacOs,
    Linux,
    Windows,
    Unknown,
}

impl PlatformFamily {
    /// Family of the running binary
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            PlatformFamily::MacOs
        } else if cfg!(target_os = "linux") {
            PlatformFamily::Linux
        } else if cfg!(target_os = "windows") {
            PlatformFamily::Windows
        } else {
            PlatformFamily::Unknown
        }
    }

    /// Command language of sessions on this platform
    pub fn dialect(self) -> ShellDialect {
        match self {
            PlatformFamily::Windows => ShellDialect::Cmd,
            _ => ShellDialect::Posix,
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlatformFamily::MacOs => "macos",
            PlatformFamily::Linux => "linux",
            PlatformFamily::Windows => "windows",
            PlatformFamily::Unknown => "unknown",
        })
    }
}

impl FromStr for PlatformFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" | "darwin" | "mac" => Ok(PlatformFamily::MacOs),
            "linux" => Ok(PlatformFamily::Linux),
            "windows" | "win32" | "win" => Ok(PlatformFamily::Windows),
            "unknown" | "other" => Ok(PlatformFamily::Unknown),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Password automation helpers the launcher knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutomationTool {
    /// Feeds the secret through a command-line argument
    Sshpass,
    /// Prompt-matching script interpreter
    Expect,
}

impl AutomationTool {
    /// Executable name looked up on PATH
    pub fn command(self) -> &'static str {
        match self {
            AutomationTool::Sshpass => "sshpass",
            AutomationTool::Expect => "expect",
        }
    }
}

/// Answers "is this tool installed right now?"
#[async_trait]
pub trait ToolProbe: Send + Sync {
    async fn is_available(&self, tool: AutomationTool) -> bool;
}

/// Probes PATH through the local shell's exit code
/// (`command -v` on POSIX, `where` on Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellProbe;

#[async_trait]
impl ToolProbe for ShellProbe {
    async fn is_available(&self, tool: AutomationTool) -> bool {
        let mut command = if cfg!(windows) {
            let mut c = tokio::process::Command::new("where");
            c.arg(tool.command());
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c")
                .arg(format!("command -v {} >/dev/null 2>&1", tool.command()));
            c
        };
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        match command.status().await {
            Ok(status) => {
                debug!("Probe for '{}': {}", tool.command(), status.success());
                status.success()
            }
            Err(e) => {
                warn!("Probe for '{}' could not run: {}", tool.command(), e);
                false
            }
        }
    }
}

/// Fixed probe answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolAvailability {
    pub sshpass: bool,
    pub expect: bool,
}

impl ToolAvailability {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has(&self, tool: AutomationTool) -> bool {
        match tool {
            AutomationTool::Sshpass => self.sshpass,
            AutomationTool::Expect => self.expect,
        }
    }
}

#[async_trait]
impl ToolProbe for ToolAvailability {
    async fn is_available(&self, tool: AutomationTool) -> bool {
        self.has(tool)
    }
}

/// How the secret reaches the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformStrategy {
    /// expect script spawning ssh and answering prompts
    PosixExpectWrapper,
    /// sshpass passing the secret on its command line
    PosixSshpass,
    /// bare ssh; the user types the secret
    PosixPlain,
    /// batch file piping the secret from a side-file
    WindowsBatchPipe,
}

impl PlatformStrategy {
    /// True when a script has to be staged
    pub fn is_automated(self) -> bool {
        !matches!(self, PlatformStrategy::PosixPlain)
    }
}

impl fmt::Display for PlatformStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlatformStrategy::PosixExpectWrapper => "posix-expect-wrapper",
            PlatformStrategy::PosixSshpass => "posix-sshpass",
            PlatformStrategy::PosixPlain => "posix-plain",
            PlatformStrategy::WindowsBatchPipe => "windows-batch-pipe",
        })
    }
}

/// Strategy for known tool availability.
///
/// ```
/// use ssh_bootstrap::ssh::strategy::*;
///
/// let tools = ToolAvailability { sshpass: true, expect: true };
/// assert_eq!(decide(PlatformFamily::Linux, tools), PlatformStrategy::PosixSshpass);
/// assert_eq!(decide(PlatformFamily::MacOs, tools), PlatformStrategy::PosixExpectWrapper);
/// ```
pub fn decide(family: PlatformFamily, tools: ToolAvailability) -> PlatformStrategy {
    match family {
        PlatformFamily::MacOs if tools.expect => PlatformStrategy::PosixExpectWrapper,
        PlatformFamily::MacOs => PlatformStrategy::PosixPlain,
        PlatformFamily::Linux if tools.sshpass => PlatformStrategy::PosixSshpass,
        PlatformFamily::Linux if tools.expect => PlatformStrategy::PosixExpectWrapper,
        PlatformFamily::Linux => PlatformStrategy::PosixPlain,
        PlatformFamily::Windows => PlatformStrategy::WindowsBatchPipe,
        PlatformFamily::Unknown => PlatformStrategy::PosixPlain,
    }
}

/// Probe the tools `family` can use, in fallback order, and decide.
///
/// Windows and unknown platforms are never probed; Linux stops probing at
/// the first tool found.
pub async fn select_strategy(family: PlatformFamily, probe: &dyn ToolProbe) -> PlatformStrategy {
    let mut tools = ToolAvailability::none();
    match family {
        PlatformFamily::MacOs => {
            tools.expect = probe.is_available(AutomationTool::Expect).await;
        }
        PlatformFamily::Linux => {
            tools.sshpass = probe.is_available(AutomationTool::Sshpass).await;
            if !tools.sshpass {
                tools.expect = probe.is_available(AutomationTool::Expect).await;
            }
        }
        PlatformFamily::Windows | PlatformFamily::Unknown => {}
    }

    let strategy = decide(family, tools);
    debug!("Selected {} for {} ({:?})", strategy, family, tools);
    strategy
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records which tools were asked about
    struct CountingProbe {
        tools: ToolAvailability,
        asked: Mutex<Vec<AutomationTool>>,
    }

    impl CountingProbe {
        fn new(tools: ToolAvailability) -> Self {
            Self {
                tools,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolProbe for CountingProbe {
        async fn is_available(&self, tool: AutomationTool) -> bool {
            self.asked.lock().unwrap().push(tool);
            self.tools.has(tool)
        }
    }

    fn tools(sshpass: bool, expect: bool) -> ToolAvailability {
        ToolAvailability { sshpass, expect }
    }

    #[tokio::test]
    async fn test_linux_fallback_order() {
        let linux = PlatformFamily::Linux;
        assert_eq!(
            select_strategy(linux, &tools(false, false)).await,
            PlatformStrategy::PosixPlain
        );
        assert_eq!(
            select_strategy(linux, &tools(true, false)).await,
            PlatformStrategy::PosixSshpass
        );
        assert_eq!(
            select_strategy(linux, &tools(false, true)).await,
            PlatformStrategy::PosixExpectWrapper
        );
        assert_eq!(
            select_strategy(linux, &tools(true, true)).await,
            PlatformStrategy::PosixSshpass
        );
    }

    #[tokio::test]
    async fn test_macos_ignores_sshpass() {
        let mac = PlatformFamily::MacOs;
        assert_eq!(
            select_strategy(mac, &tools(true, false)).await,
            PlatformStrategy::PosixPlain
        );
        assert_eq!(
            select_strategy(mac, &tools(false, true)).await,
            PlatformStrategy::PosixExpectWrapper
        );
    }

    #[tokio::test]
    async fn test_windows_and_unknown_never_probe() {
        for family in [PlatformFamily::Windows, PlatformFamily::Unknown] {
            let probe = CountingProbe::new(tools(true, true));
            let strategy = select_strategy(family, &probe).await;
            assert!(probe.asked.lock().unwrap().is_empty());
            let expected = if family == PlatformFamily::Windows {
                PlatformStrategy::WindowsBatchPipe
            } else {
                PlatformStrategy::PosixPlain
            };
            assert_eq!(strategy, expected);
        }
    }

    #[tokio::test]
    async fn test_linux_stops_probing_at_sshpass() {
        let probe = CountingProbe::new(tools(true, true));
        select_strategy(PlatformFamily::Linux, &probe).await;
        assert_eq!(*probe.asked.lock().unwrap(), vec![AutomationTool::Sshpass]);
    }

    #[tokio::test]
    async fn test_probes_every_call() {
        let probe = CountingProbe::new(tools(false, true));
        let first = select_strategy(PlatformFamily::MacOs, &probe).await;
        let second = select_strategy(PlatformFamily::MacOs, &probe).await;
        assert_eq!(first, second);
        assert_eq!(probe.asked.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_decide_is_pure() {
        let families = [
            PlatformFamily::MacOs,
            PlatformFamily::Linux,
            PlatformFamily::Windows,
            PlatformFamily::Unknown,
        ];
        for family in families {
            for (s, e) in [(false, false), (true, false), (false, true), (true, true)] {
                assert_eq!(decide(family, tools(s, e)), decide(family, tools(s, e)));
            }
        }
    }

    #[test]
    fn test_platform_parse_and_dialect() {
        assert_eq!("Darwin".parse::<PlatformFamily>(), Ok(PlatformFamily::MacOs));
        assert_eq!("win32".parse::<PlatformFamily>(), Ok(PlatformFamily::Windows));
        assert!("plan9".parse::<PlatformFamily>().is_err());
        assert_eq!(PlatformFamily::Windows.dialect(), ShellDialect::Cmd);
        assert_eq!(PlatformFamily::Unknown.dialect(), ShellDialect::Posix);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(PlatformStrategy::PosixSshpass.to_string(), "posix-sshpass");
        assert!(!PlatformStrategy::PosixPlain.is_automated());
        assert!(PlatformStrategy::WindowsBatchPipe.is_automated());
    }
}
