//! Invocation of the external wallet command line tool
//!
//! Every call spawns a fresh process, writes `<command>\nquit\n` to its
//! stdin and collects its output. No retries happen at this layer.

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::WALLET_COMMAND_DURATION;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Directive that makes the wallet tool exit after the command
const QUIT_DIRECTIVE: &str = "quit";

/// Runs one line-oriented wallet command and returns its stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> FaucetResult<String>;
}

/// How the wallet tool is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStrategy {
    /// Spawn the tool on this host
    Direct,
    /// `<runtime> exec -i <container> <tool> ...`
    Container { runtime: String, container: String },
}

/// Wallet settings, fixed at startup
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub cli_path: String,
    pub data_dir: PathBuf,
    pub server_uri: String,
    pub chain: String,
    pub strategy: ExecStrategy,
    pub query_timeout: Duration,
}

impl From<&FaucetConfig> for WalletConfig {
    fn from(config: &FaucetConfig) -> Self {
        let strategy = match &config.container {
            Some(container) => ExecStrategy::Container {
                runtime: config.container_runtime.clone(),
                container: container.clone(),
            },
            None => ExecStrategy::Direct,
        };

        Self {
            cli_path: config.cli_path.clone(),
            data_dir: config.data_dir.clone(),
            server_uri: config.lightwalletd_uri.clone(),
            chain: config.chain.clone(),
            strategy,
            query_timeout: config.query_timeout(),
        }
    }
}

/// Subprocess-backed runner for the wallet tool
pub struct WalletCli {
    config: WalletConfig,
}

impl WalletCli {
    pub fn new(config: WalletConfig) -> Self {
        Self { config }
    }

    /// Program and arguments for one invocation
    pub fn command_line(&self) -> (String, Vec<String>) {
        let tool_args = vec![
            "--data-dir".to_string(),
            self.config.data_dir.display().to_string(),
            "--server".to_string(),
            self.config.server_uri.clone(),
            "--chain".to_string(),
            self.config.chain.clone(),
            "--nosync".to_string(),
        ];

        match &self.config.strategy {
            ExecStrategy::Direct => (self.config.cli_path.clone(), tool_args),
            ExecStrategy::Container { runtime, container } => {
                let mut args = vec![
                    "exec".to_string(),
                    "-i".to_string(),
                    container.clone(),
                    self.config.cli_path.clone(),
                ];
                args.extend(tool_args);
                (runtime.clone(), args)
            }
        }
    }
}

#[async_trait]
impl CommandRunner for WalletCli {
    async fn run(&self, command: &str, timeout: Duration) -> FaucetResult<String> {
        let (program, args) = self.command_line();
        let verb = command.split_whitespace().next().unwrap_or("").to_string();
        debug!(program = %program, command = %verb, "Spawning wallet process");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FaucetError::ProcessSpawn(format!("{}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{}\n{}\n", command, QUIT_DIRECTIVE);
            // The tool may exit before draining stdin; its exit status decides
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(FaucetError::ProcessSpawn(format!("write stdin: {}", e)));
                }
                debug!("Wallet process closed stdin early");
            }
        }

        let started = Instant::now();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| FaucetError::ProcessSpawn(e.to_string()))?,
            // dropping the future kills the child
            Err(_) => return Err(FaucetError::ProcessTimeout(timeout.as_secs())),
        };

        WALLET_COMMAND_DURATION
            .with_label_values(&[verb.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
            return Err(FaucetError::ProcessFailed(format!(
                "{} (exit {})",
                detail,
                output.status.code().map_or("signal".to_string(), |c| c.to_string())
            )));
        }

        debug!(command = %verb, bytes = stdout.len(), "Wallet process finished");
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_config(strategy: ExecStrategy) -> WalletConfig {
        WalletConfig {
            cli_path: "zingo-cli".to_string(),
            data_dir: PathBuf::from("/var/zingo"),
            server_uri: "http://lightwalletd:9067".to_string(),
            chain: "regtest".to_string(),
            strategy,
            query_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_direct_command_line() {
        let cli = WalletCli::new(wallet_config(ExecStrategy::Direct));
        let (program, args) = cli.command_line();
        assert_eq!(program, "zingo-cli");
        assert_eq!(
            args,
            vec![
                "--data-dir", "/var/zingo", "--server", "http://lightwalletd:9067",
                "--chain", "regtest", "--nosync",
            ]
        );
    }

    #[test]
    fn test_container_command_line() {
        let cli = WalletCli::new(wallet_config(ExecStrategy::Container {
            runtime: "docker".to_string(),
            container: "zingo-wallet".to_string(),
        }));
        let (program, args) = cli.command_line();
        assert_eq!(program, "docker");
        assert_eq!(&args[..4], &["exec", "-i", "zingo-wallet", "zingo-cli"]);
        assert_eq!(args[4], "--data-dir");
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = FaucetConfig::default();
        assert_eq!(WalletConfig::from(&config).strategy, ExecStrategy::Direct);

        config.container = Some("wallet".to_string());
        config.container_runtime = "podman".to_string();
        assert_eq!(
            WalletConfig::from(&config).strategy,
            ExecStrategy::Container {
                runtime: "podman".to_string(),
                container: "wallet".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let mut config = wallet_config(ExecStrategy::Direct);
        config.cli_path = "/nonexistent/wallet-tool".to_string();
        let cli = WalletCli::new(config);
        let result = cli.run("balance", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(FaucetError::ProcessSpawn(_))));
    }
}
