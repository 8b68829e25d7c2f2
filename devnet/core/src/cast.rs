//! Wrapper around the external `cast` chain client.
//!
//! Every operation the devnet needs goes through one subprocess invocation
//! with a textual contract: decoded value on stdout, non-zero exit on
//! failure. Each call enforces its own timeout so a hung invocation cannot
//! stall a worker pool.

use std::{io, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{process::Command, time::timeout};
use tracing::debug;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const CAST_BINARY: &str = "cast";
const IMPERSONATE_METHOD: &str = "anvil_impersonateAccount";
const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";

/// Captured result of one tool invocation.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CastError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Seam for issuing tool invocations, so orchestration logic can be
/// exercised without the real binaries on PATH.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CastError>;
}

/// Spawns real subprocesses with piped output and a hard per-call timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        call_timeout: Duration,
    ) -> Result<CommandOutput, CastError> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = timeout(call_timeout, command.output())
            .await
            .map_err(|_| CastError::Timeout {
                command: render_command(program, args),
                timeout: call_timeout,
            })?
            .map_err(|source| CastError::Spawn {
                command: render_command(program, args),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Client covering the `cast` calls the devnet issues.
#[derive(Clone)]
pub struct CastClient {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    call_timeout: Duration,
}

impl CastClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ProcessRunner))
    }

    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: CAST_BINARY.to_owned(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Derive the public address for a private key.
    pub async fn wallet_address(&self, secret: &str) -> Result<String, CastError> {
        let args = vec![
            "wallet".to_owned(),
            "address".to_owned(),
            "--private-key".to_owned(),
            secret.to_owned(),
        ];
        // The secret must not surface in error messages.
        let display = format!("{} wallet address --private-key <redacted>", self.binary);
        self.invoke_as(&args, display).await
    }

    /// Read-only contract call returning the decoded value.
    pub async fn call(
        &self,
        contract: &str,
        signature: &str,
        args: &[&str],
        rpc_url: &str,
    ) -> Result<String, CastError> {
        let mut argv = vec!["call".to_owned(), contract.to_owned(), signature.to_owned()];
        argv.extend(args.iter().map(|arg| (*arg).to_owned()));
        argv.push("--rpc-url".to_owned());
        argv.push(rpc_url.to_owned());
        self.invoke(&argv).await
    }

    /// Native balance of an address, as an integer string.
    pub async fn native_balance(&self, address: &str, rpc_url: &str) -> Result<String, CastError> {
        let args = vec![
            "balance".to_owned(),
            address.to_owned(),
            "--rpc-url".to_owned(),
            rpc_url.to_owned(),
        ];
        self.invoke(&args).await
    }

    /// Enable impersonation for a holder on a forked chain.
    pub async fn impersonate_account(&self, holder: &str, rpc_url: &str) -> Result<(), CastError> {
        let args = vec![
            "rpc".to_owned(),
            IMPERSONATE_METHOD.to_owned(),
            holder.to_owned(),
            "--rpc-url".to_owned(),
            rpc_url.to_owned(),
        ];
        self.invoke(&args).await.map(|_| ())
    }

    /// Submit a token transfer from an impersonated (unlocked) holder.
    pub async fn send_token_transfer(
        &self,
        token: &str,
        to: &str,
        amount: &str,
        holder: &str,
        rpc_url: &str,
    ) -> Result<(), CastError> {
        let args = vec![
            "send".to_owned(),
            token.to_owned(),
            TRANSFER_SIGNATURE.to_owned(),
            to.to_owned(),
            amount.to_owned(),
            "--rpc-url".to_owned(),
            rpc_url.to_owned(),
            "--from".to_owned(),
            holder.to_owned(),
            "--unlocked".to_owned(),
        ];
        self.invoke(&args).await.map(|_| ())
    }

    async fn invoke(&self, args: &[String]) -> Result<String, CastError> {
        let display = render_command(&self.binary, args);
        self.invoke_as(args, display).await
    }

    async fn invoke_as(&self, args: &[String], rendered: String) -> Result<String, CastError> {
        debug!(command = %rendered, "invoking chain client");
        let output = self.runner.run(&self.binary, args, self.call_timeout).await?;
        if output.success {
            Ok(output.stdout.trim().to_owned())
        } else {
            Err(CastError::Failed {
                command: rendered,
                code: output.code,
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }
}

impl Default for CastClient {
    fn default() -> Self {
        Self::new()
    }
}

fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
