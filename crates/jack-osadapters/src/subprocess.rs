//! The `Subprocess` capability trait, used for the handful of operations
//! jack shells out for instead of reimplementing (`nft`, `systemd-cat`,
//! plugin binaries). Grounded on the `tokio::process::Command` piping
//! idiom in `streaming-logs/src/main.rs`.

use async_trait::async_trait;
use jack_core::{JackError, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait Subprocess: Send + Sync {
    /// Run `program` to completion with `args`, feeding `stdin` (if any)
    /// and collecting stdout/stderr.
    async fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>)
        -> Result<ProcessOutput>;
}

pub struct RealSubprocess;

#[async_trait]
impl Subprocess for RealSubprocess {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JackError::Kernel(format!("spawn {program}: {e}")))?;

        if let Some(data) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(data)
                    .await
                    .map_err(|e| JackError::Kernel(format!("write stdin to {program}: {e}")))?;
            }
        } else {
            child.stdin.take();
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| JackError::Kernel(format!("wait for {program}: {e}")))?;

        Ok(ProcessOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
