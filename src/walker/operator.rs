//! Handoff from the operator to the walker
//!
//! A walk only starts once someone has positioned the session on a record
//! page (signed in, navigated to the first image). The walker waits for that
//! signal in `AwaitingOperatorStart`.

use crate::{HarvestError, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Signal that the session is positioned and the walk may begin
#[async_trait]
pub trait OperatorSignal: Send {
    /// Resolves once the operator is ready; an error aborts the walk
    async fn wait_for_start(&mut self) -> Result<()>;
}

/// Starts immediately, for sessions positioned programmatically
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

#[async_trait]
impl OperatorSignal for Immediate {
    async fn wait_for_start(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Prompts on stdout and waits for Enter on stdin
///
/// Cancelling the token abandons the prompt, so an interrupt stops the walk
/// even while no line has been typed.
#[derive(Debug, Clone)]
pub struct StdinOperator {
    prompt: String,
    cancel: CancellationToken,
}

impl StdinOperator {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for StdinOperator {
    fn default() -> Self {
        Self::new("Sign in, open the first record page, then press Enter to start (Ctrl-C to exit)")
    }
}

#[async_trait]
impl OperatorSignal for StdinOperator {
    async fn wait_for_start(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled {
                at: "operator start".to_string(),
            });
        }

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}\n", self.prompt).as_bytes())
            .await?;
        stdout.flush().await?;

        // A blocked stdin read cannot be cancelled, so it runs on its own thread
        // and is abandoned on interrupt.
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = tx.send(std::io::stdin().read_line(&mut line));
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HarvestError::Cancelled {
                at: "operator start".to_string(),
            }),
            read = rx => match read {
                Ok(Ok(0)) | Err(_) => Err(HarvestError::Cancelled {
                    at: "operator start (stdin closed)".to_string(),
                }),
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
            },
        }
    }
}
