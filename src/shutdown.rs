// Copyright 2026 the sshchain authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shutdown arbitration: one cancellation token, one error channel.
//!
//! Errors flow up, cancellation flows down. The first interrupt cancels the
//! token and lets the main loop unwind gracefully; a second interrupt during
//! that unwind exits the process immediately with status 1. Fatal runtime
//! errors (accept failures, keepalive loss) arrive on the error channel and
//! trigger the same unwind.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Coordinator {
    cancel: CancellationToken,
    error_tx: UnboundedSender<anyhow::Error>,
    error_rx: UnboundedReceiver<anyhow::Error>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        Self {
            cancel: CancellationToken::new(),
            error_tx,
            error_rx,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn error_sender(&self) -> UnboundedSender<anyhow::Error> {
        self.error_tx.clone()
    }

    /// First interrupt cancels, second interrupt kills the process.
    pub fn spawn_signal_watcher(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("caught interrupt, gracefully giving up");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("caught second interrupt, dying");
            std::process::exit(1);
        });
    }

    /// Wait for something bad to happen: cancellation (`None`) or the first
    /// fatal error (`Some`).
    pub async fn wait(&mut self) -> Option<anyhow::Error> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            error = self.error_rx.recv() => error,
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// A join handle whose task is aborted when the handle is dropped.
#[derive(Debug)]
pub struct TaskGuard<T>(pub JoinHandle<T>);

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
