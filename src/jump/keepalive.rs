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

//! Keepalive driver for the chain tail.
//!
//! The tail's transport emits `keepalive@openssh.com` (want-reply) at the
//! configured interval; after too many missed replies the session dies. This
//! driver watches the tail at the same cadence and, once the session is gone,
//! exits and cancels the shared token, which is the signal that collapses
//! the whole process.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ssh::Client;

pub fn spawn(tail: Client, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        info!("sending keepalives every {:?} to last jump", interval);
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if tail.is_closed().await {
                        warn!("no longer sending keepalives: session closed");
                        break;
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
        cancel.cancel();
    });
}
