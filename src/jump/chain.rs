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

//! The chain builder.
//!
//! Consumes the jump list in order and produces a chain of live SSH clients
//! where each client is dialed through the previous one. Construction is
//! strictly sequential. Transient failures (dial, handshake, auth) skip the
//! offending record; structural failures (the hop refuses to forward, or the
//! tail cannot reach the outside world) shorten the chain at the tail so a
//! different subset is tried. Cancellation is honored at every blocking
//! point, and every failure mode unwinds to zero live sessions.

use std::time::Duration;

use russh::ChannelOpenFailure;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dialer::{dial_with_timeout, DialError, DialedStream, Dialer};
use super::keepalive;
use super::parser::Jump;
use crate::ssh::{self, Client};

pub struct ChainSettings {
    /// Target chain length. 0 means use every working jump.
    pub njump: usize,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub keepalive_interval: Duration,
    /// `host:port` dialed through the tail to prove outbound reachability.
    pub exit_test: String,
}

/// An ordered chain of live SSH clients; client `i+1` was dialed through
/// client `i`. Always non-empty and reachability-probed on construction.
pub struct Chain {
    clients: Vec<Client>,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("interrupt")]
    Interrupted,
    #[error("insufficient SSH jumps (only made {made}/{wanted})")]
    InsufficientJumps { made: usize, wanted: usize },
    #[error("no working jumps found")]
    NoWorkingJumps,
}

/// Build the chain.
///
/// On success the keepalive driver is already running against the tail and
/// the tail has passed the reachability probe. On failure every session
/// opened along the way has been closed.
pub async fn build(
    jumps: Vec<Jump>,
    settings: &ChainSettings,
    cancel: &CancellationToken,
) -> Result<Chain, ChainError> {
    let mut dialer = Dialer::Local;
    let mut clients: Vec<Client> = Vec::new();
    // Whether the requested length was reached at least once. Decides between
    // insufficient-jumps and probe-driven shortening once records run out.
    let mut reached_cap = false;

    for jump in &jumps {
        if cancel.is_cancelled() {
            teardown(&mut clients).await;
            return Err(ChainError::Interrupted);
        }

        let addr = jump.host_port();
        let stream =
            match dial_with_timeout(&dialer, &addr, settings.connect_timeout, cancel).await {
                Ok(stream) => stream,
                Err(DialError::Connect(err)) if is_forwarding_prohibited(&err) => {
                    warn!(
                        "jump {} does not allow connection forwarding, closing",
                        clients.len()
                    );
                    shorten(&mut clients, &mut dialer).await;
                    continue;
                }
                Err(err) => {
                    warn!("unable to connect to {addr}: {err}");
                    continue;
                }
            };

        let client = match handshake_with_timeout(stream, jump, settings, cancel).await {
            Ok(client) => client,
            Err(err) => {
                warn!("unable to handshake as {}: {err}", jump.connection_string());
                continue;
            }
        };

        clients.push(client.clone());
        info!("jump {}: {}", clients.len(), jump.connection_string());

        if settings.njump > 0 && clients.len() >= settings.njump {
            reached_cap = true;
            match probe_exit(&client, &settings.exit_test, cancel).await {
                Ok(true) => {
                    keepalive::spawn(client, settings.keepalive_interval, cancel.clone());
                    return Ok(Chain { clients });
                }
                Ok(false) => {
                    shorten(&mut clients, &mut dialer).await;
                    continue;
                }
                Err(err) => {
                    teardown(&mut clients).await;
                    return Err(err);
                }
            }
        }

        dialer = Dialer::Client(client);
    }

    if cancel.is_cancelled() {
        teardown(&mut clients).await;
        return Err(ChainError::Interrupted);
    }

    if settings.njump > 0 && clients.len() < settings.njump && !reached_cap {
        let made = clients.len();
        teardown(&mut clients).await;
        return Err(ChainError::InsufficientJumps {
            made,
            wanted: settings.njump,
        });
    }

    // Out of records. Keep the longest tail that can still reach out.
    loop {
        if cancel.is_cancelled() {
            teardown(&mut clients).await;
            return Err(ChainError::Interrupted);
        }
        let Some(tail) = clients.last().cloned() else {
            return Err(ChainError::NoWorkingJumps);
        };
        match probe_exit(&tail, &settings.exit_test, cancel).await {
            Ok(true) => {
                keepalive::spawn(tail, settings.keepalive_interval, cancel.clone());
                return Ok(Chain { clients });
            }
            Ok(false) => {}
            Err(err) => {
                teardown(&mut clients).await;
                return Err(err);
            }
        }
        if clients.len() == 1 {
            teardown(&mut clients).await;
            return Err(ChainError::NoWorkingJumps);
        }
        info!("closing last jump");
        shorten(&mut clients, &mut dialer).await;
    }
}

impl Chain {
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The last client in the chain, which originates every user-visible
    /// forward.
    pub fn tail(&self) -> Option<&Client> {
        self.clients.last()
    }

    /// Close every client, tail first.
    pub async fn close(mut self) {
        teardown(&mut self.clients).await;
    }
}

#[derive(Debug, Error)]
enum HandshakeError {
    #[error("timeout")]
    Timeout,
    #[error("interrupt")]
    Interrupted,
    #[error(transparent)]
    Ssh(ssh::Error),
}

/// Race the handshake against the handshake timeout and cancellation. Losing
/// the race drops the handshake future, and the transport with it.
async fn handshake_with_timeout(
    stream: DialedStream,
    jump: &Jump,
    settings: &ChainSettings,
    cancel: &CancellationToken,
) -> Result<Client, HandshakeError> {
    tokio::select! {
        result = Client::handshake(stream, jump, settings.keepalive_interval) => {
            result.map_err(HandshakeError::Ssh)
        }
        _ = sleep(settings.handshake_timeout) => Err(HandshakeError::Timeout),
        _ = cancel.cancelled() => Err(HandshakeError::Interrupted),
    }
}

/// Whether an error says this hop will not forward connections for us.
fn is_forwarding_prohibited(err: &ssh::Error) -> bool {
    if matches!(
        err,
        ssh::Error::Ssh(russh::Error::ChannelOpenFailure(
            ChannelOpenFailure::AdministrativelyProhibited
        ))
    ) {
        return true;
    }
    // Some servers answer a channel open with a malformed packet instead of a
    // clean rejection; match the message such failures surface as.
    err.to_string()
        .ends_with("ssh: unexpected packet in response to channel open: <nil>")
}

/// Open and immediately close a TCP channel through the tail to `target`,
/// racing the attempt against cancellation. Proves the tail will forward
/// outbound connections for us.
async fn probe_exit(
    tail: &Client,
    target: &str,
    cancel: &CancellationToken,
) -> Result<bool, ChainError> {
    info!("making a test connection to {target}");
    let (host, port) = match super::dialer::split_host_port(target) {
        Ok(parts) => parts,
        Err(err) => {
            warn!("bad exit test target {target}: {err}");
            return Ok(false);
        }
    };
    tokio::select! {
        opened = tail.open_direct_tcpip(host, port) => match opened {
            Ok(channel) => {
                let _ = channel.close().await;
                info!("connection to {target} successful");
                Ok(true)
            }
            Err(err) => {
                warn!("connection to {target} failed: {err}");
                Ok(false)
            }
        },
        _ = cancel.cancelled() => Err(ChainError::Interrupted),
    }
}

/// Close and drop the tail, then re-derive the dialer from the new tail (or
/// the OS stack when the chain is empty). The only way the chain contracts.
async fn shorten(clients: &mut Vec<Client>, dialer: &mut Dialer) {
    if let Some(tail) = clients.pop() {
        if let Err(err) = tail.disconnect().await {
            warn!("unable to close jump {}: {err}", clients.len() + 1);
        }
    }
    *dialer = match clients.last() {
        Some(tail) => Dialer::Client(tail.clone()),
        None => Dialer::Local,
    };
}

/// Close every client in strictly decreasing index order.
async fn teardown(clients: &mut Vec<Client>) {
    for (index, client) in clients.iter().enumerate().rev() {
        match client.disconnect().await {
            Ok(()) => info!("closed jump {}", index + 1),
            Err(err) => warn!("unable to close jump {}: {err}", index + 1),
        }
    }
    clients.clear();
}
