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

//! The forward supervisor.
//!
//! For each spec it opens the matching listener: a local TCP socket for `L`
//! forwards, or a `tcpip-forward` request on the tail's server for `R`
//! forwards. Accepted connections are registered, their peers dialed through
//! the spec's paired dialer, and the pair handed to the proxy copy loop, one
//! task per connection. A fatal accept error kills only its own listener and
//! is surfaced on the error channel; the top level decides what to do with
//! it.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::proxy;
use super::spec::{Direction, ForwardSpec};
use crate::jump::Dialer;
use crate::registry::ConnectionRegistry;
use crate::shutdown::TaskGuard;
use crate::ssh::{Client, ForwardedTcpIp};

/// The set of listeners the supervisor created, kept for teardown.
pub struct Listeners {
    tail: Client,
    entries: Vec<ListenerEntry>,
    dispatcher: Option<TaskGuard<()>>,
}

struct ListenerEntry {
    spec: ForwardSpec,
    kind: ListenerKind,
}

enum ListenerKind {
    Local {
        addr: std::net::SocketAddr,
        accept_task: TaskGuard<()>,
    },
    Remote {
        port: u32,
    },
}

/// Open a listener per forward spec and start serving connections.
///
/// On any setup failure the listeners opened so far are closed again and the
/// error is returned; nothing keeps running.
pub async fn forward_ports(
    tail: &Client,
    specs: &[ForwardSpec],
    registry: &ConnectionRegistry,
    errors: &UnboundedSender<anyhow::Error>,
    cancel: &CancellationToken,
) -> Result<Listeners> {
    let mut listeners = Listeners {
        tail: tail.clone(),
        entries: Vec::new(),
        dispatcher: None,
    };
    let mut routes: HashMap<u32, ForwardSpec> = HashMap::new();

    for spec in specs {
        match spec.direction {
            Direction::Local => {
                let listener = match TcpListener::bind(spec.listen_addr()).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        listeners.close_all().await;
                        return Err(
                            anyhow!(err).context(format!("unable to listen on {}", spec.listen_addr()))
                        );
                    }
                };
                let addr = match listener.local_addr() {
                    Ok(addr) => addr,
                    Err(err) => {
                        listeners.close_all().await;
                        return Err(anyhow!(err).context("listener has no local address"));
                    }
                };
                let accept_task = TaskGuard(tokio::spawn(accept_loop(
                    listener,
                    spec.clone(),
                    tail.clone(),
                    registry.clone(),
                    errors.clone(),
                    cancel.clone(),
                )));
                info!(
                    "listening on {addr} for forward connections to {}",
                    spec.target_addr()
                );
                listeners.entries.push(ListenerEntry {
                    spec: spec.clone(),
                    kind: ListenerKind::Local { addr, accept_task },
                });
            }
            Direction::Remote => {
                let port = match tail
                    .tcpip_forward(&spec.listen_host, u32::from(spec.listen_port))
                    .await
                {
                    Ok(port) => port,
                    Err(err) => {
                        listeners.close_all().await;
                        return Err(anyhow!(err).context(format!(
                            "unable to listen on remote {}",
                            spec.listen_addr()
                        )));
                    }
                };
                info!(
                    "listening on remote {}:{port} for reverse connections to {}",
                    spec.listen_host,
                    spec.target_addr()
                );
                routes.insert(port, spec.clone());
                listeners.entries.push(ListenerEntry {
                    spec: spec.clone(),
                    kind: ListenerKind::Remote { port },
                });
            }
        }
    }

    if !routes.is_empty() {
        let Some(incoming) = tail.take_forwarded() else {
            listeners.close_all().await;
            return Err(anyhow!("forwarded connection stream already taken"));
        };
        listeners.dispatcher = Some(TaskGuard(tokio::spawn(dispatch_loop(
            incoming,
            routes,
            registry.clone(),
            cancel.clone(),
        ))));
    }

    Ok(listeners)
}

impl Listeners {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every listener. Local accept loops are aborted (dropping their
    /// sockets); remote listeners are cancelled on the tail's server.
    pub async fn close_all(&mut self) {
        self.dispatcher = None;
        let entries: Vec<ListenerEntry> = self.entries.drain(..).collect();
        for entry in entries {
            let ListenerEntry { spec, kind } = entry;
            match kind {
                ListenerKind::Local { addr, accept_task } => {
                    drop(accept_task);
                    info!("closed listener {addr}");
                }
                ListenerKind::Remote { port } => {
                    match self.tail.cancel_tcpip_forward(&spec.listen_host, port).await {
                        Ok(()) => info!("closed remote listener {}:{port}", spec.listen_host),
                        Err(err) => warn!(
                            "unable to close remote listener {}:{port}: {err}",
                            spec.listen_host
                        ),
                    }
                }
            }
        }
    }
}

/// Accept connections for one local forward until the listener fails or the
/// supervisor shuts down.
async fn accept_loop(
    listener: TcpListener,
    spec: ForwardSpec,
    tail: Client,
    registry: ConnectionRegistry,
    errors: UnboundedSender<anyhow::Error>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let conn = format!("{peer}->{}", spec.target_addr());
                    tokio::spawn(handle_connection(
                        stream,
                        conn,
                        spec.target_addr(),
                        Dialer::Client(tail.clone()),
                        registry.clone(),
                    ));
                }
                Err(err) => {
                    let _ = errors.send(
                        anyhow!(err).context(format!("accept failed on {}", spec.listen_addr())),
                    );
                    return;
                }
            },
            _ = cancel.cancelled() => return,
        }
    }
}

/// Route server-initiated forwarded connections to their spec by bound port.
async fn dispatch_loop(
    mut incoming: UnboundedReceiver<ForwardedTcpIp>,
    routes: HashMap<u32, ForwardSpec>,
    registry: ConnectionRegistry,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            forwarded = incoming.recv() => {
                let Some(forwarded) = forwarded else { return };
                let Some(spec) = routes.get(&forwarded.connected_port) else {
                    debug!(
                        "dropping forwarded connection for unrequested port {}",
                        forwarded.connected_port
                    );
                    continue;
                };
                let conn = format!("{}<-{}", spec.target_addr(), forwarded.originator);
                tokio::spawn(handle_connection(
                    forwarded.channel.into_stream(),
                    conn,
                    spec.target_addr(),
                    Dialer::Local,
                    registry.clone(),
                ));
            }
            _ = cancel.cancelled() => return,
        }
    }
}

/// Serve one accepted connection: register it, dial its peer, proxy, and log
/// a single end-of-session line with both byte counts and both errors.
pub async fn handle_connection<S>(
    inbound: S,
    conn: String,
    target: String,
    dialer: Dialer,
    registry: ConnectionRegistry,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let inbound_guard = registry.register();

    let outbound = match dialer.dial(&target).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("unable to forward connection {conn}: {err}");
            registry.close(&inbound_guard);
            return;
        }
    };
    let outbound_guard = registry.register();

    info!("begin {conn}");
    let outcome = proxy::copy_pair(inbound, outbound, &inbound_guard, &outbound_guard).await;
    registry.close(&inbound_guard);
    registry.close(&outbound_guard);
    info!(
        "end {conn} up_bytes:{} up_err:{} down_bytes:{} down_err:{}",
        outcome.bytes_up,
        outcome.up_error_label(),
        outcome.bytes_down,
        outcome.down_error_label(),
    );
}
