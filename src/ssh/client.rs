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

//! An asynchronous SSH client on top of russh.
//!
//! [`Client`] wraps an authenticated `russh::client::Handle` and exposes the
//! small surface the chain builder and the forward supervisor need: opening
//! `direct-tcpip` channels, requesting and cancelling remote listeners, and
//! orderly disconnect. A client is handshaken over an arbitrary byte stream,
//! so the same code path serves the first hop (a TCP socket) and every nested
//! hop (a channel stream through the previous client).

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Handler, KeyboardInteractiveAuthResponse, Msg, Session};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh::{Channel, Disconnect, SshId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::Error;
use crate::jump::Jump;

/// Unanswered keepalives tolerated before the transport declares the session
/// dead.
const KEEPALIVE_MAX: usize = 3;

/// An inbound connection delivered by the server for a remote forward.
pub struct ForwardedTcpIp {
    /// The server-side channel carrying the connection's bytes.
    pub channel: Channel<Msg>,
    /// Address the server listener was bound to.
    pub connected_address: String,
    /// Port the server listener was bound to.
    pub connected_port: u32,
    /// `host:port` of the peer that connected to the server listener.
    pub originator: String,
}

/// One authenticated SSH session.
///
/// Cloning is cheap; clones share the underlying session.
#[derive(Clone)]
pub struct Client {
    handle: Arc<Mutex<Handle<ClientHandler>>>,
    address: String,
    username: String,
    forwarded: Arc<std::sync::Mutex<Option<UnboundedReceiver<ForwardedTcpIp>>>>,
}

impl Client {
    /// Perform the SSH handshake and authentication over `stream`.
    ///
    /// Authentication methods are tried in order: password, then
    /// keyboard-interactive answering every prompt with the password, then
    /// the private key when the jump carries one. The jump's version banner
    /// is advertised as the client identification string, and the transport
    /// is configured to emit `keepalive@openssh.com` requests at
    /// `keepalive_interval`.
    pub async fn handshake<S>(
        stream: S,
        jump: &Jump,
        keepalive_interval: Duration,
    ) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = Arc::new(client::Config {
            client_id: SshId::Standard(jump.version.clone()),
            keepalive_interval: Some(keepalive_interval),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        });

        let (forwarded_tx, forwarded_rx) = mpsc::unbounded_channel();
        let handler = ClientHandler { forwarded_tx };

        let mut handle = client::connect_stream(config, stream, handler).await?;
        authenticate(&mut handle, jump).await?;

        Ok(Self {
            handle: Arc::new(Mutex::new(handle)),
            address: jump.host_port(),
            username: jump.username.clone(),
            forwarded: Arc::new(std::sync::Mutex::new(Some(forwarded_rx))),
        })
    }

    /// Open a `direct-tcpip` channel to `host:port`.
    ///
    /// The hostname is passed through verbatim; name resolution happens on
    /// the server side.
    pub async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<Channel<Msg>, Error> {
        let handle = self.handle.lock().await;
        Ok(handle
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await?)
    }

    /// Ask the server to listen on `address:port` and forward connections
    /// back over this session. Returns the port the server actually bound,
    /// which differs from the request when `port` is 0.
    pub async fn tcpip_forward(&self, address: &str, port: u32) -> Result<u32, Error> {
        let mut handle = self.handle.lock().await;
        Ok(handle.tcpip_forward(address, port).await?)
    }

    /// Tear down a remote listener previously set up with
    /// [`tcpip_forward`](Self::tcpip_forward).
    pub async fn cancel_tcpip_forward(&self, address: &str, port: u32) -> Result<(), Error> {
        let mut handle = self.handle.lock().await;
        handle.cancel_tcpip_forward(address, port).await?;
        Ok(())
    }

    /// Take the stream of server-initiated forwarded connections.
    ///
    /// Yields `Some` exactly once per client.
    pub fn take_forwarded(&self) -> Option<UnboundedReceiver<ForwardedTcpIp>> {
        self.forwarded.lock().ok().and_then(|mut slot| slot.take())
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        let handle = self.handle.lock().await;
        handle.disconnect(Disconnect::ByApplication, "", "").await?;
        Ok(())
    }

    /// Whether the underlying session has ended (disconnect, transport
    /// failure, or too many unanswered keepalives).
    pub async fn is_closed(&self) -> bool {
        self.handle.lock().await.is_closed()
    }

    /// `host:port` this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Try the authentication ladder against a freshly connected handle.
async fn authenticate(handle: &mut Handle<ClientHandler>, jump: &Jump) -> Result<(), Error> {
    if handle
        .authenticate_password(jump.username.as_str(), jump.secret.as_str())
        .await?
        .success()
    {
        return Ok(());
    }

    if keyboard_interactive(handle, jump).await? {
        return Ok(());
    }

    if let Some(key) = &jump.key {
        let hash = handle.best_supported_rsa_hash().await?.flatten();
        if handle
            .authenticate_publickey(
                jump.username.as_str(),
                PrivateKeyWithHashAlg::new(key.clone(), hash),
            )
            .await?
            .success()
        {
            return Ok(());
        }
    }

    Err(Error::AuthenticationFailed {
        user: jump.username.clone(),
    })
}

/// Keyboard-interactive authentication, answering every prompt with the
/// jump's password regardless of what the server asked.
async fn keyboard_interactive(
    handle: &mut Handle<ClientHandler>,
    jump: &Jump,
) -> Result<bool, Error> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(jump.username.as_str(), None::<String>)
        .await?;
    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = prompts.iter().map(|_| jump.secret.to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
}

/// Session-event handler shared by every hop.
///
/// Host keys are accepted as-is: jump credentials are taken as given and no
/// key policy applies. Server-initiated `forwarded-tcpip` channels are handed
/// to whoever holds the client's forwarded-connection receiver.
pub struct ClientHandler {
    forwarded_tx: UnboundedSender<ForwardedTcpIp>,
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // If nothing drains the receiver the channel is dropped here, which
        // closes it on the server.
        let _ = self.forwarded_tx.send(ForwardedTcpIp {
            channel,
            connected_address: connected_address.to_string(),
            connected_port,
            originator: format!("{originator_address}:{originator_port}"),
        });
        Ok(())
    }
}
