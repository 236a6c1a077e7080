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

//! The polymorphic dialer.
//!
//! A [`Dialer`] produces a connected byte stream from a `host:port` string,
//! either via the OS network stack or tunneled through an established SSH
//! client as a `direct-tcpip` channel. The chain builder uses it to treat its
//! current position in the chain uniformly; the forward supervisor uses it to
//! dial forward targets through the right side of the tunnel.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use russh::client::Msg;
use russh::ChannelStream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::ssh::{self, Client};

#[derive(Debug, Clone)]
pub enum Dialer {
    /// The OS network stack.
    Local,
    /// An established SSH client; dials become `direct-tcpip` channels.
    Client(Client),
}

impl Dialer {
    pub async fn dial(&self, addr: &str) -> Result<DialedStream, ssh::Error> {
        match self {
            Dialer::Local => Ok(DialedStream::Tcp(TcpStream::connect(addr).await?)),
            Dialer::Client(client) => {
                let (host, port) = split_host_port(addr)?;
                let channel = client.open_direct_tcpip(host, port).await?;
                Ok(DialedStream::Tunnel(channel.into_stream()))
            }
        }
    }
}

/// A connected byte stream from either dialer variant.
pub enum DialedStream {
    Tcp(TcpStream),
    Tunnel(ChannelStream<Msg>),
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("timeout")]
    Timeout,
    #[error("interrupt")]
    Interrupted,
    #[error(transparent)]
    Connect(#[from] ssh::Error),
    #[error("dial task failed: {0}")]
    Task(tokio::task::JoinError),
}

/// Dial `addr` via `dialer`, racing the attempt against `timeout` and
/// `cancel`.
///
/// A dial that loses the race may still complete later; its connection is
/// then closed in the background and is never handed back to the caller.
pub async fn dial_with_timeout(
    dialer: &Dialer,
    addr: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DialedStream, DialError> {
    let dialer = dialer.clone();
    let target = addr.to_string();
    let mut attempt = tokio::spawn(async move { dialer.dial(&target).await });

    tokio::select! {
        joined = &mut attempt => match joined {
            Ok(dialed) => Ok(dialed?),
            Err(err) => Err(DialError::Task(err)),
        },
        _ = sleep(timeout) => {
            reap(attempt);
            Err(DialError::Timeout)
        }
        _ = cancel.cancelled() => {
            reap(attempt);
            Err(DialError::Interrupted)
        }
    }
}

/// Close whatever connection a lost dial race eventually produces.
fn reap(attempt: JoinHandle<Result<DialedStream, ssh::Error>>) {
    tokio::spawn(async move {
        if let Ok(Ok(stream)) = attempt.await {
            drop(stream);
        }
    });
}

pub(crate) fn split_host_port(addr: &str) -> Result<(&str, u16), ssh::Error> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(ssh::Error::AddressInvalid(addr.to_string()));
    };
    if host.is_empty() {
        return Err(ssh::Error::AddressInvalid(addr.to_string()));
    }
    let port = port
        .parse()
        .map_err(|_| ssh::Error::AddressInvalid(addr.to_string()))?;
    Ok((host, port))
}

impl AsyncRead for DialedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DialedStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            DialedStream::Tunnel(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DialedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            DialedStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            DialedStream::Tunnel(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DialedStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            DialedStream::Tunnel(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DialedStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            DialedStream::Tunnel(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_accepts_host_colon_port() {
        assert_eq!(split_host_port("example.com:443").unwrap(), ("example.com", 443));
        assert_eq!(split_host_port("127.0.0.1:22").unwrap(), ("127.0.0.1", 22));
    }

    #[test]
    fn split_host_port_rejects_malformed_addresses() {
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port(":443").is_err());
        assert!(split_host_port("host:notaport").is_err());
        assert!(split_host_port("host:99999").is_err());
    }

    #[tokio::test]
    async fn local_dial_reaches_a_loopback_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let dialed = Dialer::Local.dial(&addr).await;
        assert!(dialed.is_ok());
    }

    #[tokio::test]
    async fn local_dial_fails_on_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dialed = Dialer::Local.dial(&addr).await;
        assert!(dialed.is_err());
    }
}
