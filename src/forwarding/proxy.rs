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

//! Bidirectional byte copying for one proxied pair.
//!
//! Two copy halves run concurrently, one per direction, each recording its
//! byte count and terminal error. The pair is complete only when both halves
//! have returned. The halves have no timeout of their own; they run to EOF,
//! or until the registry closes one of the pair's connections.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::registry::ConnectionGuard;

const COPY_BUFFER_SIZE: usize = 8192;

/// Final accounting for one proxied pair. `up` is inbound-to-target, `down`
/// is target-to-inbound.
#[derive(Debug)]
pub struct PairOutcome {
    pub bytes_up: u64,
    pub up_error: Option<String>,
    pub bytes_down: u64,
    pub down_error: Option<String>,
}

impl PairOutcome {
    pub fn up_error_label(&self) -> &str {
        self.up_error.as_deref().unwrap_or("none")
    }

    pub fn down_error_label(&self) -> &str {
        self.down_error.as_deref().unwrap_or("none")
    }
}

/// Copy bytes in both directions until both sides finish.
///
/// A half that reaches EOF shuts down its peer's write side so the other
/// half can drain and finish too. When the registry closes either member of
/// the pair, both halves are abandoned and their sockets dropped; counts
/// reflect whatever had been copied by then.
pub async fn copy_pair<I, O>(
    inbound: I,
    outbound: O,
    inbound_guard: &ConnectionGuard,
    outbound_guard: &ConnectionGuard,
) -> PairOutcome
where
    I: AsyncRead + AsyncWrite + Unpin + Send,
    O: AsyncRead + AsyncWrite + Unpin + Send,
{
    let bytes_up = AtomicU64::new(0);
    let bytes_down = AtomicU64::new(0);

    let (mut inbound_read, mut inbound_write) = io::split(inbound);
    let (mut outbound_read, mut outbound_write) = io::split(outbound);

    let up = async {
        let result = copy_half(&mut inbound_read, &mut outbound_write, &bytes_up).await;
        let _ = outbound_write.shutdown().await;
        result
    };
    let down = async {
        let result = copy_half(&mut outbound_read, &mut inbound_write, &bytes_down).await;
        let _ = inbound_write.shutdown().await;
        result
    };

    let (up_error, down_error) = tokio::select! {
        (up_result, down_result) = async { tokio::join!(up, down) } => {
            (error_label(up_result), error_label(down_result))
        }
        _ = inbound_guard.closed() => (Some("interrupt".to_string()), Some("interrupt".to_string())),
        _ = outbound_guard.closed() => (Some("interrupt".to_string()), Some("interrupt".to_string())),
    };

    PairOutcome {
        bytes_up: bytes_up.load(Ordering::Relaxed),
        up_error,
        bytes_down: bytes_down.load(Ordering::Relaxed),
        down_error,
    }
}

async fn copy_half<R, W>(reader: &mut R, writer: &mut W, count: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buffer[..n]).await?;
        count.fetch_add(n as u64, Ordering::Relaxed);
    }
}

fn error_label(result: io::Result<()>) -> Option<String> {
    result.err().map(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use tokio::io::duplex;

    #[tokio::test]
    async fn copies_both_directions_and_counts_bytes() {
        let registry = ConnectionRegistry::new();
        let guard_in = registry.register();
        let guard_out = registry.register();

        let (inbound, mut client_side) = duplex(64);
        let (outbound, mut target_side) = duplex(64);

        let pair = tokio::spawn(async move {
            copy_pair(inbound, outbound, &guard_in, &guard_out).await
        });

        client_side.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        target_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        target_side.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        // Closing both ends drives both halves to EOF.
        drop(client_side);
        drop(target_side);

        let outcome = pair.await.unwrap();
        assert_eq!(outcome.bytes_up, 4);
        assert_eq!(outcome.bytes_down, 5);
        assert!(outcome.up_error.is_none());
        assert!(outcome.down_error.is_none());
    }

    #[tokio::test]
    async fn eof_on_one_side_completes_the_pair() {
        let registry = ConnectionRegistry::new();
        let guard_in = registry.register();
        let guard_out = registry.register();

        let (inbound, mut client_side) = duplex(64);
        let (outbound, mut target_side) = duplex(64);

        let pair = tokio::spawn(async move {
            copy_pair(inbound, outbound, &guard_in, &guard_out).await
        });

        client_side.write_all(b"bye").await.unwrap();
        drop(client_side);

        // The up half finishes and shuts the target's write side; reading the
        // remaining bytes then EOF lets the down half finish as well.
        let mut received = Vec::new();
        target_side.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
        drop(target_side);

        let outcome = pair.await.unwrap();
        assert_eq!(outcome.bytes_up, 3);
        assert_eq!(outcome.bytes_down, 0);
    }

    #[tokio::test]
    async fn registry_close_interrupts_the_pair() {
        let registry = ConnectionRegistry::new();
        let guard_in = registry.register();
        let guard_out = registry.register();

        let (inbound, _client_side) = duplex(64);
        let (outbound, _target_side) = duplex(64);

        let registry_clone = registry.clone();
        let pair = tokio::spawn(async move {
            let outcome = copy_pair(inbound, outbound, &guard_in, &guard_out).await;
            registry_clone.close(&guard_in);
            registry_clone.close(&guard_out);
            outcome
        });

        tokio::task::yield_now().await;
        registry.close_all();

        let outcome = pair.await.unwrap();
        assert_eq!(outcome.up_error.as_deref(), Some("interrupt"));
        assert_eq!(outcome.down_error.as_deref(), Some("interrupt"));
        assert!(registry.is_empty());
    }
}
