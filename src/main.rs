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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sshchain::forwarding::{forward_ports, parse_forwards};
use sshchain::jump::{chain, read_jumps, shuffle_jumps, ChainSettings};
use sshchain::shutdown::Coordinator;
use sshchain::{Cli, ConnectionRegistry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::new("sshchain=info"),
        1 => EnvFilter::new("sshchain=debug"),
        _ => EnvFilter::new("sshchain=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if cli.forwards.is_empty() {
        anyhow::bail!("no forwarding specifications given");
    }
    let forwards = parse_forwards(&cli.forwards)?;
    info!("parsed {} forwarding specifications", forwards.len());
    for (index, spec) in forwards.iter().enumerate() {
        info!("{index}: {}", spec.describe());
    }

    let mut jumps = read_jumps(&cli.jumps, &cli.key_dir).context("unable to read jumpfile")?;
    info!("read {} jumps from {}", jumps.len(), cli.jumps.display());
    if cli.shuffle {
        shuffle_jumps(&mut jumps);
        info!("shuffled jump list");
    }

    let mut coordinator = Coordinator::new();
    coordinator.spawn_signal_watcher();
    let cancel = coordinator.cancel_token();
    let registry = ConnectionRegistry::new();

    let settings = ChainSettings {
        njump: cli.njump,
        connect_timeout: cli.connect_timeout,
        handshake_timeout: cli.handshake_timeout,
        keepalive_interval: cli.keepalive_interval,
        exit_test: cli.exit_test.clone(),
    };

    info!("making SSH jumps");
    let chain = chain::build(jumps, &settings, &cancel)
        .await
        .context("unable to make SSH connections")?;

    let tail = chain.tail().context("chain is empty")?.clone();
    let mut listeners = match forward_ports(
        &tail,
        &forwards,
        &registry,
        &coordinator.error_sender(),
        &cancel,
    )
    .await
    {
        Ok(listeners) => listeners,
        Err(err) => {
            chain.close().await;
            return Err(err.context("unable to forward ports"));
        }
    };

    // Wait for something bad to happen.
    if let Some(err) = coordinator.wait().await {
        error!("error: {err:#}");
        cancel.cancel();
    }

    listeners.close_all().await;
    info!("closing proxied connections");
    registry.close_all();
    chain.close().await;

    Ok(())
}
