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

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

const AFTER_HELP: &str = "\
The jumpfile must contain lines of the form

    user@host password versionstring

If the password is of the form key:filename, the rest names a PEM-encoded
private key file (resolved under --key-dir when relative). If the file
cannot be read, the whole string (prefix included) is used as a password.

Each FWDSPEC should be of one of the following forms

    L<listenaddr>,<listenport>,<targetaddr>,<targetport>
    R<listenaddr>,<listenport>,<targetaddr>,<targetport>

similar to OpenSSH's -L and -R options, but always with two address/port
pairs.";

#[derive(Parser, Debug)]
#[command(
    name = "sshchain",
    version,
    about = "Build a chain of nested SSH sessions and forward TCP ports through the last hop",
    after_help = AFTER_HELP
)]
pub struct Cli {
    #[arg(long = "jumps", value_name = "FILE", help = "File containing SSH jumps")]
    pub jumps: PathBuf,

    #[arg(
        long,
        default_value_t = 5,
        value_name = "N",
        help = "Use the first N working jumps in the jumpfile, or 0 to use all of them"
    )]
    pub njump: usize,

    #[arg(long, help = "Shuffle the list of jumps")]
    pub shuffle: bool,

    #[arg(
        long,
        default_value = "15s",
        value_parser = parse_duration,
        value_name = "DURATION",
        help = "SSH handshake timeout"
    )]
    pub handshake_timeout: Duration,

    #[arg(
        long,
        default_value = "10s",
        value_parser = parse_duration,
        value_name = "DURATION",
        help = "TCP connection timeout"
    )]
    pub connect_timeout: Duration,

    #[arg(
        long,
        default_value = "1s",
        value_parser = parse_duration,
        value_name = "DURATION",
        help = "SSH keepalive interval"
    )]
    pub keepalive_interval: Duration,

    #[arg(
        long,
        default_value = "check.torproject.org:443",
        value_name = "HOST:PORT",
        help = "Host and port used to test the last jump's forwarding ability"
    )]
    pub exit_test: String,

    #[arg(
        long,
        default_value = ".",
        value_name = "DIR",
        help = "Top-level directory for keys with a non-absolute path"
    )]
    pub key_dir: PathBuf,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    #[arg(value_name = "FWDSPEC", help = "Forwarding specifications")]
    pub forwards: Vec<String>,
}

fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    Ok(humantime::Duration::from_str(value)
        .map_err(|err| anyhow::anyhow!("invalid duration {value:?}: {err}"))?
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["sshchain", "--jumps", "jumps.txt", "L1,2,3,4"]).unwrap();
        assert_eq!(cli.njump, 5);
        assert!(!cli.shuffle);
        assert_eq!(cli.handshake_timeout, Duration::from_secs(15));
        assert_eq!(cli.connect_timeout, Duration::from_secs(10));
        assert_eq!(cli.keepalive_interval, Duration::from_secs(1));
        assert_eq!(cli.exit_test, "check.torproject.org:443");
        assert_eq!(cli.key_dir, PathBuf::from("."));
        assert_eq!(cli.forwards, vec!["L1,2,3,4".to_string()]);
    }

    #[test]
    fn jumpfile_is_required() {
        assert!(Cli::try_parse_from(["sshchain", "Lh,1,t,2"]).is_err());
    }

    #[test]
    fn durations_accept_humantime_forms() {
        let cli = Cli::try_parse_from([
            "sshchain",
            "--jumps",
            "jumps.txt",
            "--handshake-timeout",
            "1m 30s",
            "--connect-timeout",
            "500ms",
            "Lh,1,t,2",
        ])
        .unwrap();
        assert_eq!(cli.handshake_timeout, Duration::from_secs(90));
        assert_eq!(cli.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(Cli::try_parse_from([
            "sshchain",
            "--jumps",
            "jumps.txt",
            "--handshake-timeout",
            "soon",
            "Lh,1,t,2",
        ])
        .is_err());
    }

    #[test]
    fn multiple_forward_specs_are_positional() {
        let cli = Cli::try_parse_from([
            "sshchain",
            "--jumps",
            "jumps.txt",
            "L127.0.0.1,9000,example.com,80",
            "R0.0.0.0,7000,127.0.0.1,22",
        ])
        .unwrap();
        assert_eq!(cli.forwards.len(), 2);
    }
}
