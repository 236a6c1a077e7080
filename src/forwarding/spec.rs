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

//! Forward specification parsing.
//!
//! A forward spec is a single command-line argument of the form
//!
//! ```text
//! L<listenhost>,<listenport>,<targethost>,<targetport>
//! R<listenhost>,<listenport>,<targethost>,<targetport>
//! ```
//!
//! `L` binds the listen address locally and dials targets through the chain
//! tail; `R` binds it on the tail's SSH server and dials targets through the
//! local network stack. Parsing and re-serializing a valid spec yields the
//! original string.

use std::fmt;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static FORWARD_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(L|R)([^,]+),(\d+),([^,]+),(\d+)$").expect("forward spec pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Listen locally, dial targets through the tail.
    Local,
    /// Listen on the tail's server, dial targets locally.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub direction: Direction,
    pub listen_host: String,
    pub listen_port: u16,
    pub target_host: String,
    pub target_port: u16,
}

impl ForwardSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let captures = FORWARD_SPEC
            .captures(spec)
            .with_context(|| format!("invalid forwarding specification {spec:?}"))?;

        let direction = match &captures[1] {
            "L" => Direction::Local,
            _ => Direction::Remote,
        };
        let listen_port = captures[3]
            .parse()
            .with_context(|| format!("invalid listen port in {spec:?}"))?;
        let target_port = captures[5]
            .parse()
            .with_context(|| format!("invalid target port in {spec:?}"))?;

        Ok(Self {
            direction,
            listen_host: captures[2].to_string(),
            listen_port,
            target_host: captures[4].to_string(),
            target_port,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    /// Human-readable direction summary for startup logging.
    pub fn describe(&self) -> String {
        match self.direction {
            Direction::Local => format!("{} -> {}", self.listen_addr(), self.target_addr()),
            Direction::Remote => format!("{} <- {}", self.target_addr(), self.listen_addr()),
        }
    }
}

/// Serializes back to the argument the spec was parsed from.
impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Local => 'L',
            Direction::Remote => 'R',
        };
        write!(
            f,
            "{direction}{},{},{},{}",
            self.listen_host, self.listen_port, self.target_host, self.target_port
        )
    }
}

/// Parse every command-line forward spec; any invalid spec is an error.
pub fn parse_forwards<S: AsRef<str>>(specs: &[S]) -> Result<Vec<ForwardSpec>> {
    specs.iter().map(|s| ForwardSpec::parse(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_spec() {
        let spec = ForwardSpec::parse("L127.0.0.1,9000,example.com,80").unwrap();
        assert_eq!(spec.direction, Direction::Local);
        assert_eq!(spec.listen_addr(), "127.0.0.1:9000");
        assert_eq!(spec.target_addr(), "example.com:80");
    }

    #[test]
    fn parses_remote_spec() {
        let spec = ForwardSpec::parse("R0.0.0.0,7000,127.0.0.1,22").unwrap();
        assert_eq!(spec.direction, Direction::Remote);
        assert_eq!(spec.listen_addr(), "0.0.0.0:7000");
        assert_eq!(spec.target_addr(), "127.0.0.1:22");
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "L127.0.0.1,9000,example.com,80",
            "R0.0.0.0,7000,127.0.0.1,22",
            "Llocalhost,8080,10.0.0.1,443",
        ] {
            let spec = ForwardSpec::parse(input).unwrap();
            assert_eq!(spec.to_string(), input);
            assert_eq!(ForwardSpec::parse(&spec.to_string()).unwrap(), spec);
        }
    }

    #[test]
    fn rejects_malformed_specs() {
        for input in [
            "",
            "X127.0.0.1,9000,example.com,80",
            "l127.0.0.1,9000,example.com,80",
            "L127.0.0.1,9000,example.com",
            "L127.0.0.1,port,example.com,80",
            "L127.0.0.1,9000,example.com,80,extra",
            "L,9000,example.com,80",
        ] {
            assert!(ForwardSpec::parse(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn rejects_out_of_range_ports() {
        assert!(ForwardSpec::parse("L127.0.0.1,65536,example.com,80").is_err());
        assert!(ForwardSpec::parse("L127.0.0.1,9000,example.com,99999").is_err());
    }

    #[test]
    fn parse_forwards_fails_on_first_invalid() {
        let specs = ["L127.0.0.1,9000,example.com,80".to_string(), "bogus".to_string()];
        assert!(parse_forwards(&specs).is_err());
    }

    #[test]
    fn describe_orients_by_direction() {
        let local = ForwardSpec::parse("L127.0.0.1,9000,example.com,80").unwrap();
        assert_eq!(local.describe(), "127.0.0.1:9000 -> example.com:80");

        let remote = ForwardSpec::parse("R0.0.0.0,7000,127.0.0.1,22").unwrap();
        assert_eq!(remote.describe(), "127.0.0.1:22 <- 0.0.0.0:7000");
    }
}
