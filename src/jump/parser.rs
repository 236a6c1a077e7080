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

//! Jumpfile reading.
//!
//! A jumpfile is UTF-8 text, one jump per line. Blank lines and lines
//! starting with `#` are ignored; every other line must match
//!
//! ```text
//! user@host[:port] secret SSH-version-banner
//! ```
//!
//! A secret starting with `key:` names a private-key file, resolved under the
//! key directory when relative. A key file that cannot be read demotes the
//! secret to a literal password, prefix included. Lines that do not match the
//! grammar are logged and skipped whole.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use russh::keys::PrivateKey;
use tracing::warn;
use zeroize::Zeroizing;

/// Secret prefix naming a private-key file instead of a password.
pub const KEY_PREFIX: &str = "key:";

const DEFAULT_PORT: u16 = 22;

static JUMP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^@]+)@(\S+)\s+(.*)\s(SSH-\S+)$").expect("jump line pattern"));

/// One entry of the jumpfile: the immutable credential tuple for a hop.
#[derive(Debug, Clone)]
pub struct Jump {
    pub username: String,
    /// Hostname, optionally with a `:port` suffix.
    pub host: String,
    /// Password, or the verbatim `key:`-prefixed string when it named a key.
    pub secret: Zeroizing<String>,
    /// Version banner advertised to the server. Always starts with `SSH-`.
    pub version: String,
    /// Parsed private key when the secret named a readable key file.
    pub key: Option<Arc<PrivateKey>>,
}

impl Jump {
    /// The host normalized to `host:port`, appending the default SSH port
    /// when the port segment is missing or unparsable.
    pub fn host_port(&self) -> String {
        match self.host.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                self.host.clone()
            }
            _ => format!("{}:{DEFAULT_PORT}", self.host),
        }
    }

    /// Loggable description of the jump. Never includes the secret.
    pub fn connection_string(&self) -> String {
        format!("{}@{} ({})", self.username, self.host_port(), self.version)
    }
}

/// Serializes back to the jumpfile line the jump was parsed from.
impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {} {}",
            self.username, self.host, *self.secret, self.version
        )
    }
}

/// Read and parse the jumpfile at `path`.
///
/// Relative `key:` paths are resolved under `key_dir`. Errors only when the
/// file cannot be read or contains no usable jumps.
pub fn read_jumps(path: &Path, key_dir: &Path) -> Result<Vec<Jump>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read jump file {}", path.display()))?;

    let mut jumps = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(captures) = JUMP_LINE.captures(line) else {
            warn!("invalid line in jump file: {line:?}");
            continue;
        };

        let username = captures[1].to_string();
        let host = captures[2].to_string();
        let secret = captures[3].to_string();
        let version = captures[4].to_string();

        let key = match secret.strip_prefix(KEY_PREFIX) {
            Some(key_file) => match load_key(key_dir, key_file) {
                Ok(key) => Some(Arc::new(key)),
                Err(err) => {
                    warn!("unable to retrieve key for {username}@{host} from {key_file}: {err}");
                    None
                }
            },
            None => None,
        };

        jumps.push(Jump {
            username,
            host,
            secret: Zeroizing::new(secret),
            version,
            key,
        });
    }

    if jumps.is_empty() {
        bail!("no jumps in {}", path.display());
    }
    Ok(jumps)
}

/// Shuffle the jump list in place with a PRNG seeded from the OS CSPRNG.
pub fn shuffle_jumps(jumps: &mut [Jump]) {
    let mut rng = StdRng::from_entropy();
    jumps.shuffle(&mut rng);
}

fn load_key(key_dir: &Path, key_file: &str) -> Result<PrivateKey, russh::keys::Error> {
    let path = Path::new(key_file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        key_dir.join(path)
    };
    russh::keys::load_secret_key(path, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse_lines(contents: &str) -> Result<Vec<Jump>> {
        let mut file = tempfile::NamedTempFile::new().expect("temp jumpfile");
        file.write_all(contents.as_bytes()).expect("write jumpfile");
        read_jumps(file.path(), Path::new("."))
    }

    #[test]
    fn parses_a_plain_line() {
        let jumps = parse_lines("u@127.0.0.1:2201 p SSH-2.0-X\n").unwrap();
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].username, "u");
        assert_eq!(jumps[0].host, "127.0.0.1:2201");
        assert_eq!(*jumps[0].secret, "p");
        assert_eq!(jumps[0].version, "SSH-2.0-X");
        assert!(jumps[0].key.is_none());
    }

    #[test]
    fn secret_may_contain_spaces() {
        let jumps = parse_lines("bob@host correct horse battery SSH-2.0-Y\n").unwrap();
        assert_eq!(*jumps[0].secret, "correct horse battery");
        assert_eq!(jumps[0].version, "SSH-2.0-Y");
    }

    #[test]
    fn skips_blank_lines_comments_and_garbage() {
        let jumps = parse_lines(
            "# a comment\n\
             \n\
             not a jump line\n\
             u@h p SSH-2.0-X\n\
             also@not a jump\n",
        )
        .unwrap();
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].username, "u");
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(parse_lines("# only comments\n\n").is_err());
    }

    #[test]
    fn unreadable_key_file_falls_back_to_password() {
        let jumps = parse_lines("u@h key:/does/not/exist SSH-2.0-X\n").unwrap();
        assert!(jumps[0].key.is_none());
        assert_eq!(*jumps[0].secret, "key:/does/not/exist");
    }

    #[test]
    fn host_port_appends_default_port() {
        let jumps = parse_lines(
            "a@bare p SSH-2.0-X\n\
             b@with:2222 p SSH-2.0-X\n\
             c@bad:port p SSH-2.0-X\n",
        )
        .unwrap();
        assert_eq!(jumps[0].host_port(), "bare:22");
        assert_eq!(jumps[1].host_port(), "with:2222");
        assert_eq!(jumps[2].host_port(), "bad:port:22");
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        let original = "u@127.0.0.1:2201 p SSH-2.0-X\n\
                        bob@host correct horse battery SSH-2.0-Y\n\
                        eve@h key:/does/not/exist SSH-2.0-Z\n";
        let jumps = parse_lines(original).unwrap();

        let serialized: String = jumps.iter().map(|j| format!("{j}\n")).collect();
        let reparsed = parse_lines(&serialized).unwrap();

        assert_eq!(jumps.len(), reparsed.len());
        for (a, b) in jumps.iter().zip(&reparsed) {
            assert_eq!(a.username, b.username);
            assert_eq!(a.host, b.host);
            assert_eq!(*a.secret, *b.secret);
            assert_eq!(a.version, b.version);
        }
    }

    #[test]
    fn shuffle_preserves_the_jump_set() {
        let mut jumps = parse_lines(
            "a@1 p SSH-2.0-X\n\
             b@2 p SSH-2.0-X\n\
             c@3 p SSH-2.0-X\n\
             d@4 p SSH-2.0-X\n",
        )
        .unwrap();
        let mut before: Vec<String> = jumps.iter().map(|j| j.username.clone()).collect();

        shuffle_jumps(&mut jumps);

        let mut after: Vec<String> = jumps.iter().map(|j| j.username.clone()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }
}
