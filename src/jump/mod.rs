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

//! Jump handling: jumpfile parsing, the dialer abstraction, the chain
//! builder, and the tail keepalive driver.

pub mod chain;
pub mod dialer;
pub mod keepalive;
pub mod parser;

pub use chain::{Chain, ChainError, ChainSettings};
pub use dialer::{dial_with_timeout, DialError, DialedStream, Dialer};
pub use parser::{read_jumps, shuffle_jumps, Jump, KEY_PREFIX};
