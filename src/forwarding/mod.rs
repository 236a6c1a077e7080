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

//! Port forwarding over the chain tail.
//!
//! Three pieces: the forward-spec grammar ([`spec`]), the supervisor that
//! owns listeners and accept loops ([`supervisor`]), and the per-pair copy
//! loop ([`proxy`]).

pub mod proxy;
pub mod spec;
pub mod supervisor;

pub use spec::{parse_forwards, Direction, ForwardSpec};
pub use supervisor::{forward_ports, Listeners};
