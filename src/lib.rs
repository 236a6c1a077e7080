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

//! sshchain builds a chain of nested SSH sessions, each one tunneled inside
//! the previous, and forwards TCP ports over the final hop, obscuring the
//! origin of the connections that come out the far end.

pub mod cli;
pub mod forwarding;
pub mod jump;
pub mod registry;
pub mod shutdown;
pub mod ssh;

pub use cli::Cli;
pub use registry::ConnectionRegistry;
