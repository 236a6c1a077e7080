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

//! Error type for the SSH client layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Protocol or transport failure reported by the SSH library.
    #[error(transparent)]
    Ssh(#[from] russh::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Every configured authentication method was rejected by the server.
    #[error("server rejected all authentication methods for {user}")]
    AuthenticationFailed { user: String },

    #[error("invalid address: {0:?}")]
    AddressInvalid(String),
}
