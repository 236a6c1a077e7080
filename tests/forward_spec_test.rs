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

//! Forward-spec grammar from the outside.

use sshchain::forwarding::{parse_forwards, Direction, ForwardSpec};

#[test]
fn local_forward_spec() {
    let spec = ForwardSpec::parse("L127.0.0.1,9000,example.com,80").unwrap();
    assert_eq!(spec.direction, Direction::Local);
    assert_eq!(spec.listen_host, "127.0.0.1");
    assert_eq!(spec.listen_port, 9000);
    assert_eq!(spec.target_host, "example.com");
    assert_eq!(spec.target_port, 80);
}

#[test]
fn remote_forward_spec() {
    let spec = ForwardSpec::parse("R0.0.0.0,7000,127.0.0.1,22").unwrap();
    assert_eq!(spec.direction, Direction::Remote);
    assert_eq!(spec.listen_addr(), "0.0.0.0:7000");
    assert_eq!(spec.target_addr(), "127.0.0.1:22");
}

#[test]
fn every_valid_spec_reserializes_to_its_input() {
    for input in [
        "L127.0.0.1,9000,example.com,80",
        "R0.0.0.0,7000,127.0.0.1,22",
        "Lhostname,1,other,65535",
        "R[::1],8022,localhost,22",
    ] {
        let spec = ForwardSpec::parse(input).unwrap();
        assert_eq!(spec.to_string(), input, "round trip failed for {input:?}");
    }
}

#[test]
fn invalid_specs_are_rejected() {
    for input in [
        "T127.0.0.1,9000,example.com,80",
        "L127.0.0.1:9000:example.com:80",
        "L127.0.0.1,9000,,80",
        "9000,example.com,80",
        "L127.0.0.1,-1,example.com,80",
    ] {
        assert!(ForwardSpec::parse(input).is_err(), "accepted {input:?}");
    }
}

#[test]
fn parse_forwards_keeps_argument_order() {
    let args = [
        "L127.0.0.1,9000,example.com,80".to_string(),
        "R0.0.0.0,7000,127.0.0.1,22".to_string(),
    ];
    let specs = parse_forwards(&args).unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].direction, Direction::Local);
    assert_eq!(specs[1].direction, Direction::Remote);
}
