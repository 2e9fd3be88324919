#![cfg(unix)]

mod common;

use std::time::Duration;

use parley_types::protocol::{ERR_BAD_REQUEST, ERR_NAME_TAKEN};
use parley_types::Response;

#[test]
fn test_presence_is_acknowledged() {
    let (mut router, addr) = common::bind_router();

    let mut client = common::RawClient::connect(&addr).unwrap();
    client.send_presence("alice").unwrap();
    common::drive_until_clients(&mut router, 1);

    assert_eq!(client.recv_response(), Response::ok());
    assert!(router.is_registered("alice"));
    assert_eq!(router.registered_names(), vec!["alice".to_string()]);
}

#[test]
fn test_duplicate_name_is_refused_and_closed() {
    let (mut router, addr) = common::bind_router();
    let mut alice = common::login(&mut router, &addr, "alice");

    let mut impostor = common::RawClient::connect(&addr).unwrap();
    impostor.send_presence("alice").unwrap();
    common::drive_until_stats(&mut router, |s| s.evicted == 1);

    assert_eq!(impostor.recv_response(), Response::bad_request(ERR_NAME_TAKEN));
    assert!(impostor.is_closed());

    // The first holder is untouched.
    assert_eq!(router.connection_count(), 1);
    let mut bob = common::login(&mut router, &addr, "bob");
    bob.send_chat("bob", "alice", "still here?").unwrap();
    common::drive_until_stats(&mut router, |s| s.delivered == 1);
    assert_eq!(alice.recv_envelope(), common::chat("bob", "alice", "still here?"));
}

#[test]
fn test_unrecognized_request_gets_bad_request() {
    let (mut router, addr) = common::bind_router();

    let mut client = common::RawClient::connect(&addr).unwrap();
    client.send_raw(br#"{"action": "get_contacts", "time": 1}"#).unwrap();
    common::drive_until_stats(&mut router, |s| s.evicted == 1);

    assert_eq!(client.recv_response(), Response::bad_request(ERR_BAD_REQUEST));
    assert!(client.is_closed());
    assert_eq!(router.connection_count(), 0);
}

#[test]
fn test_presence_missing_user_is_bad_request() {
    let (mut router, addr) = common::bind_router();

    let mut client = common::RawClient::connect(&addr).unwrap();
    client.send_raw(br#"{"action": "presence", "time": "12:00:00"}"#).unwrap();
    common::drive_until_stats(&mut router, |s| s.evicted == 1);

    assert_eq!(client.recv_response(), Response::bad_request(ERR_BAD_REQUEST));
    assert_eq!(router.client_count(), 0);
}

#[test]
fn test_malformed_frame_closes_without_reply() {
    let (mut router, addr) = common::bind_router();
    let mut alice = common::login(&mut router, &addr, "alice");

    alice.send_raw(b"{\"action\": \"message\", ").unwrap();
    common::drive_until_clients(&mut router, 0);

    assert!(alice.is_closed());
    assert_eq!(router.connection_count(), 0);
}

#[test]
fn test_exit_frees_the_name() {
    let (mut router, addr) = common::bind_router();
    let mut alice = common::login(&mut router, &addr, "alice");

    alice.send_exit("alice").unwrap();
    common::drive_until_clients(&mut router, 0);
    assert!(alice.is_closed());

    let _again = common::login(&mut router, &addr, "alice");
    assert!(router.is_registered("alice"));
}

#[test]
fn test_exit_for_unknown_name_keeps_connection() {
    let (mut router, addr) = common::bind_router();
    let mut alice = common::login(&mut router, &addr, "alice");

    alice.send_exit("nobody").unwrap();
    common::drive_until_stats(&mut router, |s| s.frames == 1);

    assert!(router.is_registered("alice"));
    assert!(alice.is_silent(Duration::from_millis(50)));
}

#[test]
fn test_hang_up_unregisters() {
    let (mut router, addr) = common::bind_router();
    let alice = common::login(&mut router, &addr, "alice");
    let _bob = common::login(&mut router, &addr, "bob");

    drop(alice);
    common::drive_until_clients(&mut router, 1);
    assert!(!router.is_registered("alice"));
    assert!(router.is_registered("bob"));
    assert_eq!(router.connection_count(), 1);
}
