//! End-to-end sends through a complete in-process network
//!
//! Tests the following:
//! - Directory, relays and users wired together over loopback
//! - `/sendMessage` delivers to the destination's mailbox (200)
//! - Too few relays to build a circuit (500)
//! - A registered but dead relay, or an unknown destination (404)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use onion_common::{
    DirectoryClient, ErrorResponse, NodeEntry, ResultResponse, SendMessageResponse, StaticRoutes,
};
use onion_core::{NodeId, UserId};
use onion_crypto::RelayKeypair;
use onion_directory::Registry;
use onion_relay::RelayNode;
use onion_user::{SendSettings, UserNode};
use serde_json::json;
use tokio::net::TcpListener;

struct Network {
    users: Vec<(Arc<UserNode>, SocketAddr)>,
}

/// Start a directory, `relays` live relays, `ghosts` registered relays that
/// never answer, and users with the given ids.
async fn start_network(relays: u32, ghosts: u32, users: &[u32], settings: SendSettings) -> Network {
    let directory_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let directory_url = format!("http://{}", directory_listener.local_addr().unwrap());
    tokio::spawn(onion_directory::serve(
        directory_listener,
        Arc::new(Registry::new()),
    ));
    let directory = DirectoryClient::new(directory_url.clone());

    let mut routes = StaticRoutes::new();
    let mut relay_listeners = Vec::new();
    for id in 0..relays {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        routes = routes.with_relay(NodeId(id), listener.local_addr().unwrap());
        relay_listeners.push((NodeId(id), listener));
    }
    for id in relays..relays + ghosts {
        let closed = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        routes = routes.with_relay(NodeId(id), closed);

        let keypair = RelayKeypair::generate().unwrap();
        directory
            .register(&NodeEntry {
                node_id: NodeId(id),
                pub_key: keypair.public_key().to_encoded().unwrap(),
            })
            .await
            .unwrap();
    }
    let mut user_listeners = Vec::new();
    for &id in users {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        routes = routes.with_user(UserId(id), listener.local_addr().unwrap());
        user_listeners.push((UserId(id), listener));
    }
    let routes = Arc::new(routes);

    for (node_id, listener) in relay_listeners {
        let node = Arc::new(RelayNode::new(
            node_id,
            RelayKeypair::generate().unwrap(),
            routes.clone(),
            Duration::from_secs(5),
        ));
        directory.register(&node.node_entry().unwrap()).await.unwrap();
        tokio::spawn(onion_relay::serve(listener, node));
    }

    let mut started = Vec::new();
    for (user_id, listener) in user_listeners {
        let node = Arc::new(UserNode::new(
            user_id,
            DirectoryClient::new(directory_url.clone()),
            routes.clone(),
            settings,
        ));
        let addr = listener.local_addr().unwrap();
        tokio::spawn(onion_user::serve(listener, node.clone()));
        started.push((node, addr));
    }

    Network { users: started }
}

async fn send(from: SocketAddr, to: u32, message: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/sendMessage", from))
        .json(&json!({ "message": message, "destinationUserId": to }))
        .send()
        .await
        .unwrap()
}

async fn get_result<T: serde::de::DeserializeOwned>(addr: SocketAddr, path: &str) -> Option<T> {
    let body: ResultResponse<T> = reqwest::get(format!("http://{}{}", addr, path))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body.result
}

#[tokio::test]
async fn test_send_delivers_through_three_relays() {
    let net = start_network(3, 0, &[0, 1], SendSettings::default()).await;
    let (alice, alice_addr) = (&net.users[0].0, net.users[0].1);
    let (bob, bob_addr) = (&net.users[1].0, net.users[1].1);

    let resp = send(alice_addr, 1, "hello").await;
    assert_eq!(resp.status().as_u16(), 200);
    let sent: SendMessageResponse = resp.json().await.unwrap();

    let mut distinct = sent.circuit.clone();
    distinct.sort();
    assert_eq!(distinct, vec![NodeId(0), NodeId(1), NodeId(2)]);

    assert_eq!(bob.last_received().await.as_deref(), Some("hello"));
    assert_eq!(
        get_result::<String>(bob_addr, "/getLastReceivedMessage").await.as_deref(),
        Some("hello")
    );
    assert_eq!(
        get_result::<String>(alice_addr, "/getLastSentMessage").await.as_deref(),
        Some("hello")
    );
    assert_eq!(
        get_result::<Vec<NodeId>>(alice_addr, "/getLastCircuit").await,
        Some(sent.circuit)
    );

    // The sender's own mailbox is untouched
    assert!(alice.last_received().await.is_none());
}

#[tokio::test]
async fn test_repeated_sends_and_unicode() {
    let net = start_network(4, 0, &[0, 1], SendSettings::default()).await;
    let (_, alice_addr) = (&net.users[0].0, net.users[0].1);
    let bob = &net.users[1].0;

    for message in ["first", "héllo wörld 🧅", ""] {
        let resp = send(alice_addr, 1, message).await;
        assert_eq!(resp.status().as_u16(), 200, "sending {:?}", message);
        assert_eq!(bob.last_received().await.as_deref(), Some(message));
    }
}

#[tokio::test]
async fn test_longer_circuit() {
    let settings = SendSettings {
        circuit_length: 5,
        ..SendSettings::default()
    };
    let net = start_network(5, 0, &[0, 1], settings).await;
    let (alice, _) = (&net.users[0].0, net.users[0].1);
    let bob = &net.users[1].0;

    let circuit = alice.send_message(UserId(1), "five hops").await.unwrap();
    assert_eq!(circuit.len(), 5);
    assert_eq!(bob.last_received().await.as_deref(), Some("five hops"));
}

#[tokio::test]
async fn test_too_few_relays_is_internal_error() {
    let net = start_network(2, 0, &[0, 1], SendSettings::default()).await;
    let (alice, alice_addr) = (&net.users[0].0, net.users[0].1);
    let bob = &net.users[1].0;

    let resp = send(alice_addr, 1, "hello").await;
    assert_eq!(resp.status().as_u16(), 500);
    let err: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(err.code, "circuit");

    assert!(alice.last_sent().await.is_none());
    assert!(bob.last_received().await.is_none());
}

#[tokio::test]
async fn test_dead_relay_is_not_found() {
    // Every three-relay circuit includes the dead one
    let net = start_network(2, 1, &[0, 1], SendSettings::default()).await;
    let (alice, alice_addr) = (&net.users[0].0, net.users[0].1);
    let bob = &net.users[1].0;

    let resp = send(alice_addr, 1, "hello").await;
    assert_eq!(resp.status().as_u16(), 404);
    let err: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(err.code, "undeliverable");

    assert!(alice.last_sent().await.is_none());
    assert!(alice.last_circuit().await.is_some());
    assert!(bob.last_received().await.is_none());
}

#[tokio::test]
async fn test_unknown_destination_is_not_found() {
    let net = start_network(3, 0, &[0], SendSettings::default()).await;
    let alice_addr = net.users[0].1;

    let resp = send(alice_addr, 9, "anyone there?").await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_status() {
    let net = start_network(0, 0, &[0], SendSettings::default()).await;
    let body = reqwest::get(format!("http://{}/status", net.users[0].1))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "live");
}
