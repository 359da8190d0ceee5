mod support;

use im_core::auth::bearer;
use im_core::http;
use im_core::repo::users;
use im_protocol::{Command, Frame, SignInInput};
use im_test_support::MockWsClient;
use support::test_env;

async fn spawn_server(state: im_core::state::AppState) -> String {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws/v1/connect")
}

#[tokio::test]
async fn sign_in_over_anonymous_connection_succeeds_and_acks_request_id() {
    let env = test_env().await;
    let user_id = users::insert_user(&env.state.pool, "gw-user", "hash").await.unwrap();
    let (token, _) = bearer::issue(&env.state.config, user_id, 42).unwrap();

    let url = spawn_server(env.state.clone()).await;
    let mut client = MockWsClient::connect(&url).await.unwrap();

    let sign_in = Frame::ok_with(
        Command::SignIn,
        7,
        &SignInInput {
            device_id: 42,
            user_id: user_id as u64,
            token,
        },
    )
    .unwrap();
    client.send_frame(&sign_in).await.unwrap();

    let reply = client.recv_frame().await.unwrap();
    assert_eq!(reply.command, Command::SignIn);
    assert_eq!(reply.request_id, 7);
    assert_eq!(reply.code, 0);

    assert!(env.state.registry.get(42).is_some(), "device should be installed in the registry");
}

#[tokio::test]
async fn sign_in_with_mismatched_identity_is_rejected() {
    let env = test_env().await;
    let user_id = users::insert_user(&env.state.pool, "gw-user-2", "hash").await.unwrap();
    let (token, _) = bearer::issue(&env.state.config, user_id, 42).unwrap();

    let url = spawn_server(env.state.clone()).await;
    let mut client = MockWsClient::connect(&url).await.unwrap();

    let sign_in = Frame::ok_with(
        Command::SignIn,
        1,
        &SignInInput {
            device_id: 99,
            user_id: user_id as u64,
            token,
        },
    )
    .unwrap();
    client.send_frame(&sign_in).await.unwrap();

    assert!(
        client.recv_frame().await.is_err(),
        "server should close the connection rather than ack a mismatched identity"
    );
    assert!(env.state.registry.get(99).is_none());
}

#[tokio::test]
async fn query_param_token_authenticates_before_any_frame_is_sent() {
    let env = test_env().await;
    let user_id = users::insert_user(&env.state.pool, "gw-user-3", "hash").await.unwrap();
    let (token, _) = bearer::issue(&env.state.config, user_id, 7).unwrap();

    let url = spawn_server(env.state.clone()).await;
    let mut client = MockWsClient::connect_with_token(&url, &token).await.unwrap();

    // The server installs the device synchronously on upgrade; give its
    // task a moment to run before asserting on shared state.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(env.state.registry.get(7).is_some());

    // An unsupported command on an already-authenticated connection gets
    // an error reply rather than a silent drop.
    let heartbeat_echo = Frame::ok(Command::Message, 3);
    client.send_frame(&heartbeat_echo).await.unwrap();
    let reply = client.recv_frame().await.unwrap();
    assert_eq!(reply.command, Command::Error);
}
