//! Integration coverage for the synchronous RPC surface (C1, C6, C11)
//! over real HTTP, exercised with `reqwest` against a server spawned on
//! an ephemeral port — the same `spawn_server` shape `gateway.rs` uses
//! for the WebSocket surface.

mod support;

use im_core::http;
use serde_json::json;
use support::test_env;

async fn spawn_server(state: im_core::state::AppState) -> String {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn register_login_and_send_message_round_trip_over_http() {
    let env = test_env().await;
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let register: serde_json::Value = client
        .post(format!("{base}/v1/auth/register"))
        .json(&json!({"username": "nora", "password": "hunter2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let nora_id = register["user_id"].as_i64().unwrap();

    let register2: serde_json::Value = client
        .post(format!("{base}/v1/auth/register"))
        .json(&json!({"username": "owen", "password": "hunter2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let owen_id = register2["user_id"].as_i64().unwrap();

    let dup = client
        .post(format!("{base}/v1/auth/register"))
        .json(&json!({"username": "nora", "password": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), reqwest::StatusCode::CONFLICT);

    let login: serde_json::Value = client
        .post(format!("{base}/v1/auth/login"))
        .json(&json!({"username": "nora", "password": "hunter2", "device_id": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(login["user_id"].as_i64().unwrap(), nora_id);

    let bad_login = client
        .post(format!("{base}/v1/auth/login"))
        .json(&json!({"username": "nora", "password": "wrong", "device_id": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_login.status(), reqwest::StatusCode::UNAUTHORIZED);

    let unauthenticated_send = client
        .post(format!("{base}/v1/messages"))
        .json(&json!({
            "recipient_id": owen_id,
            "content": {"kind": "text", "body": "hi"},
            "client_msg_id": "no-token"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated_send.status(), reqwest::StatusCode::UNAUTHORIZED);

    let not_friends = client
        .post(format!("{base}/v1/messages"))
        .bearer_auth(&token)
        .json(&json!({
            "recipient_id": owen_id,
            "content": {"kind": "text", "body": "hi"},
            "client_msg_id": "m1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(not_friends.status(), reqwest::StatusCode::FORBIDDEN);

    let send_request = client
        .post(format!("{base}/v1/friends/requests"))
        .bearer_auth(&token)
        .json(&json!({"recipient_id": owen_id, "message": "let's be friends"}))
        .send()
        .await
        .unwrap();
    assert_eq!(send_request.status(), reqwest::StatusCode::OK);

    let owen_login: serde_json::Value = client
        .post(format!("{base}/v1/auth/login"))
        .json(&json!({"username": "owen", "password": "hunter2", "device_id": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let owen_token = owen_login["token"].as_str().unwrap().to_string();

    let received: serde_json::Value = client
        .get(format!("{base}/v1/friends/requests/received"))
        .bearer_auth(&owen_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = received["requests"][0]["id"].as_i64().unwrap();

    let handled = client
        .post(format!("{base}/v1/friends/requests/{request_id}/handle"))
        .bearer_auth(&owen_token)
        .json(&json!({"action": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(handled.status(), reqwest::StatusCode::OK);

    let friend_list: serde_json::Value = client
        .get(format!("{base}/v1/friends"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(friend_list[0]["friend_id"].as_i64().unwrap(), owen_id);

    let sent: serde_json::Value = client
        .post(format!("{base}/v1/messages"))
        .bearer_auth(&token)
        .json(&json!({
            "recipient_id": owen_id,
            "content": {"kind": "text", "body": "hi now that we're friends"},
            "client_msg_id": "m1"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["seq"].as_i64().unwrap(), 1);

    let replay: serde_json::Value = client
        .post(format!("{base}/v1/messages"))
        .bearer_auth(&token)
        .json(&json!({
            "recipient_id": owen_id,
            "content": {"kind": "text", "body": "different body, same key"},
            "client_msg_id": "m1"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        replay["message_id"], sent["message_id"],
        "replaying the same client_msg_id over HTTP must return the cached reply"
    );
}

#[tokio::test]
async fn health_and_readiness_endpoints_report_ok() {
    let env = test_env().await;
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let healthz = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(healthz.status(), reqwest::StatusCode::OK);

    let readyz = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert_eq!(readyz.status(), reqwest::StatusCode::OK);
}
