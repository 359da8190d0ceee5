mod support;

use im_protocol::MessageContent;
use im_core::core::writer::SendMessageRequest;
use im_core::repo::{friends, users};
use support::test_env;

#[tokio::test]
async fn send_message_rejects_non_friends() {
    let env = test_env().await;
    let sender = users::insert_user(&env.state.pool, "alice", "hash").await.unwrap();
    let recipient = users::insert_user(&env.state.pool, "bob", "hash").await.unwrap();

    let result = env
        .state
        .writer()
        .send_message(
            sender,
            1,
            SendMessageRequest {
                recipient_id: recipient,
                content: MessageContent::Text { body: "hi".into() },
                client_msg_id: "c1".into(),
            },
        )
        .await;

    assert!(matches!(result, Err(im_core::error::AppError::PermissionDenied(_))));
}

#[tokio::test]
async fn send_message_succeeds_between_friends_and_replays_idempotently() {
    let env = test_env().await;
    let sender = users::insert_user(&env.state.pool, "carol", "hash").await.unwrap();
    let recipient = users::insert_user(&env.state.pool, "dave", "hash").await.unwrap();

    friends::create_friend_request(&env.state.pool, sender, recipient, "hi").await.unwrap();
    let request = friends::get_received_friend_requests(&env.state.pool, recipient, None, 1, 10)
        .await
        .unwrap()
        .0
        .into_iter()
        .next()
        .unwrap();
    friends::accept_friend_request(&env.state.pool, &request).await.unwrap();

    let writer = env.state.writer();
    let first = writer
        .send_message(
            sender,
            1,
            SendMessageRequest {
                recipient_id: recipient,
                content: MessageContent::Text { body: "hello".into() },
                client_msg_id: "same-key".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(first.seq, 1);
    assert!(first.conversation_id.starts_with("p_"));

    let replay = writer
        .send_message(
            sender,
            1,
            SendMessageRequest {
                recipient_id: recipient,
                content: MessageContent::Text { body: "hello, but different".into() },
                client_msg_id: "same-key".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(replay.message_id, first.message_id, "identical idempotency key must replay the cached reply");
    assert_eq!(replay.seq, first.seq);

    let second = writer
        .send_message(
            sender,
            1,
            SendMessageRequest {
                recipient_id: recipient,
                content: MessageContent::Text { body: "again".into() },
                client_msg_id: "second-key".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(second.seq, 2, "a distinct idempotency key reserves a new seq");
}

#[tokio::test]
async fn send_message_rejects_empty_client_msg_id() {
    let env = test_env().await;
    let sender = users::insert_user(&env.state.pool, "erin", "hash").await.unwrap();

    let result = env
        .state
        .writer()
        .send_message(
            sender,
            1,
            SendMessageRequest {
                recipient_id: sender + 1,
                content: MessageContent::Text { body: "hi".into() },
                client_msg_id: "   ".into(),
            },
        )
        .await;

    assert!(matches!(result, Err(im_core::error::AppError::InvalidArgument(_))));
}
