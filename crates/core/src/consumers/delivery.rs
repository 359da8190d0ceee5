//! Delivery Consumer (C9): consumes `message.deliver` in consumer group
//! `connect-deliver` and pushes a framed `MESSAGE` notification through
//! the Connection Registry to every online device of the recipient (and,
//! opt-in, the sender's other devices for multi-device sync).

use im_protocol::{Command, DeliverPayload, Frame};
use rdkafka::Message;
use rdkafka::consumer::StreamConsumer;
use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;

pub const GROUP_ID: &str = "connect-deliver";

/// Run the consumer loop until `shutdown` is cancelled. Poison-pill
/// tolerant: a malformed payload is logged and skipped rather than
/// blocking the stream.
pub async fn run(
    consumer: StreamConsumer,
    registry: ConnectionRegistry,
    sync_sender_devices: bool,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            result = consumer.recv() => result,
            () = shutdown.cancelled() => break,
        };

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "delivery consumer read failed");
                continue;
            }
        };

        let Some(bytes) = message.payload() else {
            continue;
        };

        let payload: DeliverPayload = match serde_json::from_slice(bytes) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable delivery event");
                continue;
            }
        };

        deliver(&registry, &payload, sync_sender_devices);
    }
}

fn deliver(registry: &ConnectionRegistry, payload: &DeliverPayload, sync_sender_devices: bool) {
    let Ok(data) = serde_json::to_value(payload) else {
        return;
    };
    let frame = Frame {
        command: Command::Message,
        request_id: 0,
        code: 0,
        message: String::new(),
        data,
    };
    let Ok(bytes) = frame.encode() else {
        return;
    };

    for handle in registry.for_user(payload.recipient_id) {
        if !handle.send(bytes.clone()) {
            tracing::warn!(device_id = handle.device_id, "push to recipient device failed");
        }
    }

    if sync_sender_devices {
        for handle in registry.for_user(payload.sender_id) {
            if !handle.send(bytes.clone()) {
                tracing::warn!(device_id = handle.device_id, "push to sender device failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use axum::extract::ws::Message;

    fn sample_payload() -> DeliverPayload {
        DeliverPayload {
            message_id: "1-1".into(),
            conversation_id: "p_1_2".into(),
            seq: 1,
            sender_id: 1,
            recipient_id: 2,
            message_type: 1,
        }
    }

    #[test]
    fn delivers_to_recipients_online_devices_only_by_default() {
        let registry = ConnectionRegistry::new();
        let (recipient_tx, mut recipient_rx) = tokio::sync::mpsc::unbounded_channel();
        let (sender_tx, mut sender_rx) = tokio::sync::mpsc::unbounded_channel();
        registry.set(20, ConnectionHandle::new(2, 20, recipient_tx));
        registry.set(10, ConnectionHandle::new(1, 10, sender_tx));

        deliver(&registry, &sample_payload(), false);

        let Message::Binary(bytes) = recipient_rx.try_recv().unwrap() else {
            panic!("expected a binary frame");
        };
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.command, Command::Message);
        let decoded: DeliverPayload = frame.parse_data().unwrap();
        assert_eq!(decoded, sample_payload());

        assert!(sender_rx.try_recv().is_err(), "sender device should not receive a copy by default");
    }

    #[test]
    fn syncs_to_senders_other_devices_when_opted_in() {
        let registry = ConnectionRegistry::new();
        let (sender_tx, mut sender_rx) = tokio::sync::mpsc::unbounded_channel();
        registry.set(10, ConnectionHandle::new(1, 10, sender_tx));

        deliver(&registry, &sample_payload(), true);

        assert!(sender_rx.try_recv().is_ok(), "sender device should receive a sync copy when opted in");
    }
}
