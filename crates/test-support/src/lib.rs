//! Shared test utilities for exercising the Gateway Connection (C4) over a
//! real network socket: a minimal split-sink/split-stream WebSocket
//! client speaking `im_protocol::Frame`.

pub mod mock_ws_client;

pub use mock_ws_client::MockWsClient;
