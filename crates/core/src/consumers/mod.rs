//! Broker consumers: the Delivery Consumer (C9) and Indexer Consumer
//! (C10), each reading the same `message.deliver` topic under a distinct
//! consumer group.

pub mod delivery;
pub mod indexer;
