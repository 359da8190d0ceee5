//! The messaging core: sequencing, idempotency, and the Message Writer
//! (C5/C6/C7) that ties them together with the document store, the
//! relational store, and the outbox.

pub mod idempotency;
pub mod sequencer;
pub mod writer;
