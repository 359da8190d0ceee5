pub mod conversations;
pub mod devices;
pub mod friends;
pub mod messages;
pub mod outbox;
pub mod users;
