pub mod hub;
pub mod message;

pub use hub::{Connection, ConnectionId, NotificationHub};
