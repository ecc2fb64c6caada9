//! Durable storage. Unit structs with associated async fns over a shared
//! `Pool<Postgres>`; rows are mapped by hand.

pub mod messages;
pub mod notifications;
pub mod sessions;

pub use messages::{MessageStore, NewMessage};
pub use notifications::{NewNotification, NotificationStore};
pub use sessions::SessionStore;
