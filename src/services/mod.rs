pub mod delivery;
pub mod sessions;

pub use delivery::{DeliveryEngine, NotifyReceipt, OutgoingMessage, SendReceipt};
pub use sessions::SessionTracker;
