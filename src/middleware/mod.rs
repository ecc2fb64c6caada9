pub mod guards;

pub use guards::Caller;
