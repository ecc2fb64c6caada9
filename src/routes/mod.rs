pub mod chat;
pub mod connections;
pub mod notifications;
pub mod ws;

use crate::error::AppError;
use crate::models::{ClientClass, Identity};

/// Turns path segments into an [`Identity`], rejecting unknown client types
/// before they can reach the core.
pub(crate) fn parse_identity(class: &str, id: &str) -> Result<Identity, AppError> {
    let class = ClientClass::parse(class)
        .ok_or_else(|| AppError::Validation(format!("invalid client type: {class}")))?;
    Ok(Identity::new(class, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_identity_rejects_unknown_classes() {
        assert!(parse_identity("installers", "42").is_ok());
        assert!(parse_identity("robots", "42").is_err());
    }
}
