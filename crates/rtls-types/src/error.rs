//! Handshake error type.
//!
//! Every failure carries the alert description the peer should be sent.

use thiserror::Error;

use crate::alert::AlertDescription;

/// A fatal handshake error, mapped to the TLS alert that describes it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tls error: {description:?}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
pub struct TlsError {
    pub description: AlertDescription,
    pub message: Option<String>,
}

impl TlsError {
    pub fn new(description: AlertDescription) -> Self {
        Self {
            description,
            message: None,
        }
    }

    pub fn with_message(description: AlertDescription, message: impl Into<String>) -> Self {
        Self {
            description,
            message: Some(message.into()),
        }
    }

    pub fn decode_error(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::DecodeError, message)
    }

    pub fn illegal_parameter(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::IllegalParameter, message)
    }

    pub fn handshake_failure(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::HandshakeFailure, message)
    }

    pub fn unexpected_message(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::UnexpectedMessage, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::InternalError, message)
    }

    pub fn protocol_version(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::ProtocolVersion, message)
    }

    pub fn unsupported_extension(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::UnsupportedExtension, message)
    }

    pub fn insufficient_security(message: impl Into<String>) -> Self {
        Self::with_message(AlertDescription::InsufficientSecurity, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_alert() {
        let err = TlsError::decode_error("truncated extension block");
        assert_eq!(err.description, AlertDescription::DecodeError);
        assert!(err.to_string().contains("truncated extension block"));
    }

    #[test]
    fn test_error_without_message() {
        let err = TlsError::new(AlertDescription::HandshakeFailure);
        assert_eq!(err.message, None);
        assert!(err.to_string().contains("HandshakeFailure"));
    }
}
