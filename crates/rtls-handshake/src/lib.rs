//! TLS 1.0-1.2 handshake negotiation engine.
//!
//! This crate implements the handshake layer of TLS as a sans-I/O state
//! machine: callers feed it decrypted record payloads and collect the
//! handshake bytes it wants sent. Record protection, certificate chain
//! validation and the cryptographic primitives themselves live behind the
//! [`crypt::CryptoProvider`] and [`crypt::KeyExchange`] seams.
//!
//! Secure renegotiation (RFC 5746) is a first-class citizen: the engine
//! tracks client and server verify data across handshakes and enforces the
//! renegotiation_info extension rules on both sides.

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod crypt;
pub mod extensions;
pub mod handshake;
pub mod negotiation;
pub mod session;

mod connection_info;

pub use connection_info::ConnectionInfo;
pub use negotiation::{NegotiationEngine, NegotiationState, OutgoingMessage, SecurityStatus};

use rtls_types::TlsError;

/// Which side of the connection an engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

/// TLS record content type, as far as the handshake layer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Result<Self, TlsError> {
        match v {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(TlsError::decode_error(format!(
                "unknown content type {v}"
            ))),
        }
    }
}
