#![forbid(unsafe_code)]
#![doc = "Shared protocol vocabulary for the rtls handshake engine."]

mod alert;
mod algorithm;
mod error;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use algorithm::{
    CipherSuiteCode, ClientCertificateType, ExchangeAlgorithmType, HashAlgorithm, ProtocolVersion,
    SignatureAlgorithm, SignatureAndHashAlgorithm,
};
pub use error::TlsError;
