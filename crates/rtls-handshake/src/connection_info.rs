use rtls_types::{CipherSuiteCode, ProtocolVersion};

/// Parameters of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub protocol: ProtocolVersion,
    pub cipher_suite: CipherSuiteCode,
    /// Server-assigned session id, if any.
    pub session_id: Option<Vec<u8>>,
    /// Whether RFC 5746 secure renegotiation was negotiated.
    pub secure_renegotiation: bool,
}
