//! Connection configuration.

use std::ops::{BitAnd, BitOr};

use rtls_types::{
    CipherSuiteCode, ClientCertificateType, ProtocolVersion, SignatureAndHashAlgorithm,
};

/// Bitmask controlling renegotiation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenegotiationFlags(pub u8);

impl RenegotiationFlags {
    pub const NONE: Self = Self(0);
    /// Never renegotiate, but keep the connection open when asked to.
    pub const DISALLOW_RENEGOTIATION: Self = Self(1);
    /// Use RFC 5746 secure renegotiation.
    pub const SECURE_RENEGOTIATION: Self = Self(2);
    /// Advertise support via the renegotiation_info extension in ClientHello.
    pub const SEND_CLIENT_HELLO_EXTENSION: Self = Self(16);
    /// Advertise support via the SCSV cipher suite code.
    pub const SEND_CIPHER_SPEC_CODE: Self = Self(32);
    /// Fail the initial handshake if the peer does not support secure
    /// renegotiation.
    pub const ABORT_HANDSHAKE_IF_UNSUPPORTED: Self = Self(64);
    /// Treat any incoming HelloRequest as fatal.
    pub const ABORT_ON_HELLO_REQUEST: Self = Self(128);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for RenegotiationFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for RenegotiationFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Default for RenegotiationFlags {
    fn default() -> Self {
        Self::SECURE_RENEGOTIATION | Self::SEND_CLIENT_HELLO_EXTENSION
    }
}

/// What a server asks of client certificates, and what a client may be asked
/// to provide.
#[derive(Debug, Clone, Default)]
pub struct ClientCertificateParameters {
    pub certificate_types: Vec<ClientCertificateType>,
    pub signature_algorithms: Vec<SignatureAndHashAlgorithm>,
    /// Acceptable certificate authorities as X.501 distinguished name
    /// strings, e.g. `"CN=Test CA"`.
    pub certificate_authorities: Vec<String>,
}

impl ClientCertificateParameters {
    /// Fill in any empty field with the conventional defaults.
    pub fn ensure_defaults(&mut self) {
        if self.certificate_types.is_empty() {
            self.certificate_types.push(ClientCertificateType::RsaSign);
        }
        if self.signature_algorithms.is_empty() {
            self.signature_algorithms.extend_from_slice(&[
                SignatureAndHashAlgorithm::RSA_SHA256,
                SignatureAndHashAlgorithm::RSA_SHA1,
            ]);
        }
    }
}

/// Per-connection configuration. One value drives one engine instance; the
/// engine may mutate the renegotiation flags when the peer turns out not to
/// support secure renegotiation.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub requested_protocol: ProtocolVersion,
    pub supported_protocols: Vec<ProtocolVersion>,
    /// Host the client is connecting to. Drives the ServerName extension
    /// when it is a legal (non-IP) host name.
    pub target_host: Option<String>,
    /// Client: suites offered. Server: suites accepted, in preference order.
    /// Empty means the registry default for the negotiated protocol.
    pub requested_ciphers: Vec<CipherSuiteCode>,
    pub renegotiation_flags: RenegotiationFlags,
    /// Signature algorithms offered in the signature_algorithms extension.
    /// `None` suppresses the extension.
    pub signature_parameters: Option<Vec<SignatureAndHashAlgorithm>>,
    pub ask_for_client_certificate: bool,
    pub require_client_certificate: bool,
    pub client_certificate_parameters: Option<ClientCertificateParameters>,
    /// DER certificate chain presented to the peer, leaf first.
    pub certificates: Vec<Vec<u8>>,
    /// Whether a private key matching `certificates` is available.
    pub has_credentials: bool,
}

impl TlsConfig {
    pub fn new(protocol: ProtocolVersion) -> Self {
        Self {
            requested_protocol: protocol,
            supported_protocols: vec![protocol],
            target_host: None,
            requested_ciphers: Vec::new(),
            renegotiation_flags: RenegotiationFlags::default(),
            signature_parameters: None,
            ask_for_client_certificate: false,
            require_client_certificate: false,
            client_certificate_parameters: None,
            certificates: Vec::new(),
            has_credentials: false,
        }
    }

    /// Secure renegotiation is enabled iff the secure flag is set and the
    /// disallow flag is not.
    pub fn enable_secure_renegotiation(&self) -> bool {
        (self.renegotiation_flags
            & (RenegotiationFlags::DISALLOW_RENEGOTIATION | RenegotiationFlags::SECURE_RENEGOTIATION))
            == RenegotiationFlags::SECURE_RENEGOTIATION
    }

    /// Turn renegotiation off for the rest of the connection, keeping only
    /// the HelloRequest abort policy.
    pub fn force_disable_renegotiation(&mut self) {
        self.renegotiation_flags = (self.renegotiation_flags
            & RenegotiationFlags::ABORT_ON_HELLO_REQUEST)
            | RenegotiationFlags::DISALLOW_RENEGOTIATION;
    }

    pub fn is_supported_protocol(&self, protocol: ProtocolVersion) -> bool {
        self.supported_protocols.contains(&protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_enable_secure_renegotiation() {
        let config = TlsConfig::new(ProtocolVersion::Tls12);
        assert!(config.enable_secure_renegotiation());
    }

    #[test]
    fn test_disallow_wins_over_secure() {
        let mut config = TlsConfig::new(ProtocolVersion::Tls12);
        config.renegotiation_flags = RenegotiationFlags::SECURE_RENEGOTIATION
            | RenegotiationFlags::DISALLOW_RENEGOTIATION;
        assert!(!config.enable_secure_renegotiation());
    }

    #[test]
    fn test_force_disable_keeps_abort_policy() {
        let mut config = TlsConfig::new(ProtocolVersion::Tls12);
        config.renegotiation_flags =
            RenegotiationFlags::default() | RenegotiationFlags::ABORT_ON_HELLO_REQUEST;
        config.force_disable_renegotiation();
        assert!(config
            .renegotiation_flags
            .contains(RenegotiationFlags::ABORT_ON_HELLO_REQUEST));
        assert!(config
            .renegotiation_flags
            .contains(RenegotiationFlags::DISALLOW_RENEGOTIATION));
        assert!(!config.enable_secure_renegotiation());
    }

    #[test]
    fn test_certificate_parameter_defaults() {
        let mut params = ClientCertificateParameters::default();
        params.ensure_defaults();
        assert_eq!(params.certificate_types, vec![ClientCertificateType::RsaSign]);
        assert!(!params.signature_algorithms.is_empty());
    }
}
