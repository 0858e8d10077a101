//! Protocol version, cipher suite and algorithm identifiers.

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    Tls10,
    Tls11,
    Tls12,
}

impl ProtocolVersion {
    /// The wire code of this version: major byte high, minor byte low.
    pub fn code(self) -> u16 {
        match self {
            ProtocolVersion::Tls10 => 0x0301,
            ProtocolVersion::Tls11 => 0x0302,
            ProtocolVersion::Tls12 => 0x0303,
        }
    }

    /// Convert from a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0301 => Some(ProtocolVersion::Tls10),
            0x0302 => Some(ProtocolVersion::Tls11),
            0x0303 => Some(ProtocolVersion::Tls12),
            _ => None,
        }
    }

    /// Whether this version negotiates signature algorithms explicitly
    /// (CertificateRequest and CertificateVerify carry algorithm fields).
    pub fn has_signature_algorithms(self) -> bool {
        matches!(self, ProtocolVersion::Tls12)
    }
}

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuiteCode(pub u16);

impl CipherSuiteCode {
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0033);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0035);
    pub const TLS_DHE_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0039);
    pub const TLS_RSA_WITH_AES_128_CBC_SHA256: Self = Self(0x003C);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA256: Self = Self(0x003D);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA256: Self = Self(0x0067);
    pub const TLS_DHE_RSA_WITH_AES_256_CBC_SHA256: Self = Self(0x006B);
    pub const TLS_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0x009C);
    pub const TLS_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0x009D);
    pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0xC013);
    pub const TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA: Self = Self(0xC014);
    pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256: Self = Self(0xC027);
    pub const TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384: Self = Self(0xC028);
    pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0xC02F);
    pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0xC030);

    /// Signaling cipher suite value for secure renegotiation (RFC 5746 §3.3).
    pub const TLS_EMPTY_RENEGOTIATION_INFO_SCSV: Self = Self(0x00FF);
}

/// Key exchange algorithm family of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeAlgorithmType {
    Rsa,
    DiffieHellman,
    EcDiffieHellman,
}

/// Hash algorithm identifier (RFC 5246 §7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HashAlgorithm {
    None = 0,
    Md5 = 1,
    Sha1 = 2,
    Sha224 = 3,
    Sha256 = 4,
    Sha384 = 5,
    Sha512 = 6,
}

impl HashAlgorithm {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(HashAlgorithm::None),
            1 => Some(HashAlgorithm::Md5),
            2 => Some(HashAlgorithm::Sha1),
            3 => Some(HashAlgorithm::Sha224),
            4 => Some(HashAlgorithm::Sha256),
            5 => Some(HashAlgorithm::Sha384),
            6 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Signature algorithm identifier (RFC 5246 §7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    Anonymous = 0,
    Rsa = 1,
    Dsa = 2,
    Ecdsa = 3,
}

impl SignatureAlgorithm {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SignatureAlgorithm::Anonymous),
            1 => Some(SignatureAlgorithm::Rsa),
            2 => Some(SignatureAlgorithm::Dsa),
            3 => Some(SignatureAlgorithm::Ecdsa),
            _ => None,
        }
    }
}

/// Client certificate type requested in a CertificateRequest (RFC 5246 §7.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientCertificateType {
    RsaSign = 1,
    DssSign = 2,
    RsaFixedDh = 3,
    DssFixedDh = 4,
    EcdsaSign = 64,
}

impl ClientCertificateType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ClientCertificateType::RsaSign),
            2 => Some(ClientCertificateType::DssSign),
            3 => Some(ClientCertificateType::RsaFixedDh),
            4 => Some(ClientCertificateType::DssFixedDh),
            64 => Some(ClientCertificateType::EcdsaSign),
            _ => None,
        }
    }
}

/// A (hash, signature) algorithm pair as negotiated in TLS 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub signature: SignatureAlgorithm,
}

impl SignatureAndHashAlgorithm {
    pub const RSA_SHA256: Self = Self {
        hash: HashAlgorithm::Sha256,
        signature: SignatureAlgorithm::Rsa,
    };
    pub const RSA_SHA384: Self = Self {
        hash: HashAlgorithm::Sha384,
        signature: SignatureAlgorithm::Rsa,
    };
    pub const RSA_SHA1: Self = Self {
        hash: HashAlgorithm::Sha1,
        signature: SignatureAlgorithm::Rsa,
    };
    pub const ECDSA_SHA256: Self = Self {
        hash: HashAlgorithm::Sha256,
        signature: SignatureAlgorithm::Ecdsa,
    };

    /// Convert a wire (hash, signature) byte pair. Unknown codes yield `None`
    /// so callers can skip them for forward compatibility.
    pub fn from_wire(hash: u8, signature: u8) -> Option<Self> {
        Some(Self {
            hash: HashAlgorithm::from_u8(hash)?,
            signature: SignatureAlgorithm::from_u8(signature)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_codes() {
        assert_eq!(ProtocolVersion::Tls10.code(), 0x0301);
        assert_eq!(ProtocolVersion::Tls11.code(), 0x0302);
        assert_eq!(ProtocolVersion::Tls12.code(), 0x0303);
        for v in [
            ProtocolVersion::Tls10,
            ProtocolVersion::Tls11,
            ProtocolVersion::Tls12,
        ] {
            assert_eq!(ProtocolVersion::from_code(v.code()), Some(v));
        }
        assert_eq!(ProtocolVersion::from_code(0x0300), None);
        assert_eq!(ProtocolVersion::from_code(0x0304), None);
    }

    #[test]
    fn test_signature_algorithms_only_in_tls12() {
        assert!(ProtocolVersion::Tls12.has_signature_algorithms());
        assert!(!ProtocolVersion::Tls11.has_signature_algorithms());
        assert!(!ProtocolVersion::Tls10.has_signature_algorithms());
    }

    #[test]
    fn test_scsv_code() {
        assert_eq!(CipherSuiteCode::TLS_EMPTY_RENEGOTIATION_INFO_SCSV.0, 0x00FF);
    }

    #[test]
    fn test_signature_and_hash_from_wire() {
        let alg = SignatureAndHashAlgorithm::from_wire(4, 1).unwrap();
        assert_eq!(alg, SignatureAndHashAlgorithm::RSA_SHA256);
        assert!(SignatureAndHashAlgorithm::from_wire(7, 1).is_none());
        assert!(SignatureAndHashAlgorithm::from_wire(4, 9).is_none());
    }
}
