//! Handshake messages and their wire codec.
//!
//! Every wire handshake message is a 1-byte type, a 3-byte big-endian
//! length and a body. Decoding always consumes the body exactly; trailing
//! bytes are a decode error. Hello messages verify the peer's protocol
//! version before any other field is parsed.

pub mod dn;

use rtls_types::{
    CipherSuiteCode, ClientCertificateType, ProtocolVersion, SignatureAndHashAlgorithm, TlsError,
};

use crate::codec::{TlsReader, TlsWriter};
use crate::extensions::ExtensionCollection;

pub const HEADER_LENGTH: usize = 4;

/// Handshake message type. `ChangeCipherSpec` travels under its own record
/// content type but participates in the negotiation allow-lists, so it is
/// carried here as a non-wire variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    ChangeCipherSpec,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Result<Self, TlsError> {
        match v {
            0 => Ok(HandshakeType::HelloRequest),
            1 => Ok(HandshakeType::ClientHello),
            2 => Ok(HandshakeType::ServerHello),
            11 => Ok(HandshakeType::Certificate),
            12 => Ok(HandshakeType::ServerKeyExchange),
            13 => Ok(HandshakeType::CertificateRequest),
            14 => Ok(HandshakeType::ServerHelloDone),
            15 => Ok(HandshakeType::CertificateVerify),
            16 => Ok(HandshakeType::ClientKeyExchange),
            20 => Ok(HandshakeType::Finished),
            _ => Err(TlsError::unexpected_message(format!(
                "unknown handshake type {v}"
            ))),
        }
    }

    /// Wire code, `None` for the pseudo ChangeCipherSpec variant.
    pub fn wire_code(self) -> Option<u8> {
        match self {
            HandshakeType::HelloRequest => Some(0),
            HandshakeType::ClientHello => Some(1),
            HandshakeType::ServerHello => Some(2),
            HandshakeType::Certificate => Some(11),
            HandshakeType::ServerKeyExchange => Some(12),
            HandshakeType::CertificateRequest => Some(13),
            HandshakeType::ServerHelloDone => Some(14),
            HandshakeType::CertificateVerify => Some(15),
            HandshakeType::ClientKeyExchange => Some(16),
            HandshakeType::Finished => Some(20),
            HandshakeType::ChangeCipherSpec => None,
        }
    }
}

/// Protocol version constraints a decoder enforces on hello messages.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolGuard<'a> {
    pub requested: ProtocolVersion,
    pub negotiated: Option<ProtocolVersion>,
    pub supported: &'a [ProtocolVersion],
}

impl ProtocolGuard<'_> {
    /// Check a hello message's version field. Any mismatch against the
    /// supported set, a pinned negotiated version or the requested version
    /// is a ProtocolVersion alert.
    pub fn verify(&self, code: u16) -> Result<ProtocolVersion, TlsError> {
        let version = ProtocolVersion::from_code(code)
            .ok_or_else(|| TlsError::protocol_version(format!("unknown version {code:#06x}")))?;
        if !self.supported.contains(&version) {
            return Err(TlsError::protocol_version("unsupported protocol version"));
        }
        if let Some(negotiated) = self.negotiated {
            if version != negotiated {
                return Err(TlsError::protocol_version("protocol version changed"));
            }
        }
        if version != self.requested {
            return Err(TlsError::protocol_version(
                "incorrect protocol version received from peer",
            ));
        }
        Ok(version)
    }

    /// Version governing version-gated fields.
    pub fn protocol(&self) -> ProtocolVersion {
        self.negotiated.unwrap_or(self.requested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub protocol: ProtocolVersion,
    pub random: Vec<u8>,
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuiteCode>,
    pub extensions: ExtensionCollection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub protocol: ProtocolVersion,
    pub random: Vec<u8>,
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuiteCode,
    pub extensions: ExtensionCollection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Version this message was built or parsed under; the signature
    /// algorithm list exists only under TLS 1.2.
    pub protocol: ProtocolVersion,
    pub certificate_types: Vec<ClientCertificateType>,
    pub signature_algorithms: Vec<SignatureAndHashAlgorithm>,
    pub certificate_authorities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub protocol: ProtocolVersion,
    /// Present iff `protocol` is TLS 1.2.
    pub algorithm: Option<SignatureAndHashAlgorithm>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    /// DER certificate chain, leaf first.
    Certificate { certificates: Vec<Vec<u8>> },
    /// Opaque payload owned by the key exchange collaborator.
    ServerKeyExchange { params: Vec<u8> },
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    /// Opaque payload owned by the key exchange collaborator.
    ClientKeyExchange { params: Vec<u8> },
    Finished { verify_data: Vec<u8> },
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeMessage::HelloRequest => HandshakeType::HelloRequest,
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::Certificate { .. } => HandshakeType::Certificate,
            HandshakeMessage::ServerKeyExchange { .. } => HandshakeType::ServerKeyExchange,
            HandshakeMessage::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakeMessage::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeMessage::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeMessage::ClientKeyExchange { .. } => HandshakeType::ClientKeyExchange,
            HandshakeMessage::Finished { .. } => HandshakeType::Finished,
        }
    }

    /// Encode as a complete wire message, header included.
    pub fn encode(&self) -> Result<Vec<u8>, TlsError> {
        let code = self
            .handshake_type()
            .wire_code()
            .ok_or_else(|| TlsError::internal_error("not a wire handshake message"))?;

        let mut body = TlsWriter::new();
        self.encode_body(&mut body)?;
        let body = body.into_bytes();

        let mut writer = TlsWriter::new();
        writer.write_u8(code);
        writer.write_u24(body.len() as u32);
        writer.write_bytes(&body);
        Ok(writer.into_bytes())
    }

    fn encode_body(&self, writer: &mut TlsWriter) -> Result<(), TlsError> {
        match self {
            HandshakeMessage::HelloRequest | HandshakeMessage::ServerHelloDone => {}
            HandshakeMessage::ClientHello(hello) => {
                writer.write_u16(hello.protocol.code());
                writer.write_bytes(&hello.random);
                writer.write_vec_u8(&hello.session_id);
                writer.write_u16(hello.cipher_suites.len() as u16 * 2);
                for suite in &hello.cipher_suites {
                    writer.write_u16(suite.0);
                }
                // Single null compression method.
                writer.write_u8(1);
                writer.write_u8(0);
                hello.extensions.encode(writer);
            }
            HandshakeMessage::ServerHello(hello) => {
                writer.write_u16(hello.protocol.code());
                writer.write_bytes(&hello.random);
                writer.write_vec_u8(&hello.session_id);
                writer.write_u16(hello.cipher_suite.0);
                writer.write_u8(0);
                hello.extensions.encode(writer);
            }
            HandshakeMessage::Certificate { certificates } => {
                let total: usize = certificates.iter().map(|c| c.len() + 3).sum();
                writer.write_u24(total as u32);
                for certificate in certificates {
                    writer.write_u24(certificate.len() as u32);
                    writer.write_bytes(certificate);
                }
            }
            HandshakeMessage::ServerKeyExchange { params }
            | HandshakeMessage::ClientKeyExchange { params } => {
                writer.write_bytes(params);
            }
            HandshakeMessage::CertificateRequest(request) => {
                writer.write_u8(request.certificate_types.len() as u8);
                for ty in &request.certificate_types {
                    writer.write_u8(*ty as u8);
                }
                if request.protocol.has_signature_algorithms() {
                    writer.write_u16(request.signature_algorithms.len() as u16 * 2);
                    for algorithm in &request.signature_algorithms {
                        writer.write_u8(algorithm.hash as u8);
                        writer.write_u8(algorithm.signature as u8);
                    }
                }
                let total = writer.reserve_u16();
                for authority in &request.certificate_authorities {
                    let der = dn::encode_dn(authority)?;
                    writer.write_vec_u16(&der);
                }
                writer.patch_u16(total);
            }
            HandshakeMessage::CertificateVerify(verify) => {
                if verify.protocol.has_signature_algorithms() {
                    let algorithm = verify.algorithm.ok_or_else(|| {
                        TlsError::internal_error("missing signature algorithm for TLS 1.2")
                    })?;
                    writer.write_u8(algorithm.hash as u8);
                    writer.write_u8(algorithm.signature as u8);
                }
                writer.write_vec_u16(&verify.signature);
            }
            HandshakeMessage::Finished { verify_data } => {
                writer.write_bytes(verify_data);
            }
        }
        Ok(())
    }

    /// Decode a message body.
    pub fn decode(
        handshake_type: HandshakeType,
        body: &[u8],
        guard: &ProtocolGuard<'_>,
    ) -> Result<Self, TlsError> {
        let mut reader = TlsReader::new(body);
        let message = match handshake_type {
            HandshakeType::HelloRequest => HandshakeMessage::HelloRequest,
            HandshakeType::ServerHelloDone => HandshakeMessage::ServerHelloDone,
            HandshakeType::ClientHello => {
                HandshakeMessage::ClientHello(decode_client_hello(&mut reader, guard)?)
            }
            HandshakeType::ServerHello => {
                HandshakeMessage::ServerHello(decode_server_hello(&mut reader, guard)?)
            }
            HandshakeType::Certificate => {
                let total = reader.read_u24()? as usize;
                if total != reader.remaining() {
                    return Err(TlsError::decode_error("bad certificate list length"));
                }
                let mut certificates = Vec::new();
                while reader.remaining() > 0 {
                    let length = reader.read_u24()? as usize;
                    certificates.push(reader.read_bytes(length)?.to_vec());
                }
                HandshakeMessage::Certificate { certificates }
            }
            HandshakeType::ServerKeyExchange => HandshakeMessage::ServerKeyExchange {
                params: reader.read_bytes(reader.remaining())?.to_vec(),
            },
            HandshakeType::ClientKeyExchange => HandshakeMessage::ClientKeyExchange {
                params: reader.read_bytes(reader.remaining())?.to_vec(),
            },
            HandshakeType::CertificateRequest => HandshakeMessage::CertificateRequest(
                decode_certificate_request(&mut reader, guard.protocol())?,
            ),
            HandshakeType::CertificateVerify => {
                let protocol = guard.protocol();
                let algorithm = if protocol.has_signature_algorithms() {
                    let hash = reader.read_u8()?;
                    let signature = reader.read_u8()?;
                    Some(
                        SignatureAndHashAlgorithm::from_wire(hash, signature).ok_or_else(
                            || TlsError::illegal_parameter("unknown signature algorithm"),
                        )?,
                    )
                } else {
                    None
                };
                let length = reader.read_u16()? as usize;
                let signature = reader.read_bytes(length)?.to_vec();
                HandshakeMessage::CertificateVerify(CertificateVerify {
                    protocol,
                    algorithm,
                    signature,
                })
            }
            HandshakeType::Finished => HandshakeMessage::Finished {
                verify_data: reader.read_bytes(reader.remaining())?.to_vec(),
            },
            HandshakeType::ChangeCipherSpec => {
                return Err(TlsError::internal_error(
                    "change_cipher_spec is not a handshake message",
                ))
            }
        };
        reader.expect_consumed()?;
        Ok(message)
    }
}

fn decode_client_hello(
    reader: &mut TlsReader<'_>,
    guard: &ProtocolGuard<'_>,
) -> Result<ClientHello, TlsError> {
    // Version is checked before anything else is parsed.
    let protocol = guard.verify(reader.read_u16()?)?;

    let random = reader.read_bytes(32)?.to_vec();
    let session_length = reader.read_u8()? as usize;
    let session_id = reader.read_bytes(session_length)?.to_vec();

    let cipher_length = reader.read_u16()? as usize;
    if cipher_length % 2 != 0 {
        return Err(TlsError::decode_error("odd cipher suite list length"));
    }
    let mut seen_scsv = false;
    let mut cipher_suites = Vec::with_capacity(cipher_length / 2);
    for _ in 0..cipher_length / 2 {
        let code = CipherSuiteCode(reader.read_u16()?);
        if code == CipherSuiteCode::TLS_EMPTY_RENEGOTIATION_INFO_SCSV {
            seen_scsv = true;
        }
        cipher_suites.push(code);
    }

    let compression_count = reader.read_u8()? as usize;
    let compression_methods = reader.read_bytes(compression_count)?;
    if compression_methods.is_empty() || compression_methods.iter().any(|&m| m != 0) {
        return Err(TlsError::illegal_parameter(
            "invalid compression method received from client",
        ));
    }

    let mut extensions = ExtensionCollection::decode(reader)?;
    if seen_scsv {
        extensions.add_renegotiation_extension();
    }

    Ok(ClientHello {
        protocol,
        random,
        session_id,
        cipher_suites,
        extensions,
    })
}

fn decode_server_hello(
    reader: &mut TlsReader<'_>,
    guard: &ProtocolGuard<'_>,
) -> Result<ServerHello, TlsError> {
    // Anti-downgrade: version is checked before anything else is parsed.
    let protocol = guard.verify(reader.read_u16()?)?;

    let random = reader.read_bytes(32)?.to_vec();
    let session_length = reader.read_u8()? as usize;
    let session_id = reader.read_bytes(session_length)?.to_vec();
    let cipher_suite = CipherSuiteCode(reader.read_u16()?);

    let compression = reader.read_u8()?;
    if compression != 0 {
        return Err(TlsError::illegal_parameter(
            "invalid compression method received from server",
        ));
    }

    let extensions = ExtensionCollection::decode(reader)?;

    Ok(ServerHello {
        protocol,
        random,
        session_id,
        cipher_suite,
        extensions,
    })
}

fn decode_certificate_request(
    reader: &mut TlsReader<'_>,
    protocol: ProtocolVersion,
) -> Result<CertificateRequest, TlsError> {
    let type_count = reader.read_u8()? as usize;
    let mut certificate_types = Vec::with_capacity(type_count);
    for _ in 0..type_count {
        // Unknown certificate types are skipped, not rejected.
        if let Some(ty) = ClientCertificateType::from_u8(reader.read_u8()?) {
            certificate_types.push(ty);
        }
    }

    let mut signature_algorithms = Vec::new();
    if protocol.has_signature_algorithms() {
        let length = reader.read_u16()? as usize;
        if length % 2 != 0 {
            return Err(TlsError::decode_error("odd signature algorithm list length"));
        }
        for _ in 0..length / 2 {
            let hash = reader.read_u8()?;
            let signature = reader.read_u8()?;
            if let Some(algorithm) = SignatureAndHashAlgorithm::from_wire(hash, signature) {
                signature_algorithms.push(algorithm);
            }
        }
    }

    let total = reader.read_u16()? as usize;
    let mut authorities = reader.sub_reader(total)?;
    let mut certificate_authorities = Vec::new();
    while authorities.remaining() > 0 {
        let length = authorities.read_u16()? as usize;
        let der = authorities.read_bytes(length)?;
        certificate_authorities.push(dn::decode_dn(der)?);
    }

    Ok(CertificateRequest {
        protocol,
        certificate_types,
        signature_algorithms,
        certificate_authorities,
    })
}

/// Split a wire handshake message into its type and body. The buffer must
/// contain exactly one message.
pub fn parse_handshake_message(data: &[u8]) -> Result<(HandshakeType, &[u8]), TlsError> {
    let mut reader = TlsReader::new(data);
    let handshake_type = HandshakeType::from_u8(reader.read_u8()?)?;
    let length = reader.read_u24()? as usize;
    let body = reader.read_bytes(length)?;
    reader.expect_consumed()?;
    Ok((handshake_type, body))
}

/// Validate a ChangeCipherSpec record payload: a single byte of value 1.
pub fn validate_change_cipher_spec(payload: &[u8]) -> Result<(), TlsError> {
    if payload != [1] {
        return Err(TlsError::decode_error("malformed ChangeCipherSpec"));
    }
    Ok(())
}
