//! Hello extensions.
//!
//! Each extension knows its wire layout and its negotiation effect on both
//! sides. Decoding a collection enforces the outer length invariant exactly
//! and skips unknown extension types for forward compatibility.
//!
//! The renegotiation_info extension (RFC 5746) is the security-critical
//! case: its processing binds a renegotiation to the verify data of the
//! previous handshake on both sides.

use std::net::IpAddr;

use rtls_types::{AlertDescription, SignatureAndHashAlgorithm, TlsError};
use subtle::ConstantTimeEq;

use crate::codec::{TlsReader, TlsWriter};
use crate::config::TlsConfig;
use crate::session::{HandshakeParameters, Session};

/// Extension type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const SERVER_NAME: Self = Self(0x0000);
    pub const SIGNATURE_ALGORITHMS: Self = Self(0x000D);
    pub const RENEGOTIATION_INFO: Self = Self(0xFF01);
}

/// A typed hello extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsExtension {
    ServerName {
        host: String,
    },
    SignatureAlgorithms {
        algorithms: Vec<SignatureAndHashAlgorithm>,
    },
    /// renegotiation_info. Empty data is the initial-handshake support
    /// signal; on renegotiation it carries verify data.
    Renegotiation {
        data: Vec<u8>,
    },
}

/// Longest host name the ServerName extension can carry without its
/// ServerNameList length overflowing the u16 wire field.
const MAX_HOST_NAME_LENGTH: usize = 65532;

/// A host name the ServerName extension may legally carry: non-empty, short
/// enough for the wire format and not an IP address literal.
pub fn is_legal_host_name(host: &str) -> bool {
    !host.is_empty() && host.len() <= MAX_HOST_NAME_LENGTH && host.parse::<IpAddr>().is_err()
}

impl TlsExtension {
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            TlsExtension::ServerName { .. } => ExtensionType::SERVER_NAME,
            TlsExtension::SignatureAlgorithms { .. } => ExtensionType::SIGNATURE_ALGORITHMS,
            TlsExtension::Renegotiation { .. } => ExtensionType::RENEGOTIATION_INFO,
        }
    }

    /// Encode as a complete {type, length, payload} entry.
    pub fn encode(&self, writer: &mut TlsWriter) {
        writer.write_u16(self.extension_type().0);
        let length = writer.reserve_u16();
        match self {
            TlsExtension::ServerName { host } => {
                let name = host.as_bytes();
                // ServerNameList with a single host_name entry.
                writer.write_u16(name.len() as u16 + 3);
                writer.write_u8(0);
                writer.write_vec_u16(name);
            }
            TlsExtension::SignatureAlgorithms { algorithms } => {
                writer.write_u16(algorithms.len() as u16 * 2);
                for algorithm in algorithms {
                    writer.write_u8(algorithm.hash as u8);
                    writer.write_u8(algorithm.signature as u8);
                }
            }
            TlsExtension::Renegotiation { data } => {
                writer.write_vec_u8(data);
            }
        }
        writer.patch_u16(length);
    }

    /// Decode one extension payload. Unknown types yield `None` and are
    /// skipped by the caller.
    fn decode(extension_type: ExtensionType, reader: &mut TlsReader<'_>) -> Result<Option<Self>, TlsError> {
        let extension = match extension_type {
            ExtensionType::SERVER_NAME => {
                // Servers confirm an accepted name with an empty payload.
                if reader.remaining() == 0 {
                    return Ok(Some(TlsExtension::ServerName {
                        host: String::new(),
                    }));
                }
                let list_length = reader.read_u16()? as usize;
                if list_length != reader.remaining() {
                    return Err(TlsError::decode_error("bad ServerName list length"));
                }
                let name_type = reader.read_u8()?;
                if name_type != 0 {
                    return Err(TlsError::illegal_parameter(
                        "unknown NameType in ServerName extension",
                    ));
                }
                let name_length = reader.read_u16()? as usize;
                if name_length + 3 != list_length {
                    return Err(TlsError::decode_error("bad ServerName name length"));
                }
                let name = reader.read_bytes(name_length)?;
                let host = String::from_utf8(name.to_vec())
                    .map_err(|_| TlsError::decode_error("ServerName is not valid UTF-8"))?;
                TlsExtension::ServerName { host }
            }
            ExtensionType::SIGNATURE_ALGORITHMS => {
                let length = reader.read_u16()? as usize;
                if length % 2 != 0 {
                    return Err(TlsError::decode_error("odd signature_algorithms length"));
                }
                let mut algorithms = Vec::with_capacity(length / 2);
                for _ in 0..length / 2 {
                    let hash = reader.read_u8()?;
                    let signature = reader.read_u8()?;
                    // Unknown algorithm pairs are skipped, not rejected.
                    if let Some(algorithm) = SignatureAndHashAlgorithm::from_wire(hash, signature) {
                        algorithms.push(algorithm);
                    }
                }
                TlsExtension::SignatureAlgorithms { algorithms }
            }
            ExtensionType::RENEGOTIATION_INFO => {
                let length = reader.read_u8()? as usize;
                let data = reader.read_bytes(length)?.to_vec();
                TlsExtension::Renegotiation { data }
            }
            _ => return Ok(None),
        };
        reader.expect_consumed()?;
        Ok(Some(extension))
    }

    /// A client processing an extension the server sent in ServerHello.
    pub fn process_as_client(
        &self,
        session: &mut Session,
        handshake: &mut HandshakeParameters,
    ) -> Result<(), TlsError> {
        match self {
            TlsExtension::ServerName { host } => {
                // An empty echo means the server used the name we sent.
                // Anything more is out of place in a ServerHello.
                if host.is_empty() {
                    Ok(())
                } else {
                    Err(TlsError::unsupported_extension(
                        "extension not valid in ServerHello",
                    ))
                }
            }
            TlsExtension::SignatureAlgorithms { .. } => Err(TlsError::unsupported_extension(
                "extension not valid in ServerHello",
            )),
            TlsExtension::Renegotiation { data } => {
                if !handshake.requested_secure_negotiation {
                    return Err(TlsError::handshake_failure(
                        "unsolicited renegotiation_info from server",
                    ));
                }

                if !session.secure_renegotiation() {
                    // Initial handshake: the server signals bare support.
                    if !data.is_empty() {
                        return Err(TlsError::handshake_failure(
                            "unexpected renegotiation_info data in initial handshake",
                        ));
                    }
                    handshake.secure_negotiation_supported = true;
                    return Ok(());
                }

                // Renegotiation: the server must echo client ++ server
                // verify data from the previous handshake.
                let client_data = session.client_verify_data();
                let server_data = session.server_verify_data();
                if data.len() != client_data.len() + server_data.len() {
                    return Err(TlsError::new(AlertDescription::DecodeError));
                }
                let (got_client, got_server) = data.split_at(client_data.len());
                if !bool::from(got_client.ct_eq(client_data)) {
                    return Err(TlsError::new(AlertDescription::HandshakeFailure));
                }
                if !bool::from(got_server.ct_eq(server_data)) {
                    return Err(TlsError::new(AlertDescription::HandshakeFailure));
                }

                handshake.secure_negotiation_supported = true;
                Ok(())
            }
        }
    }

    /// A server processing an extension the client sent in ClientHello.
    /// Returns the response extension to carry in ServerHello, if any.
    pub fn process_as_server(
        &self,
        config: &TlsConfig,
        session: &mut Session,
        handshake: &mut HandshakeParameters,
    ) -> Result<Option<TlsExtension>, TlsError> {
        match self {
            TlsExtension::ServerName { host } => {
                handshake.server_name = Some(host.clone());
                Ok(None)
            }
            TlsExtension::SignatureAlgorithms { algorithms } => {
                handshake.signature_algorithms = algorithms.clone();
                Ok(None)
            }
            TlsExtension::Renegotiation { data } => {
                // Policy check comes before any look at the content.
                if config
                    .renegotiation_flags
                    .contains(crate::config::RenegotiationFlags::DISALLOW_RENEGOTIATION)
                {
                    return Err(TlsError::handshake_failure("renegotiation not allowed"));
                }

                if session.secure_renegotiation() {
                    let expected = session.client_verify_data();
                    if data.len() != expected.len() {
                        return Err(TlsError::new(AlertDescription::DecodeError));
                    }
                    if !bool::from(data.as_slice().ct_eq(expected)) {
                        return Err(TlsError::new(AlertDescription::HandshakeFailure));
                    }
                    handshake.requested_secure_negotiation = true;
                    handshake.secure_negotiation_supported = true;
                    Ok(Some(TlsExtension::Renegotiation {
                        data: session.renegotiation_data().to_vec(),
                    }))
                } else {
                    if !data.is_empty() {
                        return Err(TlsError::handshake_failure(
                            "unexpected renegotiation_info data in initial handshake",
                        ));
                    }
                    handshake.requested_secure_negotiation = true;
                    handshake.secure_negotiation_supported = true;
                    session.enable_secure_renegotiation();
                    Ok(Some(TlsExtension::Renegotiation { data: Vec::new() }))
                }
            }
        }
    }
}

/// Ordered extension collection with first-match lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionCollection {
    extensions: Vec<TlsExtension>,
}

impl ExtensionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, extension: TlsExtension) {
        self.extensions.push(extension);
    }

    pub fn find(&self, extension_type: ExtensionType) -> Option<&TlsExtension> {
        self.extensions
            .iter()
            .find(|e| e.extension_type() == extension_type)
    }

    pub fn contains(&self, extension_type: ExtensionType) -> bool {
        self.find(extension_type).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TlsExtension> {
        self.extensions.iter()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Add the implicit empty renegotiation_info extension, as signaled by
    /// the SCSV cipher code, unless one is already present.
    pub fn add_renegotiation_extension(&mut self) {
        if !self.contains(ExtensionType::RENEGOTIATION_INFO) {
            self.push(TlsExtension::Renegotiation { data: Vec::new() });
        }
    }

    /// Decode the extension block at the tail of a hello message. An absent
    /// block is an empty collection; a present block's declared length must
    /// cover exactly the rest of the message.
    pub fn decode(reader: &mut TlsReader<'_>) -> Result<Self, TlsError> {
        let mut collection = Self::new();
        if reader.remaining() == 0 {
            return Ok(collection);
        }

        let total = reader.read_u16()? as usize;
        if total != reader.remaining() {
            return Err(TlsError::decode_error("extension block length mismatch"));
        }

        let mut block = reader.sub_reader(total)?;
        while block.remaining() > 0 {
            let extension_type = ExtensionType(block.read_u16()?);
            let length = block.read_u16()? as usize;
            let mut payload = block.sub_reader(length)?;
            if let Some(extension) = TlsExtension::decode(extension_type, &mut payload)? {
                collection.push(extension);
            }
        }

        Ok(collection)
    }

    /// Encode the extension block. Nothing is written for an empty
    /// collection.
    pub fn encode(&self, writer: &mut TlsWriter) {
        if self.extensions.is_empty() {
            return;
        }
        let total = writer.reserve_u16();
        for extension in &self.extensions {
            extension.encode(writer);
        }
        writer.patch_u16(total);
    }
}
