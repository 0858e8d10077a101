//! Per-connection and per-handshake mutable state.

use std::time::{SystemTime, UNIX_EPOCH};

use rtls_types::{CipherSuiteCode, ProtocolVersion, SignatureAndHashAlgorithm, TlsError};
use zeroize::Zeroizing;

use crate::config::ClientCertificateParameters;
use crate::crypt::{fill_random, CipherSuiteInfo, KeyExchange, RANDOM_LENGTH};
use crate::extensions::ExtensionCollection;

/// Negotiated or negotiating cryptographic parameters for one direction
/// switch. Created when a cipher suite is selected, promoted from pending to
/// current when ChangeCipherSpec takes effect.
pub struct CryptoParameters {
    pub protocol: ProtocolVersion,
    pub suite: &'static CipherSuiteInfo,
    pub client_random: Vec<u8>,
    pub server_random: Vec<u8>,
    master_secret: Option<Zeroizing<Vec<u8>>>,
    pub server_certificates: Vec<Vec<u8>>,
    pub client_certificates: Vec<Vec<u8>>,
}

impl CryptoParameters {
    pub fn new(protocol: ProtocolVersion, suite: &'static CipherSuiteInfo) -> Self {
        Self {
            protocol,
            suite,
            client_random: Vec::new(),
            server_random: Vec::new(),
            master_secret: None,
            server_certificates: Vec::new(),
            client_certificates: Vec::new(),
        }
    }

    pub fn set_master_secret(&mut self, secret: Zeroizing<Vec<u8>>) {
        self.master_secret = Some(secret);
    }

    pub fn master_secret(&self) -> Result<&[u8], TlsError> {
        self.master_secret
            .as_deref()
            .map(Vec::as_slice)
            .ok_or_else(|| TlsError::internal_error("master secret not derived"))
    }

    pub fn suite_code(&self) -> CipherSuiteCode {
        self.suite.code
    }
}

/// Connection-lifetime negotiation state. Survives renegotiations; the
/// verify data recorded here binds each renegotiation to the handshake
/// before it.
#[derive(Default)]
pub struct Session {
    pub session_id: Option<Vec<u8>>,
    secure_renegotiation: bool,
    client_verify_data: Option<Zeroizing<Vec<u8>>>,
    server_verify_data: Option<Zeroizing<Vec<u8>>>,
    pub pending_crypto: Option<CryptoParameters>,
    pub current_crypto: Option<CryptoParameters>,
    pub pending_read: bool,
    pub pending_write: bool,
}

impl Session {
    pub fn secure_renegotiation(&self) -> bool {
        self.secure_renegotiation
    }

    /// One-way transition: once negotiated, secure renegotiation stays on
    /// for the lifetime of the connection.
    pub fn enable_secure_renegotiation(&mut self) {
        self.secure_renegotiation = true;
    }

    pub fn client_verify_data(&self) -> &[u8] {
        self.client_verify_data.as_deref().map_or(&[], Vec::as_slice)
    }

    pub fn server_verify_data(&self) -> &[u8] {
        self.server_verify_data.as_deref().map_or(&[], Vec::as_slice)
    }

    pub fn set_client_verify_data(&mut self, data: Zeroizing<Vec<u8>>) {
        self.client_verify_data = Some(data);
    }

    pub fn set_server_verify_data(&mut self, data: Zeroizing<Vec<u8>>) {
        self.server_verify_data = Some(data);
    }

    /// Concatenation of client and server verify data, as carried in the
    /// renegotiation_info extension of a renegotiation ServerHello.
    pub fn renegotiation_data(&self) -> Zeroizing<Vec<u8>> {
        let mut data =
            Zeroizing::new(Vec::with_capacity(self.client_verify_data().len() + self.server_verify_data().len()));
        data.extend_from_slice(self.client_verify_data());
        data.extend_from_slice(self.server_verify_data());
        data
    }

    /// Crypto parameters governing what we send.
    pub fn write_crypto(&self) -> Option<&CryptoParameters> {
        if self.pending_write {
            self.pending_crypto.as_ref()
        } else {
            self.current_crypto.as_ref()
        }
    }

    /// Crypto parameters governing what we receive.
    pub fn read_crypto(&self) -> Option<&CryptoParameters> {
        if self.pending_read {
            self.pending_crypto.as_ref()
        } else {
            self.current_crypto.as_ref()
        }
    }

    /// Promote the pending parameters to current after ChangeCipherSpec.
    pub fn switch_to_new_cipher(&mut self) {
        self.current_crypto = self.pending_crypto.take();
        self.pending_read = false;
        self.pending_write = false;
    }
}

/// Transient state for one handshake attempt, discarded when the attempt
/// completes or aborts.
#[derive(Default)]
pub struct HandshakeParameters {
    pub client_random: Vec<u8>,
    pub server_random: Vec<u8>,
    pub session_id: Option<Vec<u8>>,
    pub supported_ciphers: Vec<CipherSuiteCode>,
    pub requested_extensions: ExtensionCollection,
    pub active_extensions: ExtensionCollection,
    pub signature_algorithms: Vec<SignatureAndHashAlgorithm>,
    pub client_certificate_parameters: Option<ClientCertificateParameters>,
    pub requested_secure_negotiation: bool,
    pub secure_negotiation_supported: bool,
    pub key_exchange: Option<Box<dyn KeyExchange>>,
    pub server_name: Option<String>,
    transcript: Vec<u8>,
}

impl HandshakeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a full handshake message (header included) to the transcript.
    pub fn add_to_transcript(&mut self, message: &[u8]) {
        self.transcript.extend_from_slice(message);
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    pub fn key_exchange_mut(&mut self) -> Result<&mut Box<dyn KeyExchange>, TlsError> {
        self.key_exchange
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no key exchange in progress"))
    }
}

/// Seconds since the Unix epoch, as stamped into the first four bytes of a
/// hello random.
pub fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// A fresh 32-byte hello random with the Unix time in its first four bytes.
pub fn new_hello_random() -> Result<Vec<u8>, TlsError> {
    let mut random = vec![0u8; RANDOM_LENGTH];
    fill_random(&mut random)?;
    random[..4].copy_from_slice(&unix_time().to_be_bytes());
    Ok(random)
}
