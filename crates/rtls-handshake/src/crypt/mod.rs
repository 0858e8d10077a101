//! Cryptographic collaborator seams and the cipher suite registry.
//!
//! The negotiation engine never performs cryptography itself. Hashing, the
//! PRF, signatures and the key exchange payloads live behind the
//! [`CryptoProvider`] and [`KeyExchange`] traits so the engine stays a pure
//! bytes-in, bytes-out state machine.

use rtls_types::{
    CipherSuiteCode, ExchangeAlgorithmType, HashAlgorithm, ProtocolVersion,
    SignatureAndHashAlgorithm, TlsError,
};
use zeroize::Zeroizing;

use crate::codec::{TlsReader, TlsWriter};

pub const MASTER_SECRET_LENGTH: usize = 48;
pub const VERIFY_DATA_LENGTH: usize = 12;
pub const RANDOM_LENGTH: usize = 32;

pub const MASTER_SECRET_LABEL: &str = "master secret";
pub const CLIENT_FINISHED_LABEL: &str = "client finished";
pub const SERVER_FINISHED_LABEL: &str = "server finished";

/// Static metadata for a negotiable cipher suite.
#[derive(Debug, Clone, Copy)]
pub struct CipherSuiteInfo {
    pub code: CipherSuiteCode,
    pub name: &'static str,
    pub exchange: ExchangeAlgorithmType,
    /// Handshake and PRF hash under TLS 1.2. Earlier versions use the
    /// fixed MD5/SHA-1 combination regardless of this field.
    pub hash: HashAlgorithm,
    pub min_protocol: ProtocolVersion,
}

macro_rules! suite {
    ($code:ident, $exchange:ident, $hash:ident, $min:ident) => {
        CipherSuiteInfo {
            code: CipherSuiteCode::$code,
            name: stringify!($code),
            exchange: ExchangeAlgorithmType::$exchange,
            hash: HashAlgorithm::$hash,
            min_protocol: ProtocolVersion::$min,
        }
    };
}

static CIPHER_SUITES: &[CipherSuiteInfo] = &[
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA, Rsa, Sha256, Tls10),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA, Rsa, Sha256, Tls10),
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA256, Rsa, Sha256, Tls12),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA256, Rsa, Sha256, Tls12),
    suite!(TLS_RSA_WITH_AES_128_GCM_SHA256, Rsa, Sha256, Tls12),
    suite!(TLS_RSA_WITH_AES_256_GCM_SHA384, Rsa, Sha384, Tls12),
    suite!(TLS_DHE_RSA_WITH_AES_128_CBC_SHA, DiffieHellman, Sha256, Tls10),
    suite!(TLS_DHE_RSA_WITH_AES_256_CBC_SHA, DiffieHellman, Sha256, Tls10),
    suite!(TLS_DHE_RSA_WITH_AES_128_CBC_SHA256, DiffieHellman, Sha256, Tls12),
    suite!(TLS_DHE_RSA_WITH_AES_256_CBC_SHA256, DiffieHellman, Sha256, Tls12),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA, EcDiffieHellman, Sha256, Tls10),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA, EcDiffieHellman, Sha256, Tls10),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256, EcDiffieHellman, Sha256, Tls12),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384, EcDiffieHellman, Sha384, Tls12),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, EcDiffieHellman, Sha256, Tls12),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384, EcDiffieHellman, Sha384, Tls12),
];

/// Look up the registry entry for a cipher suite code.
pub fn cipher_suite_info(code: CipherSuiteCode) -> Option<&'static CipherSuiteInfo> {
    CIPHER_SUITES.iter().find(|info| info.code == code)
}

/// Default suites offered or accepted under the given protocol version,
/// in registry preference order.
pub fn default_ciphers(protocol: ProtocolVersion) -> Vec<CipherSuiteCode> {
    CIPHER_SUITES
        .iter()
        .filter(|info| info.min_protocol.code() <= protocol.code())
        .map(|info| info.code)
        .collect()
}

/// Fill a buffer from the system entropy source.
pub fn fill_random(buf: &mut [u8]) -> Result<(), TlsError> {
    getrandom::getrandom(buf)
        .map_err(|e| TlsError::internal_error(format!("entropy source failed: {e}")))
}

/// Key exchange collaborator. Each instance owns its side of one exchange
/// and knows the wire layout of its ServerKeyExchange and ClientKeyExchange
/// payloads.
pub trait KeyExchange {
    fn exchange_type(&self) -> ExchangeAlgorithmType;

    /// Server side: generate parameters and encode the ServerKeyExchange
    /// payload. Not called for RSA key exchange, which sends no such message.
    fn generate_server_params(&mut self, writer: &mut TlsWriter) -> Result<(), TlsError>;

    /// Client side: consume a received ServerKeyExchange payload.
    fn read_server_params(&mut self, reader: &mut TlsReader<'_>) -> Result<(), TlsError>;

    /// Client side: generate the ClientKeyExchange payload.
    fn generate_client_params(&mut self, writer: &mut TlsWriter) -> Result<(), TlsError>;

    /// Server side: consume a received ClientKeyExchange payload.
    fn read_client_params(&mut self, reader: &mut TlsReader<'_>) -> Result<(), TlsError>;

    /// The agreed premaster secret, available once both sides' parameters
    /// have been exchanged.
    fn premaster_secret(&mut self) -> Result<Zeroizing<Vec<u8>>, TlsError>;
}

/// Cryptographic primitive provider.
pub trait CryptoProvider {
    /// Hash of the handshake transcript, using the hash the suite and
    /// protocol version mandate for Finished and CertificateVerify.
    fn transcript_hash(
        &self,
        protocol: ProtocolVersion,
        suite: &CipherSuiteInfo,
        transcript: &[u8],
    ) -> Result<Vec<u8>, TlsError>;

    /// The TLS PRF for the given protocol version and suite.
    fn prf(
        &self,
        protocol: ProtocolVersion,
        suite: &CipherSuiteInfo,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>, TlsError>;

    fn create_key_exchange(
        &self,
        exchange: ExchangeAlgorithmType,
    ) -> Result<Box<dyn KeyExchange>, TlsError>;

    /// Sign the handshake transcript for CertificateVerify.
    fn sign_transcript(
        &self,
        algorithm: Option<SignatureAndHashAlgorithm>,
        transcript: &[u8],
    ) -> Result<Vec<u8>, TlsError>;

    /// Verify a CertificateVerify signature against the signer's leaf
    /// certificate.
    fn verify_transcript(
        &self,
        algorithm: Option<SignatureAndHashAlgorithm>,
        transcript: &[u8],
        certificate: &[u8],
        signature: &[u8],
    ) -> Result<bool, TlsError>;

    /// Validate a peer certificate chain. The default accepts any chain,
    /// leaving policy to the connection owner.
    fn verify_certificate_chain(&self, _certificates: &[Vec<u8>]) -> Result<(), TlsError> {
        Ok(())
    }
}

/// PRF(premaster, "master secret", ClientRandom ++ ServerRandom)[0..48].
pub fn derive_master_secret(
    provider: &dyn CryptoProvider,
    protocol: ProtocolVersion,
    suite: &CipherSuiteInfo,
    premaster: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    provider.prf(
        protocol,
        suite,
        premaster,
        MASTER_SECRET_LABEL,
        &seed,
        MASTER_SECRET_LENGTH,
    )
}

/// Verify data for a Finished message: PRF(master, label, Hash(transcript))[0..12].
pub fn compute_finished_hash(
    provider: &dyn CryptoProvider,
    protocol: ProtocolVersion,
    suite: &CipherSuiteInfo,
    master_secret: &[u8],
    label: &str,
    transcript: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    let digest = provider.transcript_hash(protocol, suite, transcript)?;
    provider.prf(
        protocol,
        suite,
        master_secret,
        label,
        &digest,
        VERIFY_DATA_LENGTH,
    )
}
