//! Full client/server handshake runs against a deterministic crypto
//! provider. The provider is a toy: it only has to be a pure function of
//! its inputs so both engines agree on every derived value.

use rtls_handshake::codec::{TlsReader, TlsWriter};
use rtls_handshake::config::{RenegotiationFlags, TlsConfig};
use rtls_handshake::crypt::{CipherSuiteInfo, CryptoProvider, KeyExchange, VERIFY_DATA_LENGTH};
use rtls_handshake::extensions::{ExtensionCollection, ExtensionType, TlsExtension};
use rtls_handshake::handshake::{parse_handshake_message, HandshakeMessage, ProtocolGuard};
use rtls_handshake::{
    ContentType, NegotiationEngine, NegotiationState, OutgoingMessage, SecurityStatus,
};
use rtls_types::{
    AlertDescription, CipherSuiteCode, ExchangeAlgorithmType, ProtocolVersion,
    SignatureAndHashAlgorithm, TlsError,
};
use zeroize::Zeroizing;

const CLIENT_PUBLIC: &[u8] = &[0x24; 16];
const SERVER_PUBLIC: &[u8] = &[0x42; 16];
const SIGNATURE_TAG: u8 = 0x51;

fn fold(data: &[u8]) -> [u8; 32] {
    let mut state = [0u8; 32];
    let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        acc = acc.wrapping_mul(0x0100_0000_01b3) ^ u64::from(byte);
        state[(acc % 32) as usize] ^= (acc >> 24) as u8;
    }
    for (i, slot) in state.iter_mut().enumerate() {
        *slot ^= (acc >> (8 * (i % 8))) as u8;
    }
    state
}

struct TestKeyExchange {
    exchange: ExchangeAlgorithmType,
    client_public: Vec<u8>,
    server_public: Vec<u8>,
}

impl TestKeyExchange {
    fn new(exchange: ExchangeAlgorithmType) -> Self {
        Self {
            exchange,
            client_public: Vec::new(),
            server_public: Vec::new(),
        }
    }

    fn read_public(reader: &mut TlsReader<'_>) -> Result<Vec<u8>, TlsError> {
        let length = reader.read_u16()? as usize;
        Ok(reader.read_bytes(length)?.to_vec())
    }
}

impl KeyExchange for TestKeyExchange {
    fn exchange_type(&self) -> ExchangeAlgorithmType {
        self.exchange
    }

    fn generate_server_params(&mut self, writer: &mut TlsWriter) -> Result<(), TlsError> {
        self.server_public = SERVER_PUBLIC.to_vec();
        writer.write_vec_u16(&self.server_public);
        Ok(())
    }

    fn read_server_params(&mut self, reader: &mut TlsReader<'_>) -> Result<(), TlsError> {
        self.server_public = Self::read_public(reader)?;
        Ok(())
    }

    fn generate_client_params(&mut self, writer: &mut TlsWriter) -> Result<(), TlsError> {
        self.client_public = CLIENT_PUBLIC.to_vec();
        writer.write_vec_u16(&self.client_public);
        Ok(())
    }

    fn read_client_params(&mut self, reader: &mut TlsReader<'_>) -> Result<(), TlsError> {
        self.client_public = Self::read_public(reader)?;
        Ok(())
    }

    fn premaster_secret(&mut self) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let mut material = self.client_public.clone();
        material.extend_from_slice(&self.server_public);
        Ok(Zeroizing::new(fold(&material).to_vec()))
    }
}

struct TestProvider;

impl CryptoProvider for TestProvider {
    fn transcript_hash(
        &self,
        _protocol: ProtocolVersion,
        _suite: &CipherSuiteInfo,
        transcript: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        Ok(fold(transcript).to_vec())
    }

    fn prf(
        &self,
        _protocol: ProtocolVersion,
        _suite: &CipherSuiteInfo,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let mut material = secret.to_vec();
        material.extend_from_slice(label.as_bytes());
        material.extend_from_slice(seed);
        let mut out = Zeroizing::new(Vec::with_capacity(output_length));
        let mut counter = 0u8;
        while out.len() < output_length {
            let mut block = material.clone();
            block.push(counter);
            out.extend_from_slice(&fold(&block));
            counter = counter.wrapping_add(1);
        }
        out.truncate(output_length);
        Ok(out)
    }

    fn create_key_exchange(
        &self,
        exchange: ExchangeAlgorithmType,
    ) -> Result<Box<dyn KeyExchange>, TlsError> {
        Ok(Box::new(TestKeyExchange::new(exchange)))
    }

    fn sign_transcript(
        &self,
        _algorithm: Option<SignatureAndHashAlgorithm>,
        transcript: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mut signature = vec![SIGNATURE_TAG];
        signature.extend_from_slice(&fold(transcript));
        Ok(signature)
    }

    fn verify_transcript(
        &self,
        algorithm: Option<SignatureAndHashAlgorithm>,
        transcript: &[u8],
        _certificate: &[u8],
        signature: &[u8],
    ) -> Result<bool, TlsError> {
        Ok(self.sign_transcript(algorithm, transcript)? == signature)
    }
}

fn client_config() -> TlsConfig {
    let mut config = TlsConfig::new(ProtocolVersion::Tls12);
    config.target_host = Some("example.test".into());
    config
}

fn server_config() -> TlsConfig {
    let mut config = TlsConfig::new(ProtocolVersion::Tls12);
    config.certificates = vec![vec![0x30, 0x03, 0x02, 0x01, 0x01]];
    config.has_credentials = true;
    config
}

fn new_client(config: TlsConfig) -> NegotiationEngine {
    NegotiationEngine::new_client(config, Box::new(TestProvider))
}

fn new_server(config: TlsConfig) -> NegotiationEngine {
    NegotiationEngine::new_server(config, Box::new(TestProvider))
}

fn feed(engine: &mut NegotiationEngine, messages: &[OutgoingMessage]) {
    for message in messages {
        engine
            .process_incoming(message.content_type, &message.payload)
            .unwrap();
    }
}

/// Pump both directions until both sides report a completed handshake.
fn run_handshake(client: &mut NegotiationEngine, server: &mut NegotiationEngine) {
    for _ in 0..8 {
        let client_out = client.take_outgoing();
        feed(server, &client_out);
        let server_out = server.take_outgoing();
        feed(client, &server_out);
        if client.is_complete() && server.is_complete() {
            return;
        }
    }
    panic!("handshake did not converge");
}

fn decode_client_hello(payload: &[u8]) -> HandshakeMessage {
    let (handshake_type, body) = parse_handshake_message(payload).unwrap();
    let guard = ProtocolGuard {
        requested: ProtocolVersion::Tls12,
        negotiated: None,
        supported: &[ProtocolVersion::Tls12],
    };
    HandshakeMessage::decode(handshake_type, body, &guard).unwrap()
}

#[test]
fn test_full_handshake() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    let client_info = client.connection_info().unwrap();
    let server_info = server.connection_info().unwrap();
    assert_eq!(client_info.protocol, ProtocolVersion::Tls12);
    assert_eq!(client_info.cipher_suite, server_info.cipher_suite);
    assert!(client_info.secure_renegotiation);
    assert!(server_info.secure_renegotiation);

    // Both sides agree on the Finished verify data of the handshake.
    assert_eq!(
        client.session().client_verify_data(),
        server.session().client_verify_data()
    );
    assert_eq!(
        client.session().server_verify_data(),
        server.session().server_verify_data()
    );
    assert_eq!(client.session().client_verify_data().len(), VERIFY_DATA_LENGTH);
}

#[test]
fn test_initial_client_hello_carries_sni_and_empty_renegotiation_info() {
    let mut client = new_client(client_config());
    client.start().unwrap();
    let out = client.take_outgoing();
    assert_eq!(out.len(), 1);

    let hello = match decode_client_hello(&out[0].payload) {
        HandshakeMessage::ClientHello(hello) => hello,
        other => panic!("expected ClientHello, got {other:?}"),
    };
    assert_eq!(
        hello.extensions.find(ExtensionType::SERVER_NAME),
        Some(&TlsExtension::ServerName {
            host: "example.test".into()
        })
    );
    assert_eq!(
        hello.extensions.find(ExtensionType::RENEGOTIATION_INFO),
        Some(&TlsExtension::Renegotiation { data: Vec::new() })
    );
    // The SCSV is only offered when the extension is suppressed.
    assert!(!hello
        .cipher_suites
        .contains(&CipherSuiteCode::TLS_EMPTY_RENEGOTIATION_INFO_SCSV));
}

#[test]
fn test_scsv_offered_instead_of_extension() {
    let mut config = client_config();
    config.renegotiation_flags =
        RenegotiationFlags::SECURE_RENEGOTIATION | RenegotiationFlags::SEND_CIPHER_SPEC_CODE;
    let mut client = new_client(config);
    client.start().unwrap();
    let out = client.take_outgoing();

    // Decoding a hello synthesizes the implicit empty extension from the
    // SCSV, so inspect the raw extension block instead.
    let (_, body) = parse_handshake_message(&out[0].payload).unwrap();
    let mut reader = TlsReader::new(body);
    reader.read_u16().unwrap();
    reader.read_bytes(32).unwrap();
    let session_length = reader.read_u8().unwrap() as usize;
    reader.read_bytes(session_length).unwrap();
    let cipher_length = reader.read_u16().unwrap() as usize;
    let cipher_bytes = reader.read_bytes(cipher_length).unwrap().to_vec();
    let compression_count = reader.read_u8().unwrap() as usize;
    reader.read_bytes(compression_count).unwrap();
    let extensions = ExtensionCollection::decode(&mut reader).unwrap();

    assert!(!extensions.contains(ExtensionType::RENEGOTIATION_INFO));
    assert!(cipher_bytes.chunks(2).any(|pair| {
        u16::from_be_bytes([pair[0], pair[1]])
            == CipherSuiteCode::TLS_EMPTY_RENEGOTIATION_INFO_SCSV.0
    }));
}

#[test]
fn test_scsv_only_client_accepts_renegotiation_info_echo() {
    let mut config = client_config();
    config.renegotiation_flags =
        RenegotiationFlags::SECURE_RENEGOTIATION | RenegotiationFlags::SEND_CIPHER_SPEC_CODE;
    let mut client = new_client(config);
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    assert!(client.connection_info().unwrap().secure_renegotiation);
    assert!(server.connection_info().unwrap().secure_renegotiation);
}

#[test]
fn test_dhe_handshake_uses_server_key_exchange() {
    let suite = CipherSuiteCode::TLS_DHE_RSA_WITH_AES_128_CBC_SHA256;
    let mut client_cfg = client_config();
    client_cfg.requested_ciphers = vec![suite];
    let mut server_cfg = server_config();
    server_cfg.requested_ciphers = vec![suite];

    let mut client = new_client(client_cfg);
    let mut server = new_server(server_cfg);
    client.start().unwrap();

    let client_hello = client.take_outgoing();
    feed(&mut server, &client_hello);
    let server_flight = server.take_outgoing();
    // ServerHello, Certificate, ServerKeyExchange, ServerHelloDone.
    assert_eq!(server_flight.len(), 4);
    assert_eq!(server_flight[2].payload[0], 12);

    feed(&mut client, &server_flight);
    let client_flight = client.take_outgoing();
    feed(&mut server, &client_flight);
    let finished_flight = server.take_outgoing();
    feed(&mut client, &finished_flight);

    assert!(client.is_complete());
    assert!(server.is_complete());
    assert_eq!(client.connection_info().unwrap().cipher_suite, suite);
}

#[test]
fn test_server_initiated_renegotiation() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    let first_client_verify = client.session().client_verify_data().to_vec();
    assert!(!first_client_verify.is_empty());

    server.request_renegotiation().unwrap();
    let hello_request = server.take_outgoing();
    assert_eq!(hello_request.len(), 1);
    let status = client
        .process_incoming(ContentType::Handshake, &hello_request[0].payload)
        .unwrap();
    assert_eq!(status, SecurityStatus::Renegotiate);

    // The renegotiation ClientHello carries the previous client Finished.
    let client_out = client.take_outgoing();
    let hello = match decode_client_hello(&client_out[0].payload) {
        HandshakeMessage::ClientHello(hello) => hello,
        other => panic!("expected ClientHello, got {other:?}"),
    };
    assert_eq!(
        hello.extensions.find(ExtensionType::RENEGOTIATION_INFO),
        Some(&TlsExtension::Renegotiation {
            data: first_client_verify.clone()
        })
    );

    feed(&mut server, &client_out);
    run_handshake(&mut client, &mut server);

    // A fresh handshake produced fresh verify data.
    assert_ne!(client.session().client_verify_data(), &first_client_verify[..]);
    assert_eq!(
        client.session().client_verify_data(),
        server.session().client_verify_data()
    );
}

#[test]
fn test_client_initiated_renegotiation() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    client.request_renegotiation().unwrap();
    run_handshake(&mut client, &mut server);
    assert!(client.is_complete());
    assert!(server.is_complete());
}

#[test]
fn test_renegotiation_requires_prior_verify_data() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    // A fresh engine has no verify data, so its hello must not open a
    // renegotiation on the established server.
    let mut stranger = new_client(client_config());
    stranger.start().unwrap();
    let out = stranger.take_outgoing();
    let err = server
        .process_incoming(out[0].content_type, &out[0].payload)
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::DecodeError);
}

#[test]
fn test_renegotiation_hello_without_renegotiation_info_rejected() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    // A hello that stays silent about renegotiation_info must not slip
    // past the verify data comparison.
    let hello = HandshakeMessage::ClientHello(rtls_handshake::handshake::ClientHello {
        protocol: ProtocolVersion::Tls12,
        random: vec![7; 32],
        session_id: Vec::new(),
        cipher_suites: vec![CipherSuiteCode::TLS_RSA_WITH_AES_128_CBC_SHA256],
        extensions: Default::default(),
    });
    let err = server
        .process_incoming(ContentType::Handshake, &hello.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::HandshakeFailure);
    assert!(server.take_outgoing().is_empty());
}

#[test]
fn test_tampered_server_finished_rejected() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();

    let client_hello = client.take_outgoing();
    feed(&mut server, &client_hello);
    let server_flight = server.take_outgoing();
    feed(&mut client, &server_flight);
    let client_flight = client.take_outgoing();
    feed(&mut server, &client_flight);

    let finished_flight = server.take_outgoing();
    assert_eq!(finished_flight[0].content_type, ContentType::ChangeCipherSpec);
    client
        .process_incoming(ContentType::ChangeCipherSpec, &finished_flight[0].payload)
        .unwrap();

    let mut tampered = finished_flight[1].payload.clone();
    *tampered.last_mut().unwrap() ^= 0x01;
    let err = client
        .process_incoming(ContentType::Handshake, &tampered)
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::HandshakeFailure);
}

#[test]
fn test_abort_when_server_ignores_secure_renegotiation() {
    let mut config = client_config();
    config.renegotiation_flags =
        RenegotiationFlags::default() | RenegotiationFlags::ABORT_HANDSHAKE_IF_UNSUPPORTED;
    let mut client = new_client(config);
    client.start().unwrap();
    let out = client.take_outgoing();
    let hello = match decode_client_hello(&out[0].payload) {
        HandshakeMessage::ClientHello(hello) => hello,
        other => panic!("expected ClientHello, got {other:?}"),
    };

    // A ServerHello that picks a valid cipher but stays silent about
    // renegotiation_info.
    let reply = HandshakeMessage::ServerHello(rtls_handshake::handshake::ServerHello {
        protocol: ProtocolVersion::Tls12,
        random: vec![7; 32],
        session_id: Vec::new(),
        cipher_suite: hello.cipher_suites[0],
        extensions: Default::default(),
    });
    let err = client
        .process_incoming(ContentType::Handshake, &reply.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::HandshakeFailure);
}

#[test]
fn test_server_hello_with_unoffered_cipher_rejected() {
    let mut client = new_client(client_config());
    client.start().unwrap();
    client.take_outgoing();

    let reply = HandshakeMessage::ServerHello(rtls_handshake::handshake::ServerHello {
        protocol: ProtocolVersion::Tls12,
        random: vec![7; 32],
        session_id: Vec::new(),
        cipher_suite: CipherSuiteCode(0x1234),
        extensions: Default::default(),
    });
    let err = client
        .process_incoming(ContentType::Handshake, &reply.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::InsufficientSecurity);
}

#[test]
fn test_client_certificate_exchange() {
    let mut client_cfg = client_config();
    client_cfg.certificates = vec![vec![0x30, 0x03, 0x02, 0x01, 0x02]];
    client_cfg.has_credentials = true;
    client_cfg.signature_parameters = Some(vec![
        SignatureAndHashAlgorithm::RSA_SHA256,
        SignatureAndHashAlgorithm::RSA_SHA1,
    ]);

    let mut server_cfg = server_config();
    server_cfg.ask_for_client_certificate = true;
    server_cfg.require_client_certificate = true;

    let mut client = new_client(client_cfg);
    let mut server = new_server(server_cfg);
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    assert!(client.is_complete());
    assert!(server.is_complete());
}

#[test]
fn test_required_client_certificate_enforced() {
    // The client has nothing to present; the server demands a certificate.
    let mut server_cfg = server_config();
    server_cfg.ask_for_client_certificate = true;
    server_cfg.require_client_certificate = true;

    let mut client = new_client(client_config());
    let mut server = new_server(server_cfg);
    client.start().unwrap();

    let client_hello = client.take_outgoing();
    feed(&mut server, &client_hello);
    let server_flight = server.take_outgoing();
    feed(&mut client, &server_flight);

    // The client answers with an empty certificate list.
    let client_flight = client.take_outgoing();
    let err = server
        .process_incoming(client_flight[0].content_type, &client_flight[0].payload)
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::HandshakeFailure);
}

#[test]
fn test_server_without_credentials_fails() {
    let mut client = new_client(client_config());
    let mut server = new_server(TlsConfig::new(ProtocolVersion::Tls12));
    client.start().unwrap();
    let out = client.take_outgoing();
    let err = server
        .process_incoming(out[0].content_type, &out[0].payload)
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::InternalError);
}

#[test]
fn test_protocol_mismatch_rejected() {
    let mut client = new_client(client_config());
    let mut server = new_server({
        let mut config = server_config();
        config.requested_protocol = ProtocolVersion::Tls11;
        config.supported_protocols = vec![ProtocolVersion::Tls11];
        config
    });
    client.start().unwrap();
    let out = client.take_outgoing();
    let err = server
        .process_incoming(out[0].content_type, &out[0].payload)
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::ProtocolVersion);
}

#[test]
fn test_tls10_handshake() {
    let mut client_cfg = TlsConfig::new(ProtocolVersion::Tls10);
    client_cfg.target_host = Some("example.test".into());
    let mut server_cfg = TlsConfig::new(ProtocolVersion::Tls10);
    server_cfg.certificates = vec![vec![0x30, 0x03, 0x02, 0x01, 0x01]];
    server_cfg.has_credentials = true;

    let mut client = new_client(client_cfg);
    let mut server = new_server(server_cfg);
    client.start().unwrap();
    run_handshake(&mut client, &mut server);

    assert_eq!(
        client.connection_info().unwrap().protocol,
        ProtocolVersion::Tls10
    );
}

#[test]
fn test_disallowed_server_rejects_renegotiation_request() {
    let mut server_cfg = server_config();
    server_cfg.renegotiation_flags = RenegotiationFlags::DISALLOW_RENEGOTIATION;
    let mut server = new_server(server_cfg);
    // No handshake has even started; the request is refused outright.
    let err = server.request_renegotiation().unwrap_err();
    assert_eq!(err.description, AlertDescription::InternalError);

    assert_eq!(server.state(), NegotiationState::InitialServerConnection);
}

#[test]
fn test_out_of_order_finished_rejected() {
    let mut client = new_client(client_config());
    let mut server = new_server(server_config());
    client.start().unwrap();
    let client_hello = client.take_outgoing();
    feed(&mut server, &client_hello);
    server.take_outgoing();

    // A Finished before ChangeCipherSpec is out of order.
    let finished = HandshakeMessage::Finished {
        verify_data: vec![0; VERIFY_DATA_LENGTH],
    };
    let err = server
        .process_incoming(ContentType::Handshake, &finished.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.description, AlertDescription::UnexpectedMessage);
}
