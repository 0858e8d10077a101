//! Client-side negotiation: HelloRequest policy, the server flight, and the
//! client's second flight.

use rtls_types::{CipherSuiteCode, ExchangeAlgorithmType, SignatureAndHashAlgorithm, TlsError};
use subtle::ConstantTimeEq;

use crate::codec::{TlsReader, TlsWriter};
use crate::config::{ClientCertificateParameters, RenegotiationFlags};
use crate::crypt::{cipher_suite_info, default_ciphers, CLIENT_FINISHED_LABEL, SERVER_FINISHED_LABEL};
use crate::extensions::{is_legal_host_name, ExtensionCollection, TlsExtension};
use crate::handshake::{CertificateVerify, ClientHello, HandshakeMessage, ServerHello};
use crate::session::{new_hello_random, CryptoParameters};

use super::{MessageStatus, NegotiationEngine, NegotiationState};

impl NegotiationEngine {
    /// HelloRequest policy, checked in fixed order: abort beats disallow
    /// beats the renegotiation decision itself.
    pub(crate) fn handle_hello_request(
        &mut self,
        renegotiating: bool,
    ) -> Result<MessageStatus, TlsError> {
        let flags = self.config.renegotiation_flags;
        if flags.contains(RenegotiationFlags::ABORT_ON_HELLO_REQUEST) {
            return Err(TlsError::handshake_failure("renegotiation request rejected"));
        }
        if flags.contains(RenegotiationFlags::DISALLOW_RENEGOTIATION) {
            return Ok(MessageStatus::Discard);
        }
        if !renegotiating {
            return Ok(MessageStatus::IgnoreMessage);
        }
        if self.session.secure_renegotiation() {
            return Ok(MessageStatus::Renegotiate);
        }
        Ok(MessageStatus::IgnoreMessage)
    }

    /// Build and queue a ClientHello, then wait for the server flight.
    pub(crate) fn generate_client_hello_flight(&mut self) -> Result<(), TlsError> {
        self.start_handshake()?;

        let protocol = self.config.requested_protocol;
        let random = new_hello_random()?;
        let mut ciphers = if self.config.requested_ciphers.is_empty() {
            default_ciphers(protocol)
        } else {
            self.config.requested_ciphers.clone()
        };

        let enable = self.config.enable_secure_renegotiation();
        let secure = self.session.secure_renegotiation();
        let flags = self.config.renegotiation_flags;

        let mut extensions = ExtensionCollection::new();
        if let Some(host) = self.config.target_host.clone() {
            if is_legal_host_name(&host) {
                extensions.push(TlsExtension::ServerName { host });
            }
        }
        let mut requested_secure = false;
        if enable && (secure || flags.contains(RenegotiationFlags::SEND_CLIENT_HELLO_EXTENSION)) {
            // On the initial handshake the verify data is empty; on a
            // renegotiation it is the previous handshake's client Finished.
            requested_secure = true;
            extensions.push(TlsExtension::Renegotiation {
                data: self.session.client_verify_data().to_vec(),
            });
        }
        if protocol.has_signature_algorithms() {
            if let Some(algorithms) = self.config.signature_parameters.clone() {
                extensions.push(TlsExtension::SignatureAlgorithms { algorithms });
            }
        }
        let mut requested_extensions = extensions.clone();
        if enable && !secure && flags.contains(RenegotiationFlags::SEND_CIPHER_SPEC_CODE) {
            // The SCSV stands in for the empty extension, so a compliant
            // server may still answer with renegotiation_info.
            requested_secure = true;
            requested_extensions.add_renegotiation_extension();
            ciphers.push(CipherSuiteCode::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        }

        let handshake = self.handshake_mut()?;
        handshake.client_random = random.clone();
        handshake.supported_ciphers = ciphers.clone();
        handshake.requested_extensions = requested_extensions;
        handshake.requested_secure_negotiation = requested_secure;

        let hello = HandshakeMessage::ClientHello(ClientHello {
            protocol,
            random,
            session_id: Vec::new(),
            cipher_suites: ciphers,
            extensions,
        });
        self.emit_handshake(&hello)?;
        self.transition(NegotiationState::ServerHello);
        Ok(())
    }

    /// One message of the server's first flight, ServerHello through
    /// ServerHelloDone.
    pub(crate) fn handle_server_flight(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match message {
            HandshakeMessage::ServerHello(hello) => {
                self.handle_server_hello(hello)?;
                self.flags.hello = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::Certificate { certificates } => {
                self.provider.verify_certificate_chain(&certificates)?;
                let pending = self
                    .session
                    .pending_crypto
                    .as_mut()
                    .ok_or_else(|| TlsError::internal_error("no pending cipher"))?;
                pending.server_certificates = certificates;
                self.flags.certificate = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::ServerKeyExchange { params } => {
                self.handle_server_key_exchange(&params)?;
                self.flags.server_key_exchange = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::CertificateRequest(request) => {
                let handshake = self.handshake_mut()?;
                handshake.client_certificate_parameters = Some(ClientCertificateParameters {
                    certificate_types: request.certificate_types,
                    signature_algorithms: request.signature_algorithms,
                    certificate_authorities: request.certificate_authorities,
                });
                self.flags.certificate_request = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::ServerHelloDone => {
                self.flags.done = true;
                Ok(MessageStatus::GenerateOutput)
            }
            _ => Err(TlsError::unexpected_message(
                "unexpected message in server flight",
            )),
        }
    }

    fn handle_server_hello(&mut self, hello: ServerHello) -> Result<(), TlsError> {
        let protocol = self.negotiated_protocol()?;

        {
            let handshake = self.handshake_mut()?;
            handshake.server_random = hello.random;
            handshake.session_id = Some(hello.session_id);
        }

        // Every extension must have been requested, and at most once.
        let handshake = self
            .handshake
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))?;
        for extension in hello.extensions.iter() {
            let extension_type = extension.extension_type();
            if !handshake.requested_extensions.contains(extension_type) {
                return Err(TlsError::unsupported_extension(
                    "server sent an extension we did not request",
                ));
            }
            if handshake.active_extensions.contains(extension_type) {
                return Err(TlsError::unsupported_extension("duplicate extension"));
            }
            extension.process_as_client(&mut self.session, handshake)?;
            handshake.active_extensions.push(extension.clone());
        }

        self.check_secure_renegotiation()?;

        // The selected cipher must come from what we offered and be known
        // to the registry for the negotiated version.
        let offered = &self.handshake_ref()?.supported_ciphers;
        if !offered.contains(&hello.cipher_suite) {
            return Err(TlsError::insufficient_security(
                "server selected a cipher suite we did not offer",
            ));
        }
        let info = cipher_suite_info(hello.cipher_suite).ok_or_else(|| {
            TlsError::insufficient_security("server selected an unknown cipher suite")
        })?;
        if info.min_protocol.code() > protocol.code() {
            return Err(TlsError::insufficient_security(
                "cipher suite not valid for the negotiated version",
            ));
        }
        self.session.pending_crypto = Some(CryptoParameters::new(protocol, info));
        Ok(())
    }

    /// Reconcile what we asked for with what the server answered.
    fn check_secure_renegotiation(&mut self) -> Result<(), TlsError> {
        let handshake = self.handshake_ref()?;
        let requested = handshake.requested_secure_negotiation;
        let supported = handshake.secure_negotiation_supported;

        if requested && supported {
            self.session.enable_secure_renegotiation();
            return Ok(());
        }
        if self.session.secure_renegotiation() {
            // The connection was secure and the server dropped the
            // extension mid-stream.
            return Err(TlsError::handshake_failure(
                "server no longer supports secure renegotiation",
            ));
        }
        if !requested {
            self.config.force_disable_renegotiation();
            return Ok(());
        }
        if self
            .config
            .renegotiation_flags
            .contains(RenegotiationFlags::ABORT_HANDSHAKE_IF_UNSUPPORTED)
        {
            return Err(TlsError::handshake_failure(
                "server does not support secure renegotiation",
            ));
        }
        self.config.force_disable_renegotiation();
        Ok(())
    }

    fn handle_server_key_exchange(&mut self, params: &[u8]) -> Result<(), TlsError> {
        let exchange = self
            .session
            .pending_crypto
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("no pending cipher"))?
            .suite
            .exchange;
        let mut key_exchange = self.provider.create_key_exchange(exchange)?;
        let mut reader = TlsReader::new(params);
        key_exchange.read_server_params(&mut reader)?;
        reader.expect_consumed()?;
        self.handshake_mut()?.key_exchange = Some(key_exchange);
        Ok(())
    }

    /// Certificate (if asked), ClientKeyExchange, CertificateVerify (if we
    /// sent a certificate), ChangeCipherSpec and Finished.
    pub(crate) fn generate_client_second_flight(&mut self) -> Result<(), TlsError> {
        let certificate_requested = self.flags.certificate_request;

        let mut sent_certificates = Vec::new();
        if certificate_requested {
            // An empty list is the polite refusal when no credentials are
            // configured.
            if self.config.has_credentials {
                sent_certificates = self.config.certificates.clone();
            }
            let certificate = HandshakeMessage::Certificate {
                certificates: sent_certificates.clone(),
            };
            self.emit_handshake(&certificate)?;
            if let Some(pending) = self.session.pending_crypto.as_mut() {
                pending.client_certificates = sent_certificates.clone();
            }
        }

        let exchange = self
            .session
            .pending_crypto
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("no pending cipher"))?
            .suite
            .exchange;
        if exchange == ExchangeAlgorithmType::Rsa {
            // RSA never has a ServerKeyExchange, so the exchange starts here.
            let key_exchange = self.provider.create_key_exchange(exchange)?;
            self.handshake_mut()?.key_exchange = Some(key_exchange);
        }
        let mut writer = TlsWriter::new();
        self.handshake_mut()?
            .key_exchange_mut()?
            .generate_client_params(&mut writer)?;
        self.emit_handshake(&HandshakeMessage::ClientKeyExchange {
            params: writer.into_bytes(),
        })?;

        if certificate_requested && !sent_certificates.is_empty() && self.config.has_credentials {
            let protocol = self.negotiated_protocol()?;
            let algorithm = protocol
                .has_signature_algorithms()
                .then(|| self.select_signature_algorithm());
            let transcript = self.handshake_ref()?.transcript().to_vec();
            let signature = self.provider.sign_transcript(algorithm, &transcript)?;
            self.emit_handshake(&HandshakeMessage::CertificateVerify(CertificateVerify {
                protocol,
                algorithm,
                signature,
            }))?;
        }

        self.initialize_cipher()?;
        self.send_change_cipher_spec();

        let write_crypto = self
            .session
            .write_crypto()
            .ok_or_else(|| TlsError::internal_error("no write cipher"))?;
        let verify_data = self.finished_hash(write_crypto, CLIENT_FINISHED_LABEL)?;
        self.session.set_client_verify_data(verify_data.clone());
        self.emit_handshake(&HandshakeMessage::Finished {
            verify_data: verify_data.to_vec(),
        })?;

        self.transition(NegotiationState::ServerFinished);
        Ok(())
    }

    /// Pick the CertificateVerify algorithm: the first the server asked for
    /// that we also offer.
    fn select_signature_algorithm(&self) -> SignatureAndHashAlgorithm {
        let offered = self
            .config
            .signature_parameters
            .clone()
            .unwrap_or_else(|| vec![SignatureAndHashAlgorithm::RSA_SHA256]);
        let requested = self
            .handshake
            .as_ref()
            .and_then(|handshake| handshake.client_certificate_parameters.as_ref())
            .map(|params| params.signature_algorithms.as_slice())
            .unwrap_or(&[]);
        for algorithm in requested {
            if offered.contains(algorithm) {
                return *algorithm;
            }
        }
        offered
            .first()
            .copied()
            .unwrap_or(SignatureAndHashAlgorithm::RSA_SHA256)
    }

    /// The server's Finished, verified against our own view of the
    /// transcript under the freshly activated cipher.
    pub(crate) fn handle_server_finished(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        let verify_data = match message {
            HandshakeMessage::Finished { verify_data } => verify_data,
            _ => {
                return Err(TlsError::unexpected_message(
                    "expected the server Finished",
                ))
            }
        };

        let read_crypto = self
            .session
            .read_crypto()
            .ok_or_else(|| TlsError::internal_error("no read cipher"))?;
        let expected = self.finished_hash(read_crypto, SERVER_FINISHED_LABEL)?;
        if verify_data.len() != expected.len()
            || !bool::from(verify_data.as_slice().ct_eq(&expected))
        {
            return Err(TlsError::handshake_failure("invalid server Finished"));
        }
        self.session.set_server_verify_data(expected);
        self.flags.finished = true;
        self.finish_handshake()?;
        Ok(MessageStatus::Finished)
    }
}
