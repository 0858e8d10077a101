//! Server-side negotiation: ClientHello processing, the server flight, and
//! the client's second flight.

use rtls_types::{ExchangeAlgorithmType, TlsError};
use subtle::ConstantTimeEq;

use crate::codec::{TlsReader, TlsWriter};
use crate::config::RenegotiationFlags;
use crate::crypt::{cipher_suite_info, default_ciphers, CLIENT_FINISHED_LABEL, SERVER_FINISHED_LABEL};
use crate::extensions::ExtensionType;
use crate::handshake::{
    CertificateRequest, CertificateVerify, ClientHello, HandshakeMessage, ServerHello,
};
use crate::session::{new_hello_random, CryptoParameters};

use super::{MessageStatus, NegotiationEngine, NegotiationState};

impl NegotiationEngine {
    /// A ClientHello opening an initial handshake or a renegotiation.
    pub(crate) fn handle_client_hello_state(
        &mut self,
        message: HandshakeMessage,
        renegotiating: bool,
    ) -> Result<MessageStatus, TlsError> {
        let hello = match message {
            HandshakeMessage::ClientHello(hello) => hello,
            _ => return Err(TlsError::unexpected_message("expected ClientHello")),
        };

        if renegotiating {
            if self
                .config
                .renegotiation_flags
                .contains(RenegotiationFlags::DISALLOW_RENEGOTIATION)
            {
                return Err(TlsError::handshake_failure("renegotiation not allowed"));
            }
            if !self.session.secure_renegotiation() {
                return Err(TlsError::handshake_failure(
                    "insecure renegotiation attempt",
                ));
            }
            // The hello must carry the extension so the verify data of the
            // previous handshake gets compared at all. The SCSV decodes as
            // the empty extension and fails that comparison.
            if !hello
                .extensions
                .contains(ExtensionType::RENEGOTIATION_INFO)
            {
                return Err(TlsError::handshake_failure(
                    "renegotiation without renegotiation_info",
                ));
            }
        }

        // Accepting the hello commits us to answering with a certificate.
        if !self.config.has_credentials || self.config.certificates.is_empty() {
            return Err(TlsError::internal_error(
                "no server certificate or private key",
            ));
        }

        self.start_handshake()?;
        self.handle_client_hello(hello)?;
        self.flags.hello = true;

        if renegotiating {
            Ok(MessageStatus::Renegotiate)
        } else {
            Ok(MessageStatus::GenerateOutput)
        }
    }

    fn handle_client_hello(&mut self, hello: ClientHello) -> Result<(), TlsError> {
        let protocol = self.negotiated_protocol()?;
        self.select_cipher(protocol, &hello)?;

        let handshake = self
            .handshake
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))?;
        handshake.client_random = hello.random;
        for extension in hello.extensions.iter() {
            if let Some(response) =
                extension.process_as_server(&self.config, &mut self.session, handshake)?
            {
                handshake.active_extensions.push(response);
            }
        }
        Ok(())
    }

    /// First client suite that we support wins. Codes we do not recognize
    /// are skipped, not rejected.
    fn select_cipher(
        &mut self,
        protocol: rtls_types::ProtocolVersion,
        hello: &ClientHello,
    ) -> Result<(), TlsError> {
        let supported = if self.config.requested_ciphers.is_empty() {
            default_ciphers(protocol)
        } else {
            self.config.requested_ciphers.clone()
        };

        let selected = hello
            .cipher_suites
            .iter()
            .filter(|code| supported.contains(*code))
            .find_map(|code| cipher_suite_info(*code))
            .ok_or_else(|| {
                TlsError::handshake_failure("invalid cipher suite received from client")
            })?;

        self.handshake_mut()?.supported_ciphers = supported;
        self.session.pending_crypto = Some(CryptoParameters::new(protocol, selected));
        Ok(())
    }

    /// ServerHello through ServerHelloDone, then wait for the client's
    /// second flight.
    pub(crate) fn generate_server_flight(&mut self) -> Result<(), TlsError> {
        let protocol = self.negotiated_protocol()?;
        let server_random = new_hello_random()?;

        let (session_id, extensions) = {
            let handshake = self.handshake_mut()?;
            handshake.server_random = server_random.clone();
            (
                handshake.session_id.clone().unwrap_or_default(),
                handshake.active_extensions.clone(),
            )
        };
        let suite = self
            .session
            .pending_crypto
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("no pending cipher"))?
            .suite;

        self.emit_handshake(&HandshakeMessage::ServerHello(ServerHello {
            protocol,
            random: server_random,
            session_id,
            cipher_suite: suite.code,
            extensions,
        }))?;

        let certificates = self.config.certificates.clone();
        if let Some(pending) = self.session.pending_crypto.as_mut() {
            pending.server_certificates = certificates.clone();
        }
        self.emit_handshake(&HandshakeMessage::Certificate { certificates })?;

        let mut key_exchange = self.provider.create_key_exchange(suite.exchange)?;
        if suite.exchange != ExchangeAlgorithmType::Rsa {
            let mut writer = TlsWriter::new();
            key_exchange.generate_server_params(&mut writer)?;
            self.emit_handshake(&HandshakeMessage::ServerKeyExchange {
                params: writer.into_bytes(),
            })?;
        }
        self.handshake_mut()?.key_exchange = Some(key_exchange);

        if self.config.ask_for_client_certificate {
            let mut params = self
                .config
                .client_certificate_parameters
                .clone()
                .unwrap_or_default();
            params.ensure_defaults();
            self.emit_handshake(&HandshakeMessage::CertificateRequest(CertificateRequest {
                protocol,
                certificate_types: params.certificate_types.clone(),
                signature_algorithms: params.signature_algorithms.clone(),
                certificate_authorities: params.certificate_authorities.clone(),
            }))?;
            self.handshake_mut()?.client_certificate_parameters = Some(params);
        }

        self.emit_handshake(&HandshakeMessage::ServerHelloDone)?;
        self.transition(NegotiationState::ClientKeyExchange);
        Ok(())
    }

    /// One message of the client's second flight.
    pub(crate) fn handle_client_flight(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<MessageStatus, TlsError> {
        match message {
            HandshakeMessage::Certificate { certificates } => {
                if !self.config.ask_for_client_certificate {
                    return Err(TlsError::unexpected_message(
                        "unsolicited client certificate",
                    ));
                }
                self.provider.verify_certificate_chain(&certificates)?;
                if self.config.require_client_certificate && certificates.is_empty() {
                    return Err(TlsError::handshake_failure(
                        "client certificate required",
                    ));
                }
                let pending = self
                    .session
                    .pending_crypto
                    .as_mut()
                    .ok_or_else(|| TlsError::internal_error("no pending cipher"))?;
                pending.client_certificates = certificates;
                self.flags.certificate = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::ClientKeyExchange { params } => {
                if self.config.require_client_certificate && !self.flags.certificate {
                    return Err(TlsError::unexpected_message(
                        "peer did not respond with a certificate",
                    ));
                }
                let mut reader = TlsReader::new(&params);
                self.handshake_mut()?
                    .key_exchange_mut()?
                    .read_client_params(&mut reader)?;
                reader.expect_consumed()?;
                self.initialize_cipher()?;
                self.flags.client_key_exchange = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::CertificateVerify(verify) => {
                self.handle_certificate_verify(verify)?;
                self.flags.certificate_verify = true;
                Ok(MessageStatus::ContinueNeeded)
            }
            HandshakeMessage::Finished { verify_data } => {
                self.handle_client_finished(&verify_data)?;
                self.flags.finished = true;
                Ok(MessageStatus::Finished)
            }
            _ => Err(TlsError::unexpected_message(
                "unexpected message in client flight",
            )),
        }
    }

    fn handle_certificate_verify(&mut self, verify: CertificateVerify) -> Result<(), TlsError> {
        let leaf = self
            .session
            .pending_crypto
            .as_ref()
            .and_then(|pending| pending.client_certificates.first())
            .cloned()
            .ok_or_else(|| {
                TlsError::handshake_failure("CertificateVerify without a client certificate")
            })?;

        if let Some(algorithm) = verify.algorithm {
            let acceptable = self
                .handshake_ref()?
                .client_certificate_parameters
                .as_ref()
                .map(|params| params.signature_algorithms.contains(&algorithm))
                .unwrap_or(true);
            if !acceptable {
                return Err(TlsError::illegal_parameter(
                    "signature algorithm was not offered",
                ));
            }
        }

        let transcript = self.handshake_ref()?.transcript().to_vec();
        let valid =
            self.provider
                .verify_transcript(verify.algorithm, &transcript, &leaf, &verify.signature)?;
        if !valid {
            return Err(TlsError::handshake_failure(
                "invalid CertificateVerify signature",
            ));
        }
        Ok(())
    }

    fn handle_client_finished(&mut self, verify_data: &[u8]) -> Result<(), TlsError> {
        let read_crypto = self
            .session
            .read_crypto()
            .ok_or_else(|| TlsError::internal_error("no read cipher"))?;
        let expected = self.finished_hash(read_crypto, CLIENT_FINISHED_LABEL)?;
        if !bool::from(verify_data.ct_eq(&expected)) {
            return Err(TlsError::handshake_failure("invalid client Finished"));
        }
        self.session.set_client_verify_data(expected);
        Ok(())
    }

    /// ChangeCipherSpec and the server Finished, closing the handshake.
    pub(crate) fn generate_server_finished_flight(&mut self) -> Result<(), TlsError> {
        self.send_change_cipher_spec();
        self.session.switch_to_new_cipher();

        let write_crypto = self
            .session
            .write_crypto()
            .ok_or_else(|| TlsError::internal_error("no write cipher"))?;
        let verify_data = self.finished_hash(write_crypto, SERVER_FINISHED_LABEL)?;
        self.session.set_server_verify_data(verify_data.clone());
        self.emit_handshake(&HandshakeMessage::Finished {
            verify_data: verify_data.to_vec(),
        })?;

        self.finish_handshake()?;
        self.transition(NegotiationState::RenegotiatingServerConnection);
        Ok(())
    }
}
