//! The handshake negotiation state machine.
//!
//! [`NegotiationEngine`] is a sans-I/O driver: the record layer feeds it one
//! decrypted message per call and drains the messages it wants sent. Each
//! side walks a fixed set of states; every state validates incoming message
//! types against an allow-list before processing, so an out-of-order message
//! is always an unexpected_message alert rather than undefined behavior.

mod client;
mod server;

use rtls_types::{ProtocolVersion, TlsError};
use zeroize::Zeroizing;

use crate::config::TlsConfig;
use crate::connection_info::ConnectionInfo;
use crate::crypt::{compute_finished_hash, derive_master_secret, CryptoProvider};
use crate::handshake::{
    parse_handshake_message, validate_change_cipher_spec, HandshakeMessage, HandshakeType,
    ProtocolGuard,
};
use crate::session::{CryptoParameters, HandshakeParameters, Session};
use crate::{ContentType, TlsRole};

/// Where the engine is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Client before its first ClientHello has been answered.
    InitialClientConnection,
    /// Client with a completed handshake, able to renegotiate.
    RenegotiatingClientConnection,
    /// Client collecting the server's first flight.
    ServerHello,
    /// Client waiting for the server's ChangeCipherSpec and Finished.
    ServerFinished,
    /// Server waiting for the first ClientHello.
    InitialServerConnection,
    /// Server with a completed handshake, able to renegotiate.
    RenegotiatingServerConnection,
    /// Server collecting the client's second flight.
    ClientKeyExchange,
}

/// Outcome of feeding one message to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityStatus {
    /// A handshake completed, or a message was deliberately discarded.
    Ok,
    /// More handshake messages are expected.
    ContinueNeeded,
    /// A renegotiation cycle has started.
    Renegotiate,
}

/// Internal per-message outcome, mapped onto [`SecurityStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageStatus {
    Finished,
    ContinueNeeded,
    GenerateOutput,
    IgnoreMessage,
    /// Silently drop the message and report success without any output.
    Discard,
    Renegotiate,
}

/// One record payload the engine wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content_type: ContentType,
    pub payload: Vec<u8>,
}

/// Tracks which messages the current state has already accepted.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StateFlags {
    pub hello: bool,
    pub certificate: bool,
    pub server_key_exchange: bool,
    pub certificate_request: bool,
    pub done: bool,
    pub client_key_exchange: bool,
    pub certificate_verify: bool,
    pub change_cipher_spec: bool,
    pub finished: bool,
}

pub struct NegotiationEngine {
    pub(crate) role: TlsRole,
    pub(crate) config: TlsConfig,
    pub(crate) provider: Box<dyn CryptoProvider>,
    pub(crate) session: Session,
    pub(crate) negotiated_protocol: Option<ProtocolVersion>,
    pub(crate) handshake: Option<HandshakeParameters>,
    pub(crate) state: NegotiationState,
    pub(crate) flags: StateFlags,
    pub(crate) pending_output: Vec<OutgoingMessage>,
    pub(crate) connection_info: Option<ConnectionInfo>,
}

impl NegotiationEngine {
    pub fn new_client(config: TlsConfig, provider: Box<dyn CryptoProvider>) -> Self {
        Self::new(TlsRole::Client, NegotiationState::InitialClientConnection, config, provider)
    }

    pub fn new_server(config: TlsConfig, provider: Box<dyn CryptoProvider>) -> Self {
        Self::new(TlsRole::Server, NegotiationState::InitialServerConnection, config, provider)
    }

    fn new(
        role: TlsRole,
        state: NegotiationState,
        config: TlsConfig,
        provider: Box<dyn CryptoProvider>,
    ) -> Self {
        Self {
            role,
            config,
            provider,
            session: Session::default(),
            negotiated_protocol: None,
            handshake: None,
            state,
            flags: StateFlags::default(),
            pending_output: Vec::new(),
            connection_info: None,
        }
    }

    /// Kick off the handshake. A client emits its first ClientHello; a
    /// server waits for the peer.
    pub fn start(&mut self) -> Result<(), TlsError> {
        match self.role {
            TlsRole::Client => self.generate_client_hello_flight(),
            TlsRole::Server => Ok(()),
        }
    }

    /// Feed one record payload: exactly one handshake message, or one
    /// ChangeCipherSpec.
    pub fn process_incoming(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<SecurityStatus, TlsError> {
        let (handshake_type, body) = match content_type {
            ContentType::Handshake => parse_handshake_message(payload)?,
            ContentType::ChangeCipherSpec => {
                validate_change_cipher_spec(payload)?;
                (HandshakeType::ChangeCipherSpec, &[][..])
            }
            _ => {
                return Err(TlsError::unexpected_message(
                    "not a handshake content type",
                ))
            }
        };

        // The peer must not push new handshake data while our previous
        // flight is still waiting to be sent.
        if !self.pending_output.is_empty() && handshake_type != HandshakeType::HelloRequest {
            return Err(TlsError::internal_error("pending output not yet drained"));
        }

        if !self.verify_message(handshake_type) {
            return Err(TlsError::unexpected_message(format!(
                "{handshake_type:?} not expected in state {:?}",
                self.state
            )));
        }

        let status = self.dispatch(handshake_type, body)?;

        let is_handshake = content_type == ContentType::Handshake;
        match status {
            MessageStatus::Finished => {
                // The transcript hash of the final Finished is only needed
                // again on the server, which still has to send its own.
                if self.role == TlsRole::Server && is_handshake {
                    self.add_to_transcript(payload);
                }
                self.generate_output()?;
                Ok(SecurityStatus::Ok)
            }
            MessageStatus::Renegotiate => {
                if is_handshake && handshake_type != HandshakeType::HelloRequest {
                    self.add_to_transcript(payload);
                }
                self.generate_output()?;
                Ok(SecurityStatus::Renegotiate)
            }
            MessageStatus::GenerateOutput => {
                if is_handshake {
                    self.add_to_transcript(payload);
                }
                self.generate_output()?;
                Ok(SecurityStatus::ContinueNeeded)
            }
            MessageStatus::ContinueNeeded => {
                if is_handshake {
                    self.add_to_transcript(payload);
                }
                Ok(SecurityStatus::ContinueNeeded)
            }
            MessageStatus::IgnoreMessage => Ok(SecurityStatus::ContinueNeeded),
            MessageStatus::Discard => Ok(SecurityStatus::Ok),
        }
    }

    /// Drain the messages the engine wants sent, in order.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.pending_output)
    }

    /// A handshake is complete once a side is back in its renegotiable
    /// state with nothing left to send.
    pub fn is_complete(&self) -> bool {
        self.pending_output.is_empty()
            && matches!(
                self.state,
                NegotiationState::RenegotiatingClientConnection
                    | NegotiationState::RenegotiatingServerConnection
            )
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Negotiated parameters, available once the handshake has completed.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection_info.as_ref()
    }

    /// Start a renegotiation from a completed handshake. A server emits a
    /// HelloRequest; a client emits a fresh ClientHello.
    pub fn request_renegotiation(&mut self) -> Result<(), TlsError> {
        use crate::config::RenegotiationFlags;

        if !self.is_complete() {
            return Err(TlsError::internal_error("handshake still in progress"));
        }
        if self
            .config
            .renegotiation_flags
            .contains(RenegotiationFlags::DISALLOW_RENEGOTIATION)
            || !self.session.secure_renegotiation()
        {
            return Err(TlsError::handshake_failure("renegotiation not allowed"));
        }

        match self.role {
            TlsRole::Server => {
                let hello_request = HandshakeMessage::HelloRequest.encode()?;
                self.pending_output.push(OutgoingMessage {
                    content_type: ContentType::Handshake,
                    payload: hello_request,
                });
                Ok(())
            }
            TlsRole::Client => self.generate_client_hello_flight(),
        }
    }

    // ------------------------------------------------------------------
    // Internal plumbing shared by both roles.
    // ------------------------------------------------------------------

    fn dispatch(
        &mut self,
        handshake_type: HandshakeType,
        body: &[u8],
    ) -> Result<MessageStatus, TlsError> {
        match self.state {
            NegotiationState::InitialClientConnection => self.handle_hello_request(false),
            NegotiationState::RenegotiatingClientConnection => self.handle_hello_request(true),
            NegotiationState::ServerHello => {
                let message = self.decode(handshake_type, body)?;
                self.handle_server_flight(message)
            }
            NegotiationState::ServerFinished => {
                if handshake_type == HandshakeType::ChangeCipherSpec {
                    return self.handle_peer_change_cipher_spec();
                }
                let message = self.decode(handshake_type, body)?;
                self.handle_server_finished(message)
            }
            NegotiationState::InitialServerConnection => {
                let message = self.decode(handshake_type, body)?;
                self.handle_client_hello_state(message, false)
            }
            NegotiationState::RenegotiatingServerConnection => {
                let message = self.decode(handshake_type, body)?;
                self.handle_client_hello_state(message, true)
            }
            NegotiationState::ClientKeyExchange => {
                if handshake_type == HandshakeType::ChangeCipherSpec {
                    return self.handle_peer_change_cipher_spec();
                }
                let message = self.decode(handshake_type, body)?;
                self.handle_client_flight(message)
            }
        }
    }

    /// State allow-lists. A false here becomes an unexpected_message alert.
    fn verify_message(&self, handshake_type: HandshakeType) -> bool {
        use HandshakeType::*;
        let f = &self.flags;
        match self.state {
            NegotiationState::InitialClientConnection
            | NegotiationState::RenegotiatingClientConnection => {
                handshake_type == HelloRequest
            }
            NegotiationState::InitialServerConnection
            | NegotiationState::RenegotiatingServerConnection => {
                handshake_type == ClientHello && !f.hello
            }
            NegotiationState::ServerHello => match handshake_type {
                ServerHello => !f.hello,
                Certificate => f.hello && !f.certificate && !f.certificate_request && !f.done,
                ServerKeyExchange => {
                    self.using_server_key_exchange()
                        && f.hello
                        && f.certificate
                        && !f.certificate_request
                        && !f.done
                }
                CertificateRequest => {
                    (!self.using_server_key_exchange() || f.server_key_exchange)
                        && f.hello
                        && f.certificate
                        && !f.certificate_request
                        && !f.done
                }
                ServerHelloDone => {
                    (!self.using_server_key_exchange() || f.server_key_exchange)
                        && f.hello
                        && !f.done
                }
                _ => false,
            },
            NegotiationState::ServerFinished => match handshake_type {
                ChangeCipherSpec => !f.change_cipher_spec,
                Finished => f.change_cipher_spec && !f.finished,
                _ => false,
            },
            NegotiationState::ClientKeyExchange => match handshake_type {
                ClientKeyExchange => !f.client_key_exchange,
                Certificate => !f.client_key_exchange && !f.certificate,
                ChangeCipherSpec => f.client_key_exchange && !f.change_cipher_spec,
                Finished => f.change_cipher_spec && !f.finished,
                CertificateVerify => {
                    f.client_key_exchange
                        && f.certificate
                        && !f.certificate_verify
                        && !f.finished
                }
                _ => false,
            },
        }
    }

    fn using_server_key_exchange(&self) -> bool {
        use rtls_types::ExchangeAlgorithmType;
        self.session
            .pending_crypto
            .as_ref()
            .map(|crypto| crypto.suite.exchange != ExchangeAlgorithmType::Rsa)
            .unwrap_or(false)
    }

    pub(crate) fn decode(
        &mut self,
        handshake_type: HandshakeType,
        body: &[u8],
    ) -> Result<HandshakeMessage, TlsError> {
        let guard = ProtocolGuard {
            requested: self.config.requested_protocol,
            negotiated: self.negotiated_protocol,
            supported: &self.config.supported_protocols,
        };
        let message = HandshakeMessage::decode(handshake_type, body, &guard)?;
        match &message {
            HandshakeMessage::ClientHello(hello) => {
                self.negotiated_protocol = Some(hello.protocol);
            }
            HandshakeMessage::ServerHello(hello) => {
                self.negotiated_protocol = Some(hello.protocol);
            }
            _ => {}
        }
        Ok(message)
    }

    pub(crate) fn negotiated_protocol(&self) -> Result<ProtocolVersion, TlsError> {
        self.negotiated_protocol
            .ok_or_else(|| TlsError::internal_error("protocol not negotiated"))
    }

    pub(crate) fn handshake_mut(&mut self) -> Result<&mut HandshakeParameters, TlsError> {
        self.handshake
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))
    }

    pub(crate) fn handshake_ref(&self) -> Result<&HandshakeParameters, TlsError> {
        self.handshake
            .as_ref()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))
    }

    pub(crate) fn start_handshake(&mut self) -> Result<(), TlsError> {
        if self.handshake.is_some() {
            return Err(TlsError::internal_error("handshake already in progress"));
        }
        self.handshake = Some(HandshakeParameters::new());
        Ok(())
    }

    fn add_to_transcript(&mut self, message: &[u8]) {
        if let Some(handshake) = self.handshake.as_mut() {
            handshake.add_to_transcript(message);
        }
    }

    /// Encode a handshake message, record it in the transcript and queue it
    /// for sending. HelloRequest is never part of the transcript.
    pub(crate) fn emit_handshake(&mut self, message: &HandshakeMessage) -> Result<(), TlsError> {
        let payload = message.encode()?;
        if message.handshake_type() != HandshakeType::HelloRequest {
            self.add_to_transcript(&payload);
        }
        self.pending_output.push(OutgoingMessage {
            content_type: ContentType::Handshake,
            payload,
        });
        Ok(())
    }

    /// The peer's ChangeCipherSpec: from here on its records arrive under
    /// the newly negotiated cipher.
    fn handle_peer_change_cipher_spec(&mut self) -> Result<MessageStatus, TlsError> {
        if self.role == TlsRole::Server
            && self.config.require_client_certificate
            && !self.flags.certificate_verify
        {
            return Err(TlsError::unexpected_message(
                "missing CertificateVerify message",
            ));
        }
        self.flags.change_cipher_spec = true;
        self.session.pending_read = true;
        if self.role == TlsRole::Client {
            // The client's own flight is already queued under the new
            // cipher, so both directions switch here.
            self.session.switch_to_new_cipher();
        }
        Ok(MessageStatus::ContinueNeeded)
    }

    /// Finished verify data under the given crypto parameters, over the
    /// current transcript.
    pub(crate) fn finished_hash(
        &self,
        crypto: &CryptoParameters,
        label: &str,
    ) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let handshake = self.handshake_ref()?;
        compute_finished_hash(
            self.provider.as_ref(),
            crypto.protocol,
            crypto.suite,
            crypto.master_secret()?,
            label,
            handshake.transcript(),
        )
    }

    /// Queue our ChangeCipherSpec and mark the write direction pending.
    pub(crate) fn send_change_cipher_spec(&mut self) {
        self.pending_output.push(OutgoingMessage {
            content_type: ContentType::ChangeCipherSpec,
            payload: vec![1],
        });
        self.session.pending_write = true;
    }

    /// Derive the master secret once the key exchange is complete.
    pub(crate) fn initialize_cipher(&mut self) -> Result<(), TlsError> {
        let handshake = self
            .handshake
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))?;
        let premaster = handshake.key_exchange_mut()?.premaster_secret()?;

        let pending = self
            .session
            .pending_crypto
            .as_mut()
            .ok_or_else(|| TlsError::internal_error("no pending cipher"))?;
        pending.client_random = handshake.client_random.clone();
        pending.server_random = handshake.server_random.clone();

        let master = derive_master_secret(
            self.provider.as_ref(),
            pending.protocol,
            pending.suite,
            &premaster,
            &pending.client_random,
            &pending.server_random,
        )?;
        pending.set_master_secret(master);
        Ok(())
    }

    /// Tear down the per-handshake state and publish the negotiated
    /// parameters.
    pub(crate) fn finish_handshake(&mut self) -> Result<(), TlsError> {
        let handshake = self
            .handshake
            .take()
            .ok_or_else(|| TlsError::internal_error("no handshake in progress"))?;

        if self.session.pending_crypto.is_some() {
            return Err(TlsError::insufficient_security("cipher never activated"));
        }
        let current = self
            .session
            .current_crypto
            .as_ref()
            .ok_or_else(|| TlsError::insufficient_security("no cipher"))?;

        self.session.session_id = handshake.session_id.clone();
        self.connection_info = Some(ConnectionInfo {
            protocol: current.protocol,
            cipher_suite: current.suite_code(),
            session_id: handshake.session_id,
            secure_renegotiation: self.session.secure_renegotiation(),
        });
        Ok(())
    }

    /// Produce the outgoing flight owed by the current state and advance to
    /// the next one.
    fn generate_output(&mut self) -> Result<(), TlsError> {
        match self.state {
            NegotiationState::InitialClientConnection
            | NegotiationState::RenegotiatingClientConnection => {
                self.generate_client_hello_flight()
            }
            NegotiationState::InitialServerConnection
            | NegotiationState::RenegotiatingServerConnection => self.generate_server_flight(),
            NegotiationState::ServerHello => self.generate_client_second_flight(),
            NegotiationState::ClientKeyExchange => self.generate_server_finished_flight(),
            NegotiationState::ServerFinished => {
                self.transition(NegotiationState::RenegotiatingClientConnection);
                Ok(())
            }
        }
    }

    pub(crate) fn transition(&mut self, state: NegotiationState) {
        self.state = state;
        self.flags = StateFlags::default();
    }
}
