#![no_main]
use libfuzzer_sys::fuzz_target;

use rtls_handshake::handshake::{parse_handshake_message, HandshakeMessage, ProtocolGuard};
use rtls_types::ProtocolVersion;

fuzz_target!(|data: &[u8]| {
    let Ok((handshake_type, body)) = parse_handshake_message(data) else {
        return;
    };
    let guard = ProtocolGuard {
        requested: ProtocolVersion::Tls12,
        negotiated: None,
        supported: &[ProtocolVersion::Tls10, ProtocolVersion::Tls11, ProtocolVersion::Tls12],
    };
    let _ = HandshakeMessage::decode(handshake_type, body, &guard);
});
