#![no_main]
use libfuzzer_sys::fuzz_target;

use rtls_handshake::codec::TlsReader;
use rtls_handshake::extensions::ExtensionCollection;

fuzz_target!(|data: &[u8]| {
    let mut reader = TlsReader::new(data);
    let _ = ExtensionCollection::decode(&mut reader);
});
