//! X.501 distinguished name codec for CertificateRequest.
//!
//! Covers the attribute set commonly found in certificate authority names
//! (CN, C, L, ST, O, OU). Names travel as DER RDNSequence on the wire and
//! as `"CN=Test CA, O=Example"` strings in the API.

use rtls_types::TlsError;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_IA5_STRING: u8 = 0x16;

// id-at arc 2.5.4, final byte per attribute.
const OID_PREFIX: [u8; 2] = [0x55, 0x04];

fn attribute_oid(key: &str) -> Option<u8> {
    match key {
        "CN" => Some(3),
        "C" => Some(6),
        "L" => Some(7),
        "ST" => Some(8),
        "O" => Some(10),
        "OU" => Some(11),
        _ => None,
    }
}

fn attribute_name(oid: u8) -> Option<&'static str> {
    match oid {
        3 => Some("CN"),
        6 => Some("C"),
        7 => Some("L"),
        8 => Some("ST"),
        10 => Some("O"),
        11 => Some("OU"),
        _ => None,
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(content);
}

struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8, TlsError> {
        if self.remaining() == 0 {
            return Err(TlsError::decode_error("truncated DER structure"));
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_length(&mut self) -> Result<usize, TlsError> {
        let first = self.read_byte()?;
        if first < 0x80 {
            return Ok(first as usize);
        }
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 2 {
            return Err(TlsError::decode_error("unsupported DER length form"));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.read_byte()? as usize;
        }
        Ok(len)
    }

    fn read_tlv(&mut self, expected_tag: u8) -> Result<&'a [u8], TlsError> {
        let tag = self.read_byte()?;
        if tag != expected_tag {
            return Err(TlsError::decode_error(format!(
                "unexpected DER tag {tag:#04x}"
            )));
        }
        let len = self.read_length()?;
        if len > self.remaining() {
            return Err(TlsError::decode_error("DER length exceeds buffer"));
        }
        let content = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(content)
    }
}

/// Encode a `"CN=Foo, O=Bar"` style name into a DER RDNSequence.
pub fn encode_dn(name: &str) -> Result<Vec<u8>, TlsError> {
    let mut rdns = Vec::new();
    for part in name.split(',') {
        let part = part.trim();
        let (key, value) = part.split_once('=').ok_or_else(|| {
            TlsError::internal_error(format!("malformed distinguished name component: {part}"))
        })?;
        let oid = attribute_oid(key.trim()).ok_or_else(|| {
            TlsError::internal_error(format!("unsupported attribute type: {key}"))
        })?;

        let mut attribute = Vec::new();
        write_tlv(&mut attribute, TAG_OID, &[OID_PREFIX[0], OID_PREFIX[1], oid]);
        write_tlv(&mut attribute, TAG_UTF8_STRING, value.trim().as_bytes());

        let mut ava = Vec::new();
        write_tlv(&mut ava, TAG_SEQUENCE, &attribute);

        write_tlv(&mut rdns, TAG_SET, &ava);
    }

    let mut out = Vec::new();
    write_tlv(&mut out, TAG_SEQUENCE, &rdns);
    Ok(out)
}

/// Decode a DER RDNSequence into a `"CN=Foo, O=Bar"` style string.
pub fn decode_dn(der: &[u8]) -> Result<String, TlsError> {
    let mut outer = DerReader::new(der);
    let rdns = outer.read_tlv(TAG_SEQUENCE)?;
    if outer.remaining() != 0 {
        return Err(TlsError::decode_error("trailing bytes after RDNSequence"));
    }

    let mut parts = Vec::new();
    let mut reader = DerReader::new(rdns);
    while reader.remaining() > 0 {
        let set = reader.read_tlv(TAG_SET)?;
        let mut set_reader = DerReader::new(set);
        let ava = set_reader.read_tlv(TAG_SEQUENCE)?;

        let mut ava_reader = DerReader::new(ava);
        let oid = ava_reader.read_tlv(TAG_OID)?;
        if oid.len() != 3 || oid[..2] != OID_PREFIX {
            return Err(TlsError::decode_error("unsupported attribute OID"));
        }
        let key = attribute_name(oid[2])
            .ok_or_else(|| TlsError::decode_error("unsupported attribute OID"))?;

        let tag = ava_reader.read_byte()?;
        if !matches!(tag, TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_IA5_STRING) {
            return Err(TlsError::decode_error("unsupported attribute value type"));
        }
        let len = ava_reader.read_length()?;
        if len > ava_reader.remaining() {
            return Err(TlsError::decode_error("DER length exceeds buffer"));
        }
        let value = &ava[ava_reader.pos..ava_reader.pos + len];
        let value = std::str::from_utf8(value)
            .map_err(|_| TlsError::decode_error("attribute value is not valid UTF-8"))?;

        parts.push(format!("{key}={value}"));
    }

    Ok(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtls_types::AlertDescription;

    #[test]
    fn test_dn_roundtrip() {
        for name in [
            "CN=Test CA",
            "CN=Test CA, O=Example, C=US",
            "C=DE, ST=Bavaria, L=Munich, O=Example, OU=Engineering, CN=ca.example.test",
        ] {
            let der = encode_dn(name).unwrap();
            assert_eq!(decode_dn(&der).unwrap(), name);
        }
    }

    #[test]
    fn test_malformed_length_rejected() {
        let mut der = encode_dn("CN=Test CA").unwrap();
        der[1] = der[1].wrapping_add(5);
        let err = decode_dn(&der).unwrap_err();
        assert_eq!(err.description, AlertDescription::DecodeError);
    }

    #[test]
    fn test_truncated_dn_rejected() {
        let der = encode_dn("CN=Test CA").unwrap();
        let err = decode_dn(&der[..der.len() - 1]).unwrap_err();
        assert_eq!(err.description, AlertDescription::DecodeError);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        assert!(encode_dn("UID=someone").is_err());
    }
}
