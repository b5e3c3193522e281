//! Composite templates: DigestInfo, key import, public key output,
//! and the ECDH cipher envelope.

use std::collections::BTreeMap;

use scard_tlv as tlv;
use scard_tlv::{Class, Tag};

use crate::Error;
use crate::Result;
use crate::types::KeyRole;

/// Universal SEQUENCE.
pub const SEQUENCE: Tag = Tag::constructed(Class::Universal, 0x10);
/// Universal OBJECT IDENTIFIER.
pub const OBJECT_IDENTIFIER: Tag = Tag::primitive(Class::Universal, 0x06);
/// Universal NULL.
pub const NULL: Tag = Tag::primitive(Class::Universal, 0x05);
/// Universal OCTET STRING.
pub const OCTET_STRING: Tag = Tag::primitive(Class::Universal, 0x04);
/// Universal INTEGER.
pub const INTEGER: Tag = Tag::primitive(Class::Universal, 0x02);

/// RSA modulus inside Public Key Components (81).
pub const RSA_MODULUS: Tag = Tag::primitive(Class::Context, 0x01);
/// RSA public exponent inside Public Key Components (82).
pub const RSA_PUBLIC_EXPONENT: Tag = Tag::primitive(Class::Context, 0x02);
/// Elliptic curve public point inside Public Key Components (86).
pub const EC_PUBLIC: Tag = Tag::primitive(Class::Context, 0x06);
/// File identifier inside MANAGE SECURITY ENVIRONMENT data (83).
pub const FILE_IDENTIFIER: Tag = Tag::primitive(Class::Context, 0x03);

/// Public Key Components template (7F49).
pub const PUBLIC_KEY_COMPONENTS: Tag =
    Tag::constructed(Class::Application, 0x49);
/// ECDH cipher envelope (A6).
pub const CIPHER: Tag = Tag::constructed(Class::Context, 0x06);
/// Cardholder private key template (7F48).
pub const PRIVATE_KEY_TEMPLATE: Tag =
    Tag::constructed(Class::Application, 0x48);
/// Cardholder private key payload (5F48).
pub const PRIVATE_KEY_PAYLOAD: Tag =
    Tag::primitive(Class::Application, 0x48);

/// Control reference template for the authentication key (A4).
pub const CRT_AUTHENTICATION: Tag = Tag::constructed(Class::Context, 0x04);
/// Control reference template for the signature key (B6).
pub const CRT_SIGNATURE: Tag = Tag::constructed(Class::Context, 0x16);
/// Control reference template for the decryption key (B8).
pub const CRT_DECRYPTION: Tag = Tag::constructed(Class::Context, 0x18);

fn wrong<T>(what: impl Into<String>) -> Result<T> {
    Err(Error::WrongParameterInCommandData(what.into()).into())
}

fn role_from_crt(tag: Tag) -> Option<KeyRole> {
    match tag {
        t if t == CRT_SIGNATURE => Some(KeyRole::Sign),
        t if t == CRT_DECRYPTION => Some(KeyRole::Decrypt),
        t if t == CRT_AUTHENTICATION => Some(KeyRole::Authentication),
        _ => None,
    }
}

/// A PKCS#1 DigestInfo: the hash OID and the hash value.
///
/// ```text
/// SEQUENCE { SEQUENCE { OBJECT IDENTIFIER, NULL }, OCTET STRING }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestInfo {
    /// DER contents of the hash algorithm OID.
    pub oid: Vec<u8>,
    /// The hash value.
    pub digest: Vec<u8>,
}

impl DigestInfo {
    /// Decodes a DigestInfo, requiring exact consumption at every
    /// level.
    pub fn decode(data: &[u8]) -> Result<DigestInfo> {
        let (tag, value, rest) = tlv::take(data)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != SEQUENCE || !rest.is_empty() {
            return wrong("expected DigestInfo SEQUENCE");
        }
        let (tag, algorithm, rest) = tlv::take(value)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != SEQUENCE {
            return wrong("expected AlgorithmIdentifier SEQUENCE");
        }
        let (tag, digest, trailer) = tlv::take(rest)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != OCTET_STRING || !trailer.is_empty() {
            return wrong("expected digest OCTET STRING");
        }
        let (tag, oid, rest) = tlv::take(algorithm)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != OBJECT_IDENTIFIER {
            return wrong("expected hash OBJECT IDENTIFIER");
        }
        let (tag, parameters, rest) = tlv::take(rest)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != NULL || !parameters.is_empty() || !rest.is_empty() {
            return wrong("expected NULL hash parameters");
        }
        Ok(DigestInfo {
            oid: oid.to_vec(),
            digest: digest.to_vec(),
        })
    }

    /// Encodes a DigestInfo.
    pub fn encode(&self) -> Vec<u8> {
        let mut algorithm = Vec::new();
        tlv::put(&mut algorithm, OBJECT_IDENTIFIER, &self.oid);
        tlv::put(&mut algorithm, NULL, b"");
        let mut inner = Vec::new();
        tlv::put(&mut inner, SEQUENCE, &algorithm);
        tlv::put(&mut inner, OCTET_STRING, &self.digest);
        tlv::encode(SEQUENCE, &inner)
    }
}

/// Components of an imported private key, keyed by their template tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyComponent {
    /// RSA public exponent (91).
    PublicExponent,
    /// RSA prime p, or the EC private scalar (92).
    Prime1,
    /// RSA prime q (93).
    Prime2,
    /// 1/q mod p (94).
    Pq,
    /// d mod (p-1) (95).
    Dp1,
    /// d mod (q-1) (96).
    Dq1,
    /// RSA modulus (97).
    Modulus,
    /// EC public point (99).
    CurvePublicKey,
}

/// The EC private scalar travels under the same tag as RSA's first
/// prime.
pub const CURVE_PRIVATE_KEY: KeyComponent = KeyComponent::Prime1;

impl KeyComponent {
    fn from_tag(tag: Tag) -> Option<KeyComponent> {
        if tag.class() != Class::Context || tag.is_constructed() {
            return None;
        }
        match tag.number() {
            0x11 => Some(KeyComponent::PublicExponent),
            0x12 => Some(KeyComponent::Prime1),
            0x13 => Some(KeyComponent::Prime2),
            0x14 => Some(KeyComponent::Pq),
            0x15 => Some(KeyComponent::Dp1),
            0x16 => Some(KeyComponent::Dq1),
            0x17 => Some(KeyComponent::Modulus),
            0x19 => Some(KeyComponent::CurvePublicKey),
            _ => None,
        }
    }
}

/// Key material delivered through the extended header list.
pub type ComponentMap = BTreeMap<KeyComponent, Vec<u8>>;

/// Decodes a Control Reference Template selecting a key role.
///
/// GENERATE ASYMMETRIC KEY PAIR sends exactly one empty CRT.
pub fn decode_control_reference(data: &[u8]) -> Result<KeyRole> {
    let (tag, value, rest) = tlv::take(data)
        .or_else(|e| wrong(e.to_string()))?;
    if !rest.is_empty() || !value.is_empty() {
        return wrong("malformed control reference template");
    }
    match role_from_crt(tag) {
        Some(role) => Ok(role),
        None => wrong("unknown control reference template"),
    }
}

/// Decodes an Extended Header List carrying a private key.
///
/// The list is a CRT selecting the slot, a 7F48 template whose inner
/// tag-length headers carry only the lengths of the key components,
/// and a 5F48 payload that is split positionally by those lengths.
/// The split must consume the payload exactly, and a component must
/// not occur twice.
///
/// A list consisting of a lone CRT removes the key; `None` is
/// returned for the components in that case.
pub fn decode_extended_header(data: &[u8])
    -> Result<(KeyRole, Option<ComponentMap>)>
{
    let (tag, value, rest) = tlv::take(data)
        .or_else(|e| wrong(e.to_string()))?;
    let role = match role_from_crt(tag) {
        Some(role) => role,
        None => return wrong("expected a control reference template"),
    };
    if !value.is_empty() {
        return wrong("control reference template with contents");
    }
    if rest.is_empty() {
        // Key removal.
        return Ok((role, None));
    }

    let (tag, template, rest) = tlv::take(rest)
        .or_else(|e| wrong(e.to_string()))?;
    if tag != PRIVATE_KEY_TEMPLATE {
        return wrong("expected the private key template");
    }
    let (tag, payload, rest) = tlv::take(rest)
        .or_else(|e| wrong(e.to_string()))?;
    if tag != PRIVATE_KEY_PAYLOAD || !rest.is_empty() {
        return wrong("expected the private key payload");
    }

    // The template carries headers only: tag and length, no value.
    let mut headers = Vec::new();
    let mut cursor = template;
    while !cursor.is_empty() {
        let (tag, after_tag) = Tag::parse(cursor)
            .or_else(|e| wrong(e.to_string()))?;
        let (length, after_length) = tlv::parse_length(after_tag)
            .or_else(|e| wrong(e.to_string()))?;
        cursor = after_length;
        match KeyComponent::from_tag(tag) {
            Some(component) => headers.push((component, length)),
            None => return wrong(format!("unexpected key component {}",
                                         tag)),
        }
    }

    let mut components = ComponentMap::new();
    let mut payload = payload;
    for (component, length) in headers {
        if payload.len() < length {
            return wrong("key payload shorter than the template");
        }
        let (bytes, rest) = payload.split_at(length);
        payload = rest;
        if components.insert(component, bytes.to_vec()).is_some() {
            return wrong(format!("multiple occurrences of {:?}",
                                 component));
        }
    }
    if !payload.is_empty() {
        return wrong("key payload longer than the template");
    }
    Ok((role, Some(components)))
}

/// Encodes a Public Key Components template for an RSA key.
pub fn rsa_public_key(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(modulus.len() + exponent.len() + 10);
    tlv::put(&mut inner, RSA_MODULUS, modulus);
    tlv::put(&mut inner, RSA_PUBLIC_EXPONENT, exponent);
    tlv::encode(PUBLIC_KEY_COMPONENTS, &inner)
}

/// Encodes a Public Key Components template for an elliptic curve
/// key.
pub fn ec_public_key(point: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(point.len() + 4);
    tlv::put(&mut inner, EC_PUBLIC, point);
    tlv::encode(PUBLIC_KEY_COMPONENTS, &inner)
}

/// Decodes the ECDH cipher envelope and returns the peer public key
/// bytes.
///
/// ```text
/// A6 { 7F49 { 86 peer-public } }
/// ```
pub fn decode_cipher(data: &[u8]) -> Result<Vec<u8>> {
    let (tag, value, rest) = tlv::take(data)
        .or_else(|e| wrong(e.to_string()))?;
    if tag != CIPHER || !rest.is_empty() {
        return wrong("expected cipher template");
    }
    let (tag, value, rest) = tlv::take(value)
        .or_else(|e| wrong(e.to_string()))?;
    if tag != PUBLIC_KEY_COMPONENTS || !rest.is_empty() {
        return wrong("expected public key components");
    }
    let (tag, peer, rest) = tlv::take(value)
        .or_else(|e| wrong(e.to_string()))?;
    if tag != EC_PUBLIC || !rest.is_empty() {
        return wrong("no EC public key provided");
    }
    Ok(peer.to_vec())
}

/// Encodes the cipher envelope.  Hosts do this; we use it in tests.
pub fn encode_cipher(peer: &[u8]) -> Vec<u8> {
    let mut components = Vec::new();
    tlv::put(&mut components, EC_PUBLIC, peer);
    let mut inner = Vec::new();
    tlv::put(&mut inner, PUBLIC_KEY_COMPONENTS, &components);
    tlv::encode(CIPHER, &inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    use crate::types::HashAlgorithm;

    quickcheck! {
        fn digest_info_decode_encode(oid: Vec<u8>,
                                     digest: Vec<u8>) -> bool {
            let di = DigestInfo { oid, digest };
            DigestInfo::decode(&di.encode()).unwrap() == di
        }
    }

    #[test]
    fn digest_info_roundtrip() {
        let di = DigestInfo {
            oid: HashAlgorithm::SHA256.oid().to_vec(),
            digest: vec![0xab; 32],
        };
        let encoded = di.encode();
        assert_eq!(DigestInfo::decode(&encoded).unwrap(), di);

        // A SHA-256 DigestInfo has the well-known 19 byte prefix.
        assert_eq!(&encoded[..2], b"\x30\x31");
        assert_eq!(&encoded[2..15],
                   b"\x30\x0d\x06\x09\x60\x86\x48\x01\x65\x03\x04\x02\x01");
        assert_eq!(&encoded[15..19], b"\x05\x00\x04\x20");
    }

    #[test]
    fn digest_info_rejects_trailers() {
        let di = DigestInfo {
            oid: HashAlgorithm::SHA1.oid().to_vec(),
            digest: vec![0; 20],
        };
        let mut encoded = di.encode();
        encoded.push(0x00);
        assert!(DigestInfo::decode(&encoded).is_err());
    }

    #[test]
    fn control_reference() {
        assert_eq!(decode_control_reference(b"\xb6\x00").unwrap(),
                   KeyRole::Sign);
        assert_eq!(decode_control_reference(b"\xb8\x00").unwrap(),
                   KeyRole::Decrypt);
        assert_eq!(decode_control_reference(b"\xa4\x00").unwrap(),
                   KeyRole::Authentication);
        assert!(decode_control_reference(b"\xa5\x00").is_err());
        assert!(decode_control_reference(b"\xb6\x00\xb8\x00").is_err());
        assert!(decode_control_reference(b"\xb6\x02\x83\x00").is_err());
    }

    fn import_data(template: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut data = b"\xb6\x00".to_vec();
        tlv::put(&mut data, PRIVATE_KEY_TEMPLATE, template);
        tlv::put(&mut data, PRIVATE_KEY_PAYLOAD, payload);
        data
    }

    #[test]
    fn extended_header_split() {
        // e of 1 byte, p of 2, q of 3.
        let (role, components) = decode_extended_header(
            &import_data(b"\x91\x01\x92\x02\x93\x03", b"\x03ppqqq"))
            .unwrap();
        assert_eq!(role, KeyRole::Sign);
        let components = components.unwrap();
        assert_eq!(components[&KeyComponent::PublicExponent], b"\x03");
        assert_eq!(components[&KeyComponent::Prime1], b"pp");
        assert_eq!(components[&KeyComponent::Prime2], b"qqq");
    }

    #[test]
    fn extended_header_key_removal() {
        let (role, components) =
            decode_extended_header(b"\xb8\x00").unwrap();
        assert_eq!(role, KeyRole::Decrypt);
        assert!(components.is_none());
    }

    #[test]
    fn extended_header_rejects_duplicates() {
        assert!(decode_extended_header(
            &import_data(b"\x91\x01\x91\x01", b"\x03\x03")).is_err());
    }

    #[test]
    fn extended_header_requires_exact_payload() {
        // Payload longer than the template says.
        assert!(decode_extended_header(
            &import_data(b"\x91\x01", b"\x03\x04")).is_err());
        // Payload shorter than the template says.
        assert!(decode_extended_header(
            &import_data(b"\x91\x04", b"\x03")).is_err());
    }

    #[test]
    fn cipher_envelope() {
        let peer = [0x42u8; 32];
        let encoded = encode_cipher(&peer);
        assert_eq!(decode_cipher(&encoded).unwrap(), peer);
        // Must carry an EC public point, not RSA components.
        let mut components = Vec::new();
        tlv::put(&mut components, RSA_MODULUS, &[1, 2, 3]);
        let mut inner = Vec::new();
        tlv::put(&mut inner, PUBLIC_KEY_COMPONENTS, &components);
        assert!(decode_cipher(&tlv::encode(CIPHER, &inner)).is_err());
    }
}
