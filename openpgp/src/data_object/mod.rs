//! The data-object space.
//!
//! The OpenPGP card exposes a closed schema of data objects, addressed
//! by the raw P1-P2 value of GET DATA / PUT DATA and, where a DO
//! appears inside a composite, by its BER tag.  [`Do`] enumerates
//! every object this application knows; everything else is rejected.

use scard_tlv as tlv;
use scard_tlv::{Class, Tag};

use crate::types::KeyStatus;

mod caps;
pub use caps::{
    CardCapabilities,
    CardServiceData,
    ExtendedCapabilities,
    ExtendedLengthInfo,
    PasswordStatus,
    historical_data,
};

pub mod template;

/// A data object of the OpenPGP card application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Do {
    ApplicationIdentifier,
    ApplicationLabel,
    ExtendedHeaderList,
    LoginData,
    Url,
    HistoricalData,
    CardholderData,
    ApplicationRelatedData,
    SecuritySupportTemplate,
    CardholderCertificate,
    ExtendedLengthInformation,
    CardholderPrivateKeyTemplate,
    CardholderPrivateKey,
    PublicKeyComponents,
    Name,
    LanguagePreference,
    Sex,
    SignatureCounter,
    ExtendedCapabilities,
    AlgorithmAttributesSignature,
    AlgorithmAttributesDecryption,
    AlgorithmAttributesAuthentication,
    AlgorithmInformation,
    PasswordStatus,
    Fingerprints,
    CaFingerprints,
    SignatureKeyFingerprint,
    DecryptionKeyFingerprint,
    AuthenticationKeyFingerprint,
    CaFingerprint1,
    CaFingerprint2,
    CaFingerprint3,
    KeyTimestamps,
    SignatureKeyTimestamp,
    DecryptionKeyTimestamp,
    AuthenticationKeyTimestamp,
    ResettingCode,
    KeyInformation,
    Private1,
    Private2,
    Private3,
    Private4,
}

/// `(Do, Tag)` pairs for every addressable object.
///
/// The private-use DOs 0101..0104 carry two-byte identifiers that are
/// not valid BER tags (0x01 0x01 would parse as tag 1 plus a length);
/// they are represented with their identifier as a universal-class tag
/// number and addressed through [`Do::from_p1p2`] only.  They never
/// occur inside a composite, so the representation is never encoded.
const TABLE: &[(Do, Tag)] = &[
    (Do::ApplicationIdentifier, Tag::primitive(Class::Application, 0x0f)),
    (Do::ApplicationLabel, Tag::primitive(Class::Application, 0x10)),
    (Do::ExtendedHeaderList, Tag::primitive(Class::Application, 0x0d)),
    (Do::LoginData, Tag::primitive(Class::Application, 0x1e)),
    (Do::Url, Tag::primitive(Class::Application, 0x50)),
    (Do::HistoricalData, Tag::primitive(Class::Application, 0x52)),
    (Do::CardholderData, Tag::constructed(Class::Application, 0x05)),
    (Do::ApplicationRelatedData, Tag::constructed(Class::Application, 0x0e)),
    (Do::SecuritySupportTemplate, Tag::constructed(Class::Application, 0x1a)),
    (Do::CardholderCertificate, Tag::constructed(Class::Application, 0x21)),
    (Do::ExtendedLengthInformation,
     Tag::constructed(Class::Application, 0x66)),
    (Do::CardholderPrivateKeyTemplate,
     Tag::constructed(Class::Application, 0x48)),
    (Do::CardholderPrivateKey, Tag::primitive(Class::Application, 0x48)),
    (Do::PublicKeyComponents, Tag::constructed(Class::Application, 0x49)),
    (Do::Name, Tag::primitive(Class::Application, 0x1b)),
    (Do::LanguagePreference, Tag::primitive(Class::Application, 0x2d)),
    (Do::Sex, Tag::primitive(Class::Application, 0x35)),
    (Do::SignatureCounter, Tag::primitive(Class::Context, 0x13)),
    (Do::ExtendedCapabilities, Tag::primitive(Class::Private, 0x00)),
    (Do::AlgorithmAttributesSignature, Tag::primitive(Class::Private, 0x01)),
    (Do::AlgorithmAttributesDecryption, Tag::primitive(Class::Private, 0x02)),
    (Do::AlgorithmAttributesAuthentication,
     Tag::primitive(Class::Private, 0x03)),
    (Do::PasswordStatus, Tag::primitive(Class::Private, 0x04)),
    (Do::Fingerprints, Tag::primitive(Class::Private, 0x05)),
    (Do::CaFingerprints, Tag::primitive(Class::Private, 0x06)),
    (Do::SignatureKeyFingerprint, Tag::primitive(Class::Private, 0x07)),
    (Do::DecryptionKeyFingerprint, Tag::primitive(Class::Private, 0x08)),
    (Do::AuthenticationKeyFingerprint, Tag::primitive(Class::Private, 0x09)),
    (Do::CaFingerprint1, Tag::primitive(Class::Private, 0x0a)),
    (Do::CaFingerprint2, Tag::primitive(Class::Private, 0x0b)),
    (Do::CaFingerprint3, Tag::primitive(Class::Private, 0x0c)),
    (Do::KeyTimestamps, Tag::primitive(Class::Private, 0x0d)),
    (Do::SignatureKeyTimestamp, Tag::primitive(Class::Private, 0x0e)),
    (Do::DecryptionKeyTimestamp, Tag::primitive(Class::Private, 0x0f)),
    (Do::AuthenticationKeyTimestamp, Tag::primitive(Class::Private, 0x10)),
    (Do::ResettingCode, Tag::primitive(Class::Private, 0x13)),
    (Do::KeyInformation, Tag::primitive(Class::Private, 0x1e)),
    (Do::AlgorithmInformation, Tag::constructed(Class::Private, 0x1a)),
    (Do::Private1, Tag::primitive(Class::Universal, 0x101)),
    (Do::Private2, Tag::primitive(Class::Universal, 0x102)),
    (Do::Private3, Tag::primitive(Class::Universal, 0x103)),
    (Do::Private4, Tag::primitive(Class::Universal, 0x104)),
];

impl Do {
    /// Returns the tag of this data object.
    pub fn tag(&self) -> Tag {
        TABLE.iter().find(|(d, _)| d == self)
            .map(|(_, t)| *t)
            .expect("every Do is in the table")
    }

    /// Looks a data object up by tag.
    pub fn from_tag(tag: Tag) -> Option<Do> {
        TABLE.iter().find(|(_, t)| *t == tag).map(|(d, _)| *d)
    }

    /// Looks a data object up by the raw P1-P2 of GET/PUT DATA.
    pub fn from_p1p2(p1p2: u16) -> Option<Do> {
        match p1p2 {
            0x0101 => return Some(Do::Private1),
            0x0102 => return Some(Do::Private2),
            0x0103 => return Some(Do::Private3),
            0x0104 => return Some(Do::Private4),
            _ => (),
        }
        let bytes = p1p2.to_be_bytes();
        let bytes: &[u8] = if bytes[0] == 0 { &bytes[1..] } else { &bytes };
        match Tag::parse(bytes) {
            Ok((tag, rest)) if rest.is_empty() => Do::from_tag(tag),
            _ => None,
        }
    }
}

/// Encodes the signature counter: 24 bits, big-endian, saturating.
pub fn encode_signature_counter(counter: u32) -> [u8; 3] {
    let counter = counter.min(0xff_ffff);
    let b = counter.to_be_bytes();
    [b[1], b[2], b[3]]
}

/// Encodes the Key Information DO: one (slot, status) byte pair per
/// key slot.
pub fn encode_key_information(information: &[KeyStatus; 3]) -> Vec<u8> {
    information.iter().enumerate()
        .flat_map(|(slot, &status)| [slot as u8, status.into()])
        .collect()
}

/// Length of a key fingerprint in bytes.
pub const FINGERPRINT_LENGTH: usize = 20;
/// Length of a key generation timestamp in bytes.
pub const TIMESTAMP_LENGTH: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1p2_addressing() {
        assert_eq!(Do::from_p1p2(0x004f), Some(Do::ApplicationIdentifier));
        assert_eq!(Do::from_p1p2(0x005e), Some(Do::LoginData));
        assert_eq!(Do::from_p1p2(0x5f2d), Some(Do::LanguagePreference));
        assert_eq!(Do::from_p1p2(0x5f35), Some(Do::Sex));
        assert_eq!(Do::from_p1p2(0x006e), Some(Do::ApplicationRelatedData));
        assert_eq!(Do::from_p1p2(0x7f21), Some(Do::CardholderCertificate));
        assert_eq!(Do::from_p1p2(0x7f66),
                   Some(Do::ExtendedLengthInformation));
        assert_eq!(Do::from_p1p2(0x00c0), Some(Do::ExtendedCapabilities));
        assert_eq!(Do::from_p1p2(0x00c1),
                   Some(Do::AlgorithmAttributesSignature));
        assert_eq!(Do::from_p1p2(0x00de), Some(Do::KeyInformation));
        assert_eq!(Do::from_p1p2(0x00fa), Some(Do::AlgorithmInformation));
        assert_eq!(Do::from_p1p2(0x0093), Some(Do::SignatureCounter));
        assert_eq!(Do::from_p1p2(0x0101), Some(Do::Private1));
        assert_eq!(Do::from_p1p2(0x0104), Some(Do::Private4));
        assert_eq!(Do::from_p1p2(0x1234), None);
        assert_eq!(Do::from_p1p2(0x0000), None);
    }

    #[test]
    fn tag_roundtrip() {
        for (d, tag) in TABLE {
            assert_eq!(d.tag(), *tag);
            assert_eq!(Do::from_tag(*tag), Some(*d));
        }
    }

    #[test]
    fn signature_counter_saturates() {
        assert_eq!(encode_signature_counter(0), [0, 0, 0]);
        assert_eq!(encode_signature_counter(0x123456), [0x12, 0x34, 0x56]);
        assert_eq!(encode_signature_counter(0xff_ffff), [0xff, 0xff, 0xff]);
        assert_eq!(encode_signature_counter(0x100_0000), [0xff, 0xff, 0xff]);
        assert_eq!(encode_signature_counter(u32::MAX), [0xff, 0xff, 0xff]);
    }

    #[test]
    fn key_information() {
        assert_eq!(
            encode_key_information(&[KeyStatus::NotPresent,
                                     KeyStatus::Generated,
                                     KeyStatus::Imported]),
            b"\x00\x00\x01\x01\x02\x02");
    }
}
