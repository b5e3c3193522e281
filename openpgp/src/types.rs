//! Primitive types shared across the application.

use std::fmt;

use crate::Error;
use crate::Result;

/// The three key slots of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyRole {
    /// Digital-signature key (slot 0).
    Sign,
    /// Confidentiality key (slot 1).
    Decrypt,
    /// Authentication key (slot 2).
    Authentication,
}

impl KeyRole {
    /// All roles, in slot order.
    pub const ALL: [KeyRole; 3] =
        [KeyRole::Sign, KeyRole::Decrypt, KeyRole::Authentication];

    /// Returns the fixed slot index of this role.
    pub fn index(&self) -> usize {
        match self {
            KeyRole::Sign => 0,
            KeyRole::Decrypt => 1,
            KeyRole::Authentication => 2,
        }
    }
}

/// How a key slot was populated, as reported by Key Information.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStatus {
    /// No key in this slot.
    NotPresent,
    /// The key was generated on the card.
    Generated,
    /// The key was imported to the card.
    Imported,
}

impl From<KeyStatus> for u8 {
    fn from(s: KeyStatus) -> u8 {
        match s {
            KeyStatus::NotPresent => 0,
            KeyStatus::Generated => 1,
            KeyStatus::Imported => 2,
        }
    }
}

/// The password level named by VERIFY and friends in P2.
///
/// `Pw1Sign` and `Pw1Decrypt` verify the same reference data (PW1) but
/// grant distinct authentication bits on the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordLevel {
    /// PW1 in signature mode (P2 = 0x81).
    Pw1Sign,
    /// PW1 in decryption mode (P2 = 0x82).
    Pw1Decrypt,
    /// PW3, the admin password (P2 = 0x83).
    Pw3,
}

impl PasswordLevel {
    /// Decodes the low bits of P2.
    pub fn from_p2(p2: u8) -> Result<PasswordLevel> {
        match p2 & 0x0f {
            1 => Ok(PasswordLevel::Pw1Sign),
            2 => Ok(PasswordLevel::Pw1Decrypt),
            3 => Ok(PasswordLevel::Pw3),
            _ => Err(Error::WrongParametersP1P2(
                format!("unknown password level {:02x}", p2)).into()),
        }
    }

    /// Returns the index of the reference data this level verifies.
    pub fn reference_index(&self) -> usize {
        match self {
            PasswordLevel::Pw1Sign | PasswordLevel::Pw1Decrypt => PW1_INDEX,
            PasswordLevel::Pw3 => PW3_INDEX,
        }
    }

    pub(crate) fn bit(&self) -> usize {
        match self {
            PasswordLevel::Pw1Sign => 0,
            PasswordLevel::Pw1Decrypt => 1,
            PasswordLevel::Pw3 => 2,
        }
    }
}

/// Index of PW1 in the reference data list.
pub const PW1_INDEX: usize = 0;
/// Index of PW3 in the reference data list.
pub const PW3_INDEX: usize = 1;
/// Index of the resetting code in the reference data list.
pub const RESET_CODE_INDEX: usize = 2;

/// Application life cycle status, with the ISO 7816-9 LCS byte values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Creation state.
    Creation,
    /// Initialisation state.
    Initialisation,
    /// Operational state, activated.
    Activated,
    /// Termination state.
    Terminated,
}

impl From<Lifecycle> for u8 {
    fn from(l: Lifecycle) -> u8 {
        match l {
            Lifecycle::Creation => 0x01,
            Lifecycle::Initialisation => 0x03,
            Lifecycle::Activated => 0x05,
            Lifecycle::Terminated => 0x0c,
        }
    }
}

/// The cardholder's sex, ISO 5218 coded as ASCII digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sex {
    /// Not known.
    Unknown,
    /// Male.
    Male,
    /// Female.
    Female,
    /// Not announced.
    NotAnnounced,
}

impl Sex {
    /// Decodes the single content byte.
    pub fn from_byte(b: u8) -> Option<Sex> {
        match b {
            0x30 => Some(Sex::Unknown),
            0x31 => Some(Sex::Male),
            0x32 => Some(Sex::Female),
            0x39 => Some(Sex::NotAnnounced),
            _ => None,
        }
    }
}

impl From<Sex> for u8 {
    fn from(s: Sex) -> u8 {
        match s {
            Sex::Unknown => 0x30,
            Sex::Male => 0x31,
            Sex::Female => 0x32,
            Sex::NotAnnounced => 0x39,
        }
    }
}

/// Elliptic curves appearing in algorithm attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    /// NIST curve P-256.
    NistP256,
    /// NIST curve P-384.
    NistP384,
    /// NIST curve P-521.
    NistP521,
    /// brainpoolP256r1.
    BrainpoolP256,
    /// brainpoolP384r1.
    BrainpoolP384,
    /// brainpoolP512r1.
    BrainpoolP512,
    /// D.J. Bernstein's Curve25519 for Diffie-Hellman.
    Cv25519,
    /// Ed25519, the Edwards form for signatures.
    Ed25519,
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Curve::NistP256 => "NIST P-256",
            Curve::NistP384 => "NIST P-384",
            Curve::NistP521 => "NIST P-521",
            Curve::BrainpoolP256 => "brainpoolP256r1",
            Curve::BrainpoolP384 => "brainpoolP384r1",
            Curve::BrainpoolP512 => "brainpoolP512r1",
            Curve::Cv25519 => "Curve25519",
            Curve::Ed25519 => "Ed25519",
        };
        f.write_str(name)
    }
}

impl Curve {
    /// Returns the DER-encoded OID contents identifying this curve.
    ///
    /// Algorithm attributes embed the OID contents directly, without
    /// the universal OBJECT IDENTIFIER tag and length.
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 1.2.840.10045.3.1.7
            Curve::NistP256 =>
                &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07],
            // 1.3.132.0.34
            Curve::NistP384 => &[0x2b, 0x81, 0x04, 0x00, 0x22],
            // 1.3.132.0.35
            Curve::NistP521 => &[0x2b, 0x81, 0x04, 0x00, 0x23],
            // 1.3.36.3.3.2.8.1.1.7
            Curve::BrainpoolP256 =>
                &[0x2b, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07],
            // 1.3.36.3.3.2.8.1.1.11
            Curve::BrainpoolP384 =>
                &[0x2b, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0b],
            // 1.3.36.3.3.2.8.1.1.13
            Curve::BrainpoolP512 =>
                &[0x2b, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0d],
            // 1.3.6.1.4.1.3029.1.5.1
            Curve::Cv25519 =>
                &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05,
                  0x01],
            // 1.3.6.1.4.1.11591.15.1
            Curve::Ed25519 =>
                &[0x2b, 0x06, 0x01, 0x04, 0x01, 0xda, 0x47, 0x0f, 0x01],
        }
    }

    /// Looks a curve up by its OID contents.
    pub fn from_oid(oid: &[u8]) -> Option<Curve> {
        [Curve::NistP256, Curve::NistP384, Curve::NistP521,
         Curve::BrainpoolP256, Curve::BrainpoolP384, Curve::BrainpoolP512,
         Curve::Cv25519, Curve::Ed25519]
            .into_iter().find(|c| c.oid() == oid)
    }

    /// Returns the field size in bytes.
    pub fn field_size(&self) -> usize {
        match self {
            Curve::NistP256 | Curve::BrainpoolP256 => 32,
            Curve::NistP384 | Curve::BrainpoolP384 => 48,
            Curve::NistP521 => 66,
            Curve::BrainpoolP512 => 64,
            Curve::Cv25519 | Curve::Ed25519 => 32,
        }
    }
}

/// Hash algorithms accepted inside an RSA DigestInfo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    SHA224,
    SHA256,
    SHA384,
    SHA512,
}

impl HashAlgorithm {
    /// All supported hash algorithms.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::MD5, HashAlgorithm::SHA1, HashAlgorithm::SHA224,
        HashAlgorithm::SHA256, HashAlgorithm::SHA384, HashAlgorithm::SHA512,
    ];

    /// Returns the DER-encoded OID contents of this algorithm.
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 1.2.840.113549.2.5
            HashAlgorithm::MD5 =>
                &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05],
            // 1.3.14.3.2.26
            HashAlgorithm::SHA1 => &[0x2b, 0x0e, 0x03, 0x02, 0x1a],
            // 2.16.840.1.101.3.4.2.4
            HashAlgorithm::SHA224 =>
                &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04],
            // 2.16.840.1.101.3.4.2.1
            HashAlgorithm::SHA256 =>
                &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            // 2.16.840.1.101.3.4.2.2
            HashAlgorithm::SHA384 =>
                &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            // 2.16.840.1.101.3.4.2.3
            HashAlgorithm::SHA512 =>
                &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    /// Returns the digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::MD5 => 16,
            HashAlgorithm::SHA1 => 20,
            HashAlgorithm::SHA224 => 28,
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
            HashAlgorithm::SHA512 => 64,
        }
    }

    /// Looks a hash algorithm up by its OID contents.
    pub fn from_oid(oid: &[u8]) -> Option<HashAlgorithm> {
        HashAlgorithm::ALL.into_iter().find(|h| h.oid() == oid)
    }

    /// Infers the hash algorithm from a digest length.
    ///
    /// All supported algorithms have distinct digest sizes, so this is
    /// unambiguous.
    pub fn from_digest_size(size: usize) -> Option<HashAlgorithm> {
        HashAlgorithm::ALL.into_iter().find(|h| h.digest_size() == size)
    }
}

/// RSA private key import formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RsaImportFormat {
    /// e, p, q.
    Standard,
    /// e, p, q, n.
    StandardWithModulus,
    /// e, p, q, 1/q mod p, d mod (p-1), d mod (q-1).
    Crt,
    /// The CRT form followed by the modulus.
    CrtWithModulus,
}

impl RsaImportFormat {
    /// All import formats, in identifier order.
    pub const ALL: [RsaImportFormat; 4] = [
        RsaImportFormat::Standard,
        RsaImportFormat::StandardWithModulus,
        RsaImportFormat::Crt,
        RsaImportFormat::CrtWithModulus,
    ];

    /// Decodes the import format byte.
    pub fn from_byte(b: u8) -> Option<RsaImportFormat> {
        RsaImportFormat::ALL.get(usize::from(b)).copied()
    }
}

impl From<RsaImportFormat> for u8 {
    fn from(f: RsaImportFormat) -> u8 {
        match f {
            RsaImportFormat::Standard => 0,
            RsaImportFormat::StandardWithModulus => 1,
            RsaImportFormat::Crt => 2,
            RsaImportFormat::CrtWithModulus => 3,
        }
    }
}

/// Secure messaging algorithm advertised by Extended Capabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SecureMessagingAlgorithm {
    /// No secure messaging.
    #[default]
    None,
    /// AES-128.
    Aes128,
    /// AES-256.
    Aes256,
    /// SCP11b.
    Scp11b,
}

impl SecureMessagingAlgorithm {
    /// Decodes the algorithm byte.
    pub fn from_byte(b: u8) -> Option<SecureMessagingAlgorithm> {
        match b {
            0 => Some(SecureMessagingAlgorithm::None),
            1 => Some(SecureMessagingAlgorithm::Aes128),
            2 => Some(SecureMessagingAlgorithm::Aes256),
            3 => Some(SecureMessagingAlgorithm::Scp11b),
            _ => None,
        }
    }
}

impl From<SecureMessagingAlgorithm> for u8 {
    fn from(a: SecureMessagingAlgorithm) -> u8 {
        match a {
            SecureMessagingAlgorithm::None => 0,
            SecureMessagingAlgorithm::Aes128 => 1,
            SecureMessagingAlgorithm::Aes256 => 2,
            SecureMessagingAlgorithm::Scp11b => 3,
        }
    }
}
