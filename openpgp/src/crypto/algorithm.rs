//! Algorithm attributes: the per-slot description of what key lives
//! there and how it is imported.
//!
//! An attributes blob is one algorithm identifier byte followed by
//! algorithm-specific parameters: modulus and exponent lengths plus an
//! import format for RSA, the curve OID contents (optionally followed
//! by 0xFF, "public key included on import") for the elliptic curve
//! families.  Which algorithm identifiers are acceptable depends on
//! the key slot: the signature and authentication slots take RSA,
//! ECDSA and EdDSA; the decryption slot takes RSA and ECDH.

use once_cell::sync::Lazy;

use crate::Error;
use crate::Result;
use crate::types::{Curve, KeyRole, RsaImportFormat};

/// Algorithm identifier for RSA.
pub const ALGORITHM_ID_RSA: u8 = 0x01;
/// Algorithm identifier for ECDH.
pub const ALGORITHM_ID_ECDH: u8 = 0x12;
/// Algorithm identifier for ECDSA.
pub const ALGORITHM_ID_ECDSA: u8 = 0x13;
/// Algorithm identifier for EdDSA.
pub const ALGORITHM_ID_EDDSA: u8 = 0x16;

/// Marker appended to the curve OID when the import format includes
/// the public key.
const WITH_PUBLIC_KEY_MARKER: u8 = 0xff;

/// RSA modulus lengths offered in Algorithm Information.
const RSA_MODULUS_BITS: [u16; 3] = [2048, 3072, 4096];
/// The public exponent length offered in Algorithm Information.
const RSA_EXPONENT_BITS: u16 = 32;

/// Curves valid for the ECDH family.
pub const ECDH_CURVES: [Curve; 7] = [
    Curve::NistP256, Curve::NistP384, Curve::NistP521,
    Curve::BrainpoolP256, Curve::BrainpoolP384, Curve::BrainpoolP512,
    Curve::Cv25519,
];
/// Curves valid for the ECDSA family.
pub const ECDSA_CURVES: [Curve; 6] = [
    Curve::NistP256, Curve::NistP384, Curve::NistP521,
    Curve::BrainpoolP256, Curve::BrainpoolP384, Curve::BrainpoolP512,
];
/// Curves valid for the EdDSA family.
pub const EDDSA_CURVES: [Curve; 1] = [Curve::Ed25519];

fn wrong<T>(what: impl Into<String>) -> Result<T> {
    Err(Error::WrongParameterInCommandData(what.into()).into())
}

/// Parsed algorithm attributes of one key slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// RSA.
    Rsa {
        /// Modulus length in bits.
        modulus_bits: u16,
        /// Public exponent length in bits.
        exponent_bits: u16,
        /// Private key import format.
        import_format: RsaImportFormat,
    },
    /// ECDSA over a prime curve.
    Ecdsa {
        /// The curve.
        curve: Curve,
        /// Import includes the public key.
        with_public_key: bool,
    },
    /// ECDH over a prime curve or X25519.
    Ecdh {
        /// The curve.
        curve: Curve,
        /// Import includes the public key.
        with_public_key: bool,
    },
    /// EdDSA over Ed25519.
    Eddsa {
        /// The curve.
        curve: Curve,
        /// Import includes the public key.
        with_public_key: bool,
    },
}

impl Algorithm {
    /// The default attributes of a freshly initialised slot.
    pub fn default_for(role: KeyRole) -> Algorithm {
        match role {
            KeyRole::Sign | KeyRole::Authentication => Algorithm::Rsa {
                modulus_bits: 2048,
                exponent_bits: 32,
                import_format: RsaImportFormat::Standard,
            },
            KeyRole::Decrypt => Algorithm::Ecdh {
                curve: Curve::Cv25519,
                with_public_key: false,
            },
        }
    }

    /// Decodes an attributes blob for the given slot.
    pub fn decode(role: KeyRole, value: &[u8]) -> Result<Algorithm> {
        let (&id, parameters) = match value.split_first() {
            Some(x) => x,
            None => return wrong("empty algorithm attributes"),
        };
        match (role, id) {
            (_, ALGORITHM_ID_RSA) => Self::decode_rsa(parameters),
            (KeyRole::Sign | KeyRole::Authentication, ALGORITHM_ID_ECDSA) => {
                let (curve, with_public_key) =
                    decode_curve(parameters, &ECDSA_CURVES)?;
                Ok(Algorithm::Ecdsa { curve, with_public_key })
            },
            (KeyRole::Decrypt, ALGORITHM_ID_ECDH) => {
                let (curve, with_public_key) =
                    decode_curve(parameters, &ECDH_CURVES)?;
                Ok(Algorithm::Ecdh { curve, with_public_key })
            },
            (KeyRole::Sign | KeyRole::Authentication, ALGORITHM_ID_EDDSA) => {
                let (curve, with_public_key) =
                    decode_curve(parameters, &EDDSA_CURVES)?;
                if with_public_key {
                    // No support for an embedded public key.
                    return wrong("EdDSA with embedded public key");
                }
                Ok(Algorithm::Eddsa { curve, with_public_key })
            },
            _ => wrong(format!("algorithm {:02x} not valid for {:?}",
                               id, role)),
        }
    }

    fn decode_rsa(parameters: &[u8]) -> Result<Algorithm> {
        let parameters: &[u8; 5] = match parameters.try_into() {
            Ok(p) => p,
            Err(_) => return wrong("RSA attributes length"),
        };
        let import_format = match RsaImportFormat::from_byte(parameters[4]) {
            Some(f) => f,
            None => return wrong("RSA import format"),
        };
        Ok(Algorithm::Rsa {
            modulus_bits: u16::from_be_bytes([parameters[0], parameters[1]]),
            exponent_bits: u16::from_be_bytes([parameters[2], parameters[3]]),
            import_format,
        })
    }

    /// Encodes the attributes blob.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Algorithm::Rsa { modulus_bits, exponent_bits, import_format } => {
                let mut out = vec![ALGORITHM_ID_RSA];
                out.extend_from_slice(&modulus_bits.to_be_bytes());
                out.extend_from_slice(&exponent_bits.to_be_bytes());
                out.push((*import_format).into());
                out
            },
            Algorithm::Ecdsa { curve, with_public_key } =>
                encode_curve(ALGORITHM_ID_ECDSA, *curve, *with_public_key),
            Algorithm::Ecdh { curve, with_public_key } =>
                encode_curve(ALGORITHM_ID_ECDH, *curve, *with_public_key),
            Algorithm::Eddsa { curve, with_public_key } =>
                encode_curve(ALGORITHM_ID_EDDSA, *curve, *with_public_key),
        }
    }
}

fn decode_curve(parameters: &[u8], curves: &[Curve])
    -> Result<(Curve, bool)>
{
    let lookup = |oid: &[u8]| {
        Curve::from_oid(oid).filter(|c| curves.contains(c))
    };
    if let Some(curve) = lookup(parameters) {
        return Ok((curve, false));
    }
    if let Some((&WITH_PUBLIC_KEY_MARKER, oid)) = parameters.split_last() {
        if let Some(curve) = lookup(oid) {
            return Ok((curve, true));
        }
    }
    wrong("unknown curve OID")
}

fn encode_curve(id: u8, curve: Curve, with_public_key: bool) -> Vec<u8> {
    let mut out = vec![id];
    out.extend_from_slice(curve.oid());
    if with_public_key {
        out.push(WITH_PUBLIC_KEY_MARKER);
    }
    out
}

/// Enumerates every attributes blob a slot accepts, for the Algorithm
/// Information DO.
///
/// The enumeration is the Cartesian product over each algorithm
/// family's parameters, in family order per slot.
pub fn supported_attributes(role: KeyRole) -> &'static [Vec<u8>] {
    static SIGN: Lazy<Vec<Vec<u8>>> =
        Lazy::new(|| enumerate(&[ALGORITHM_ID_RSA, ALGORITHM_ID_ECDSA,
                                 ALGORITHM_ID_EDDSA]));
    static DECRYPT: Lazy<Vec<Vec<u8>>> =
        Lazy::new(|| enumerate(&[ALGORITHM_ID_RSA, ALGORITHM_ID_ECDH]));
    match role {
        KeyRole::Sign | KeyRole::Authentication => &SIGN,
        KeyRole::Decrypt => &DECRYPT,
    }
}

fn enumerate(ids: &[u8]) -> Vec<Vec<u8>> {
    let mut result = Vec::new();
    for &id in ids {
        match id {
            ALGORITHM_ID_RSA => {
                for modulus_bits in RSA_MODULUS_BITS {
                    for import_format in RsaImportFormat::ALL {
                        result.push(Algorithm::Rsa {
                            modulus_bits,
                            exponent_bits: RSA_EXPONENT_BITS,
                            import_format,
                        }.encode());
                    }
                }
            },
            ALGORITHM_ID_ECDSA => {
                for curve in ECDSA_CURVES {
                    for with_public_key in [false, true] {
                        result.push(Algorithm::Ecdsa {
                            curve, with_public_key,
                        }.encode());
                    }
                }
            },
            ALGORITHM_ID_ECDH => {
                for curve in ECDH_CURVES {
                    for with_public_key in [false, true] {
                        result.push(Algorithm::Ecdh {
                            curve, with_public_key,
                        }.encode());
                    }
                }
            },
            ALGORITHM_ID_EDDSA => {
                for curve in EDDSA_CURVES {
                    result.push(Algorithm::Eddsa {
                        curve, with_public_key: false,
                    }.encode());
                }
            },
            _ => unreachable!("unknown algorithm family"),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blobs_are_bit_exact() {
        assert_eq!(Algorithm::default_for(KeyRole::Sign).encode(),
                   b"\x01\x08\x00\x00\x20\x00");
        assert_eq!(Algorithm::default_for(KeyRole::Decrypt).encode(),
                   b"\x12\x2b\x06\x01\x04\x01\x97\x55\x01\x05\x01");
        assert_eq!(Algorithm::default_for(KeyRole::Authentication).encode(),
                   b"\x01\x08\x00\x00\x20\x00");
    }

    #[test]
    fn roundtrip_per_role() {
        for role in KeyRole::ALL {
            for blob in supported_attributes(role) {
                let decoded = Algorithm::decode(role, blob).unwrap();
                assert_eq!(&decoded.encode(), blob);
            }
        }
    }

    #[test]
    fn defaults_are_supported() {
        for role in KeyRole::ALL {
            let blob = Algorithm::default_for(role).encode();
            assert!(supported_attributes(role).contains(&blob));
        }
    }

    #[test]
    fn role_restrictions() {
        let ecdh = Algorithm::Ecdh {
            curve: Curve::NistP256, with_public_key: false,
        }.encode();
        assert!(Algorithm::decode(KeyRole::Decrypt, &ecdh).is_ok());
        assert!(Algorithm::decode(KeyRole::Sign, &ecdh).is_err());

        let ecdsa = Algorithm::Ecdsa {
            curve: Curve::NistP256, with_public_key: false,
        }.encode();
        assert!(Algorithm::decode(KeyRole::Sign, &ecdsa).is_ok());
        assert!(Algorithm::decode(KeyRole::Decrypt, &ecdsa).is_err());

        // X25519 is an ECDH curve, not an ECDSA one.
        let x25519_dsa = encode_curve(ALGORITHM_ID_ECDSA,
                                      Curve::Cv25519, false);
        assert!(Algorithm::decode(KeyRole::Sign, &x25519_dsa).is_err());

        // Ed25519 never embeds a public key.
        let mut eddsa = Algorithm::Eddsa {
            curve: Curve::Ed25519, with_public_key: false,
        }.encode();
        eddsa.push(WITH_PUBLIC_KEY_MARKER);
        assert!(Algorithm::decode(KeyRole::Sign, &eddsa).is_err());
    }

    #[test]
    fn with_public_key_marker() {
        let blob = Algorithm::Ecdh {
            curve: Curve::NistP384, with_public_key: true,
        }.encode();
        assert_eq!(blob.last(), Some(&0xff));
        assert_eq!(Algorithm::decode(KeyRole::Decrypt, &blob).unwrap(),
                   Algorithm::Ecdh {
                       curve: Curve::NistP384, with_public_key: true,
                   });
    }

    #[test]
    fn rejects_garbage() {
        assert!(Algorithm::decode(KeyRole::Sign, b"").is_err());
        assert!(Algorithm::decode(KeyRole::Sign, b"\x01\x08\x00").is_err());
        assert!(Algorithm::decode(KeyRole::Sign,
                                  b"\x01\x08\x00\x00\x20\x04").is_err());
        assert!(Algorithm::decode(KeyRole::Sign, b"\x42\x01").is_err());
    }
}
