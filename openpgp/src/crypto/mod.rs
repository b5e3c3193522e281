//! Cryptographic operations on the key slots.
//!
//! [`PrivateKey`] abstracts over the algorithm families a slot can
//! hold and dispatches signing, decryption, public key emission, and
//! PKCS#8 (de)serialization.  Key generation and import go through the
//! slot's [`Algorithm`] attributes.
//!
//! Brainpool curves are accepted by the attributes codec but the
//! backend has no arithmetic for them; any attempt to generate or
//! import such a key reports [`Error::UnsupportedEllipticCurve`].

use std::fmt;

use ecdsa::signature::hazmat::PrehashSigner;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pkcs8::ObjectIdentifier;
use pkcs8::PrivateKeyInfo;
use pkcs8::der::Encode;
use rand::rngs::OsRng;
use rsa::BigUint;
use rsa::Pkcs1v15Encrypt;
use rsa::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use rsa::traits::PublicKeyParts;
use zeroize::Zeroizing;

use crate::Error;
use crate::Result;
use crate::data_object::template::{
    self,
    CURVE_PRIVATE_KEY,
    ComponentMap,
    DigestInfo,
    KeyComponent,
};
use crate::types::{Curve, HashAlgorithm};

pub mod mem;

mod algorithm;
pub use algorithm::{
    ALGORITHM_ID_ECDH,
    ALGORITHM_ID_ECDSA,
    ALGORITHM_ID_EDDSA,
    ALGORITHM_ID_RSA,
    Algorithm,
    ECDH_CURVES,
    ECDSA_CURVES,
    EDDSA_CURVES,
    supported_attributes,
};

const OID_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_NIST_P256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_NIST_P384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.132.0.34");
const OID_NIST_P521: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.132.0.35");
const OID_X25519: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.101.110");
const OID_ED25519: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.101.112");

fn wrong<T>(what: impl Into<String>) -> Result<T> {
    Err(Error::WrongParameterInCommandData(what.into()).into())
}

/// A parsed private key held by a key slot.
pub enum PrivateKey {
    /// RSA.
    Rsa(RsaPrivateKey),
    /// ECDSA or ECDH over NIST P-256.
    NistP256(p256::SecretKey),
    /// ECDSA or ECDH over NIST P-384.
    NistP384(p384::SecretKey),
    /// ECDSA or ECDH over NIST P-521.
    NistP521(p521::SecretKey),
    /// EdDSA over Ed25519.
    Ed25519(ed25519_dalek::SigningKey),
    /// X25519 Diffie-Hellman.
    Cv25519(x25519_dalek::StaticSecret),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let variant = match self {
            PrivateKey::Rsa(_) => "Rsa",
            PrivateKey::NistP256(_) => "NistP256",
            PrivateKey::NistP384(_) => "NistP384",
            PrivateKey::NistP521(_) => "NistP521",
            PrivateKey::Ed25519(_) => "Ed25519",
            PrivateKey::Cv25519(_) => "Cv25519",
        };
        write!(f, "PrivateKey::{}(..)", variant)
    }
}

impl PrivateKey {
    /// Generates a fresh key for the given attributes.
    ///
    /// This is the slow path the background pump runs off the command
    /// thread.
    pub fn generate(algorithm: &Algorithm) -> Result<PrivateKey> {
        match algorithm {
            Algorithm::Rsa { modulus_bits, .. } => {
                let e = BigUint::from(65537u32);
                Ok(PrivateKey::Rsa(RsaPrivateKey::new_with_exp(
                    &mut OsRng, usize::from(*modulus_bits), &e)?))
            },
            Algorithm::Ecdsa { curve, .. }
            | Algorithm::Ecdh { curve, .. }
            | Algorithm::Eddsa { curve, .. } => match curve {
                Curve::NistP256 =>
                    Ok(PrivateKey::NistP256(p256::SecretKey::random(
                        &mut OsRng))),
                Curve::NistP384 =>
                    Ok(PrivateKey::NistP384(p384::SecretKey::random(
                        &mut OsRng))),
                Curve::NistP521 =>
                    Ok(PrivateKey::NistP521(p521::SecretKey::random(
                        &mut OsRng))),
                Curve::Ed25519 =>
                    Ok(PrivateKey::Ed25519(
                        ed25519_dalek::SigningKey::generate(&mut OsRng))),
                Curve::Cv25519 =>
                    Ok(PrivateKey::Cv25519(
                        x25519_dalek::StaticSecret::random_from_rng(OsRng))),
                Curve::BrainpoolP256 | Curve::BrainpoolP384
                | Curve::BrainpoolP512 =>
                    Err(Error::UnsupportedEllipticCurve(
                        curve.to_string()).into()),
            },
        }
    }

    /// Builds a key from imported components.
    pub fn import(algorithm: &Algorithm, components: &ComponentMap)
        -> Result<PrivateKey>
    {
        match algorithm {
            Algorithm::Rsa { modulus_bits, .. } =>
                import_rsa(*modulus_bits, components),
            Algorithm::Ecdsa { curve, .. }
            | Algorithm::Ecdh { curve, .. }
            | Algorithm::Eddsa { curve, .. } =>
                import_curve(*curve, components),
        }
    }

    /// Signs a condensate.
    ///
    /// For RSA the input is a DigestInfo; the condensate must not
    /// exceed 40% of the modulus length, and the hash OID must be
    /// known.  For ECDSA the input is the raw condensate and the hash
    /// is inferred from its length; the signature is r and s
    /// zero-padded to the field size.  Ed25519 would require Ed25519ph
    /// and is reported unsupported.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PrivateKey::Rsa(key) => {
                let digest_info = DigestInfo::decode(data)?;
                // The condensate must not be longer than 40% of the
                // key modulus.
                if digest_info.digest.len() * 5 > key.size() * 2 {
                    return wrong(format!("condensate of {} bytes too long",
                                         digest_info.digest.len()));
                }
                let hash = match HashAlgorithm::from_oid(&digest_info.oid) {
                    Some(hash) => hash,
                    None => return wrong("unknown condensate OID"),
                };
                let padding = match hash {
                    HashAlgorithm::MD5 =>
                        Pkcs1v15Sign::new::<md5::Md5>(),
                    HashAlgorithm::SHA1 =>
                        Pkcs1v15Sign::new::<sha1collisiondetection::Sha1CD>(),
                    HashAlgorithm::SHA224 =>
                        Pkcs1v15Sign::new::<sha2::Sha224>(),
                    HashAlgorithm::SHA256 =>
                        Pkcs1v15Sign::new::<sha2::Sha256>(),
                    HashAlgorithm::SHA384 =>
                        Pkcs1v15Sign::new::<sha2::Sha384>(),
                    HashAlgorithm::SHA512 =>
                        Pkcs1v15Sign::new::<sha2::Sha512>(),
                };
                Ok(key.sign(padding, &digest_info.digest)?)
            },
            PrivateKey::NistP256(key) => {
                check_prehash(data)?;
                let signing = p256::ecdsa::SigningKey::from(key);
                let signature: p256::ecdsa::Signature =
                    signing.sign_prehash(data)?;
                Ok(signature.to_bytes().to_vec())
            },
            PrivateKey::NistP384(key) => {
                check_prehash(data)?;
                let signing = p384::ecdsa::SigningKey::from(key);
                let signature: p384::ecdsa::Signature =
                    signing.sign_prehash(data)?;
                Ok(signature.to_bytes().to_vec())
            },
            PrivateKey::NistP521(key) => {
                check_prehash(data)?;
                let signing = p521::ecdsa::SigningKey::from(
                    ecdsa::SigningKey::from(key));
                let signature: p521::ecdsa::Signature =
                    signing.sign_prehash(data)?;
                Ok(signature.to_bytes().to_vec())
            },
            PrivateKey::Ed25519(_) =>
                Err(Error::NotSupported(
                    "Ed25519 prehashed signing (Ed25519ph)".into()).into()),
            PrivateKey::Cv25519(_) =>
                Err(Error::RecordNotFound.into()),
        }
    }

    /// Decrypts a cryptogram.
    ///
    /// RSA expects a leading zero padding-indicator byte and a PKCS#1
    /// v1.5 cryptogram; the curve families expect the cipher envelope
    /// carrying the peer's public key and perform a Diffie-Hellman
    /// agreement.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PrivateKey::Rsa(key) => match data.split_first() {
                Some((&0, cryptogram)) =>
                    Ok(key.decrypt(Pkcs1v15Encrypt, cryptogram)?),
                Some((&indicator, _)) =>
                    wrong(format!("unexpected padding indicator {:02x}",
                                  indicator)),
                None => wrong("empty cryptogram"),
            },
            PrivateKey::NistP256(key) => {
                let peer = template::decode_cipher(data)?;
                let peer = p256::PublicKey::from_sec1_bytes(&peer)
                    .or_else(|_| wrong("bad peer public point"))?;
                let shared = p256::ecdh::diffie_hellman(
                    key.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            },
            PrivateKey::NistP384(key) => {
                let peer = template::decode_cipher(data)?;
                let peer = p384::PublicKey::from_sec1_bytes(&peer)
                    .or_else(|_| wrong("bad peer public point"))?;
                let shared = p384::ecdh::diffie_hellman(
                    key.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            },
            PrivateKey::NistP521(key) => {
                let peer = template::decode_cipher(data)?;
                let peer = p521::PublicKey::from_sec1_bytes(&peer)
                    .or_else(|_| wrong("bad peer public point"))?;
                let shared = p521::ecdh::diffie_hellman(
                    key.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            },
            PrivateKey::Cv25519(key) => {
                let peer = template::decode_cipher(data)?;
                let peer: [u8; 32] = peer.as_slice().try_into()
                    .or_else(|_| wrong("bad peer public key length"))?;
                let peer = x25519_dalek::PublicKey::from(peer);
                Ok(key.diffie_hellman(&peer).as_bytes().to_vec())
            },
            PrivateKey::Ed25519(_) =>
                Err(Error::RecordNotFound.into()),
        }
    }

    /// Emits the Public Key Components template for this key.
    pub fn public_components(&self) -> Vec<u8> {
        match self {
            PrivateKey::Rsa(key) =>
                template::rsa_public_key(&key.n().to_bytes_be(),
                                         &key.e().to_bytes_be()),
            PrivateKey::NistP256(key) =>
                template::ec_public_key(
                    key.public_key().to_encoded_point(false).as_bytes()),
            PrivateKey::NistP384(key) =>
                template::ec_public_key(
                    key.public_key().to_encoded_point(false).as_bytes()),
            PrivateKey::NistP521(key) =>
                template::ec_public_key(
                    key.public_key().to_encoded_point(false).as_bytes()),
            PrivateKey::Ed25519(key) =>
                template::ec_public_key(&key.verifying_key().to_bytes()),
            PrivateKey::Cv25519(key) =>
                template::ec_public_key(
                    x25519_dalek::PublicKey::from(key).as_bytes()),
        }
    }

    /// Serializes the key as a PKCS#8 PrivateKeyInfo.
    pub fn to_pkcs8(&self) -> Result<Zeroizing<Vec<u8>>> {
        use pkcs8::EncodePrivateKey;
        match self {
            PrivateKey::Rsa(key) =>
                Ok(Zeroizing::new(key.to_pkcs8_der()?.as_bytes().to_vec())),
            PrivateKey::NistP256(key) =>
                Ok(Zeroizing::new(key.to_pkcs8_der()?.as_bytes().to_vec())),
            PrivateKey::NistP384(key) =>
                Ok(Zeroizing::new(key.to_pkcs8_der()?.as_bytes().to_vec())),
            PrivateKey::NistP521(key) =>
                Ok(Zeroizing::new(key.to_pkcs8_der()?.as_bytes().to_vec())),
            PrivateKey::Ed25519(key) =>
                curve25519_to_pkcs8(OID_ED25519, &key.to_bytes()),
            PrivateKey::Cv25519(key) =>
                curve25519_to_pkcs8(OID_X25519, &key.to_bytes()),
        }
    }

    /// Parses a PKCS#8 PrivateKeyInfo back into a key handle.
    pub fn from_pkcs8(der: &[u8]) -> Result<PrivateKey> {
        let info = PrivateKeyInfo::try_from(der)?;
        let oid = info.algorithm.oid;
        if oid == OID_RSA {
            Ok(PrivateKey::Rsa(RsaPrivateKey::try_from(info)?))
        } else if oid == OID_EC {
            let curve = info.algorithm.parameters_oid()?;
            if curve == OID_NIST_P256 {
                Ok(PrivateKey::NistP256(p256::SecretKey::try_from(info)?))
            } else if curve == OID_NIST_P384 {
                Ok(PrivateKey::NistP384(p384::SecretKey::try_from(info)?))
            } else if curve == OID_NIST_P521 {
                Ok(PrivateKey::NistP521(p521::SecretKey::try_from(info)?))
            } else {
                Err(anyhow::anyhow!("unsupported stored curve {}", curve))
            }
        } else if oid == OID_ED25519 {
            let seed = curve25519_from_pkcs8(&info)?;
            Ok(PrivateKey::Ed25519(
                ed25519_dalek::SigningKey::from_bytes(&seed)))
        } else if oid == OID_X25519 {
            let seed = curve25519_from_pkcs8(&info)?;
            Ok(PrivateKey::Cv25519(
                x25519_dalek::StaticSecret::from(seed)))
        } else {
            Err(anyhow::anyhow!("unsupported stored key algorithm {}", oid))
        }
    }
}

fn check_prehash(data: &[u8]) -> Result<()> {
    // The hash is inferred from the condensate length; all supported
    // hashes have distinct sizes.
    match HashAlgorithm::from_digest_size(data.len()) {
        Some(_) => Ok(()),
        None => wrong(format!("condensate of {} bytes matches no hash",
                              data.len())),
    }
}

/// Builds the RFC 8410 PrivateKeyInfo for the Curve25519 family: the
/// privateKey OCTET STRING wraps another OCTET STRING holding the raw
/// seed.
fn curve25519_to_pkcs8(oid: ObjectIdentifier, seed: &[u8; 32])
    -> Result<Zeroizing<Vec<u8>>>
{
    let mut inner = Zeroizing::new(Vec::with_capacity(34));
    inner.extend_from_slice(&[0x04, 0x20]);
    inner.extend_from_slice(seed);
    let info = PrivateKeyInfo::new(
        pkcs8::AlgorithmIdentifierRef { oid, parameters: None },
        &inner);
    Ok(Zeroizing::new(info.to_der()?))
}

fn curve25519_from_pkcs8(info: &PrivateKeyInfo) -> Result<[u8; 32]> {
    match info.private_key {
        [0x04, 0x20, seed @ ..] if seed.len() == 32 =>
            Ok(seed.try_into().expect("length checked")),
        _ => Err(anyhow::anyhow!("malformed stored Curve25519 key")),
    }
}

fn import_rsa(modulus_bits: u16, components: &ComponentMap)
    -> Result<PrivateKey>
{
    use num_bigint_dig::ModInverse;

    let required = |component: KeyComponent| -> Result<BigUint> {
        match components.get(&component) {
            Some(bytes) => Ok(BigUint::from_bytes_be(bytes)),
            None => wrong(format!("missing key component {:?}", component)),
        }
    };
    let e = required(KeyComponent::PublicExponent)?;
    let p = required(KeyComponent::Prime1)?;
    let q = required(KeyComponent::Prime2)?;
    let computed = &p * &q;
    let n = match components.get(&KeyComponent::Modulus) {
        Some(bytes) => {
            let n = BigUint::from_bytes_be(bytes);
            if n != computed {
                return wrong("modulus does not match the primes");
            }
            n
        },
        None => computed,
    };
    // A modulus over 10 bits shorter than declared means the key does
    // not fit the slot's attributes; reject it.
    if (n.bits() as usize) + 10 < usize::from(modulus_bits) {
        return wrong(format!("modulus of {} bits, expected {}",
                             n.bits(), modulus_bits));
    }
    let phi = (&p - 1u32) * (&q - 1u32);
    let d = match e.clone().mod_inverse(&phi)
        .and_then(|d| d.to_biguint())
    {
        Some(d) => d,
        None => return wrong("public exponent not invertible"),
    };
    // from_components recomputes the CRT parameters; dP, dQ and 1/q
    // mod p from the command data are not taken at face value.
    Ok(PrivateKey::Rsa(RsaPrivateKey::from_components(
        n, e, d, vec![p, q])?))
}

fn import_curve(curve: Curve, components: &ComponentMap)
    -> Result<PrivateKey>
{
    let scalar = match components.get(&CURVE_PRIVATE_KEY) {
        Some(bytes) => bytes,
        None => return wrong("missing private key component"),
    };
    match curve {
        Curve::NistP256 => {
            let scalar = left_pad(scalar, 32)?;
            Ok(PrivateKey::NistP256(p256::SecretKey::from_slice(&scalar)?))
        },
        Curve::NistP384 => {
            let scalar = left_pad(scalar, 48)?;
            Ok(PrivateKey::NistP384(p384::SecretKey::from_slice(&scalar)?))
        },
        Curve::NistP521 => {
            let scalar = left_pad(scalar, 66)?;
            Ok(PrivateKey::NistP521(p521::SecretKey::from_slice(&scalar)?))
        },
        Curve::Ed25519 => {
            let seed: [u8; 32] = scalar.as_slice().try_into()
                .or_else(|_| wrong("Ed25519 key must be 32 bytes"))?;
            Ok(PrivateKey::Ed25519(
                ed25519_dalek::SigningKey::from_bytes(&seed)))
        },
        Curve::Cv25519 => {
            let seed: [u8; 32] = scalar.as_slice().try_into()
                .or_else(|_| wrong("X25519 key must be 32 bytes"))?;
            Ok(PrivateKey::Cv25519(x25519_dalek::StaticSecret::from(seed)))
        },
        Curve::BrainpoolP256 | Curve::BrainpoolP384 | Curve::BrainpoolP512 =>
            Err(Error::UnsupportedEllipticCurve(curve.to_string()).into()),
    }
}

fn left_pad(bytes: &[u8], width: usize) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = {
        let zeros = bytes.iter().take_while(|&&b| b == 0).count();
        &bytes[zeros..]
    };
    if bytes.len() > width {
        return wrong("private scalar too long for the curve");
    }
    let mut padded = Zeroizing::new(vec![0u8; width]);
    padded[width - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecdsa::signature::hazmat::PrehashVerifier;
    use rsa::traits::PrivateKeyParts;
    use sha2::{Digest, Sha256};

    use crate::types::{KeyRole, RsaImportFormat};

    fn rsa_1024() -> Algorithm {
        Algorithm::Rsa {
            modulus_bits: 1024,
            exponent_bits: 32,
            import_format: RsaImportFormat::Standard,
        }
    }

    #[test]
    fn ecdsa_p256_sign_verify() {
        let key = PrivateKey::generate(&Algorithm::Ecdsa {
            curve: Curve::NistP256, with_public_key: false,
        }).unwrap();
        let digest = Sha256::digest(b"to be signed");
        let signature = key.sign(&digest).unwrap();
        assert_eq!(signature.len(), 64);

        let secret = match &key {
            PrivateKey::NistP256(secret) => secret,
            _ => unreachable!(),
        };
        let verifying =
            p256::ecdsa::VerifyingKey::from(
                &p256::ecdsa::SigningKey::from(secret));
        let signature =
            p256::ecdsa::Signature::from_slice(&signature).unwrap();
        verifying.verify_prehash(&digest, &signature).unwrap();
    }

    #[test]
    fn ecdsa_rejects_unknown_digest_lengths() {
        let key = PrivateKey::generate(&Algorithm::Ecdsa {
            curve: Curve::NistP256, with_public_key: false,
        }).unwrap();
        assert!(key.sign(&[0u8; 21]).is_err());
    }

    #[test]
    fn rsa_import_and_sign() {
        let generated = match PrivateKey::generate(&rsa_1024()).unwrap() {
            PrivateKey::Rsa(key) => key,
            _ => unreachable!(),
        };
        let mut components = ComponentMap::new();
        components.insert(KeyComponent::PublicExponent,
                          generated.e().to_bytes_be());
        components.insert(KeyComponent::Prime1,
                          generated.primes()[0].to_bytes_be());
        components.insert(KeyComponent::Prime2,
                          generated.primes()[1].to_bytes_be());
        let imported =
            PrivateKey::import(&rsa_1024(), &components).unwrap();

        let digest = Sha256::digest(b"to be signed");
        let digest_info = DigestInfo {
            oid: HashAlgorithm::SHA256.oid().to_vec(),
            digest: digest.to_vec(),
        };
        let signature = imported.sign(&digest_info.encode()).unwrap();
        generated.to_public_key()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .unwrap();
    }

    #[test]
    fn rsa_import_rejects_wrong_modulus() {
        let generated = match PrivateKey::generate(&rsa_1024()).unwrap() {
            PrivateKey::Rsa(key) => key,
            _ => unreachable!(),
        };
        let mut components = ComponentMap::new();
        components.insert(KeyComponent::PublicExponent,
                          generated.e().to_bytes_be());
        components.insert(KeyComponent::Prime1,
                          generated.primes()[0].to_bytes_be());
        components.insert(KeyComponent::Prime2,
                          generated.primes()[1].to_bytes_be());
        let mut modulus = generated.n().to_bytes_be();
        modulus[0] ^= 0x40;
        components.insert(KeyComponent::Modulus, modulus);
        assert!(PrivateKey::import(&rsa_1024(), &components).is_err());
    }

    #[test]
    fn rsa_import_rejects_short_modulus() {
        let generated = match PrivateKey::generate(&rsa_1024()).unwrap() {
            PrivateKey::Rsa(key) => key,
            _ => unreachable!(),
        };
        let attributes = Algorithm::Rsa {
            modulus_bits: 2048,
            exponent_bits: 32,
            import_format: RsaImportFormat::Standard,
        };
        let mut components = ComponentMap::new();
        components.insert(KeyComponent::PublicExponent,
                          generated.e().to_bytes_be());
        components.insert(KeyComponent::Prime1,
                          generated.primes()[0].to_bytes_be());
        components.insert(KeyComponent::Prime2,
                          generated.primes()[1].to_bytes_be());
        assert!(PrivateKey::import(&attributes, &components).is_err());
    }

    #[test]
    fn rsa_sign_rejects_oversized_condensate() {
        let key = PrivateKey::generate(&rsa_1024()).unwrap();
        // 64 bytes is more than 40% of a 1024 bit modulus.
        let digest_info = DigestInfo {
            oid: HashAlgorithm::SHA512.oid().to_vec(),
            digest: vec![0; 64],
        };
        assert!(key.sign(&digest_info.encode()).is_err());
    }

    #[test]
    fn x25519_agreement() {
        let key = PrivateKey::generate(&Algorithm::Ecdh {
            curve: Curve::Cv25519, with_public_key: false,
        }).unwrap();
        let peer_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let peer_public = x25519_dalek::PublicKey::from(&peer_secret);
        let envelope = template::encode_cipher(peer_public.as_bytes());
        let shared = key.decrypt(&envelope).unwrap();

        let our_public = match &key {
            PrivateKey::Cv25519(secret) =>
                x25519_dalek::PublicKey::from(secret),
            _ => unreachable!(),
        };
        assert_eq!(shared,
                   peer_secret.diffie_hellman(&our_public)
                       .as_bytes().to_vec());
    }

    #[test]
    fn p256_agreement() {
        let key = PrivateKey::generate(&Algorithm::Ecdh {
            curve: Curve::NistP256, with_public_key: false,
        }).unwrap();
        let peer = p256::SecretKey::random(&mut OsRng);
        let peer_point =
            peer.public_key().to_encoded_point(false);
        let envelope = template::encode_cipher(peer_point.as_bytes());
        let shared = key.decrypt(&envelope).unwrap();

        let our_public = match &key {
            PrivateKey::NistP256(secret) => secret.public_key(),
            _ => unreachable!(),
        };
        let expected = p256::ecdh::diffie_hellman(
            peer.to_nonzero_scalar(), our_public.as_affine());
        assert_eq!(shared, expected.raw_secret_bytes().to_vec());
    }

    #[test]
    fn rsa_decrypt_requires_padding_indicator() {
        let key = PrivateKey::generate(&rsa_1024()).unwrap();
        assert!(key.decrypt(b"").is_err());
        assert!(key.decrypt(&[0x01; 129]).is_err());
    }

    #[test]
    fn ed25519_signing_is_unsupported() {
        let key = PrivateKey::generate(&Algorithm::Eddsa {
            curve: Curve::Ed25519, with_public_key: false,
        }).unwrap();
        let e = key.sign(&[0u8; 64]).unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(),
                         Some(Error::NotSupported(_))));
    }

    #[test]
    fn brainpool_is_unsupported() {
        let e = PrivateKey::generate(&Algorithm::Ecdh {
            curve: Curve::BrainpoolP256, with_public_key: false,
        }).unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(),
                         Some(Error::UnsupportedEllipticCurve(_))));
    }

    #[test]
    fn pkcs8_roundtrip() {
        for algorithm in [
            Algorithm::Ecdsa { curve: Curve::NistP256,
                               with_public_key: false },
            Algorithm::Ecdh { curve: Curve::Cv25519,
                              with_public_key: false },
            Algorithm::Eddsa { curve: Curve::Ed25519,
                               with_public_key: false },
            rsa_1024(),
        ] {
            let key = PrivateKey::generate(&algorithm).unwrap();
            let der = key.to_pkcs8().unwrap();
            let restored = PrivateKey::from_pkcs8(&der).unwrap();
            assert_eq!(key.public_components(),
                       restored.public_components());
        }
    }

    #[test]
    fn import_rejects_missing_components() {
        assert!(PrivateKey::import(&rsa_1024(),
                                   &ComponentMap::new()).is_err());
        assert!(PrivateKey::import(
            &Algorithm::Ecdh { curve: Curve::Cv25519,
                               with_public_key: false },
            &ComponentMap::new()).is_err());
    }

    #[test]
    fn curve_import_pads_scalars() {
        let mut components = ComponentMap::new();
        // A scalar with its high byte zero still imports.
        let mut scalar = vec![0u8; 32];
        scalar[31] = 0x42;
        components.insert(CURVE_PRIVATE_KEY, scalar);
        let key = PrivateKey::import(
            &Algorithm::Ecdsa { curve: Curve::NistP256,
                                with_public_key: false },
            &components).unwrap();
        assert!(matches!(key, PrivateKey::NistP256(_)));
    }

    #[test]
    fn supported_attribute_counts() {
        // RSA: 3 modulus lengths x 4 import formats; ECDSA: 6 curves
        // x 2 public key flags; EdDSA: 1.
        assert_eq!(supported_attributes(KeyRole::Sign).len(),
                   12 + 12 + 1);
        // RSA as above; ECDH: 7 curves x 2 public key flags.
        assert_eq!(supported_attributes(KeyRole::Decrypt).len(),
                   12 + 14);
    }
}
