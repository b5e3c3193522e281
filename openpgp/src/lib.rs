//! OpenPGP smartcard application core.
//!
//! This crate implements the application layer of an OpenPGP smartcard
//! as defined by the [OpenPGP Smartcard Application] specification,
//! version 3.4.1: the data-object space and its BER-TLV codecs, the
//! password and retry-counter authorization model, the three
//! asymmetric key slots, and the cryptographic commands (PERFORM
//! SECURITY OPERATION, INTERNAL AUTHENTICATE, GENERATE ASYMMETRIC KEY
//! PAIR) operating on those slots.
//!
//! The crate deliberately stops at the application boundary.  The
//! transport (USB CCID or otherwise), APDU framing, and the
//! surrounding ISO 7816 file system are the embedder's business; the
//! application consumes a [`card::Channel`] for per-channel transient
//! state and a [`state::Backing`] for transactional persistence, and
//! exposes one entry point per command (see [`OpenPgp`]).
//!
//! Secure messaging, AES data objects, attestation keys, PIN block 2
//! format and key-derivation functions are not supported, and the
//! Extended Capabilities data object says so to the host.
//!
//! [OpenPGP Smartcard Application]: https://gnupg.org/ftp/specs/OpenPGP-smart-card-application-3.4.1.pdf

#![warn(missing_docs)]

pub mod card;
pub mod crypto;
pub mod data_object;
pub mod state;
pub mod types;

mod app;
pub use app::{OpenPgp, RID};

/// The status words reported on success.
pub const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Errors surfaced to the host.
///
/// This is the closed set of outcome categories the application may
/// report; each maps to an ISO 7816 SW1/SW2 status pair through
/// [`Error::status_words`].  Lower layers report richer
/// [`anyhow::Error`]s; command handlers convert anything a host may
/// trigger into one of these.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The retry counter of the addressed reference data is zero.
    #[error("Authentication method blocked")]
    AuthMethodBlocked,

    /// The addressed reference data or key does not exist.
    #[error("Reference data not found")]
    ReferenceDataNotFound,

    /// The addressed reference data exists but cannot be used.
    #[error("Reference data not usable")]
    ReferenceDataNotUsable,

    /// The addressed record (key slot contents) does not exist.
    #[error("Record not found")]
    RecordNotFound,

    /// The required authentication level is not satisfied.
    #[error("Security status not satisfied")]
    SecurityNotSatisfied,

    /// Warning status reporting the remaining verification tries.
    #[error("Verification failed, {remaining} tries remaining")]
    RetryCounter {
        /// Remaining tries before the reference blocks.
        remaining: u8,
    },

    /// Malformed or unexpected command data.
    #[error("Wrong parameter in command data: {0}")]
    WrongParameterInCommandData(String),

    /// Unsupported P1/P2 parameter combination.
    #[error("Wrong parameters P1-P2: {0}")]
    WrongParametersP1P2(String),

    /// A feature this application declares unsupported.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An elliptic curve the cryptographic backend cannot do.
    #[error("Unsupported elliptic curve: {0}")]
    UnsupportedEllipticCurve(String),

    /// No pre-generated key candidate is available yet.
    #[error("Key pair not ready yet")]
    KeyNotReady,

    /// Background key generation failed for the current attributes.
    #[error("Key pair generation failed")]
    KeyGenerationFailed,
}

impl Error {
    /// Returns the ISO 7816 SW1/SW2 pair for this error.
    pub fn status_words(&self) -> [u8; 2] {
        use Error::*;
        match self {
            AuthMethodBlocked => [0x69, 0x83],
            ReferenceDataNotFound => [0x6a, 0x88],
            ReferenceDataNotUsable => [0x69, 0x84],
            RecordNotFound => [0x6a, 0x83],
            SecurityNotSatisfied => [0x69, 0x82],
            RetryCounter { remaining } =>
                [0x63, 0xc0 | (remaining & 0x0f)],
            WrongParameterInCommandData(_) => [0x6a, 0x80],
            WrongParametersP1P2(_) => [0x6b, 0x00],
            NotSupported(_) => [0x6a, 0x81],
            UnsupportedEllipticCurve(_) => [0x6a, 0x80],
            KeyNotReady | KeyGenerationFailed => [0x6f, 0x00],
        }
    }
}

/// Maps any error to status words for the response trailer.
///
/// Errors that are not [`enum@Error`] have no precise diagnosis and map
/// to 0x6F00.
pub fn status_words(error: &anyhow::Error) -> [u8; 2] {
    error.downcast_ref::<Error>()
        .map(Error::status_words)
        .unwrap_or([0x6f, 0x00])
}

/// A specialized Result type for this crate.
pub type Result<T> = ::std::result::Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_word_mapping() {
        assert_eq!(Error::AuthMethodBlocked.status_words(), [0x69, 0x83]);
        assert_eq!(Error::SecurityNotSatisfied.status_words(), [0x69, 0x82]);
        assert_eq!(Error::RetryCounter { remaining: 2 }.status_words(),
                   [0x63, 0xc2]);
        assert_eq!(Error::RetryCounter { remaining: 0 }.status_words(),
                   [0x63, 0xc0]);

        let e = anyhow::Error::from(Error::RecordNotFound);
        assert_eq!(status_words(&e), [0x6a, 0x83]);
        let e = anyhow::anyhow!("backend exploded");
        assert_eq!(status_words(&e), [0x6f, 0x00]);
    }
}
