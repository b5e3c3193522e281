//! Persistent application state and the transaction sink.
//!
//! Only canonical bytes are persisted: reference data, retry
//! counters, PKCS#8 key blobs, raw attribute blobs, and the simple
//! stored data objects.  Parsed key handles and parsed algorithm
//! objects are volatile and re-derived from these bytes on load.
//!
//! The application dictates transaction boundaries by calling
//! [`Backing::commit`]; most notably the retry counter decrement
//! during verification commits *before* the comparison, so a crash
//! cannot roll an attempt back.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::Result;
use crate::crypto::Algorithm;
use crate::data_object::Do;
use crate::types::{
    KeyRole,
    KeyStatus,
    Lifecycle,
    PW1_INDEX,
    PW3_INDEX,
    RESET_CODE_INDEX,
    Sex,
};

/// The default PW1 of a blank card.
pub const DEFAULT_PW1: &[u8] = b"123456";
/// The default PW3 of a blank card.
pub const DEFAULT_PW3: &[u8] = b"12345678";

/// Retry counter value of a usable reference.
pub const RETRY_LIMIT: u8 = 3;

/// Minimum reference data lengths, indexed PW1, PW3, RC.
pub const REFERENCE_MIN_LENGTH: [usize; 3] = [6, 8, 8];
/// Maximum reference data lengths, indexed PW1, PW3, RC.
///
/// Bit 8 would flag the PIN block 2 format, which this application
/// does not support.
pub const REFERENCE_MAX_LENGTH: [u8; 3] = [127, 127, 127];

/// Everything the application persists.
///
/// Cloning is cheap enough for the commit granularity of a smartcard;
/// [`MemoryBacking`] keeps whole snapshots so that tests can check
/// commit ordering.
#[derive(Clone, Debug)]
pub struct CardState {
    /// The application identifier, fixed at creation.
    pub aid: [u8; 16],
    /// The application life cycle state.
    pub lifecycle: Lifecycle,
    /// Reference data secrets, indexed PW1, PW3, RC.
    pub reference_data: [Option<Zeroizing<Vec<u8>>>; 3],
    /// Remaining verification tries, same indexing.
    pub reference_tries: [u8; 3],
    /// PKCS#8 blobs of the slot keys, indexed by slot.
    pub keys: [Option<Zeroizing<Vec<u8>>>; 3],
    /// How each slot was populated.
    pub key_information: [KeyStatus; 3],
    /// Raw algorithm attribute blobs, indexed by slot.
    pub algorithm_attributes: [Vec<u8>; 3],
    /// The signature counter.
    pub signature_counter: u32,
    /// PW1 stays valid for multiple signatures.
    pub pw1_valid_multiple_signatures: bool,
    /// Simple stored data objects.
    pub data_objects: BTreeMap<Do, Vec<u8>>,
}

impl CardState {
    /// Builds the blank state: default passwords, no resetting code,
    /// no keys, default algorithm attributes.
    pub fn blank(aid: [u8; 16]) -> CardState {
        let reference_data = [
            Some(Zeroizing::new(DEFAULT_PW1.to_vec())),
            Some(Zeroizing::new(DEFAULT_PW3.to_vec())),
            None,
        ];
        let reference_tries =
            reference_data.clone().map(
                |secret| if secret.is_some() { RETRY_LIMIT } else { 0 });
        let mut data_objects = BTreeMap::new();
        data_objects.insert(Do::Sex, vec![Sex::NotAnnounced.into()]);
        for private in [Do::Private1, Do::Private2,
                        Do::Private3, Do::Private4] {
            data_objects.insert(private, Vec::new());
        }
        CardState {
            aid,
            lifecycle: Lifecycle::Initialisation,
            reference_data,
            reference_tries,
            keys: [None, None, None],
            key_information: [KeyStatus::NotPresent; 3],
            algorithm_attributes: [
                Algorithm::default_for(KeyRole::Sign).encode(),
                Algorithm::default_for(KeyRole::Decrypt).encode(),
                Algorithm::default_for(KeyRole::Authentication).encode(),
            ],
            signature_counter: 0,
            pw1_valid_multiple_signatures: false,
            data_objects,
        }
    }

    /// Returns the remaining tries, indexed PW1, PW3, RC.
    pub fn tries(&self) -> [u8; 3] {
        self.reference_tries
    }

    /// Returns the remaining tries for PW1.
    pub fn pw1_tries(&self) -> u8 {
        self.reference_tries[PW1_INDEX]
    }

    /// Returns the remaining tries for PW3.
    pub fn pw3_tries(&self) -> u8 {
        self.reference_tries[PW3_INDEX]
    }

    /// Returns the remaining tries for the resetting code.
    pub fn reset_code_tries(&self) -> u8 {
        self.reference_tries[RESET_CODE_INDEX]
    }
}

/// The transaction sink the application commits into.
///
/// Implementations snapshot the state durably; a commit that returns
/// `Ok` must survive a crash.  The application never reads back
/// through this trait; loading is the embedder's business.
pub trait Backing: Send {
    /// Persists a snapshot of the state.
    fn commit(&mut self, state: &CardState) -> Result<()>;
}

/// An in-memory sink that records every committed snapshot.
#[derive(Default)]
pub struct MemoryBacking {
    commits: Vec<CardState>,
}

impl MemoryBacking {
    /// Creates an empty sink.
    pub fn new() -> MemoryBacking {
        MemoryBacking::default()
    }

    /// Returns the committed snapshots, oldest first.
    pub fn commits(&self) -> &[CardState] {
        &self.commits
    }

    /// Returns the latest committed snapshot.
    pub fn last(&self) -> Option<&CardState> {
        self.commits.last()
    }
}

impl Backing for MemoryBacking {
    fn commit(&mut self, state: &CardState) -> Result<()> {
        self.commits.push(state.clone());
        Ok(())
    }
}

/// A sink that drops every commit.  For embedders that bolt their own
/// persistence on top of [`OpenPgp::state`](crate::OpenPgp::state).
pub struct NullBacking;

impl Backing for NullBacking {
    fn commit(&mut self, _state: &CardState) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_defaults() {
        let state = CardState::blank([0; 16]);
        assert_eq!(state.lifecycle, Lifecycle::Initialisation);
        assert_eq!(state.reference_data[PW1_INDEX].as_deref().map(|v| v.as_slice()),
                   Some(DEFAULT_PW1));
        assert_eq!(state.reference_data[PW3_INDEX].as_deref().map(|v| v.as_slice()),
                   Some(DEFAULT_PW3));
        assert_eq!(state.reference_data[RESET_CODE_INDEX], None);
        assert_eq!(state.tries(), [3, 3, 0]);
        assert_eq!(state.key_information, [KeyStatus::NotPresent; 3]);
        assert_eq!(state.signature_counter, 0);
        assert!(!state.pw1_valid_multiple_signatures);
        assert_eq!(state.data_objects[&Do::Sex], vec![0x39]);
    }
}
