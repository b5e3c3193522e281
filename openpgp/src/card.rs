//! The interface the application consumes from the surrounding card:
//! per-channel transient state and data-object access conditions.

use crate::Error;
use crate::Result;
use crate::data_object::Do;
use crate::types::{KeyRole, PasswordLevel};

/// Per-channel transient state.
///
/// A channel carries the authentication bits granted by VERIFY and
/// the key-role remapping installed by MANAGE SECURITY ENVIRONMENT.
/// Neither survives the channel; persistent state is untouched.
#[derive(Clone, Debug)]
pub struct Channel {
    authenticated: [bool; 3],
    key_mapping: [usize; 3],
}

impl Default for Channel {
    fn default() -> Channel {
        Channel::new()
    }
}

impl Channel {
    /// Creates a fresh channel: nothing authenticated, identity key
    /// mapping.
    pub fn new() -> Channel {
        Channel {
            authenticated: [false; 3],
            key_mapping: [
                KeyRole::Sign.index(),
                KeyRole::Decrypt.index(),
                KeyRole::Authentication.index(),
            ],
        }
    }

    /// Returns whether the given level is authenticated.
    pub fn is_user_authenticated(&self, level: PasswordLevel) -> bool {
        self.authenticated[level.bit()]
    }

    /// Grants the given level.
    pub fn set_user_authentication(&mut self, level: PasswordLevel) {
        self.authenticated[level.bit()] = true;
    }

    /// Revokes the given level.
    pub fn clear_user_authentication(&mut self, level: PasswordLevel) {
        self.authenticated[level.bit()] = false;
    }

    /// Fails with `SecurityNotSatisfied` unless the given level is
    /// authenticated.
    pub fn check_user_authentication(&self, level: PasswordLevel)
        -> Result<()>
    {
        if self.is_user_authenticated(level) {
            Ok(())
        } else {
            Err(Error::SecurityNotSatisfied.into())
        }
    }

    /// Returns the slot index the given role currently addresses on
    /// this channel.
    ///
    /// The signature role cannot be remapped.
    pub fn key_index(&self, role: KeyRole) -> usize {
        self.key_mapping[role.index()]
    }

    pub(crate) fn remap_key(&mut self, role: KeyRole, slot: usize) {
        debug_assert!(slot < 3);
        self.key_mapping[role.index()] = slot;
    }
}

/// An access condition on a data object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityCondition {
    /// Always allowed.
    Always,
    /// Requires PW1 in decryption mode.
    Pw1Decrypt,
    /// Requires PW3.
    Pw3,
    /// Never allowed.
    Never,
}

impl SecurityCondition {
    /// Checks the condition against a channel.
    pub fn check(&self, channel: &Channel) -> Result<()> {
        match self {
            SecurityCondition::Always => Ok(()),
            SecurityCondition::Pw1Decrypt =>
                channel.check_user_authentication(PasswordLevel::Pw1Decrypt),
            SecurityCondition::Pw3 =>
                channel.check_user_authentication(PasswordLevel::Pw3),
            SecurityCondition::Never =>
                Err(Error::SecurityNotSatisfied.into()),
        }
    }
}

/// GET and PUT access conditions of a data object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DoSecurity {
    /// Condition on GET DATA.
    pub get: SecurityCondition,
    /// Condition on PUT DATA.
    pub put: SecurityCondition,
}

const GET_ALWAYS_PUT_NEVER: DoSecurity = DoSecurity {
    get: SecurityCondition::Always,
    put: SecurityCondition::Never,
};
const GET_ALWAYS_PUT_PW3: DoSecurity = DoSecurity {
    get: SecurityCondition::Always,
    put: SecurityCondition::Pw3,
};
const GET_NEVER_PUT_PW3: DoSecurity = DoSecurity {
    get: SecurityCondition::Never,
    put: SecurityCondition::Pw3,
};

/// The access conditions installed at activation.
pub fn security_policy(d: Do) -> DoSecurity {
    use SecurityCondition::*;
    match d {
        Do::ApplicationRelatedData
        | Do::ApplicationLabel
        | Do::SecuritySupportTemplate
        | Do::ApplicationIdentifier
        | Do::HistoricalData
        | Do::ExtendedLengthInformation
        | Do::SignatureCounter
        | Do::ExtendedCapabilities
        | Do::KeyInformation => GET_ALWAYS_PUT_NEVER,

        // Key import.
        Do::ExtendedHeaderList
        | Do::CardholderPrivateKeyTemplate => GET_NEVER_PUT_PW3,
        Do::ResettingCode => GET_NEVER_PUT_PW3,

        Do::Name
        | Do::LoginData
        | Do::LanguagePreference
        | Do::Sex
        | Do::Url
        | Do::CardholderData
        | Do::CardholderCertificate
        | Do::AlgorithmAttributesSignature
        | Do::AlgorithmAttributesDecryption
        | Do::AlgorithmAttributesAuthentication
        | Do::AlgorithmInformation
        | Do::PasswordStatus
        | Do::Fingerprints
        | Do::SignatureKeyFingerprint
        | Do::DecryptionKeyFingerprint
        | Do::AuthenticationKeyFingerprint
        | Do::CaFingerprints
        | Do::CaFingerprint1
        | Do::CaFingerprint2
        | Do::CaFingerprint3
        | Do::KeyTimestamps
        | Do::SignatureKeyTimestamp
        | Do::DecryptionKeyTimestamp
        | Do::AuthenticationKeyTimestamp => GET_ALWAYS_PUT_PW3,

        Do::Private1 => DoSecurity { get: Always, put: Pw1Decrypt },
        Do::Private2 => DoSecurity { get: Always, put: Pw3 },
        Do::Private3 => DoSecurity { get: Pw1Decrypt, put: Pw1Decrypt },
        Do::Private4 => DoSecurity { get: Pw3, put: Pw3 },

        // Not data objects in their own right; only ever nested in
        // command data.
        Do::CardholderPrivateKey
        | Do::PublicKeyComponents =>
            DoSecurity { get: Never, put: Never },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_authentication() {
        let mut channel = Channel::new();
        assert!(!channel.is_user_authenticated(PasswordLevel::Pw3));
        assert!(channel.check_user_authentication(PasswordLevel::Pw3)
                .is_err());
        channel.set_user_authentication(PasswordLevel::Pw3);
        assert!(channel.check_user_authentication(PasswordLevel::Pw3)
                .is_ok());
        // The levels are independent bits.
        assert!(!channel.is_user_authenticated(PasswordLevel::Pw1Sign));
        channel.clear_user_authentication(PasswordLevel::Pw3);
        assert!(!channel.is_user_authenticated(PasswordLevel::Pw3));
    }

    #[test]
    fn key_mapping_defaults_to_identity() {
        let mut channel = Channel::new();
        assert_eq!(channel.key_index(KeyRole::Sign), 0);
        assert_eq!(channel.key_index(KeyRole::Decrypt), 1);
        assert_eq!(channel.key_index(KeyRole::Authentication), 2);
        channel.remap_key(KeyRole::Authentication, 1);
        assert_eq!(channel.key_index(KeyRole::Authentication), 1);
        assert_eq!(channel.key_index(KeyRole::Decrypt), 1);
    }

    #[test]
    fn conditions() {
        let mut channel = Channel::new();
        assert!(SecurityCondition::Always.check(&channel).is_ok());
        assert!(SecurityCondition::Never.check(&channel).is_err());
        assert!(SecurityCondition::Pw3.check(&channel).is_err());
        channel.set_user_authentication(PasswordLevel::Pw3);
        assert!(SecurityCondition::Pw3.check(&channel).is_ok());
        assert!(SecurityCondition::Pw1Decrypt.check(&channel).is_err());
    }
}
