//! The OpenPGP application object and its command handlers.

use rand::Rng;
use rand::RngCore;
use rand::rngs::OsRng;

use scard_tlv as tlv;

use crate::Error;
use crate::Result;
use crate::card::{Channel, security_policy};
use crate::crypto::mem::secure_eq;
use crate::crypto::{Algorithm, PrivateKey, supported_attributes};
use crate::data_object::template;
use crate::data_object::{
    Do,
    ExtendedCapabilities,
    ExtendedLengthInfo,
    FINGERPRINT_LENGTH,
    PasswordStatus,
    TIMESTAMP_LENGTH,
    encode_key_information,
    encode_signature_counter,
    historical_data,
};
use crate::state::{
    Backing,
    CardState,
    REFERENCE_MAX_LENGTH,
    REFERENCE_MIN_LENGTH,
    RETRY_LIMIT,
};
use crate::types::{
    KeyRole,
    KeyStatus,
    Lifecycle,
    PW1_INDEX,
    PW3_INDEX,
    PasswordLevel,
    RESET_CODE_INDEX,
    Sex,
};

mod keygen;
use keygen::{Candidate, Keygen};

/// The registered application provider identifier of the OpenPGP
/// application (FSF Europe).
pub const RID: [u8; 5] = [0xd2, 0x76, 0x00, 0x01, 0x24];
const PIX_APPLICATION: u8 = 0x01;
// Written against specification 3.4.1.
const PIX_VERSION: [u8; 2] = [0x03, 0x41];

const PSO_CLEARTEXT: u8 = 0x80;
const PSO_CIPHERTEXT: u8 = 0x86;
const PSO_CONDENSATE: u8 = 0x9a;
const PSO_SIGNATURE: u8 = 0x9e;

const SIGNATURE_COUNTER_MAX: u32 = 0xff_ffff;

fn wrong<T>(what: impl Into<String>) -> Result<T> {
    Err(Error::WrongParameterInCommandData(what.into()).into())
}

fn wrong_p1p2<T>(what: impl Into<String>) -> Result<T> {
    Err(Error::WrongParametersP1P2(what.into()).into())
}

/// The OpenPGP smartcard application.
///
/// One instance per card.  Commands arrive through the per-command
/// methods together with the calling [`Channel`]; persistent state
/// changes are committed into the [`Backing`] at the boundaries the
/// authorization model requires.
pub struct OpenPgp {
    state: CardState,
    /// Parsed key handles, volatile, derived from `state.keys`.
    keys: [Option<PrivateKey>; 3],
    backing: Box<dyn Backing>,
    keygen: Keygen,
}

impl OpenPgp {
    /// Creates a fresh application.
    ///
    /// Either both `manufacturer` and `serial` are given, or both are
    /// drawn from the random range reserved for randomly assigned
    /// serial numbers (manufacturer 0xFF00..=0xFFFE).  The resulting
    /// application identifier is immutable for the card's lifetime.
    pub fn create(manufacturer: Option<[u8; 2]>, serial: Option<[u8; 4]>,
                  backing: Box<dyn Backing>)
        -> Result<OpenPgp>
    {
        let (manufacturer, serial) = match (manufacturer, serial) {
            (Some(manufacturer), Some(serial)) => (manufacturer, serial),
            (None, None) => {
                let mut rng = rand::thread_rng();
                ([0xff, rng.gen_range(0x00..=0xfe)],
                 rng.gen::<u32>().to_be_bytes())
            },
            _ => return Err(anyhow::anyhow!(
                "either both manufacturer and serial must be provided \
                 or none")),
        };
        let mut aid = [0u8; 16];
        aid[..5].copy_from_slice(&RID);
        aid[5] = PIX_APPLICATION;
        aid[6..8].copy_from_slice(&PIX_VERSION);
        aid[8..10].copy_from_slice(&manufacturer);
        aid[10..14].copy_from_slice(&serial);
        let mut app = OpenPgp {
            state: CardState::blank(aid),
            keys: [None, None, None],
            backing,
            keygen: Keygen::start_default(),
        };
        app.commit()?;
        Ok(app)
    }

    /// Revives an application from persisted state.
    ///
    /// Parsed key handles and the pump's algorithm objects are
    /// re-derived from the stored bytes.
    pub fn load(state: CardState, backing: Box<dyn Backing>)
        -> Result<OpenPgp>
    {
        let mut keys = [None, None, None];
        for (slot, blob) in state.keys.iter().enumerate() {
            if let Some(blob) = blob {
                keys[slot] = Some(PrivateKey::from_pkcs8(blob)?);
            }
        }
        let algorithms = [
            Algorithm::decode(KeyRole::Sign,
                              &state.algorithm_attributes[0])?,
            Algorithm::decode(KeyRole::Decrypt,
                              &state.algorithm_attributes[1])?,
            Algorithm::decode(KeyRole::Authentication,
                              &state.algorithm_attributes[2])?,
        ];
        Ok(OpenPgp {
            state,
            keys,
            backing,
            keygen: Keygen::start(algorithms),
        })
    }

    /// Returns the application identifier.
    pub fn aid(&self) -> &[u8; 16] {
        &self.state.aid
    }

    /// Returns the life cycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle
    }

    /// Returns the persistent state.
    pub fn state(&self) -> &CardState {
        &self.state
    }

    fn commit(&mut self) -> Result<()> {
        self.backing.commit(&self.state)
    }

    // Life cycle ----------------------------------------------------

    /// Activates the application, installing the data-object access
    /// conditions.
    pub fn activate(&mut self) -> Result<()> {
        self.state.lifecycle = Lifecycle::Activated;
        self.commit()
    }

    /// Terminates the application.
    ///
    /// Permitted only when PW3 is authenticated or PW3 is blocked.
    /// Termination blanks the application; a subsequent activation
    /// yields a factory-fresh card under the same AID.
    pub fn terminate(&mut self, channel: &Channel) -> Result<()> {
        if !channel.is_user_authenticated(PasswordLevel::Pw3)
            && self.state.reference_tries[PW3_INDEX] > 0
        {
            return Err(Error::SecurityNotSatisfied.into());
        }
        self.blank()?;
        self.state.lifecycle = Lifecycle::Terminated;
        self.commit()
    }

    /// Resets the application to its blank state, keeping the AID.
    pub fn blank(&mut self) -> Result<()> {
        self.state = CardState::blank(self.state.aid);
        self.keys = [None, None, None];
        for role in KeyRole::ALL {
            self.keygen.set_algorithm(role.index(),
                                      Algorithm::default_for(role));
        }
        self.commit()
    }

    /// DEACTIVATE FILE.  No security condition ever allows this
    /// command; reaching it is a dispatcher bug, so trap instead of
    /// deactivating.
    pub fn deactivate(&mut self) -> ! {
        unreachable!("DEACTIVATE FILE is not reachable on this card");
    }

    // Data objects --------------------------------------------------

    /// GET DATA.
    pub fn get_data(&self, channel: &Channel, d: Do) -> Result<Vec<u8>> {
        if self.state.lifecycle != Lifecycle::Activated {
            return Err(Error::SecurityNotSatisfied.into());
        }
        security_policy(d).get.check(channel)?;
        self.get_do(d)
    }

    /// PUT DATA.
    pub fn put_data(&mut self, channel: &Channel, d: Do, value: &[u8])
        -> Result<()>
    {
        if self.state.lifecycle != Lifecycle::Activated {
            return Err(Error::SecurityNotSatisfied.into());
        }
        security_policy(d).put.check(channel)?;
        self.put_do(d, value)?;
        self.commit()
    }

    fn get_do(&self, d: Do) -> Result<Vec<u8>> {
        match d {
            Do::ApplicationIdentifier => Ok(self.state.aid.to_vec()),
            Do::ApplicationLabel => Ok(b"OPENPGP".to_vec()),
            Do::HistoricalData => Ok(historical_data(Lifecycle::Activated)),
            Do::ExtendedLengthInformation =>
                Ok(self.extended_length_information().encode()),
            Do::ExtendedCapabilities =>
                Ok(self.extended_capabilities().to_bytes().to_vec()),
            Do::PasswordStatus =>
                Ok(self.password_status().to_bytes().to_vec()),
            Do::SignatureCounter =>
                Ok(encode_signature_counter(
                    self.state.signature_counter).to_vec()),
            Do::SecuritySupportTemplate =>
                Ok(tlv::encode(
                    Do::SignatureCounter.tag(),
                    &encode_signature_counter(
                        self.state.signature_counter))),
            Do::ApplicationRelatedData => self.application_related_data(),
            Do::CardholderData => self.cardholder_data(),
            Do::Fingerprints =>
                Ok(self.concatenated(&[Do::SignatureKeyFingerprint,
                                       Do::DecryptionKeyFingerprint,
                                       Do::AuthenticationKeyFingerprint],
                                     FINGERPRINT_LENGTH)),
            Do::CaFingerprints =>
                Ok(self.concatenated(&[Do::CaFingerprint1,
                                       Do::CaFingerprint2,
                                       Do::CaFingerprint3],
                                     FINGERPRINT_LENGTH)),
            Do::KeyTimestamps =>
                Ok(self.concatenated(&[Do::SignatureKeyTimestamp,
                                       Do::DecryptionKeyTimestamp,
                                       Do::AuthenticationKeyTimestamp],
                                     TIMESTAMP_LENGTH)),
            Do::KeyInformation =>
                Ok(encode_key_information(&self.state.key_information)),
            Do::AlgorithmInformation => Ok(self.algorithm_information()),
            Do::AlgorithmAttributesSignature =>
                Ok(self.state.algorithm_attributes[0].clone()),
            Do::AlgorithmAttributesDecryption =>
                Ok(self.state.algorithm_attributes[1].clone()),
            Do::AlgorithmAttributesAuthentication =>
                Ok(self.state.algorithm_attributes[2].clone()),

            Do::Name | Do::LoginData | Do::LanguagePreference | Do::Sex
            | Do::Url | Do::CardholderCertificate
            | Do::SignatureKeyFingerprint | Do::DecryptionKeyFingerprint
            | Do::AuthenticationKeyFingerprint
            | Do::CaFingerprint1 | Do::CaFingerprint2 | Do::CaFingerprint3
            | Do::SignatureKeyTimestamp | Do::DecryptionKeyTimestamp
            | Do::AuthenticationKeyTimestamp
            | Do::Private1 | Do::Private2 | Do::Private3 | Do::Private4 =>
                Ok(self.state.data_objects.get(&d).cloned()
                   .unwrap_or_default()),

            Do::ExtendedHeaderList
            | Do::ResettingCode
            | Do::CardholderPrivateKeyTemplate
            | Do::CardholderPrivateKey
            | Do::PublicKeyComponents =>
                Err(Error::ReferenceDataNotFound.into()),
        }
    }

    fn extended_length_information(&self) -> ExtendedLengthInfo {
        ExtendedLengthInfo {
            max_request_length: 0xffff,
            max_response_length: 0xffff,
        }
    }

    fn extended_capabilities(&self) -> ExtendedCapabilities {
        ExtendedCapabilities {
            secure_messaging_algorithm: Default::default(),
            challenge_max_length: 0xffff,
            certificate_max_length: 0xffff,
            special_do_max_length: 0xffff,
            has_key_import: true,
            has_editable_password_status: true,
            has_private_data_objects: true,
            has_editable_algorithm_attributes: true,
            has_aes: false,
            has_key_derived_function: false,
            has_pin_block2_format: false,
            can_swap_key_roles: true,
        }
    }

    fn password_status(&self) -> PasswordStatus {
        PasswordStatus {
            pw1_valid_multiple_signatures:
                self.state.pw1_valid_multiple_signatures,
            pw1_max_length: REFERENCE_MAX_LENGTH[PW1_INDEX],
            rc_max_length: REFERENCE_MAX_LENGTH[RESET_CODE_INDEX],
            pw3_max_length: REFERENCE_MAX_LENGTH[PW3_INDEX],
            pw1_tries: self.state.reference_tries[PW1_INDEX],
            rc_tries: self.state.reference_tries[RESET_CODE_INDEX],
            pw3_tries: self.state.reference_tries[PW3_INDEX],
        }
    }

    /// The inner data objects of Application Related Data, in the
    /// mandated order.
    const APPLICATION_RELATED_DATA: [Do; 12] = [
        Do::ApplicationIdentifier,
        Do::HistoricalData,
        Do::ExtendedLengthInformation,
        Do::ExtendedCapabilities,
        Do::AlgorithmAttributesSignature,
        Do::AlgorithmAttributesDecryption,
        Do::AlgorithmAttributesAuthentication,
        Do::PasswordStatus,
        Do::Fingerprints,
        Do::CaFingerprints,
        Do::KeyTimestamps,
        Do::KeyInformation,
    ];

    fn application_related_data(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for d in Self::APPLICATION_RELATED_DATA {
            tlv::put(&mut out, d.tag(), &self.get_do(d)?);
        }
        Ok(out)
    }

    fn cardholder_data(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for d in [Do::Name, Do::LanguagePreference, Do::Sex] {
            tlv::put(&mut out, d.tag(), &self.get_do(d)?);
        }
        Ok(out)
    }

    /// Concatenates per-slot fixed-width DOs, substituting zeros for
    /// slots that were never written.
    fn concatenated(&self, dos: &[Do; 3], width: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 * width);
        for d in dos {
            match self.state.data_objects.get(d)
                .filter(|stored| !stored.is_empty())
            {
                Some(stored) => out.extend_from_slice(stored),
                None => out.resize(out.len() + width, 0),
            }
        }
        out
    }

    fn algorithm_information(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for role in KeyRole::ALL {
            for blob in supported_attributes(role) {
                tlv::put(&mut out, attribute_do(role).tag(), blob);
            }
        }
        out
    }

    fn put_do(&mut self, d: Do, value: &[u8]) -> Result<()> {
        match d {
            Do::ExtendedHeaderList => self.import_key(value),
            Do::AlgorithmAttributesSignature =>
                self.set_algorithm_attributes(KeyRole::Sign, value),
            Do::AlgorithmAttributesDecryption =>
                self.set_algorithm_attributes(KeyRole::Decrypt, value),
            Do::AlgorithmAttributesAuthentication =>
                self.set_algorithm_attributes(KeyRole::Authentication,
                                              value),
            Do::AlgorithmInformation =>
                self.put_algorithm_information(value),
            Do::PasswordStatus => {
                // Only the multi-signature flag is writable, and only
                // the exact value 01 sets it.
                if !value.is_empty() {
                    self.state.pw1_valid_multiple_signatures =
                        value == [0x01];
                }
                Ok(())
            },
            Do::Sex => {
                if !value.is_empty()
                    && !(value.len() == 1
                         && Sex::from_byte(value[0]).is_some())
                {
                    return wrong("invalid sex value");
                }
                self.store(d, value)
            },
            Do::CardholderData => self.put_cardholder_data(value),
            Do::Fingerprints => {
                // Last slot first so a bad total length aborts before
                // anything changed.
                self.put_fingerprint(Do::AuthenticationKeyFingerprint,
                                     tail(value, 2 * FINGERPRINT_LENGTH))?;
                self.put_fingerprint(
                    Do::DecryptionKeyFingerprint,
                    window(value, FINGERPRINT_LENGTH,
                           2 * FINGERPRINT_LENGTH))?;
                self.put_fingerprint(Do::SignatureKeyFingerprint,
                                     head(value, FINGERPRINT_LENGTH))
            },
            Do::CaFingerprints => {
                self.put_fingerprint(Do::CaFingerprint3,
                                     tail(value, 2 * FINGERPRINT_LENGTH))?;
                self.put_fingerprint(
                    Do::CaFingerprint2,
                    window(value, FINGERPRINT_LENGTH,
                           2 * FINGERPRINT_LENGTH))?;
                self.put_fingerprint(Do::CaFingerprint1,
                                     head(value, FINGERPRINT_LENGTH))
            },
            Do::KeyTimestamps => {
                self.put_timestamp(Do::AuthenticationKeyTimestamp,
                                   tail(value, 2 * TIMESTAMP_LENGTH))?;
                self.put_timestamp(
                    Do::DecryptionKeyTimestamp,
                    window(value, TIMESTAMP_LENGTH, 2 * TIMESTAMP_LENGTH))?;
                self.put_timestamp(Do::SignatureKeyTimestamp,
                                   head(value, TIMESTAMP_LENGTH))
            },
            Do::SignatureKeyFingerprint | Do::DecryptionKeyFingerprint
            | Do::AuthenticationKeyFingerprint
            | Do::CaFingerprint1 | Do::CaFingerprint2 | Do::CaFingerprint3 =>
                self.put_fingerprint(d, value),
            Do::SignatureKeyTimestamp | Do::DecryptionKeyTimestamp
            | Do::AuthenticationKeyTimestamp =>
                self.put_timestamp(d, value),
            Do::ResettingCode =>
                self.set_reference(RESET_CODE_INDEX, value),
            Do::Name | Do::LoginData | Do::LanguagePreference | Do::Url
            | Do::CardholderCertificate
            | Do::Private1 | Do::Private2 | Do::Private3 | Do::Private4 =>
                self.store(d, value),
            _ => Err(Error::ReferenceDataNotFound.into()),
        }
    }

    fn store(&mut self, d: Do, value: &[u8]) -> Result<()> {
        self.state.data_objects.insert(d, value.to_vec());
        Ok(())
    }

    fn put_fingerprint(&mut self, d: Do, value: &[u8]) -> Result<()> {
        if !value.is_empty() && value.len() != FINGERPRINT_LENGTH {
            return wrong(format!("fingerprint of {} bytes", value.len()));
        }
        self.store(d, value)
    }

    fn put_timestamp(&mut self, d: Do, value: &[u8]) -> Result<()> {
        if !value.is_empty() && value.len() != TIMESTAMP_LENGTH {
            return wrong(format!("timestamp of {} bytes", value.len()));
        }
        self.store(d, value)
    }

    fn put_cardholder_data(&mut self, value: &[u8]) -> Result<()> {
        for item in tlv::Iter::new(value) {
            let (tag, content) = item.or_else(|e| wrong(e.to_string()))?;
            match Do::from_tag(tag) {
                Some(d @ (Do::Name | Do::LanguagePreference | Do::Sex)) =>
                    self.put_do(d, content)?,
                _ => return wrong("unexpected cardholder data object"),
            }
        }
        Ok(())
    }

    fn put_algorithm_information(&mut self, value: &[u8]) -> Result<()> {
        let mut updates: Vec<(Do, Vec<u8>)> = Vec::new();
        for item in tlv::Iter::new(value) {
            let (tag, blob) = item.or_else(|e| wrong(e.to_string()))?;
            let d = match Do::from_tag(tag) {
                Some(d @ (Do::AlgorithmAttributesSignature
                          | Do::AlgorithmAttributesDecryption
                          | Do::AlgorithmAttributesAuthentication)) => d,
                _ => return wrong("unexpected algorithm attributes tag"),
            };
            if updates.iter().any(|(seen, _)| *seen == d) {
                return wrong(format!("duplicate tag {:?}", d));
            }
            updates.push((d, blob.to_vec()));
        }
        for (d, blob) in updates {
            self.put_do(d, &blob)?;
        }
        Ok(())
    }

    // Keys ----------------------------------------------------------

    fn store_private_key(&mut self, role: KeyRole, key: Option<PrivateKey>,
                         information: KeyStatus)
        -> Result<()>
    {
        let slot = role.index();
        self.state.keys[slot] = match &key {
            Some(key) => Some(key.to_pkcs8()?),
            None => None,
        };
        self.keys[slot] = key;
        self.state.key_information[slot] = information;
        if role == KeyRole::Sign {
            self.state.signature_counter = 0;
        }
        Ok(())
    }

    /// Changes a slot's algorithm attributes.
    ///
    /// The stored key and the pump's candidate die with the old
    /// attributes.
    fn set_algorithm_attributes(&mut self, role: KeyRole, value: &[u8])
        -> Result<()>
    {
        let slot = role.index();
        if self.state.algorithm_attributes[slot].as_slice() == value {
            return Ok(());
        }
        let algorithm = Algorithm::decode(role, value)?;
        self.state.algorithm_attributes[slot] = value.to_vec();
        self.store_private_key(role, None, KeyStatus::NotPresent)?;
        self.keygen.set_algorithm(slot, algorithm);
        Ok(())
    }

    fn import_key(&mut self, value: &[u8]) -> Result<()> {
        let (role, components) = template::decode_extended_header(value)?;
        match components {
            // A lone control reference template removes the key.
            None => self.store_private_key(role, None,
                                           KeyStatus::NotPresent),
            Some(components) => {
                let algorithm = Algorithm::decode(
                    role,
                    &self.state.algorithm_attributes[role.index()])?;
                let key = PrivateKey::import(&algorithm, &components)?;
                self.store_private_key(role, Some(key),
                                       KeyStatus::Imported)
            },
        }
    }

    fn key_for(&self, channel: &Channel, role: KeyRole)
        -> Result<&PrivateKey>
    {
        match &self.keys[channel.key_index(role)] {
            Some(key) => Ok(key),
            None => Err(Error::RecordNotFound.into()),
        }
    }

    // Authorization -------------------------------------------------

    /// VERIFY.
    ///
    /// With command data, verifies it against the addressed reference
    /// and grants or revokes the channel's authentication bit.  With
    /// empty command data, reports the current state: success if
    /// already authenticated, otherwise the remaining tries.
    pub fn verify(&mut self, channel: &mut Channel, level: PasswordLevel,
                  data: &[u8])
        -> Result<()>
    {
        let index = level.reference_index();
        if !data.is_empty() {
            match self.verify_reference(index, data, false) {
                Ok(_) => {
                    channel.set_user_authentication(level);
                    Ok(())
                },
                Err(e) => {
                    channel.clear_user_authentication(level);
                    Err(e)
                },
            }
        } else if channel.is_user_authenticated(level) {
            Ok(())
        } else {
            Err(Error::RetryCounter {
                remaining: self.state.reference_tries[index],
            }.into())
        }
    }

    /// Compares `data` against the stored reference.
    ///
    /// The retry counter decrement is committed *before* the
    /// comparison so that a crash cannot undo a spent attempt, and the
    /// restoration after success is committed before returning.  With
    /// `truncate`, only the stored secret's length is compared and
    /// that length is returned; CHANGE REFERENCE DATA uses this to
    /// split old and new password.
    fn verify_reference(&mut self, index: usize, data: &[u8],
                        truncate: bool)
        -> Result<Option<usize>>
    {
        if self.state.reference_tries[index] == 0 {
            return Err(Error::AuthMethodBlocked.into());
        }
        let secret = match &self.state.reference_data[index] {
            Some(secret) => secret.clone(),
            None => return Err(Error::ReferenceDataNotUsable.into()),
        };
        self.state.reference_tries[index] -= 1;
        self.commit()?;

        let presented = if truncate {
            &data[..secret.len().min(data.len())]
        } else {
            data
        };
        if !secure_eq(presented, &secret) {
            return Err(Error::SecurityNotSatisfied.into());
        }
        self.state.reference_tries[index] = RETRY_LIMIT;
        self.commit()?;
        Ok(if truncate { Some(secret.len()) } else { None })
    }

    /// Stores a new reference, resetting its counter.
    ///
    /// An empty value is tolerated only for the resetting code and
    /// leaves it unusable (counter zero).
    fn set_reference(&mut self, index: usize, value: &[u8]) -> Result<()> {
        if (!value.is_empty() || index != RESET_CODE_INDEX)
            && value.len() < REFERENCE_MIN_LENGTH[index]
        {
            return wrong("reference data too short");
        }
        if value.len() > 0x7f {
            return wrong("reference data too long");
        }
        self.state.reference_data[index] =
            Some(zeroize::Zeroizing::new(value.to_vec()));
        self.state.reference_tries[index] =
            if value.is_empty() { 0 } else { RETRY_LIMIT };
        Ok(())
    }

    /// CHANGE REFERENCE DATA.
    ///
    /// The command data is the current password immediately followed
    /// by the new one; the split point is the stored password's
    /// length, learned through a truncating verification.
    pub fn change_reference_data(&mut self, _channel: &mut Channel,
                                 new_only: bool, level: PasswordLevel,
                                 data: &[u8])
        -> Result<()>
    {
        if new_only {
            return wrong_p1p2("exchanging only the new password");
        }
        let index = level.reference_index();
        let old_length = self.verify_reference(index, data, true)?
            .unwrap_or(0);
        self.set_reference(index, &data[old_length..])?;
        self.commit()
    }

    /// RESET RETRY COUNTER.
    ///
    /// P1 = 0x00: command data is the resetting code followed by the
    /// new PW1.  P1 = 0x02: requires PW3, command data is the new PW1.
    pub fn reset_retry_counter(&mut self, channel: &mut Channel, p1: u8,
                               p2: u8, data: &[u8])
        -> Result<()>
    {
        if p2 != 0x81 {
            return wrong_p1p2(format!("p2={:02x}", p2));
        }
        let new_reference = match p1 {
            0x00 => {
                let code_length =
                    self.verify_reference(RESET_CODE_INDEX, data, true)?
                        .unwrap_or(0);
                &data[code_length..]
            },
            0x02 => {
                channel.check_user_authentication(PasswordLevel::Pw3)?;
                data
            },
            _ => return wrong_p1p2(format!("p1={:02x}", p1)),
        };
        self.set_reference(PW1_INDEX, new_reference)?;
        self.commit()
    }

    /// Clears the channel's authentication bit for the given level.
    ///
    /// Stored state is untouched.
    pub fn logout(&self, channel: &mut Channel, level: PasswordLevel,
                  _data: &[u8])
    {
        channel.clear_user_authentication(level);
    }

    // Cryptographic commands ----------------------------------------

    /// PERFORM SECURITY OPERATION.
    ///
    /// Compute a digital signature (P1 = 0x9E, P2 = 0x9A) or decipher
    /// a cryptogram (P1 = 0x80, P2 = 0x86).
    pub fn perform_security_operation(&mut self, channel: &mut Channel,
                                      p1: u8, p2: u8, data: &[u8],
                                      _response_len: usize)
        -> Result<Vec<u8>>
    {
        if p1 == PSO_SIGNATURE && p2 == PSO_CONDENSATE {
            channel.check_user_authentication(PasswordLevel::Pw1Sign)?;
            let signature =
                self.key_for(channel, KeyRole::Sign)?.sign(data)?;
            self.state.signature_counter = SIGNATURE_COUNTER_MAX.min(
                self.state.signature_counter + 1);
            if !self.state.pw1_valid_multiple_signatures {
                channel.clear_user_authentication(PasswordLevel::Pw1Sign);
            }
            self.commit()?;
            Ok(signature)
        } else if p1 == PSO_CLEARTEXT && p2 == PSO_CIPHERTEXT {
            channel.check_user_authentication(PasswordLevel::Pw1Decrypt)?;
            self.key_for(channel, KeyRole::Decrypt)?.decrypt(data)
        } else {
            wrong_p1p2(format!("p1={:02x} p2={:02x}", p1, p2))
        }
    }

    /// INTERNAL AUTHENTICATE: sign with the authentication key.
    pub fn internal_authenticate(&self, channel: &Channel, p1: u8, p2: u8,
                                 data: &[u8])
        -> Result<Vec<u8>>
    {
        if p1 != 0 || p2 != 0 {
            return wrong_p1p2(format!("p1={:02x} p2={:02x}", p1, p2));
        }
        if data.is_empty() {
            return wrong("no authentication input");
        }
        channel.check_user_authentication(PasswordLevel::Pw1Decrypt)?;
        self.key_for(channel, KeyRole::Authentication)?.sign(data)
    }

    /// GENERATE ASYMMETRIC KEY PAIR.
    ///
    /// P1 = 0x80 stores the pre-generated candidate for the addressed
    /// slot (PW3 required); P1 = 0x81 merely reads the public key
    /// back.  Both emit the Public Key Components template.
    pub fn generate_asymmetric_key_pair(&mut self, channel: &Channel,
                                        p1: u8, p2: u8, data: &[u8])
        -> Result<Vec<u8>>
    {
        if p2 != 0 {
            return wrong_p1p2(format!("p2={:02x}", p2));
        }
        let role = template::decode_control_reference(data)?;
        // Generation addresses the slot itself, not the channel's
        // remapped view.
        let slot = role.index();
        match p1 {
            0x80 => {
                channel.check_user_authentication(PasswordLevel::Pw3)?;
                let key = match self.keygen.take(slot) {
                    Candidate::Ready(key) => key,
                    Candidate::Empty =>
                        return Err(Error::KeyNotReady.into()),
                    Candidate::Failed =>
                        return Err(Error::KeyGenerationFailed.into()),
                };
                self.store_private_key(role, Some(key),
                                       KeyStatus::Generated)?;
                self.commit()?;
            },
            0x81 => (),
            _ => return wrong_p1p2(format!("p1={:02x}", p1)),
        }
        match &self.keys[slot] {
            Some(key) => Ok(key.public_components()),
            None => Err(Error::ReferenceDataNotFound.into()),
        }
    }

    /// MANAGE SECURITY ENVIRONMENT: remap the decryption or
    /// authentication role to another slot, for this channel only.
    pub fn set_security_environment(&self, channel: &mut Channel,
                                    secure_messaging_command: bool,
                                    secure_messaging_response: bool,
                                    decipher: bool, encipher: bool,
                                    control_reference: u8,
                                    data: &[u8])
        -> Result<()>
    {
        if secure_messaging_command || secure_messaging_response
            || !decipher || encipher
        {
            return wrong_p1p2("unsupported security environment");
        }
        let role = match control_reference {
            0xa4 => KeyRole::Authentication,
            0xb8 => KeyRole::Decrypt,
            _ => return wrong_p1p2(
                format!("control reference {:02x}", control_reference)),
        };
        let (tag, value, rest) = tlv::take(data)
            .or_else(|e| wrong(e.to_string()))?;
        if tag != template::FILE_IDENTIFIER || !rest.is_empty() {
            return wrong("expected a file identifier");
        }
        let slot = match value {
            [1] => KeyRole::Decrypt.index(),
            [2] => KeyRole::Authentication.index(),
            _ => return wrong("unknown key file identifier"),
        };
        channel.remap_key(role, slot);
        Ok(())
    }

    /// GET CHALLENGE: random bytes from the system CSPRNG.
    pub fn get_challenge(&self, _channel: &Channel, p1: u8, p2: u8,
                         data: &[u8], response_len: usize)
        -> Result<Vec<u8>>
    {
        if p1 != 0 || p2 != 0 || !data.is_empty() {
            return wrong(format!("p1={:02x} p2={:02x} data={} bytes",
                                 p1, p2, data.len()));
        }
        let mut challenge = vec![0u8; response_len];
        OsRng.fill_bytes(&mut challenge);
        Ok(challenge)
    }
}

fn attribute_do(role: KeyRole) -> Do {
    match role {
        KeyRole::Sign => Do::AlgorithmAttributesSignature,
        KeyRole::Decrypt => Do::AlgorithmAttributesDecryption,
        KeyRole::Authentication => Do::AlgorithmAttributesAuthentication,
    }
}

// Forgiving slicing: out-of-range windows collapse to empty, so the
// per-slot setters see the lengths they validate.
fn head(value: &[u8], end: usize) -> &[u8] {
    &value[..end.min(value.len())]
}

fn tail(value: &[u8], start: usize) -> &[u8] {
    value.get(start..).unwrap_or(&[])
}

fn window(value: &[u8], start: usize, end: usize) -> &[u8] {
    head(tail(value, start), end.saturating_sub(start))
}
