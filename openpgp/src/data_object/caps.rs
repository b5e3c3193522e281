//! Capability and status data objects with byte-exact layouts.

use scard_tlv as tlv;

use crate::Error;
use crate::Result;
use crate::types::{Lifecycle, SecureMessagingAlgorithm};

use super::template::INTEGER;

fn wrong<T>(what: &str) -> Result<T> {
    Err(Error::WrongParameterInCommandData(what.into()).into())
}

/// The Extended Capabilities DO (C0): ten bytes describing what the
/// card can do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtendedCapabilities {
    /// Secure messaging algorithm; `None` clears the SM bit.
    pub secure_messaging_algorithm: SecureMessagingAlgorithm,
    /// Maximum length of GET CHALLENGE; zero clears the capability bit.
    pub challenge_max_length: u16,
    /// Maximum length of the cardholder certificate.
    pub certificate_max_length: u16,
    /// Maximum length of special data objects.
    pub special_do_max_length: u16,
    /// Key import through PUT DATA is supported.
    pub has_key_import: bool,
    /// The PW1 status byte may be changed.
    pub has_editable_password_status: bool,
    /// The private-use DOs 0101..0104 exist.
    pub has_private_data_objects: bool,
    /// Algorithm attributes may be changed.
    pub has_editable_algorithm_attributes: bool,
    /// AES encryption/decryption DO support.
    pub has_aes: bool,
    /// Key-derivation function DO support.
    pub has_key_derived_function: bool,
    /// PIN block 2 format support.
    pub has_pin_block2_format: bool,
    /// MSE may swap the decryption and authentication key roles.
    pub can_swap_key_roles: bool,
}

const CAP_SECURE_MESSAGING: u8 = 0x80;
const CAP_GET_CHALLENGE: u8 = 0x40;
const CAP_KEY_IMPORT: u8 = 0x20;
const CAP_PASSWORD_STATUS: u8 = 0x10;
const CAP_PRIVATE_DOS: u8 = 0x08;
const CAP_ALGORITHM_ATTRIBUTES: u8 = 0x04;
const CAP_AES: u8 = 0x02;
const CAP_KDF: u8 = 0x01;

impl ExtendedCapabilities {
    /// Encodes the ten-byte layout.
    pub fn to_bytes(&self) -> [u8; 10] {
        let mut head = 0;
        if self.secure_messaging_algorithm != SecureMessagingAlgorithm::None {
            head |= CAP_SECURE_MESSAGING;
        }
        if self.challenge_max_length > 0 {
            head |= CAP_GET_CHALLENGE;
        }
        if self.has_key_import {
            head |= CAP_KEY_IMPORT;
        }
        if self.has_editable_password_status {
            head |= CAP_PASSWORD_STATUS;
        }
        if self.has_private_data_objects {
            head |= CAP_PRIVATE_DOS;
        }
        if self.has_editable_algorithm_attributes {
            head |= CAP_ALGORITHM_ATTRIBUTES;
        }
        if self.has_aes {
            head |= CAP_AES;
        }
        if self.has_key_derived_function {
            head |= CAP_KDF;
        }
        let challenge = self.challenge_max_length.to_be_bytes();
        let certificate = self.certificate_max_length.to_be_bytes();
        let special = self.special_do_max_length.to_be_bytes();
        [
            head,
            self.secure_messaging_algorithm.into(),
            challenge[0], challenge[1],
            certificate[0], certificate[1],
            special[0], special[1],
            self.has_pin_block2_format as u8,
            self.can_swap_key_roles as u8,
        ]
    }

    /// Decodes the ten-byte layout.
    pub fn from_bytes(value: &[u8]) -> Result<ExtendedCapabilities> {
        let value: &[u8; 10] = match value.try_into() {
            Ok(v) => v,
            Err(_) => return wrong("extended capabilities length"),
        };
        let secure_messaging_algorithm =
            match SecureMessagingAlgorithm::from_byte(value[1]) {
                Some(a) => a,
                None => return wrong("secure messaging algorithm"),
            };
        Ok(ExtendedCapabilities {
            secure_messaging_algorithm,
            challenge_max_length:
                u16::from_be_bytes([value[2], value[3]]),
            certificate_max_length:
                u16::from_be_bytes([value[4], value[5]]),
            special_do_max_length:
                u16::from_be_bytes([value[6], value[7]]),
            has_key_import: value[0] & CAP_KEY_IMPORT != 0,
            has_editable_password_status:
                value[0] & CAP_PASSWORD_STATUS != 0,
            has_private_data_objects: value[0] & CAP_PRIVATE_DOS != 0,
            has_editable_algorithm_attributes:
                value[0] & CAP_ALGORITHM_ATTRIBUTES != 0,
            has_aes: value[0] & CAP_AES != 0,
            has_key_derived_function: value[0] & CAP_KDF != 0,
            has_pin_block2_format: value[8] != 0,
            can_swap_key_roles: value[9] != 0,
        })
    }
}

/// The PW Status Bytes DO (C4): seven bytes of password limits and
/// remaining tries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordStatus {
    /// PW1 remains valid for multiple signatures.
    pub pw1_valid_multiple_signatures: bool,
    /// Maximum length of PW1.
    pub pw1_max_length: u8,
    /// Maximum length of the resetting code.
    pub rc_max_length: u8,
    /// Maximum length of PW3.
    pub pw3_max_length: u8,
    /// Remaining tries for PW1.
    pub pw1_tries: u8,
    /// Remaining tries for the resetting code.
    pub rc_tries: u8,
    /// Remaining tries for PW3.
    pub pw3_tries: u8,
}

impl PasswordStatus {
    /// Encodes the seven-byte layout.
    pub fn to_bytes(&self) -> [u8; 7] {
        [
            self.pw1_valid_multiple_signatures as u8,
            self.pw1_max_length,
            self.rc_max_length,
            self.pw3_max_length,
            self.pw1_tries,
            self.rc_tries,
            self.pw3_tries,
        ]
    }

    /// Decodes the seven-byte layout.
    pub fn from_bytes(value: &[u8]) -> Result<PasswordStatus> {
        let value: &[u8; 7] = match value.try_into() {
            Ok(v) => v,
            Err(_) => return wrong("password status length"),
        };
        Ok(PasswordStatus {
            pw1_valid_multiple_signatures: value[0] != 0,
            pw1_max_length: value[1],
            rc_max_length: value[2],
            pw3_max_length: value[3],
            pw1_tries: value[4],
            rc_tries: value[5],
            pw3_tries: value[6],
        })
    }
}

/// The Extended Length Information DO (7F66): two 16-bit integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedLengthInfo {
    /// Maximum length of a command APDU.
    pub max_request_length: u16,
    /// Maximum length of a response APDU.
    pub max_response_length: u16,
}

impl ExtendedLengthInfo {
    /// Encodes the DO contents: two universal INTEGERs of two bytes
    /// each.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        tlv::put(&mut out, INTEGER, &self.max_request_length.to_be_bytes());
        tlv::put(&mut out, INTEGER, &self.max_response_length.to_be_bytes());
        out
    }

    /// Decodes the DO contents.
    pub fn decode(value: &[u8]) -> Result<ExtendedLengthInfo> {
        let mut lengths = [0u16; 2];
        let mut rest = value;
        for length in lengths.iter_mut() {
            let (tag, content, r) = match tlv::take(rest) {
                Ok(x) => x,
                Err(_) => return wrong("extended length information"),
            };
            rest = r;
            if tag != INTEGER || content.len() != 2 {
                return wrong("extended length information");
            }
            *length = u16::from_be_bytes([content[0], content[1]]);
        }
        if !rest.is_empty() {
            return wrong("extended length information");
        }
        Ok(ExtendedLengthInfo {
            max_request_length: lengths[0],
            max_response_length: lengths[1],
        })
    }
}

/// The card service data byte of the historical bytes (compact tag 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardServiceData {
    /// Application selection by full DF name.
    pub select_full_df_name: bool,
    /// Application selection by partial DF name.
    pub select_partial_df_name: bool,
    /// EF.DIR carries BER-TLV data objects.
    pub ef_dir_bertlv: bool,
    /// EF.ATR carries BER-TLV data objects.
    pub ef_atr_bertlv: bool,
    /// EF.DIR and EF.ATR are read through GET DATA.
    pub access_by_get_data: bool,
    /// The card has no master file.
    pub without_master_file: bool,
}

impl CardServiceData {
    /// Encodes the service data byte.
    pub fn to_byte(&self) -> u8 {
        (self.select_full_df_name as u8) << 7
            | (self.select_partial_df_name as u8) << 6
            | (self.ef_dir_bertlv as u8) << 5
            | (self.ef_atr_bertlv as u8) << 4
            // b4-b2: EF.DIR/EF.ATR access services, 010 = GET DATA.
            | (self.access_by_get_data as u8) << 2
            | self.without_master_file as u8
    }
}

/// The card capabilities of the historical bytes (compact tag 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardCapabilities {
    /// DF selection by full DF name.
    pub select_full_df_name: bool,
    /// DF selection by partial DF name.
    pub select_partial_df_name: bool,
    /// DF selection by path.
    pub select_path: bool,
    /// DF selection by file identifier.
    pub select_file_identifier: bool,
    /// Implicit DF selection.
    pub implicit_df_selection: bool,
    /// Short EF identifiers are supported.
    pub short_ef_identifier: bool,
    /// Record numbers are supported.
    pub record_number: bool,
    /// Record identifiers are supported.
    pub record_identifier: bool,
    /// EFs of BER-TLV structure are supported.
    pub ef_bertlv_content: bool,
    /// Write functions behave one-time (b7-b6 = 00 otherwise).
    pub write_one_time: bool,
    /// The FF tag is valid as the first byte of BER-TLV.
    pub ff_tag_valid: bool,
    /// Data unit size in quartets, as a power of two.
    pub data_unit_size_exponent: u8,
    /// Command chaining.
    pub command_chaining: bool,
    /// Extended Lc and Le fields.
    pub extended_lengths: bool,
    /// Extended length information in EF.ATR.
    pub extended_length_info_in_ef_atr: bool,
    /// Logical channel assignment by the card.
    pub channel_assignment_by_card: bool,
    /// Logical channel assignment by the interface device.
    pub channel_assignment_by_host: bool,
    /// Maximum number of logical channels; 8 or more encodes as 7.
    pub channel_count: u8,
}

impl CardCapabilities {
    /// Encodes the three capability bytes.
    pub fn to_bytes(&self) -> [u8; 3] {
        let selection = (self.select_full_df_name as u8) << 7
            | (self.select_partial_df_name as u8) << 6
            | (self.select_path as u8) << 5
            | (self.select_file_identifier as u8) << 4
            | (self.implicit_df_selection as u8) << 3
            | (self.short_ef_identifier as u8) << 2
            | (self.record_number as u8) << 1
            | self.record_identifier as u8;
        let coding = (self.ef_bertlv_content as u8) << 7
            // One-time write is encoded as 00 in b7-b6.
            | if self.write_one_time { 0 } else { 0x20 }
            | (self.ff_tag_valid as u8) << 4
            | (self.data_unit_size_exponent & 0x0f);
        let misc = (self.command_chaining as u8) << 7
            | (self.extended_lengths as u8) << 6
            | (self.extended_length_info_in_ef_atr as u8) << 5
            | (self.channel_assignment_by_card as u8) << 4
            | (self.channel_assignment_by_host as u8) << 3
            | self.channel_count.saturating_sub(1).min(7);
        [selection, coding, misc]
    }
}

/// Builds the Historical Data DO (5F52).
///
/// Category indicator 0x00: compact-TLV data objects followed by the
/// three status bytes (life cycle, SW1, SW2).  The life cycle byte is
/// used by OpenPGP hosts as a capability indication: ACTIVATED means
/// the card supports TERMINATE DF and ACTIVATE FILE.
pub fn historical_data(lifecycle: Lifecycle) -> Vec<u8> {
    let service = CardServiceData {
        select_full_df_name: true,
        select_partial_df_name: true,
        ef_dir_bertlv: true,
        ef_atr_bertlv: false,
        access_by_get_data: true,
        without_master_file: false,
    };
    let capabilities = CardCapabilities {
        select_full_df_name: true,
        select_partial_df_name: true,
        select_path: true,
        select_file_identifier: true,
        implicit_df_selection: true,
        short_ef_identifier: false,
        record_number: true,
        record_identifier: true,
        ef_bertlv_content: false,
        write_one_time: true,
        ff_tag_valid: true,
        data_unit_size_exponent: 1,
        command_chaining: true,
        extended_lengths: true,
        extended_length_info_in_ef_atr: true,
        channel_assignment_by_card: true,
        channel_assignment_by_host: true,
        channel_count: 8,
    };
    let mut out = vec![0x00];
    tlv::put_compact(&mut out, 0x3, &[service.to_byte()]);
    tlv::put_compact(&mut out, 0x7, &capabilities.to_bytes());
    out.push(lifecycle.into());
    out.extend_from_slice(&crate::SW_SUCCESS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, quickcheck};

    impl Arbitrary for ExtendedCapabilities {
        fn arbitrary(g: &mut Gen) -> ExtendedCapabilities {
            ExtendedCapabilities {
                secure_messaging_algorithm:
                    *g.choose(&[SecureMessagingAlgorithm::None,
                                SecureMessagingAlgorithm::Aes128,
                                SecureMessagingAlgorithm::Aes256,
                                SecureMessagingAlgorithm::Scp11b]).unwrap(),
                challenge_max_length: u16::arbitrary(g),
                certificate_max_length: u16::arbitrary(g),
                special_do_max_length: u16::arbitrary(g),
                has_key_import: bool::arbitrary(g),
                has_editable_password_status: bool::arbitrary(g),
                has_private_data_objects: bool::arbitrary(g),
                has_editable_algorithm_attributes: bool::arbitrary(g),
                has_aes: bool::arbitrary(g),
                has_key_derived_function: bool::arbitrary(g),
                has_pin_block2_format: bool::arbitrary(g),
                can_swap_key_roles: bool::arbitrary(g),
            }
        }
    }

    impl Arbitrary for PasswordStatus {
        fn arbitrary(g: &mut Gen) -> PasswordStatus {
            PasswordStatus {
                pw1_valid_multiple_signatures: bool::arbitrary(g),
                pw1_max_length: u8::arbitrary(g),
                rc_max_length: u8::arbitrary(g),
                pw3_max_length: u8::arbitrary(g),
                pw1_tries: u8::arbitrary(g),
                rc_tries: u8::arbitrary(g),
                pw3_tries: u8::arbitrary(g),
            }
        }
    }

    quickcheck! {
        fn extended_capabilities_decode_encode(
            caps: ExtendedCapabilities) -> bool
        {
            ExtendedCapabilities::from_bytes(&caps.to_bytes()).unwrap()
                == caps
        }

        fn password_status_decode_encode(status: PasswordStatus) -> bool {
            PasswordStatus::from_bytes(&status.to_bytes()).unwrap()
                == status
        }

        fn extended_length_decode_encode(request: u16,
                                         response: u16) -> bool {
            let info = ExtendedLengthInfo {
                max_request_length: request,
                max_response_length: response,
            };
            ExtendedLengthInfo::decode(&info.encode()).unwrap() == info
        }
    }

    #[test]
    fn extended_capabilities_roundtrip() {
        let caps = ExtendedCapabilities {
            secure_messaging_algorithm: SecureMessagingAlgorithm::None,
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
        };
        let bytes = caps.to_bytes();
        // SM off, challenge on, key import, password status, private
        // DOs, algorithm attributes; no AES, no KDF.
        assert_eq!(bytes[0], 0x7c);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(&bytes[2..8], b"\xff\xff\xff\xff\xff\xff");
        assert_eq!(bytes[8], 0x00);
        assert_eq!(bytes[9], 0x01);
        assert_eq!(ExtendedCapabilities::from_bytes(&bytes).unwrap(), caps);

        assert!(ExtendedCapabilities::from_bytes(&bytes[..9]).is_err());
    }

    #[test]
    fn password_status_roundtrip() {
        let status = PasswordStatus {
            pw1_valid_multiple_signatures: false,
            pw1_max_length: 127,
            rc_max_length: 127,
            pw3_max_length: 127,
            pw1_tries: 3,
            rc_tries: 0,
            pw3_tries: 3,
        };
        assert_eq!(status.to_bytes(),
                   [0x00, 0x7f, 0x7f, 0x7f, 0x03, 0x00, 0x03]);
        assert_eq!(PasswordStatus::from_bytes(&status.to_bytes()).unwrap(),
                   status);
    }

    #[test]
    fn extended_length_info_roundtrip() {
        let info = ExtendedLengthInfo {
            max_request_length: 0xffff,
            max_response_length: 0xffff,
        };
        assert_eq!(info.encode(),
                   b"\x02\x02\xff\xff\x02\x02\xff\xff");
        assert_eq!(ExtendedLengthInfo::decode(&info.encode()).unwrap(), info);
        assert!(ExtendedLengthInfo::decode(b"\x02\x01\xff").is_err());
    }

    #[test]
    fn historical_data_shape() {
        let data = historical_data(Lifecycle::Activated);
        // Category, two compact TLVs, life cycle, SW.
        assert_eq!(data[0], 0x00);
        assert_eq!(data[1] >> 4, 0x3);
        assert_eq!(data[1] & 0x0f, 1);
        assert_eq!(data[3] >> 4, 0x7);
        assert_eq!(data[3] & 0x0f, 3);
        assert_eq!(data[data.len() - 3], 0x05);
        assert_eq!(&data[data.len() - 2..], &[0x90, 0x00]);
    }
}
