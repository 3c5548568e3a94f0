//! TXT record parsing for `_raop._tcp.local.` service instances.
//!
//! Narrowed to the fields RAOP (AirPlay 1) actually advertises — `cn`
//! (codecs) and `et` (encryption) rather than the AirPlay 2 `features`
//! bitmask, which this crate never needs.

use std::collections::HashMap;

use crate::receiver::{Capabilities, CodecSupport, EncryptionSupport};

/// Well-known RAOP TXT record keys.
pub mod txt_keys {
    /// Device identifier, usually the receiver's MAC address.
    pub const DEVICE_ID: &str = "deviceid";
    /// Comma-separated list of supported codec IDs.
    pub const CODECS: &str = "cn";
    /// Comma-separated list of supported encryption type IDs.
    pub const ENCRYPTIONS: &str = "et";
    /// Model identifier (e.g. `AudioAccessory5,1`).
    pub const MODEL: &str = "am";
    /// RAOP protocol version.
    pub const PROTOCOL_VERSION: &str = "vs";
}

/// Flatten raw mDNS TXT key/value pairs into a map.
#[must_use]
pub fn parse_txt_records(records: &[(String, String)]) -> HashMap<String, String> {
    records.iter().cloned().collect()
}

fn parse_codec_list(raw: &str) -> Vec<CodecSupport> {
    raw.split(',')
        .filter_map(|id| match id.trim() {
            "0" => Some(CodecSupport::Pcm),
            "1" => Some(CodecSupport::Alac),
            "2" => Some(CodecSupport::Aac),
            "3" => Some(CodecSupport::AacEld),
            _ => None,
        })
        .collect()
}

fn parse_encryption_list(raw: &str) -> Vec<EncryptionSupport> {
    raw.split(',')
        .filter_map(|id| match id.trim() {
            "0" => Some(EncryptionSupport::None),
            "1" => Some(EncryptionSupport::Rsa),
            "3" => Some(EncryptionSupport::FairPlay),
            "4" => Some(EncryptionSupport::MfiSap),
            "5" => Some(EncryptionSupport::FairPlay25),
            _ => None,
        })
        .collect()
}

/// Parse a receiver's negotiated codec/encryption support from its TXT
/// record map. Missing keys leave the corresponding list empty, which
/// [`Capabilities`] treats as "ALAC, no encryption".
#[must_use]
pub fn parse_capabilities(txt: &HashMap<String, String>) -> Capabilities {
    let codecs = txt.get(txt_keys::CODECS).map(|raw| parse_codec_list(raw)).unwrap_or_default();
    let encryption = txt.get(txt_keys::ENCRYPTIONS).map(|raw| parse_encryption_list(raw)).unwrap_or_default();
    Capabilities { codecs, encryption }
}

/// Map a handful of well-known model identifiers to a friendly name.
/// Unrecognized identifiers are returned unchanged.
#[must_use]
pub fn parse_model_name(model: &str) -> &str {
    match model {
        "AudioAccessory1,1" | "AudioAccessory1,2" => "HomePod",
        "AudioAccessory5,1" => "HomePod mini",
        "AirPort10,1" => "AirPort Express",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codec_list() {
        let caps = parse_capabilities(&HashMap::from([("cn".to_string(), "0,1".to_string())]));
        assert_eq!(caps.codecs, vec![CodecSupport::Pcm, CodecSupport::Alac]);
    }

    #[test]
    fn parses_encryption_list() {
        let caps = parse_capabilities(&HashMap::from([("et".to_string(), "0,1".to_string())]));
        assert_eq!(caps.encryption, vec![EncryptionSupport::None, EncryptionSupport::Rsa]);
    }

    #[test]
    fn missing_keys_yield_empty_capabilities() {
        let caps = parse_capabilities(&HashMap::new());
        assert!(caps.codecs.is_empty());
        assert!(caps.encryption.is_empty());
        assert!(caps.supports_alac());
    }

    #[test]
    fn unknown_model_passes_through() {
        assert_eq!(parse_model_name("Unknown1,1"), "Unknown1,1");
        assert_eq!(parse_model_name("AudioAccessory5,1"), "HomePod mini");
    }
}
