use std::{borrow::Cow, fmt::Display, str::FromStr};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use thiserror::Error;

/// The text encodings an MCD metadata footer may be written in.
///
/// The instrument software writes UTF-16LE, which is the default. The encoding
/// is never guessed from the content, it has to be supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextEncoding {
    #[default]
    Utf16Le,
    Utf16Be,
    Utf8,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported text encoding label {0:?}")]
pub struct UnknownEncodingError(pub String);

impl TextEncoding {
    pub const fn as_encoding(&self) -> &'static Encoding {
        match self {
            Self::Utf16Le => UTF_16LE,
            Self::Utf16Be => UTF_16BE,
            Self::Utf8 => UTF_8,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Utf16Le => "utf-16-le",
            Self::Utf16Be => "utf-16-be",
            Self::Utf8 => "utf-8",
        }
    }

    /// Encode `text` into raw bytes without a byte order mark.
    ///
    /// [`Encoding::encode`] always produces UTF-8 for the UTF-16 family, so those
    /// are done by hand.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf16Le => text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
            Self::Utf16Be => text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect(),
            Self::Utf8 => text.as_bytes().to_vec(),
        }
    }

    /// Decode `bytes`, replacing malformed sequences. A leading byte order mark
    /// is stripped only if it agrees with this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let encoding = self.as_encoding();
        let bytes = match self {
            Self::Utf16Le => bytes.strip_prefix(b"\xff\xfe").unwrap_or(bytes),
            Self::Utf16Be => bytes.strip_prefix(b"\xfe\xff").unwrap_or(bytes),
            Self::Utf8 => bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes),
        };
        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            log::warn!(
                "Malformed {} sequences were replaced while decoding {} bytes",
                self.name(),
                bytes.len()
            );
        }
        text
    }
}

impl Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = UnknownEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Python-style labels like "utf-16-le" are not WHATWG labels
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-16-le" | "utf16le" | "utf16-le" => return Ok(Self::Utf16Le),
            "utf-16-be" | "utf16be" | "utf16-be" => return Ok(Self::Utf16Be),
            "utf8" => return Ok(Self::Utf8),
            _ => {}
        }
        match Encoding::for_label(normalized.as_bytes()) {
            Some(enc) if enc == UTF_16LE => Ok(Self::Utf16Le),
            Some(enc) if enc == UTF_16BE => Ok(Self::Utf16Be),
            Some(enc) if enc == UTF_8 => Ok(Self::Utf8),
            _ => Err(UnknownEncodingError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!("utf-16-le".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16Le);
        assert_eq!("UTF-16LE".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16Le);
        assert_eq!("utf_16_be".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16Be);
        assert_eq!("utf-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert!("latin-9000".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_encode_decode() {
        let text = "<MCDPublic>";
        for enc in [TextEncoding::Utf16Le, TextEncoding::Utf16Be, TextEncoding::Utf8] {
            let bytes = enc.encode(text);
            assert_eq!(enc.decode(&bytes), text);
        }
        assert_eq!(TextEncoding::Utf16Le.encode("<M"), b"<\0M\0");
        assert_eq!(TextEncoding::Utf16Be.encode("<M"), b"\0<\0M");
    }

    #[test]
    fn test_decode_strips_matching_bom() {
        let mut bytes = b"\xff\xfe".to_vec();
        bytes.extend(TextEncoding::Utf16Le.encode("abc"));
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes), "abc");
    }
}
