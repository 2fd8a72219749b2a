use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Separator placed between identity fields before hashing.
const FIELD_SEPARATOR: &str = "|";

/// Content-addressed identity of a record: a SHA-256 digest of its
/// identity-bearing fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintParseError {
    #[error("fingerprint must be 64 hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex digit {0:?} in fingerprint")]
    Digit(char),
}

/// Hash an ordered tuple of fields.
///
/// Fields are joined with `|` so the digest matches ids written by earlier
/// harvesters (`sha256("author|content|visit_date")`). Callers pass `""` for
/// missing values; nothing here can fail.
pub fn fingerprint(fields: &[&str]) -> Fingerprint {
    let mut hasher = Sha256::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            hasher.update(FIELD_SEPARATOR.as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    Fingerprint(hasher.finalize().into())
}

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(64);
        for byte in self.0.iter() {
            use std::fmt::Write;
            let _ = write!(&mut hex, "{byte:02x}");
        }
        hex
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(FingerprintParseError::Length(s.len()));
        }
        let mut out = [0u8; 32];
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 64 {
            return Err(FingerprintParseError::Length(chars.len()));
        }
        for (i, pair) in chars.chunks(2).enumerate() {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }
}

fn hex_value(c: char) -> Result<u8, FingerprintParseError> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or(FingerprintParseError::Digit(c))
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_legacy_review_id() {
        let fp = fingerprint(&["a", "b", "c"]);
        assert_eq!(
            fp.to_hex(),
            "a52dd81bfd5e4e66d96b9f598382f6cbf8c5c3897654e6ae9055e03620fcf38e"
        );
    }

    #[test]
    fn empty_fields_still_hash() {
        let fp = fingerprint(&["", "", ""]);
        assert_eq!(
            fp.to_hex(),
            "565d240f5343e625ae579a4d45a770f1f02c6368b5ed4d06da4fbe6f47c28866"
        );
    }

    #[test]
    fn hex_round_trip() {
        let fp = fingerprint(&["x"]);
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(
            "abc".parse::<Fingerprint>(),
            Err(FingerprintParseError::Length(3))
        );
        let bad = "z".repeat(64);
        assert_eq!(
            bad.parse::<Fingerprint>(),
            Err(FingerprintParseError::Digit('z'))
        );
    }
}
