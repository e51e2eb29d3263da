//! Bluetooth UUIDs.

use core::fmt;
use std::str::FromStr;

use crate::variant::{FromVariant, Variant};

/// A 128-bit UUID identifying a Bluetooth profile or service class.
///
/// Device `UUIDs` properties and the `ConnectProfile`/`DisconnectProfile` methods exchange these
/// in their hyphenated lowercase string form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid([u8; 16]);

impl Uuid {
    const BASE: Self = Self::from_static("00000000-0000-1000-8000-00805f9b34fb");

    /// Phonebook Access Profile, server role (PSE).
    pub const PBAP_PSE: Self = Self::from_u16(0x112f);
    /// Phonebook Access Profile, client role (PCE).
    pub const PBAP_PCE: Self = Self::from_u16(0x112e);
    pub const PBAP: Self = Self::from_u16(0x1130);
    pub const A2DP_SINK: Self = Self::from_u16(0x110b);
    pub const HANDSFREE: Self = Self::from_u16(0x111e);

    /// Byte offsets of the hyphens in the string form.
    const DASHES: [usize; 4] = [8, 13, 18, 23];

    const fn parse(s: &str) -> Result<Self, ParseUuidError> {
        const fn nibble(c: u8) -> Option<u8> {
            match c {
                b'0'..=b'9' => Some(c - b'0'),
                b'a'..=b'f' => Some(c - b'a' + 10),
                b'A'..=b'F' => Some(c - b'A' + 10),
                _ => None,
            }
        }

        let s = s.as_bytes();
        if s.len() != 36 {
            return Err(ParseUuidError(Kind::Length));
        }

        let mut out = [0; 16];
        let mut pos = 0;
        let mut byte = 0;
        let mut dash = 0;
        while pos < s.len() {
            if dash < Self::DASHES.len() && pos == Self::DASHES[dash] {
                if s[pos] != b'-' {
                    return Err(ParseUuidError(Kind::Dash));
                }
                dash += 1;
                pos += 1;
                continue;
            }
            let (hi, lo) = match (nibble(s[pos]), nibble(s[pos + 1])) {
                (Some(hi), Some(lo)) => (hi, lo),
                _ => return Err(ParseUuidError(Kind::Digit)),
            };
            out[byte] = (hi << 4) | lo;
            byte += 1;
            pos += 2;
        }

        Ok(Self(out))
    }

    /// Creates a [`Uuid`] from a static string, potentially at compile time.
    ///
    /// Panics if the string is not a hyphenated UUID.
    pub const fn from_static(s: &'static str) -> Self {
        match Self::parse(s) {
            Ok(uuid) => uuid,
            Err(_) => panic!("malformed UUID"),
        }
    }

    /// Creates a [`Uuid`] from a 16-bit alias assigned by the Bluetooth SIG.
    pub const fn from_u16(short: u16) -> Self {
        let [hi, lo] = short.to_be_bytes();
        let mut uuid = Self::BASE;
        uuid.0[2] = hi;
        uuid.0[3] = lo;
        uuid
    }

    /// Returns the 16-bit alias, if this [`Uuid`] is derived from the Bluetooth base UUID.
    pub fn as_u16(&self) -> Option<u16> {
        let mut base = *self;
        base.0[2] = 0;
        base.0[3] = 0;
        (base == Self::BASE).then(|| u16::from_be_bytes([self.0[2], self.0[3]]))
    }
}

impl FromStr for Uuid {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromVariant for Uuid {
    fn signature() -> String {
        "s".into()
    }

    fn from_variant(value: &Variant) -> Option<Self> {
        value.as_str()?.parse().ok()
    }
}

impl From<Uuid> for Variant {
    fn from(value: Uuid) -> Self {
        Variant::Str(value.to_string())
    }
}

/// The error type returned by the [`FromStr`] implementation of [`Uuid`].
#[derive(Debug)]
pub struct ParseUuidError(Kind);

#[derive(Debug)]
enum Kind {
    Length,
    Digit,
    Dash,
}

impl fmt::Display for ParseUuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match &self.0 {
            Kind::Length => "invalid UUID length (36 characters expected)",
            Kind::Digit => "invalid hex digit in UUID",
            Kind::Dash => "invalid character in UUID (`-` expected)",
        })
    }
}

impl std::error::Error for ParseUuidError {}
