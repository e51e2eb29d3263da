//! Bluetooth device addresses and their place in BlueZ object paths.

use core::fmt;
use std::{num::ParseIntError, str::FromStr};

use crate::variant::{FromVariant, Variant};

/// How the bytes of an [`Address`] were assigned, as reported by the `AddressType` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum AddressType {
    /// A MAC-style address whose first 3 Bytes identify the vendor.
    #[default]
    Public,
    /// A static or private random address (BLE only).
    Random,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "public" => Ok(Self::Public),
            "random" => Ok(Self::Random),
            _ => Err(crate::Error::from(format!("invalid address type '{}'", s))),
        }
    }
}

impl FromVariant for AddressType {
    fn signature() -> String {
        "s".into()
    }

    fn from_variant(value: &Variant) -> Option<Self> {
        value.as_str()?.parse().ok()
    }
}

impl From<AddressType> for Variant {
    fn from(value: AddressType) -> Self {
        Variant::from(value.as_str())
    }
}

/// A 6-Byte Bluetooth device address, most significant Byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 6]);

impl Address {
    const DEVICE_PREFIX: &'static str = "dev_";

    #[inline]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns the object path segment BlueZ uses for a device with this address.
    ///
    /// Example: `dev_AA_BB_CC_11_22_33`
    pub fn device_path_segment(&self) -> String {
        let mut segment = String::from(Self::DEVICE_PREFIX);
        segment.push_str(&self.to_string().replace(':', "_"));
        segment
    }

    /// Extracts the address from a device object path like
    /// `/org/bluez/hci0/dev_AA_BB_CC_11_22_33`.
    ///
    /// Returns `None` if the last path segment does not name a device.
    pub fn from_device_path(path: &str) -> Option<Self> {
        let segment = path.rsplit('/').next()?;
        let hex = segment.strip_prefix(Self::DEVICE_PREFIX)?;
        parse_bytes(hex, '_').ok().map(Self)
    }
}

impl From<[u8; 6]> for Address {
    #[inline]
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

impl From<Address> for [u8; 6] {
    #[inline]
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Parses a colon-separated hex string like `aa:ff:00:33:22:11`.
impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes(s, ':').map(Self)
    }
}

fn parse_bytes(s: &str, separator: char) -> Result<[u8; 6], ParseAddressError> {
    let mut bytes = [0; 6];
    let mut parts = s.split(separator);
    for byte in &mut bytes {
        let part = parts.next().ok_or(ParseAddressError(Kind::Length))?;
        if part.len() != 2 {
            return Err(ParseAddressError(Kind::Length));
        }
        if !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseAddressError(Kind::Character));
        }
        *byte = u8::from_str_radix(part, 16).map_err(|e| ParseAddressError(Kind::Digit(e)))?;
    }
    if parts.next().is_some() {
        return Err(ParseAddressError(Kind::Length));
    }
    Ok(bytes)
}

/// The error type returned when parsing an [`Address`] fails.
#[derive(Debug)]
pub struct ParseAddressError(Kind);

#[derive(Debug)]
enum Kind {
    Digit(ParseIntError),
    Character,
    Length,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Kind::Digit(e) => write!(f, "invalid device address: {}", e),
            Kind::Character => f.write_str("invalid device address: non-hex character"),
            Kind::Length => f.write_str("invalid device address: expected 6 hex octets"),
        }
    }
}

impl std::error::Error for ParseAddressError {}
