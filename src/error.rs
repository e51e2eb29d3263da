use std::fmt;

use crate::{address::ParseAddressError, uuid::ParseUuidError};

/// A result type hardwired to use [`Error`] as its error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type used throughout this library.
#[derive(Debug)]
pub struct Error {
    inner: ErrorKind,
}

impl Error {
    pub(crate) fn from(e: impl Into<ErrorKind>) -> Self {
        Self { inner: e.into() }
    }

    /// Creates an error carrying a symbolic error name returned by the remote service.
    ///
    /// This is intended for [`Transport`] implementations; the name is preserved verbatim and can
    /// be retrieved with [`Error::remote_name`].
    ///
    /// [`Transport`]: crate::transport::Transport
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from(ErrorKind::Remote {
            name: name.into(),
            message: message.into(),
        })
    }

    /// Creates a transport-level error (lost connection, marshalling failure, ...).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::from(ErrorKind::Transport(message.into()))
    }

    pub(crate) fn decode(property: &str, expected: String, found: String) -> Self {
        Self::from(ErrorKind::Decode {
            property: property.to_string(),
            expected,
            found,
        })
    }

    pub(crate) fn closed() -> Self {
        Self::from(ErrorKind::Closed)
    }

    /// Returns the symbolic D-Bus error name if this error was returned by the remote service.
    ///
    /// For example, calling [`Device::connect`] while a connection attempt is already underway
    /// yields `Some("org.bluez.Error.InProgress")`.
    ///
    /// [`Device::connect`]: crate::device::Device::connect
    pub fn remote_name(&self) -> Option<&str> {
        match &self.inner {
            ErrorKind::Remote { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the name of the property that failed to decode, if this is a decoding error.
    pub fn decode_property(&self) -> Option<&str> {
        match &self.inner {
            ErrorKind::Decode { property, .. } => Some(property),
            _ => None,
        }
    }

    /// Returns whether this error was caused by using a binding after it was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.inner, ErrorKind::Closed)
    }

    /// Returns whether this error originates from the bus transport rather than the remote
    /// service.
    ///
    /// Operating on a closed binding counts as a transport error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.inner,
            ErrorKind::Zbus(_) | ErrorKind::Transport(_) | ErrorKind::Closed
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorKind::Zbus(e) => e.fmt(f),
            ErrorKind::Transport(msg) => write!(f, "transport error: {}", msg),
            ErrorKind::Remote { name, message } if message.is_empty() => f.write_str(name),
            ErrorKind::Remote { name, message } => write!(f, "{}: {}", name, message),
            ErrorKind::Decode {
                property,
                expected,
                found,
            } => write!(
                f,
                "cannot decode property '{}': expected '{}', found '{}'",
                property, expected, found
            ),
            ErrorKind::Closed => f.write_str("binding has been closed"),
            ErrorKind::ParseAddressError(e) => e.fmt(f),
            ErrorKind::ParseUuidError(e) => e.fmt(f),
            ErrorKind::Other(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner {
            ErrorKind::Zbus(e) => Some(e),
            ErrorKind::ParseAddressError(e) => Some(e),
            ErrorKind::ParseUuidError(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Zbus(zbus::Error),
    Transport(String),
    Remote {
        name: String,
        message: String,
    },
    Decode {
        property: String,
        expected: String,
        found: String,
    },
    Closed,
    ParseAddressError(ParseAddressError),
    ParseUuidError(ParseUuidError),
    Other(String),
}

impl From<zbus::Error> for ErrorKind {
    fn from(value: zbus::Error) -> Self {
        match value {
            // Keep the symbolic name of errors sent by the remote intact.
            zbus::Error::MethodError(name, message, _) => Self::Remote {
                name: name.as_str().to_string(),
                message: message.unwrap_or_default(),
            },
            other => Self::Zbus(other),
        }
    }
}

impl From<ParseAddressError> for ErrorKind {
    fn from(value: ParseAddressError) -> Self {
        Self::ParseAddressError(value)
    }
}

impl From<ParseUuidError> for ErrorKind {
    fn from(value: ParseUuidError) -> Self {
        Self::ParseUuidError(value)
    }
}

impl From<String> for ErrorKind {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl From<&str> for ErrorKind {
    fn from(value: &str) -> Self {
        Self::Other(value.to_string())
    }
}
