//! The message-bus seam.
//!
//! Everything in this library talks to the bus through the [`Transport`] trait. The production
//! implementation is [`ZbusTransport`], but any type that can perform method calls, property
//! access and signal delivery can stand in for it (which is how the integration tests drive the
//! bindings without a running BlueZ daemon).
//!
//! [`ZbusTransport`]: crate::bus::ZbusTransport

use std::fmt;

use async_trait::async_trait;
use futures_util::{future::BoxFuture, stream::BoxStream};
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use crate::{
    variant::{PropMap, Variant},
    Result,
};

/// The standard properties interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
/// Name of the standardized property-change signal on [`PROPERTIES_INTERFACE`].
pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";
/// The standard object manager interface.
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const INTERFACES_ADDED: &str = "InterfacesAdded";
pub const INTERFACES_REMOVED: &str = "InterfacesRemoved";

/// The root object path `/`, where services expose their object manager.
pub fn root_path() -> OwnedObjectPath {
    OwnedObjectPath::from(ObjectPath::from_static_str_unchecked("/"))
}

/// Identifies one interface of one object exposed by a service on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Well-known service name, eg. `org.bluez`.
    pub service: String,
    pub path: OwnedObjectPath,
    /// Interface name, eg. `org.bluez.Device1`.
    pub interface: String,
}

impl ObjectRef {
    pub fn new(
        service: impl Into<String>,
        path: OwnedObjectPath,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            path,
            interface: interface.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.service, self.path.as_str(), self.interface)
    }
}

/// Selects which signals a subscription delivers.
///
/// Unset fields match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatch {
    pub path: Option<OwnedObjectPath>,
    pub interface: String,
    pub member: Option<String>,
}

impl SignalMatch {
    /// Matches every signal of `interface`.
    pub fn interface(interface: impl Into<String>) -> Self {
        Self {
            path: None,
            interface: interface.into(),
            member: None,
        }
    }

    pub fn path(mut self, path: OwnedObjectPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Returns whether `signal` is selected by this rule.
    pub fn matches(&self, signal: &SignalEnvelope) -> bool {
        self.interface == signal.interface
            && self.path.as_ref().map_or(true, |p| *p == signal.path)
            && self.member.as_ref().map_or(true, |m| *m == signal.member)
    }
}

/// A decoded bus signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    /// Path of the object that emitted the signal.
    pub path: OwnedObjectPath,
    pub interface: String,
    pub member: String,
    /// Positional signal arguments.
    pub body: Vec<Variant>,
}

/// A stream of signals selected by a [`SignalMatch`].
///
/// The end of the stream is the termination signal for its consumer. Dropping the stream
/// unregisters the subscription at the transport.
pub type SignalStream = BoxStream<'static, SignalEnvelope>;

/// Semantic operations on a message bus.
///
/// Implementations must not retry failed operations, and must report errors sent by the remote
/// service through [`Error::remote`] so that their symbolic name is preserved.
///
/// [`Error::remote`]: crate::Error::remote
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invokes `method` on `target` with positional `args` and returns the positional reply.
    async fn call(&self, target: &ObjectRef, method: &str, args: Vec<Variant>)
        -> Result<Vec<Variant>>;

    /// Fetches a single property through the standard properties interface.
    async fn get_property(&self, target: &ObjectRef, name: &str) -> Result<Variant>;

    /// Stores a single property through the standard properties interface.
    async fn set_property(&self, target: &ObjectRef, name: &str, value: Variant) -> Result<()>;

    /// Fetches every property of `target`'s interface.
    async fn get_all_properties(&self, target: &ObjectRef) -> Result<PropMap>;

    /// Starts delivery of the signals emitted by `service` that are selected by `rule`.
    async fn subscribe(&self, service: &str, rule: &SignalMatch) -> Result<SignalStream>;

    /// Runs `task` in the background.
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(s).unwrap()
    }

    fn signal(p: &str, interface: &str, member: &str) -> SignalEnvelope {
        SignalEnvelope {
            path: path(p),
            interface: interface.into(),
            member: member.into(),
            body: Vec::new(),
        }
    }

    #[test]
    fn match_rules() {
        let rule = SignalMatch::interface(PROPERTIES_INTERFACE)
            .path(path("/org/bluez/hci0"))
            .member(PROPERTIES_CHANGED);
        assert!(rule.matches(&signal(
            "/org/bluez/hci0",
            PROPERTIES_INTERFACE,
            PROPERTIES_CHANGED
        )));
        assert!(!rule.matches(&signal(
            "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF",
            PROPERTIES_INTERFACE,
            PROPERTIES_CHANGED
        )));
        assert!(!rule.matches(&signal("/org/bluez/hci0", OBJECT_MANAGER_INTERFACE, INTERFACES_ADDED)));

        let any = SignalMatch::interface(OBJECT_MANAGER_INTERFACE);
        assert!(any.matches(&signal("/", OBJECT_MANAGER_INTERFACE, INTERFACES_REMOVED)));
    }
}
