//! Observing the appearance and disappearance of objects under a service.

use std::collections::BTreeMap;

use zbus::zvariant::OwnedObjectPath;

use crate::{
    subscription::Subscription,
    transport::{SignalEnvelope, SignalStream, INTERFACES_ADDED, INTERFACES_REMOVED},
    variant::{FromVariant, PropMap},
    Error, Result,
};

/// An `InterfacesAdded` or `InterfacesRemoved` notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectManagerEvent {
    /// Interfaces (with their initial properties) appeared on the object at `path`.
    InterfacesAdded {
        path: OwnedObjectPath,
        interfaces: BTreeMap<String, PropMap>,
    },
    InterfacesRemoved {
        path: OwnedObjectPath,
        interfaces: Vec<String>,
    },
}

impl ObjectManagerEvent {
    pub fn path(&self) -> &OwnedObjectPath {
        match self {
            Self::InterfacesAdded { path, .. } | Self::InterfacesRemoved { path, .. } => path,
        }
    }

    /// Decodes an object manager signal. Returns `Ok(None)` for other members.
    pub fn from_signal(signal: &SignalEnvelope) -> Result<Option<Self>> {
        let malformed = || Error::from(format!("malformed {} signal", signal.member));
        let event = match (signal.member.as_str(), signal.body.as_slice()) {
            (INTERFACES_ADDED, [path, interfaces]) => Self::InterfacesAdded {
                path: OwnedObjectPath::from_variant(path).ok_or_else(malformed)?,
                interfaces: BTreeMap::from_variant(interfaces).ok_or_else(malformed)?,
            },
            (INTERFACES_REMOVED, [path, interfaces]) => Self::InterfacesRemoved {
                path: OwnedObjectPath::from_variant(path).ok_or_else(malformed)?,
                interfaces: Vec::from_variant(interfaces).ok_or_else(malformed)?,
            },
            (INTERFACES_ADDED | INTERFACES_REMOVED, _) => return Err(malformed()),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// A shared subscription to the object manager signals of a service.
///
/// Clones refer to the same subscription. Obtained from
/// [`InterfaceBinding::object_manager_signals`].
///
/// [`InterfaceBinding::object_manager_signals`]: crate::binding::InterfaceBinding::object_manager_signals
#[derive(Debug, Clone)]
pub struct ObjectManagerSignals {
    subscription: Subscription,
}

impl ObjectManagerSignals {
    pub(crate) fn new(stream: SignalStream) -> Self {
        Self {
            subscription: Subscription::new(stream),
        }
    }

    /// Waits for the next object manager event.
    ///
    /// Returns `None` once the subscription has been cancelled or the underlying stream ended.
    /// Signals that cannot be decoded are reported as errors without ending the subscription.
    pub async fn next(&self) -> Option<Result<ObjectManagerEvent>> {
        loop {
            let signal = self.subscription.next().await?;
            match ObjectManagerEvent::from_signal(&signal) {
                Ok(Some(event)) => {
                    log::trace!("object manager: {:?}", event);
                    return Some(Ok(event));
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Ends the subscription.
    ///
    /// Pending and future calls to [`ObjectManagerSignals::next`] return `None`. Cancelling more
    /// than once is a no-op.
    pub fn cancel(&self) {
        if !self.subscription.is_cancelled() {
            log::debug!("cancelling object manager subscription");
        }
        self.subscription.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transport::OBJECT_MANAGER_INTERFACE, variant::Variant};

    fn signal(member: &str, body: Vec<Variant>) -> SignalEnvelope {
        SignalEnvelope {
            path: OwnedObjectPath::try_from("/").unwrap(),
            interface: OBJECT_MANAGER_INTERFACE.into(),
            member: member.into(),
            body,
        }
    }

    fn device_path() -> OwnedObjectPath {
        OwnedObjectPath::try_from("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF").unwrap()
    }

    #[test]
    fn decode_added() {
        let props = Variant::Dict(vec![(
            Variant::from("Address"),
            Variant::from("AA:BB:CC:DD:EE:FF"),
        )]);
        let body = vec![
            Variant::ObjectPath(device_path()),
            Variant::Dict(vec![(Variant::from("org.bluez.Device1"), props)]),
        ];
        let event = ObjectManagerEvent::from_signal(&signal(INTERFACES_ADDED, body))
            .unwrap()
            .unwrap();
        let ObjectManagerEvent::InterfacesAdded { path, interfaces } = event else {
            panic!("unexpected event {:?}", event);
        };
        assert_eq!(path, device_path());
        assert_eq!(
            interfaces["org.bluez.Device1"]["Address"],
            Variant::from("AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn decode_removed() {
        let body = vec![
            Variant::ObjectPath(device_path()),
            Variant::from(vec!["org.bluez.Device1".to_string()]),
        ];
        let event = ObjectManagerEvent::from_signal(&signal(INTERFACES_REMOVED, body))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ObjectManagerEvent::InterfacesRemoved {
                path: device_path(),
                interfaces: vec!["org.bluez.Device1".into()],
            }
        );
    }

    #[test]
    fn other_members_are_skipped() {
        assert_eq!(
            ObjectManagerEvent::from_signal(&signal("Something", Vec::new())).unwrap(),
            None
        );
        ObjectManagerEvent::from_signal(&signal(INTERFACES_REMOVED, Vec::new())).unwrap_err();
    }
}
