//! Typed BlueZ D-Bus bindings with locally mirrored properties.
//!
//! Each binding wraps one interface of one remote object. Creating it fetches all properties of
//! the interface into a local, typed record (the *mirror*). [`InterfaceBinding::watch`] keeps the
//! mirror up to date by applying the remote's `PropertiesChanged` signals, and yields every applied
//! change as a [`PropertyChangeEvent`].
//!
//! Supported interfaces:
//!
//! - `org.bluez.Device1` via [`Device`]
//! - `org.bluez.obex.PhonebookAccess1` via [`PhonebookAccess`]
//!
//! All bus traffic goes through the [`Transport`] trait; [`Session::new`] uses
//! [`ZbusTransport`] on the system bus.
//!
//! [`Transport`]: transport::Transport
//! [`ZbusTransport`]: bus::ZbusTransport

#[macro_use]
mod macros;

pub mod address;
pub mod binding;
pub mod bus;
pub mod client;
pub mod device;
mod error;
pub mod mirror;
pub mod object_manager;
pub mod phonebook;
pub mod subscription;
pub mod transport;
pub mod uuid;
pub mod variant;
pub mod watch;

pub use binding::InterfaceBinding;
pub use device::Device;
pub use error::{Error, Result};
pub use phonebook::PhonebookAccess;
pub use variant::Variant;
pub use watch::{PropertyChangeEvent, PropertyChanges, WatchState};

use std::sync::Arc;

use bus::{BusKind, ZbusTransport};
use transport::Transport;

/// A cloneable handle to a bus transport.
///
/// This type is used to construct the bindings in this library.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
}

impl Session {
    /// Connects to the system bus, where `bluetoothd` lives.
    pub async fn new() -> Result<Self> {
        Self::open(BusKind::System).await
    }

    /// Connects to the given bus.
    ///
    /// `obexd` usually runs on the session bus, so [`PhonebookAccess`] bindings are typically
    /// created from a `Session` opened with [`BusKind::Session`].
    pub async fn open(kind: BusKind) -> Result<Self> {
        Ok(Self::with_transport(ZbusTransport::open(kind).await?))
    }

    /// Creates a session that talks to the bus through `transport`.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
