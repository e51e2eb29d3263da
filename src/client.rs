use std::sync::{Arc, PoisonError, RwLock};

use zbus::zvariant::OwnedObjectPath;

use crate::{
    mirror::{Mirror, Properties},
    transport::{ObjectRef, SignalMatch, SignalStream, Transport},
    variant::{PropMap, Variant},
    Error, Result,
};

/// A handle translating semantic operations on one interface of one remote object into
/// [`Transport`] calls.
///
/// Errors are surfaced as-is and never retried. After [`ObjectClient::close`], every operation
/// fails with a transport error (see [`Error::is_closed`]).
pub struct ObjectClient {
    target: ObjectRef,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl ObjectClient {
    pub fn new(transport: Arc<dyn Transport>, target: ObjectRef) -> Self {
        Self {
            target,
            transport: RwLock::new(Some(transport)),
        }
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn path(&self) -> &OwnedObjectPath {
        &self.target.path
    }

    pub(crate) fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(Error::closed)
    }

    /// Invokes `method` with positional arguments and returns the positional reply.
    pub async fn call(&self, method: &str, args: Vec<Variant>) -> Result<Vec<Variant>> {
        self.transport()?.call(&self.target, method, args).await
    }

    pub async fn get_property(&self, name: &str) -> Result<Variant> {
        self.transport()?.get_property(&self.target, name).await
    }

    pub async fn set_property(&self, name: &str, value: Variant) -> Result<()> {
        self.transport()?.set_property(&self.target, name, value).await
    }

    /// Fetches all properties of the interface as an untyped bag.
    pub async fn get_all(&self) -> Result<PropMap> {
        self.transport()?.get_all_properties(&self.target).await
    }

    /// Fetches all properties and decodes them into `target`.
    ///
    /// If decoding fails, `target` keeps its previous contents.
    pub async fn get_all_properties<P: Properties>(&self, target: &Mirror<P>) -> Result<()> {
        let map = self.get_all().await?;
        target.fill(&map)
    }

    /// Starts delivery of the signals of `interface` emitted by this object.
    ///
    /// Every call adds a subscription of its own, released when the returned stream is dropped.
    /// [`InterfaceBinding`] keeps one cached subscription per kind of signal.
    ///
    /// [`InterfaceBinding`]: crate::binding::InterfaceBinding
    pub async fn subscribe(&self, interface: &str) -> Result<SignalStream> {
        let rule = SignalMatch::interface(interface).path(self.target.path.clone());
        self.transport()?
            .subscribe(&self.target.service, &rule)
            .await
    }

    /// Drops the transport reference. Closing twice is a no-op.
    pub fn close(&self) {
        let previous = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            log::debug!("closed client for {}", self.target);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
