//! Live handles to one interface of one remote object.

use std::sync::{Arc, Mutex, PoisonError, RwLockReadGuard};

use zbus::zvariant::OwnedObjectPath;

use crate::{
    client::ObjectClient,
    mirror::{Mirror, Properties},
    object_manager::ObjectManagerSignals,
    subscription::Subscription,
    transport::{
        root_path, ObjectRef, SignalMatch, Transport, OBJECT_MANAGER_INTERFACE,
        PROPERTIES_INTERFACE,
    },
    variant::{self, FromVariant, PropMap, Variant},
    watch::{self, PropertyChanges, WatchControl, WatchState},
    Error, Result,
};

/// A binding to one interface of one remote object, with a local mirror of its properties.
///
/// The mirror is filled when the binding is created and afterwards only changes through
/// [`InterfaceBinding::refresh`] or while the binding is being [watched].
///
/// [watched]: InterfaceBinding::watch
pub struct InterfaceBinding<P: Properties> {
    client: ObjectClient,
    mirror: Arc<Mirror<P>>,
    watcher: Mutex<Option<Arc<WatchControl>>>,
    properties_signal: Mutex<Option<Subscription>>,
    object_manager: Mutex<Option<ObjectManagerSignals>>,
}

impl<P: Properties> InterfaceBinding<P> {
    /// Binds to `target` and performs the initial property fetch.
    ///
    /// # Errors
    ///
    /// Transport and remote errors of the fetch are returned as-is. If a property value does not
    /// have its declared type, a decoding error naming the property is returned.
    pub async fn new(transport: Arc<dyn Transport>, target: ObjectRef) -> Result<Self> {
        let client = ObjectClient::new(transport, target);
        let mirror = Arc::new(Mirror::default());
        client.get_all_properties(&mirror).await?;
        log::debug!("bound {}", client.target());
        Ok(Self {
            client,
            mirror,
            watcher: Mutex::new(None),
            properties_signal: Mutex::new(None),
            object_manager: Mutex::new(None),
        })
    }

    pub fn client(&self) -> &ObjectClient {
        &self.client
    }

    pub fn path(&self) -> &OwnedObjectPath {
        &self.client.target().path
    }

    pub fn interface(&self) -> &str {
        &self.client.target().interface
    }

    pub fn service(&self) -> &str {
        &self.client.target().service
    }

    /// Returns a read guard on the mirrored properties.
    ///
    /// Don't hold on to the guard across an `.await`: the watcher cannot apply changes while it
    /// exists.
    pub fn properties(&self) -> RwLockReadGuard<'_, P> {
        self.mirror.read()
    }

    pub fn mirror(&self) -> &Mirror<P> {
        &self.mirror
    }

    /// Returns a copy of the mirrored properties.
    pub fn snapshot(&self) -> P {
        self.mirror.snapshot()
    }

    /// Re-fetches all properties into the mirror.
    ///
    /// On error, the mirror keeps its previous contents.
    pub async fn refresh(&self) -> Result<()> {
        self.client.get_all_properties(&self.mirror).await
    }

    /// Fetches the current value of the property `name` from the remote object.
    pub async fn get_property(&self, name: &str) -> Result<Variant> {
        self.client.get_property(name).await
    }

    /// Fetches the property `name` and downcasts it to `T`.
    pub async fn get_property_as<T: FromVariant>(&self, name: &str) -> Result<T> {
        let value = self.client.get_property(name).await?;
        variant::decode(name, &value)
    }

    /// Stores `value` in the remote property `name`.
    ///
    /// The mirror is not updated; if the remote accepts the value, it will announce it through a
    /// change signal that a watcher picks up.
    pub async fn set_property(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
        self.client.set_property(name, value.into()).await
    }

    /// Invokes a method of the bound interface.
    pub async fn call(&self, method: &str, args: Vec<Variant>) -> Result<Vec<Variant>> {
        self.client.call(method, args).await
    }

    /// Starts mirroring remote property changes and returns the stream of applied changes.
    ///
    /// # Errors
    ///
    /// Only one watcher may be active per binding at a time; starting another one fails until the
    /// previous one has been [unwatched] or has ended. Subscription failures are returned as-is.
    ///
    /// [unwatched]: PropertyChanges::unwatch
    pub async fn watch(&self) -> Result<PropertyChanges> {
        let transport = self.client.transport()?;
        let control = {
            let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(active) = &*watcher {
                if !matches!(active.state(), WatchState::Closed) {
                    return Err(Error::from(format!(
                        "{} is already being watched",
                        self.client.target()
                    )));
                }
            }
            let control = WatchControl::new();
            *watcher = Some(control.clone());
            control
        };

        let signals = match self.client.subscribe(PROPERTIES_INTERFACE).await {
            Ok(signals) => signals,
            Err(e) => {
                control.abandon();
                return Err(e);
            }
        };
        let (changes, task) = watch::start(
            self.path().clone(),
            signals,
            self.mirror.clone(),
            control,
        );
        transport.spawn(Box::pin(task));
        Ok(changes)
    }

    /// Stops the watcher that produced `changes`. Equivalent to [`PropertyChanges::unwatch`].
    pub fn unwatch(&self, changes: &mut PropertyChanges) {
        changes.unwatch();
    }

    /// Returns the state of the most recently started watcher.
    ///
    /// A closed binding that never started a watcher reports [`WatchState::Closed`].
    pub fn watch_state(&self) -> WatchState {
        let state = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(WatchState::Idle, |control| control.state());
        match state {
            WatchState::Idle if self.is_closed() => WatchState::Closed,
            state => state,
        }
    }

    /// Returns the subscription to the raw property change signals of the bound object, creating
    /// it if necessary.
    ///
    /// Unlike [`InterfaceBinding::watch`], this does not touch the mirror, and delivers changes
    /// of every interface of the object. The subscription is cached like
    /// [`InterfaceBinding::object_manager_signals`].
    pub async fn properties_signal(&self) -> Result<Subscription> {
        if let Some(signals) = cached(&self.properties_signal) {
            return Ok(signals);
        }

        let stream = self.client.subscribe(PROPERTIES_INTERFACE).await?;
        let mut slot = self
            .properties_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Some(signals) if !signals.is_cancelled() => Ok(signals.clone()),
            _ => {
                log::debug!("subscribed to property changes of {}", self.client.target());
                let signals = Subscription::new(stream);
                *slot = Some(signals.clone());
                Ok(signals)
            }
        }
    }

    /// Cancels the cached property change subscription, if any.
    pub fn cancel_properties_signal(&self) {
        let signals = self
            .properties_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(signals) = signals {
            signals.cancel();
        }
    }

    /// Returns the object manager subscription of the bound service, creating it if necessary.
    ///
    /// The subscription is cached: until it is cancelled, every call returns a handle to the same
    /// one.
    pub async fn object_manager_signals(&self) -> Result<ObjectManagerSignals> {
        if let Some(signals) = cached(&self.object_manager) {
            return Ok(signals);
        }

        let rule = SignalMatch::interface(OBJECT_MANAGER_INTERFACE).path(root_path());
        let stream = self
            .client
            .transport()?
            .subscribe(self.service(), &rule)
            .await?;

        let mut slot = self
            .object_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            // Lost a race against a concurrent call; our stream is dropped.
            Some(signals) if !signals.is_cancelled() => Ok(signals.clone()),
            _ => {
                log::debug!("subscribed to object manager of {}", self.service());
                let signals = ObjectManagerSignals::new(stream);
                *slot = Some(signals.clone());
                Ok(signals)
            }
        }
    }

    /// Cancels the cached object manager subscription, if any.
    pub fn cancel_object_manager(&self) {
        let signals = self
            .object_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(signals) = signals {
            signals.cancel();
        }
    }

    /// Tears down all subscriptions and releases the transport.
    ///
    /// Every later operation on this binding fails with a transport error. Closing an already
    /// closed binding does nothing.
    pub fn close(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        self.cancel_properties_signal();
        self.cancel_object_manager();
        self.client.close();
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Returns the mirrored properties as a map keyed by property name.
    pub fn to_map(&self) -> PropMap {
        self.mirror.to_map()
    }
}

trait Cancellable: Clone {
    fn is_cancelled(&self) -> bool;
}

impl Cancellable for Subscription {
    fn is_cancelled(&self) -> bool {
        Subscription::is_cancelled(self)
    }
}

impl Cancellable for ObjectManagerSignals {
    fn is_cancelled(&self) -> bool {
        ObjectManagerSignals::is_cancelled(self)
    }
}

/// Returns the subscription in `slot` unless it has been cancelled.
fn cached<S: Cancellable>(slot: &Mutex<Option<S>>) -> Option<S> {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .filter(|signals| !signals.is_cancelled())
        .cloned()
}
