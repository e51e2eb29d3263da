//! Keeping a [`Mirror`] in sync with the remote object.

use std::{
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use futures_channel::{mpsc, oneshot};
use futures_util::{
    future::{select, Either},
    SinkExt, Stream, StreamExt,
};
use zbus::zvariant::OwnedObjectPath;

use crate::{
    mirror::{Applied, Mirror, Properties},
    transport::{SignalEnvelope, SignalStream, PROPERTIES_CHANGED, PROPERTIES_INTERFACE},
    variant::{FromVariant, Variant},
    Error, Result,
};

/// A remote property update, published after it has been applied to the mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangeEvent {
    pub interface: String,
    pub name: String,
    /// The new value, carrying the property's declared type.
    pub value: Variant,
}

/// Lifecycle of a property watcher.
///
/// `Idle → Subscribed → Running → Stopping → Closed`. `Closed` is terminal; a watcher whose input
/// ends while running goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Subscribed,
    Running,
    Stopping,
    Closed,
}

/// The decoded body of a `PropertiesChanged` signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    pub interface: String,
    /// Changed properties, in the order they were received.
    pub changed: Vec<(String, Variant)>,
    pub invalidated: Vec<String>,
}

impl PropertiesChanged {
    /// Decodes a `(sa{sv}as)` signal body.
    pub fn from_signal(signal: &SignalEnvelope) -> Result<Self> {
        if signal.interface != PROPERTIES_INTERFACE || signal.member != PROPERTIES_CHANGED {
            return Err(Error::from(format!(
                "not a property change signal: {}.{}",
                signal.interface, signal.member
            )));
        }
        let malformed = || Error::from("malformed PropertiesChanged signal");
        let (interface, changed, invalidated) = match signal.body.as_slice() {
            [interface, changed, invalidated] => (interface, changed, invalidated),
            _ => return Err(malformed()),
        };
        let interface = interface.as_str().ok_or_else(malformed)?.to_string();
        let changed = match changed {
            Variant::Dict(entries) => entries
                .iter()
                .map(|(name, value)| Some((name.as_str()?.to_string(), value.clone())))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(malformed)?,
            Variant::Array(items) if items.is_empty() => Vec::new(),
            Variant::EmptyCollection(signature) if signature.starts_with("a{s") => Vec::new(),
            _ => return Err(malformed()),
        };
        let invalidated = Vec::<String>::from_variant(invalidated).ok_or_else(malformed)?;
        Ok(Self {
            interface,
            changed,
            invalidated,
        })
    }
}

/// State shared between a watcher task, its [`PropertyChanges`] and the owning binding.
#[derive(Debug)]
pub(crate) struct WatchControl {
    state: Mutex<WatchState>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl WatchControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WatchState::Idle),
            stop: Mutex::new(None),
        })
    }

    pub(crate) fn state(&self) -> WatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Moves `Idle → Subscribed` and arms the stop signal.
    pub(crate) fn subscribed(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.set_state(WatchState::Subscribed);
        rx
    }

    /// Marks a watcher that never got to run as closed.
    pub(crate) fn abandon(&self) {
        self.set_state(WatchState::Closed);
    }

    /// Asks the watcher task to stop. Only the first call has an effect.
    pub(crate) fn stop(&self) {
        let stop = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WatchState::Closed {
                *state = WatchState::Stopping;
            }
            drop(state);
            // The task may already be gone, in which case there is nothing to stop.
            stop.send(()).ok();
        }
    }

    fn finish(&self) {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(WatchState::Closed);
    }
}

/// A stream of [`PropertyChangeEvent`]s for one bound object.
///
/// Returned by [`InterfaceBinding::watch`]. The stream ends when the watcher stops, either
/// because [`PropertyChanges::unwatch`] was called or because the remote signal stream ended.
/// Dropping it stops the watcher as well.
///
/// Events are yielded in the order the remote announced them. When an event is yielded, its value
/// has already been written to the mirror.
///
/// [`InterfaceBinding::watch`]: crate::binding::InterfaceBinding::watch
#[derive(Debug)]
pub struct PropertyChanges {
    events: mpsc::Receiver<PropertyChangeEvent>,
    control: Arc<WatchControl>,
}

impl PropertyChanges {
    pub fn state(&self) -> WatchState {
        self.control.state()
    }

    /// Stops the watcher and closes this stream.
    ///
    /// Events that were not yet received are discarded. Calling this more than once is harmless.
    pub fn unwatch(&mut self) {
        self.control.stop();
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

impl Stream for PropertyChanges {
    type Item = PropertyChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl Drop for PropertyChanges {
    fn drop(&mut self) {
        self.control.stop();
    }
}

/// Starts reconciling `mirror` against `signals`.
///
/// Returns the downstream event stream and the task that must be spawned to drive it.
pub(crate) fn start<P: Properties>(
    path: OwnedObjectPath,
    signals: SignalStream,
    mirror: Arc<Mirror<P>>,
    control: Arc<WatchControl>,
) -> (PropertyChanges, impl std::future::Future<Output = ()> + Send + 'static) {
    let stop = control.subscribed();
    // A zero-sized buffer still leaves one slot for the single sender, which is all the slack
    // a slow consumer gets before the loop blocks.
    let (tx, rx) = mpsc::channel(0);
    let task = reconcile(path, signals, mirror, tx, stop, control.clone());
    control.set_state(WatchState::Running);
    let changes = PropertyChanges {
        events: rx,
        control,
    };
    (changes, task)
}

async fn reconcile<P: Properties>(
    path: OwnedObjectPath,
    mut signals: SignalStream,
    mirror: Arc<Mirror<P>>,
    mut events: mpsc::Sender<PropertyChangeEvent>,
    mut stop: oneshot::Receiver<()>,
    control: Arc<WatchControl>,
) {
    log::debug!("watching {} on {}", P::INTERFACE, path.as_str());

    'signals: loop {
        let signal = match select(&mut stop, signals.next()).await {
            Either::Left(_) => {
                log::debug!("watcher for {} stopped", path.as_str());
                break;
            }
            Either::Right((None, _)) => {
                log::debug!("signal stream for {} ended", path.as_str());
                break;
            }
            Either::Right((Some(signal), _)) => signal,
        };

        if signal.path != path || signal.member != PROPERTIES_CHANGED {
            continue;
        }
        let change = match PropertiesChanged::from_signal(&signal) {
            Ok(change) => change,
            Err(e) => {
                log::warn!("{}: {}", path.as_str(), e);
                continue;
            }
        };
        if change.interface != P::INTERFACE {
            continue;
        }
        if !change.invalidated.is_empty() {
            log::debug!(
                "{}: ignoring invalidated properties {:?}",
                path.as_str(),
                change.invalidated
            );
        }

        for (name, value) in change.changed {
            match mirror.apply_change(&name, &value) {
                Applied::Updated => {}
                Applied::UnknownProperty => {
                    log::debug!("{}: dropping unknown property {}", path.as_str(), name);
                    continue;
                }
                Applied::Rejected(e) => {
                    log::warn!("{}: dropping update: {}", path.as_str(), e);
                    continue;
                }
            }
            log::trace!("{}: {} = {:?}", path.as_str(), name, value);

            let event = PropertyChangeEvent {
                interface: change.interface.clone(),
                name,
                value,
            };
            if events.send(event).await.is_err() {
                // Receiver closed by `unwatch` or dropped.
                break 'signals;
            }
        }
    }

    events.close_channel();
    control.finish();
}
