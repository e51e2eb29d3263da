//! An in-memory stand-in for the system bus.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bluez_mirror::{
    transport::{
        ObjectRef, SignalEnvelope, SignalMatch, SignalStream, Transport, PROPERTIES_CHANGED,
        PROPERTIES_INTERFACE,
    },
    variant::{PropMap, Variant},
    Error, Result, Session,
};
use futures_channel::mpsc;
use futures_util::{future::BoxFuture, StreamExt};
use zbus::zvariant::OwnedObjectPath;

pub const DEVICE_PATH: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const SESSION_PATH: &str = "/org/bluez/obex/client/session0";
pub const PHONEBOOK_INTERFACE: &str = "org.bluez.obex.PhonebookAccess1";

type Handler = Box<dyn Fn(&[Variant]) -> Result<Vec<Variant>> + Send + Sync>;

#[derive(Default)]
struct State {
    objects: HashMap<(String, String), PropMap>,
    handlers: HashMap<String, Handler>,
    calls: Vec<(String, Vec<Variant>)>,
    subscribers: Vec<(String, SignalMatch, mpsc::UnboundedSender<SignalEnvelope>)>,
}

/// A fake bus holding objects with properties, answering method calls through registered
/// handlers, and delivering injected signals to subscribers.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<State>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Session {
        Session::with_transport(self.clone())
    }

    pub fn insert_object(&self, path: &str, interface: &str, properties: PropMap) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((path.into(), interface.into()), properties);
    }

    pub fn on_call(
        &self,
        method: &str,
        handler: impl Fn(&[Variant]) -> Result<Vec<Variant>> + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .handlers
            .insert(method.into(), Box::new(handler));
    }

    /// Methods called so far, with their arguments.
    pub fn calls(&self) -> Vec<(String, Vec<Variant>)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn property(&self, path: &str, interface: &str, name: &str) -> Option<Variant> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(path.into(), interface.into()))?
            .get(name)
            .cloned()
    }

    /// Delivers `signal` to all matching subscribers.
    pub fn emit(&self, signal: SignalEnvelope) {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|(_, _, tx)| !tx.is_closed());
        for (_, rule, tx) in &state.subscribers {
            if rule.matches(&signal) {
                tx.unbounded_send(signal.clone()).ok();
            }
        }
    }

    /// Ends every signal stream handed out so far.
    pub fn end_streams(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }

    /// Number of subscriptions whose stream is still alive.
    pub fn live_subscriptions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|(_, _, tx)| !tx.is_closed())
            .count()
    }

    /// Services that have been subscribed to, in order.
    pub fn subscribed_services(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .map(|(service, _, _)| service.clone())
            .collect()
    }
}

fn unknown_object(target: &ObjectRef) -> Error {
    Error::remote(
        "org.freedesktop.DBus.Error.UnknownObject",
        format!("no object at {}", target.path.as_str()),
    )
}

#[async_trait]
impl Transport for MockBus {
    async fn call(
        &self,
        target: &ObjectRef,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Vec<Variant>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((method.to_string(), args.clone()));
        match state.handlers.get(method) {
            Some(handler) => handler(&args),
            None => Err(Error::remote(
                "org.freedesktop.DBus.Error.UnknownMethod",
                format!("{}.{} is not implemented", target.interface, method),
            )),
        }
    }

    async fn get_property(&self, target: &ObjectRef, name: &str) -> Result<Variant> {
        let state = self.state.lock().unwrap();
        let object = state
            .objects
            .get(&(target.path.as_str().into(), target.interface.clone()))
            .ok_or_else(|| unknown_object(target))?;
        object.get(name).cloned().ok_or_else(|| {
            Error::remote(
                "org.freedesktop.DBus.Error.InvalidArgs",
                format!("no property {}", name),
            )
        })
    }

    async fn set_property(&self, target: &ObjectRef, name: &str, value: Variant) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .get_mut(&(target.path.as_str().into(), target.interface.clone()))
            .ok_or_else(|| unknown_object(target))?;
        if let Some(current) = object.get(name) {
            if current.signature() != value.signature() {
                return Err(Error::remote(
                    "org.bluez.Error.InvalidArguments",
                    format!("{} expects '{}'", name, current.signature()),
                ));
            }
        }
        object.insert(name.to_string(), value);
        Ok(())
    }

    async fn get_all_properties(&self, target: &ObjectRef) -> Result<PropMap> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(target.path.as_str().into(), target.interface.clone()))
            .cloned()
            .ok_or_else(|| unknown_object(target))
    }

    async fn subscribe(&self, service: &str, rule: &SignalMatch) -> Result<SignalStream> {
        let (tx, rx) = mpsc::unbounded();
        self.state
            .lock()
            .unwrap()
            .subscribers
            .push((service.to_string(), rule.clone(), tx));
        Ok(rx.boxed())
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        thread::spawn(move || pollster::block_on(task));
    }
}

pub fn path(s: &str) -> OwnedObjectPath {
    OwnedObjectPath::try_from(s).unwrap()
}

pub fn props(entries: &[(&str, Variant)]) -> PropMap {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn properties_changed(
    object: &str,
    interface: &str,
    changed: &[(&str, Variant)],
    invalidated: &[&str],
) -> SignalEnvelope {
    SignalEnvelope {
        path: path(object),
        interface: PROPERTIES_INTERFACE.into(),
        member: PROPERTIES_CHANGED.into(),
        body: vec![
            Variant::from(interface),
            Variant::Dict(
                changed
                    .iter()
                    .map(|(name, value)| (Variant::from(*name), value.clone()))
                    .collect(),
            ),
            Variant::from(
                invalidated
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            ),
        ],
    }
}

/// The device of the end-to-end scenarios.
pub fn device_properties() -> PropMap {
    props(&[
        ("Address", Variant::from("AA:BB:CC:DD:EE:FF")),
        ("Connected", Variant::Bool(false)),
        ("RSSI", Variant::I16(-67)),
        ("Paired", Variant::Bool(true)),
        (
            "UUIDs",
            Variant::from(vec!["0000110b-0000-1000-8000-00805f9b34fb".to_string()]),
        ),
    ])
}

pub fn device_bus() -> MockBus {
    let bus = MockBus::new();
    bus.insert_object(DEVICE_PATH, DEVICE_INTERFACE, device_properties());
    bus
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(5));
    }
}
