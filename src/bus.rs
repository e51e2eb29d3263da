//! [`Transport`] implementation on top of a zbus [`Connection`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures_util::{future::BoxFuture, StreamExt};
use zbus::{
    zvariant::{
        Array, Dict, OwnedObjectPath, OwnedValue, Signature, Structure, StructureBuilder, Value,
    },
    Connection, MatchRule, Message, MessageStream, MessageType,
};

use crate::{
    transport::{ObjectRef, SignalEnvelope, SignalMatch, SignalStream, Transport, PROPERTIES_INTERFACE},
    variant::{PropMap, Variant},
    Error, Result,
};

/// Which message bus to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    /// The system bus, where `bluetoothd` lives.
    #[default]
    System,
    /// The per-user session bus, where `obexd` is usually started.
    Session,
}

/// A [`Transport`] speaking D-Bus through zbus.
///
/// Dictionaries arrive as hash maps, so the entries of a received `a{..}` value (including the
/// changed properties of a `PropertiesChanged` signal) are ordered by key, not by their position
/// on the wire.
#[derive(Clone)]
pub struct ZbusTransport {
    conn: Connection,
}

impl ZbusTransport {
    /// Opens a new connection to the given bus.
    pub async fn open(kind: BusKind) -> Result<Self> {
        let conn = match kind {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .map_err(Error::from)?;
        log::debug!("connected to {:?} bus ({})", kind, conn.server_guid());
        Ok(Self { conn })
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn invoke<B>(
        &self,
        target: &ObjectRef,
        interface: &str,
        method: &str,
        body: &B,
    ) -> Result<std::sync::Arc<Message>>
    where
        B: serde::ser::Serialize + zbus::zvariant::DynamicType,
    {
        self.conn
            .call_method(
                Some(target.service.as_str()),
                target.path.as_str(),
                Some(interface),
                method,
                body,
            )
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl Transport for ZbusTransport {
    async fn call(
        &self,
        target: &ObjectRef,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Vec<Variant>> {
        log::trace!("{}: {}.{} {:?}", target.path.as_str(), target.interface, method, args);
        let args = args.into_iter().map(to_value).collect::<Result<Vec<_>>>()?;
        let reply = if args.is_empty() {
            self.invoke(target, &target.interface, method, &()).await?
        } else {
            let body = args
                .into_iter()
                .fold(StructureBuilder::new(), |body, arg| body.append_field(arg))
                .build();
            self.invoke(target, &target.interface, method, &body).await?
        };
        let result = body_fields(&reply);
        log::trace!(
            "{}: {}.{} (...) -> {:?}",
            target.path.as_str(),
            target.interface,
            method,
            result
        );
        result
    }

    async fn get_property(&self, target: &ObjectRef, name: &str) -> Result<Variant> {
        let reply = self
            .invoke(
                target,
                PROPERTIES_INTERFACE,
                "Get",
                &(target.interface.as_str(), name),
            )
            .await?;
        let value: OwnedValue = reply.body().map_err(Error::from)?;
        let value = from_value(&value)?;
        log::trace!("{}: {}.{} = {:?}", target.path.as_str(), target.interface, name, value);
        Ok(value)
    }

    async fn set_property(&self, target: &ObjectRef, name: &str, value: Variant) -> Result<()> {
        log::trace!("{}: {}.{} := {:?}", target.path.as_str(), target.interface, name, value);
        let value = to_value(value)?;
        self.invoke(
            target,
            PROPERTIES_INTERFACE,
            "Set",
            &(target.interface.as_str(), name, value),
        )
        .await?;
        Ok(())
    }

    async fn get_all_properties(&self, target: &ObjectRef) -> Result<PropMap> {
        let reply = self
            .invoke(
                target,
                PROPERTIES_INTERFACE,
                "GetAll",
                &(target.interface.as_str(),),
            )
            .await?;
        let values: HashMap<String, OwnedValue> = reply.body().map_err(Error::from)?;
        values
            .iter()
            .map(|(name, value)| Ok((name.clone(), from_value(value)?)))
            .collect()
    }

    /// Adds a match rule for `rule` on the connection.
    ///
    /// `service` is only used for logging. The rule has no sender, because signals carry the
    /// daemon's unique name rather than the well-known one, so matching signals from any sender
    /// on the path are delivered.
    async fn subscribe(&self, service: &str, rule: &SignalMatch) -> Result<SignalStream> {
        let mut builder = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .interface(rule.interface.as_str())
            .map_err(Error::from)?;
        if let Some(path) = &rule.path {
            builder = builder.path(path.as_str()).map_err(Error::from)?;
        }
        if let Some(member) = &rule.member {
            builder = builder.member(member.as_str()).map_err(Error::from)?;
        }
        let match_rule = builder.build();
        log::debug!("subscribing to signals of {}: {:?}", service, match_rule);

        let stream = MessageStream::for_match_rule(match_rule, &self.conn, None)
            .await
            .map_err(Error::from)?;
        let stream = stream.filter_map(|message| async move {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("error on signal stream: {}", e);
                    return None;
                }
            };
            match envelope(&message) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    log::warn!("dropping undecodable signal: {}", e);
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.conn.executor().spawn(task, "bluez-mirror task").detach();
    }
}

fn envelope(message: &Message) -> Result<SignalEnvelope> {
    let path = message
        .path()
        .ok_or_else(|| Error::transport("signal without object path"))?;
    let interface = message
        .interface()
        .ok_or_else(|| Error::transport("signal without interface"))?;
    let member = message
        .member()
        .ok_or_else(|| Error::transport("signal without member"))?;
    Ok(SignalEnvelope {
        path: OwnedObjectPath::from(path),
        interface: interface.as_str().to_string(),
        member: member.as_str().to_string(),
        body: body_fields(message)?,
    })
}

fn body_fields(message: &Message) -> Result<Vec<Variant>> {
    let empty = message
        .body_signature()
        .map_or(true, |signature| signature.as_str().is_empty());
    if empty {
        return Ok(Vec::new());
    }
    let body: Structure<'_> = message.body().map_err(Error::from)?;
    body.fields().iter().map(from_value).collect()
}

macro_rules! dict_entries {
    ($dict:expr, $key:ty) => {{
        let map = HashMap::<$key, Value<'_>>::try_from($dict.clone())
            .map_err(|e| Error::from(zbus::Error::from(e)))?;
        let sorted: BTreeMap<$key, Value<'_>> = map.into_iter().collect();
        sorted
            .into_iter()
            .map(|(k, v)| Ok((Variant::from(k), from_value(&v)?)))
            .collect::<Result<Vec<_>>>()?
    }};
}

/// Converts a zvariant value into a [`Variant`], unwrapping nested variants.
fn from_value(value: &Value<'_>) -> Result<Variant> {
    Ok(match value {
        Value::Bool(v) => Variant::Bool(*v),
        Value::U8(v) => Variant::Byte(*v),
        Value::I16(v) => Variant::I16(*v),
        Value::U16(v) => Variant::U16(*v),
        Value::I32(v) => Variant::I32(*v),
        Value::U32(v) => Variant::U32(*v),
        Value::I64(v) => Variant::I64(*v),
        Value::U64(v) => Variant::U64(*v),
        Value::F64(v) => Variant::Double(*v),
        Value::Str(v) => Variant::Str(v.as_str().to_string()),
        Value::Signature(v) => Variant::Str(v.as_str().to_string()),
        Value::ObjectPath(v) => Variant::ObjectPath(OwnedObjectPath::from(v.clone())),
        Value::Value(inner) => from_value(inner)?,
        Value::Array(array) if array.get().is_empty() => {
            Variant::EmptyCollection(value.value_signature().as_str().to_string())
        }
        Value::Array(array) => {
            Variant::Array(array.get().iter().map(from_value).collect::<Result<_>>()?)
        }
        Value::Dict(dict) => {
            let signature = value.value_signature();
            // `a{` followed by the key type.
            let entries = match signature.as_str().as_bytes().get(2) {
                Some(b's') => dict_entries!(dict, String),
                Some(b'y') => dict_entries!(dict, u8),
                Some(b'n') => dict_entries!(dict, i16),
                Some(b'q') => dict_entries!(dict, u16),
                Some(b'i') => dict_entries!(dict, i32),
                Some(b'u') => dict_entries!(dict, u32),
                _ => {
                    return Err(Error::transport(format!(
                        "unsupported dictionary type '{}'",
                        signature.as_str()
                    )))
                }
            };
            if entries.is_empty() {
                Variant::EmptyCollection(signature.as_str().to_string())
            } else {
                Variant::Dict(entries)
            }
        }
        Value::Structure(structure) => Variant::Struct(
            structure
                .fields()
                .iter()
                .map(from_value)
                .collect::<Result<_>>()?,
        ),
        other => {
            return Err(Error::transport(format!(
                "unsupported value type '{}'",
                other.value_signature().as_str()
            )))
        }
    })
}

/// Converts a [`Variant`] into a zvariant value for marshalling.
///
/// Dictionary values are always sent as variants (`a{?v}`). Untyped empty arrays are sent as
/// `av`; an [`Variant::EmptyCollection`] keeps its own signature.
fn to_value(value: Variant) -> Result<Value<'static>> {
    Ok(match value {
        Variant::Bool(v) => Value::Bool(v),
        Variant::Byte(v) => Value::U8(v),
        Variant::I16(v) => Value::I16(v),
        Variant::U16(v) => Value::U16(v),
        Variant::I32(v) => Value::I32(v),
        Variant::U32(v) => Value::U32(v),
        Variant::I64(v) => Value::I64(v),
        Variant::U64(v) => Value::U64(v),
        Variant::Double(v) => Value::F64(v),
        Variant::Str(v) => Value::from(v),
        Variant::ObjectPath(v) => Value::ObjectPath(v.into_inner()),
        Variant::Array(items) => {
            let items = items.into_iter().map(to_value).collect::<Result<Vec<_>>>()?;
            let signature = match items.first() {
                Some(first) => first.value_signature().to_owned(),
                None => Signature::from_static_str_unchecked("v"),
            };
            let mut array = Array::new(signature);
            for item in items {
                array
                    .append(item)
                    .map_err(|e| Error::from(zbus::Error::from(e)))?;
            }
            Value::Array(array)
        }
        Variant::Dict(entries) => {
            let entries = entries
                .into_iter()
                .map(|(k, v)| Ok((to_value(k)?, Value::Value(Box::new(to_value(v)?)))))
                .collect::<Result<Vec<_>>>()?;
            let key_signature = match entries.first() {
                Some((key, _)) => key.value_signature().to_owned(),
                None => Signature::from_static_str_unchecked("s"),
            };
            let mut dict = Dict::new(key_signature, Signature::from_static_str_unchecked("v"));
            for (key, value) in entries {
                dict.append(key, value)
                    .map_err(|e| Error::from(zbus::Error::from(e)))?;
            }
            Value::Dict(dict)
        }
        Variant::Struct(fields) => {
            if fields.is_empty() {
                return Err(Error::transport("cannot marshal an empty structure"));
            }
            let builder = fields
                .into_iter()
                .map(to_value)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .fold(StructureBuilder::new(), |builder, field| builder.append_field(field));
            Value::Structure(builder.build())
        }
        Variant::EmptyCollection(signature) => empty_collection(&signature)?,
    })
}

fn empty_collection(signature: &str) -> Result<Value<'static>> {
    let invalid = || Error::transport(format!("invalid collection signature '{}'", signature));
    let parse = |s: &str| {
        if s.is_empty() {
            return Err(invalid());
        }
        Signature::try_from(s.to_string()).map_err(|e| Error::from(zbus::Error::from(e)))
    };
    if let Some(entry) = signature
        .strip_prefix("a{")
        .and_then(|entry| entry.strip_suffix('}'))
    {
        let key = entry.get(..1).ok_or_else(invalid)?;
        let value = entry.get(1..).ok_or_else(invalid)?;
        return Ok(Value::Dict(Dict::new(parse(key)?, parse(value)?)));
    }
    match signature.strip_prefix('a') {
        Some(element) => Ok(Value::Array(Array::new(parse(element)?))),
        None => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::phonebook::Filters;

    fn marshalled(value: impl Into<Variant>) -> String {
        to_value(value.into())
            .unwrap()
            .value_signature()
            .as_str()
            .to_string()
    }

    #[test]
    fn empty_collections_keep_declared_type() {
        assert_eq!(marshalled(Vec::<String>::new()), "as");
        assert_eq!(marshalled(Vec::<u8>::new()), "ay");
        assert_eq!(marshalled(BTreeMap::<u16, Variant>::new()), "a{qv}");
        assert_eq!(marshalled(BTreeMap::<String, Variant>::new()), "a{sv}");
        assert_eq!(marshalled(Variant::Array(Vec::new())), "av");
        to_value(Variant::EmptyCollection("q".into())).unwrap_err();
        to_value(Variant::EmptyCollection("a{}".into())).unwrap_err();
    }

    #[test]
    fn empty_filter_fields_are_a_string_list() {
        let filters = Filters::new().fields(Vec::<String>::new());
        let value = to_value(filters.to_variant()).unwrap();
        let Value::Dict(dict) = value else {
            panic!("filters are not a dictionary");
        };
        assert_eq!(dict.full_signature().as_str(), "a{sv}");
        let entries = HashMap::<String, Value<'_>>::try_from(dict).unwrap();
        assert_eq!(entries["Fields"].value_signature().as_str(), "as");
    }

    #[test]
    fn received_dictionaries_are_ordered_by_key() {
        let mut changed = HashMap::new();
        changed.insert("RSSI".to_string(), Value::from(-40i16));
        changed.insert("Connected".to_string(), Value::from(true));
        changed.insert("Alias".to_string(), Value::from("phone"));
        assert_eq!(
            from_value(&Value::from(changed)).unwrap(),
            Variant::Dict(vec![
                (Variant::from("Alias"), Variant::from("phone")),
                (Variant::from("Connected"), Variant::Bool(true)),
                (Variant::from("RSSI"), Variant::I16(-40)),
            ])
        );
    }

    #[test]
    fn received_empty_collections_are_typed() {
        let uuids = from_value(&Value::from(Vec::<String>::new())).unwrap();
        assert_eq!(uuids, Variant::EmptyCollection("as".into()));
        assert_eq!(uuids.get::<Vec<String>>(), Some(Vec::new()));

        let bytes = from_value(&Value::from(vec![1u8, 2])).unwrap();
        assert_eq!(bytes, Variant::from(vec![1u8, 2]));
    }
}
