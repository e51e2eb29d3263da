//! Self-describing bus values.
//!
//! A [`Variant`] is the transport-neutral representation of a D-Bus value as it travels through
//! this library: method arguments and replies, property values, and signal bodies. Typed access
//! goes through [`FromVariant`], which performs a checked downcast into a declared Rust type.

use std::collections::BTreeMap;

use zbus::zvariant::OwnedObjectPath;

use crate::{Error, Result};

/// A bag of property values keyed by property name.
pub type PropMap = BTreeMap<String, Variant>;

/// A dynamically typed bus value.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Bool(bool),
    Byte(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    Str(String),
    ObjectPath(OwnedObjectPath),
    /// A homogeneous array. The element type is carried by the elements themselves.
    Array(Vec<Variant>),
    /// A dictionary, with entries kept in the order they were received.
    Dict(Vec<(Variant, Variant)>),
    Struct(Vec<Variant>),
    /// An empty array or dictionary of a known type, tagged with its full signature (`as`,
    /// `a{qv}`, ...).
    EmptyCollection(String),
}

impl Variant {
    /// Returns the D-Bus signature of this value.
    ///
    /// Untyped empty arrays and dictionaries cannot describe their element type and report
    /// variant elements (`av`, `a{sv}`).
    pub fn signature(&self) -> String {
        match self {
            Variant::Bool(_) => "b".into(),
            Variant::Byte(_) => "y".into(),
            Variant::I16(_) => "n".into(),
            Variant::U16(_) => "q".into(),
            Variant::I32(_) => "i".into(),
            Variant::U32(_) => "u".into(),
            Variant::I64(_) => "x".into(),
            Variant::U64(_) => "t".into(),
            Variant::Double(_) => "d".into(),
            Variant::Str(_) => "s".into(),
            Variant::ObjectPath(_) => "o".into(),
            Variant::Array(items) => match items.first() {
                Some(first) => format!("a{}", first.signature()),
                None => "av".into(),
            },
            Variant::Dict(entries) => match entries.first() {
                Some((key, _)) => format!("a{{{}v}}", key.signature()),
                None => "a{sv}".into(),
            },
            Variant::Struct(fields) => {
                let inner: String = fields.iter().map(Variant::signature).collect();
                format!("({})", inner)
            }
            Variant::EmptyCollection(signature) => signature.clone(),
        }
    }

    /// Performs a checked downcast into `T`.
    pub fn get<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Types that can be extracted from a [`Variant`] with a runtime type check.
pub trait FromVariant: Sized {
    /// The D-Bus signature of the type, used in decoding error messages.
    fn signature() -> String;

    /// Returns `None` if the value's underlying type is not assignable to `Self`.
    fn from_variant(value: &Variant) -> Option<Self>;
}

/// Decodes the value of the property `name`, producing an error naming the property on a type
/// mismatch.
pub fn decode<T: FromVariant>(name: &str, value: &Variant) -> Result<T> {
    T::from_variant(value).ok_or_else(|| Error::decode(name, T::signature(), value.signature()))
}

macro_rules! basic_variant {
    ($($ty:ty => $case:ident, $sig:literal;)*) => {
        $(
            impl FromVariant for $ty {
                fn signature() -> String {
                    $sig.into()
                }

                fn from_variant(value: &Variant) -> Option<Self> {
                    match value {
                        Variant::$case(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::$case(value)
                }
            }
        )*
    };
}

basic_variant! {
    bool => Bool, "b";
    u8 => Byte, "y";
    i16 => I16, "n";
    u16 => U16, "q";
    i32 => I32, "i";
    u32 => U32, "u";
    i64 => I64, "x";
    u64 => U64, "t";
    f64 => Double, "d";
    String => Str, "s";
    OwnedObjectPath => ObjectPath, "o";
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_string())
    }
}

impl FromVariant for Variant {
    fn signature() -> String {
        "v".into()
    }

    fn from_variant(value: &Variant) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromVariant> FromVariant for Vec<T> {
    fn signature() -> String {
        format!("a{}", T::signature())
    }

    fn from_variant(value: &Variant) -> Option<Self> {
        match value {
            Variant::Array(items) => items.iter().map(T::from_variant).collect(),
            Variant::EmptyCollection(found) if empty_accepts(&Self::signature(), found) => {
                Some(Vec::new())
            }
            _ => None,
        }
    }
}

impl<T: Into<Variant> + FromVariant> From<Vec<T>> for Variant {
    fn from(value: Vec<T>) -> Self {
        if value.is_empty() {
            return Variant::EmptyCollection(Vec::<T>::signature());
        }
        Variant::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: FromVariant + Ord, V: FromVariant> FromVariant for BTreeMap<K, V> {
    fn signature() -> String {
        format!("a{{{}{}}}", K::signature(), V::signature())
    }

    fn from_variant(value: &Variant) -> Option<Self> {
        match value {
            Variant::Dict(entries) => entries
                .iter()
                .map(|(k, v)| Some((K::from_variant(k)?, V::from_variant(v)?)))
                .collect(),
            // An empty array carries no element type, so it may well have been an empty dict.
            Variant::Array(items) if items.is_empty() => Some(BTreeMap::new()),
            Variant::EmptyCollection(found) if empty_accepts(&Self::signature(), found) => {
                Some(BTreeMap::new())
            }
            _ => None,
        }
    }
}

impl<K, V> From<BTreeMap<K, V>> for Variant
where
    K: Into<Variant> + FromVariant + Ord,
    V: Into<Variant> + FromVariant,
{
    fn from(value: BTreeMap<K, V>) -> Self {
        if value.is_empty() {
            return Variant::EmptyCollection(BTreeMap::<K, V>::signature());
        }
        Variant::Dict(
            value
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Whether an empty collection of signature `found` decodes as `expected`. A `v` element in
/// `expected` accepts any element type.
fn empty_accepts(expected: &str, found: &str) -> bool {
    if expected == found {
        return true;
    }
    match expected.strip_suffix("v}") {
        // `a{` and the key type.
        Some(key) => key.len() == 3 && found.starts_with(key),
        None => expected == "av" && found.starts_with('a') && !found.starts_with("a{"),
    }
}
