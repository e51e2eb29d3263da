/// Generates a mirrored property record and a typed binding for one remote interface.
///
/// ```ignore
/// define_interface! {
///     /// Properties of `org.example.Thing1`.
///     pub struct ThingProperties;
///
///     /// A bound `org.example.Thing1` object.
///     pub struct Thing;
///
///     service = "org.example";
///     interface = "org.example.Thing1";
///
///     properties {
///         /// Wire name on the left, field and accessors on the right.
///         Name: String => name, set_name;
///         Parent: OwnedObjectPath = root_path() => parent, set_parent;
///     }
/// }
/// ```
///
/// For every property this produces a record field, a remote getter (fetching the current value
/// through `Get` and downcasting it to the declared type) and a remote setter. Setters do not touch
/// the mirror; it is updated by the property change signal the remote emits in response.
///
/// Property changes are dispatched by name to a typed downcast, so no runtime reflection is
/// involved and unknown names fall through.
macro_rules! define_interface {
    (@default) => {
        ::core::default::Default::default()
    };
    (@default $default:expr) => {
        $default
    };
    (
        $(#[$record_meta:meta])*
        pub struct $record:ident;

        $(#[$binding_meta:meta])*
        pub struct $binding:ident;

        service = $service:literal;
        interface = $interface:literal;

        properties {
            $(
                $(#[$prop_meta:meta])*
                $prop:ident : $ty:ty $(= $default:expr)? => $field:ident, $setter:ident;
            )*
        }
    ) => {
        $(#[$record_meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $record {
            $(
                $(#[$prop_meta])*
                pub $field: $ty,
            )*
        }

        impl ::core::default::Default for $record {
            fn default() -> Self {
                Self {
                    $( $field: define_interface!(@default $($default)?), )*
                }
            }
        }

        impl $crate::mirror::Properties for $record {
            const INTERFACE: &'static str = $interface;
            const NAMES: &'static [&'static str] = &[$(stringify!($prop)),*];

            fn from_variant_map(map: &$crate::variant::PropMap) -> $crate::Result<Self> {
                let mut record = Self::default();
                $(
                    if let Some(value) = map.get(stringify!($prop)) {
                        record.$field = $crate::variant::decode(stringify!($prop), value)?;
                    }
                )*
                Ok(record)
            }

            fn apply_change(
                &mut self,
                name: &str,
                value: &$crate::variant::Variant,
            ) -> $crate::Result<bool> {
                match name {
                    $(
                        stringify!($prop) => {
                            self.$field = $crate::variant::decode(name, value)?;
                            Ok(true)
                        }
                    )*
                    _ => Ok(false),
                }
            }

            fn to_map(&self) -> $crate::variant::PropMap {
                let mut map = $crate::variant::PropMap::new();
                $(
                    map.insert(
                        stringify!($prop).to_string(),
                        $crate::variant::Variant::from(self.$field.clone()),
                    );
                )*
                map
            }
        }

        $(#[$binding_meta])*
        pub struct $binding {
            binding: $crate::binding::InterfaceBinding<$record>,
        }

        impl $binding {
            /// The well-known name of the service exposing this interface.
            pub const SERVICE: &'static str = $service;
            pub const INTERFACE: &'static str = $interface;

            /// Binds to the object at `path` and fetches its properties.
            ///
            /// # Errors
            ///
            /// Fails if the properties cannot be fetched, or if any of them does not have its
            /// declared type.
            pub async fn new(
                session: &$crate::Session,
                path: ::zbus::zvariant::OwnedObjectPath,
            ) -> $crate::Result<Self> {
                let target = $crate::transport::ObjectRef::new($service, path, $interface);
                let binding =
                    $crate::binding::InterfaceBinding::new(session.transport().clone(), target)
                        .await?;
                Ok(Self { binding })
            }

            pub fn from_binding(binding: $crate::binding::InterfaceBinding<$record>) -> Self {
                Self { binding }
            }

            pub fn into_binding(self) -> $crate::binding::InterfaceBinding<$record> {
                self.binding
            }

            $(
                $(#[$prop_meta])*
                ///
                /// This queries the remote object; the mirrored value is available through
                /// `properties()`.
                pub async fn $field(&self) -> $crate::Result<$ty> {
                    self.binding.get_property_as(stringify!($prop)).await
                }

                #[doc = concat!("Sets the remote `", stringify!($prop), "` property.")]
                pub async fn $setter(&self, value: $ty) -> $crate::Result<()> {
                    self.binding.set_property(stringify!($prop), value).await
                }
            )*
        }

        impl ::core::ops::Deref for $binding {
            type Target = $crate::binding::InterfaceBinding<$record>;

            fn deref(&self) -> &Self::Target {
                &self.binding
            }
        }

        impl ::core::fmt::Debug for $binding {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(stringify!($binding))
                    .field("path", &self.binding.path().as_str())
                    .finish()
            }
        }
    };
}
