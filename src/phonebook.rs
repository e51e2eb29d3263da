//! Phonebook Access Profile client sessions of `obexd` (`org.bluez.obex.PhonebookAccess1`).
//!
//! A phonebook session is created through the OBEX client (`CreateSession` with target `pbap`),
//! which is outside the scope of this library; [`PhonebookAccess::new`] binds to the resulting
//! session object path.

use std::fmt;

use zbus::zvariant::OwnedObjectPath;

use crate::{
    variant::{self, PropMap, Variant},
    Error, Result,
};

/// Error names the phonebook interface is documented to return.
pub mod errors {
    pub const INVALID_ARGUMENTS: &str = "org.bluez.obex.Error.InvalidArguments";
    pub const FORBIDDEN: &str = "org.bluez.obex.Error.Forbidden";
    pub const FAILED: &str = "org.bluez.obex.Error.Failed";
    pub const NOT_SUPPORTED: &str = "org.bluez.obex.Error.NotSupported";
}

define_interface! {
    /// Mirrored properties of a phonebook session.
    pub struct PhonebookProperties;

    /// A PBAP client session.
    pub struct PhonebookAccess;

    service = "org.bluez.obex";
    interface = "org.bluez.obex.PhonebookAccess1";

    properties {
        /// Whether images are JPEG 300x300 pixels.
        FixedImageSize: bool => fixed_image_size, set_fixed_image_size;
        /// The currently selected folder.
        Folder: String => folder, set_folder;
        /// 128-bit persistent database identifier, as 32 hex characters.
        DatabaseIdentifier: String => database_identifier, set_database_identifier;
        /// 128-bit primary version counter, as 32 hex characters.
        PrimaryCounter: String => primary_counter, set_primary_counter;
        /// 128-bit secondary version counter, as 32 hex characters.
        SecondaryCounter: String => secondary_counter, set_secondary_counter;
    }
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $s:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $s, )*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for Variant {
            fn from(value: $name) -> Self {
                Variant::from(value.as_str())
            }
        }
    };
}

/// Where the phonebook objects are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Phone memory.
    Internal,
    /// SIM card number `n`, starting at 1.
    Sim(u8),
}

impl Location {
    fn name(&self) -> String {
        match self {
            Self::Internal => "int".into(),
            Self::Sim(1) => "sim".into(),
            Self::Sim(n) => format!("sim{}", n),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

string_enum! {
    /// A phonebook object within a [`Location`].
    pub enum Phonebook {
        Contacts => "pb",
        IncomingCalls => "ich",
        OutgoingCalls => "och",
        MissedCalls => "mch",
        /// Combined call history.
        CombinedCalls => "cch",
        /// Speed dial. Only available in [`Location::Internal`].
        SpeedDial => "spd",
        /// Favorites. Only available in [`Location::Internal`].
        Favorites => "fav",
    }
}

string_enum! {
    /// The vCard field searched by [`PhonebookAccess::search`].
    pub enum SearchField {
        Name => "name",
        Number => "number",
        Sound => "sound",
    }
}

string_enum! {
    pub enum Format {
        VCard21 => "vcard21",
        VCard30 => "vcard30",
    }
}

string_enum! {
    /// Order of listed items.
    pub enum Order {
        Indexed => "indexed",
        Alphanumeric => "alphanumeric",
        Phonetic => "phonetic",
    }
}

/// Restricts listed items to those having certain vCard fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilter {
    /// Items must have all of the fields.
    All(Vec<String>),
    /// Items must have at least one of the fields.
    Any(Vec<String>),
}

/// Options of phonebook transfers and listings.
///
/// Unset options are left to the server's defaults: vCard 2.1, indexed order, offset 0, no
/// item limit, all fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    format: Option<Format>,
    order: Option<Order>,
    offset: Option<u16>,
    max_count: Option<u16>,
    fields: Option<Vec<String>>,
    field_filter: Option<FieldFilter>,
    reset_new_missed_calls: Option<bool>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Index of the first item to return.
    pub fn offset(mut self, offset: u16) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn max_count(mut self, max_count: u16) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Selects the vCard fields to transfer. Valid names are returned by
    /// [`PhonebookAccess::list_filter_fields`].
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn field_filter(mut self, filter: FieldFilter) -> Self {
        self.field_filter = Some(filter);
        self
    }

    /// Resets the new missed calls counter. Only meaningful for [`Phonebook::MissedCalls`] and
    /// [`Phonebook::CombinedCalls`].
    pub fn reset_new_missed_calls(mut self, reset: bool) -> Self {
        self.reset_new_missed_calls = Some(reset);
        self
    }

    /// Encodes the filters as the `a{sv}` argument of the phonebook methods.
    pub fn to_variant(&self) -> Variant {
        let mut entries = Vec::new();
        let mut put = |key: &str, value: Variant| entries.push((Variant::from(key), value));
        if let Some(format) = self.format {
            put("Format", format.into());
        }
        if let Some(order) = self.order {
            put("Order", order.into());
        }
        if let Some(offset) = self.offset {
            put("Offset", offset.into());
        }
        if let Some(max_count) = self.max_count {
            put("MaxCount", max_count.into());
        }
        if let Some(fields) = &self.fields {
            put("Fields", fields.clone().into());
        }
        match &self.field_filter {
            Some(FieldFilter::All(fields)) => put("FilterAll", fields.clone().into()),
            Some(FieldFilter::Any(fields)) => put("FilterAny", fields.clone().into()),
            None => {}
        }
        if let Some(reset) = self.reset_new_missed_calls {
            put("ResetNewMissedCalls", reset.into());
        }
        Variant::Dict(entries)
    }
}

/// A transfer started by [`PhonebookAccess::pull_all`] or [`PhonebookAccess::pull`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    /// Object path of the `org.bluez.obex.Transfer1` object tracking the transfer.
    pub path: OwnedObjectPath,
    /// Initial properties of the transfer object.
    pub properties: PropMap,
}

impl Transfer {
    fn from_reply(method: &str, reply: Vec<Variant>) -> Result<Self> {
        match reply.as_slice() {
            [path, properties] => Ok(Self {
                path: variant::decode(method, path)?,
                properties: variant::decode(method, properties)?,
            }),
            _ => Err(unexpected_reply(method, &reply)),
        }
    }
}

fn unexpected_reply(method: &str, reply: &[Variant]) -> Error {
    Error::from(format!("unexpected reply to {}: {:?}", method, reply))
}

impl PhonebookAccess {
    /// Selects the phonebook object for the other operations.
    ///
    /// # Errors
    ///
    /// Fails with [`errors::INVALID_ARGUMENTS`] or [`errors::FAILED`] if the phonebook does not
    /// exist at that location.
    pub async fn select(&self, location: Location, phonebook: Phonebook) -> Result<()> {
        self.call(
            "Select",
            vec![location.name().into(), phonebook.into()],
        )
        .await?;
        Ok(())
    }

    /// Transfers the whole selected phonebook into `target_file` as vCards.
    ///
    /// If `target_file` is empty, `obexd` picks a temporary file. Applicable filters are format,
    /// order, offset, max count and fields.
    pub async fn pull_all(&self, target_file: &str, filters: &Filters) -> Result<Transfer> {
        let reply = self
            .call("PullAll", vec![target_file.into(), filters.to_variant()])
            .await?;
        Transfer::from_reply("PullAll", reply)
    }

    /// Transfers a single vCard, identified by its handle, into `target_file`.
    ///
    /// Returns the transfer if the remote reports one; a remote may also answer with an empty
    /// reply, in which case `None` is returned.
    pub async fn pull(
        &self,
        vcard: &str,
        target_file: &str,
        filters: &Filters,
    ) -> Result<Option<Transfer>> {
        let reply = self
            .call(
                "Pull",
                vec![vcard.into(), target_file.into(), filters.to_variant()],
            )
            .await?;
        if reply.is_empty() {
            return Ok(None);
        }
        Transfer::from_reply("Pull", reply).map(Some)
    }

    /// Searches the selected phonebook and returns `(handle, name)` pairs of the matching vCards.
    pub async fn search(
        &self,
        field: SearchField,
        value: &str,
        filters: &Filters,
    ) -> Result<Vec<(String, String)>> {
        let reply = self
            .call(
                "Search",
                vec![field.into(), value.into(), filters.to_variant()],
            )
            .await?;
        let listing = match reply.first() {
            Some(listing) => listing,
            None => return Ok(Vec::new()),
        };
        let entries: Vec<Variant> = variant::decode("Search", listing)?;
        entries
            .iter()
            .map(|entry| match entry {
                Variant::Struct(fields) => match fields.as_slice() {
                    [handle, name] => Ok((
                        variant::decode("Search", handle)?,
                        variant::decode("Search", name)?,
                    )),
                    _ => Err(unexpected_reply("Search", &reply)),
                },
                _ => Err(unexpected_reply("Search", &reply)),
            })
            .collect()
    }

    /// Returns the number of used entries in the selected phonebook.
    pub async fn get_size(&self) -> Result<u16> {
        let reply = self.call("GetSize", Vec::new()).await?;
        match reply.first() {
            Some(size) => variant::decode("GetSize", size),
            None => Err(unexpected_reply("GetSize", &reply)),
        }
    }

    /// Asks the server to update `PrimaryCounter` and `SecondaryCounter`.
    pub async fn update_version(&self) -> Result<()> {
        self.call("UpdateVersion", Vec::new()).await?;
        Ok(())
    }

    /// Lists the vCard field names usable in [`Filters::fields`] and [`FieldFilter`].
    pub async fn list_filter_fields(&self) -> Result<Vec<String>> {
        let reply = self.call("ListFilterFields", Vec::new()).await?;
        match reply.first() {
            Some(fields) => variant::decode("ListFilterFields", fields),
            None => Err(unexpected_reply("ListFilterFields", &reply)),
        }
    }
}
