//! BlueZ [`Device`] access.

use std::collections::BTreeMap;

use zbus::zvariant::OwnedObjectPath;

use crate::{
    address::{Address, AddressType},
    transport::root_path,
    uuid::Uuid,
    variant::Variant,
    Error, Result, Session,
};

/// Error names the device interface is documented to return.
pub mod errors {
    pub const NOT_READY: &str = "org.bluez.Error.NotReady";
    pub const FAILED: &str = "org.bluez.Error.Failed";
    pub const IN_PROGRESS: &str = "org.bluez.Error.InProgress";
    pub const ALREADY_CONNECTED: &str = "org.bluez.Error.AlreadyConnected";
    pub const NOT_CONNECTED: &str = "org.bluez.Error.NotConnected";
    pub const INVALID_ARGUMENTS: &str = "org.bluez.Error.InvalidArguments";
    pub const NOT_AVAILABLE: &str = "org.bluez.Error.NotAvailable";
    pub const NOT_SUPPORTED: &str = "org.bluez.Error.NotSupported";
    pub const DOES_NOT_EXIST: &str = "org.bluez.Error.DoesNotExist";
}

define_interface! {
    /// Mirrored properties of a remote device.
    pub struct DeviceProperties;

    /// A remote device known to a BlueZ adapter (`org.bluez.Device1`).
    pub struct Device;

    service = "org.bluez";
    interface = "org.bluez.Device1";

    properties {
        /// External appearance of the device, as found on the GAP service.
        Appearance: u16 => appearance, set_appearance;
        /// 128-bit UUIDs of the available remote services.
        UUIDs: Vec<String> => uuids, set_uuids;
        /// Whether the remote device is currently connected.
        Connected: bool => connected, set_connected;
        /// Received Signal Strength Indicator (inquiry or advertising).
        RSSI: i16 => rssi, set_rssi;
        /// Whether service discovery has been resolved.
        ServicesResolved: bool => services_resolved, set_services_resolved;
        /// The Advertising Data Flags of the remote device.
        AdvertisingFlags: Vec<u8> => advertising_flags, set_advertising_flags;
        /// The friendly name of the device. Unlike `Name`, this can be changed.
        Alias: String => alias, set_alias;
        /// Advertising data, keyed by AD type.
        AdvertisingData: BTreeMap<String, Variant> => advertising_data, set_advertising_data;
        /// Manufacturer specific advertisement data, keyed by 16-bit manufacturer ID.
        ManufacturerData: BTreeMap<u16, Variant> => manufacturer_data, set_manufacturer_data;
        /// Service advertisement data, keyed by service UUID.
        ServiceData: BTreeMap<String, Variant> => service_data, set_service_data;
        /// The device address, as `XX:XX:XX:XX:XX:XX`.
        Address: String => address, set_address;
        /// Proposed icon name according to the freedesktop.org icon naming specification.
        Icon: String => icon, set_icon;
        /// Bluetooth class of device.
        Class: u32 => class, set_class;
        /// Whether the remote is seen as trusted.
        Trusted: bool => trusted, set_trusted;
        /// Whether incoming connections from the device are rejected.
        Blocked: bool => blocked, set_blocked;
        /// Advertised transmitted power level.
        TxPower: i16 => tx_power, set_tx_power;
        AddressType: AddressType => address_type, set_address_type;
        /// The remote name. Read-only in practice; use `Alias` to rename a device.
        Name: String => name, set_name;
        Paired: bool => paired, set_paired;
        /// Object path of the adapter the device belongs to.
        Adapter: OwnedObjectPath = root_path() => adapter, set_adapter;
        /// Whether the device only supports the pre-2.1 pairing mechanism.
        LegacyPairing: bool => legacy_pairing, set_legacy_pairing;
        /// Device ID information in modalias format.
        Modalias: String => modalias, set_modalias;
    }
}

impl Device {
    /// Returns the object path of the device with `address` on the adapter `adapter` (eg. `hci0`).
    pub fn path_for(adapter: &str, address: Address) -> Result<OwnedObjectPath> {
        let path = format!("/org/bluez/{}/{}", adapter, address.device_path_segment());
        OwnedObjectPath::try_from(path.as_str()).map_err(|e| Error::from(zbus::Error::from(e)))
    }

    /// Binds to the device with `address` on the adapter `adapter`.
    pub async fn open(session: &Session, adapter: &str, address: Address) -> Result<Self> {
        Self::new(session, Self::path_for(adapter, address)?).await
    }

    /// Parses the mirrored `Address` property.
    pub fn bd_address(&self) -> Result<Address> {
        self.properties().address.parse().map_err(Error::from)
    }

    /// Returns the mirrored `AddressType` property.
    pub fn address_kind(&self) -> AddressType {
        self.properties().address_type
    }

    /// Parses the mirrored `UUIDs` property.
    ///
    /// This list is typically truncated unless the device is connected or paired.
    pub fn service_uuids(&self) -> Result<Vec<Uuid>> {
        self.properties()
            .uuids
            .iter()
            .map(|s| s.parse().map_err(Error::from))
            .collect()
    }

    /// Connects all profiles the device supports that are flagged as auto-connectable.
    ///
    /// # Errors
    ///
    /// Remote errors include [`errors::IN_PROGRESS`] if a connection attempt is already underway
    /// and [`errors::ALREADY_CONNECTED`].
    pub async fn connect(&self) -> Result<()> {
        self.call("Connect", Vec::new()).await?;
        Ok(())
    }

    /// Gracefully disconnects all connected profiles, then terminates the link.
    pub async fn disconnect(&self) -> Result<()> {
        self.call("Disconnect", Vec::new()).await?;
        Ok(())
    }

    /// Connects a specific profile of the device.
    pub async fn connect_profile(&self, uuid: Uuid) -> Result<()> {
        self.call("ConnectProfile", vec![uuid.into()]).await?;
        Ok(())
    }

    pub async fn disconnect_profile(&self, uuid: Uuid) -> Result<()> {
        self.call("DisconnectProfile", vec![uuid.into()]).await?;
        Ok(())
    }

    /// Initiates pairing with the device.
    pub async fn pair(&self) -> Result<()> {
        self.call("Pair", Vec::new()).await?;
        Ok(())
    }

    /// Cancels a pairing operation started with [`Device::pair`].
    pub async fn cancel_pairing(&self) -> Result<()> {
        self.call("CancelPairing", Vec::new()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mirror::Properties, variant::PropMap};

    fn scenario_map() -> PropMap {
        let mut map = PropMap::new();
        map.insert("Address".into(), Variant::from("AA:BB:CC:DD:EE:FF"));
        map.insert("Connected".into(), Variant::Bool(false));
        map.insert("RSSI".into(), Variant::I16(-67));
        map.insert("Paired".into(), Variant::Bool(true));
        map.insert(
            "UUIDs".into(),
            Variant::from(vec!["0000110b-0000-1000-8000-00805f9b34fb".to_string()]),
        );
        map
    }

    #[test]
    fn decode_properties() {
        let props = DeviceProperties::from_variant_map(&scenario_map()).unwrap();
        assert_eq!(props.address, "AA:BB:CC:DD:EE:FF");
        assert!(!props.connected);
        assert_eq!(props.rssi, -67);
        assert!(props.paired);
        assert_eq!(props.uuids, vec!["0000110b-0000-1000-8000-00805f9b34fb"]);
        assert_eq!(props.adapter.as_str(), "/");
        assert_eq!(props.address_type, AddressType::Public);
    }

    #[test]
    fn bulk_fill_round_trip() {
        let mut map = scenario_map();
        map.insert("AddressType".into(), Variant::from("random"));
        map.insert(
            "Adapter".into(),
            Variant::ObjectPath(OwnedObjectPath::try_from("/org/bluez/hci0").unwrap()),
        );
        map.insert(
            "ManufacturerData".into(),
            Variant::Dict(vec![(
                Variant::U16(0x004c),
                Variant::from(vec![0x02u8, 0x15]),
            )]),
        );
        map.insert(
            "AdvertisingFlags".into(),
            Variant::from(vec![0x06u8]),
        );

        let mut with_extra = map.clone();
        with_extra.insert("FutureField".into(), Variant::from("x"));

        let props = DeviceProperties::from_variant_map(&with_extra).unwrap();
        let out = props.to_map();
        assert!(!out.contains_key("FutureField"));
        for (name, value) in &map {
            assert_eq!(&out[name], value, "property {}", name);
        }
        assert_eq!(out.len(), DeviceProperties::NAMES.len());
    }

    #[test]
    fn mismatched_type_names_property() {
        let mut map = scenario_map();
        map.insert("RSSI".into(), Variant::from("loud"));
        let err = DeviceProperties::from_variant_map(&map).unwrap_err();
        assert_eq!(err.decode_property(), Some("RSSI"));
    }

    #[test]
    fn apply_change_dispatches_by_name() {
        let mut props = DeviceProperties::from_variant_map(&scenario_map()).unwrap();
        assert!(props.apply_change("Connected", &Variant::Bool(true)).unwrap());
        assert!(props.connected);
        assert!(!props.apply_change("FutureField", &Variant::from("x")).unwrap());
        props.apply_change("RSSI", &Variant::U32(3)).unwrap_err();
        assert_eq!(props.rssi, -67);
    }

    #[test]
    fn device_path() {
        let addr: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let path = Device::path_for("hci0", addr).unwrap();
        assert_eq!(path.as_str(), "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF");
        assert_eq!(Address::from_device_path(path.as_str()), Some(addr));
        Device::path_for("hci 0", addr).unwrap_err();
    }
}
