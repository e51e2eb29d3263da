mod common;

use std::sync::{Arc, Mutex};

use bluez_mirror::{
    phonebook::{errors, Filters, Format, Location, Phonebook, PhonebookAccess, SearchField},
    variant::{PropMap, Variant},
    Error,
};
use common::*;
use futures_util::StreamExt;

fn phonebook_bus() -> MockBus {
    let bus = MockBus::new();
    bus.insert_object(
        SESSION_PATH,
        PHONEBOOK_INTERFACE,
        props(&[
            ("FixedImageSize", Variant::Bool(false)),
            ("Folder", Variant::from("")),
            (
                "DatabaseIdentifier",
                Variant::from("A1A2A3A4B1B2C1C2D1D2E1E2E3E4E5E6"),
            ),
            ("PrimaryCounter", Variant::from("00000000000000000000000000000001")),
            ("SecondaryCounter", Variant::from("00000000000000000000000000000002")),
        ]),
    );

    // Mimics obexd: speed dial and favorites only exist in internal memory.
    let selected = Arc::new(Mutex::new(None::<(String, String)>));
    let sizes = selected.clone();
    bus.on_call("Select", move |args| {
        let location = args[0].as_str().unwrap_or_default().to_string();
        let phonebook = args[1].as_str().unwrap_or_default().to_string();
        if location != "int" && (phonebook == "spd" || phonebook == "fav") {
            return Err(Error::remote(errors::FAILED, "Not Found"));
        }
        *selected.lock().unwrap() = Some((location, phonebook));
        Ok(Vec::new())
    });
    bus.on_call("GetSize", move |_| match &*sizes.lock().unwrap() {
        Some((_, phonebook)) if phonebook == "pb" => Ok(vec![Variant::U16(42)]),
        Some(_) => Ok(vec![Variant::U16(3)]),
        None => Err(Error::remote(errors::FORBIDDEN, "no phonebook selected")),
    });
    bus
}

async fn phonebook(bus: &MockBus) -> PhonebookAccess {
    PhonebookAccess::new(&bus.session(), path(SESSION_PATH))
        .await
        .unwrap()
}

#[pollster::test]
async fn properties_after_construction() {
    let bus = phonebook_bus();
    let pbap = phonebook(&bus).await;
    let props = pbap.properties();
    assert!(!props.fixed_image_size);
    assert_eq!(props.database_identifier, "A1A2A3A4B1B2C1C2D1D2E1E2E3E4E5E6");
    assert_eq!(props.primary_counter.len(), 32);
    assert_eq!(pbap.service(), "org.bluez.obex");
}

#[pollster::test]
async fn select_then_size() {
    let bus = phonebook_bus();
    let pbap = phonebook(&bus).await;

    pbap.get_size().await.unwrap_err();
    pbap.select(Location::Internal, Phonebook::Contacts)
        .await
        .unwrap();
    assert_eq!(pbap.get_size().await.unwrap(), 42);

    pbap.select(Location::Internal, Phonebook::SpeedDial)
        .await
        .unwrap();
    let err = pbap
        .select(Location::Sim(1), Phonebook::SpeedDial)
        .await
        .unwrap_err();
    assert_eq!(err.remote_name(), Some("org.bluez.obex.Error.Failed"));

    assert_eq!(
        bus.calls()
            .into_iter()
            .filter(|(method, _)| method == "Select")
            .map(|(_, args)| args)
            .collect::<Vec<_>>(),
        vec![
            vec![Variant::from("int"), Variant::from("pb")],
            vec![Variant::from("int"), Variant::from("spd")],
            vec![Variant::from("sim"), Variant::from("spd")],
        ]
    );
}

#[pollster::test]
async fn pull_all_returns_transfer() {
    let bus = phonebook_bus();
    bus.on_call("PullAll", |args| {
        let mut transfer = PropMap::new();
        transfer.insert("Status".into(), Variant::from("queued"));
        transfer.insert("Filename".into(), args[0].clone());
        Ok(vec![
            Variant::ObjectPath(path("/org/bluez/obex/client/session0/transfer0")),
            Variant::from(transfer),
        ])
    });
    let pbap = phonebook(&bus).await;

    let filters = Filters::new().format(Format::VCard30).max_count(100);
    let transfer = pbap.pull_all("/tmp/pb.vcf", &filters).await.unwrap();
    assert_eq!(
        transfer.path.as_str(),
        "/org/bluez/obex/client/session0/transfer0"
    );
    assert_eq!(transfer.properties["Filename"], Variant::from("/tmp/pb.vcf"));

    let (_, args) = bus.calls().pop().unwrap();
    assert_eq!(args[1], filters.to_variant());
}

#[pollster::test]
async fn pull_single_vcard() {
    let bus = phonebook_bus();
    bus.on_call("Pull", |_| Ok(Vec::new()));
    let pbap = phonebook(&bus).await;

    let transfer = pbap
        .pull("1.vcf", "/tmp/1.vcf", &Filters::new().fields(Vec::<String>::new()))
        .await
        .unwrap();
    assert_eq!(transfer, None);

    let (method, args) = bus.calls().pop().unwrap();
    assert_eq!(method, "Pull");
    assert_eq!(args[0], Variant::from("1.vcf"));
    assert_eq!(args[2].get::<PropMap>().unwrap()["Fields"].signature(), "as");

    bus.on_call("Pull", |args| {
        Ok(vec![
            Variant::ObjectPath(path("/org/bluez/obex/client/session0/transfer1")),
            Variant::from(PropMap::from([("Filename".to_string(), args[1].clone())])),
        ])
    });
    let transfer = pbap
        .pull("1.vcf", "/tmp/1.vcf", &Filters::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transfer.properties["Filename"], Variant::from("/tmp/1.vcf"));

    bus.on_call("Pull", |_| Ok(vec![Variant::Bool(true)]));
    pbap.pull("1.vcf", "", &Filters::new()).await.unwrap_err();
}

#[pollster::test]
async fn search_and_filter_fields() {
    let bus = phonebook_bus();
    bus.on_call("Search", |_| {
        Ok(vec![Variant::Array(vec![Variant::Struct(vec![
            Variant::from("1.vcf"),
            Variant::from("Jo Doe"),
        ])])])
    });
    bus.on_call("ListFilterFields", |_| {
        Ok(vec![Variant::from(vec![
            "VERSION".to_string(),
            "FN".to_string(),
            "TEL".to_string(),
        ])])
    });
    let pbap = phonebook(&bus).await;

    let hits = pbap
        .search(SearchField::Name, "Jo", &Filters::new())
        .await
        .unwrap();
    assert_eq!(hits, vec![("1.vcf".to_string(), "Jo Doe".to_string())]);
    assert_eq!(
        pbap.list_filter_fields().await.unwrap(),
        vec!["VERSION", "FN", "TEL"]
    );
}

#[pollster::test]
async fn unsupported_update_version() {
    let bus = phonebook_bus();
    bus.on_call("UpdateVersion", |_| {
        Err(Error::remote(errors::NOT_SUPPORTED, ""))
    });
    let pbap = phonebook(&bus).await;
    let err = pbap.update_version().await.unwrap_err();
    assert_eq!(err.remote_name(), Some(errors::NOT_SUPPORTED));
    assert_eq!(err.to_string(), errors::NOT_SUPPORTED);
}

#[pollster::test]
async fn folder_changes_are_mirrored() {
    let bus = phonebook_bus();
    let pbap = phonebook(&bus).await;
    let mut changes = pbap.watch().await.unwrap();

    bus.emit(properties_changed(
        SESSION_PATH,
        PHONEBOOK_INTERFACE,
        &[("Folder", Variant::from("telecom/pb"))],
        &[],
    ));
    let event = changes.next().await.unwrap();
    assert_eq!(event.interface, PHONEBOOK_INTERFACE);
    assert_eq!(event.name, "Folder");
    assert_eq!(pbap.properties().folder, "telecom/pb");
    assert_eq!(
        pbap.to_map()["Folder"],
        Variant::from("telecom/pb")
    );

    pbap.close();
    assert_eq!(changes.next().await, None);
}
