//! Prints a device's properties and follows its changes until it disconnects.
//!
//! Usage: `watch_device AA:BB:CC:DD:EE:FF [hci0]`

use std::{env, process};

use bluez_mirror::{address::Address, Device, Session};
use futures_util::StreamExt;

#[pollster::main]
async fn main() -> bluez_mirror::Result<()> {
    env_logger::builder()
        .filter_module("bluez_mirror", log::LevelFilter::Debug)
        .init();

    let mut args = env::args().skip(1);
    let address: Address = match args.next().map(|s| s.parse()) {
        Some(Ok(address)) => address,
        _ => {
            eprintln!("usage: watch_device <address> [adapter]");
            process::exit(1);
        }
    };
    let adapter = args.next().unwrap_or_else(|| "hci0".to_string());

    let session = Session::new().await?;
    let device = Device::open(&session, &adapter, address).await?;
    {
        let props = device.properties();
        println!(
            "{} ({}): {:?}, connected: {}, paired: {}",
            props.address, props.address_type, props.alias, props.connected, props.paired,
        );
    }
    println!("services: {:?}", device.service_uuids()?);

    let mut changes = device.watch().await?;
    while let Some(change) = changes.next().await {
        println!("{} = {:?}", change.name, change.value);
        if change.name == "Connected" && !device.properties().connected {
            println!("device disconnected, exiting");
            break;
        }
    }

    changes.unwatch();
    device.close();
    Ok(())
}
