//! Example: Query zone and area status through a PTR3 module.
//!
//! Usage: `cargo run --example query_zones -- <serial-port> [zones]`

use paradox_ptr::{spawn_device, event_channel, CommandType, DeviceConfig, PanelError, PtrType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let serial_port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let zones: u32 = args.next().map(|n| n.parse::<u32>()).transpose()?.unwrap_or(8);

    let config = DeviceConfig::builder()
        .id("panel")
        .ptr_type(PtrType::Ptr3)
        .serial_port(serial_port)
        .command_timeout_ms(5000)
        .build();

    let (event_tx, _events) = event_channel(64);
    let device = spawn_device(config, event_tx);

    // Power and error state
    println!("Power state: {}", device.poll(CommandType::PowerState).await?);
    println!("Module error: {}", device.poll(CommandType::ErrorMessage).await?);

    println!("\n--- Area 1 ---");
    println!("  status={}", device.poll(CommandType::AreaStatus(1)).await?);

    println!("\n--- Zones (1..={zones}) ---");
    for zone in 1..=zones {
        match device.poll(CommandType::ZoneStatus(zone)).await {
            Ok(value) => println!("  Zone {zone:3}: {value}"),
            Err(e @ PanelError::Timeout { .. }) => println!("  Zone {zone:3}: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    device.shutdown().await;
    Ok(())
}
