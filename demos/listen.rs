//! Example: Print every event line a panel reports.
//!
//! Usage: `cargo run --example listen -- [PTR1|PTR3|SIMULATE] [serial-port]`

use paradox_ptr::{DeviceConfig, DeviceRegistry, PanelEvent, PtrType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let ptr_type: PtrType = args.next().as_deref().unwrap_or("SIMULATE").parse()?;
    let serial_port = args.next().unwrap_or_else(|| "/dev/ttyS0".to_string());

    let config = DeviceConfig::builder()
        .id("panel")
        .ptr_type(ptr_type)
        .serial_port(serial_port)
        .build();

    let mut registry = DeviceRegistry::new();
    let mut events = registry.subscribe();
    registry.add(config).await;

    println!("Listening ({ptr_type}), Ctrl-C to stop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let event = event?;
                let device = event.device().to_string();
                match event {
                    PanelEvent::Connected { .. } => println!("[{device}] connected"),
                    PanelEvent::Disconnected { .. } => println!("[{device}] disconnected"),
                    PanelEvent::Frame { line, .. } => println!("[{device}] {}", line.trim_end()),
                    PanelEvent::Parsed { event, .. } => {
                        println!(
                            "[{device}]   {} {} partition {} {:?} {:?}",
                            event.date, event.time, event.partition, event.action, event.subject
                        );
                        for (name, value) in event.values() {
                            println!("[{device}]     {name} = {value}");
                        }
                    }
                }
            }
        }
    }

    registry.shutdown_all().await;
    Ok(())
}
