use std::env;

use airzone_local::{Airzone, AirzoneConfig, Availability, ClimateEntity};

#[tokio::main]
async fn main() -> airzone_local::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let usage = "usage: monitor <ip> <zones> [--master <id>] [--interval <secs>]";
    let (Some(ip), Some(zones)) = (args.get(1), args.get(2).and_then(|z| z.parse::<u8>().ok())) else {
        eprintln!("{usage}");
        std::process::exit(2);
    };
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .and_then(|v| v.parse::<u64>().ok())
    };
    let master = flag("--master").unwrap_or(1) as u8;
    let interval = flag("--interval").unwrap_or(10);

    let config = AirzoneConfig::new(ip, zones, master).with_poll_interval(interval);
    let system_id = config.system_id;
    let airzone = Airzone::builder(config)
        .on_zone_update(move |_, state| {
            let zone = ClimateEntity::new(system_id, state.clone());
            println!(
                "[{}] {:?}\u{00b0}C -> {:?}\u{00b0}C | mode: {}{}",
                zone.name(),
                zone.current_temperature(),
                zone.target_temperature(),
                zone.hvac_mode(),
                if zone.is_master() { " | master" } else { "" },
            );
        })
        .on_availability(|availability| match availability {
            Availability::Available => println!("Device reachable"),
            Availability::Unavailable {
                consecutive_failures,
            } => println!("Device unreachable ({consecutive_failures} failed polls)"),
        })
        .build()?;

    println!("Polling {ip} every {interval}s, Ctrl-C to stop");
    let handle = airzone.spawn_polling();
    tokio::signal::ctrl_c().await.ok();
    airzone.stop_polling();
    handle.await.ok();
    Ok(())
}
