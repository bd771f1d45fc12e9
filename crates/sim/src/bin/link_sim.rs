//! link simulation for motelink

use anyhow::Result;
use colored::Colorize;
use motelink_sim::{scenarios, SimulationPresets};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "motelink Link Simulation".bright_blue().bold());
    println!("{}", "========================".bright_blue());
    println!();

    let test_conditions = vec![
        ("Good Conditions", SimulationPresets::good_conditions()),
        ("Average Conditions", SimulationPresets::average_conditions()),
        ("Poor Conditions", SimulationPresets::poor_conditions()),
    ];

    for (name, config) in test_conditions {
        println!("{}", format!("\n>>> Testing: {}", name).bright_green().bold());
        println!("Packet loss: {}%", (config.packet_loss * 100.0) as u32);
        println!("RSSI around: {} dBm", config.rssi_dbm);
        println!();

        scenarios::discovery_pair(config.clone()).await;
        println!();
        scenarios::sensor_upload(config).await;

        println!("{}", "Scenario complete!".bright_yellow());
        println!("{}", "-".repeat(50));
    }

    println!(
        "{}",
        "\n>>> Testing: Extreme Conditions (marginal link)".bright_red().bold()
    );
    let extreme = SimulationPresets::extreme_conditions();
    println!("Packet loss: {}%", (extreme.packet_loss * 100.0) as u32);
    println!("RSSI around: {} dBm", extreme.rssi_dbm);
    println!("\nNote: the RSSI gate should keep refusing this link");

    scenarios::sensor_upload(extreme).await;

    println!("\n{}", "All scenarios complete!".bright_green().bold());
    println!("\n{}", "Key observations:".bright_yellow());
    println!("- duty cycling trades discovery latency against radio-on time");
    println!("- the consecutive-RSSI gate keeps marginal links out of the data phase");
    println!("- per-chunk acks with retry push sets through heavy packet loss");
    println!("- repeated small acks are cheaper than retransmitted chunks");

    Ok(())
}
