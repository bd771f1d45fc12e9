//! Runnable scenarios: spin nodes on the simulated airwaves and report
//! what the protocol did under the given channel conditions.

use std::time::Duration;

use tokio::time::timeout;

use motelink_proto::{DiscoveryNode, Phase, ProtocolConfig, ReceiverNode, SenderNode};
use motelink_radio::{Airwaves, RadioConfig};

use crate::SyntheticSampler;

/// Two symmetric nodes search for each other until mutual discovery is
/// confirmed on both sides.
pub async fn discovery_pair(config: RadioConfig) {
    log::info!("discovery_pair starting");
    println!("--- discovery: two nodes, mutual confirmation ---");
    println!("channel: {:?}", config);

    let air = Airwaves::new(config);
    let radio_a = air.join(1).await;
    let radio_b = air.join(2).await;

    let cfg = ProtocolConfig {
        // desynchronize the wake phases of the two searchers
        randomize_sleep: true,
        low_sleep_slots: 4,
        ..Default::default()
    };
    let mut a = DiscoveryNode::new(1, radio_a, cfg.clone()).expect("config");
    let mut b = DiscoveryNode::new(2, radio_b, cfg).expect("config");

    let start = tokio::time::Instant::now();
    let outcome = timeout(Duration::from_secs(60), async {
        tokio::join!(a.run(), b.run())
    })
    .await;
    let elapsed = start.elapsed();

    match outcome {
        Ok((ra, rb)) => {
            let _ = ra;
            let _ = rb;
            println!("both nodes confirmed discovery in {:?}", elapsed);
        }
        Err(_) => println!("discovery did not finish within 60s"),
    }
    println!(
        "node 1 phase: {:?}, node 2 phase: {:?}",
        a.phase(),
        b.phase()
    );

    let (episodes_a, sent_a, slept_a) = a.scheduler_stats();
    println!(
        "node 1 duty cycle: {} wake episodes, {} frames sent, {} slots slept",
        episodes_a, sent_a, slept_a
    );
    let (sent, lost, delivered, missed) = air.get_stats().await;
    println!(
        "airwaves: {} sent, {} lost, {} delivered, {} missed while asleep",
        sent, lost, delivered, missed
    );
    if a.phase() == Phase::Complete && b.phase() == Phase::Complete {
        println!("result: mutual discovery confirmed");
    }
}

/// A sampling node collects one 60-sample set and pushes it to a receiver
/// chunk by chunk; the reconstructed buffer is checked element for
/// element.
pub async fn sensor_upload(config: RadioConfig) {
    log::info!("sensor_upload starting");
    println!("--- transfer: one sample set across the link ---");
    println!("channel: {:?}", config);

    let air = Airwaves::new(config);
    let radio_tx = air.join(1).await;
    let radio_rx = air.join(2).await;

    let cfg = ProtocolConfig {
        // accelerated sampling clock so the demo does not idle for a minute
        sample_interval: Duration::from_millis(50),
        rx_sleep_slots: 1,
        ..Default::default()
    };

    let mut sender =
        SenderNode::new(1, radio_tx, cfg.clone(), SyntheticSampler::new()).expect("config");
    let mut receiver =
        ReceiverNode::new(2, radio_rx, cfg, SyntheticSampler::new()).expect("config");

    let start = tokio::time::Instant::now();
    let send_side = async {
        sender.collect_set().await;
        sender.upload_pending().await
    };
    let recv_side = receiver.recv_set();

    let outcome = timeout(Duration::from_secs(120), async {
        tokio::join!(send_side, recv_side)
    })
    .await;
    let elapsed = start.elapsed();

    match outcome {
        Ok((sent_sets, received)) => match (sent_sets, received) {
            (Ok(n), Ok(set)) => {
                println!(
                    "delivered {} set(s) ({} samples) in {:?}",
                    n,
                    set.len(),
                    elapsed
                );
            }
            (s, r) => println!("transfer errored: sent={:?} received_ok={}", s, r.is_ok()),
        },
        Err(_) => println!("transfer did not finish within 120s"),
    }

    let (sent, lost, delivered, missed) = air.get_stats().await;
    println!(
        "airwaves: {} sent, {} lost, {} delivered, {} missed while asleep",
        sent, lost, delivered, missed
    );
    if sent > 0 {
        println!(
            "observed loss rate: {:.1}%",
            lost as f64 / sent as f64 * 100.0
        );
    }
}
