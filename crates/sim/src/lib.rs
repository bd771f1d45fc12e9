//! simulation tools for motelink

pub mod scenarios;

use std::time::Duration;

use rand::Rng;

use motelink_core::SamplePair;
use motelink_proto::Sampler;
use motelink_radio::RadioConfig;

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> RadioConfig {
        RadioConfig {
            mtu: 127,
            bandwidth_bps: 250_000,
            packet_loss: 0.02,
            latency: Duration::from_millis(2),
            latency_jitter: Duration::from_millis(1),
            rssi_dbm: -55,
            rssi_jitter_dbm: 4,
        }
    }

    pub fn average_conditions() -> RadioConfig {
        RadioConfig {
            mtu: 127,
            bandwidth_bps: 250_000,
            packet_loss: 0.15,
            latency: Duration::from_millis(3),
            latency_jitter: Duration::from_millis(2),
            rssi_dbm: -63,
            rssi_jitter_dbm: 6,
        }
    }

    pub fn poor_conditions() -> RadioConfig {
        RadioConfig {
            mtu: 127,
            bandwidth_bps: 250_000,
            packet_loss: 0.30,
            latency: Duration::from_millis(5),
            latency_jitter: Duration::from_millis(3),
            // hovers around the -70 dBm gate threshold
            rssi_dbm: -68,
            rssi_jitter_dbm: 8,
        }
    }

    pub fn extreme_conditions() -> RadioConfig {
        RadioConfig {
            mtu: 127,
            bandwidth_bps: 250_000,
            packet_loss: 0.50,
            latency: Duration::from_millis(8),
            latency_jitter: Duration::from_millis(5),
            rssi_dbm: -76,
            rssi_jitter_dbm: 10,
        }
    }
}

/// Stand-in for the light/accelerometer pair: a slow light ramp with
/// noise and occasional motion spikes.
pub struct SyntheticSampler {
    tick: i16,
}

impl SyntheticSampler {
    pub fn new() -> Self {
        Self { tick: 0 }
    }
}

impl Default for SyntheticSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SyntheticSampler {
    fn sample(&mut self) -> SamplePair {
        self.tick = self.tick.wrapping_add(1);
        let mut rng = rand::rng();
        let light = 200 + (self.tick % 100) + rng.random_range(-10..=10);
        let motion = if rng.random_range(0..10) == 0 {
            rng.random_range(30..=90)
        } else {
            rng.random_range(0..=3)
        };
        SamplePair::new(light, motion)
    }
}
