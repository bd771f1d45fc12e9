//! Simulated airwaves: routes frames between nodes with transmission-time,
//! latency, jitter, bursty loss, and per-frame RSSI. Deliveries to a
//! powered-off node are dropped, which is what makes duty cycling visible
//! in simulation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, trace, warn};
use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{sleep, Duration};

use async_trait::async_trait;

use motelink_core::NodeId;

use crate::{Radio, RadioConfig, RadioError, Received};

struct NodeSlot {
    inbox: mpsc::Sender<Received>,
    powered: Arc<AtomicBool>,
}

struct Transmission {
    from: NodeId,
    dest: Option<NodeId>,
    bytes: Bytes,
}

#[derive(Debug, Default)]
struct AirStats {
    frames_sent: u64,
    frames_lost: u64,
    frames_delivered: u64,
    frames_missed_powered_off: u64,
}

pub struct Airwaves {
    config: RadioConfig,
    nodes: Arc<RwLock<HashMap<NodeId, NodeSlot>>>,
    stats: Arc<Mutex<AirStats>>,
    transmissions: mpsc::Sender<Transmission>,
}

impl Airwaves {
    pub fn new(config: RadioConfig) -> Arc<Self> {
        let nodes = Arc::new(RwLock::new(HashMap::<NodeId, NodeSlot>::new()));
        let stats = Arc::new(Mutex::new(AirStats::default()));
        let (tx, mut rx) = mpsc::channel::<Transmission>(4096);

        let nodes_clone = nodes.clone();
        let stats_clone = stats.clone();
        let config_clone = config.clone();

        log::info!("airwaves up: {:?}", config);

        tokio::spawn(async move {
            while let Some(t) = rx.recv().await {
                let air_time = Duration::from_secs_f64(
                    (t.bytes.len() * 8) as f64 / config_clone.bandwidth_bps as f64,
                );
                let jitter_ms = config_clone.latency_jitter.as_millis() as f64;
                let jitter = if jitter_ms > 0.0 {
                    let factor: f64 = rand::rng().random_range(0.0..1.0);
                    Duration::from_millis((factor * jitter_ms) as u64)
                } else {
                    Duration::ZERO
                };
                sleep(air_time + config_clone.latency + jitter).await;

                // "bursty" loss model: scale the base probability by a
                // piecewise random factor so losses cluster
                let base_loss = config_clone.packet_loss;
                let r: f64 = rand::rng().random();
                let dynamic_factor = if r < 0.7 {
                    0.8 + (r / 0.7) * 0.4
                } else if r < 0.95 {
                    1.2 + ((r - 0.7) / 0.25) * 0.6
                } else {
                    2.0 + ((r - 0.95) / 0.05) * 1.0
                };
                let loss_prob = (base_loss * dynamic_factor).min(1.0);

                let guard = nodes_clone.read().await;
                let recipients: Vec<&NodeSlot> = match t.dest {
                    Some(id) => guard.get(&id).into_iter().collect(),
                    None => guard
                        .iter()
                        .filter(|(id, _)| **id != t.from)
                        .map(|(_, slot)| slot)
                        .collect(),
                };

                for slot in recipients {
                    if rand::rng().random::<f64>() < loss_prob {
                        stats_clone.lock().await.frames_lost += 1;
                        debug!("frame from {} lost in the air (p={:.3})", t.from, loss_prob);
                        continue;
                    }
                    if !slot.powered.load(Ordering::Acquire) {
                        stats_clone.lock().await.frames_missed_powered_off += 1;
                        trace!("frame from {} missed: receiver radio off", t.from);
                        continue;
                    }
                    let j = config_clone.rssi_jitter_dbm;
                    let rssi = config_clone.rssi_dbm + rand::rng().random_range(-j..=j);
                    let delivery = Received {
                        bytes: t.bytes.clone(),
                        src: t.from,
                        rssi,
                    };
                    match slot.inbox.try_send(delivery) {
                        Ok(_) => stats_clone.lock().await.frames_delivered += 1,
                        Err(e) => warn!("inbox full, frame from {} dropped: {}", t.from, e),
                    }
                }
            }
        });

        Arc::new(Self {
            config,
            nodes,
            stats,
            transmissions: tx,
        })
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Register a node and hand back its radio.
    pub async fn join(self: &Arc<Self>, id: NodeId) -> SimRadio {
        let (inbox, rx) = mpsc::channel(64);
        let powered = Arc::new(AtomicBool::new(false));
        self.nodes.write().await.insert(
            id,
            NodeSlot {
                inbox,
                powered: powered.clone(),
            },
        );
        SimRadio {
            id,
            powered,
            rx,
            air: Arc::clone(self),
        }
    }

    async fn send_frame(
        &self,
        from: NodeId,
        dest: Option<NodeId>,
        bytes: Bytes,
    ) -> Result<(), RadioError> {
        if bytes.len() > self.config.mtu {
            return Err(RadioError::FrameTooLarge);
        }
        self.transmissions
            .try_send(Transmission { from, dest, bytes })
            .map_err(|e| {
                warn!("airwaves queue rejected frame from {}: {}", from, e);
                RadioError::TransmitFailed
            })?;
        self.stats.lock().await.frames_sent += 1;
        Ok(())
    }

    /// (sent, lost, delivered, missed while powered off)
    pub async fn get_stats(&self) -> (u64, u64, u64, u64) {
        let stats = self.stats.lock().await;
        (
            stats.frames_sent,
            stats.frames_lost,
            stats.frames_delivered,
            stats.frames_missed_powered_off,
        )
    }
}

pub struct SimRadio {
    id: NodeId,
    powered: Arc<AtomicBool>,
    rx: mpsc::Receiver<Received>,
    air: Arc<Airwaves>,
}

impl SimRadio {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

#[async_trait]
impl Radio for SimRadio {
    async fn transmit(&self, bytes: &[u8], dest: Option<NodeId>) -> Result<(), RadioError> {
        if !self.powered.load(Ordering::Acquire) {
            return Err(RadioError::PoweredDown);
        }
        trace!("node {} tx {} bytes", self.id, bytes.len());
        self.air
            .send_frame(self.id, dest, Bytes::copy_from_slice(bytes))
            .await
    }

    fn set_power(&self, on: bool) {
        self.powered.store(on, Ordering::Release);
    }

    fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    async fn recv(&mut self) -> Option<Received> {
        self.rx.recv().await
    }
}
