//! Node drivers: single-consumer loops that pull inbound frames and timer
//! ticks, feed the state machines, and drive the duty-cycle scheduler.
//! Each driver owns all of its protocol state; the radio power switch is
//! touched only through the scheduler.

use log::{debug, info, trace, warn};
use tokio::time::{sleep, Instant};

use motelink_core::{Frame, NodeId, SampleBuffer, SetQueue};
use motelink_radio::{DutyCycle, Radio, RadioError};

use crate::collector::{Collector, Sampler};
use crate::discovery::{Discovery, Phase};
use crate::link::{LinkGate, LinkState};
use crate::reassembly::{ChunkOutcome, Reassembly};
use crate::transfer::{AckOutcome, RetryOutcome, TransferSession};
use crate::{ConfigError, ProtocolConfig};

/// Symmetric discovery role: beacon until mutual discovery is confirmed,
/// then power down.
pub struct DiscoveryNode<R: Radio> {
    id: NodeId,
    cycle: DutyCycle<R>,
    cfg: ProtocolConfig,
    discovery: Discovery,
}

impl<R: Radio> DiscoveryNode<R> {
    pub fn new(id: NodeId, radio: R, cfg: ProtocolConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let discovery = Discovery::new(id, &cfg);
        Ok(Self {
            id,
            cycle: DutyCycle::new(radio, cfg.slot),
            cfg,
            discovery,
        })
    }

    pub fn phase(&self) -> Phase {
        self.discovery.phase()
    }

    pub fn scheduler_stats(&self) -> (u64, u64, u64) {
        self.cycle.stats()
    }

    /// Run discovery to completion: wake episodes of `num_send` beacons
    /// with a listening gap between them, then a phase-dependent slotted
    /// sleep. Returns once mutual discovery is confirmed.
    pub async fn run(&mut self) -> Result<(), RadioError> {
        info!("node {}: discovery start", self.id);
        loop {
            if self.discovery.is_complete() {
                self.cycle.doze();
                info!("node {}: discovery complete, radio off", self.id);
                return Ok(());
            }

            self.cycle.wake();
            let beacon = self.discovery.beacon().encode();
            for i in 0..self.cfg.num_send {
                self.cycle.transmit(&beacon, None).await?;
                trace!("node {}: beacon out", self.id);
                if i + 1 < self.cfg.num_send {
                    let deadline = Instant::now() + self.cfg.slot;
                    self.pump_beacons(deadline).await;
                }
            }
            self.cycle.doze();

            self.discovery.on_episode_end(Instant::now());
            let slots = self
                .discovery
                .sleep_slots(self.cfg.low_sleep_slots, self.cfg.randomize_sleep);
            if slots > 0 {
                debug!("node {}: sleeping {} slots", self.id, slots);
                self.cycle.sleep_slots(slots).await;
            }
        }
    }

    async fn pump_beacons(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let Some(rx) = self.cycle.next_frame(deadline - now).await else {
                break;
            };
            match Frame::decode(&rx.bytes) {
                Ok(Frame::Beacon { sender, flags, .. }) => {
                    debug!(
                        "node {}: beacon from {} flags {:#04x} rssi {}",
                        self.id, sender, flags, rx.rssi
                    );
                    self.discovery.on_beacon(sender, flags, Instant::now());
                }
                Ok(_) => {}
                Err(e) => trace!("node {}: dropping frame: {}", self.id, e),
            }
        }
    }
}

/// Sampling/transmitting role: collect fixed-length sample sets, then push
/// each queued set to a link-gated peer chunk by chunk.
pub struct SenderNode<R: Radio, S: Sampler> {
    id: NodeId,
    cycle: DutyCycle<R>,
    cfg: ProtocolConfig,
    sampler: S,
    collector: Collector,
    queue: SetQueue,
    gate: LinkGate,
    sets_delivered: u64,
}

impl<R: Radio, S: Sampler> SenderNode<R, S> {
    pub fn new(id: NodeId, radio: R, cfg: ProtocolConfig, sampler: S) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let collector = Collector::new(cfg.samples, cfg.motion_trigger);
        let queue = SetQueue::new(cfg.max_sets);
        let gate = LinkGate::new(&cfg);
        Ok(Self {
            id,
            cycle: DutyCycle::new(radio, cfg.slot),
            cfg,
            sampler,
            collector,
            queue,
            gate,
            sets_delivered: 0,
        })
    }

    pub fn sets_delivered(&self) -> u64 {
        self.sets_delivered
    }

    pub fn queued_sets(&self) -> usize {
        self.queue.len()
    }

    pub fn scheduler_stats(&self) -> (u64, u64, u64) {
        self.cycle.stats()
    }

    pub async fn run(&mut self) -> Result<(), RadioError> {
        loop {
            self.collect_set().await;
            self.upload_pending().await?;
        }
    }

    /// Sample at the fixed period, radio off, until the collector hands
    /// back a full set. Skipped silently if the queue has no room.
    pub async fn collect_set(&mut self) {
        self.cycle.doze();
        if self.queue.is_full() {
            warn!("node {}: set queue full, not collecting", self.id);
            sleep(self.cfg.sample_interval).await;
            return;
        }
        loop {
            sleep(self.cfg.sample_interval).await;
            let pair = self.sampler.sample();
            trace!(
                "node {}: sample light={} motion={}",
                self.id, pair.light, pair.motion
            );
            if let Some(set) = self.collector.on_sample(pair) {
                info!("node {}: set collected, queue={}", self.id, self.queue.len() + 1);
                if !self.queue.push(set) {
                    warn!("node {}: set queue overflow, set dropped", self.id);
                }
                return;
            }
        }
    }

    /// Drain the set queue, re-running the handshake before each set.
    /// Returns the number of sets delivered in this pass.
    pub async fn upload_pending(&mut self) -> Result<u64, RadioError> {
        let mut delivered = 0;
        while let Some(set) = self.queue.front().cloned() {
            if self.upload_set(&set).await? {
                self.queue.pop();
                delivered += 1;
                self.sets_delivered += 1;
                info!(
                    "node {}: upload complete, {} sets still queued",
                    self.id,
                    self.queue.len()
                );
            } else {
                warn!("node {}: upload abandoned, set kept for retry", self.id);
                break;
            }
        }
        Ok(delivered)
    }

    async fn upload_set(&mut self, set: &SampleBuffer) -> Result<bool, RadioError> {
        self.gate.reset();
        let peer = self.handshake().await?;
        let mut session = TransferSession::new(
            peer,
            set.len(),
            self.cfg.chunk_size,
            self.cfg.max_chunk_retries,
        );
        info!(
            "node {}: transferring {} chunks to {}",
            self.id,
            set.chunk_count(self.cfg.chunk_size),
            peer
        );

        loop {
            let bytes = session.data_frame(self.id, set).encode();
            self.cycle.wake();
            self.cycle.transmit(&bytes, Some(peer)).await?;
            session.mark_sent();
            trace!("node {}: chunk {} out", self.id, session.current_chunk());

            let deadline = Instant::now() + self.cfg.wake_window;
            let mut outcome = AckOutcome::Ignored;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let Some(rx) = self.cycle.next_frame(deadline - now).await else {
                    break;
                };
                if let Ok(Frame::Ack { sender, seq }) = Frame::decode(&rx.bytes) {
                    match session.on_ack(sender, seq) {
                        AckOutcome::Ignored => {}
                        other => {
                            outcome = other;
                            break;
                        }
                    }
                }
            }
            self.cycle.doze();

            match outcome {
                AckOutcome::Complete => {
                    self.gate.reset();
                    return Ok(true);
                }
                AckOutcome::Advanced => sleep(self.cfg.chunk_interval).await,
                AckOutcome::Ignored => match session.on_window_closed() {
                    RetryOutcome::RetrySame => {
                        debug!(
                            "node {}: no ack for chunk {}, retrying",
                            self.id,
                            session.current_chunk()
                        );
                        self.cycle.sleep_slots(1).await;
                    }
                    RetryOutcome::Abort => {
                        warn!(
                            "node {}: chunk {} abandoned, aborting session",
                            self.id,
                            session.current_chunk()
                        );
                        self.gate.reset();
                        return Ok(false);
                    }
                },
            }
        }
    }

    /// Broadcast REQUEST and feed the REQUEST_ACK replies through the link
    /// gate until it reports an established link. Retries forever; the
    /// transfer cannot start without a debounced peer.
    async fn handshake(&mut self) -> Result<NodeId, RadioError> {
        loop {
            self.cycle.wake();
            let request = Frame::Request { sender: self.id }.encode();
            self.cycle.transmit(&request, None).await?;
            trace!("node {}: request out", self.id);

            let deadline = Instant::now() + self.cfg.wake_window;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let Some(rx) = self.cycle.next_frame(deadline - now).await else {
                    break;
                };
                if let Ok(Frame::RequestAck { sender, .. }) = Frame::decode(&rx.bytes) {
                    debug!(
                        "node {}: req_ack from {} rssi {}",
                        self.id, sender, rx.rssi
                    );
                    self.gate.evaluate(sender, rx.rssi);
                    if self.gate.state() == LinkState::Up {
                        break;
                    }
                }
            }
            self.cycle.doze();

            if self.gate.state() == LinkState::Up {
                if let Some(peer) = self.gate.candidate() {
                    return Ok(peer);
                }
            }
            self.cycle.sleep_slots(1).await;
        }
    }
}

/// Receiving role: duty-cycled listening, REQUEST_ACK handshake replies,
/// chunk reassembly with redundant acks.
pub struct ReceiverNode<R: Radio, S: Sampler> {
    id: NodeId,
    cycle: DutyCycle<R>,
    cfg: ProtocolConfig,
    sampler: S,
    reassembly: Reassembly,
    sets_received: u64,
}

impl<R: Radio, S: Sampler> ReceiverNode<R, S> {
    pub fn new(id: NodeId, radio: R, cfg: ProtocolConfig, sampler: S) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let reassembly = Reassembly::new(cfg.samples, cfg.chunk_size, cfg.tracking);
        Ok(Self {
            id,
            cycle: DutyCycle::new(radio, cfg.slot),
            cfg,
            sampler,
            reassembly,
            sets_received: 0,
        })
    }

    pub fn sets_received(&self) -> u64 {
        self.sets_received
    }

    pub fn scheduler_stats(&self) -> (u64, u64, u64) {
        self.cycle.stats()
    }

    pub async fn run(&mut self) -> Result<(), RadioError> {
        loop {
            let set = self.recv_set().await?;
            info!("node {}: set of {} samples stored", self.id, set.len());
        }
    }

    /// Listen in wake windows until one full sample set is reassembled.
    pub async fn recv_set(&mut self) -> Result<SampleBuffer, RadioError> {
        loop {
            self.cycle.wake();
            let deadline = Instant::now() + self.cfg.wake_window;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let Some(rx) = self.cycle.next_frame(deadline - now).await else {
                    break;
                };
                match Frame::decode(&rx.bytes) {
                    Ok(Frame::Request { sender }) => {
                        if self.still_enough() {
                            let reply = Frame::RequestAck {
                                sender: self.id,
                                seq: 0,
                            }
                            .encode();
                            self.cycle.transmit(&reply, Some(sender)).await?;
                            debug!("node {}: req_ack -> {}", self.id, sender);
                        } else {
                            debug!("node {}: moving, request from {} ignored", self.id, sender);
                        }
                    }
                    Ok(Frame::Data { sender, seq, payload }) => {
                        let outcome = self.reassembly.on_chunk(seq, &payload);
                        trace!(
                            "node {}: chunk {} from {} -> {:?}",
                            self.id, seq, sender, outcome
                        );
                        if outcome == ChunkOutcome::Rejected {
                            continue;
                        }
                        // redundant acks: small frames are cheap, chunk
                        // retransmissions are not
                        let ack = Frame::Ack {
                            sender: self.id,
                            seq,
                        }
                        .encode();
                        for _ in 0..self.cfg.ack_repeat {
                            self.cycle.transmit(&ack, Some(sender)).await?;
                        }
                        if outcome == ChunkOutcome::Completed {
                            self.sets_received += 1;
                            let set = self.reassembly.take();
                            self.cycle.doze();
                            return Ok(set);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => trace!("node {}: dropping frame: {}", self.id, e),
                }
            }
            if self.cfg.rx_sleep_slots > 0 {
                self.cycle.sleep_slots(self.cfg.rx_sleep_slots).await;
            }
        }
    }

    fn still_enough(&mut self) -> bool {
        match self.cfg.still_threshold {
            None => true,
            Some(threshold) => self.sampler.sample().motion.saturating_abs() < threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motelink_core::SamplePair;
    use motelink_radio::{Airwaves, RadioConfig};
    use std::time::Duration;
    use tokio::time::timeout;

    fn lossless_air() -> RadioConfig {
        RadioConfig {
            packet_loss: 0.0,
            latency: Duration::from_millis(2),
            latency_jitter: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn fast_cfg() -> ProtocolConfig {
        ProtocolConfig {
            low_sleep_slots: 2,
            rx_sleep_slots: 0,
            ..Default::default()
        }
    }

    fn ramp_sampler() -> impl Sampler {
        let mut i = 0i16;
        move || {
            i += 1;
            SamplePair::new(i, i / 2)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lone_node_stays_normal() {
        let air = Airwaves::new(lossless_air());
        let radio = air.join(1).await;
        let mut node = DiscoveryNode::new(1, radio, fast_cfg()).unwrap();

        let result = timeout(Duration::from_secs(30), node.run()).await;
        assert!(result.is_err(), "discovery must not finish without a peer");
        assert_eq!(node.phase(), Phase::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn two_nodes_discover_each_other() {
        let air = Airwaves::new(lossless_air());
        let radio_a = air.join(1).await;
        let radio_b = air.join(2).await;
        let mut a = DiscoveryNode::new(1, radio_a, fast_cfg()).unwrap();
        let mut b = DiscoveryNode::new(2, radio_b, fast_cfg()).unwrap();

        let both = async { tokio::join!(a.run(), b.run()) };
        let (ra, rb) = timeout(Duration::from_secs(120), both)
            .await
            .expect("mutual discovery should finish");
        ra.unwrap();
        rb.unwrap();

        assert_eq!(a.phase(), Phase::Complete);
        assert_eq!(b.phase(), Phase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_set_crosses_a_clean_link() {
        let air = Airwaves::new(lossless_air());
        let radio_tx = air.join(1).await;
        let radio_rx = air.join(2).await;
        let cfg = fast_cfg();

        let mut sender = SenderNode::new(1, radio_tx, cfg.clone(), ramp_sampler()).unwrap();
        let mut receiver =
            ReceiverNode::new(2, radio_rx, cfg, || SamplePair::default()).unwrap();

        let send_side = async {
            sender.collect_set().await;
            sender.upload_pending().await
        };
        let recv_side = receiver.recv_set();

        let (sent, received) = timeout(Duration::from_secs(600), async {
            tokio::join!(send_side, recv_side)
        })
        .await
        .expect("transfer should finish on a lossless link");

        assert_eq!(sent.unwrap(), 1);
        let set = received.unwrap();
        let expected: Vec<SamplePair> =
            (1..=60).map(|i| SamplePair::new(i, i / 2)).collect();
        assert_eq!(set.pairs(), &expected[..]);
        assert_eq!(sender.sets_delivered(), 1);
        assert_eq!(receiver.sets_received(), 1);
        assert_eq!(sender.queued_sets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_survives_a_lossy_link() {
        let air = Airwaves::new(RadioConfig {
            packet_loss: 0.2,
            latency: Duration::from_millis(2),
            latency_jitter: Duration::from_millis(1),
            ..Default::default()
        });
        let radio_tx = air.join(1).await;
        let radio_rx = air.join(2).await;
        let cfg = fast_cfg();

        let mut sender = SenderNode::new(1, radio_tx, cfg.clone(), ramp_sampler()).unwrap();
        let mut receiver =
            ReceiverNode::new(2, radio_rx, cfg, || SamplePair::default()).unwrap();

        let send_side = async {
            sender.collect_set().await;
            sender.upload_pending().await
        };
        let recv_side = receiver.recv_set();

        let (sent, received) = timeout(Duration::from_secs(3600), async {
            tokio::join!(send_side, recv_side)
        })
        .await
        .expect("retries should push the set through 20% loss");

        assert_eq!(sent.unwrap(), 1);
        let set = received.unwrap();
        let expected: Vec<SamplePair> =
            (1..=60).map(|i| SamplePair::new(i, i / 2)).collect();
        assert_eq!(set.pairs(), &expected[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn moving_receiver_ignores_requests() {
        let air = Airwaves::new(lossless_air());
        let radio_rx = air.join(2).await;
        let mut requester = air.join(9).await;

        let cfg = ProtocolConfig {
            still_threshold: Some(5),
            rx_sleep_slots: 0,
            ..Default::default()
        };
        // receiver is shaking: |motion| = 50
        let mut receiver =
            ReceiverNode::new(2, radio_rx, cfg, || SamplePair::new(0, 50)).unwrap();
        let listen = tokio::spawn(async move { receiver.recv_set().await });

        requester.set_power(true);
        let request = Frame::Request { sender: 9 }.encode();
        requester.transmit(&request, None).await.unwrap();

        let reply = timeout(Duration::from_millis(500), requester.recv()).await;
        assert!(reply.is_err(), "a moving receiver must stay silent");
        listen.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn still_receiver_answers_requests() {
        let air = Airwaves::new(lossless_air());
        let radio_rx = air.join(2).await;
        let mut requester = air.join(9).await;

        let cfg = ProtocolConfig {
            still_threshold: Some(5),
            rx_sleep_slots: 0,
            ..Default::default()
        };
        let mut receiver =
            ReceiverNode::new(2, radio_rx, cfg, || SamplePair::new(0, 1)).unwrap();
        let listen = tokio::spawn(async move { receiver.recv_set().await });

        requester.set_power(true);
        let request = Frame::Request { sender: 9 }.encode();
        requester.transmit(&request, None).await.unwrap();

        let reply = timeout(Duration::from_millis(500), requester.recv())
            .await
            .expect("still receiver should answer")
            .expect("airwaves closed");
        match Frame::decode(&reply.bytes) {
            Ok(Frame::RequestAck { sender, seq }) => {
                assert_eq!(sender, 2);
                assert_eq!(seq, 0);
            }
            other => panic!("expected req_ack, got {:?}", other),
        }
        listen.abort();
    }
}
