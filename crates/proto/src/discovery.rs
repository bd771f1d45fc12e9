//! Neighbour discovery state machine. Transitions are driven entirely by
//! received beacons and the per-episode timeout check; the scheduler only
//! reads the phase to pick sleep-slot counts.

use log::info;
use rand::Rng;
use tokio::time::{Duration, Instant};

use motelink_core::{Frame, NodeId, FLAG_ACK};

use crate::ProtocolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Low duty cycle, no peer heard yet.
    Normal,
    /// Peer detected; racing to confirm mutual discovery.
    Aggressive,
    /// Peer is also aggressive; sending acknowledgment beacons.
    AckWindow,
    /// Mutual discovery confirmed. Terminal for the round.
    Complete,
}

pub struct Discovery {
    node_id: NodeId,
    phase: Phase,
    aggressive_since: Option<Instant>,
    ack_since: Option<Instant>,
    ack_started: bool,
    aggressive_timeout: Duration,
    ack_window: Duration,
    tie_break_by_id: bool,
}

impl Discovery {
    pub fn new(node_id: NodeId, cfg: &ProtocolConfig) -> Self {
        Self {
            node_id,
            phase: Phase::Normal,
            aggressive_since: None,
            ack_since: None,
            ack_started: false,
            aggressive_timeout: cfg.aggressive_timeout,
            ack_window: cfg.ack_window,
            tie_break_by_id: cfg.tie_break_by_id,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// React to a beacon. Complete is terminal: once confirmed, nothing
    /// moves the machine back within this round.
    pub fn on_beacon(&mut self, from: NodeId, flags: u8, now: Instant) {
        if from == self.node_id {
            return;
        }
        match self.phase {
            Phase::Normal => {
                self.phase = Phase::Aggressive;
                self.aggressive_since = Some(now);
                info!("node {}: peer {} heard, NORMAL -> AGGRESSIVE", self.node_id, from);
            }
            Phase::Aggressive => {
                if flags & FLAG_ACK != 0 {
                    self.phase = Phase::Complete;
                    info!("node {}: ack beacon from {}, AGGRESSIVE -> COMPLETE", self.node_id, from);
                } else if self.may_start_ack_window(from) {
                    self.phase = Phase::AckWindow;
                    self.ack_since = Some(now);
                    self.ack_started = true;
                    info!("node {}: starting ack window for {}", self.node_id, from);
                }
            }
            Phase::AckWindow => {
                if flags & FLAG_ACK != 0 {
                    self.phase = Phase::Complete;
                    info!("node {}: peer ack, ACK_WINDOW -> COMPLETE", self.node_id);
                }
            }
            Phase::Complete => {}
        }
    }

    /// Both peers can observe each other's non-ack beacon at once; with the
    /// id tie-break only the lower id takes the ack-sender role.
    fn may_start_ack_window(&self, from: NodeId) -> bool {
        if self.ack_started {
            return false;
        }
        !self.tie_break_by_id || self.node_id < from
    }

    /// Timeout checks, run once per wake episode after the sends.
    pub fn on_episode_end(&mut self, now: Instant) {
        match self.phase {
            Phase::Aggressive => {
                if let Some(since) = self.aggressive_since {
                    if now.duration_since(since) >= self.aggressive_timeout {
                        self.phase = Phase::Normal;
                        self.aggressive_since = None;
                        info!("node {}: aggressive timeout, back to NORMAL", self.node_id);
                    }
                }
            }
            Phase::AckWindow => {
                if let Some(since) = self.ack_since {
                    if now.duration_since(since) >= self.ack_window {
                        self.phase = Phase::Complete;
                        info!("node {}: ack window elapsed, COMPLETE", self.node_id);
                    }
                }
            }
            _ => {}
        }
    }

    /// Sleep-slot count for the current phase. Searching sleeps long (and
    /// optionally randomized, to desynchronize colliding wake phases);
    /// racing phases sleep a single slot.
    pub fn sleep_slots(&self, low: u32, randomize: bool) -> u32 {
        match self.phase {
            Phase::Normal => {
                if randomize {
                    rand::rng().random_range(0..=low * 2)
                } else {
                    low
                }
            }
            Phase::Aggressive | Phase::AckWindow => 1,
            Phase::Complete => 0,
        }
    }

    /// The beacon this node currently broadcasts; the ack flag is set only
    /// during the ack window.
    pub fn beacon(&self) -> Frame {
        let flags = if self.phase == Phase::AckWindow {
            FLAG_ACK
        } else {
            0
        };
        Frame::Beacon {
            sender: self.node_id,
            phase: self.phase as u8,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(id: NodeId) -> Discovery {
        Discovery::new(id, &ProtocolConfig::default())
    }

    #[test]
    fn beacon_from_peer_triggers_aggressive() {
        let mut d = discovery(1);
        assert_eq!(d.phase(), Phase::Normal);

        d.on_beacon(7, 0, Instant::now());
        assert_eq!(d.phase(), Phase::Aggressive);
    }

    #[test]
    fn own_beacon_is_ignored() {
        let mut d = discovery(1);
        d.on_beacon(1, 0, Instant::now());
        assert_eq!(d.phase(), Phase::Normal);
    }

    #[test]
    fn ack_flag_completes_from_aggressive() {
        let mut d = discovery(1);
        let now = Instant::now();
        d.on_beacon(7, 0, now);
        d.on_beacon(7, FLAG_ACK, now);
        assert_eq!(d.phase(), Phase::Complete);
    }

    #[test]
    fn lower_id_becomes_ack_sender() {
        let now = Instant::now();

        let mut low = discovery(1);
        low.on_beacon(2, 0, now);
        low.on_beacon(2, 0, now);
        assert_eq!(low.phase(), Phase::AckWindow);

        let mut high = discovery(2);
        high.on_beacon(1, 0, now);
        high.on_beacon(1, 0, now);
        assert_eq!(high.phase(), Phase::Aggressive);
    }

    #[test]
    fn ack_window_elapses_to_complete() {
        let mut d = discovery(1);
        let start = Instant::now();
        d.on_beacon(2, 0, start);
        d.on_beacon(2, 0, start);
        assert_eq!(d.phase(), Phase::AckWindow);

        d.on_episode_end(start + Duration::from_secs(1));
        assert_eq!(d.phase(), Phase::AckWindow);

        d.on_episode_end(start + Duration::from_secs(2));
        assert_eq!(d.phase(), Phase::Complete);
    }

    #[test]
    fn aggressive_times_out_to_normal() {
        let mut d = discovery(1);
        let start = Instant::now();
        d.on_beacon(7, 0, start);
        assert_eq!(d.phase(), Phase::Aggressive);

        d.on_episode_end(start + Duration::from_secs(9));
        assert_eq!(d.phase(), Phase::Aggressive);

        d.on_episode_end(start + Duration::from_secs(10));
        assert_eq!(d.phase(), Phase::Normal);
    }

    #[test]
    fn complete_is_terminal() {
        let mut d = discovery(1);
        let now = Instant::now();
        d.on_beacon(7, 0, now);
        d.on_beacon(7, FLAG_ACK, now);
        assert_eq!(d.phase(), Phase::Complete);

        d.on_beacon(9, 0, now);
        d.on_beacon(7, FLAG_ACK, now);
        d.on_episode_end(now + Duration::from_secs(60));
        assert_eq!(d.phase(), Phase::Complete);
    }

    #[test]
    fn sleep_slots_follow_phase() {
        let mut d = discovery(1);
        assert_eq!(d.sleep_slots(18, false), 18);

        d.on_beacon(7, 0, Instant::now());
        assert_eq!(d.sleep_slots(18, false), 1);
    }

    #[test]
    fn randomized_sleep_stays_in_range() {
        let d = discovery(1);
        for _ in 0..100 {
            let slots = d.sleep_slots(18, true);
            assert!(slots <= 36);
        }
    }

    #[test]
    fn beacon_carries_ack_flag_only_in_ack_window() {
        let mut d = discovery(1);
        let now = Instant::now();

        if let Frame::Beacon { flags, .. } = d.beacon() {
            assert_eq!(flags, 0);
        } else {
            panic!("expected beacon");
        }

        d.on_beacon(2, 0, now);
        d.on_beacon(2, 0, now);
        assert_eq!(d.phase(), Phase::AckWindow);
        if let Frame::Beacon { flags, .. } = d.beacon() {
            assert_eq!(flags, FLAG_ACK);
        } else {
            panic!("expected beacon");
        }
    }
}
