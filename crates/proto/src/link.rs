//! Link-quality gate: debounces RSSI so a transfer only binds to a peer
//! heard at good strength several times in a row.

use log::{debug, info};

use motelink_core::{NodeId, Rssi};

use crate::ProtocolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Searching,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    CameUp,
    WentDown,
}

pub struct LinkGate {
    threshold: Rssi,
    required: u8,
    track_loss: bool,
    candidate: Option<NodeId>,
    good: u8,
    bad: u8,
    state: LinkState,
}

impl LinkGate {
    pub fn new(cfg: &ProtocolConfig) -> Self {
        Self {
            threshold: cfg.rssi_good_threshold,
            required: cfg.good_required,
            track_loss: cfg.track_link_loss,
            candidate: None,
            good: 0,
            bad: 0,
            state: LinkState::Searching,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn candidate(&self) -> Option<NodeId> {
        self.candidate
    }

    /// Feed one reading. The gate tracks a single candidate at a time;
    /// readings from other senders do not touch the counters.
    pub fn evaluate(&mut self, sender: NodeId, rssi: Rssi) -> Option<LinkEvent> {
        match self.candidate {
            None => {
                self.candidate = Some(sender);
                self.good = u8::from(rssi >= self.threshold);
                self.bad = 0;
                debug!("candidate {} bound, rssi {}", sender, rssi);
            }
            Some(bound) if bound == sender => {
                if rssi >= self.threshold {
                    self.good = self.good.saturating_add(1);
                    self.bad = 0;
                } else {
                    self.good = 0;
                    self.bad = self.bad.saturating_add(1);
                }
                debug!(
                    "candidate {} rssi {} good={} bad={}",
                    sender, rssi, self.good, self.bad
                );
            }
            Some(_) => return None,
        }

        match self.state {
            LinkState::Searching if self.good >= self.required => {
                self.state = LinkState::Up;
                info!("link up: {} consecutive good readings from {}", self.good, sender);
                Some(LinkEvent::CameUp)
            }
            LinkState::Up if self.track_loss && self.bad >= self.required => {
                self.state = LinkState::Searching;
                self.good = 0;
                info!("link down: {} consecutive bad readings from {}", self.bad, sender);
                Some(LinkEvent::WentDown)
            }
            _ => None,
        }
    }

    /// Forget the candidate, e.g. after a completed transfer.
    pub fn reset(&mut self) {
        self.candidate = None;
        self.good = 0;
        self.bad = 0;
        self.state = LinkState::Searching;
    }
}
