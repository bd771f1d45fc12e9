//! Duty-cycle scheduler: alternates the radio between wake episodes and
//! slotted sleep. Sole owner of the radio power switch.

use tokio::time::{sleep, timeout, Duration};
use log::trace;

use motelink_core::NodeId;

use crate::{Radio, RadioError, Received};

pub struct DutyCycle<R: Radio> {
    radio: R,
    slot: Duration,
    stats: SchedulerStats,
}

#[derive(Debug, Default)]
struct SchedulerStats {
    wake_episodes: u64,
    frames_sent: u64,
    slots_slept: u64,
}

impl<R: Radio> DutyCycle<R> {
    pub fn new(radio: R, slot: Duration) -> Self {
        Self {
            radio,
            slot,
            stats: SchedulerStats::default(),
        }
    }

    pub fn slot(&self) -> Duration {
        self.slot
    }

    /// Power the radio on for a wake episode.
    pub fn wake(&mut self) {
        if !self.radio.is_powered() {
            self.radio.set_power(true);
            self.stats.wake_episodes += 1;
        }
    }

    /// Power the radio off.
    pub fn doze(&mut self) {
        self.radio.set_power(false);
    }

    /// Sleep for `slots` slot durations with the radio off. The sleep is
    /// re-armed one slot at a time; the slot timer's tick counter wraps at
    /// a fixed period, so a multi-slot wait must not be a single long one.
    pub async fn sleep_slots(&mut self, slots: u32) {
        self.doze();
        for _ in 0..slots {
            sleep(self.slot).await;
            self.stats.slots_slept += 1;
        }
    }

    pub async fn transmit(&mut self, bytes: &[u8], dest: Option<NodeId>) -> Result<(), RadioError> {
        self.radio.transmit(bytes, dest).await?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Wait up to `within` for one inbound frame. Returns `None` when the
    /// window elapses quietly; the caller's next scheduled step
    /// re-evaluates state.
    pub async fn next_frame(&mut self, within: Duration) -> Option<Received> {
        match timeout(within, self.radio.recv()).await {
            Ok(frame) => frame,
            Err(_) => {
                trace!("listen window closed");
                None
            }
        }
    }

    pub fn is_powered(&self) -> bool {
        self.radio.is_powered()
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.wake_episodes,
            self.stats.frames_sent,
            self.stats.slots_slept,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Airwaves, RadioConfig};

    #[tokio::test(start_paused = true)]
    async fn sleep_is_rearmed_per_slot() {
        let air = Airwaves::new(RadioConfig::default());
        let radio = air.join(1).await;
        let mut cycle = DutyCycle::new(radio, Duration::from_millis(100));

        let before = tokio::time::Instant::now();
        cycle.sleep_slots(18).await;
        assert_eq!(before.elapsed(), Duration::from_millis(1800));

        let (_, _, slept) = cycle.stats();
        assert_eq!(slept, 18);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_counts_episodes_once_per_power_up() {
        let air = Airwaves::new(RadioConfig::default());
        let radio = air.join(1).await;
        let mut cycle = DutyCycle::new(radio, Duration::from_millis(100));

        cycle.wake();
        cycle.wake(); // already powered, not a new episode
        cycle.doze();
        cycle.wake();

        let (episodes, _, _) = cycle.stats();
        assert_eq!(episodes, 2);
    }
}
