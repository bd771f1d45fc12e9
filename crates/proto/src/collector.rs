//! Periodic sample collection. The sensors themselves are external; a
//! [`Sampler`] produces one reading pair per tick and the [`Collector`]
//! turns ticks into completed fixed-length sets, optionally armed by a
//! motion trigger.

use log::{debug, info};

use motelink_core::{SampleBuffer, SamplePair};

/// The sensor collaborator: one `(light, motion)` pair per fixed period.
pub trait Sampler: Send {
    fn sample(&mut self) -> SamplePair;
}

impl<F> Sampler for F
where
    F: FnMut() -> SamplePair + Send,
{
    fn sample(&mut self) -> SamplePair {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectorState {
    Idle,
    Collecting,
}

pub struct Collector {
    state: CollectorState,
    pairs: Vec<SamplePair>,
    samples: usize,
    motion_trigger: Option<i16>,
}

impl Collector {
    pub fn new(samples: usize, motion_trigger: Option<i16>) -> Self {
        Self {
            state: CollectorState::Idle,
            pairs: Vec::with_capacity(samples),
            samples,
            motion_trigger,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.state == CollectorState::Collecting
    }

    /// Feed one tick's reading. Returns the completed set on the tick that
    /// fills it. With a motion trigger, idle ticks below the threshold are
    /// discarded and the triggering reading itself is not recorded.
    pub fn on_sample(&mut self, pair: SamplePair) -> Option<SampleBuffer> {
        match self.state {
            CollectorState::Idle => match self.motion_trigger {
                Some(threshold) => {
                    if pair.motion.saturating_abs() >= threshold {
                        info!("motion {} over threshold, collecting", pair.motion);
                        self.state = CollectorState::Collecting;
                    }
                    return None;
                }
                None => {
                    self.state = CollectorState::Collecting;
                    self.pairs.push(pair);
                }
            },
            CollectorState::Collecting => {
                self.pairs.push(pair);
            }
        }

        if self.pairs.len() >= self.samples {
            let set = SampleBuffer::new(std::mem::take(&mut self.pairs));
            self.pairs.reserve(self.samples);
            self.state = CollectorState::Idle;
            debug!("set of {} samples complete", set.len());
            Some(set)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_running_collection_fills_a_set() {
        let mut c = Collector::new(4, None);
        assert!(c.on_sample(SamplePair::new(1, 0)).is_none());
        assert!(c.on_sample(SamplePair::new(2, 0)).is_none());
        assert!(c.on_sample(SamplePair::new(3, 0)).is_none());
        let set = c.on_sample(SamplePair::new(4, 0)).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.pairs()[0].light, 1);
        assert_eq!(set.pairs()[3].light, 4);
    }

    #[test]
    fn motion_trigger_arms_collection() {
        let mut c = Collector::new(2, Some(10));

        // still: nothing recorded
        assert!(c.on_sample(SamplePair::new(1, 2)).is_none());
        assert!(!c.is_collecting());

        // trigger tick arms but is not recorded
        assert!(c.on_sample(SamplePair::new(2, 15)).is_none());
        assert!(c.is_collecting());

        assert!(c.on_sample(SamplePair::new(3, 1)).is_none());
        let set = c.on_sample(SamplePair::new(4, 0)).unwrap();
        assert_eq!(set.pairs()[0].light, 3);
        assert_eq!(set.pairs()[1].light, 4);
    }

    #[test]
    fn negative_motion_also_triggers() {
        let mut c = Collector::new(1, Some(10));
        assert!(c.on_sample(SamplePair::new(0, -20)).is_none());
        assert!(c.is_collecting());
    }

    #[test]
    fn collection_restarts_after_a_set() {
        let mut c = Collector::new(2, None);
        c.on_sample(SamplePair::new(1, 0));
        assert!(c.on_sample(SamplePair::new(2, 0)).is_some());

        c.on_sample(SamplePair::new(3, 0));
        let set = c.on_sample(SamplePair::new(4, 0)).unwrap();
        assert_eq!(set.pairs()[0].light, 3);
    }
}
