use std::collections::VecDeque;

/// One reading pair produced by the sensor collaborator at a fixed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplePair {
    pub light: i16,
    pub motion: i16,
}

impl SamplePair {
    pub fn new(light: i16, motion: i16) -> Self {
        Self { light, motion }
    }
}

/// A completed, fixed-length run of samples. Immutable once built; the
/// transfer engine slices it into equal chunks by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    pairs: Vec<SamplePair>,
}

impl SampleBuffer {
    pub fn new(pairs: Vec<SamplePair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[SamplePair] {
        &self.pairs
    }

    /// The `index`-th chunk of `chunk_size` pairs. Panics if the chunk is
    /// out of range; callers size chunks from a validated config.
    pub fn chunk(&self, index: usize, chunk_size: usize) -> &[SamplePair] {
        let start = index * chunk_size;
        &self.pairs[start..start + chunk_size]
    }

    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.pairs.len().div_ceil(chunk_size)
    }
}

/// Bounded FIFO of completed sample sets awaiting upload. Collection
/// pauses while the queue is full; sets leave only once fully acked.
#[derive(Debug)]
pub struct SetQueue {
    sets: VecDeque<SampleBuffer>,
    capacity: usize,
}

impl SetQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            sets: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, set: SampleBuffer) -> bool {
        if self.sets.len() >= self.capacity {
            return false;
        }
        self.sets.push_back(set);
        true
    }

    pub fn front(&self) -> Option<&SampleBuffer> {
        self.sets.front()
    }

    pub fn pop(&mut self) -> Option<SampleBuffer> {
        self.sets.pop_front()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sets.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_of(n: usize) -> SampleBuffer {
        SampleBuffer::new((0..n).map(|i| SamplePair::new(i as i16, -(i as i16))).collect())
    }

    #[test]
    fn chunk_slicing_covers_buffer() {
        let buf = buffer_of(60);
        assert_eq!(buf.chunk_count(20), 3);
        assert_eq!(buf.chunk(0, 20)[0], SamplePair::new(0, 0));
        assert_eq!(buf.chunk(1, 20)[0], SamplePair::new(20, -20));
        assert_eq!(buf.chunk(2, 20)[19], SamplePair::new(59, -59));
    }

    #[test]
    fn set_queue_is_bounded() {
        let mut q = SetQueue::new(2);
        assert!(q.push(buffer_of(4)));
        assert!(q.push(buffer_of(4)));
        assert!(q.is_full());
        assert!(!q.push(buffer_of(4)));
        assert_eq!(q.len(), 2);

        q.pop();
        assert!(!q.is_full());
        assert!(q.push(buffer_of(4)));
    }
}
