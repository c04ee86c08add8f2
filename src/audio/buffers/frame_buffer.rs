//! A fixed-capacity store of interleaved multichannel frames.
//!
//! Occupied frames always sit at the front of the backing array, oldest first.
//! Appends land right after the last occupied frame; consumption takes frames
//! from the front and shifts the remainder down.
//!
//! Overflow and underflow are normal operating conditions here, not errors:
//! - [`FrameBuffer::append`] truncates when there is no room
//! - [`FrameBuffer::append_drop_oldest`] evicts the oldest frame instead
//! - [`FrameBuffer::consume`] zero-pads when there is not enough data
//!
//! The buffer does no locking itself; the owner decides how it is shared.

/// Fixed-capacity interleaved frame store.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    occupied: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer holding up to `capacity` frames of `channels` samples each.
    pub fn new(capacity: usize, channels: usize) -> Self {
        assert!(channels > 0, "FrameBuffer needs at least one channel");
        Self {
            data: vec![0.0; capacity * channels],
            channels,
            capacity,
            occupied: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid frames currently held.
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Room left, in frames.
    pub fn free(&self) -> usize {
        self.capacity - self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.capacity
    }

    /// Occupancy as a fraction of capacity (0.0 for a zero-capacity buffer).
    pub fn fill_fraction(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.occupied as f64 / self.capacity as f64
        }
    }

    /// The occupied samples, oldest frame first.
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.occupied * self.channels]
    }

    pub fn clear(&mut self) {
        self.occupied = 0;
    }

    /// Copies up to `count` frames from `frames`, limited by the free room.
    ///
    /// Frames that do not fit are discarded. Returns how many frames were
    /// actually stored, so the caller can tell that it was truncated.
    pub fn append(&mut self, frames: &[f32], count: usize) -> usize {
        let count = count.min(frames.len() / self.channels).min(self.free());
        if count == 0 {
            return 0;
        }

        let start = self.occupied * self.channels;
        let len = count * self.channels;
        self.data[start..start + len].copy_from_slice(&frames[..len]);
        self.occupied += count;
        count
    }

    /// Admits a single frame, evicting the oldest one if the buffer is full.
    ///
    /// Returns `true` when a frame was evicted. Occupancy stays at capacity
    /// in that case.
    pub fn append_drop_oldest(&mut self, frame: &[f32]) -> bool {
        if self.capacity == 0 || frame.len() < self.channels {
            return false;
        }

        let evicted = self.is_full();
        if evicted {
            self.remove_front(1);
        }
        self.append(frame, 1);
        evicted
    }

    /// Bulk form of [`append_drop_oldest`](Self::append_drop_oldest).
    ///
    /// The result is the same as admitting every frame of `frames` one at a
    /// time with drop-oldest semantics, but it shifts the buffer at most once.
    /// Returns the number of frames evicted (including incoming frames that
    /// were pushed out again by later ones).
    pub fn append_evicting(&mut self, frames: &[f32]) -> usize {
        let incoming = frames.len() / self.channels;
        if incoming == 0 || self.capacity == 0 {
            return incoming;
        }

        if incoming >= self.capacity {
            let evicted = self.occupied + (incoming - self.capacity);
            let skip = (incoming - self.capacity) * self.channels;
            let len = self.capacity * self.channels;
            self.data[..len].copy_from_slice(&frames[skip..skip + len]);
            self.occupied = self.capacity;
            return evicted;
        }

        let overflow = (self.occupied + incoming).saturating_sub(self.capacity);
        if overflow > 0 {
            self.remove_front(overflow);
        }
        self.append(frames, incoming);
        overflow
    }

    /// Moves `count` frames into `dest`, zero-filling whatever the buffer
    /// could not supply.
    ///
    /// `dest` is filled for `count` frames (or as many whole frames as it
    /// holds, if smaller). Returns the number of real frames copied; the rest
    /// is silence.
    pub fn consume(&mut self, dest: &mut [f32], count: usize) -> usize {
        let count = count.min(dest.len() / self.channels);
        let copied = count.min(self.occupied);
        let len = copied * self.channels;

        dest[..len].copy_from_slice(&self.data[..len]);
        dest[len..count * self.channels].fill(0.0);
        self.remove_front(copied);
        copied
    }

    /// Moves at most `capacity` frames into `dest` without padding.
    ///
    /// Returns the number of frames written.
    pub fn consume_into(&mut self, dest: &mut [f32], capacity: usize) -> usize {
        let count = capacity
            .min(dest.len() / self.channels)
            .min(self.occupied);
        let len = count * self.channels;

        dest[..len].copy_from_slice(&self.data[..len]);
        self.remove_front(count);
        count
    }

    fn remove_front(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let start = count * self.channels;
        let end = self.occupied * self.channels;
        self.data.copy_within(start..end, 0);
        self.occupied -= count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn mono(values: &[f32]) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(values.len(), 1);
        buffer.append(values, values.len());
        buffer
    }

    #[test]
    fn test_append_truncates_to_free_room() {
        let mut buffer = FrameBuffer::new(4, 2);
        let frames = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];

        assert_eq!(buffer.append(&frames, 3), 3);
        assert_eq!(buffer.append(&frames, 3), 1);
        assert_eq!(buffer.occupied(), 4);
        assert_eq!(&buffer.as_slice()[6..], &[1.0, 1.5]);
        assert_eq!(buffer.append(&frames, 3), 0);
    }

    #[test]
    fn test_append_limits_count_to_slice() {
        let mut buffer = FrameBuffer::new(10, 2);
        assert_eq!(buffer.append(&[0.1, 0.2, 0.3], 5), 1);
        assert_eq!(buffer.occupied(), 1);
    }

    #[test]
    fn test_consume_zero_pads_on_underflow() {
        let mut buffer = mono(&[1.0, 2.0, 3.0]);
        let mut dest = [9.0; 5];

        assert_eq!(buffer.consume(&mut dest, 5), 3);
        assert_eq!(dest, [1.0, 2.0, 3.0, 0.0, 0.0]);
        assert!(buffer.is_empty());

        let mut dest = [9.0; 4];
        assert_eq!(buffer.consume(&mut dest, 4), 0);
        assert_eq!(dest, [0.0; 4]);
    }

    #[test]
    fn test_consume_compacts_remainder() {
        let mut buffer = mono(&[1.0, 2.0, 3.0, 4.0]);
        let mut dest = [0.0; 1];

        buffer.consume(&mut dest, 1);
        assert_eq!(buffer.as_slice(), &[2.0, 3.0, 4.0]);

        buffer.append(&[5.0], 1);
        assert_eq!(buffer.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_consume_into_does_not_pad() {
        let mut buffer = FrameBuffer::new(8, 2);
        buffer.append(&[1.0, -1.0, 2.0, -2.0], 2);
        let mut dest = [7.0; 8];

        assert_eq!(buffer.consume_into(&mut dest, 4), 2);
        assert_eq!(&dest[..4], &[1.0, -1.0, 2.0, -2.0]);
        assert_eq!(&dest[4..], &[7.0; 4]);
    }

    #[test]
    fn test_drop_oldest_on_full_buffer() {
        let mut buffer = mono(&[0.0, 1.0, 2.0, 3.0]);
        assert!(buffer.is_full());

        assert!(buffer.append_drop_oldest(&[4.0]));
        assert_eq!(buffer.occupied(), 4);
        assert_eq!(buffer.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_drop_oldest_with_room_is_plain_append() {
        let mut buffer = FrameBuffer::new(3, 2);
        assert!(!buffer.append_drop_oldest(&[0.5, 0.25]));
        assert_eq!(buffer.as_slice(), &[0.5, 0.25]);
    }

    #[test]
    fn test_append_evicting_matches_single_frame_drops() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let capacity = rng.gen_range(1..12);
            let mut bulk = FrameBuffer::new(capacity, 2);
            let mut single = FrameBuffer::new(capacity, 2);

            let prefill: Vec<f32> = (0..rng.gen_range(0..=capacity) * 2)
                .map(|i| i as f32)
                .collect();
            bulk.append(&prefill, capacity);
            single.append(&prefill, capacity);

            let incoming: Vec<f32> = (0..rng.gen_range(0..20) * 2)
                .map(|i| 100.0 + i as f32)
                .collect();

            let evicted_bulk = bulk.append_evicting(&incoming);
            let evicted_single = incoming
                .chunks_exact(2)
                .filter(|frame| single.append_drop_oldest(frame))
                .count();

            assert_eq!(bulk.as_slice(), single.as_slice());
            assert_eq!(evicted_bulk, evicted_single);
        }
    }

    #[test]
    fn test_occupancy_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut buffer = FrameBuffer::new(64, 3);
        let source: Vec<f32> = (0..300).map(|i| i as f32).collect();
        let mut dest = vec![0.0; 300];

        for _ in 0..5_000 {
            let count = rng.gen_range(0..100);
            match rng.gen_range(0..5) {
                0 => {
                    let stored = buffer.append(&source, count);
                    assert!(stored <= count);
                }
                1 => {
                    buffer.append_drop_oldest(&source[..3]);
                }
                2 => {
                    buffer.append_evicting(&source[..count * 3]);
                }
                3 => {
                    buffer.consume(&mut dest, count);
                }
                _ => {
                    buffer.consume_into(&mut dest, count);
                }
            }
            assert!(buffer.occupied() <= buffer.capacity());
            assert_eq!(buffer.occupied() + buffer.free(), buffer.capacity());
        }
    }

    #[test]
    fn test_consume_always_returns_requested_frames() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut buffer = FrameBuffer::new(32, 2);

        for _ in 0..1_000 {
            let incoming: Vec<f32> = vec![1.0; rng.gen_range(0..40) * 2];
            buffer.append(&incoming, incoming.len() / 2);

            let count = rng.gen_range(0..40);
            let mut dest = vec![f32::NAN; count * 2];
            let real = buffer.consume(&mut dest, count);

            assert!(real <= count);
            assert!(dest[..real * 2].iter().all(|&s| s == 1.0));
            assert!(dest[real * 2..].iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_zero_capacity_buffer() {
        let mut buffer = FrameBuffer::new(0, 1);
        assert_eq!(buffer.append(&[1.0], 1), 0);
        assert!(!buffer.append_drop_oldest(&[1.0]));
        assert_eq!(buffer.append_evicting(&[1.0, 2.0]), 2);
        assert_eq!(buffer.fill_fraction(), 0.0);
    }
}
