//! Latency alignment of a destination
//!
//! A FIFO of interleaved stereo samples that holds back one destination's
//! output by a whole number of chunks. Output starts once the buffered
//! count reaches one chunk plus the latency; until then each pull is
//! silence. The ring is allocated once per sample rate and never grows.

use crate::types::{Sample, StereoBuffer, OUTPUT_CHANNELS};

/// Seconds of audio the ring can hold
pub const DELAY_CAPACITY_SECONDS: usize = 2;

/// Ring capacity in interleaved samples at `sample_rate`
#[inline]
pub fn delay_capacity(sample_rate: u32) -> usize {
    DELAY_CAPACITY_SECONDS * sample_rate as usize * OUTPUT_CHANNELS
}

/// Largest latency in interleaved samples that never overwrites unread audio
///
/// Buffering is whole-chunk, so the ring may hold up to two chunks beyond the
/// latency itself.
pub fn max_latency_samples(sample_rate: u32, chunk_frames: usize) -> usize {
    delay_capacity(sample_rate).saturating_sub(2 * chunk_frames * OUTPUT_CHANNELS)
}

/// Largest accepted latency in milliseconds
pub fn max_latency_ms(sample_rate: u32, chunk_frames: usize) -> f32 {
    max_latency_samples(sample_rate, chunk_frames) as f32 * 1000.0 / sample_rate.max(1) as f32
}

/// Latency in interleaved samples for `ms` at `sample_rate`
///
/// Negative and NaN inputs map to zero.
pub fn latency_samples(ms: f32, sample_rate: u32) -> usize {
    let samples = (ms as f64 / 1000.0 * sample_rate as f64).round();
    if samples.is_nan() || samples <= 0.0 {
        0
    } else {
        samples as usize
    }
}

/// Fixed-capacity FIFO delay for one destination
#[derive(Debug)]
pub struct DelayLine {
    ring: Vec<Sample>,
    /// Index of the oldest buffered sample
    read_pos: usize,
    /// Buffered sample count
    len: usize,
    latency_samples: usize,
    sample_rate: u32,
    chunk_frames: usize,
}

impl DelayLine {
    /// Allocate a ring of two seconds at `sample_rate`, latency 0
    pub fn new(sample_rate: u32, chunk_frames: usize) -> Self {
        Self {
            ring: vec![0.0; delay_capacity(sample_rate)],
            read_pos: 0,
            len: 0,
            latency_samples: 0,
            sample_rate,
            chunk_frames,
        }
    }

    /// Set the latency, returning the value in samples actually applied
    ///
    /// A rate change reallocates the ring, so the real-time path only calls
    /// this with the session rate. Values above the ring's limit are clamped.
    /// Any change of the stored value clears the buffered audio.
    pub fn set_latency(&mut self, ms: f32, sample_rate: u32) -> usize {
        if sample_rate != self.sample_rate {
            *self = Self::new(sample_rate, self.chunk_frames);
        }

        let requested = latency_samples(ms, sample_rate);
        let max = self.max_latency_samples();
        if requested > max {
            log::warn!(
                "Latency {}ms ({} samples) exceeds delay capacity, clamping to {} samples",
                ms,
                requested,
                max
            );
        }
        let samples = requested.min(max);

        if samples != self.latency_samples {
            self.latency_samples = samples;
            self.clear();
        }
        samples
    }

    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.latency_samples
    }

    pub fn max_latency_samples(&self) -> usize {
        max_latency_samples(self.sample_rate, self.chunk_frames)
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Buffered interleaved samples
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.len
    }

    /// Drop all buffered audio
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    /// Push one chunk and replace it with the delayed chunk, or silence
    ///
    /// With zero latency the buffer passes through untouched.
    pub fn push_and_pull(&mut self, buffer: &mut StereoBuffer) {
        if self.latency_samples == 0 || self.ring.is_empty() {
            return;
        }

        let chunk = buffer.as_interleaved_mut();
        self.push(chunk);

        if self.len >= chunk.len() + self.latency_samples {
            self.pop_into(chunk);
        } else {
            chunk.fill(0.0);
        }
    }

    /// Append samples, overwriting the oldest ones when full
    fn push(&mut self, samples: &[Sample]) {
        let capacity = self.ring.len();
        for &sample in samples {
            if self.len == capacity {
                self.read_pos = (self.read_pos + 1) % capacity;
                self.len -= 1;
            }
            let write_pos = (self.read_pos + self.len) % capacity;
            self.ring[write_pos] = sample;
            self.len += 1;
        }
    }

    fn pop_into(&mut self, out: &mut [Sample]) {
        let capacity = self.ring.len();
        for sample in out.iter_mut() {
            *sample = self.ring[self.read_pos];
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        self.len -= out.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    const SR: u32 = 48000;
    const N: usize = 64;

    fn numbered_chunk(k: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(N);
        for (i, frame) in buffer.iter_mut().enumerate() {
            let v = (k * N + i + 1) as f32;
            *frame = StereoSample::new(v, -v);
        }
        buffer
    }

    fn chunks_for(latency: usize) -> (usize, usize) {
        let chunk = 2 * N;
        let silent = (chunk + latency).div_ceil(chunk) - 1;
        let shift = latency.div_ceil(chunk);
        (silent, shift)
    }

    #[test]
    fn test_zero_latency_bypasses() {
        let mut delay = DelayLine::new(SR, N);
        assert_eq!(delay.set_latency(0.0, SR), 0);

        let mut buffer = numbered_chunk(3);
        delay.push_and_pull(&mut buffer);
        assert_eq!(buffer.as_slice(), numbered_chunk(3).as_slice());
        assert_eq!(delay.buffered_len(), 0);
    }

    #[test]
    fn test_delay_shifts_whole_chunks() {
        // 10ms at 48kHz = 480 samples of the interleaved count
        for ms in [10.0, 2.0, 0.5] {
            let mut delay = DelayLine::new(SR, N);
            let latency = delay.set_latency(ms, SR);
            assert_eq!(latency, latency_samples(ms, SR));
            let (silent, shift) = chunks_for(latency);

            for k in 0..silent + 8 {
                let mut buffer = numbered_chunk(k);
                delay.push_and_pull(&mut buffer);
                if k < silent {
                    assert!(
                        buffer.iter().all(|s| *s == StereoSample::silence()),
                        "{}ms: chunk {} should be silent",
                        ms,
                        k
                    );
                } else {
                    assert_eq!(
                        buffer.as_slice(),
                        numbered_chunk(k - shift).as_slice(),
                        "{}ms: chunk {} should equal input chunk {}",
                        ms,
                        k,
                        k - shift
                    );
                }
            }
        }
    }

    #[test]
    fn test_latency_change_clears_buffer() {
        let mut delay = DelayLine::new(SR, N);
        delay.set_latency(5.0, SR);
        let mut buffer = numbered_chunk(0);
        delay.push_and_pull(&mut buffer);
        assert!(delay.buffered_len() > 0);

        delay.set_latency(5.0, SR);
        assert!(delay.buffered_len() > 0, "unchanged latency keeps audio");

        delay.set_latency(6.0, SR);
        assert_eq!(delay.buffered_len(), 0);
    }

    #[test]
    fn test_latency_is_clamped_to_capacity() {
        let mut delay = DelayLine::new(SR, N);
        let applied = delay.set_latency(60_000.0, SR);
        assert_eq!(applied, max_latency_samples(SR, N));

        // At the limit the ring never overwrites unread samples
        let (silent, shift) = chunks_for(applied);
        for k in 0..silent + 3 {
            let mut buffer = numbered_chunk(k);
            delay.push_and_pull(&mut buffer);
            assert!(delay.buffered_len() <= delay.capacity());
            if k >= silent {
                assert_eq!(buffer.as_slice(), numbered_chunk(k - shift).as_slice());
            }
        }
    }

    #[test]
    fn test_rate_change_reallocates() {
        let mut delay = DelayLine::new(SR, N);
        delay.set_latency(1.0, 96000);
        assert_eq!(delay.capacity(), delay_capacity(96000));
        assert_eq!(delay.latency_samples(), 96);
    }

    #[test]
    fn test_latency_conversion() {
        assert_eq!(latency_samples(10.0, SR), 480);
        assert_eq!(latency_samples(-3.0, SR), 0);
        assert_eq!(latency_samples(f32::NAN, SR), 0);
        assert!((max_latency_ms(SR, N) - 3994.666).abs() < 0.01);
    }
}
