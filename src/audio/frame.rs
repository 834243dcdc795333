//! Fixed-size frame assembly for the capture path.
//!
//! Device callbacks deliver buffers of whatever size the backend picks; the
//! uplink wants exactly `CAPTURE_FRAME_SIZE` samples per chunk.

use crate::defaults;

/// Collects variable-length sample buffers into fixed-length frames.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAccumulator {
    /// Creates an accumulator producing frames of `frame_size` samples.
    ///
    /// A zero size is treated as one sample per frame.
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Appends samples and calls `emit` once for every completed frame, in order.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        let mut rest = samples;
        while !rest.is_empty() {
            let needed = self.frame_size - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Number of samples waiting for the next frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops any partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(defaults::CAPTURE_FRAME_SIZE)
    }
}

/// Average interleaved multi-channel samples down to mono.
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx.min(samples.len() - 1)]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_emits_exact_frames_across_callbacks() {
        let mut acc = FrameAccumulator::new(4);
        let mut frames: Vec<Vec<f32>> = Vec::new();

        acc.push(&[1.0, 2.0, 3.0], |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        assert_eq!(acc.pending_len(), 3);

        acc.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f.to_vec()));
        assert_eq!(
            frames,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(acc.pending_len(), 1);
    }

    #[test]
    fn test_accumulator_clear_drops_partial_frame() {
        let mut acc = FrameAccumulator::new(4);
        acc.push(&[1.0, 2.0], |_| panic!("no frame expected"));
        acc.clear();

        let mut frames = Vec::new();
        acc.push(&[3.0, 4.0, 5.0, 6.0], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![3.0, 4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_accumulator_default_uses_capture_frame_size() {
        assert_eq!(FrameAccumulator::default().frame_size(), 4096);
    }

    #[test]
    fn test_accumulator_zero_size_does_not_loop_forever() {
        let mut acc = FrameAccumulator::new(0);
        let mut count = 0;
        acc.push(&[0.1, 0.2], |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_mix_to_mono_averages_channels() {
        let stereo = [0.5, -0.5, 1.0, 0.0];
        assert_eq!(mix_to_mono(&stereo, 2), vec![0.0, 0.5]);
        assert_eq!(mix_to_mono(&stereo, 1), stereo.to_vec());
    }

    #[test]
    fn test_resample_identity_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample_from_48k() {
        let samples = vec![0.0f32; 4800];
        assert_eq!(resample(&samples, 48000, 16000).len(), 1600);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let resampled = resample(&[0.0, 1.0], 12000, 24000);
        assert_eq!(resampled.len(), 4);
        assert_eq!(resampled[0], 0.0);
        assert!((resampled[1] - 0.5).abs() < 1e-6);
        assert_eq!(resampled[2], 1.0);
    }

    #[test]
    fn test_resample_handles_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
