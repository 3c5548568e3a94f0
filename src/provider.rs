//! PCM frame provider: a seekable, cached source of fixed-size PCM
//! frames indexed by frame number.
//!
//! The trait is synchronous, not streaming: the scheduler pulls exactly
//! one frame per audio packet, by index, and never awaits the provider.

use bytes::Bytes;

use crate::config::pcm_frame_bytes;

/// Result of asking the provider for one frame.
#[derive(Debug, Clone)]
pub enum PcmFrame {
    /// `index` was negative (a pause-rewind artifact); return silence of
    /// the standard frame size.
    Silence,
    /// A full `FRAMES_PER_PACKET`-sample frame.
    Frame(Bytes),
    /// `index` is at or past `total_frames()`.
    Eos,
}

/// A seekable, cached PCM source. Consumed only by the scheduler,
/// single-reader, so implementations need no internal synchronization
/// beyond what `Send + Sync` already requires for the scheduler task to
/// hold a reference across `.await` points.
pub trait PcmProvider: Send + Sync {
    /// Total number of `FRAMES_PER_PACKET`-sized frames in the track.
    fn total_frames(&self) -> u64;

    /// Fetch the frame at `index`. Negative indices (from a pause-rewind)
    /// must return [`PcmFrame::Silence`]; indices at or past
    /// [`Self::total_frames`] must return [`PcmFrame::Eos`].
    fn frame(&self, index: i64) -> PcmFrame;
}

/// A provider backed by an in-memory PCM buffer, for tests and for sources
/// small enough to decode up front.
pub struct InMemoryPcmProvider {
    samples: Bytes,
    frame_bytes: usize,
}

impl InMemoryPcmProvider {
    /// Wrap raw interleaved 16-bit stereo PCM. `samples.len()` need not be
    /// an exact multiple of the frame size; the final partial frame is
    /// zero-padded to `FRAMES_PER_PACKET` samples.
    #[must_use]
    pub fn new(samples: impl Into<Bytes>) -> Self {
        Self { samples: samples.into(), frame_bytes: pcm_frame_bytes() }
    }
}

impl PcmProvider for InMemoryPcmProvider {
    fn total_frames(&self) -> u64 {
        self.samples.len().div_ceil(self.frame_bytes) as u64
    }

    fn frame(&self, index: i64) -> PcmFrame {
        if index < 0 {
            return PcmFrame::Silence;
        }
        if index as u64 >= self.total_frames() {
            return PcmFrame::Eos;
        }

        let start = index as usize * self.frame_bytes;
        let end = (start + self.frame_bytes).min(self.samples.len());
        let slice = self.samples.slice(start..end);

        if slice.len() == self.frame_bytes {
            PcmFrame::Frame(slice)
        } else {
            let mut padded = vec![0u8; self.frame_bytes];
            padded[..slice.len()].copy_from_slice(&slice);
            PcmFrame::Frame(Bytes::from(padded))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_is_silence() {
        let provider = InMemoryPcmProvider::new(vec![1u8; pcm_frame_bytes() * 2]);
        assert!(matches!(provider.frame(-1), PcmFrame::Silence));
        assert!(matches!(provider.frame(-281), PcmFrame::Silence));
    }

    #[test]
    fn index_past_total_is_eos() {
        let provider = InMemoryPcmProvider::new(vec![1u8; pcm_frame_bytes() * 2]);
        assert_eq!(provider.total_frames(), 2);
        assert!(matches!(provider.frame(2), PcmFrame::Eos));
        assert!(matches!(provider.frame(1000), PcmFrame::Eos));
    }

    #[test]
    fn in_range_index_returns_full_frame() {
        let provider = InMemoryPcmProvider::new(vec![7u8; pcm_frame_bytes() * 2]);
        match provider.frame(0) {
            PcmFrame::Frame(bytes) => assert_eq!(bytes.len(), pcm_frame_bytes()),
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn final_partial_frame_is_zero_padded() {
        let frame_bytes = pcm_frame_bytes();
        let provider = InMemoryPcmProvider::new(vec![9u8; frame_bytes + frame_bytes / 2]);
        assert_eq!(provider.total_frames(), 2);
        match provider.frame(1) {
            PcmFrame::Frame(bytes) => {
                assert_eq!(bytes.len(), frame_bytes);
                assert!(bytes[..frame_bytes / 2].iter().all(|&b| b == 9));
                assert!(bytes[frame_bytes / 2..].iter().all(|&b| b == 0));
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }
}
