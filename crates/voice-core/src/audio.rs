//! Audio frame types shared by the speech pools and the media handler.

use std::sync::Arc;
use std::time::Instant;

/// Sample rates used across the media core.
///
/// 16 kHz is the default wire format (§6); 24 kHz appears only for
/// passthrough calls whose external realtime service requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleRate {
    #[default]
    Hz16000,
    Hz24000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
        }
    }

    /// Samples in a 20ms frame at this rate.
    pub fn frame_size_20ms(&self) -> usize {
        (self.as_u32() as usize * 20) / 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channels {
    #[default]
    Mono,
}

impl Channels {
    pub fn count(&self) -> usize {
        1
    }
}

/// One frame of PCM audio moving through ingress or egress.
///
/// Every frame carries the `turn_epoch` of the turn it belongs to (0 for
/// frames not produced inside a turn, e.g. a greeting). The egress boundary
/// uses this tag to discard frames belonging to a cancelled turn (§4.4
/// step 7, tested by invariant 3 in §8).
#[derive(Clone)]
pub struct AudioFrame {
    pub samples: Arc<[i16]>,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    pub sequence: u64,
    pub turn_epoch: u64,
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn new(
        samples: Vec<i16>,
        sample_rate: SampleRate,
        channels: Channels,
        sequence: u64,
        turn_epoch: u64,
    ) -> Self {
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
            sequence,
            turn_epoch,
            captured_at: Instant::now(),
        }
    }

    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: SampleRate, turn_epoch: u64) -> Self {
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self::new(samples, sample_rate, Channels::Mono, 0, turn_epoch)
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .field("turn_epoch", &self.turn_epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_round_trip() {
        let frame = AudioFrame::new(vec![1, -1, 32767, -32768], SampleRate::Hz16000, Channels::Mono, 0, 3);
        let bytes = frame.to_pcm_bytes();
        let back = AudioFrame::from_pcm_bytes(&bytes, SampleRate::Hz16000, 3);
        assert_eq!(&*back.samples, &*frame.samples);
    }
}
