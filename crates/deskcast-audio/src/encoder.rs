use anyhow::Result;
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Bitrate, Channels, SampleRate};

/// Samples per channel in one Opus frame (20ms at 48kHz).
pub const OPUS_FRAME_SIZE: usize = 960;

/// Wraps the Opus encoder configured for the desktop audio feed: stereo,
/// 48kHz, `Application::Audio` (tuned for general/mixed content rather than
/// voice), at a configurable constant bitrate.
pub struct Encoder {
    inner: OpusEncoder,
    channels: u16,
}

impl Encoder {
    /// `bitrate_bps` is the target constant bitrate in bits per second.
    pub fn new(channels: u16, bitrate_bps: i32) -> Result<Self> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => anyhow::bail!("unsupported channel count: {n} (Opus here supports mono or stereo)"),
        };

        let mut encoder = OpusEncoder::new(SampleRate::Hz48000, opus_channels, Application::Audio)?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(bitrate_bps))?;

        Ok(Self { inner: encoder, channels })
    }

    /// Encode one chunk of interleaved i16 PCM.
    ///
    /// `pcm` must contain exactly `OPUS_FRAME_SIZE * channels` interleaved
    /// samples (960 samples per channel).
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let expected = OPUS_FRAME_SIZE * self.channels as usize;
        assert_eq!(pcm.len(), expected, "PCM chunk must be exactly {expected} interleaved samples");

        // 4000 bytes comfortably covers one 20ms frame at 128 kbit/s plus headroom.
        let mut output = vec![0u8; 4000];
        let len = self.inner.encode(pcm, &mut output)?;
        output.truncate(len);
        Ok(output)
    }

    pub fn frame_size(&self) -> usize {
        OPUS_FRAME_SIZE
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        48_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stereo_encoder() {
        let enc = Encoder::new(2, 128_000).unwrap();
        assert_eq!(enc.channels(), 2);
        assert_eq!(enc.frame_size(), OPUS_FRAME_SIZE);
        assert_eq!(enc.sample_rate(), 48_000);
    }

    #[test]
    fn rejects_unsupported_channel_count() {
        assert!(Encoder::new(6, 128_000).is_err());
    }

    #[test]
    fn encode_silence_produces_small_packet() {
        let mut enc = Encoder::new(2, 128_000).unwrap();
        let pcm = vec![0i16; OPUS_FRAME_SIZE * 2];
        let packet = enc.encode(&pcm).unwrap();
        assert!(!packet.is_empty());
    }

    #[test]
    #[should_panic]
    fn encode_wrong_length_panics() {
        let mut enc = Encoder::new(2, 128_000).unwrap();
        let pcm = vec![0i16; 100];
        let _ = enc.encode(&pcm);
    }
}
