use anyhow::Result;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::device;

/// The sample rate Opus is configured for. The capture device is forced to
/// this rate so no resampling stage is needed between capture and encode.
const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Size of the capture ring buffer in interleaved samples (~200ms at 48kHz stereo).
const CAPTURE_BUFFER_SAMPLES: usize = 48_000 * 2 / 5;

/// How long `read` sleeps between polls of the ring buffer while waiting
/// for enough samples to accumulate.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Captures the default audio sink's monitor source and exposes it as a
/// blocking, fixed-size `read` of interleaved stereo i16 PCM -- the shape
/// the Opus encoder consumes one chunk at a time.
///
/// Internally this is still a cpal callback stream writing into a
/// lock-free ring buffer; `read` just blocks (short-sleep polling) until
/// the ring buffer has accumulated a full chunk.
pub struct AudioCapturer {
    stream: cpal::Stream,
    consumer: HeapCons<i16>,
    channels: u16,
    sample_rate: u32,
    failed: Arc<AtomicBool>,
}

impl AudioCapturer {
    /// Start capturing the default sink's monitor source, upmixing or
    /// downmixing the device's native channel count to `channels`.
    pub fn new(channels: u16) -> Result<Self> {
        let device = device::get_monitor_device()?;
        let config = device.default_input_config()?;
        let device_channels = config.channels() as usize;
        let sample_format = config.sample_format();

        let rb = HeapRb::<i16>::new(CAPTURE_BUFFER_SAMPLES);
        let (mut producer, consumer) = rb.split();

        let fallback_rate = config.sample_rate().0;
        let (stream_config, actual_rate) = if fallback_rate == TARGET_SAMPLE_RATE {
            (
                StreamConfig {
                    channels: config.channels(),
                    sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
                    buffer_size: cpal::BufferSize::Default,
                },
                TARGET_SAMPLE_RATE,
            )
        } else {
            warn!(
                "monitor device default is {}Hz, not {}Hz -- audio quality may be degraded",
                fallback_rate, TARGET_SAMPLE_RATE
            );
            (
                StreamConfig {
                    channels: config.channels(),
                    sample_rate: config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                },
                fallback_rate,
            )
        };

        info!(
            device = device.name().unwrap_or_default(),
            sample_rate = actual_rate,
            device_channels,
            target_channels = channels,
            "starting audio capture"
        );

        let out_channels = channels as usize;
        let failed = Arc::new(AtomicBool::new(false));
        let failed_f32 = failed.clone();
        let failed_i16 = failed.clone();
        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_resampled_channels(&mut producer, data, device_channels, out_channels, |s| {
                        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    });
                },
                move |err| {
                    error!("audio capture error: {}", err);
                    failed_f32.store(true, Ordering::Relaxed);
                },
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push_resampled_channels(&mut producer, data, device_channels, out_channels, |s| s);
                },
                move |err| {
                    error!("audio capture error: {}", err);
                    failed_i16.store(true, Ordering::Relaxed);
                },
                None,
            )?,
            format => anyhow::bail!("unsupported monitor sample format: {:?}", format),
        };

        stream.play()?;

        Ok(Self { stream, consumer, channels, sample_rate: actual_rate, failed })
    }

    /// Block until `buf` is completely filled with interleaved i16 samples.
    ///
    /// Returns `false` without filling `buf` if the capture stream's error
    /// callback has fired -- the device is gone and waiting longer would
    /// just spin forever polling a ring buffer nothing will ever fill again.
    pub fn read(&mut self, buf: &mut [i16]) -> bool {
        let mut filled = 0;
        while filled < buf.len() {
            if self.failed.load(Ordering::Relaxed) {
                return false;
            }
            let n = self.consumer.pop_slice(&mut buf[filled..]);
            filled += n;
            if filled < buf.len() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
        true
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }

    pub fn play(&self) -> Result<()> {
        self.stream.play()?;
        Ok(())
    }
}

/// Convert one callback buffer from `device_channels` to `out_channels` and
/// push the result (converted via `to_i16`) into the ring buffer.
///
/// Mono -> stereo duplicates the single channel; N-channel -> stereo takes
/// the first two channels (or duplicates the one channel if the device is
/// mono but `out_channels` asks for more).
fn push_resampled_channels<S: Copy>(
    producer: &mut impl Producer<Item = i16>,
    data: &[S],
    device_channels: usize,
    out_channels: usize,
    to_i16: impl Fn(S) -> i16,
) {
    for frame in data.chunks(device_channels) {
        for ch in 0..out_channels {
            let sample = frame[ch.min(frame.len() - 1)];
            let _ = producer.try_push(to_i16(sample));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::push_resampled_channels;
    use ringbuf::traits::Split;
    use ringbuf::HeapRb;

    #[test]
    fn mono_to_stereo_duplicates_channel() {
        let rb = HeapRb::<i16>::new(16);
        let (mut producer, mut consumer) = rb.split();
        push_resampled_channels(&mut producer, &[1000i16, 2000i16], 1, 2, |s| s);
        let mut out = vec![0i16; 4];
        let n = ringbuf::traits::Consumer::pop_slice(&mut consumer, &mut out);
        assert_eq!(n, 4);
        assert_eq!(out, vec![1000, 1000, 2000, 2000]);
    }

    #[test]
    fn stereo_passthrough() {
        let rb = HeapRb::<i16>::new(16);
        let (mut producer, mut consumer) = rb.split();
        push_resampled_channels(&mut producer, &[10i16, 20i16, 30i16, 40i16], 2, 2, |s| s);
        let mut out = vec![0i16; 4];
        ringbuf::traits::Consumer::pop_slice(&mut consumer, &mut out);
        assert_eq!(out, vec![10, 20, 30, 40]);
    }

    #[test]
    fn f32_to_i16_scaling() {
        let rb = HeapRb::<i16>::new(4);
        let (mut producer, mut consumer) = rb.split();
        push_resampled_channels(&mut producer, &[1.0f32, -1.0f32], 1, 1, |s| {
            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        });
        let mut out = vec![0i16; 2];
        ringbuf::traits::Consumer::pop_slice(&mut consumer, &mut out);
        assert_eq!(out[0], i16::MAX);
        assert_eq!(out[1], -i16::MAX);
    }
}
