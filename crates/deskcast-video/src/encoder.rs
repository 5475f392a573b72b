use anyhow::{anyhow, bail, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, encoder};
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Dictionary, Rational};
use std::sync::Once;
use tracing::info;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// A low-latency H.264 encoder for the outbound video stream.
///
/// Always baseline profile / no B-frames / zerolatency tuning: this is a
/// live screen feed, not a file to be archived, so every setting trades
/// compression efficiency for the lowest possible encode delay.
pub struct Encoder {
    encoder: encoder::Video,
    width: u32,
    height: u32,
    frame_index: i64,
    gop_size: u32,
}

// SAFETY: the FFmpeg encoder context holds raw pointers and is not Send by
// default, but it is only ever driven from the single video thread that
// owns this `Encoder`.
unsafe impl Send for Encoder {}

/// One encoded access unit emitted by `encode`/`encode_video_frame`.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    pub pts: i64,
}

impl Encoder {
    /// Open the libx264 software encoder with baseline/ultrafast/zerolatency
    /// settings and a periodic keyframe every `gop_size` frames.
    ///
    /// `width` and `height` must be divisible by 2. `bitrate_bps` is the
    /// target bitrate in bits per second; `fps` the target frame rate.
    pub fn new(width: u32, height: u32, bitrate_bps: u32, fps: u32, gop_size: u32) -> Result<Self> {
        if width % 2 != 0 || height % 2 != 0 {
            bail!("video encoder: width and height must be divisible by 2");
        }

        init_ffmpeg();

        let codec = encoder::find_by_name("libx264")
            .ok_or_else(|| anyhow!("libx264 codec not found (is FFmpeg built with x264?)"))?;

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("failed to create encoder context")?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(Rational::new(1, fps as i32));
        encoder.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        encoder.set_bit_rate(bitrate_bps as usize);
        encoder.set_max_b_frames(0);
        encoder.set_gop(gop_size);
        encoder.set_flags(codec::Flags::LOW_DELAY);

        let mut opts = Dictionary::new();
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");
        opts.set("profile", "baseline");

        let encoder = encoder
            .open_with(opts)
            .context("libx264: failed to open encoder")?;

        info!("video encoder: libx264 baseline, {}x{} @ {}fps, {} bps, gop {}", width, height, fps, bitrate_bps, gop_size);

        Ok(Self { encoder, width, height, frame_index: 0, gop_size })
    }

    /// Encode one I420 frame (width*height*3/2 bytes: Y plane, U plane, V plane).
    ///
    /// `force_keyframe` requests an IDR regardless of GOP position; a
    /// keyframe is also forced automatically every `gop_size` frames so a
    /// viewer that just connected is never stuck waiting past one GOP.
    pub fn encode(&mut self, i420_data: &[u8], force_keyframe: bool) -> Result<Vec<EncodedFrame>> {
        let expected_size = (self.width as usize) * (self.height as usize) * 3 / 2;
        if i420_data.len() < expected_size {
            bail!(
                "video encoder: I420 data too short (got {}, expected {})",
                i420_data.len(),
                expected_size
            );
        }

        let pts = self.frame_index;
        let mut frame = Video::new(Pixel::YUV420P, self.width, self.height);
        frame.set_pts(Some(pts));

        let force_keyframe =
            force_keyframe || (self.gop_size > 0 && pts % self.gop_size as i64 == 0);
        if force_keyframe {
            frame.set_kind(ffmpeg::picture::Type::I);
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let uv_w = w.div_ceil(2);
        let uv_h = h.div_ceil(2);
        let y_size = w * h;
        let uv_size = uv_w * uv_h;

        let y_stride = frame.stride(0);
        let y_dst = frame.data_mut(0);
        for row in 0..h {
            let src_off = row * w;
            let dst_off = row * y_stride;
            y_dst[dst_off..dst_off + w].copy_from_slice(&i420_data[src_off..src_off + w]);
        }

        let u_stride = frame.stride(1);
        let u_dst = frame.data_mut(1);
        let u_src_base = y_size;
        for row in 0..uv_h {
            let src_off = u_src_base + row * uv_w;
            let dst_off = row * u_stride;
            u_dst[dst_off..dst_off + uv_w].copy_from_slice(&i420_data[src_off..src_off + uv_w]);
        }

        let v_stride = frame.stride(2);
        let v_dst = frame.data_mut(2);
        let v_src_base = y_size + uv_size;
        for row in 0..uv_h {
            let src_off = v_src_base + row * uv_w;
            let dst_off = row * v_stride;
            v_dst[dst_off..dst_off + uv_w].copy_from_slice(&i420_data[src_off..src_off + uv_w]);
        }

        self.frame_index += 1;
        self.drain_after_send(&frame, pts)
    }

    fn drain_after_send(&mut self, frame: &Video, pts: i64) -> Result<Vec<EncodedFrame>> {
        self.encoder.send_frame(frame).context("video encoder: failed to send frame")?;

        let mut frames = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let data = packet.data().unwrap_or(&[]).to_vec();
            let is_keyframe = packet.is_key();
            frames.push(EncodedFrame { data, is_keyframe, pts: packet.pts().unwrap_or(pts) });
        }
        Ok(frames)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let _ = self.encoder.send_eof();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_new_valid() {
        let enc = Encoder::new(640, 480, 6_000_000, 60, 120);
        assert!(enc.is_ok());
        let enc = enc.unwrap();
        assert_eq!(enc.width(), 640);
        assert_eq!(enc.height(), 480);
    }

    #[test]
    fn encoder_odd_dimensions_fails() {
        let enc = Encoder::new(641, 480, 6_000_000, 60, 120);
        assert!(enc.is_err());
    }

    #[test]
    fn encoder_encode_gray_frame_is_keyframe() {
        let mut enc = Encoder::new(64, 64, 1_000_000, 30, 120).unwrap();
        let y_size = 64 * 64;
        let uv_size = 32 * 32;
        let i420 = vec![128u8; y_size + 2 * uv_size];
        let frames = enc.encode(&i420, true).unwrap();
        assert!(!frames.is_empty());
        assert!(!frames[0].data.is_empty());
        assert!(frames[0].is_keyframe);
    }

    #[test]
    fn encoder_forces_keyframe_every_gop() {
        let mut enc = Encoder::new(64, 64, 1_000_000, 30, 4).unwrap();
        let y_size = 64 * 64;
        let uv_size = 32 * 32;
        let i420 = vec![100u8; y_size + 2 * uv_size];
        let mut saw_keyframe_at_4 = false;
        for i in 0..8 {
            let frames = enc.encode(&i420, false).unwrap();
            if i == 4 && frames.iter().any(|f| f.is_keyframe) {
                saw_keyframe_at_4 = true;
            }
        }
        assert!(saw_keyframe_at_4);
    }

    #[test]
    fn encoder_too_short_input_errors() {
        let mut enc = Encoder::new(64, 64, 1_000_000, 30, 120).unwrap();
        assert!(enc.encode(&[0u8; 10], true).is_err());
    }
}
