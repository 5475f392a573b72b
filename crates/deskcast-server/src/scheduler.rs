use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deskcast_display::Grabber;
use deskcast_protocol::config::Config;
use deskcast_video::{Converter, Encoder};
use tracing::{error, warn};

use crate::sender::Sender;

/// Runs the video producer loop: grab -> composite cursor -> convert ->
/// encode -> send, once per configured frame period.
///
/// On a late frame the next deadline is `t4 + period` (the send-complete
/// timestamp plus one period), not a reset to a pure `now + period` -- a
/// late frame's deadline slip is carried forward rather than silently
/// forgiven, so a sequence of late frames does not quietly resynchronize
/// to wall-clock time.
pub fn run_video_loop(
    mut grabber: Grabber,
    converter: Converter,
    mut encoder: Encoder,
    sender: Arc<Sender<TcpStream>>,
    config: &Config,
    running: Arc<AtomicBool>,
) {
    let period = config.frame_period();
    let width = config.capture_rect.width as usize;
    let height = config.capture_rect.height as usize;
    let y_size = width * height;
    let uv_w = width.div_ceil(2);
    let uv_h = height.div_ceil(2);
    let uv_size = uv_w * uv_h;

    let mut i420 = vec![0u8; y_size + 2 * uv_size];
    let mut target = Instant::now();

    while running.load(Ordering::Relaxed) {
        let _t1 = Instant::now();
        let frame = match grabber.grab_frame() {
            Ok(f) => f,
            Err(e) => {
                error!("video loop: capture failed, stopping: {e}");
                running.store(false, Ordering::Relaxed);
                break;
            }
        };
        let _t2 = Instant::now();

        {
            let (y, rest) = i420.split_at_mut(y_size);
            let (u, v) = rest.split_at_mut(uv_size);
            converter.convert(&frame.data, width * 4, y, width, u, uv_w, v, uv_w);
        }
        let _t3 = Instant::now();

        let encoded = match encoder.encode(&i420, false) {
            Ok(f) => f,
            Err(e) => {
                error!("video loop: encode failed, stopping: {e}");
                running.store(false, Ordering::Relaxed);
                break;
            }
        };

        for access_unit in encoded {
            if let Err(e) = sender.send_video(&access_unit.data) {
                warn!("video loop: send failed, stopping: {e}");
                running.store(false, Ordering::Relaxed);
                return;
            }
        }
        let t4 = Instant::now();

        if t4 < target {
            std::thread::sleep(target - t4);
            target += period;
        } else {
            warn!(lateness_ms = (t4 - target).as_secs_f64() * 1000.0, "video frame deadline missed");
            target = t4 + period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the deadline-update rule in isolation, without a real
    /// capture/encode pipeline: a late `t4` must push `target` to
    /// `t4 + period`, not reset it to `now + period`.
    #[test]
    fn late_frame_carries_slip_forward() {
        let period = Duration::from_millis(16);
        let target = Instant::now();
        let t4 = target + Duration::from_millis(50); // 34ms late
        let new_target = if t4 < target { target + period } else { t4 + period };
        assert_eq!(new_target, t4 + period);
        assert!(new_target > target + period, "slip must be carried, not reset");
    }

    #[test]
    fn on_time_frame_advances_by_exactly_one_period() {
        let period = Duration::from_millis(16);
        let mut target = Instant::now() + Duration::from_millis(5);
        let before = target;
        target += period;
        assert_eq!(target, before + period);
    }
}
