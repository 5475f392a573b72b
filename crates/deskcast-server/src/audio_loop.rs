use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deskcast_audio::{AudioCapturer, Encoder};
use tracing::{error, warn};

use crate::sender::Sender;

/// Runs the audio producer loop: block for one PCM chunk, encode it to
/// Opus, send it. No scheduler is needed here -- `AudioCapturer::read`
/// already blocks until exactly one chunk's worth of samples has
/// accumulated, which paces this loop the same way the deadline loop
/// paces the video thread.
pub fn run_audio_loop(
    mut capturer: AudioCapturer,
    mut encoder: Encoder,
    sender: Arc<Sender<TcpStream>>,
    chunk_samples: usize,
    running: Arc<AtomicBool>,
) {
    let mut pcm = vec![0i16; chunk_samples];

    while running.load(Ordering::Relaxed) {
        if !capturer.read(&mut pcm) {
            error!("audio loop: capture failed, stopping");
            running.store(false, Ordering::Relaxed);
            break;
        }

        let packet = match encoder.encode(&pcm) {
            Ok(p) => p,
            Err(e) => {
                error!("audio loop: encode failed, stopping: {e}");
                running.store(false, Ordering::Relaxed);
                break;
            }
        };

        if let Err(e) = sender.send_audio(&packet) {
            warn!("audio loop: send failed, stopping: {e}");
            running.store(false, Ordering::Relaxed);
            return;
        }
    }
}
