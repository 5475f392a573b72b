use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use deskcast_audio::{AudioCapturer, Encoder as AudioEncoder};
use deskcast_display::{Grabber, InputInjector};
use deskcast_protocol::config::Config;
use deskcast_protocol::{DeskcastError, Result};
use deskcast_video::{Converter, Encoder as VideoEncoder};
use tracing::{error, info};
use tungstenite::WebSocket;

use crate::audio_loop::run_audio_loop;
use crate::control::run_control_loop;
use crate::scheduler::run_video_loop;
use crate::sender::Sender;

/// Owns the three worker threads (video, audio, control) for one connected
/// viewer. Dropping the last `Arc<Session>` has no special behavior by
/// itself -- shutdown is driven by `running` flipping to false, which each
/// loop observes at its own natural blocking point (end of one frame
/// period, one PCM chunk, or one WebSocket read).
pub struct Session {
    running: Arc<AtomicBool>,
    video: Option<JoinHandle<()>>,
    audio: Option<JoinHandle<()>>,
    control: Option<JoinHandle<()>>,
}

impl Session {
    /// Take ownership of an upgraded WebSocket and spin up the session's
    /// three threads. `ws` is used for outbound video/audio; a clone of its
    /// underlying socket is framed separately for inbound control messages,
    /// since tungstenite's `WebSocket` does not support splitting a single
    /// instance across threads.
    pub fn spawn(ws: WebSocket<TcpStream>, config: Config) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        let control_stream = ws.get_ref().try_clone()?;
        let control_ws = WebSocket::from_raw_socket(control_stream, tungstenite::protocol::Role::Server, None);

        let sender = Arc::new(Sender::new(ws));

        let display_name = None; // use $DISPLAY
        let grabber = Grabber::new(display_name, config.capture_rect)
            .map_err(|e| DeskcastError::Capture(e.to_string()))?;
        let root = grabber.root_window();
        let conn = grabber.connection().clone();

        let converter = Converter::new(config.converter_threads, config.capture_rect.width as usize, config.capture_rect.height as usize);
        let video_encoder = VideoEncoder::new(
            config.capture_rect.width as u32,
            config.capture_rect.height as u32,
            config.video_bitrate,
            config.fps,
            config.gop_size,
        )
        .map_err(|e| DeskcastError::Encode(e.to_string()))?;

        let capturer = AudioCapturer::new(config.audio_channels)
            .map_err(|e| DeskcastError::Audio(e.to_string()))?;
        let audio_encoder = AudioEncoder::new(config.audio_channels, config.opus_bitrate)
            .map_err(|e| DeskcastError::Opus(e.to_string()))?;

        let injector = InputInjector::new(conn, root);

        let video_running = running.clone();
        let video_sender = sender.clone();
        let video_config = config.clone();
        let video = std::thread::spawn(move || {
            run_video_loop(grabber, converter, video_encoder, video_sender, &video_config, video_running);
        });

        let audio_running = running.clone();
        let audio_sender = sender.clone();
        let chunk_samples = config.audio_frame_samples as usize * config.audio_channels as usize;
        let audio = std::thread::spawn(move || {
            run_audio_loop(capturer, audio_encoder, audio_sender, chunk_samples, audio_running);
        });

        let control_running = running.clone();
        let control = std::thread::spawn(move || {
            run_control_loop(control_ws, injector, control_running);
        });

        info!("session: spawned video/audio/control threads");

        Ok(Self { running, video: Some(video), audio: Some(audio), control: Some(control) })
    }

    /// Block until the session ends, then tear everything down.
    ///
    /// The control thread's read loop is the natural end-of-session signal
    /// (it returns when the client disconnects or sends Close); once it
    /// exits, `running` is flipped and the video/audio threads are joined
    /// at their own next natural blocking point.
    pub fn wait(mut self) {
        if let Some(control) = self.control.take() {
            if let Err(e) = control.join() {
                error!("session: control thread panicked: {e:?}");
            }
        }

        self.running.store(false, Ordering::Relaxed);

        for handle in [self.video.take(), self.audio.take()].into_iter().flatten() {
            if let Err(e) = handle.join() {
                error!("session: worker thread panicked: {e:?}");
            }
        }
    }
}
