use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deskcast_display::InputInjector;
use deskcast_protocol::control;
use tracing::{info, warn};
use tungstenite::{Message, WebSocket};

/// Runs the Control Reader: pulls inbound text frames off the WebSocket's
/// read half and replays them as input events.
///
/// A malformed JSON payload is logged and skipped -- it does not terminate
/// the session, since one bad frame from a flaky client shouldn't drop the
/// whole connection. An unrecognized `type` is silently ignored (see
/// `deskcast_protocol::control::parse`).
pub fn run_control_loop(
    mut ws: WebSocket<TcpStream>,
    mut injector: InputInjector,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        let message = match ws.read() {
            Ok(m) => m,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                warn!("control loop: read failed, stopping: {e}");
                break;
            }
        };

        let text = match message {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        match control::parse(&text) {
            Ok(Some(msg)) => {
                if let Err(e) = injector.dispatch(msg) {
                    warn!("control loop: dispatch failed: {e}");
                }
            }
            Ok(None) => { /* unknown or irrelevant message type; ignored */ }
            Err(e) => warn!("control loop: malformed control message, skipping: {e}"),
        }
    }

    running.store(false, Ordering::Relaxed);
    info!("control loop: exiting");
}
