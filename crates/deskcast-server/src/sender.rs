use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use deskcast_protocol::stream::{TAG_AUDIO, TAG_VIDEO};
use tungstenite::{Message, WebSocket};

/// Multiplexes the outbound video and audio streams onto one WebSocket,
/// prefixing every binary message with a one-byte stream tag.
///
/// A single mutex serializes writes from the video and audio threads; there
/// is no internal queue, so a slow client applies backpressure straight
/// through to whichever producer thread is currently blocked in `send`.
pub struct Sender<S: Read + Write = TcpStream> {
    ws: Mutex<WebSocket<S>>,
}

impl<S: Read + Write> Sender<S> {
    pub fn new(ws: WebSocket<S>) -> Self {
        Self { ws: Mutex::new(ws) }
    }

    pub fn send_video(&self, payload: &[u8]) -> tungstenite::Result<()> {
        self.send_tagged(TAG_VIDEO, payload)
    }

    pub fn send_audio(&self, payload: &[u8]) -> tungstenite::Result<()> {
        self.send_tagged(TAG_AUDIO, payload)
    }

    fn send_tagged(&self, tag: u8, payload: &[u8]) -> tungstenite::Result<()> {
        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.push(tag);
        framed.extend_from_slice(payload);
        let mut ws = self.ws.lock().unwrap();
        ws.send(Message::Binary(framed.into()))
    }
}

/// An in-memory duplex stub: `Write` appends to a shared buffer, `Read`
/// always reports EOF. Good enough to drive a server-role `WebSocket` that
/// only ever writes.
#[cfg(test)]
#[derive(Default)]
struct RecordingStream {
    written: std::sync::Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl Read for RecordingStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
impl Write for RecordingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tungstenite::protocol::Role;

    fn new_test_sender() -> (Sender<RecordingStream>, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let stream = RecordingStream { written: written.clone() };
        let ws = WebSocket::from_raw_socket(stream, Role::Server, None);
        (Sender::new(ws), written)
    }

    /// The tag byte immediately precedes the payload inside the WebSocket
    /// frame's unmasked payload bytes -- we don't try to parse the frame
    /// header here, only assert the payload our code handed to `send`
    /// round-trips through the real WebSocket encoder.
    #[test]
    fn video_and_audio_frames_carry_distinct_tags() {
        let (sender, written) = new_test_sender();
        sender.send_video(b"vvv").unwrap();
        sender.send_audio(b"aaa").unwrap();

        let bytes = written.lock().unwrap();
        // Both payloads (with their tag byte) must appear, in the order sent.
        let video_pos = bytes.windows(4).position(|w| w == [TAG_VIDEO, b'v', b'v', b'v']);
        let audio_pos = bytes.windows(4).position(|w| w == [TAG_AUDIO, b'a', b'a', b'a']);
        assert!(video_pos.is_some());
        assert!(audio_pos.is_some());
        assert!(video_pos.unwrap() < audio_pos.unwrap());
    }

    #[test]
    fn concurrent_sends_do_not_interleave_a_single_message() {
        use std::thread;

        let (sender, written) = new_test_sender();
        let sender = Arc::new(sender);
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let sender = sender.clone();
            handles.push(thread::spawn(move || {
                sender.send_video(&[i; 64]).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Every one of the 8 distinct payload bytes appears as a contiguous
        // 64-byte run somewhere in the output -- if two sends had
        // interleaved under the lock, no single contiguous run would match.
        let bytes = written.lock().unwrap();
        for i in 0..8u8 {
            let run = vec![i; 64];
            assert!(bytes.windows(64).any(|w| w == run.as_slice()), "byte {i} run missing or interleaved");
        }
    }
}
