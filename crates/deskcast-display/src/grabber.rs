use std::sync::Arc;

use deskcast_protocol::config::CaptureRect;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::ImageFormat;
use x11rb::rust_connection::RustConnection;

use crate::error::DisplayError;

/// One BGRA frame grabbed from the root window, with the desktop cursor
/// already composited on top.
pub struct RawFrame {
    pub width: u16,
    pub height: u16,
    /// Packed BGRA, 4 bytes per pixel, tightly strided (stride == width*4).
    pub data: Vec<u8>,
}

/// Captures a fixed rectangle of the root window via the X11 MIT-SHM
/// extension, compositing the XFixes cursor image onto every grabbed frame.
pub struct Grabber {
    conn: Arc<RustConnection>,
    root: u32,
    rect: CaptureRect,
    shmseg: u32,
    shmid: i32,
    shm_addr: *mut u8,
    shm_size: usize,
}

// SAFETY: `shm_addr` points at a System V shared memory segment this
// process owns exclusively; it is only ever touched from the single
// thread that owns the `Grabber`.
unsafe impl Send for Grabber {}

impl Grabber {
    pub fn new(display_name: Option<&str>, rect: CaptureRect) -> Result<Self, DisplayError> {
        let (conn, screen_num) = x11rb::connect(display_name)
            .map_err(|e| DisplayError::Connect(e.to_string()))?;
        let conn = Arc::new(conn);

        conn.shm_query_version()
            .map_err(|e| DisplayError::Capture(e.to_string()))?
            .reply()
            .map_err(|e| DisplayError::Capture(format!("MIT-SHM unavailable: {e}")))?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        let shm_size = rect.width as usize * rect.height as usize * 4;
        let shmid = unsafe {
            libc::shmget(libc::IPC_PRIVATE, shm_size, libc::IPC_CREAT | 0o600)
        };
        if shmid < 0 {
            return Err(DisplayError::Capture("shmget failed".into()));
        }
        let shm_addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) } as *mut u8;
        if shm_addr as isize == -1 {
            unsafe { libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut()) };
            return Err(DisplayError::Capture("shmat failed".into()));
        }

        let shmseg = conn.generate_id().map_err(|e| DisplayError::Capture(e.to_string()))?;
        conn.shm_attach(shmseg, shmid as u32, false)
            .map_err(|e| DisplayError::Capture(e.to_string()))?
            .check()
            .map_err(|e| DisplayError::Capture(e.to_string()))?;

        Ok(Self { conn, root, rect, shmseg, shmid, shm_addr, shm_size })
    }

    /// Grab one frame of the configured capture rectangle, with the cursor
    /// composited on top.
    pub fn grab_frame(&mut self) -> Result<RawFrame, DisplayError> {
        let reply = self
            .conn
            .shm_get_image(
                self.root,
                self.rect.x,
                self.rect.y,
                self.rect.width,
                self.rect.height,
                !0,
                ImageFormat::Z_PIXMAP.into(),
                self.shmseg,
                0,
            )
            .map_err(|e| DisplayError::Capture(e.to_string()))?
            .reply()
            .map_err(|e| DisplayError::Capture(e.to_string()))?;
        let _ = reply;

        let mut data = vec![0u8; self.shm_size];
        // SAFETY: the X server has just finished writing shm_size bytes
        // into this segment before replying to GetImage.
        unsafe {
            std::ptr::copy_nonoverlapping(self.shm_addr, data.as_mut_ptr(), self.shm_size);
        }

        self.composite_cursor(&mut data);

        Ok(RawFrame { width: self.rect.width, height: self.rect.height, data })
    }

    /// Blend the XFixes cursor image onto `data` at its position relative
    /// to the capture rectangle, honoring the cursor's hotspot offset and
    /// skipping fully-transparent pixels.
    fn composite_cursor(&self, data: &mut [u8]) {
        let cursor = match self.conn.xfixes_get_cursor_image() {
            Ok(cookie) => match cookie.reply() {
                Ok(c) => c,
                Err(e) => {
                    warn!("xfixes get_cursor_image reply failed: {e}");
                    return;
                }
            },
            Err(e) => {
                warn!("xfixes get_cursor_image request failed: {e}");
                return;
            }
        };

        let cursor_x = cursor.x as i32 - cursor.xhot as i32 - self.rect.x as i32;
        let cursor_y = cursor.y as i32 - cursor.yhot as i32 - self.rect.y as i32;
        let cw = cursor.width as i32;
        let ch = cursor.height as i32;
        let width = self.rect.width as i32;
        let height = self.rect.height as i32;

        for row in 0..ch {
            let dst_y = cursor_y + row;
            if dst_y < 0 || dst_y >= height {
                continue;
            }
            for col in 0..cw {
                let dst_x = cursor_x + col;
                if dst_x < 0 || dst_x >= width {
                    continue;
                }
                let argb = cursor.cursor_image[(row * cw + col) as usize];
                let alpha = (argb >> 24) & 0xff;
                if alpha == 0 {
                    continue;
                }
                let sr = ((argb >> 16) & 0xff) as u32;
                let sg = ((argb >> 8) & 0xff) as u32;
                let sb = (argb & 0xff) as u32;

                let idx = (dst_y as usize * width as usize + dst_x as usize) * 4;
                let db = data[idx] as u32;
                let dg = data[idx + 1] as u32;
                let dr = data[idx + 2] as u32;

                let blend = |s: u32, d: u32| -> u8 { ((s * alpha + d * (255 - alpha)) / 255) as u8 };
                data[idx] = blend(sb, db);
                data[idx + 1] = blend(sg, dg);
                data[idx + 2] = blend(sr, dr);
            }
        }
    }

    pub fn root_window(&self) -> u32 {
        self.root
    }

    pub fn connection(&self) -> &Arc<RustConnection> {
        &self.conn
    }
}

impl Drop for Grabber {
    fn drop(&mut self) {
        let _ = self.conn.shm_detach(self.shmseg);
        unsafe {
            libc::shmdt(self.shm_addr as *const libc::c_void);
            libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_blend_full_alpha_overwrites() {
        let blend = |s: u32, d: u32, alpha: u32| -> u8 { ((s * alpha + d * (255 - alpha)) / 255) as u8 };
        assert_eq!(blend(200, 10, 255), 200);
    }

    #[test]
    fn cursor_blend_zero_alpha_keeps_destination() {
        let blend = |s: u32, d: u32, alpha: u32| -> u8 { ((s * alpha + d * (255 - alpha)) / 255) as u8 };
        assert_eq!(blend(200, 10, 0), 10);
    }
}
