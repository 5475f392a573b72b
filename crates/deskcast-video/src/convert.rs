use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// BT.601 studio-range RGB -> Y conversion for one pixel.
#[inline]
fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    (((66 * r as i32 + 129 * g as i32 + 25 * b as i32 + 128) >> 8) + 16) as u8
}

/// BT.601 studio-range averaged-2x2-block RGB -> (U, V) conversion.
#[inline]
fn rgb_to_uv(r: i32, g: i32, b: i32) -> (u8, u8) {
    let u = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8;
    let v = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8;
    (u, v)
}

/// Convert one row band of a BGRA source image into I420 planes.
///
/// `start_row..end_row` are the rows this call owns; chroma is produced on
/// even rows by averaging the 2x2 luma block beneath it, reusing the
/// current row's samples in place of a nonexistent row below when the band
/// reaches the bottom edge of the image.
fn convert_rows(
    src: &[u8],
    src_stride: usize,
    width: usize,
    height: usize,
    dst_y: &mut [u8],
    y_stride: usize,
    dst_u: &mut [u8],
    u_stride: usize,
    dst_v: &mut [u8],
    v_stride: usize,
    start_row: usize,
    end_row: usize,
) {
    for y in start_row..end_row {
        let src_line = &src[y * src_stride..];
        let y_line = &mut dst_y[y * y_stride..y * y_stride + width];

        for x in 0..width {
            let px = x * 4;
            let b = src_line[px];
            let g = src_line[px + 1];
            let r = src_line[px + 2];
            y_line[x] = rgb_to_y(r, g, b);
        }

        if y % 2 == 0 {
            let u_line = &mut dst_u[(y / 2) * u_stride..];
            let v_line = &mut dst_v[(y / 2) * v_stride..];
            let next_line_offset = if y + 1 < height { src_stride } else { 0 };

            let mut x = 0;
            while x < width {
                let x1 = (x + 1).min(width - 1);
                let idx0 = x * 4;
                let idx1 = x1 * 4;
                let idx2 = idx0 + next_line_offset;
                let idx3 = idx1 + next_line_offset;

                let r = src_line[idx0 + 2] as i32
                    + src_line[idx1 + 2] as i32
                    + src_line[idx2 + 2] as i32
                    + src_line[idx3 + 2] as i32;
                let g = src_line[idx0 + 1] as i32
                    + src_line[idx1 + 1] as i32
                    + src_line[idx2 + 1] as i32
                    + src_line[idx3 + 1] as i32;
                let b = src_line[idx0] as i32
                    + src_line[idx1] as i32
                    + src_line[idx2] as i32
                    + src_line[idx3] as i32;

                let (u, v) = rgb_to_uv(r / 4, g / 4, b / 4);
                u_line[x / 2] = u;
                v_line[x / 2] = v;

                x += 2;
            }
        }
    }
}

/// Raw pointers + lengths for one conversion job, handed to every worker.
///
/// Workers only ever touch the row band assigned to them at construction
/// time, so concurrent `&mut` access through these raw slices is sound as
/// long as the bands never overlap -- see `Converter::convert`.
struct Job {
    src: *const u8,
    src_len: usize,
    src_stride: usize,
    width: usize,
    height: usize,
    dst_y: *mut u8,
    dst_y_len: usize,
    y_stride: usize,
    dst_u: *mut u8,
    dst_u_len: usize,
    u_stride: usize,
    dst_v: *mut u8,
    dst_v_len: usize,
    v_stride: usize,
}

unsafe impl Send for Job {}
unsafe impl Sync for Job {}

struct Shared {
    mutex: Mutex<State>,
    cv: Condvar,
}

struct State {
    job: Option<Job>,
    /// One flag per worker; set when a job is posted, cleared by that
    /// worker when its row band is done. `convert()` blocks on all of
    /// these being false again -- the correct form of "wait for every
    /// worker to finish".
    ready: Vec<bool>,
    stop: bool,
}

/// A fixed-size pool of worker threads performing BT.601 BGRA -> I420
/// conversion, each owning a disjoint horizontal row band of the frame.
pub struct Converter {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    width: usize,
    height: usize,
}

impl Converter {
    /// Spawn `n_workers` threads, each responsible for `height / n_workers`
    /// rows (the last worker absorbs any remainder), matching the row-band
    /// split `i * height / n .. (i + 1) * height / n`.
    pub fn new(n_workers: usize, width: usize, height: usize) -> Self {
        assert!(n_workers > 0, "Converter needs at least one worker");

        let shared = Arc::new(Shared {
            mutex: Mutex::new(State { job: None, ready: vec![false; n_workers], stop: false }),
            cv: Condvar::new(),
        });

        let handles = (0..n_workers)
            .map(|id| {
                let shared = Arc::clone(&shared);
                let start_row = id * height / n_workers;
                let end_row = (id + 1) * height / n_workers;
                thread::spawn(move || worker_loop(shared, id, start_row, end_row))
            })
            .collect();

        Converter { shared, handles, width, height }
    }

    /// Convert one BGRA frame into the given I420 destination planes.
    ///
    /// Blocks until every worker has finished its row band. `dst_y`/`dst_u`/
    /// `dst_v` must be at least `stride * rows` long for their plane.
    #[allow(clippy::too_many_arguments)]
    pub fn convert(
        &self,
        src: &[u8],
        src_stride: usize,
        dst_y: &mut [u8],
        y_stride: usize,
        dst_u: &mut [u8],
        u_stride: usize,
        dst_v: &mut [u8],
        v_stride: usize,
    ) {
        assert!(src.len() >= src_stride * self.height);
        assert!(dst_y.len() >= y_stride * self.height);
        assert!(dst_u.len() >= u_stride * self.height.div_ceil(2));
        assert!(dst_v.len() >= v_stride * self.height.div_ceil(2));

        let job = Job {
            src: src.as_ptr(),
            src_len: src.len(),
            src_stride,
            width: self.width,
            height: self.height,
            dst_y: dst_y.as_mut_ptr(),
            dst_y_len: dst_y.len(),
            y_stride,
            dst_u: dst_u.as_mut_ptr(),
            dst_u_len: dst_u.len(),
            u_stride,
            dst_v: dst_v.as_mut_ptr(),
            dst_v_len: dst_v.len(),
            v_stride,
        };

        {
            let mut state = self.shared.mutex.lock().unwrap();
            state.job = Some(job);
            for r in state.ready.iter_mut() {
                *r = true;
            }
        }
        self.shared.cv.notify_all();

        let guard = self.shared.mutex.lock().unwrap();
        let _guard = self.shared.cv.wait_while(guard, |s| s.ready.iter().any(|r| *r)).unwrap();
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        {
            let mut state = self.shared.mutex.lock().unwrap();
            state.stop = true;
        }
        self.shared.cv.notify_all();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, id: usize, start_row: usize, end_row: usize) {
    loop {
        let job = {
            let state = shared.mutex.lock().unwrap();
            let mut state =
                shared.cv.wait_while(state, |s| !s.ready[id] && !s.stop).unwrap();
            if state.stop {
                return;
            }
            // SAFETY: `convert()` only returns once every `ready[i]` flag is
            // false, so the job's pointers stay valid for the duration of
            // this borrow, and no two workers ever touch the same row band.
            let job = state.job.as_ref().expect("ready implies a job is posted");
            let job_copy = Job {
                src: job.src,
                src_len: job.src_len,
                src_stride: job.src_stride,
                width: job.width,
                height: job.height,
                dst_y: job.dst_y,
                dst_y_len: job.dst_y_len,
                y_stride: job.y_stride,
                dst_u: job.dst_u,
                dst_u_len: job.dst_u_len,
                u_stride: job.u_stride,
                dst_v: job.dst_v,
                dst_v_len: job.dst_v_len,
                v_stride: job.v_stride,
            };
            let _ = &mut state; // keep lock alive through the copy above
            job_copy
        };

        unsafe {
            let src = std::slice::from_raw_parts(job.src, job.src_len);
            let dst_y = std::slice::from_raw_parts_mut(job.dst_y, job.dst_y_len);
            let dst_u = std::slice::from_raw_parts_mut(job.dst_u, job.dst_u_len);
            let dst_v = std::slice::from_raw_parts_mut(job.dst_v, job.dst_v_len);

            convert_rows(
                src,
                job.src_stride,
                job.width,
                job.height,
                dst_y,
                job.y_stride,
                dst_u,
                job.u_stride,
                dst_v,
                job.v_stride,
                start_row,
                end_row,
            );
        }

        let mut state = shared.mutex.lock().unwrap();
        state.ready[id] = false;
        drop(state);
        shared.cv.notify_all();
    }
}
