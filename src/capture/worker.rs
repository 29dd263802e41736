use super::framing::mirror;
use super::{CaptureError, CaptureSource, DeviceError};
use crate::frame::Frame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long `close` waits for the worker to release the device.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Blocking frame producer that lives on the capture worker thread.
///
/// Created on the worker thread itself, so it never has to be `Send`.
pub trait FrameGrabber {
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;

    fn resolution(&self) -> (u32, u32);
}

enum Request {
    Grab(u64),
    Shutdown,
}

struct Grabbed {
    seq: u64,
    captured_at: Instant,
    result: Result<RgbImage, CaptureError>,
}

/// Capture source that owns its device on a dedicated thread.
///
/// Only one grab is ever in flight. A grab that outlives its timeout keeps the
/// slot until it completes; its frame is then discarded.
pub struct ThreadedCapture {
    requests: Sender<Request>,
    frames: Receiver<Grabbed>,
    done: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    resolution: (u32, u32),
    next_seq: u64,
    in_flight: Option<u64>,
}

impl ThreadedCapture {
    /// Start a worker thread, open the device on it with `open`, and wait for
    /// the result.
    pub fn spawn<G, F>(name: &str, open: F, timeout: Duration) -> Result<Self, DeviceError>
    where
        G: FrameGrabber + 'static,
        F: FnOnce() -> Result<G, DeviceError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u32), DeviceError>>(1);
        let (request_tx, request_rx) = bounded::<Request>(1);
        let (frame_tx, frame_rx) = bounded::<Grabbed>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut grabber = match open() {
                    Ok(grabber) => {
                        let _ = ready_tx.send(Ok(grabber.resolution()));
                        grabber
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(Request::Grab(seq)) = request_rx.recv() {
                    let result = grabber.grab();
                    let grabbed = Grabbed {
                        seq,
                        captured_at: Instant::now(),
                        result,
                    };
                    if frame_tx.send(grabbed).is_err() {
                        break;
                    }
                }

                drop(grabber);
                tracing::debug!("Capture worker released device");
                let _ = done_tx.send(());
            })
            .map_err(DeviceError::Worker)?;

        let resolution = match ready_rx.recv() {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(DeviceError::WorkerExited);
            }
        };

        Ok(Self {
            requests: request_tx,
            frames: frame_rx,
            done: done_rx,
            worker: Some(worker),
            timeout,
            resolution,
            next_seq: 0,
            in_flight: None,
        })
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn receive(&mut self, grabbed: Grabbed) -> Result<Frame, CaptureError> {
        debug_assert_eq!(self.in_flight, Some(grabbed.seq));
        self.in_flight = None;
        tracing::trace!("Grab {} delivered", grabbed.seq);
        let mut image = grabbed.result?;
        mirror(&mut image);
        Ok(Frame::new(image, grabbed.captured_at))
    }
}

impl CaptureSource for ThreadedCapture {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        let _span = tracing::debug_span!("acquire").entered();

        if self.worker.is_none() {
            return Err(CaptureError::Closed);
        }

        // A grab that outlived an earlier timeout keeps its slot; its frame
        // is handed to whichever acquire sees it first.
        match self.in_flight {
            Some(pending) => tracing::trace!("Waiting on grab {}", pending),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.requests
                    .send(Request::Grab(seq))
                    .map_err(|_| CaptureError::Closed)?;
                self.in_flight = Some(seq);
            }
        }

        match self.frames.recv_timeout(self.timeout) {
            Ok(grabbed) => self.receive(grabbed),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Closed),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = self.requests.try_send(Request::Shutdown);
        // unblock a worker waiting to hand over a late frame
        while self.frames.try_recv().is_ok() {}

        match self.done.recv_timeout(SHUTDOWN_GRACE) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                tracing::info!("Camera released");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Capture worker did not stop within {:?}, detaching it",
                    SHUTDOWN_GRACE
                );
            }
        }
        self.in_flight = None;
    }
}

impl Drop for ThreadedCapture {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    struct FakeGrabber {
        delay: Duration,
        counter: Arc<AtomicU32>,
        released: Arc<AtomicBool>,
    }

    impl FrameGrabber for FakeGrabber {
        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            thread::sleep(self.delay);
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8, n as u8, 0])))
        }

        fn resolution(&self) -> (u32, u32) {
            (2, 1)
        }
    }

    impl Drop for FakeGrabber {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn spawn_fake(delay: Duration, timeout: Duration) -> (ThreadedCapture, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let capture = ThreadedCapture::spawn(
            "test-capture",
            move || {
                Ok(FakeGrabber {
                    delay,
                    counter: Arc::new(AtomicU32::new(0)),
                    released: flag,
                })
            },
            timeout,
        )
        .unwrap();
        (capture, released)
    }

    #[test]
    fn test_acquire_returns_mirrored_frame() {
        let (mut capture, _) = spawn_fake(Duration::ZERO, Duration::from_secs(2));
        assert_eq!(capture.resolution(), (2, 1));
        let frame = capture.acquire().unwrap();
        // column 1 of the raw grab lands in column 0
        assert_eq!(frame.image().get_pixel(0, 0).0[0], 1);
        assert_eq!(frame.image().get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_stalled_grab_times_out() {
        let (mut capture, _) = spawn_fake(Duration::from_millis(300), Duration::from_millis(20));
        let start = Instant::now();
        let err = capture.acquire().unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_millis(250));

        // the first grab is still in flight, so no second grab is issued
        let err = capture.acquire().unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
    }

    #[test]
    fn test_late_frame_is_delivered_on_next_acquire() {
        let (mut capture, _) = spawn_fake(Duration::from_millis(60), Duration::from_millis(10));
        assert!(capture.acquire().is_err());
        thread::sleep(Duration::from_millis(150));

        let frame = capture.acquire().unwrap();
        // the late grab #0 is handed over, still mirrored
        assert_eq!(frame.image().get_pixel(0, 0).0[1], 0);
        assert_eq!(frame.image().get_pixel(0, 0).0[0], 1);
        assert_eq!(frame.image().get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_camera_slower_than_timeout_keeps_delivering() {
        // 30 fps camera polled at 60 fps
        let (mut capture, _) = spawn_fake(Duration::from_millis(33), Duration::from_millis(17));
        let mut delivered = Vec::new();
        for _ in 0..60 {
            let tick = Instant::now();
            if let Ok(frame) = capture.acquire() {
                delivered.push(frame.image().get_pixel(0, 0).0[1]);
            }
            if let Some(rest) = Duration::from_millis(17).checked_sub(tick.elapsed()) {
                thread::sleep(rest);
            }
        }

        assert!(delivered.len() >= 15, "only {} frames delivered", delivered.len());
        // every grab is delivered exactly once, in order
        let expected: Vec<u8> = (0..delivered.len() as u8).collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn test_close_releases_device() {
        let (mut capture, released) = spawn_fake(Duration::ZERO, Duration::from_secs(2));
        capture.acquire().unwrap();
        capture.close();
        assert!(released.load(Ordering::SeqCst));
        assert!(matches!(capture.acquire(), Err(CaptureError::Closed)));
        capture.close();
    }

    #[test]
    fn test_drop_releases_device() {
        let (capture, released) = spawn_fake(Duration::ZERO, Duration::from_secs(2));
        drop(capture);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let result = ThreadedCapture::spawn(
            "test-capture",
            || -> Result<FakeGrabber, DeviceError> {
                Err(DeviceError::Open {
                    index: 7,
                    reason: "busy".to_string(),
                })
            },
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(DeviceError::Open { index: 7, .. })));
    }
}
