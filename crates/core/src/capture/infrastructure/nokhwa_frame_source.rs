use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::shared::frame::FrameSample;

/// Capture resolution requested from the device; the driver picks the
/// closest supported format.
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const REQUESTED_FPS: u32 = 30;

/// Pause between grabs after a read error, so a flaky device doesn't spin
/// the capture thread.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Webcam-backed `FrameSource`.
///
/// The camera handle lives entirely on a capture thread: `start` spawns it,
/// waits for the stream-open handshake, and returns its verdict. The thread
/// keeps only the most recent decoded frame in a shared slot, so
/// `current_frame` is a lock-and-clone with no I/O. The device is released
/// on the capture thread when `stop` signals it, exactly once.
pub struct NokhwaFrameSource {
    index: u32,
    latest: Arc<Mutex<Option<FrameSample>>>,
    running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl NokhwaFrameSource {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        }
    }

    /// Human-readable names of the attached capture devices.
    pub fn list_devices() -> Result<Vec<String>, CameraError> {
        let devices = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| CameraError::Unavailable(e.to_string()))?;
        Ok(devices
            .iter()
            .map(|info| info.human_name().to_string())
            .collect())
    }
}

fn requested_format() -> RequestedFormat<'static> {
    RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(REQUESTED_WIDTH, REQUESTED_HEIGHT),
        FrameFormat::YUYV,
        REQUESTED_FPS,
    )))
}

impl FrameSource for NokhwaFrameSource {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.capture_thread.is_some() {
            return Ok(());
        }

        let index = self.index;
        let latest = self.latest.clone();
        let running = self.running.clone();
        running.store(true, Ordering::Relaxed);

        // The camera handle is created and released on the capture thread;
        // this channel carries the open-stream verdict back to the caller.
        let (status_tx, status_rx) = crossbeam_channel::bounded::<Result<(), CameraError>>(1);

        let handle = std::thread::spawn(move || {
            let mut camera =
                match Camera::new(CameraIndex::Index(index), requested_format()) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = status_tx.send(Err(open_error(e)));
                        return;
                    }
                };
            if let Err(e) = camera.open_stream() {
                let _ = status_tx.send(Err(open_error(e)));
                return;
            }
            let _ = status_tx.send(Ok(()));

            while running.load(Ordering::Relaxed) {
                match camera.frame().and_then(|b| b.decode_image::<RgbFormat>()) {
                    Ok(image) => {
                        let (width, height) = (image.width(), image.height());
                        let sample = FrameSample::new(image.into_raw(), width, height);
                        *latest.lock().unwrap() = Some(sample);
                    }
                    Err(e) => {
                        log::warn!("camera read failed: {e}");
                        std::thread::sleep(ERROR_BACKOFF);
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                log::warn!("camera stream release failed: {e}");
            }
        });

        match status_rx.recv() {
            Ok(Ok(())) => {
                self.capture_thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = handle.join();
                Err(CameraError::Unavailable(
                    "capture thread exited before opening the stream".into(),
                ))
            }
        }
    }

    fn current_frame(&mut self) -> Option<FrameSample> {
        self.latest.lock().unwrap().clone()
    }

    fn stop(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            self.running.store(false, Ordering::Relaxed);
            let _ = handle.join();
            *self.latest.lock().unwrap() = None;
        }
    }
}

impl Drop for NokhwaFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_error(e: nokhwa::NokhwaError) -> CameraError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") {
        CameraError::AccessDenied(message)
    } else {
        CameraError::Unavailable(message)
    }
}
