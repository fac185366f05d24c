//! Synthetic camera that publishes JPEG test frames
//!
//! Stands in for the capture/encode pipeline: at the configured frame rate it
//! renders a scrolling colour bar pattern, encodes it at the configured JPEG
//! quality and publishes it into the shared [`FrameBuffer`].

use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::streaming::frame_buffer::FrameBuffer;
use crate::threads::Worker;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct CaptureRun {
    /// Dropped to stop the capture loop
    stop_tx: Sender<()>,
    worker: Worker,
}

/// Frame producer for hardware-free runs
pub struct TestPatternCamera {
    config: CameraConfig,
    frames: Arc<FrameBuffer>,
    run: Mutex<Option<CaptureRun>>,
}

impl TestPatternCamera {
    pub fn new(config: CameraConfig, frames: Arc<FrameBuffer>) -> Self {
        Self {
            config,
            frames,
            run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Start publishing frames; no-op if already running
    pub fn start(&self) -> Result<()> {
        let mut run = self.run.lock();
        if run.is_some() {
            log::warn!("Test camera is already running");
            return Ok(());
        }
        if self.config.frame_rate == 0 {
            return Err(Error::Config("camera.frame_rate must be positive".into()));
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let config = self.config.clone();
        let frames = Arc::clone(&self.frames);
        let interval = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate));

        let worker = Worker::spawn("test-camera", move || {
            log::info!(
                "Test camera capturing {}x{} @ {} fps (quality {})",
                config.width,
                config.height,
                config.frame_rate,
                config.jpeg_quality
            );
            let mut index: u32 = 0;
            loop {
                match encode_test_frame(&config, index) {
                    Ok(jpeg) => frames.publish(jpeg),
                    Err(e) => log::error!("Failed to encode test frame: {}", e),
                }
                index = index.wrapping_add(1);

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::info!("Test camera stopped after {} frames", index);
        })?;

        *run = Some(CaptureRun { stop_tx, worker });
        Ok(())
    }

    /// Stop publishing and join the capture thread
    pub fn stop(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };
        drop(run.stop_tx);
        run.worker.join_timeout(Duration::from_secs(2));
    }
}

impl Drop for TestPatternCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Render and encode frame number `index` of the test pattern
pub fn encode_test_frame(config: &CameraConfig, index: u32) -> Result<Vec<u8>> {
    let width = config.width;
    let height = config.height;
    if width == 0 || height == 0 {
        return Err(Error::Config(format!(
            "camera resolution {}x{} is invalid",
            width, height
        )));
    }

    let offset = index.wrapping_mul(4) % width;
    let image = RgbImage::from_fn(width, height, |x, y| {
        let bar = ((x + offset) % width) * 8 / width;
        let shade = (255 * y / height.max(1)) as u8;
        match bar {
            0 => Rgb([255, 255, 255]),
            1 => Rgb([255, 255, 0]),
            2 => Rgb([0, 255, 255]),
            3 => Rgb([0, 255, 0]),
            4 => Rgb([255, 0, 255]),
            5 => Rgb([255, 0, 0]),
            6 => Rgb([0, 0, 255]),
            _ => Rgb([shade, shade, shade]),
        }
    });

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality)
        .encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(jpeg)
}
