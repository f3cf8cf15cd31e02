//! Camera pair (component F): both line-scan cameras plus the single
//! dedicated worker thread the (non-reentrant) vendor driver requires.
//! Grounded on `ci2-async`'s `ThreadedAsyncCamera` — a worker thread
//! serializing driver access behind a channel — generalized here to one
//! worker shared by both cameras, since the driver forbids concurrent
//! access to *either* handle from more than one thread at a time.

use std::future::Future;
use std::time::Duration;

use ndarray::Array2;
use tokio::sync::oneshot;

use crate::camera::backend::{CaptureMode, DcamBackend};
use crate::camera::device::{BUNDLE_HEIGHT, IMG_WIDTH};
use crate::error::Error;

type Job = Box<dyn FnOnce(&mut dyn DcamBackend, &mut dyn DcamBackend) + Send>;

/// A fixed channel -> physical-camera-ordering remap: the optical layout is
/// not wavelength-sorted. Kept as a plain const array rather than hidden
/// inside this module, per the design's instruction that callers pass
/// logical channels.
pub const CHANNEL_REMAP: [usize; 4] = [1, 3, 2, 0];

/// Two cameras and the worker thread that serializes every driver call
/// across both of them.
pub struct CameraPair {
    tx: std::sync::mpsc::Sender<Job>,
    _worker: std::thread::JoinHandle<()>,
}

impl CameraPair {
    /// Spawn the worker and open both cameras on it. `cam0`/`cam1` are
    /// typically [`crate::camera::backend::RealDcam`] or, in tests,
    /// [`crate::camera::mock::MockDcam`].
    pub fn spawn(mut cam0: Box<dyn DcamBackend>, mut cam1: Box<dyn DcamBackend>) -> Result<Self, Error> {
        let (tx, rx) = std::sync::mpsc::channel::<Job>();
        let builder = std::thread::Builder::new().name("camera-driver".to_string());
        let worker = builder
            .spawn(move || {
                for job in rx {
                    job(cam0.as_mut(), cam1.as_mut());
                }
            })
            .map_err(Error::Io)?;
        let pair = Self { tx, _worker: worker };
        pair.initialize_blocking()?;
        Ok(pair)
    }

    /// The vendor driver takes on the order of ten seconds to come up; log a
    /// liveness line every second it's still pending so the wait doesn't
    /// look like a hang.
    fn initialize_blocking(&self) -> Result<(), Error> {
        let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done_watcher = done.clone();
        let watcher = std::thread::spawn(move || {
            let start = std::time::Instant::now();
            let mut last_logged_secs = 0u64;
            while !done_watcher.load(std::sync::atomic::Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(100));
                let elapsed_secs = start.elapsed().as_secs();
                if elapsed_secs > last_logged_secs {
                    last_logged_secs = elapsed_secs;
                    tracing::info!(waited_secs = elapsed_secs, "waiting for camera driver to initialize");
                }
            }
        });

        let result = futures::executor::block_on(self.run(|c0, c1| {
            c0.open(0)?;
            c0.set_property("sensor_mode", 4.0)?;
            c0.set_property("sensor_mode_line_bundle_height", BUNDLE_HEIGHT as f64)?;
            c0.precapture(CaptureMode::Snap)?;
            c1.open(1)?;
            c1.set_property("sensor_mode", 4.0)?;
            c1.set_property("sensor_mode_line_bundle_height", BUNDLE_HEIGHT as f64)?;
            c1.precapture(CaptureMode::Snap)?;
            Ok(())
        }));

        done.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = watcher.join();
        result
    }

    /// Dispatch a closure onto the worker thread and await its result.
    async fn run<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut dyn DcamBackend, &mut dyn DcamBackend) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |c0, c1| {
            let result = f(c0, c1);
            let _ = tx.send(result);
        });
        // The channel only closes if the worker thread panicked; there is
        // no graceful shutdown path for a process-lifetime worker.
        self.tx.send(job).expect("camera worker thread is gone");
        rx.await.expect("camera worker thread dropped the job before replying")
    }

    /// Read a property from camera 0 and camera 1 and raise on divergence.
    pub async fn get_property(&self, name: &'static str) -> Result<f64, Error> {
        self.run(move |c0, c1| {
            let v0 = c0.get_property(name)?;
            let v1 = c1.get_property(name)?;
            if (v0 - v1).abs() > f64::EPSILON {
                return Err(Error::ProtocolViolation {
                    component: "camera_pair",
                    message: format!("property `{name}` diverged: {v0} vs {v1}"),
                });
            }
            Ok(v0)
        })
        .await
    }

    /// Write a property to both cameras.
    pub async fn set_property(&self, name: &'static str, value: f64) -> Result<(), Error> {
        self.run(move |c0, c1| {
            c0.set_property(name, value)?;
            c1.set_property(name, value)?;
            Ok(())
        })
        .await
    }

    /// Capture `n_bundles` bundles from both cameras while `start_motion`
    /// runs, polling every `poll_interval`. Returns the two raw per-camera
    /// arrays, each shaped `(n_bundles * bundle_height, IMG_WIDTH)`.
    /// `bundle_height` is 128 for a normal TDI take and 5 for the
    /// `FOCUS_SWEEP` autofocus sensor mode.
    ///
    /// `start_motion` must not begin until capture is armed on both
    /// cameras — it is only invoked once `dcam_capture` has returned.
    pub async fn capture<Fut>(
        &self,
        n_bundles: i32,
        bundle_height: usize,
        start_motion: impl FnOnce() -> Fut,
        poll_interval: Duration,
    ) -> Result<(Array2<u16>, Array2<u16>), Error>
    where
        Fut: Future<Output = Result<(), Error>>,
    {
        let rows = n_bundles as usize * bundle_height;
        let mut out0 = Array2::<u16>::zeros((rows, IMG_WIDTH));
        let mut out1 = Array2::<u16>::zeros((rows, IMG_WIDTH));

        self.run(move |c0, c1| {
            c0.alloc_frame(n_bundles)?;
            c1.alloc_frame(n_bundles)?;
            Ok::<_, Error>(())
        })
        .await?;

        let capture_guard = self.enter_capture().await?;

        start_motion().await?;

        let mut taken: i32 = 0;
        loop {
            tokio::time::sleep(poll_interval).await;
            let (f0, f1) = self
                .run(|c0, c1| -> Result<(i32, i32), Error> {
                    let (_, f0) = c0.transfer_info()?;
                    let (_, f1) = c1.transfer_info()?;
                    Ok((f0, f1))
                })
                .await?;
            let curr = f0.min(f1);

            if curr > taken {
                let (chunk0, chunk1) = self
                    .run(move |c0, c1| -> Result<(Vec<u16>, Vec<u16>), Error> {
                        let mut buf0 = Vec::with_capacity((curr - taken) as usize * bundle_height * IMG_WIDTH);
                        let mut buf1 = Vec::with_capacity((curr - taken) as usize * bundle_height * IMG_WIDTH);
                        for i in taken..curr {
                            buf0.extend(c0.read_bundle(i, IMG_WIDTH, bundle_height)?);
                            buf1.extend(c1.read_bundle(i, IMG_WIDTH, bundle_height)?);
                        }
                        Ok((buf0, buf1))
                    })
                    .await?;

                let start_row = taken as usize * bundle_height;
                let n_rows = (curr - taken) as usize * bundle_height;
                out0.slice_mut(ndarray::s![start_row..start_row + n_rows, ..])
                    .assign(&Array2::from_shape_vec((n_rows, IMG_WIDTH), chunk0).expect("bundle chunk length matches computed shape"));
                out1.slice_mut(ndarray::s![start_row..start_row + n_rows, ..])
                    .assign(&Array2::from_shape_vec((n_rows, IMG_WIDTH), chunk1).expect("bundle chunk length matches computed shape"));

                taken = curr;
            }

            if curr >= n_bundles {
                break;
            }
        }

        capture_guard.finish().await?;

        self.run(move |c0, c1| {
            c0.free_frame()?;
            c1.free_frame()?;
            Ok::<_, Error>(())
        })
        .await?;

        Ok((out0, out1))
    }

    async fn enter_capture(&self) -> Result<CaptureGuard<'_>, Error> {
        self.run(|c0, c1| {
            c0.capture()?;
            c1.capture()?;
            Ok::<_, Error>(())
        })
        .await?;
        Ok(CaptureGuard { pair: self })
    }
}

/// `dcam_capture` on entry, `dcam_idle` on exit — the async-drop-equivalent
/// scoped capture of the design (`Drop` cannot `.await`, so the call site
/// awaits [`CaptureGuard::finish`] explicitly on every exit path).
struct CaptureGuard<'a> {
    pair: &'a CameraPair,
}

impl CaptureGuard<'_> {
    async fn finish(self) -> Result<(), Error> {
        self.pair
            .run(|c0, c1| {
                c0.idle()?;
                c1.idle()?;
                Ok::<_, Error>(())
            })
            .await
    }
}
