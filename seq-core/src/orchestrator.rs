//! The imaging orchestrator (component G): `take` and `autofocus`,
//! coordinating motion axes, optics, and the camera pair under the
//! instrument-level lock.

use std::time::Duration;

use ndarray::{s, Array3, Axis as NdAxis};
use tokio::sync::Mutex;

use crate::camera::{CameraPair, SensorMode, BUNDLE_HEIGHT, CHANNEL_REMAP, IMG_WIDTH};
use crate::error::Error;
use crate::motion::{Axis, Objective, TiltStage};
use crate::optics::{Lasers, Optics};
use crate::tdi::Tdi;

const UM_PER_PX: f64 = 0.375;
const N_BUNDLES_MAX: i32 = 1500;
const AUTOFOCUS_N_BUNDLES: i32 = 232;
const AUTOFOCUS_HEIGHT: i32 = 5;
const AUTOFOCUS_Z_MIN: i64 = 2621;
const AUTOFOCUS_Z_MAX: i64 = 60292;
const MAX_PIXEL_VALUE: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub x: i64,
    pub y: i64,
    pub z_tilt: (i64, i64, i64),
    pub z_obj: i64,
    pub laser_g: i64,
    pub laser_r: i64,
}

pub struct Orchestrator {
    pub x: Axis,
    pub y: Axis,
    pub z_tilt: TiltStage,
    pub z_obj: Objective,
    pub lasers: Lasers,
    pub optics: Optics,
    pub tdi: Tdi,
    pub cams: CameraPair,
    poll_interval: Duration,
    lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        x: Axis,
        y: Axis,
        z_tilt: TiltStage,
        z_obj: Objective,
        lasers: Lasers,
        optics: Optics,
        tdi: Tdi,
        cams: CameraPair,
        poll_interval: Duration,
    ) -> Self {
        Self {
            x,
            y,
            z_tilt,
            z_obj,
            lasers,
            optics,
            tdi,
            cams,
            poll_interval,
            lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> Result<StateSnapshot, Error> {
        let (x, y, z_tilt, z_obj, laser_g, laser_r) = tokio::try_join!(
            self.x.pos(),
            self.y.pos(),
            self.z_tilt.pos(),
            self.z_obj.pos(),
            self.lasers.g.power(),
            self.lasers.r.power(),
        )?;
        Ok(StateSnapshot {
            x,
            y,
            z_tilt,
            z_obj,
            laser_g,
            laser_r,
        })
    }

    pub async fn wait_ready(&self) {
        tokio::join!(
            self.x.wait_ready(),
            self.y.wait_ready(),
            self.optics.wait_ready(),
        );
    }

    /// Acquire the instrument-wide critical section that serializes
    /// `take`, `autofocus`, and [`crate::instrument::Instrument::initialize`]
    /// against each other. Callers outside this module (namely
    /// `Instrument::initialize`) hold the returned guard for the duration
    /// of the work that must not overlap a capture or a sweep.
    pub async fn exclusive(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn calc_delta_pos(n_px_y: i64, steps_per_um: f64) -> i64 {
        (n_px_y as f64 * UM_PER_PX * steps_per_um) as i64
    }

    /// Capture an image spanning `n_bundles` TDI bundles from the requested
    /// logical `channels`, with the flush-bundle discipline and Y-axis
    /// overshoot this instrument's TDI scans require.
    pub async fn take(
        &self,
        n_bundles: i32,
        dark: bool,
        channels: &[usize],
        move_back_to_start: bool,
    ) -> Result<(Array3<u16>, StateSnapshot), Error> {
        if !(0 < n_bundles && n_bundles < N_BUNDLES_MAX) {
            return Err(Error::Validation {
                component: "orchestrator",
                message: format!("n_bundles {n_bundles} must be in (0, {N_BUNDLES_MAX})"),
            });
        }
        for &ch in channels {
            if ch > 3 {
                return Err(Error::Validation {
                    component: "orchestrator",
                    message: format!("channel {ch} is not in 0..=3"),
                });
            }
        }

        let _guard = self.exclusive().await;

        let n_bundles = n_bundles + 1; // flush bundle
        self.wait_ready().await;

        let state = self.state().await?;
        let n_px_y = n_bundles as i64 * BUNDLE_HEIGHT as i64;
        let delta = Self::calc_delta_pos(n_px_y, self.y.steps_per_um());
        let end_y = state.y - delta - 100_000;
        if end_y <= -7_000_000 {
            return Err(Error::InvariantBroken {
                component: "orchestrator",
                message: format!("computed end_y {end_y} overshoots the -7e6 floor"),
            });
        }

        tokio::try_join!(
            self.tdi.prepare_for_imaging(n_px_y, state.y),
            self.y.set_mode("IMAGING"),
        )?;

        let start_motion = || self.y.move_to(end_y);

        let (raw0, raw1) = if dark {
            self.cams.capture(n_bundles, BUNDLE_HEIGHT, start_motion, self.poll_interval).await?
        } else {
            self.optics
                .open_shutter(|| self.cams.capture(n_bundles, BUNDLE_HEIGHT, start_motion, self.poll_interval))
                .await?
        };

        self.y
            .move_to(if move_back_to_start { state.y } else { end_y + 100_000 })
            .await?;

        let image = assemble_image(raw0, raw1, channels);
        Ok((image, state))
    }

    /// Sweep the Z-objective and report the step with maximum intensity for
    /// `channel`'s serving camera.
    pub async fn autofocus(&self, channel: usize) -> Result<i64, Error> {
        if channel > 3 {
            return Err(Error::Validation {
                component: "orchestrator",
                message: format!("channel {channel} is not in 0..=3"),
            });
        }
        let _guard = self.exclusive().await;
        self.wait_ready().await;

        let physical = CHANNEL_REMAP[channel];
        let cam_index = if physical < 2 { 0 } else { 1 };

        self.cams
            .set_property("sensor_mode", SensorMode::FocusSweep.code())
            .await?;

        let arm = self.z_obj.af_arm(AUTOFOCUS_Z_MIN, AUTOFOCUS_Z_MAX, AUTOFOCUS_N_BUNDLES).await?;

        let result = self
            .optics
            .open_shutter(|| {
                self.cams.capture(
                    AUTOFOCUS_N_BUNDLES,
                    AUTOFOCUS_HEIGHT as usize,
                    || arm.start_move(),
                    self.poll_interval,
                )
            })
            .await;
        arm.finish().await?;

        let (raw0, raw1) = result?;
        let raw = if cam_index == 0 { raw0 } else { raw1 };

        let half = IMG_WIDTH / 2;
        let channel_slice = if physical % 2 == 0 {
            raw.slice(s![.., ..half])
        } else {
            raw.slice(s![.., half..])
        };

        let intensity: Vec<f64> = (0..AUTOFOCUS_N_BUNDLES as usize)
            .map(|b| {
                let rows = b * AUTOFOCUS_HEIGHT as usize..(b + 1) * AUTOFOCUS_HEIGHT as usize;
                let block = channel_slice.slice(s![rows, ..]);
                block.iter().map(|&v| v as f64).sum::<f64>() / block.len() as f64
            })
            .collect();

        let argmax = intensity
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);

        let target = (AUTOFOCUS_Z_MAX as f64
            - (((AUTOFOCUS_Z_MAX - AUTOFOCUS_Z_MIN) as f64 / AUTOFOCUS_N_BUNDLES as f64) * argmax as f64
                + AUTOFOCUS_Z_MIN as f64)) as i64;

        if !(10_000 < target && target < 50_000) {
            tracing::warn!(target, "autofocus target close to the travel limit");
        }

        Ok(target)
    }
}

/// Flip along the row axis, clip to the sensor's dynamic range, drop the
/// leading flush bundle, then keep only the requested logical channels in
/// their fixed physical order. `raw0`/`raw1` are each shaped
/// `(n_bundles * BUNDLE_HEIGHT, IMG_WIDTH)`, one row-major array per
/// camera; each camera's columns split in half into two logical channels.
fn assemble_image(
    raw0: ndarray::Array2<u16>,
    raw1: ndarray::Array2<u16>,
    channels: &[usize],
) -> Array3<u16> {
    let half = IMG_WIDTH / 2;
    let total_rows = raw0.nrows();
    let kept_rows = total_rows - BUNDLE_HEIGHT;
    let mut out = Array3::<u16>::zeros((channels.len(), kept_rows, half));

    for (i, &ch) in channels.iter().enumerate() {
        let physical = CHANNEL_REMAP[ch];
        let source = if physical < 2 { &raw0 } else { &raw1 };
        let cols = if physical % 2 == 0 {
            s![.., ..half]
        } else {
            s![.., half..]
        };
        let cropped = source.slice(cols).slice(s![BUNDLE_HEIGHT.., ..]);
        let flipped = cropped.slice(s![..;-1, ..]);
        let clipped = flipped.mapv(|v| v.min(MAX_PIXEL_VALUE));
        out.index_axis_mut(NdAxis(0), i).assign(&clipped);
    }
    out
}
