//! Top-level instrument (component H): owns every channel and device, and
//! is the one place that turns an [`InstrumentConfig`] into a wired-up
//! [`Orchestrator`].

use std::time::Duration;

use seq_serial::serial_port;

use crate::camera::{CameraPair, DcamBackend, RealDcam};
use crate::config::InstrumentConfig;
use crate::error::Error;
use crate::motion::{Axis, Objective, TiltStage};
use crate::optics::{Laser, Lasers, Optics};
use crate::orchestrator::Orchestrator;
use crate::tdi::Tdi;
use crate::valve::{Valve, ValvePair};

const SEPARATOR: u8 = b'\n';
const X_BAUD: u32 = 9600;
const Y_BAUD: u32 = 9600;
const FPGA_BAUD: u32 = 115_200;
const LASER_BAUD: u32 = 9600;
const VALVE_BAUD: u32 = 9600;

const X_STEP_RANGE: (i64, i64) = (-50_000, 50_000);
const Y_STEP_RANGE: (i64, i64) = (-7_000_000, 7_000_000);
const Y_STEPS_PER_UM: f64 = 100.0;
const X_STEPS_PER_UM: f64 = 100.0;
const Z_OBJ_STEP_RANGE: (i64, i64) = (0, 65_535);
const Z_OBJ_HOME: i64 = 32_768;
const TILT_CURRENT_MA: i64 = 100;
const TILT_VELOCITY: i64 = 62_500;

/// Everything the instrument needs, freshly opened and wired together but
/// not yet initialized — callers still call [`Instrument::initialize`].
pub struct Instrument {
    pub valve_a: ValvePair,
    pub valve_b: ValvePair,
    pub orchestrator: Orchestrator,
}

impl Instrument {
    /// Open every logical serial port named in `config.ports` and assemble
    /// the full device tree. Does not touch hardware beyond opening ports;
    /// call [`Instrument::initialize`] afterward to home axes, arm lasers,
    /// and confirm the valves.
    pub async fn open(config: &InstrumentConfig) -> Result<Self, Error> {
        let deadline = config.channel_deadline();
        let fpga_spacing = config.fpga_min_spacing();
        let port = |name: &str| -> Result<&str, Error> {
            config.ports.get(name).map(String::as_str).ok_or_else(|| Error::Validation {
                component: "instrument",
                message: format!("config is missing logical port `{name}`"),
            })
        };

        let x_channel = serial_port::open("x", port("x")?, X_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let y_channel = serial_port::open("y", port("y")?, Y_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let fpga_channel = serial_port::open_split(
            "fpga",
            port("fpgacmd")?,
            port("fpgaresp")?,
            FPGA_BAUD,
            SEPARATOR,
            fpga_spacing,
            deadline,
        )
        .await?;
        let laser_g_channel = serial_port::open("laser_g", port("laser_g")?, LASER_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let laser_r_channel = serial_port::open("laser_r", port("laser_r")?, LASER_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let valve_a1_channel = serial_port::open("valve_a1", port("valve_a1")?, VALVE_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let valve_a2_channel = serial_port::open("valve_a2", port("valve_a2")?, VALVE_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let valve_b1_channel = serial_port::open("valve_b1", port("valve_b1")?, VALVE_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;
        let valve_b2_channel = serial_port::open("valve_b2", port("valve_b2")?, VALVE_BAUD, SEPARATOR, Duration::from_millis(1), deadline).await?;

        let x = Axis::new("x", x_channel, X_STEP_RANGE, Some(0), X_STEPS_PER_UM, false);
        let y = Axis::new("y", y_channel, Y_STEP_RANGE, Some(0), Y_STEPS_PER_UM, true);
        let z_tilt = TiltStage::new(fpga_channel.clone());
        let z_obj = Objective::new(Axis::new(
            "z_obj",
            fpga_channel.clone(),
            Z_OBJ_STEP_RANGE,
            Some(Z_OBJ_HOME),
            1.0,
            false,
        ));
        let lasers = Lasers {
            g: Laser::new("laser_g", laser_g_channel),
            r: Laser::new("laser_r", laser_r_channel),
        };
        let optics = Optics::new(fpga_channel.clone());
        let tdi = Tdi::new(fpga_channel);

        let valve_a = ValvePair::new(
            Valve::new("valve_a1", valve_a1_channel),
            Valve::new("valve_a2", valve_a2_channel),
        );
        let valve_b = ValvePair::new(
            Valve::new("valve_b1", valve_b1_channel),
            Valve::new("valve_b2", valve_b2_channel),
        );

        let cams = spawn_cameras()?;
        let orchestrator = Orchestrator::new(
            x,
            y,
            z_tilt,
            z_obj,
            lasers,
            optics,
            tdi,
            cams,
            config.camera_poll_interval(),
        );

        Ok(Self {
            valve_a,
            valve_b,
            orchestrator,
        })
    }

    /// Cold-boot sequence: confirm both valve pairs, home the motion axes,
    /// and arm both lasers, all concurrently.
    pub async fn initialize(&self) -> Result<(), Error> {
        let _guard = self.orchestrator.exclusive().await;
        tokio::try_join!(
            self.valve_a.initialize(),
            self.valve_b.initialize(),
            self.orchestrator.x.initialize(),
            self.orchestrator.y.initialize(),
            self.orchestrator.z_tilt.initialize(TILT_CURRENT_MA, TILT_VELOCITY),
            self.orchestrator.z_obj.initialize(),
            self.orchestrator.lasers.initialize(),
        )?;
        Ok(())
    }

    pub async fn wait_ready(&self) {
        self.orchestrator.wait_ready().await;
    }
}

#[cfg(not(test))]
fn spawn_cameras() -> Result<CameraPair, Error> {
    let mut n_device: std::ffi::c_int = 0;
    let rc = unsafe { seq_camera_sys::dcam_init(std::ptr::null(), &mut n_device, std::ptr::null()) };
    if rc < 0 {
        return Err(Error::Driver {
            component: "camera",
            message: format!("dcam_init failed with code {rc}"),
        });
    }
    let cam0: Box<dyn DcamBackend> = Box::new(unsafe { RealDcam::new() });
    let cam1: Box<dyn DcamBackend> = Box::new(unsafe { RealDcam::new() });
    CameraPair::spawn(cam0, cam1)
}

#[cfg(test)]
fn spawn_cameras() -> Result<CameraPair, Error> {
    use crate::camera::MockDcam;
    let cam0: Box<dyn DcamBackend> = Box::new(MockDcam::default());
    let cam1: Box<dyn DcamBackend> = Box::new(MockDcam::default());
    CameraPair::spawn(cam0, cam1)
}
