//! A single linear motion axis (component D): X-stage, Y-stage, or the
//! Z-objective. Z-tilt's three-motor fan-out is distinct enough to live in
//! its own module ([`crate::motion::tilt`]).

use parking_lot::Mutex;
use seq_serial::{descriptor, Channel, Descriptor, ParamDescriptor, StrDescriptor};

use crate::error::Error;

/// Mode names a mode-capable axis (the Y-stage) accepts.
pub const AXIS_MODES: &[&str] = &["IMAGING", "MOVING"];

fn mode_set_descriptor() -> StrDescriptor<String> {
    StrDescriptor::new(|m| format!("MODE {m}"), AXIS_MODES, parse_mode_ack)
}

fn parse_pos(s: &str) -> Option<i64> {
    descriptor::capture1(r"^POS\s+(-?\d+)$", s)?.parse().ok()
}

fn parse_move_ack(s: &str) -> Option<i64> {
    descriptor::capture1(r"^POS\s+(-?\d+)$", s)?.parse().ok()
}

fn parse_mode_ack(s: &str) -> Option<String> {
    descriptor::capture1(r"^MODE\s+(\S+)$", s)
}

fn pos_descriptor() -> Descriptor<i64> {
    Descriptor::new("POS?", parse_pos)
}

fn set_pos_descriptor(range: (i64, i64)) -> ParamDescriptor<i64> {
    ParamDescriptor::new(|n| format!("SET_POS {n}"), range, parse_move_ack)
}

fn mode_descriptor() -> Descriptor<String> {
    Descriptor::new("MODE?", parse_mode_ack).with_lines(1)
}

/// A linear axis addressed in hardware steps. `move_to` does not return
/// until the hardware itself reports completion (the response to
/// `SET_POS` is withheld by firmware until the move finishes), so it also
/// serves as the axis's own wait-for-idle primitive.
pub struct Axis {
    component: &'static str,
    channel: Channel,
    step_range: (i64, i64),
    home: Option<i64>,
    steps_per_um: f64,
    mode: Option<Mutex<String>>,
}

impl Axis {
    pub fn new(
        component: &'static str,
        channel: Channel,
        step_range: (i64, i64),
        home: Option<i64>,
        steps_per_um: f64,
        supports_mode: bool,
    ) -> Self {
        Self {
            component,
            channel,
            step_range,
            home,
            steps_per_um,
            mode: supports_mode.then(|| Mutex::new(String::new())),
        }
    }

    pub fn steps_per_um(&self) -> f64 {
        self.steps_per_um
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        if let Some(home) = self.home {
            self.move_to(home).await?;
        }
        Ok(())
    }

    pub async fn pos(&self) -> Result<i64, Error> {
        Ok(self.channel.send(pos_descriptor().prepare()).await?)
    }

    /// Move to an absolute step position; range-checked before any I/O.
    pub async fn move_to(&self, target: i64) -> Result<(), Error> {
        let prepared = set_pos_descriptor(self.step_range).bind(self.component, target)?;
        self.channel.send(prepared).await?;
        Ok(())
    }

    /// Switch operating mode (Y-stage's `IMAGING`, plus whatever default the
    /// caller restores afterward). Only axes constructed with
    /// `supports_mode = true` can call this.
    pub async fn set_mode(&self, mode: &str) -> Result<(), Error> {
        let Some(slot) = &self.mode else {
            return Err(Error::InvariantBroken {
                component: self.component,
                message: "axis does not support mode switching".to_string(),
            });
        };
        let prepared = mode_set_descriptor().bind(self.component, mode)?;
        let echoed = self.channel.send(prepared).await?;
        if echoed != mode {
            return Err(Error::ProtocolViolation {
                component: self.component,
                message: format!("mode switch echoed `{echoed}`, expected `{mode}`"),
            });
        }
        *slot.lock() = mode.to_string();
        Ok(())
    }

    pub async fn mode(&self) -> Result<String, Error> {
        Ok(self.channel.send(mode_descriptor().prepare()).await?)
    }

    pub async fn wait_ready(&self) {
        self.channel.wait().await;
    }

    /// Send a one-off prepared command over this axis's channel. Used by
    /// [`crate::motion::objective::Objective::af_arm`], whose `AF_ARM`
    /// command doesn't fit [`ParamDescriptor`]'s single-bounded-integer
    /// shape.
    pub(crate) async fn channel_send<Out: Send + 'static>(
        &self,
        prepared: seq_serial::Prepared<Out>,
    ) -> Result<Out, Error> {
        Ok(self.channel.send(prepared).await?)
    }
}
