//! Z-tilt: three physical motors (1, 2, 3) that fan out together on every
//! logical move and report position as a 3-tuple. Grounded on the FPGA tilt
//! protocol's `T{i}` command family.

use seq_serial::{descriptor, Channel, Prepared};

use crate::error::Error;

const STEP_RANGE: (i64, i64) = (0, 60_000);

fn parse_rd(s: &str) -> Option<i64> {
    descriptor::capture1(r"^T\dRD\s+(\d+)$", s)?.parse().ok()
}

fn parse_hm_ack(s: &str) -> Option<()> {
    let t = s.trim();
    (t.starts_with('T') && t.ends_with("HM")).then_some(())
}

fn parse_cr_ack(s: &str) -> Option<()> {
    let t = s.trim();
    (t.starts_with('T') && t.ends_with("CR")).then_some(())
}

fn parse_vl_ack(s: &str) -> Option<i64> {
    descriptor::capture1(r"^T\dVL\s+(-?\d+)$", s)?.parse().ok()
}

fn parse_cur_ack(s: &str) -> Option<i64> {
    descriptor::capture1(r"^T\dCUR\s+(-?\d+)$", s)?.parse().ok()
}

/// One physical tilt motor, addressed `1`, `2`, or `3`.
struct TiltMotor {
    index: u8,
    channel: Channel,
}

impl TiltMotor {
    fn component(&self) -> &'static str {
        match self.index {
            1 => "z_tilt_1",
            2 => "z_tilt_2",
            _ => "z_tilt_3",
        }
    }

    async fn clear_registers(&self) -> Result<(), Error> {
        let text = format!("T{}CR", self.index);
        let prepared = Prepared::new(text, 1, parse_cr_ack, false);
        self.channel.send(prepared).await?;
        Ok(())
    }

    async fn set_current(&self, milliamps: i64) -> Result<(), Error> {
        let text = format!("T{}CUR {}", self.index, milliamps);
        let prepared = Prepared::new(text, 1, parse_cur_ack, false);
        self.channel.send(prepared).await?;
        Ok(())
    }

    async fn set_velocity(&self, v: i64) -> Result<(), Error> {
        let text = format!("T{}VL {}", self.index, v);
        let prepared = Prepared::new(text, 1, parse_vl_ack, false);
        self.channel.send(prepared).await?;
        Ok(())
    }

    async fn home(&self) -> Result<(), Error> {
        let text = format!("T{}HM", self.index);
        let prepared = Prepared::new(text, 1, parse_hm_ack, false);
        self.channel.send(prepared).await?;
        Ok(())
    }

    async fn move_to(&self, target: i64) -> Result<(), Error> {
        if target < STEP_RANGE.0 || target > STEP_RANGE.1 {
            return Err(Error::Validation {
                component: self.component(),
                message: format!("{target} out of range {STEP_RANGE:?}"),
            });
        }
        let text = format!("T{}MOVETO {}", self.index, target);
        let prepared = Prepared::new(text, 1, parse_rd, true);
        let readback = self.channel.send(prepared).await?;
        if readback == 0 {
            return Err(Error::InvariantBroken {
                component: self.component(),
                message: "register not cleared (zero position after move)".to_string(),
            });
        }
        Ok(())
    }

    async fn pos(&self) -> Result<i64, Error> {
        let text = format!("T{}RD", self.index);
        let prepared = Prepared::new(text, 1, parse_rd, false);
        let p = self.channel.send(prepared).await?;
        if p == 0 {
            return Err(Error::InvariantBroken {
                component: self.component(),
                message: "register not cleared (zero position readback)".to_string(),
            });
        }
        Ok(p)
    }
}

pub struct TiltStage {
    motors: [TiltMotor; 3],
}

impl TiltStage {
    /// All three motors are addressed `T1`/`T2`/`T3` over the single shared
    /// FPGA channel; `channel` is typically a clone of that one handle.
    pub fn new(channel: Channel) -> Self {
        Self {
            motors: [
                TiltMotor { index: 1, channel: channel.clone() },
                TiltMotor { index: 2, channel: channel.clone() },
                TiltMotor { index: 3, channel },
            ],
        }
    }

    /// Cold-boot sequence: clear registers, set current, set velocity, home
    /// — in that order, for each motor.
    pub async fn initialize(&self, current: i64, velocity: i64) -> Result<(), Error> {
        for motor in &self.motors {
            motor.clear_registers().await?;
            motor.set_current(current).await?;
            motor.set_velocity(velocity).await?;
            motor.home().await?;
        }
        Ok(())
    }

    pub async fn pos(&self) -> Result<(i64, i64, i64), Error> {
        let (p1, p2, p3) = tokio::try_join!(
            self.motors[0].pos(),
            self.motors[1].pos(),
            self.motors[2].pos()
        )?;
        Ok((p1, p2, p3))
    }

    /// Moves fan out to all three motors concurrently.
    pub async fn move_to(&self, target: i64) -> Result<(), Error> {
        tokio::try_join!(
            self.motors[0].move_to(target),
            self.motors[1].move_to(target),
            self.motors[2].move_to(target)
        )?;
        Ok(())
    }
}
