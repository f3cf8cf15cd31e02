//! Z-objective: a plain linear axis plus the autofocus sweep primitive.

use seq_serial::Prepared;

use crate::error::Error;
use crate::motion::axis::Axis;

fn parse_arm_ack(s: &str) -> Option<()> {
    let t = s.trim();
    (t.starts_with("AF_ARM")).then_some(())
}

pub struct Objective {
    axis: Axis,
}

impl Objective {
    pub fn new(axis: Axis) -> Self {
        Self { axis }
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        self.axis.initialize().await
    }

    pub async fn pos(&self) -> Result<i64, Error> {
        self.axis.pos().await
    }

    pub async fn move_to(&self, target: i64) -> Result<(), Error> {
        self.axis.move_to(target).await
    }

    /// Arm a triggered linear sweep over `[z_min, z_max]` matched to
    /// `n_frames` captures: pre-position at `z_max`, then arm the scan. The
    /// caller must drive the returned guard's [`AfArmGuard::start_move`] to
    /// begin sweeping down to `z_min` in sync with capture, then await
    /// [`AfArmGuard::finish`] (on every exit path, success or failure) to
    /// restore the pre-sweep position — this is the async-drop-equivalent
    /// guard used for scopes whose cleanup itself must `.await`.
    pub async fn af_arm(&self, z_min: i64, z_max: i64, n_frames: i64) -> Result<AfArmGuard<'_>, Error> {
        let pre_sweep = self.axis.pos().await?;
        self.axis.move_to(z_max).await?;
        let text = format!("AF_ARM {z_min} {z_max} {n_frames}");
        let prepared = Prepared::new(text, 1, parse_arm_ack, false);
        self.axis.channel_send(prepared).await?;
        Ok(AfArmGuard {
            objective: self,
            pre_sweep,
            z_min,
            z_max,
        })
    }
}

pub struct AfArmGuard<'a> {
    objective: &'a Objective,
    pre_sweep: i64,
    z_min: i64,
    z_max: i64,
}

impl AfArmGuard<'_> {
    /// Begin the sweep: move to `z_min`, capturing while the already-armed
    /// scan runs from `z_max` down to `z_min`.
    pub async fn start_move(&self) -> Result<(), Error> {
        self.objective.axis.move_to(self.z_min).await
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.z_min, self.z_max)
    }

    /// Restore the pre-sweep position. Must be called on every exit path;
    /// `Drop` cannot `.await` so this is explicit rather than automatic.
    pub async fn finish(self) -> Result<(), Error> {
        self.objective.axis.move_to(self.pre_sweep).await
    }
}
