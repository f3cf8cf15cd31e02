//! TDI scan preparation, issued over the shared FPGA channel ahead of a
//! capture (component G step: "prepare TDI for n_px_y starting at current y").

use seq_serial::{Channel, Prepared};

use crate::error::Error;

fn parse_ack(_s: &str) -> Option<()> {
    Some(())
}

pub struct Tdi {
    channel: Channel,
}

impl Tdi {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub async fn prepare_for_imaging(&self, n_px_y: i64, y_pos: i64) -> Result<(), Error> {
        let text = format!("TDI_PREP {n_px_y} {y_pos}");
        let prepared = Prepared::new(text, 1, parse_ack, false);
        self.channel.send(prepared).await?;
        Ok(())
    }
}
