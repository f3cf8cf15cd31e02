//! Optics (component E): shutters, filters, and lasers, all addressed
//! through the FPGA channel except the lasers, which own a dedicated
//! channel each. Grounded on the vendor's `ON`/`OFF`/`POWER?`/`STAT?` laser
//! protocol.

use std::time::Duration;

use seq_serial::{descriptor, Channel, Descriptor, ParamDescriptor, StrDescriptor};

use crate::error::Error;

const POWER_RANGE: (i64, i64) = (0, 500);
const CONVERGE_TOLERANCE_MW: i64 = 3;
const CONVERGE_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn parse_power(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

fn parse_status(s: &str) -> Option<bool> {
    match s.trim() {
        "ENABLED" => Some(true),
        "DISABLED" => Some(false),
        _ => None,
    }
}

fn parse_ack(_s: &str) -> Option<()> {
    Some(())
}

fn on_descriptor() -> Descriptor<()> {
    Descriptor::new("ON", parse_ack)
}

fn off_descriptor() -> Descriptor<()> {
    Descriptor::new("OFF", parse_ack)
}

fn power_get_descriptor() -> Descriptor<i64> {
    Descriptor::new("POWER?", parse_power)
}

fn power_set_descriptor() -> ParamDescriptor<()> {
    ParamDescriptor::new(|p| format!("POWER={p}"), POWER_RANGE, parse_ack)
}

fn status_descriptor() -> Descriptor<bool> {
    Descriptor::new("STAT?", parse_status).verified()
}

/// A single laser line.
pub struct Laser {
    component: &'static str,
    channel: Channel,
}

impl Laser {
    pub fn new(component: &'static str, channel: Channel) -> Self {
        Self { component, channel }
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        self.channel.send(on_descriptor().prepare()).await?;
        self.set_power(1).await
    }

    pub async fn power(&self) -> Result<i64, Error> {
        Ok(self.channel.send(power_get_descriptor().prepare()).await?)
    }

    pub async fn status(&self) -> Result<bool, Error> {
        Ok(self.channel.send(status_descriptor().prepare()).await?)
    }

    /// Set output power and block until the readback converges to within
    /// ±3 mW of target, polling at 1 Hz.
    pub async fn set_power(&self, power_mw: i64) -> Result<(), Error> {
        let prepared = power_set_descriptor().bind(self.component, power_mw)?;
        self.channel.send(prepared).await?;
        loop {
            let actual = self.power().await?;
            if (actual - power_mw).abs() <= CONVERGE_TOLERANCE_MW {
                return Ok(());
            }
            tokio::time::sleep(CONVERGE_POLL_INTERVAL).await;
        }
    }

    pub async fn off(&self) -> Result<(), Error> {
        Ok(self.channel.send(off_descriptor().prepare()).await?)
    }
}

pub struct Lasers {
    pub g: Laser,
    pub r: Laser,
}

impl Lasers {
    pub async fn initialize(&self) -> Result<(), Error> {
        tokio::try_join!(self.g.initialize(), self.r.initialize())?;
        Ok(())
    }
}

const EMISSION_FILTERS: &[&str] = &["OPEN", "F1", "F2", "F3", "F4"];
const EXCITATION_FILTERS: &[&str] = &["OPEN", "GREEN", "RED"];

fn parse_filter_echo(s: &str) -> Option<String> {
    descriptor::capture1(r"^FILTER_SET\s+(\S+)$", s)
}

fn shutter_descriptor(open: bool) -> Descriptor<()> {
    if open {
        Descriptor::new("SHUTTER_OPEN", parse_ack)
    } else {
        Descriptor::new("SHUTTER_CLOSE", parse_ack)
    }
}

fn emission_filter_descriptor() -> StrDescriptor<String> {
    StrDescriptor::new(|f| format!("EM_FILTER_SET {f}"), EMISSION_FILTERS, parse_filter_echo)
}

fn excitation_filter_descriptor() -> StrDescriptor<String> {
    StrDescriptor::new(|f| format!("EX_FILTER_SET {f}"), EXCITATION_FILTERS, parse_filter_echo)
}

/// Shutters and filters, addressed over the shared FPGA channel.
pub struct Optics {
    channel: Channel,
}

impl Optics {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Wait for this FPGA channel's pending queue to drain.
    pub async fn wait_ready(&self) {
        self.channel.wait().await;
    }

    pub async fn set_emission_filter(&self, filter: &str) -> Result<(), Error> {
        let prepared = emission_filter_descriptor().bind("optics", filter)?;
        self.channel.send(prepared).await?;
        Ok(())
    }

    pub async fn set_excitation_filter(&self, filter: &str) -> Result<(), Error> {
        let prepared = excitation_filter_descriptor().bind("optics", filter)?;
        self.channel.send(prepared).await?;
        Ok(())
    }

    /// Open the shutter, run `scope`, then unconditionally close it —
    /// whether `scope` succeeded or failed.
    pub async fn open_shutter<F, Fut, T>(&self, scope: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        self.channel.send(shutter_descriptor(true).prepare()).await?;
        let result = scope().await;
        self.channel.send(shutter_descriptor(false).prepare()).await?;
        result
    }
}
