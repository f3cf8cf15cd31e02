//! Rotary selector valve and valve pair (component C).
//!
//! Each physical valve is a 10-port selector driven over its own serial
//! channel. A pair of valves composes into an 18-port logical reagent path
//! plus a reserved "safe" position 9, following the two-valve addressing
//! scheme the fluidics protocol uses: ports 1-8 live on the first valve,
//! ports 10-18 route through both.

use chrono::{DateTime, Utc};
use seq_serial::{descriptor, Channel, Descriptor, ParamDescriptor};

use crate::error::Error;

fn min_move_interval() -> chrono::Duration {
    chrono::Duration::seconds(10)
}

fn parse_id(s: &str) -> Option<String> {
    descriptor::capture1(r"^ID\s*=\s*(.+)$", s)
}

fn parse_np(s: &str) -> Option<i64> {
    descriptor::capture1(r"^NP\s*=\s*(\d+)$", s)?.parse().ok()
}

fn parse_position(s: &str) -> Option<i64> {
    descriptor::capture1(r"^Position is\s{2}=\s*(\d+)$", s)?.parse().ok()
}

fn parse_go_ack(s: &str) -> Option<()> {
    let t = s.trim();
    if t.eq_ignore_ascii_case("bad command") || t.to_lowercase().contains("bad command") {
        None
    } else {
        Some(())
    }
}

fn id_descriptor() -> Descriptor<String> {
    Descriptor::new("ID", parse_id)
}

fn np_descriptor() -> Descriptor<i64> {
    Descriptor::new("NP", parse_np)
}

fn cp_descriptor() -> Descriptor<i64> {
    Descriptor::new("CP", parse_position)
}

fn go_descriptor() -> ParamDescriptor<()> {
    ParamDescriptor::new(|p| format!("GO{p}"), (1, 10), parse_go_ack)
}

/// A single physical 10-port valve.
pub struct Valve {
    component: &'static str,
    channel: Channel,
    last_move: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl Valve {
    pub fn new(component: &'static str, channel: Channel) -> Self {
        Self {
            component,
            channel,
            last_move: parking_lot::Mutex::new(None),
        }
    }

    /// Confirm the unit is a fresh, unconfigured 10-port valve.
    pub async fn initialize(&self) -> Result<(), Error> {
        let _guard = self.channel.big_lock().lock().await;
        let id = self.channel.send(id_descriptor().prepare()).await?;
        if id.trim() != "not used" {
            return Err(Error::ProtocolViolation {
                component: self.component,
                message: format!("unexpected valve ID response: {id:?}"),
            });
        }
        let np = self.channel.send(np_descriptor().prepare()).await?;
        if np != 10 {
            return Err(Error::ProtocolViolation {
                component: self.component,
                message: format!("expected 10 ports, got {np}"),
            });
        }
        Ok(())
    }

    pub async fn pos(&self) -> Result<i64, Error> {
        Ok(self.channel.send(cp_descriptor().prepare()).await?)
    }

    /// Move to port `p` (1..=10), a no-op if already there.
    pub async fn move_to(&self, p: i64) -> Result<(), Error> {
        if !(1..=10).contains(&p) {
            return Err(Error::Validation {
                component: self.component,
                message: format!("port {p} out of range [1, 10]"),
            });
        }

        let _guard = self.channel.big_lock().lock().await;

        let current = self.channel.send(cp_descriptor().prepare()).await?;
        if current == p {
            return Ok(());
        }

        {
            let mut last_move = self.last_move.lock();
            let now = Utc::now();
            if let Some(prev) = *last_move {
                if now - prev < min_move_interval() {
                    tracing::warn!(
                        component = self.component,
                        "moving again within 10s of the previous move"
                    );
                }
            }
            *last_move = Some(now);
        }

        let go = go_descriptor().bind(self.component, p)?;
        self.channel.send(go).await?;

        let readback = self.channel.send(cp_descriptor().prepare()).await?;
        if readback != p {
            return Err(Error::PositionVerify {
                component: self.component,
                target: p,
                actual: readback,
            });
        }
        Ok(())
    }
}

/// Two physical valves composed into an 18-port logical reagent path plus
/// the reserved safe position 9.
pub struct ValvePair {
    valve0: Valve,
    valve1: Valve,
    mutex: tokio::sync::Mutex<()>,
}

impl ValvePair {
    pub fn new(valve0: Valve, valve1: Valve) -> Self {
        Self {
            valve0,
            valve1,
            mutex: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn initialize(&self) -> Result<(), Error> {
        tokio::try_join!(self.valve0.initialize(), self.valve1.initialize())?;
        Ok(())
    }

    pub async fn readback(&self) -> Result<i64, Error> {
        let p0 = self.valve0.pos().await?;
        if p0 == 10 {
            let p1 = self.valve1.pos().await?;
            Ok(9 + p1)
        } else {
            Ok(p0)
        }
    }

    /// Move to logical port `p` in {1..8} ∪ {10..18}. Port 9 (the safe
    /// position) is only reachable through [`ValvePair::port_safety`].
    pub async fn move_to(&self, p: i64) -> Result<(), Error> {
        if p == 9 || !((1..=8).contains(&p) || (10..=18).contains(&p)) {
            return Err(Error::Validation {
                component: "valve_pair",
                message: format!("{p} is not a directly reachable logical port"),
            });
        }

        let _guard = self.mutex.lock().await;
        self.move_unlocked(p).await?;

        let merged = self.readback().await?;
        if merged != p {
            return Err(Error::PositionVerify {
                component: "valve_pair",
                target: p,
                actual: merged,
            });
        }
        Ok(())
    }

    async fn move_unlocked(&self, p: i64) -> Result<(), Error> {
        if p >= 10 {
            tokio::try_join!(self.valve0.move_to(10), self.valve1.move_to(p - 9))?;
        } else {
            self.valve0.move_to(p).await?;
        }
        Ok(())
    }

    /// Move to `p`, run `scope`, then unconditionally return to the safe
    /// position 9, whether `scope` succeeded or failed. A panic unwinding
    /// through `scope` skips the return-to-9 step the same way a dropped
    /// `Drop` guard would not get to `.await`; the next `port_safety` caller
    /// re-homes regardless.
    pub async fn port_safety<F, Fut, T>(&self, p: i64, scope: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let _guard = self.mutex.lock().await;
        self.move_unlocked(p).await?;

        let result = scope().await;
        self.move_unlocked(9).await?;
        result
    }
}
