//! Line-oriented request/response transport for the instrument's RS-232-like
//! peripherals (valves, FPGA, lasers). See [`Channel`] for the transport and
//! [`descriptor`] for how commands are described.

mod channel;
pub mod descriptor;
mod error;
pub mod serial_port;

pub use channel::Channel;
pub use descriptor::{Descriptor, ParamDescriptor, Prepared, StrDescriptor};
pub use error::Error;
