//! Opens real OS serial ports and wires them into a [`crate::Channel`].
//!
//! Grounded in the `tokio-serial` + split reader/writer idiom this lineage
//! uses for its device CLIs; unlike those CLIs, nothing here is tied to a
//! particular wire encoding beyond the separator byte a [`crate::Channel`]
//! already knows how to split on.

use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;

use crate::{Channel, Error};

/// Open a single bidirectional serial port (valves, lasers, X/Y stages).
pub async fn open(
    component: &'static str,
    device: &str,
    baud_rate: u32,
    separator: u8,
    min_spacing: Duration,
    deadline: Duration,
) -> Result<Channel, Error> {
    let mut port = tokio_serial::new(device, baud_rate)
        .open_native_async()
        .map_err(|source| Error::ChannelBroken {
            component,
            source: std::sync::Arc::new(std::io::Error::other(source)),
        })?;
    #[cfg(unix)]
    {
        use tokio_serial::SerialPort;
        let _ = port.set_exclusive(false);
    }
    let (reader, writer) = tokio::io::split(port);
    Ok(Channel::new_with_io(
        component,
        separator,
        min_spacing,
        deadline,
        reader,
        writer,
    ))
}

/// Open a split TX/RX serial channel (the FPGA link: commands go out one
/// port, responses come back on another).
pub async fn open_split(
    component: &'static str,
    tx_device: &str,
    rx_device: &str,
    baud_rate: u32,
    separator: u8,
    min_spacing: Duration,
    deadline: Duration,
) -> Result<Channel, Error> {
    let open_one = |device: &str| {
        tokio_serial::new(device, baud_rate)
            .open_native_async()
            .map_err(|source| Error::ChannelBroken {
                component,
                source: std::sync::Arc::new(std::io::Error::other(source)),
            })
    };
    let tx_port = open_one(tx_device)?;
    let rx_port = open_one(rx_device)?;
    Ok(Channel::new_with_io(
        component,
        separator,
        min_spacing,
        deadline,
        rx_port,
        tx_port,
    ))
}
