//! Shared test harness: a fake line-oriented serial device sitting behind a
//! `tokio::io::duplex` pair, driven by a caller-supplied responder closure.
//! This is the thing every integration test opens instead of a real port.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use seq_serial::Channel;

/// Spawn a task that reads newline-terminated commands from `reader` and
/// writes back whatever `respond` returns for each one (also
/// newline-terminated). Exits quietly once the other end closes.
fn spawn_fake_device<R, W>(reader: R, writer: W, mut respond: impl FnMut(&str) -> String + Send + 'static)
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut writer = writer;
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let cmd = line.trim_end_matches(['\r', '\n']);
            let response = respond(cmd);
            if writer.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            if writer.write_all(b"\n").await.is_err() {
                return;
            }
        }
    });
}

/// Build a [`Channel`] backed by a fake device that answers every command
/// through `respond`. `component` and `deadline` match the real channel's
/// constructor arguments.
pub fn fake_channel(
    component: &'static str,
    deadline: Duration,
    respond: impl FnMut(&str) -> String + Send + 'static,
) -> Channel {
    let (client, device) = tokio::io::duplex(8192);
    let (device_read, device_write) = tokio::io::split(device);
    spawn_fake_device(device_read, device_write, respond);
    let (client_read, client_write) = tokio::io::split(client);
    Channel::new_with_io(component, b'\n', Duration::from_millis(0), deadline, client_read, client_write)
}

pub fn default_deadline() -> Duration {
    Duration::from_secs(2)
}
