mod common;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use seq_serial::{Channel, Error, Prepared};

fn parse_ack_index(s: &str) -> Option<i64> {
    s.trim().strip_prefix("ACK")?.parse().ok()
}

fn parse_text(s: &str) -> Option<String> {
    Some(s.trim().to_string())
}

/// Invariant 6: concurrent senders on one channel see bijective FIFO
/// ordering — each command's response resolves to the reply to *that*
/// command, never to a neighbor's, even when many sends race to enqueue.
#[tokio::test]
async fn concurrent_sends_resolve_in_bijective_fifo_order() {
    let channel = common::fake_channel("test", Duration::from_secs(2), |cmd| {
        let n = cmd.strip_prefix("CMD").expect("unexpected command");
        format!("ACK{n}")
    });

    const N: i64 = 32;
    let mut handles = Vec::with_capacity(N as usize);
    for i in 0..N {
        let channel = channel.clone();
        handles.push(tokio::spawn(async move {
            let prepared = Prepared::new(format!("CMD{i}"), 1, parse_ack_index, false);
            channel.send(prepared).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.expect("task should not panic").expect("send should succeed");
        assert_eq!(result, i as i64, "response for CMD{i} must resolve to its own reply, not a neighbor's");
    }
}

/// Seed test S15: a command that times out does not poison the channel —
/// once the stale reply drains, later commands still resolve normally.
#[tokio::test]
async fn timeout_does_not_poison_the_channel() {
    let (client, device) = tokio::io::duplex(8192);
    let (device_read, device_write) = tokio::io::split(device);

    tokio::spawn(async move {
        let mut writer = device_write;
        let mut buf_reader = BufReader::new(device_read);
        let mut line = String::new();
        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let cmd = line.trim_end_matches(['\r', '\n']).to_string();
            if cmd == "SLOW" {
                // Answers, but well past the channel's deadline below.
                tokio::time::sleep(Duration::from_millis(150)).await;
                if writer.write_all(b"SLOW_ACK\n").await.is_err() {
                    return;
                }
            } else if writer.write_all(b"PONG\n").await.is_err() {
                return;
            }
        }
    });

    let (client_read, client_write) = tokio::io::split(client);
    let channel = Channel::new_with_io(
        "test",
        b'\n',
        Duration::from_millis(0),
        Duration::from_millis(50),
        client_read,
        client_write,
    );

    let err = channel
        .send(Prepared::new("SLOW".to_string(), 1, parse_text, false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    // Let the late reply drain so the queue isn't left pointing at the
    // already-timed-out request before issuing the next command.
    tokio::time::sleep(Duration::from_millis(150)).await;
    channel.wait().await;

    let ok = channel
        .send(Prepared::new("PING".to_string(), 1, parse_text, false))
        .await
        .expect("channel must still accept commands after an earlier timeout");
    assert_eq!(ok, "PONG");
}
