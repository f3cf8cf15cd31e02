mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use seq_core::optics::Laser;

/// Seed test S6: a verify-type descriptor (`Laser::status`, backed by the
/// `verified()` STAT? descriptor) recovers from one garbage line by
/// retransmitting exactly once, resolving to the valid reply.
#[tokio::test]
async fn status_resolves_after_exactly_one_retransmission_on_garbage_then_valid() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_fake = calls.clone();
    let channel = common::fake_channel("laser_g", common::default_deadline(), move |cmd| {
        if cmd == "STAT?" {
            let n = calls_for_fake.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                "GARBLED".to_string()
            } else {
                "ENABLED".to_string()
            }
        } else {
            "OK".to_string()
        }
    });
    let laser = Laser::new("laser_g", channel);

    let status = laser
        .status()
        .await
        .expect("the retransmitted STAT? should resolve to a valid reply");
    assert!(status);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "exactly one retransmission: the first garbled reply plus the retry"
    );
}
