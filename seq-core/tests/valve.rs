mod common;

use std::sync::{Arc, Mutex};

use seq_core::valve::{Valve, ValvePair};
use seq_core::Error;

fn fresh_valve(component: &'static str, pos: i64) -> Valve {
    let pos = Arc::new(Mutex::new(pos));
    let channel = common::fake_channel(component, common::default_deadline(), move |cmd| {
        if cmd == "ID" {
            "ID = not used".to_string()
        } else if cmd == "NP" {
            "NP = 10".to_string()
        } else if cmd == "CP" {
            format!("Position is  = {}", *pos.lock().unwrap())
        } else if let Some(rest) = cmd.strip_prefix("GO") {
            *pos.lock().unwrap() = rest.parse().unwrap();
            "OK".to_string()
        } else {
            "UNKNOWN".to_string()
        }
    });
    Valve::new(component, channel)
}

#[tokio::test]
async fn valve_initializes_and_moves() {
    let valve = fresh_valve("valve_test", 1);
    valve.initialize().await.expect("initialize should succeed");
    assert_eq!(valve.pos().await.unwrap(), 1);
    valve.move_to(4).await.expect("move should succeed");
    assert_eq!(valve.pos().await.unwrap(), 4);
}

#[tokio::test]
async fn valve_move_to_is_a_noop_when_already_there() {
    let valve = fresh_valve("valve_test", 7);
    valve.move_to(7).await.expect("no-op move should succeed");
    assert_eq!(valve.pos().await.unwrap(), 7);
}

#[tokio::test]
async fn valve_move_to_rejects_out_of_range_port() {
    let valve = fresh_valve("valve_test", 1);
    let err = valve.move_to(11).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

fn fresh_pair() -> ValvePair {
    ValvePair::new(fresh_valve("valve_a1", 1), fresh_valve("valve_a2", 1))
}

#[tokio::test]
async fn valve_pair_reaches_high_ports_through_both_valves() {
    let pair = fresh_pair();
    pair.initialize().await.expect("initialize should succeed");

    pair.move_to(3).await.expect("low port reachable through valve0 alone");
    assert_eq!(pair.readback().await.unwrap(), 3);

    pair.move_to(15).await.expect("high port reachable through both valves");
    assert_eq!(pair.readback().await.unwrap(), 15);
}

#[tokio::test]
async fn valve_pair_rejects_the_reserved_safe_port() {
    let pair = fresh_pair();
    let err = pair.move_to(9).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn port_safety_returns_to_safe_position_on_success_and_failure() {
    let pair = fresh_pair();

    pair.port_safety(5, || async { Ok::<_, Error>(()) }).await.unwrap();
    assert_eq!(pair.readback().await.unwrap(), 9);

    let result: Result<(), Error> = pair
        .port_safety(3, || async {
            Err(Error::Cancelled { component: "test" })
        })
        .await;
    assert!(result.is_err());
    assert_eq!(pair.readback().await.unwrap(), 9);
}
