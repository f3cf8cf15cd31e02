mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use seq_core::camera::{CameraPair, DcamBackend, MockDcam};
use seq_core::motion::{Axis, Objective, TiltStage};
use seq_core::optics::{Laser, Lasers, Optics};
use seq_core::orchestrator::Orchestrator;
use seq_core::tdi::Tdi;
use seq_core::Error;

/// Wire a full [`Orchestrator`] against fake serial devices and a pair of
/// [`MockDcam`]s that report `n_bundles` bundles immediately on the first
/// poll, so a `take()` call completes in a single poll tick.
fn fresh_orchestrator(cam0_fill: u16, cam1_fill: u16, n_bundles_total: i32) -> Orchestrator {
    let x_channel = common::fake_channel("x", common::default_deadline(), |cmd| {
        if cmd == "POS?" {
            "POS 0".to_string()
        } else {
            "UNKNOWN".to_string()
        }
    });

    let y_pos = Arc::new(Mutex::new(0i64));
    let y_pos_fake = y_pos.clone();
    let y_mode = Arc::new(Mutex::new(String::new()));
    let y_channel = common::fake_channel("y", common::default_deadline(), move |cmd| {
        if cmd == "POS?" {
            format!("POS {}", *y_pos_fake.lock().unwrap())
        } else if let Some(rest) = cmd.strip_prefix("SET_POS ") {
            let target: i64 = rest.parse().unwrap();
            *y_pos_fake.lock().unwrap() = target;
            format!("POS {target}")
        } else if let Some(rest) = cmd.strip_prefix("MODE ") {
            *y_mode.lock().unwrap() = rest.to_string();
            format!("MODE {rest}")
        } else {
            "UNKNOWN".to_string()
        }
    });

    let fpga_channel = common::fake_channel("fpga", common::default_deadline(), |cmd| {
        if cmd == "T1RD" {
            "T1RD 100".to_string()
        } else if cmd == "T2RD" {
            "T2RD 100".to_string()
        } else if cmd == "T3RD" {
            "T3RD 100".to_string()
        } else if cmd == "POS?" {
            "POS 30000".to_string()
        } else if cmd.starts_with("TDI_PREP") {
            "TDI_PREP_ACK".to_string()
        } else if cmd == "SHUTTER_OPEN" {
            "SHUTTER_OPEN".to_string()
        } else if cmd == "SHUTTER_CLOSE" {
            "SHUTTER_CLOSE".to_string()
        } else if cmd.starts_with("AF_ARM") {
            "AF_ARM_ACK".to_string()
        } else if let Some(rest) = cmd.strip_prefix("SET_POS ") {
            format!("POS {rest}")
        } else {
            "UNKNOWN".to_string()
        }
    });

    let laser_g_channel = common::fake_channel("laser_g", common::default_deadline(), |cmd| {
        if cmd == "POWER?" { "10".to_string() } else { "OK".to_string() }
    });
    let laser_r_channel = common::fake_channel("laser_r", common::default_deadline(), |cmd| {
        if cmd == "POWER?" { "10".to_string() } else { "OK".to_string() }
    });

    let x = Axis::new("x", x_channel, (-50_000, 50_000), None, 100.0, false);
    let y = Axis::new("y", y_channel, (-7_000_000, 7_000_000), None, 100.0, true);
    let z_tilt = TiltStage::new(fpga_channel.clone());
    let z_obj = Objective::new(Axis::new("z_obj", fpga_channel.clone(), (0, 65_535), None, 1.0, false));
    let lasers = Lasers {
        g: Laser::new("laser_g", laser_g_channel),
        r: Laser::new("laser_r", laser_r_channel),
    };
    let optics = Optics::new(fpga_channel.clone());
    let tdi = Tdi::new(fpga_channel);

    let cam0: Box<dyn DcamBackend> = Box::new(mock_cam(cam0_fill, n_bundles_total));
    let cam1: Box<dyn DcamBackend> = Box::new(mock_cam(cam1_fill, n_bundles_total));
    let cams = CameraPair::spawn(cam0, cam1).expect("camera worker should spawn");

    Orchestrator::new(x, y, z_tilt, z_obj, lasers, optics, tdi, cams, Duration::from_millis(1))
}

fn mock_cam(fill: u16, n_bundles_total: i32) -> MockDcam {
    let mut cam = MockDcam::with_poll_sequence(vec![n_bundles_total]);
    cam.bundle_fill = match fill {
        111 => |_i| 111,
        222 => |_i| 222,
        _ => |_i| 0,
    };
    cam
}

/// Same wiring as [`fresh_orchestrator`], but the fpga fake device and both
/// cameras' poll hooks append to a shared `log` in the order their events
/// actually occur, so a test can check cross-device ordering that isn't
/// otherwise observable (the camera pair's poll loop runs on its own worker
/// thread, invisible from outside except through `log`).
fn logging_orchestrator(cam0_fill: u16, cam1_fill: u16, n_bundles_total: i32, log: Arc<Mutex<Vec<String>>>) -> Orchestrator {
    let x_channel = common::fake_channel("x", common::default_deadline(), |cmd| {
        if cmd == "POS?" {
            "POS 0".to_string()
        } else {
            "UNKNOWN".to_string()
        }
    });

    let y_pos = Arc::new(Mutex::new(0i64));
    let y_pos_fake = y_pos.clone();
    let y_channel = common::fake_channel("y", common::default_deadline(), move |cmd| {
        if cmd == "POS?" {
            format!("POS {}", *y_pos_fake.lock().unwrap())
        } else if let Some(rest) = cmd.strip_prefix("SET_POS ") {
            let target: i64 = rest.parse().unwrap();
            *y_pos_fake.lock().unwrap() = target;
            format!("POS {target}")
        } else if let Some(rest) = cmd.strip_prefix("MODE ") {
            format!("MODE {rest}")
        } else {
            "UNKNOWN".to_string()
        }
    });

    let fpga_log = log.clone();
    let fpga_channel = common::fake_channel("fpga", common::default_deadline(), move |cmd| {
        if cmd == "SHUTTER_OPEN" || cmd == "SHUTTER_CLOSE" {
            fpga_log.lock().unwrap().push(cmd.to_string());
        }
        if cmd == "T1RD" {
            "T1RD 100".to_string()
        } else if cmd == "T2RD" {
            "T2RD 100".to_string()
        } else if cmd == "T3RD" {
            "T3RD 100".to_string()
        } else if cmd == "POS?" {
            "POS 30000".to_string()
        } else if cmd.starts_with("TDI_PREP") {
            "TDI_PREP_ACK".to_string()
        } else if cmd == "SHUTTER_OPEN" {
            "SHUTTER_OPEN".to_string()
        } else if cmd == "SHUTTER_CLOSE" {
            "SHUTTER_CLOSE".to_string()
        } else if let Some(rest) = cmd.strip_prefix("SET_POS ") {
            format!("POS {rest}")
        } else {
            "UNKNOWN".to_string()
        }
    });

    let laser_g_channel = common::fake_channel("laser_g", common::default_deadline(), |cmd| {
        if cmd == "POWER?" { "10".to_string() } else { "OK".to_string() }
    });
    let laser_r_channel = common::fake_channel("laser_r", common::default_deadline(), |cmd| {
        if cmd == "POWER?" { "10".to_string() } else { "OK".to_string() }
    });

    let x = Axis::new("x", x_channel, (-50_000, 50_000), None, 100.0, false);
    let y = Axis::new("y", y_channel, (-7_000_000, 7_000_000), None, 100.0, true);
    let z_tilt = TiltStage::new(fpga_channel.clone());
    let z_obj = Objective::new(Axis::new("z_obj", fpga_channel.clone(), (0, 65_535), None, 1.0, false));
    let lasers = Lasers {
        g: Laser::new("laser_g", laser_g_channel),
        r: Laser::new("laser_r", laser_r_channel),
    };
    let optics = Optics::new(fpga_channel.clone());
    let tdi = Tdi::new(fpga_channel);

    let mut cam0 = mock_cam(cam0_fill, n_bundles_total);
    let poll_log0 = log.clone();
    cam0.on_poll = Some(Arc::new(move || poll_log0.lock().unwrap().push("POLL".to_string())));
    let mut cam1 = mock_cam(cam1_fill, n_bundles_total);
    let poll_log1 = log.clone();
    cam1.on_poll = Some(Arc::new(move || poll_log1.lock().unwrap().push("POLL".to_string())));

    let cam0: Box<dyn DcamBackend> = Box::new(cam0);
    let cam1: Box<dyn DcamBackend> = Box::new(cam1);
    let cams = CameraPair::spawn(cam0, cam1).expect("camera worker should spawn");

    Orchestrator::new(x, y, z_tilt, z_obj, lasers, optics, tdi, cams, Duration::from_millis(1))
}

#[tokio::test]
async fn take_assembles_the_requested_channels_from_the_right_camera() {
    // CHANNEL_REMAP = [1, 3, 2, 0]: channel 0 -> physical 1 (camera 0),
    // channel 2 -> physical 2 (camera 1).
    let orch = fresh_orchestrator(111, 222, 3); // n_bundles(2) + flush bundle = 3
    let (image, state) = orch
        .take(2, false, &[0, 2], true)
        .await
        .expect("take should succeed");

    assert_eq!(image.shape()[0], 2);
    assert!(image.slice(ndarray::s![0, .., ..]).iter().all(|&v| v == 111));
    assert!(image.slice(ndarray::s![1, .., ..]).iter().all(|&v| v == 222));
    assert_eq!(state.y, 0);
}

#[tokio::test]
async fn take_assembles_all_four_channels_with_shutter_bracketing_every_poll() {
    // Seed test S4: four channels, full shape (4, 256, 2048) for a
    // 2-bundle take (+ flush bundle = 3, minus the discarded flush bundle's
    // 128 rows leaves 256), and the shutter must open before the first
    // transfer-info poll and close only after the last.
    let log = Arc::new(Mutex::new(Vec::new()));
    let orch = logging_orchestrator(111, 222, 3, log.clone());
    let (image, _state) = orch
        .take(2, false, &[0, 1, 2, 3], true)
        .await
        .expect("take should succeed");

    assert_eq!(image.shape(), &[4, 256, 2048]);
    // CHANNEL_REMAP = [1, 3, 2, 0]: channels 0 and 3 land on camera 0,
    // channels 1 and 2 on camera 1.
    assert!(image.slice(ndarray::s![0, .., ..]).iter().all(|&v| v == 111));
    assert!(image.slice(ndarray::s![1, .., ..]).iter().all(|&v| v == 222));
    assert!(image.slice(ndarray::s![2, .., ..]).iter().all(|&v| v == 222));
    assert!(image.slice(ndarray::s![3, .., ..]).iter().all(|&v| v == 111));

    let log = log.lock().unwrap();
    let first_open = log.iter().position(|e| e == "SHUTTER_OPEN").expect("shutter should have opened");
    let last_close = log.iter().rposition(|e| e == "SHUTTER_CLOSE").expect("shutter should have closed");
    let first_poll = log.iter().position(|e| e == "POLL").expect("camera should have polled at least once");
    let last_poll = log.iter().rposition(|e| e == "POLL").expect("camera should have polled at least once");

    assert!(first_open < first_poll, "shutter must open before the first poll");
    assert!(last_close > last_poll, "shutter must close after the last poll");
}

#[tokio::test]
async fn take_restores_y_to_the_start_position_when_requested() {
    let orch = fresh_orchestrator(111, 222, 3);
    let (_image, state) = orch.take(2, false, &[0], true).await.expect("take should succeed");
    assert_eq!(state.y, 0);
    assert_eq!(orch.y.pos().await.unwrap(), 0);
}

#[tokio::test]
async fn take_rejects_an_out_of_range_bundle_count() {
    let orch = fresh_orchestrator(111, 222, 3);
    let err = orch.take(0, false, &[0], true).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn take_rejects_an_unknown_channel() {
    let orch = fresh_orchestrator(111, 222, 3);
    let err = orch.take(2, false, &[4], true).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn state_reports_every_axis_and_laser() {
    let orch = fresh_orchestrator(111, 222, 3);
    let state = orch.state().await.expect("state should succeed");
    assert_eq!(state.x, 0);
    assert_eq!(state.y, 0);
    assert_eq!(state.z_tilt, (100, 100, 100));
    assert_eq!(state.z_obj, 30000);
    assert_eq!(state.laser_g, 10);
    assert_eq!(state.laser_r, 10);
}

#[tokio::test]
async fn autofocus_reports_a_target_within_the_travel_limits() {
    let orch = fresh_orchestrator(111, 222, 232);
    let target = orch.autofocus(0).await.expect("autofocus should succeed");
    assert!((0..=65_535).contains(&target));
}

#[tokio::test]
async fn autofocus_rejects_an_unknown_channel() {
    let orch = fresh_orchestrator(111, 222, 232);
    let err = orch.autofocus(9).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}
