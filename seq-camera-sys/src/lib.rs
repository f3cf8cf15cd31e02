#![allow(non_snake_case, non_camel_case_types)]
//! Raw `extern "C"` signatures for the vendor camera driver referenced by
//! name in the design (`dcam_*`). No vendor library is bundled or linked
//! here: this crate exists only to give the entry points a typed shape.
//! Production code never calls these directly; it goes through
//! `seq_core::camera::backend::DcamBackend`, which a real build implements
//! against this module and tests implement against an in-memory fake.

use libc::{c_char, c_int, c_void};

pub type DCAM_HDCAM = *mut c_void;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcamCaptureMode {
    Snap = 0,
    Sequence = 1,
}

/// Mirrors `dcamapi.h`'s status codes (dcamapi.h line 231 in vendor docs).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcamStatus {
    Error = 0,
    Busy = 1,
    Ready = 2,
    Stable = 3,
    Unstable = 4,
}

impl TryFrom<c_int> for DcamStatus {
    type Error = c_int;

    fn try_from(value: c_int) -> Result<Self, c_int> {
        match value {
            0 => Ok(DcamStatus::Error),
            1 => Ok(DcamStatus::Busy),
            2 => Ok(DcamStatus::Ready),
            3 => Ok(DcamStatus::Stable),
            4 => Ok(DcamStatus::Unstable),
            other => Err(other),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DcamTransferInfo {
    pub b_index: c_int,
    pub f_count: c_int,
}

extern "C" {
    pub fn dcam_init(initoption: *const c_void, n_device: *mut c_int, reserved: *const c_char) -> c_int;
    pub fn dcam_open(h: *mut DCAM_HDCAM, index: c_int, reserved: *const c_char) -> c_int;
    pub fn dcam_close(h: DCAM_HDCAM) -> c_int;

    pub fn dcam_precapture(h: DCAM_HDCAM, mode: DcamCaptureMode) -> c_int;
    pub fn dcam_capture(h: DCAM_HDCAM) -> c_int;
    pub fn dcam_idle(h: DCAM_HDCAM) -> c_int;

    pub fn dcam_allocframe(h: DCAM_HDCAM, n_frames: c_int) -> c_int;
    pub fn dcam_freeframe(h: DCAM_HDCAM) -> c_int;

    pub fn dcam_lockdata(h: DCAM_HDCAM, top: *mut *mut c_void, row_bytes: *mut c_int, frame: c_int) -> c_int;
    pub fn dcam_unlockdata(h: DCAM_HDCAM) -> c_int;

    pub fn dcam_getstatus(h: DCAM_HDCAM, status: *mut c_int) -> c_int;
    pub fn dcam_gettransferinfo(h: DCAM_HDCAM, info: *mut DcamTransferInfo) -> c_int;

    pub fn dcam_getpropertyvalue(h: DCAM_HDCAM, id_str: *const c_char, value: *mut f64) -> c_int;
    pub fn dcam_setpropertyvalue(h: DCAM_HDCAM, id_str: *const c_char, value: f64) -> c_int;
}
