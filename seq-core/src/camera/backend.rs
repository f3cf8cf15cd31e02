//! The `DcamBackend` trait (component K): separates the orchestration logic
//! in [`crate::camera::pair::CameraPair`] from the actual vendor driver, so
//! the same control flow runs against real hardware or a deterministic test
//! fake. All methods are synchronous and blocking by design: every call is
//! expected to run on the camera worker's dedicated thread, never on an
//! async task.

use seq_camera_sys as sys;

use crate::error::Error;

pub const CAMERA_COMPONENT: &str = "camera";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Snap,
    Sequence,
}

/// A single camera handle as the orchestration layer sees it: open/close,
/// named float properties, and the capture lifecycle primitives used by
/// [`crate::camera::pair::CameraPair::capture`].
pub trait DcamBackend: Send {
    fn open(&mut self, index: i32) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;

    fn get_property(&mut self, name: &str) -> Result<f64, Error>;
    fn set_property(&mut self, name: &str, value: f64) -> Result<(), Error>;

    fn precapture(&mut self, mode: CaptureMode) -> Result<(), Error>;
    fn alloc_frame(&mut self, n_bundles: i32) -> Result<(), Error>;
    fn free_frame(&mut self) -> Result<(), Error>;
    fn capture(&mut self) -> Result<(), Error>;
    fn idle(&mut self) -> Result<(), Error>;

    /// `(b_index, f_count)` — the running bundle index and frame count the
    /// driver reports having transferred to host memory.
    fn transfer_info(&mut self) -> Result<(i32, i32), Error>;

    /// Lock bundle `index`'s memory, copy `height * width` `u16`s out, and
    /// unlock. Returns the copied bundle, row-major.
    fn read_bundle(&mut self, index: i32, width: usize, height: usize) -> Result<Vec<u16>, Error>;
}

/// The real vendor driver, reached through the raw FFI signatures in
/// `seq-camera-sys`. Every method is `unsafe` at the call site because the
/// vendor library's contract (single-threaded, handle-scoped) is enforced
/// by the caller (the camera worker thread), not by the type system.
pub struct RealDcam {
    handle: sys::DCAM_HDCAM,
}

impl RealDcam {
    /// # Safety
    /// `dcam_init` must already have been called exactly once for the
    /// process before any `RealDcam` is constructed.
    pub unsafe fn new() -> Self {
        Self {
            handle: std::ptr::null_mut(),
        }
    }

    fn check(&self, component: &'static str, what: &str, rc: i32) -> Result<(), Error> {
        if rc < 0 {
            Err(Error::Driver {
                component,
                message: format!("{what} failed with code {rc}"),
            })
        } else {
            Ok(())
        }
    }
}

impl DcamBackend for RealDcam {
    fn open(&mut self, index: i32) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_open(&mut self.handle, index, std::ptr::null()) };
        self.check(CAMERA_COMPONENT, "dcam_open", rc)
    }

    fn close(&mut self) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_close(self.handle) };
        self.check(CAMERA_COMPONENT, "dcam_close", rc)
    }

    fn get_property(&mut self, name: &str) -> Result<f64, Error> {
        let cname = std::ffi::CString::new(name).map_err(|_| Error::Validation {
            component: CAMERA_COMPONENT,
            message: format!("property name `{name}` contains a NUL byte"),
        })?;
        let mut value = 0.0f64;
        let rc = unsafe { sys::dcam_getpropertyvalue(self.handle, cname.as_ptr(), &mut value) };
        self.check(CAMERA_COMPONENT, "dcam_getpropertyvalue", rc)?;
        Ok(value)
    }

    fn set_property(&mut self, name: &str, value: f64) -> Result<(), Error> {
        let cname = std::ffi::CString::new(name).map_err(|_| Error::Validation {
            component: CAMERA_COMPONENT,
            message: format!("property name `{name}` contains a NUL byte"),
        })?;
        let rc = unsafe { sys::dcam_setpropertyvalue(self.handle, cname.as_ptr(), value) };
        self.check(CAMERA_COMPONENT, "dcam_setpropertyvalue", rc)
    }

    fn precapture(&mut self, mode: CaptureMode) -> Result<(), Error> {
        let mode = match mode {
            CaptureMode::Snap => sys::DcamCaptureMode::Snap,
            CaptureMode::Sequence => sys::DcamCaptureMode::Sequence,
        };
        let rc = unsafe { sys::dcam_precapture(self.handle, mode) };
        self.check(CAMERA_COMPONENT, "dcam_precapture", rc)
    }

    fn alloc_frame(&mut self, n_bundles: i32) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_allocframe(self.handle, n_bundles) };
        self.check(CAMERA_COMPONENT, "dcam_allocframe", rc)
    }

    fn free_frame(&mut self) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_freeframe(self.handle) };
        self.check(CAMERA_COMPONENT, "dcam_freeframe", rc)
    }

    fn capture(&mut self) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_capture(self.handle) };
        self.check(CAMERA_COMPONENT, "dcam_capture", rc)
    }

    fn idle(&mut self) -> Result<(), Error> {
        let rc = unsafe { sys::dcam_idle(self.handle) };
        self.check(CAMERA_COMPONENT, "dcam_idle", rc)
    }

    fn transfer_info(&mut self) -> Result<(i32, i32), Error> {
        let mut info = sys::DcamTransferInfo { b_index: -1, f_count: -1 };
        let rc = unsafe { sys::dcam_gettransferinfo(self.handle, &mut info) };
        self.check(CAMERA_COMPONENT, "dcam_gettransferinfo", rc)?;
        Ok((info.b_index, info.f_count))
    }

    fn read_bundle(&mut self, index: i32, width: usize, height: usize) -> Result<Vec<u16>, Error> {
        let mut top: *mut std::ffi::c_void = std::ptr::null_mut();
        let mut row_bytes: i32 = 0;
        let rc = unsafe { sys::dcam_lockdata(self.handle, &mut top, &mut row_bytes, index) };
        self.check(CAMERA_COMPONENT, "dcam_lockdata", rc)?;

        let n = width * height;
        let mut out = vec![0u16; n];
        unsafe {
            std::ptr::copy_nonoverlapping(top as *const u16, out.as_mut_ptr(), n);
        }

        let rc = unsafe { sys::dcam_unlockdata(self.handle) };
        self.check(CAMERA_COMPONENT, "dcam_unlockdata", rc)?;
        Ok(out)
    }
}
