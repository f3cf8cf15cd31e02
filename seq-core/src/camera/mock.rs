//! A deterministic in-memory [`DcamBackend`] fake driving the same
//! orchestration code paths as the real driver, without hardware. Used by
//! the crate's own tests and exported for integration tests elsewhere in
//! the workspace.

use std::collections::VecDeque;

use crate::camera::backend::{CaptureMode, DcamBackend};
use crate::error::Error;

/// `transfer_info` reports the next value in `poll_sequence` on each call,
/// repeating the final value once the sequence is exhausted — this is how
/// a test scripts a camera's `n_frames_taken` stepping 0 -> 1 -> 2 -> ... as
/// a capture loop polls it.
pub struct MockDcam {
    pub properties: std::collections::HashMap<String, f64>,
    pub poll_sequence: VecDeque<i32>,
    last_f_count: i32,
    allocated: Option<i32>,
    capturing: bool,
    /// Value written into every pixel of bundle `i`'s first column, so
    /// tests can recover which bundle a read came from.
    pub bundle_fill: fn(i32) -> u16,
    /// Called at the top of every `transfer_info` poll. Lets a test thread
    /// a shared log through this camera and another channel's fake device
    /// to assert cross-device ordering (e.g. shutter open before the first
    /// poll).
    pub on_poll: Option<std::sync::Arc<dyn Fn() + Send + Sync>>,
}

impl Default for MockDcam {
    fn default() -> Self {
        Self {
            properties: std::collections::HashMap::new(),
            poll_sequence: VecDeque::new(),
            last_f_count: 0,
            allocated: None,
            capturing: false,
            bundle_fill: |i| (i % u16::MAX as i32) as u16,
            on_poll: None,
        }
    }
}

impl MockDcam {
    pub fn with_poll_sequence(sequence: Vec<i32>) -> Self {
        Self {
            poll_sequence: sequence.into(),
            ..Self::default()
        }
    }
}

impl DcamBackend for MockDcam {
    fn open(&mut self, _index: i32) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn get_property(&mut self, name: &str) -> Result<f64, Error> {
        Ok(*self.properties.get(name).unwrap_or(&0.0))
    }

    fn set_property(&mut self, name: &str, value: f64) -> Result<(), Error> {
        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn precapture(&mut self, _mode: CaptureMode) -> Result<(), Error> {
        Ok(())
    }

    fn alloc_frame(&mut self, n_bundles: i32) -> Result<(), Error> {
        self.allocated = Some(n_bundles);
        Ok(())
    }

    fn free_frame(&mut self) -> Result<(), Error> {
        self.allocated = None;
        Ok(())
    }

    fn capture(&mut self) -> Result<(), Error> {
        self.capturing = true;
        Ok(())
    }

    fn idle(&mut self) -> Result<(), Error> {
        self.capturing = false;
        Ok(())
    }

    fn transfer_info(&mut self) -> Result<(i32, i32), Error> {
        if let Some(next) = self.poll_sequence.pop_front() {
            self.last_f_count = next;
        }
        Ok((self.last_f_count.saturating_sub(1).max(0), self.last_f_count))
    }

    fn read_bundle(&mut self, index: i32, width: usize, height: usize) -> Result<Vec<u16>, Error> {
        let fill = (self.bundle_fill)(index);
        Ok(vec![fill; width * height])
    }
}
