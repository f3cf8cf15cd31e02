use std::sync::Arc;

/// Transport-level failures for a single [`crate::Channel`].
///
/// Every variant names the `component` that owns the channel (`"valve_a1"`,
/// `"fpga"`, ...) so a caller several layers up can report a useful message
/// without threading the name through every call site by hand.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error("[{component}] validation error: {message}")]
    Validation {
        component: &'static str,
        message: String,
    },

    #[error("[{component}] parse error on `{command}`: response {raw:?} did not match the expected pattern")]
    Parse {
        component: &'static str,
        command: String,
        raw: Vec<u8>,
    },

    #[error("[{component}] channel broken: {source}")]
    ChannelBroken {
        component: &'static str,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("[{component}] timed out waiting for response to `{command}`")]
    Timeout {
        component: &'static str,
        command: String,
    },

    #[error("[{component}] operation cancelled")]
    Cancelled { component: &'static str },
}

impl Error {
    pub fn component(&self) -> &'static str {
        match self {
            Error::Validation { component, .. }
            | Error::Parse { component, .. }
            | Error::ChannelBroken { component, .. }
            | Error::Timeout { component, .. }
            | Error::Cancelled { component, .. } => component,
        }
    }
}
