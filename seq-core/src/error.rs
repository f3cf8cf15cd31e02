//! Crate-wide error taxonomy (component J). Every lower-level transport
//! failure from `seq_serial` folds into this enum via `#[from]`, picking up
//! no further context since the serial layer already stamped `component`.

#[derive(Debug, thiserror::Error)]
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

    #[error("[{component}] protocol violation: {message}")]
    ProtocolViolation {
        component: &'static str,
        message: String,
    },

    #[error("[{component}] position verify failed: moved to {target} but readback was {actual}")]
    PositionVerify {
        component: &'static str,
        target: i64,
        actual: i64,
    },

    #[error("[{component}] timed out waiting for response to `{command}`")]
    Timeout {
        component: &'static str,
        command: String,
    },

    #[error("[{component}] driver error: {message}")]
    Driver {
        component: &'static str,
        message: String,
    },

    #[error("[{component}] operation cancelled")]
    Cancelled { component: &'static str },

    #[error("[{component}] invariant broken: {message}")]
    InvariantBroken {
        component: &'static str,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn component(&self) -> Option<&'static str> {
        match self {
            Error::Validation { component, .. }
            | Error::Parse { component, .. }
            | Error::ProtocolViolation { component, .. }
            | Error::PositionVerify { component, .. }
            | Error::Timeout { component, .. }
            | Error::Driver { component, .. }
            | Error::Cancelled { component, .. }
            | Error::InvariantBroken { component, .. } => Some(component),
            Error::Io(_) => None,
        }
    }
}

impl From<seq_serial::Error> for Error {
    fn from(e: seq_serial::Error) -> Self {
        match e {
            seq_serial::Error::Validation { component, message } => {
                Error::Validation { component, message }
            }
            seq_serial::Error::Parse {
                component,
                command,
                raw,
            } => Error::Parse {
                component,
                command,
                raw,
            },
            seq_serial::Error::ChannelBroken { component, source } => Error::Driver {
                component,
                message: source.to_string(),
            },
            seq_serial::Error::Timeout { component, command } => {
                Error::Timeout { component, command }
            }
            seq_serial::Error::Cancelled { component } => Error::Cancelled { component },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config is missing required port mapping `{0}`")]
    MissingPort(&'static str),
}
