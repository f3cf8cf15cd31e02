//! Command descriptors: pure data bundling how to format a request and how
//! to parse its response. See `Valve::move` / `TiltStage::move` for how a
//! parameterized descriptor gets bound to a concrete command before it is
//! handed to a [`crate::Channel`].

use crate::error::Error;

/// A request that has already been formatted and is ready to be written to
/// the wire. This is the common currency `Channel::send` accepts; both
/// [`Descriptor`] and a bound [`ParamDescriptor`] produce one.
pub struct Prepared<Out> {
    pub(crate) text: String,
    pub(crate) n_lines: usize,
    pub(crate) parser: fn(&str) -> Option<Out>,
    pub(crate) verify: bool,
}

impl<Out> Prepared<Out> {
    /// Build a request directly from already-formatted text. Most callers
    /// go through [`Descriptor`], [`ParamDescriptor`], or [`StrDescriptor`]
    /// instead; this is for commands whose formatting takes more than the
    /// one bounds-checked parameter those cover (e.g. `T{index}MOVETO
    /// {value}`, where both the motor index and the target are dynamic).
    pub fn new(text: String, n_lines: usize, parser: fn(&str) -> Option<Out>, verify: bool) -> Self {
        Self {
            text,
            n_lines,
            parser,
            verify,
        }
    }
}

/// A fixed (no-argument) command, e.g. `CP` or `STAT?`.
pub struct Descriptor<Out> {
    command: &'static str,
    n_lines: usize,
    parser: fn(&str) -> Option<Out>,
    verify: bool,
}

impl<Out> Descriptor<Out> {
    pub const fn new(command: &'static str, parser: fn(&str) -> Option<Out>) -> Self {
        Self {
            command,
            n_lines: 1,
            parser,
            verify: false,
        }
    }

    /// Response spans `n` separator-terminated lines instead of the default one.
    pub const fn with_lines(mut self, n: usize) -> Self {
        self.n_lines = n;
        self
    }

    /// Mark this descriptor as retry-on-parse-failure (one retransmission).
    pub const fn verified(mut self) -> Self {
        self.verify = true;
        self
    }

    pub fn prepare(&self) -> Prepared<Out> {
        Prepared {
            text: self.command.to_string(),
            n_lines: self.n_lines,
            parser: self.parser,
            verify: self.verify,
        }
    }
}

/// A command parameterized by a single bounds-checked integer, e.g. `GO{p}`
/// or `T{i}MOVETO {x}`.
pub struct ParamDescriptor<Out> {
    format: fn(i64) -> String,
    range: (i64, i64),
    n_lines: usize,
    parser: fn(&str) -> Option<Out>,
    verify: bool,
}

impl<Out> ParamDescriptor<Out> {
    pub const fn new(format: fn(i64) -> String, range: (i64, i64), parser: fn(&str) -> Option<Out>) -> Self {
        Self {
            format,
            range,
            n_lines: 1,
            parser,
            verify: false,
        }
    }

    pub const fn with_lines(mut self, n: usize) -> Self {
        self.n_lines = n;
        self
    }

    pub const fn verified(mut self) -> Self {
        self.verify = true;
        self
    }

    /// Validate `value` against the declared range and format the command.
    /// Fails with a [`Error::Validation`] before any I/O if out of range.
    pub fn bind(&self, component: &'static str, value: i64) -> Result<Prepared<Out>, Error> {
        if value < self.range.0 || value > self.range.1 {
            return Err(Error::Validation {
                component,
                message: format!(
                    "parameter {} out of range [{}, {}]",
                    value, self.range.0, self.range.1
                ),
            });
        }
        Ok(Prepared {
            text: (self.format)(value),
            n_lines: self.n_lines,
            parser: self.parser,
            verify: self.verify,
        })
    }
}

/// A command parameterized by a value drawn from a fixed set of allowed
/// strings, e.g. a mode switch (`MODE IMAGING`) or filter selection.
pub struct StrDescriptor<Out> {
    format: fn(&str) -> String,
    allowed: &'static [&'static str],
    n_lines: usize,
    parser: fn(&str) -> Option<Out>,
    verify: bool,
}

impl<Out> StrDescriptor<Out> {
    pub const fn new(
        format: fn(&str) -> String,
        allowed: &'static [&'static str],
        parser: fn(&str) -> Option<Out>,
    ) -> Self {
        Self {
            format,
            allowed,
            n_lines: 1,
            parser,
            verify: false,
        }
    }

    pub const fn with_lines(mut self, n: usize) -> Self {
        self.n_lines = n;
        self
    }

    pub const fn verified(mut self) -> Self {
        self.verify = true;
        self
    }

    /// Validate `value` against the allowed set and format the command.
    pub fn bind(&self, component: &'static str, value: &str) -> Result<Prepared<Out>, Error> {
        if !self.allowed.contains(&value) {
            return Err(Error::Validation {
                component,
                message: format!("`{value}` is not one of {:?}", self.allowed),
            });
        }
        Ok(Prepared {
            text: (self.format)(value),
            n_lines: self.n_lines,
            parser: self.parser,
            verify: self.verify,
        })
    }
}

/// Match `s` (trimmed) against the anchored regex `pattern` and return the
/// first capture group, or the whole match if the pattern has no group.
///
/// Parsers in this crate are plain `fn` items (not closures) so they can be
/// stored as function pointers in a [`Descriptor`]; each one calls this
/// helper with its own pattern rather than building a reusable combinator.
pub fn capture1(pattern: &str, s: &str) -> Option<String> {
    let re = regex::Regex::new(pattern).expect("pattern is a valid regex");
    let caps = re.captures(s.trim())?;
    Some(
        caps.get(1)
            .map(|m| m.as_str())
            .unwrap_or_else(|| s.trim())
            .to_string(),
    )
}
