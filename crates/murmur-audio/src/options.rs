//! Sink option surface.
//!
//! Backends are configured through a flat list of `key=value` pairs (or
//! bare `key` flags). Every backend reads the keys it understands and
//! ignores the rest, so one option list can be handed to any sink.

use tracing::warn;

/// Parsed sink options.
#[derive(Clone, Debug, Default)]
pub struct SinkOptions {
    entries: Vec<(String, Option<String>)>,
}

impl SinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` / bare-flag strings.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            match arg.split_once('=') {
                Some((key, value)) => options.push(key, Some(value)),
                None => options.push(arg, None),
            }
        }
        options
    }

    pub fn push(&mut self, key: &str, value: Option<&str>) {
        self.entries
            .push((key.to_owned(), value.map(str::to_owned)));
    }

    /// The value of `key`, if present with a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// True if `key` appears at all, with or without a value.
    pub fn flag(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, raw, "ignoring unparseable numeric option");
                None
            }
        }
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, raw, "ignoring unparseable numeric option");
                None
            }
        }
    }
}
