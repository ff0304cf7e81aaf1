//! Name/value option lists.
//!
//! Drivers take creation options as `KEY=VALUE` pairs, the way
//! [`RasterCreationOption`](crate::raster::RasterCreationOption) slices are
//! written at call sites. [`NameValueList`] validates and stores them.

use std::fmt::{Debug, Formatter};

use crate::errors::{RasterError, Result};
use crate::raster::RasterCreationOption;

/// An ordered list of `KEY=VALUE` options. Keys are compared case-insensitively.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NameValueList {
    entries: Vec<(String, String)>,
}

impl NameValueList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `name`.
    ///
    /// Overwrites duplicate `name`s.
    ///
    /// Returns `Err` if `name` has non alphanumeric characters, or `value`
    /// has newline characters.
    pub fn set_name_value(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RasterError::BadArgument(format!(
                "Invalid characters in name: '{name}'"
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(RasterError::BadArgument(format!(
                "Invalid characters in value: '{value}'"
            )));
        }
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Looks up the value corresponding to `key`.
    pub fn fetch_name_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up `key` and parses it as a positive integer.
    pub fn fetch_positive(&self, key: &str) -> Result<Option<usize>> {
        match self.fetch_name_value(key) {
            None => Ok(None),
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(RasterError::BadArgument(format!(
                    "{key} must be a positive integer, got '{v}'"
                ))),
            },
        }
    }

    /// Fails on the first key not in `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<()> {
        for (k, _) in &self.entries {
            if !known.iter().any(|n| n.eq_ignore_ascii_case(k)) {
                return Err(RasterError::BadArgument(format!(
                    "unsupported creation option '{k}'"
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Debug for NameValueList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (k, v) in self.iter() {
            f.write_fmt(format_args!("{k}={v}\n"))?;
        }
        Ok(())
    }
}

impl TryFrom<&[RasterCreationOption<'_>]> for NameValueList {
    type Error = RasterError;

    fn try_from(options: &[RasterCreationOption<'_>]) -> Result<Self> {
        let mut list = NameValueList::new();
        for option in options {
            list.set_name_value(option.key, option.value)?;
        }
        Ok(list)
    }
}
