//! Per-dataset diagnostics.
//!
//! Codecs report anomalies they recover from (for example badly encoded
//! samples) through the [`Diagnostics`] of the dataset they serve, so two
//! datasets never share "already warned" state.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Diagnostics {
    warned: HashSet<&'static str>,
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs and records `msg` the first time `key` is seen by this dataset.
    /// Returns `true` if the warning was emitted.
    pub fn warn_once(&mut self, key: &'static str, msg: &str) -> bool {
        if !self.warned.insert(key) {
            return false;
        }
        log::warn!("{msg}");
        self.warnings.push(msg.to_string());
        true
    }

    /// Warnings emitted so far, oldest first.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_warned(&self, key: &str) -> bool {
        self.warned.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::Diagnostics;

    #[test]
    fn warns_once_per_key() {
        let mut diag = Diagnostics::new();
        assert!(diag.warn_once("a", "first"));
        assert!(!diag.warn_once("a", "again"));
        assert!(diag.warn_once("b", "other"));
        assert_eq!(diag.warnings(), ["first".to_string(), "other".to_string()]);
        assert!(diag.has_warned("a"));
        assert!(!diag.has_warned("c"));
    }

    #[test]
    fn independent_instances() {
        let mut one = Diagnostics::new();
        let two = Diagnostics::new();
        one.warn_once("a", "first");
        assert!(!two.has_warned("a"));
    }
}
