//! Unique labels for optimizer runs.

use crate::domain::error::{BackflowError, Result};
use crate::domain::timeframe::Timeframe;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: BTreeMap<String, Timeframe>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label`; an existing label is never overwritten.
    pub fn register(&mut self, label: &str, timeframe: Timeframe) -> Result<()> {
        if self.runs.contains_key(label) {
            return Err(BackflowError::DuplicateRun(label.to_string()));
        }
        self.runs.insert(label.to_string(), timeframe);
        Ok(())
    }

    pub fn timeframe(&self, label: &str) -> Option<Timeframe> {
        self.runs.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.runs.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
