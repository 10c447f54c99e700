//! IdDictionary - raw id remapping table
//!
//! Loaded from `{"nBits": N, "dict": [2^N ids]}`. An unusable dictionary
//! fails closed: lookups pass ids through unchanged.

use serde::Deserialize;
use std::path::Path;
use tracing::{error, info};

use crate::error::{PostprocessError, Result};

/// Largest supported table (2^24 entries)
const MAX_BITS: u32 = 24;

#[derive(Deserialize)]
struct DictionaryFile {
    #[serde(rename = "nBits")]
    n_bits: u32,
    dict: Vec<i64>,
}

/// Raw id -> mapped id table
#[derive(Debug, Clone, Default)]
pub struct IdDictionary {
    n_bits: u32,
    table: Vec<i64>,
    valid: bool,
}

impl IdDictionary {
    /// Dictionary that passes every id through
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Load from a file, logging and falling back to pass-through on error
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(dict) => {
                info!(path = %path.display(), entries = dict.len(), "id dictionary loaded");
                dict
            }
            Err(e) => {
                error!(error = %e, "id dictionary disabled, ids pass through");
                Self::passthrough()
            }
        }
    }

    /// Load from a file
    ///
    /// # Errors
    /// Unreadable file, malformed JSON, or a table whose length is not
    /// `2^nBits`.
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PostprocessError::dictionary(path.display().to_string(), e.to_string()))?;
        Self::from_json(&content)
            .map_err(|message| PostprocessError::dictionary(path.display().to_string(), message))
    }

    /// Parse dictionary JSON
    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        let file: DictionaryFile =
            serde_json::from_str(content).map_err(|e| format!("malformed JSON: {e}"))?;
        if file.n_bits > MAX_BITS {
            return Err(format!("nBits {} exceeds {MAX_BITS}", file.n_bits));
        }
        let expected = 1usize << file.n_bits;
        if file.dict.len() != expected {
            return Err(format!(
                "dict has {} entries, expected 2^{} = {expected}",
                file.dict.len(),
                file.n_bits
            ));
        }
        Ok(Self {
            n_bits: file.n_bits,
            table: file.dict,
            valid: true,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn n_bits(&self) -> u32 {
        self.n_bits
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Map a raw id.
    ///
    /// Invalid dictionary: `raw` unchanged. Valid dictionary: the table
    /// entry, or `-1` (unidentifiable) when `raw` is outside the table.
    pub fn lookup(&self, raw: i64) -> i64 {
        if !self.valid {
            return raw;
        }
        usize::try_from(raw)
            .ok()
            .and_then(|idx| self.table.get(idx).copied())
            .unwrap_or(-1)
    }
}
