//! Generation parameters and the plain-text parameter file reader.
//!
//! Parameter files are one `key: value` pair per line, all integer-valued.
//! Required keys: `seed1`, `seed2`, `oct1`, `oct2`, `size`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("parameter `{key}` must be an integer, got `{value}`")]
    InvalidValue { key: String, value: String },

    #[error("failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for one generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationParams {
    /// Side length of the square map in cells.
    pub size: usize,
    /// Seed of the first noise channel.
    pub seed1: i64,
    /// Seed of the second, transposed noise channel.
    pub seed2: i64,
    /// Octave count of the first channel.
    pub oct1: u32,
    /// Octave count of the second channel.
    pub oct2: u32,
}

const REQUIRED_KEYS: [&str; 5] = ["seed1", "seed2", "oct1", "oct2", "size"];

impl GenerationParams {
    /// Parse parameter file text. Lines without a `:` are ignored.
    pub fn from_text(content: &str) -> Result<Self, ParameterError> {
        let mut values: HashMap<&str, i64> = HashMap::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            let parsed: i64 = value.parse().map_err(|_| ParameterError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })?;
            values.insert(key, parsed);
        }

        for key in REQUIRED_KEYS {
            if !values.contains_key(key) {
                return Err(ParameterError::MissingParameter(key));
            }
        }

        Ok(Self {
            size: parse_component(&values, "size")?,
            seed1: values["seed1"],
            seed2: values["seed2"],
            oct1: parse_component(&values, "oct1")?,
            oct2: parse_component(&values, "oct2")?,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ParameterError> {
        Self::from_text(&fs::read_to_string(path)?)
    }
}

/// Counted parameters cannot be negative or exceed their component type; an
/// unrepresentable value in the file is a malformed value, not a
/// generation-stage failure.
fn parse_component<T: TryFrom<i64>>(
    values: &HashMap<&str, i64>,
    key: &'static str,
) -> Result<T, ParameterError> {
    let raw = values[key];
    T::try_from(raw).map_err(|_| ParameterError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
