//! Raw noise-field synthesis.
//!
//! A field is the sum of two independently seeded coherent-noise channels,
//! the second sampled transposed. A single Perlin channel shows a faint
//! diagonal self-similarity at large scale; adding a differently seeded,
//! transposed twin cancels it, so large maps carry no visible repetition.

use noise::{NoiseFn, Perlin};
use rayon::prelude::*;
use thiserror::Error;

use crate::grid::Grid;
use crate::params::GenerationParams;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("map size must be at least 2, got {0}")]
    InvalidSize(usize),

    #[error("octave count must be positive")]
    InvalidOctave,
}

/// Sampler over the normalized `[0,1] x [0,1]` domain.
///
/// The seam between the pipeline and the noise primitive: production code
/// uses [`PerlinChannel`], tests substitute deterministic stubs.
pub trait NoiseSource: Sync {
    fn sample(&self, x: f64, y: f64) -> f64;
}

/// Seeded Perlin sampler. The octave count sets the spatial frequency:
/// `octaves` noise cells span the unit domain, so higher counts give
/// smaller patterns.
pub struct PerlinChannel {
    perlin: Perlin,
    frequency: f64,
}

impl PerlinChannel {
    pub fn new(seed: i64, octaves: u32) -> Self {
        Self {
            perlin: Perlin::new(seed as u32),
            frequency: octaves as f64,
        }
    }
}

impl NoiseSource for PerlinChannel {
    fn sample(&self, x: f64, y: f64) -> f64 {
        self.perlin.get([x * self.frequency, y * self.frequency])
    }
}

/// An immutable raw noise field plus the seed label identifying it.
pub struct NoiseField {
    values: Grid<f64>,
    label: String,
}

impl NoiseField {
    pub fn values(&self) -> &Grid<f64> {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.size()
    }

    /// Combined seed label with the `"{seed1}t{seed2}"` format, used for
    /// artifact naming.
    pub fn label(&self) -> &str {
        &self.label
    }
}

pub fn seed_label(seed1: i64, seed2: i64) -> String {
    format!("{seed1}t{seed2}")
}

/// Generate a raw field from the given parameters using seeded Perlin
/// channels. Deterministic: identical parameters yield identical fields.
pub fn generate(params: &GenerationParams) -> Result<NoiseField, GenerationError> {
    generate_with(params, |seed, octaves| PerlinChannel::new(seed, octaves))
}

/// Generic form of [`generate`] taking a channel factory, so tests can swap
/// the noise primitive for a deterministic stub.
pub fn generate_with<S, F>(params: &GenerationParams, channel: F) -> Result<NoiseField, GenerationError>
where
    S: NoiseSource,
    F: Fn(i64, u32) -> S,
{
    if params.size <= 1 {
        return Err(GenerationError::InvalidSize(params.size));
    }
    if params.oct1 == 0 || params.oct2 == 0 {
        return Err(GenerationError::InvalidOctave);
    }

    let size = params.size;
    let inv = 1.0 / size as f64;
    let a = channel(params.seed1, params.oct1);
    let b = channel(params.seed2, params.oct2);

    let rows: Vec<Vec<f64>> = (0..size)
        .into_par_iter()
        .map(|i| {
            let x = i as f64 * inv;
            (0..size)
                .map(|j| {
                    let y = j as f64 * inv;
                    // Channel B is indexed transposed.
                    a.sample(x, y) + b.sample(y, x)
                })
                .collect()
        })
        .collect();

    Ok(NoiseField {
        values: Grid::from_rows(rows),
        label: seed_label(params.seed1, params.seed2),
    })
}
