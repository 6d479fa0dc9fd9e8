//! Classification of raw noise fields into obstacle and elevation maps.
//!
//! A field is first rescaled by its global minimum and maximum, then turned
//! into either a strict {0,1} obstacle map or a continuous [0,1] topographic
//! map. An optional coarse disparity filter biases the density spatially, so
//! obstacles form clusters instead of a statistically uniform scatter.

use rayon::prelude::*;
use thiserror::Error;

use crate::field::{NoiseField, NoiseSource, PerlinChannel};
use crate::grid::Grid;

/// Octave count of the disparity filter field. Low on purpose: the filter
/// has to vary on a much larger scale than the obstacle pattern it masks.
const FILTER_OCTAVES: u32 = 2;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("flat noise field: global min equals max, normalization undefined")]
    DegenerateField,

    #[error("custom density offset must lie strictly inside (0,1), got {0}")]
    InvalidDensity(f64),
}

/// Obstacle density, resolved once at the boundary to a threshold offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DensityMode {
    Sparse,
    Medium,
    Dense,
    Custom(f64),
}

impl DensityMode {
    pub fn offset(self) -> Result<f64, ClassifyError> {
        match self {
            DensityMode::Sparse => Ok(0.2),
            DensityMode::Medium => Ok(0.3),
            DensityMode::Dense => Ok(0.4),
            DensityMode::Custom(x) if x > 0.0 && x < 1.0 => Ok(x),
            DensityMode::Custom(x) => Err(ClassifyError::InvalidDensity(x)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ClassificationOptions {
    pub density: DensityMode,
    /// Continuous ground elevation instead of a flat binary map.
    pub topography: bool,
    /// Disparity filter seed; `Some` enables density clustering. The seed is
    /// an explicit per-request parameter, never ambient state.
    pub disparity: Option<i64>,
}

/// A classified map: {0,1} cells in binary mode, [0,1] cells in topographic
/// mode, plus the label of the disparity field if one was used.
pub struct ClassifiedMap {
    values: Grid<f64>,
    topography: bool,
    filter_label: Option<String>,
}

impl ClassifiedMap {
    pub fn values(&self) -> &Grid<f64> {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.size()
    }

    pub fn is_topographic(&self) -> bool {
        self.topography
    }

    /// `"f{seed}"` label of the disparity field, if disparity was enabled.
    pub fn filter_label(&self) -> Option<&str> {
        self.filter_label.as_deref()
    }

    /// Naming suffix appended to the seed label: optional filter label plus
    /// `T`/`F` for topography on/off.
    pub fn label_suffix(&self) -> String {
        let topo = if self.topography { "T" } else { "F" };
        match &self.filter_label {
            Some(filter) => format!("{filter}{topo}"),
            None => topo.to_string(),
        }
    }
}

/// Classify a raw field using seeded Perlin channels for the disparity
/// filter.
pub fn classify(field: &NoiseField, options: &ClassificationOptions) -> Result<ClassifiedMap, ClassifyError> {
    classify_with(field, options, |seed, octaves| PerlinChannel::new(seed, octaves))
}

/// Generic form of [`classify`] taking a channel factory for the disparity
/// filter field, mirroring `field::generate_with`.
pub fn classify_with<S, F>(
    field: &NoiseField,
    options: &ClassificationOptions,
    channel: F,
) -> Result<ClassifiedMap, ClassifyError>
where
    S: NoiseSource,
    F: Fn(i64, u32) -> S,
{
    let offset = options.density.offset()?;
    let norm = normalize(field.values())?;

    let (mask, filter_label) = match options.disparity {
        Some(seed) => {
            let filter = filter_field(field.size(), &channel(seed, FILTER_OCTAVES));
            let mask = exponentiate(&normalize(&filter)?);
            (Some(mask), Some(format!("f{seed}")))
        }
        None => (None, None),
    };

    let values = if options.topography {
        formalize(&norm, offset, mask.as_ref())
    } else {
        binarize(&norm, offset, mask.as_ref())
    };

    Ok(ClassifiedMap {
        values,
        topography: options.topography,
        filter_label,
    })
}

/// Rescale every cell by the global min/max of the whole field, so the
/// output spans exactly [0,1].
pub fn normalize(raw: &Grid<f64>) -> Result<Grid<f64>, ClassifyError> {
    let (min, max) = raw.min_max();
    if max == min {
        return Err(ClassifyError::DegenerateField);
    }
    let span = max - min;

    let mut out = Grid::new_with(raw.size(), 0.0);
    for (i, j, &v) in raw.iter() {
        out.set(i, j, (v - min) / span);
    }
    Ok(out)
}

/// Sharpen a normalized mask towards its 0/1 plateaus with a logistic-like
/// transform, keeping the transition bands smooth.
fn exponentiate(mask: &Grid<f64>) -> Grid<f64> {
    let mut out = Grid::new_with(mask.size(), 0.0);
    for (i, j, &v) in mask.iter() {
        out.set(i, j, (1.0 + (10.0 * v - 5.0).tanh()) / 2.0);
    }
    out
}

/// Threshold a normalized field into a strict {0,1} obstacle map.
fn binarize(norm: &Grid<f64>, offset: f64, mask: Option<&Grid<f64>>) -> Grid<f64> {
    let mut out = Grid::new_with(norm.size(), 0.0);
    for (i, j, &v) in norm.iter() {
        let level = match mask {
            Some(m) => ((v + offset) * *m.get(i, j)).floor(),
            None => (v + offset).floor(),
        };
        out.set(i, j, level);
    }
    out
}

/// Continuous elevation: obstacle cells sit at full height, floor cells keep
/// scaled relief. The resize factor pins the floor relief to one third of
/// total map height regardless of the density setting.
fn formalize(norm: &Grid<f64>, offset: f64, mask: Option<&Grid<f64>>) -> Grid<f64> {
    let resize = 1.0 / (3.0 * (1.0 - offset));

    let mut out = Grid::new_with(norm.size(), 0.0);
    for (i, j, &v) in norm.iter() {
        let level = match mask {
            Some(m) => ((v + offset) * *m.get(i, j)).floor(),
            None => (v + offset).floor(),
        };
        let elevation = (level + resize * (1.0 - level) * v).min(1.0);
        out.set(i, j, elevation);
    }
    out
}

/// Sample a single coarse channel over the unit domain.
fn filter_field<S: NoiseSource>(size: usize, channel: &S) -> Grid<f64> {
    let inv = 1.0 / size as f64;
    let rows: Vec<Vec<f64>> = (0..size)
        .into_par_iter()
        .map(|i| {
            let x = i as f64 * inv;
            (0..size).map(|j| channel.sample(x, j as f64 * inv)).collect()
        })
        .collect();
    Grid::from_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{generate, generate_with};
    use crate::params::GenerationParams;

    fn params(size: usize) -> GenerationParams {
        GenerationParams {
            size,
            seed1: 11,
            seed2: 21,
            oct1: 1,
            oct2: 1,
        }
    }

    /// `noise(seed, oct)(x, y) = x + y`, the stub primitive of the canonical
    /// fixture.
    struct PlaneStub;

    impl NoiseSource for PlaneStub {
        fn sample(&self, x: f64, y: f64) -> f64 {
            x + y
        }
    }

    /// Stub varying along the row axis only, for exercising the disparity
    /// path deterministically.
    struct RampStub;

    impl NoiseSource for RampStub {
        fn sample(&self, x: f64, _y: f64) -> f64 {
            x
        }
    }

    #[test]
    fn test_canonical_binary_fixture() {
        // size=4, seeds 11/21, octaves 1/1, medium density, no topography,
        // no disparity, stub noise x+y. The raw field is 2*(i+j)/4, which
        // normalizes linearly to (i+j)/6 and binarizes with offset 0.3.
        let field = generate_with(&params(4), |_, _| PlaneStub).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Medium,
            topography: false,
            disparity: None,
        };
        let map = classify_with(&field, &options, |_, _| PlaneStub).expect("classify failed");

        let expected = [
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
        ];
        for (i, j, &v) in map.values().iter() {
            assert_eq!(v, expected[i][j], "cell ({i},{j})");
        }
        assert_eq!(map.filter_label(), None);
        assert_eq!(map.label_suffix(), "F");
    }

    #[test]
    fn test_normalize_spans_unit_interval() {
        let field = generate(&params(32)).expect("generate failed");
        let norm = normalize(field.values()).expect("normalize failed");
        let (min, max) = norm.min_max();
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_normalize_rejects_flat_field() {
        let flat = Grid::new_with(8, 0.42);
        assert!(matches!(normalize(&flat), Err(ClassifyError::DegenerateField)));
    }

    #[test]
    fn test_binary_map_is_strictly_binary() {
        let field = generate(&params(48)).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Dense,
            topography: false,
            disparity: None,
        };
        let map = classify(&field, &options).expect("classify failed");
        for (_, _, &v) in map.values().iter() {
            assert!(v == 0.0 || v == 1.0, "non-binary cell value {v}");
        }
        // Normalization pins one cell to 0 and one to 1, so both classes
        // are always present.
        let (min, max) = map.values().min_max();
        assert_eq!((min, max), (0.0, 1.0));
    }

    #[test]
    fn test_topographic_map_stays_in_unit_interval() {
        let field = generate(&params(48)).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Medium,
            topography: true,
            disparity: None,
        };
        let map = classify(&field, &options).expect("classify failed");
        let mut continuous = 0usize;
        for (_, _, &v) in map.values().iter() {
            assert!((0.0..=1.0).contains(&v), "out-of-range cell value {v}");
            if v > 0.0 && v < 1.0 {
                continuous += 1;
            }
        }
        // Floor relief is continuous, not a second binary level.
        assert!(continuous > 0);
    }

    #[test]
    fn test_floor_relief_spans_one_third() {
        let field = generate(&params(48)).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Medium,
            topography: true,
            disparity: None,
        };
        let map = classify(&field, &options).expect("classify failed");
        for (_, _, &v) in map.values().iter() {
            // Floor cells stay below one third of total height; everything
            // above is an obstacle at exactly full height.
            assert!(v <= 1.0 / 3.0 + 1e-12 || v == 1.0, "unexpected cell value {v}");
        }
    }

    #[test]
    fn test_density_offsets() {
        assert_eq!(DensityMode::Sparse.offset().unwrap(), 0.2);
        assert_eq!(DensityMode::Medium.offset().unwrap(), 0.3);
        assert_eq!(DensityMode::Dense.offset().unwrap(), 0.4);
        assert_eq!(DensityMode::Custom(0.55).offset().unwrap(), 0.55);
    }

    #[test]
    fn test_custom_density_bounds() {
        for bad in [0.0, 1.0, -0.3, 1.7] {
            assert!(matches!(
                DensityMode::Custom(bad).offset(),
                Err(ClassifyError::InvalidDensity(_))
            ));
        }
    }

    #[test]
    fn test_sparser_density_means_fewer_obstacles() {
        let field = generate(&params(64)).expect("generate failed");
        let count = |density| {
            let options = ClassificationOptions {
                density,
                topography: false,
                disparity: None,
            };
            let map = classify(&field, &options).expect("classify failed");
            map.values().values().iter().filter(|&&v| v == 1.0).count()
        };
        assert!(count(DensityMode::Sparse) <= count(DensityMode::Medium));
        assert!(count(DensityMode::Medium) <= count(DensityMode::Dense));
    }

    #[test]
    fn test_disparity_masks_low_filter_regions() {
        let field = generate_with(&params(8), |_, _| PlaneStub).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Dense,
            topography: false,
            disparity: Some(2345),
        };
        let map = classify_with(&field, &options, |_, _| RampStub).expect("classify failed");

        assert_eq!(map.filter_label(), Some("f2345"));
        assert_eq!(map.label_suffix(), "f2345F");
        for (i, j, &v) in map.values().iter() {
            assert!(v == 0.0 || v == 1.0);
            // The ramp filter is ~0 in the first rows after sharpening, so
            // cells there are masked to floor regardless of the field.
            if i == 0 {
                assert_eq!(v, 0.0, "masked cell ({i},{j}) not floored");
            }
        }
    }

    #[test]
    fn test_disparity_filter_is_seed_reproducible() {
        let field = generate(&params(24)).expect("generate failed");
        let options = ClassificationOptions {
            density: DensityMode::Medium,
            topography: false,
            disparity: Some(2500),
        };
        let a = classify(&field, &options).expect("classify failed");
        let b = classify(&field, &options).expect("classify failed");
        assert_eq!(a.values(), b.values());
    }
}
