//! Body extraction.
//!
//! Finds the longest run of height bins whose radius is stable (dispersion
//! over mean at most τ) and crops the aligned mesh to that run. Only radius
//! stability is inspected, so open and capped meshes are treated alike.
//!
//! Raising τ can only turn unstable bins into stable ones, so the selected
//! run never gets shorter when the tolerance grows.
//!
//! # Example
//!
//! ```
//! use unfurl::algo::body::{extract_body, BodyOptions};
//! use unfurl::mesh::primitives::revolve;
//!
//! // Flared base, straight body, narrow neck
//! let mut profile = vec![(2.0, -6.0), (1.6, -5.5)];
//! profile.extend((0..=20).map(|i| (1.0, -5.0 + 0.5 * i as f64)));
//! profile.extend([(0.6, 5.5), (0.4, 6.0)]);
//! let mesh = revolve(&profile, 32, false).unwrap();
//!
//! let body = extract_body(&mesh, &BodyOptions::default()).unwrap();
//! let (lo, hi) = body.height_range();
//! assert!(lo > -5.5 && hi < 5.5);
//! assert!(hi - lo > 8.0);
//! ```

use log::{debug, info};

use super::crop::crop_to_height;
use super::profile::{BinCount, RadiusProfile};
use crate::error::{Result, UnfurlError};
use crate::mesh::Mesh;

/// Options for body extraction.
#[derive(Debug, Clone)]
pub struct BodyOptions {
    /// Stability tolerance τ on dispersion / mean (default: 0.03).
    pub tolerance: f64,

    /// Number of height bins.
    pub bins: BinCount,

    /// Shortest acceptable run, as a fraction of the bin count (default: 0.05).
    pub min_run_fraction: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for BodyOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.03,
            bins: BinCount::Adaptive,
            min_run_fraction: 0.05,
            parallel: true,
        }
    }
}

impl BodyOptions {
    /// Create options with the given stability tolerance.
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    /// Set the stability tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the bin count.
    pub fn with_bins(mut self, bins: BinCount) -> Self {
        self.bins = bins;
        self
    }

    /// Set the minimum run length as a fraction of all bins.
    pub fn with_min_run_fraction(mut self, fraction: f64) -> Self {
        self.min_run_fraction = fraction;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(UnfurlError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be positive",
            ));
        }
        if let BinCount::Fixed(0) = self.bins {
            return Err(UnfurlError::invalid_param("bins", 0, "must be positive"));
        }
        if !(self.min_run_fraction > 0.0 && self.min_run_fraction <= 1.0) {
            return Err(UnfurlError::invalid_param(
                "min_run_fraction",
                self.min_run_fraction,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// A maximal run of stable bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableRegion {
    /// First bin of the run.
    pub start_bin: usize,
    /// Last bin of the run (inclusive).
    pub end_bin: usize,
    /// Lower height bound.
    pub z_min: f64,
    /// Upper height bound.
    pub z_max: f64,
}

impl StableRegion {
    /// Number of bins in the run.
    pub fn num_bins(&self) -> usize {
        self.end_bin - self.start_bin + 1
    }

    /// Height covered by the run.
    pub fn height(&self) -> f64 {
        self.z_max - self.z_min
    }

    /// Mid-height of the run.
    pub fn center(&self) -> f64 {
        0.5 * (self.z_min + self.z_max)
    }
}

/// All maximal runs of bins stable under `tolerance`, bottom to top.
pub fn stable_runs(profile: &RadiusProfile, tolerance: f64) -> Vec<StableRegion> {
    let bins = profile.bins();
    let mut runs = Vec::new();
    let mut start = None;

    for (i, bin) in bins.iter().enumerate() {
        match (bin.is_stable(tolerance), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(region(profile, s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(region(profile, s, bins.len() - 1));
    }
    runs
}

fn region(profile: &RadiusProfile, start: usize, end: usize) -> StableRegion {
    let bins = profile.bins();
    StableRegion {
        start_bin: start,
        end_bin: end,
        z_min: bins[start].z_min,
        z_max: bins[end].z_max,
    }
}

/// Pick the body run: the longest, then the one centered closest to the
/// middle of the profile, then the lowest.
///
/// # Errors
///
/// [`UnfurlError::NoStableRegionFound`] if the longest run is shorter than
/// `min_run_fraction` of the bins.
pub fn select_region(
    profile: &RadiusProfile,
    tolerance: f64,
    min_run_fraction: f64,
) -> Result<StableRegion> {
    let total = profile.len();
    let min_bins = ((min_run_fraction * total as f64).ceil() as usize).max(1);
    let (lo, hi) = profile.z_range();
    let middle = 0.5 * (lo + hi);
    let eps = 1e-9 * (hi - lo).abs().max(f64::MIN_POSITIVE);

    let runs = stable_runs(profile, tolerance);
    let mut best: Option<StableRegion> = None;
    for run in &runs {
        let better = match best {
            None => true,
            Some(b) if run.num_bins() != b.num_bins() => run.num_bins() > b.num_bins(),
            Some(b) => (run.center() - middle).abs() < (b.center() - middle).abs() - eps,
        };
        if better {
            best = Some(*run);
        }
    }

    debug!(
        "{} stable runs at tau {}, longest {} of {} bins",
        runs.len(),
        tolerance,
        best.map_or(0, |r| r.num_bins()),
        total
    );

    match best {
        Some(run) if run.num_bins() >= min_bins => Ok(run),
        other => Err(UnfurlError::NoStableRegionFound {
            longest_bins: other.map_or(0, |r| r.num_bins()),
            min_bins,
            total_bins: total,
        }),
    }
}

/// The cropped body of a mesh.
#[derive(Debug, Clone)]
pub struct Body {
    /// The mesh between the region's height bounds.
    pub mesh: Mesh,
    /// The selected run of stable bins.
    pub region: StableRegion,
    /// The profile the run was selected from.
    pub profile: RadiusProfile,
}

impl Body {
    /// Kept height range `(z_min, z_max)`.
    pub fn height_range(&self) -> (f64, f64) {
        (self.region.z_min, self.region.z_max)
    }
}

/// Crop an aligned mesh to its stable cylindrical body.
///
/// # Errors
///
/// [`UnfurlError::NoStableRegionFound`] if no run of stable bins is long
/// enough, [`UnfurlError::InvalidParameter`] for invalid options.
pub fn extract_body(mesh: &Mesh, options: &BodyOptions) -> Result<Body> {
    options.validate()?;
    if mesh.num_faces() == 0 {
        return Err(UnfurlError::EmptyMesh);
    }

    let profile = RadiusProfile::compute(mesh, options.bins, options.parallel)?;
    let region = select_region(&profile, options.tolerance, options.min_run_fraction)?;
    let body = crop_to_height(mesh, region.z_min, region.z_max)?;
    if body.num_faces() == 0 {
        return Err(UnfurlError::EmptyMesh);
    }

    info!(
        "body: bins {}..={} of {}, z [{:.4}, {:.4}], {} faces kept of {}",
        region.start_bin,
        region.end_bin,
        profile.len(),
        region.z_min,
        region.z_max,
        body.num_faces(),
        mesh.num_faces()
    );

    Ok(Body {
        mesh: body,
        region,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::{cylinder, revolve};
    use approx::assert_relative_eq;

    /// Radius-2 base flaring into a radius-1 body, narrowing to a neck.
    fn flared_bottle() -> Mesh {
        let mut profile = vec![(2.0, -5.0), (1.75, -4.75), (1.5, -4.5), (1.25, -4.25)];
        profile.extend((0..=32).map(|i| (1.0, -4.0 + 0.25 * i as f64)));
        profile.extend([(0.8, 4.25), (0.6, 4.5), (0.5, 4.75), (0.5, 5.0)]);
        revolve(&profile, 32, false).unwrap()
    }

    #[test]
    fn test_cylinder_body_spans_full_height() {
        let mesh = cylinder(1.0, 10.0, 32, 40, false).unwrap();
        let body = extract_body(&mesh, &BodyOptions::default()).unwrap();
        assert_eq!(body.region.num_bins(), body.profile.len());
        assert_relative_eq!(body.region.height(), 10.0, epsilon = 1e-9);
        assert_eq!(body.mesh.num_faces(), mesh.num_faces());
    }

    #[test]
    fn test_flares_are_excluded() {
        let mesh = flared_bottle();
        for tau in [0.02, 0.03, 0.05] {
            let body = extract_body(&mesh, &BodyOptions::new(tau)).unwrap();
            let (lo, hi) = body.height_range();
            assert!(lo >= -4.0 && lo <= -3.5, "tau {}: lo {}", tau, lo);
            assert!(hi <= 4.0 && hi >= 3.5, "tau {}: hi {}", tau, hi);

            assert!(body.mesh.is_valid());
            for p in body.mesh.positions() {
                assert!(p.z >= lo - 1e-12 && p.z <= hi + 1e-12);
                assert!((p.x.hypot(p.y) - 1.0).abs() < 0.05);
            }
        }
    }

    #[test]
    fn test_region_grows_with_tolerance() {
        // Slowly varying radius: more of it qualifies as tau grows
        let profile: Vec<(f64, f64)> = (0..=60)
            .map(|i| {
                let z = i as f64 * 0.2;
                (1.0 + 0.15 * (z * 0.7).sin() + 0.05 * (z * 2.3).cos(), z)
            })
            .collect();
        let mesh = revolve(&profile, 24, false).unwrap();

        let mut previous = 0.0;
        for tau in [0.005, 0.01, 0.02, 0.03, 0.05, 0.08, 0.12, 0.2] {
            let options = BodyOptions::new(tau).with_bins(BinCount::Fixed(60));
            let height = match extract_body(&mesh, &options) {
                Ok(body) => body.region.height(),
                Err(UnfurlError::NoStableRegionFound { .. }) => 0.0,
                Err(e) => panic!("unexpected error: {}", e),
            };
            assert!(height >= previous - 1e-12, "tau {} shrank region", tau);
            previous = height;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn test_ties_prefer_the_middle() {
        // Three straight sections separated by bulges, one ring per bin
        let radius = |z: usize| match z {
            4 | 6 | 12 | 14 => 1.5,
            5 | 13 => 2.0,
            _ => 1.0,
        };
        let profile: Vec<(f64, f64)> = (0..=19).map(|z| (radius(z), z as f64)).collect();
        let mesh = revolve(&profile, 16, false).unwrap();

        let options = BodyOptions::default().with_bins(BinCount::Fixed(19));
        let runs = stable_runs(&RadiusProfile::compute(&mesh, options.bins, true).unwrap(), 0.03);
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.num_bins() == 3));

        let body = extract_body(&mesh, &options).unwrap();
        assert_eq!(body.region.z_min, 8.0);
        assert_eq!(body.region.z_max, 11.0);
    }

    #[test]
    fn test_irregular_mesh_has_no_body() {
        // Radius changes at every ring
        let profile: Vec<(f64, f64)> = (0..30)
            .map(|i| (if i % 2 == 0 { 1.0 } else { 1.6 }, i as f64 * 0.3))
            .collect();
        let mesh = revolve(&profile, 16, false).unwrap();
        let err = extract_body(&mesh, &BodyOptions::default()).unwrap_err();
        assert!(matches!(err, UnfurlError::NoStableRegionFound { longest_bins: 0, .. }));
    }

    #[test]
    fn test_rejects_bad_options() {
        let mesh = cylinder(1.0, 2.0, 8, 4, false).unwrap();
        assert!(extract_body(&mesh, &BodyOptions::new(0.0)).is_err());
        assert!(extract_body(&mesh, &BodyOptions::new(f64::NAN)).is_err());
        let zero_bins = BodyOptions::default().with_bins(BinCount::Fixed(0));
        assert!(extract_body(&mesh, &zero_bins).is_err());
    }
}
