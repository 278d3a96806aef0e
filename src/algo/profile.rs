//! Radius profiles along the Z axis.
//!
//! The height range of an aligned mesh is cut into equal bins and every
//! vertex contributes its radial distance `sqrt(x² + y²)` to the bin its
//! height falls in. Scans and generated meshes place vertices in rings, so
//! a bin often holds a single ring, whose radii agree by construction. To
//! make a change of radius between rings visible, each bin's statistics are
//! computed over a window made of the bin itself and the nearest non-empty
//! bin on either side. An empty bin uses the window formed by its two
//! nearest non-empty neighbours, so it reads as stable only when the
//! surface on both sides has the same radius.

use log::debug;

use super::partition::{default_chunk, map_indices};
use crate::error::{Result, UnfurlError};
use crate::mesh::Mesh;

/// How many height bins to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinCount {
    /// Exactly this many bins.
    Fixed(usize),
    /// One bin per 40 vertices, between 16 and 300 bins.
    #[default]
    Adaptive,
}

impl BinCount {
    /// Resolve to a concrete bin count for a mesh with `num_vertices` vertices.
    pub fn resolve(self, num_vertices: usize) -> usize {
        match self {
            BinCount::Fixed(n) => n,
            BinCount::Adaptive => (num_vertices / 40).clamp(16, 300),
        }
    }
}

/// Radius statistics for one height bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusBin {
    /// Lower height bound.
    pub z_min: f64,
    /// Upper height bound.
    pub z_max: f64,
    /// Number of vertices whose height falls in this bin.
    pub count: usize,
    /// Number of vertices in the statistics window.
    pub window_count: usize,
    /// Mean radius over the window.
    pub mean: f64,
    /// Standard deviation of the radius over the window.
    pub dispersion: f64,
}

impl RadiusBin {
    /// Dispersion-to-mean ratio; infinite when there is no data or the mean
    /// radius is zero.
    pub fn ratio(&self) -> f64 {
        if self.window_count == 0 || self.mean <= 0.0 {
            f64::INFINITY
        } else {
            self.dispersion / self.mean
        }
    }

    /// Whether the radius is stable under tolerance `tau`.
    #[inline]
    pub fn is_stable(&self, tau: f64) -> bool {
        self.ratio() <= tau
    }

    /// Height of the bin.
    #[inline]
    pub fn height(&self) -> f64 {
        self.z_max - self.z_min
    }
}

/// Per-bin radius statistics of an aligned mesh.
///
/// Bins partition `[z_min, z_max]` contiguously: bin `i` ends exactly where
/// bin `i + 1` starts, the first starts at `z_min` and the last ends at
/// `z_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusProfile {
    bins: Vec<RadiusBin>,
}

impl RadiusProfile {
    /// Compute the profile of an aligned mesh.
    ///
    /// # Errors
    ///
    /// [`UnfurlError::EmptyMesh`] for a mesh without vertices, and
    /// [`UnfurlError::InvalidParameter`] for a zero bin count or a mesh with
    /// no extent along Z.
    pub fn compute(mesh: &Mesh, bins: BinCount, parallel: bool) -> Result<Self> {
        let (lo, hi) = mesh
            .bounding_box()
            .map(|(min, max)| (min.z, max.z))
            .ok_or(UnfurlError::EmptyMesh)?;
        let n = bins.resolve(mesh.num_vertices());
        if n == 0 {
            return Err(UnfurlError::invalid_param("bins", n, "must be positive"));
        }
        let span = hi - lo;
        if !(span > 0.0) {
            return Err(UnfurlError::invalid_param(
                "height",
                span,
                "mesh has no extent along the axis",
            ));
        }

        let width = span / n as f64;
        let bounds = |i: usize| {
            let z0 = lo + width * i as f64;
            let z1 = if i + 1 == n { hi } else { lo + width * (i + 1) as f64 };
            (z0, z1)
        };

        // Bucket radii in vertex order
        let mut radii: Vec<Vec<f64>> = vec![Vec::new(); n];
        for p in mesh.positions() {
            let i = (((p.z - lo) / width).floor().max(0.0) as usize).min(n - 1);
            radii[i].push(p.x.hypot(p.y));
        }

        let below = nearest_filled(&radii, (0..n).collect::<Vec<_>>());
        let above = nearest_filled(&radii, (0..n).rev().collect::<Vec<_>>());

        let bins = map_indices(n, default_chunk(n), parallel, |i| {
            let mut window: Vec<&[f64]> = Vec::with_capacity(3);
            if let Some(b) = below[i] {
                window.push(&radii[b]);
            }
            if !radii[i].is_empty() {
                window.push(&radii[i]);
            }
            if let Some(a) = above[i] {
                window.push(&radii[a]);
            }
            let (mean, dispersion, window_count) = pooled_stats(&window);
            let (z_min, z_max) = bounds(i);
            RadiusBin {
                z_min,
                z_max,
                count: radii[i].len(),
                window_count,
                mean,
                dispersion,
            }
        });

        debug!(
            "radius profile: {} bins over [{:.4}, {:.4}], {} empty",
            n,
            lo,
            hi,
            bins.iter().filter(|b| b.count == 0).count()
        );

        Ok(Self { bins })
    }

    /// The bins, bottom to top.
    pub fn bins(&self) -> &[RadiusBin] {
        &self.bins
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether the profile has no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Height range covered by the profile.
    pub fn z_range(&self) -> (f64, f64) {
        match (self.bins.first(), self.bins.last()) {
            (Some(first), Some(last)) => (first.z_min, last.z_max),
            _ => (0.0, 0.0),
        }
    }
}

/// For each index in visiting order, the nearest strictly earlier non-empty
/// bin along that order.
fn nearest_filled(radii: &[Vec<f64>], order: Vec<usize>) -> Vec<Option<usize>> {
    let mut out = vec![None; radii.len()];
    let mut last = None;
    for i in order {
        out[i] = last;
        if !radii[i].is_empty() {
            last = Some(i);
        }
    }
    out
}

/// Mean, population standard deviation and sample count of several slices.
fn pooled_stats(window: &[&[f64]]) -> (f64, f64, usize) {
    let count: usize = window.iter().map(|s| s.len()).sum();
    if count == 0 {
        return (0.0, 0.0, 0);
    }
    let mean = window.iter().flat_map(|s| s.iter()).sum::<f64>() / count as f64;
    let var = window
        .iter()
        .flat_map(|s| s.iter())
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    (mean, var.sqrt(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::{cylinder, revolve};
    use approx::assert_relative_eq;

    #[test]
    fn test_bins_partition_height() {
        let mesh = cylinder(1.0, 7.0, 16, 13, false).unwrap();
        let profile = RadiusProfile::compute(&mesh, BinCount::Fixed(11), true).unwrap();
        let bins = profile.bins();
        assert_eq!(bins.len(), 11);
        assert_eq!(bins[0].z_min, -3.5);
        assert_eq!(bins[10].z_max, 3.5);
        for pair in bins.windows(2) {
            assert_eq!(pair[0].z_max, pair[1].z_min);
        }
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), mesh.num_vertices());
    }

    #[test]
    fn test_cylinder_is_stable_everywhere() {
        let mesh = cylinder(2.5, 10.0, 32, 40, true).unwrap();
        // Caps add center vertices at radius zero to the end bins
        let profile = RadiusProfile::compute(&mesh, BinCount::Fixed(20), false).unwrap();
        let bins = profile.bins();
        for b in &bins[2..18] {
            assert_relative_eq!(b.mean, 2.5, epsilon = 1e-12);
            assert!(b.ratio() < 1e-12);
        }
        assert!(bins[0].ratio() > 0.05);
    }

    #[test]
    fn test_empty_bins_see_both_neighbours() {
        // Two rings only, far apart and with different radii
        let mesh = revolve(&[(1.0, 0.0), (2.0, 10.0)], 8, false).unwrap();
        let profile = RadiusProfile::compute(&mesh, BinCount::Fixed(10), true).unwrap();
        let middle = profile.bins()[5];
        assert_eq!(middle.count, 0);
        assert_eq!(middle.window_count, 16);
        assert_relative_eq!(middle.mean, 1.5, epsilon = 1e-12);
        assert!(!middle.is_stable(0.05));
    }

    #[test]
    fn test_adaptive_bin_count() {
        assert_eq!(BinCount::Adaptive.resolve(10), 16);
        assert_eq!(BinCount::Adaptive.resolve(4000), 100);
        assert_eq!(BinCount::Adaptive.resolve(1_000_000), 300);
        assert_eq!(BinCount::Fixed(7).resolve(1_000_000), 7);
    }

    #[test]
    fn test_rejects_flat_and_empty_meshes() {
        let flat = revolve(&[(1.0, 0.0), (2.0, 0.0)], 8, false).unwrap();
        assert!(RadiusProfile::compute(&flat, BinCount::Adaptive, true).is_err());
        assert!(matches!(
            RadiusProfile::compute(&Mesh::new(), BinCount::Adaptive, true),
            Err(UnfurlError::EmptyMesh)
        ));
        let mesh = cylinder(1.0, 1.0, 8, 2, false).unwrap();
        assert!(RadiusProfile::compute(&mesh, BinCount::Fixed(0), true).is_err());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mesh = revolve(&[(1.0, 0.0), (1.2, 1.0), (1.1, 2.0), (0.5, 3.0)], 24, true).unwrap();
        let a = RadiusProfile::compute(&mesh, BinCount::Fixed(40), true).unwrap();
        let b = RadiusProfile::compute(&mesh, BinCount::Fixed(40), false).unwrap();
        assert_eq!(a, b);
    }
}
