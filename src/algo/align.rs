//! Symmetry-axis estimation and rigid alignment.
//!
//! A face on an ideal surface of revolution has a normal orthogonal to the
//! axis. The axis is therefore the unit direction `a` minimizing the
//! area-weighted residual
//!
//! ```text
//! R(a) = Σ area_f · |n_f · a| / Σ area_f
//! ```
//!
//! Cap and base facets have normals parallel to the axis and are penalized
//! by this measure, so the side wall dominates the fit whatever the mesh's
//! height-to-width ratio. `R` is dimensionless, so the estimate does not
//! depend on mesh scale.
//!
//! The search evaluates the principal axes of the vertex cloud and a
//! Fibonacci sampling of the hemisphere, then refines the best candidate by
//! pattern search on the sphere. The 180° ambiguity is resolved from the
//! shape of the two ends (see [`Orientation`]).
//!
//! # Example
//!
//! ```
//! use unfurl::algo::align::{align, AlignOptions};
//! use unfurl::mesh::primitives::cylinder;
//!
//! let mut mesh = cylinder(1.0, 10.0, 48, 20, false).unwrap();
//! let alignment = align(&mut mesh, &AlignOptions::default()).unwrap();
//! assert!(alignment.residual < 1e-6);
//! assert!((alignment.height_range.1 - alignment.height_range.0 - 10.0).abs() < 1e-6);
//! ```

use std::f64::consts::PI;

use log::{debug, info};
use nalgebra::{
    Isometry3, Matrix3, Point3, SymmetricEigen, Translation3, Unit, UnitQuaternion, Vector3,
};

use super::partition::map_ranges;
use crate::error::{Result, UnfurlError};
use crate::mesh::Mesh;

/// Faces per work range when summing residuals.
const FACE_CHUNK: usize = 4096;

/// Options for axis estimation.
#[derive(Debug, Clone)]
pub struct AlignOptions {
    /// Number of directions sampled on the hemisphere.
    pub search_samples: usize,

    /// Maximum pattern-search iterations when refining the best sample.
    pub refine_iterations: usize,

    /// Residual ceiling above which the mesh is rejected as not
    /// rotationally symmetric.
    pub max_residual: f64,

    /// Fraction of the height examined at each end to decide which way is up.
    pub end_fraction: f64,

    /// Relative difference below which two end measurements count as equal.
    pub orientation_tolerance: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            search_samples: 1024,
            refine_iterations: 400,
            max_residual: 0.4,
            end_fraction: 0.15,
            orientation_tolerance: 1e-3,
            parallel: true,
        }
    }
}

impl AlignOptions {
    /// Set the number of hemisphere samples.
    pub fn with_search_samples(mut self, samples: usize) -> Self {
        self.search_samples = samples;
        self
    }

    /// Set the residual ceiling.
    pub fn with_max_residual(mut self, max_residual: f64) -> Self {
        self.max_residual = max_residual;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.search_samples == 0 {
            return Err(UnfurlError::invalid_param(
                "search_samples",
                self.search_samples,
                "must be positive",
            ));
        }
        if !(self.max_residual > 0.0) {
            return Err(UnfurlError::invalid_param(
                "max_residual",
                self.max_residual,
                "must be positive",
            ));
        }
        if !(self.end_fraction > 0.0 && self.end_fraction <= 0.5) {
            return Err(UnfurlError::invalid_param(
                "end_fraction",
                self.end_fraction,
                "must be in (0, 0.5]",
            ));
        }
        Ok(())
    }
}

/// A candidate symmetry axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisEstimate {
    /// Unit direction, pointing from the base towards the top.
    pub direction: Unit<Vector3<f64>>,
    /// A point on the axis, in the mesh's original coordinates.
    pub point: Point3<f64>,
}

/// How the up direction was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The end with the larger radius variation (neck, mouth) points up.
    RadiusVariation,
    /// Ends looked alike; the wider end points down.
    Extent,
    /// Both ends are indistinguishable; the search direction was kept.
    Default,
}

/// Outcome of the axis search.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisFit {
    /// A coherent axis was found.
    Fit {
        /// The oriented axis.
        axis: AxisEstimate,
        /// Area-weighted mean |n·a| at the axis.
        residual: f64,
        /// Rule that fixed the sign of the axis.
        orientation: Orientation,
    },
    /// No direction is a convincing symmetry axis.
    Rejected {
        /// Best residual found (1 if nothing could be evaluated).
        residual: f64,
        /// Diagnostic text.
        reason: String,
    },
}

/// A rigid transform taking a mesh into the canonical frame.
///
/// In the canonical frame the symmetry axis is the Z axis through the
/// origin, pointing up, and the surface centroid sits at height zero.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Transform from original to canonical coordinates.
    pub transform: Isometry3<f64>,
    /// The estimated axis, in original coordinates.
    pub axis: AxisEstimate,
    /// Residual of the fit.
    pub residual: f64,
    /// Rule that fixed the sign of the axis.
    pub orientation: Orientation,
    /// Height range `(z_min, z_max)` of the aligned mesh.
    pub height_range: (f64, f64),
}

/// Estimate the symmetry axis of a mesh.
///
/// Returns [`AxisFit::Rejected`] rather than an error so callers can inspect
/// the residual of degenerate inputs; [`align`] turns rejection into
/// [`UnfurlError::AlignmentFailure`].
pub fn estimate_axis(mesh: &Mesh, options: &AlignOptions) -> AxisFit {
    let samples = face_samples(mesh);
    if samples.is_empty() {
        return AxisFit::Rejected {
            residual: 1.0,
            reason: "mesh has no faces with positive area".to_string(),
        };
    }
    let total_area: f64 = samples.iter().map(|s| s.1).sum();
    let residual = |a: &Vector3<f64>| axis_residual(&samples, total_area, a, options.parallel);

    let mut candidates = principal_axes(mesh);
    let search_samples = options.search_samples.max(1);
    candidates.extend(hemisphere(search_samples));

    let mut best = candidates[0];
    let mut best_score = f64::INFINITY;
    for c in &candidates {
        let score = residual(c);
        if score < best_score {
            best = *c;
            best_score = score;
        }
    }
    debug!(
        "axis search: {} candidates, best residual {:.6} at ({:.4}, {:.4}, {:.4})",
        candidates.len(),
        best_score,
        best.x,
        best.y,
        best.z
    );

    let spacing = (2.0 * PI / search_samples as f64).sqrt();
    let (direction, score) = refine(best, best_score, spacing, options.refine_iterations, residual);

    if score > options.max_residual {
        return AxisFit::Rejected {
            residual: score,
            reason: format!(
                "residual exceeds ceiling {:.4}; surface does not look rotationally symmetric",
                options.max_residual
            ),
        };
    }

    let (direction, orientation) = orient(mesh, direction, options);
    let frame = canonical_frame(mesh, &direction);
    let point = frame.inverse_transform_point(&Point3::origin());

    AxisFit::Fit {
        axis: AxisEstimate {
            direction: Unit::new_normalize(direction),
            point,
        },
        residual: score,
        orientation,
    }
}

/// Align a mesh in place so its symmetry axis becomes the +Z axis.
///
/// # Errors
///
/// Returns [`UnfurlError::AlignmentFailure`] if no axis achieves a residual
/// below [`AlignOptions::max_residual`].
pub fn align(mesh: &mut Mesh, options: &AlignOptions) -> Result<Alignment> {
    options.validate()?;

    let (axis, residual, orientation) = match estimate_axis(mesh, options) {
        AxisFit::Fit {
            axis,
            residual,
            orientation,
        } => (axis, residual, orientation),
        AxisFit::Rejected { residual, reason } => {
            return Err(UnfurlError::AlignmentFailure { residual, reason });
        }
    };

    let transform = canonical_frame(mesh, &axis.direction);
    mesh.transform(&transform);

    let height_range = mesh
        .bounding_box()
        .map(|(min, max)| (min.z, max.z))
        .unwrap_or((0.0, 0.0));

    info!(
        "aligned: residual {:.5}, orientation {:?}, height {:.4}",
        residual,
        orientation,
        height_range.1 - height_range.0
    );

    Ok(Alignment {
        transform,
        axis,
        residual,
        orientation,
        height_range,
    })
}

/// Unit normal and area of every non-degenerate face.
fn face_samples(mesh: &Mesh) -> Vec<(Vector3<f64>, f64)> {
    mesh.face_ids()
        .filter_map(|f| {
            let cross = mesh.face_cross(f);
            let len = cross.norm();
            (len > 0.0 && len.is_finite()).then(|| (cross / len, 0.5 * len))
        })
        .collect()
}

/// Area-weighted mean of |n·a|.
///
/// Partial sums are taken over fixed face ranges and added in order, so the
/// value is the same with and without parallelism.
fn axis_residual(
    samples: &[(Vector3<f64>, f64)],
    total_area: f64,
    axis: &Vector3<f64>,
    parallel: bool,
) -> f64 {
    let partials = map_ranges(samples.len(), FACE_CHUNK, parallel, |r| {
        samples[r]
            .iter()
            .map(|(n, area)| area * n.dot(axis).abs())
            .sum::<f64>()
    });
    partials.iter().sum::<f64>() / total_area
}

/// Eigenvectors of the vertex covariance matrix.
fn principal_axes(mesh: &Mesh) -> Vec<Vector3<f64>> {
    let n = mesh.num_vertices();
    if n < 2 {
        return vec![Vector3::z()];
    }
    let sum: Vector3<f64> = mesh.positions().iter().map(|p| p.coords).sum();
    let mean = sum / n as f64;
    let mut cov = Matrix3::zeros();
    for p in mesh.positions() {
        let d = p.coords - mean;
        cov += d * d.transpose();
    }
    let eigen = SymmetricEigen::new(cov / n as f64);
    (0..3)
        .filter_map(|i| eigen.eigenvectors.column(i).into_owned().try_normalize(1e-12))
        .map(canonical_sign)
        .collect()
}

/// Fibonacci lattice on the upper hemisphere.
///
/// |n·a| is symmetric under a ↦ -a, so half the sphere suffices.
fn hemisphere(samples: usize) -> Vec<Vector3<f64>> {
    let golden = PI * (3.0 - 5.0_f64.sqrt());
    (0..samples)
        .map(|i| {
            let z = 1.0 - (i as f64 + 0.5) / samples as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden * i as f64;
            Vector3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}

/// Pick the representative of {a, -a} with non-negative z.
fn canonical_sign(a: Vector3<f64>) -> Vector3<f64> {
    let flip = a.z < 0.0 || (a.z == 0.0 && (a.x < 0.0 || (a.x == 0.0 && a.y < 0.0)));
    if flip {
        -a
    } else {
        a
    }
}

/// Pattern search on the sphere, halving the step when no neighbour improves.
fn refine<F>(
    start: Vector3<f64>,
    start_score: f64,
    initial_step: f64,
    max_iterations: usize,
    residual: F,
) -> (Vector3<f64>, f64)
where
    F: Fn(&Vector3<f64>) -> f64,
{
    const MOVES: [(f64, f64); 8] = [
        (1.0, 0.0),
        (-1.0, 0.0),
        (0.0, 1.0),
        (0.0, -1.0),
        (1.0, 1.0),
        (1.0, -1.0),
        (-1.0, 1.0),
        (-1.0, -1.0),
    ];

    let mut dir = start;
    let mut score = start_score;
    let mut step = initial_step;

    for _ in 0..max_iterations {
        if step < 1e-9 {
            break;
        }
        let helper = if dir.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let t1 = dir.cross(&helper).normalize();
        let t2 = dir.cross(&t1);

        let mut best_move = None;
        for (du, dv) in MOVES {
            let cand = (dir + (t1 * du + t2 * dv) * step).normalize();
            let s = residual(&cand);
            if s < best_move.map_or(score, |(_, bs)| bs) {
                best_move = Some((cand, s));
            }
        }

        match best_move {
            Some((cand, s)) => {
                dir = cand;
                score = s;
            }
            None => step *= 0.5,
        }
    }

    (canonical_sign(dir), score)
}

/// Decide which way along `axis` is up.
fn orient(mesh: &Mesh, axis: Vector3<f64>, options: &AlignOptions) -> (Vector3<f64>, Orientation) {
    let frame = canonical_frame(mesh, &axis);
    let points: Vec<Point3<f64>> = mesh.positions().iter().map(|p| frame * p).collect();
    let (z_min, z_max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));
    let slab = (z_max - z_min) * options.end_fraction;

    let bottom = EndStats::collect(points.iter().filter(|p| p.z <= z_min + slab));
    let top = EndStats::collect(points.iter().filter(|p| p.z >= z_max - slab));
    let tol = options.orientation_tolerance;

    let differs = |a: f64, b: f64| (a - b).abs() > tol * a.max(b);

    if top.variation.max(bottom.variation) > tol && differs(top.variation, bottom.variation) {
        debug!(
            "orientation by radius variation: top {:.5}, bottom {:.5}",
            top.variation, bottom.variation
        );
        let dir = if top.variation >= bottom.variation { axis } else { -axis };
        return (dir, Orientation::RadiusVariation);
    }
    if differs(top.max_radius, bottom.max_radius) {
        debug!(
            "orientation by extent: top {:.5}, bottom {:.5}",
            top.max_radius, bottom.max_radius
        );
        let dir = if bottom.max_radius >= top.max_radius { axis } else { -axis };
        return (dir, Orientation::Extent);
    }
    (axis, Orientation::Default)
}

/// Radius statistics of one end slab.
struct EndStats {
    /// Coefficient of variation of the radial distance.
    variation: f64,
    /// Largest radial distance.
    max_radius: f64,
}

impl EndStats {
    fn collect<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> Self {
        let radii: Vec<f64> = points.map(|p| p.x.hypot(p.y)).collect();
        if radii.is_empty() {
            return Self {
                variation: 0.0,
                max_radius: 0.0,
            };
        }
        let n = radii.len() as f64;
        let mean = radii.iter().sum::<f64>() / n;
        let var = radii.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Self {
            variation: if mean > 0.0 { var.sqrt() / mean } else { 0.0 },
            max_radius: radii.iter().cloned().fold(0.0, f64::max),
        }
    }
}

/// Rotation taking `axis` to +Z, followed by centering.
///
/// The surface centroid goes to height zero and the bounding-box center of
/// the rotated cross-section goes to the Z axis.
fn canonical_frame(mesh: &Mesh, axis: &Vector3<f64>) -> Isometry3<f64> {
    let rotation = UnitQuaternion::rotation_between(axis, &Vector3::z())
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI));
    let centroid = mesh.surface_centroid().unwrap_or_else(Point3::origin);

    let (mut min_x, mut max_x, mut min_y, mut max_y) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for p in mesh.positions() {
        let q = rotation * (p - centroid);
        min_x = min_x.min(q.x);
        max_x = max_x.max(q.x);
        min_y = min_y.min(q.y);
        max_y = max_y.max(q.y);
    }
    let center = if min_x.is_finite() {
        Vector3::new(0.5 * (min_x + max_x), 0.5 * (min_y + max_y), 0.0)
    } else {
        Vector3::zeros()
    };

    let translation = -(rotation * centroid.coords) - center;
    Isometry3::from_parts(Translation3::from(translation), rotation)
}
