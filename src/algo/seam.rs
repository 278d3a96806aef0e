//! Seam search on a cropped body.
//!
//! The body is sliced into height levels. For each of `K` evenly spaced
//! candidate angles `θ`, the vertex whose angle is closest to `θ` is picked
//! in every non-empty level, giving a bottom-to-top polyline. With `t_j` the
//! signed angular offset of the level-`j` vertex from `θ`, measured in units
//! of that level's mean angular vertex spacing `2π / n_j`, the candidate's
//! score is
//!
//! ```text
//! lateral_weight   · mean_j |t_j - mean(t)|
//! + curvature_weight · mean_j |t_{j+1} - 2 t_j + t_{j-1}|
//! ```
//!
//! The first term measures how far the path wanders from a straight vertical
//! line, the second how much it bends. The lowest score wins. Among
//! candidates tied within `tie_tolerance`, the one farthest in angle from
//! every other low-scoring candidate is kept, then the lowest index.
//!
//! Measured in spacings, the score does not depend on mesh resolution. On a
//! level whose vertices are evenly spread around the axis the nearest vertex
//! is never more than half a spacing away, so on an evenly tessellated
//! surface of revolution every candidate scores at most
//! `0.5 · lateral_weight + 2 · curvature_weight`, however its rings are
//! rotated against each other. Scores above that come from uneven angular
//! sampling: holes, clusters, or a torn body.

use std::f64::consts::{PI, TAU};

use log::{debug, info};
use nalgebra::Point3;

use super::partition::map_indices;
use crate::error::{Result, UnfurlError};
use crate::mesh::Mesh;

/// How many height levels to trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelCount {
    /// Exactly this many levels.
    Fixed(usize),
    /// `sqrt(vertices)`, between 8 and 256 levels.
    #[default]
    Adaptive,
}

impl LevelCount {
    /// Resolve to a concrete level count.
    pub fn resolve(self, num_vertices: usize) -> usize {
        match self {
            LevelCount::Fixed(n) => n,
            LevelCount::Adaptive => ((num_vertices as f64).sqrt() as usize).clamp(8, 256),
        }
    }
}

/// Options for the seam search.
#[derive(Debug, Clone)]
pub struct SeamOptions {
    /// Number of candidate angles (default: 72).
    pub candidates: usize,

    /// Number of height levels.
    pub levels: LevelCount,

    /// Weight of the deviation-from-vertical term.
    pub lateral_weight: f64,

    /// Weight of the bending term.
    pub curvature_weight: f64,

    /// Scores closer than this count as tied.
    pub tie_tolerance: f64,

    /// Candidates at or below this score quantile count as low-scoring
    /// alternatives when breaking ties.
    pub low_score_quantile: f64,

    /// Rejection ceiling on the best score, in angular vertex spacings
    /// (default: 2.5, the most an evenly tessellated surface of revolution
    /// can score with unit weights).
    pub max_score: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for SeamOptions {
    fn default() -> Self {
        Self {
            candidates: 72,
            levels: LevelCount::Adaptive,
            lateral_weight: 1.0,
            curvature_weight: 1.0,
            tie_tolerance: 1e-9,
            low_score_quantile: 0.25,
            max_score: 2.5,
            parallel: true,
        }
    }
}

impl SeamOptions {
    /// Set the number of candidate angles.
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates;
        self
    }

    /// Set the number of height levels.
    pub fn with_levels(mut self, levels: LevelCount) -> Self {
        self.levels = levels;
        self
    }

    /// Set the score weights.
    pub fn with_weights(mut self, lateral: f64, curvature: f64) -> Self {
        self.lateral_weight = lateral;
        self.curvature_weight = curvature;
        self
    }

    /// Set the rejection ceiling.
    pub fn with_max_score(mut self, max_score: f64) -> Self {
        self.max_score = max_score;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.candidates == 0 {
            return Err(UnfurlError::invalid_param(
                "candidates",
                self.candidates,
                "must be positive",
            ));
        }
        if let LevelCount::Fixed(n) = self.levels {
            if n < 2 {
                return Err(UnfurlError::invalid_param("levels", n, "must be at least 2"));
            }
        }
        if !(self.lateral_weight >= 0.0 && self.curvature_weight >= 0.0)
            || self.lateral_weight + self.curvature_weight <= 0.0
        {
            return Err(UnfurlError::invalid_param(
                "weights",
                format!("{}/{}", self.lateral_weight, self.curvature_weight),
                "must be non-negative and not both zero",
            ));
        }
        if !(self.low_score_quantile > 0.0 && self.low_score_quantile <= 1.0) {
            return Err(UnfurlError::invalid_param(
                "low_score_quantile",
                self.low_score_quantile,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// A seam polyline on the body surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Seam {
    /// Points from bottom to top, non-decreasing in height.
    pub points: Vec<Point3<f64>>,
    /// Index of the mesh vertex behind each point.
    pub vertices: Vec<usize>,
    /// Angular position in `[0, 2π)`: the candidate angle shifted by the
    /// mean offset of the path.
    pub angle: f64,
    /// Score of the winning candidate, in angular vertex spacings.
    pub score: f64,
    /// Index of the winning candidate.
    pub candidate: usize,
}

impl Seam {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the seam has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Angles closer than this count as one position around the axis.
const ANGLE_EPS: f64 = 1e-9;

/// Vertices of one height level, sorted by angle.
struct Level {
    angles: Vec<f64>,
    vertices: Vec<usize>,
    /// Mean gap between distinct angles.
    spacing: f64,
}

impl Level {
    /// Vertex whose angle is closest to `theta`, and its signed offset.
    fn nearest(&self, theta: f64) -> (usize, f64) {
        let n = self.angles.len();
        let i = self.angles.partition_point(|&a| a < theta);
        // Neighbours on either side, wrapping around
        let candidates = [(i + n - 1) % n, i % n];
        let mut best = (candidates[0], wrap(self.angles[candidates[0]] - theta));
        for &c in &candidates[1..] {
            let off = wrap(self.angles[c] - theta);
            if off.abs() < best.1.abs() || (off.abs() == best.1.abs() && c < best.0) {
                best = (c, off);
            }
        }
        (self.vertices[best.0], best.1)
    }
}

/// Wrap an angle difference into `(-π, π]`.
fn wrap(a: f64) -> f64 {
    let r = a.rem_euclid(TAU);
    if r > PI {
        r - TAU
    } else {
        r
    }
}

/// Reduce an angle into `[0, 2π)`.
fn unit_angle(a: f64) -> f64 {
    let r = a.rem_euclid(TAU);
    // rem_euclid rounds tiny negatives up to exactly 2π
    if r >= TAU {
        0.0
    } else {
        r
    }
}

/// Angle of a point around the Z axis in `[0, 2π)`.
fn polar_angle(p: &Point3<f64>) -> f64 {
    unit_angle(p.y.atan2(p.x))
}

fn build_levels(mesh: &Mesh, count: usize) -> Vec<Level> {
    let Some((min, max)) = mesh.bounding_box() else {
        return Vec::new();
    };
    let span = max.z - min.z;
    if !(span > 0.0) {
        return Vec::new();
    }
    let width = span / count as f64;

    let mut buckets: Vec<Vec<(f64, usize)>> = vec![Vec::new(); count];
    for (v, p) in mesh.positions().iter().enumerate() {
        // Points on the axis have no angle
        if p.x == 0.0 && p.y == 0.0 {
            continue;
        }
        let i = (((p.z - min.z) / width).floor().max(0.0) as usize).min(count - 1);
        buckets[i].push((polar_angle(p), v));
    }

    buckets
        .into_iter()
        .filter(|b| !b.is_empty())
        .map(|mut b| {
            b.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            let angles: Vec<f64> = b.iter().map(|e| e.0).collect();
            Level {
                spacing: TAU / distinct_angles(&angles) as f64,
                vertices: b.iter().map(|e| e.1).collect(),
                angles,
            }
        })
        .collect()
}

/// Number of distinct positions among sorted angles in `[0, 2π)`.
fn distinct_angles(sorted: &[f64]) -> usize {
    let mut count = 1 + sorted
        .windows(2)
        .filter(|w| w[1] - w[0] > ANGLE_EPS)
        .count();
    // The first and last angle may meet across 2π
    if let (Some(first), Some(last)) = (sorted.first(), sorted.last()) {
        if count > 1 && first + TAU - last <= ANGLE_EPS {
            count -= 1;
        }
    }
    count
}

/// One traced candidate.
struct Trace {
    vertices: Vec<usize>,
    offsets: Vec<f64>,
    score: f64,
}

fn trace(levels: &[Level], theta: f64, options: &SeamOptions) -> Trace {
    let (vertices, offsets): (Vec<usize>, Vec<f64>) =
        levels.iter().map(|level| level.nearest(theta)).unzip();
    let spacings: Vec<f64> = offsets
        .iter()
        .zip(levels)
        .map(|(s, level)| s / level.spacing)
        .collect();

    let n = spacings.len() as f64;
    let mean = spacings.iter().sum::<f64>() / n;
    let lateral = spacings.iter().map(|t| (t - mean).abs()).sum::<f64>() / n;
    let curvature = if spacings.len() >= 3 {
        let bends: Vec<f64> = spacings
            .windows(3)
            .map(|w| (w[2] - 2.0 * w[1] + w[0]).abs())
            .collect();
        bends.iter().sum::<f64>() / bends.len() as f64
    } else {
        0.0
    };

    Trace {
        vertices,
        offsets,
        score: options.lateral_weight * lateral + options.curvature_weight * curvature,
    }
}

/// Smallest angular distance between two angles.
fn angular_distance(a: f64, b: f64) -> f64 {
    wrap(a - b).abs()
}

/// Pick the winning candidate index from per-candidate scores.
fn select(scores: &[f64], thetas: &[f64], options: &SeamOptions) -> usize {
    let best = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let tied: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i] <= best + options.tie_tolerance)
        .collect();
    if tied.len() == 1 {
        return tied[0];
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q = ((options.low_score_quantile * sorted.len() as f64).ceil() as usize)
        .clamp(1, sorted.len());
    let cutoff = sorted[q - 1];
    let low: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] <= cutoff).collect();

    let isolation = |i: usize| {
        low.iter()
            .filter(|&&j| j != i)
            .map(|&j| angular_distance(thetas[i], thetas[j]))
            .fold(PI, f64::min)
    };

    let mut winner = tied[0];
    let mut winner_isolation = isolation(winner);
    for &i in &tied[1..] {
        let iso = isolation(i);
        if iso > winner_isolation + 1e-12 {
            winner = i;
            winner_isolation = iso;
        }
    }
    winner
}

/// Find the seam of a cropped, aligned body mesh.
///
/// # Errors
///
/// [`UnfurlError::SeamNotFound`] if fewer than two height levels hold
/// vertices off the axis, or if the best candidate scores above
/// [`SeamOptions::max_score`].
pub fn find_seam(mesh: &Mesh, options: &SeamOptions) -> Result<Seam> {
    options.validate()?;

    let levels = build_levels(mesh, options.levels.resolve(mesh.num_vertices()).max(2));
    if levels.len() < 2 {
        return Err(UnfurlError::SeamNotFound {
            best_score: None,
            reason: format!(
                "body has {} populated height level(s), at least 2 needed",
                levels.len()
            ),
        });
    }

    let k = options.candidates;
    let thetas: Vec<f64> = (0..k).map(|i| TAU * i as f64 / k as f64).collect();
    let traces = map_indices(k, 1, options.parallel, |i| trace(&levels, thetas[i], options));
    let scores: Vec<f64> = traces.iter().map(|t| t.score).collect();

    let winner = select(&scores, &thetas, options);
    let best = &traces[winner];
    debug!(
        "seam: {} candidates over {} levels, best {} with score {:.6}",
        k,
        levels.len(),
        winner,
        best.score
    );

    if !(best.score <= options.max_score) {
        return Err(UnfurlError::SeamNotFound {
            best_score: Some(best.score),
            reason: format!(
                "best candidate scores {:.4} spacings, above ceiling {:.4}",
                best.score, options.max_score
            ),
        });
    }

    let mean_offset = best.offsets.iter().sum::<f64>() / best.offsets.len() as f64;
    let angle = unit_angle(thetas[winner] + mean_offset);
    let points = best
        .vertices
        .iter()
        .map(|&v| mesh.positions()[v])
        .collect();

    info!(
        "seam at {:.2} deg, score {:.5}, {} points",
        angle.to_degrees(),
        best.score,
        best.vertices.len()
    );

    Ok(Seam {
        points,
        vertices: best.vertices.clone(),
        angle,
        score: best.score,
        candidate: winner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::mesh::build_from_triangles;
    use crate::mesh::primitives::cylinder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Grid tube whose vertices are jittered in angle and radius, except for
    /// an optional straight column at `ridge_deg`.
    fn ridged_tube(ridge_deg: Option<f64>, seed: u64) -> Mesh {
        let (segments, rings) = (48, 30);
        let ridge = ridge_deg.map(|d| (d / 360.0 * segments as f64).round() as usize);
        let mut rng = StdRng::seed_from_u64(seed);
        let step = TAU / segments as f64;

        let mut vertices = Vec::new();
        for i in 0..rings {
            let z = i as f64 * 0.2;
            for j in 0..segments {
                let (jitter, radius) = if Some(j) == ridge {
                    (0.0, 1.0)
                } else {
                    (rng.random_range(-0.4..0.4) * step, 1.0 + rng.random_range(-0.02..0.02))
                };
                let theta = j as f64 * step + jitter;
                vertices.push(Point3::new(radius * theta.cos(), radius * theta.sin(), z));
            }
        }
        let mut faces = Vec::new();
        for i in 0..rings - 1 {
            for j in 0..segments {
                let a = i * segments + j;
                let b = i * segments + (j + 1) % segments;
                faces.push([a, b, b + segments]);
                faces.push([a, b + segments, a + segments]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_finds_straight_ridge() {
        let mesh = ridged_tube(Some(75.0), 7);
        let seam = find_seam(&mesh, &SeamOptions::default()).unwrap();
        assert!(angular_distance(seam.angle, 75f64.to_radians()) < 5f64.to_radians());
        assert!(seam.score < 1e-9);
    }

    #[test]
    fn test_seam_is_monotonic_and_on_surface() {
        let mesh = ridged_tube(Some(195.0), 3);
        let seam = find_seam(&mesh, &SeamOptions::default()).unwrap();
        assert_eq!(seam.points.len(), seam.vertices.len());
        for pair in seam.points.windows(2) {
            assert!(pair[0].z <= pair[1].z);
        }
        for (p, &v) in seam.points.iter().zip(&seam.vertices) {
            assert_eq!(*p, mesh.positions()[v]);
        }
    }

    #[test]
    fn test_deterministic_and_parallel_agnostic() {
        let mesh = cylinder(1.0, 10.0, 48, 40, false).unwrap();
        let a = find_seam(&mesh, &SeamOptions::default()).unwrap();
        let b = find_seam(&mesh, &SeamOptions::default()).unwrap();
        let c = find_seam(&mesh, &SeamOptions::default().with_parallel(false)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        // Every candidate is straight on a regular grid; the first wins
        assert_eq!(a.candidate, 0);
    }

    #[test]
    fn test_tie_prefers_isolated_candidate() {
        let thetas: Vec<f64> = (0..8).map(|i| TAU * i as f64 / 8.0).collect();
        // Candidates 1 and 5 tie; 2 is a close alternative next to 1
        let scores = [0.9, 0.1, 0.11, 0.8, 0.7, 0.1, 0.6, 0.5];
        let options = SeamOptions {
            low_score_quantile: 0.4,
            ..Default::default()
        };
        assert_eq!(select(&scores, &thetas, &options), 5);
    }

    #[test]
    fn test_irregular_body_is_rejected() {
        let mesh = ridged_tube(None, 11);
        let options = SeamOptions::default().with_max_score(0.01);
        match find_seam(&mesh, &options) {
            Err(UnfurlError::SeamNotFound { best_score, .. }) => assert!(best_score.is_some()),
            other => panic!("expected SeamNotFound, got {:?}", other),
        }
    }

    /// Radius-1 tube whose odd rings are rotated by half a segment.
    fn staggered_tube(segments: usize, rings: usize) -> Mesh {
        let step = TAU / segments as f64;
        let mut vertices = Vec::new();
        for i in 0..rings {
            let shift = if i % 2 == 1 { 0.5 * step } else { 0.0 };
            for j in 0..segments {
                let theta = j as f64 * step + shift;
                vertices.push(Point3::new(theta.cos(), theta.sin(), i as f64 * 0.25));
            }
        }
        let mut faces = Vec::new();
        for i in 0..rings - 1 {
            for j in 0..segments {
                let a = i * segments + j;
                let b = i * segments + (j + 1) % segments;
                faces.push([a, b, b + segments]);
                faces.push([a, b + segments, a + segments]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_staggered_rings_are_accepted_at_any_resolution() {
        for segments in [12, 24, 32, 48, 96] {
            let mesh = staggered_tube(segments, 41);
            let seam = find_seam(&mesh, &SeamOptions::default())
                .unwrap_or_else(|e| panic!("{} segments: {}", segments, e));
            assert!(seam.score <= 2.5, "{} segments scored {}", segments, seam.score);
        }
    }

    #[test]
    fn test_score_is_independent_of_resolution() {
        let options = SeamOptions::default().with_levels(LevelCount::Fixed(41));
        let coarse = find_seam(&staggered_tube(24, 41), &options).unwrap();
        let fine = find_seam(&staggered_tube(96, 41), &options).unwrap();
        assert_relative_eq!(coarse.score, fine.score, epsilon = 1e-6);
    }

    #[test]
    fn test_distinct_angles() {
        assert_eq!(distinct_angles(&[0.0, 1.0, 2.0]), 3);
        assert_eq!(distinct_angles(&[0.0, 0.0, 1.0, 1.0 + 1e-12]), 2);
        assert_eq!(distinct_angles(&[0.0, 3.0, TAU - 1e-12]), 2);
        assert_eq!(distinct_angles(&[4.0]), 1);
    }

    #[test]
    fn test_flat_mesh_has_no_levels() {
        let vertices = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
        ];
        let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        assert!(matches!(
            find_seam(&mesh, &SeamOptions::default()),
            Err(UnfurlError::SeamNotFound { best_score: None, .. })
        ));
    }

    #[test]
    fn test_wrap() {
        assert!((wrap(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((angular_distance(0.1, TAU - 0.1) - 0.2).abs() < 1e-12);
    }
}
