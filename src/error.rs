//! Error types for unfurl.
//!
//! Every fallible operation returns [`Result`], whose error type
//! [`UnfurlError`] covers mesh validation, file I/O, invalid parameters and
//! the pipeline's own failure classes. Geometric failures are deterministic
//! for a given input and configuration, so they are reported once and never
//! retried; only [`UnfurlError::ExternalHostFailure`] is subject to retry.
//!
//! [`MappingIncomplete`] is not a variant: texture coverage problems are
//! surfaced as a warning alongside a successful result.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`UnfurlError`].
pub type Result<T> = std::result::Result<T, UnfurlError>;

/// Pipeline stages, used to attribute a failure to the step that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the input mesh and texture.
    Load,
    /// Symmetry-axis estimation and rigid alignment.
    Align,
    /// Radius profiling and body cropping.
    ExtractBody,
    /// Seam search on the cropped body.
    FindSeam,
    /// Round trip through the external unwrap host.
    Unwrap,
    /// Texture transfer onto the new UV layout.
    Resample,
    /// Writing output artifacts.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Align => "align",
            Stage::ExtractBody => "extract-body",
            Stage::FindSeam => "find-seam",
            Stage::Unwrap => "unwrap",
            Stage::Resample => "resample",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Why a call into the external unwrap host failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostFailure {
    /// The host process could not be started.
    #[error("could not start `{program}`: {message}")]
    Spawn {
        /// The program that was launched.
        program: String,
        /// OS error text.
        message: String,
    },

    /// The host exited unsuccessfully.
    #[error("host exited with {status}{}", log_suffix(.log))]
    Exited {
        /// Exit status as reported by the OS.
        status: String,
        /// Tail of the captured host output.
        log: String,
    },

    /// The host did not finish within the configured timeout.
    #[error("host timed out after {seconds:.1}s")]
    TimedOut {
        /// The timeout that elapsed.
        seconds: f64,
    },

    /// The host reported success but did not produce the expected mesh.
    #[error("host produced no output at {path}")]
    MissingOutput {
        /// The expected output path.
        path: PathBuf,
    },

    /// The host's output mesh exists but could not be read.
    #[error("could not read host output {path}: {message}")]
    UnreadableOutput {
        /// The output path.
        path: PathBuf,
        /// Parser error text.
        message: String,
    },

    /// The returned mesh does not have the topology that was sent.
    #[error(
        "returned mesh topology differs: expected {expected_vertices} vertices / \
         {expected_faces} faces, got {found_vertices} / {found_faces}"
    )]
    TopologyMismatch {
        /// Vertex count sent to the host.
        expected_vertices: usize,
        /// Vertex count received.
        found_vertices: usize,
        /// Face count sent to the host.
        expected_faces: usize,
        /// Face count received.
        found_faces: usize,
    },

    /// A face of the returned mesh references different vertices.
    #[error("returned face {face} has different connectivity")]
    ConnectivityMismatch {
        /// Index of the first differing face.
        face: usize,
    },

    /// The returned mesh carries no UV coordinates.
    #[error("returned mesh has no UV coordinates")]
    MissingUvs,
}

impl HostFailure {
    /// Whether a new attempt could plausibly succeed.
    ///
    /// Crashes and timeouts are worth retrying; a missing executable or a
    /// contract violation will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, HostFailure::Exited { .. } | HostFailure::TimedOut { .. })
    }
}

fn log_suffix(log: &str) -> String {
    if log.is_empty() {
        String::new()
    } else {
        format!("\n--- host log ---\n{}", log)
    }
}

/// Errors that can occur while loading, processing or writing meshes.
#[derive(Error, Debug)]
pub enum UnfurlError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a mesh, seam or image from file.
    #[error("failed to load {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving to file.
    #[error("failed to save {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// No direction explains the face normals as a surface of revolution.
    #[error("no coherent symmetry axis: {reason} (best residual {residual:.4})")]
    AlignmentFailure {
        /// Area-weighted mean |n·a| of the best candidate.
        residual: f64,
        /// Diagnostic text.
        reason: String,
    },

    /// No run of stable-radius bins is long enough to be a body.
    #[error(
        "no stable cylindrical region: longest run is {longest_bins} of {total_bins} bins, \
         at least {min_bins} required"
    )]
    NoStableRegionFound {
        /// Length of the longest stable run.
        longest_bins: usize,
        /// Minimum accepted run length.
        min_bins: usize,
        /// Number of bins in the profile.
        total_bins: usize,
    },

    /// Every seam candidate scored above the rejection ceiling.
    #[error("no acceptable seam: {reason}")]
    SeamNotFound {
        /// Lowest score seen, if any candidate could be traced.
        best_score: Option<f64>,
        /// Diagnostic text.
        reason: String,
    },

    /// The external unwrap host failed.
    #[error("unwrap host failed after {attempts} attempt(s): {failure}")]
    ExternalHostFailure {
        /// Number of attempts made.
        attempts: usize,
        /// The last failure.
        failure: HostFailure,
    },

    /// An operation needs texture coordinates the mesh does not have.
    #[error("{what} has no texture coordinates")]
    MissingTexCoords {
        /// Which mesh lacked them.
        what: &'static str,
    },

    /// Two UV layouts that must describe the same faces do not.
    #[error("UV layouts disagree: {old} faces in the original, {new} in the new layout")]
    FaceCountMismatch {
        /// Face count of the original layout.
        old: usize,
        /// Face count of the new layout.
        new: usize,
    },

    /// A pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        /// The stage that raised the error.
        stage: Stage,
        /// The underlying error.
        #[source]
        source: Box<UnfurlError>,
    },
}

impl UnfurlError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        UnfurlError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Attribute this error to a pipeline stage.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            UnfurlError::StageFailed { .. } => self,
            other => UnfurlError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UnfurlError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, looking through stage attribution.
    pub fn root(&self) -> &UnfurlError {
        match self {
            UnfurlError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Too few output texels were covered by the new UV layout.
///
/// This is a warning: the resampled texture is still produced, but large
/// uncovered areas usually mean the seam or the host's layout is wrong.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error(
    "texture mapping incomplete: {:.1}% of texels uncovered (threshold {:.1}%)",
    .uncovered_fraction * 100.0,
    .threshold * 100.0
)]
pub struct MappingIncomplete {
    /// Fraction of output texels not covered by any face.
    pub uncovered_fraction: f64,
    /// Configured warning threshold.
    pub threshold: f64,
}
