//! The end-to-end bottle pipeline.
//!
//! [`run`] takes a mesh file through every stage:
//!
//! 1. **Load** the mesh and, if available, its texture
//! 2. **Align** the symmetry axis to +Z
//! 3. **Extract** the stable-radius body and crop to it
//! 4. **Find** the seam on the body
//! 5. **Unwrap** through an [`UnwrapHost`]
//! 6. **Resample** the texture onto the new layout
//!
//! and leaves these artifacts in the output directory, named after the
//! input's file stem `<b>`:
//!
//! | Artifact | File |
//! |----------|------|
//! | Aligned, cropped mesh | `<b>_preprocessed.obj` |
//! | Seam coordinates | `<b>_seam.txt` |
//! | UV-mapped mesh | `<b>_seamed.obj` |
//! | UV layout drawing | `<b>_uv.svg` |
//! | Resampled texture | `<b>_texture.png` |
//!
//! Each artifact is written under a hidden partial name and renamed into
//! place. If any stage fails, every artifact of the run is removed again,
//! so a directory never holds an output set that looks complete but is not.
//! The host's console output is kept in `<b>_unwrap.log` either way.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::algo::{
    align, extract_body, find_seam, resample_texture, AlignOptions, Alignment, BodyOptions,
    ResampleOptions, SeamOptions, StableRegion,
};
use crate::error::{MappingIncomplete, Result, Stage, UnfurlError};
use crate::host::{unwrap_with_retry, HostOptions, UnwrapHost, UnwrapRequest};
use crate::io;

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Axis estimation and alignment.
    pub align: AlignOptions,
    /// Body extraction, including the stability tolerance τ.
    pub body: BodyOptions,
    /// Seam search.
    pub seam: SeamOptions,
    /// Texture resampling.
    pub resample: ResampleOptions,
    /// Unwrap host timeout and retries.
    pub host: HostOptions,
    /// Directory receiving the artifacts (default: current directory).
    pub output_dir: PathBuf,
    /// Source texture. When `None`, a `.jpg`, `.png` or `.jpeg` file with
    /// the input's stem is used if one exists.
    pub texture: Option<PathBuf>,
    /// Canvas size of the fallback UV layout drawing.
    pub layout_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            align: AlignOptions::default(),
            body: BodyOptions::default(),
            seam: SeamOptions::default(),
            resample: ResampleOptions::default(),
            host: HostOptions::default(),
            output_dir: PathBuf::from("."),
            texture: None,
            layout_size: io::layout::DEFAULT_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Default configuration writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Set the body stability tolerance τ.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.body.tolerance = tolerance;
        self
    }

    /// Set the source texture.
    pub fn with_texture(mut self, texture: impl Into<PathBuf>) -> Self {
        self.texture = Some(texture.into());
        self
    }

    /// Set the canvas size of the fallback UV layout drawing.
    pub fn with_layout_size(mut self, size: u32) -> Self {
        self.layout_size = size;
        self
    }

    /// Enable or disable parallel execution in every stage.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.align.parallel = parallel;
        self.body.parallel = parallel;
        self.seam.parallel = parallel;
        self.resample.parallel = parallel;
        self
    }
}

/// Output paths of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// Aligned, cropped mesh.
    pub preprocessed: PathBuf,
    /// Seam coordinate list.
    pub seam: PathBuf,
    /// UV-mapped mesh returned by the host.
    pub seamed: PathBuf,
    /// UV layout drawing.
    pub layout: PathBuf,
    /// Resampled texture, when a source texture was available.
    pub texture: Option<PathBuf>,
    /// Captured host console output.
    pub host_log: PathBuf,
}

impl Artifacts {
    /// Artifact paths for `input` in `output_dir`.
    pub fn for_input(input: &Path, output_dir: &Path) -> Result<Self> {
        let base = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                UnfurlError::invalid_param("input", input.display(), "has no usable file stem")
            })?;
        let named = |suffix: &str| output_dir.join(format!("{}_{}", base, suffix));
        Ok(Self {
            preprocessed: named("preprocessed.obj"),
            seam: named("seam.txt"),
            seamed: named("seamed.obj"),
            layout: named("uv.svg"),
            texture: Some(named("texture.png")),
            host_log: named("unwrap.log"),
        })
    }

    fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.preprocessed, &self.seam, &self.seamed, &self.layout]
            .into_iter()
            .chain(self.texture.as_ref())
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Where the outputs were written.
    pub artifacts: Artifacts,
    /// The rigid alignment applied to the input.
    pub alignment: Alignment,
    /// The kept body region.
    pub region: StableRegion,
    /// Seam angular position in radians.
    pub seam_angle: f64,
    /// Seam score.
    pub seam_score: f64,
    /// Unwrap host attempts.
    pub host_attempts: usize,
    /// Fraction of output texels covered by the new layout, when a texture
    /// was resampled.
    pub coverage: Option<f64>,
    /// Coverage warning, if the threshold was exceeded.
    pub warning: Option<MappingIncomplete>,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}

/// Run the full pipeline on one mesh file.
///
/// # Example
///
/// ```no_run
/// use unfurl::host::HostOptions;
/// use unfurl::pipeline::{run, PipelineConfig};
///
/// let config = PipelineConfig::new("out").with_tolerance(0.03);
/// let host = HostOptions::default()
///     .with_program("blender")
///     .with_script("scripts/seam2uv.py")
///     .command_host()
///     .unwrap();
/// let report = run("bottle.obj", &config, &host).unwrap();
/// println!("seam at {:.1}°", report.seam_angle.to_degrees());
/// ```
pub fn run<P: AsRef<Path>>(
    input: P,
    config: &PipelineConfig,
    host: &dyn UnwrapHost,
) -> Result<PipelineReport> {
    let input = input.as_ref();
    let mut artifacts = Artifacts::for_input(input, &config.output_dir).at(Stage::Load)?;
    remove_stale(&artifacts).at(Stage::Write)?;
    let mut out = ArtifactWriter::default();

    // Load
    let mut mesh = io::load(input).at(Stage::Load)?;
    info!(
        "loaded {}: {} vertices, {} faces",
        input.display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );
    let texture_path = match (&config.texture, mesh.uvs()) {
        (Some(_), None) => {
            let err = UnfurlError::MissingTexCoords { what: "input mesh" };
            return Err(err.in_stage(Stage::Load));
        }
        (Some(path), Some(_)) => Some(path.clone()),
        (None, uvs) => match io::texture::find_beside(input) {
            Some(found) if uvs.is_none() => {
                warn!(
                    "ignoring {}: {} has no UV coordinates to resample from",
                    found.display(),
                    input.display()
                );
                None
            }
            found => found,
        },
    };
    let texture = match &texture_path {
        Some(path) => {
            let image = io::texture::load(path).at(Stage::Load)?;
            info!("texture {}: {}x{}", path.display(), image.width(), image.height());
            Some(image)
        }
        None => {
            debug!("no source texture, skipping resample");
            artifacts.texture = None;
            None
        }
    };

    // Align
    let alignment = align(&mut mesh, &config.align).at(Stage::Align)?;

    // Extract body
    let body = extract_body(&mesh, &config.body).at(Stage::ExtractBody)?;

    // Find seam
    let seam = find_seam(&body.mesh, &config.seam).at(Stage::FindSeam)?;

    fs::create_dir_all(&config.output_dir)
        .map_err(UnfurlError::from)
        .at(Stage::Write)?;
    out.write(&artifacts.preprocessed, |p| io::obj::save(&body.mesh, p))
        .at(Stage::Write)?;
    out.write(&artifacts.seam, |p| io::seam::save(&seam, p))
        .at(Stage::Write)?;

    // Unwrap
    let request = UnwrapRequest {
        mesh: &body.mesh,
        seam: &seam,
        mesh_path: artifacts.preprocessed.clone(),
        seam_path: artifacts.seam.clone(),
        output_mesh: out.reserve(&artifacts.seamed),
        output_layout: out.reserve(&artifacts.layout),
        log_path: artifacts.host_log.clone(),
    };
    let (response, host_attempts) =
        unwrap_with_retry(host, &request, config.host.retries).at(Stage::Unwrap)?;
    let new_uvs = response
        .mesh
        .uvs()
        .ok_or(UnfurlError::MissingTexCoords { what: "unwrapped mesh" })
        .at(Stage::Unwrap)?;
    info!("unwrapped after {} attempt(s): {} UV coordinates", host_attempts, new_uvs.len());

    out.write(&artifacts.seamed, |p| io::obj::save(&response.mesh, p))
        .at(Stage::Write)?;
    match &response.layout {
        Some(drawn) => out.adopt(drawn, &artifacts.layout).at(Stage::Write)?,
        None => out
            .write(&artifacts.layout, |p| io::layout::save(new_uvs, p, config.layout_size))
            .at(Stage::Write)?,
    }

    // Resample
    let mut coverage = None;
    let mut warning = None;
    if let (Some(image), Some(dest)) = (&texture, &artifacts.texture) {
        let old_uvs = body
            .mesh
            .uvs()
            .ok_or(UnfurlError::MissingTexCoords { what: "cropped mesh" })
            .at(Stage::Resample)?;
        let resampled =
            resample_texture(image, old_uvs, new_uvs, &config.resample).at(Stage::Resample)?;
        out.write(dest, |p| io::texture::save(&resampled.image, p))
            .at(Stage::Write)?;
        coverage = Some(resampled.coverage);
        warning = resampled.warning;
    }

    out.keep();
    info!("wrote artifacts to {}", config.output_dir.display());
    Ok(PipelineReport {
        artifacts,
        region: body.region,
        alignment,
        seam_angle: seam.angle,
        seam_score: seam.score,
        host_attempts,
        coverage,
        warning,
    })
}

/// The hidden name an artifact is written under before it is complete.
///
/// The extension is kept so format detection still works.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".partial-{}", name))
}

/// Commits artifacts atomically and removes them all unless kept.
#[derive(Debug, Default)]
struct ArtifactWriter {
    pending: Vec<PathBuf>,
    committed: Vec<PathBuf>,
    keep: bool,
}

/// Remove outputs a previous run left for the same input.
fn remove_stale(artifacts: &Artifacts) -> Result<()> {
    for path in artifacts.outputs() {
        match fs::remove_file(path) {
            Ok(()) => debug!("removed stale {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl ArtifactWriter {

    /// Partial path for `dest`, tracked for cleanup.
    fn reserve(&mut self, dest: &Path) -> PathBuf {
        let partial = partial_path(dest);
        if !self.pending.contains(&partial) {
            self.pending.push(partial.clone());
        }
        partial
    }

    /// Save through a partial file, then rename into place.
    fn write<F>(&mut self, dest: &Path, save: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let partial = self.reserve(dest);
        save(&partial)?;
        self.commit(&partial, dest)
    }

    /// Move a file produced elsewhere into place.
    fn adopt(&mut self, src: &Path, dest: &Path) -> Result<()> {
        let partial = self.reserve(dest);
        if src != partial {
            fs::copy(src, &partial)?;
        }
        self.commit(&partial, dest)
    }

    fn commit(&mut self, partial: &Path, dest: &Path) -> Result<()> {
        fs::rename(partial, dest)?;
        self.pending.retain(|p| p != partial);
        self.committed.push(dest.to_path_buf());
        debug!("wrote {}", dest.display());
        Ok(())
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in self.pending.iter().chain(&self.committed) {
            if path.exists() {
                debug!("removing {}", path.display());
                let _ = fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_artifact_names() {
        let a = Artifacts::for_input(Path::new("scans/wine.obj"), Path::new("out")).unwrap();
        assert_eq!(a.preprocessed, Path::new("out/wine_preprocessed.obj"));
        assert_eq!(a.seam, Path::new("out/wine_seam.txt"));
        assert_eq!(a.seamed, Path::new("out/wine_seamed.obj"));
        assert_eq!(a.layout, Path::new("out/wine_uv.svg"));
        assert_eq!(a.texture.as_deref(), Some(Path::new("out/wine_texture.png")));
        assert!(Artifacts::for_input(Path::new("/"), Path::new("out")).is_err());
    }

    #[test]
    fn test_partial_path_is_hidden_and_keeps_extension() {
        let p = partial_path(Path::new("out/wine_texture.png"));
        assert_eq!(p, Path::new("out/.partial-wine_texture.png"));
        assert_eq!(io::Format::from_path(partial_path(Path::new("a.obj"))), Some(io::Format::Obj));
    }

    #[test]
    fn test_writer_rolls_back_unless_kept() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        {
            let mut out = ArtifactWriter::default();
            out.write(&a, |p| Ok(fs::write(p, "a")?)).unwrap();
            let reserved = out.reserve(&b);
            fs::write(&reserved, "half").unwrap();
            assert!(a.is_file());
        }
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());

        let mut out = ArtifactWriter::default();
        out.write(&a, |p| Ok(fs::write(p, "a")?)).unwrap();
        out.keep();
        assert_eq!(fs::read_to_string(&a).unwrap(), "a");
    }

    #[test]
    fn test_failed_save_leaves_nothing() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let mut out = ArtifactWriter::default();
        let err = out
            .write(&a, |p| {
                fs::write(p, "partial")?;
                Err(UnfurlError::EmptyMesh)
            })
            .unwrap_err();
        assert!(matches!(err, UnfurlError::EmptyMesh));
        drop(out);
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
