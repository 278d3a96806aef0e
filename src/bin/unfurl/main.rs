//! Unfurl CLI - bottle mesh to label texture.
//!
//! Usage: unfurl <COMMAND> [OPTIONS] <INPUT>
//!
//! Run `unfurl --help` for available commands.
//!
//! # Logging
//!
//! Progress is logged to stderr. `-v` shows each stage, `-vv` adds
//! intermediate statistics, `-q` silences everything but errors.
//! Without either flag, `RUST_LOG` is honoured.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use image::Rgba;
use log::LevelFilter;

use unfurl::algo::{
    align, estimate_axis, extract_body, find_seam, resample_texture, select_region, AlignOptions,
    AxisFit, BinCount, BodyOptions, LevelCount, RadiusProfile, ResampleOptions, SeamOptions,
};
use unfurl::error::{Result as UnfurlResult, UnfurlError};
use unfurl::host::HostOptions;
use unfurl::io;
use unfurl::mesh::Mesh;
use unfurl::pipeline::{self, PipelineConfig};

#[derive(Parser)]
#[command(name = "unfurl")]
#[command(
    author,
    version,
    about = "Unroll bottle meshes into flat label textures",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v stages, -vv details, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write all artifacts
    Run {
        /// Input mesh file (OBJ, PLY or STL)
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Source texture (default: <input>.jpg/.png/.jpeg if present)
        #[arg(short, long)]
        texture: Option<PathBuf>,

        #[command(flatten)]
        align: AlignArgs,

        #[command(flatten)]
        body: BodyArgs,

        #[command(flatten)]
        seam: SeamArgs,

        #[command(flatten)]
        resample: ResampleArgs,

        /// Canvas size of the UV layout drawing, in pixels
        #[arg(long, default_value_t = io::layout::DEFAULT_SIZE)]
        layout_size: u32,

        #[command(flatten)]
        host: HostArgs,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Align a mesh and print its radius profile and stable body
    Profile {
        /// Input mesh file
        input: PathBuf,

        #[command(flatten)]
        align: AlignArgs,

        #[command(flatten)]
        body: BodyArgs,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Align, crop and find the seam, without unwrapping
    Seam {
        /// Input mesh file
        input: PathBuf,

        /// Write the seam coordinate list here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the aligned, cropped mesh here
        #[arg(long)]
        mesh: Option<PathBuf>,

        #[command(flatten)]
        align: AlignArgs,

        #[command(flatten)]
        body: BodyArgs,

        #[command(flatten)]
        seam: SeamArgs,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Move a texture from one UV layout of a mesh to another
    Resample {
        /// Mesh carrying the texture's UV layout
        old: PathBuf,

        /// Same mesh with the new UV layout
        new: PathBuf,

        /// Source texture
        texture: PathBuf,

        /// Output image
        output: PathBuf,

        #[command(flatten)]
        resample: ResampleArgs,

        /// Output width in pixels (overrides scale)
        #[arg(long)]
        width: Option<u32>,

        /// Output height in pixels (overrides scale)
        #[arg(long)]
        height: Option<u32>,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,

        #[command(flatten)]
        align: AlignArgs,
    },
}

#[derive(Args)]
struct AlignArgs {
    /// Residual above which the mesh is rejected as not rotationally symmetric
    #[arg(long, default_value = "0.4")]
    max_residual: f64,

    /// Number of axis directions sampled on the hemisphere
    #[arg(long, default_value = "1024")]
    search_samples: usize,
}

impl AlignArgs {
    fn options(&self, sequential: bool) -> AlignOptions {
        AlignOptions::default()
            .with_max_residual(self.max_residual)
            .with_search_samples(self.search_samples)
            .with_parallel(!sequential)
    }
}

#[derive(Args)]
struct BodyArgs {
    /// Radius stability tolerance τ (recommended 0.02 to 0.05)
    #[arg(long, default_value = "0.03")]
    tolerance: f64,

    /// Fixed number of height bins (default: adaptive)
    #[arg(long)]
    bins: Option<usize>,

    /// Shortest accepted body, as a fraction of all bins
    #[arg(long, default_value = "0.05")]
    min_run: f64,
}

impl BodyArgs {
    fn options(&self, sequential: bool) -> BodyOptions {
        BodyOptions::new(self.tolerance)
            .with_bins(self.bin_count())
            .with_min_run_fraction(self.min_run)
            .with_parallel(!sequential)
    }

    fn bin_count(&self) -> BinCount {
        self.bins.map(BinCount::Fixed).unwrap_or_default()
    }
}

#[derive(Args)]
struct SeamArgs {
    /// Number of seam candidates
    #[arg(long, default_value = "72")]
    candidates: usize,

    /// Fixed number of height levels traced (default: adaptive)
    #[arg(long)]
    levels: Option<usize>,

    /// Weight of the seam's sideways wander
    #[arg(long, default_value = "1.0")]
    lateral_weight: f64,

    /// Weight of the seam's bending
    #[arg(long, default_value = "1.0")]
    curvature_weight: f64,

    /// Best seam score above which the body counts as irregular, in vertex spacings
    #[arg(long, default_value = "2.5")]
    max_score: f64,
}

impl SeamArgs {
    fn options(&self, sequential: bool) -> SeamOptions {
        let levels = self.levels.map(LevelCount::Fixed).unwrap_or(LevelCount::Adaptive);
        SeamOptions::default()
            .with_candidates(self.candidates)
            .with_levels(levels)
            .with_weights(self.lateral_weight, self.curvature_weight)
            .with_max_score(self.max_score)
            .with_parallel(!sequential)
    }
}

#[derive(Args)]
struct ResampleArgs {
    /// Output texture scale relative to the source
    #[arg(long, default_value = "1.0")]
    scale: f64,

    /// Fraction of uncovered texels that triggers a warning
    #[arg(long, default_value = "0.05")]
    max_uncovered: f64,

    /// Colour of uncovered texels, as RRGGBB or RRGGBBAA hex
    #[arg(long, default_value = "00000000", value_parser = parse_rgba)]
    background: Rgba<u8>,
}

impl ResampleArgs {
    fn options(&self, sequential: bool) -> ResampleOptions {
        ResampleOptions::default()
            .with_scale(self.scale)
            .with_max_uncovered_fraction(self.max_uncovered)
            .with_background(self.background)
            .with_parallel(!sequential)
    }
}

/// Parse `RRGGBB` or `RRGGBBAA`, with an optional leading `#`.
fn parse_rgba(s: &str) -> Result<Rgba<u8>, String> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected RRGGBB or RRGGBBAA hex, got '{}'", s));
    }
    let channel =
        |i: usize| u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|e| e.to_string());
    let alpha = if hex.len() == 8 { channel(3)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(1)?, channel(2)?, alpha]))
}

#[derive(Args)]
struct HostArgs {
    /// Unwrap host executable
    #[arg(long, env = "UNFURL_HOST")]
    host: PathBuf,

    /// Script run by the host as `-b -P <script> --`
    #[arg(long, env = "UNFURL_HOST_SCRIPT")]
    host_script: Option<PathBuf>,

    /// Host timeout in seconds
    #[arg(long, default_value = "600")]
    timeout: f64,

    /// Retries after a host crash or timeout
    #[arg(long, default_value = "2")]
    retries: usize,
}

impl HostArgs {
    fn options(&self) -> UnfurlResult<HostOptions> {
        let mut options = HostOptions::default()
            .with_program(&self.host)
            .with_timeout(host_timeout(self.timeout)?)
            .with_retries(self.retries);
        if let Some(script) = &self.host_script {
            options = options.with_script(script);
        }
        Ok(options)
    }
}

/// Convert a timeout in seconds, rejecting values a `Duration` cannot hold.
fn host_timeout(secs: f64) -> UnfurlResult<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(UnfurlError::invalid_param(
            "timeout",
            secs,
            "must be a positive, representable number of seconds",
        )),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the logger based on verbosity level.
fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = env_logger::Builder::new();
    builder.format_timestamp(None);

    if quiet {
        builder.filter_level(LevelFilter::Error);
    } else if verbose > 0 {
        let level = match verbose {
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        builder.filter_level(LevelFilter::Warn).filter_module("unfurl", level);
    } else {
        builder.filter_level(LevelFilter::Warn).parse_default_env();
    }
    builder.init();
}

/// Pipeline configuration from the `run` command's arguments.
#[allow(clippy::too_many_arguments)]
fn run_config(
    output_dir: PathBuf,
    texture: Option<PathBuf>,
    align: &AlignArgs,
    body: &BodyArgs,
    seam: &SeamArgs,
    resample: &ResampleArgs,
    layout_size: u32,
    sequential: bool,
) -> PipelineConfig {
    let mut config = PipelineConfig::new(output_dir).with_layout_size(layout_size);
    config.align = align.options(sequential);
    config.body = body.options(sequential);
    config.seam = seam.options(sequential);
    config.resample = resample.options(sequential);
    config.texture = texture;
    config
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            input,
            output_dir,
            texture,
            align,
            body,
            seam,
            resample,
            layout_size,
            host,
            sequential,
        } => {
            let mut config = run_config(
                output_dir,
                texture,
                &align,
                &body,
                &seam,
                &resample,
                layout_size,
                sequential,
            );
            config.host = host.options()?;
            cmd_run(&input, &config)?;
        }

        Commands::Profile {
            input,
            align,
            body,
            sequential,
        } => {
            cmd_profile(&input, &align.options(sequential), &body, sequential)?;
        }

        Commands::Seam {
            input,
            output,
            mesh,
            align,
            body,
            seam,
            sequential,
        } => {
            cmd_seam(
                &input,
                output.as_deref(),
                mesh.as_deref(),
                &align.options(sequential),
                &body.options(sequential),
                &seam.options(sequential),
            )?;
        }

        Commands::Resample {
            old,
            new,
            texture,
            output,
            resample,
            width,
            height,
            sequential,
        } => {
            let mut options = resample.options(sequential);
            options.width = width;
            options.height = height;
            cmd_resample(&old, &new, &texture, &output, &options)?;
        }

        Commands::Info { input, align } => {
            cmd_info(&input, &align.options(false))?;
        }
    }

    Ok(())
}

fn cmd_run(input: &Path, config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.host.command_host()?;

    let start = Instant::now();
    let report = pipeline::run(input, config, &host)?;
    let elapsed = start.elapsed();

    let a = &report.artifacts;
    println!("Alignment residual: {:.5}", report.alignment.residual);
    println!(
        "Body: z {:.4} to {:.4} (bins {}..={})",
        report.region.z_min, report.region.z_max, report.region.start_bin, report.region.end_bin
    );
    println!(
        "Seam: {:.2}° (score {:.3e})",
        report.seam_angle.to_degrees(),
        report.seam_score
    );
    println!("Unwrap attempts: {}", report.host_attempts);
    println!("Preprocessed: {}", a.preprocessed.display());
    println!("Seam: {}", a.seam.display());
    println!("Seamed: {}", a.seamed.display());
    println!("Layout: {}", a.layout.display());
    match (&a.texture, report.coverage) {
        (Some(texture), Some(coverage)) => {
            println!("Texture: {} ({:.1}% covered)", texture.display(), coverage * 100.0)
        }
        _ => println!("Texture: none (no source texture)"),
    }
    if let Some(warning) = report.warning {
        eprintln!("Warning: {}", warning);
    }
    println!("Done ({:.2?})", elapsed);

    Ok(())
}

fn load_aligned(input: &Path, options: &AlignOptions) -> Result<Mesh, Box<dyn std::error::Error>> {
    let mut mesh = io::load(input)?;
    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    let alignment = align(&mut mesh, options)?;
    println!(
        "Aligned: residual {:.5}, height {:.4} to {:.4}",
        alignment.residual, alignment.height_range.0, alignment.height_range.1
    );
    Ok(mesh)
}

fn cmd_profile(
    input: &Path,
    align_options: &AlignOptions,
    body: &BodyArgs,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = load_aligned(input, align_options)?;
    let profile = RadiusProfile::compute(&mesh, body.bin_count(), !sequential)?;
    let region = select_region(&profile, body.tolerance, body.min_run);
    let kept = region.as_ref().ok().map(|r| r.start_bin..=r.end_bin);

    println!();
    println!(
        "{:>4}  {:>10}  {:>10}  {:>6}  {:>10}  {:>8}",
        "bin", "z_min", "z_max", "count", "mean r", "σ/μ"
    );
    for (i, bin) in profile.bins().iter().enumerate() {
        let mark = match (&kept, bin.is_stable(body.tolerance)) {
            (Some(k), _) if k.contains(&i) => "body",
            (_, true) => "stable",
            _ => "",
        };
        println!(
            "{:>4}  {:>10.4}  {:>10.4}  {:>6}  {:>10.4}  {:>8.4}  {}",
            i,
            bin.z_min,
            bin.z_max,
            bin.count,
            bin.mean,
            bin.ratio(),
            mark
        );
    }
    println!();

    match region {
        Ok(r) => println!(
            "Body: bins {}..={} ({} of {}), z {:.4} to {:.4}",
            r.start_bin,
            r.end_bin,
            r.num_bins(),
            profile.len(),
            r.z_min,
            r.z_max
        ),
        Err(e) => println!("Body: {}", e),
    }

    Ok(())
}

fn cmd_seam(
    input: &Path,
    output: Option<&Path>,
    mesh_out: Option<&Path>,
    align_options: &AlignOptions,
    body_options: &BodyOptions,
    seam_options: &SeamOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = load_aligned(input, align_options)?;
    let body = extract_body(&mesh, body_options)?;
    println!(
        "Body: z {:.4} to {:.4}, {} faces",
        body.region.z_min,
        body.region.z_max,
        body.mesh.num_faces()
    );

    let start = Instant::now();
    let seam = find_seam(&body.mesh, seam_options)?;
    println!(
        "Seam: {} points at {:.2}° (candidate {}, score {:.3e}, {:.2?})",
        seam.len(),
        seam.angle.to_degrees(),
        seam.candidate,
        seam.score,
        start.elapsed()
    );

    if let Some(path) = mesh_out {
        io::save(&body.mesh, path)?;
        println!("Saved: {}", path.display());
    }
    if let Some(path) = output {
        io::seam::save(&seam, path)?;
        println!("Saved: {}", path.display());
    }

    Ok(())
}

fn cmd_resample(
    old: &Path,
    new: &Path,
    texture: &Path,
    output: &Path,
    options: &ResampleOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let old_mesh = io::load(old)?;
    let new_mesh = io::load(new)?;
    let old_uvs = old_mesh.uvs().ok_or(format!("{} has no UVs", old.display()))?;
    let new_uvs = new_mesh.uvs().ok_or(format!("{} has no UVs", new.display()))?;
    let source = io::texture::load(texture)?;

    let start = Instant::now();
    let result = resample_texture(&source, old_uvs, new_uvs, options)?;
    let elapsed = start.elapsed();

    io::texture::save(&result.image, output)?;
    println!(
        "Saved: {} ({}x{}, {:.1}% covered, {:.2?})",
        output.display(),
        result.image.width(),
        result.image.height(),
        result.coverage * 100.0,
        elapsed
    );
    if let Some(warning) = result.warning {
        eprintln!("Warning: {}", warning);
    }

    Ok(())
}

fn cmd_info(input: &Path, align_options: &AlignOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Faces: {}", mesh.num_faces());
    println!("Normals: {}", if mesh.normals().is_some() { "yes" } else { "no" });
    match mesh.uvs() {
        Some(uvs) if uvs.is_per_vertex(mesh.faces()) => {
            println!("UVs: {} coordinates (per vertex)", uvs.len())
        }
        Some(uvs) => println!("UVs: {} coordinates (with seams)", uvs.len()),
        None => println!("UVs: none"),
    }
    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    match estimate_axis(&mesh, align_options) {
        AxisFit::Fit {
            axis,
            residual,
            orientation,
        } => {
            let d = axis.direction;
            println!(
                "Symmetry axis: ({:.4}, {:.4}, {:.4}) through ({:.3}, {:.3}, {:.3})",
                d.x, d.y, d.z, axis.point.x, axis.point.y, axis.point.z
            );
            println!("Axis residual: {:.5} (oriented by {:?})", residual, orientation);
        }
        AxisFit::Rejected { residual, reason } => {
            println!("Symmetry axis: none ({}, residual {:.5})", reason, residual);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_run_flags_reach_config() {
        let cli = parse(&[
            "unfurl", "run", "bottle.obj", "--host", "/usr/bin/blender",
            "--max-residual", "0.7", "--search-samples", "256",
            "--max-score", "4.5", "--lateral-weight", "2", "--curvature-weight", "0.5",
            "--levels", "40", "--background", "#ff8000", "--layout-size", "512",
        ]);
        let Commands::Run { output_dir, texture, align, body, seam, resample, layout_size, .. } =
            cli.command
        else {
            panic!("expected run");
        };
        let config =
            run_config(output_dir, texture, &align, &body, &seam, &resample, layout_size, false);
        assert_eq!(config.align.max_residual, 0.7);
        assert_eq!(config.align.search_samples, 256);
        assert_eq!(config.seam.max_score, 4.5);
        assert_eq!(config.seam.lateral_weight, 2.0);
        assert_eq!(config.seam.curvature_weight, 0.5);
        assert!(matches!(config.seam.levels, LevelCount::Fixed(40)));
        assert_eq!(config.resample.background, Rgba([255, 128, 0, 255]));
        assert_eq!(config.layout_size, 512);
    }

    #[test]
    fn test_run_defaults_match_library() {
        let cli = parse(&["unfurl", "run", "bottle.obj", "--host", "blender"]);
        let Commands::Run { output_dir, texture, align, body, seam, resample, layout_size, .. } =
            cli.command
        else {
            panic!("expected run");
        };
        let config =
            run_config(output_dir, texture, &align, &body, &seam, &resample, layout_size, false);
        let defaults = PipelineConfig::default();
        assert_eq!(config.align.max_residual, defaults.align.max_residual);
        assert_eq!(config.align.search_samples, defaults.align.search_samples);
        assert_eq!(config.seam.max_score, defaults.seam.max_score);
        assert_eq!(config.seam.candidates, defaults.seam.candidates);
        assert!(matches!(config.seam.levels, LevelCount::Adaptive));
        assert_eq!(config.resample.background, defaults.resample.background);
        assert_eq!(config.layout_size, defaults.layout_size);
    }

    #[test]
    fn test_seam_ceiling_is_tunable() {
        let cli = parse(&["unfurl", "seam", "bottle.obj", "--max-score", "0.5"]);
        let Commands::Seam { seam, .. } = cli.command else {
            panic!("expected seam");
        };
        assert_eq!(seam.options(true).max_score, 0.5);
        assert!(!seam.options(true).parallel);
    }

    #[test]
    fn test_parse_rgba() {
        assert_eq!(parse_rgba("00000000").unwrap(), Rgba([0, 0, 0, 0]));
        assert_eq!(parse_rgba("#10203040").unwrap(), Rgba([16, 32, 48, 64]));
        assert_eq!(parse_rgba("ffffff").unwrap(), Rgba([255, 255, 255, 255]));
        assert!(parse_rgba("fff").is_err());
        assert!(parse_rgba("gg0000").is_err());
        assert!(parse_rgba("+f+f+f").is_err());
    }

    #[test]
    fn test_host_timeout() {
        assert_eq!(host_timeout(1.5).unwrap(), Duration::from_millis(1500));
        for secs in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e30] {
            assert!(matches!(
                host_timeout(secs),
                Err(UnfurlError::InvalidParameter { name: "timeout", .. })
            ));
        }
    }
}
