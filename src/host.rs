//! The external UV-unwrap host.
//!
//! Unwrapping itself happens outside this crate. The pipeline writes the
//! cropped mesh and its seam to disk, hands both paths to an
//! [`UnwrapHost`], and reads back a mesh that must have the same vertices
//! and faces plus new texture coordinates.
//!
//! [`CommandHost`] runs an external program, by default in the
//! Blender-style calling convention:
//!
//! ```text
//! <program> -b -P <script> -- --input_obj <mesh> --seam_txt <seam> \
//!     --output_obj <out> --output_layout <svg>
//! ```
//!
//! Every response goes through [`verify_response`], and
//! [`unwrap_with_retry`] retries failures that
//! [`HostFailure::is_transient`] allows.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::algo::Seam;
use crate::error::{HostFailure, Result, UnfurlError};
use crate::io;
use crate::mesh::Mesh;

/// Result of a single host call.
pub type HostResult<T> = std::result::Result<T, HostFailure>;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const LOG_TAIL_LINES: usize = 20;

/// Everything a host needs for one unwrap.
#[derive(Debug, Clone)]
pub struct UnwrapRequest<'a> {
    /// The cropped mesh, as written to `mesh_path`.
    pub mesh: &'a Mesh,
    /// The seam, as written to `seam_path`.
    pub seam: &'a Seam,
    /// OBJ file holding `mesh`.
    pub mesh_path: PathBuf,
    /// Seam coordinate list for `seam`.
    pub seam_path: PathBuf,
    /// Where the host must write the UV-mapped mesh (OBJ).
    pub output_mesh: PathBuf,
    /// Where the host may write a UV layout drawing.
    pub output_layout: PathBuf,
    /// Where the host's console output is captured.
    pub log_path: PathBuf,
}

/// What a host returns.
#[derive(Debug, Clone)]
pub struct UnwrapResponse {
    /// The UV-mapped mesh.
    pub mesh: Mesh,
    /// The layout drawing, if the host produced one.
    pub layout: Option<PathBuf>,
}

/// Something that can unwrap a seamed mesh.
pub trait UnwrapHost {
    /// Produce UV coordinates for `request.mesh`, cut along `request.seam`.
    fn unwrap(&self, request: &UnwrapRequest<'_>) -> HostResult<UnwrapResponse>;
}

/// Options for the command-line host.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Host executable.
    pub program: Option<PathBuf>,

    /// Script passed as `-b -P <script> --`. Without a script the program
    /// receives only the `--input_obj ...` arguments.
    pub script: Option<PathBuf>,

    /// Wall-clock limit per attempt (default: 600 s).
    pub timeout: Duration,

    /// Extra attempts after a transient failure (default: 2).
    pub retries: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            program: None,
            script: None,
            timeout: Duration::from_secs(600),
            retries: 2,
        }
    }
}

impl HostOptions {
    /// Set the host executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Set the host script.
    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(UnfurlError::invalid_param(
                "timeout",
                format!("{:?}", self.timeout),
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Build the configured [`CommandHost`].
    pub fn command_host(&self) -> Result<CommandHost> {
        self.validate()?;
        let program = self.program.as_ref().ok_or_else(|| {
            UnfurlError::invalid_param("program", "(none)", "no unwrap host executable configured")
        })?;
        let host = match &self.script {
            Some(script) => CommandHost::blender(program, script),
            None => CommandHost::new(program),
        };
        Ok(host.with_timeout(self.timeout))
    }
}

/// Runs an external program as the unwrap host.
#[derive(Debug, Clone)]
pub struct CommandHost {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl CommandHost {
    /// Run `program` with only the request arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: HostOptions::default().timeout,
        }
    }

    /// Run Blender in background mode with a Python script.
    pub fn blender(executable: impl Into<PathBuf>, script: impl AsRef<Path>) -> Self {
        Self::new(executable).with_args([
            OsString::from("-b"),
            OsString::from("-P"),
            script.as_ref().as_os_str().to_os_string(),
            OsString::from("--"),
        ])
    }

    /// Append arguments placed before the request arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &UnwrapRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--input_obj")
            .arg(&request.mesh_path)
            .arg("--seam_txt")
            .arg(&request.seam_path)
            .arg("--output_obj")
            .arg(&request.output_mesh)
            .arg("--output_layout")
            .arg(&request.output_layout)
            .stdin(Stdio::null());
        cmd
    }
}

impl UnwrapHost for CommandHost {
    fn unwrap(&self, request: &UnwrapRequest<'_>) -> HostResult<UnwrapResponse> {
        let spawn_failure = |e: std::io::Error| HostFailure::Spawn {
            program: self.program.display().to_string(),
            message: e.to_string(),
        };

        let log = File::create(&request.log_path).map_err(spawn_failure)?;
        let log_err = log.try_clone().map_err(spawn_failure)?;
        let mut cmd = self.command(request);
        cmd.stdout(log).stderr(log_err);

        debug!("launching unwrap host: {:?}", cmd);
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(spawn_failure)?;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    // The child may exit between the check and the kill
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HostFailure::TimedOut {
                        seconds: self.timeout.as_secs_f64(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(HostFailure::Exited {
                        status: format!("unknown status ({})", e),
                        log: log_tail(&request.log_path),
                    });
                }
            }
        };
        info!(
            "unwrap host finished in {:.1}s with {}",
            start.elapsed().as_secs_f64(),
            status
        );

        if !status.success() {
            return Err(HostFailure::Exited {
                status: status.to_string(),
                log: log_tail(&request.log_path),
            });
        }
        read_output(request)
    }
}

/// Load the mesh and layout a host wrote to the request's output paths.
pub fn read_output(request: &UnwrapRequest<'_>) -> HostResult<UnwrapResponse> {
    if !request.output_mesh.is_file() {
        return Err(HostFailure::MissingOutput {
            path: request.output_mesh.clone(),
        });
    }
    let mesh = io::obj::load(&request.output_mesh).map_err(|e| HostFailure::UnreadableOutput {
        path: request.output_mesh.clone(),
        message: e.to_string(),
    })?;
    let layout = request
        .output_layout
        .is_file()
        .then(|| request.output_layout.clone());
    Ok(UnwrapResponse { mesh, layout })
}

fn log_tail(path: &Path) -> String {
    let text = fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check that a host kept the mesh's topology and added UVs.
///
/// Vertex count, face count and every face's vertex triple must match
/// what was sent.
pub fn verify_response(sent: &Mesh, received: &Mesh) -> HostResult<()> {
    if sent.num_vertices() != received.num_vertices() || sent.num_faces() != received.num_faces() {
        return Err(HostFailure::TopologyMismatch {
            expected_vertices: sent.num_vertices(),
            found_vertices: received.num_vertices(),
            expected_faces: sent.num_faces(),
            found_faces: received.num_faces(),
        });
    }
    if let Some(face) = sent
        .faces()
        .iter()
        .zip(received.faces())
        .position(|(a, b)| a != b)
    {
        return Err(HostFailure::ConnectivityMismatch { face });
    }
    if received.uvs().is_none() {
        return Err(HostFailure::MissingUvs);
    }
    Ok(())
}

/// Call `host` until it returns a verified response.
///
/// Transient failures are retried up to `retries` times; anything else
/// fails immediately. Returns the response with the number of attempts
/// made; the error records the same count.
pub fn unwrap_with_retry(
    host: &dyn UnwrapHost,
    request: &UnwrapRequest<'_>,
    retries: usize,
) -> Result<(UnwrapResponse, usize)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = host
            .unwrap(request)
            .and_then(|response| verify_response(request.mesh, &response.mesh).map(|_| response));
        match outcome {
            Ok(response) => return Ok((response, attempt)),
            Err(failure) if failure.is_transient() && attempt <= retries => {
                warn!("unwrap attempt {} failed, retrying: {}", attempt, failure);
            }
            Err(failure) => {
                return Err(UnfurlError::ExternalHostFailure {
                    attempts: attempt,
                    failure,
                })
            }
        }
    }
}
