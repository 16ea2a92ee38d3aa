//! Error taxonomy for the device (spec §7).
//!
//! The host ABI is strictly value-returning: there is no cross-boundary error
//! channel. Internal code returns `Result<T, GsError>` so that call sites can
//! choose, per §7, whether a failure is soft (log + sentinel) or fatal (log +
//! abort). [`GsError::is_fatal`] encodes that split so `abi.rs` doesn't have to
//! duplicate the taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GsError {
    /// Host passed a handle that is unknown or has already been released.
    #[error("invalid handle: {0}")]
    InvalidHandle(&'static str),

    /// The shader parser or transpiler rejected the input.
    #[error("malformed shader: {0}")]
    MalformedShader(String),

    /// A structurally invalid render-pipeline descriptor failed to compile.
    #[error("pipeline compilation failed: {0}")]
    PipelineCompilation(String),

    /// The host violated a documented precondition (e.g. drew with no bound
    /// vertex buffer, or flushed a dynamic buffer against a static one).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A GPU allocation failed.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
}

impl GsError {
    /// §7: only contract violations and OOM are unrecoverable; the rest are
    /// logged and degrade to a sentinel return value.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GsError::ContractViolation(_) | GsError::OutOfMemory(_)
        )
    }
}

pub type GsResult<T> = Result<T, GsError>;

/// Logs a fatal contract violation and aborts the process.
///
/// Spec §7: "Fatal — indicates a host bug" / "Fatal" for OOM. There is no
/// recovery path, so unwinding back across the `extern "C"` boundary would be
/// undefined behavior; we log first so the host's crash report has context.
#[track_caller]
pub fn fatal(err: GsError) -> ! {
    log::error!("fatal: {err}");
    panic!("{err}");
}

/// Logs a soft failure (invalid handle, malformed shader, unsupported op) at
/// `warn!` and returns the caller-supplied sentinel.
pub fn soft<T>(err: GsError, sentinel: T) -> T {
    log::warn!("{err}");
    sentinel
}
