//! ### English
//! Error types surfaced by the pipeline and the lifecycle controller.
//!
//! Transient conditions (a busy filter slot, a failed readback, a coalesced frame) never become
//! errors; they are logged and the pipeline moves on.
//!
//! ### 中文
//! 管线与生命周期控制器对外暴露的错误类型。
//!
//! 暂时性情况（滤镜槽忙、读回失败、帧被合并）不会成为错误，只记录日志并继续。

use std::path::PathBuf;

use super::rendering::ContextId;

/// ### English
/// Which GPU binding a lifecycle command refers to.
///
/// ### 中文
/// 生命周期命令所指的 GPU 绑定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Offscreen,
    Encoder,
    Display,
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Offscreen => "offscreen",
            Self::Encoder => "encoder",
            Self::Display => "display",
        })
    }
}

/// ### English
/// Lifecycle commands issued out of order. These are programmer errors and halt the scheduler.
///
/// ### 中文
/// 乱序下发的生命周期命令。属于编程错误，会使调度器停机。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("{0} binding is already attached")]
    AlreadyAttached(BindingKind),
    #[error("{0} binding is not attached")]
    NotAttached(BindingKind),
    #[error("surface binding requested before the offscreen binding exists")]
    NotInitialized,
    #[error("lifecycle operation `{operation}` is not allowed while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
}

/// ### English
/// Failures reported by a [`GpuBackend`](super::rendering::GpuBackend).
///
/// ### 中文
/// [`GpuBackend`](super::rendering::GpuBackend) 报告的失败。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create GPU context: {0}")]
    ContextCreation(String),
    #[error("unknown GPU context {0:?}")]
    UnknownContext(ContextId),
    #[error("no GPU context is current")]
    NoCurrentContext,
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("program link failed: {0}")]
    ProgramLink(String),
    #[error("framebuffer incomplete (status {0:#x})")]
    IncompleteFramebuffer(u32),
    #[error("pixel readback failed: {0}")]
    Readback(String),
    #[error("surface presentation failed: {0}")]
    Present(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// ### English
/// Crate-wide error.
///
/// ### 中文
/// crate 级错误类型。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lifecycle contract violated: {0}")]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("hardware encoder: {0}")]
    Encoder(String),
    #[error("failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    ConfigJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("render thread halted: {0}")]
    Halted(String),
}

impl Error {
    /// ### English
    /// Whether this error leaves the scheduler unable to continue.
    ///
    /// ### 中文
    /// 该错误是否使调度器无法继续运行。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Contract(_) | Self::Gpu(_) | Self::Halted(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
