//! ### English
//! Render-thread orchestration (public API).
//!
//! ### 中文
//! 渲染线程编排（对外公开 API）。

mod command;
mod pending;
mod render_thread;
mod reply;
mod scheduler;
mod shared;

mod pipeline;

pub use pipeline::FramePipeline;
pub use shared::{CameraFrame, PipelineStats};

pub(crate) use shared::PipelineShared;
