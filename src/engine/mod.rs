/// ### English
/// Engine internal modules (render thread, GPU backends, filters, and lifecycle control).
///
/// ### 中文
/// 引擎内部模块（渲染线程、GPU 后端、滤镜与生命周期控制等）。
pub mod config;
pub mod error;
pub mod filter;
pub mod flags;
pub mod geometry;
pub mod lifecycle;
pub(crate) mod lockfree;
pub mod meter;
pub mod rendering;
pub mod runtime;
pub mod screenshot;
