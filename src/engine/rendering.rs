//! ### English
//! Rendering module entry point: the [`GpuBackend`] seam, its two implementations and the
//! quad shader sources.
//!
//! ### 中文
//! 渲染模块入口：[`GpuBackend`] 接缝、两种实现，以及四边形着色器源码。

mod backend;
mod headless;
mod shaders;
mod surfman_backend;

pub use backend::{
    ContextId, DrawTarget, FramebufferId, GpuBackend, ProgramId, ProgramKind, QuadDraw,
    QuadProgram, RenderTarget, SampledTexture, TextureId, TextureTarget,
};
pub use headless::{
    DrawRecord, EVENT_LOG_CAPACITY, GpuEvent, GpuLedger, HeadlessBackend, HeadlessSurface,
};
pub use surfman_backend::{PresentHook, SurfmanBackend, WidgetSurface};
