//! ### English
//! The GPU seam: every GPU call made by the scheduler goes through [`GpuBackend`].
//!
//! Contexts are created against one shared object namespace. A texture or program created
//! while any context is current is usable from every other context of the same backend.
//!
//! ### 中文
//! GPU 接缝：调度器发出的所有 GPU 调用都经过 [`GpuBackend`]。
//!
//! 所有上下文共享同一个对象命名空间；在任一上下文中创建的纹理或程序，
//! 都可在同一后端的其它上下文中直接使用。

use std::sync::Arc;

use dpi::PhysicalSize;

use crate::engine::error::GpuError;

/// ### English
/// Backend-assigned context identifier.
///
/// ### 中文
/// 后端分配的上下文标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// ### English
/// How a sampled texture is bound.
///
/// ### 中文
/// 被采样纹理的绑定目标。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// ### English
    /// Platform external image (camera stream).
    ///
    /// ### 中文
    /// 平台外部图像（相机流）。
    External,
    Texture2D,
}

/// ### English
/// Which quad program to build.
///
/// ### 中文
/// 要构建的四边形程序种类。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// ### English
    /// Samples the camera texture into the sampling framebuffer.
    ///
    /// ### 中文
    /// 将相机纹理采样进采样帧缓冲。
    CameraSample(TextureTarget),
    /// ### English
    /// 2D copy used by the compose stage when no filter draws.
    ///
    /// ### 中文
    /// 没有滤镜绘制时，合成阶段使用的 2D 拷贝。
    Identity,
    EncoderBlit,
    DisplayBlit,
    /// ### English
    /// User fragment code defining `vec4 shade(vec2 uv)`; `SAMPLE(uv)` reads the input texture.
    ///
    /// ### 中文
    /// 用户片元代码，需定义 `vec4 shade(vec2 uv)`；`SAMPLE(uv)` 读取输入纹理。
    Custom(Arc<str>),
}

/// ### English
/// Linked quad program with the handles its draw needs.
///
/// ### 中文
/// 已链接的四边形程序，以及绘制所需的句柄。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuadProgram {
    pub id: ProgramId,
    pub kind: ProgramKind,
    pub position_location: i32,
    pub tex_coord_location: i32,
    pub texture_location: i32,
}

/// ### English
/// Framebuffer with a single RGBA color texture attached.
///
/// ### 中文
/// 附带单个 RGBA 颜色纹理的帧缓冲。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub texture: TextureId,
    pub size: PhysicalSize<u32>,
}

/// ### English
/// Destination of a quad draw.
///
/// ### 中文
/// 四边形绘制的目的地。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawTarget {
    Framebuffer(FramebufferId),
    /// ### English
    /// The drawable surface bound to the current context.
    ///
    /// ### 中文
    /// 当前上下文绑定的可绘制 surface。
    Surface,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampledTexture {
    pub target: TextureTarget,
    pub id: TextureId,
}

impl SampledTexture {
    #[inline]
    pub fn texture_2d(id: TextureId) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            id,
        }
    }
}

/// ### English
/// One indexed quad draw.
///
/// ### 中文
/// 一次带索引的四边形绘制。
#[derive(Clone, Copy, Debug)]
pub struct QuadDraw<'a> {
    pub program: &'a QuadProgram,
    pub target: DrawTarget,
    pub source: SampledTexture,
    pub shape: &'a [f32],
    pub coords: &'a [f32],
    pub indices: &'a [u16],
    pub viewport: PhysicalSize<u32>,
}

/// ### English
/// GPU operations needed by the frame scheduler.
///
/// Implementations are driven from the render thread only and need not be `Send`; the
/// scheduler builds them on that thread from a `Send` factory.
///
/// ### 中文
/// 帧调度器所需的 GPU 操作。
///
/// 实现只在渲染线程上被调用，无需 `Send`；调度器在该线程上通过一个 `Send` 工厂构建它。
pub trait GpuBackend {
    /// ### English
    /// Drawable surface handed in by the display and encoder collaborators.
    ///
    /// ### 中文
    /// 显示方与编码器方交入的可绘制 surface。
    type Surface: Send + 'static;

    /// ### English
    /// Creates the root context of the shared namespace (no drawable surface).
    ///
    /// ### 中文
    /// 创建共享命名空间的根上下文（无可绘制 surface）。
    fn create_offscreen_context(&mut self) -> Result<ContextId, GpuError>;

    /// ### English
    /// Creates a context sharing `share_with`'s namespace, bound to `surface`.
    ///
    /// ### 中文
    /// 创建与 `share_with` 共享命名空间、并绑定 `surface` 的上下文。
    fn create_surface_context(
        &mut self,
        share_with: ContextId,
        surface: Self::Surface,
    ) -> Result<ContextId, GpuError>;

    /// ### English
    /// Destroys a context and releases its surface and any per-context state.
    ///
    /// ### 中文
    /// 销毁上下文，并释放其 surface 与所有上下文私有状态。
    fn destroy_context(&mut self, context: ContextId) -> Result<(), GpuError>;

    fn make_current(&mut self, context: ContextId) -> Result<(), GpuError>;

    fn compile_program(&mut self, kind: ProgramKind) -> Result<QuadProgram, GpuError>;

    fn delete_program(&mut self, program: &QuadProgram);

    fn create_render_target(&mut self, size: PhysicalSize<u32>) -> Result<RenderTarget, GpuError>;

    fn delete_render_target(&mut self, target: &RenderTarget);

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError>;

    /// ### English
    /// Blocks until the GPU work issued on the current context has completed, so a following
    /// stage on another context reads finished results.
    ///
    /// ### 中文
    /// 阻塞直到当前上下文已提交的 GPU 工作完成，使下一阶段（另一上下文）读取到完整结果。
    fn finish_stage(&mut self);

    /// ### English
    /// Reads RGBA8 pixels of the current drawable, bottom row first.
    ///
    /// ### 中文
    /// 读取当前可绘制目标的 RGBA8 像素，自底行开始。
    fn read_pixels(&mut self, size: PhysicalSize<u32>) -> Result<Vec<u8>, GpuError>;

    /// ### English
    /// Presents the surface bound to `context`, optionally stamped with a presentation time.
    ///
    /// ### 中文
    /// 呈现绑定在 `context` 上的 surface，可附带呈现时间戳。
    fn present(&mut self, context: ContextId, timestamp_ns: Option<i64>) -> Result<(), GpuError>;
}
