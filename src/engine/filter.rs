//! ### English
//! Pluggable post-processing stage run by the compose stage of the draw pass.
//!
//! ### 中文
//! 可插拔的后处理阶段，由绘制流程的合成阶段调用。

mod shader_filter;
mod slot;

use dpi::PhysicalSize;

use super::error::GpuError;
use super::flags::DirectionFlags;
use super::rendering::{FramebufferId, GpuBackend, TextureId};

pub use shader_filter::ShaderFilter;
pub use slot::{BoxedFilter, FilterGuard, FilterSlot};

/// ### English
/// Inputs of one filter draw.
///
/// ### 中文
/// 单次滤镜绘制的输入。
#[derive(Clone, Copy, Debug)]
pub struct FilterPass<'a> {
    /// ### English
    /// Sampled camera image (2D texture, already oriented and cropped).
    ///
    /// ### 中文
    /// 已完成方向与裁剪处理的相机图像（2D 纹理）。
    pub input_texture: TextureId,
    /// ### English
    /// Working framebuffer that the encoder and display stages read from.
    ///
    /// ### 中文
    /// 编码器与显示阶段读取的工作帧缓冲。
    pub output_framebuffer: FramebufferId,
    pub shape: &'a [f32],
    pub coords: &'a [f32],
    pub indices: &'a [u16],
    pub size: PhysicalSize<u32>,
}

/// ### English
/// A post-processing stage.
///
/// The renderer calls `initialize` before the first `draw`, `on_orientation_change` whenever
/// the camera direction differs from the last one reported, and `destroy` before the filter
/// is dropped or the pipeline releases its GPU objects. All hooks run on the render thread.
///
/// ### 中文
/// 后处理阶段。
///
/// 渲染线程在首次 `draw` 之前调用 `initialize`；相机方向与上次通知不同时调用
/// `on_orientation_change`；在滤镜被丢弃或管线释放 GPU 对象之前调用 `destroy`。
/// 所有钩子都在渲染线程上执行。
pub trait VideoFilter<B: GpuBackend>: Send {
    fn initialize(&mut self, gpu: &mut B, size: PhysicalSize<u32>) -> Result<(), GpuError>;

    fn on_orientation_change(&mut self, direction: DirectionFlags) {
        let _ = direction;
    }

    fn draw(&mut self, gpu: &mut B, pass: &FilterPass<'_>) -> Result<(), GpuError>;

    fn destroy(&mut self, gpu: &mut B);
}
