//! ### English
//! `camfan` crate root.
//! Renders camera frames through a swappable filter and fans the composed frame out to a
//! hardware encoder surface and a preview surface; the implementation lives under `engine`.
//!
//! ### 中文
//! `camfan` 的 crate 根。
//! 将相机帧经可替换滤镜渲染后，分发到硬件编码器 surface 与预览 surface；实现位于 `engine` 模块。
mod engine;

pub use engine::config::{CameraTextureTarget, CoreParameters, ShaderDialect};
pub use engine::error::{BindingKind, ContractViolation, Error, GpuError, Result};
pub use engine::filter::{BoxedFilter, FilterGuard, FilterPass, ShaderFilter, VideoFilter};
pub use engine::flags::{self, DirectionFlags};
pub use engine::geometry::{self, CameraFacing, OrientationTable};
pub use engine::lifecycle::{
    EncodedPacket, EncoderFormat, HardwareEncoder, LifecycleState, PacketSink, VideoCore,
};
pub use engine::meter::FrameRateMeter;
pub use engine::rendering::{
    self, GpuBackend, GpuLedger, HeadlessBackend, HeadlessSurface, SurfmanBackend, WidgetSurface,
};
pub use engine::runtime::{CameraFrame, FramePipeline, PipelineStats};
pub use engine::screenshot::ScreenshotCallback;
