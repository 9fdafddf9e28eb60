//! ### English
//! Frame scheduler: owns the GPU backend and every binding, and runs on the render thread only.
//!
//! ### 中文
//! 帧调度器：持有 GPU 后端与全部绑定，只在渲染线程上运行。

mod bindings;
mod draw;

use std::sync::Arc;

use crate::engine::config::CoreParameters;
use crate::engine::geometry::{CameraFacing, OrientationTable};
use crate::engine::rendering::GpuBackend;

use super::shared::PipelineShared;

use bindings::{OffscreenBinding, SurfaceBinding};

/// ### English
/// What a `FrameAvailable` command ended up doing.
///
/// ### 中文
/// 一条 `FrameAvailable` 命令最终的处理结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Drawn,
    /// ### English
    /// More notifications were pending; a later one will draw.
    ///
    /// ### 中文
    /// 仍有待处理通知；由之后的某条通知来绘制。
    Coalesced,
    /// ### English
    /// No offscreen binding or no camera frame to sample.
    ///
    /// ### 中文
    /// 没有离屏绑定，或没有可采样的相机帧。
    Skipped,
}

pub(crate) struct FrameScheduler<B: GpuBackend> {
    gpu: B,
    params: CoreParameters,
    shared: Arc<PipelineShared<B>>,
    orientation: OrientationTable,
    offscreen: Option<OffscreenBinding>,
    encoder: Option<SurfaceBinding>,
    display: Option<SurfaceBinding>,
    /// ### English
    /// Last timestamp handed to the encoder surface; presents never go backwards.
    ///
    /// ### 中文
    /// 上一次交给编码器 surface 的时间戳；呈现时间不会倒退。
    last_encoder_timestamp_ns: Option<i64>,
}

impl<B: GpuBackend> FrameScheduler<B> {
    pub(crate) fn new(gpu: B, params: CoreParameters, shared: Arc<PipelineShared<B>>) -> Self {
        let orientation = OrientationTable::new(CameraFacing::Back, &params);
        Self {
            gpu,
            params,
            shared,
            orientation,
            offscreen: None,
            encoder: None,
            display: None,
            last_encoder_timestamp_ns: None,
        }
    }

    pub(crate) fn set_camera_facing(&mut self, facing: CameraFacing) {
        if self.orientation.set_facing(facing, &self.params) {
            tracing::debug!(
                target: "camfan::scheduler",
                ?facing,
                direction = self.orientation.direction().bits(),
                "orientation table recomputed"
            );
        }
    }

    pub(crate) fn orientation(&self) -> &OrientationTable {
        &self.orientation
    }

    /// ### English
    /// Best-effort release of every binding, used when the render thread exits.
    ///
    /// ### 中文
    /// 尽力释放所有绑定；在渲染线程退出时使用。
    pub(crate) fn release_all(&mut self) {
        if self.encoder.is_some()
            && let Err(err) = self.detach_encoder()
        {
            tracing::warn!(target: "camfan::scheduler", "encoder release on exit failed: {err}");
        }
        if self.display.is_some()
            && let Err(err) = self.detach_display()
        {
            tracing::warn!(target: "camfan::scheduler", "display release on exit failed: {err}");
        }
        if self.offscreen.is_some()
            && let Err(err) = self.uninit()
        {
            tracing::warn!(target: "camfan::scheduler", "offscreen release on exit failed: {err}");
        }
        self.shared.screenshot.abandon();
    }
}
