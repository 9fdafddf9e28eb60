//! ### English
//! State shared between producer threads and the render thread outside the mailbox.
//!
//! ### 中文
//! 邮箱之外、在生产者线程与渲染线程之间共享的状态。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dpi::PhysicalSize;
use parking_lot::Mutex;

use crate::engine::filter::FilterSlot;
use crate::engine::lockfree::CoalescedBox;
use crate::engine::meter::FrameRateMeter;
use crate::engine::rendering::GpuBackend;
use crate::engine::screenshot::ScreenshotSlot;

use super::pending::PendingFrameCount;

/// ### English
/// Latest camera texture published by the capture collaborator.
///
/// The pipeline never owns the texture; it only samples it during the draw pass that consumes
/// this handle.
///
/// ### 中文
/// 采集方发布的最新相机纹理。
///
/// 管线从不持有该纹理，只在消费此句柄的那次绘制中采样它。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraFrame {
    pub texture: u32,
    pub timestamp_ns: i64,
}

/// ### English
/// Display viewport packed into one word so readers never see a torn size.
///
/// ### 中文
/// 打包进一个字的显示视口尺寸，读者不会读到撕裂的值。
#[derive(Default)]
pub(crate) struct ViewportParams {
    packed: AtomicU64,
}

impl ViewportParams {
    #[inline]
    pub(crate) fn store(&self, size: PhysicalSize<u32>) {
        let packed = ((size.width as u64) << 32) | size.height as u64;
        self.packed.store(packed, Ordering::Release);
    }

    #[inline]
    pub(crate) fn load(&self) -> PhysicalSize<u32> {
        let packed = self.packed.load(Ordering::Acquire);
        PhysicalSize::new((packed >> 32) as u32, packed as u32)
    }
}

/// ### English
/// Draw counters for diagnostics.
///
/// ### 中文
/// 用于诊断的绘制计数。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineStats {
    /// ### English
    /// Draw passes that ran.
    ///
    /// ### 中文
    /// 已执行的绘制次数。
    pub drawn_frames: u64,
    /// ### English
    /// Frame notifications coalesced away without a draw.
    ///
    /// ### 中文
    /// 被合并丢弃、未触发绘制的帧通知数。
    pub dropped_frames: u64,
    pub fps: f32,
}

/// ### English
/// Everything producers may touch without going through the mailbox.
///
/// ### 中文
/// 生产者无需经过邮箱即可访问的全部状态。
pub(crate) struct PipelineShared<B: GpuBackend> {
    pub(crate) pending: PendingFrameCount,
    pub(crate) camera_frame: CoalescedBox<CameraFrame>,
    pub(crate) filter: FilterSlot<B>,
    pub(crate) screenshot: ScreenshotSlot,
    pub(crate) viewport: ViewportParams,
    pub(crate) meter: FrameRateMeter,
    /// ### English
    /// Coalesced wake flag so bursts of commands cost one `unpark`.
    ///
    /// ### 中文
    /// 合并唤醒标记：一批命令只需一次 `unpark`。
    pub(crate) wake_pending: AtomicBool,
    drawn: AtomicU64,
    dropped: AtomicU64,
    halted: Mutex<Option<String>>,
}

impl<B: GpuBackend> Default for PipelineShared<B> {
    fn default() -> Self {
        Self {
            pending: PendingFrameCount::default(),
            camera_frame: CoalescedBox::default(),
            filter: FilterSlot::default(),
            screenshot: ScreenshotSlot::default(),
            viewport: ViewportParams::default(),
            meter: FrameRateMeter::new(),
            wake_pending: AtomicBool::new(false),
            drawn: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            halted: Mutex::new(None),
        }
    }
}

impl<B: GpuBackend> PipelineShared<B> {
    #[inline]
    pub(crate) fn record_drawn(&self) {
        self.drawn.fetch_add(1, Ordering::Relaxed);
        self.meter.count();
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> PipelineStats {
        PipelineStats {
            drawn_frames: self.drawn.load(Ordering::Relaxed),
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            fps: self.meter.fps(),
        }
    }

    /// ### English
    /// Records the first fatal error; later ones are ignored.
    ///
    /// ### 中文
    /// 记录第一个致命错误；之后的错误被忽略。
    pub(crate) fn halt(&self, reason: String) {
        let mut halted = self.halted.lock();
        if halted.is_none() {
            *halted = Some(reason);
        }
    }

    pub(crate) fn halted(&self) -> Option<String> {
        self.halted.lock().clone()
    }

    /// ### English
    /// Clears the halt reason and the pending count before a new render thread takes over.
    /// Only valid once the previous render thread has been joined.
    ///
    /// ### 中文
    /// 在新的渲染线程接管之前清除停机原因与待处理计数。
    /// 仅在上一个渲染线程已被 join 之后调用。
    pub(crate) fn rearm(&self) {
        *self.halted.lock() = None;
        self.pending.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rendering::HeadlessBackend;

    #[test]
    fn viewport_round_trips_both_halves() {
        let viewport = ViewportParams::default();
        assert_eq!(viewport.load(), PhysicalSize::new(0, 0));
        viewport.store(PhysicalSize::new(1080, 2340));
        assert_eq!(viewport.load(), PhysicalSize::new(1080, 2340));
    }

    #[test]
    fn first_halt_wins_until_rearmed() {
        let shared = PipelineShared::<HeadlessBackend>::default();
        shared.halt("attach_display: first".into());
        shared.halt("detach_display: second".into());
        assert_eq!(shared.halted().as_deref(), Some("attach_display: first"));

        shared.pending.increment();
        shared.rearm();
        assert!(shared.halted().is_none());
        assert_eq!(shared.pending.load(), 0);
    }
}
