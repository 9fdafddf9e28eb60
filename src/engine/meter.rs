//! ### English
//! Rolling frames-per-second meter for the draw pass.
//!
//! ### 中文
//! 绘制阶段的滚动帧率计。

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// ### English
/// Length of one measurement window.
///
/// ### 中文
/// 单个统计窗口的长度。
pub const METER_WINDOW: Duration = Duration::from_millis(1000);

/// ### English
/// Frames-per-second estimate published once per [`METER_WINDOW`].
///
/// `count` is called by the render thread only; `fps` may be read from any thread.
/// A meter that has not published for two windows reads `0.0`.
///
/// ### 中文
/// 每个 [`METER_WINDOW`] 发布一次的帧率估计。
///
/// `count` 只由渲染线程调用；`fps` 可在任意线程读取。
/// 连续两个窗口未发布的帧率计读数为 `0.0`。
pub struct FrameRateMeter {
    epoch: Instant,
    window_start_ms: AtomicU64,
    frames: AtomicU32,
    fps_bits: AtomicU32,
    published_ms: AtomicU64,
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub(crate) fn starting_at(epoch: Instant) -> Self {
        Self {
            epoch,
            window_start_ms: AtomicU64::new(0),
            frames: AtomicU32::new(0),
            fps_bits: AtomicU32::new(0f32.to_bits()),
            published_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    fn millis_since_epoch(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// ### English
    /// Records one drawn frame.
    ///
    /// ### 中文
    /// 记录一帧已绘制。
    #[inline]
    pub fn count(&self) {
        self.count_at(Instant::now());
    }

    pub(crate) fn count_at(&self, now: Instant) {
        let now_ms = self.millis_since_epoch(now);
        let frames = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let start_ms = self.window_start_ms.load(Ordering::Relaxed);
        let elapsed_ms = now_ms.saturating_sub(start_ms);
        if elapsed_ms < METER_WINDOW.as_millis() as u64 {
            return;
        }
        let fps = frames as f32 * 1000.0 / elapsed_ms as f32;
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        self.published_ms.store(now_ms, Ordering::Release);
        self.frames.store(0, Ordering::Relaxed);
        self.window_start_ms.store(now_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps_at(Instant::now())
    }

    pub(crate) fn fps_at(&self, now: Instant) -> f32 {
        let published_ms = self.published_ms.load(Ordering::Acquire);
        if published_ms == 0 {
            return 0.0;
        }
        let stale_after = 2 * METER_WINDOW.as_millis() as u64;
        if self.millis_since_epoch(now).saturating_sub(published_ms) > stale_after {
            return 0.0;
        }
        f32::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_zero_before_first_window() {
        let epoch = Instant::now();
        let meter = FrameRateMeter::starting_at(epoch);
        for i in 0..10 {
            meter.count_at(epoch + Duration::from_millis(i * 50));
        }
        assert_eq!(meter.fps_at(epoch + Duration::from_millis(500)), 0.0);
    }

    #[test]
    fn publishes_rate_per_window() {
        let epoch = Instant::now();
        let meter = FrameRateMeter::starting_at(epoch);
        // 30 frames spaced so the last lands exactly on the one-second boundary.
        for i in 1..=30u64 {
            meter.count_at(epoch + Duration::from_millis(i * 1000 / 30));
        }
        let fps = meter.fps_at(epoch + Duration::from_millis(1000));
        assert!((fps - 30.0).abs() < 0.5, "fps = {fps}");
    }

    #[test]
    fn stale_meter_reads_zero() {
        let epoch = Instant::now();
        let meter = FrameRateMeter::starting_at(epoch);
        for i in 1..=20u64 {
            meter.count_at(epoch + Duration::from_millis(i * 50));
        }
        assert!(meter.fps_at(epoch + Duration::from_millis(1500)) > 0.0);
        assert_eq!(meter.fps_at(epoch + Duration::from_millis(3500)), 0.0);
    }
}
