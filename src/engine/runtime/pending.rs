//! ### English
//! Backpressure counter for frame-available notifications.
//!
//! ### 中文
//! 帧可用通知的背压计数器。
use std::sync::atomic::{AtomicU64, Ordering};

/// ### English
/// Count of frame notifications not yet consumed by the renderer. Never below zero.
///
/// ### 中文
/// 渲染线程尚未消费的帧通知数量，永不小于 0。
#[derive(Default)]
pub(crate) struct PendingFrameCount {
    count: AtomicU64,
}

impl PendingFrameCount {
    #[inline]
    pub(crate) fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// ### English
    /// Consumes one notification and returns how many remain afterwards.
    /// Saturates at zero when the count was reset while notifications were in flight.
    ///
    /// ### 中文
    /// 消费一个通知并返回剩余数量。
    /// 若计数在通知途中被重置，则在 0 处饱和。
    #[inline]
    pub(crate) fn consume(&self) -> u64 {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    #[inline]
    pub(crate) fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    #[inline]
    pub(crate) fn load(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::PendingFrameCount;

    #[test]
    fn consume_reports_remaining() {
        let pending = PendingFrameCount::default();
        for _ in 0..3 {
            pending.increment();
        }
        assert_eq!(pending.consume(), 2);
        assert_eq!(pending.consume(), 1);
        assert_eq!(pending.consume(), 0);
        assert_eq!(pending.load(), 0);
    }

    #[test]
    fn never_goes_negative() {
        let pending = PendingFrameCount::default();
        pending.increment();
        pending.increment();
        pending.reset();
        assert_eq!(pending.consume(), 0);
        assert_eq!(pending.consume(), 0);
        assert_eq!(pending.load(), 0);
    }
}
