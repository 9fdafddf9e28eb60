//! ### English
//! Filter slot shared between the owning thread (which swaps filters) and the render thread
//! (which draws them under a bounded-wait lock).
//!
//! ### 中文
//! 滤镜槽：在持有方线程（替换滤镜）与渲染线程（以有界等待加锁后绘制）之间共享。

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::engine::flags::DirectionFlags;
use crate::engine::rendering::GpuBackend;

use super::{FilterPass, VideoFilter};

pub type BoxedFilter<B> = Box<dyn VideoFilter<B>>;

struct BoundFilter<B: GpuBackend> {
    filter: BoxedFilter<B>,
    initialized: bool,
    reported_direction: Option<DirectionFlags>,
}

struct SlotState<B: GpuBackend> {
    active: Option<BoundFilter<B>>,
    /// ### English
    /// Replaced filters that were initialized and still owe a `destroy` on the render thread.
    ///
    /// ### 中文
    /// 已初始化、被替换后仍需在渲染线程上执行 `destroy` 的滤镜。
    retired: Vec<BoxedFilter<B>>,
    generation: u64,
}

impl<B: GpuBackend> SlotState<B> {
    fn destroy_retired(&mut self, gpu: &mut B) {
        for mut filter in self.retired.drain(..) {
            filter.destroy(gpu);
            tracing::debug!(target: "camfan::filter", "replaced filter destroyed");
        }
    }
}

/// ### English
/// Mutually exclusive holder of at most one active filter.
///
/// ### 中文
/// 互斥持有至多一个活动滤镜的槽。
pub struct FilterSlot<B: GpuBackend> {
    state: Mutex<SlotState<B>>,
}

impl<B: GpuBackend> Default for FilterSlot<B> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                active: None,
                retired: Vec::new(),
                generation: 0,
            }),
        }
    }
}

impl<B: GpuBackend> FilterSlot<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// ### English
    /// Replaces the active filter (`None` clears it).
    ///
    /// A replaced filter that was already initialized is handed to the render thread for
    /// `destroy`; one that never ran is dropped here.
    ///
    /// ### 中文
    /// 替换活动滤镜（`None` 表示清空）。
    ///
    /// 被替换的滤镜若已初始化，将交给渲染线程执行 `destroy`；从未运行过的则直接在此丢弃。
    pub fn set(&self, filter: Option<BoxedFilter<B>>) {
        let mut state = self.state.lock();
        let replaced = std::mem::replace(
            &mut state.active,
            filter.map(|filter| BoundFilter {
                filter,
                initialized: false,
                reported_direction: None,
            }),
        );
        state.generation += 1;
        if let Some(old) = replaced
            && old.initialized
        {
            state.retired.push(old.filter);
        }
        tracing::debug!(
            target: "camfan::filter",
            generation = state.generation,
            active = state.active.is_some(),
            "filter slot updated"
        );
    }

    /// ### English
    /// Blocking acquire for the owning thread; release by dropping the guard.
    ///
    /// ### 中文
    /// 供持有方线程使用的阻塞获取；丢弃 guard 即释放。
    pub fn acquire(&self) -> FilterGuard<'_, B> {
        FilterGuard {
            state: self.state.lock(),
        }
    }

    /// ### English
    /// Bounded-wait acquire; `None` when the slot stayed busy for `timeout`.
    ///
    /// ### 中文
    /// 有界等待获取；若在 `timeout` 内槽一直被占用则返回 `None`。
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<FilterGuard<'_, B>> {
        self.state
            .try_lock_for(timeout)
            .map(|state| FilterGuard { state })
    }

    pub fn has_filter(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// ### English
    /// Number of `set` calls so far.
    ///
    /// ### 中文
    /// 迄今为止 `set` 的调用次数。
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// ### English
    /// Runs `destroy` on every initialized filter; the active filter stays in the slot and is
    /// initialized again before its next draw.
    ///
    /// ### 中文
    /// 对所有已初始化的滤镜执行 `destroy`；活动滤镜仍留在槽中，下次绘制前会重新初始化。
    pub(crate) fn release_gpu(&self, gpu: &mut B) {
        let mut state = self.state.lock();
        state.destroy_retired(gpu);
        if let Some(bound) = state.active.as_mut()
            && bound.initialized
        {
            bound.filter.destroy(gpu);
            bound.initialized = false;
            bound.reported_direction = None;
            tracing::debug!(target: "camfan::filter", "active filter destroyed on teardown");
        }
    }
}

/// ### English
/// Exclusive access to the slot until dropped.
///
/// ### 中文
/// 在被丢弃之前对槽的独占访问。
pub struct FilterGuard<'a, B: GpuBackend> {
    state: MutexGuard<'a, SlotState<B>>,
}

impl<B: GpuBackend> FilterGuard<'_, B> {
    pub fn filter_mut(&mut self) -> Option<&mut (dyn VideoFilter<B> + 'static)> {
        self.state.active.as_mut().map(|bound| bound.filter.as_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.state.active.is_none()
    }

    /// ### English
    /// Runs the active filter for one frame. Returns `false` when nothing was drawn and the
    /// caller must fall back to the identity draw.
    ///
    /// ### 中文
    /// 为一帧运行活动滤镜。返回 `false` 表示未绘制，调用方需回退为直通绘制。
    pub(crate) fn render(
        &mut self,
        gpu: &mut B,
        direction: DirectionFlags,
        pass: &FilterPass<'_>,
    ) -> bool {
        self.state.destroy_retired(gpu);

        let Some(bound) = self.state.active.as_mut() else {
            return false;
        };

        if !bound.initialized {
            if let Err(err) = bound.filter.initialize(gpu, pass.size) {
                tracing::warn!(target: "camfan::filter", "filter initialize failed, dropping filter: {err}");
                if let Some(mut failed) = self.state.active.take() {
                    failed.filter.destroy(gpu);
                }
                return false;
            }
            bound.initialized = true;
            tracing::debug!(
                target: "camfan::filter",
                width = pass.size.width,
                height = pass.size.height,
                "filter initialized"
            );
        }

        if bound.reported_direction != Some(direction) {
            bound.filter.on_orientation_change(direction);
            bound.reported_direction = Some(direction);
        }

        match bound.filter.draw(gpu, pass) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: "camfan::filter", "filter draw failed, using pass-through: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use dpi::PhysicalSize;

    use super::*;
    use crate::engine::error::GpuError;
    use crate::engine::geometry::{DRAW_INDICES, IDENTITY_TEXTURE_COORDS, SHAPE_VERTICES};
    use crate::engine::rendering::{FramebufferId, HeadlessBackend, TextureId};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        journal: Journal,
        fail_init: bool,
    }

    impl Recording {
        fn boxed(name: &'static str, journal: &Journal) -> BoxedFilter<HeadlessBackend> {
            Box::new(Self {
                name,
                journal: journal.clone(),
                fail_init: false,
            })
        }

        fn log(&self, event: &str) {
            self.journal.lock().push(format!("{}:{event}", self.name));
        }
    }

    impl VideoFilter<HeadlessBackend> for Recording {
        fn initialize(
            &mut self,
            _gpu: &mut HeadlessBackend,
            _size: PhysicalSize<u32>,
        ) -> Result<(), GpuError> {
            self.log("init");
            if self.fail_init {
                Err(GpuError::ShaderCompile("broken".into()))
            } else {
                Ok(())
            }
        }

        fn on_orientation_change(&mut self, direction: DirectionFlags) {
            self.log(&format!("orient{:#x}", direction.bits()));
        }

        fn draw(&mut self, _gpu: &mut HeadlessBackend, _pass: &FilterPass<'_>) -> Result<(), GpuError> {
            self.log("draw");
            Ok(())
        }

        fn destroy(&mut self, _gpu: &mut HeadlessBackend) {
            self.log("destroy");
        }
    }

    fn pass() -> FilterPass<'static> {
        FilterPass {
            input_texture: TextureId(1),
            output_framebuffer: FramebufferId(2),
            shape: &SHAPE_VERTICES,
            coords: &IDENTITY_TEXTURE_COORDS,
            indices: &DRAW_INDICES,
            size: PhysicalSize::new(16, 16),
        }
    }

    fn render_once(slot: &FilterSlot<HeadlessBackend>, gpu: &mut HeadlessBackend) -> bool {
        let mut guard = slot
            .try_acquire_for(Duration::from_millis(3))
            .expect("slot is free");
        guard.render(gpu, DirectionFlags(0x20), &pass())
    }

    #[test]
    fn empty_slot_falls_back() {
        let slot = FilterSlot::<HeadlessBackend>::new();
        let mut gpu = HeadlessBackend::new();
        assert!(!render_once(&slot, &mut gpu));
    }

    #[test]
    fn replacement_destroys_old_before_new_initializes() {
        let journal = Journal::default();
        let slot = FilterSlot::new();
        let mut gpu = HeadlessBackend::new();

        slot.set(Some(Recording::boxed("a", &journal)));
        assert!(render_once(&slot, &mut gpu));
        assert!(render_once(&slot, &mut gpu));

        slot.set(Some(Recording::boxed("b", &journal)));
        assert!(render_once(&slot, &mut gpu));

        assert_eq!(
            *journal.lock(),
            vec![
                "a:init", "a:orient0x20", "a:draw", "a:draw", "a:destroy", "b:init",
                "b:orient0x20", "b:draw",
            ]
        );
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn never_bound_filter_gets_no_hooks() {
        let journal = Journal::default();
        let slot = FilterSlot::new();
        let mut gpu = HeadlessBackend::new();

        slot.set(Some(Recording::boxed("a", &journal)));
        slot.set(Some(Recording::boxed("b", &journal)));
        assert!(render_once(&slot, &mut gpu));

        assert_eq!(*journal.lock(), vec!["b:init", "b:orient0x20", "b:draw"]);
    }

    #[test]
    fn clearing_then_teardown_destroys_exactly_once() {
        let journal = Journal::default();
        let slot = FilterSlot::new();
        let mut gpu = HeadlessBackend::new();

        slot.set(Some(Recording::boxed("a", &journal)));
        assert!(render_once(&slot, &mut gpu));
        slot.set(None);
        slot.release_gpu(&mut gpu);
        slot.release_gpu(&mut gpu);

        assert_eq!(
            *journal.lock(),
            vec!["a:init", "a:orient0x20", "a:draw", "a:destroy"]
        );
    }

    #[test]
    fn teardown_then_reuse_reinitializes() {
        let journal = Journal::default();
        let slot = FilterSlot::new();
        let mut gpu = HeadlessBackend::new();

        slot.set(Some(Recording::boxed("a", &journal)));
        assert!(render_once(&slot, &mut gpu));
        slot.release_gpu(&mut gpu);
        assert!(render_once(&slot, &mut gpu));

        assert_eq!(
            *journal.lock(),
            vec![
                "a:init", "a:orient0x20", "a:draw", "a:destroy", "a:init", "a:orient0x20",
                "a:draw",
            ]
        );
    }

    #[test]
    fn failed_initialize_drops_filter() {
        let journal = Journal::default();
        let slot = FilterSlot::new();
        let mut gpu = HeadlessBackend::new();

        slot.set(Some(Box::new(Recording {
            name: "bad",
            journal: journal.clone(),
            fail_init: true,
        })));
        assert!(!render_once(&slot, &mut gpu));
        assert!(!slot.has_filter());
        assert_eq!(*journal.lock(), vec!["bad:init", "bad:destroy"]);
    }

    #[test]
    fn busy_slot_times_out() {
        let slot = Arc::new(FilterSlot::<HeadlessBackend>::new());
        let holder = slot.acquire();
        let slot_for_thread = slot.clone();
        let acquired = thread::spawn(move || {
            slot_for_thread
                .try_acquire_for(Duration::from_millis(3))
                .is_some()
        })
        .join()
        .unwrap();
        assert!(!acquired);
        drop(holder);
        assert!(slot.try_acquire_for(Duration::from_millis(3)).is_some());
    }
}
