//! ### English
//! GPU-less backend that allocates object ids, enforces "make current before use", and records
//! every call into a shared [`GpuLedger`].
//!
//! Used for dry runs without a GPU and by the test-suite to observe draw order, presents,
//! readbacks and object lifetimes.
//!
//! ### 中文
//! 无 GPU 的后端：分配对象 id、强制“先 make current 再使用”，并把每次调用记录进共享的
//! [`GpuLedger`]。
//!
//! 用于无 GPU 的试运行，也供测试观察绘制顺序、present、读回与对象生命周期。

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use dpi::PhysicalSize;
use parking_lot::Mutex;

use crate::engine::error::GpuError;

use super::backend::{
    ContextId, DrawTarget, FramebufferId, GpuBackend, ProgramId, ProgramKind, QuadDraw,
    QuadProgram, RenderTarget, SampledTexture, TextureId,
};

/// ### English
/// Named stand-in for a platform drawable.
///
/// ### 中文
/// 平台可绘制对象的具名替身。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessSurface {
    pub label: String,
}

impl HeadlessSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub context: ContextId,
    /// ### English
    /// Label of the surface drawn to, `None` for framebuffer draws.
    ///
    /// ### 中文
    /// 绘制到的 surface 标签；绘制到帧缓冲时为 `None`。
    pub surface: Option<String>,
    pub program: ProgramKind,
    pub target: DrawTarget,
    pub source: SampledTexture,
    pub coords: Vec<f32>,
    pub viewport: PhysicalSize<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GpuEvent {
    ContextCreated {
        context: ContextId,
        shared_with: Option<ContextId>,
        surface: Option<String>,
    },
    ContextDestroyed(ContextId),
    MakeCurrent(ContextId),
    ProgramCompiled(ProgramId, ProgramKind),
    ProgramDeleted(ProgramId),
    TargetCreated(RenderTarget),
    TargetDeleted(RenderTarget),
    Draw(DrawRecord),
    StageFinished(ContextId),
    ReadPixels {
        context: ContextId,
        size: PhysicalSize<u32>,
    },
    Present {
        context: ContextId,
        surface: String,
        timestamp_ns: Option<i64>,
    },
}

/// ### English
/// Events kept by a [`GpuLedger`]; older ones are evicted so long dry runs stay bounded.
///
/// ### 中文
/// [`GpuLedger`] 保留的事件数上限；更早的事件会被淘汰，长时间试运行的内存保持有界。
pub const EVENT_LOG_CAPACITY: usize = 16_384;

#[derive(Default)]
struct EventLog {
    events: VecDeque<GpuEvent>,
    evicted: u64,
}

impl EventLog {
    fn push(&mut self, event: GpuEvent) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    fn iter(&self) -> impl Iterator<Item = &GpuEvent> {
        self.events.iter()
    }

    fn clear(&mut self) {
        self.events.clear();
    }
}

#[derive(Default)]
struct LedgerState {
    events: EventLog,
    contexts: BTreeMap<ContextId, Option<String>>,
    programs: BTreeSet<u32>,
    framebuffers: BTreeSet<u32>,
    textures: BTreeSet<u32>,
    fail_readbacks: u32,
    fail_presents: bool,
    fail_compile: Option<ProgramKind>,
}

/// ### English
/// Shared, cloneable view of what a [`HeadlessBackend`] did.
///
/// ### 中文
/// [`HeadlessBackend`] 行为记录的共享、可克隆视图。
#[derive(Clone, Default)]
pub struct GpuLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl GpuLedger {
    pub fn events(&self) -> Vec<GpuEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    /// ### English
    /// Events dropped from the front of the log since it was created.
    ///
    /// ### 中文
    /// 自创建以来从日志头部淘汰的事件数。
    pub fn evicted_events(&self) -> u64 {
        self.state.lock().events.evicted
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                GpuEvent::Draw(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// ### English
    /// Draws that landed on the surface labelled `label`.
    ///
    /// ### 中文
    /// 落在标签为 `label` 的 surface 上的绘制。
    pub fn surface_draws(&self, label: &str) -> Vec<DrawRecord> {
        self.draws()
            .into_iter()
            .filter(|record| record.surface.as_deref() == Some(label))
            .collect()
    }

    /// ### English
    /// Presentation timestamps recorded for the surface labelled `label`, in order.
    ///
    /// ### 中文
    /// 标签为 `label` 的 surface 上按顺序记录的呈现时间戳。
    pub fn presents(&self, label: &str) -> Vec<Option<i64>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                GpuEvent::Present {
                    surface,
                    timestamp_ns,
                    ..
                } if surface == label => Some(*timestamp_ns),
                _ => None,
            })
            .collect()
    }

    pub fn readbacks(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, GpuEvent::ReadPixels { .. }))
            .count()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    /// ### English
    /// Contexts, programs, framebuffers and textures not yet destroyed.
    ///
    /// ### 中文
    /// 尚未销毁的上下文、程序、帧缓冲与纹理总数。
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.contexts.len() + state.programs.len() + state.framebuffers.len() + state.textures.len()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// ### English
    /// Makes the next `count` pixel readbacks fail.
    ///
    /// ### 中文
    /// 让接下来 `count` 次像素读回失败。
    pub fn fail_next_readbacks(&self, count: u32) {
        self.state.lock().fail_readbacks = count;
    }

    pub fn fail_presents(&self, fail: bool) {
        self.state.lock().fail_presents = fail;
    }

    /// ### English
    /// Makes compiling programs of `kind` fail until cleared with `None`.
    ///
    /// ### 中文
    /// 使 `kind` 类型的程序编译失败，直到以 `None` 清除。
    pub fn fail_compile(&self, kind: Option<ProgramKind>) {
        self.state.lock().fail_compile = kind;
    }
}

/// ### English
/// Backend that behaves like one GPU device with a shared object namespace, without a GPU.
///
/// ### 中文
/// 行为上等同于一个共享对象命名空间的 GPU 设备、但不依赖 GPU 的后端。
pub struct HeadlessBackend {
    ledger: GpuLedger,
    current: Option<ContextId>,
    next_context: u32,
    next_object: u32,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_ledger(GpuLedger::default())
    }

    pub fn with_ledger(ledger: GpuLedger) -> Self {
        Self {
            ledger,
            current: None,
            next_context: 1,
            next_object: 1,
        }
    }

    pub fn ledger(&self) -> GpuLedger {
        self.ledger.clone()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_object;
        self.next_object += 1;
        id
    }

    fn current(&self) -> Result<ContextId, GpuError> {
        self.current.ok_or(GpuError::NoCurrentContext)
    }

    fn record(&self, event: GpuEvent) {
        self.ledger.state.lock().events.push(event);
    }
}

impl GpuBackend for HeadlessBackend {
    type Surface = HeadlessSurface;

    fn create_offscreen_context(&mut self) -> Result<ContextId, GpuError> {
        let context = ContextId(self.next_context);
        self.next_context += 1;
        let mut state = self.ledger.state.lock();
        state.contexts.insert(context, None);
        state.events.push(GpuEvent::ContextCreated {
            context,
            shared_with: None,
            surface: None,
        });
        Ok(context)
    }

    fn create_surface_context(
        &mut self,
        share_with: ContextId,
        surface: HeadlessSurface,
    ) -> Result<ContextId, GpuError> {
        let context = ContextId(self.next_context);
        let mut state = self.ledger.state.lock();
        if !state.contexts.contains_key(&share_with) {
            return Err(GpuError::UnknownContext(share_with));
        }
        self.next_context += 1;
        state.contexts.insert(context, Some(surface.label.clone()));
        state.events.push(GpuEvent::ContextCreated {
            context,
            shared_with: Some(share_with),
            surface: Some(surface.label),
        });
        Ok(context)
    }

    fn destroy_context(&mut self, context: ContextId) -> Result<(), GpuError> {
        let mut state = self.ledger.state.lock();
        if state.contexts.remove(&context).is_none() {
            return Err(GpuError::UnknownContext(context));
        }
        state.events.push(GpuEvent::ContextDestroyed(context));
        if self.current == Some(context) {
            self.current = None;
        }
        Ok(())
    }

    fn make_current(&mut self, context: ContextId) -> Result<(), GpuError> {
        if !self.ledger.state.lock().contexts.contains_key(&context) {
            return Err(GpuError::UnknownContext(context));
        }
        if self.current != Some(context) {
            self.current = Some(context);
            self.record(GpuEvent::MakeCurrent(context));
        }
        Ok(())
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<QuadProgram, GpuError> {
        self.current()?;
        if self.ledger.state.lock().fail_compile.as_ref() == Some(&kind) {
            return Err(GpuError::ShaderCompile(format!("injected failure for {kind:?}")));
        }
        let id = ProgramId(self.allocate());
        let mut state = self.ledger.state.lock();
        state.programs.insert(id.0);
        state.events.push(GpuEvent::ProgramCompiled(id, kind.clone()));
        Ok(QuadProgram {
            id,
            kind,
            position_location: 0,
            tex_coord_location: 1,
            texture_location: 0,
        })
    }

    fn delete_program(&mut self, program: &QuadProgram) {
        let mut state = self.ledger.state.lock();
        if state.programs.remove(&program.id.0) {
            state.events.push(GpuEvent::ProgramDeleted(program.id));
        }
    }

    fn create_render_target(&mut self, size: PhysicalSize<u32>) -> Result<RenderTarget, GpuError> {
        self.current()?;
        let target = RenderTarget {
            framebuffer: FramebufferId(self.allocate()),
            texture: TextureId(self.allocate()),
            size,
        };
        let mut state = self.ledger.state.lock();
        state.framebuffers.insert(target.framebuffer.0);
        state.textures.insert(target.texture.0);
        state.events.push(GpuEvent::TargetCreated(target));
        Ok(target)
    }

    fn delete_render_target(&mut self, target: &RenderTarget) {
        let mut state = self.ledger.state.lock();
        let removed_fb = state.framebuffers.remove(&target.framebuffer.0);
        let removed_tex = state.textures.remove(&target.texture.0);
        if removed_fb || removed_tex {
            state.events.push(GpuEvent::TargetDeleted(*target));
        }
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError> {
        let context = self.current()?;
        let mut state = self.ledger.state.lock();
        if !state.programs.contains(&draw.program.id.0) {
            return Err(GpuError::ProgramLink(format!(
                "program {:?} is not live",
                draw.program.id
            )));
        }
        let surface = match draw.target {
            DrawTarget::Surface => match state.contexts.get(&context).cloned().flatten() {
                Some(label) => Some(label),
                None => {
                    return Err(GpuError::Unsupported(
                        "surface draw on a context without a surface".into(),
                    ));
                }
            },
            DrawTarget::Framebuffer(framebuffer) => {
                if !state.framebuffers.contains(&framebuffer.0) {
                    return Err(GpuError::IncompleteFramebuffer(framebuffer.0));
                }
                None
            }
        };
        state.events.push(GpuEvent::Draw(DrawRecord {
            context,
            surface,
            program: draw.program.kind.clone(),
            target: draw.target,
            source: draw.source,
            coords: draw.coords.to_vec(),
            viewport: draw.viewport,
        }));
        Ok(())
    }

    fn finish_stage(&mut self) {
        if let Some(context) = self.current {
            self.record(GpuEvent::StageFinished(context));
        }
    }

    fn read_pixels(&mut self, size: PhysicalSize<u32>) -> Result<Vec<u8>, GpuError> {
        let context = self.current()?;
        let mut state = self.ledger.state.lock();
        state.events.push(GpuEvent::ReadPixels { context, size });
        if state.fail_readbacks > 0 {
            state.fail_readbacks -= 1;
            return Err(GpuError::Readback("injected readback failure".into()));
        }
        // Row index in red, column index in green, bottom row first like a GL readback.
        let mut pixels = Vec::with_capacity(size.width as usize * size.height as usize * 4);
        for row in 0..size.height {
            for column in 0..size.width {
                pixels.extend_from_slice(&[row as u8, column as u8, 0, 0xFF]);
            }
        }
        Ok(pixels)
    }

    fn present(&mut self, context: ContextId, timestamp_ns: Option<i64>) -> Result<(), GpuError> {
        let mut state = self.ledger.state.lock();
        let Some(Some(surface)) = state.contexts.get(&context).cloned() else {
            return Err(GpuError::Present(format!("{context:?} has no surface")));
        };
        if state.fail_presents {
            return Err(GpuError::Present(format!("injected failure on {surface}")));
        }
        state.events.push(GpuEvent::Present {
            context,
            surface,
            timestamp_ns,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rendering::backend::TextureTarget;

    #[test]
    fn requires_current_context() {
        let mut gpu = HeadlessBackend::new();
        assert_eq!(
            gpu.compile_program(ProgramKind::Identity),
            Err(GpuError::NoCurrentContext)
        );
        let root = gpu.create_offscreen_context().unwrap();
        gpu.make_current(root).unwrap();
        assert!(gpu.compile_program(ProgramKind::Identity).is_ok());
    }

    #[test]
    fn tracks_live_objects() {
        let mut gpu = HeadlessBackend::new();
        let ledger = gpu.ledger();
        let root = gpu.create_offscreen_context().unwrap();
        gpu.make_current(root).unwrap();
        let program = gpu
            .compile_program(ProgramKind::CameraSample(TextureTarget::External))
            .unwrap();
        let target = gpu.create_render_target(PhysicalSize::new(4, 4)).unwrap();
        let display = gpu
            .create_surface_context(root, HeadlessSurface::new("display"))
            .unwrap();
        assert_eq!(ledger.live_objects(), 5);

        gpu.destroy_context(display).unwrap();
        gpu.delete_render_target(&target);
        gpu.delete_program(&program);
        gpu.destroy_context(root).unwrap();
        assert_eq!(ledger.live_objects(), 0);
        assert_eq!(gpu.destroy_context(root), Err(GpuError::UnknownContext(root)));
    }

    #[test]
    fn present_requires_surface() {
        let mut gpu = HeadlessBackend::new();
        let ledger = gpu.ledger();
        let root = gpu.create_offscreen_context().unwrap();
        assert!(matches!(gpu.present(root, None), Err(GpuError::Present(_))));

        let encoder = gpu
            .create_surface_context(root, HeadlessSurface::new("encoder"))
            .unwrap();
        gpu.present(encoder, Some(42)).unwrap();
        assert_eq!(ledger.presents("encoder"), vec![Some(42)]);

        ledger.fail_presents(true);
        assert!(gpu.present(encoder, Some(43)).is_err());
    }

    #[test]
    fn event_log_keeps_the_most_recent_events() {
        let mut gpu = HeadlessBackend::new();
        let ledger = gpu.ledger();
        let root = gpu.create_offscreen_context().unwrap();
        let encoder = gpu
            .create_surface_context(root, HeadlessSurface::new("encoder"))
            .unwrap();
        let before = ledger.events().len();
        let presents = EVENT_LOG_CAPACITY as i64;
        for timestamp_ns in 0..presents {
            gpu.present(encoder, Some(timestamp_ns)).unwrap();
        }

        assert_eq!(ledger.events().len(), EVENT_LOG_CAPACITY);
        assert_eq!(ledger.evicted_events(), before as u64);
        assert_eq!(ledger.presents("encoder").last(), Some(&Some(presents - 1)));
        assert_eq!(ledger.live_contexts(), 2);
    }
}
