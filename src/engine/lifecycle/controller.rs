//! ### English
//! [`VideoCore`]: serialized lifecycle transitions over the frame pipeline and the encoder.
//!
//! ### 中文
//! [`VideoCore`]：在帧管线与编码器之上串行化的生命周期切换。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dpi::PhysicalSize;
use parking_lot::{Mutex, RwLock};

use crate::engine::config::CoreParameters;
use crate::engine::error::{ContractViolation, Error, GpuError, Result};
use crate::engine::filter::{BoxedFilter, FilterGuard};
use crate::engine::geometry::CameraFacing;
use crate::engine::rendering::GpuBackend;
use crate::engine::runtime::{CameraFrame, FramePipeline, PipelineShared, PipelineStats};
use crate::engine::screenshot::ScreenshotCallback;

use super::drainer::OutputDrainer;
use super::encoder::{EncoderFormat, HardwareEncoder, PacketSink};

type BackendFactory<B> = Arc<dyn Fn() -> Result<B, GpuError> + Send + Sync>;
type EncoderFactory<E> = Box<dyn FnMut() -> Result<E> + Send>;

/// ### English
/// Observable lifecycle state. Preview and streaming toggle independently once prepared.
///
/// ### 中文
/// 可观察的生命周期状态。准备完成后，预览与推流可独立开关。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Prepared,
    PreviewActive,
    Streaming,
    PreviewAndStreaming,
}

impl LifecycleState {
    fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Prepared => "prepared",
            Self::PreviewActive => "previewing",
            Self::Streaming => "streaming",
            Self::PreviewAndStreaming => "previewing and streaming",
        }
    }
}

/// ### English
/// State guarded by the coarse lifecycle lock.
///
/// ### 中文
/// 由粗粒度生命周期锁保护的状态。
struct Controller<E> {
    encoder_factory: EncoderFactory<E>,
    encoder: Option<Arc<Mutex<E>>>,
    preview: bool,
    drainer: Option<OutputDrainer>,
}

impl<E: HardwareEncoder + 'static> Controller<E> {
    fn state(&self) -> LifecycleState {
        match (self.encoder.is_some(), self.preview, self.drainer.is_some()) {
            (false, _, _) => LifecycleState::Uninitialized,
            (true, false, false) => LifecycleState::Prepared,
            (true, true, false) => LifecycleState::PreviewActive,
            (true, false, true) => LifecycleState::Streaming,
            (true, true, true) => LifecycleState::PreviewAndStreaming,
        }
    }

    fn invalid(&self, operation: &'static str) -> Error {
        ContractViolation::InvalidTransition {
            operation,
            state: self.state().name(),
        }
        .into()
    }

    fn create_configured(&mut self, format: &EncoderFormat) -> Result<E> {
        let mut encoder = (self.encoder_factory)()?;
        if let Err(err) = encoder.configure(format) {
            if let Err(release) = encoder.release() {
                tracing::warn!(target: "camfan::lifecycle", "encoder release after failed configure: {release}");
            }
            return Err(err);
        }
        Ok(encoder)
    }

    /// ### English
    /// Creates and configures the encoder, retrying once with a fresh instance.
    ///
    /// ### 中文
    /// 创建并配置编码器；失败时用新实例重试一次。
    fn create_with_retry(&mut self, format: &EncoderFormat) -> Result<E> {
        match self.create_configured(format) {
            Ok(encoder) => Ok(encoder),
            Err(err) => {
                tracing::warn!(target: "camfan::lifecycle", "encoder configure failed, retrying once: {err}");
                self.create_configured(format)
            }
        }
    }
}

/// ### English
/// Outer controller of one camera-to-encoder-and-preview pipeline.
///
/// Lifecycle transitions (`prepare`, preview and streaming toggles, `teardown`) are serialized
/// under one lock. Frame notifications, filter swaps, screenshot requests and viewport
/// updates bypass that lock so they never wait on a transition in progress.
///
/// ### 中文
/// 单条"相机 → 编码器 + 预览"管线的外层控制器。
///
/// 生命周期切换（`prepare`、预览与推流开关、`teardown`）在同一把锁下串行执行。
/// 帧通知、滤镜替换、截图请求与视口更新绕过该锁，不会等待进行中的切换。
pub struct VideoCore<B, E>
where
    B: GpuBackend + 'static,
    E: HardwareEncoder<Surface = B::Surface> + 'static,
{
    /// ### English
    /// Parameters used for every pipeline this core spawns.
    ///
    /// ### 中文
    /// 本控制器创建的每条管线所用的参数。
    params: CoreParameters,
    format: EncoderFormat,
    /// ### English
    /// Producer-side state, created up front so a filter or screenshot set before `prepare`
    /// is picked up by the first pipeline.
    ///
    /// ### 中文
    /// 生产者侧状态；预先创建，使 `prepare` 之前设置的滤镜或截图请求能被第一条管线接收。
    shared: Arc<PipelineShared<B>>,
    backend_factory: BackendFactory<B>,
    front_facing: AtomicBool,
    /// ### English
    /// Running pipeline. Written only by `prepare`/`teardown` under the lifecycle lock.
    ///
    /// ### 中文
    /// 运行中的管线。仅由持有生命周期锁的 `prepare`/`teardown` 写入。
    pipeline: RwLock<Option<FramePipeline<B>>>,
    controller: Mutex<Controller<E>>,
}

impl<B, E> VideoCore<B, E>
where
    B: GpuBackend + 'static,
    E: HardwareEncoder<Surface = B::Surface> + 'static,
{
    /// ### English
    /// Creates an unprepared core.
    ///
    /// #### Parameters
    /// - `params`: Pipeline and encoder parameters; validated here.
    /// - `backend_factory`: Builds a GPU backend on each new render thread.
    /// - `encoder_factory`: Creates an unconfigured hardware encoder.
    ///
    /// ### 中文
    /// 创建一个尚未准备的控制器。
    ///
    /// #### 参数
    /// - `params`：管线与编码器参数；在此校验。
    /// - `backend_factory`：在每个新的渲染线程上构建 GPU 后端。
    /// - `encoder_factory`：创建一个未配置的硬件编码器。
    pub fn new(
        params: CoreParameters,
        backend_factory: impl Fn() -> Result<B, GpuError> + Send + Sync + 'static,
        encoder_factory: impl FnMut() -> Result<E> + Send + 'static,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            format: EncoderFormat::from_parameters(&params),
            params,
            shared: Arc::new(PipelineShared::default()),
            backend_factory: Arc::new(backend_factory),
            front_facing: AtomicBool::new(false),
            pipeline: RwLock::new(None),
            controller: Mutex::new(Controller {
                encoder_factory: Box::new(encoder_factory),
                encoder: None,
                preview: false,
                drainer: None,
            }),
        })
    }

    #[inline]
    pub fn params(&self) -> &CoreParameters {
        &self.params
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.lock().state()
    }

    /// ### English
    /// Creates and configures the encoder, then starts the render thread and its offscreen
    /// binding. `Uninitialized → Prepared`.
    ///
    /// ### 中文
    /// 创建并配置编码器，然后启动渲染线程及其离屏绑定。`Uninitialized → Prepared`。
    pub fn prepare(&self) -> Result<()> {
        let mut controller = self.controller.lock();
        if controller.encoder.is_some() {
            return Err(controller.invalid("prepare"));
        }

        let mut encoder = controller.create_with_retry(&self.format)?;

        // Any earlier render thread was joined by `teardown`.
        self.shared.rearm();

        let factory = self.backend_factory.clone();
        let pipeline = FramePipeline::spawn_with_shared(
            self.params.clone(),
            self.shared.clone(),
            move || factory(),
        )
        .and_then(|pipeline| pipeline.init().map(|()| pipeline));
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(err) => {
                if let Err(release) = encoder.release() {
                    tracing::warn!(target: "camfan::lifecycle", "encoder release failed: {release}");
                }
                return Err(err);
            }
        };

        *self.pipeline.write() = Some(pipeline);
        self.forward_facing();
        controller.encoder = Some(Arc::new(Mutex::new(encoder)));
        tracing::info!(target: "camfan::lifecycle", "prepared");
        Ok(())
    }

    fn not_prepared(&self, operation: &'static str) -> Error {
        ContractViolation::InvalidTransition {
            operation,
            state: LifecycleState::Uninitialized.name(),
        }
        .into()
    }

    /// ### English
    /// Attaches the preview surface. A second attach without a detach halts the pipeline.
    ///
    /// ### 中文
    /// 挂载预览 surface。未卸载就再次挂载会使管线停机。
    pub fn attach_preview(&self, surface: B::Surface, width: u32, height: u32) -> Result<()> {
        let mut controller = self.controller.lock();
        let pipeline = self.pipeline.read();
        let pipeline = pipeline
            .as_ref()
            .ok_or_else(|| self.not_prepared("attach_preview"))?;
        pipeline.attach_display(surface, PhysicalSize::new(width, height))?;
        controller.preview = true;
        tracing::info!(target: "camfan::lifecycle", width, height, "preview attached");
        Ok(())
    }

    pub fn detach_preview(&self) -> Result<()> {
        let mut controller = self.controller.lock();
        let pipeline = self.pipeline.read();
        let pipeline = pipeline
            .as_ref()
            .ok_or_else(|| self.not_prepared("detach_preview"))?;
        pipeline.detach_display()?;
        controller.preview = false;
        tracing::info!(target: "camfan::lifecycle", "preview detached");
        Ok(())
    }

    /// ### English
    /// Resizes the preview viewport; takes effect on the next drawn frame.
    ///
    /// ### 中文
    /// 调整预览视口；在下一帧绘制时生效。
    pub fn update_viewport(&self, width: u32, height: u32) {
        self.shared.viewport.store(PhysicalSize::new(width, height));
    }

    /// ### English
    /// Starts the encoder, binds its input surface and spawns the output drain thread.
    ///
    /// ### 中文
    /// 启动编码器、绑定其输入 surface，并创建输出 drain 线程。
    pub fn start_streaming(&self, sink: impl PacketSink) -> Result<()> {
        let mut controller = self.controller.lock();
        let Some(encoder) = controller.encoder.clone() else {
            return Err(controller.invalid("start_streaming"));
        };
        if controller.drainer.is_some() {
            return Err(controller.invalid("start_streaming"));
        }

        let surface = {
            let mut encoder = encoder.lock();
            if let Err(err) = encoder.start() {
                tracing::warn!(target: "camfan::lifecycle", "encoder start failed, reconfiguring once: {err}");
                encoder.configure(&self.format)?;
                encoder.start()?;
            }
            match encoder.input_surface() {
                Ok(surface) => surface,
                Err(err) => {
                    stop_encoder(&mut *encoder);
                    return Err(err);
                }
            }
        };

        let pipeline = self.pipeline.read();
        let pipeline = pipeline
            .as_ref()
            .ok_or_else(|| self.not_prepared("start_streaming"))?;
        if let Err(err) = pipeline.attach_encoder(surface) {
            stop_encoder(&mut *encoder.lock());
            return Err(err);
        }

        match OutputDrainer::spawn(encoder.clone(), sink) {
            Ok(drainer) => controller.drainer = Some(drainer),
            Err(err) => {
                if let Err(detach) = pipeline.detach_encoder() {
                    tracing::warn!(target: "camfan::lifecycle", "encoder detach failed: {detach}");
                }
                stop_encoder(&mut *encoder.lock());
                return Err(err);
            }
        }
        tracing::info!(target: "camfan::lifecycle", "streaming started");
        Ok(())
    }

    /// ### English
    /// Unbinds the encoder surface, joins the drain thread and stops the encoder.
    ///
    /// ### 中文
    /// 解绑编码器 surface、join drain 线程并停止编码器。
    pub fn stop_streaming(&self) -> Result<()> {
        let mut controller = self.controller.lock();
        let (Some(mut drainer), Some(encoder)) =
            (controller.drainer.take(), controller.encoder.clone())
        else {
            return Err(controller.invalid("stop_streaming"));
        };

        let detached = match self.pipeline.read().as_ref() {
            Some(pipeline) => pipeline.detach_encoder(),
            None => Ok(()),
        };
        drainer.stop();
        let stopped = encoder.lock().stop();
        tracing::info!(target: "camfan::lifecycle", "streaming stopped");
        detached.and(stopped)
    }

    /// ### English
    /// Selects the orientation table; `1` is the front camera, anything else the back one.
    ///
    /// ### 中文
    /// 选择方向表；`1` 为前置摄像头，其余为后置。
    pub fn set_camera_facing(&self, index: i32) {
        let facing = CameraFacing::from_index(index);
        self.front_facing
            .store(facing == CameraFacing::Front, Ordering::SeqCst);
        self.forward_facing();
    }

    fn forward_facing(&self) {
        let facing = if self.front_facing.load(Ordering::SeqCst) {
            CameraFacing::Front
        } else {
            CameraFacing::Back
        };
        if let Some(pipeline) = self.pipeline.read().as_ref()
            && let Err(err) = pipeline.set_camera_facing(facing)
        {
            tracing::warn!(target: "camfan::lifecycle", "camera facing not forwarded: {err}");
        }
    }

    /// ### English
    /// Publishes a camera frame. Frames arriving while unprepared are dropped.
    ///
    /// ### 中文
    /// 发布一帧相机画面。未准备时到达的帧会被丢弃。
    pub fn on_frame_available(&self, frame: CameraFrame) -> Result<()> {
        match self.pipeline.read().as_ref() {
            Some(pipeline) => pipeline.on_frame_available(frame),
            None => {
                tracing::trace!(target: "camfan::lifecycle", "frame dropped before prepare");
                Ok(())
            }
        }
    }

    pub fn set_camera_source_changed(&self) {
        self.shared.pending.reset();
    }

    pub fn set_filter(&self, filter: Option<BoxedFilter<B>>) {
        self.shared.filter.set(filter);
    }

    pub fn acquire_filter(&self) -> FilterGuard<'_, B> {
        self.shared.filter.acquire()
    }

    pub fn request_screenshot(&self, callback: ScreenshotCallback) {
        self.shared.screenshot.request(callback);
    }

    /// ### English
    /// Frames drawn per second, or `0.0` while unprepared.
    ///
    /// ### 中文
    /// 每秒绘制帧数；未准备时为 `0.0`。
    pub fn draw_frame_rate(&self) -> f32 {
        if self.pipeline.read().is_none() {
            return 0.0;
        }
        self.shared.meter.fps()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    /// ### English
    /// Blocks until the render thread has processed everything sent so far.
    ///
    /// ### 中文
    /// 阻塞直到渲染线程处理完此前发送的全部命令。
    pub fn sync(&self) -> Result<()> {
        match self.pipeline.read().as_ref() {
            Some(pipeline) => pipeline.sync(),
            None => Ok(()),
        }
    }

    pub fn halted(&self) -> Option<String> {
        self.shared.halted()
    }

    /// ### English
    /// Stops streaming, detaches the preview, uninitializes and joins the render thread, and
    /// releases the encoder. Failures along the way are logged; calling it again is a no-op.
    ///
    /// ### 中文
    /// 停止推流、卸载预览、反初始化并 join 渲染线程，最后释放编码器。
    /// 过程中的失败只记录日志；重复调用不做任何事。
    pub fn teardown(&self) {
        let mut controller = self.controller.lock();
        if controller.encoder.is_none() {
            return;
        }

        let pipeline = self.pipeline.write().take();
        if let Some(mut pipeline) = pipeline {
            if let Some(mut drainer) = controller.drainer.take() {
                if let Err(err) = pipeline.detach_encoder() {
                    tracing::warn!(target: "camfan::lifecycle", "teardown: {err}");
                }
                drainer.stop();
                if let Some(encoder) = &controller.encoder {
                    stop_encoder(&mut *encoder.lock());
                }
            }
            if controller.preview
                && let Err(err) = pipeline.detach_display()
            {
                tracing::warn!(target: "camfan::lifecycle", "teardown: {err}");
            }
            if let Err(err) = pipeline.uninit() {
                tracing::warn!(target: "camfan::lifecycle", "teardown: {err}");
            }
            pipeline.shutdown();
        }
        controller.preview = false;

        if let Some(encoder) = controller.encoder.take()
            && let Err(err) = encoder.lock().release()
        {
            tracing::warn!(target: "camfan::lifecycle", "encoder release failed: {err}");
        }
        tracing::info!(target: "camfan::lifecycle", "torn down");
    }
}

fn stop_encoder<E: HardwareEncoder>(encoder: &mut E) {
    if let Err(err) = encoder.stop() {
        tracing::warn!(target: "camfan::lifecycle", "encoder stop failed: {err}");
    }
}

impl<B, E> Drop for VideoCore<B, E>
where
    B: GpuBackend + 'static,
    E: HardwareEncoder<Surface = B::Surface> + 'static,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
