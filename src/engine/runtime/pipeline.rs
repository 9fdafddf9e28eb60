//! ### English
//! Owner handle of the render thread: spawns it, forwards commands, and joins it on drop.
//!
//! ### 中文
//! 渲染线程的持有句柄：负责创建线程、转发命令，并在 drop 时 join。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use dpi::PhysicalSize;

use crate::engine::config::CoreParameters;
use crate::engine::error::{Error, GpuError, Result};
use crate::engine::filter::{BoxedFilter, FilterGuard};
use crate::engine::geometry::CameraFacing;
use crate::engine::rendering::GpuBackend;
use crate::engine::screenshot::ScreenshotCallback;

use super::command::{Command, Reply};
use super::reply::ReplySlot;
use super::render_thread;
use super::shared::{CameraFrame, PipelineShared, PipelineStats};

/// ### English
/// Frame pipeline running on a dedicated render thread.
///
/// Lifecycle methods (`init`, `attach_*`, `detach_*`, `uninit`) block until the render thread
/// has processed them, in mailbox order. Frame notifications, filter swaps, screenshot
/// requests and viewport updates never block on the render thread.
///
/// ### 中文
/// 运行在独立渲染线程上的帧管线。
///
/// 生命周期方法（`init`、`attach_*`、`detach_*`、`uninit`）会阻塞，直到渲染线程按邮箱顺序
/// 处理完毕。帧通知、滤镜替换、截图请求与视口更新从不阻塞等待渲染线程。
pub struct FramePipeline<B: GpuBackend + 'static> {
    shared: Arc<PipelineShared<B>>,
    commands: channel::Sender<Command<B::Surface>>,
    thread: Option<thread::JoinHandle<()>>,
    thread_handle: thread::Thread,
    reply_timeout: Duration,
}

impl<B: GpuBackend + 'static> FramePipeline<B> {
    /// ### English
    /// Spawns the render thread and waits for `factory` to build the backend on it.
    ///
    /// #### Parameters
    /// - `params`: Pipeline parameters; `startup_timeout_ms` bounds every wait on the thread.
    /// - `factory`: Builds the backend on the render thread.
    ///
    /// ### 中文
    /// 创建渲染线程，并等待 `factory` 在该线程上构建后端。
    ///
    /// #### 参数
    /// - `params`：管线参数；`startup_timeout_ms` 限制对该线程的每次等待。
    /// - `factory`：在渲染线程上构建后端。
    pub fn spawn<F>(params: CoreParameters, factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<B, GpuError> + Send + 'static,
    {
        Self::spawn_with_shared(params, Arc::new(PipelineShared::default()), factory)
    }

    pub(crate) fn spawn_with_shared<F>(
        params: CoreParameters,
        shared: Arc<PipelineShared<B>>,
        factory: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<B, GpuError> + Send + 'static,
    {
        params.validate()?;
        let reply_timeout = params.startup_timeout();

        let (command_tx, command_rx) = channel::unbounded();
        let shared_for_thread = shared.clone();

        let startup = Arc::new(ReplySlot::new());
        let startup_for_thread = startup.clone();

        let thread = thread::Builder::new()
            .name("camfan-render".into())
            .spawn(move || {
                render_thread::run_render_thread(
                    factory,
                    params,
                    shared_for_thread,
                    command_rx,
                    startup_for_thread,
                );
            })
            .map_err(|err| Error::Halted(format!("failed to spawn render thread: {err}")))?;
        let thread_handle = thread.thread().clone();

        match startup.wait_for(reply_timeout) {
            Some(Ok(())) => Ok(Self {
                shared,
                commands: command_tx,
                thread: Some(thread),
                thread_handle,
                reply_timeout,
            }),
            Some(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            None => {
                let _ = command_tx.send(Command::Shutdown);
                thread_handle.unpark();
                let _ = thread.join();
                Err(Error::Timeout("render thread startup"))
            }
        }
    }

    #[inline]
    fn wake(&self) {
        if !self.shared.wake_pending.swap(true, Ordering::SeqCst) {
            self.thread_handle.unpark();
        }
    }

    fn send(&self, command: Command<B::Surface>) -> Result<()> {
        if self.thread.is_none() {
            return Err(Error::Halted("pipeline is shut down".into()));
        }
        self.commands
            .send(command)
            .map_err(|_| Error::Halted("render thread exited".into()))?;
        self.wake();
        Ok(())
    }

    /// ### English
    /// Sends a lifecycle command and waits for its answer.
    ///
    /// An unanswered command is still queued, so the caller can no longer tell which bindings
    /// the render thread holds. A timeout therefore halts the pipeline; the queued command is
    /// then refused and only shutdown is left, which releases whatever is bound.
    ///
    /// ### 中文
    /// 发送生命周期命令并等待应答。
    ///
    /// 未应答的命令仍在队列中，调用方无法再判断渲染线程持有哪些绑定。
    /// 因此超时会使管线停机；排队中的命令随后被拒绝，只剩 shutdown 可用，它会释放所有绑定。
    fn request(
        &self,
        what: &'static str,
        build: impl FnOnce(Reply) -> Command<B::Surface>,
    ) -> Result<()> {
        if let Some(reason) = self.shared.halted() {
            return Err(Error::Halted(reason));
        }
        let reply = Arc::new(ReplySlot::new());
        self.send(build(reply.clone()))?;
        match reply.wait_for(self.reply_timeout) {
            Some(result) => result,
            None => {
                tracing::error!(target: "camfan::scheduler", command = what, "no answer from render thread, halting");
                self.shared
                    .halt(format!("{what}: no answer within {:?}", self.reply_timeout));
                Err(Error::Timeout(what))
            }
        }
    }

    pub fn init(&self) -> Result<()> {
        self.request("init", |reply| Command::Init { reply })
    }

    pub fn uninit(&self) -> Result<()> {
        self.request("uninit", |reply| Command::Uninit { reply })
    }

    /// ### English
    /// Binds the preview surface; `size` becomes the initial viewport.
    ///
    /// ### 中文
    /// 绑定预览 surface；`size` 作为初始视口。
    pub fn attach_display(&self, surface: B::Surface, size: PhysicalSize<u32>) -> Result<()> {
        self.request("attach_display", |reply| Command::AttachDisplay {
            surface,
            size,
            reply,
        })
    }

    pub fn detach_display(&self) -> Result<()> {
        self.request("detach_display", |reply| Command::DetachDisplay { reply })
    }

    pub fn attach_encoder(&self, surface: B::Surface) -> Result<()> {
        self.request("attach_encoder", |reply| Command::AttachEncoder {
            surface,
            reply,
        })
    }

    pub fn detach_encoder(&self) -> Result<()> {
        self.request("detach_encoder", |reply| Command::DetachEncoder { reply })
    }

    /// ### English
    /// Waits until every command sent before this call has been processed.
    ///
    /// ### 中文
    /// 等待本次调用之前发送的所有命令处理完毕。
    pub fn sync(&self) -> Result<()> {
        self.request("barrier", |reply| Command::Barrier { reply })
    }

    pub fn set_camera_facing(&self, facing: CameraFacing) -> Result<()> {
        self.send(Command::SetCameraFacing(facing))
    }

    /// ### English
    /// Publishes the latest camera frame and schedules a draw.
    ///
    /// ### 中文
    /// 发布最新相机帧并调度一次绘制。
    pub fn on_frame_available(&self, frame: CameraFrame) -> Result<()> {
        self.shared.camera_frame.store_value(frame);
        self.shared.pending.increment();
        self.send(Command::FrameAvailable)
    }

    /// ### English
    /// The capture collaborator switched texture source; pending notifications are forgotten.
    ///
    /// ### 中文
    /// 采集方切换了纹理源；遗忘所有待处理通知。
    pub fn set_camera_source_changed(&self) {
        self.shared.pending.reset();
    }

    #[inline]
    pub fn update_viewport(&self, size: PhysicalSize<u32>) {
        self.shared.viewport.store(size);
    }

    #[inline]
    pub fn viewport(&self) -> PhysicalSize<u32> {
        self.shared.viewport.load()
    }

    pub fn set_filter(&self, filter: Option<BoxedFilter<B>>) {
        self.shared.filter.set(filter);
    }

    /// ### English
    /// Exclusive access to the active filter; the renderer passes through while it is held.
    ///
    /// ### 中文
    /// 独占访问活动滤镜；持有期间渲染线程以直通方式绘制。
    pub fn acquire_filter(&self) -> FilterGuard<'_, B> {
        self.shared.filter.acquire()
    }

    pub fn request_screenshot(&self, callback: ScreenshotCallback) {
        self.shared.screenshot.request(callback);
    }

    #[inline]
    pub fn draw_frame_rate(&self) -> f32 {
        self.shared.meter.fps()
    }

    #[inline]
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    #[inline]
    pub fn pending_frames(&self) -> u64 {
        self.shared.pending.load()
    }

    /// ### English
    /// Reason of the fatal error that halted the render thread, if any.
    ///
    /// ### 中文
    /// 使渲染线程停机的致命错误原因（若有）。
    pub fn halted(&self) -> Option<String> {
        self.shared.halted()
    }

    /// ### English
    /// Stops the render thread after it releases every binding, and joins it.
    ///
    /// ### 中文
    /// 在渲染线程释放所有绑定后停止并 join 它。
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        self.thread_handle.unpark();
        if thread.join().is_err() {
            tracing::error!(target: "camfan::scheduler", "render thread panicked");
        }
    }
}

impl<B: GpuBackend + 'static> Drop for FramePipeline<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
