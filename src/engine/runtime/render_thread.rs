//! ### English
//! Dedicated render thread: builds the backend, answers the startup handshake, then drains the
//! mailbox and parks until woken.
//!
//! ### 中文
//! 独立渲染线程：构建后端、应答启动握手，随后 drain 邮箱并 park 等待唤醒。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use crossbeam_channel::{self as channel, TryRecvError};

use crate::engine::config::CoreParameters;
use crate::engine::error::{Error, GpuError};
use crate::engine::rendering::GpuBackend;

use super::command::Command;
use super::reply::ReplySlot;
use super::scheduler::FrameScheduler;
use super::shared::PipelineShared;

/// ### English
/// Render thread entry. Returns on `Shutdown`, when every sender is gone, or when the backend
/// cannot be created.
///
/// ### 中文
/// 渲染线程入口。收到 `Shutdown`、所有发送端都已释放、或后端创建失败时返回。
pub(super) fn run_render_thread<B, F>(
    factory: F,
    params: CoreParameters,
    shared: Arc<PipelineShared<B>>,
    commands: channel::Receiver<Command<B::Surface>>,
    startup: Arc<ReplySlot<Result<(), Error>>>,
) where
    B: GpuBackend,
    F: FnOnce() -> Result<B, GpuError>,
{
    let gpu = match factory() {
        Ok(gpu) => gpu,
        Err(err) => {
            tracing::error!(target: "camfan::scheduler", "GPU backend creation failed: {err}");
            let _ = startup.answer(Err(err.into()));
            return;
        }
    };
    let mut scheduler = FrameScheduler::new(gpu, params, shared.clone());
    let _ = startup.answer(Ok(()));
    tracing::debug!(target: "camfan::scheduler", "render thread started");

    loop {
        shared.wake_pending.store(false, Ordering::SeqCst);

        loop {
            match commands.try_recv() {
                Ok(Command::Shutdown) => {
                    tracing::debug!(target: "camfan::scheduler", "render thread shutting down");
                    scheduler.release_all();
                    return;
                }
                Ok(command) => dispatch(&mut scheduler, &shared, command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    scheduler.release_all();
                    return;
                }
            }
        }

        thread::park();
    }
}

fn dispatch<B: GpuBackend>(
    scheduler: &mut FrameScheduler<B>,
    shared: &PipelineShared<B>,
    command: Command<B::Surface>,
) {
    let name = command.name();

    if let Some(reason) = shared.halted() {
        if let Some(reply) = command.into_reply() {
            let _ = reply.answer(Err(Error::Halted(reason)));
        }
        return;
    }

    let (result, reply) = match command {
        Command::Init { reply } => (scheduler.init(), Some(reply)),
        Command::Uninit { reply } => (scheduler.uninit(), Some(reply)),
        Command::AttachDisplay {
            surface,
            size,
            reply,
        } => (scheduler.attach_display(surface, size), Some(reply)),
        Command::DetachDisplay { reply } => (scheduler.detach_display(), Some(reply)),
        Command::AttachEncoder { surface, reply } => {
            (scheduler.attach_encoder(surface), Some(reply))
        }
        Command::DetachEncoder { reply } => (scheduler.detach_encoder(), Some(reply)),
        Command::SetCameraFacing(facing) => {
            scheduler.set_camera_facing(facing);
            (Ok(()), None)
        }
        Command::FrameAvailable => (scheduler.frame_available().map(|_| ()), None),
        Command::Barrier { reply } => (Ok(()), Some(reply)),
        Command::Shutdown => return,
    };

    if let Err(err) = &result {
        if err.is_fatal() {
            tracing::error!(target: "camfan::scheduler", command = name, "fatal error, halting: {err}");
            shared.halt(format!("{name}: {err}"));
        } else {
            tracing::warn!(target: "camfan::scheduler", command = name, "command failed: {err}");
        }
    } else if reply.is_some() {
        tracing::debug!(target: "camfan::scheduler", command = name, "command processed");
    }

    if let Some(reply) = reply {
        let _ = reply.answer(result);
    }
}
