//! ### English
//! Mailbox protocol between producer threads and the render thread.
//!
//! ### 中文
//! 生产者线程与渲染线程之间的邮箱协议。

use std::sync::Arc;

use dpi::PhysicalSize;

use crate::engine::error::Error;
use crate::engine::geometry::CameraFacing;

use super::reply::ReplySlot;

/// ### English
/// Answer slot for a lifecycle command; the caller blocks on it.
///
/// ### 中文
/// 生命周期命令的应答槽；调用方阻塞等待它。
pub(super) type Reply = Arc<ReplySlot<Result<(), Error>>>;

/// ### English
/// Commands processed strictly in arrival order by the render thread.
///
/// ### 中文
/// 由渲染线程严格按到达顺序处理的命令。
pub(super) enum Command<S> {
    /// ### English
    /// Creates the offscreen context, the camera/identity programs and both framebuffers.
    ///
    /// ### 中文
    /// 创建离屏上下文、相机/直通程序以及两个帧缓冲。
    Init { reply: Reply },
    Uninit { reply: Reply },
    AttachDisplay {
        surface: S,
        size: PhysicalSize<u32>,
        reply: Reply,
    },
    DetachDisplay { reply: Reply },
    AttachEncoder { surface: S, reply: Reply },
    DetachEncoder { reply: Reply },
    /// ### English
    /// Reselects the orientation table.
    ///
    /// ### 中文
    /// 重新选择方向表。
    SetCameraFacing(CameraFacing),
    /// ### English
    /// One camera frame notification; coalesced against the pending count.
    ///
    /// ### 中文
    /// 一次相机帧通知；依据待处理计数进行合并。
    FrameAvailable,
    /// ### English
    /// Answered once every earlier command has been processed.
    ///
    /// ### 中文
    /// 在此前所有命令都处理完毕后应答。
    Barrier { reply: Reply },
    Shutdown,
}

impl<S> Command<S> {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Uninit { .. } => "uninit",
            Self::AttachDisplay { .. } => "attach_display",
            Self::DetachDisplay { .. } => "detach_display",
            Self::AttachEncoder { .. } => "attach_encoder",
            Self::DetachEncoder { .. } => "detach_encoder",
            Self::SetCameraFacing(_) => "set_camera_facing",
            Self::FrameAvailable => "frame_available",
            Self::Barrier { .. } => "barrier",
            Self::Shutdown => "shutdown",
        }
    }

    /// ### English
    /// Detaches the reply slot, if the command carries one.
    ///
    /// ### 中文
    /// 取出命令携带的应答槽（若有）。
    pub(super) fn into_reply(self) -> Option<Reply> {
        match self {
            Self::Init { reply }
            | Self::Uninit { reply }
            | Self::AttachDisplay { reply, .. }
            | Self::DetachDisplay { reply }
            | Self::AttachEncoder { reply, .. }
            | Self::DetachEncoder { reply }
            | Self::Barrier { reply } => Some(reply),
            Self::SetCameraFacing(_) | Self::FrameAvailable | Self::Shutdown => None,
        }
    }
}
