//! ### English
//! Boundary of the hardware encoder collaborator.
//!
//! ### 中文
//! 硬件编码器协作方的边界。

use std::time::Duration;

use crossbeam_channel as channel;
use serde::Serialize;

use crate::engine::config::CoreParameters;
use crate::engine::error::Result;

/// ### English
/// Output format handed to [`HardwareEncoder::configure`].
///
/// ### 中文
/// 传给 [`HardwareEncoder::configure`] 的输出格式。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EncoderFormat {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    /// ### English
    /// Seconds between key frames.
    ///
    /// ### 中文
    /// 关键帧间隔（秒）。
    pub i_frame_interval: u32,
}

impl EncoderFormat {
    pub const AVC_MIME: &'static str = "video/avc";

    pub fn from_parameters(params: &CoreParameters) -> Self {
        Self {
            mime: Self::AVC_MIME,
            width: params.video_width,
            height: params.video_height,
            bitrate: params.bitrate,
            frame_rate: params.frame_rate,
            i_frame_interval: params.i_frame_interval,
        }
    }
}

/// ### English
/// One unit of encoder output.
///
/// ### 中文
/// 编码器的一个输出单元。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub pts_us: i64,
    pub keyframe: bool,
    /// ### English
    /// Codec-specific data (SPS/PPS) rather than a picture.
    ///
    /// ### 中文
    /// 编解码器配置数据（SPS/PPS），而非画面。
    pub codec_config: bool,
}

/// ### English
/// Hardware video encoder driven by [`VideoCore`](super::VideoCore).
///
/// The core never encodes; it only draws into [`input_surface`](Self::input_surface) and
/// drains packets on a dedicated thread.
///
/// ### 中文
/// 由 [`VideoCore`](super::VideoCore) 驱动的硬件视频编码器。
///
/// 核心从不编码；只向 [`input_surface`](Self::input_surface) 绘制，并在独立线程上 drain 输出。
pub trait HardwareEncoder: Send {
    /// ### English
    /// Surface type the pipeline draws into; matches the GPU backend's surface type.
    ///
    /// ### 中文
    /// 管线绘制目标的 surface 类型；与 GPU 后端的 surface 类型一致。
    type Surface;

    fn configure(&mut self, format: &EncoderFormat) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;

    /// ### English
    /// Input surface of a configured encoder.
    ///
    /// ### 中文
    /// 已配置编码器的输入 surface。
    fn input_surface(&mut self) -> Result<Self::Surface>;

    /// ### English
    /// Waits up to `timeout` for the next output packet.
    ///
    /// ### 中文
    /// 最多等待 `timeout` 以取得下一个输出包。
    fn drain_output(&mut self, timeout: Duration) -> Result<Option<EncodedPacket>>;
}

/// ### English
/// Receiver of encoded packets (muxer, network sender, file writer...).
///
/// ### 中文
/// 编码包的接收方（封装器、网络发送端、文件写入等）。
pub trait PacketSink: Send + 'static {
    fn on_packet(&mut self, packet: EncodedPacket);
}

impl PacketSink for channel::Sender<EncodedPacket> {
    fn on_packet(&mut self, packet: EncodedPacket) {
        if let Err(channel::SendError(packet)) = self.send(packet) {
            tracing::warn!(
                target: "camfan::sender",
                pts_us = packet.pts_us,
                bytes = packet.data.len(),
                "packet dropped, receiver is gone"
            );
        }
    }
}
