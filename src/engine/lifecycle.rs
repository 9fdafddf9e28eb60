//! ### English
//! Outer lifecycle controller: ties the frame pipeline to the hardware encoder and its output
//! drain thread.
//!
//! ### 中文
//! 外层生命周期控制器：把帧管线与硬件编码器及其输出 drain 线程串联起来。

mod controller;
mod drainer;
mod encoder;

pub use controller::{LifecycleState, VideoCore};
pub use encoder::{EncodedPacket, EncoderFormat, HardwareEncoder, PacketSink};
