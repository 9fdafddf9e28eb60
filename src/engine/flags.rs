//! ### English
//! Direction bitflags describing how the camera image must be rotated and mirrored before it
//! reaches the working framebuffer.
//!
//! The low nibble carries mirroring, the high nibble carries exactly one rotation.
//!
//! ### 中文
//! 方向位标志：描述相机画面在进入工作帧缓冲前需要的旋转与镜像。
//!
//! 低 4 位表示镜像，高 4 位表示（唯一的）旋转角度。
use serde::{Deserialize, Serialize};

/// ### English
/// Mirror left/right.
///
/// ### 中文
/// 左右镜像。
pub const FLAG_DIRECTION_FLIP_HORIZONTAL: u32 = 0x01;
/// ### English
/// Mirror top/bottom.
///
/// ### 中文
/// 上下镜像。
pub const FLAG_DIRECTION_FLIP_VERTICAL: u32 = 0x02;
pub const FLAG_DIRECTION_ROTATION_0: u32 = 0x10;
pub const FLAG_DIRECTION_ROTATION_90: u32 = 0x20;
pub const FLAG_DIRECTION_ROTATION_180: u32 = 0x40;
pub const FLAG_DIRECTION_ROTATION_270: u32 = 0x80;

const ROTATION_MASK: u32 = 0xF0;

/// ### English
/// Packed direction mode (`FLAG_DIRECTION_*` bits).
///
/// ### 中文
/// 打包后的方向模式（`FLAG_DIRECTION_*` 位）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectionFlags(pub u32);

impl DirectionFlags {
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn flips_horizontally(self) -> bool {
        self.0 & FLAG_DIRECTION_FLIP_HORIZONTAL != 0
    }

    #[inline]
    pub const fn flips_vertically(self) -> bool {
        self.0 & FLAG_DIRECTION_FLIP_VERTICAL != 0
    }

    /// ### English
    /// Number of clockwise quarter turns. When several rotation bits are set, the lowest wins;
    /// when none is set the image is not rotated.
    ///
    /// ### 中文
    /// 顺时针旋转的 90° 次数。若设置了多个旋转位，取最低位；未设置则不旋转。
    pub const fn quarter_turns(self) -> u32 {
        let rotation = self.0 & ROTATION_MASK;
        if rotation & FLAG_DIRECTION_ROTATION_0 != 0 {
            0
        } else if rotation & FLAG_DIRECTION_ROTATION_90 != 0 {
            1
        } else if rotation & FLAG_DIRECTION_ROTATION_180 != 0 {
            2
        } else if rotation & FLAG_DIRECTION_ROTATION_270 != 0 {
            3
        } else {
            0
        }
    }
}

impl From<u32> for DirectionFlags {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}
