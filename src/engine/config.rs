//! ### English
//! Pipeline parameters, loadable from JSON.
//!
//! ### 中文
//! 管线参数，可从 JSON 加载。

use std::path::Path;
use std::time::Duration;

use dpi::PhysicalSize;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::flags::{
    DirectionFlags, FLAG_DIRECTION_FLIP_HORIZONTAL, FLAG_DIRECTION_ROTATION_90,
    FLAG_DIRECTION_ROTATION_270,
};

/// ### English
/// GLSL flavour used for the built-in quad programs.
///
/// ### 中文
/// 内置四边形着色器使用的 GLSL 方言。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderDialect {
    /// ### English
    /// OpenGL ES 2/3 (`#version 100`), the mobile default.
    ///
    /// ### 中文
    /// OpenGL ES 2/3（`#version 100`），移动端默认。
    #[default]
    Gles2,
    /// ### English
    /// Desktop core profile (`#version 330 core`).
    ///
    /// ### 中文
    /// 桌面 core profile（`#version 330 core`）。
    Glsl330,
}

/// ### English
/// Texture target the capture collaborator publishes camera frames on.
///
/// ### 中文
/// 采集方发布相机帧所用的纹理目标。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraTextureTarget {
    #[default]
    External,
    Texture2d,
}

/// ### English
/// All tunables of the pipeline and the lifecycle controller.
///
/// Every field has a default, so a partial JSON document (or `{}`) is valid input.
///
/// ### 中文
/// 管线与生命周期控制器的全部可调参数。
///
/// 每个字段都有默认值，因此部分 JSON（或 `{}`）也是合法输入。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreParameters {
    /// ### English
    /// Encode resolution; also the size of the sampling and working framebuffers.
    ///
    /// ### 中文
    /// 编码分辨率；同时也是采样帧缓冲与工作帧缓冲的尺寸。
    pub video_width: u32,
    pub video_height: u32,
    pub front_camera_direction_mode: DirectionFlags,
    pub back_camera_direction_mode: DirectionFlags,
    /// ### English
    /// Symmetric crop applied when sampling the camera texture.
    /// Positive crops along v, negative crops along u; the magnitude is the total cropped share.
    ///
    /// ### 中文
    /// 采样相机纹理时的对称裁剪。
    /// 正值沿 v 轴裁剪，负值沿 u 轴裁剪；绝对值为裁掉的总比例。
    pub crop_ratio: f32,
    /// ### English
    /// How long the renderer waits for the filter slot before falling back to pass-through.
    ///
    /// ### 中文
    /// 渲染线程等待滤镜槽的最长时间；超时则回退为直通绘制。
    pub filter_lock_toleration_ms: u64,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub i_frame_interval: u32,
    pub shader_dialect: ShaderDialect,
    pub camera_texture_target: CameraTextureTarget,
    pub startup_timeout_ms: u64,
}

impl Default for CoreParameters {
    fn default() -> Self {
        Self {
            video_width: 720,
            video_height: 1280,
            front_camera_direction_mode: DirectionFlags(
                FLAG_DIRECTION_ROTATION_270 | FLAG_DIRECTION_FLIP_HORIZONTAL,
            ),
            back_camera_direction_mode: DirectionFlags(FLAG_DIRECTION_ROTATION_90),
            crop_ratio: 0.0,
            filter_lock_toleration_ms: 3,
            bitrate: 1_200_000,
            frame_rate: 30,
            i_frame_interval: 5,
            shader_dialect: ShaderDialect::default(),
            camera_texture_target: CameraTextureTarget::default(),
            startup_timeout_ms: 5_000,
        }
    }
}

impl CoreParameters {
    /// ### English
    /// Parses and validates parameters from a JSON string.
    ///
    /// ### 中文
    /// 从 JSON 字符串解析并校验参数。
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json).map_err(|source| Error::ConfigJson {
            path: "<inline>".into(),
            source,
        })?;
        params.validate()?;
        Ok(params)
    }

    /// ### English
    /// Loads and validates parameters from a JSON file.
    ///
    /// ### 中文
    /// 从 JSON 文件加载并校验参数。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let params: Self = serde_json::from_str(&text).map_err(|source| Error::ConfigJson {
            path: path.to_path_buf(),
            source,
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_width == 0 || self.video_height == 0 {
            return Err(Error::InvalidParameter(format!(
                "video size must be non-zero, got {}x{}",
                self.video_width, self.video_height
            )));
        }
        if !self.crop_ratio.is_finite() || self.crop_ratio.abs() >= 1.0 {
            return Err(Error::InvalidParameter(format!(
                "crop_ratio must be within (-1, 1), got {}",
                self.crop_ratio
            )));
        }
        if self.frame_rate == 0 {
            return Err(Error::InvalidParameter("frame_rate must be non-zero".into()));
        }
        if self.startup_timeout_ms == 0 {
            return Err(Error::InvalidParameter(
                "startup_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn video_size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.video_width, self.video_height)
    }

    #[inline]
    pub fn filter_lock_toleration(&self) -> Duration {
        Duration::from_millis(self.filter_lock_toleration_ms)
    }

    #[inline]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}
