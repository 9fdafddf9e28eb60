//! ### English
//! Unit-quad vertex tables and the camera orientation/crop transform.
//!
//! ### 中文
//! 单位四边形顶点表，以及相机方向/裁剪变换。

use super::config::CoreParameters;
use super::flags::DirectionFlags;

/// ### English
/// Full-viewport quad in clip space: top-left, bottom-left, bottom-right, top-right.
///
/// ### 中文
/// 覆盖整个视口的裁剪空间四边形：左上、左下、右下、右上。
pub const SHAPE_VERTICES: [f32; 8] = [-1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0];

pub const DRAW_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// ### English
/// Texture coordinates matching [`SHAPE_VERTICES`] one-to-one.
/// Used by the identity, encoder and display passes.
///
/// ### 中文
/// 与 [`SHAPE_VERTICES`] 一一对应的纹理坐标。
/// 用于直通、编码器与显示三个绘制阶段。
pub const IDENTITY_TEXTURE_COORDS: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

/// ### English
/// Computes the texture coordinates used to sample the camera texture.
///
/// The crop is applied in the unrotated frame (`crop_ratio > 0` trims v, `< 0` trims u, each
/// side loses `|crop_ratio| / 2`), then the rotation flag is applied, then mirroring.
///
/// ### 中文
/// 计算采样相机纹理时使用的纹理坐标。
///
/// 裁剪在未旋转的坐标系中进行（`crop_ratio > 0` 裁 v 轴，`< 0` 裁 u 轴，每侧裁掉
/// `|crop_ratio| / 2`），随后应用旋转，最后应用镜像。
pub fn camera_texture_coords(direction: DirectionFlags, crop_ratio: f32) -> [f32; 8] {
    let margin = crop_ratio.abs() / 2.0;
    let mut coords = IDENTITY_TEXTURE_COORDS;

    for vertex in coords.chunks_exact_mut(2) {
        let axis = if crop_ratio > 0.0 {
            &mut vertex[1]
        } else if crop_ratio < 0.0 {
            &mut vertex[0]
        } else {
            continue;
        };
        *axis = if *axis == 0.0 { margin } else { 1.0 - margin };
    }

    for _ in 0..direction.quarter_turns() {
        for vertex in coords.chunks_exact_mut(2) {
            let (u, v) = (vertex[0], vertex[1]);
            vertex[0] = 1.0 - v;
            vertex[1] = u;
        }
    }

    for vertex in coords.chunks_exact_mut(2) {
        if direction.flips_horizontally() {
            vertex[0] = 1.0 - vertex[0];
        }
        if direction.flips_vertically() {
            vertex[1] = 1.0 - vertex[1];
        }
    }

    coords
}

/// ### English
/// Which physical camera feeds the pipeline.
///
/// ### 中文
/// 当前为管线供帧的物理相机。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    /// ### English
    /// Maps a platform camera index (`1` = front, anything else = back).
    ///
    /// ### 中文
    /// 映射平台相机索引（`1` 为前置，其余为后置）。
    pub fn from_index(index: i32) -> Self {
        if index == 1 { Self::Front } else { Self::Back }
    }
}

/// ### English
/// Cached camera transform for the current facing.
///
/// ### 中文
/// 针对当前朝向缓存的相机变换。
#[derive(Clone, Debug)]
pub struct OrientationTable {
    facing: CameraFacing,
    direction: DirectionFlags,
    coords: [f32; 8],
    recomputations: u64,
}

impl OrientationTable {
    pub fn new(facing: CameraFacing, params: &CoreParameters) -> Self {
        let direction = direction_for(facing, params);
        Self {
            facing,
            direction,
            coords: camera_texture_coords(direction, params.crop_ratio),
            recomputations: 1,
        }
    }

    /// ### English
    /// Selects `facing`; recomputes the coordinates only if it differs from the current one.
    /// Returns whether a recomputation happened.
    ///
    /// ### 中文
    /// 选择 `facing`；仅当与当前朝向不同时重新计算坐标。返回是否发生了重算。
    pub fn set_facing(&mut self, facing: CameraFacing, params: &CoreParameters) -> bool {
        if facing == self.facing {
            return false;
        }
        self.facing = facing;
        self.direction = direction_for(facing, params);
        self.coords = camera_texture_coords(self.direction, params.crop_ratio);
        self.recomputations += 1;
        true
    }

    #[inline]
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    #[inline]
    pub fn direction(&self) -> DirectionFlags {
        self.direction
    }

    #[inline]
    pub fn camera_coords(&self) -> &[f32; 8] {
        &self.coords
    }

    /// ### English
    /// Number of times the coordinates were computed, including construction.
    ///
    /// ### 中文
    /// 坐标被计算的次数（含构造时的一次）。
    #[inline]
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

fn direction_for(facing: CameraFacing, params: &CoreParameters) -> DirectionFlags {
    match facing {
        CameraFacing::Front => params.front_camera_direction_mode,
        CameraFacing::Back => params.back_camera_direction_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::flags::*;

    fn pairs(coords: &[f32; 8]) -> Vec<(f32, f32)> {
        coords.chunks_exact(2).map(|c| (c[0], c[1])).collect()
    }

    #[test]
    fn unrotated_uncropped_is_identity() {
        let coords = camera_texture_coords(DirectionFlags(FLAG_DIRECTION_ROTATION_0), 0.0);
        assert_eq!(coords, IDENTITY_TEXTURE_COORDS);
    }

    #[test]
    fn quarter_turn_rotates_corners() {
        let coords = camera_texture_coords(DirectionFlags(FLAG_DIRECTION_ROTATION_90), 0.0);
        assert_eq!(
            pairs(&coords),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        );
    }

    #[test]
    fn full_turn_of_quarters_matches_identity() {
        let half = camera_texture_coords(DirectionFlags(FLAG_DIRECTION_ROTATION_180), 0.0);
        assert_eq!(
            pairs(&half),
            vec![(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]
        );
    }

    #[test]
    fn positive_crop_trims_v_axis() {
        let coords = camera_texture_coords(DirectionFlags(FLAG_DIRECTION_ROTATION_0), 0.5);
        assert_eq!(
            pairs(&coords),
            vec![(0.0, 0.75), (0.0, 0.25), (1.0, 0.25), (1.0, 0.75)]
        );
    }

    #[test]
    fn negative_crop_trims_u_axis_before_mirroring() {
        let coords = camera_texture_coords(
            DirectionFlags(FLAG_DIRECTION_ROTATION_0 | FLAG_DIRECTION_FLIP_HORIZONTAL),
            -0.5,
        );
        assert_eq!(
            pairs(&coords),
            vec![(0.75, 1.0), (0.75, 0.0), (0.25, 0.0), (0.25, 1.0)]
        );
    }

    #[test]
    fn vertical_flip_mirrors_v() {
        let coords = camera_texture_coords(DirectionFlags(FLAG_DIRECTION_FLIP_VERTICAL), 0.0);
        assert_eq!(
            pairs(&coords),
            vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]
        );
    }

    #[test]
    fn recomputes_only_on_facing_change() {
        let params = CoreParameters {
            crop_ratio: 0.2,
            ..CoreParameters::default()
        };
        let mut table = OrientationTable::new(CameraFacing::Front, &params);
        let front = *table.camera_coords();
        assert_eq!(table.recomputations(), 1);

        for _ in 0..10 {
            let _ = table.camera_coords();
        }
        assert!(!table.set_facing(CameraFacing::Front, &params));
        assert_eq!(table.recomputations(), 1);

        assert!(table.set_facing(CameraFacing::Back, &params));
        assert_eq!(table.direction(), params.back_camera_direction_mode);
        assert_ne!(*table.camera_coords(), front);

        assert!(table.set_facing(CameraFacing::Front, &params));
        assert_eq!(*table.camera_coords(), front);
        assert_eq!(table.recomputations(), 3);
    }

    #[test]
    fn facing_from_platform_index() {
        assert_eq!(CameraFacing::from_index(1), CameraFacing::Front);
        assert_eq!(CameraFacing::from_index(0), CameraFacing::Back);
        assert_eq!(CameraFacing::from_index(-1), CameraFacing::Back);
    }
}
