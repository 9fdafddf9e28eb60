//! ### English
//! Built-in filters that run a single fragment function over the camera image.
//!
//! ### 中文
//! 内置滤镜：对相机图像运行单个片元函数。

use std::sync::Arc;

use dpi::PhysicalSize;

use crate::engine::error::GpuError;
use crate::engine::rendering::{
    DrawTarget, GpuBackend, ProgramKind, QuadDraw, QuadProgram, SampledTexture,
};

use super::{FilterPass, VideoFilter};

/// ### English
/// Filter that runs one fragment function over the sampled camera image.
///
/// `body` must define `vec4 shade(vec2 uv)`; `SAMPLE(uv)` reads the input texture in either
/// shader dialect.
///
/// ### 中文
/// 对采样后的相机图像运行一个片元函数的滤镜。
///
/// `body` 需定义 `vec4 shade(vec2 uv)`；在任一着色器方言下都可用 `SAMPLE(uv)` 读取输入纹理。
pub struct ShaderFilter {
    body: Arc<str>,
    program: Option<QuadProgram>,
}

impl ShaderFilter {
    pub fn new(body: impl Into<Arc<str>>) -> Self {
        Self {
            body: body.into(),
            program: None,
        }
    }

    /// ### English
    /// Inverts RGB, keeps alpha.
    ///
    /// ### 中文
    /// 反转 RGB，保留 alpha。
    pub fn invert() -> Self {
        Self::new(
            "vec4 shade(vec2 uv) { vec4 c = SAMPLE(uv); return vec4(vec3(1.0) - c.rgb, c.a); }\n",
        )
    }

    pub fn grayscale() -> Self {
        Self::new(
            "vec4 shade(vec2 uv) { vec4 c = SAMPLE(uv); \
             float l = dot(c.rgb, vec3(0.299, 0.587, 0.114)); return vec4(vec3(l), c.a); }\n",
        )
    }
}

impl<B: GpuBackend> VideoFilter<B> for ShaderFilter {
    fn initialize(&mut self, gpu: &mut B, _size: PhysicalSize<u32>) -> Result<(), GpuError> {
        self.program = Some(gpu.compile_program(ProgramKind::Custom(self.body.clone()))?);
        Ok(())
    }

    fn draw(&mut self, gpu: &mut B, pass: &FilterPass<'_>) -> Result<(), GpuError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| GpuError::ProgramLink("shader filter drawn before initialize".into()))?;
        gpu.draw_quad(&QuadDraw {
            program,
            target: DrawTarget::Framebuffer(pass.output_framebuffer),
            source: SampledTexture::texture_2d(pass.input_texture),
            shape: pass.shape,
            coords: pass.coords,
            indices: pass.indices,
            viewport: pass.size,
        })
    }

    fn destroy(&mut self, gpu: &mut B) {
        if let Some(program) = self.program.take() {
            gpu.delete_program(&program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::{DRAW_INDICES, IDENTITY_TEXTURE_COORDS, SHAPE_VERTICES};
    use crate::engine::rendering::{HeadlessBackend, TextureId};

    #[test]
    fn compiles_draws_and_releases_its_program() {
        let mut gpu = HeadlessBackend::new();
        let ledger = gpu.ledger();
        let root = gpu.create_offscreen_context().unwrap();
        gpu.make_current(root).unwrap();
        let target = gpu.create_render_target(PhysicalSize::new(8, 8)).unwrap();

        let mut filter = ShaderFilter::invert();
        VideoFilter::<HeadlessBackend>::initialize(&mut filter, &mut gpu, target.size).unwrap();
        let pass = FilterPass {
            input_texture: TextureId(99),
            output_framebuffer: target.framebuffer,
            shape: &SHAPE_VERTICES,
            coords: &IDENTITY_TEXTURE_COORDS,
            indices: &DRAW_INDICES,
            size: target.size,
        };
        VideoFilter::<HeadlessBackend>::draw(&mut filter, &mut gpu, &pass).unwrap();

        let draws = ledger.draws();
        assert_eq!(draws.len(), 1);
        assert!(matches!(draws[0].program, ProgramKind::Custom(_)));
        assert_eq!(draws[0].target, DrawTarget::Framebuffer(target.framebuffer));

        let before = ledger.live_objects();
        VideoFilter::<HeadlessBackend>::destroy(&mut filter, &mut gpu);
        assert_eq!(ledger.live_objects(), before - 1);
    }
}
