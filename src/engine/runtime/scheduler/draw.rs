//! ### English
//! The draw pass: sample, compose, encoder, display.
//!
//! Each stage makes its own context current and finishes its GPU work before the next stage
//! reads the result from another context.
//!
//! ### 中文
//! 绘制流程：采样、合成、编码器、显示。
//!
//! 每个阶段先切换到自己的上下文，并在下一阶段（另一上下文）读取结果之前完成本阶段的 GPU 工作。

use crate::engine::config::CameraTextureTarget;
use crate::engine::error::Error;
use crate::engine::filter::FilterPass;
use crate::engine::geometry::{DRAW_INDICES, IDENTITY_TEXTURE_COORDS, SHAPE_VERTICES};
use crate::engine::rendering::{
    DrawTarget, GpuBackend, QuadDraw, SampledTexture, TextureId, TextureTarget,
};
use crate::engine::runtime::shared::CameraFrame;

use super::{FrameOutcome, FrameScheduler};

impl<B: GpuBackend> FrameScheduler<B> {
    /// ### English
    /// Handles one `FrameAvailable` notification.
    ///
    /// ### 中文
    /// 处理一次 `FrameAvailable` 通知。
    pub(crate) fn frame_available(&mut self) -> Result<FrameOutcome, Error> {
        let remaining = self.shared.pending.consume();
        if remaining >= 1 {
            self.shared.record_dropped();
            tracing::trace!(target: "camfan::scheduler", remaining, "frame coalesced");
            return Ok(FrameOutcome::Coalesced);
        }
        if self.offscreen.is_none() {
            tracing::trace!(target: "camfan::scheduler", "frame ignored, no offscreen binding");
            return Ok(FrameOutcome::Skipped);
        }
        let Some(frame) = self.shared.camera_frame.take_value() else {
            tracing::trace!(target: "camfan::scheduler", "frame ignored, no camera frame published");
            return Ok(FrameOutcome::Skipped);
        };
        self.draw_pass(frame)?;
        self.shared.record_drawn();
        Ok(FrameOutcome::Drawn)
    }

    fn draw_pass(&mut self, frame: CameraFrame) -> Result<(), Error> {
        let Self {
            gpu,
            params,
            shared,
            orientation,
            offscreen,
            encoder,
            display,
            last_encoder_timestamp_ns,
        } = self;
        let Some(offscreen) = offscreen.as_ref() else {
            return Ok(());
        };
        let video_size = params.video_size();
        let composed = SampledTexture::texture_2d(offscreen.working_target.texture);

        // Sample.
        gpu.make_current(offscreen.context)?;
        gpu.draw_quad(&QuadDraw {
            program: &offscreen.camera_program,
            target: DrawTarget::Framebuffer(offscreen.sample_target.framebuffer),
            source: SampledTexture {
                target: match params.camera_texture_target {
                    CameraTextureTarget::External => TextureTarget::External,
                    CameraTextureTarget::Texture2d => TextureTarget::Texture2D,
                },
                id: TextureId(frame.texture),
            },
            shape: &SHAPE_VERTICES,
            coords: orientation.camera_coords(),
            indices: &DRAW_INDICES,
            viewport: video_size,
        })?;
        gpu.finish_stage();

        // Compose.
        let pass = FilterPass {
            input_texture: offscreen.sample_target.texture,
            output_framebuffer: offscreen.working_target.framebuffer,
            shape: &SHAPE_VERTICES,
            coords: &IDENTITY_TEXTURE_COORDS,
            indices: &DRAW_INDICES,
            size: video_size,
        };
        let filtered = match shared.filter.try_acquire_for(params.filter_lock_toleration()) {
            Some(mut guard) => guard.render(gpu, orientation.direction(), &pass),
            None => {
                tracing::warn!(target: "camfan::filter", "filter slot busy, drawing pass-through");
                false
            }
        };
        if !filtered {
            gpu.make_current(offscreen.context)?;
            gpu.draw_quad(&QuadDraw {
                program: &offscreen.identity_program,
                target: DrawTarget::Framebuffer(pass.output_framebuffer),
                source: SampledTexture::texture_2d(pass.input_texture),
                shape: pass.shape,
                coords: pass.coords,
                indices: pass.indices,
                viewport: video_size,
            })?;
        }
        gpu.finish_stage();

        // Encoder.
        if let Some(encoder) = encoder.as_ref() {
            gpu.make_current(encoder.context)?;
            gpu.draw_quad(&QuadDraw {
                program: &encoder.program,
                target: DrawTarget::Surface,
                source: composed,
                shape: &SHAPE_VERTICES,
                coords: &IDENTITY_TEXTURE_COORDS,
                indices: &DRAW_INDICES,
                viewport: video_size,
            })?;
            gpu.finish_stage();
            shared
                .screenshot
                .service(video_size, || gpu.read_pixels(video_size));

            let mut timestamp_ns = frame.timestamp_ns;
            if let Some(last) = *last_encoder_timestamp_ns
                && timestamp_ns < last
            {
                tracing::warn!(
                    target: "camfan::scheduler",
                    timestamp_ns,
                    last,
                    "camera timestamp went backwards, reusing previous"
                );
                timestamp_ns = last;
            }
            *last_encoder_timestamp_ns = Some(timestamp_ns);
            gpu.present(encoder.context, Some(timestamp_ns))?;
        }

        // Display.
        if let Some(display) = display.as_ref() {
            gpu.make_current(display.context)?;
            gpu.draw_quad(&QuadDraw {
                program: &display.program,
                target: DrawTarget::Surface,
                source: composed,
                shape: &SHAPE_VERTICES,
                coords: &IDENTITY_TEXTURE_COORDS,
                indices: &DRAW_INDICES,
                viewport: shared.viewport.load(),
            })?;
            gpu.present(display.context, None)?;
        }

        tracing::trace!(target: "camfan::scheduler", timestamp_ns = frame.timestamp_ns, "frame drawn");
        Ok(())
    }
}
