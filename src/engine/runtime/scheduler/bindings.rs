//! ### English
//! Offscreen/encoder/display binding lifecycle.
//!
//! ### 中文
//! 离屏/编码器/显示三类绑定的生命周期。

use dpi::PhysicalSize;

use crate::engine::config::CameraTextureTarget;
use crate::engine::error::{BindingKind, ContractViolation, Error, GpuError};
use crate::engine::rendering::{
    ContextId, GpuBackend, ProgramKind, QuadProgram, RenderTarget, TextureTarget,
};

use super::FrameScheduler;

/// ### English
/// Root context of the shared namespace plus the objects the sample and compose stages use.
///
/// ### 中文
/// 共享命名空间的根上下文，以及采样与合成阶段使用的对象。
pub(super) struct OffscreenBinding {
    pub(super) context: ContextId,
    pub(super) camera_program: QuadProgram,
    pub(super) identity_program: QuadProgram,
    /// ### English
    /// Receives the oriented camera image.
    ///
    /// ### 中文
    /// 接收经过方向变换的相机图像。
    pub(super) sample_target: RenderTarget,
    /// ### English
    /// Receives the composed frame; its texture feeds the encoder and display stages.
    ///
    /// ### 中文
    /// 接收合成后的帧；其纹理供编码器与显示阶段使用。
    pub(super) working_target: RenderTarget,
}

/// ### English
/// A surface context and its blit program.
///
/// ### 中文
/// 一个 surface 上下文及其 blit 程序。
pub(super) struct SurfaceBinding {
    pub(super) context: ContextId,
    pub(super) program: QuadProgram,
}

impl<B: GpuBackend> FrameScheduler<B> {
    pub(crate) fn init(&mut self) -> Result<(), Error> {
        if self.offscreen.is_some() {
            return Err(ContractViolation::AlreadyAttached(BindingKind::Offscreen).into());
        }
        let context = self.gpu.create_offscreen_context()?;
        match self.build_offscreen(context) {
            Ok(binding) => {
                self.offscreen = Some(binding);
                tracing::debug!(target: "camfan::scheduler", context = context.0, "offscreen binding created");
                Ok(())
            }
            Err(err) => {
                let _ = self.gpu.destroy_context(context);
                Err(err.into())
            }
        }
    }

    fn build_offscreen(&mut self, context: ContextId) -> Result<OffscreenBinding, GpuError> {
        let gpu = &mut self.gpu;
        gpu.make_current(context)?;

        let camera_target = match self.params.camera_texture_target {
            CameraTextureTarget::External => TextureTarget::External,
            CameraTextureTarget::Texture2d => TextureTarget::Texture2D,
        };
        let camera_program = gpu.compile_program(ProgramKind::CameraSample(camera_target))?;
        let identity_program = gpu
            .compile_program(ProgramKind::Identity)
            .inspect_err(|_| gpu.delete_program(&camera_program))?;

        let size = self.params.video_size();
        let sample_target = gpu.create_render_target(size).inspect_err(|_| {
            gpu.delete_program(&camera_program);
            gpu.delete_program(&identity_program);
        })?;
        let working_target = gpu.create_render_target(size).inspect_err(|_| {
            gpu.delete_program(&camera_program);
            gpu.delete_program(&identity_program);
            gpu.delete_render_target(&sample_target);
        })?;

        Ok(OffscreenBinding {
            context,
            camera_program,
            identity_program,
            sample_target,
            working_target,
        })
    }

    /// ### English
    /// Releases the offscreen binding. Surface bindings still attached are released first,
    /// and every initialized filter is destroyed.
    ///
    /// ### 中文
    /// 释放离屏绑定。仍附着的 surface 绑定会先被释放，所有已初始化的滤镜都会被销毁。
    pub(crate) fn uninit(&mut self) -> Result<(), Error> {
        if self.offscreen.is_none() {
            return Err(ContractViolation::NotAttached(BindingKind::Offscreen).into());
        }
        if self.encoder.is_some() {
            tracing::warn!(target: "camfan::scheduler", "uninit with encoder still attached, detaching");
            self.detach_encoder()?;
        }
        if self.display.is_some() {
            tracing::warn!(target: "camfan::scheduler", "uninit with display still attached, detaching");
            self.detach_display()?;
        }
        let Some(offscreen) = self.offscreen.take() else {
            return Err(ContractViolation::NotAttached(BindingKind::Offscreen).into());
        };

        self.gpu.make_current(offscreen.context)?;
        self.shared.filter.release_gpu(&mut self.gpu);
        self.gpu.delete_program(&offscreen.camera_program);
        self.gpu.delete_program(&offscreen.identity_program);
        self.gpu.delete_render_target(&offscreen.sample_target);
        self.gpu.delete_render_target(&offscreen.working_target);
        self.gpu.destroy_context(offscreen.context)?;
        self.shared.screenshot.abandon();

        tracing::debug!(target: "camfan::scheduler", "offscreen binding destroyed");
        Ok(())
    }

    pub(crate) fn attach_display(
        &mut self,
        surface: B::Surface,
        size: PhysicalSize<u32>,
    ) -> Result<(), Error> {
        if self.display.is_some() {
            return Err(ContractViolation::AlreadyAttached(BindingKind::Display).into());
        }
        let binding = self.attach_surface(surface, ProgramKind::DisplayBlit)?;
        self.shared.viewport.store(size);
        tracing::debug!(
            target: "camfan::scheduler",
            context = binding.context.0,
            width = size.width,
            height = size.height,
            "display binding created"
        );
        self.display = Some(binding);
        Ok(())
    }

    pub(crate) fn detach_display(&mut self) -> Result<(), Error> {
        let binding = self
            .display
            .take()
            .ok_or(ContractViolation::NotAttached(BindingKind::Display))?;
        self.release_surface(binding)?;
        tracing::debug!(target: "camfan::scheduler", "display binding destroyed");
        Ok(())
    }

    pub(crate) fn attach_encoder(&mut self, surface: B::Surface) -> Result<(), Error> {
        if self.encoder.is_some() {
            return Err(ContractViolation::AlreadyAttached(BindingKind::Encoder).into());
        }
        let binding = self.attach_surface(surface, ProgramKind::EncoderBlit)?;
        self.last_encoder_timestamp_ns = None;
        tracing::debug!(target: "camfan::scheduler", context = binding.context.0, "encoder binding created");
        self.encoder = Some(binding);
        Ok(())
    }

    /// ### English
    /// Releases the encoder context, its program, and the per-context vertex state the
    /// encoder stage used to read the working framebuffer texture.
    ///
    /// ### 中文
    /// 释放编码器上下文、其程序，以及编码器阶段读取工作帧缓冲纹理所用的上下文私有顶点状态。
    pub(crate) fn detach_encoder(&mut self) -> Result<(), Error> {
        let binding = self
            .encoder
            .take()
            .ok_or(ContractViolation::NotAttached(BindingKind::Encoder))?;
        self.release_surface(binding)?;
        tracing::debug!(target: "camfan::scheduler", "encoder binding destroyed");
        Ok(())
    }

    fn attach_surface(
        &mut self,
        surface: B::Surface,
        kind: ProgramKind,
    ) -> Result<SurfaceBinding, Error> {
        let root = self
            .offscreen
            .as_ref()
            .map(|offscreen| offscreen.context)
            .ok_or(ContractViolation::NotInitialized)?;
        let context = self.gpu.create_surface_context(root, surface)?;
        let program = self
            .gpu
            .make_current(context)
            .and_then(|()| self.gpu.compile_program(kind));
        match program {
            Ok(program) => Ok(SurfaceBinding { context, program }),
            Err(err) => {
                let _ = self.gpu.destroy_context(context);
                Err(err.into())
            }
        }
    }

    fn release_surface(&mut self, binding: SurfaceBinding) -> Result<(), Error> {
        self.gpu.make_current(binding.context)?;
        self.gpu.delete_program(&binding.program);
        self.gpu.destroy_context(binding.context)?;
        Ok(())
    }
}
