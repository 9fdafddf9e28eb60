//! ### English
//! Real GPU backend: one surfman device, contexts created with `share_with` so they share one
//! GL object namespace, gleam for GL objects and draws, glow fences for stage ordering.
//!
//! Every context has a surface bound: the root context a 1x1 generic surface, the others their
//! widget. Surface draws go through the framebuffer surfman reports for that binding, which is
//! not `0` on every platform.
//!
//! ### 中文
//! 真实 GPU 后端：一个 surfman device，所有上下文以 `share_with` 创建以共享同一 GL 对象命名空间；
//! 使用 gleam 创建 GL 对象与绘制，使用 glow fence 保证阶段顺序。
//!
//! 每个上下文都绑定了 surface：根上下文绑定 1x1 的 generic surface，其余上下文绑定各自的 widget。
//! 绘制到 surface 时使用 surfman 为该绑定报告的帧缓冲，它并非在所有平台上都是 `0`。

use std::collections::BTreeMap;
use std::rc::Rc;

use dpi::PhysicalSize;
use euclid::default::Size2D;
use gleam::gl::{self, Gl};
use glow::HasContext as _;
use surfman::{
    Connection, Context, ContextAttributeFlags, ContextAttributes, Device, GLApi, GLVersion,
    NativeWidget, SurfaceAccess, SurfaceType,
};

use crate::engine::config::ShaderDialect;
use crate::engine::error::GpuError;

use super::backend::{
    ContextId, DrawTarget, FramebufferId, GpuBackend, ProgramId, ProgramKind, QuadDraw,
    QuadProgram, RenderTarget, TextureId, TextureTarget,
};
use super::shaders::{self, POSITION_ATTRIBUTE, TEX_COORD_ATTRIBUTE, TEXTURE_UNIFORM};

/// ### English
/// `GL_TEXTURE_EXTERNAL_OES`; not part of gleam's desktop constant set.
///
/// ### 中文
/// `GL_TEXTURE_EXTERNAL_OES`；gleam 的桌面常量集中没有该值。
const TEXTURE_EXTERNAL_OES: gl::GLenum = 0x8D65;

/// ### English
/// Upper bound for one stage fence wait before falling back to `glFinish`.
///
/// ### 中文
/// 单个阶段 fence 等待的上限；超时则回退为 `glFinish`。
const STAGE_FENCE_TIMEOUT_NS: i32 = 100_000_000;

/// ### English
/// Called with the presentation timestamp right before a surface is presented.
///
/// ### 中文
/// 在 surface 呈现前以呈现时间戳调用。
pub type PresentHook = Box<dyn FnMut(i64) + Send>;

/// ### English
/// Platform widget handed in by the display or encoder collaborator.
///
/// Encoder collaborators that need explicit presentation times (for example an EGL
/// `eglPresentationTimeANDROID` hook) install a [`PresentHook`].
///
/// ### 中文
/// 显示方或编码器方交入的平台 widget。
///
/// 需要显式呈现时间的编码器方（例如 EGL 的 `eglPresentationTimeANDROID`）可安装 [`PresentHook`]。
pub struct WidgetSurface {
    widget: NativeWidget,
    on_present: Option<PresentHook>,
}

/// ### English
/// The widget is only touched on the render thread after the handoff.
///
/// ### 中文
/// 交接之后，widget 只会在渲染线程上被访问。
unsafe impl Send for WidgetSurface {}

impl WidgetSurface {
    pub fn new(widget: NativeWidget) -> Self {
        Self {
            widget,
            on_present: None,
        }
    }

    pub fn with_present_hook(mut self, hook: PresentHook) -> Self {
        self.on_present = Some(hook);
        self
    }
}

struct VertexState {
    vao: gl::GLuint,
    position_vbo: gl::GLuint,
    coord_vbo: gl::GLuint,
    index_buffer: gl::GLuint,
}

struct ContextEntry {
    context: Context,
    /// ### English
    /// Framebuffer of the bound surface; refreshed whenever the surface is rebound.
    ///
    /// ### 中文
    /// 已绑定 surface 的帧缓冲；每次重新绑定 surface 后刷新。
    surface_fbo: gl::GLuint,
    /// ### English
    /// Vertex arrays are container objects and are not shared between contexts.
    ///
    /// ### 中文
    /// VAO 属于容器对象，不在上下文之间共享。
    vertex_state: Option<VertexState>,
    on_present: Option<PresentHook>,
}

struct GlApis {
    gl: Rc<dyn Gl>,
    glow: glow::Context,
}

/// ### English
/// [`GpuBackend`] on a surfman device.
///
/// ### 中文
/// 基于 surfman device 的 [`GpuBackend`]。
pub struct SurfmanBackend {
    connection: Connection,
    device: Device,
    dialect: ShaderDialect,
    contexts: BTreeMap<ContextId, ContextEntry>,
    next_context: u32,
    current: Option<ContextId>,
    apis: Option<GlApis>,
}

impl SurfmanBackend {
    /// ### English
    /// Opens the default hardware adapter. Must be called on the thread that will drive it.
    ///
    /// ### 中文
    /// 打开默认硬件适配器。必须在将要驱动它的线程上调用。
    pub fn new(dialect: ShaderDialect) -> Result<Self, GpuError> {
        let connection = Connection::new().map_err(|err| {
            GpuError::ContextCreation(format!("failed to create surfman Connection: {err:?}"))
        })?;
        Self::with_connection(connection, dialect)
    }

    pub fn with_connection(connection: Connection, dialect: ShaderDialect) -> Result<Self, GpuError> {
        let adapter = connection.create_adapter().map_err(|err| {
            GpuError::ContextCreation(format!("failed to create surfman adapter: {err:?}"))
        })?;
        let device = connection.create_device(&adapter).map_err(|err| {
            GpuError::ContextCreation(format!("failed to create surfman device: {err:?}"))
        })?;
        Ok(Self {
            connection,
            device,
            dialect,
            contexts: BTreeMap::new(),
            next_context: 1,
            current: None,
            apis: None,
        })
    }

    /// ### English
    /// Connection used by collaborators to build [`NativeWidget`]s for [`WidgetSurface`].
    ///
    /// ### 中文
    /// 供协作方构建 [`WidgetSurface`] 所需 [`NativeWidget`] 的 connection。
    pub fn connection(&self) -> Connection {
        self.connection.clone()
    }

    fn context_attributes(&self) -> ContextAttributes {
        let version = match self.device.gl_api() {
            GLApi::GL => GLVersion::new(3, 3),
            GLApi::GLES => GLVersion::new(3, 0),
        };
        ContextAttributes {
            version,
            flags: ContextAttributeFlags::ALPHA,
        }
    }

    fn create_context(&mut self, share_with: Option<ContextId>) -> Result<Context, GpuError> {
        let descriptor = self
            .device
            .create_context_descriptor(&self.context_attributes())
            .map_err(|err| GpuError::ContextCreation(format!("{err:?}")))?;
        let share_with = match share_with {
            Some(id) => Some(
                &self
                    .contexts
                    .get(&id)
                    .ok_or(GpuError::UnknownContext(id))?
                    .context,
            ),
            None => None,
        };
        self.device
            .create_context(&descriptor, share_with)
            .map_err(|err| GpuError::ContextCreation(format!("{err:?}")))
    }

    fn register(&mut self, context: Context, on_present: Option<PresentHook>) -> ContextId {
        let id = ContextId(self.next_context);
        self.next_context += 1;
        let surface_fbo = surface_framebuffer(&self.device, &context);
        self.contexts.insert(
            id,
            ContextEntry {
                context,
                surface_fbo,
                vertex_state: None,
                on_present,
            },
        );
        id
    }

    /// ### English
    /// Creates a surface of `surface_type` and binds it to `context`. On failure the context
    /// is destroyed as well.
    ///
    /// ### 中文
    /// 创建 `surface_type` 类型的 surface 并绑定到 `context`。失败时一并销毁该上下文。
    fn bind_new_surface(
        &self,
        mut context: Context,
        surface_type: SurfaceType<NativeWidget>,
    ) -> Result<Context, GpuError> {
        let surface = match self
            .device
            .create_surface(&context, SurfaceAccess::GPUOnly, surface_type)
        {
            Ok(surface) => surface,
            Err(err) => {
                let _ = self.device.destroy_context(&mut context);
                return Err(GpuError::ContextCreation(format!(
                    "failed to create surface: {err:?}"
                )));
            }
        };
        if let Err((err, mut surface)) = self.device.bind_surface_to_context(&mut context, surface) {
            let _ = self.device.destroy_surface(&mut context, &mut surface);
            let _ = self.device.destroy_context(&mut context);
            return Err(GpuError::ContextCreation(format!(
                "failed to bind surface: {err:?}"
            )));
        }
        Ok(context)
    }

    /// ### English
    /// Loads the GL function tables once; they stay valid for every context of the device.
    ///
    /// ### 中文
    /// 仅加载一次 GL 函数表；它们对该 device 的所有上下文都有效。
    fn load_apis(&mut self, context: &Context) {
        if self.apis.is_some() {
            return;
        }
        let device = &self.device;
        let glow = unsafe {
            glow::Context::from_loader_function(|name| device.get_proc_address(context, name))
        };
        let gl: Rc<dyn Gl> = unsafe {
            match device.gl_api() {
                GLApi::GLES => gl::GlesFns::load_with(|name| device.get_proc_address(context, name)),
                GLApi::GL => gl::GlFns::load_with(|name| device.get_proc_address(context, name)),
            }
        };
        self.apis = Some(GlApis { gl, glow });
    }

    fn gl(&self) -> Result<Rc<dyn Gl>, GpuError> {
        self.apis
            .as_ref()
            .map(|apis| apis.gl.clone())
            .ok_or(GpuError::NoCurrentContext)
    }

    fn current_entry(&mut self) -> Result<&mut ContextEntry, GpuError> {
        let id = self.current.ok_or(GpuError::NoCurrentContext)?;
        self.contexts.get_mut(&id).ok_or(GpuError::UnknownContext(id))
    }

    fn delete_vertex_state(gl: &dyn Gl, state: VertexState) {
        gl.delete_buffers(&[state.position_vbo, state.coord_vbo, state.index_buffer]);
        gl.delete_vertex_arrays(&[state.vao]);
    }

    fn compile_shader(gl: &dyn Gl, kind: gl::GLenum, source: &str) -> Result<gl::GLuint, GpuError> {
        let shader = gl.create_shader(kind);
        gl.shader_source(shader, &[source.as_bytes()]);
        gl.compile_shader(shader);
        let mut status = [0];
        unsafe {
            gl.get_shader_iv(shader, gl::COMPILE_STATUS, &mut status);
        }
        if status[0] == 0 {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(GpuError::ShaderCompile(log));
        }
        Ok(shader)
    }
}

impl GpuBackend for SurfmanBackend {
    type Surface = WidgetSurface;

    fn create_offscreen_context(&mut self) -> Result<ContextId, GpuError> {
        let context = self.create_context(None)?;
        let context = self.bind_new_surface(
            context,
            SurfaceType::Generic {
                size: Size2D::new(1, 1),
            },
        )?;
        self.load_apis(&context);
        let id = self.register(context, None);
        tracing::debug!(target: "camfan::gpu", context = id.0, "offscreen context created");
        Ok(id)
    }

    fn create_surface_context(
        &mut self,
        share_with: ContextId,
        surface: WidgetSurface,
    ) -> Result<ContextId, GpuError> {
        let context = self.create_context(Some(share_with))?;
        let WidgetSurface { widget, on_present } = surface;
        let context = self.bind_new_surface(
            context,
            SurfaceType::Widget {
                native_widget: widget,
            },
        )?;
        let id = self.register(context, on_present);
        tracing::debug!(target: "camfan::gpu", context = id.0, shared_with = share_with.0, "surface context created");
        Ok(id)
    }

    fn destroy_context(&mut self, context: ContextId) -> Result<(), GpuError> {
        let mut entry = self
            .contexts
            .remove(&context)
            .ok_or(GpuError::UnknownContext(context))?;
        if let Some(state) = entry.vertex_state.take()
            && self.device.make_context_current(&entry.context).is_ok()
            && let Some(apis) = self.apis.as_ref()
        {
            Self::delete_vertex_state(&*apis.gl, state);
        }
        if self.current == Some(context) {
            self.current = None;
        }
        let _ = self.device.make_no_context_current();
        match self.device.unbind_surface_from_context(&mut entry.context) {
            Ok(Some(mut surface)) => {
                if let Err(err) = self.device.destroy_surface(&mut entry.context, &mut surface) {
                    tracing::warn!(target: "camfan::gpu", context = context.0, "destroy_surface failed: {err:?}");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(target: "camfan::gpu", context = context.0, "unbind_surface failed: {err:?}");
            }
        }
        self.device
            .destroy_context(&mut entry.context)
            .map_err(|err| GpuError::ContextCreation(format!("destroy_context failed: {err:?}")))
    }

    fn make_current(&mut self, context: ContextId) -> Result<(), GpuError> {
        if self.current == Some(context) {
            return Ok(());
        }
        let entry = self
            .contexts
            .get(&context)
            .ok_or(GpuError::UnknownContext(context))?;
        self.device
            .make_context_current(&entry.context)
            .map_err(|err| GpuError::ContextCreation(format!("make_context_current failed: {err:?}")))?;
        self.current = Some(context);
        Ok(())
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<QuadProgram, GpuError> {
        self.current_entry()?;
        let gl = self.gl()?;
        let (vertex_source, fragment_source) = shaders::program_sources(self.dialect, &kind)?;

        let vertex = Self::compile_shader(&*gl, gl::VERTEX_SHADER, vertex_source)?;
        let fragment = match Self::compile_shader(&*gl, gl::FRAGMENT_SHADER, &fragment_source) {
            Ok(fragment) => fragment,
            Err(err) => {
                gl.delete_shader(vertex);
                return Err(err);
            }
        };

        let program = gl.create_program();
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.link_program(program);
        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);

        let mut status = [0];
        unsafe {
            gl.get_program_iv(program, gl::LINK_STATUS, &mut status);
        }
        if status[0] == 0 {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(GpuError::ProgramLink(log));
        }

        Ok(QuadProgram {
            id: ProgramId(program),
            kind,
            position_location: gl.get_attrib_location(program, POSITION_ATTRIBUTE),
            tex_coord_location: gl.get_attrib_location(program, TEX_COORD_ATTRIBUTE),
            texture_location: gl.get_uniform_location(program, TEXTURE_UNIFORM),
        })
    }

    fn delete_program(&mut self, program: &QuadProgram) {
        if let Ok(gl) = self.gl() {
            gl.delete_program(program.id.0);
        }
    }

    fn create_render_target(&mut self, size: PhysicalSize<u32>) -> Result<RenderTarget, GpuError> {
        let surface_fbo = self.current_entry()?.surface_fbo;
        let gl = self.gl()?;

        let framebuffer = gl.gen_framebuffers(1)[0];
        gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);

        let texture = gl.gen_textures(1)[0];
        gl.bind_texture(gl::TEXTURE_2D, texture);
        gl.tex_image_2d(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as gl::GLint,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            None,
        );
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::GLint);
        gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::GLint);
        gl.framebuffer_texture_2d(
            gl::FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            gl::TEXTURE_2D,
            texture,
            0,
        );
        gl.bind_texture(gl::TEXTURE_2D, 0);

        let status = gl.check_frame_buffer_status(gl::FRAMEBUFFER);
        gl.bind_framebuffer(gl::FRAMEBUFFER, surface_fbo);
        if status != gl::FRAMEBUFFER_COMPLETE {
            gl.delete_textures(&[texture]);
            gl.delete_framebuffers(&[framebuffer]);
            return Err(GpuError::IncompleteFramebuffer(status));
        }

        Ok(RenderTarget {
            framebuffer: FramebufferId(framebuffer),
            texture: TextureId(texture),
            size,
        })
    }

    fn delete_render_target(&mut self, target: &RenderTarget) {
        if let Ok(gl) = self.gl() {
            gl.delete_textures(&[target.texture.0]);
            gl.delete_framebuffers(&[target.framebuffer.0]);
        }
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError> {
        let gl = self.gl()?;
        let entry = self.current_entry()?;
        let surface_fbo = entry.surface_fbo;
        let vertex_state = entry.vertex_state.get_or_insert_with(|| {
            let buffers = gl.gen_buffers(3);
            VertexState {
                vao: gl.gen_vertex_arrays(1)[0],
                position_vbo: buffers[0],
                coord_vbo: buffers[1],
                index_buffer: buffers[2],
            }
        });

        gl.bind_framebuffer(
            gl::FRAMEBUFFER,
            match draw.target {
                DrawTarget::Framebuffer(framebuffer) => framebuffer.0,
                DrawTarget::Surface => surface_fbo,
            },
        );
        gl.viewport(
            0,
            0,
            draw.viewport.width as gl::GLsizei,
            draw.viewport.height as gl::GLsizei,
        );
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear(gl::COLOR_BUFFER_BIT);

        gl.use_program(draw.program.id.0);
        let texture_target = match draw.source.target {
            TextureTarget::External => TEXTURE_EXTERNAL_OES,
            TextureTarget::Texture2D => gl::TEXTURE_2D,
        };
        gl.active_texture(gl::TEXTURE0);
        gl.bind_texture(texture_target, draw.source.id.0);
        gl.uniform_1i(draw.program.texture_location, 0);

        gl.bind_vertex_array(vertex_state.vao);
        let attributes = [
            (draw.program.position_location, vertex_state.position_vbo, draw.shape),
            (draw.program.tex_coord_location, vertex_state.coord_vbo, draw.coords),
        ];
        for (location, buffer, data) in attributes {
            if location < 0 {
                continue;
            }
            gl.bind_buffer(gl::ARRAY_BUFFER, buffer);
            gl::buffer_data(&*gl, gl::ARRAY_BUFFER, data, gl::STREAM_DRAW);
            gl.enable_vertex_attrib_array(location as gl::GLuint);
            gl.vertex_attrib_pointer(location as gl::GLuint, 2, gl::FLOAT, false, 0, 0);
        }
        gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, vertex_state.index_buffer);
        gl::buffer_data(&*gl, gl::ELEMENT_ARRAY_BUFFER, draw.indices, gl::STREAM_DRAW);
        gl.draw_elements(
            gl::TRIANGLES,
            draw.indices.len() as gl::GLsizei,
            gl::UNSIGNED_SHORT,
            0,
        );

        for (location, _, _) in attributes {
            if location >= 0 {
                gl.disable_vertex_attrib_array(location as gl::GLuint);
            }
        }
        gl.bind_vertex_array(0);
        gl.bind_buffer(gl::ARRAY_BUFFER, 0);
        gl.bind_texture(texture_target, 0);
        gl.use_program(0);
        gl.bind_framebuffer(gl::FRAMEBUFFER, surface_fbo);
        Ok(())
    }

    fn finish_stage(&mut self) {
        let Some(apis) = self.apis.as_ref() else {
            return;
        };
        let completed = unsafe {
            match apis.glow.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) {
                Ok(sync) => {
                    let status = apis
                        .glow
                        .client_wait_sync(sync, glow::SYNC_FLUSH_COMMANDS_BIT, STAGE_FENCE_TIMEOUT_NS);
                    apis.glow.delete_sync(sync);
                    status == glow::ALREADY_SIGNALED || status == glow::CONDITION_SATISFIED
                }
                Err(_) => false,
            }
        };
        if !completed {
            apis.gl.finish();
        }
    }

    fn read_pixels(&mut self, size: PhysicalSize<u32>) -> Result<Vec<u8>, GpuError> {
        let surface_fbo = self.current_entry()?.surface_fbo;
        let gl = self.gl()?;
        gl.bind_framebuffer(gl::FRAMEBUFFER, surface_fbo);
        let pixels = gl.read_pixels(
            0,
            0,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
        );
        let error = gl.get_error();
        if error != gl::NO_ERROR {
            return Err(GpuError::Readback(format!("glReadPixels error {error:#x}")));
        }
        Ok(pixels)
    }

    fn present(&mut self, context: ContextId, timestamp_ns: Option<i64>) -> Result<(), GpuError> {
        let entry = self
            .contexts
            .get_mut(&context)
            .ok_or(GpuError::UnknownContext(context))?;
        if let (Some(timestamp_ns), Some(hook)) = (timestamp_ns, entry.on_present.as_mut()) {
            hook(timestamp_ns);
        }
        let mut surface = self
            .device
            .unbind_surface_from_context(&mut entry.context)
            .map_err(|err| GpuError::Present(format!("unbind_surface failed: {err:?}")))?
            .ok_or_else(|| GpuError::Present(format!("{context:?} has no surface")))?;
        let presented = self.device.present_surface(&entry.context, &mut surface);
        self.device
            .bind_surface_to_context(&mut entry.context, surface)
            .map_err(|(err, _)| GpuError::Present(format!("rebind_surface failed: {err:?}")))?;
        entry.surface_fbo = surface_framebuffer(&self.device, &entry.context);
        // Rebinding may change the current binding; force the next make_current through.
        self.current = None;
        presented.map_err(|err| GpuError::Present(format!("{err:?}")))
    }
}

/// ### English
/// Framebuffer surfman renders the context's bound surface through; `0` when it reports none.
///
/// ### 中文
/// surfman 渲染该上下文所绑定 surface 时使用的帧缓冲；未报告时为 `0`。
fn surface_framebuffer(device: &Device, context: &Context) -> gl::GLuint {
    match device.context_surface_info(context) {
        Ok(Some(info)) => info.framebuffer_object.map_or(0, |fbo| fbo.0.get()),
        Ok(None) => 0,
        Err(err) => {
            tracing::warn!(target: "camfan::gpu", "context_surface_info failed: {err:?}");
            0
        }
    }
}

impl Drop for SurfmanBackend {
    fn drop(&mut self) {
        let ids: Vec<ContextId> = self.contexts.keys().rev().copied().collect();
        for id in ids {
            if let Err(err) = self.destroy_context(id) {
                tracing::warn!(target: "camfan::gpu", context = id.0, "context teardown failed: {err}");
            }
        }
    }
}
