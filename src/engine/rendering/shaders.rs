//! ### English
//! GLSL sources for the quad programs, per dialect.
//!
//! ### 中文
//! 各方言下四边形程序的 GLSL 源码。

use crate::engine::config::ShaderDialect;
use crate::engine::error::GpuError;

use super::backend::{ProgramKind, TextureTarget};

pub(crate) const POSITION_ATTRIBUTE: &str = "aPosition";
pub(crate) const TEX_COORD_ATTRIBUTE: &str = "aTextureCoord";
pub(crate) const TEXTURE_UNIFORM: &str = "uTexture";

const GLES2_VERTEX: &str = "\
attribute vec4 aPosition;
attribute vec2 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = aPosition;
    vTextureCoord = aTextureCoord;
}
";

const GLSL330_VERTEX: &str = "\
#version 330 core
in vec4 aPosition;
in vec2 aTextureCoord;
out vec2 vTextureCoord;
void main() {
    gl_Position = aPosition;
    vTextureCoord = aTextureCoord;
}
";

const GLES2_EXTERNAL_HEADER: &str = "\
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying mediump vec2 vTextureCoord;
uniform samplerExternalOES uTexture;
#define SAMPLE(uv) texture2D(uTexture, uv)
";

const GLES2_2D_HEADER: &str = "\
precision mediump float;
varying mediump vec2 vTextureCoord;
uniform sampler2D uTexture;
#define SAMPLE(uv) texture2D(uTexture, uv)
";

const GLSL330_2D_HEADER: &str = "\
#version 330 core
in vec2 vTextureCoord;
out vec4 fragColor;
uniform sampler2D uTexture;
#define SAMPLE(uv) texture(uTexture, uv)
";

const COPY_BODY: &str = "vec4 shade(vec2 uv) { return SAMPLE(uv); }\n";

/// ### English
/// Returns `(vertex, fragment)` sources for `kind` in `dialect`.
///
/// ### 中文
/// 返回 `kind` 在 `dialect` 下的 `(顶点, 片元)` 源码。
pub(crate) fn program_sources(
    dialect: ShaderDialect,
    kind: &ProgramKind,
) -> Result<(&'static str, String), GpuError> {
    let external = matches!(kind, ProgramKind::CameraSample(TextureTarget::External));
    let (vertex, header, main) = match dialect {
        ShaderDialect::Gles2 => (
            GLES2_VERTEX,
            if external {
                GLES2_EXTERNAL_HEADER
            } else {
                GLES2_2D_HEADER
            },
            "void main() { gl_FragColor = shade(vTextureCoord); }\n",
        ),
        ShaderDialect::Glsl330 => {
            if external {
                return Err(GpuError::Unsupported(
                    "external camera textures require the gles2 shader dialect".into(),
                ));
            }
            (
                GLSL330_VERTEX,
                GLSL330_2D_HEADER,
                "void main() { fragColor = shade(vTextureCoord); }\n",
            )
        }
    };
    let body = match kind {
        ProgramKind::Custom(body) => body.as_ref(),
        _ => COPY_BODY,
    };
    Ok((vertex, format!("{header}{body}{main}")))
}
