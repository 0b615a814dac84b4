//! OpenGL (glow) implementation of [`GpuDevice`].
//!
//! The shader pair draws one full-screen triangle whose corners come from
//! `gl_VertexID`; no vertex buffer is bound. The fragment stage samples the
//! video texture through `u_uvRect`.

use eframe::glow::{self, HasContext};

use super::geometry::UvRect;
use super::renderer::{GpuDevice, RenderError};
use super::source::VideoFrame;

const VERTEX_SHADER: &str = r#"
const vec2 POS[3] = vec2[3](vec2(-1.0, -1.0), vec2(3.0, -1.0), vec2(-1.0, 3.0));
uniform vec4 u_uvRect;
out vec2 v_uv;
void main() {
    vec2 pos = POS[gl_VertexID];
    vec2 t = pos * 0.5 + 0.5;
    v_uv = mix(u_uvRect.xy, u_uvRect.zw, t);
    gl_Position = vec4(pos, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
precision mediump float;
uniform sampler2D u_tex;
in vec2 v_uv;
out vec4 out_color;
void main() {
    out_color = texture(u_tex, v_uv);
}
"#;

/// GL handles owned across frames. Only valid with the context that created them.
#[derive(Default)]
pub struct GlowResources {
    program: Option<glow::Program>,
    vertex_array: Option<glow::VertexArray>,
    texture: Option<glow::Texture>,
    uv_location: Option<glow::UniformLocation>,
    tex_location: Option<glow::UniformLocation>,
    /// Offscreen canvas the frame is drawn into and read back from.
    canvas_fbo: Option<glow::Framebuffer>,
    canvas_texture: Option<glow::Texture>,
    canvas_size: (i32, i32),
    /// On-screen rect the canvas is stretched over (device pixels, bottom-left origin).
    target: ScreenRect,
    lost: bool,
}

/// A rectangle in window framebuffer pixels, `y` measured from the bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub bottom: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    /// Corners as `(x0, y0, x1, y1)`, the form `glBlitFramebuffer` takes.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.left,
            self.bottom,
            self.left + self.width,
            self.bottom + self.height,
        )
    }
}

impl GlowResources {
    /// Forgets handles without touching GL (the context that owned them is gone).
    pub fn forget(&mut self) {
        *self = GlowResources::default();
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Feeds the result of a `glGetError` poll taken while lost. Returns true
    /// once the context answers with anything but `CONTEXT_LOST`, at which
    /// point the dead handles are dropped and the renderer may re-init.
    pub fn note_restore_poll(&mut self, error: u32) -> bool {
        if !self.lost {
            return true;
        }
        if error == glow::CONTEXT_LOST {
            return false;
        }
        self.forget();
        true
    }

    /// Polls the context while it is marked lost.
    pub fn poll_restored(&mut self, gl: &glow::Context) -> bool {
        if !self.lost {
            return true;
        }
        let error = unsafe { gl.get_error() };
        self.note_restore_poll(error)
    }

    /// Places the canvas within the window framebuffer.
    pub fn set_target(&mut self, target: ScreenRect) {
        self.target = target;
    }
}

/// A borrowed GL context plus the resources created on it.
pub struct GlowDevice<'a> {
    gl: &'a glow::Context,
    res: &'a mut GlowResources,
}

impl<'a> GlowDevice<'a> {
    pub fn new(gl: &'a glow::Context, res: &'a mut GlowResources) -> Self {
        Self { gl, res }
    }
}

fn shader_version(gl: &glow::Context) -> &'static str {
    if gl.version().is_embedded {
        "#version 300 es"
    } else {
        "#version 330"
    }
}

impl GpuDevice for GlowDevice<'_> {
    fn init(&mut self) -> Result<(), RenderError> {
        self.dispose();
        let gl = self.gl;
        let version = shader_version(gl);
        unsafe {
            let program = gl.create_program().map_err(RenderError::Shader)?;
            let mut shaders = Vec::with_capacity(2);
            for (kind, source) in [
                (glow::VERTEX_SHADER, VERTEX_SHADER),
                (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
            ] {
                let shader = gl.create_shader(kind).map_err(RenderError::Shader)?;
                gl.shader_source(shader, &format!("{}\n{}", version, source));
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let info = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    gl.delete_program(program);
                    return Err(RenderError::Shader(info));
                }
                gl.attach_shader(program, shader);
                shaders.push(shader);
            }

            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            for shader in shaders {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }
            if !linked {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(RenderError::Shader(info));
            }

            let vertex_array = gl
                .create_vertex_array()
                .map_err(RenderError::Allocation)?;

            self.res.uv_location = gl.get_uniform_location(program, "u_uvRect");
            self.res.tex_location = gl.get_uniform_location(program, "u_tex");
            self.res.program = Some(program);
            self.res.vertex_array = Some(vertex_array);
            self.res.lost = false;
        }
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.res.lost
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        let size = (width as i32, height as i32);
        if self.res.canvas_fbo.is_some() && self.res.canvas_size == size {
            return;
        }
        self.release_canvas();
        let gl = self.gl;
        unsafe {
            let (Ok(texture), Ok(fbo)) = (gl.create_texture(), gl.create_framebuffer()) else {
                log::warn!("Could not create the {}x{} canvas framebuffer", width, height);
                return;
            };
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_storage_2d(glow::TEXTURE_2D, 1, glow::RGBA8, size.0, size.1);

            let previous = gl.get_parameter_framebuffer(glow::DRAW_FRAMEBUFFER_BINDING);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, previous);
            if status != glow::FRAMEBUFFER_COMPLETE {
                log::warn!("Canvas framebuffer incomplete (0x{:x})", status);
                gl.delete_framebuffer(fbo);
                gl.delete_texture(texture);
                return;
            }
            self.res.canvas_fbo = Some(fbo);
            self.res.canvas_texture = Some(texture);
            self.res.canvas_size = size;
        }
    }

    fn allocate_texture(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.release_texture();
        let gl = self.gl;
        unsafe {
            let texture = gl.create_texture().map_err(RenderError::Allocation)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_storage_2d(glow::TEXTURE_2D, 1, glow::RGBA8, width as i32, height as i32);
            let err = gl.get_error();
            if err != glow::NO_ERROR {
                gl.delete_texture(texture);
                return Err(RenderError::Allocation(format!("glTexStorage2D error 0x{:x}", err)));
            }
            self.res.texture = Some(texture);
        }
        Ok(())
    }

    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        let Some(texture) = self.res.texture else {
            return Err(RenderError::Upload("no texture allocated".to_string()));
        };
        if !frame.is_well_formed() {
            return Err(RenderError::Upload(format!(
                "frame {}x{} has {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        let gl = self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                frame.width as i32,
                frame.height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(&frame.data),
            );
            let err = gl.get_error();
            if err == glow::CONTEXT_LOST {
                self.res.lost = true;
                return Err(RenderError::ContextLost);
            }
            if err != glow::NO_ERROR {
                return Err(RenderError::Upload(format!("glTexSubImage2D error 0x{:x}", err)));
            }
        }
        Ok(())
    }

    fn set_uv_rect(&mut self, uv: UvRect) {
        let Some(program) = self.res.program else {
            return;
        };
        let [u0, v0, u1, v1] = uv.as_array();
        unsafe {
            self.gl.use_program(Some(program));
            self.gl.uniform_4_f32(self.res.uv_location.as_ref(), u0, v0, u1, v1);
        }
    }

    fn draw(&mut self) {
        let (Some(program), Some(vao), Some(fbo)) =
            (self.res.program, self.res.vertex_array, self.res.canvas_fbo)
        else {
            return;
        };
        let gl = self.gl;
        let (w, h) = self.res.canvas_size;
        let (x0, y0, x1, y1) = self.res.target.corners();
        unsafe {
            let screen = gl.get_parameter_framebuffer(glow::DRAW_FRAMEBUFFER_BINDING);
            let scissor = gl.is_enabled(glow::SCISSOR_TEST);

            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(fbo));
            gl.disable(glow::SCISSOR_TEST);
            gl.viewport(0, 0, w, h);
            gl.use_program(Some(program));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, self.res.texture);
            gl.uniform_1_i32(self.res.tex_location.as_ref(), 0);
            gl.bind_vertex_array(Some(vao));
            gl.draw_arrays(glow::TRIANGLES, 0, 3);
            gl.bind_vertex_array(None);

            // Stretch the canvas over the on-screen rect.
            let read = gl.get_parameter_framebuffer(glow::READ_FRAMEBUFFER_BINDING);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(fbo));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, screen);
            if scissor {
                gl.enable(glow::SCISSOR_TEST);
            }
            gl.blit_framebuffer(0, 0, w, h, x0, y0, x1, y1, glow::COLOR_BUFFER_BIT, glow::LINEAR);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, read);
            gl.viewport(x0, y0, x1 - x0, y1 - y0);
        }
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let Some(fbo) = self.res.canvas_fbo else {
            return Err(RenderError::Readback("no canvas framebuffer".to_string()));
        };
        let gl = self.gl;
        let mut buf = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            gl.flush();
            let read = gl.get_parameter_framebuffer(glow::READ_FRAMEBUFFER_BINDING);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(fbo));
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            gl.read_pixels(
                0,
                0,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut buf),
            );
            let err = gl.get_error();
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, read);
            if err == glow::CONTEXT_LOST {
                self.res.lost = true;
                return Err(RenderError::ContextLost);
            }
            if err != glow::NO_ERROR {
                return Err(RenderError::Readback(format!("glReadPixels error 0x{:x}", err)));
            }
        }
        Ok(buf)
    }

    fn release_texture(&mut self) {
        if let Some(texture) = self.res.texture.take() {
            if !self.res.lost {
                unsafe { self.gl.delete_texture(texture) };
            }
        }
    }

    fn dispose(&mut self) {
        self.release_texture();
        self.release_canvas();
        if self.res.lost {
            self.res.forget();
            return;
        }
        unsafe {
            if let Some(vao) = self.res.vertex_array.take() {
                self.gl.delete_vertex_array(vao);
            }
            if let Some(program) = self.res.program.take() {
                self.gl.delete_program(program);
            }
        }
        self.res.uv_location = None;
        self.res.tex_location = None;
    }
}

impl GlowDevice<'_> {
    fn release_canvas(&mut self) {
        let fbo = self.res.canvas_fbo.take();
        let texture = self.res.canvas_texture.take();
        self.res.canvas_size = (0, 0);
        if self.res.lost {
            return;
        }
        unsafe {
            if let Some(fbo) = fbo {
                self.gl.delete_framebuffer(fbo);
            }
            if let Some(texture) = texture {
                self.gl.delete_texture(texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_corners() {
        let rect = ScreenRect {
            left: 30,
            bottom: 12,
            width: 600,
            height: 300,
        };
        assert_eq!(rect.corners(), (30, 12, 630, 312));
    }

    #[test]
    fn test_stays_lost_until_context_answers() {
        let mut res = GlowResources {
            lost: true,
            canvas_size: (400, 200),
            ..Default::default()
        };
        assert!(!res.note_restore_poll(glow::CONTEXT_LOST));
        assert!(!res.note_restore_poll(glow::CONTEXT_LOST));
        assert!(res.is_lost());
        assert_eq!(res.canvas_size, (400, 200));

        assert!(res.note_restore_poll(glow::NO_ERROR));
        assert!(!res.is_lost());
        assert_eq!(res.canvas_size, (0, 0));
    }

    #[test]
    fn test_live_context_needs_no_restore() {
        let mut res = GlowResources::default();
        assert!(res.note_restore_poll(glow::CONTEXT_LOST));
    }
}
