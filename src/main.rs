use std::ffi::CString;
use std::num::NonZeroU32;
use std::time::Instant;

use anyhow::Context as _;
use cgmath::{Matrix4, Rad, Vector3};
use clap::Parser;
use glow::HasContext;
use glutin::config::ConfigTemplate;
use glutin::context::{ContextAttributesBuilder, PossiblyCurrentContext};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::{Window, WindowId};

mod config;
use config::Config;

mod logging;

mod mesh;
use mesh::Mesh;

mod shader;
use shader::ShaderProgram;

mod texture;
use texture::Texture;

/// How much one key press moves the texture blend factor.
const MIX_STEP: f32 = 0.01;

fn step_mix(value: f32, delta: f32) -> f32 {
    (value + delta).clamp(0.0, 1.0)
}

/// Everything that lives on the GPU for the demo.
struct Scene {
    shader: ShaderProgram,
    quad: Mesh,
    texture1: Texture,
    texture2: Texture,
}

struct App {
    config: Config,
    started: Instant,
    mix_value: f32,
    startup_error: Option<anyhow::Error>,

    window: Option<Window>,
    current_context: Option<PossiblyCurrentContext>,
    surface: Option<Surface<WindowSurface>>,
    gl: Option<glow::Context>,
    scene: Option<Scene>,
}

impl App {
    fn new(config: Config) -> Self {
        App {
            config,
            started: Instant::now(),
            mix_value: 0.2,
            startup_error: None,
            window: None,
            current_context: None,
            surface: None,
            gl: None,
            scene: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attributes = Window::default_attributes()
            .with_title("Textured quads")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = event_loop
            .create_window(attributes)
            .context("failed to create window")?;

        // Get platform-specific handles to the display and window
        let display_handle = window.display_handle()?;
        let window_handle = window.window_handle()?;

        #[cfg(target_os = "windows")]
        let preference = DisplayApiPreference::Wgl(Some(window_handle.into()));
        #[cfg(not(target_os = "windows"))]
        let preference = DisplayApiPreference::Egl;

        let display = unsafe { Display::new(display_handle.into(), preference) }
            .context("failed to create GL display")?;

        let config_template = ConfigTemplate::default();
        let gl_config = unsafe { display.find_configs(config_template) }
            .context("failed to enumerate GL configs")?
            .next()
            .context("no matching GL config")?;

        let physical_size = window.inner_size();
        let width = NonZeroU32::new(physical_size.width).context("window has zero width")?;
        let height = NonZeroU32::new(physical_size.height).context("window has zero height")?;

        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            window_handle.into(),
            width,
            height,
        );
        let surface = unsafe { display.create_window_surface(&gl_config, &surface_attributes) }
            .context("failed to create window surface")?;

        let context_attributes = ContextAttributesBuilder::new().build(Some(window_handle.into()));
        let non_current_context = unsafe { display.create_context(&gl_config, &context_attributes) }
            .context("failed to create GL context")?;
        let current_context = non_current_context
            .make_current(&surface)
            .context("failed to make GL context current")?;

        let gl = unsafe {
            glow::Context::from_loader_function(|s| {
                let symbol = CString::new(s).unwrap();
                display.get_proc_address(&symbol) as *const _
            })
        };

        let shader = ShaderProgram::from_files(
            &gl,
            &self.config.vertex_shader,
            &self.config.fragment_shader,
        )
        .context("failed to build shader program")?;

        let texture1 = Texture::from_file(&gl, &self.config.texture1)?;
        let texture2 = Texture::from_file(&gl, &self.config.texture2)?;
        log::info!(
            "loaded textures {}x{} and {}x{}",
            texture1.width,
            texture1.height,
            texture2.width,
            texture2.height
        );

        let (vertices, indices) = mesh::quad();
        let quad = Mesh::new(
            &gl,
            &vertices,
            &indices,
            mesh::QUAD_FLOATS_PER_VERTEX,
            &mesh::quad_layout(),
        )?;

        // The sampler bindings never change, set them once up front.
        shader.bind(&gl);
        shader.set_int(&gl, "texture1", 0);
        shader.set_int(&gl, "texture2", 1);

        self.window = Some(window);
        self.current_context = Some(current_context);
        self.surface = Some(surface);
        self.gl = Some(gl);
        self.scene = Some(Scene {
            shader,
            quad,
            texture1,
            texture2,
        });

        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => {
                self.teardown();
                event_loop.exit();
            }
            PhysicalKey::Code(KeyCode::ArrowUp | KeyCode::KeyW) => {
                self.mix_value = step_mix(self.mix_value, MIX_STEP);
            }
            PhysicalKey::Code(KeyCode::ArrowDown | KeyCode::KeyS) => {
                self.mix_value = step_mix(self.mix_value, -MIX_STEP);
            }
            _ => (),
        }
    }

    fn resize(&self, size: PhysicalSize<u32>) {
        let (Some(gl), Some(surface), Some(context)) = (
            self.gl.as_ref(),
            self.surface.as_ref(),
            self.current_context.as_ref(),
        ) else {
            return;
        };
        let (Some(width), Some(height)) =
            (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return;
        };

        surface.resize(context, width, height);
        unsafe { gl.viewport(0, 0, size.width as i32, size.height as i32) };
    }

    fn redraw(&mut self) {
        let (Some(gl), Some(scene), Some(surface), Some(context), Some(window)) = (
            self.gl.as_ref(),
            self.scene.as_ref(),
            self.surface.as_ref(),
            self.current_context.as_ref(),
            self.window.as_ref(),
        ) else {
            return;
        };

        let t = self.started.elapsed().as_secs_f32();

        unsafe {
            gl.clear_color(0.2, 0.3, 0.3, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }

        scene.texture1.bind(gl, 0);
        scene.texture2.bind(gl, 1);

        scene.shader.bind(gl);
        scene.shader.set_float(gl, "mixValue", self.mix_value);

        // First quad: swings in the lower right corner.
        let transform = Matrix4::from_translation(Vector3::new(0.5, -0.5, 0.0))
            * Matrix4::from_angle_z(Rad(t.sin()));
        scene.shader.set_mat4(gl, "transform", &transform);
        scene.quad.draw(gl);

        // Second quad: pulses in the upper left corner.
        let transform = Matrix4::from_translation(Vector3::new(-0.2, 0.2, 0.0))
            * Matrix4::from_nonuniform_scale(t.cos(), 0.5, 0.5);
        scene.shader.set_mat4(gl, "transform", &transform);
        scene.quad.draw(gl);

        if let Err(e) = surface.swap_buffers(context) {
            log::error!("failed to swap buffers: {e}");
        }

        window.request_redraw();
    }

    /// The process exit result: the recorded startup error, if any, so a
    /// failed shader build or texture load is visible in the exit status.
    fn into_result(self) -> anyhow::Result<()> {
        match self.startup_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn teardown(&mut self) {
        if let (Some(gl), Some(scene)) = (self.gl.as_ref(), self.scene.take()) {
            scene.shader.delete(gl);
            scene.quad.delete(gl);
            scene.texture1.delete(gl);
            scene.texture2.delete(gl);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("failed to start: {e:#}");
            self.startup_error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, event),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => (),
        }
    }
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let config = Config::parse();

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_steps_up_and_down() {
        let up = step_mix(0.2, MIX_STEP);
        assert!((up - 0.21).abs() < 1e-6);
        let down = step_mix(up, -MIX_STEP);
        assert!((down - 0.2).abs() < 1e-6);
    }

    #[test]
    fn mix_clamps_to_unit_range() {
        assert_eq!(step_mix(1.0, MIX_STEP), 1.0);
        assert_eq!(step_mix(0.0, -MIX_STEP), 0.0);
    }

    #[test]
    fn recorded_startup_error_fails_the_process() {
        let config = Config::try_parse_from(["textured_quads"]).unwrap();
        let mut app = App::new(config);
        app.startup_error = Some(anyhow::anyhow!("fragment shader failed to compile"));
        assert!(app.into_result().is_err());
    }

    #[test]
    fn clean_startup_exits_ok() {
        let config = Config::try_parse_from(["textured_quads"]).unwrap();
        let app = App::new(config);
        assert!(app.into_result().is_ok());
    }

    #[test]
    fn transforms_differ_per_quad() {
        // The two quads must not end up on top of each other at t = 0.
        let first = Matrix4::from_translation(Vector3::new(0.5, -0.5, 0.0))
            * Matrix4::from_angle_z(Rad(0.0_f32));
        let second = Matrix4::from_translation(Vector3::new(-0.2, 0.2, 0.0))
            * Matrix4::from_nonuniform_scale(1.0, 0.5, 0.5);
        assert_ne!(first, second);
    }
}
