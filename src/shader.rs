use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glow::HasContext;
use thiserror::Error;

/// One compilation unit of a program, compiled on its own before linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn gl_type(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// The compiler's diagnostic log for one stage that failed to compile.
#[derive(Debug)]
pub struct CompileFailure {
    pub stage: ShaderStage,
    pub log: String,
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("could not read {stage} shader source from {}", .path.display())]
    Source {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("driver failed to allocate a shader object: {0}")]
    Allocate(String),
    #[error("{}", describe_compile_failures(.0))]
    Compile(Vec<CompileFailure>),
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

fn describe_compile_failures(failures: &[CompileFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} shader failed to compile:\n{}", f.stage, f.log.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A linked vertex + fragment program.
///
/// An instance always holds a valid, fully linked handle: construction
/// returns an error instead of an instance when any stage fails, so there is
/// no partially linked state to guard against at the call sites.
pub struct ShaderProgram {
    program: glow::NativeProgram,
}

impl ShaderProgram {
    pub fn from_files(
        gl: &glow::Context,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Self, ShaderError> {
        let vertex_src = read_source(ShaderStage::Vertex, vertex_path)?;
        let fragment_src = read_source(ShaderStage::Fragment, fragment_path)?;
        Self::from_sources(gl, &vertex_src, &fragment_src)
    }

    pub fn from_sources(
        gl: &glow::Context,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self, ShaderError> {
        // Both stages are always compiled, even when the first one fails, so
        // one run surfaces the diagnostics for both.
        let vertex = compile_stage(gl, ShaderStage::Vertex, vertex_src);
        let fragment = compile_stage(gl, ShaderStage::Fragment, fragment_src);

        let (vertex, fragment) = match (vertex, fragment) {
            (Ok(StageOutcome::Compiled(v)), Ok(StageOutcome::Compiled(f))) => (v, f),
            (vertex, fragment) => {
                let mut failures = Vec::new();
                let mut allocate = None;
                for result in [vertex, fragment] {
                    match result {
                        Ok(StageOutcome::Compiled(shader)) => unsafe { gl.delete_shader(shader) },
                        Ok(StageOutcome::Failed(failure)) => failures.push(failure),
                        Err(error) => allocate = Some(error),
                    }
                }
                return Err(combined_failure(failures, allocate));
            }
        };

        let program = match unsafe { gl.create_program() } {
            Ok(program) => program,
            Err(message) => {
                unsafe {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                }
                return Err(ShaderError::Allocate(message));
            }
        };

        unsafe {
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.link_program(program);

            // The stage objects are never needed after the link attempt.
            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                log::error!("shader program failed to link:\n{log}");
                return Err(ShaderError::Link { log });
            }
        }

        Ok(ShaderProgram { program })
    }

    /// Makes this the active program for subsequent draw calls. Idempotent.
    pub fn bind(&self, gl: &glow::Context) {
        unsafe { gl.use_program(Some(self.program)) }
    }

    pub fn set_bool(&self, gl: &glow::Context, name: &str, value: bool) {
        self.set_int(gl, name, value as i32);
    }

    pub fn set_int(&self, gl: &glow::Context, name: &str, value: i32) {
        unsafe {
            let location = gl.get_uniform_location(self.program, name);
            gl.uniform_1_i32(location.as_ref(), value);
        }
    }

    pub fn set_float(&self, gl: &glow::Context, name: &str, value: f32) {
        unsafe {
            let location = gl.get_uniform_location(self.program, name);
            gl.uniform_1_f32(location.as_ref(), value);
        }
    }

    pub fn set_mat4(&self, gl: &glow::Context, name: &str, value: &cgmath::Matrix4<f32>) {
        let slice: &[f32; 16] = value.as_ref();
        unsafe {
            let location = gl.get_uniform_location(self.program, name);
            gl.uniform_matrix_4_f32_slice(location.as_ref(), false, slice);
        }
    }

    /// Releases the program handle. GL objects cannot free themselves from
    /// `Drop` without a context, so teardown is explicit.
    pub fn delete(&self, gl: &glow::Context) {
        unsafe { gl.delete_program(self.program) }
    }
}

// Uniform names that don't exist in the linked program (typos, or variables
// the compiler optimized out) make `get_uniform_location` return `None`, and
// the set calls above fall through to a no-op. That silence matches the
// underlying GL contract; it is not an error condition.

enum StageOutcome {
    Compiled(glow::NativeShader),
    Failed(CompileFailure),
}

/// Picks the error for a build where at least one stage did not compile.
/// Source diagnostics win over a driver allocation failure when both occur.
fn combined_failure(
    failures: Vec<CompileFailure>,
    allocate: Option<ShaderError>,
) -> ShaderError {
    match allocate {
        Some(error) if failures.is_empty() => error,
        _ => ShaderError::Compile(failures),
    }
}

fn read_source(stage: ShaderStage, path: &Path) -> Result<String, ShaderError> {
    fs::read_to_string(path).map_err(|source| {
        log::error!(
            "could not read {stage} shader source from {}: {source}",
            path.display()
        );
        ShaderError::Source {
            stage,
            path: path.to_path_buf(),
            source,
        }
    })
}

fn compile_stage(
    gl: &glow::Context,
    stage: ShaderStage,
    src: &str,
) -> Result<StageOutcome, ShaderError> {
    unsafe {
        let shader = gl
            .create_shader(stage.gl_type())
            .map_err(ShaderError::Allocate)?;
        gl.shader_source(shader, src);
        gl.compile_shader(shader);

        if gl.get_shader_compile_status(shader) {
            Ok(StageOutcome::Compiled(shader))
        } else {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            log::error!("{stage} shader failed to compile:\n{log}");
            Ok(StageOutcome::Failed(CompileFailure { stage, log }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_maps_to_gl_shader_type() {
        assert_eq!(ShaderStage::Vertex.gl_type(), glow::VERTEX_SHADER);
        assert_eq!(ShaderStage::Fragment.gl_type(), glow::FRAGMENT_SHADER);
    }

    #[test]
    fn stage_display_names() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn source_error_names_stage_and_path() {
        let err = read_source(ShaderStage::Vertex, Path::new("missing/quad.vert")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("vertex"), "got: {message}");
        assert!(message.contains("missing/quad.vert"), "got: {message}");
    }

    #[test]
    fn compile_error_reports_every_failed_stage() {
        let err = ShaderError::Compile(vec![
            CompileFailure {
                stage: ShaderStage::Vertex,
                log: "0:3: 'vec9' : undeclared identifier".to_string(),
            },
            CompileFailure {
                stage: ShaderStage::Fragment,
                log: "0:7: ';' : syntax error".to_string(),
            },
        ]);
        let message = err.to_string();
        assert!(message.contains("vertex shader failed to compile"), "got: {message}");
        assert!(message.contains("fragment shader failed to compile"), "got: {message}");
        assert!(message.contains("vec9"), "got: {message}");
        assert!(message.contains("syntax error"), "got: {message}");
    }

    #[test]
    fn compile_error_trims_trailing_log_whitespace() {
        let err = ShaderError::Compile(vec![CompileFailure {
            stage: ShaderStage::Fragment,
            log: "0:1: unexpected EOF\n\n".to_string(),
        }]);
        assert!(err.to_string().ends_with("unexpected EOF"));
    }

    #[test]
    fn allocation_failure_alone_surfaces_as_allocate() {
        let err = combined_failure(Vec::new(), Some(ShaderError::Allocate("out of memory".into())));
        assert!(matches!(err, ShaderError::Allocate(_)));
    }

    #[test]
    fn compile_diagnostics_win_over_allocation_failure() {
        let failures = vec![CompileFailure {
            stage: ShaderStage::Vertex,
            log: "0:2: 'vec9' : undeclared identifier".to_string(),
        }];
        let err = combined_failure(failures, Some(ShaderError::Allocate("out of memory".into())));
        match err {
            ShaderError::Compile(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, ShaderStage::Vertex);
            }
            other => panic!("expected a compile error, got: {other}"),
        }
    }

    #[test]
    fn link_error_carries_diagnostic_log() {
        let err = ShaderError::Link {
            log: "error: varying TexCoord not written by vertex shader".to_string(),
        };
        assert!(err.to_string().contains("TexCoord"));
    }
}
