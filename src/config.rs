use std::path::PathBuf;

use clap::Parser;

/// Command line configuration. Shader and texture paths are flags with
/// relative defaults so the demo runs from the repository root.
#[derive(Debug, Parser)]
#[command(name = "textured_quads", about = "Renders two animated, texture-blended quads")]
pub struct Config {
    /// Path to the vertex shader source.
    #[arg(long, default_value = "shaders/quad.vert")]
    pub vertex_shader: PathBuf,

    /// Path to the fragment shader source.
    #[arg(long, default_value = "shaders/quad.frag")]
    pub fragment_shader: PathBuf,

    /// First texture, sampled on unit 0.
    #[arg(long, default_value = "assets/container.jpg")]
    pub texture1: PathBuf,

    /// Second texture, sampled on unit 1 and blended over the first.
    #[arg(long, default_value = "assets/awesomeface.png")]
    pub texture2: PathBuf,

    /// Initial window width in pixels.
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value_t = 600)]
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_repo_relative_paths() {
        let config = Config::try_parse_from(["textured_quads"]).unwrap();
        assert_eq!(config.vertex_shader, PathBuf::from("shaders/quad.vert"));
        assert_eq!(config.fragment_shader, PathBuf::from("shaders/quad.frag"));
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "textured_quads",
            "--vertex-shader",
            "other/shader.vert",
            "--width",
            "1280",
        ])
        .unwrap();
        assert_eq!(config.vertex_shader, PathBuf::from("other/shader.vert"));
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 600);
    }

    #[test]
    fn rejects_non_numeric_window_size() {
        assert!(Config::try_parse_from(["textured_quads", "--width", "wide"]).is_err());
    }
}
