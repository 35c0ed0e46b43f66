use std::path::{Path, PathBuf};

use glow::HasContext;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("could not load texture {}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("driver failed to allocate a texture object: {0}")]
    Allocate(String),
}

pub struct Texture {
    texture: glow::NativeTexture,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Decodes an image file and uploads it as a mipmapped RGBA texture with
    /// repeat wrapping and linear filtering. The image is flipped vertically
    /// so its origin matches GL texture coordinates.
    pub fn from_file(gl: &glow::Context, path: &Path) -> Result<Self, TextureError> {
        let img = image::open(path)
            .map_err(|source| TextureError::Load {
                path: path.to_path_buf(),
                source,
            })?
            .flipv()
            .to_rgba8();
        let (width, height) = img.dimensions();
        let data = img.into_raw();

        unsafe {
            let texture = gl.create_texture().map_err(TextureError::Allocate)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));

            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR_MIPMAP_LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );

            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(&data)),
            );

            gl.generate_mipmap(glow::TEXTURE_2D);

            Ok(Texture {
                texture,
                width,
                height,
            })
        }
    }

    /// Binds this texture to the given texture unit.
    pub fn bind(&self, gl: &glow::Context, unit: u32) {
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
        }
    }

    pub fn delete(&self, gl: &glow::Context) {
        unsafe { gl.delete_texture(self.texture) }
    }
}
