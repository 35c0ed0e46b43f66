use glow::HasContext;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("driver failed to allocate a buffer object: {0}")]
pub struct MeshError(String);

/// One vertex attribute within the interleaved vertex buffer.
#[derive(Debug, Clone)]
pub struct Layout {
    pub index: u32,
    pub size: i32,
    pub offset: usize,
}

/// Floats per vertex: position xyz + texture coordinates uv.
pub const QUAD_FLOATS_PER_VERTEX: usize = 5;

/// A unit quad: two triangles sharing a diagonal, with texture coordinates
/// covering the full image.
pub fn quad() -> (Vec<f32>, Vec<u32>) {
    let vertices = vec![
        //  Position            Tex coords
        0.5, 0.5, 0.0, 1.0, 1.0, // top right
        0.5, -0.5, 0.0, 1.0, 0.0, // bottom right
        -0.5, -0.5, 0.0, 0.0, 0.0, // bottom left
        -0.5, 0.5, 0.0, 0.0, 1.0, // top left
    ];
    let indices = vec![
        0, 1, 3, // first triangle
        1, 2, 3, // second triangle
    ];
    (vertices, indices)
}

pub fn quad_layout() -> Vec<Layout> {
    vec![
        Layout {
            index: 0,
            size: 3,
            offset: 0,
        },
        Layout {
            index: 1,
            size: 2,
            offset: 3 * std::mem::size_of::<f32>(),
        },
    ]
}

pub struct Mesh {
    vao: glow::NativeVertexArray,
    vbo: glow::NativeBuffer,
    ebo: glow::NativeBuffer,
    index_count: i32,
}

impl Mesh {
    pub fn new(
        gl: &glow::Context,
        vertices: &[f32],
        indices: &[u32],
        floats_per_vertex: usize,
        layouts: &[Layout],
    ) -> Result<Self, MeshError> {
        let stride = (floats_per_vertex * std::mem::size_of::<f32>()) as i32;

        unsafe {
            let vao = gl.create_vertex_array().map_err(MeshError)?;
            gl.bind_vertex_array(Some(vao));

            let vbo = match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(message) => {
                    gl.delete_vertex_array(vao);
                    return Err(MeshError(message));
                }
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );

            let ebo = match gl.create_buffer() {
                Ok(ebo) => ebo,
                Err(message) => {
                    gl.delete_buffer(vbo);
                    gl.delete_vertex_array(vao);
                    return Err(MeshError(message));
                }
            };
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                glow::STATIC_DRAW,
            );

            for layout in layouts {
                gl.vertex_attrib_pointer_f32(
                    layout.index,
                    layout.size,
                    glow::FLOAT,
                    false,
                    stride,
                    layout.offset as i32,
                );
                gl.enable_vertex_attrib_array(layout.index);
            }

            Ok(Mesh {
                vao,
                vbo,
                ebo,
                index_count: indices.len() as i32,
            })
        }
    }

    pub fn draw(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
            gl.draw_elements(glow::TRIANGLES, self.index_count, glow::UNSIGNED_INT, 0);
        }
    }

    pub fn delete(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_buffer(self.ebo);
            gl.delete_buffer(self.vbo);
            gl.delete_vertex_array(self.vao);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_has_four_vertices() {
        let (vertices, _) = quad();
        assert_eq!(vertices.len() % QUAD_FLOATS_PER_VERTEX, 0);
        assert_eq!(vertices.len() / QUAD_FLOATS_PER_VERTEX, 4);
    }

    #[test]
    fn quad_indices_form_two_triangles() {
        let (vertices, indices) = quad();
        assert_eq!(indices.len(), 6);
        let vertex_count = (vertices.len() / QUAD_FLOATS_PER_VERTEX) as u32;
        assert!(indices.iter().all(|&i| i < vertex_count));
    }

    #[test]
    fn quad_tex_coords_stay_in_unit_range() {
        let (vertices, _) = quad();
        for chunk in vertices.chunks(QUAD_FLOATS_PER_VERTEX) {
            let (u, v) = (chunk[3], chunk[4]);
            assert!((0.0..=1.0).contains(&u));
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn quad_layout_covers_the_whole_vertex() {
        let layouts = quad_layout();
        let floats: i32 = layouts.iter().map(|l| l.size).sum();
        assert_eq!(floats as usize, QUAD_FLOATS_PER_VERTEX);
        assert_eq!(layouts[1].offset, 3 * std::mem::size_of::<f32>());
    }
}
