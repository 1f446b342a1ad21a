use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use gltf::buffer;
use itertools::izip;

use crate::math::bounds::AABB;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct MeshPrimitive {
    pub index: usize,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<MeshPrimitive>,
}

pub type Buffers<'a> = &'a [buffer::Data];

impl Mesh {
    /// Reads the triangle primitives of a glTF mesh. Primitives in other modes are
    /// skipped; a mesh left without primitives is an error.
    pub fn from_gltf(
        name: impl Into<String>,
        mesh: gltf::Mesh,
        buffers: Buffers,
    ) -> anyhow::Result<Mesh> {
        let mut model = Mesh {
            name: name.into(),
            primitives: Vec::new(),
        };

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping primitive {} of {}: unsupported mode {:?}",
                    primitive.index(),
                    model.name,
                    primitive.mode()
                );
                continue;
            }

            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let positions: Vec<Vec3> = reader
                .read_positions()
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Primitive {} of {} has no positions",
                        primitive.index(),
                        model.name
                    )
                })?
                .map(Vec3::from)
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            if let Some(&out_of_range) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(anyhow::anyhow!(
                    "Primitive {} of {} references vertex {} out of {}",
                    primitive.index(),
                    model.name,
                    out_of_range,
                    positions.len()
                ));
            }

            let normals: Vec<Vec3> = match reader.read_normals() {
                Some(normals) => normals.map(Vec3::from).collect(),
                None => compute_normals(&positions, &indices),
            };

            let base_color = Vec4::from(
                primitive
                    .material()
                    .pbr_metallic_roughness()
                    .base_color_factor(),
            );

            let colors: Vec<Vec4> = match reader.read_colors(0) {
                Some(colors) => colors
                    .into_rgba_f32()
                    .map(|color| Vec4::from(color) * base_color)
                    .collect(),
                None => vec![base_color; positions.len()],
            };

            let vertices = izip!(positions, normals, colors)
                .map(|(position, normal, color)| Vertex {
                    position,
                    normal,
                    color: color.to_array(),
                })
                .collect::<Vec<Vertex>>();

            model.primitives.push(MeshPrimitive {
                index: primitive.index(),
                vertices,
                indices,
            });
        }

        if model.primitives.is_empty() {
            return Err(anyhow::anyhow!("Mesh without primitives: {}", model.name));
        }

        Ok(model)
    }

    /// Axis-aligned box centered on the origin with flat shaded faces.
    pub fn cuboid(name: impl Into<String>, size: Vec3, color: Vec4) -> Mesh {
        let half = size * 0.5;
        let faces = [
            (Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::Z),
            (Vec3::NEG_Y, Vec3::Z),
            (Vec3::Z, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, up) in faces {
            // right x up == normal keeps the quads counter-clockwise from outside
            let right = up.cross(normal);
            let base = vertices.len() as u32;
            let center = normal * half;
            for (u, v) in [(-1.0_f32, -1.0_f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                vertices.push(Vertex {
                    position: center + right * half * u + up * half * v,
                    normal,
                    color: color.to_array(),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Mesh {
            name: name.into(),
            primitives: vec![MeshPrimitive {
                index: 0,
                vertices,
                indices,
            }],
        }
    }

    /// Bounds of the mesh in its local space.
    pub fn bounds(&self) -> AABB {
        AABB::from_points(
            self.primitives
                .iter()
                .flat_map(|primitive| primitive.vertices.iter().map(|vertex| vertex.position)),
        )
    }
}

/// Smooth normals from the area weighted normals of the adjacent triangles.
fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let face_normal = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face_normal;
        normals[b] += face_normal;
        normals[c] += face_normal;
    }

    normals
        .into_iter()
        .map(|normal| normal.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}
