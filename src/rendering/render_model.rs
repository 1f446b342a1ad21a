use std::mem::offset_of;

use wgpu::util::DeviceExt;

use crate::{
    model::{Mesh, MeshPrimitive, Vertex},
    rendering::instance::{InstanceBuffer, Instances},
};

pub struct RenderPrimitive {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

impl RenderPrimitive {
    fn from_primitive(device: &wgpu::Device, mesh: &Mesh, primitive: &MeshPrimitive) -> Self {
        let vertex_buffer_name = format!(
            "Vertex buffer ({}, primitive {})",
            mesh.name, primitive.index
        );
        let index_buffer_name = format!(
            "Index buffer ({}, primitive {})",
            mesh.name, primitive.index
        );

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&vertex_buffer_name),
            contents: bytemuck::cast_slice(&primitive.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&index_buffer_name),
            contents: bytemuck::cast_slice(&primitive.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: primitive.indices.len() as u32,
        }
    }
}

/// GPU copy of one mesh plus the instances drawing it this frame.
pub struct RenderModel {
    pub primitives: Vec<RenderPrimitive>,
    pub instances: Instances,
    pub instance_buffer: InstanceBuffer,
}

impl RenderModel {
    pub fn from_mesh(device: &wgpu::Device, mesh: &Mesh) -> Self {
        let primitives = mesh
            .primitives
            .iter()
            .filter(|primitive| !primitive.indices.is_empty())
            .map(|primitive| RenderPrimitive::from_primitive(device, mesh, primitive))
            .collect();

        RenderModel {
            primitives,
            instances: Instances::new(),
            instance_buffer: InstanceBuffer::new(device, &mesh.name),
        }
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.instance_buffer.bind(render_pass);

        for primitive in &self.primitives {
            render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
            render_pass.set_index_buffer(primitive.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..primitive.num_indices, 0, 0..self.instances.len() as u32);
        }
    }

    pub fn destroy(&self) {
        for primitive in &self.primitives {
            primitive.vertex_buffer.destroy();
            primitive.index_buffer.destroy();
        }
        self.instance_buffer.destroy();
    }
}

pub const RENDER_MODEL_VBL: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, normal) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, color) as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x4,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_covers_the_whole_vertex() {
        let attributes = RENDER_MODEL_VBL.attributes;
        let last = attributes.last().unwrap();

        assert_eq!(RENDER_MODEL_VBL.array_stride, 40);
        assert_eq!(last.offset + last.format.size(), RENDER_MODEL_VBL.array_stride);
    }
}
