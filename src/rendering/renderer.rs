use std::collections::HashMap;

use anyhow::bail;
use wgpu::{CommandEncoderDescriptor, DepthBiasState, MultisampleState, StencilState};

use crate::{
    rendering::{
        global_uniform::{FrameUniform, FrameUniformState},
        instance::Instance,
        render_model::{RenderModel, RENDER_MODEL_VBL},
    },
    scene_graph::{MeshId, Scene},
    texture::DepthTexture,
    viewer::{FrameView, RenderSurface, Viewport},
};

const MODEL_SHADER: &str = include_str!("shaders/model.wgsl");

/// Draws one viewer session's scene: a background clear followed by a single
/// lit pass over every mesh instance.
pub struct SceneRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    viewport: Viewport,
    pipeline: wgpu::RenderPipeline,
    frame_uniform: FrameUniform,
    depth_texture: DepthTexture,
    render_models: HashMap<MeshId, RenderModel>,
    disposed: bool,
}

impl SceneRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        viewport: Viewport,
    ) -> Self {
        let frame_uniform = FrameUniform::new(device);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Model shader"),
            source: wgpu::ShaderSource::Wgsl(MODEL_SHADER.into()),
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Model pipeline layout"),
                bind_group_layouts: &[&frame_uniform.bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Model render pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[RENDER_MODEL_VBL, Instance::descriptor()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // glTF materials are often double sided
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthTexture::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let depth_texture = DepthTexture::new(device, viewport, "Viewer depth texture");

        Self {
            device: device.clone(),
            queue: queue.clone(),
            viewport,
            pipeline,
            frame_uniform,
            depth_texture,
            render_models: HashMap::new(),
            disposed: false,
        }
    }

    fn gather_instances(&mut self, scene: &Scene) {
        for render_model in self.render_models.values_mut() {
            render_model.instances.clear();
        }

        for (mesh_id, world_matrix) in scene.mesh_instances() {
            if let Some(render_model) = self.render_models.get_mut(&mesh_id) {
                render_model.instances.add(Instance {
                    model: world_matrix,
                });
            }
        }

        for render_model in self.render_models.values_mut() {
            if render_model.instances.should_render() {
                render_model
                    .instance_buffer
                    .write(&self.device, &self.queue, &render_model.instances);
            }
        }
    }

    /// Renders `frame` into `target`, which must match the size passed to the
    /// last `resize`.
    pub fn render(&mut self, target: &wgpu::TextureView, frame: &FrameView) -> anyhow::Result<()> {
        if self.disposed {
            bail!("Rendering with a disposed scene renderer");
        }

        self.depth_texture.ensure_size(&self.device, self.viewport);
        self.frame_uniform.update(
            &self.queue,
            FrameUniformState::new(frame.camera, frame.lighting),
        );
        self.gather_instances(frame.scene);

        let background = frame.scene.background;

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Viewer encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Model pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: background.x as f64,
                            g: background.y as f64,
                            b: background.z as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.depth_texture.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.frame_uniform.bind_group, &[]);

            for render_model in self.render_models.values() {
                if render_model.instances.should_render() {
                    render_model.draw(&mut render_pass);
                }
            }
        }

        self.queue.submit([encoder.finish()]);

        Ok(())
    }
}

impl RenderSurface for SceneRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn upload_meshes(&mut self, scene: &Scene) -> anyhow::Result<()> {
        if self.disposed {
            bail!("Uploading meshes to a disposed scene renderer");
        }

        for (mesh_id, mesh) in scene.meshes.iter() {
            if self.render_models.contains_key(&mesh_id) {
                continue;
            }

            let render_model = RenderModel::from_mesh(&self.device, mesh);
            log::debug!(
                "Uploaded mesh {} with {} primitives",
                mesh.name,
                render_model.primitives.len()
            );
            self.render_models.insert(mesh_id, render_model);
        }

        Ok(())
    }

    fn dispose(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            bail!("Scene renderer disposed twice");
        }

        self.disposed = true;

        for (_, render_model) in self.render_models.drain() {
            render_model.destroy();
        }
        self.depth_texture.destroy();
        self.frame_uniform.destroy();

        Ok(())
    }
}
