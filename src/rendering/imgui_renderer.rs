use anyhow::anyhow;
use imgui_wgpu::RendererConfig;
use wgpu::TextureView;

/// Draws the page UI on top of whatever the frame already contains.
pub struct ImguiRendererState {
    renderer: imgui_wgpu::Renderer,
}

impl ImguiRendererState {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture_format: wgpu::TextureFormat,
        context: &mut imgui::Context,
    ) -> Self {
        let renderer_config = RendererConfig {
            texture_format,
            ..Default::default()
        };

        Self {
            renderer: imgui_wgpu::Renderer::new(context, device, queue, renderer_config),
        }
    }

    pub fn render(
        &mut self,
        view: &TextureView,
        context: &mut imgui::Context,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> anyhow::Result<()> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Imgui encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Imgui render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let draw_data = context.render();

            // Workaround for memory safety related crash in imgui-rs
            // https://github.com/imgui-rs/imgui-rs/issues/325
            if draw_data.draw_lists_count() > 0 {
                self.renderer
                    .render(draw_data, queue, device, &mut render_pass)
                    .map_err(|e| anyhow!("Rendering Imgui failed: {:?}", e))?;
            }
        }

        queue.submit([encoder.finish()]);

        Ok(())
    }
}
