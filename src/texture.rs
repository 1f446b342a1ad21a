use crate::viewer::Viewport;

pub struct DepthTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Viewport,
    label: String,
}

impl DepthTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(device: &wgpu::Device, size: Viewport, label: impl Into<String>) -> Self {
        let label: String = label.into();
        let texture = Self::create_wgpu_texture(device, size, &label);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        DepthTexture {
            texture,
            view,
            size,
            label,
        }
    }

    fn create_wgpu_texture(device: &wgpu::Device, size: Viewport, label: &str) -> wgpu::Texture {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };

        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    /// Recreates the texture if `size` differs from the current one.
    pub fn ensure_size(&mut self, device: &wgpu::Device, size: Viewport) {
        if self.size == size {
            return;
        }

        self.texture.destroy();
        *self = Self::new(device, size, std::mem::take(&mut self.label));
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}
