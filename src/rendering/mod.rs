pub mod global_uniform;
pub mod gpu;
pub mod imgui_renderer;
pub mod instance;
pub mod render_model;
pub mod renderer;

pub use gpu::GpuContext;
pub use imgui_renderer::ImguiRendererState;
pub use renderer::SceneRenderer;
