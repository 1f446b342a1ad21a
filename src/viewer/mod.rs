//! The model viewer: one [`ViewerSession`](session::ViewerSession) per mounted URL, driven by a
//! [`ViewerHost`] that owns the window, frame scheduling and asset loading.

pub mod model_viewer;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{camera::Camera, lighting::Lighting, scene_graph::Scene};

pub use model_viewer::ModelViewer;
pub use session::LoadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Resize,
    /// Pointer input on the rendering surface, consumed by the orbit controls.
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }

        self.width as f32 / self.height as f32
    }
}

/// What a session hands to the host for one rendered frame.
pub struct FrameView<'a> {
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub lighting: &'a Lighting,
}

/// Per session rendering resources living inside the host's container.
pub trait RenderSurface {
    fn resize(&mut self, viewport: Viewport);

    /// Creates GPU side copies of any scene meshes not uploaded yet.
    fn upload_meshes(&mut self, scene: &Scene) -> anyhow::Result<()>;

    /// Releases the underlying graphics resources. Further use is an error.
    fn dispose(&mut self) -> anyhow::Result<()>;
}

/// The environment a viewer session lives in. Every registration a session
/// makes here is undone by the session's `dispose`.
pub trait ViewerHost {
    type Surface: RenderSurface;

    fn container_size(&self) -> Viewport;

    /// Creates a rendering surface and inserts it into the container.
    fn create_surface(&mut self, viewport: Viewport) -> anyhow::Result<Self::Surface>;

    fn draw(&mut self, surface: &mut Self::Surface, frame: &FrameView) -> anyhow::Result<()>;

    /// Schedules one call to the session's frame callback on the next display refresh.
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);

    fn add_listener(&mut self, session: SessionId, kind: ListenerKind) -> ListenerHandle;

    fn remove_listener(&mut self, handle: ListenerHandle);

    /// Starts loading `url` in the background. Events are delivered back to the
    /// viewer tagged with `session`.
    fn begin_load(&mut self, session: SessionId, url: &str) -> LoadHandle;

    fn cancel_load(&mut self, handle: LoadHandle);
}
