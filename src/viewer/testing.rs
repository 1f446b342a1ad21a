use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use anyhow::bail;

use crate::{
    scene_graph::Scene,
    viewer::{
        FrameHandle, FrameView, ListenerHandle, ListenerKind, LoadHandle, RenderSurface,
        SessionId, ViewerHost, Viewport,
    },
};

pub(crate) struct FakeSurface {
    pub viewport: Viewport,
    pub uploaded_meshes: usize,
    disposed: bool,
    fail_dispose: bool,
    disposed_counter: Rc<Cell<usize>>,
}

impl RenderSurface for FakeSurface {
    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn upload_meshes(&mut self, scene: &Scene) -> anyhow::Result<()> {
        if self.disposed {
            bail!("surface already disposed");
        }

        self.uploaded_meshes = scene.meshes.len();
        Ok(())
    }

    fn dispose(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            bail!("surface already disposed");
        }

        self.disposed = true;
        self.disposed_counter.set(self.disposed_counter.get() + 1);

        if self.fail_dispose {
            bail!("lost device");
        }

        Ok(())
    }
}

/// Records every registration so tests can check that sessions clean up after
/// themselves. Frames only fire when a test takes them.
pub(crate) struct FakeHost {
    pub size: Viewport,
    pub fail_surface: bool,
    pub fail_surface_dispose: bool,
    pub draws: usize,
    pub removed_listeners: usize,
    pub cancelled_loads: usize,
    next_handle: u64,
    frames: BTreeSet<FrameHandle>,
    listeners: BTreeMap<ListenerHandle, (SessionId, ListenerKind)>,
    loads: BTreeMap<LoadHandle, (SessionId, String)>,
    disposed_surfaces: Rc<Cell<usize>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            size: Viewport::new(800, 400),
            fail_surface: false,
            fail_surface_dispose: false,
            draws: 0,
            removed_listeners: 0,
            cancelled_loads: 0,
            next_handle: 1,
            frames: BTreeSet::new(),
            listeners: BTreeMap::new(),
            loads: BTreeMap::new(),
            disposed_surfaces: Rc::new(Cell::new(0)),
        }
    }

    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Fires the oldest pending frame: it is no longer pending, and the caller
    /// hands it to the session.
    pub fn take_frame(&mut self) -> Option<FrameHandle> {
        self.frames.pop_first()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn listener(&self, session: SessionId, kind: ListenerKind) -> Option<ListenerHandle> {
        self.listeners
            .iter()
            .find(|(_, registered)| **registered == (session, kind))
            .map(|(&handle, _)| handle)
    }

    pub fn active_loads(&self) -> Vec<(SessionId, String)> {
        self.loads.values().cloned().collect()
    }

    pub fn loads_for(&self, session: SessionId) -> Vec<String> {
        self.loads
            .values()
            .filter(|(owner, _)| *owner == session)
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn disposed_surfaces(&self) -> usize {
        self.disposed_surfaces.get()
    }
}

impl ViewerHost for FakeHost {
    type Surface = FakeSurface;

    fn container_size(&self) -> Viewport {
        self.size
    }

    fn create_surface(&mut self, viewport: Viewport) -> anyhow::Result<FakeSurface> {
        if self.fail_surface {
            bail!("no adapter");
        }

        Ok(FakeSurface {
            viewport,
            uploaded_meshes: 0,
            disposed: false,
            fail_dispose: self.fail_surface_dispose,
            disposed_counter: self.disposed_surfaces.clone(),
        })
    }

    fn draw(&mut self, surface: &mut FakeSurface, _frame: &FrameView) -> anyhow::Result<()> {
        if surface.disposed {
            bail!("drawing to a disposed surface");
        }

        self.draws += 1;
        Ok(())
    }

    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.handle());
        self.frames.insert(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.frames.remove(&handle);
    }

    fn add_listener(&mut self, session: SessionId, kind: ListenerKind) -> ListenerHandle {
        let handle = ListenerHandle(self.handle());
        self.listeners.insert(handle, (session, kind));
        handle
    }

    fn remove_listener(&mut self, handle: ListenerHandle) {
        if self.listeners.remove(&handle).is_some() {
            self.removed_listeners += 1;
        }
    }

    fn begin_load(&mut self, session: SessionId, url: &str) -> LoadHandle {
        let handle = LoadHandle(self.handle());
        self.loads.insert(handle, (session, url.to_string()));
        handle
    }

    fn cancel_load(&mut self, handle: LoadHandle) {
        if self.loads.remove(&handle).is_some() {
            self.cancelled_loads += 1;
        }
    }
}
