use crate::{
    asset::LoadEvent,
    config::ViewerConfig,
    controls::PointerEvent,
    viewer::{
        session::{LoadStatus, SessionConfig, ViewerSession},
        FrameHandle, ListenerHandle, RenderSurface, SessionId, ViewerHost,
    },
};

/// The mounted viewer component. Holds at most one live session and replaces it
/// whenever the model URL changes.
pub struct ModelViewer<S: RenderSurface> {
    config: ViewerConfig,
    session: Option<ViewerSession<S>>,
}

impl<S: RenderSurface> ModelViewer<S> {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Shows `url`. The previous session, if any, is fully disposed before the
    /// new one is created. Setting the URL that is already shown does nothing.
    pub fn set_url<H>(&mut self, host: &mut H, url: &str) -> anyhow::Result<()>
    where
        H: ViewerHost<Surface = S>,
    {
        if self.session.as_ref().is_some_and(|session| session.url() == url) {
            return Ok(());
        }

        log::info!("Model viewer mounting with URL: {}", url);
        self.unmount(host);

        let session = ViewerSession::create(
            SessionConfig {
                url: url.to_string(),
                viewer: self.config.clone(),
            },
            host,
        )?;
        self.session = Some(session);

        Ok(())
    }

    pub fn unmount<H>(&mut self, host: &mut H)
    where
        H: ViewerHost<Surface = S>,
    {
        if let Some(mut session) = self.session.take() {
            log::info!("Model viewer cleanup for {}", session.url());
            session.dispose(host);
        }
    }

    pub fn session(&self) -> Option<&ViewerSession<S>> {
        self.session.as_ref()
    }

    pub fn load_status(&self) -> Option<&LoadStatus> {
        self.session.as_ref().map(|session| session.load_status())
    }

    fn active(&mut self, session: SessionId) -> Option<&mut ViewerSession<S>> {
        match self.session.as_mut() {
            Some(active) if active.id() == session => Some(active),
            _ => {
                log::debug!("Dropping callback for stale session {:?}", session);
                None
            }
        }
    }

    pub fn on_frame<H>(&mut self, host: &mut H, session: SessionId, frame: FrameHandle)
    where
        H: ViewerHost<Surface = S>,
    {
        if let Some(active) = self.active(session) {
            if let Err(e) = active.frame(host, frame) {
                log::error!("Failed to render frame: {:#}", e);
            }
        }
    }

    pub fn on_resize(&mut self, session: SessionId, listener: ListenerHandle, width: u32) {
        if let Some(active) = self.active(session) {
            active.handle_resize(listener, width);
        }
    }

    pub fn on_pointer(&mut self, session: SessionId, listener: ListenerHandle, event: PointerEvent) {
        if let Some(active) = self.active(session) {
            active.handle_pointer(listener, event);
        }
    }

    pub fn on_load_event(&mut self, event: LoadEvent) {
        if let Some(active) = self.active(event.session) {
            active.handle_load(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        asset::{test_data::triangle_gltf, LoadEventKind, LoadedAsset},
        viewer::{session::SessionState, testing::FakeHost, ListenerKind},
    };

    fn viewer() -> ModelViewer<crate::viewer::testing::FakeSurface> {
        ModelViewer::new(ViewerConfig::default())
    }

    fn triangle_loaded(session: SessionId) -> LoadEvent {
        LoadEvent {
            session,
            kind: LoadEventKind::Loaded(Box::new(
                LoadedAsset::from_slice("triangle", &triangle_gltf()).unwrap(),
            )),
        }
    }

    #[test]
    fn same_url_keeps_the_session() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();

        viewer.set_url(&mut host, "/models/a.glb").unwrap();
        let first = viewer.session().unwrap().id();
        viewer.set_url(&mut host, "/models/a.glb").unwrap();

        assert_eq!(viewer.session().unwrap().id(), first);
        assert_eq!(host.active_loads().len(), 1);
        assert_eq!(host.listener_count(), 2);

        viewer.unmount(&mut host);
    }

    #[test]
    fn switching_urls_leaves_exactly_one_session_registered() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();

        for url in ["/models/a.glb", "/models/b.glb", "/models/c.glb", "/models/a.glb"] {
            viewer.set_url(&mut host, url).unwrap();
        }

        let id = viewer.session().unwrap().id();
        assert_eq!(host.listener_count(), 2);
        assert_eq!(host.removed_listeners, 6);
        assert_eq!(host.pending_frames(), 1);
        assert_eq!(host.active_loads(), vec![(id, "/models/a.glb".to_string())]);
        assert_eq!(host.disposed_surfaces(), 3);

        viewer.unmount(&mut host);
    }

    #[test]
    fn unmount_stops_the_render_loop() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();
        viewer.set_url(&mut host, "/models/a.glb").unwrap();
        let id = viewer.session().unwrap().id();

        let frame = host.take_frame().unwrap();
        viewer.on_frame(&mut host, id, frame);
        viewer.unmount(&mut host);

        assert!(viewer.session().is_none());
        assert_eq!(host.pending_frames(), 0);
        assert_eq!(host.listener_count(), 0);
        assert_eq!(host.disposed_surfaces(), 1);
        assert!(viewer.load_status().is_none());
    }

    #[test]
    fn late_load_for_replaced_session_is_dropped() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();
        viewer.set_url(&mut host, "/models/a.glb").unwrap();
        let old = viewer.session().unwrap().id();
        viewer.set_url(&mut host, "/models/b.glb").unwrap();

        viewer.on_load_event(triangle_loaded(old));

        let session = viewer.session().unwrap();
        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.model_root().is_none());

        viewer.unmount(&mut host);
    }

    #[test]
    fn callbacks_reach_the_active_session() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();
        viewer.set_url(&mut host, "/models/a.glb").unwrap();
        let id = viewer.session().unwrap().id();

        viewer.on_load_event(triangle_loaded(id));
        let resize = host.listener(id, ListenerKind::Resize).unwrap();
        viewer.on_resize(id, resize, 1600);
        let pointer = host.listener(id, ListenerKind::Pointer).unwrap();
        viewer.on_pointer(id, pointer, PointerEvent::DoubleClick);
        let frame = host.take_frame().unwrap();
        viewer.on_frame(&mut host, id, frame);

        let session = viewer.session().unwrap();
        assert_eq!(viewer.load_status(), Some(&LoadStatus::Loaded));
        assert!((session.camera().aspect - 4.0).abs() < 1e-6);
        assert!(session
            .controls()
            .target
            .abs_diff_eq(Vec3::new(2.0, 2.5, 3.0), 1e-5));
        assert_eq!(host.draws, 1);

        viewer.unmount(&mut host);
    }

    #[test]
    fn failed_session_creation_leaves_viewer_empty() {
        let mut host = FakeHost::new();
        let mut viewer = viewer();
        viewer.set_url(&mut host, "/models/a.glb").unwrap();
        host.fail_surface = true;

        assert!(viewer.set_url(&mut host, "/models/b.glb").is_err());

        assert!(viewer.session().is_none());
        assert_eq!(host.listener_count(), 0);
        assert_eq!(host.pending_frames(), 0);
    }
}
