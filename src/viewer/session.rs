use glam::{Quat, Vec3, Vec4};

use crate::{
    animation::AnimationMixer,
    asset::{LoadEvent, LoadEventKind, LoadedAsset},
    camera::Camera,
    config::ViewerConfig,
    controls::{OrbitControls, PointerEvent},
    lighting::{color_from_hex, Lighting},
    math::bounds::AABB,
    model::Mesh,
    scene_graph::{Object3D, ObjectId, Scene},
    viewer::{
        FrameHandle, FrameView, ListenerHandle, ListenerKind, LoadHandle, RenderSurface,
        SessionId, ViewerHost, Viewport,
    },
};

const BACKGROUND: u32 = 0x404040;
const INITIAL_EYE: Vec3 = Vec3::new(0.0, 0.0, 5.0);
const DAMPING_FACTOR: f32 = 0.25;
const DEBUG_CUBE_SPIN: f32 = 0.01;
const MIN_EYE_DISTANCE: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Loading,
    Ready,
    LoadFailed,
    Disposed,
}

/// What the page shows about the model being loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loading { percent: Option<f64> },
    Loaded,
    Failed(String),
}

/// One viewer lifetime for one model URL. Everything the session registers with
/// its host is released again by [`ViewerSession::dispose`].
pub struct ViewerSession<S: RenderSurface> {
    id: SessionId,
    config: SessionConfig,
    state: SessionState,
    load_status: LoadStatus,
    viewport: Viewport,

    scene: Scene,
    camera: Camera,
    lighting: Lighting,
    controls: OrbitControls,
    surface: Option<S>,
    mixer: Option<AnimationMixer>,
    model_root: Option<ObjectId>,
    debug_cube: Option<ObjectId>,

    pending_frame: Option<FrameHandle>,
    load: Option<LoadHandle>,
    resize_listener: Option<ListenerHandle>,
    pointer_listener: Option<ListenerHandle>,
}

impl<S: RenderSurface> ViewerSession<S> {
    pub fn create<H>(config: SessionConfig, host: &mut H) -> anyhow::Result<Self>
    where
        H: ViewerHost<Surface = S>,
    {
        let id = SessionId::next();
        let viewport = host.container_size();
        log::debug!(
            "Creating viewer session {:?} for {} in a {}x{} container",
            id,
            config.url,
            viewport.width,
            viewport.height
        );

        let scene = Scene::new(color_from_hex(BACKGROUND));

        let mut camera = Camera::perspective(
            config.viewer.fov_degrees,
            viewport.aspect(),
            config.viewer.near,
            config.viewer.far,
        );
        camera.eye = INITIAL_EYE;
        camera.look_at(Vec3::ZERO);

        let surface = host.create_surface(viewport)?;

        let mut controls = OrbitControls::new(&camera);
        controls.enable_damping = true;
        controls.damping_factor = DAMPING_FACTOR;
        controls.enable_zoom = true;

        let mut session = Self {
            id,
            config,
            state: SessionState::Initializing,
            load_status: LoadStatus::Loading { percent: None },
            viewport,
            scene,
            camera,
            lighting: Lighting::default(),
            controls,
            surface: Some(surface),
            mixer: None,
            model_root: None,
            debug_cube: None,
            pending_frame: None,
            load: None,
            resize_listener: None,
            pointer_listener: None,
        };

        session.pointer_listener = Some(host.add_listener(id, ListenerKind::Pointer));

        if session.config.viewer.debug_mode {
            session.add_debug_cube();
        }

        session.pending_frame = Some(host.request_frame());
        log::debug!("Render loop started for session {:?}", id);

        session.load = Some(host.begin_load(id, &session.config.url));
        session.state = SessionState::Loading;

        session.resize_listener = Some(host.add_listener(id, ListenerKind::Resize));

        Ok(session)
    }

    fn add_debug_cube(&mut self) {
        let mesh = self.scene.add_mesh(Mesh::cuboid(
            "debug cube",
            Vec3::ONE,
            Vec4::new(0.0, 1.0, 0.0, 1.0),
        ));

        let mut cube = Object3D::named("debug cube");
        cube.mesh_id = Some(mesh);
        self.debug_cube = Some(self.scene.add_object(cube));

        self.scene.update_transforms();
        if let Some(surface) = self.surface.as_mut() {
            if let Err(e) = surface.upload_meshes(&self.scene) {
                log::warn!("Failed to upload debug cube: {:#}", e);
            }
        }

        log::debug!("Added debug cube to session {:?}", self.id);
    }

    /// Frame callback. Only the handle returned by the last frame request is
    /// honored, and nothing runs once the session is disposed.
    pub fn frame<H>(&mut self, host: &mut H, handle: FrameHandle) -> anyhow::Result<()>
    where
        H: ViewerHost<Surface = S>,
    {
        if self.state == SessionState::Disposed || self.pending_frame != Some(handle) {
            return Ok(());
        }

        self.pending_frame = Some(host.request_frame());

        if let Some(mixer) = self.mixer.as_mut() {
            mixer.update(self.config.viewer.frame_step, &mut self.scene);
        }

        if let Some(cube) = self.debug_cube {
            self.scene.rotate_object(
                cube,
                Quat::from_euler(glam::EulerRot::XYZ, DEBUG_CUBE_SPIN, DEBUG_CUBE_SPIN, 0.0),
            );
        }

        self.controls.update(&mut self.camera);
        self.scene.update_transforms();

        let Some(surface) = self.surface.as_mut() else {
            return Ok(());
        };

        host.draw(
            surface,
            &FrameView {
                scene: &self.scene,
                camera: &self.camera,
                lighting: &self.lighting,
            },
        )
    }

    pub fn handle_load(&mut self, event: LoadEvent) {
        if event.session != self.id {
            log::debug!(
                "Session {:?} ignoring load event for {:?}",
                self.id,
                event.session
            );
            return;
        }

        if self.state != SessionState::Loading {
            log::debug!(
                "Session {:?} ignoring load event in state {:?}",
                self.id,
                self.state
            );
            return;
        }

        match event.kind {
            LoadEventKind::Progress { loaded, total } => {
                let percent = LoadEvent::percent(loaded, total);
                match percent {
                    Some(percent) => log::info!("Loading progress: {:.2}%", percent),
                    None => log::info!("Loading progress: {} bytes", loaded),
                }
                self.load_status = LoadStatus::Loading { percent };
            }
            LoadEventKind::Loaded(asset) => {
                self.load = None;

                match self.attach_model(&asset) {
                    Ok(()) => {
                        log::info!("Model {} loaded successfully", asset.name);
                        self.state = SessionState::Ready;
                        self.load_status = LoadStatus::Loaded;
                    }
                    Err(e) => self.fail_load(format!("{:#}", e)),
                }
            }
            LoadEventKind::Failed(message) => {
                self.load = None;
                self.fail_load(message);
            }
        }
    }

    fn fail_load(&mut self, message: String) {
        log::error!("Error loading model {}: {}", self.config.url, message);
        self.state = SessionState::LoadFailed;
        self.load_status = LoadStatus::Failed(message);
    }

    fn attach_model(&mut self, asset: &LoadedAsset) -> anyhow::Result<()> {
        let spawned = self.scene.spawn_asset(asset);
        self.model_root = Some(spawned.root);

        if let Some(first_clip) = asset.animations.first() {
            log::info!("Found animations: {}", asset.animations.len());

            let mut mixer = AnimationMixer::new(spawned.nodes.clone());
            mixer.clip_action(first_clip).play();
            for action in mixer.running_actions() {
                log::debug!(
                    "Playing clip {:?} ({:.2}s)",
                    action.clip().name,
                    action.clip().duration
                );
            }
            self.mixer = Some(mixer);
        }

        self.scene.update_transforms();
        let bounds = self.scene.world_bounds(spawned.root);

        if bounds.is_empty() {
            log::warn!("Model {} has no geometry, keeping the default camera", asset.name);
        } else {
            self.frame_camera(&bounds);
        }

        if let Some(surface) = self.surface.as_mut() {
            surface.upload_meshes(&self.scene)?;
        }

        Ok(())
    }

    /// Backs the camera off along z to twice the largest extent and aims it
    /// and the controls at the bounds center.
    fn frame_camera(&mut self, bounds: &AABB) {
        let center = bounds.center();

        self.camera.eye.z = bounds.max_extent() * 2.0;
        if self.camera.eye.distance(center) < MIN_EYE_DISTANCE {
            log::warn!("Framed camera lands on the model center, backing off");
            self.camera.eye.z = center.z + MIN_EYE_DISTANCE.max(bounds.max_extent() * 2.0);
        }
        self.camera.look_at(center);
        self.controls.target = center;
        self.controls.update(&mut self.camera);
        self.controls.save_state(&self.camera);

        log::info!("Camera positioned at z: {}", self.camera.eye.z);
    }

    pub fn handle_resize(&mut self, listener: ListenerHandle, width: u32) {
        if self.state == SessionState::Disposed || self.resize_listener != Some(listener) {
            return;
        }

        self.viewport = Viewport::new(width, self.config.viewer.viewer_height);
        self.camera.aspect = self.viewport.aspect();
        self.camera.update_projection_matrix();

        if let Some(surface) = self.surface.as_mut() {
            surface.resize(self.viewport);
        }
    }

    pub fn handle_pointer(&mut self, listener: ListenerHandle, event: PointerEvent) {
        if self.state == SessionState::Disposed || self.pointer_listener != Some(listener) {
            return;
        }

        self.controls
            .handle_event(event, &self.camera, self.viewport.height);
    }

    /// Tears the session down. Every step runs even when an earlier one fails,
    /// and calling this again does nothing.
    pub fn dispose<H>(&mut self, host: &mut H)
    where
        H: ViewerHost<Surface = S>,
    {
        if self.state == SessionState::Disposed {
            return;
        }

        log::debug!("Disposing viewer session {:?}", self.id);

        if let Some(listener) = self.resize_listener.take() {
            host.remove_listener(listener);
        }

        if let Some(frame) = self.pending_frame.take() {
            host.cancel_frame(frame);
        }

        if let Some(mixer) = self.mixer.as_mut() {
            mixer.stop_all_action();
        }

        if let Some(load) = self.load.take() {
            host.cancel_load(load);
        }

        if let Some(mut surface) = self.surface.take() {
            if let Err(e) = surface.dispose() {
                log::warn!("Failed to dispose surface of session {:?}: {:#}", self.id, e);
            }
        }

        self.controls.dispose();

        if let Some(listener) = self.pointer_listener.take() {
            host.remove_listener(listener);
        }

        self.state = SessionState::Disposed;
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    /// True while the render loop has a frame scheduled.
    pub fn is_animating(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    pub fn model_root(&self) -> Option<ObjectId> {
        self.model_root
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[cfg(test)]
    pub(crate) fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }
}

impl<S: RenderSurface> Drop for ViewerSession<S> {
    fn drop(&mut self) {
        if self.state != SessionState::Disposed {
            log::warn!("Viewer session {:?} dropped without being disposed", self.id);
        }
    }
}
