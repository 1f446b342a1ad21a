use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use glam::Vec2;
use imgui::{FontConfig, FontSource};
use imgui_winit_support::WinitPlatform;
use tokio::runtime::Runtime;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::{
    asset::{AssetLoader, AssetLocation, LoadEvent, LoadEventKind, LoadTask},
    config::ViewerConfig,
    controls::{PointerButton, PointerEvent},
    listing::{self, ModelDescriptor},
    rendering::{GpuContext, ImguiRendererState, SceneRenderer},
    ui::{ModelPicker, Selection, PAGE_TITLE},
    viewer::{
        FrameHandle, FrameView, ListenerHandle, ListenerKind, LoadHandle, ModelViewer, SessionId,
        ViewerHost, Viewport,
    },
};

const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(300);
const INITIAL_WIDTH: u32 = 960;
const MIN_WIDTH: u32 = 320;

pub enum AppEvent {
    Load(LoadEvent),
    Models(Result<Vec<ModelDescriptor>, String>),
}

/// Turns raw mouse input into orbit control gestures.
#[derive(Debug, Default)]
struct PointerTracker {
    position: Option<Vec2>,
    primary: bool,
    secondary: bool,
    last_click: Option<Instant>,
}

impl PointerTracker {
    fn on_button(
        &mut self,
        button: MouseButton,
        state: ElementState,
        now: Instant,
    ) -> Option<PointerEvent> {
        let pressed = state == ElementState::Pressed;

        match button {
            MouseButton::Left => {
                self.primary = pressed;

                if pressed {
                    let double = self
                        .last_click
                        .is_some_and(|last| now.duration_since(last) <= DOUBLE_CLICK_INTERVAL);

                    if double {
                        self.last_click = None;
                        return Some(PointerEvent::DoubleClick);
                    }

                    self.last_click = Some(now);
                }
            }
            MouseButton::Right => self.secondary = pressed,
            _ => {}
        }

        None
    }

    fn on_move(&mut self, position: Vec2) -> Option<PointerEvent> {
        let previous = self.position.replace(position)?;
        let delta = position - previous;

        let button = if self.primary {
            PointerButton::Primary
        } else if self.secondary {
            PointerButton::Secondary
        } else {
            return None;
        };

        Some(PointerEvent::Drag { button, delta })
    }

    fn on_wheel(delta: MouseScrollDelta) -> PointerEvent {
        let delta = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => position.y as f32,
        };

        PointerEvent::Wheel { delta }
    }
}

/// The desktop stand-in for the page: one window whose full width and fixed
/// height form the viewer container.
pub struct WindowHost {
    gpu: GpuContext,
    viewer_height: u32,
    server_url: Option<String>,
    models_dir: PathBuf,
    loader: AssetLoader,
    proxy: EventLoopProxy<AppEvent>,

    next_handle: u64,
    pending_frame: Option<FrameHandle>,
    listeners: HashMap<ListenerHandle, (SessionId, ListenerKind)>,
    loads: HashMap<LoadHandle, LoadTask>,

    target: Option<wgpu::TextureView>,
    drawn: bool,
}

impl WindowHost {
    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn take_frame(&mut self) -> Option<FrameHandle> {
        self.pending_frame.take()
    }

    fn listeners_of(&self, kind: ListenerKind) -> Vec<(ListenerHandle, SessionId)> {
        self.listeners
            .iter()
            .filter(|(_, (_, listener_kind))| *listener_kind == kind)
            .map(|(&handle, &(session, _))| (handle, session))
            .collect()
    }

    fn send_load_event(proxy: &EventLoopProxy<AppEvent>, event: LoadEvent) {
        if proxy.send_event(AppEvent::Load(event)).is_err() {
            log::debug!("Event loop closed, dropping load event");
        }
    }
}

impl ViewerHost for WindowHost {
    type Surface = SceneRenderer;

    fn container_size(&self) -> Viewport {
        Viewport::new(self.gpu.surface_config.width, self.viewer_height)
    }

    fn create_surface(&mut self, viewport: Viewport) -> anyhow::Result<SceneRenderer> {
        Ok(SceneRenderer::new(
            &self.gpu.device,
            &self.gpu.queue,
            self.gpu.format(),
            viewport,
        ))
    }

    fn draw(&mut self, surface: &mut SceneRenderer, frame: &FrameView) -> anyhow::Result<()> {
        let Some(target) = self.target.as_ref() else {
            anyhow::bail!("Draw requested outside of a redraw");
        };

        surface.render(target, frame)?;
        self.drawn = true;

        Ok(())
    }

    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.handle());
        self.pending_frame = Some(handle);
        self.gpu.window.request_redraw();
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending_frame == Some(handle) {
            self.pending_frame = None;
        }
    }

    fn add_listener(&mut self, session: SessionId, kind: ListenerKind) -> ListenerHandle {
        let handle = ListenerHandle(self.handle());
        self.listeners.insert(handle, (session, kind));
        handle
    }

    fn remove_listener(&mut self, handle: ListenerHandle) {
        self.listeners.remove(&handle);
    }

    fn begin_load(&mut self, session: SessionId, url: &str) -> LoadHandle {
        let handle = LoadHandle(self.handle());
        self.loads.retain(|_, task| !task.is_finished());

        match AssetLocation::resolve(url, self.server_url.as_deref(), &self.models_dir) {
            Ok(location) => {
                log::info!("Loading model from {}", location);

                let proxy = self.proxy.clone();
                let task = self.loader.load(session, location, move |event| {
                    WindowHost::send_load_event(&proxy, event)
                });
                self.loads.insert(handle, task);
            }
            Err(e) => WindowHost::send_load_event(
                &self.proxy,
                LoadEvent {
                    session,
                    kind: LoadEventKind::Failed(e.to_string()),
                },
            ),
        }

        handle
    }

    fn cancel_load(&mut self, handle: LoadHandle) {
        if let Some(task) = self.loads.remove(&handle) {
            task.abort();
        }
    }
}

struct ImguiState {
    context: imgui::Context,
    platform: WinitPlatform,
    renderer: ImguiRendererState,
}

impl ImguiState {
    fn new(window: &Window, gpu: &GpuContext) -> Self {
        let mut context = imgui::Context::create();
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(
            context.io_mut(),
            window,
            imgui_winit_support::HiDpiMode::Default,
        );

        let font_size = 14.0;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        // Disable INI support because it's broken in the published version of imgui
        context.set_ini_filename(None);

        let renderer = ImguiRendererState::new(&gpu.device, &gpu.queue, gpu.format(), &mut context);

        Self {
            context,
            platform,
            renderer,
        }
    }
}

struct AppState {
    host: WindowHost,
    viewer: ModelViewer<SceneRenderer>,
    imgui: ImguiState,
}

struct App {
    config: ViewerConfig,
    runtime: Runtime,
    proxy: EventLoopProxy<AppEvent>,
    initial_url: Option<String>,
    state: Option<AppState>,
    picker: ModelPicker,
    pointer: PointerTracker,
    last_frame: Instant,
}

impl App {
    fn create_state(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let height = self.config.viewer_height;
        let window_attributes = Window::default_attributes()
            .with_title(PAGE_TITLE)
            .with_inner_size(PhysicalSize::new(INITIAL_WIDTH, height))
            .with_min_inner_size(PhysicalSize::new(MIN_WIDTH, height))
            .with_max_inner_size(PhysicalSize::new(u16::MAX as u32, height));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        let gpu = pollster::block_on(GpuContext::new(window.clone()))?;
        let imgui = ImguiState::new(&window, &gpu);

        let host = WindowHost {
            gpu,
            viewer_height: height,
            server_url: self.config.server_url.clone(),
            models_dir: self.config.models_dir.clone(),
            loader: AssetLoader::new(self.runtime.handle().clone()),
            proxy: self.proxy.clone(),
            next_handle: 1,
            pending_frame: None,
            listeners: HashMap::new(),
            loads: HashMap::new(),
            target: None,
            drawn: false,
        };

        Ok(AppState {
            host,
            viewer: ModelViewer::new(self.config.clone()),
            imgui,
        })
    }

    fn show(state: &mut AppState, selection: Selection) {
        match selection {
            Selection::Model(url) => {
                if let Err(e) = state.viewer.set_url(&mut state.host, &url) {
                    log::error!("Failed to create viewer for {}: {:#}", url, e);
                }
            }
            Selection::Nothing => state.viewer.unmount(&mut state.host),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let now = Instant::now();
        state
            .imgui
            .context
            .io_mut()
            .update_delta_time(now - self.last_frame);
        self.last_frame = now;

        let window = state.host.gpu.window.clone();
        if let Err(e) = state
            .imgui
            .platform
            .prepare_frame(state.imgui.context.io_mut(), &window)
        {
            log::error!("Failed to prepare Imgui frame: {}", e);
            return;
        }

        let output = match state.host.gpu.acquire() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                state.host.gpu.reconfigure();
                window.request_redraw();
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory");
                event_loop.exit();
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timeout");
                return;
            }
            Err(other) => {
                log::error!("Unexpected error: {:?}", other);
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        state.host.target = Some(view.clone());
        state.host.drawn = false;

        if let Some(frame) = state.host.take_frame() {
            if let Some(session) = state.viewer.session().map(|session| session.id()) {
                state.viewer.on_frame(&mut state.host, session, frame);
            }
        }

        if !state.host.drawn {
            clear(&state.host.gpu, &view);
        }
        state.host.target = None;

        let ui = state.imgui.context.new_frame();
        let selection = self.picker.draw(ui, state.viewer.load_status());

        let gpu = &state.host.gpu;
        if let Err(e) =
            state
                .imgui
                .renderer
                .render(&view, &mut state.imgui.context, &gpu.device, &gpu.queue)
        {
            log::error!("{:#}", e);
        }

        output.present();

        if let Some(selection) = selection {
            Self::show(state, selection);
        }

        if !state
            .viewer
            .session()
            .is_some_and(|session| session.is_animating())
        {
            // Nothing else keeps the page refreshing
            window.request_redraw();
        }
    }

    fn dispatch_pointer(&mut self, event: PointerEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        if state.imgui.context.io().want_capture_mouse {
            return;
        }

        for (listener, session) in state.host.listeners_of(ListenerKind::Pointer) {
            state.viewer.on_pointer(session, listener, event);
        }
    }
}

/// Clears the viewer area when no session drew into this frame.
fn clear(gpu: &GpuContext, view: &wgpu::TextureView) {
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear encoder"),
        });

    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: 0.02,
                    g: 0.02,
                    b: 0.025,
                    a: 1.0,
                }),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    gpu.queue.submit([encoder.finish()]);
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let mut state = match self.create_state(event_loop) {
            Ok(state) => state,
            Err(e) => {
                log::error!("Failed to start viewer: {:#}", e);
                event_loop.exit();
                return;
            }
        };

        if let Some(url) = self.initial_url.clone() {
            Self::show(&mut state, Selection::Model(url));
        }

        state.host.gpu.window.request_redraw();
        self.state = Some(state);
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Load(event) => {
                if let Some(state) = self.state.as_mut() {
                    state.viewer.on_load_event(event);
                }
            }
            AppEvent::Models(models) => {
                self.picker.set_models(models);
                if let Some(url) = self.initial_url.as_deref() {
                    self.picker.preselect(url);
                }
            }
        }

        if let Some(state) = self.state.as_ref() {
            state.host.gpu.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = self.state.as_mut() {
                    state.viewer.unmount(&mut state.host);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(state) = self.state.as_mut() {
                    state.host.gpu.resize(new_size);

                    for (listener, session) in state.host.listeners_of(ListenerKind::Resize) {
                        state.viewer.on_resize(session, listener, new_size.width);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(gesture) = self.pointer.on_move(position) {
                    self.dispatch_pointer(gesture);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(gesture) = self.pointer.on_button(button, state, Instant::now()) {
                    self.dispatch_pointer(gesture);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.dispatch_pointer(PointerTracker::on_wheel(delta));
            }
            _ => (),
        }

        if let Some(state) = self.state.as_mut() {
            let window = state.host.gpu.window.clone();
            state.imgui.platform.handle_event::<()>(
                state.imgui.context.io_mut(),
                &window,
                &Event::WindowEvent { window_id, event },
            );
        }
    }
}

fn spawn_model_list(
    runtime: &Runtime,
    proxy: EventLoopProxy<AppEvent>,
    server_url: Option<String>,
    models_dir: PathBuf,
) {
    runtime.spawn(async move {
        let models = match server_url {
            Some(server_url) => listing::fetch_models(&reqwest::Client::new(), &server_url)
                .await
                .map_err(|e| format!("{:#}", e)),
            None => tokio::task::spawn_blocking(move || listing::list_models(&models_dir))
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| result.map_err(|e| e.to_string())),
        };

        if proxy.send_event(AppEvent::Models(models)).is_err() {
            log::debug!("Event loop closed before the model list arrived");
        }
    });
}

pub async fn run(config: ViewerConfig, initial_url: Option<String>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    let proxy = event_loop.create_proxy();

    spawn_model_list(
        &runtime,
        proxy.clone(),
        config.server_url.clone(),
        config.models_dir.clone(),
    );

    let mut app = App {
        config,
        runtime,
        proxy,
        initial_url,
        state: None,
        picker: ModelPicker::new(),
        pointer: PointerTracker::default(),
        last_frame: Instant::now(),
    };
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;

    #[test]
    fn drags_follow_the_held_button() {
        let mut pointer = PointerTracker::default();
        let now = Instant::now();

        assert_eq!(pointer.on_move(Vec2::new(10.0, 10.0)), None);
        assert_eq!(pointer.on_move(Vec2::new(12.0, 10.0)), None);

        pointer.on_button(MouseButton::Left, ElementState::Pressed, now);
        assert_eq!(
            pointer.on_move(Vec2::new(15.0, 14.0)),
            Some(PointerEvent::Drag {
                button: PointerButton::Primary,
                delta: Vec2::new(3.0, 4.0),
            })
        );

        pointer.on_button(MouseButton::Left, ElementState::Released, now);
        pointer.on_button(MouseButton::Right, ElementState::Pressed, now);
        assert_eq!(
            pointer.on_move(Vec2::new(14.0, 14.0)),
            Some(PointerEvent::Drag {
                button: PointerButton::Secondary,
                delta: Vec2::new(-1.0, 0.0),
            })
        );
    }

    #[test]
    fn two_quick_clicks_make_a_double_click() {
        let mut pointer = PointerTracker::default();
        let start = Instant::now();

        assert_eq!(pointer.on_button(MouseButton::Left, ElementState::Pressed, start), None);
        pointer.on_button(MouseButton::Left, ElementState::Released, start);

        assert_eq!(
            pointer.on_button(
                MouseButton::Left,
                ElementState::Pressed,
                start + Duration::from_millis(200)
            ),
            Some(PointerEvent::DoubleClick)
        );
    }

    #[test]
    fn slow_clicks_stay_single() {
        let mut pointer = PointerTracker::default();
        let start = Instant::now();

        pointer.on_button(MouseButton::Left, ElementState::Pressed, start);
        pointer.on_button(MouseButton::Left, ElementState::Released, start);

        assert_eq!(
            pointer.on_button(
                MouseButton::Left,
                ElementState::Pressed,
                start + Duration::from_millis(800)
            ),
            None
        );
    }

    #[test]
    fn wheel_up_zooms_in() {
        assert_eq!(
            PointerTracker::on_wheel(MouseScrollDelta::LineDelta(0.0, 1.0)),
            PointerEvent::Wheel { delta: 1.0 }
        );
        assert_eq!(
            PointerTracker::on_wheel(MouseScrollDelta::PixelDelta(PhysicalPosition::new(
                0.0, -24.0
            ))),
            PointerEvent::Wheel { delta: -24.0 }
        );
    }
}
