use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{
    assets::{ByteSource, MeshFormat},
    config::ViewerConfig,
    error::RenderError,
    gfx::{camera::CameraController, rendering::RenderEngine, resources::ResourceCounters},
    session::{SceneSession, SessionEvent},
    texturing::TextureSynthesizer,
};

/// Windowed viewer around a [`SceneSession`]
///
/// Drop an `.fbx` or `.obj` file on the window to load it. Drag orbits,
/// shift-drag pans and the wheel zooms. `B` writes the AO guide to disk, `T`
/// runs the texturing pipeline when a synthesizer is attached, `G` toggles
/// the grid and `Escape` quits.
pub struct MeshkilnApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    session: SceneSession<RenderEngine>,
    controller: CameraController,
    counters: ResourceCounters,
    synthesizer: Option<Arc<dyn TextureSynthesizer>>,
    prompt: String,
    bake_output: PathBuf,
    fatal: Option<anyhow::Error>,
}

impl MeshkilnApp {
    pub fn new(config: ViewerConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let controller = CameraController::new(&config.controls);
        let session = SceneSession::new(config.clone());

        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                config,
                window: None,
                session,
                controller,
                counters: ResourceCounters::new(),
                synthesizer: None,
                prompt: String::new(),
                bake_output: PathBuf::from("ao_bake.png"),
                fatal: None,
            },
        })
    }

    /// Attaches the collaborator used by the `T` key
    pub fn set_synthesizer(&mut self, synthesizer: Arc<dyn TextureSynthesizer>, prompt: impl Into<String>) {
        self.app_state.synthesizer = Some(synthesizer);
        self.app_state.prompt = prompt.into();
    }

    /// Where the `B` key writes the AO guide
    pub fn set_bake_output(&mut self, path: impl Into<PathBuf>) {
        self.app_state.bake_output = path.into();
    }

    /// Starts loading a mesh file; it appears once the window is up
    pub fn open(&mut self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        self.app_state.load_path(path.as_ref())
    }

    /// Runs the event loop until the window closes
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| anyhow!("event loop already consumed"))?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self.app_state)
            .context("event loop terminated abnormally")?;

        self.app_state.session.teardown();
        let leaked = self.app_state.counters.snapshot();
        if !leaked.is_empty() {
            log::warn!("GPU resources still alive after teardown: {:?}", leaked);
        }
        match self.app_state.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn load_path(&mut self, path: &Path) -> anyhow::Result<()> {
        let format = MeshFormat::from_extension(path)
            .with_context(|| format!("unsupported mesh file {}", path.display()))?;
        let source = ByteSource::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
        self.session.load(source, format).context("failed to start loading")?;
        Ok(())
    }

    fn bake_to_disk(&mut self) -> anyhow::Result<()> {
        let baked = self.session.bake_ao().context("AO bake failed")?;
        let png = baked.to_png()?;
        std::fs::write(&self.bake_output, png)
            .with_context(|| format!("failed to write {}", self.bake_output.display()))?;
        log::info!("AO guide written to {}", self.bake_output.display());
        Ok(())
    }

    fn start_texturing(&mut self) -> anyhow::Result<()> {
        let synthesizer = self
            .synthesizer
            .clone()
            .ok_or_else(|| anyhow!("no texture synthesizer attached"))?;
        self.session
            .begin_texturing(synthesizer, self.prompt.clone())
            .context("texturing could not start")?;
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        self.controller.process_keyed_events(event);
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let PhysicalKey::Code(key_code) = event.physical_key else {
            return;
        };
        let result = match key_code {
            KeyCode::Escape => {
                self.shutdown(event_loop);
                Ok(())
            }
            KeyCode::KeyB => self.bake_to_disk(),
            KeyCode::KeyT => self.start_texturing(),
            KeyCode::KeyG => {
                let visible = !self.session.scene().grid_visible;
                self.session.set_grid_visible(visible);
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("{:#}", err);
        }
    }

    fn report_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::LoadProgress(progress) => log::debug!("Loading: {:?}", progress),
                SessionEvent::ObjectLoaded {
                    name,
                    meshes,
                    vertices,
                } => {
                    log::info!("Loaded '{}' ({} meshes, {} vertices)", name, meshes, vertices);
                    if let Some(window) = &self.window {
                        window.set_title(&format!("{} - {}", self.config.window.title, name));
                    }
                }
                SessionEvent::LoadFailed(err) => log::error!("Load failed: {}", err),
                SessionEvent::TexturingApplied(id) => log::info!("PBR material {:?} applied", id),
                SessionEvent::TexturingFailed(err) => log::error!("Texturing failed: {}", err),
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.session.teardown();
        event_loop.exit();
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(self.config.window.width, self.config.window.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fatal = Some(anyhow!(err).context("failed to create window"));
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let (width, height) = window.inner_size().into();
        let counters = self.counters.clone();
        let engine = pollster::block_on(async move { RenderEngine::new(window, width, height, counters).await });
        match engine {
            Ok(engine) => self.session.mount(engine),
            Err(err) => {
                self.fatal = Some(anyhow!(err).context("failed to initialise the renderer"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                self.session.request_resize(width, height);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::DroppedFile(path) => {
                if let Err(err) = self.load_path(&path) {
                    log::warn!("{:#}", err);
                }
            }
            WindowEvent::RedrawRequested => {
                match self.session.tick() {
                    Ok(()) => {}
                    Err(RenderError::OutOfMemory) => {
                        self.fatal = Some(anyhow!(RenderError::OutOfMemory));
                        self.shutdown(event_loop);
                    }
                    Err(err) => log::warn!("Frame failed: {}", err),
                }
                self.report_events();
            }
            _ => (),
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if self.window.is_none() {
            return;
        }
        if let Some(input) = self.controller.process_events(&event) {
            self.session.apply_input(input);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
