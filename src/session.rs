//! # Scene Session
//!
//! [`SceneSession`] owns everything that lives as long as "one model is
//! shown": the renderer, the orbit camera, the scene with its single loaded
//! object, the asset loader and the texturing worker. All scene mutation
//! happens inside its methods, on the thread that calls [`SceneSession::tick`].
//!
//! ## Lifecycle
//!
//! `Idle → Initializing → Running → Disposing → Idle`
//!
//! - [`SceneSession::mount`] takes ownership of a renderer and starts running
//! - [`SceneSession::tick`] drives one frame
//! - [`SceneSession::teardown`] frees every GPU resource and drops the renderer
//!
//! ## Usage
//!
//! ```rust
//! use meshkiln::{
//!     config::ViewerConfig,
//!     gfx::{rendering::HeadlessRenderer, resources::ResourceCounters},
//!     session::SceneSession,
//! };
//!
//! let counters = ResourceCounters::new();
//! let mut session = SceneSession::new(ViewerConfig::default());
//! session.mount(HeadlessRenderer::new(64, 64, counters.clone()));
//! session.tick().unwrap();
//! session.teardown();
//! assert!(counters.snapshot().is_empty());
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    assets::{AssetLoader, ByteSource, LoadEvent, LoadProgress, LoadTicket, MeshFormat},
    config::ViewerConfig,
    error::{BakeError, LoadError, MaterialError, RenderError, TexturingError},
    gfx::{
        camera::{Camera, CameraInput, OrbitCamera},
        geometry::{frame_bounds, Aabb, Framing},
        rendering::renderer::{DrawItem, FrameDesc, MaterialHandle, Renderer},
        resources::material::MaterialId,
        scene::{node::LoadedObject, Scene},
    },
    texturing::{
        AoBaker, BakedImage, EncodedMapSet, JobId, MaterialBinder, SynthesisJobs,
        TextureSynthesizer,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Running,
    Disposing,
}

/// Notifications for the embedding UI, drained with [`SceneSession::drain_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoadProgress(LoadProgress),
    ObjectLoaded {
        name: String,
        meshes: usize,
        vertices: usize,
    },
    LoadFailed(LoadError),
    TexturingApplied(MaterialId),
    TexturingFailed(TexturingError),
}

pub struct SceneSession<R: Renderer> {
    config: ViewerConfig,
    state: SessionState,
    renderer: Option<R>,
    scene: Scene,
    camera: OrbitCamera,
    framing: Option<Framing>,
    loader: AssetLoader,
    jobs: SynthesisJobs,
    baker: AoBaker,
    binder: MaterialBinder,
    /// GPU bindings of the materials the current object references
    materials: HashMap<MaterialId, MaterialHandle>,
    pending_resize: Option<(u32, u32)>,
    events: Vec<SessionEvent>,
}

impl<R: Renderer> SceneSession<R> {
    pub fn new(config: ViewerConfig) -> Self {
        let aspect = config.window.width.max(1) as f32 / config.window.height.max(1) as f32;
        Self {
            state: SessionState::Idle,
            renderer: None,
            scene: Scene::new(&config),
            camera: OrbitCamera::new(&config.camera, &config.controls, aspect),
            framing: None,
            loader: AssetLoader::new(config.loader.chunk_size),
            jobs: SynthesisJobs::new(),
            baker: AoBaker::new(config.bake.resolution),
            binder: MaterialBinder::new(&config.pbr),
            materials: HashMap::new(),
            pending_resize: None,
            events: Vec::new(),
            config,
        }
    }

    /// Takes ownership of a renderer and starts presenting
    ///
    /// A session that is already running is torn down first.
    pub fn mount(&mut self, renderer: R) {
        if self.renderer.is_some() {
            log::warn!("Session mounted twice, tearing down the previous renderer");
            self.teardown();
        }
        self.state = SessionState::Initializing;
        let (width, height) = renderer.size();
        self.camera.resize_projection(width, height);
        self.camera.refresh_projection();
        self.renderer = Some(renderer);
        self.state = SessionState::Running;
        log::info!("Session running at {}x{}", width, height);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut R> {
        self.renderer.as_mut()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    /// Framing of the current object, `None` before the first load
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    pub fn set_grid_visible(&mut self, visible: bool) {
        self.scene.grid_visible = visible;
    }

    /// Starts loading an asset, superseding any load in flight
    ///
    /// The current object stays on screen until the new one is attached.
    pub fn load(&mut self, source: ByteSource, format: MeshFormat) -> Result<LoadTicket, LoadError> {
        self.loader.start(source, format)
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Makes `object` the displayed object and frames the camera on it
    ///
    /// The previous object and its GPU buffers are released.
    pub fn attach_object(&mut self, mut object: LoadedObject) {
        object.recenter();
        // An empty object frames like a point at the origin
        let bounds = object.bounds().unwrap_or_else(Aabb::empty_at_origin);
        let (name, meshes, vertices) = (object.name.clone(), object.mesh_count(), object.vertex_count());

        if let Some(previous) = self.scene.replace_object(object) {
            log::info!("Replacing '{}' with '{}'", previous.name, name);
            self.release_object(previous);
        }

        let framing = frame_bounds(
            &bounds,
            self.config.fov_radians(),
            self.config.framing.margin,
            self.config.framing.far_multiplier,
        );
        self.camera.frame(&framing);
        self.framing = Some(framing);
        log::info!(
            "Framed '{}': distance {:.3}, far plane {:.3}",
            name,
            framing.camera_distance,
            framing.far_plane
        );
        self.events.push(SessionEvent::ObjectLoaded {
            name,
            meshes,
            vertices,
        });
    }

    /// Coalesced; only the last request before a tick is applied
    pub fn request_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.pending_resize = Some((width, height));
    }

    pub fn apply_input(&mut self, input: CameraInput) {
        self.camera.apply_input(input);
    }

    /// Runs one frame
    ///
    /// Pending events are drained in every state; the GPU work only happens
    /// while running. A lost surface skips the frame.
    pub fn tick(&mut self) -> Result<(), RenderError> {
        self.drain_loads();
        self.drain_synthesis();

        if self.state != SessionState::Running {
            return Ok(());
        }

        if let Some((width, height)) = self.pending_resize.take() {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.resize(width, height);
            }
            self.camera.resize_projection(width, height);
            log::debug!("Viewport resized to {}x{}", width, height);
        }
        self.camera.update();
        self.camera.refresh_projection();

        self.sync_gpu()?;
        match self.render_frame() {
            Err(RenderError::SurfaceLost) => {
                log::warn!("Surface lost, frame skipped");
                Ok(())
            }
            result => result,
        }
    }

    /// Renders the AO guide image of the current object
    pub fn bake_ao(&mut self) -> Result<BakedImage, BakeError> {
        if self.state != SessionState::Running || self.scene.object().is_none() {
            return Err(BakeError::NotReady);
        }
        self.sync_gpu()?;
        let renderer = self.renderer.as_mut().ok_or(BakeError::NotReady)?;
        self.baker.bake(renderer, &mut self.scene)
    }

    /// Replaces every mesh's material with one PBR material built from `maps`
    ///
    /// On error the current materials are untouched. The previous material's
    /// GPU binding is released once nothing references it.
    pub fn apply_pbr(&mut self, maps: &EncodedMapSet) -> Result<MaterialId, MaterialError> {
        let material = self.binder.apply(self.scene.object_mut(), maps)?;
        if self.state == SessionState::Running {
            if let Err(err) = self.sync_gpu() {
                log::warn!("Material upload deferred to the next frame: {}", err);
            }
        }
        Ok(material.id())
    }

    /// Bakes the AO guide and hands it to `synthesizer` on a worker thread
    ///
    /// The result is applied on a later tick and reported as a
    /// [`SessionEvent`].
    pub fn begin_texturing(
        &mut self,
        synthesizer: Arc<dyn TextureSynthesizer>,
        prompt: impl Into<String>,
    ) -> Result<JobId, TexturingError> {
        if self.jobs.in_flight() {
            return Err(TexturingError::Busy);
        }
        let guide = self.bake_ao()?;
        self.jobs.start(synthesizer, prompt.into(), guide)
    }

    /// Gives up on the synthesis in flight; its result is discarded
    pub fn abandon_texturing(&mut self) {
        self.jobs.abandon();
    }

    pub fn texturing_in_flight(&self) -> bool {
        self.jobs.in_flight()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Frees every GPU resource, drops the renderer and the loaded object
    pub fn teardown(&mut self) {
        if self.state == SessionState::Idle && self.renderer.is_none() && self.scene.object().is_none() {
            return;
        }
        self.state = SessionState::Disposing;
        self.loader.cancel();
        self.jobs.abandon();
        self.pending_resize = None;

        if let Some(object) = self.scene.take_object() {
            self.release_object(object);
        }
        if let Some(renderer) = self.renderer.as_mut() {
            for (_, handle) in self.materials.drain() {
                renderer.release_material(handle);
            }
        }
        self.materials.clear();
        self.renderer = None;
        self.framing = None;
        self.state = SessionState::Idle;
        log::info!("Session torn down");
    }

    fn drain_loads(&mut self) {
        for event in self.loader.poll() {
            match event {
                LoadEvent::Progress(progress) => {
                    log::debug!("Load progress {:?}", progress);
                    self.events.push(SessionEvent::LoadProgress(progress));
                }
                LoadEvent::Loaded(object) => self.attach_object(object),
                LoadEvent::Failed(err) => {
                    log::warn!("Load failed, keeping the current object: {}", err);
                    self.events.push(SessionEvent::LoadFailed(err));
                }
            }
        }
    }

    fn drain_synthesis(&mut self) {
        let Some(result) = self.jobs.poll() else {
            return;
        };
        let event = match result {
            Ok(maps) => match self.apply_pbr(&maps) {
                Ok(id) => SessionEvent::TexturingApplied(id),
                Err(err) => {
                    log::warn!("Synthesized maps rejected: {}", err);
                    SessionEvent::TexturingFailed(err.into())
                }
            },
            Err(err) => {
                log::warn!("Synthesis failed: {}", err);
                SessionEvent::TexturingFailed(err.into())
            }
        };
        self.events.push(event);
    }

    /// Releases the GPU buffers of an object that left the scene
    fn release_object(&mut self, mut object: LoadedObject) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        object.visit_meshes_mut(&mut |mesh| {
            if let Some(handle) = mesh.gpu.take() {
                renderer.release_mesh(handle);
            }
        });
    }

    /// Uploads dirty meshes and new materials, releases unreferenced materials
    fn sync_gpu(&mut self) -> Result<(), RenderError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let Some(object) = self.scene.object_mut() else {
            for (_, handle) in self.materials.drain() {
                renderer.release_material(handle);
            }
            return Ok(());
        };

        let mut failure = None;
        object.visit_meshes_mut(&mut |mesh| {
            if failure.is_some() || (!mesh.dirty && mesh.gpu.is_some()) {
                return;
            }
            if let Some(old) = mesh.gpu.take() {
                renderer.release_mesh(old);
            }
            match renderer.upload_mesh(&mesh.geometry) {
                Ok(handle) => {
                    mesh.gpu = Some(handle);
                    mesh.dirty = false;
                }
                Err(err) => failure = Some(err),
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        let in_use = object.unique_materials();
        for material in &in_use {
            if !self.materials.contains_key(&material.id()) {
                let handle = renderer.upload_material(material)?;
                self.materials.insert(material.id(), handle);
            }
        }
        self.materials.retain(|id, handle| {
            let keep = in_use.iter().any(|m| m.id() == *id);
            if !keep {
                log::debug!("Releasing unreferenced material {:?}", id);
                renderer.release_material(*handle);
            }
            keep
        });
        Ok(())
    }

    fn render_frame(&mut self) -> Result<(), RenderError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let mut draws = Vec::new();
        if let Some(object) = self.scene.object() {
            object.visit_meshes(&mut |mesh| {
                if let (Some(mesh_handle), Some(material)) =
                    (mesh.gpu, self.materials.get(&mesh.material.id()))
                {
                    draws.push(DrawItem {
                        mesh: mesh_handle,
                        material: *material,
                    });
                }
            });
        }
        renderer.render(&FrameDesc {
            camera: self.camera.uniform(),
            clear_color: self.scene.background,
            lights: &self.scene.lights,
            grid: self.scene.grid_visible.then_some(&self.scene.grid),
            draws: &draws,
        })
    }
}

impl<R: Renderer> Drop for SceneSession<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use crossbeam_channel::bounded;

    use super::*;
    use crate::{
        assets::fbx::fixtures::ASCII_CUBE,
        gfx::{
            geometry::primitives::cube,
            rendering::HeadlessRenderer,
            resources::{material::Material, pbr_maps::MapRole, ResourceCounters},
            scene::node::{GroupNode, MeshNode, SceneNode},
        },
        error::SynthesisError,
        texturing::maps::fixtures::full_set,
    };

    fn config() -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.bake.resolution = 32;
        config
    }

    fn running(counters: &ResourceCounters) -> SceneSession<HeadlessRenderer> {
        let mut session = SceneSession::new(config());
        session.mount(HeadlessRenderer::new(48, 32, counters.clone()));
        session
    }

    fn cube_object(name: &str) -> LoadedObject {
        let root = GroupNode::new("root").with_child(SceneNode::Mesh(MeshNode::new(
            "cube",
            cube(2.0, [5.0, 5.0, 5.0]),
            Arc::new(Material::default()),
        )));
        LoadedObject::new(name, SceneNode::Group(root))
    }

    fn material_ids(session: &SceneSession<HeadlessRenderer>) -> Vec<MaterialId> {
        session
            .scene()
            .object()
            .map(|o| o.unique_materials().iter().map(|m| m.id()).collect())
            .unwrap_or_default()
    }

    fn tick_until(session: &mut SceneSession<HeadlessRenderer>, done: impl Fn(&SceneSession<HeadlessRenderer>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            session.tick().unwrap();
            if done(session) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_teardown_returns_counters_to_zero() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();
        session.apply_pbr(&full_set()).unwrap();
        session.tick().unwrap();
        session.bake_ao().unwrap();
        assert!(!counters.snapshot().is_empty());

        session.teardown();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.scene().object().is_none());
        assert!(counters.snapshot().is_empty());
    }

    #[test]
    fn test_drop_releases_everything() {
        let counters = ResourceCounters::new();
        {
            let mut session = running(&counters);
            session.attach_object(cube_object("cube"));
            session.tick().unwrap();
        }
        assert!(counters.snapshot().is_empty());
    }

    #[test]
    fn test_cube_at_offset_is_recentered_and_framed() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session
            .load(
                ByteSource::from_bytes("cube.fbx", ASCII_CUBE.as_bytes().to_vec()),
                MeshFormat::Fbx,
            )
            .unwrap();
        tick_until(&mut session, |s| s.scene().object().is_some());

        let bounds = session.scene().object().unwrap().bounds().unwrap();
        assert!(bounds.center().x.abs() < 1e-5);
        assert!(bounds.center().y.abs() < 1e-5);
        assert!(bounds.center().z.abs() < 1e-5);

        let expected = 1.5 / 37.5f32.to_radians().tan();
        let framing = session.framing().unwrap();
        assert!((framing.camera_distance - expected).abs() < 1e-4);
        assert!((expected - 1.955).abs() < 1e-3);
        assert!((session.camera().distance - expected).abs() < 1e-4);
        assert!((session.camera().eye.z - expected).abs() < 1e-4);
        assert!((session.camera().zfar() - framing.far_plane).abs() < 1e-4);
        assert!(session.camera().bounds.min_distance <= expected);
    }

    #[test]
    fn test_superseded_load_is_never_attached() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        let fbx = ASCII_CUBE.as_bytes().to_vec();
        session
            .load(ByteSource::from_bytes("first", fbx.clone()), MeshFormat::Fbx)
            .unwrap();
        session
            .load(ByteSource::from_bytes("second", fbx), MeshFormat::Fbx)
            .unwrap();
        tick_until(&mut session, |s| !s.is_loading());
        for _ in 0..10 {
            session.tick().unwrap();
            thread::sleep(Duration::from_millis(2));
        }

        let loaded: Vec<String> = session
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::ObjectLoaded { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, vec!["second".to_string()]);
        assert_eq!(session.scene().object().unwrap().name, "second");
    }

    #[test]
    fn test_failed_load_keeps_current_object() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("kept"));
        session
            .load(ByteSource::from_bytes("bad", b"not a mesh".to_vec()), MeshFormat::Fbx)
            .unwrap();
        tick_until(&mut session, |s| !s.is_loading());

        assert_eq!(session.scene().object().unwrap().name, "kept");
        assert!(session
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::LoadFailed(_))));
    }

    #[test]
    fn test_bake_restores_scene() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();
        let before_counters = counters.snapshot();
        let before_materials = material_ids(&session);

        let baked = session.bake_ao().unwrap();
        assert_eq!((baked.width(), baked.height()), (32, 32));

        assert_eq!(material_ids(&session), before_materials);
        assert_eq!(session.scene().background, ViewerConfig::default().background);
        assert!(session.scene().grid_visible);
        let renderer = session.renderer().unwrap();
        assert_eq!(renderer.capture_size(), None);
        assert_eq!(renderer.size(), (48, 32));
        assert_eq!(counters.snapshot(), before_counters);

        session.tick().unwrap();
        let frame = session.renderer().unwrap().last_frame().unwrap();
        assert!(frame.grid_drawn);
        assert_eq!(frame.size, (48, 32));
    }

    #[test]
    fn test_failed_bake_restores_scene() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();
        let before_counters = counters.snapshot();
        let before_materials = material_ids(&session);

        session.renderer_mut().unwrap().fail_next_capture();
        assert!(matches!(session.bake_ao(), Err(BakeError::Render(RenderError::Readback(_)))));

        assert_eq!(material_ids(&session), before_materials);
        assert_eq!(session.scene().background, ViewerConfig::default().background);
        assert!(session.scene().grid_visible);
        assert_eq!(session.renderer().unwrap().capture_size(), None);
        assert_eq!(counters.snapshot(), before_counters);
    }

    #[test]
    fn test_bake_requires_object() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        assert_eq!(session.bake_ao().unwrap_err(), BakeError::NotReady);

        let mut unmounted: SceneSession<HeadlessRenderer> = SceneSession::new(config());
        unmounted.attach_object(cube_object("cube"));
        assert_eq!(unmounted.bake_ao().unwrap_err(), BakeError::NotReady);
    }

    #[test]
    fn test_apply_pbr_is_idempotent() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();

        session.apply_pbr(&full_set()).unwrap();
        session.tick().unwrap();
        let after_first = counters.snapshot();
        let materials_first = session.renderer().unwrap().material_count();

        let second = session.apply_pbr(&full_set()).unwrap();
        session.tick().unwrap();
        assert_eq!(counters.snapshot(), after_first);
        assert_eq!(session.renderer().unwrap().material_count(), materials_first);
        assert_eq!(material_ids(&session), vec![second]);
    }

    #[test]
    fn test_missing_roughness_is_rejected_without_mutation() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();
        let before = material_ids(&session);
        let before_counters = counters.snapshot();

        let mut maps = full_set();
        maps.remove(MapRole::Roughness);
        assert_eq!(
            session.apply_pbr(&maps),
            Err(MaterialError::MissingMap("roughness"))
        );
        session.tick().unwrap();
        assert_eq!(material_ids(&session), before);
        assert_eq!(counters.snapshot(), before_counters);
    }

    #[test]
    fn test_texturing_pipeline_and_busy() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();

        let (release, gate) = bounded::<()>(1);
        let synthesizer = move |_: &str, guide: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
            assert_eq!(guide.width(), 32);
            let _ = gate.recv();
            Ok(full_set())
        };
        session.begin_texturing(Arc::new(synthesizer), "weathered bronze").unwrap();
        assert!(session.texturing_in_flight());

        let again = |_: &str, _: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
            Ok(full_set())
        };
        assert_eq!(
            session.begin_texturing(Arc::new(again), "x").unwrap_err(),
            TexturingError::Busy
        );

        release.send(()).unwrap();
        tick_until(&mut session, |s| !s.texturing_in_flight());
        let applied = session
            .drain_events()
            .into_iter()
            .find_map(|e| match e {
                SessionEvent::TexturingApplied(id) => Some(id),
                _ => None,
            })
            .unwrap();
        assert_eq!(material_ids(&session), vec![applied]);
    }

    #[test]
    fn test_failed_synthesis_keeps_material() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();
        let before = material_ids(&session);

        let synthesizer = |_: &str, _: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
            Err(SynthesisError::Unauthorized)
        };
        session.begin_texturing(Arc::new(synthesizer), "x").unwrap();
        tick_until(&mut session, |s| !s.texturing_in_flight());

        assert_eq!(material_ids(&session), before);
        assert!(session.drain_events().contains(&SessionEvent::TexturingFailed(
            TexturingError::Synthesis(SynthesisError::Unauthorized)
        )));
    }

    #[test]
    fn test_panicking_synthesizer_does_not_wedge_texturing() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        session.tick().unwrap();

        let exploding = |_: &str, _: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
            panic!("backend exploded")
        };
        session.begin_texturing(Arc::new(exploding), "x").unwrap();
        tick_until(&mut session, |s| !s.texturing_in_flight());
        assert!(session.drain_events().contains(&SessionEvent::TexturingFailed(
            TexturingError::Synthesis(SynthesisError::Crashed("backend exploded".to_string()))
        )));

        let working = |_: &str, _: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
            Ok(full_set())
        };
        session.begin_texturing(Arc::new(working), "y").unwrap();
        tick_until(&mut session, |s| !s.texturing_in_flight());
        assert!(session
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::TexturingApplied(_))));
    }

    #[test]
    fn test_source_declaring_absurd_size_fails_the_load() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        let source = ByteSource::from_reader("liar.obj", std::io::Cursor::new(vec![0u8; 10]), Some(u64::MAX));
        session.load(source, MeshFormat::Obj).unwrap();
        tick_until(&mut session, |s| !s.is_loading());

        assert!(session
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::LoadFailed(LoadError::IncompleteData(_)))));
    }

    #[test]
    fn test_empty_object_is_framed_at_origin() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("cube"));
        let cube_framing = session.framing().unwrap();

        session.attach_object(LoadedObject::new("empty", SceneNode::Group(GroupNode::new("root"))));
        let config = config();
        let expected = frame_bounds(
            &Aabb::empty_at_origin(),
            config.fov_radians(),
            config.framing.margin,
            config.framing.far_multiplier,
        );
        let framing = session.framing().unwrap();
        assert_eq!(framing, expected);
        assert_ne!(framing, cube_framing);
        assert!(framing.camera_distance.is_finite() && framing.far_plane.is_finite());
        assert!((session.camera().zfar() - framing.far_plane.max(session.camera().znear * 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_projection_rebuilt_only_on_resize() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.tick().unwrap();
        let updates = session.camera().projection_updates();
        for _ in 0..5 {
            session.tick().unwrap();
        }
        assert_eq!(session.camera().projection_updates(), updates);

        session.request_resize(100, 50);
        session.request_resize(120, 40);
        session.tick().unwrap();
        assert_eq!(session.camera().projection_updates(), updates + 1);
        assert_eq!(session.renderer().unwrap().size(), (120, 40));
        assert!((session.camera().aspect - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_replacing_object_releases_old_buffers() {
        let counters = ResourceCounters::new();
        let mut session = running(&counters);
        session.attach_object(cube_object("a"));
        session.tick().unwrap();
        let with_one = counters.snapshot();

        session.attach_object(cube_object("b"));
        session.tick().unwrap();
        assert_eq!(counters.snapshot(), with_one);
        assert_eq!(session.renderer().unwrap().mesh_count(), 1);
    }
}
