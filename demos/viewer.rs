//! # Meshkiln Viewer
//!
//! Opens a window showing one mesh, auto-framed.
//!
//! ## Usage:
//! ```bash
//! cargo run --example viewer -- model.fbx
//! cargo run --example viewer -- model.obj --config viewer.json
//! cargo run --example viewer -- model.fbx --maps textures/ --prompt "mossy stone"
//! cargo run --example viewer -- model.fbx --bake ao.png
//! ```
//!
//! `--maps DIR` attaches a synthesizer that answers every request with
//! `albedo.png`, `normal.png`, `roughness.png` and `ao.png` from `DIR`; press
//! `T` in the window to run the pipeline. `--bake FILE` renders the AO guide
//! without a window and exits.
//!
//! Set `RUST_LOG=meshkiln=debug` for loader progress.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use meshkiln::{
    gfx::resources::MapRole,
    prelude::*,
};

#[derive(Default)]
struct Args {
    mesh: Option<PathBuf>,
    config: Option<PathBuf>,
    maps: Option<PathBuf>,
    prompt: String,
    bake: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        prompt: "weathered painted metal".to_string(),
        ..Args::default()
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => args.config = Some(value("--config")?.into()),
            "--maps" => args.maps = Some(value("--maps")?.into()),
            "--prompt" => args.prompt = value("--prompt")?,
            "--bake" => args.bake = Some(value("--bake")?.into()),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => args.mesh = Some(arg.into()),
        }
    }
    Ok(args)
}

/// Answers every synthesis request with the same four files
fn directory_synthesizer(dir: PathBuf) -> impl TextureSynthesizer {
    move |prompt: &str, guide: &BakedImage| -> Result<EncodedMapSet, SynthesisError> {
        log::info!(
            "Synthesizing {:?} from a {}x{} guide using {}",
            prompt,
            guide.width(),
            guide.height(),
            dir.display()
        );
        let mut maps = EncodedMapSet::new();
        for role in MapRole::ALL {
            let path = dir.join(format!("{}.png", role.key()));
            match std::fs::read(&path) {
                Ok(bytes) => maps.insert(role.key(), bytes),
                Err(err) => log::warn!("Skipping {}: {}", path.display(), err),
            }
        }
        Ok(maps)
    }
}

fn bake_headless(config: ViewerConfig, mesh: &Path, output: &Path) -> anyhow::Result<()> {
    let format = MeshFormat::from_extension(mesh).context("mesh must be .fbx or .obj")?;
    let source = ByteSource::from_path(mesh)?;
    let object = load_blocking(source, format, config.loader.chunk_size, |progress| {
        log::debug!("{:?}", progress);
    })?;

    let counters = ResourceCounters::new();
    let mut session = SceneSession::new(config);
    session.mount(HeadlessRenderer::new(256, 256, counters.clone()));
    session.attach_object(object);
    let baked = session.bake_ao()?;
    std::fs::write(output, baked.to_png()?).with_context(|| format!("failed to write {}", output.display()))?;
    session.teardown();

    println!("AO guide ({}x{}) written to {}", baked.width(), baked.height(), output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => ViewerConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    if let Some(output) = &args.bake {
        let mesh = args.mesh.as_deref().context("--bake needs a mesh file")?;
        return bake_headless(config, mesh, output);
    }

    let mut app = MeshkilnApp::new(config)?;
    if let Some(mesh) = &args.mesh {
        app.open(mesh)?;
    }
    if let Some(dir) = args.maps {
        app.set_synthesizer(Arc::new(directory_synthesizer(dir)), args.prompt);
    }
    app.run()
}
