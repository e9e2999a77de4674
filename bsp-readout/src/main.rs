use std::{
    fs,
    result::Result,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use bsp::{bsp::header::sniff_format, prelude::*};
use clap::Parser;
use ini::Ini;
use thiserror::Error;

mod cli;

#[derive(Error, Debug)]
enum ReadoutError {
    #[error("{0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("{0}: not a map and not base64 text ({1})")]
    Base64(PathBuf, base64::DecodeError),
    #[error("config: {0}")]
    Ini(#[from] ini::Error),
    #[error(transparent)]
    Map(#[from] BSPError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The raw map, unwrapping base64 text when the file is not a map itself.
fn read_map(path: &Path) -> Result<Vec<u8>, ReadoutError> {
    let bytes = fs::read(path).map_err(|e| ReadoutError::Io(path.to_owned(), e))?;
    if sniff_format(&bytes).is_ok() {
        return Ok(bytes);
    }
    let text: Vec<u8> = bytes
        .into_iter()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    log::debug!("{} is not a map, trying base64", path.display());
    STANDARD
        .decode(text)
        .map_err(|e| ReadoutError::Base64(path.to_owned(), e))
}

fn load_config(path: Option<&Path>) -> Result<BuildConfig, ReadoutError> {
    match path {
        Some(path) => {
            let ini = Ini::load_from_file(path)?;
            Ok(BuildConfig::from_ini(&ini)?)
        }
        None => Ok(BuildConfig::default()),
    }
}

fn report(path: &Path, map: &BSPMap) {
    let summary = map.summary();
    log::info!(
        "{}: {} v{}, {} surfaces from {} faces ({} skipped), {} lightmap pages",
        path.display(),
        summary
            .format
            .map_or_else(|| "unknown".to_owned(), |f| format!("{f:?}")),
        summary.version,
        summary.surfaces,
        map.face_to_surface.len(),
        summary.skipped_faces,
        summary.lightmap_pages.len()
    );
    log::info!(
        "{} models, {} entities, {} textures, {} displacements, {} overlays, {} static props",
        summary.models,
        summary.entities,
        summary.textures,
        summary.displacements,
        summary.overlays,
        summary.static_props
    );
    log::info!(
        "{} clusters, {} leaves, {} visible cluster pairs",
        summary.visibility.clusters,
        summary.visibility.leaves,
        summary.visibility.visible_pairs
    );
    for problem in &summary.diagnostics {
        log::warn!("{}: {}", path.display(), problem);
    }
}

fn write_atlas(dir: &Path, name: &str, map: &BSPMap) -> Result<(), ReadoutError> {
    fs::create_dir_all(dir).map_err(|e| ReadoutError::Io(dir.to_owned(), e))?;
    let atlas = map.atlas();
    for (i, page) in atlas.pages().iter().enumerate() {
        let Some(rgba) = atlas.compose_page(i) else {
            continue;
        };
        let out = dir.join(format!("{}_{}x{}_{}.rgba", name, page.width, page.height, i));
        fs::write(&out, rgba).map_err(|e| ReadoutError::Io(out.clone(), e))?;
        log::info!("Wrote {}", out.display());
    }
    Ok(())
}

fn run(args: cli::ReadoutCli) -> Result<(), ReadoutError> {
    let config = load_config(args.config.as_deref())?;
    let session = Session::new();
    let maps = session.cache::<BSPMap>("maps");

    for path in &args.maps {
        let key = path.to_string_lossy();
        let map: Arc<BSPMap> = maps.try_get_or_insert_with(&key, || {
            let bytes = read_map(path)?;
            Ok::<_, ReadoutError>(parse_with_pacer(&bytes, &config, &mut LogPacing)?)
        })?;

        report(path, &map);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&map.summary())?);
        }
        if let Some(dir) = &args.atlas {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "map".to_owned());
            write_atlas(dir, &name, &map)?;
        }
    }
    Ok(())
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cli::ReadoutCli::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
