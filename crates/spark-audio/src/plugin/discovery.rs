//! Backend plugin discovery
//!
//! Plugins are shared libraries in a single directory whose file name
//! encodes what they provide:
//!
//! - Linux: `libspark_<backend>_<kind>.so`
//! - macOS: `libspark_<backend>_<kind>.dylib`
//! - Windows: `spark_<backend>_<kind>.dll`
//!
//! where `<kind>` is `audio` or `video`. Scanning only reads file names;
//! nothing is loaded until a backend is acquired.

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::Path;

use super::descriptor::{PluginDescriptor, PluginKind};
use super::error::PluginResult;

/// Name prefix shared by every backend plugin
const PLUGIN_PREFIX: &str = "spark_";

/// Split a plugin file name into backend id and kind
///
/// Returns `None` for anything that is not a plugin library of this platform.
pub fn parse_library_name(file_name: &str) -> Option<(String, PluginKind)> {
    let stem = file_name
        .strip_prefix(DLL_PREFIX)?
        .strip_suffix(DLL_EXTENSION)?
        .strip_suffix('.')?;
    let rest = stem.strip_prefix(PLUGIN_PREFIX)?;
    let (backend_id, kind) = rest.rsplit_once('_')?;
    if backend_id.is_empty() {
        return None;
    }
    Some((backend_id.to_string(), PluginKind::from_suffix(kind)?))
}

/// File name a plugin for `backend_id` must have on this platform
pub fn library_file_name(backend_id: &str, kind: PluginKind) -> String {
    format!(
        "{}{}{}_{}.{}",
        DLL_PREFIX, PLUGIN_PREFIX, backend_id, kind, DLL_EXTENSION
    )
}

/// List the plugin libraries in `dir`, sorted by file name
///
/// A missing directory holds no plugins.
pub fn discover_plugins(dir: &Path) -> PluginResult<Vec<PluginDescriptor>> {
    if !dir.exists() {
        log::debug!("Plugin directory {:?} does not exist", dir);
        return Ok(Vec::new());
    }

    log::info!("Scanning plugin directory: {:?}", dir);

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parse_library_name(file_name) {
            Some((backend_id, kind)) => {
                log::debug!("Found {} plugin '{}' at {:?}", kind, backend_id, path);
                found.push(PluginDescriptor::library(path.clone(), &backend_id, kind));
            }
            None => log::trace!("Ignoring {:?}", path),
        }
    }

    found.sort_by(|a, b| a.path().cmp(&b.path()));
    log::info!("Plugin scan complete: {} plugin(s) in {:?}", found.len(), dir);
    Ok(found)
}
