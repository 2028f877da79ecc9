//! Plugin descriptors

use std::fmt;
use std::path::{Path, PathBuf};

use super::loader::BackendHandle;
use crate::backend::AudioBackend;

/// Constructor of a backend compiled into the host
pub type BackendFactory = fn() -> Box<dyn AudioBackend>;

/// What a plugin provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Audio,
    Video,
}

impl PluginKind {
    /// Parse the kind suffix of a library name
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "audio" => Some(PluginKind::Audio),
            "video" => Some(PluginKind::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Audio => "audio",
            PluginKind::Video => "video",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Where a backend's code comes from
#[derive(Debug, Clone)]
pub enum PluginSource {
    Builtin(BackendFactory),
    Library(PathBuf),
}

/// One backend the registry knows about
///
/// Discovering a descriptor never loads anything; `instance` is filled in
/// by [`PluginManager::acquire`](super::PluginManager::acquire).
pub struct PluginDescriptor {
    /// Human-readable name
    pub name: String,
    pub kind: PluginKind,
    /// Selection key, e.g. `cpal`
    pub backend_id: String,
    pub source: PluginSource,
    pub enabled: bool,
    pub(crate) instance: Option<BackendHandle>,
}

impl PluginDescriptor {
    pub fn builtin(backend_id: &str, name: &str, factory: BackendFactory) -> Self {
        Self {
            name: name.to_string(),
            kind: PluginKind::Audio,
            backend_id: backend_id.to_string(),
            source: PluginSource::Builtin(factory),
            enabled: true,
            instance: None,
        }
    }

    pub fn library(path: PathBuf, backend_id: &str, kind: PluginKind) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| backend_id.to_string());
        Self {
            name,
            kind,
            backend_id: backend_id.to_string(),
            source: PluginSource::Library(path),
            enabled: true,
            instance: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.source, PluginSource::Builtin(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            PluginSource::Library(path) => Some(path),
            PluginSource::Builtin(_) => None,
        }
    }

    /// Whether `other` describes the same plugin (a rescan of it)
    pub(crate) fn same_origin(&self, other: &PluginDescriptor) -> bool {
        match (&self.source, &other.source) {
            (PluginSource::Library(a), PluginSource::Library(b)) => a == b,
            (PluginSource::Builtin(_), PluginSource::Builtin(_)) => {
                self.backend_id == other.backend_id
            }
            _ => false,
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("backend_id", &self.backend_id)
            .field("source", &self.source)
            .field("enabled", &self.enabled)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    fn null_factory() -> Box<dyn AudioBackend> {
        Box::new(NullBackend::new())
    }

    #[test]
    fn test_kind_suffix() {
        assert_eq!(PluginKind::from_suffix("audio"), Some(PluginKind::Audio));
        assert_eq!(PluginKind::from_suffix("video"), Some(PluginKind::Video));
        assert_eq!(PluginKind::from_suffix("codec"), None);
    }

    #[test]
    fn test_same_origin() {
        let a = PluginDescriptor::library(PathBuf::from("/p/libspark_a_audio.so"), "a", PluginKind::Audio);
        let a2 = PluginDescriptor::library(PathBuf::from("/p/libspark_a_audio.so"), "a", PluginKind::Audio);
        let b = PluginDescriptor::builtin("a", "A", null_factory);

        assert!(a.same_origin(&a2));
        assert!(!a.same_origin(&b));
        assert!(b.same_origin(&PluginDescriptor::builtin("a", "Other", null_factory)));
        assert_eq!(a.name, "libspark_a_audio.so");
        assert!(!a.is_loaded());
    }
}
