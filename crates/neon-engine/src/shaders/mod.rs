//! WGSL shader sources, resolved by logical name.
//!
//! Every stage the engine uses is embedded in the binary. A `.wgsl` file with
//! the same logical name found on a search path takes precedence, so shaders
//! can be edited without rebuilding.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::device::GpuError;

/// Environment variable naming an extra shader directory, searched first.
pub const SHADER_DIR_ENV: &str = "NEON_SHADER_DIR";

/// Logical shader module names.
pub mod names {
    pub const LINE: &str = "line";
    pub const FULLSCREEN: &str = "fullscreen";
    pub const BRIGHT_PASS: &str = "bright_pass";
    pub const GAUSSIAN_BLUR: &str = "gaussian_blur";
    pub const BLOOM_COMPOSITE: &str = "bloom_composite";
    pub const BLIT: &str = "blit";
}

const EMBEDDED: &[(&str, &str)] = &[
    (names::LINE, include_str!("line.wgsl")),
    (names::FULLSCREEN, include_str!("fullscreen.wgsl")),
    (names::BRIGHT_PASS, include_str!("bright_pass.wgsl")),
    (names::GAUSSIAN_BLUR, include_str!("gaussian_blur.wgsl")),
    (names::BLOOM_COMPOSITE, include_str!("bloom_composite.wgsl")),
    (names::BLIT, include_str!("blit.wgsl")),
];

/// Resolves shader source by logical name.
///
/// Lookup order: sources added with [`insert`](Self::insert), then
/// `<dir>/<name>.wgsl` for each search directory, then the embedded set.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    overrides: HashMap<String, Cow<'static, str>>,
    search_paths: Vec<PathBuf>,
    embedded: bool,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    /// Standard library: `NEON_SHADER_DIR`, the directories next to the
    /// executable, then the embedded set.
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(dir) = std::env::var_os(SHADER_DIR_ENV) {
            search_paths.push(PathBuf::from(dir));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        {
            search_paths.push(exe_dir.join("shaders"));
            search_paths.push(exe_dir.join("..").join("shaders"));
            search_paths.push(exe_dir.join("..").join("..").join("shaders"));
        }

        Self {
            overrides: HashMap::new(),
            search_paths,
            embedded: true,
        }
    }

    /// Embedded sources only; never touches the filesystem.
    pub fn embedded_only() -> Self {
        Self {
            overrides: HashMap::new(),
            search_paths: Vec::new(),
            embedded: true,
        }
    }

    /// No sources at all. Useful for exercising missing-shader paths.
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
            search_paths: Vec::new(),
            embedded: false,
        }
    }

    /// Adds a directory searched after the existing ones.
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Registers `source` under `name`, shadowing disk and embedded sources.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<Cow<'static, str>>) {
        self.overrides.insert(name.into(), source.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
            || self.search_paths.iter().any(|dir| shader_path(dir, name).is_file())
            || (self.embedded && embedded(name).is_some())
    }

    pub fn load(&self, name: &str) -> Result<Cow<'static, str>, GpuError> {
        if let Some(source) = self.overrides.get(name) {
            return Ok(source.clone());
        }

        for dir in &self.search_paths {
            let path = shader_path(dir, name);
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    log::debug!("shader `{name}` loaded from {}", path.display());
                    return Ok(Cow::Owned(source));
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("failed to read {}: {err}", path.display()),
            }
        }

        if self.embedded {
            if let Some(source) = embedded(name) {
                return Ok(Cow::Borrowed(source));
            }
        }

        let mut searched: Vec<String> = self
            .search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if self.embedded {
            searched.push("<embedded>".into());
        }

        Err(GpuError::MissingShader {
            name: name.to_string(),
            searched: searched.join(", "),
        })
    }
}

fn shader_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.wgsl"))
}

fn embedded(name: &str) -> Option<&'static str> {
    EMBEDDED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, source)| *source)
}
