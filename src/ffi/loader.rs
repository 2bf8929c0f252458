//! Dynamic Library Loader
//!
//! The resolver side of the bridge: finding a shared library by name or
//! path, loading it with libloading, and looking up symbols.

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;

use super::error::BridgeError;
use crate::config::LoaderConfig;

/// A symbol resolved from a library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// Symbol name
    pub name: String,
    /// Name of the library it was resolved from
    pub library: String,
    /// Entry point address
    pub address: usize,
}

impl ResolvedSymbol {
    pub fn new(name: impl Into<String>, library: impl Into<String>, address: usize) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            address,
        }
    }
}

impl fmt::Display for ResolvedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native function {}({})@{:#x}",
            self.name, self.library, self.address
        )
    }
}

/// Failure reported by a [`SymbolResolver`]
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The library has no symbol with this name
    #[error("{0}")]
    Missing(String),
    /// Any other failure; passed to the caller unchanged
    #[error(transparent)]
    Failed(#[from] BridgeError),
}

/// Looks up function symbols in one opened library
pub trait SymbolResolver: Send + Sync {
    /// Name the library was opened under
    fn library_name(&self) -> &str;

    /// Resolve a symbol by name
    fn resolve(&self, name: &str) -> Result<ResolvedSymbol, ResolveError>;
}

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Name the library was requested under
    name: String,
    /// Path or file name that was actually loaded
    path: PathBuf,
    /// The loaded library handle
    library: Library,
}

impl DynamicLibrary {
    /// Load a library from the given path or file name.
    ///
    /// A bare file name goes through the platform loader's own search.
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();

        // Safety: loading a library runs its initializers. The caller chose
        // the library and trusts it.
        let library = unsafe {
            Library::new(&path).map_err(|e| BridgeError::LibraryNotFound {
                name: name.clone(),
                reason: format!("failed to load '{}': {}", path.display(), e),
            })?
        };

        log::debug!("loaded library '{}' from {}", name, path.display());

        Ok(Self {
            name,
            path,
            library,
        })
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolResolver for DynamicLibrary {
    fn library_name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, name: &str) -> Result<ResolvedSymbol, ResolveError> {
        let c_name =
            CString::new(name).map_err(|_| BridgeError::InvalidSymbol(name.to_string()))?;

        // Safety: the symbol is only treated as an opaque address here. Its
        // signature is supplied at call time.
        let symbol: Symbol<*const ()> = unsafe {
            self.library
                .get(c_name.as_bytes_with_nul())
                .map_err(|e| ResolveError::Missing(e.to_string()))?
        };

        let address = *symbol as usize;
        if address == 0 {
            return Err(ResolveError::Missing(format!("symbol '{}' is null", name)));
        }

        Ok(ResolvedSymbol::new(name, self.name.clone(), address))
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Library loader with search paths and name aliases
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
    /// Library name -> file name or path to load instead
    aliases: HashMap<String, String>,
}

impl LibraryLoader {
    /// Create a loader with the platform defaults
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            aliases: default_aliases(),
        }
    }

    /// Create a loader from configuration.
    ///
    /// Configured search paths come before the platform defaults and
    /// configured aliases override the built-in ones.
    pub fn from_config(config: &LoaderConfig) -> Self {
        let mut search_paths = config.search_paths.clone();
        if config.default_paths {
            search_paths.extend(default_search_paths());
        }

        let mut aliases = default_aliases();
        aliases.extend(config.aliases.clone());

        Self {
            search_paths,
            aliases,
        }
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Map a library name to the file name or path to load instead
    pub fn add_alias(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(name.into(), target.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Candidate paths for a library name, most specific first
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let target = self.aliases.get(name).map(String::as_str).unwrap_or(name);

        // If it's already a path, use it as is. A bare file name is never
        // looked up relative to the working directory.
        let path = Path::new(target);
        if is_explicit_path(path) && path.exists() {
            return vec![path.to_path_buf()];
        }

        let file_name = library_filename(target);
        let mut candidates: Vec<PathBuf> = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .filter(|p| p.exists())
            .collect();

        // Fall back to the platform loader's own search
        candidates.push(PathBuf::from(&file_name));
        if file_name != target {
            candidates.push(PathBuf::from(target));
        }
        candidates
    }

    /// Load a library by name or path
    pub fn load(&self, name: &str) -> Result<DynamicLibrary, BridgeError> {
        let mut last_error = None;
        for candidate in self.candidates(name) {
            match DynamicLibrary::load(name, &candidate) {
                Ok(library) => return Ok(library),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| BridgeError::LibraryNotFound {
            name: name.to_string(),
            reason: "no candidate paths".to_string(),
        }))
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// A name with a directory part, such as `./libfoo.so` or `/usr/lib/libfoo.so`
fn is_explicit_path(path: &Path) -> bool {
    path.components().count() > 1
}

/// Built-in aliases for names the platform loader cannot open directly
fn default_aliases() -> HashMap<String, String> {
    let mut aliases = HashMap::new();

    // libc.so and libm.so are linker scripts on glibc systems
    #[cfg(target_os = "linux")]
    {
        aliases.insert("c".to_string(), "libc.so.6".to_string());
        aliases.insert("m".to_string(), "libm.so.6".to_string());
    }

    #[cfg(target_os = "macos")]
    {
        aliases.insert("c".to_string(), "/usr/lib/libSystem.B.dylib".to_string());
        aliases.insert("m".to_string(), "/usr/lib/libSystem.B.dylib".to_string());
    }

    aliases
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    // The working directory is left out so a stray ./libc.so.6 never shadows
    // the system runtime; add it through the config when wanted.
    #[allow(unused_mut)]
    let mut paths = Vec::new();

    // Standard system paths
    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));
        paths.push(PathBuf::from("/lib64"));
        paths.push(PathBuf::from("/usr/lib64"));

        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(ld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));

        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(dyld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Windows\\System32"));

        if let Ok(path) = std::env::var("PATH") {
            paths.extend(path.split(';').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    paths
}

/// Construct the platform-specific library filename
pub fn library_filename(name: &str) -> String {
    if name.contains('/') || name.contains('\\') {
        return name.to_string();
    }

    #[cfg(target_os = "linux")]
    {
        // Versioned names like libc.so.6 are already file names
        if name.ends_with(".so") || name.contains(".so.") {
            name.to_string()
        } else if name.starts_with("lib") {
            format!("{}.so", name)
        } else {
            format!("lib{}.so", name)
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.ends_with(".dylib") {
            name.to_string()
        } else if name.starts_with("lib") {
            format!("{}.dylib", name)
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.to_lowercase().ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        name.to_string()
    }
}
