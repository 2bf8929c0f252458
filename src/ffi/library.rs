//! Library Handles
//!
//! A handle owns one opened library, resolves functions on first use and
//! memoizes the bindings.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::binding::CallableBinding;
use super::error::{BridgeError, Result};
use super::invoke::{CallPrimitive, NativeInvoker};
use super::loader::{LibraryLoader, ResolveError, SymbolResolver};
use crate::config::BridgeConfig;

/// Standard input file descriptor, for calls such as `read`
pub const STDIN: i32 = 0;
/// Standard output file descriptor
pub const STDOUT: i32 = 1;
/// Standard error file descriptor
pub const STDERR: i32 = 2;

/// Name of the platform C runtime library
#[cfg(windows)]
pub const C_LIBRARY_NAME: &str = "msvcrt";
/// Name of the platform C runtime library
#[cfg(not(windows))]
pub const C_LIBRARY_NAME: &str = "c";

type Attribute = Arc<dyn Any + Send + Sync>;

/// An opened native library.
///
/// Functions and attributes live in separate namespaces: [`function`]
/// never looks at attributes and an attribute never hides a function of the
/// same name.
///
/// [`function`]: LibraryHandle::function
pub struct LibraryHandle {
    name: String,
    resolver: Arc<dyn SymbolResolver>,
    invoker: Arc<dyn CallPrimitive>,
    bindings: Mutex<HashMap<String, Arc<CallableBinding>>>,
    attributes: RwLock<HashMap<String, Attribute>>,
}

impl LibraryHandle {
    /// Open a library by name or path with the default loader
    pub fn open(name: &str) -> Result<Self> {
        let library = LibraryLoader::new().load(name)?;
        Ok(Self::with_parts(name, Arc::new(library), Arc::new(NativeInvoker)))
    }

    /// Open a library using the search paths and aliases from `config`
    pub fn open_with_config(name: &str, config: &BridgeConfig) -> Result<Self> {
        let library = LibraryLoader::from_config(&config.loader).load(name)?;
        Ok(Self::with_parts(name, Arc::new(library), Arc::new(NativeInvoker)))
    }

    /// Open a library using the native-bridge.toml found from the current directory up
    pub fn open_configured(name: &str) -> Result<Self> {
        let config = BridgeConfig::load_from_cwd()?;
        Self::open_with_config(name, &config)
    }

    /// Open the platform C runtime: `msvcrt` on Windows, `c` elsewhere
    pub fn system_c() -> Result<Self> {
        Self::open(C_LIBRARY_NAME)
    }

    /// Build a handle from an already opened resolver and a call primitive
    pub fn with_parts(
        name: impl Into<String>,
        resolver: Arc<dyn SymbolResolver>,
        invoker: Arc<dyn CallPrimitive>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            invoker,
            bindings: Mutex::new(HashMap::new()),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// Name the library was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the binding for `name`, resolving it on first use.
    ///
    /// The lookup and insert happen under one lock, so concurrent first
    /// callers get the same binding and the resolver runs once. A failed
    /// lookup is not remembered.
    pub fn function(&self, name: &str) -> Result<Arc<CallableBinding>> {
        let mut bindings = self.bindings.lock();

        // Check cache first
        if let Some(binding) = bindings.get(name) {
            return Ok(Arc::clone(binding));
        }

        let symbol = self.resolver.resolve(name).map_err(|e| match e {
            ResolveError::Missing(_) => BridgeError::SymbolNotFound(name.to_string()),
            ResolveError::Failed(err) => err,
        })?;

        log::debug!("resolved {}", symbol);

        let binding = Arc::new(CallableBinding::new(
            symbol,
            Arc::clone(&self.invoker),
            Arc::clone(&self.resolver),
        ));
        bindings.insert(name.to_string(), Arc::clone(&binding));
        Ok(binding)
    }

    /// Check whether `name` has already been resolved
    pub fn is_cached(&self, name: &str) -> bool {
        self.bindings.lock().contains_key(name)
    }

    /// Names of all resolved functions, sorted
    pub fn cached_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Read an attribute stored with [`set_attribute`](Self::set_attribute).
    ///
    /// Returns `None` if the key is absent or holds a different type.
    pub fn get_attribute<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.attributes.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Store an arbitrary value on the handle, replacing any previous value
    pub fn set_attribute<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.attributes.write().insert(key.into(), Arc::new(value));
    }

    /// Remove an attribute, returning whether it existed
    pub fn remove_attribute(&self, key: &str) -> bool {
        self.attributes.write().remove(key).is_some()
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.read().contains_key(key)
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("name", &self.name)
            .field("functions", &self.cached_functions())
            .finish()
    }
}

/// Open a library by name or path
pub fn open_library(name: &str) -> Result<LibraryHandle> {
    LibraryHandle::open(name)
}

/// Open the platform C runtime library
pub fn open_system_c_library() -> Result<LibraryHandle> {
    LibraryHandle::system_c()
}
