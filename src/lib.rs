//! Native Bridge - minimal dynamic-library call bridge
//!
//! Opens a shared library by name, resolves functions the first time they are
//! asked for, and calls them with a small set of value mappings: integers,
//! floating point, strings, raw pointers and caller-owned buffers.
//!
//! # Features
//!
//! - **Lazy binding**: symbols are resolved on first use and memoized per library
//! - **Declared return types**: `int` by default, overridable per function
//! - **Native buffers**: zero-filled raw memory for functions that write into caller storage
//! - **Pluggable collaborators**: the resolver and call primitive are traits
//! - **Configurable loading**: search paths and name aliases from `native-bridge.toml`
//!
//! # Example
//!
//! ```no_run
//! use native_bridge::{open_system_c_library, ReturnType};
//!
//! let libc = open_system_c_library()?;
//! libc.function("printf")?
//!     .invoke(&["Hello from %s\n".into(), "native-bridge".into()])?;
//!
//! let getenv = libc.function("getenv")?;
//! getenv.set_return_type(ReturnType::Text);
//! let home = getenv.invoke(&["HOME".into()])?;
//! println!("HOME = {}", home);
//! # Ok::<(), native_bridge::BridgeError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  LibraryHandle  │  name → binding cache, attribute store
//! └────────┬────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐
//! │ SymbolResolver  │  libloading, search paths, aliases
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CallableBinding │  buffer substitution, return type table
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  CallPrimitive  │  extern "C" call
//! └─────────────────┘
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod ffi;

// Re-export commonly used types
pub use config::{BridgeConfig, ConfigError, LoaderConfig};
pub use ffi::{
    open_library, open_system_c_library, Arg, BridgeError, CallPrimitive, CallableBinding,
    LibraryHandle, NativeBuffer, NativeType, Pointer, ResolvedSymbol, ReturnType, SymbolResolver,
    Value,
};
