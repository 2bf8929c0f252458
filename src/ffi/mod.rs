//! Native Call Bridge
//!
//! Loads shared libraries by name, resolves functions lazily, and calls them
//! with simple value marshaling.
//!
//! # Architecture
//!
//! ```text
//! LibraryHandle::function("printf")
//!       │
//!       ▼
//! Binding cache (hit → cached CallableBinding)
//!       │ miss
//!       ▼
//! SymbolResolver (DynamicLibrary, libloading)
//!       │
//!       ▼
//! CallableBinding::invoke(args)
//!       │  buffers → raw address, return type → native type
//!       ▼
//! CallPrimitive (NativeInvoker)
//!       │
//!       ▼
//! Native Function Call
//! ```
//!
//! # Example
//!
//! ```no_run
//! use native_bridge::ffi::{open_system_c_library, Arg, NativeBuffer, ReturnType, STDIN};
//!
//! let libc = open_system_c_library()?;
//! let printf = libc.function("printf")?;
//! printf.invoke(&["Hello %s\n".into(), "world".into()])?;
//!
//! let mut buf = NativeBuffer::new(80)?;
//! let size = buf.size();
//! libc.function("read")?
//!     .invoke(&[Arg::Int(STDIN), Arg::Buffer(&mut buf), size.into()])?;
//! println!("echo: {}", buf.as_string()?);
//!
//! let fopen = libc.function("fopen")?;
//! fopen.set_return_type(ReturnType::RawPointer);
//! let file = fopen.invoke(&["out.txt".into(), "w".into()])?;
//! if let Some(ptr) = file.as_pointer() {
//!     libc.function("fclose")?.invoke(&[ptr.into()])?;
//! }
//! # Ok::<(), native_bridge::ffi::BridgeError>(())
//! ```

mod binding;
mod buffer;
mod error;
mod invoke;
mod library;
mod loader;
mod types;

pub use binding::{marshal_args, native_return_type, CallableBinding, RETURN_TYPE_TABLE};
pub use buffer::NativeBuffer;
pub use error::{BridgeError, Result};
pub use invoke::{CallPrimitive, InvokeError, NativeInvoker, MAX_FLOAT_ARGS, MAX_INT_ARGS, SUPPORTED_TARGET};
pub use library::{
    open_library, open_system_c_library, LibraryHandle, C_LIBRARY_NAME, STDERR, STDIN, STDOUT,
};
pub use loader::{
    library_filename, DynamicLibrary, LibraryLoader, ResolveError, ResolvedSymbol, SymbolResolver,
};
pub use types::{Arg, NativeArg, NativeType, Pointer, ReturnType, Value};
