//! Callable Bindings
//!
//! A binding wraps one resolved symbol and turns call-site arguments into
//! what the call primitive expects.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::{BridgeError, Result};
use super::invoke::{CallPrimitive, InvokeError};
use super::loader::{ResolvedSymbol, SymbolResolver};
use super::types::{Arg, NativeArg, NativeType, ReturnType, Value};

/// Declared return types with a fixed native representation.
///
/// Declarations missing from this table reach the call primitive unchanged.
pub const RETURN_TYPE_TABLE: [(ReturnType, NativeType); 5] = [
    (ReturnType::Text, NativeType::CStr),
    (ReturnType::PlainInteger, NativeType::I32),
    (ReturnType::ExtendedInteger, NativeType::I64),
    (ReturnType::FloatingPoint, NativeType::F64),
    (ReturnType::Void, NativeType::Void),
];

/// Map a declared return type to the representation handed to the call primitive
pub fn native_return_type(declared: ReturnType) -> NativeType {
    RETURN_TYPE_TABLE
        .iter()
        .find(|(ty, _)| *ty == declared)
        .map(|&(_, native)| native)
        .unwrap_or(match declared {
            ReturnType::Native(native) => native,
            _ => NativeType::Ptr,
        })
}

/// Replace buffers with their storage address; everything else passes through
pub fn marshal_args<'a>(args: &[Arg<'a>]) -> Vec<NativeArg<'a>> {
    args.iter()
        .map(|arg| match arg {
            Arg::Int(v) => NativeArg::Int(*v),
            Arg::Long(v) => NativeArg::Long(*v),
            Arg::Float(v) => NativeArg::Float(*v),
            Arg::Text(s) => NativeArg::Text(*s),
            Arg::Pointer(p) => NativeArg::Pointer(*p),
            Arg::Buffer(buf) => NativeArg::Pointer(buf.pointer()),
        })
        .collect()
}

/// One resolved native function
pub struct CallableBinding {
    symbol: ResolvedSymbol,
    invoker: Arc<dyn CallPrimitive>,
    /// Keeps the library mapped while the binding is alive
    _library: Arc<dyn SymbolResolver>,
    return_type: RwLock<ReturnType>,
    arg_types: RwLock<Vec<NativeType>>,
}

impl CallableBinding {
    pub(crate) fn new(
        symbol: ResolvedSymbol,
        invoker: Arc<dyn CallPrimitive>,
        library: Arc<dyn SymbolResolver>,
    ) -> Self {
        Self {
            symbol,
            invoker,
            _library: library,
            return_type: RwLock::new(ReturnType::default()),
            arg_types: RwLock::new(Vec::new()),
        }
    }

    /// Symbol name
    pub fn name(&self) -> &str {
        &self.symbol.name
    }

    pub fn symbol(&self) -> &ResolvedSymbol {
        &self.symbol
    }

    /// Declared return type, `PlainInteger` until changed
    pub fn return_type(&self) -> ReturnType {
        *self.return_type.read()
    }

    /// Change the declared return type for subsequent calls
    pub fn set_return_type(&self, return_type: ReturnType) {
        *self.return_type.write() = return_type;
    }

    /// Declared argument types. Recorded only; marshaling does not consult them.
    pub fn arg_types(&self) -> Vec<NativeType> {
        self.arg_types.read().clone()
    }

    pub fn set_arg_types(&self, arg_types: Vec<NativeType>) {
        *self.arg_types.write() = arg_types;
    }

    /// Call the native function.
    ///
    /// Buffers are passed as their raw storage address and stay owned by the
    /// caller. A call the primitive rejects fails with
    /// [`BridgeError::TypeMismatch`].
    pub fn invoke(&self, args: &[Arg<'_>]) -> Result<Value> {
        let return_type = native_return_type(self.return_type());
        let native_args = marshal_args(args);

        log::trace!(
            "invoking {} -> {} with {} args",
            self.symbol.name,
            return_type,
            native_args.len()
        );

        self.invoker
            .invoke(&self.symbol, return_type, &native_args)
            .map_err(|e| match e {
                InvokeError::Rejected(msg) => BridgeError::TypeMismatch(msg),
            })
    }
}

impl fmt::Display for CallableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.symbol, f)
    }
}

impl fmt::Debug for CallableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableBinding")
            .field("symbol", &self.symbol)
            .field("return_type", &self.return_type())
            .field("arg_types", &self.arg_types())
            .finish()
    }
}
