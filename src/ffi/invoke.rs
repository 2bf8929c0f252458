//! Native Call Primitive
//!
//! Performs the actual call into native code once arguments are marshaled.

use std::ffi::{CStr, CString};

use libc::c_char;
use thiserror::Error;

use super::loader::ResolvedSymbol;
use super::types::{NativeArg, NativeType, Pointer, Value};

/// Maximum integer-class arguments passed in registers
pub const MAX_INT_ARGS: usize = 6;

/// Maximum floating-point arguments passed in registers
pub const MAX_FLOAT_ARGS: usize = 8;

/// Whether integer-class arguments travel in 64-bit registers on this target.
///
/// Elsewhere a `u64` slot occupies two registers or stack words, which shifts
/// every argument after the first.
pub const SUPPORTED_TARGET: bool = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));

/// A call the primitive refused to make
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("{0}")]
    Rejected(String),
}

/// Invokes a resolved symbol
pub trait CallPrimitive: Send + Sync {
    /// Call `symbol` with `args`, reading the result as `return_type`.
    ///
    /// Implementations calling real native code cannot verify that the
    /// symbol's actual signature matches; a mismatch is undefined behavior.
    fn invoke(
        &self,
        symbol: &ResolvedSymbol,
        return_type: NativeType,
        args: &[NativeArg<'_>],
    ) -> Result<Value, InvokeError>;
}

/// Calls native functions through `extern "C"` function pointers.
///
/// Integer-class arguments (integers, pointers, strings) and floating-point
/// arguments are split into two register files, as the x86-64 System V and
/// AArch64 calling conventions assign them independently. Every call passes
/// all six integer and all eight floating-point slots; unused slots are
/// ignored by the callee. Stack-passed arguments are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeInvoker;

impl NativeInvoker {
    pub fn new() -> Self {
        Self
    }
}

/// Register image of one call
struct CallFrame {
    ints: [u64; MAX_INT_ARGS],
    floats: [f64; MAX_FLOAT_ARGS],
    /// Owns the C strings referenced from `ints`
    _strings: Vec<CString>,
}

impl CallFrame {
    fn build(args: &[NativeArg<'_>]) -> Result<Self, InvokeError> {
        if !SUPPORTED_TARGET {
            return Err(InvokeError::Rejected(format!(
                "native calls are not supported on {}",
                std::env::consts::ARCH
            )));
        }

        let mut ints = [0u64; MAX_INT_ARGS];
        let mut floats = [0f64; MAX_FLOAT_ARGS];
        let mut strings = Vec::new();
        let mut n_ints = 0;
        let mut n_floats = 0;

        for (index, arg) in args.iter().enumerate() {
            if let NativeArg::Float(v) = arg {
                if cfg!(windows) {
                    return Err(InvokeError::Rejected(format!(
                        "argument {}: floating-point arguments are not supported on this platform",
                        index
                    )));
                }
                if n_floats == MAX_FLOAT_ARGS {
                    return Err(InvokeError::Rejected(format!(
                        "too many floating-point arguments (max {})",
                        MAX_FLOAT_ARGS
                    )));
                }
                floats[n_floats] = *v;
                n_floats += 1;
                continue;
            }

            if n_ints == MAX_INT_ARGS {
                return Err(InvokeError::Rejected(format!(
                    "too many integer or pointer arguments (max {})",
                    MAX_INT_ARGS
                )));
            }

            ints[n_ints] = match arg {
                NativeArg::Int(v) => i64::from(*v) as u64,
                NativeArg::Long(v) => *v as u64,
                NativeArg::Pointer(p) => p.addr() as u64,
                NativeArg::Text(s) => {
                    let c_string = CString::new(*s).map_err(|e| {
                        InvokeError::Rejected(format!(
                            "argument {}: string contains a NUL byte at position {}",
                            index,
                            e.nul_position()
                        ))
                    })?;
                    let addr = c_string.as_ptr() as u64;
                    strings.push(c_string);
                    addr
                }
                NativeArg::Float(_) => unreachable!("floats are handled above"),
            };
            n_ints += 1;
        }

        Ok(Self {
            ints,
            floats,
            _strings: strings,
        })
    }
}

/// Transmute `$addr` to a function returning `$ret` and call it with the frame
macro_rules! native_call {
    ($addr:expr, $frame:expr, $ret:ty) => {{
        type NativeFn = unsafe extern "C" fn(
            u64,
            u64,
            u64,
            u64,
            u64,
            u64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
            f64,
        ) -> $ret;
        let f: NativeFn = std::mem::transmute::<usize, NativeFn>($addr);
        let i = &$frame.ints;
        let x = &$frame.floats;
        f(
            i[0], i[1], i[2], i[3], i[4], i[5], x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7],
        )
    }};
}

impl CallPrimitive for NativeInvoker {
    fn invoke(
        &self,
        symbol: &ResolvedSymbol,
        return_type: NativeType,
        args: &[NativeArg<'_>],
    ) -> Result<Value, InvokeError> {
        if symbol.address == 0 {
            return Err(InvokeError::Rejected(format!(
                "symbol '{}' has a null address",
                symbol.name
            )));
        }

        let frame = CallFrame::build(args)?;
        let addr = symbol.address;

        // Safety: the address came from a resolver and the caller declared the
        // return type. Nothing here can check either against the real signature.
        let value = unsafe {
            match return_type {
                NativeType::Void => {
                    native_call!(addr, frame, ());
                    Value::Void
                }
                NativeType::I8 => Value::Int(i32::from(native_call!(addr, frame, i8))),
                NativeType::I16 => Value::Int(i32::from(native_call!(addr, frame, i16))),
                NativeType::I32 => Value::Int(native_call!(addr, frame, i32)),
                NativeType::U8 => Value::Int(i32::from(native_call!(addr, frame, u8))),
                NativeType::U16 => Value::Int(i32::from(native_call!(addr, frame, u16))),
                NativeType::U32 => Value::Long(i64::from(native_call!(addr, frame, u32))),
                NativeType::I64 => Value::Long(native_call!(addr, frame, i64)),
                NativeType::U64 => Value::ULong(native_call!(addr, frame, u64)),
                NativeType::F32 => Value::Float(f64::from(native_call!(addr, frame, f32))),
                NativeType::F64 => Value::Float(native_call!(addr, frame, f64)),
                NativeType::Ptr => {
                    Value::Pointer(Pointer::from_addr(native_call!(addr, frame, usize)))
                }
                NativeType::CStr => {
                    let ptr = native_call!(addr, frame, *const c_char);
                    if ptr.is_null() {
                        Value::Text(None)
                    } else {
                        Value::Text(Some(CStr::from_ptr(ptr).to_string_lossy().into_owned()))
                    }
                }
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add_i32(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn mixed(a: i64, x: f64, b: i64, y: f64) -> f64 {
        a as f64 * x + b as f64 * y
    }

    extern "C" fn text_len(s: *const c_char) -> u64 {
        unsafe { CStr::from_ptr(s).to_bytes().len() as u64 }
    }

    extern "C" fn greeting() -> *const c_char {
        b"hello\0".as_ptr() as *const c_char
    }

    extern "C" fn nothing() -> *const c_char {
        std::ptr::null()
    }

    extern "C" fn negate(v: i32) -> i32 {
        -v
    }

    extern "C" fn all_ones() -> u64 {
        u64::MAX
    }

    fn symbol(name: &str, addr: usize) -> ResolvedSymbol {
        ResolvedSymbol::new(name, "self", addr)
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_integer_call() {
        let sym = symbol("add_i32", add_i32 as usize);
        let result = NativeInvoker
            .invoke(&sym, NativeType::I32, &[NativeArg::Int(40), NativeArg::Int(2)])
            .unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_negative_int_round_trips() {
        let sym = symbol("negate", negate as usize);
        let result = NativeInvoker
            .invoke(&sym, NativeType::I32, &[NativeArg::Int(7)])
            .unwrap();
        assert_eq!(result, Value::Int(-7));
    }

    #[cfg(all(not(windows), any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_mixed_int_and_float_call() {
        let sym = symbol("mixed", mixed as usize);
        let args = [
            NativeArg::Long(2),
            NativeArg::Float(1.5),
            NativeArg::Long(3),
            NativeArg::Float(0.5),
        ];
        let result = NativeInvoker.invoke(&sym, NativeType::F64, &args).unwrap();
        assert_eq!(result, Value::Float(4.5));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_text_argument() {
        let sym = symbol("text_len", text_len as usize);
        let result = NativeInvoker
            .invoke(&sym, NativeType::U64, &[NativeArg::Text("bridge")])
            .unwrap();
        assert_eq!(result, Value::ULong(6));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_unsigned_64_bit_return_does_not_wrap() {
        let sym = symbol("all_ones", all_ones as usize);
        let result = NativeInvoker.invoke(&sym, NativeType::U64, &[]).unwrap();
        assert_eq!(result, Value::ULong(u64::MAX));
        assert_eq!(result.as_u64(), Some(u64::MAX));
        assert_eq!(result.as_i64(), None);
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_text_return() {
        let sym = symbol("greeting", greeting as usize);
        let result = NativeInvoker.invoke(&sym, NativeType::CStr, &[]).unwrap();
        assert_eq!(result, Value::Text(Some("hello".to_string())));

        let sym = symbol("nothing", nothing as usize);
        let result = NativeInvoker.invoke(&sym, NativeType::CStr, &[]).unwrap();
        assert_eq!(result, Value::Text(None));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_pointer_return() {
        let sym = symbol("greeting", greeting as usize);
        let result = NativeInvoker.invoke(&sym, NativeType::Ptr, &[]).unwrap();
        assert!(!result.as_pointer().unwrap().is_null());
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_rejects_interior_nul() {
        let sym = symbol("text_len", text_len as usize);
        let err = NativeInvoker
            .invoke(&sym, NativeType::U64, &[NativeArg::Text("a\0b")])
            .unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn test_rejects_too_many_int_args() {
        let sym = symbol("add_i32", add_i32 as usize);
        let args = vec![NativeArg::Int(1); MAX_INT_ARGS + 1];
        let err = NativeInvoker.invoke(&sym, NativeType::I32, &args).unwrap_err();
        assert!(err.to_string().contains("too many"));
    }

    #[test]
    fn test_call_gated_on_64_bit_register_targets() {
        let sym = symbol("add_i32", add_i32 as usize);
        let result = NativeInvoker.invoke(
            &sym,
            NativeType::I32,
            &[NativeArg::Int(40), NativeArg::Int(2)],
        );
        if SUPPORTED_TARGET {
            assert_eq!(result.unwrap(), Value::Int(42));
        } else {
            let err = result.unwrap_err();
            assert!(err.to_string().contains("not supported"));
        }
    }

    #[test]
    fn test_rejects_null_symbol() {
        let sym = symbol("null", 0);
        assert!(NativeInvoker.invoke(&sym, NativeType::Void, &[]).is_err());
    }
}
