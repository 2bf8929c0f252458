//! Bridge Type System
//!
//! Declared types, call-site arguments, and native call results.

use std::fmt;
use std::str::FromStr;

use super::buffer::NativeBuffer;
use super::error::BridgeError;

/// Native representations understood by the call primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// Void (no value)
    Void,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer (C `int`)
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point (C `double`)
    F64,
    /// Pointer (usize, platform-dependent)
    Ptr,
    /// Null-terminated C string (const char*)
    CStr,
}

impl NativeType {
    /// Get the size in bytes of this type
    pub fn size(&self) -> usize {
        match self {
            NativeType::Void => 0,
            NativeType::U8 | NativeType::I8 => 1,
            NativeType::U16 | NativeType::I16 => 2,
            NativeType::U32 | NativeType::I32 | NativeType::F32 => 4,
            NativeType::U64 | NativeType::I64 | NativeType::F64 => 8,
            NativeType::Ptr | NativeType::CStr => std::mem::size_of::<usize>(),
        }
    }

    /// Check if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NativeType::U8
                | NativeType::U16
                | NativeType::U32
                | NativeType::U64
                | NativeType::I8
                | NativeType::I16
                | NativeType::I32
                | NativeType::I64
        )
    }

    /// Check if this type is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, NativeType::F32 | NativeType::F64)
    }

    /// Check if this type is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self, NativeType::Ptr | NativeType::CStr)
    }

    /// Parse a C-style or short type name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "void" => Some(NativeType::Void),
            "u8" | "uint8" | "uint8_t" | "byte" | "unsigned char" => Some(NativeType::U8),
            "u16" | "uint16" | "uint16_t" | "unsigned short" => Some(NativeType::U16),
            "u32" | "uint32" | "uint32_t" | "unsigned" | "unsigned int" => Some(NativeType::U32),
            "u64" | "uint64" | "uint64_t" | "size_t" => Some(NativeType::U64),
            "i8" | "int8" | "int8_t" | "char" => Some(NativeType::I8),
            "i16" | "int16" | "int16_t" | "short" => Some(NativeType::I16),
            "i32" | "int32" | "int32_t" | "int" => Some(NativeType::I32),
            "i64" | "int64" | "int64_t" | "long long" | "ssize_t" => Some(NativeType::I64),
            "f32" | "float" => Some(NativeType::F32),
            "f64" | "double" => Some(NativeType::F64),
            "ptr" | "pointer" | "void*" | "file*" => Some(NativeType::Ptr),
            "cstr" | "char*" | "const char*" => Some(NativeType::CStr),
            _ => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeType::Void => "void",
            NativeType::U8 => "u8",
            NativeType::U16 => "u16",
            NativeType::U32 => "u32",
            NativeType::U64 => "u64",
            NativeType::I8 => "i8",
            NativeType::I16 => "i16",
            NativeType::I32 => "i32",
            NativeType::I64 => "i64",
            NativeType::F32 => "f32",
            NativeType::F64 => "f64",
            NativeType::Ptr => "ptr",
            NativeType::CStr => "cstr",
        };
        f.write_str(name)
    }
}

/// Return type declared on a binding.
///
/// The five value categories map to native types through a fixed table owned
/// by the binding module. [`ReturnType::RawPointer`] and
/// [`ReturnType::Native`] bypass that table and reach the call primitive
/// as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnType {
    /// Platform `int`
    #[default]
    PlainInteger,
    /// 64-bit integer
    ExtendedInteger,
    /// Floating point (`double`)
    FloatingPoint,
    /// NUL-terminated string copied into an owned `String`
    Text,
    /// Opaque pointer such as a `FILE*`
    RawPointer,
    /// No return value
    Void,
    /// A native type named directly by the caller
    Native(NativeType),
}

impl FromStr for ReturnType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "int" => Ok(ReturnType::PlainInteger),
            "long" => Ok(ReturnType::ExtendedInteger),
            "float" => Ok(ReturnType::FloatingPoint),
            "str" | "text" => Ok(ReturnType::Text),
            "pointer" => Ok(ReturnType::RawPointer),
            "void" | "none" => Ok(ReturnType::Void),
            other => NativeType::parse(other)
                .map(ReturnType::Native)
                .ok_or_else(|| BridgeError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::PlainInteger => write!(f, "int"),
            ReturnType::ExtendedInteger => write!(f, "long"),
            ReturnType::FloatingPoint => write!(f, "float"),
            ReturnType::Text => write!(f, "str"),
            ReturnType::RawPointer => write!(f, "pointer"),
            ReturnType::Void => write!(f, "void"),
            ReturnType::Native(ty) => write!(f, "{}", ty),
        }
    }
}

/// An opaque native address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pointer(usize);

impl Pointer {
    /// The null pointer
    pub const NULL: Pointer = Pointer(0);

    /// Wrap a raw address
    pub const fn from_addr(addr: usize) -> Self {
        Pointer(addr)
    }

    /// The raw address
    pub const fn addr(&self) -> usize {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn as_ptr<T>(&self) -> *mut T {
        self.0 as *mut T
    }
}

impl<T> From<*mut T> for Pointer {
    fn from(ptr: *mut T) -> Self {
        Pointer(ptr as usize)
    }
}

impl<T> From<*const T> for Pointer {
    fn from(ptr: *const T) -> Self {
        Pointer(ptr as usize)
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({:#x})", self.0)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A call-site argument.
///
/// A buffer is borrowed exclusively for the duration of the call, since the
/// native function may write into it.
#[derive(Debug)]
pub enum Arg<'a> {
    /// Platform `int`
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// `double`
    Float(f64),
    /// Passed as a temporary NUL-terminated copy
    Text(&'a str),
    /// Raw address
    Pointer(Pointer),
    /// Replaced by the buffer's storage address before the call
    Buffer(&'a mut NativeBuffer),
}

impl From<i32> for Arg<'_> {
    fn from(v: i32) -> Self {
        Arg::Int(v)
    }
}

impl From<i64> for Arg<'_> {
    fn from(v: i64) -> Self {
        Arg::Long(v)
    }
}

impl From<usize> for Arg<'_> {
    fn from(v: usize) -> Self {
        Arg::Long(v as i64)
    }
}

impl From<f64> for Arg<'_> {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(v: &'a str) -> Self {
        Arg::Text(v)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(v: &'a String) -> Self {
        Arg::Text(v.as_str())
    }
}

impl From<Pointer> for Arg<'_> {
    fn from(v: Pointer) -> Self {
        Arg::Pointer(v)
    }
}

impl<'a> From<&'a mut NativeBuffer> for Arg<'a> {
    fn from(v: &'a mut NativeBuffer) -> Self {
        Arg::Buffer(v)
    }
}

/// A marshaled argument as the call primitive receives it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeArg<'a> {
    Int(i32),
    Long(i64),
    Float(f64),
    Text(&'a str),
    Pointer(Pointer),
}

impl NativeArg<'_> {
    /// Check if this argument travels in a floating-point register
    pub fn is_float(&self) -> bool {
        matches!(self, NativeArg::Float(_))
    }
}

/// A value returned from a native call
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value
    Void,
    /// Platform `int` and narrower integers
    Int(i32),
    /// 64-bit and unsigned 32-bit integers
    Long(i64),
    /// Unsigned 64-bit integers such as `size_t`
    ULong(u64),
    /// Floating point
    Float(f64),
    /// Copied string, `None` for a NULL `char*`
    Text(Option<String>),
    /// Raw address
    Pointer(Pointer),
}

impl Value {
    /// Check if this is a void value
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Integer view of integer results, `None` if the value does not fit
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::ULong(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Long(v) => u64::try_from(*v).ok(),
            Value::ULong(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Pass a result back into another call, e.g. a `FILE*` from `fopen`
    pub fn to_arg(&self) -> Option<Arg<'_>> {
        match self {
            Value::Void => None,
            Value::Int(v) => Some(Arg::Int(*v)),
            Value::Long(v) => Some(Arg::Long(*v)),
            // Same bits in the integer register
            Value::ULong(v) => Some(Arg::Long(*v as i64)),
            Value::Float(v) => Some(Arg::Float(*v)),
            Value::Text(Some(s)) => Some(Arg::Text(s)),
            Value::Text(None) => Some(Arg::Pointer(Pointer::NULL)),
            Value::Pointer(p) => Some(Arg::Pointer(*p)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::ULong(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(Some(s)) => write!(f, "{:?}", s),
            Value::Text(None) => write!(f, "NULL"),
            Value::Pointer(p) => write!(f, "{}", p),
        }
    }
}
