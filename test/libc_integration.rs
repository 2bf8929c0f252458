//! Native Call Integration Tests
//!
//! Calls into the real C runtime through the default loader and invoker.

#![cfg(all(unix, any(target_arch = "x86_64", target_arch = "aarch64")))]

use std::sync::Arc;

use native_bridge::ffi::{
    open_library, open_system_c_library, Arg, BridgeError, LibraryHandle, NativeBuffer,
    NativeType, Pointer, ReturnType, Value,
};

fn libc() -> LibraryHandle {
    let _ = env_logger::builder().is_test(true).try_init();
    open_system_c_library().expect("Failed to open the C runtime")
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn test_open_missing_library() {
    let err = open_library("definitely_not_a_library_xyz").unwrap_err();
    assert!(matches!(err, BridgeError::LibraryNotFound { .. }));
}

#[test]
fn test_missing_symbol() {
    let lib = libc();
    let err = lib.function("definitely_not_a_function").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::SymbolNotFound(ref name) if name == "definitely_not_a_function"
    ));

    // The handle keeps working afterwards
    assert!(lib.function("strlen").is_ok());
}

#[test]
fn test_lookup_is_memoized() {
    let lib = libc();
    let a = lib.function("strlen").unwrap();
    let b = lib.function("strlen").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.to_string().starts_with("native function strlen"));
}

// ============================================================================
// Calls
// ============================================================================

// Variadic arguments go on the stack on Apple Silicon.
#[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
#[test]
fn test_printf() {
    let lib = libc();
    let printf = lib.function("printf").unwrap();
    let written = printf
        .invoke(&["Hello %s\n".into(), "from native-bridge".into()])
        .unwrap();
    assert_eq!(written, Value::Int(25));

    lib.function("fflush")
        .unwrap()
        .invoke(&[Arg::Pointer(Pointer::NULL)])
        .unwrap();
}

#[test]
fn test_integer_calls() {
    let lib = libc();

    let abs = lib.function("abs").unwrap();
    assert_eq!(abs.invoke(&[Arg::Int(-42)]).unwrap(), Value::Int(42));

    let labs = lib.function("labs").unwrap();
    labs.set_return_type(ReturnType::ExtendedInteger);
    assert_eq!(
        labs.invoke(&[Arg::Long(-5_000_000_000)]).unwrap(),
        Value::Long(5_000_000_000)
    );

    let strlen = lib.function("strlen").unwrap();
    strlen.set_return_type(ReturnType::ExtendedInteger);
    assert_eq!(strlen.invoke(&["bridge".into()]).unwrap(), Value::Long(6));
}

#[test]
fn test_unsigned_64_bit_return() {
    let lib = libc();
    let strtoull = lib.function("strtoull").unwrap();
    strtoull.set_return_type(ReturnType::Native(NativeType::U64));
    let args = [
        "18446744073709551615".into(),
        Arg::Pointer(Pointer::NULL),
        Arg::Int(10),
    ];
    let max = strtoull.invoke(&args).unwrap();
    assert_eq!(max, Value::ULong(u64::MAX));
}

#[test]
fn test_getpid() {
    let lib = libc();
    let pid = lib.function("getpid").unwrap().invoke(&[]).unwrap();
    assert_eq!(pid, Value::Int(std::process::id() as i32));
}

#[test]
fn test_text_return() {
    let lib = libc();
    std::env::set_var("NATIVE_BRIDGE_TEST_VAR", "present");

    let getenv = lib.function("getenv").unwrap();
    getenv.set_return_type(ReturnType::Text);
    assert_eq!(
        getenv.invoke(&["NATIVE_BRIDGE_TEST_VAR".into()]).unwrap(),
        Value::Text(Some("present".to_string()))
    );
    assert_eq!(
        getenv.invoke(&["NATIVE_BRIDGE_UNSET_VAR".into()]).unwrap(),
        Value::Text(None)
    );
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[test]
fn test_float_return() {
    let lib = libc();
    let strtod = lib.function("strtod").unwrap();
    strtod.set_return_type(ReturnType::FloatingPoint);
    assert_eq!(
        strtod.invoke(&["2.5".into(), Arg::Pointer(Pointer::NULL)]).unwrap(),
        Value::Float(2.5)
    );

    let strtof = lib.function("strtof").unwrap();
    strtof.set_return_type(ReturnType::Native(NativeType::F32));
    assert_eq!(
        strtof.invoke(&["0.75".into(), Arg::Pointer(Pointer::NULL)]).unwrap(),
        Value::Float(0.75)
    );
}

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
#[test]
fn test_float_arguments() {
    let libm = open_library("m").unwrap();
    let pow = libm.function("pow").unwrap();
    pow.set_return_type(ReturnType::FloatingPoint);
    assert_eq!(
        pow.invoke(&[Arg::Float(2.0), Arg::Float(10.0)]).unwrap(),
        Value::Float(1024.0)
    );
}

#[test]
fn test_interior_nul_is_type_mismatch() {
    let lib = libc();
    let err = lib
        .function("strlen")
        .unwrap()
        .invoke(&["a\0b".into()])
        .unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_read_into_buffer() {
    let lib = libc();

    // int fds[2]
    let mut fds = NativeBuffer::new(8).unwrap();
    let rc = lib
        .function("pipe")
        .unwrap()
        .invoke(&[Arg::Buffer(&mut fds)])
        .unwrap();
    assert_eq!(rc, Value::Int(0));

    let bytes = fds.as_bytes();
    let read_fd = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let write_fd = i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    let write = lib.function("write").unwrap();
    write.set_return_type(ReturnType::ExtendedInteger);
    let written = write
        .invoke(&[Arg::Int(write_fd), "echo me".into(), Arg::Long(7)])
        .unwrap();
    assert_eq!(written, Value::Long(7));

    let mut buf = NativeBuffer::new(80).unwrap();
    let size = buf.size();
    let read = lib.function("read").unwrap();
    read.set_return_type(ReturnType::ExtendedInteger);
    let n = read
        .invoke(&[Arg::Int(read_fd), Arg::Buffer(&mut buf), size.into()])
        .unwrap()
        .as_i64()
        .unwrap();
    assert_eq!(n, 7);

    assert_eq!(buf.decode_text(0, Some(n as usize)).unwrap(), "echo me");
    assert_eq!(buf.decode_text(5, Some(2)).unwrap(), "me");
    assert_eq!(buf.as_string().unwrap().len(), 80);

    let close = lib.function("close").unwrap();
    close.invoke(&[Arg::Int(read_fd)]).unwrap();
    close.invoke(&[Arg::Int(write_fd)]).unwrap();
}

#[test]
fn test_buffer_range_error() {
    let buf = NativeBuffer::new(10).unwrap();
    assert!(matches!(
        buf.decode_text(5, Some(10)),
        Err(BridgeError::Range { .. })
    ));
}

#[test]
fn test_file_round_trip_with_pointer_return() {
    let lib = libc();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let path_str = path.to_string_lossy().to_string();

    let fopen = lib.function("fopen").unwrap();
    fopen.set_return_type(ReturnType::RawPointer);
    let file = fopen.invoke(&[(&path_str).into(), "w".into()]).unwrap();
    let file = file.as_pointer().expect("fopen should return a pointer");
    assert!(!file.is_null());

    let fputs = lib.function("fputs").unwrap();
    fputs.invoke(&["written natively".into(), file.into()]).unwrap();

    let rc = lib.function("fclose").unwrap().invoke(&[file.into()]).unwrap();
    assert_eq!(rc, Value::Int(0));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "written natively");
}
