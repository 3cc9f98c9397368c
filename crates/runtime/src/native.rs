//! The native module ABI (spec.md §4.6).
//!
//! A native module is a shared library exporting one symbol named
//! `viainit_<name>` that returns a table of `(symbol, function)` pairs. The
//! teacher links its own native runtime statically at compile time and has
//! no dylib-loading dependency; `via` modules are discovered and loaded at
//! runtime (spec.md §4.5 step 4), so this crate pulls in `libloading` —
//! grounded on its use for the same purpose in the wider example pack
//! (`other_examples/manifests/rhizome-lab-moss`,
//! `other_examples/manifests/shuklaayush-rvr`) rather than on the teacher.

use crate::value::Value;
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::fmt;
use via_core::BuiltinKind;

/// Arguments delivered to a native host function, in push order (spec.md
/// §4.6: "arguments are delivered in `CallInfo.args` in push order").
pub struct CallInfo {
    pub args: Vec<Value>,
}

impl CallInfo {
    pub fn new(args: Vec<Value>) -> Self {
        CallInfo { args }
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// A native host function: `(VirtualMachine*, CallInfo&) -> ValueRef`
/// (spec.md §4.6). The VM handle is opaque here since a native function is
/// not expected to reach back into VM internals beyond what `CallInfo`
/// already exposes; host modules that need more take it through their own
/// init-time context instead.
pub type NativeFn = Box<dyn Fn(&mut CallInfo) -> Result<Value, String>>;

/// One exported definition: the name as it will be interned into the
/// shared symbol table, the declared signature (spec.md §3 `Def*` carries
/// "an ordered parameter list... and a return type" for every def, native
/// or source), and the callback it resolves to. Declaring `params`/
/// `return_ty` here is what lets `via_compiler::module::ModuleAccessContext`
/// type a static-access expression like `io::print`; the native ABI itself
/// never checks an argument's type against them (spec.md §4.6: the host
/// function validates its own arguments dynamically).
pub struct NativeDef {
    pub name: String,
    pub arity: u16,
    pub params: Vec<BuiltinKind>,
    pub return_ty: BuiltinKind,
    pub func: NativeFn,
}

impl fmt::Debug for NativeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("params", &self.params)
            .field("return_ty", &self.return_ty)
            .finish_non_exhaustive()
    }
}

/// What `viainit_<name>` returns: the full list of definitions a native
/// module exports (spec.md §4.6 `NativeModuleInfo { size, begin:
/// DefTableEntry[] }`, flattened into an owned `Vec` on this side of the
/// boundary).
#[derive(Debug)]
pub struct NativeModuleInfo {
    pub defs: Vec<NativeDef>,
}

/// The `viainit_<name>(ctx) -> *mut NativeModuleInfo` entry point every
/// native module must export. `ctx` is an opaque pointer supplied by the
/// loader (the module manager passes itself, cast to `*mut c_void`, so a
/// native module can register further imports if it needs to).
type InitFn = unsafe extern "C" fn(*mut c_void) -> *mut NativeModuleInfo;

/// An opened native module: keeps the `Library` alive for as long as any
/// `NativeFn` obtained from it might be called, since dropping the library
/// invalidates every function pointer it handed out.
pub struct NativeModule {
    _library: Library,
    pub info: NativeModuleInfo,
}

#[derive(Debug)]
pub enum LoadError {
    Open(String),
    MissingEntryPoint(String),
    NullInfo,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Open(msg) => write!(f, "failed to open native module: {msg}"),
            LoadError::MissingEntryPoint(sym) => {
                write!(f, "missing native entry point '{sym}'")
            }
            LoadError::NullInfo => write!(f, "native module init returned a null pointer"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Opens `path` as a shared library, locates `viainit_<name>`, and calls it
/// with `ctx`. Matches spec.md §4.5 step 4's "load_native_object"
/// dispatch.
///
/// # Safety
/// `ctx` must be a valid pointer for as long as the returned module's
/// functions may be called, and the library at `path` must actually
/// implement the `viainit_<name>` contract; a module that lies about its
/// signature is undefined behavior, as with any FFI boundary.
pub unsafe fn load_native_object(
    path: &std::path::Path,
    name: &str,
    ctx: *mut c_void,
) -> Result<NativeModule, LoadError> {
    let library =
        unsafe { Library::new(path) }.map_err(|e| LoadError::Open(e.to_string()))?;
    let symbol_name = format!("viainit_{name}");
    let init: Symbol<InitFn> = unsafe { library.get(symbol_name.as_bytes()) }
        .map_err(|_| LoadError::MissingEntryPoint(symbol_name))?;
    let info_ptr = unsafe { init(ctx) };
    if info_ptr.is_null() {
        return Err(LoadError::NullInfo);
    }
    let info = *unsafe { Box::from_raw(info_ptr) };
    Ok(NativeModule { _library: library, info })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_info_indexes_args_in_push_order() {
        let info = CallInfo::new(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(info.arg(0), Some(&Value::Int(1)));
        assert_eq!(info.arg(1), Some(&Value::Int(2)));
        assert_eq!(info.arg(2), None);
    }

    #[test]
    fn load_error_messages_name_the_missing_symbol() {
        let err = LoadError::MissingEntryPoint("viainit_io".to_string());
        assert_eq!(err.to_string(), "missing native entry point 'viainit_io'");
    }
}
