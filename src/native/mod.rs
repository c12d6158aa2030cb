//! The native-method registry: the hook the interpreter calls through
//! whenever a method's `ACC_NATIVE` flag is set, in place of interpreting
//! a `Code` attribute it doesn't have. Grounded in `rsvm::native::jni`'s
//! role (a name → function lookup consulted by `invoke*`), simplified to a
//! plain Rust `fn` pointer since this core has no actual JNI boundary to
//! cross.

pub mod builtin_natives;

use crate::runtime::interpreter::Interpreter;
use crate::value::JValue;
use crate::vm::VmError;

/// A native method implementation: takes the interpreter (for heap/class
/// access) and the method's argument slots (receiver first, if any), and
/// returns its single 64-bit result (`JValue::zero()` for `void`).
pub type NativeFn = fn(&mut Interpreter, &[JValue]) -> Result<JValue, VmError>;

/// A source of native implementations, looked up by the method's owning
/// class and name (descriptor is not part of the key: this core does not
/// support native overloading by descriptor, which real JNI name-mangling
/// would require).
pub trait NativeRegistry {
    fn lookup(&self, class_name: &str, method_name: &str) -> Option<NativeFn>;
}
