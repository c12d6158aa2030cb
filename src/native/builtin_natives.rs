//! The bootstrap native methods: the handful of `java.lang`/`java.io`
//! methods a running program can't get off the ground without, since this
//! core has no JNI bridge to load a real `libjava` from. Grounded in
//! `rsvm::native::jni::register_builtin_natives`'s role (a fixed table of
//! `(class, method) -> fn` built at VM startup), trimmed to the methods this
//! core's bootstrap classes actually call.

use crate::memory::heap::HeapObject;
use crate::native::{NativeFn, NativeRegistry};
use crate::runtime::interpreter::Interpreter;
use crate::value::JValue;
use crate::vm::VmError;

pub struct BuiltinNativeFunctions;

impl BuiltinNativeFunctions {
    pub fn new() -> Self {
        BuiltinNativeFunctions
    }
}

impl Default for BuiltinNativeFunctions {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRegistry for BuiltinNativeFunctions {
    fn lookup(&self, class_name: &str, method_name: &str) -> Option<NativeFn> {
        match (class_name, method_name) {
            ("java/lang/Object", "hashCode") => Some(object_hash_code as NativeFn),
            ("java/lang/Object", "getClass") => Some(object_get_class as NativeFn),
            ("java/lang/Class", "getName") => Some(class_get_name as NativeFn),
            ("java/lang/Float", "floatToIntBits") => Some(float_to_int_bits as NativeFn),
            ("java/lang/Float", "intBitsToFloat") => Some(int_bits_to_float as NativeFn),
            ("java/lang/Double", "doubleToLongBits") => Some(double_to_long_bits as NativeFn),
            ("java/lang/Double", "longBitsToDouble") => Some(long_bits_to_double as NativeFn),
            ("java/lang/System", "arraycopy") => Some(system_arraycopy as NativeFn),
            ("java/lang/System", "identityHashCode") => Some(system_identity_hash_code as NativeFn),
            ("java/lang/Throwable", "fillInStackTrace") => Some(throwable_fill_in_stack_trace as NativeFn),
            _ => None,
        }
    }
}

fn object_hash_code(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let receiver = args[0].as_ref();
    Ok(JValue::from_int(receiver.to_raw() as i32))
}

fn object_get_class(interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let receiver = args[0].as_ref();
    let class = interp.vm().heap.class_of(receiver);
    let mirror = interp.vm().class_mirror(class)?;
    Ok(JValue::from_ref(mirror))
}

fn class_get_name(interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let mirror = args[0].as_ref();
    let vm = interp.vm();
    let represented = vm
        .classes
        .find_by_mirror(mirror)
        .expect("a Class mirror is only ever allocated for a loaded class");
    let binary_name = vm.classes.name_of(represented).replace('/', ".");
    Ok(JValue::from_ref(vm.intern_string(&binary_name)?))
}

fn float_to_int_bits(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let bits = args[0].as_float().to_bits() as i32;
    Ok(JValue::from_int(bits))
}

fn int_bits_to_float(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let value = f32::from_bits(args[0].as_int() as u32);
    Ok(JValue::from_float(value))
}

fn double_to_long_bits(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let bits = args[0].as_double().to_bits() as i64;
    Ok(JValue::from_long(bits))
}

fn long_bits_to_double(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let value = f64::from_bits(args[0].as_long() as u64);
    Ok(JValue::from_double(value))
}

fn system_identity_hash_code(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let receiver = args[0].as_ref();
    Ok(JValue::from_int(receiver.to_raw() as i32))
}

/// `arraycopy(src, srcPos, dst, dstPos, length)`, static, 5 params.
fn system_arraycopy(interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    let src = args[0].as_ref();
    let src_pos = args[1].as_int();
    let dst = args[2].as_ref();
    let dst_pos = args[3].as_int();
    let length = args[4].as_int();
    if src.is_null() || dst.is_null() {
        return Err(npe(interp));
    }
    let heap = &interp.vm().heap;
    for i in 0..length {
        let value = heap.with(src, |obj| read_array_slot(obj, src_pos + i));
        heap.with_mut(dst, |obj| write_array_slot(obj, dst_pos + i, value));
    }
    Ok(JValue::zero())
}

fn read_array_slot(obj: &HeapObject, index: i32) -> JValue {
    match obj {
        HeapObject::PrimitiveArray { data, .. } => data.get(index).unwrap_or_else(|_| JValue::zero()),
        HeapObject::ObjectArray { elements, .. } => JValue::from_ref(elements[index as usize]),
        HeapObject::Instance { .. } => panic!("arraycopy source is not an array"),
    }
}

fn write_array_slot(obj: &mut HeapObject, index: i32, value: JValue) {
    match obj {
        HeapObject::PrimitiveArray { data, .. } => {
            let _ = data.set(index, value);
        }
        HeapObject::ObjectArray { elements, .. } => elements[index as usize] = value.as_ref(),
        HeapObject::Instance { .. } => panic!("arraycopy destination is not an array"),
    }
}

fn throwable_fill_in_stack_trace(_interp: &mut Interpreter, args: &[JValue]) -> Result<JValue, VmError> {
    // Stack traces aren't modeled; this just returns the receiver, matching
    // the real method's `Throwable fillInStackTrace()` signature.
    Ok(args[0])
}

fn npe(interp: &mut Interpreter) -> VmError {
    match interp.vm().load_class("java/lang/NullPointerException") {
        Ok(class) => {
            let vm = interp.vm();
            let field_count = vm.classes.with(class, |c| c.instance_fields.len());
            let obj = vm.heap.alloc(HeapObject::Instance { class, fields: vec![JValue::zero(); field_count] });
            VmError::Uncaught(obj)
        }
        Err(err) => err,
    }
}
