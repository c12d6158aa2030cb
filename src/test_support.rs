//! Shared end-to-end test harness. Grounded in `rsvm`'s own `src/test.rs`
//! role (a crate-private module other test modules pull fixtures from), but
//! built around a disposable on-disk classpath directory rather than an
//! in-memory `ClassProvider`, since [`crate::classfile::class_loader::ClassPath`]
//! only ever reads from the filesystem.
//!
//! Classes are assembled with [`crate::classfile::builder::ClassBuilder`]
//! and written to a temp directory; a [`Vm`] is then booted against that
//! directory as its classpath, exactly as [`crate::bin`] boots one against a
//! real one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::classfile::builder::{ClassBuilder, CodeSpec, ExceptionSpec, FieldSpec, MethodSpec};
use crate::vm::{Vm, VmConfig, VmError};

static COUNTER: AtomicU32 = AtomicU32::new(0);

const ACC_PUBLIC: u16 = 0x0001;
const ACC_STATIC: u16 = 0x0008;

/// A throwaway directory holding one or more `.class` files, usable directly
/// as a [`VmConfig`] classpath entry. Removed from disk on drop.
pub struct TestClasspath {
    dir: PathBuf,
}

impl TestClasspath {
    pub fn new() -> Self {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("tinyjvm-test-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create test classpath directory");
        TestClasspath { dir }
    }

    pub fn add_class(&self, internal_name: &str, bytes: Vec<u8>) {
        let path = self.dir.join(format!("{internal_name}.class"));
        std::fs::write(path, bytes).expect("write test class file");
    }

    pub fn classpath(&self) -> String {
        self.dir.to_string_lossy().into_owned()
    }
}

impl Drop for TestClasspath {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Writes the handful of `java.lang`/`java.io` classes the interpreter
/// assumes exist (superclass of every object, the built-in exceptions
/// `raise()` allocates, `String`'s backing layout, `Class` mirrors). Every
/// one of them is built with no declared methods — only direct VM-raised
/// exceptions and arithmetic are exercised by these tests, never a virtual
/// call into library code.
pub fn install_bootstrap_classes(cp: &TestClasspath) {
    cp.add_class("java/lang/Object", ClassBuilder::new("java/lang/Object", None).build());

    let mut throwable_builder = ClassBuilder::new("java/lang/Throwable", Some("java/lang/Object"));
    let message_name = throwable_builder.pool.utf8("detailMessage");
    let message_desc = throwable_builder.pool.utf8("Ljava/lang/String;");
    throwable_builder = throwable_builder.add_field(FieldSpec {
        access_flags: 0,
        name_index: message_name,
        descriptor_index: message_desc,
    });
    cp.add_class("java/lang/Throwable", throwable_builder.build());

    for name in [
        "java/lang/Exception",
        "java/lang/RuntimeException",
    ] {
        cp.add_class(name, ClassBuilder::new(name, Some("java/lang/Throwable")).build());
    }
    for name in [
        "java/lang/NullPointerException",
        "java/lang/ArithmeticException",
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/ClassCastException",
        "java/lang/NegativeArraySizeException",
        "java/lang/ExceptionInInitializerError",
        "java/lang/NoClassDefFoundError",
    ] {
        cp.add_class(name, ClassBuilder::new(name, Some("java/lang/RuntimeException")).build());
    }

    let mut string_builder = ClassBuilder::new("java/lang/String", Some("java/lang/Object"));
    let value_name = string_builder.pool.utf8("value");
    let value_desc = string_builder.pool.utf8("[C");
    string_builder = string_builder.add_field(FieldSpec {
        access_flags: 0,
        name_index: value_name,
        descriptor_index: value_desc,
    });
    cp.add_class("java/lang/String", string_builder.build());

    cp.add_class("java/lang/Class", ClassBuilder::new("java/lang/Class", Some("java/lang/Object")).build());
    cp.add_class("java/lang/System", ClassBuilder::new("java/lang/System", Some("java/lang/Object")).build());
}

/// Assembles `Main`, with one declared static field (`result I`) and a
/// static `main([Ljava/lang/String;)V` whose body is `code`. Test cases
/// compute into `result` and read it back from the class table after
/// `vm.start()` returns, rather than threading assertions through bytecode.
pub fn build_main_class(code: Vec<u8>, max_stack: u16, max_locals: u16, exception_table: Vec<ExceptionSpec>) -> Vec<u8> {
    let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
    let result_name = builder.pool.utf8("result");
    let result_desc = builder.pool.utf8("I");
    let main_name = builder.pool.utf8("main");
    let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");
    builder = builder
        .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: result_name, descriptor_index: result_desc })
        .add_method(MethodSpec {
            access_flags: ACC_PUBLIC | ACC_STATIC,
            name_index: main_name,
            descriptor_index: main_desc,
            code: Some(CodeSpec { max_stack, max_locals, bytes: code, exception_table }),
        });
    builder.build()
}

pub fn boot(cp: &TestClasspath) -> (Vm, VmConfig) {
    let config = VmConfig::new("Main").with_classpath(cp.classpath());
    let vm = Vm::new(&config);
    (vm, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::class::ClassStatus;

    fn harness() -> TestClasspath {
        let cp = TestClasspath::new();
        install_bootstrap_classes(&cp);
        cp
    }

    #[test]
    fn arithmetic_precedence_matches_java() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let result_name = builder.pool.utf8("result");
        let result_desc = builder.pool.utf8("I");
        let fieldref = builder.pool.fieldref("Main", "result", "I");
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");

        // 2 + 3 * 4 == 14
        let mut code = Vec::new();
        code.extend_from_slice(&[0x10, 2]); // bipush 2
        code.extend_from_slice(&[0x10, 3]); // bipush 3
        code.extend_from_slice(&[0x10, 4]); // bipush 4
        code.push(0x68); // imul
        code.push(0x60); // iadd
        code.push(0xb3); // putstatic
        code.extend_from_slice(&fieldref.to_be_bytes());
        code.push(0xb1); // return

        builder = builder
            .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: result_name, descriptor_index: result_desc })
            .add_method(MethodSpec {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name_index: main_name,
                descriptor_index: main_desc,
                code: Some(CodeSpec { max_stack: 3, max_locals: 1, bytes: code, exception_table: Vec::new() }),
            });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        vm.start(&config).expect("program runs to completion");
        let main_class = vm.classes.lookup_by_name("Main").unwrap();
        let result = vm.classes.with(main_class, |c| c.static_value(0));
        assert_eq!(result.as_int(), 14);
    }

    #[test]
    fn idiv_of_int_min_by_negative_one_wraps_instead_of_overflowing() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let result_name = builder.pool.utf8("result");
        let result_desc = builder.pool.utf8("I");
        let fieldref = builder.pool.fieldref("Main", "result", "I");
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");
        let min_index = builder.pool.integer(i32::MIN);

        let mut code = Vec::new();
        code.push(0x12); // ldc
        code.push(min_index as u8);
        code.extend_from_slice(&[0x10, 0xff]); // bipush -1
        code.push(0x6c); // idiv
        code.push(0xb3); // putstatic
        code.extend_from_slice(&fieldref.to_be_bytes());
        code.push(0xb1); // return

        builder = builder
            .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: result_name, descriptor_index: result_desc })
            .add_method(MethodSpec {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name_index: main_name,
                descriptor_index: main_desc,
                code: Some(CodeSpec { max_stack: 2, max_locals: 1, bytes: code, exception_table: Vec::new() }),
            });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        vm.start(&config).expect("program runs to completion");
        let main_class = vm.classes.lookup_by_name("Main").unwrap();
        let result = vm.classes.with(main_class, |c| c.static_value(0));
        assert_eq!(result.as_int(), i32::MIN);
    }

    #[test]
    fn exception_in_initializer_keeps_the_same_identity_on_repeated_use() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Bad", Some("java/lang/Object"));
        let clinit_name = builder.pool.utf8("<clinit>");
        let clinit_desc = builder.pool.utf8("()V");

        // <clinit>: 1 / 0, discard nothing (result stays on stack only long
        // enough to throw before `return` is ever reached).
        let mut code = Vec::new();
        code.extend_from_slice(&[0x10, 1]); // bipush 1
        code.extend_from_slice(&[0x10, 0]); // bipush 0
        code.push(0x6c); // idiv
        code.push(0x3c); // istore_1
        code.push(0xb1); // return

        builder = builder.add_method(MethodSpec {
            access_flags: ACC_STATIC,
            name_index: clinit_name,
            descriptor_index: clinit_desc,
            code: Some(CodeSpec { max_stack: 2, max_locals: 2, bytes: code, exception_table: Vec::new() }),
        });
        cp.add_class("Bad", builder.build());

        let (vm, _config) = boot(&cp);
        let bad = vm.load_class("Bad").unwrap();

        let first = match vm.ensure_initialized(bad) {
            Err(VmError::Uncaught(obj)) => obj,
            other => panic!("expected an uncaught ExceptionInInitializerError, got {other:?}"),
        };
        assert_eq!(vm.classes.with(bad, |c| c.status()), ClassStatus::Error);

        let second = match vm.ensure_initialized(bad) {
            Err(VmError::Uncaught(obj)) => obj,
            other => panic!("expected the same cached error on reuse, got {other:?}"),
        };
        assert_eq!(first, second);

        let error_class = vm.heap.class_of(first);
        assert_eq!(vm.classes.name_of(error_class), "java/lang/ExceptionInInitializerError");
    }

    #[test]
    fn array_store_out_of_bounds_is_caught_by_its_handler() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let caught_name = builder.pool.utf8("caught");
        let caught_desc = builder.pool.utf8("I");
        let caught_ref = builder.pool.fieldref("Main", "caught", "I");
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");
        let aioobe = builder.pool.class("java/lang/ArrayIndexOutOfBoundsException");

        // newarray int[2]; push index 5; push 0; iastore (throws);
        // handler: pop the thrown ref, putstatic caught=1; return.
        let mut code = Vec::new();
        code.extend_from_slice(&[0x10, 2]); // bipush 2, array length
        code.push(0xbc); // newarray
        code.push(10); // atype T_INT
        code.extend_from_slice(&[0x10, 5]); // bipush 5 (out of bounds)
        code.extend_from_slice(&[0x10, 0]); // bipush 0
        let try_start = code.len() as u16;
        code.push(0x4f); // iastore -- throws here
        let try_end = code.len() as u16;
        code.push(0xb1); // return (unreached on the happy path we don't take)
        let handler_pc = code.len() as u16;
        code.push(0x57); // pop (discard the caught throwable)
        code.extend_from_slice(&[0x10, 1]); // bipush 1
        code.push(0xb3); // putstatic
        code.extend_from_slice(&caught_ref.to_be_bytes());
        code.push(0xb1); // return

        builder = builder
            .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: caught_name, descriptor_index: caught_desc })
            .add_method(MethodSpec {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name_index: main_name,
                descriptor_index: main_desc,
                code: Some(CodeSpec {
                    max_stack: 3,
                    max_locals: 1,
                    bytes: code,
                    exception_table: vec![ExceptionSpec {
                        start_pc: try_start,
                        end_pc: try_end,
                        handler_pc,
                        catch_type: aioobe,
                    }],
                }),
            });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        vm.start(&config).expect("the handler catches the exception, so start() succeeds");
        let main_class = vm.classes.lookup_by_name("Main").unwrap();
        let caught = vm.classes.with(main_class, |c| c.static_value(0));
        assert_eq!(caught.as_int(), 1);
    }

    fn decode_java_string(vm: &Vm, string: crate::object::ObjectRef) -> String {
        use crate::memory::heap::HeapObject;
        use crate::object::array::PrimitiveArrayData;

        let value_ref = vm.heap.with(string, |obj| match obj {
            HeapObject::Instance { fields, .. } => fields[0].as_ref(),
            other => panic!("expected a String instance, got {other:?}"),
        });
        vm.heap.with(value_ref, |obj| match obj {
            HeapObject::PrimitiveArray { data: PrimitiveArrayData::Char(units), .. } => {
                String::from_utf16(units).unwrap()
            }
            other => panic!("expected a char[] backing array, got {other:?}"),
        })
    }

    #[test]
    fn array_store_out_of_bounds_carries_the_offending_index_as_its_message() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");

        // new int[3]; bipush 3 (out of bounds); bipush 0; iastore (throws).
        let mut code = Vec::new();
        code.extend_from_slice(&[0x10, 3]); // bipush 3, array length
        code.push(0xbc); // newarray
        code.push(10); // atype T_INT
        code.extend_from_slice(&[0x10, 3]); // bipush 3, index (out of bounds for length 3)
        code.extend_from_slice(&[0x10, 0]); // bipush 0
        code.push(0x4f); // iastore -- throws here
        code.push(0xb1); // return (unreached)

        builder = builder.add_method(MethodSpec {
            access_flags: ACC_PUBLIC | ACC_STATIC,
            name_index: main_name,
            descriptor_index: main_desc,
            code: Some(CodeSpec { max_stack: 3, max_locals: 0, bytes: code, exception_table: Vec::new() }),
        });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        let thrown = match vm.start(&config) {
            Err(VmError::Uncaught(obj)) => obj,
            other => panic!("expected an uncaught ArrayIndexOutOfBoundsException, got {other:?}"),
        };
        let error_class = vm.heap.class_of(thrown);
        assert_eq!(vm.classes.name_of(error_class), "java/lang/ArrayIndexOutOfBoundsException");

        let message_slot = vm.classes.with(error_class, |c| c.find_instance_field("detailMessage")).unwrap();
        let message = vm.heap.with(thrown, |obj| match obj {
            crate::memory::heap::HeapObject::Instance { fields, .. } => fields[message_slot as usize].as_ref(),
            other => panic!("expected a Throwable instance, got {other:?}"),
        });
        assert_eq!(decode_java_string(&vm, message), "3");
    }

    #[test]
    fn interning_the_same_text_twice_yields_the_same_object() {
        let cp = harness();
        cp.add_class("Main", build_main_class(vec![0xb1], 0, 0, Vec::new()));
        let (vm, _config) = boot(&cp);
        let a = vm.intern_string("hello").unwrap();
        let b = vm.intern_string("hello").unwrap();
        let c = vm.intern_string("world").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tableswitch_dispatches_to_the_matching_target_and_default() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let result_name = builder.pool.utf8("result");
        let result_desc = builder.pool.utf8("I");
        let fieldref = builder.pool.fieldref("Main", "result", "I");
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");

        // switch (1) { case 0: r=100; break; case 1: r=101; break;
        //              case 2: r=102; break; default: r=-1; }
        // pc 0: bipush 1
        // pc 2: tableswitch, aligned to the next multiple of 4 from pc 3
        let mut code = vec![0x10, 1]; // bipush 1
        code.push(0xaa); // tableswitch
        let pad = (4 - (code.len() % 4)) % 4;
        code.extend(std::iter::repeat(0u8).take(pad));
        let switch_pc = 2i32; // opcode byte's own pc
        // placeholders patched below once target offsets are known
        let default_offset_pos = code.len();
        code.extend_from_slice(&0i32.to_be_bytes()); // default offset
        code.extend_from_slice(&0i32.to_be_bytes()); // low = 0
        code.extend_from_slice(&2i32.to_be_bytes()); // high = 2
        let target_offsets_pos = code.len();
        code.extend_from_slice(&0i32.to_be_bytes()); // target for case 0
        code.extend_from_slice(&0i32.to_be_bytes()); // target for case 1
        code.extend_from_slice(&0i32.to_be_bytes()); // target for case 2

        fn store_case(builder: &mut Vec<u8>, fieldref: u16, value: i64) -> u16 {
            let start = builder.len() as u16;
            builder.push(0x10); // bipush
            builder.push(value as u8);
            builder.push(0xb3); // putstatic
            builder.extend_from_slice(&fieldref.to_be_bytes());
            builder.push(0xb1); // return
            start
        }

        let case0_pc = store_case(&mut code, fieldref, 100);
        let case1_pc = store_case(&mut code, fieldref, 101);
        let case2_pc = store_case(&mut code, fieldref, 102);
        let default_pc = code.len() as u16;
        code.push(0x10);
        code.push((-1i8) as u8);
        code.push(0xb3);
        code.extend_from_slice(&fieldref.to_be_bytes());
        code.push(0xb1);

        let patch_i32 = |code: &mut Vec<u8>, pos: usize, target_pc: u16| {
            let offset = target_pc as i32 - switch_pc;
            code[pos..pos + 4].copy_from_slice(&offset.to_be_bytes());
        };
        patch_i32(&mut code, default_offset_pos, default_pc);
        patch_i32(&mut code, target_offsets_pos, case0_pc);
        patch_i32(&mut code, target_offsets_pos + 4, case1_pc);
        patch_i32(&mut code, target_offsets_pos + 8, case2_pc);

        builder = builder
            .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: result_name, descriptor_index: result_desc })
            .add_method(MethodSpec {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name_index: main_name,
                descriptor_index: main_desc,
                code: Some(CodeSpec { max_stack: 2, max_locals: 1, bytes: code, exception_table: Vec::new() }),
            });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        vm.start(&config).expect("program runs to completion");
        let main_class = vm.classes.lookup_by_name("Main").unwrap();
        let result = vm.classes.with(main_class, |c| c.static_value(0));
        assert_eq!(result.as_int(), 101);
    }

    #[test]
    fn array_read_back_after_store_round_trips_the_value() {
        let cp = harness();
        let mut builder = ClassBuilder::new("Main", Some("java/lang/Object"));
        let result_name = builder.pool.utf8("result");
        let result_desc = builder.pool.utf8("I");
        let fieldref = builder.pool.fieldref("Main", "result", "I");
        let main_name = builder.pool.utf8("main");
        let main_desc = builder.pool.utf8("([Ljava/lang/String;)V");

        let mut code = Vec::new();
        code.extend_from_slice(&[0x10, 1]); // bipush 1, array length
        code.push(0xbc); // newarray
        code.push(10); // T_INT
        code.push(0x4c); // astore_1
        code.push(0x2b); // aload_1
        code.extend_from_slice(&[0x10, 0]); // bipush 0
        code.extend_from_slice(&[0x10, 42]); // bipush 42
        code.push(0x4f); // iastore
        code.push(0x2b); // aload_1
        code.extend_from_slice(&[0x10, 0]); // bipush 0
        code.push(0x2e); // iaload
        code.push(0xb3); // putstatic
        code.extend_from_slice(&fieldref.to_be_bytes());
        code.push(0xb1); // return

        builder = builder
            .add_field(FieldSpec { access_flags: ACC_STATIC, name_index: result_name, descriptor_index: result_desc })
            .add_method(MethodSpec {
                access_flags: ACC_PUBLIC | ACC_STATIC,
                name_index: main_name,
                descriptor_index: main_desc,
                code: Some(CodeSpec { max_stack: 4, max_locals: 2, bytes: code, exception_table: Vec::new() }),
            });
        cp.add_class("Main", builder.build());

        let (vm, config) = boot(&cp);
        vm.start(&config).expect("program runs to completion");
        let main_class = vm.classes.lookup_by_name("Main").unwrap();
        let result = vm.classes.with(main_class, |c| c.static_value(0));
        assert_eq!(result.as_int(), 42);
    }
}
