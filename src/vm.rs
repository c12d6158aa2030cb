//! The VM root: owns every per-run arena (heap, class table, symbol table,
//! string interner), the bootstrap class loader, and the native registry.
//! Grounded in `rsvm::vm::{VM, VMConfig}` for the overall shape, dropping
//! the fields that only make sense for `rsvm`'s host-embedding concerns
//! (`rsvm_home`, `boot_lib_path`, `stack_size`) since this core has no
//! dynamic native-library loading and runs its single call stack directly
//! on the calling thread rather than a dedicated worker thread.

use std::cell::RefCell;
use std::fmt;

use crate::classfile::class_loader::BootstrapClassLoader;
use crate::classfile::ClassFileError;
use crate::native::builtin_natives::BuiltinNativeFunctions;
use crate::native::NativeRegistry;
use crate::object::class::{ClassRef, ClassStatus};
use crate::object::class::ClassTable;
use crate::object::symbol::SymbolTable;
use crate::object::string::StringInterner;
use crate::object::ObjectRef;
use crate::memory::heap::Heap;

/// Classpath and entry point, mirroring `rsvm::vm::VMConfig`'s builder
/// style but limited to the two settings this core actually consumes.
#[derive(Debug, Clone)]
pub struct VmConfig {
    classpath: String,
    main_class: String,
}

impl VmConfig {
    pub fn new(main_class: impl Into<String>) -> Self {
        VmConfig { classpath: String::from("."), main_class: main_class.into() }
    }

    pub fn with_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath = classpath.into();
        self
    }

    pub fn classpath(&self) -> &str {
        &self.classpath
    }

    pub fn main_class(&self) -> &str {
        &self.main_class
    }
}

/// VM-internal failures (propagate to the entry point, exit code 2) plus
/// the one variant that carries an escaped Java exception (exit code 1).
/// Matches `rsvm`'s `VMError`: a plain `Debug`-deriving enum, no
/// `thiserror`.
#[derive(Debug)]
pub enum VmError {
    ClassFile(ClassFileError),
    ClassNotFound(String),
    UnsatisfiedLinkError(String),
    UnsupportedOperation(&'static str),
    OutOfMemory,
    /// An uncaught `Throwable` that propagated out of every frame on the
    /// call stack.
    Uncaught(ObjectRef),
}

impl VmError {
    /// The process exit code this failure maps to, per the VM entry
    /// contract: 0 is reserved for clean termination and is never produced
    /// here.
    pub fn exit_code(&self) -> i32 {
        match self {
            VmError::Uncaught(_) => 1,
            _ => 2,
        }
    }
}

impl From<ClassFileError> for VmError {
    fn from(err: ClassFileError) -> Self {
        VmError::ClassFile(err)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::ClassFile(err) => write!(f, "class file error: {err}"),
            VmError::ClassNotFound(name) => write!(f, "class not found: {name}"),
            VmError::UnsatisfiedLinkError(desc) => write!(f, "unsatisfied link error: {desc}"),
            VmError::UnsupportedOperation(op) => write!(f, "unsupported operation: {op}"),
            VmError::OutOfMemory => write!(f, "out of memory"),
            VmError::Uncaught(_) => write!(f, "uncaught exception"),
        }
    }
}

impl std::error::Error for VmError {}

pub struct Vm {
    pub heap: Heap,
    pub classes: ClassTable,
    pub symbols: RefCell<SymbolTable>,
    pub strings: RefCell<StringInterner>,
    pub loader: BootstrapClassLoader,
    pub natives: Box<dyn NativeRegistry>,
}

impl Vm {
    pub fn new(config: &VmConfig) -> Self {
        Vm {
            heap: Heap::new(),
            classes: ClassTable::new(),
            symbols: RefCell::new(SymbolTable::new()),
            strings: RefCell::new(StringInterner::new()),
            loader: BootstrapClassLoader::new(config.classpath()),
            natives: Box::new(BuiltinNativeFunctions::new()),
        }
    }

    /// Loads (but does not link) a class by internal name.
    pub fn load_class(&self, internal_name: &str) -> Result<ClassRef, VmError> {
        self.loader.load_class(self, internal_name)
    }

    /// Drives a class through Link and Initialize if it hasn't already
    /// reached `Initialized` or `Error`. Superclasses and superinterfaces
    /// are initialized first, per JVMS §5.5.
    pub fn ensure_initialized(&self, class: ClassRef) -> Result<(), VmError> {
        let status = self.classes.with(class, |c| c.status());
        match status {
            ClassStatus::Initialized => return Ok(()),
            ClassStatus::Initializing => return Ok(()),
            ClassStatus::Error => {
                let err = self.classes.with(class, |c| c.init_error()).unwrap_or(ObjectRef::NULL);
                return Err(VmError::Uncaught(err));
            }
            ClassStatus::Loaded => self.loader.link(self, class)?,
            ClassStatus::Linked => {}
        }
        self.classes.with(class, |c| c.set_status(ClassStatus::Initializing));

        if let Some(super_class) = self.classes.with(class, |c| c.super_class) {
            self.ensure_initialized(super_class)?;
        }

        let clinit = self.classes.with(class, |c| c.find_declared_method("<clinit>", "()V"));
        if let Some(method_index) = clinit {
            if let Err(err) = crate::runtime::interpreter::Interpreter::run_clinit(self, class, method_index) {
                let throwable = self.wrap_as_exception_in_initializer(&err);
                self.classes.with(class, |c| c.set_init_error(throwable));
                return Err(VmError::Uncaught(throwable));
            }
        }
        self.classes.with(class, |c| c.set_status(ClassStatus::Initialized));
        Ok(())
    }

    /// Interns a string, loading `java/lang/String` and `[C` on first use.
    pub fn intern_string(&self, text: &str) -> Result<ObjectRef, VmError> {
        let string_class = self.load_class("java/lang/String")?;
        let char_array_class = self.load_class("[C")?;
        Ok(self.strings.borrow_mut().intern(text, &self.heap, string_class, char_array_class))
    }

    /// Builds the persistent linkage-error throwable stored on a Class
    /// whose constant-pool resolution failed. Best effort: if the error
    /// class itself can't be loaded (a minimal bootstrap classpath may not
    /// carry it), the failure degrades to a null throwable rather than
    /// recursing into another linkage failure.
    pub fn make_linkage_error(&self, _cause: &VmError) -> ObjectRef {
        self.allocate_bare_throwable("java/lang/NoClassDefFoundError")
    }

    /// Wraps an exception escaping `<clinit>` as `ExceptionInInitializerError`,
    /// unless it already is one (JVMS §5.5 only wraps once).
    fn wrap_as_exception_in_initializer(&self, err: &VmError) -> ObjectRef {
        match err {
            VmError::Uncaught(throwable) => {
                let class = self.heap.class_of(*throwable);
                let name = self.classes.name_of(class);
                if name == "java/lang/ExceptionInInitializerError" {
                    *throwable
                } else {
                    self.allocate_bare_throwable("java/lang/ExceptionInInitializerError")
                }
            }
            _ => self.allocate_bare_throwable("java/lang/ExceptionInInitializerError"),
        }
    }

    fn allocate_bare_throwable(&self, internal_name: &str) -> ObjectRef {
        match self.load_class(internal_name) {
            Ok(class) => {
                let field_count = self.classes.with(class, |c| c.instance_fields.len());
                self.heap.alloc(crate::memory::heap::HeapObject::Instance {
                    class,
                    fields: vec![crate::value::JValue::zero(); field_count],
                })
            }
            Err(_) => ObjectRef::NULL,
        }
    }

    /// Allocates (or returns the cached) `java/lang/Class` mirror for a
    /// runtime class. Repeated calls for the same `Class` return the same
    /// identity.
    pub fn class_mirror(&self, class: ClassRef) -> Result<ObjectRef, VmError> {
        if let Some(existing) = self.classes.with(class, |c| c.mirror()) {
            return Ok(existing);
        }
        let mirror_class = self.load_class("java/lang/Class")?;
        let field_count = self.classes.with(mirror_class, |c| c.instance_fields.len());
        let mirror = self.heap.alloc(crate::memory::heap::HeapObject::Instance {
            class: mirror_class,
            fields: vec![crate::value::JValue::zero(); field_count],
        });
        self.classes.with(class, |c| c.set_mirror(mirror));
        Ok(mirror)
    }

    /// Runs the primary VM entry: load and initialize `java/lang/System`,
    /// then the main class, build an empty `String[]` argument array, and
    /// invoke `main([Ljava/lang/String;)V`.
    pub fn start(&self, config: &VmConfig) -> Result<(), VmError> {
        let system_class = self.load_class("java/lang/System")?;
        self.ensure_initialized(system_class)?;

        let main_class = self.load_class(config.main_class())?;
        self.ensure_initialized(main_class)?;

        let method_index = self
            .classes
            .with(main_class, |c| c.find_declared_method("main", "([Ljava/lang/String;)V"))
            .ok_or_else(|| VmError::ClassNotFound(format!("{}.main([Ljava/lang/String;)V", config.main_class())))?;

        let string_array_class = self.load_class("[Ljava/lang/String;")?;
        let args = self.heap.alloc(crate::memory::heap::HeapObject::ObjectArray {
            class: string_array_class,
            elements: Vec::new(),
        });

        crate::runtime::interpreter::Interpreter::run_main(self, main_class, method_index, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_uncaught_to_one_and_everything_else_to_two() {
        assert_eq!(VmError::Uncaught(ObjectRef::NULL).exit_code(), 1);
        assert_eq!(VmError::ClassNotFound("x".to_string()).exit_code(), 2);
        assert_eq!(VmError::OutOfMemory.exit_code(), 2);
    }

    #[test]
    fn config_defaults_classpath_to_current_directory() {
        let config = VmConfig::new("Main");
        assert_eq!(config.classpath(), ".");
        assert_eq!(config.main_class(), "Main");
    }
}
