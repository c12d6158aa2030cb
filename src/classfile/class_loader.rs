//! The class loader / linker. Grounded in
//! `rsvm::classfile::class_loader::BootstrapClassLoader` for the classpath
//! model (a list of directory/JAR entries, each able to hand back raw
//! `.class` bytes by internal name) and the name→Class map role, but built
//! against this core's `ClassTable`/`Vm` instead of `rsvm`'s hash-table +
//! raw-pointer `JClassPtr` map.

use std::cell::RefCell;
use std::fs::File;
use std::io::Read as _;

use zip::ZipArchive;

use super::constant_pool::Resolution;
use super::descriptor::{parse_field_descriptor, parse_method_descriptor, FieldType};
use super::instruction::PrimitiveArrayType;
use super::parser::{self, ClassFile, RawFieldInfo, RawMethodInfo};
use crate::object::class::{Class, ClassKind, ClassRef, ClassStatus};
use crate::object::field::{ConstantValue, FieldInfo};
use crate::object::method::Method;
use crate::value::JValue;
use crate::vm::{Vm, VmError};

const CLASS_SUFFIX: &str = ".class";

/// A source of raw class bytes keyed by internal name (`java/lang/Object`,
/// never `java.lang.Object`). Implementations must return identical bytes
/// for identical names across the VM's lifetime.
pub trait ClassProvider {
    fn read_class(&self, internal_name: &str) -> Option<Vec<u8>>;
}

/// A directory on disk, searched as `<dir>/<internal_name>.class`.
pub struct DirClassPathEntry {
    dir: String,
}

impl DirClassPathEntry {
    pub fn new(dir: &str) -> Self {
        let dir = dir.trim_end_matches('/').to_string();
        DirClassPathEntry { dir }
    }
}

impl ClassProvider for DirClassPathEntry {
    fn read_class(&self, internal_name: &str) -> Option<Vec<u8>> {
        let path = format!("{}/{}{}", self.dir, internal_name, CLASS_SUFFIX);
        std::fs::read(path).ok()
    }
}

/// A JAR file, searched by zip entry name. `ZipArchive::by_name` takes
/// `&mut self`, so the archive sits behind a `RefCell` to keep
/// [`ClassProvider::read_class`]'s `&self` receiver.
pub struct JarClassPathEntry {
    archive: RefCell<ZipArchive<File>>,
}

impl JarClassPathEntry {
    pub fn open(path: &str) -> Option<Self> {
        let file = File::open(path).ok()?;
        let archive = ZipArchive::new(file).ok()?;
        Some(JarClassPathEntry { archive: RefCell::new(archive) })
    }
}

impl ClassProvider for JarClassPathEntry {
    fn read_class(&self, internal_name: &str) -> Option<Vec<u8>> {
        let entry_name = format!("{internal_name}{CLASS_SUFFIX}");
        let mut archive = self.archive.borrow_mut();
        let mut entry = archive.by_name(&entry_name).ok()?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).ok()?;
        Some(buf)
    }
}

/// The ordered list of classpath entries built from a colon-delimited
/// classpath string — directories, `.jar` files, or a `dir/*` glob that
/// expands to every `.jar` directly inside `dir`.
pub struct ClassPath {
    entries: Vec<Box<dyn ClassProvider>>,
}

impl ClassPath {
    pub fn parse(classpath: &str) -> Self {
        let mut entries: Vec<Box<dyn ClassProvider>> = Vec::new();
        for raw_entry in classpath.split(':').filter(|s| !s.is_empty()) {
            if let Some(dir) = raw_entry.strip_suffix("/*") {
                let Ok(read_dir) = std::fs::read_dir(dir) else { continue };
                for entry in read_dir.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("jar") {
                        if let Some(jar) = JarClassPathEntry::open(&path.to_string_lossy()) {
                            entries.push(Box::new(jar));
                        }
                    }
                }
            } else if raw_entry.ends_with(".jar") {
                if let Some(jar) = JarClassPathEntry::open(raw_entry) {
                    entries.push(Box::new(jar));
                }
            } else {
                entries.push(Box::new(DirClassPathEntry::new(raw_entry)));
            }
        }
        ClassPath { entries }
    }
}

impl ClassProvider for ClassPath {
    fn read_class(&self, internal_name: &str) -> Option<Vec<u8>> {
        self.entries.iter().find_map(|entry| entry.read_class(internal_name))
    }
}

/// Drives the load/link/initialize state machine described for each
/// runtime `Class`. Holds only the classpath; the name→Class map itself
/// lives on [`Vm`] (`vm.classes`), since that map is shared VM root state,
/// not loader-private state.
pub struct BootstrapClassLoader {
    provider: ClassPath,
}

impl BootstrapClassLoader {
    pub fn new(classpath: &str) -> Self {
        BootstrapClassLoader { provider: ClassPath::parse(classpath) }
    }

    /// Returns the already-loaded class, or loads it: for an array
    /// descriptor, recursively constructs the element class and wraps it;
    /// otherwise reads bytes from the classpath, decodes them, and defines
    /// a Plain class. Loading never links or initializes.
    pub fn load_class(&self, vm: &Vm, internal_name: &str) -> Result<ClassRef, VmError> {
        if let Some(existing) = vm.classes.lookup_by_name(internal_name) {
            return Ok(existing);
        }
        if let Some(elem) = internal_name.strip_prefix('[') {
            return self.load_array_class(vm, elem);
        }
        let bytes = self
            .provider
            .read_class(internal_name)
            .ok_or_else(|| VmError::ClassNotFound(internal_name.to_string()))?;
        let class_file = parser::parse_class(&bytes)?;
        self.define_plain_class(vm, class_file)
    }

    fn load_array_class(&self, vm: &Vm, elem_descriptor: &str) -> Result<ClassRef, VmError> {
        let object_class = self.load_class(vm, "java/lang/Object")?;
        let full_name = format!("[{elem_descriptor}");
        if let Some(existing) = vm.classes.lookup_by_name(&full_name) {
            return Ok(existing);
        }
        let kind = match elem_descriptor.as_bytes()[0] {
            b'Z' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Boolean },
            b'B' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Byte },
            b'C' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Char },
            b'S' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Short },
            b'I' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Int },
            b'J' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Long },
            b'F' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Float },
            b'D' => ClassKind::PrimitiveArray { element: PrimitiveArrayType::Double },
            b'L' => {
                let inner = &elem_descriptor[1..elem_descriptor.len() - 1];
                let element = self.load_class(vm, inner)?;
                ClassKind::ObjectArray { element }
            }
            b'[' => {
                let element = self.load_array_class(vm, &elem_descriptor[1..])?;
                ClassKind::ObjectArray { element }
            }
            other => {
                return Err(VmError::ClassFile(super::ClassFileError::BadDescriptor(format!(
                    "unrecognized array element descriptor byte {other:#x}"
                ))))
            }
        };
        let class = Class::new(
            full_name,
            crate::object::class::ClassAccessFlags::Public as u16,
            kind,
            Some(object_class),
            Vec::new(),
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        class.set_status(ClassStatus::Linked);
        Ok(vm.classes.define(class))
    }

    fn define_plain_class(&self, vm: &Vm, class_file: ClassFile) -> Result<ClassRef, VmError> {
        let name = class_file.this_class_name()?.to_string();
        // Reserve the slot before resolving the superclass/interfaces so a
        // self-referential constant-pool entry finds itself already mapped,
        // breaking cycles in the symbol graph.
        let placeholder = vm.classes.define(Class::new(
            name.clone(),
            class_file.access_flags,
            ClassKind::Plain,
            None,
            Vec::new(),
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ));

        let super_class = match class_file.super_class_name()? {
            Some(super_name) => Some(self.load_class(vm, super_name)?),
            None => None,
        };
        let mut interfaces = Vec::with_capacity(class_file.interfaces.len());
        for &iface_index in &class_file.interfaces {
            let iface_name = class_file.constant_pool.get_class_name(iface_index)?;
            interfaces.push(self.load_class(vm, iface_name)?);
        }

        let mut instance_fields = match super_class {
            Some(sup) => vm.classes.with(sup, |c| c.instance_fields.clone()),
            None => Vec::new(),
        };
        let mut static_fields = Vec::new();
        for raw in &class_file.fields {
            let field = build_field(&class_file, raw, placeholder)?;
            if field.is_static() {
                let mut f = field;
                f.slot = static_fields.len() as u16;
                static_fields.push(f);
            } else {
                let mut f = field;
                f.slot = instance_fields.len() as u16;
                instance_fields.push(f);
            }
        }

        let mut methods = Vec::with_capacity(class_file.methods.len());
        for raw in &class_file.methods {
            methods.push(build_method(&class_file, raw, placeholder)?);
        }

        let rebuilt = Class::with_switches(
            name,
            class_file.access_flags,
            ClassKind::Plain,
            super_class,
            interfaces,
            Some(class_file.constant_pool),
            instance_fields,
            static_fields,
            methods,
            class_file.table_switches,
            class_file.lookup_switches,
        );
        vm.classes.replace(placeholder, rebuilt);
        prepare_static_values(vm, placeholder)?;
        Ok(placeholder)
    }

    /// Resolution step of linking: walks every `Class`/String entry in
    /// `class`'s constant pool and caches the resolved target. Preparation
    /// (static field zero-init plus `ConstantValue`) already happened in
    /// [`prepare_static_values`] right after the class was defined, so
    /// linking here is resolution only.
    ///
    /// Resolution requests are collected from the constant pool in one pass
    /// (under a single shared borrow), then carried out one at a time with
    /// no borrow of `vm.classes` held — resolving a `Class` entry recurses
    /// into [`Self::load_class`], which calls `vm.classes.define`, and that
    /// would deadlock the table's `RefCell` if done from inside a borrow.
    pub fn link(&self, vm: &Vm, class: ClassRef) -> Result<(), VmError> {
        let status = vm.classes.with(class, |c| c.status());
        if status != ClassStatus::Loaded {
            return Ok(());
        }
        let pending = vm.classes.with(class, |c| {
            let cp = c.constant_pool.as_ref().expect("plain class always has a constant pool");
            collect_resolvable(cp)
        });
        for (index, request) in pending {
            let resolved = match request {
                ResolveRequest::ClassName(name) => {
                    self.load_class(vm, &name).map(Resolution::Class)
                }
                ResolveRequest::StringLiteral(text) => {
                    vm.intern_string(&text).map(Resolution::Str)
                }
            };
            match resolved {
                Ok(resolution) => {
                    vm.classes.with(class, |c| {
                        c.constant_pool.as_ref().unwrap().set_resolution(index, resolution)
                    });
                }
                Err(err) => {
                    let throwable = vm.make_linkage_error(&err);
                    vm.classes.with(class, |c| c.set_init_error(throwable));
                    return Err(err);
                }
            }
        }
        vm.classes.with(class, |c| c.set_status(ClassStatus::Linked));
        Ok(())
    }
}

/// Preparation (JVMS §5.5 step 7): every static field with a
/// `ConstantValue` attribute is set to its literal before any class ever
/// observes it via `getstatic`, ahead of `<clinit>` even running. Fields
/// without a `ConstantValue` keep the zero/null `Class::with_switches`
/// already gave their slot.
fn prepare_static_values(vm: &Vm, class: ClassRef) -> Result<(), VmError> {
    let constants: Vec<(u16, ConstantValue)> = vm.classes.with(class, |c| {
        c.static_fields
            .iter()
            .filter_map(|f| f.constant_value.clone().map(|cv| (f.slot, cv)))
            .collect()
    });
    for (slot, constant) in constants {
        let value = match constant {
            ConstantValue::Int(v) => JValue::from_int(v),
            ConstantValue::Long(v) => JValue::from_long(v),
            ConstantValue::Float(v) => JValue::from_float(v),
            ConstantValue::Double(v) => JValue::from_double(v),
            ConstantValue::String(text) => JValue::from_ref(vm.intern_string(&text)?),
        };
        vm.classes.with(class, |c| c.set_static_value(slot, value));
    }
    Ok(())
}

enum ResolveRequest {
    ClassName(String),
    StringLiteral(String),
}

fn collect_resolvable(cp: &super::constant_pool::ConstantPool) -> Vec<(u16, ResolveRequest)> {
    let mut pending = Vec::new();
    for raw_index in 1..cp.size() as u16 {
        let entry = match cp.get_any(raw_index) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let request = match entry {
            super::constant_pool::CpEntry::Class { .. } => {
                match cp.get_class_name(raw_index) {
                    Ok(name) => Some(ResolveRequest::ClassName(name.to_string())),
                    Err(_) => None,
                }
            }
            super::constant_pool::CpEntry::String { string_index } => {
                match cp.get_utf8(*string_index) {
                    Ok(text) => Some(ResolveRequest::StringLiteral(text.to_string())),
                    Err(_) => None,
                }
            }
            _ => None,
        };
        if let Some(request) = request {
            pending.push((raw_index, request));
        }
    }
    pending
}

fn build_field(
    class_file: &ClassFile,
    raw: &RawFieldInfo,
    declaring_class: ClassRef,
) -> Result<FieldInfo, VmError> {
    let name = class_file.constant_pool.get_utf8(raw.name_index)?.to_string();
    let descriptor_str = class_file.constant_pool.get_utf8(raw.descriptor_index)?;
    let descriptor = parse_field_descriptor(descriptor_str)?;
    let constant_value = match raw.constant_value_index {
        None => None,
        Some(index) => Some(build_constant_value(class_file, &descriptor, index)?),
    };
    Ok(FieldInfo {
        name,
        descriptor,
        access_flags: raw.access_flags,
        declaring_class,
        slot: 0,
        constant_value,
    })
}

fn build_constant_value(
    class_file: &ClassFile,
    descriptor: &FieldType,
    index: u16,
) -> Result<ConstantValue, VmError> {
    let cp = &class_file.constant_pool;
    Ok(match descriptor {
        FieldType::Long => ConstantValue::Long(cp.get_long(index)?),
        FieldType::Double => ConstantValue::Double(cp.get_double(index)?),
        FieldType::Float => ConstantValue::Float(cp.get_float(index)?),
        FieldType::Reference(name) if name == "java/lang/String" => {
            ConstantValue::String(cp.get_utf8(cp.get_string_index(index)?)?.to_string())
        }
        _ => ConstantValue::Int(cp.get_integer(index)?),
    })
}

fn build_method(
    class_file: &ClassFile,
    raw: &RawMethodInfo,
    declaring_class: ClassRef,
) -> Result<Method, VmError> {
    let name = class_file.constant_pool.get_utf8(raw.name_index)?.to_string();
    let descriptor_str = class_file.constant_pool.get_utf8(raw.descriptor_index)?.to_string();
    let descriptor = parse_method_descriptor(&descriptor_str)?;
    Ok(Method {
        name,
        descriptor,
        descriptor_str,
        access_flags: raw.access_flags,
        declaring_class,
        code: raw.code.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classpath_parses_directory_and_jar_and_glob_entries() {
        let path = ClassPath::parse("/does/not/exist:/also/missing/*:/third.jar");
        assert!(path.read_class("java/lang/Object").is_none());
    }
}
