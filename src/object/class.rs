//! Classes and the class table. Grounded in
//! `rsvm::object::class::{JClass, ClassData, ClassInitState}` for the
//! overall shape (access flags, super/interfaces, field/method tables, an
//! initialization state machine) but dropping `rsvm`'s `VTable`/`itable`
//! dispatch cache: method lookup here is a walk up the superclass chain,
//! and that's what [`resolve_instance_method`] does, with no cache to keep
//! coherent. The per-class status and static-value cells follow
//! [`crate::classfile::constant_pool::ConstantPool`]'s `Cell` side-table
//! idiom rather than `rsvm`'s in-place field mutation, so a class's fields
//! stay readable through a shared borrow while its status or statics
//! change underneath.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::classfile::constant_pool::ConstantPool;
use crate::classfile::instruction::{LookupSwitch, PrimitiveArrayType, TableSwitch};
use crate::object::field::FieldInfo;
use crate::object::method::Method;
use crate::object::ObjectRef;
use crate::value::JValue;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassRef(u32);

impl ClassRef {
    pub const NULL: ClassRef = ClassRef(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        ClassRef(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[allow(unused)]
#[derive(Debug, Clone, Copy)]
pub enum ClassAccessFlags {
    Public = 0x0001,
    Final = 0x0010,
    Super = 0x0020,
    Interface = 0x0200,
    Abstract = 0x0400,
}

impl ClassAccessFlags {
    pub fn is_interface(flags: u16) -> bool {
        flags & ClassAccessFlags::Interface as u16 != 0
    }

    pub fn is_abstract(flags: u16) -> bool {
        flags & ClassAccessFlags::Abstract as u16 != 0
    }
}

/// What shape of object this class describes: a plain class/interface, an
/// array-of-references class, or an array-of-primitives class.
#[derive(Debug, Clone)]
pub enum ClassKind {
    Plain,
    ObjectArray { element: ClassRef },
    PrimitiveArray { element: PrimitiveArrayType },
}

impl ClassKind {
    pub fn is_array(&self) -> bool {
        !matches!(self, ClassKind::Plain)
    }
}

/// The linking/initialization state machine:
/// `Loaded -> Linked -> Initializing -> Initialized`, with `Error` as the
/// terminal state reached if `<clinit>` throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassStatus {
    Loaded,
    Linked,
    Initializing,
    Initialized,
    Error,
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub access_flags: u16,
    pub kind: ClassKind,
    pub super_class: Option<ClassRef>,
    pub interfaces: Vec<ClassRef>,
    pub constant_pool: Option<ConstantPool>,
    /// The full inherited + declared instance-field layout, in slot order;
    /// a `HeapObject::Instance`'s `fields` vector has exactly this many
    /// entries.
    pub instance_fields: Vec<FieldInfo>,
    /// This class's own declared static fields (statics are not inherited
    /// storage, only inherited for lookup).
    pub static_fields: Vec<FieldInfo>,
    /// This class's own declared methods. Inherited methods are reached by
    /// walking `super_class` at lookup time — see [`resolve_instance_method`].
    pub methods: Vec<Method>,
    /// `tableswitch` instructions across this class's methods, interned in
    /// one per-class-file pool at decode time; a `Payload::TableSwitch`
    /// index on any of `methods`' instructions indexes into this.
    pub table_switches: Vec<TableSwitch>,
    pub lookup_switches: Vec<LookupSwitch>,
    static_values: RefCell<Vec<JValue>>,
    status: Cell<ClassStatus>,
    /// Memoized once `<clinit>` throws, so every later attempt to use this
    /// class reports the *same* exception object, rather than allocating a
    /// fresh one each time.
    init_error: RefCell<Option<ObjectRef>>,
    /// The lazily-allocated `java/lang/Class` mirror for this class.
    /// `None` until first requested; every later request returns the same
    /// identity.
    mirror: Cell<Option<ObjectRef>>,
}

impl Class {
    pub fn new(
        name: String,
        access_flags: u16,
        kind: ClassKind,
        super_class: Option<ClassRef>,
        interfaces: Vec<ClassRef>,
        constant_pool: Option<ConstantPool>,
        instance_fields: Vec<FieldInfo>,
        static_fields: Vec<FieldInfo>,
        methods: Vec<Method>,
    ) -> Self {
        Self::with_switches(
            name,
            access_flags,
            kind,
            super_class,
            interfaces,
            constant_pool,
            instance_fields,
            static_fields,
            methods,
            Vec::new(),
            Vec::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_switches(
        name: String,
        access_flags: u16,
        kind: ClassKind,
        super_class: Option<ClassRef>,
        interfaces: Vec<ClassRef>,
        constant_pool: Option<ConstantPool>,
        instance_fields: Vec<FieldInfo>,
        static_fields: Vec<FieldInfo>,
        methods: Vec<Method>,
        table_switches: Vec<TableSwitch>,
        lookup_switches: Vec<LookupSwitch>,
    ) -> Self {
        let static_values = vec![JValue::zero(); static_fields.len()];
        Class {
            name,
            access_flags,
            kind,
            super_class,
            interfaces,
            constant_pool,
            instance_fields,
            static_fields,
            methods,
            table_switches,
            lookup_switches,
            static_values: RefCell::new(static_values),
            status: Cell::new(ClassStatus::Loaded),
            init_error: RefCell::new(None),
            mirror: Cell::new(None),
        }
    }

    pub fn mirror(&self) -> Option<ObjectRef> {
        self.mirror.get()
    }

    /// Records the mirror object allocated for this class. Only ever
    /// called once per class — callers are expected to check [`Class::mirror`]
    /// first so the identity invariant holds.
    pub fn set_mirror(&self, mirror: ObjectRef) {
        self.mirror.set(Some(mirror));
    }

    pub fn is_interface(&self) -> bool {
        ClassAccessFlags::is_interface(self.access_flags)
    }

    pub fn is_abstract(&self) -> bool {
        ClassAccessFlags::is_abstract(self.access_flags)
    }

    pub fn status(&self) -> ClassStatus {
        self.status.get()
    }

    pub fn set_status(&self, status: ClassStatus) {
        self.status.set(status);
    }

    pub fn init_error(&self) -> Option<ObjectRef> {
        *self.init_error.borrow()
    }

    pub fn set_init_error(&self, error: ObjectRef) {
        *self.init_error.borrow_mut() = Some(error);
        self.status.set(ClassStatus::Error);
    }

    pub fn static_value(&self, slot: u16) -> JValue {
        self.static_values.borrow()[slot as usize]
    }

    pub fn set_static_value(&self, slot: u16, value: JValue) {
        self.static_values.borrow_mut()[slot as usize] = value;
    }

    pub fn find_declared_method(&self, name: &str, descriptor: &str) -> Option<u16> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.descriptor_str == descriptor)
            .map(|i| i as u16)
    }

    pub fn find_declared_static_field(&self, name: &str) -> Option<u16> {
        self.static_fields.iter().position(|f| f.name == name).map(|i| i as u16)
    }

    pub fn find_instance_field(&self, name: &str) -> Option<u16> {
        self.instance_fields.iter().position(|f| f.name == name).map(|i| i as u16)
    }
}

pub struct ClassTable {
    classes: RefCell<Vec<Class>>,
    by_name: RefCell<HashMap<String, ClassRef>>,
}

impl ClassTable {
    pub fn new() -> Self {
        let placeholder = Class::new(
            String::new(),
            0,
            ClassKind::Plain,
            None,
            Vec::new(),
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        ClassTable {
            classes: RefCell::new(vec![placeholder]),
            by_name: RefCell::new(HashMap::new()),
        }
    }

    pub fn define(&self, class: Class) -> ClassRef {
        let name = class.name.clone();
        let mut classes = self.classes.borrow_mut();
        let index = classes.len();
        classes.push(class);
        let r = ClassRef::from_index(index);
        self.by_name.borrow_mut().insert(name, r);
        r
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ClassRef> {
        self.by_name.borrow().get(name).copied()
    }

    /// Overwrites an already-defined slot in place, keeping `r` valid. Used
    /// by the class loader to reserve a `ClassRef` before a class's own
    /// fields/methods (which need to record their `declaring_class`) are
    /// built, then swap in the finished `Class` once they are.
    pub fn replace(&self, r: ClassRef, class: Class) {
        self.classes.borrow_mut()[r.index()] = class;
    }

    pub fn with<R>(&self, r: ClassRef, f: impl FnOnce(&Class) -> R) -> R {
        let classes = self.classes.borrow();
        f(&classes[r.index()])
    }

    pub fn name_of(&self, r: ClassRef) -> String {
        self.with(r, |c| c.name.clone())
    }

    /// Finds the class whose cached `java/lang/Class` mirror is `mirror` —
    /// the reverse of [`Class::mirror`], needed by `Class.getName()` since a
    /// mirror instance carries no field recording what it represents.
    pub fn find_by_mirror(&self, mirror: ObjectRef) -> Option<ClassRef> {
        self.classes
            .borrow()
            .iter()
            .position(|c| c.mirror() == Some(mirror))
            .map(ClassRef::from_index)
    }

    /// True if `sub` is `sup` or a (transitive) subclass/subinterface of it —
    /// the semantics `checkcast`/`instanceof` need.
    pub fn is_subtype_of(&self, sub: ClassRef, sup: ClassRef) -> bool {
        if sub == sup {
            return true;
        }
        let (super_class, interfaces) = self.with(sub, |c| (c.super_class, c.interfaces.clone()));
        if let Some(s) = super_class {
            if self.is_subtype_of(s, sup) {
                return true;
            }
        }
        interfaces.iter().any(|&i| self.is_subtype_of(i, sup))
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks `start`'s superclass chain, then its (and its ancestors') interfaces,
/// looking for a method with this exact name and descriptor — the search
/// rather than a vtable lookup.
pub fn resolve_instance_method(
    table: &ClassTable,
    start: ClassRef,
    name: &str,
    descriptor: &str,
) -> Option<(ClassRef, u16)> {
    let mut current = Some(start);
    while let Some(c) = current {
        if let Some(idx) = table.with(c, |class| class.find_declared_method(name, descriptor)) {
            return Some((c, idx));
        }
        current = table.with(c, |class| class.super_class);
    }
    resolve_interface_method(table, start, name, descriptor)
}

fn resolve_interface_method(
    table: &ClassTable,
    start: ClassRef,
    name: &str,
    descriptor: &str,
) -> Option<(ClassRef, u16)> {
    let mut frontier = vec![start];
    let mut visited = std::collections::HashSet::new();
    while let Some(c) = frontier.pop() {
        if !visited.insert(c) {
            continue;
        }
        let (ifaces, super_class) = table.with(c, |class| (class.interfaces.clone(), class.super_class));
        for iface in ifaces {
            if let Some(idx) = table.with(iface, |class| class.find_declared_method(name, descriptor)) {
                return Some((iface, idx));
            }
            frontier.push(iface);
        }
        if let Some(s) = super_class {
            frontier.push(s);
        }
    }
    None
}

/// Walks `start`'s superclass chain looking for a static field by name,
/// per JVMS §5.4.3.2's field-resolution order (simplified: superinterfaces
/// are not separately consulted, since interfaces carrying `static final`
/// constants are resolved directly through the constant pool in practice).
pub fn resolve_static_field(table: &ClassTable, start: ClassRef, name: &str) -> Option<(ClassRef, u16)> {
    let mut current = Some(start);
    while let Some(c) = current {
        if let Some(idx) = table.with(c, |class| class.find_declared_static_field(name)) {
            return Some((c, idx));
        }
        current = table.with(c, |class| class.super_class);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_class(name: &str, super_class: Option<ClassRef>) -> Class {
        Class::new(
            name.to_string(),
            ClassAccessFlags::Public as u16,
            ClassKind::Plain,
            super_class,
            Vec::new(),
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn subtype_check_walks_the_superclass_chain() {
        let table = ClassTable::new();
        let object = table.define(plain_class("java/lang/Object", None));
        let base = table.define(plain_class("Base", Some(object)));
        let derived = table.define(plain_class("Derived", Some(base)));
        assert!(table.is_subtype_of(derived, object));
        assert!(table.is_subtype_of(derived, base));
        assert!(!table.is_subtype_of(object, derived));
    }

    #[test]
    fn status_transitions_are_independently_observable() {
        let table = ClassTable::new();
        let c = table.define(plain_class("Foo", None));
        assert_eq!(table.with(c, |c| c.status()), ClassStatus::Loaded);
        table.with(c, |c| c.set_status(ClassStatus::Linked));
        assert_eq!(table.with(c, |c| c.status()), ClassStatus::Linked);
    }

    #[test]
    fn linkage_error_identity_is_memoized() {
        let table = ClassTable::new();
        let c = table.define(plain_class("Bad", None));
        let err = ObjectRef::NULL;
        table.with(c, |c| c.set_init_error(err));
        assert_eq!(table.with(c, |c| c.status()), ClassStatus::Error);
        assert_eq!(table.with(c, |c| c.init_error()), Some(err));
    }
}
