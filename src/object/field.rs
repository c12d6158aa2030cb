//! Resolved field metadata, computed at link time from a [`RawFieldInfo`].
//! Grounded in `rsvm::object::field::Field`, minus its on-heap layout and
//! raw value accessors — fields here are addressed by slot index into a
//! plain `Vec<JValue>` (see [`crate::memory::heap::HeapObject`]), so no
//! `layout_offset`/`read_value_ptr` machinery is needed.

use crate::classfile::descriptor::FieldType;
use crate::object::class::ClassRef;

#[allow(unused)]
#[derive(Debug, Clone, Copy)]
pub enum FieldAccessFlags {
    Public = 0x0001,
    Private = 0x0002,
    Protected = 0x0004,
    Static = 0x0008,
    Final = 0x0010,
    Volatile = 0x0040,
    Transient = 0x0080,
}

impl FieldAccessFlags {
    pub fn is_static(flags: u16) -> bool {
        flags & FieldAccessFlags::Static as u16 != 0
    }

    pub fn is_final(flags: u16) -> bool {
        flags & FieldAccessFlags::Final as u16 != 0
    }
}

/// A constant recorded in the field's `ConstantValue` attribute, used to
/// prefill a `static final` primitive or `String` field before `<clinit>`
/// runs (JVMS §5.5 step 7).
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: FieldType,
    pub access_flags: u16,
    /// The class that declared this field (as opposed to one that merely
    /// inherits it).
    pub declaring_class: ClassRef,
    /// Index into the owning class's instance-field (or static-field) slot
    /// vector.
    pub slot: u16,
    pub constant_value: Option<ConstantValue>,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        FieldAccessFlags::is_static(self.access_flags)
    }

    pub fn is_final(&self) -> bool {
        FieldAccessFlags::is_final(self.access_flags)
    }
}
