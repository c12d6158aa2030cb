//! The constant pool. Grounded in `rsvm::object::constant_pool` and
//! `exo-class-file::item::constant_pool` for the tagged-entry shape. The
//! "Long/Double reserve the next slot" and "resolved during linking"
//! invariants are implemented with a parallel `Cell<Resolution>` side-table,
//! keyed by constant-pool index, rather than mutating the entries themselves
//! in place.

use std::cell::Cell;

use crate::classfile::ClassFileError;
use crate::object::class::ClassRef;
use crate::object::ObjectRef;

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;

#[derive(Debug, Clone)]
pub enum CpEntry {
    /// The invalid slot at index 0, and the padding slot following a
    /// Long/Double.
    Invalid,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
}

impl CpEntry {
    pub fn tag_name(&self) -> &'static str {
        match self {
            CpEntry::Invalid => "invalid",
            CpEntry::Utf8(_) => "Utf8",
            CpEntry::Integer(_) => "Integer",
            CpEntry::Float(_) => "Float",
            CpEntry::Long(_) => "Long",
            CpEntry::Double(_) => "Double",
            CpEntry::Class { .. } => "Class",
            CpEntry::String { .. } => "String",
            CpEntry::FieldRef { .. } => "Fieldref",
            CpEntry::MethodRef { .. } => "Methodref",
            CpEntry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            CpEntry::NameAndType { .. } => "NameAndType",
            CpEntry::MethodHandle { .. } => "MethodHandle",
            CpEntry::MethodType { .. } => "MethodType",
            CpEntry::InvokeDynamic { .. } => "InvokeDynamic",
        }
    }
}

/// Resolution results cached on first successful resolution of a `class`,
/// `string`, field-ref or method-ref entry. Copy, so a `Cell` suffices.
#[derive(Debug, Clone, Copy)]
pub enum Resolution {
    Unresolved,
    Class(ClassRef),
    /// Owning class and the index of the resolved field within it.
    Field(ClassRef, u16),
    /// Owning class and the index of the resolved method within it.
    Method(ClassRef, u16),
    Str(ObjectRef),
}

pub struct ConstantPool {
    entries: Vec<CpEntry>,
    resolutions: Vec<Cell<Resolution>>,
}

impl ConstantPool {
    pub fn new(entries: Vec<CpEntry>) -> Self {
        let resolutions = entries.iter().map(|_| Cell::new(Resolution::Unresolved)).collect();
        ConstantPool { entries, resolutions }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn bounds_check(&self, index: u16) -> Result<usize, ClassFileError> {
        let i = index as usize;
        if i == 0 || i >= self.entries.len() {
            return Err(ClassFileError::BadConstantPool(format!(
                "index {index} out of range"
            )));
        }
        Ok(i)
    }

    pub fn get_any(&self, index: u16) -> Result<&CpEntry, ClassFileError> {
        let i = self.bounds_check(index)?;
        match &self.entries[i] {
            CpEntry::Invalid => Err(ClassFileError::BadConstantPool(format!(
                "index {index} is an invalid/padding slot"
            ))),
            entry => Ok(entry),
        }
    }

    pub fn get_utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Utf8(s) => Ok(s.as_str()),
            other => Err(self.tag_mismatch(index, "Utf8", other)),
        }
    }

    pub fn get_class_name_index(&self, index: u16) -> Result<u16, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Class { name_index } => Ok(*name_index),
            other => Err(self.tag_mismatch(index, "Class", other)),
        }
    }

    pub fn get_class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        let name_index = self.get_class_name_index(index)?;
        self.get_utf8(name_index)
    }

    pub fn get_integer(&self, index: u16) -> Result<i32, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Integer(v) => Ok(*v),
            other => Err(self.tag_mismatch(index, "Integer", other)),
        }
    }

    pub fn get_float(&self, index: u16) -> Result<f32, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Float(v) => Ok(*v),
            other => Err(self.tag_mismatch(index, "Float", other)),
        }
    }

    pub fn get_long(&self, index: u16) -> Result<i64, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Long(v) => Ok(*v),
            other => Err(self.tag_mismatch(index, "Long", other)),
        }
    }

    pub fn get_double(&self, index: u16) -> Result<f64, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::Double(v) => Ok(*v),
            other => Err(self.tag_mismatch(index, "Double", other)),
        }
    }

    pub fn get_name_and_type(&self, index: u16) -> Result<(u16, u16), ClassFileError> {
        match self.get_any(index)? {
            CpEntry::NameAndType { name_index, descriptor_index } => {
                Ok((*name_index, *descriptor_index))
            }
            other => Err(self.tag_mismatch(index, "NameAndType", other)),
        }
    }

    /// `(class_index, name_and_type_index)` for a field/method/interface
    /// method ref; tag must be one of the three member-ref kinds.
    pub fn get_member_ref(&self, index: u16) -> Result<(u16, u16), ClassFileError> {
        match self.get_any(index)? {
            CpEntry::FieldRef { class_index, name_and_type_index }
            | CpEntry::MethodRef { class_index, name_and_type_index }
            | CpEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
                Ok((*class_index, *name_and_type_index))
            }
            other => Err(self.tag_mismatch(index, "member ref", other)),
        }
    }

    pub fn get_string_index(&self, index: u16) -> Result<u16, ClassFileError> {
        match self.get_any(index)? {
            CpEntry::String { string_index } => Ok(*string_index),
            other => Err(self.tag_mismatch(index, "String", other)),
        }
    }

    pub fn resolution(&self, index: u16) -> Resolution {
        self.resolutions[index as usize].get()
    }

    pub fn set_resolution(&self, index: u16, resolution: Resolution) {
        self.resolutions[index as usize].set(resolution);
    }

    fn tag_mismatch(&self, index: u16, expected: &'static str, actual: &CpEntry) -> ClassFileError {
        ClassFileError::BadConstantPool(format!(
            "index {index}: expected {expected}, found {}",
            actual.tag_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(entries: Vec<CpEntry>) -> ConstantPool {
        ConstantPool::new(entries)
    }

    #[test]
    fn index_zero_is_always_invalid() {
        let pool = pool_with(vec![CpEntry::Invalid, CpEntry::Integer(1)]);
        assert!(pool.get_any(0).is_err());
    }

    #[test]
    fn long_and_double_reserve_the_next_slot() {
        let pool = pool_with(vec![
            CpEntry::Invalid,
            CpEntry::Long(42),
            CpEntry::Invalid,
            CpEntry::Integer(7),
        ]);
        assert_eq!(pool.get_long(1).unwrap(), 42);
        assert!(pool.get_any(2).is_err());
        assert_eq!(pool.get_integer(3).unwrap(), 7);
    }

    #[test]
    fn tag_mismatch_is_reported() {
        let pool = pool_with(vec![CpEntry::Invalid, CpEntry::Integer(1)]);
        match pool.get_utf8(1) {
            Err(ClassFileError::BadConstantPool(_)) => {}
            other => panic!("expected BadConstantPool, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let pool = pool_with(vec![CpEntry::Invalid]);
        assert!(pool.get_any(5).is_err());
    }

    #[test]
    fn resolution_cache_round_trips() {
        let pool = pool_with(vec![CpEntry::Invalid, CpEntry::Class { name_index: 0 }]);
        assert!(matches!(pool.resolution(1), Resolution::Unresolved));
        pool.set_resolution(1, Resolution::Class(ClassRef::NULL));
        assert!(matches!(pool.resolution(1), Resolution::Class(_)));
    }
}
