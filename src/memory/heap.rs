//! The object heap: an append-only arena of [`HeapObject`]s addressed by
//! [`ObjectRef`]. Mirrors `rsvm::memory::heap::Heap`'s role (the single
//! allocation point for every instance and array) without its raw-pointer
//! lab/bump-pointer internals — a `Vec` already gives append-only semantics,
//! and addressing by index instead of pointer keeps the whole core free of
//! `unsafe`, which is what lets a future relocating/tracing collector swap
//! in behind the same API without touching callers, as long as reachability
//! through the frame stack, class statics, and the interned-string table is
//! preserved.

use std::cell::RefCell;

use crate::object::array::PrimitiveArrayData;
use crate::object::class::ClassRef;
use crate::value::JValue;

/// A reference to a heap object. `ObjectRef::NULL` is bit-pattern zero, so
/// `aconst_null` and zero-initialized fields are indistinguishable from a
/// real null reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjectRef(u32);

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_not_null(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        ObjectRef(index as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    pub fn from_raw(bits: u64) -> Self {
        ObjectRef(bits as u32)
    }
}

/// What a heap object actually stores: a class pointer plus either inline
/// instance slots or a length + element storage.
pub enum HeapObject {
    /// A plain instance: declared field values in field-table order (the
    /// layout computed at link time by `ClassData::instance_fields`).
    Instance { class: ClassRef, fields: Vec<JValue> },
    /// An array of references.
    ObjectArray { class: ClassRef, elements: Vec<ObjectRef> },
    /// An array of a primitive type.
    PrimitiveArray { class: ClassRef, data: PrimitiveArrayData },
}

impl HeapObject {
    pub fn class(&self) -> ClassRef {
        match self {
            HeapObject::Instance { class, .. } => *class,
            HeapObject::ObjectArray { class, .. } => *class,
            HeapObject::PrimitiveArray { class, .. } => *class,
        }
    }
}

pub struct Heap {
    objects: RefCell<Vec<HeapObject>>,
}

impl Heap {
    pub fn new() -> Self {
        // Index 0 is reserved so that ObjectRef(0) unambiguously means null.
        Heap {
            objects: RefCell::new(vec![HeapObject::Instance {
                class: ClassRef::NULL,
                fields: Vec::new(),
            }]),
        }
    }

    pub fn alloc(&self, object: HeapObject) -> ObjectRef {
        let mut objects = self.objects.borrow_mut();
        let index = objects.len();
        objects.push(object);
        ObjectRef::from_index(index)
    }

    pub fn with<R>(&self, ptr: ObjectRef, f: impl FnOnce(&HeapObject) -> R) -> R {
        let objects = self.objects.borrow();
        f(&objects[ptr.index()])
    }

    pub fn with_mut<R>(&self, ptr: ObjectRef, f: impl FnOnce(&mut HeapObject) -> R) -> R {
        let mut objects = self.objects.borrow_mut();
        f(&mut objects[ptr.index()])
    }

    pub fn class_of(&self, ptr: ObjectRef) -> ClassRef {
        self.with(ptr, |obj| obj.class())
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_bit_pattern_zero() {
        assert!(ObjectRef::NULL.is_null());
        assert_eq!(ObjectRef::NULL.to_raw(), 0);
        assert_eq!(ObjectRef::from_raw(0), ObjectRef::NULL);
    }

    #[test]
    fn alloc_never_reuses_the_null_slot() {
        let heap = Heap::new();
        let a = heap.alloc(HeapObject::Instance {
            class: ClassRef::NULL,
            fields: Vec::new(),
        });
        assert!(a.is_not_null());
        assert_ne!(a, ObjectRef::NULL);
    }
}
