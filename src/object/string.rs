//! The string interner. Grounded in `rsvm::object::string`'s `HeapString`
//! for the "decode once, cache by content" shape, but backing the interned
//! object with a `char[]` field the way real `java.lang.String` does (JVMS
//! SE8), rather than `rsvm`'s raw byte-blob layout — see DESIGN.md's
//! note on `java.lang.String`'s backing field layout.

use std::collections::HashMap;

use crate::memory::heap::{Heap, HeapObject};
use crate::object::array::PrimitiveArrayData;
use crate::object::class::ClassRef;
use crate::object::ObjectRef;
use crate::value::JValue;

/// Encodes a decoded Modified-UTF-8 string as the UTF-16 code units
/// `java.lang.String`'s backing `char[]` holds.
pub fn encode_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// `java.lang.String.hashCode()`'s polynomial hash (`s[0]*31^(n-1) + ... +
/// s[n-1]`), needed so identity-hash-adjacent natives behave plausibly even
/// though this core has no real `java.lang.String` method bodies.
pub fn java_string_hash_code(units: &[u16]) -> i32 {
    let mut hash: i32 = 0;
    for &unit in units {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    hash
}

/// Canonicalizes UTF-8 text to a single `java/lang/String` heap object per
/// value. Construction needs the `String` class and its backing `[C` (char
/// array) class, both supplied by the caller since this module has no
/// class-loading authority of its own.
pub struct StringInterner {
    table: HashMap<String, ObjectRef>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner { table: HashMap::new() }
    }

    pub fn intern(
        &mut self,
        text: &str,
        heap: &Heap,
        string_class: ClassRef,
        char_array_class: ClassRef,
    ) -> ObjectRef {
        if let Some(&existing) = self.table.get(text) {
            return existing;
        }
        let units = encode_utf16(text);
        let value_array = heap.alloc(HeapObject::PrimitiveArray {
            class: char_array_class,
            data: PrimitiveArrayData::Char(units),
        });
        let string_obj = heap.alloc(HeapObject::Instance {
            class: string_class,
            fields: vec![JValue::from_ref(value_array)],
        });
        self.table.insert(text.to_string(), string_obj);
        string_obj
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_code_matches_javas_algorithm_for_empty_and_known_strings() {
        assert_eq!(java_string_hash_code(&encode_utf16("")), 0);
        // "abc".hashCode() == 96354
        assert_eq!(java_string_hash_code(&encode_utf16("abc")), 96354);
    }

    #[test]
    fn interning_equal_content_twice_yields_the_same_identity() {
        let heap = Heap::new();
        let mut interner = StringInterner::new();
        let string_class = ClassRef::from_index(1);
        let char_array_class = ClassRef::from_index(2);
        let a = interner.intern("hello", &heap, string_class, char_array_class);
        let b = interner.intern("hello", &heap, string_class, char_array_class);
        assert_eq!(a, b);
    }

    #[test]
    fn interning_distinct_content_yields_distinct_identity() {
        let heap = Heap::new();
        let mut interner = StringInterner::new();
        let string_class = ClassRef::from_index(1);
        let char_array_class = ClassRef::from_index(2);
        let a = interner.intern("hello", &heap, string_class, char_array_class);
        let b = interner.intern("world", &heap, string_class, char_array_class);
        assert_ne!(a, b);
    }
}
