//! The frame-level operand bit-bag.
//!
//! `rsvm` carries an untyped 64-bit `jvalue` at the frame level and relies
//! on each opcode handler to interpret it under its declared type. `rsvm`
//! expresses that bag as a `#[repr(C)] union`; this core keeps the same
//! contract — one 64-bit slot, reinterpreted per opcode — through a safe
//! newtype around `u64` with explicit bit casts instead, so the whole crate
//! stays free of `unsafe`.

use crate::object::ObjectRef;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct JValue(u64);

impl JValue {
    #[inline]
    pub fn zero() -> Self {
        JValue(0)
    }

    #[inline]
    pub fn from_bool(v: bool) -> Self {
        JValue(v as u64)
    }

    #[inline]
    pub fn from_byte(v: i8) -> Self {
        JValue(v as u32 as u64)
    }

    #[inline]
    pub fn from_char(v: u16) -> Self {
        JValue(v as u64)
    }

    #[inline]
    pub fn from_short(v: i16) -> Self {
        JValue(v as u32 as u64)
    }

    #[inline]
    pub fn from_int(v: i32) -> Self {
        JValue(v as u32 as u64)
    }

    #[inline]
    pub fn from_long(v: i64) -> Self {
        JValue(v as u64)
    }

    #[inline]
    pub fn from_float(v: f32) -> Self {
        JValue(v.to_bits() as u64)
    }

    #[inline]
    pub fn from_double(v: f64) -> Self {
        JValue(v.to_bits())
    }

    #[inline]
    pub fn from_ref(v: ObjectRef) -> Self {
        JValue(v.to_raw())
    }

    #[inline]
    pub fn as_bool(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn as_byte(self) -> i8 {
        self.0 as u32 as i32 as i8
    }

    #[inline]
    pub fn as_char(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub fn as_short(self) -> i16 {
        self.0 as u32 as i32 as i16
    }

    #[inline]
    pub fn as_int(self) -> i32 {
        self.0 as u32 as i32
    }

    #[inline]
    pub fn as_long(self) -> i64 {
        self.0 as i64
    }

    #[inline]
    pub fn as_float(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    #[inline]
    pub fn as_double(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline]
    pub fn as_ref(self) -> ObjectRef {
        ObjectRef::from_raw(self.0)
    }

    #[inline]
    pub fn raw_bits(self) -> u64 {
        self.0
    }
}

impl Default for JValue {
    fn default() -> Self {
        JValue::zero()
    }
}

impl std::fmt::Debug for JValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JValue(0x{:016x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_primitive_kind() {
        assert_eq!(JValue::from_int(-7).as_int(), -7);
        assert_eq!(JValue::from_long(i64::MIN).as_long(), i64::MIN);
        assert_eq!(JValue::from_float(1.5).as_float(), 1.5);
        assert_eq!(JValue::from_double(-2.25).as_double(), -2.25);
        assert_eq!(JValue::from_bool(true).as_bool(), true);
        assert_eq!(JValue::from_byte(-1).as_byte(), -1);
        assert_eq!(JValue::from_short(-1).as_short(), -1);
        assert_eq!(JValue::from_char(0xffff).as_char(), 0xffff);
    }

    #[test]
    fn narrowing_truncates_low_bits() {
        let v = JValue::from_int(0x1_2345_6789u64 as i32);
        assert_eq!(v.as_byte(), 0x89u8 as i8);
    }
}
