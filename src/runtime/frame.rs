//! Activation records. Grounded in `rsvm::runtime::frame::Frame` for the
//! role (locals, operand stack, program counter, back-pointer to the
//! running method) but replaced end to end: `rsvm` carves frames out of a
//! raw native call stack addressed by pointer arithmetic; this core gives
//! every frame its own `Vec<JValue>` locals and operand stack, so the whole
//! call stack can be a plain `Vec<Frame>` with no `unsafe` stack-pointer
//! bookkeeping.

use crate::object::class::ClassRef;
use crate::value::JValue;

/// One logical operand-stack entry. Longs and doubles already fit in a
/// single `JValue`, so unlike the two-physical-slot layout a real JVM frame
/// uses, this stack keeps one entry per pushed value — but still tags each
/// entry's category, since `dup2`/`dup2_x1`/`dup2_x2` must tell "one
/// category-2 value" apart from "two category-1 values" at the point
/// they execute.
#[derive(Debug, Clone, Copy)]
struct StackEntry {
    value: JValue,
    wide: bool,
}

/// The operand stack half of a frame (JVMS §2.6.2). Capacity tracks
/// `max_stack` only loosely — entries, not slots, are counted — since this
/// core has no bytecode verifier to rely on the slot-exact limit.
#[derive(Debug, Default)]
pub struct OperandStack {
    entries: Vec<StackEntry>,
}

impl OperandStack {
    pub fn with_capacity(max_stack: u16) -> Self {
        OperandStack { entries: Vec::with_capacity(max_stack as usize) }
    }

    pub fn push1(&mut self, value: JValue) {
        self.entries.push(StackEntry { value, wide: false });
    }

    pub fn push2(&mut self, value: JValue) {
        self.entries.push(StackEntry { value, wide: true });
    }

    pub fn pop1(&mut self) -> Option<JValue> {
        self.entries.pop().map(|e| e.value)
    }

    pub fn pop2(&mut self) -> Option<JValue> {
        self.entries.pop().map(|e| e.value)
    }

    pub fn peek1(&self) -> Option<JValue> {
        self.entries.last().map(|e| e.value)
    }

    /// True if the top entry is a category-2 (long/double) value — the
    /// test `dup2`'s two forms dispatch on.
    pub fn top_is_wide(&self) -> Option<bool> {
        self.entries.last().map(|e| e.wide)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn raw_push(&mut self, value: JValue, wide: bool) {
        self.entries.push(StackEntry { value, wide });
    }

    pub(crate) fn raw_pop(&mut self) -> Option<(JValue, bool)> {
        self.entries.pop().map(|e| (e.value, e.wide))
    }

    pub(crate) fn raw_peek_at(&self, depth_from_top: usize) -> Option<(JValue, bool)> {
        let len = self.entries.len();
        if depth_from_top >= len {
            return None;
        }
        let e = self.entries[len - 1 - depth_from_top];
        Some((e.value, e.wide))
    }
}

/// One method activation: locals, operand stack, program counter (an
/// instruction index, not a byte offset), and a back-pointer to the
/// method being run. Longs and doubles occupy a single `locals` entry
/// here (see [`OperandStack`]'s doc comment for why); the second local
/// slot JVMS reserves for a category-2 local is simply never addressed.
pub struct Frame {
    pub class: ClassRef,
    pub method_index: u16,
    pub locals: Vec<JValue>,
    pub operand_stack: OperandStack,
    pub pc: usize,
}

impl Frame {
    pub fn new(class: ClassRef, method_index: u16, max_locals: u16, max_stack: u16) -> Self {
        Frame {
            class,
            method_index,
            locals: vec![JValue::zero(); max_locals as usize],
            operand_stack: OperandStack::with_capacity(max_stack),
            pc: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn wide_pushes_are_distinguishable_from_two_narrow_pushes() {
        let mut stack = OperandStack::default();
        stack.push2(JValue::from_long(7));
        assert_eq!(stack.top_is_wide(), Some(true));

        let mut narrow = OperandStack::default();
        narrow.push1(JValue::from_int(1));
        narrow.push1(JValue::from_int(2));
        assert_eq!(narrow.top_is_wide(), Some(false));
    }

    #[test]
    fn frame_locals_are_zero_initialized() {
        let frame = Frame::new(ClassRef::NULL, 0, 4, 4);
        assert_eq!(frame.locals.len(), 4);
        assert_eq!(frame.locals[0].as_ref(), ObjectRef::NULL);
    }
}
