//! The dispatch loop. Grounded in `rsvm::runtime::interpreter`'s role (one
//! function that walks a method's instructions, maintaining frame/operand
//! stack state and driving invokes, field access, and exception handling)
//! but dispatches through a single `match` over [`Opcode`] instead of
//! `rsvm`'s computed-goto/label-threaded `jvm_instructions!` macro — that
//! technique is a platform-specific performance optimization this core
//! does not take on.

use crate::classfile::constant_pool::ConstantPool;
use crate::classfile::descriptor::FieldType;
use crate::classfile::instruction::{Instruction, Opcode, Payload};
use crate::memory::heap::HeapObject;
use crate::object::class::{resolve_instance_method, resolve_static_field, ClassRef};
use crate::object::ObjectRef;
use crate::value::JValue;
use crate::vm::{Vm, VmError};

use super::frame::Frame;
use super::stack::CallStack;

/// What one executed instruction asks the dispatch loop to do next.
enum Step {
    Continue,
    Jump(usize),
    Return(JValue),
}

pub struct Interpreter<'vm> {
    vm: &'vm Vm,
    stack: CallStack,
}

impl<'vm> Interpreter<'vm> {
    /// Runs a class's `<clinit>` to completion, discarding its (always
    /// `void`) result.
    pub fn run_clinit(vm: &Vm, class: ClassRef, method_index: u16) -> Result<(), VmError> {
        let mut interp = Interpreter { vm, stack: CallStack::new() };
        interp.invoke(class, method_index, &[])?;
        Ok(())
    }

    /// Runs the main class's entry point with the given `String[]` argument
    /// array already allocated on the heap.
    pub fn run_main(vm: &Vm, class: ClassRef, method_index: u16, args: ObjectRef) -> Result<(), VmError> {
        let mut interp = Interpreter { vm, stack: CallStack::new() };
        interp.invoke(class, method_index, &[JValue::from_ref(args)])?;
        Ok(())
    }

    pub fn vm(&self) -> &'vm Vm {
        self.vm
    }

    /// Pushes a frame for `class.methods[method_index]`, runs it to
    /// completion (return or escaped exception), and pops it again. Native
    /// and abstract methods have no `Code` attribute and are dispatched
    /// without a frame.
    fn invoke(&mut self, class: ClassRef, method_index: u16, args: &[JValue]) -> Result<JValue, VmError> {
        let (max_locals, max_stack, has_code, is_native, is_abstract) = self.vm.classes.with(class, |c| {
            let m = &c.methods[method_index as usize];
            match &m.code {
                Some(code) => (code.max_locals, code.max_stack, true, false, false),
                None => (0, 0, false, m.is_native(), m.is_abstract()),
            }
        });

        if is_native {
            let (class_name, method_name) =
                self.vm.classes.with(class, |c| (c.name.clone(), c.methods[method_index as usize].name.clone()));
            let native_fn = self
                .vm
                .natives
                .lookup(&class_name, &method_name)
                .ok_or_else(|| VmError::UnsatisfiedLinkError(format!("{class_name}.{method_name}")))?;
            return native_fn(self, args);
        }
        if is_abstract || !has_code {
            return Err(VmError::UnsupportedOperation("invoked method has no executable body"));
        }

        let mut frame = Frame::new(class, method_index, max_locals, max_stack);
        for (i, arg) in args.iter().enumerate() {
            frame.locals[i] = *arg;
        }
        self.stack.push(frame);
        let result = self.run_top_frame();
        self.stack.pop();
        result
    }

    fn run_top_frame(&mut self) -> Result<JValue, VmError> {
        loop {
            let (class, method_index, pc) = {
                let frame = self.stack.top().expect("run_top_frame called with an empty call stack");
                (frame.class, frame.method_index, frame.pc)
            };
            let instr = self.vm.classes.with(class, |c| {
                c.methods[method_index as usize]
                    .code
                    .as_ref()
                    .expect("frame only exists for methods with Code")
                    .instructions[pc]
            });

            match self.execute(class, instr) {
                Ok(Step::Continue) => self.stack.top_mut().unwrap().pc += 1,
                Ok(Step::Jump(target)) => self.stack.top_mut().unwrap().pc = target,
                Ok(Step::Return(value)) => return Ok(value),
                Err(VmError::Uncaught(throwable)) => match self.try_handle_exception(class, method_index, pc, throwable) {
                    Some(handler_pc) => self.stack.top_mut().unwrap().pc = handler_pc,
                    None => return Err(VmError::Uncaught(throwable)),
                },
                Err(other) => return Err(other),
            }
        }
    }

    /// Walks the current method's exception table looking for a handler
    /// whose range covers `pc` and whose catch type is a supertype of
    /// `throwable`'s dynamic class (or the "catches anything" wildcard,
    /// `catch_type == 0`). On a match, the operand stack is cleared and the
    /// throwable pushed, ready for the handler to execute.
    fn try_handle_exception(&mut self, class: ClassRef, method_index: u16, pc: usize, throwable: ObjectRef) -> Option<usize> {
        let throwable_class = self.vm.heap.class_of(throwable);
        let handlers = self.vm.classes.with(class, |c| c.methods[method_index as usize].code.clone());
        let handlers = handlers?.exception_table;
        for handler in &handlers {
            if (handler.start as usize) > pc || pc >= handler.end as usize {
                continue;
            }
            let matches = if handler.catch_type == 0 {
                true
            } else {
                let catch_class = self.vm.classes.with(class, |c| {
                    let cp = c.constant_pool.as_ref().unwrap();
                    cp.get_class_name(handler.catch_type).map(|n| n.to_string())
                });
                match catch_class.ok().and_then(|name| self.vm.load_class(&name).ok()) {
                    Some(catch_class) => self.vm.classes.is_subtype_of(throwable_class, catch_class),
                    None => false,
                }
            };
            if matches {
                let frame = self.stack.top_mut().unwrap();
                frame.operand_stack.clear();
                frame.operand_stack.push1(JValue::from_ref(throwable));
                return Some(handler.handler as usize);
            }
        }
        None
    }

    fn raise(&self, class_name: &str) -> VmError {
        self.raise_with_message(class_name, None)
    }

    /// Allocates and throws `class_name`, filling its `detailMessage` field
    /// (Java's own name for `Throwable`'s message slot) if the loaded class
    /// declares one and a message was given. Classpaths that never declare
    /// that field (the minimal bootstrap set, say) just get a bare
    /// throwable, matching `raise`'s existing best-effort style.
    fn raise_with_message(&self, class_name: &str, message: Option<String>) -> VmError {
        match self.vm.load_class(class_name) {
            Ok(class) => {
                let field_count = self.vm.classes.with(class, |c| c.instance_fields.len());
                let mut fields = vec![JValue::zero(); field_count];
                if let Some(text) = message {
                    let slot = self.vm.classes.with(class, |c| c.find_instance_field("detailMessage"));
                    if let Some(slot) = slot {
                        if let Ok(string) = self.vm.intern_string(&text) {
                            fields[slot as usize] = JValue::from_ref(string);
                        }
                    }
                }
                let obj = self.vm.heap.alloc(HeapObject::Instance { class, fields });
                VmError::Uncaught(obj)
            }
            Err(err) => err,
        }
    }

    fn null_pointer_exception(&self) -> VmError {
        self.raise("java/lang/NullPointerException")
    }

    fn array_index_out_of_bounds(&self, index: i32) -> VmError {
        self.raise_with_message("java/lang/ArrayIndexOutOfBoundsException", Some(index.to_string()))
    }

    fn arithmetic_exception(&self) -> VmError {
        self.raise("java/lang/ArithmeticException")
    }

    fn class_cast_exception(&self) -> VmError {
        self.raise("java/lang/ClassCastException")
    }

    fn resolve_catch_or_class(&self, class: ClassRef, index: u16) -> Result<ClassRef, VmError> {
        let name = self.vm.classes.with(class, |c| {
            c.constant_pool.as_ref().unwrap().get_class_name(index).map(|n| n.to_string())
        })?;
        self.vm.load_class(&name)
    }

    /// Decodes a field-ref or method-ref constant-pool entry into its
    /// owning class's internal name, member name, and descriptor.
    fn resolve_member(&self, class: ClassRef, index: u16) -> Result<(String, String, String), VmError> {
        let resolved = self.vm.classes.with(class, |c| {
            let cp = c.constant_pool.as_ref().unwrap();
            let (class_index, nat_index) = cp.get_member_ref(index)?;
            let class_name = cp.get_class_name(class_index)?.to_string();
            let (name_index, descriptor_index) = cp.get_name_and_type(nat_index)?;
            let name = cp.get_utf8(name_index)?.to_string();
            let descriptor = cp.get_utf8(descriptor_index)?.to_string();
            Ok::<_, crate::classfile::ClassFileError>((class_name, name, descriptor))
        })?;
        Ok(resolved)
    }

    fn execute(&mut self, class: ClassRef, instr: Instruction) -> Result<Step, VmError> {
        match instr.opcode {
            Opcode::Nop => Ok(Step::Continue),
            Opcode::AconstNull => self.push1(JValue::from_ref(ObjectRef::NULL)),
            Opcode::Iconst => {
                let v = immediate(instr.payload) as i32;
                self.push1(JValue::from_int(v))
            }
            Opcode::Lconst => {
                let v = immediate(instr.payload);
                self.push2(JValue::from_long(v))
            }
            Opcode::Fconst => self.push1(JValue::from_float(float_payload(instr.payload))),
            Opcode::Dconst => self.push2(JValue::from_double(double_payload(instr.payload))),
            Opcode::Ldc => self.exec_ldc(class, index(instr.payload)),
            Opcode::Ldc2W => self.exec_ldc2w(class, index(instr.payload)),

            Opcode::Iload | Opcode::Fload | Opcode::Aload => {
                let v = self.local(index(instr.payload));
                self.push1(v)
            }
            Opcode::Lload | Opcode::Dload => {
                let v = self.local(index(instr.payload));
                self.push2(v)
            }
            Opcode::Istore | Opcode::Fstore | Opcode::Astore => {
                let v = self.pop1()?;
                self.set_local(index(instr.payload), v);
                Ok(Step::Continue)
            }
            Opcode::Lstore | Opcode::Dstore => {
                let v = self.pop2()?;
                self.set_local(index(instr.payload), v);
                Ok(Step::Continue)
            }

            Opcode::Iaload | Opcode::Faload | Opcode::Baload | Opcode::Caload | Opcode::Saload => {
                self.array_load()
            }
            Opcode::Laload => self.array_load_wide(),
            Opcode::Daload => self.array_load_wide(),
            Opcode::Aaload => self.object_array_load(),

            Opcode::Iastore | Opcode::Fastore | Opcode::Bastore | Opcode::Castore | Opcode::Sastore => {
                self.array_store1()
            }
            Opcode::Lastore | Opcode::Dastore => self.array_store2(),
            Opcode::Aastore => self.object_array_store(),

            Opcode::Pop => {
                self.pop_raw()?;
                Ok(Step::Continue)
            }
            Opcode::Pop2 => {
                let (_, wide) = self.pop_raw()?;
                if !wide {
                    self.pop_raw()?;
                }
                Ok(Step::Continue)
            }
            Opcode::Dup => self.dup(),
            Opcode::DupX1 => self.dup_x1(),
            Opcode::DupX2 => self.dup_x2(),
            Opcode::Dup2 => self.dup2(),
            Opcode::Dup2X1 => self.dup2_x1(),
            Opcode::Dup2X2 => self.dup2_x2(),
            Opcode::Swap => self.swap(),

            Opcode::Iadd => self.int_binop(i32::wrapping_add),
            Opcode::Isub => self.int_binop(i32::wrapping_sub),
            Opcode::Imul => self.int_binop(i32::wrapping_mul),
            Opcode::Idiv => self.int_div(),
            Opcode::Irem => self.int_rem(),
            Opcode::Ineg => {
                let a = self.pop1()?.as_int();
                self.push1(JValue::from_int(a.wrapping_neg()))
            }
            Opcode::Ishl => self.int_shift(|a, s| a.wrapping_shl(s as u32 & 0x1f)),
            Opcode::Ishr => self.int_shift(|a, s| a.wrapping_shr(s as u32 & 0x1f)),
            Opcode::Iushr => {
                let shift = self.pop1()?.as_int();
                let a = self.pop1()?.as_int();
                let result = ((a as u32) >> (shift as u32 & 0x1f)) as i32;
                self.push1(JValue::from_int(result))
            }
            Opcode::Iand => self.int_binop(|a, b| a & b),
            Opcode::Ior => self.int_binop(|a, b| a | b),
            Opcode::Ixor => self.int_binop(|a, b| a ^ b),
            Opcode::Iinc => {
                let (local, constant) = iinc_pair(instr.payload);
                let v = self.local(local).as_int();
                self.set_local(local, JValue::from_int(v.wrapping_add(constant)));
                Ok(Step::Continue)
            }

            Opcode::Ladd => self.long_binop(i64::wrapping_add),
            Opcode::Lsub => self.long_binop(i64::wrapping_sub),
            Opcode::Lmul => self.long_binop(i64::wrapping_mul),
            Opcode::Ldiv => self.long_div(),
            Opcode::Lrem => self.long_rem(),
            Opcode::Lneg => {
                let a = self.pop2()?.as_long();
                self.push2(JValue::from_long(a.wrapping_neg()))
            }
            Opcode::Lshl => {
                let shift = self.pop1()?.as_int();
                let a = self.pop2()?.as_long();
                self.push2(JValue::from_long(a.wrapping_shl(shift as u32 & 0x3f)))
            }
            Opcode::Lshr => {
                let shift = self.pop1()?.as_int();
                let a = self.pop2()?.as_long();
                self.push2(JValue::from_long(a.wrapping_shr(shift as u32 & 0x3f)))
            }
            Opcode::Lushr => {
                let shift = self.pop1()?.as_int();
                let a = self.pop2()?.as_long();
                let result = ((a as u64) >> (shift as u32 & 0x3f)) as i64;
                self.push2(JValue::from_long(result))
            }
            Opcode::Land => self.long_binop(|a, b| a & b),
            Opcode::Lor => self.long_binop(|a, b| a | b),
            Opcode::Lxor => self.long_binop(|a, b| a ^ b),

            Opcode::Fadd => self.float_binop(|a, b| a + b),
            Opcode::Fsub => self.float_binop(|a, b| a - b),
            Opcode::Fmul => self.float_binop(|a, b| a * b),
            Opcode::Fdiv => self.float_binop(|a, b| a / b),
            Opcode::Frem => self.float_binop(|a, b| a % b),
            Opcode::Fneg => {
                let a = self.pop1()?.as_float();
                self.push1(JValue::from_float(-a))
            }

            Opcode::Dadd => self.double_binop(|a, b| a + b),
            Opcode::Dsub => self.double_binop(|a, b| a - b),
            Opcode::Dmul => self.double_binop(|a, b| a * b),
            Opcode::Ddiv => self.double_binop(|a, b| a / b),
            Opcode::Drem => self.double_binop(|a, b| a % b),
            Opcode::Dneg => {
                let a = self.pop2()?.as_double();
                self.push2(JValue::from_double(-a))
            }

            Opcode::I2l => {
                let v = self.pop1()?.as_int();
                self.push2(JValue::from_long(v as i64))
            }
            Opcode::I2f => {
                let v = self.pop1()?.as_int();
                self.push1(JValue::from_float(v as f32))
            }
            Opcode::I2d => {
                let v = self.pop1()?.as_int();
                self.push2(JValue::from_double(v as f64))
            }
            Opcode::L2i => {
                let v = self.pop2()?.as_long();
                self.push1(JValue::from_int(v as i32))
            }
            Opcode::L2f => {
                let v = self.pop2()?.as_long();
                self.push1(JValue::from_float(v as f32))
            }
            Opcode::L2d => {
                let v = self.pop2()?.as_long();
                self.push2(JValue::from_double(v as f64))
            }
            Opcode::F2i => {
                let v = self.pop1()?.as_float();
                self.push1(JValue::from_int(f32_to_i32_saturating(v)))
            }
            Opcode::F2l => {
                let v = self.pop1()?.as_float();
                self.push2(JValue::from_long(f32_to_i64_saturating(v)))
            }
            Opcode::F2d => {
                let v = self.pop1()?.as_float();
                self.push2(JValue::from_double(v as f64))
            }
            Opcode::D2i => {
                let v = self.pop2()?.as_double();
                self.push1(JValue::from_int(f64_to_i32_saturating(v)))
            }
            Opcode::D2l => {
                let v = self.pop2()?.as_double();
                self.push2(JValue::from_long(f64_to_i64_saturating(v)))
            }
            Opcode::D2f => {
                let v = self.pop2()?.as_double();
                self.push1(JValue::from_float(v as f32))
            }
            Opcode::I2b => {
                let v = self.pop1()?.as_int();
                self.push1(JValue::from_int(v as i8 as i32))
            }
            Opcode::I2c => {
                let v = self.pop1()?.as_int();
                self.push1(JValue::from_int(v as u16 as i32))
            }
            Opcode::I2s => {
                let v = self.pop1()?.as_int();
                self.push1(JValue::from_int(v as i16 as i32))
            }

            Opcode::Lcmp => {
                let b = self.pop2()?.as_long();
                let a = self.pop2()?.as_long();
                self.push1(JValue::from_int(a.cmp(&b) as i32))
            }
            Opcode::Fcmpl => self.float_cmp(-1),
            Opcode::Fcmpg => self.float_cmp(1),
            Opcode::Dcmpl => self.double_cmp(-1),
            Opcode::Dcmpg => self.double_cmp(1),

            Opcode::Ifeq => self.branch_if(instr, |v| v == 0),
            Opcode::Ifne => self.branch_if(instr, |v| v != 0),
            Opcode::Iflt => self.branch_if(instr, |v| v < 0),
            Opcode::Ifge => self.branch_if(instr, |v| v >= 0),
            Opcode::Ifgt => self.branch_if(instr, |v| v > 0),
            Opcode::Ifle => self.branch_if(instr, |v| v <= 0),
            Opcode::IfIcmpeq => self.branch_if_icmp(instr, |a, b| a == b),
            Opcode::IfIcmpne => self.branch_if_icmp(instr, |a, b| a != b),
            Opcode::IfIcmplt => self.branch_if_icmp(instr, |a, b| a < b),
            Opcode::IfIcmpge => self.branch_if_icmp(instr, |a, b| a >= b),
            Opcode::IfIcmpgt => self.branch_if_icmp(instr, |a, b| a > b),
            Opcode::IfIcmple => self.branch_if_icmp(instr, |a, b| a <= b),
            Opcode::IfAcmpeq => self.branch_if_acmp(instr, true),
            Opcode::IfAcmpne => self.branch_if_acmp(instr, false),
            Opcode::Ifnull => {
                let v = self.pop1()?.as_ref();
                self.branch_target(instr, v.is_null())
            }
            Opcode::Ifnonnull => {
                let v = self.pop1()?.as_ref();
                self.branch_target(instr, v.is_not_null())
            }
            Opcode::Goto => Ok(Step::Jump(index(instr.payload) as usize)),
            Opcode::Jsr | Opcode::Ret => Err(VmError::UnsupportedOperation("jsr/ret")),
            Opcode::Tableswitch => self.exec_tableswitch(class, instr),
            Opcode::Lookupswitch => self.exec_lookupswitch(class, instr),

            Opcode::Ireturn | Opcode::Freturn | Opcode::Areturn => Ok(Step::Return(self.pop1()?)),
            Opcode::Lreturn | Opcode::Dreturn => Ok(Step::Return(self.pop2()?)),
            Opcode::Return => Ok(Step::Return(JValue::zero())),

            Opcode::Getstatic => self.exec_getstatic(class, index(instr.payload)),
            Opcode::Putstatic => self.exec_putstatic(class, index(instr.payload)),
            Opcode::Getfield => self.exec_getfield(class, index(instr.payload)),
            Opcode::Putfield => self.exec_putfield(class, index(instr.payload)),

            Opcode::Invokevirtual | Opcode::Invokeinterface => self.exec_invoke_virtual(class, instr),
            Opcode::Invokespecial => self.exec_invoke_special(class, index(instr.payload)),
            Opcode::Invokestatic => self.exec_invoke_static(class, index(instr.payload)),
            Opcode::Invokedynamic => Err(VmError::UnsupportedOperation("invokedynamic")),

            Opcode::New => self.exec_new(class, index(instr.payload)),
            Opcode::Newarray => self.exec_newarray(instr.payload),
            Opcode::Anewarray => self.exec_anewarray(class, index(instr.payload)),
            Opcode::Arraylength => self.exec_arraylength(),
            Opcode::Athrow => self.exec_athrow(),
            Opcode::Checkcast => self.exec_checkcast(class, index(instr.payload)),
            Opcode::Instanceof => self.exec_instanceof(class, index(instr.payload)),
            Opcode::Monitorenter => {
                let v = self.pop1()?.as_ref();
                if v.is_null() {
                    return Err(self.null_pointer_exception());
                }
                Ok(Step::Continue)
            }
            Opcode::Monitorexit => {
                let v = self.pop1()?.as_ref();
                if v.is_null() {
                    return Err(self.null_pointer_exception());
                }
                Ok(Step::Continue)
            }
            Opcode::Multianewarray => self.exec_multianewarray(class, instr.payload),
        }
    }

    // --- stack/local helpers -------------------------------------------------

    fn frame(&mut self) -> &mut Frame {
        self.stack.top_mut().expect("no active frame")
    }

    fn push1(&mut self, v: JValue) -> Result<Step, VmError> {
        self.frame().operand_stack.push1(v);
        Ok(Step::Continue)
    }

    fn push2(&mut self, v: JValue) -> Result<Step, VmError> {
        self.frame().operand_stack.push2(v);
        Ok(Step::Continue)
    }

    fn pop1(&mut self) -> Result<JValue, VmError> {
        self.frame()
            .operand_stack
            .pop1()
            .ok_or(VmError::UnsupportedOperation("operand stack underflow"))
    }

    fn pop2(&mut self) -> Result<JValue, VmError> {
        self.frame()
            .operand_stack
            .pop2()
            .ok_or(VmError::UnsupportedOperation("operand stack underflow"))
    }

    fn pop_raw(&mut self) -> Result<(JValue, bool), VmError> {
        self.frame()
            .operand_stack
            .raw_pop()
            .ok_or(VmError::UnsupportedOperation("operand stack underflow"))
    }

    fn local(&mut self, slot: u16) -> JValue {
        self.frame().locals[slot as usize]
    }

    fn set_local(&mut self, slot: u16, v: JValue) {
        self.frame().locals[slot as usize] = v;
    }

    // --- dup family, built from the tagged raw push/pop primitives ----------

    fn dup(&mut self) -> Result<Step, VmError> {
        let (v, wide) = self.frame().operand_stack.raw_peek_at(0).ok_or(underflow())?;
        self.frame().operand_stack.raw_push(v, wide);
        Ok(Step::Continue)
    }

    fn dup_x1(&mut self) -> Result<Step, VmError> {
        let top = self.pop_raw()?;
        let below = self.pop_raw()?;
        self.frame().operand_stack.raw_push(top.0, top.1);
        self.frame().operand_stack.raw_push(below.0, below.1);
        self.frame().operand_stack.raw_push(top.0, top.1);
        Ok(Step::Continue)
    }

    fn dup_x2(&mut self) -> Result<Step, VmError> {
        let top = self.pop_raw()?;
        let second = self.pop_raw()?;
        let third = self.pop_raw()?;
        self.frame().operand_stack.raw_push(top.0, top.1);
        self.frame().operand_stack.raw_push(third.0, third.1);
        self.frame().operand_stack.raw_push(second.0, second.1);
        self.frame().operand_stack.raw_push(top.0, top.1);
        Ok(Step::Continue)
    }

    fn dup2(&mut self) -> Result<Step, VmError> {
        if self.frame().operand_stack.top_is_wide() == Some(true) {
            let top = self.pop_raw()?;
            self.frame().operand_stack.raw_push(top.0, top.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
        } else {
            let top = self.pop_raw()?;
            let second = self.pop_raw()?;
            self.frame().operand_stack.raw_push(second.0, second.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
            self.frame().operand_stack.raw_push(second.0, second.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
        }
        Ok(Step::Continue)
    }

    fn dup2_x1(&mut self) -> Result<Step, VmError> {
        if self.frame().operand_stack.top_is_wide() == Some(true) {
            let top = self.pop_raw()?;
            let below = self.pop_raw()?;
            self.frame().operand_stack.raw_push(top.0, top.1);
            self.frame().operand_stack.raw_push(below.0, below.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
        } else {
            let top = self.pop_raw()?;
            let second = self.pop_raw()?;
            let third = self.pop_raw()?;
            self.frame().operand_stack.raw_push(second.0, second.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
            self.frame().operand_stack.raw_push(third.0, third.1);
            self.frame().operand_stack.raw_push(second.0, second.1);
            self.frame().operand_stack.raw_push(top.0, top.1);
        }
        Ok(Step::Continue)
    }

    fn dup2_x2(&mut self) -> Result<Step, VmError> {
        let top_is_wide = self.frame().operand_stack.top_is_wide();
        let below_is_wide = self.frame().operand_stack.raw_peek_at(1).map(|(_, w)| w);
        match (top_is_wide, below_is_wide) {
            (Some(true), Some(true)) | (Some(true), None) => {
                let top = self.pop_raw()?;
                let below = self.pop_raw()?;
                self.frame().operand_stack.raw_push(top.0, top.1);
                self.frame().operand_stack.raw_push(below.0, below.1);
                self.frame().operand_stack.raw_push(top.0, top.1);
            }
            _ => {
                let top = self.pop_raw()?;
                let second = self.pop_raw()?;
                let third = self.pop_raw()?;
                if third.1 {
                    self.frame().operand_stack.raw_push(second.0, second.1);
                    self.frame().operand_stack.raw_push(top.0, top.1);
                    self.frame().operand_stack.raw_push(third.0, third.1);
                    self.frame().operand_stack.raw_push(second.0, second.1);
                    self.frame().operand_stack.raw_push(top.0, top.1);
                } else {
                    let fourth = self.pop_raw()?;
                    self.frame().operand_stack.raw_push(second.0, second.1);
                    self.frame().operand_stack.raw_push(top.0, top.1);
                    self.frame().operand_stack.raw_push(fourth.0, fourth.1);
                    self.frame().operand_stack.raw_push(third.0, third.1);
                    self.frame().operand_stack.raw_push(second.0, second.1);
                    self.frame().operand_stack.raw_push(top.0, top.1);
                }
            }
        }
        Ok(Step::Continue)
    }

    fn swap(&mut self) -> Result<Step, VmError> {
        let top = self.pop_raw()?;
        let below = self.pop_raw()?;
        self.frame().operand_stack.raw_push(top.0, top.1);
        self.frame().operand_stack.raw_push(below.0, below.1);
        Ok(Step::Continue)
    }

    // --- arithmetic -----------------------------------------------------------

    fn int_binop(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<Step, VmError> {
        let b = self.pop1()?.as_int();
        let a = self.pop1()?.as_int();
        self.push1(JValue::from_int(f(a, b)))
    }

    fn int_shift(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<Step, VmError> {
        let b = self.pop1()?.as_int();
        let a = self.pop1()?.as_int();
        self.push1(JValue::from_int(f(a, b)))
    }

    fn int_div(&mut self) -> Result<Step, VmError> {
        let b = self.pop1()?.as_int();
        let a = self.pop1()?.as_int();
        if b == 0 {
            return Err(self.arithmetic_exception());
        }
        self.push1(JValue::from_int(a.wrapping_div(b)))
    }

    fn int_rem(&mut self) -> Result<Step, VmError> {
        let b = self.pop1()?.as_int();
        let a = self.pop1()?.as_int();
        if b == 0 {
            return Err(self.arithmetic_exception());
        }
        self.push1(JValue::from_int(a.wrapping_rem(b)))
    }

    fn long_binop(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<Step, VmError> {
        let b = self.pop2()?.as_long();
        let a = self.pop2()?.as_long();
        self.push2(JValue::from_long(f(a, b)))
    }

    fn long_div(&mut self) -> Result<Step, VmError> {
        let b = self.pop2()?.as_long();
        let a = self.pop2()?.as_long();
        if b == 0 {
            return Err(self.arithmetic_exception());
        }
        self.push2(JValue::from_long(a.wrapping_div(b)))
    }

    fn long_rem(&mut self) -> Result<Step, VmError> {
        let b = self.pop2()?.as_long();
        let a = self.pop2()?.as_long();
        if b == 0 {
            return Err(self.arithmetic_exception());
        }
        self.push2(JValue::from_long(a.wrapping_rem(b)))
    }

    fn float_binop(&mut self, f: impl Fn(f32, f32) -> f32) -> Result<Step, VmError> {
        let b = self.pop1()?.as_float();
        let a = self.pop1()?.as_float();
        self.push1(JValue::from_float(f(a, b)))
    }

    fn double_binop(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<Step, VmError> {
        let b = self.pop2()?.as_double();
        let a = self.pop2()?.as_double();
        self.push2(JValue::from_double(f(a, b)))
    }

    /// `fcmpl`/`fcmpg` differ only in which one a NaN operand produces;
    /// `nan_result` is `-1` for `fcmpl`, `1` for `fcmpg`.
    fn float_cmp(&mut self, nan_result: i32) -> Result<Step, VmError> {
        let b = self.pop1()?.as_float();
        let a = self.pop1()?.as_float();
        let result = match a.partial_cmp(&b) {
            Some(std::cmp::Ordering::Less) => -1,
            Some(std::cmp::Ordering::Equal) => 0,
            Some(std::cmp::Ordering::Greater) => 1,
            None => nan_result,
        };
        self.push1(JValue::from_int(result))
    }

    fn double_cmp(&mut self, nan_result: i32) -> Result<Step, VmError> {
        let b = self.pop2()?.as_double();
        let a = self.pop2()?.as_double();
        let result = match a.partial_cmp(&b) {
            Some(std::cmp::Ordering::Less) => -1,
            Some(std::cmp::Ordering::Equal) => 0,
            Some(std::cmp::Ordering::Greater) => 1,
            None => nan_result,
        };
        self.push1(JValue::from_int(result))
    }

    // --- branches ---------------------------------------------------------

    fn branch_target(&mut self, instr: Instruction, take: bool) -> Result<Step, VmError> {
        if take {
            Ok(Step::Jump(index(instr.payload) as usize))
        } else {
            Ok(Step::Continue)
        }
    }

    fn branch_if(&mut self, instr: Instruction, cond: impl Fn(i32) -> bool) -> Result<Step, VmError> {
        let v = self.pop1()?.as_int();
        self.branch_target(instr, cond(v))
    }

    fn branch_if_icmp(&mut self, instr: Instruction, cond: impl Fn(i32, i32) -> bool) -> Result<Step, VmError> {
        let b = self.pop1()?.as_int();
        let a = self.pop1()?.as_int();
        self.branch_target(instr, cond(a, b))
    }

    fn branch_if_acmp(&mut self, instr: Instruction, want_eq: bool) -> Result<Step, VmError> {
        let b = self.pop1()?.as_ref();
        let a = self.pop1()?.as_ref();
        self.branch_target(instr, (a == b) == want_eq)
    }

    fn exec_tableswitch(&mut self, class: ClassRef, instr: Instruction) -> Result<Step, VmError> {
        let pool_index = match instr.payload {
            Payload::TableSwitch(i) => i,
            _ => unreachable!("decoder always pairs Tableswitch with Payload::TableSwitch"),
        };
        let key = self.pop1()?.as_int();
        let target = self.vm.classes.with(class, |c| {
            let ts = &c.table_switches[pool_index];
            if key < ts.low || key > ts.high {
                ts.default_target
            } else {
                ts.targets[(key - ts.low) as usize]
            }
        });
        Ok(Step::Jump(target as usize))
    }

    fn exec_lookupswitch(&mut self, class: ClassRef, instr: Instruction) -> Result<Step, VmError> {
        let pool_index = match instr.payload {
            Payload::LookupSwitch(i) => i,
            _ => unreachable!("decoder always pairs Lookupswitch with Payload::LookupSwitch"),
        };
        let key = self.pop1()?.as_int();
        let target = self.vm.classes.with(class, |c| {
            let ls = &c.lookup_switches[pool_index];
            ls.pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, t)| *t)
                .unwrap_or(ls.default_target)
        });
        Ok(Step::Jump(target as usize))
    }

    // --- arrays -------------------------------------------------------------

    fn array_load(&mut self) -> Result<Step, VmError> {
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with(arr, |obj| match obj {
            HeapObject::PrimitiveArray { data, .. } => data.get(idx),
            _ => panic!("array-load opcode used on a non-array heap object"),
        });
        match result {
            Ok(v) => self.push1(v),
            Err(e) => Err(self.array_index_out_of_bounds(e.index)),
        }
    }

    fn array_load_wide(&mut self) -> Result<Step, VmError> {
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with(arr, |obj| match obj {
            HeapObject::PrimitiveArray { data, .. } => data.get(idx),
            _ => panic!("array-load opcode used on a non-array heap object"),
        });
        match result {
            Ok(v) => self.push2(v),
            Err(e) => Err(self.array_index_out_of_bounds(e.index)),
        }
    }

    fn object_array_load(&mut self) -> Result<Step, VmError> {
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with(arr, |obj| match obj {
            HeapObject::ObjectArray { elements, .. } => {
                if idx < 0 || idx as usize >= elements.len() {
                    Err(crate::object::array::ArrayIndexOutOfBounds { index: idx })
                } else {
                    Ok(elements[idx as usize])
                }
            }
            _ => panic!("aaload used on a non-object-array heap object"),
        });
        match result {
            Ok(v) => self.push1(JValue::from_ref(v)),
            Err(e) => Err(self.array_index_out_of_bounds(e.index)),
        }
    }

    fn array_store1(&mut self) -> Result<Step, VmError> {
        let value = self.pop1()?;
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with_mut(arr, |obj| match obj {
            HeapObject::PrimitiveArray { data, .. } => data.set(idx, value),
            _ => panic!("array-store opcode used on a non-array heap object"),
        });
        result.map(|_| Step::Continue).map_err(|e| self.array_index_out_of_bounds(e.index))
    }

    fn array_store2(&mut self) -> Result<Step, VmError> {
        let value = self.pop2()?;
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with_mut(arr, |obj| match obj {
            HeapObject::PrimitiveArray { data, .. } => data.set(idx, value),
            _ => panic!("array-store opcode used on a non-array heap object"),
        });
        result.map(|_| Step::Continue).map_err(|e| self.array_index_out_of_bounds(e.index))
    }

    fn object_array_store(&mut self) -> Result<Step, VmError> {
        let value = self.pop1()?.as_ref();
        let idx = self.pop1()?.as_int();
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let result = self.vm.heap.with_mut(arr, |obj| match obj {
            HeapObject::ObjectArray { elements, .. } => {
                if idx < 0 || idx as usize >= elements.len() {
                    Err(crate::object::array::ArrayIndexOutOfBounds { index: idx })
                } else {
                    elements[idx as usize] = value;
                    Ok(())
                }
            }
            _ => panic!("aastore used on a non-object-array heap object"),
        });
        result.map(|_| Step::Continue).map_err(|e| self.array_index_out_of_bounds(e.index))
    }

    fn exec_arraylength(&mut self) -> Result<Step, VmError> {
        let arr = self.pop1()?.as_ref();
        if arr.is_null() {
            return Err(self.null_pointer_exception());
        }
        let len = self.vm.heap.with(arr, |obj| match obj {
            HeapObject::PrimitiveArray { data, .. } => data.len(),
            HeapObject::ObjectArray { elements, .. } => elements.len(),
            HeapObject::Instance { .. } => panic!("arraylength used on a non-array heap object"),
        });
        self.push1(JValue::from_int(len as i32))
    }

    fn exec_newarray(&mut self, payload: Payload) -> Result<Step, VmError> {
        let elem_type = match payload {
            Payload::PrimitiveArrayType(t) => t,
            _ => unreachable!("decoder always pairs Newarray with Payload::PrimitiveArrayType"),
        };
        let len = self.pop1()?.as_int();
        if len < 0 {
            return Err(self.raise("java/lang/NegativeArraySizeException"));
        }
        let array_class = self.vm.load_class(elem_type.array_class_name())?;
        let obj = self.vm.heap.alloc(HeapObject::PrimitiveArray {
            class: array_class,
            data: crate::object::array::PrimitiveArrayData::new(elem_type, len as usize),
        });
        self.push1(JValue::from_ref(obj))
    }

    fn exec_anewarray(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let len = self.pop1()?.as_int();
        if len < 0 {
            return Err(self.raise("java/lang/NegativeArraySizeException"));
        }
        let elem_class = self.resolve_catch_or_class(class, cp_index)?;
        let elem_name = self.vm.classes.name_of(elem_class);
        let array_name = if elem_name.starts_with('[') {
            format!("[{elem_name}")
        } else {
            format!("[L{elem_name};")
        };
        let array_class = self.vm.load_class(&array_name)?;
        let obj = self.vm.heap.alloc(HeapObject::ObjectArray {
            class: array_class,
            elements: vec![ObjectRef::NULL; len as usize],
        });
        self.push1(JValue::from_ref(obj))
    }

    fn exec_multianewarray(&mut self, class: ClassRef, payload: Payload) -> Result<Step, VmError> {
        let (cp_index, dims) = match payload {
            Payload::MultiANewArray(i, d) => (i, d),
            _ => unreachable!("decoder always pairs Multianewarray with Payload::MultiANewArray"),
        };
        let mut lengths = Vec::with_capacity(dims as usize);
        for _ in 0..dims {
            lengths.push(self.pop1()?.as_int());
        }
        lengths.reverse();
        let array_name = self.vm.classes.with(class, |c| {
            c.constant_pool.as_ref().unwrap().get_class_name(cp_index).map(|n| n.to_string())
        })?;
        let obj = self.build_multiarray(&array_name, &lengths)?;
        self.push1(JValue::from_ref(obj))
    }

    fn build_multiarray(&mut self, array_name: &str, lengths: &[i32]) -> Result<ObjectRef, VmError> {
        let len = lengths[0];
        if len < 0 {
            return Err(self.raise("java/lang/NegativeArraySizeException"));
        }
        let array_class = self.vm.load_class(array_name)?;
        let elem_name = array_name.strip_prefix('[').expect("array class name always starts with '['");
        let elements = if lengths.len() > 1 && elem_name.starts_with('[') {
            let mut elements = Vec::with_capacity(len as usize);
            for _ in 0..len {
                elements.push(self.build_multiarray(elem_name, &lengths[1..])?);
            }
            elements
        } else {
            vec![ObjectRef::NULL; len as usize]
        };
        Ok(self.vm.heap.alloc(HeapObject::ObjectArray { class: array_class, elements }))
    }

    // --- objects, fields, invokes --------------------------------------------

    fn exec_new(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let target = self.resolve_catch_or_class(class, cp_index)?;
        self.vm.ensure_initialized(target)?;
        let field_count = self.vm.classes.with(target, |c| c.instance_fields.len());
        let obj = self.vm.heap.alloc(HeapObject::Instance {
            class: target,
            fields: vec![JValue::zero(); field_count],
        });
        self.push1(JValue::from_ref(obj))
    }

    fn exec_checkcast(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let target = self.resolve_catch_or_class(class, cp_index)?;
        let v = self.frame().operand_stack.peek1().ok_or(underflow())?;
        let obj = v.as_ref();
        if obj.is_not_null() {
            let actual = self.vm.heap.class_of(obj);
            if !self.vm.classes.is_subtype_of(actual, target) {
                return Err(self.class_cast_exception());
            }
        }
        Ok(Step::Continue)
    }

    fn exec_instanceof(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let target = self.resolve_catch_or_class(class, cp_index)?;
        let obj = self.pop1()?.as_ref();
        let result = if obj.is_null() {
            false
        } else {
            self.vm.classes.is_subtype_of(self.vm.heap.class_of(obj), target)
        };
        self.push1(JValue::from_int(result as i32))
    }

    fn exec_athrow(&mut self) -> Result<Step, VmError> {
        let obj = self.pop1()?.as_ref();
        if obj.is_null() {
            return Err(self.null_pointer_exception());
        }
        Err(VmError::Uncaught(obj))
    }

    fn exec_getstatic(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (owner_name, field_name, _descriptor) = self.resolve_member(class, cp_index)?;
        let owner = self.vm.load_class(&owner_name)?;
        self.vm.ensure_initialized(owner)?;
        let (owner, slot) = resolve_static_field(&self.vm.classes, owner, &field_name)
            .ok_or_else(|| VmError::ClassNotFound(format!("{owner_name}.{field_name}")))?;
        let value = self.vm.classes.with(owner, |c| c.static_value(slot));
        self.push1(value)
    }

    fn exec_putstatic(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (owner_name, field_name, _descriptor) = self.resolve_member(class, cp_index)?;
        let owner = self.vm.load_class(&owner_name)?;
        self.vm.ensure_initialized(owner)?;
        let (owner, slot) = resolve_static_field(&self.vm.classes, owner, &field_name)
            .ok_or_else(|| VmError::ClassNotFound(format!("{owner_name}.{field_name}")))?;
        let value = self.pop1()?;
        self.vm.classes.with(owner, |c| c.set_static_value(slot, value));
        Ok(Step::Continue)
    }

    fn exec_getfield(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (_owner_name, field_name, _descriptor) = self.resolve_member(class, cp_index)?;
        let receiver = self.pop1()?.as_ref();
        if receiver.is_null() {
            return Err(self.null_pointer_exception());
        }
        let obj_class = self.vm.heap.class_of(receiver);
        let slot = self
            .vm
            .classes
            .with(obj_class, |c| c.find_instance_field(&field_name))
            .ok_or_else(|| VmError::ClassNotFound(format!("<instance>.{field_name}")))?;
        let value = self.vm.heap.with(receiver, |obj| match obj {
            HeapObject::Instance { fields, .. } => fields[slot as usize],
            _ => panic!("getfield used on a non-instance heap object"),
        });
        self.push1(value)
    }

    fn exec_putfield(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (_owner_name, field_name, _descriptor) = self.resolve_member(class, cp_index)?;
        let value = self.pop1()?;
        let receiver = self.pop1()?.as_ref();
        if receiver.is_null() {
            return Err(self.null_pointer_exception());
        }
        let obj_class = self.vm.heap.class_of(receiver);
        let slot = self
            .vm
            .classes
            .with(obj_class, |c| c.find_instance_field(&field_name))
            .ok_or_else(|| VmError::ClassNotFound(format!("<instance>.{field_name}")))?;
        self.vm.heap.with_mut(receiver, |obj| match obj {
            HeapObject::Instance { fields, .. } => fields[slot as usize] = value,
            _ => panic!("putfield used on a non-instance heap object"),
        });
        Ok(Step::Continue)
    }

    fn exec_invoke_static(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (owner_name, name, descriptor) = self.resolve_member(class, cp_index)?;
        let owner = self.vm.load_class(&owner_name)?;
        self.vm.ensure_initialized(owner)?;
        let method_index = self
            .vm
            .classes
            .with(owner, |c| c.find_declared_method(&name, &descriptor))
            .ok_or_else(|| VmError::ClassNotFound(format!("{owner_name}.{name}{descriptor}")))?;
        let arg_count = self.vm.classes.with(owner, |c| c.methods[method_index as usize].descriptor.params.len());
        let args = self.pop_n(arg_count)?;
        let result = self.invoke(owner, method_index, &args)?;
        self.push_result(owner, method_index, result)
    }

    fn exec_invoke_special(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let (owner_name, name, descriptor) = self.resolve_member(class, cp_index)?;
        let owner = self.vm.load_class(&owner_name)?;
        let (resolved_class, method_index) = resolve_instance_method(&self.vm.classes, owner, &name, &descriptor)
            .ok_or_else(|| VmError::ClassNotFound(format!("{owner_name}.{name}{descriptor}")))?;
        let param_count = self.vm.classes.with(resolved_class, |c| c.methods[method_index as usize].descriptor.params.len());
        let mut args = self.pop_n(param_count)?;
        let receiver = self.pop1()?;
        args.insert(0, receiver);
        let result = self.invoke(resolved_class, method_index, &args)?;
        self.push_result(resolved_class, method_index, result)
    }

    fn exec_invoke_virtual(&mut self, class: ClassRef, instr: Instruction) -> Result<Step, VmError> {
        let cp_index = match instr.payload {
            Payload::InvokeInterface(idx, _count) => idx,
            Payload::Index(idx) => idx,
            _ => unreachable!("decoder always pairs invoke opcodes with an index payload"),
        };
        let (owner_name, name, descriptor) = self.resolve_member(class, cp_index)?;
        let owner = self.vm.load_class(&owner_name)?;
        let param_count = {
            let descriptor_parsed = crate::classfile::descriptor::parse_method_descriptor(&descriptor)?;
            descriptor_parsed.params.len()
        };
        let mut args = self.pop_n(param_count)?;
        let receiver = self.pop1()?;
        let receiver_ref = receiver.as_ref();
        if receiver_ref.is_null() {
            return Err(self.null_pointer_exception());
        }
        let dynamic_class = self.vm.heap.class_of(receiver_ref);
        let (resolved_class, method_index) = resolve_instance_method(&self.vm.classes, dynamic_class, &name, &descriptor)
            .or_else(|| resolve_instance_method(&self.vm.classes, owner, &name, &descriptor))
            .ok_or_else(|| VmError::ClassNotFound(format!("{owner_name}.{name}{descriptor}")))?;
        args.insert(0, receiver);
        let result = self.invoke(resolved_class, method_index, &args)?;
        self.push_result(resolved_class, method_index, result)
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<JValue>, VmError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop1()?);
        }
        values.reverse();
        Ok(values)
    }

    fn push_result(&mut self, class: ClassRef, method_index: u16, result: JValue) -> Result<Step, VmError> {
        let returns_wide = self.vm.classes.with(class, |c| {
            matches!(
                c.methods[method_index as usize].descriptor.return_type,
                Some(FieldType::Long) | Some(FieldType::Double)
            )
        });
        let returns_void = self.vm.classes.with(class, |c| c.methods[method_index as usize].descriptor.return_type.is_none());
        if returns_void {
            Ok(Step::Continue)
        } else if returns_wide {
            self.push2(result)
        } else {
            self.push1(result)
        }
    }

    // --- constant resolution --------------------------------------------------

    fn exec_ldc(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let entry = self.vm.classes.with(class, |c| {
            let cp = c.constant_pool.as_ref().unwrap();
            ldc_kind(cp, cp_index)
        })?;
        let value = match entry {
            LdcKind::Int(v) => JValue::from_int(v),
            LdcKind::Float(v) => JValue::from_float(v),
            LdcKind::String(s) => JValue::from_ref(self.vm.intern_string(&s)?),
            LdcKind::Class(name) => JValue::from_ref(self.vm.class_mirror(self.vm.load_class(&name)?)?),
        };
        self.push1(value)
    }

    fn exec_ldc2w(&mut self, class: ClassRef, cp_index: u16) -> Result<Step, VmError> {
        let value = self.vm.classes.with(class, |c| {
            let cp = c.constant_pool.as_ref().unwrap();
            if let Ok(v) = cp.get_long(cp_index) {
                Ok(JValue::from_long(v))
            } else {
                cp.get_double(cp_index).map(JValue::from_double)
            }
        })?;
        self.push2(value)
    }
}

enum LdcKind {
    Int(i32),
    Float(f32),
    String(String),
    Class(String),
}

fn ldc_kind(cp: &ConstantPool, index: u16) -> Result<LdcKind, VmError> {
    if let Ok(v) = cp.get_integer(index) {
        return Ok(LdcKind::Int(v));
    }
    if let Ok(v) = cp.get_float(index) {
        return Ok(LdcKind::Float(v));
    }
    if let Ok(string_index) = cp.get_string_index(index) {
        return Ok(LdcKind::String(cp.get_utf8(string_index)?.to_string()));
    }
    Ok(LdcKind::Class(cp.get_class_name(index)?.to_string()))
}

fn underflow() -> VmError {
    VmError::UnsupportedOperation("operand stack underflow")
}

fn index(payload: Payload) -> u16 {
    match payload {
        Payload::Index(i) => i,
        other => panic!("expected an index payload, found {other:?}"),
    }
}

fn immediate(payload: Payload) -> i64 {
    match payload {
        Payload::Immediate(v) => v,
        other => panic!("expected an immediate payload, found {other:?}"),
    }
}

fn float_payload(payload: Payload) -> f32 {
    match payload {
        Payload::Float(v) => v,
        other => panic!("expected a float payload, found {other:?}"),
    }
}

fn double_payload(payload: Payload) -> f64 {
    match payload {
        Payload::Double(v) => v,
        other => panic!("expected a double payload, found {other:?}"),
    }
}

fn iinc_pair(payload: Payload) -> (u16, i32) {
    match payload {
        Payload::IincPair(local, constant) => (local, constant),
        other => panic!("expected an iinc payload, found {other:?}"),
    }
}

/// `f2i`/`d2i` round toward zero and saturate (JVMS §2.8.3): NaN becomes 0,
/// out-of-range values clamp to `i32::MIN`/`MAX` rather than wrapping.
fn f32_to_i32_saturating(v: f32) -> i32 {
    if v.is_nan() {
        0
    } else {
        v as i32
    }
}

fn f32_to_i64_saturating(v: f32) -> i64 {
    if v.is_nan() {
        0
    } else {
        v as i64
    }
}

fn f64_to_i32_saturating(v: f64) -> i32 {
    if v.is_nan() {
        0
    } else {
        v as i32
    }
}

fn f64_to_i64_saturating(v: f64) -> i64 {
    if v.is_nan() {
        0
    } else {
        v as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_float_to_int_maps_nan_to_zero() {
        assert_eq!(f32_to_i32_saturating(f32::NAN), 0);
        assert_eq!(f64_to_i64_saturating(f64::NAN), 0);
    }

    #[test]
    fn saturating_conversion_clamps_out_of_range_values() {
        assert_eq!(f64_to_i32_saturating(1e20), i32::MAX);
        assert_eq!(f64_to_i32_saturating(-1e20), i32::MIN);
    }
}
