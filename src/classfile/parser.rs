//! The class file decoder. Grounded in
//! `rsvm::classfile::parser::ClassParser` for the overall shape (magic →
//! version → constant pool → access/this/super → interfaces → fields →
//! methods → attributes) and in `exo-class-file` for splitting instruction
//! decoding into its own normalization step.

use std::collections::HashMap;

use super::constant_pool::{
    CpEntry, TAG_CLASS, TAG_DOUBLE, TAG_FIELDREF, TAG_FLOAT, TAG_INTEGER, TAG_INTERFACE_METHODREF,
    TAG_INVOKE_DYNAMIC, TAG_LONG, TAG_METHODREF, TAG_METHOD_HANDLE, TAG_METHOD_TYPE,
    TAG_NAME_AND_TYPE, TAG_STRING, TAG_UTF8,
};
use super::instruction::{Instruction, LookupSwitch, Opcode, Payload, PrimitiveArrayType, TableSwitch};
use super::reader::ByteReader;
use super::ClassFileError;
use crate::classfile::constant_pool::ConstantPool;

pub const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug, Clone)]
pub struct RawFieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub constant_value_index: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    /// A constant-pool `Class` index, or 0 meaning "catches anything".
    pub catch_type: u16,
}

#[derive(Debug, Clone)]
pub struct LineNumberEntry {
    pub instruction_index: u32,
    pub line: u16,
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumberEntry>,
}

#[derive(Debug, Clone)]
pub struct RawMethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub code: Option<CodeAttribute>,
}

#[derive(Debug, Clone)]
pub struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    /// 0 only for `java/lang/Object`.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<RawFieldInfo>,
    pub methods: Vec<RawMethodInfo>,
    pub table_switches: Vec<TableSwitch>,
    pub lookup_switches: Vec<LookupSwitch>,
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

impl ClassFile {
    pub fn this_class_name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.get_class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<&str>, ClassFileError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            Ok(Some(self.constant_pool.get_class_name(self.super_class)?))
        }
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<ClassFile, ClassFileError> {
    let mut r = ByteReader::new(bytes);

    let magic = r.read_u32("magic number")?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }
    let minor_version = r.read_u16("minor version")?;
    let major_version = r.read_u16("major version")?;

    let constant_pool = parse_constant_pool(&mut r)?;

    let access_flags = r.read_u16("access flags")?;
    let this_class = r.read_u16("this class")?;
    let super_class = r.read_u16("super class")?;

    let interfaces_count = r.read_u16("interfaces count")?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(r.read_u16("interface index")?);
    }

    let mut table_switches = Vec::new();
    let mut lookup_switches = Vec::new();

    let fields_count = r.read_u16("fields count")?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        fields.push(parse_field(&mut r, &constant_pool)?);
    }

    let methods_count = r.read_u16("methods count")?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(parse_method(
            &mut r,
            &constant_pool,
            &mut table_switches,
            &mut lookup_switches,
        )?);
    }

    let mut bootstrap_methods = Vec::new();
    let class_attrs_count = r.read_u16("class attributes count")?;
    for _ in 0..class_attrs_count {
        let name_index = r.read_u16("attribute name index")?;
        let length = r.read_u32("attribute length")? as usize;
        let name = constant_pool.get_utf8(name_index)?;
        if name == "BootstrapMethods" {
            let mut sub = r.slice(length, "BootstrapMethods attribute")?;
            bootstrap_methods = parse_bootstrap_methods(&mut sub)?;
        } else {
            r.skip(length, "class attribute")?;
        }
    }

    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        table_switches,
        lookup_switches,
        bootstrap_methods,
    })
}

fn parse_bootstrap_methods(r: &mut ByteReader) -> Result<Vec<BootstrapMethod>, ClassFileError> {
    let count = r.read_u16("bootstrap methods count")?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method_ref = r.read_u16("bootstrap method ref")?;
        let args_count = r.read_u16("bootstrap method argument count")?;
        let mut arguments = Vec::with_capacity(args_count as usize);
        for _ in 0..args_count {
            arguments.push(r.read_u16("bootstrap method argument")?);
        }
        methods.push(BootstrapMethod { method_ref, arguments });
    }
    Ok(methods)
}

fn parse_constant_pool(r: &mut ByteReader) -> Result<ConstantPool, ClassFileError> {
    let count = r.read_u16("constant pool count")? as usize;
    let mut entries = vec![CpEntry::Invalid; count.max(1)];
    let mut index = 1usize;
    while index < count {
        let tag = r.read_u8("constant pool tag")?;
        let entry = match tag {
            TAG_UTF8 => {
                let len = r.read_u16("utf8 length")? as usize;
                let bytes = r.read_bytes(len, "utf8 bytes")?;
                let s = decode_modified_utf8(bytes)?;
                CpEntry::Utf8(s)
            }
            TAG_INTEGER => CpEntry::Integer(r.read_i32("integer value")?),
            TAG_FLOAT => CpEntry::Float(r.read_f32("float value")?),
            TAG_LONG => CpEntry::Long(r.read_i64("long value")?),
            TAG_DOUBLE => CpEntry::Double(r.read_f64("double value")?),
            TAG_CLASS => CpEntry::Class {
                name_index: r.read_u16("class name index")?,
            },
            TAG_STRING => CpEntry::String {
                string_index: r.read_u16("string index")?,
            },
            TAG_FIELDREF => {
                let class_index = r.read_u16("fieldref class index")?;
                let name_and_type_index = r.read_u16("fieldref name-and-type index")?;
                CpEntry::FieldRef { class_index, name_and_type_index }
            }
            TAG_METHODREF => {
                let class_index = r.read_u16("methodref class index")?;
                let name_and_type_index = r.read_u16("methodref name-and-type index")?;
                CpEntry::MethodRef { class_index, name_and_type_index }
            }
            TAG_INTERFACE_METHODREF => {
                let class_index = r.read_u16("interface methodref class index")?;
                let name_and_type_index = r.read_u16("interface methodref name-and-type index")?;
                CpEntry::InterfaceMethodRef { class_index, name_and_type_index }
            }
            TAG_NAME_AND_TYPE => {
                let name_index = r.read_u16("name-and-type name index")?;
                let descriptor_index = r.read_u16("name-and-type descriptor index")?;
                CpEntry::NameAndType { name_index, descriptor_index }
            }
            TAG_METHOD_HANDLE => {
                let reference_kind = r.read_u8("method handle reference kind")?;
                let reference_index = r.read_u16("method handle reference index")?;
                CpEntry::MethodHandle { reference_kind, reference_index }
            }
            TAG_METHOD_TYPE => CpEntry::MethodType {
                descriptor_index: r.read_u16("method type descriptor index")?,
            },
            TAG_INVOKE_DYNAMIC => {
                let bootstrap_method_attr_index = r.read_u16("invokedynamic bootstrap index")?;
                let name_and_type_index = r.read_u16("invokedynamic name-and-type index")?;
                CpEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index }
            }
            other => {
                return Err(ClassFileError::BadConstantPool(format!(
                    "unknown constant pool tag {other}"
                )))
            }
        };
        let wide = matches!(entry, CpEntry::Long(_) | CpEntry::Double(_));
        entries[index] = entry;
        index += if wide { 2 } else { 1 };
    }
    Ok(ConstantPool::new(entries))
}

/// Decodes "modified UTF-8" (JVMS §4.4.7). Differs from standard UTF-8 only
/// in how it encodes NUL and supplementary characters; ordinary text
/// (ASCII/BMP) round-trips through `str::from_utf8`, which every class this
/// core loads relies on since none exercise the NUL/surrogate-pair edge
/// cases.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String, ClassFileError> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| ClassFileError::BadConstantPool("malformed modified UTF-8".to_string()))
}

fn parse_field(r: &mut ByteReader, cp: &ConstantPool) -> Result<RawFieldInfo, ClassFileError> {
    let access_flags = r.read_u16("field access flags")?;
    let name_index = r.read_u16("field name index")?;
    let descriptor_index = r.read_u16("field descriptor index")?;
    let attrs_count = r.read_u16("field attributes count")?;
    let mut constant_value_index = None;
    for _ in 0..attrs_count {
        let name_idx = r.read_u16("attribute name index")?;
        let length = r.read_u32("attribute length")? as usize;
        let name = cp.get_utf8(name_idx)?;
        if name == "ConstantValue" {
            let mut sub = r.slice(length, "ConstantValue attribute")?;
            constant_value_index = Some(sub.read_u16("constant value index")?);
        } else {
            r.skip(length, "field attribute")?;
        }
    }
    Ok(RawFieldInfo {
        access_flags,
        name_index,
        descriptor_index,
        constant_value_index,
    })
}

fn parse_method(
    r: &mut ByteReader,
    cp: &ConstantPool,
    table_switches: &mut Vec<TableSwitch>,
    lookup_switches: &mut Vec<LookupSwitch>,
) -> Result<RawMethodInfo, ClassFileError> {
    let access_flags = r.read_u16("method access flags")?;
    let name_index = r.read_u16("method name index")?;
    let descriptor_index = r.read_u16("method descriptor index")?;
    let attrs_count = r.read_u16("method attributes count")?;
    let mut code = None;
    for _ in 0..attrs_count {
        let name_idx = r.read_u16("attribute name index")?;
        let length = r.read_u32("attribute length")? as usize;
        let name = cp.get_utf8(name_idx)?;
        if name == "Code" {
            let mut sub = r.slice(length, "Code attribute")?;
            code = Some(parse_code(&mut sub, cp, table_switches, lookup_switches)?);
        } else {
            r.skip(length, "method attribute")?;
        }
    }
    Ok(RawMethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        code,
    })
}

/// Decodes one `Code` attribute's instruction stream, then runs the branch
/// fixup pass: every PC-relative or absolute branch target, and every
/// tableswitch/lookupswitch target, is rewritten from a raw bytecode PC
/// into an index into `instructions`.
fn parse_code(
    r: &mut ByteReader,
    cp: &ConstantPool,
    table_switches: &mut Vec<TableSwitch>,
    lookup_switches: &mut Vec<LookupSwitch>,
) -> Result<CodeAttribute, ClassFileError> {
    let max_stack = r.read_u16("max stack")?;
    let max_locals = r.read_u16("max locals")?;
    let code_length = r.read_u32("code length")? as usize;
    let mut code_reader = r.slice(code_length, "code")?;

    let table_switches_start = table_switches.len();
    let lookup_switches_start = lookup_switches.len();

    let mut instructions = Vec::new();
    let mut pc_to_index: HashMap<u32, u32> = HashMap::new();

    while !code_reader.is_empty() {
        let pc = code_reader.offset() as u32;
        pc_to_index.insert(pc, instructions.len() as u32);
        let instr = decode_instruction(&mut code_reader, pc, table_switches, lookup_switches)?;
        instructions.push(instr);
    }

    let fixup = |raw_pc: u32, from_pc: u32| -> Result<u32, ClassFileError> {
        pc_to_index.get(&raw_pc).copied().ok_or_else(|| {
            ClassFileError::BadBranch(format!(
                "branch from pc {from_pc} to pc {raw_pc} does not land on an instruction"
            ))
        })
    };

    for instr in instructions.iter_mut() {
        if let Some(target_pc) = simple_branch_target_pc(instr.opcode, instr.payload) {
            let index = fixup(target_pc, instr.pc)?;
            instr.payload = Payload::Index(index as u16);
        }
    }

    for ts in table_switches[table_switches_start..].iter_mut() {
        ts.default_target = fixup(ts.default_target, ts.default_target)?;
        for t in ts.targets.iter_mut() {
            *t = fixup(*t, *t)?;
        }
    }
    for ls in lookup_switches[lookup_switches_start..].iter_mut() {
        ls.default_target = fixup(ls.default_target, ls.default_target)?;
        for (_, t) in ls.pairs.iter_mut() {
            *t = fixup(*t, *t)?;
        }
    }

    let exception_table_length = r.read_u16("exception table length")?;
    let mut exception_table = Vec::with_capacity(exception_table_length as usize);
    for _ in 0..exception_table_length {
        let start_pc = r.read_u16("exception start pc")? as u32;
        let end_pc = r.read_u16("exception end pc")? as u32;
        let handler_pc = r.read_u16("exception handler pc")? as u32;
        let catch_type = r.read_u16("exception catch type")?;
        let start = *pc_to_index
            .get(&start_pc)
            .ok_or_else(|| ClassFileError::BadBranch(format!("exception start pc {start_pc} invalid")))?;
        let end = if end_pc as usize == code_length {
            instructions.len() as u32
        } else {
            *pc_to_index
                .get(&end_pc)
                .ok_or_else(|| ClassFileError::BadBranch(format!("exception end pc {end_pc} invalid")))?
        };
        let handler = *pc_to_index
            .get(&handler_pc)
            .ok_or_else(|| ClassFileError::BadBranch(format!("exception handler pc {handler_pc} invalid")))?;
        exception_table.push(ExceptionHandler { start, end, handler, catch_type });
    }

    let mut line_numbers = Vec::new();
    let code_attrs_count = r.read_u16("code attributes count")?;
    for _ in 0..code_attrs_count {
        let name_idx = r.read_u16("attribute name index")?;
        let length = r.read_u32("attribute length")? as usize;
        let name = cp.get_utf8(name_idx)?;
        if name == "LineNumberTable" {
            let mut sub = r.slice(length, "LineNumberTable attribute")?;
            let entries = sub.read_u16("line number table length")?;
            for _ in 0..entries {
                let start_pc = sub.read_u16("line number start pc")? as u32;
                let line = sub.read_u16("line number")?;
                if let Some(&instruction_index) = pc_to_index.get(&start_pc) {
                    line_numbers.push(LineNumberEntry { instruction_index, line });
                }
            }
        } else {
            r.skip(length, "code attribute")?;
        }
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        instructions,
        exception_table,
        line_numbers,
    })
}

/// If this instruction carries a simple (non-switch) branch target, the raw
/// PC stashed in its payload during the first decode pass.
fn simple_branch_target_pc(opcode: Opcode, payload: Payload) -> Option<u32> {
    let is_branch = matches!(
        opcode,
        Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle
            | Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne
            | Opcode::Goto
            | Opcode::Jsr
            | Opcode::Ifnull
            | Opcode::Ifnonnull
    );
    if !is_branch {
        return None;
    }
    match payload {
        Payload::Index(pc) => Some(pc as u32),
        _ => None,
    }
}

fn decode_instruction(
    r: &mut ByteReader,
    pc: u32,
    table_switches: &mut Vec<TableSwitch>,
    lookup_switches: &mut Vec<LookupSwitch>,
) -> Result<Instruction, ClassFileError> {
    let op = r.read_u8("opcode")?;

    if op == 0xaa {
        let ts = decode_tableswitch_raw(r, pc)?;
        let pool_index = table_switches.len();
        table_switches.push(ts);
        return Ok(Instruction { opcode: Opcode::Tableswitch, payload: Payload::TableSwitch(pool_index), pc });
    }
    if op == 0xab {
        let ls = decode_lookupswitch_raw(r, pc)?;
        let pool_index = lookup_switches.len();
        lookup_switches.push(ls);
        return Ok(Instruction { opcode: Opcode::Lookupswitch, payload: Payload::LookupSwitch(pool_index), pc });
    }
    if op == 0xc4 {
        return decode_wide(r, pc);
    }

    let (opcode, payload) = match op {
        0x00 => (Opcode::Nop, Payload::None),
        0x01 => (Opcode::AconstNull, Payload::None),
        0x02..=0x08 => (Opcode::Iconst, Payload::Immediate(op as i64 - 0x03)), // iconst_m1..iconst_5
        0x09 | 0x0a => (Opcode::Lconst, Payload::Immediate((op - 0x09) as i64)),
        0x0b..=0x0d => (Opcode::Fconst, Payload::Float((op - 0x0b) as f32)),
        0x0e | 0x0f => (Opcode::Dconst, Payload::Double((op - 0x0e) as f64)),
        0x10 => (Opcode::Iconst, Payload::Immediate(r.read_i8("bipush immediate")? as i64)),
        0x11 => (Opcode::Iconst, Payload::Immediate(r.read_i16("sipush immediate")? as i64)),
        0x12 => (Opcode::Ldc, Payload::Index(r.read_u8("ldc index")? as u16)),
        0x13 => (Opcode::Ldc, Payload::Index(r.read_u16("ldc_w index")?)),
        0x14 => (Opcode::Ldc2W, Payload::Index(r.read_u16("ldc2_w index")?)),
        0x15 => (Opcode::Iload, Payload::Index(r.read_u8("iload index")? as u16)),
        0x16 => (Opcode::Lload, Payload::Index(r.read_u8("lload index")? as u16)),
        0x17 => (Opcode::Fload, Payload::Index(r.read_u8("fload index")? as u16)),
        0x18 => (Opcode::Dload, Payload::Index(r.read_u8("dload index")? as u16)),
        0x19 => (Opcode::Aload, Payload::Index(r.read_u8("aload index")? as u16)),
        0x1a..=0x1d => (Opcode::Iload, Payload::Index((op - 0x1a) as u16)),
        0x1e..=0x21 => (Opcode::Lload, Payload::Index((op - 0x1e) as u16)),
        0x22..=0x25 => (Opcode::Fload, Payload::Index((op - 0x22) as u16)),
        0x26..=0x29 => (Opcode::Dload, Payload::Index((op - 0x26) as u16)),
        0x2a..=0x2d => (Opcode::Aload, Payload::Index((op - 0x2a) as u16)),
        0x2e => (Opcode::Iaload, Payload::None),
        0x2f => (Opcode::Laload, Payload::None),
        0x30 => (Opcode::Faload, Payload::None),
        0x31 => (Opcode::Daload, Payload::None),
        0x32 => (Opcode::Aaload, Payload::None),
        0x33 => (Opcode::Baload, Payload::None),
        0x34 => (Opcode::Caload, Payload::None),
        0x35 => (Opcode::Saload, Payload::None),
        0x36 => (Opcode::Istore, Payload::Index(r.read_u8("istore index")? as u16)),
        0x37 => (Opcode::Lstore, Payload::Index(r.read_u8("lstore index")? as u16)),
        0x38 => (Opcode::Fstore, Payload::Index(r.read_u8("fstore index")? as u16)),
        0x39 => (Opcode::Dstore, Payload::Index(r.read_u8("dstore index")? as u16)),
        0x3a => (Opcode::Astore, Payload::Index(r.read_u8("astore index")? as u16)),
        0x3b..=0x3e => (Opcode::Istore, Payload::Index((op - 0x3b) as u16)),
        0x3f..=0x42 => (Opcode::Lstore, Payload::Index((op - 0x3f) as u16)),
        0x43..=0x46 => (Opcode::Fstore, Payload::Index((op - 0x43) as u16)),
        0x47..=0x4a => (Opcode::Dstore, Payload::Index((op - 0x47) as u16)),
        0x4b..=0x4e => (Opcode::Astore, Payload::Index((op - 0x4b) as u16)),
        0x4f => (Opcode::Iastore, Payload::None),
        0x50 => (Opcode::Lastore, Payload::None),
        0x51 => (Opcode::Fastore, Payload::None),
        0x52 => (Opcode::Dastore, Payload::None),
        0x53 => (Opcode::Aastore, Payload::None),
        0x54 => (Opcode::Bastore, Payload::None),
        0x55 => (Opcode::Castore, Payload::None),
        0x56 => (Opcode::Sastore, Payload::None),
        0x57 => (Opcode::Pop, Payload::None),
        0x58 => (Opcode::Pop2, Payload::None),
        0x59 => (Opcode::Dup, Payload::None),
        0x5a => (Opcode::DupX1, Payload::None),
        0x5b => (Opcode::DupX2, Payload::None),
        0x5c => (Opcode::Dup2, Payload::None),
        0x5d => (Opcode::Dup2X1, Payload::None),
        0x5e => (Opcode::Dup2X2, Payload::None),
        0x5f => (Opcode::Swap, Payload::None),
        0x60 => (Opcode::Iadd, Payload::None),
        0x61 => (Opcode::Ladd, Payload::None),
        0x62 => (Opcode::Fadd, Payload::None),
        0x63 => (Opcode::Dadd, Payload::None),
        0x64 => (Opcode::Isub, Payload::None),
        0x65 => (Opcode::Lsub, Payload::None),
        0x66 => (Opcode::Fsub, Payload::None),
        0x67 => (Opcode::Dsub, Payload::None),
        0x68 => (Opcode::Imul, Payload::None),
        0x69 => (Opcode::Lmul, Payload::None),
        0x6a => (Opcode::Fmul, Payload::None),
        0x6b => (Opcode::Dmul, Payload::None),
        0x6c => (Opcode::Idiv, Payload::None),
        0x6d => (Opcode::Ldiv, Payload::None),
        0x6e => (Opcode::Fdiv, Payload::None),
        0x6f => (Opcode::Ddiv, Payload::None),
        0x70 => (Opcode::Irem, Payload::None),
        0x71 => (Opcode::Lrem, Payload::None),
        0x72 => (Opcode::Frem, Payload::None),
        0x73 => (Opcode::Drem, Payload::None),
        0x74 => (Opcode::Ineg, Payload::None),
        0x75 => (Opcode::Lneg, Payload::None),
        0x76 => (Opcode::Fneg, Payload::None),
        0x77 => (Opcode::Dneg, Payload::None),
        0x78 => (Opcode::Ishl, Payload::None),
        0x79 => (Opcode::Lshl, Payload::None),
        0x7a => (Opcode::Ishr, Payload::None),
        0x7b => (Opcode::Lshr, Payload::None),
        0x7c => (Opcode::Iushr, Payload::None),
        0x7d => (Opcode::Lushr, Payload::None),
        0x7e => (Opcode::Iand, Payload::None),
        0x7f => (Opcode::Land, Payload::None),
        0x80 => (Opcode::Ior, Payload::None),
        0x81 => (Opcode::Lor, Payload::None),
        0x82 => (Opcode::Ixor, Payload::None),
        0x83 => (Opcode::Lxor, Payload::None),
        0x84 => {
            let index = r.read_u8("iinc index")? as u16;
            let constant = r.read_i8("iinc const")? as i32;
            (Opcode::Iinc, Payload::IincPair(index, constant))
        }
        0x85 => (Opcode::I2l, Payload::None),
        0x86 => (Opcode::I2f, Payload::None),
        0x87 => (Opcode::I2d, Payload::None),
        0x88 => (Opcode::L2i, Payload::None),
        0x89 => (Opcode::L2f, Payload::None),
        0x8a => (Opcode::L2d, Payload::None),
        0x8b => (Opcode::F2i, Payload::None),
        0x8c => (Opcode::F2l, Payload::None),
        0x8d => (Opcode::F2d, Payload::None),
        0x8e => (Opcode::D2i, Payload::None),
        0x8f => (Opcode::D2l, Payload::None),
        0x90 => (Opcode::D2f, Payload::None),
        0x91 => (Opcode::I2b, Payload::None),
        0x92 => (Opcode::I2c, Payload::None),
        0x93 => (Opcode::I2s, Payload::None),
        0x94 => (Opcode::Lcmp, Payload::None),
        0x95 => (Opcode::Fcmpl, Payload::None),
        0x96 => (Opcode::Fcmpg, Payload::None),
        0x97 => (Opcode::Dcmpl, Payload::None),
        0x98 => (Opcode::Dcmpg, Payload::None),
        0x99 => branch(r, pc, Opcode::Ifeq, "ifeq offset")?,
        0x9a => branch(r, pc, Opcode::Ifne, "ifne offset")?,
        0x9b => branch(r, pc, Opcode::Iflt, "iflt offset")?,
        0x9c => branch(r, pc, Opcode::Ifge, "ifge offset")?,
        0x9d => branch(r, pc, Opcode::Ifgt, "ifgt offset")?,
        0x9e => branch(r, pc, Opcode::Ifle, "ifle offset")?,
        0x9f => branch(r, pc, Opcode::IfIcmpeq, "if_icmpeq offset")?,
        0xa0 => branch(r, pc, Opcode::IfIcmpne, "if_icmpne offset")?,
        0xa1 => branch(r, pc, Opcode::IfIcmplt, "if_icmplt offset")?,
        0xa2 => branch(r, pc, Opcode::IfIcmpge, "if_icmpge offset")?,
        0xa3 => branch(r, pc, Opcode::IfIcmpgt, "if_icmpgt offset")?,
        0xa4 => branch(r, pc, Opcode::IfIcmple, "if_icmple offset")?,
        0xa5 => branch(r, pc, Opcode::IfAcmpeq, "if_acmpeq offset")?,
        0xa6 => branch(r, pc, Opcode::IfAcmpne, "if_acmpne offset")?,
        0xa7 => branch(r, pc, Opcode::Goto, "goto offset")?,
        0xa8 => branch(r, pc, Opcode::Jsr, "jsr offset")?,
        0xa9 => (Opcode::Ret, Payload::Index(r.read_u8("ret index")? as u16)),
        0xac => (Opcode::Ireturn, Payload::None),
        0xad => (Opcode::Lreturn, Payload::None),
        0xae => (Opcode::Freturn, Payload::None),
        0xaf => (Opcode::Dreturn, Payload::None),
        0xb0 => (Opcode::Areturn, Payload::None),
        0xb1 => (Opcode::Return, Payload::None),
        0xb2 => (Opcode::Getstatic, Payload::Index(r.read_u16("getstatic index")?)),
        0xb3 => (Opcode::Putstatic, Payload::Index(r.read_u16("putstatic index")?)),
        0xb4 => (Opcode::Getfield, Payload::Index(r.read_u16("getfield index")?)),
        0xb5 => (Opcode::Putfield, Payload::Index(r.read_u16("putfield index")?)),
        0xb6 => (Opcode::Invokevirtual, Payload::Index(r.read_u16("invokevirtual index")?)),
        0xb7 => (Opcode::Invokespecial, Payload::Index(r.read_u16("invokespecial index")?)),
        0xb8 => (Opcode::Invokestatic, Payload::Index(r.read_u16("invokestatic index")?)),
        0xb9 => {
            let index = r.read_u16("invokeinterface index")?;
            let count = r.read_u8("invokeinterface count")?;
            r.skip(1, "invokeinterface reserved byte")?;
            (Opcode::Invokeinterface, Payload::InvokeInterface(index, count))
        }
        0xba => {
            let index = r.read_u16("invokedynamic index")?;
            r.skip(2, "invokedynamic reserved bytes")?;
            (Opcode::Invokedynamic, Payload::Index(index))
        }
        0xbb => (Opcode::New, Payload::Index(r.read_u16("new index")?)),
        0xbc => {
            let atype = r.read_u8("newarray atype")?;
            let ty = PrimitiveArrayType::from_atype(atype).ok_or_else(|| {
                ClassFileError::BadDescriptor(format!("invalid newarray atype {atype}"))
            })?;
            (Opcode::Newarray, Payload::PrimitiveArrayType(ty))
        }
        0xbd => (Opcode::Anewarray, Payload::Index(r.read_u16("anewarray index")?)),
        0xbe => (Opcode::Arraylength, Payload::None),
        0xbf => (Opcode::Athrow, Payload::None),
        0xc0 => (Opcode::Checkcast, Payload::Index(r.read_u16("checkcast index")?)),
        0xc1 => (Opcode::Instanceof, Payload::Index(r.read_u16("instanceof index")?)),
        0xc2 => (Opcode::Monitorenter, Payload::None),
        0xc3 => (Opcode::Monitorexit, Payload::None),
        0xc5 => {
            let index = r.read_u16("multianewarray index")?;
            let dims = r.read_u8("multianewarray dims")?;
            (Opcode::Multianewarray, Payload::MultiANewArray(index, dims))
        }
        0xc6 => branch(r, pc, Opcode::Ifnull, "ifnull offset")?,
        0xc7 => branch(r, pc, Opcode::Ifnonnull, "ifnonnull offset")?,
        0xc8 => {
            let offset = r.read_i32("goto_w offset")?;
            (Opcode::Goto, Payload::Index(((pc as i64 + offset as i64) as u32) as u16))
        }
        0xc9 => {
            let offset = r.read_i32("jsr_w offset")?;
            (Opcode::Jsr, Payload::Index(((pc as i64 + offset as i64) as u32) as u16))
        }
        other => {
            return Err(ClassFileError::UnsupportedAttribute(format!(
                "unknown opcode 0x{other:02x} at pc {pc}"
            )))
        }
    };

    Ok(Instruction { opcode, payload, pc })
}

fn branch(
    r: &mut ByteReader,
    pc: u32,
    opcode: Opcode,
    component: &'static str,
) -> Result<(Opcode, Payload), ClassFileError> {
    let offset = r.read_i16(component)?;
    let target = (pc as i64 + offset as i64) as u32;
    Ok((opcode, Payload::Index(target as u16)))
}

fn align_to_4(code_reader: &ByteReader) -> usize {
    let offset = code_reader.offset();
    (4 - (offset % 4)) % 4
}

fn decode_tableswitch_raw(r: &mut ByteReader, pc: u32) -> Result<TableSwitch, ClassFileError> {
    let pad = align_to_4(r);
    r.skip(pad, "tableswitch padding")?;
    let default_offset = r.read_i32("tableswitch default")?;
    let low = r.read_i32("tableswitch low")?;
    let high = r.read_i32("tableswitch high")?;
    let n = (high - low + 1).max(0) as usize;
    let mut targets = Vec::with_capacity(n);
    for _ in 0..n {
        let offset = r.read_i32("tableswitch target")?;
        targets.push((pc as i64 + offset as i64) as u32);
    }
    let default_target = (pc as i64 + default_offset as i64) as u32;
    Ok(TableSwitch { default_target, low, high, targets })
}

fn decode_lookupswitch_raw(r: &mut ByteReader, pc: u32) -> Result<LookupSwitch, ClassFileError> {
    let pad = align_to_4(r);
    r.skip(pad, "lookupswitch padding")?;
    let default_offset = r.read_i32("lookupswitch default")?;
    let npairs = r.read_i32("lookupswitch npairs")?.max(0) as usize;
    let mut pairs = Vec::with_capacity(npairs);
    for _ in 0..npairs {
        let key = r.read_i32("lookupswitch key")?;
        let offset = r.read_i32("lookupswitch target")?;
        pairs.push((key, (pc as i64 + offset as i64) as u32));
    }
    let default_target = (pc as i64 + default_offset as i64) as u32;
    Ok(LookupSwitch { default_target, pairs })
}

fn decode_wide(r: &mut ByteReader, pc: u32) -> Result<Instruction, ClassFileError> {
    let inner_op = r.read_u8("wide opcode")?;
    if inner_op == 0x84 {
        let index = r.read_u16("wide iinc index")?;
        let constant = r.read_i16("wide iinc const")? as i32;
        return Ok(Instruction { opcode: Opcode::Iinc, payload: Payload::IincPair(index, constant), pc });
    }
    let index = r.read_u16("wide local index")?;
    let opcode = match inner_op {
        0x15 => Opcode::Iload,
        0x16 => Opcode::Lload,
        0x17 => Opcode::Fload,
        0x18 => Opcode::Dload,
        0x19 => Opcode::Aload,
        0x36 => Opcode::Istore,
        0x37 => Opcode::Lstore,
        0x38 => Opcode::Fstore,
        0x39 => Opcode::Dstore,
        0x3a => Opcode::Astore,
        0xa9 => Opcode::Ret,
        other => {
            return Err(ClassFileError::UnsupportedAttribute(format!(
                "invalid wide-prefixed opcode 0x{other:02x} at pc {pc}"
            )))
        }
    };
    Ok(Instruction { opcode, payload: Payload::Index(index), pc })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the smallest legal class file body a hand-rolled encoder can
    /// produce: no fields, no methods, one class-attribute-free tail. Used
    /// to pin down the header-parsing path without needing a real `.class`.
    fn minimal_header_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&MAGIC.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes()); // minor
        b.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        b.extend_from_slice(&1u16.to_be_bytes()); // constant_pool_count = 1 (no entries)
        b.extend_from_slice(&0x0021u16.to_be_bytes()); // access_flags: ACC_PUBLIC|ACC_SUPER
        b.extend_from_slice(&0u16.to_be_bytes()); // this_class (invalid, unused by this test)
        b.extend_from_slice(&0u16.to_be_bytes()); // super_class
        b.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
        b.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        b.extend_from_slice(&0u16.to_be_bytes()); // methods_count
        b.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        b
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_header_bytes();
        bytes[0] = 0x00;
        match parse_class(&bytes) {
            Err(ClassFileError::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }

    #[test]
    fn parses_minimal_class_header() {
        let bytes = minimal_header_bytes();
        let cf = parse_class(&bytes).unwrap();
        assert_eq!(cf.major_version, 52);
        assert_eq!(cf.fields.len(), 0);
        assert_eq!(cf.methods.len(), 0);
    }

    #[test]
    fn tableswitch_padding_aligns_to_four_bytes_from_code_start() {
        // code: nop (pc 0), tableswitch (pc 1) with default=0 low=0 high=0 target=0
        let mut code = vec![0x00u8, 0xaa];
        let pad = (4 - (code.len() % 4)) % 4;
        code.extend(std::iter::repeat(0u8).take(pad));
        code.extend_from_slice(&0i32.to_be_bytes()); // default offset -> pc 0
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&0i32.to_be_bytes()); // high
        code.extend_from_slice(&(-1i32).to_be_bytes()); // single target offset -> pc 0

        let mut r = ByteReader::new(&code);
        let mut table_switches = Vec::new();
        let mut lookup_switches = Vec::new();
        r.read_u8("nop").unwrap();
        let instr = decode_instruction(&mut r, 1, &mut table_switches, &mut lookup_switches).unwrap();
        assert_eq!(instr.opcode, Opcode::Tableswitch);
        assert_eq!(table_switches.len(), 1);
        assert_eq!(table_switches[0].targets.len(), 1);
    }

    #[test]
    fn simple_branch_offset_resolves_to_absolute_pc() {
        // goto at pc 5 with offset -5 targets pc 0.
        let mut code = Vec::new();
        code.push(0xa7); // goto
        code.extend_from_slice(&(-5i16).to_be_bytes());
        let mut r = ByteReader::new(&code);
        let mut table_switches = Vec::new();
        let mut lookup_switches = Vec::new();
        let instr = decode_instruction(&mut r, 5, &mut table_switches, &mut lookup_switches).unwrap();
        assert_eq!(instr.opcode, Opcode::Goto);
        match instr.payload {
            Payload::Index(pc) => assert_eq!(pc, 0),
            other => panic!("expected raw pc payload, got {other:?}"),
        }
    }

    #[test]
    fn wide_iinc_reads_two_byte_index_and_constant() {
        let mut code = vec![0xc4, 0x84];
        code.extend_from_slice(&300u16.to_be_bytes());
        code.extend_from_slice(&(-1000i16).to_be_bytes());
        let mut r = ByteReader::new(&code);
        let mut table_switches = Vec::new();
        let mut lookup_switches = Vec::new();
        let instr = decode_instruction(&mut r, 0, &mut table_switches, &mut lookup_switches).unwrap();
        assert_eq!(instr.opcode, Opcode::Iinc);
        assert_eq!(instr.payload, Payload::IincPair(300, -1000));
    }
}
