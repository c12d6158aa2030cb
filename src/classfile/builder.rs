//! A hand-rolled `.class` byte encoder, used only by tests to construct
//! minimal valid class files without a Java compiler on hand. Grounded in
//! `rsvm::test::class_builder`'s role (a crate-private test-only class
//! assembler) and the exact wire format `classfile::parser::parse_class`
//! decodes, so this is effectively that decoder run backwards by hand.

use super::parser::MAGIC;

/// One constant-pool entry as raw bytes, tag-prefixed, ready to append.
enum Entry {
    Utf8(String),
    Class { name_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String { string_index: u16 },
}

pub struct ConstantPoolBuilder {
    entries: Vec<Entry>,
}

impl ConstantPoolBuilder {
    pub fn new() -> Self {
        ConstantPoolBuilder { entries: Vec::new() }
    }

    fn push(&mut self, entry: Entry) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16 // 1-based; entry just pushed is index len()
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        self.push(Entry::Utf8(s.to_string()))
    }

    pub fn class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.utf8(internal_name);
        self.push(Entry::Class { name_index })
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(Entry::NameAndType { name_index, descriptor_index })
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat_index = self.name_and_type(name, descriptor);
        self.push(Entry::Fieldref { class_index, name_and_type_index: nat_index })
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat_index = self.name_and_type(name, descriptor);
        self.push(Entry::Methodref { class_index, name_and_type_index: nat_index })
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        self.push(Entry::Integer(v))
    }

    pub fn long(&mut self, v: i64) -> u16 {
        // Long/Double occupy two slots; the entry after is a dead padding
        // slot the reader skips over (JVMS 4.4.5).
        let index = self.push(Entry::Long(v));
        self.entries.push(Entry::Utf8(String::new()));
        index
    }

    pub fn float(&mut self, v: f32) -> u16 {
        self.push(Entry::Float(v))
    }

    pub fn double(&mut self, v: f64) -> u16 {
        let index = self.push(Entry::Double(v));
        self.entries.push(Entry::Utf8(String::new()));
        index
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let string_index = self.utf8(s);
        self.push(Entry::String { string_index })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        for entry in &self.entries {
            match entry {
                Entry::Utf8(s) => {
                    out.push(1);
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Entry::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Entry::Float(v) => {
                    out.push(4);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Entry::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Entry::Double(v) => {
                    out.push(6);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Entry::Class { name_index } => {
                    out.push(7);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
                Entry::String { string_index } => {
                    out.push(8);
                    out.extend_from_slice(&string_index.to_be_bytes());
                }
                Entry::Fieldref { class_index, name_and_type_index } => {
                    out.push(9);
                    out.extend_from_slice(&class_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Entry::Methodref { class_index, name_and_type_index } => {
                    out.push(10);
                    out.extend_from_slice(&class_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Entry::NameAndType { name_index, descriptor_index } => {
                    out.push(12);
                    out.extend_from_slice(&name_index.to_be_bytes());
                    out.extend_from_slice(&descriptor_index.to_be_bytes());
                }
            }
        }
    }
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FieldSpec {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
}

pub struct MethodSpec {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// `None` for abstract/native methods, which have no `Code` attribute.
    pub code: Option<CodeSpec>,
}

pub struct CodeSpec {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    pub exception_table: Vec<ExceptionSpec>,
}

pub struct ExceptionSpec {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Assembles a complete `.class` file byte-for-byte. Every field not
/// explicitly set defaults to the simplest legal value (no interfaces, no
/// fields, `ACC_PUBLIC | ACC_SUPER`, superclass `java/lang/Object`).
pub struct ClassBuilder {
    pub pool: ConstantPoolBuilder,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    code_attr_name: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

impl ClassBuilder {
    pub fn new(this_name: &str, super_name: Option<&str>) -> Self {
        let mut pool = ConstantPoolBuilder::new();
        let this_class = pool.class(this_name);
        let super_class = super_name.map(|s| pool.class(s)).unwrap_or(0);
        let code_attr_name = pool.utf8("Code");
        ClassBuilder {
            pool,
            access_flags: 0x0021, // ACC_PUBLIC | ACC_SUPER
            this_class,
            super_class,
            code_attr_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn add_interface(mut self, iface_class_index: u16) -> Self {
        self.interfaces.push(iface_class_index);
        self
    }

    pub fn add_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn add_method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major: Java 8

        self.pool.write(&mut out);

        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for iface in &self.interfaces {
            out.extend_from_slice(&iface.to_be_bytes());
        }

        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for field in &self.fields {
            out.extend_from_slice(&field.access_flags.to_be_bytes());
            out.extend_from_slice(&field.name_index.to_be_bytes());
            out.extend_from_slice(&field.descriptor_index.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        }

        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(&method.access_flags.to_be_bytes());
            out.extend_from_slice(&method.name_index.to_be_bytes());
            out.extend_from_slice(&method.descriptor_index.to_be_bytes());
            match &method.code {
                Some(code) => {
                    out.extend_from_slice(&1u16.to_be_bytes()); // attributes_count
                    write_code_attribute(&mut out, self.code_attr_name, code);
                }
                None => out.extend_from_slice(&0u16.to_be_bytes()),
            }
        }

        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes_count
        out
    }
}

fn write_code_attribute(out: &mut Vec<u8>, code_attr_name: u16, code: &CodeSpec) {
    let mut body = Vec::new();
    body.extend_from_slice(&code.max_stack.to_be_bytes());
    body.extend_from_slice(&code.max_locals.to_be_bytes());
    body.extend_from_slice(&(code.bytes.len() as u32).to_be_bytes());
    body.extend_from_slice(&code.bytes);
    body.extend_from_slice(&(code.exception_table.len() as u16).to_be_bytes());
    for handler in &code.exception_table {
        body.extend_from_slice(&handler.start_pc.to_be_bytes());
        body.extend_from_slice(&handler.end_pc.to_be_bytes());
        body.extend_from_slice(&handler.handler_pc.to_be_bytes());
        body.extend_from_slice(&handler.catch_type.to_be_bytes());
    }
    body.extend_from_slice(&0u16.to_be_bytes()); // Code's own attributes_count

    out.extend_from_slice(&code_attr_name.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::parser::parse_class;

    #[test]
    fn builds_a_parseable_minimal_class() {
        let bytes = ClassBuilder::new("Hello", Some("java/lang/Object")).build();
        let class_file = parse_class(&bytes).unwrap();
        assert_eq!(class_file.this_class_name().unwrap(), "Hello");
        assert_eq!(class_file.super_class_name().unwrap(), Some("java/lang/Object"));
    }
}
