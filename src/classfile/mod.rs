#[cfg(test)]
pub mod builder;
pub mod class_loader;
pub mod constant_pool;
pub mod descriptor;
pub mod instruction;
pub mod parser;
pub mod reader;

/// Errors raised while decoding or linking a class file. Kept as a plain
/// enum rather than a `thiserror` derive, matching `rsvm`'s `ClassLoadErr`
/// (itself hand-rolled, `Debug`-only).
#[derive(Debug, Clone)]
pub enum ClassFileError {
    /// `UnexpectedEnd`: the byte reader ran past the end of its span while
    /// reading the named logical component.
    UnexpectedEnd { component: &'static str },
    /// Magic number wasn't `0xCAFEBABE`.
    BadMagic(u32),
    /// A constant-pool index was out of range or had the wrong tag.
    BadConstantPool(String),
    /// A field or method descriptor failed the grammar in JVMS §4.3.
    BadDescriptor(String),
    /// A branch offset (if/goto/jsr/switch target, or exception handler
    /// bound) didn't land on an instruction boundary.
    BadBranch(String),
    /// An attribute this decoder doesn't understand but must reject rather
    /// than silently accept (currently unused — unrecognized top-level
    /// attributes are skipped; this variant is kept for attributes whose
    /// *shape* this decoder partially relies on, like a malformed `Code`).
    UnsupportedAttribute(String),
}

impl std::fmt::Display for ClassFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassFileError::UnexpectedEnd { component } => {
                write!(f, "unexpected end of class file while reading {component}")
            }
            ClassFileError::BadMagic(magic) => write!(f, "bad magic number: 0x{magic:08x}"),
            ClassFileError::BadConstantPool(msg) => write!(f, "bad constant pool: {msg}"),
            ClassFileError::BadDescriptor(msg) => write!(f, "bad descriptor: {msg}"),
            ClassFileError::BadBranch(msg) => write!(f, "bad branch target: {msg}"),
            ClassFileError::UnsupportedAttribute(msg) => write!(f, "unsupported attribute: {msg}"),
        }
    }
}

impl std::error::Error for ClassFileError {}
