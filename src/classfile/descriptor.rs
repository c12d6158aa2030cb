//! Field and method descriptor grammar (JVMS §4.3), grounded in
//! `rsvm::classfile::descriptor::DescriptorParser`. `rsvm`'s parser
//! resolves each entry straight to a live, preloaded `JClassPtr` as it
//! walks the string; this core defers class resolution to the point of use
//! (`new`, `checkcast`, method invocation) since the field/object model
//! here stores one `JValue` slot per field regardless of declared type, so
//! a descriptor only needs to answer "how many call-frame slots does this
//! take" and "is this primitive or a reference", not a resolved size.

use super::ClassFileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Category-2 types (long, double) occupy two locals/operand-stack
    /// slots; everything else occupies one.
    pub fn slot_width(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference(_) | FieldType::Array(_))
    }

    /// The internal name this type would have as a class (`[I`, `[B`,
    /// `java/lang/String`, or a primitive's descriptor letter for atomics
    /// that still have a preloaded wrapper class, e.g. `I`).
    pub fn internal_class_name(&self) -> String {
        match self {
            FieldType::Boolean => "Z".to_string(),
            FieldType::Byte => "B".to_string(),
            FieldType::Char => "C".to_string(),
            FieldType::Short => "S".to_string(),
            FieldType::Int => "I".to_string(),
            FieldType::Long => "J".to_string(),
            FieldType::Float => "F".to_string(),
            FieldType::Double => "D".to_string(),
            FieldType::Reference(name) => name.clone(),
            FieldType::Array(elem) => format!("[{}", array_descriptor(elem)),
        }
    }
}

fn array_descriptor(elem: &FieldType) -> String {
    match elem {
        FieldType::Reference(name) => format!("L{name};"),
        FieldType::Array(inner) => format!("[{}", array_descriptor(inner)),
        other => other.internal_class_name(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` means `V` (void); only legal as a return type.
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn arg_slot_count(&self) -> u16 {
        self.params.iter().map(FieldType::slot_width).sum()
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn parse_one(&mut self) -> Result<FieldType, ClassFileError> {
        let b = self
            .next()
            .ok_or_else(|| ClassFileError::BadDescriptor("unexpected end".to_string()))?;
        match b {
            b'B' => Ok(FieldType::Byte),
            b'C' => Ok(FieldType::Char),
            b'D' => Ok(FieldType::Double),
            b'F' => Ok(FieldType::Float),
            b'I' => Ok(FieldType::Int),
            b'J' => Ok(FieldType::Long),
            b'S' => Ok(FieldType::Short),
            b'Z' => Ok(FieldType::Boolean),
            b'L' => {
                let start = self.pos;
                loop {
                    match self.next() {
                        Some(b';') => break,
                        Some(_) => continue,
                        None => {
                            return Err(ClassFileError::BadDescriptor(
                                "unterminated class reference".to_string(),
                            ))
                        }
                    }
                }
                let name = std::str::from_utf8(&self.bytes[start..self.pos - 1])
                    .map_err(|_| ClassFileError::BadDescriptor("non-utf8 class name".to_string()))?
                    .to_string();
                Ok(FieldType::Reference(name))
            }
            b'[' => Ok(FieldType::Array(Box::new(self.parse_one()?))),
            other => Err(ClassFileError::BadDescriptor(format!(
                "unexpected descriptor byte 0x{other:02x}"
            ))),
        }
    }
}

pub fn parse_field_descriptor(s: &str) -> Result<FieldType, ClassFileError> {
    let mut cur = Cursor {
        bytes: s.as_bytes(),
        pos: 0,
    };
    let ty = cur.parse_one()?;
    if cur.pos != s.len() {
        return Err(ClassFileError::BadDescriptor(format!(
            "trailing data in field descriptor {s:?}"
        )));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(s: &str) -> Result<MethodDescriptor, ClassFileError> {
    let mut cur = Cursor {
        bytes: s.as_bytes(),
        pos: 0,
    };
    if cur.next() != Some(b'(') {
        return Err(ClassFileError::BadDescriptor(format!(
            "method descriptor {s:?} must start with '('"
        )));
    }
    let mut params = Vec::new();
    loop {
        match cur.peek() {
            Some(b')') => {
                cur.next();
                break;
            }
            Some(_) => params.push(cur.parse_one()?),
            None => {
                return Err(ClassFileError::BadDescriptor(format!(
                    "unterminated parameter list in {s:?}"
                )))
            }
        }
    }
    let return_type = match cur.peek() {
        Some(b'V') => {
            cur.next();
            None
        }
        Some(_) => Some(cur.parse_one()?),
        None => {
            return Err(ClassFileError::BadDescriptor(format!(
                "missing return type in {s:?}"
            )))
        }
    };
    if cur.pos != s.len() {
        return Err(ClassFileError::BadDescriptor(format!(
            "trailing data in method descriptor {s:?}"
        )));
    }
    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_field_descriptors() {
        assert_eq!(parse_field_descriptor("I").unwrap(), FieldType::Int);
        assert_eq!(parse_field_descriptor("J").unwrap(), FieldType::Long);
        assert_eq!(parse_field_descriptor("Z").unwrap(), FieldType::Boolean);
    }

    #[test]
    fn parses_class_and_array_descriptors() {
        assert_eq!(
            parse_field_descriptor("Ljava/lang/String;").unwrap(),
            FieldType::Reference("java/lang/String".to_string())
        );
        assert_eq!(
            parse_field_descriptor("[[I").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Int))))
        );
    }

    #[test]
    fn parses_method_descriptor_with_mixed_params() {
        let d = parse_method_descriptor(
            "(ILjava/lang/String;[I)Ljava/lang/Object;",
        )
        .unwrap();
        assert_eq!(
            d.params,
            vec![
                FieldType::Int,
                FieldType::Reference("java/lang/String".to_string()),
                FieldType::Array(Box::new(FieldType::Int)),
            ]
        );
        assert_eq!(
            d.return_type,
            Some(FieldType::Reference("java/lang/Object".to_string()))
        );
    }

    #[test]
    fn void_return_type_is_none() {
        let d = parse_method_descriptor("()V").unwrap();
        assert_eq!(d.return_type, None);
        assert_eq!(d.arg_slot_count(), 0);
    }

    #[test]
    fn long_and_double_params_count_two_slots() {
        let d = parse_method_descriptor("(JD)V").unwrap();
        assert_eq!(d.arg_slot_count(), 4);
    }

    #[test]
    fn rejects_malformed_descriptor() {
        assert!(parse_field_descriptor("Q").is_err());
        assert!(parse_field_descriptor("Ljava/lang/String").is_err());
        assert!(parse_method_descriptor("(I)").is_err());
    }
}
