//! Field and method descriptors (JVMS §4.3).

use std::fmt;
use std::str::FromStr;

use crate::types::ClassFileError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Internal class name, e.g. `java/lang/String`.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn object(internal_name: &str) -> Self {
        FieldType::Object(internal_name.to_string())
    }

    /// Operand stack / local variable slots taken by a value of this type.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    fn parse_at(text: &str, pos: &mut usize) -> Result<Self, ClassFileError> {
        let bytes = text.as_bytes();
        let invalid = || ClassFileError::InvalidDescriptor(text.to_string());
        let mut dims = 0usize;
        while bytes.get(*pos) == Some(&b'[') {
            dims += 1;
            *pos += 1;
        }
        if dims > 255 {
            return Err(invalid());
        }
        let base = match bytes.get(*pos).ok_or_else(invalid)? {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            b'L' => {
                let start = *pos + 1;
                let len = text[start..].find(';').ok_or_else(invalid)?;
                let name = &text[start..start + len];
                if name.is_empty() || name.contains(['.', '[']) {
                    return Err(invalid());
                }
                *pos = start + len;
                FieldType::Object(name.to_string())
            }
            _ => return Err(invalid()),
        };
        *pos += 1;
        Ok((0..dims).fold(base, |inner, _| FieldType::Array(Box::new(inner))))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(inner) => write!(f, "[{}", inner),
        }
    }
}

impl FromStr for FieldType {
    type Err = ClassFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pos = 0;
        let ty = FieldType::parse_at(s, &mut pos)?;
        if pos != s.len() {
            return Err(ClassFileError::InvalidDescriptor(s.to_string()));
        }
        Ok(ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Void,
    Value(FieldType),
}

impl ReturnType {
    pub fn slots(&self) -> u16 {
        match self {
            ReturnType::Void => 0,
            ReturnType::Value(ty) => ty.slots(),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Value(ty) => ty.fmt(f),
        }
    }
}

/// Ordered parameter types plus return type of one method overload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub ret: ReturnType,
}

impl MethodDescriptor {
    pub fn new(params: Vec<FieldType>, ret: ReturnType) -> Self {
        Self { params, ret }
    }

    /// Slots popped for the arguments (excluding any receiver).
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            param.fmt(f)?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodDescriptor {
    type Err = ClassFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClassFileError::InvalidDescriptor(s.to_string());
        let bytes = s.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid());
        }
        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => break,
                Some(_) => params.push(FieldType::parse_at(s, &mut pos)?),
                None => return Err(invalid()),
            }
        }
        pos += 1;
        let ret = if &s[pos..] == "V" {
            ReturnType::Void
        } else {
            ReturnType::Value(s[pos..].parse().map_err(|_| invalid())?)
        };
        Ok(Self { params, ret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_halt_descriptor() {
        let d: MethodDescriptor = "(I)V".parse().unwrap();
        assert_eq!(d.params, vec![FieldType::Int]);
        assert_eq!(d.ret, ReturnType::Void);
        assert_eq!(d.to_string(), "(I)V");
    }

    #[test]
    fn parses_object_and_array_types() {
        let d: MethodDescriptor = "([Ljava/lang/ProcessBuilder$Redirect;J)Ljava/lang/Process;"
            .parse()
            .unwrap();
        assert_eq!(
            d.params,
            vec![
                FieldType::Array(Box::new(FieldType::object("java/lang/ProcessBuilder$Redirect"))),
                FieldType::Long,
            ]
        );
        assert_eq!(d.ret, ReturnType::Value(FieldType::object("java/lang/Process")));
        assert_eq!(d.param_slots(), 3);
    }

    #[test]
    fn display_round_trips() {
        for text in ["()V", "(Ljava/lang/CharSequence;Ljava/lang/Iterable;)Ljava/lang/String;", "([[IDZ)[J"] {
            let d: MethodDescriptor = text.parse().unwrap();
            assert_eq!(d.to_string(), text);
        }
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for text in ["", "I)V", "(I", "(I)", "(L;)V", "(Ljava.lang.String;)V", "(Q)V", "(I)VV"] {
            assert!(text.parse::<MethodDescriptor>().is_err(), "{text} should not parse");
        }
        assert!("II".parse::<FieldType>().is_err());
        assert!("Ljava/lang/String".parse::<FieldType>().is_err());
    }
}
