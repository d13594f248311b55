use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Float,
    Bool,
    Char,
    String,
    Void,
    Any,
}

impl Primitive {
    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::String => "string",
            Primitive::Void => "void",
            Primitive::Any => "any",
        }
    }
}

/// A static type: a primitive plus an optional (`?`) marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    pub primitive: Primitive,
    pub optional: bool,
}

impl Type {
    pub const INT: Type = Type::of(Primitive::Int);
    pub const FLOAT: Type = Type::of(Primitive::Float);
    pub const BOOL: Type = Type::of(Primitive::Bool);
    pub const CHAR: Type = Type::of(Primitive::Char);
    pub const STRING: Type = Type::of(Primitive::String);
    pub const VOID: Type = Type::of(Primitive::Void);
    pub const ANY: Type = Type::of(Primitive::Any);

    pub const fn of(primitive: Primitive) -> Type {
        Type {
            primitive,
            optional: false,
        }
    }

    pub const fn optional(self) -> Type {
        Type {
            optional: true,
            ..self
        }
    }

    /// Maps a source type name to its type. Unknown names are `any`.
    pub fn from_name(name: &str) -> Type {
        let primitive = match name {
            "int" | "i32" | "i64" => Primitive::Int,
            "float" | "f32" | "f64" => Primitive::Float,
            "bool" => Primitive::Bool,
            "char" => Primitive::Char,
            "string" => Primitive::String,
            "void" => Primitive::Void,
            _ => Primitive::Any,
        };
        Type::of(primitive)
    }

    /// Whether a value of this type may be stored where `target` is
    /// expected. The optional marker does not participate.
    pub fn is_compatible_with(self, target: Type) -> bool {
        use Primitive::*;
        match (self.primitive, target.primitive) {
            (Any, _) | (_, Any) => true,
            (a, b) if a == b => true,
            (Int, Float) | (Char, String) => true,
            _ => false,
        }
    }

    pub fn is(self, primitive: Primitive) -> bool {
        self.primitive == primitive
    }

    /// Bool or Any, the types accepted where a condition is expected.
    pub fn is_boolish(self) -> bool {
        matches!(self.primitive, Primitive::Bool | Primitive::Any)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primitive.name())?;
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_compatible_with() {
        use Primitive::*;
        let all = [Int, Float, Bool, Char, String, Void, Any];

        for &p in &all {
            assert!(Type::of(p).is_compatible_with(Type::of(p)), "{p:?} to itself");
            assert!(Type::ANY.is_compatible_with(Type::of(p)), "any to {p:?}");
            assert!(Type::of(p).is_compatible_with(Type::ANY), "{p:?} to any");
        }

        assert!(Type::INT.is_compatible_with(Type::FLOAT));
        assert!(!Type::FLOAT.is_compatible_with(Type::INT));
        assert!(Type::CHAR.is_compatible_with(Type::STRING));
        assert!(!Type::STRING.is_compatible_with(Type::CHAR));
        assert!(!Type::STRING.is_compatible_with(Type::INT));
        assert!(!Type::BOOL.is_compatible_with(Type::INT));
        assert!(!Type::INT.is_compatible_with(Type::BOOL));
        assert!(!Type::VOID.is_compatible_with(Type::INT));
    }

    #[test]
    fn optional_flag_is_ignored() {
        assert!(Type::INT.optional().is_compatible_with(Type::INT));
        assert!(Type::INT.is_compatible_with(Type::FLOAT.optional()));
        assert!(!Type::STRING.optional().is_compatible_with(Type::INT));
    }

    #[test]
    fn from_name() {
        assert_eq!(Type::from_name("i64"), Type::INT);
        assert_eq!(Type::from_name("f32"), Type::FLOAT);
        assert_eq!(Type::from_name("string"), Type::STRING);
        assert_eq!(Type::from_name("Widget"), Type::ANY);
    }

    #[test]
    fn display() {
        assert_eq!(Type::FLOAT.to_string(), "float");
        assert_eq!(Type::STRING.optional().to_string(), "string?");
    }
}
