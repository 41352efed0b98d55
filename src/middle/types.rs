//! The type system: `void`, `i1`, `i32`, fixed-shape arrays, and pointers.

/// A MiniC type.
///
/// `Array { count: 0, .. }` is reserved for array-as-pointer parameters
/// (an array type degraded to a pointer at function-definition time, see
/// the parameter-lowering notes in `middle::lower`); every other array has
/// `count >= 1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int32,
    Array { element: Box<Type>, count: u32 },
    Pointer { pointee: Box<Type> },
}

impl Type {
    pub fn array(element: Type, count: u32) -> Type {
        Type::Array {
            element: Box::new(element),
            count,
        }
    }

    pub fn pointer(pointee: Type) -> Type {
        Type::Pointer {
            pointee: Box::new(pointee),
        }
    }

    /// Size in bytes. `count = 0` (an array-parameter pointer) has the size
    /// of a pointer, not of the array it decayed from.
    pub fn size_of(&self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Bool | Type::Int32 | Type::Pointer { .. } => 4,
            Type::Array { count: 0, .. } => 4,
            Type::Array { element, count } => element.size_of() * count,
        }
    }

    pub fn is_array_param(&self) -> bool {
        matches!(self, Type::Array { count: 0, .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// The type one subscript away from this one, if this is an array or
    /// pointer.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array { element, .. } => Some(element),
            Type::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    /// Degrade an array type to the pointer-shaped parameter form used for
    /// array-valued formal parameters (§4.3 of the design).
    pub fn decay_to_param(&self) -> Type {
        match self {
            Type::Array { element, .. } => Type::Array {
                element: element.clone(),
                count: 0,
            },
            other => other.clone(),
        }
    }

    /// The dimensions of a (possibly multi-dimensional) array type,
    /// outermost first. Empty for non-array types.
    pub fn dimensions(&self) -> Vec<u32> {
        let mut dims = Vec::new();
        let mut cur = self;
        while let Type::Array { element, count } = cur {
            dims.push(*count);
            cur = element;
        }
        dims
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "i1"),
            Type::Int32 => write!(f, "i32"),
            Type::Pointer { pointee } => write!(f, "{pointee}*"),
            // An array-as-pointer parameter prints exactly like a pointer.
            Type::Array { element, count: 0 } => write!(f, "{element}*"),
            Type::Array { element, count } => write!(f, "[{count} x {element}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes() {
        assert_eq!(Type::Void.size_of(), 0);
        assert_eq!(Type::Bool.size_of(), 4);
        assert_eq!(Type::Int32.size_of(), 4);
        assert_eq!(Type::pointer(Type::Int32).size_of(), 4);
    }

    #[test]
    fn array_size_is_product_of_dims() {
        let a = Type::array(Type::array(Type::Int32, 4), 3);
        assert_eq!(a.size_of(), 4 * 4 * 3);
        assert_eq!(a.dimensions(), vec![3, 4]);
    }

    #[test]
    fn array_param_decays_to_pointer_sized_type() {
        let arr = Type::array(Type::Int32, 4);
        let param = arr.decay_to_param();
        assert!(param.is_array_param());
        assert_eq!(param.size_of(), 4);
        assert_eq!(param.to_string(), "i32*");
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::Int32.to_string(), "i32");
        assert_eq!(Type::Bool.to_string(), "i1");
        assert_eq!(Type::pointer(Type::Int32).to_string(), "i32*");
        assert_eq!(Type::array(Type::Int32, 4).to_string(), "[4 x i32]");
    }
}
