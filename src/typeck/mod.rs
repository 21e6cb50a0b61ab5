pub mod fold;
pub mod infer;

use serde::Serialize;

use crate::parser::ast::{BaseType, Type, Value};

/// The set of primitive runtime types an expression may produce, plus an
/// `undefined` flag for possibly-uninitialized variables, plus an optional
/// attached constant (the memoized folded value).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UnionType {
    pub is_int: bool,
    pub is_float: bool,
    pub is_string: bool,
    pub is_bool: bool,
    pub is_null: bool,
    pub is_undefined: bool,
    pub constant: Option<Value>,
}

impl UnionType {
    pub fn empty() -> Self {
        UnionType::default()
    }

    pub fn undefined_only() -> Self {
        UnionType { is_undefined: true, ..Default::default() }
    }

    /// All five concrete runtime types; what a fully dynamic expression
    /// (a non-built-in call) may produce.
    pub fn dynamic() -> Self {
        UnionType {
            is_int: true,
            is_float: true,
            is_string: true,
            is_bool: true,
            is_null: true,
            ..Default::default()
        }
    }

    pub fn of_base(base: BaseType) -> Self {
        let mut ty = UnionType::empty();
        match base {
            BaseType::Int => ty.is_int = true,
            BaseType::Float => ty.is_float = true,
            BaseType::String => ty.is_string = true,
            BaseType::Bool => ty.is_bool = true,
            BaseType::Null => ty.is_null = true,
            BaseType::Void => {}
            BaseType::Unknown => return UnionType::dynamic(),
        }
        ty
    }

    /// Lossless `Type` → `UnionType`: the base's flag plus null when the
    /// type is not required.
    pub fn from_type(ty: Type) -> Self {
        let mut u = UnionType::of_base(ty.base);
        if !ty.required {
            u.is_null = true;
        }
        u
    }

    /// Exact only when a single non-null flag is set; otherwise `Unknown`.
    pub fn to_type(&self) -> Type {
        if self.is_undefined {
            return Type::required(BaseType::Unknown);
        }
        let concrete: Vec<BaseType> = [
            (self.is_int, BaseType::Int),
            (self.is_float, BaseType::Float),
            (self.is_string, BaseType::String),
            (self.is_bool, BaseType::Bool),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, b)| *b)
        .collect();
        match concrete.as_slice() {
            [base] => Type::new(*base, !self.is_null),
            [] if self.is_null => Type::required(BaseType::Null),
            _ => Type::required(BaseType::Unknown),
        }
    }

    pub fn with_constant(mut self, value: Value) -> Self {
        self.constant = Some(value);
        self
    }

    pub fn union(&self, other: &UnionType) -> UnionType {
        UnionType {
            is_int: self.is_int || other.is_int,
            is_float: self.is_float || other.is_float,
            is_string: self.is_string || other.is_string,
            is_bool: self.is_bool || other.is_bool,
            is_null: self.is_null || other.is_null,
            is_undefined: self.is_undefined || other.is_undefined,
            constant: match (&self.constant, &other.constant) {
                (Some(a), Some(b)) if a == b => Some(a.clone()),
                // An empty side keeps the other side's constant.
                (Some(a), None) if other.flag_count() == 0 && !other.is_undefined => Some(a.clone()),
                (None, Some(b)) if self.flag_count() == 0 && !self.is_undefined => Some(b.clone()),
                _ => None,
            },
        }
    }

    pub fn flag_count(&self) -> usize {
        [self.is_int, self.is_float, self.is_string, self.is_bool, self.is_null]
            .iter()
            .filter(|f| **f)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.flag_count() == 0 && !self.is_undefined
    }

    /// The single concrete runtime type, when static knowledge pins one
    /// down (and the value cannot be undefined).
    pub fn single_base(&self) -> Option<BaseType> {
        if self.is_undefined || self.flag_count() != 1 {
            return None;
        }
        self.possible_bases().into_iter().next()
    }

    pub fn may_be(&self, base: BaseType) -> bool {
        match base {
            BaseType::Int => self.is_int,
            BaseType::Float => self.is_float,
            BaseType::String => self.is_string,
            BaseType::Bool => self.is_bool,
            BaseType::Null => self.is_null,
            _ => false,
        }
    }

    /// Possible concrete types in runtime-dispatch order: Bool, Null, Int,
    /// Float, String.
    pub fn possible_bases(&self) -> Vec<BaseType> {
        let mut bases = Vec::new();
        if self.is_bool {
            bases.push(BaseType::Bool);
        }
        if self.is_null {
            bases.push(BaseType::Null);
        }
        if self.is_int {
            bases.push(BaseType::Int);
        }
        if self.is_float {
            bases.push(BaseType::Float);
        }
        if self.is_string {
            bases.push(BaseType::String);
        }
        bases
    }

    /// True when every runtime type this union allows is also allowed by
    /// `other` (undefined never satisfies anything).
    pub fn subset_of(&self, other: &UnionType) -> bool {
        if self.is_undefined {
            return false;
        }
        (!self.is_int || other.is_int)
            && (!self.is_float || other.is_float)
            && (!self.is_string || other.is_string)
            && (!self.is_bool || other.is_bool)
            && (!self.is_null || other.is_null)
    }
}

impl std::fmt::Display for UnionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.is_int {
            parts.push("int");
        }
        if self.is_float {
            parts.push("float");
        }
        if self.is_string {
            parts.push("string");
        }
        if self.is_bool {
            parts.push("bool");
        }
        if self.is_null {
            parts.push("null");
        }
        if self.is_undefined {
            parts.push("undefined");
        }
        if parts.is_empty() {
            parts.push("void");
        }
        write!(f, "{}", parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_to_union_roundtrip() {
        let ty = Type::nullable(BaseType::Int);
        let u = UnionType::from_type(ty);
        assert!(u.is_int && u.is_null && !u.is_float);
        assert_eq!(u.to_type(), ty);

        let ty = Type::required(BaseType::String);
        assert_eq!(UnionType::from_type(ty).to_type(), ty);
    }

    #[test]
    fn union_to_type_inexact_is_unknown() {
        let u = UnionType::of_base(BaseType::Int).union(&UnionType::of_base(BaseType::Float));
        assert_eq!(u.to_type().base, BaseType::Unknown);
    }

    #[test]
    fn single_base() {
        assert_eq!(UnionType::of_base(BaseType::Float).single_base(), Some(BaseType::Float));
        assert_eq!(UnionType::dynamic().single_base(), None);
        let mut undef = UnionType::of_base(BaseType::Int);
        undef.is_undefined = true;
        assert_eq!(undef.single_base(), None);
    }

    #[test]
    fn dispatch_order_is_bool_null_int_float_string() {
        let u = UnionType::dynamic();
        assert_eq!(
            u.possible_bases(),
            vec![BaseType::Bool, BaseType::Null, BaseType::Int, BaseType::Float, BaseType::String]
        );
    }

    #[test]
    fn union_merges_flags_and_constants() {
        let a = UnionType::of_base(BaseType::Int).with_constant(Value::Int(1));
        let b = UnionType::of_base(BaseType::Int).with_constant(Value::Int(1));
        assert_eq!(a.union(&b).constant, Some(Value::Int(1)));

        let c = UnionType::of_base(BaseType::Int).with_constant(Value::Int(2));
        assert_eq!(a.union(&c).constant, None);

        assert_eq!(a.union(&UnionType::empty()).constant, Some(Value::Int(1)));
    }

    #[test]
    fn subset_of_handles_undefined() {
        let int = UnionType::of_base(BaseType::Int);
        let int_or_null = UnionType::from_type(Type::nullable(BaseType::Int));
        assert!(int.subset_of(&int_or_null));
        assert!(!int_or_null.subset_of(&int));
        assert!(!UnionType::undefined_only().subset_of(&UnionType::dynamic()));
    }
}
