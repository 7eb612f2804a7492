//! The closed set of values that can cross the testing boundary.

use std::any::Any;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::complexity::Complexity;

/// A tracked object under test.
///
/// Identity is storage identity: two `Instance` handles refer to the same
/// receiver exactly when [`same_instance`] returns true. Callables alias a
/// tracked receiver by returning a clone of the same handle.
pub type Instance = Rc<RefCell<dyn Any>>;

/// Wraps a concrete object as a tracked [`Instance`].
pub fn instance_of<T: 'static>(value: T) -> Instance {
    Rc::new(RefCell::new(value))
}

/// Whether two handles point at the same storage location.
pub fn same_instance(a: &Instance, b: &Instance) -> bool {
    Rc::ptr_eq(a, b)
}

/// A value that can be generated, passed to operations, returned, and
/// compared.
///
/// `Clone` produces an independent deep copy; mutation through one copy is
/// never visible through another. Equality follows structural rules:
/// floats compare by bit pattern with all NaNs considered equal, sets and
/// maps compare without regard to order, lists and arrays compare
/// elementwise in order.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    List(Vec<Value>),
    SetOf(Vec<Value>),
    MapOf(Vec<(Value, Value)>),
    Array(Vec<Value>),
    /// Reference to a tracked receiver by pool index.
    Receiver(usize),
    /// An opaque placeholder object distinguishable only by its tag.
    Token(i32),
}

fn f32_bits(value: f32) -> u32 {
    if value.is_nan() {
        f32::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

fn f64_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

fn unordered_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for item in a {
        let mut found = false;
        for (index, candidate) in b.iter().enumerate() {
            if !used[index] && item == candidate {
                used[index] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

fn unordered_map_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for (key, value) in a {
        let mut found = false;
        for (index, (other_key, other_value)) in b.iter().enumerate() {
            if !used[index] && key == other_key && value == other_value {
                used[index] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => f32_bits(*a) == f32_bits(*b),
            (Double(a), Double(b)) => f64_bits(*a) == f64_bits(*b),
            (Char(a), Char(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (SetOf(a), SetOf(b)) => unordered_eq(a, b),
            (MapOf(a), MapOf(b)) => unordered_map_eq(a, b),
            (Receiver(a), Receiver(b)) => a == b,
            (Token(a), Token(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

fn hash_of(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Boolean(v) => v.hash(state),
            Byte(v) => v.hash(state),
            Short(v) => v.hash(state),
            Int(v) => v.hash(state),
            Long(v) => v.hash(state),
            Float(v) => f32_bits(*v).hash(state),
            Double(v) => f64_bits(*v).hash(state),
            Char(v) => v.hash(state),
            Str(v) => v.hash(state),
            List(items) | Array(items) => items.hash(state),
            SetOf(items) => {
                // Order-insensitive: hash the sorted element hashes.
                let mut hashes: Vec<u64> = items.iter().map(hash_of).collect();
                hashes.sort_unstable();
                hashes.hash(state);
            }
            MapOf(entries) => {
                let mut hashes: Vec<(u64, u64)> = entries
                    .iter()
                    .map(|(key, value)| (hash_of(key), hash_of(value)))
                    .collect();
                hashes.sort_unstable();
                hashes.hash(state);
            }
            Receiver(index) => index.hash(state),
            Token(tag) => tag.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Value::*;
        match self {
            Null => write!(f, "null"),
            Boolean(v) => write!(f, "{v}"),
            Byte(v) => write!(f, "{v}"),
            Short(v) => write!(f, "{v}"),
            Int(v) => write!(f, "{v}"),
            Long(v) => write!(f, "{v}"),
            Float(v) => write!(f, "{v}"),
            Double(v) => write!(f, "{v}"),
            Char(v) => write!(f, "{v}"),
            Str(v) => write!(f, "{v}"),
            List(items) | Array(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            SetOf(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            MapOf(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                write!(f, "}}")
            }
            Receiver(index) => write!(f, "Receiver#{index}"),
            Token(tag) => write!(f, "Object@{tag:x}"),
        }
    }
}

/// Renders a sequence of values the way they would appear in a call.
pub fn print_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Declared type of an operation parameter or generated value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Str,
    List(Box<ValueType>),
    SetOf(Box<ValueType>),
    MapOf(Box<ValueType>, Box<ValueType>),
    Array(Box<ValueType>),
    /// The receiver type under test.
    Receiver,
    /// Any value at all, including receivers and opaque tokens.
    Any,
}

impl ValueType {
    /// Whether `value` inhabits this declared type.
    ///
    /// `Null` is accepted everywhere except the primitive slots, matching
    /// reference-type nullability.
    pub fn accepts(&self, value: &Value) -> bool {
        use ValueType as T;
        match (self, value) {
            (T::Any, _) => true,
            (T::Boolean, Value::Boolean(_)) => true,
            (T::Byte, Value::Byte(_)) => true,
            (T::Short, Value::Short(_)) => true,
            (T::Int, Value::Int(_)) => true,
            (T::Long, Value::Long(_)) => true,
            (T::Float, Value::Float(_)) => true,
            (T::Double, Value::Double(_)) => true,
            (T::Char, Value::Char(_)) => true,
            (T::Str, Value::Str(_)) | (T::Str, Value::Null) => true,
            (T::List(element), Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (T::List(_), Value::Null) => true,
            (T::SetOf(element), Value::SetOf(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (T::SetOf(_), Value::Null) => true,
            (T::MapOf(key, value_type), Value::MapOf(entries)) => entries
                .iter()
                .all(|(k, v)| key.accepts(k) && value_type.accepts(v)),
            (T::MapOf(_, _), Value::Null) => true,
            (T::Array(element), Value::Array(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (T::Array(_), Value::Null) => true,
            (T::Receiver, Value::Receiver(_)) | (T::Receiver, Value::Null) => true,
            _ => false,
        }
    }

    /// Whether values of this type can be mutated in place by a call.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            ValueType::List(_)
                | ValueType::SetOf(_)
                | ValueType::MapOf(_, _)
                | ValueType::Array(_)
                | ValueType::Any
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ValueType::*;
        match self {
            Boolean => write!(f, "boolean"),
            Byte => write!(f, "byte"),
            Short => write!(f, "short"),
            Int => write!(f, "int"),
            Long => write!(f, "long"),
            Float => write!(f, "float"),
            Double => write!(f, "double"),
            Char => write!(f, "char"),
            Str => write!(f, "String"),
            List(element) => write!(f, "List<{element}>"),
            SetOf(element) => write!(f, "Set<{element}>"),
            MapOf(key, value) => write!(f, "Map<{key}, {value}>"),
            Array(element) => write!(f, "{element}[]"),
            Receiver => write!(f, "Receiver"),
            Any => write!(f, "Object"),
        }
    }
}

/// Five independent copies of one generated value.
///
/// The reference and candidate each get a main copy and a scratch copy, and
/// a fifth copy stays unmodified for later display and comparison. All five
/// are value-equal at creation and never share storage.
#[derive(Debug, Clone)]
pub struct Fivefold {
    pub reference: Value,
    pub candidate: Value,
    pub reference_scratch: Value,
    pub candidate_scratch: Value,
    pub unmodified: Value,
    pub complexity: Complexity,
}

impl Fivefold {
    pub fn of(value: Value, complexity: Complexity) -> Fivefold {
        Fivefold {
            reference: value.clone(),
            candidate: value.clone(),
            reference_scratch: value.clone(),
            candidate_scratch: value.clone(),
            unmodified: value,
            complexity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_values_compare_equal() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_eq!(Value::Float(f32::NAN), Value::Float(f32::NAN));
    }

    #[test]
    fn signed_zeros_are_distinct() {
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    }

    #[test]
    fn sets_compare_without_order() {
        let a = Value::SetOf(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::SetOf(vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(a, b);

        let mut hasher_a = DefaultHasher::new();
        let mut hasher_b = DefaultHasher::new();
        a.hash(&mut hasher_a);
        b.hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn lists_compare_in_order() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let original = Value::List(vec![Value::Int(1)]);
        let mut copied = original.clone();
        if let Value::List(items) = &mut copied {
            items.push(Value::Int(2));
        }
        assert_ne!(original, copied);
    }

    #[test]
    fn fivefold_copies_start_equal() {
        let fivefold = Fivefold::of(Value::Str("gwa".into()), Complexity::ZERO);
        assert_eq!(fivefold.reference, fivefold.candidate);
        assert_eq!(fivefold.reference, fivefold.reference_scratch);
        assert_eq!(fivefold.reference, fivefold.candidate_scratch);
        assert_eq!(fivefold.reference, fivefold.unmodified);
    }

    #[test]
    fn accepts_respects_nullability() {
        assert!(ValueType::Str.accepts(&Value::Null));
        assert!(!ValueType::Int.accepts(&Value::Null));
        assert!(ValueType::List(Box::new(ValueType::Int)).accepts(&Value::List(vec![])));
        assert!(!ValueType::List(Box::new(ValueType::Int))
            .accepts(&Value::List(vec![Value::Str("x".into())])));
    }

    #[test]
    fn instance_identity_is_storage_identity() {
        let a = instance_of(5_i32);
        let alias = a.clone();
        let b = instance_of(5_i32);
        assert!(same_instance(&a, &alias));
        assert!(!same_instance(&a, &b));
    }
}
