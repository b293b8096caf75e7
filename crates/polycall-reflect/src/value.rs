//! The cross-language value representation.
//!
//! Every datum that crosses a language boundary is a [`Value`]. Composite
//! values own their children, so dropping a value releases the whole graph.
//! Handles to guest-owned objects are carried as [`Opaque`] and are never
//! interpreted by the core.

use crate::error::{ReflectError, ReflectResult};
use crate::function::Function;
use crate::future::Future;
use crate::types::Type;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased handle owned by a loader.
///
/// The core only moves these around. The loader that created a handle is the
/// one that downcasts it.
#[derive(Clone)]
pub struct Opaque {
    owner: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    /// Wrap a loader-specific value.
    pub fn new<T: Any + Send + Sync>(owner: &str, value: T) -> Self {
        Self {
            owner: Arc::from(owner),
            inner: Arc::new(value),
        }
    }

    /// Name of the loader that created the handle.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Borrow the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Check if the wrapped value has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Whether both handles point at the same loader object.
    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("owner", &self.owner)
            .field("addr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// An exception raised by guest code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Exception {
    pub message: String,
    pub label: String,
    pub code: i64,
    pub stacktrace: String,
}

impl Exception {
    /// Create an exception with a message and a label.
    pub fn new(message: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Set the error code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Set the guest stack trace.
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = stacktrace.into();
        self
    }
}

/// A value that can cross a language boundary.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Buffer(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Borrowed handle, never owned by the value.
    Pointer(Opaque),
    Future(Future),
    Function(Arc<Function>),
    Null,
    Class(Opaque),
    Object(Opaque),
    Exception(Exception),
    Throwable(Box<Value>),
}

macro_rules! copy_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> ReflectResult<$ty> {
            match self {
                Value::$variant(v) => Ok(*v),
                other => Err(other.mismatch(Type::$variant)),
            }
        }
    };
}

macro_rules! ref_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> ReflectResult<&$ty> {
            match self {
                Value::$variant(v) => Ok(v),
                other => Err(other.mismatch(Type::$variant)),
            }
        }
    };
}

impl Value {
    pub fn bool(v: bool) -> Self {
        Value::Bool(v)
    }

    pub fn char(v: i8) -> Self {
        Value::Char(v)
    }

    pub fn short(v: i16) -> Self {
        Value::Short(v)
    }

    pub fn int(v: i32) -> Self {
        Value::Int(v)
    }

    pub fn long(v: i64) -> Self {
        Value::Long(v)
    }

    pub fn float(v: f32) -> Self {
        Value::Float(v)
    }

    pub fn double(v: f64) -> Self {
        Value::Double(v)
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }

    pub fn buffer(v: impl Into<Vec<u8>>) -> Self {
        Value::Buffer(v.into())
    }

    pub fn array(v: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(v.into_iter().collect())
    }

    pub fn map(v: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Map(v.into_iter().collect())
    }

    pub fn pointer(v: Opaque) -> Self {
        Value::Pointer(v)
    }

    pub fn future(v: Future) -> Self {
        Value::Future(v)
    }

    pub fn function(v: Arc<Function>) -> Self {
        Value::Function(v)
    }

    pub fn null() -> Self {
        Value::Null
    }

    pub fn class(v: Opaque) -> Self {
        Value::Class(v)
    }

    pub fn object(v: Opaque) -> Self {
        Value::Object(v)
    }

    pub fn exception(v: Exception) -> Self {
        Value::Exception(v)
    }

    pub fn throwable(v: Value) -> Self {
        Value::Throwable(Box::new(v))
    }

    /// The active tag.
    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::Short(_) => Type::Short,
            Value::Int(_) => Type::Int,
            Value::Long(_) => Type::Long,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Buffer(_) => Type::Buffer,
            Value::Array(_) => Type::Array,
            Value::Map(_) => Type::Map,
            Value::Pointer(_) => Type::Pointer,
            Value::Future(_) => Type::Future,
            Value::Function(_) => Type::Function,
            Value::Null => Type::Null,
            Value::Class(_) => Type::Class,
            Value::Object(_) => Type::Object,
            Value::Exception(_) => Type::Exception,
            Value::Throwable(_) => Type::Throwable,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: Type) -> ReflectError {
        ReflectError::TypeMismatch {
            expected,
            found: self.ty(),
        }
    }

    copy_accessor!(to_bool, Bool, bool);
    copy_accessor!(to_char, Char, i8);
    copy_accessor!(to_short, Short, i16);
    copy_accessor!(to_int, Int, i32);
    copy_accessor!(to_long, Long, i64);
    copy_accessor!(to_float, Float, f32);
    copy_accessor!(to_double, Double, f64);

    /// Borrow the string contents.
    pub fn as_str(&self) -> ReflectResult<&str> {
        match self {
            Value::String(v) => Ok(v.as_str()),
            other => Err(other.mismatch(Type::String)),
        }
    }

    /// Borrow the buffer bytes.
    pub fn as_buffer(&self) -> ReflectResult<&[u8]> {
        match self {
            Value::Buffer(v) => Ok(v.as_slice()),
            other => Err(other.mismatch(Type::Buffer)),
        }
    }

    /// Borrow the array elements.
    pub fn as_array(&self) -> ReflectResult<&[Value]> {
        match self {
            Value::Array(v) => Ok(v.as_slice()),
            other => Err(other.mismatch(Type::Array)),
        }
    }

    /// Borrow the map entries in insertion order.
    pub fn as_map(&self) -> ReflectResult<&[(Value, Value)]> {
        match self {
            Value::Map(v) => Ok(v.as_slice()),
            other => Err(other.mismatch(Type::Map)),
        }
    }

    ref_accessor!(as_pointer, Pointer, Opaque);
    ref_accessor!(as_future, Future, Future);
    ref_accessor!(as_function, Function, Arc<Function>);
    ref_accessor!(as_class, Class, Opaque);
    ref_accessor!(as_object, Object, Opaque);
    ref_accessor!(as_exception, Exception, Exception);

    /// Borrow the value carried by a throwable.
    pub fn as_throwable(&self) -> ReflectResult<&Value> {
        match self {
            Value::Throwable(v) => Ok(v),
            other => Err(other.mismatch(Type::Throwable)),
        }
    }

    /// Take the string out of the value.
    pub fn into_string(self) -> ReflectResult<String> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(other.mismatch(Type::String)),
        }
    }

    /// Take the elements out of an array value.
    pub fn into_array(self) -> ReflectResult<Vec<Value>> {
        match self {
            Value::Array(v) => Ok(v),
            other => Err(other.mismatch(Type::Array)),
        }
    }

    /// Take the entries out of a map value.
    pub fn into_map(self) -> ReflectResult<Vec<(Value, Value)>> {
        match self {
            Value::Map(v) => Ok(v),
            other => Err(other.mismatch(Type::Map)),
        }
    }

    /// Look an entry up in a map by string key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, Value::String(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Serialized JSON form.
    ///
    /// Maps whose keys are unique strings become objects in entry order, any
    /// other map becomes an array of `[key, value]` pairs. Handles (pointers,
    /// futures, functions, classes and objects) have no serialized form.
    pub fn to_json(&self) -> ReflectResult<serde_json::Value> {
        use serde_json::Value as Json;

        let json = match self {
            Value::Bool(v) => Json::Bool(*v),
            Value::Char(v) => Json::from(*v),
            Value::Short(v) => Json::from(*v),
            Value::Int(v) => Json::from(*v),
            Value::Long(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(v) => Json::String(v.clone()),
            Value::Buffer(v) => Json::Array(v.iter().map(|b| Json::from(*b)).collect()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<ReflectResult<Vec<_>>>()?,
            ),
            Value::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    match k {
                        Value::String(key) if !object.contains_key(key) => {
                            object.insert(key.clone(), v.to_json()?);
                        }
                        _ => break,
                    }
                }

                if object.len() == entries.len() {
                    Json::Object(object)
                } else {
                    Json::Array(
                        entries
                            .iter()
                            .map(|(k, v)| Ok(Json::Array(vec![k.to_json()?, v.to_json()?])))
                            .collect::<ReflectResult<Vec<_>>>()?,
                    )
                }
            }
            Value::Null => Json::Null,
            Value::Exception(e) => serde_json::json!({
                "message": e.message,
                "label": e.label,
                "code": e.code,
                "stacktrace": e.stacktrace,
            }),
            Value::Throwable(inner) => serde_json::json!({ "throwable": inner.to_json()? }),
            other => {
                return Err(ReflectError::InvalidCast {
                    from: other.ty(),
                    to: Type::String,
                })
            }
        };

        Ok(json)
    }

    /// Build a value from JSON.
    ///
    /// Integers become `Long`, other numbers `Double`, objects become string
    /// keyed maps.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(v) => Value::Bool(v),
            Json::Number(n) => match n.as_i64() {
                Some(v) => Value::Long(v),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(v) => Value::String(v),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a.ptr_eq(b),
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            (Value::Class(a), Value::Class(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            (Value::Throwable(a), Value::Throwable(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Char(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Buffer(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Exception> for Value {
    fn from(v: Exception) -> Self {
        Value::Exception(v)
    }
}

impl From<Future> for Value {
    fn from(v: Future) -> Self {
        Value::Future(v)
    }
}

impl From<Arc<Function>> for Value {
    fn from(v: Arc<Function>) -> Self {
        Value::Function(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_tag() {
        assert_eq!(Value::bool(true).ty(), Type::Bool);
        assert_eq!(Value::char(1).ty(), Type::Char);
        assert_eq!(Value::short(1).ty(), Type::Short);
        assert_eq!(Value::int(1).ty(), Type::Int);
        assert_eq!(Value::long(1).ty(), Type::Long);
        assert_eq!(Value::float(1.0).ty(), Type::Float);
        assert_eq!(Value::double(1.0).ty(), Type::Double);
        assert_eq!(Value::string("a").ty(), Type::String);
        assert_eq!(Value::buffer(vec![1u8]).ty(), Type::Buffer);
        assert_eq!(Value::array(vec![]).ty(), Type::Array);
        assert_eq!(Value::map(vec![]).ty(), Type::Map);
        assert_eq!(Value::pointer(Opaque::new("test", 1u32)).ty(), Type::Pointer);
        assert_eq!(Value::null().ty(), Type::Null);
        assert_eq!(Value::class(Opaque::new("test", ())).ty(), Type::Class);
        assert_eq!(Value::object(Opaque::new("test", ())).ty(), Type::Object);
        assert_eq!(
            Value::exception(Exception::new("boom", "Error")).ty(),
            Type::Exception
        );
        assert_eq!(Value::throwable(Value::long(1)).ty(), Type::Throwable);
    }

    #[test]
    fn test_accessor_mismatch_is_checked() {
        let v = Value::long(42);
        assert_eq!(v.to_long().unwrap(), 42);

        match v.to_int() {
            Err(ReflectError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, Type::Int);
                assert_eq!(found, Type::Long);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(v.as_str().is_err());
    }

    #[test]
    fn test_opaque_downcast() {
        let handle = Opaque::new("mock", String::from("script"));
        assert_eq!(handle.owner(), "mock");
        assert!(handle.is::<String>());
        assert_eq!(handle.downcast_ref::<String>().unwrap(), "script");
        assert!(handle.downcast_ref::<u32>().is_none());

        let copy = handle.clone();
        assert!(copy.ptr_eq(&handle));
        assert!(!Opaque::new("mock", String::from("script")).ptr_eq(&handle));
    }

    #[test]
    fn test_map_lookup() {
        let v = Value::map(vec![
            (Value::string("a"), Value::long(1)),
            (Value::string("b"), Value::long(2)),
        ]);

        assert_eq!(v.get("b"), Some(&Value::long(2)));
        assert_eq!(v.get("c"), None);
        assert_eq!(Value::long(1).get("a"), None);
    }

    #[test]
    fn test_to_json() {
        let v = Value::map(vec![
            (Value::string("name"), Value::string("polycall")),
            (
                Value::string("list"),
                Value::array(vec![Value::int(1), Value::bool(false), Value::Null]),
            ),
        ]);

        let json = v.to_json().unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "polycall", "list": [1, false, null] })
        );

        let pairs = Value::map(vec![(Value::long(1), Value::string("one"))]);
        assert_eq!(pairs.to_json().unwrap(), serde_json::json!([[1, "one"]]));

        assert!(Value::pointer(Opaque::new("test", ())).to_json().is_err());
    }

    #[test]
    fn test_from_json() {
        let v = Value::from_json(serde_json::json!({ "n": 3, "x": 1.5, "s": "hi", "l": [true] }));

        assert_eq!(v.get("n"), Some(&Value::long(3)));
        assert_eq!(v.get("x"), Some(&Value::double(1.5)));
        assert_eq!(v.get("s"), Some(&Value::string("hi")));
        assert_eq!(v.get("l"), Some(&Value::array(vec![Value::bool(true)])));
    }
}
