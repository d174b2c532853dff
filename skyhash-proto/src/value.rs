use crate::status::ServerError;

/// One decoded reply element.
///
/// Arrays carry their element errors in place: a failed lookup inside a
/// batched read materialises as [`Value::Err`] (or [`Value::Nil`] for the
/// nil sentinel) in that slot instead of aborting the enclosing parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f32),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Nil,
    Err(ServerError),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The textual content of a string or binary reply, lossily decoded.
    /// Returns an empty string for [`Value::Nil`].
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Bin(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Nil => Some(String::new()),
            _ => None,
        }
    }

    /// The raw bytes of a string or binary reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s.as_bytes()),
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<ServerError> for Value {
    fn from(err: ServerError) -> Value {
        if err.is_nil() {
            Value::Nil
        } else {
            Value::Err(err)
        }
    }
}
