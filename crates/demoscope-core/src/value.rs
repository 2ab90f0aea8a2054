//! Decoded entity prop values.

use std::fmt;

/// A float as decoded from the wire.
///
/// Quantized floats need the prop's range to become a value; see
/// [`SendProp::to_float`](crate::SendProp::to_float).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FloatValue {
    /// Fully decoded (coordinates, normals, unscaled floats).
    Exact(f32),
    /// Raw fixed-point integer.
    Quantized(u32),
}

/// A decoded prop value. Owns its data, so it can be retained across
/// messages.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Integer; unsigned props are zero-extended.
    Int(i64),
    /// Float.
    Float(FloatValue),
    /// Three-component vector.
    Vector3([FloatValue; 3]),
    /// Two-component vector.
    Vector2([FloatValue; 2]),
    /// Raw string bytes.
    String(Vec<u8>),
    /// Array elements.
    Array(Vec<PropValue>),
}

impl PropValue {
    /// The integer value, for integer props.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FloatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Quantized(raw) => write!(f, "q{raw}"),
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Vector3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            Self::Vector2([x, y]) => write!(f, "({x}, {y})"),
            Self::String(s) => write!(f, "\"{}\"", String::from_utf8_lossy(s)),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}
