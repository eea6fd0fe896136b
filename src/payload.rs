// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Runtime typing of payloads.
//!
//! Every session holds payloads of a single [`PayloadKind`]. For most payload types the kind is
//! simply the Rust type, which is what the default [`Payload::kind`] reports. Types that carry
//! several shapes at runtime (an enum of records, or a [`serde_json::Value`]) override
//! [`Payload::kind`] so that sessions can keep them homogeneous.
use std::fmt;

/// The runtime type of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadKind(&'static str);

impl PayloadKind {
    /// A kind with an explicit name, for use in [`Payload::kind`] overrides.
    pub const fn named(name: &'static str) -> Self {
        Self(name)
    }

    /// The kind of a plain Rust type.
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A value that can be held by an element.
///
/// ```rust
/// use arbor::{Payload, PayloadKind};
///
/// #[derive(Clone)]
/// enum Record {
///     Person(String),
///     Place(String),
/// }
///
/// impl Payload for Record {
///     fn kind(&self) -> PayloadKind {
///         match self {
///             Record::Person(_) => PayloadKind::named("person"),
///             Record::Place(_) => PayloadKind::named("place"),
///         }
///     }
/// }
///
/// assert_ne!(Record::Person("Ada".into()).kind(), Record::Place("Turin".into()).kind());
/// ```
pub trait Payload: Clone {
    /// Reports the runtime type of this value.
    fn kind(&self) -> PayloadKind {
        PayloadKind::of::<Self>()
    }
}

macro_rules! impl_payload {
    ($($t:ty),+ $(,)?) => {
        $(impl Payload for $t {})+
    };
}

impl_payload!(
    String,
    &'static str,
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
);

impl<T: Clone> Payload for Vec<T> {}

impl<T: Clone> Payload for Box<T> {}

impl<T: Clone> Payload for std::sync::Arc<T> {}

#[cfg(feature = "json")]
impl Payload for serde_json::Value {
    fn kind(&self) -> PayloadKind {
        use serde_json::Value;
        PayloadKind::named(match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_types_report_their_type() {
        assert_eq!(String::from("a").kind(), PayloadKind::of::<String>());
        assert_eq!(7u32.kind(), PayloadKind::of::<u32>());
        assert_ne!(7u32.kind(), 7i32.kind());
    }

    #[test]
    fn named_kinds_display_their_name() {
        let kind = PayloadKind::named("person");
        assert_eq!(kind.name(), "person");
        assert_eq!(kind.to_string(), "person");
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_kinds_follow_the_value_shape() {
        use serde_json::json;
        assert_eq!(json!({"a": 1}).kind(), PayloadKind::named("object"));
        assert_eq!(json!([1]).kind(), PayloadKind::named("array"));
        assert_eq!(json!("x").kind(), PayloadKind::named("string"));
        assert_ne!(json!({}).kind(), json!(1).kind());
    }
}
