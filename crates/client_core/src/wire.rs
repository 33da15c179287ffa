use std::{any::Any, fmt};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;

/// A type the generic decode path can build by copying wire fields into
/// named slots.
///
/// Slot names are the wire names a type accepts. A slot spelled with a leading
/// underscore is the internal backing slot for the public wire name without
/// it; the field copier tries `_name` before `name`.
pub trait WireObject: Any + Send + Sync + fmt::Debug {
    fn slots(&self) -> &'static [&'static str];

    fn assign(&mut self, tag: &str, slot: &str, value: Decoded) -> Result<(), DecodeError>;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    fn has_slot(&self, name: &str) -> bool {
        self.slots().contains(&name)
    }
}

pub fn downcast<T: WireObject>(object: Box<dyn WireObject>) -> Option<T> {
    object.into_any().downcast::<T>().ok().map(|boxed| *boxed)
}

/// A field value after recursive decoding.
#[derive(Debug)]
pub enum Decoded {
    Scalar(Value),
    Object(Box<dyn WireObject>),
    List(Vec<Decoded>),
}

impl Decoded {
    pub fn into_scalar<T: DeserializeOwned>(self) -> Result<T, String> {
        let value = match self {
            Self::Scalar(value) => value,
            Self::List(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Self::Scalar(value) => Ok(value),
                        _ => Err("expected a list of scalars".to_string()),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(object) => return Err(format!("expected a scalar, found {object:?}")),
        };
        serde_json::from_value(value).map_err(|err| err.to_string())
    }

    pub fn into_object<T: WireObject>(self) -> Result<T, String> {
        match self {
            Self::Object(object) => downcast(object)
                .ok_or_else(|| format!("object is not a {}", std::any::type_name::<T>())),
            Self::Scalar(value) => Err(format!("expected an object, found {value}")),
            Self::List(_) => Err("expected an object, found a list".to_string()),
        }
    }

    pub fn into_optional_object<T: WireObject>(self) -> Result<Option<T>, String> {
        match self {
            Self::Scalar(Value::Null) => Ok(None),
            other => other.into_object().map(Some),
        }
    }

    pub fn into_list<T: WireObject>(self) -> Result<Vec<T>, String> {
        match self {
            Self::List(items) => items.into_iter().map(Decoded::into_object).collect(),
            Self::Scalar(Value::Null) => Ok(Vec::new()),
            Self::Scalar(Value::Array(items)) if items.is_empty() => Ok(Vec::new()),
            Self::Scalar(value) => Err(format!("expected a list, found {value}")),
            Self::Object(object) => Err(format!("expected a list, found {object:?}")),
        }
    }
}

/// Implements [`WireObject`] for a `Default` struct from a slot table.
///
/// Slot kinds: `scalar` (any `DeserializeOwned`), `list` (`Vec<T: WireObject>`),
/// `object` (`Option<T: WireObject>`), `boxed` (`Option<Box<T: WireObject>>`).
macro_rules! wire_object {
    (@convert scalar, $value:expr) => {
        $value.into_scalar()
    };
    (@convert list, $value:expr) => {
        $value.into_list()
    };
    (@convert object, $value:expr) => {
        $value.into_optional_object()
    };
    (@convert boxed, $value:expr) => {
        $value
            .into_optional_object()
            .map(|object| object.map(Box::new))
    };
    ($ty:ty { $($slot:literal => $field:ident : $kind:ident),+ $(,)? }) => {
        impl $crate::wire::WireObject for $ty {
            fn slots(&self) -> &'static [&'static str] {
                &[$($slot),+]
            }

            fn assign(
                &mut self,
                tag: &str,
                slot: &str,
                value: $crate::wire::Decoded,
            ) -> Result<(), $crate::error::DecodeError> {
                let invalid = |message: String| $crate::error::DecodeError::InvalidField {
                    tag: tag.to_string(),
                    field: slot.to_string(),
                    message,
                };
                match slot {
                    $($slot => {
                        self.$field = $crate::wire::wire_object!(@convert $kind, value)
                            .map_err(invalid)?;
                        Ok(())
                    })+
                    _ => Err(invalid("no such slot".to_string())),
                }
            }

            fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
                self
            }
        }
    };
}

pub(crate) use wire_object;
