//! Tagged-object decoding.
//!
//! Every server payload is an envelope carrying a type tag. Decoding an
//! envelope yields exactly one of: a failure (including a server-flagged
//! exception), a redirection to follow instead of the value, or the value.

use std::{
    any::type_name,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::{Map, Value};
use shared::protocol::{
    element_tag, list_tag, EXCEPTION_KEY, EXCEPTION_TAG, LIST_TYPE_KEY, LIST_VALUES_KEY,
    REDIRECTION_KEY, REDIRECTION_TAG,
};
use tracing::{debug, warn};

use crate::{
    either::Either,
    error::DecodeError,
    model::{DialogException, Redirection},
    registry::{declared_tag, FactoryContext, ObjectFactory, TypeRegistry},
    wire::{downcast, Decoded, WireObject},
};

#[derive(Clone)]
pub struct Decoder {
    registry: Arc<TypeRegistry>,
}

impl Decoder {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Decodes a single tagged object of type `A`.
    pub fn decode_value<A: WireObject>(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
        ignore_redirection: bool,
    ) -> Result<Either<Redirection, A>, DecodeError> {
        match self.decode(raw, expected, factory, ignore_redirection)? {
            Either::Left(redirection) => Ok(Either::Left(redirection)),
            Either::Right(decoded) => into_typed(decoded, expected).map(Either::Right),
        }
    }

    /// Decodes a bare array or a `WS_LTYPE` list envelope into `Vec<A>`.
    pub fn decode_list<A: WireObject>(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
        ignore_redirection: bool,
    ) -> Result<Either<Redirection, Vec<A>>, DecodeError> {
        match self.decode(raw, expected, factory, ignore_redirection)? {
            Either::Left(redirection) => Ok(Either::Left(redirection)),
            Either::Right(Decoded::List(items)) => items
                .into_iter()
                .map(|item| into_typed(item, expected))
                .collect::<Result<Vec<A>, _>>()
                .map(Either::Right),
            Either::Right(_) => Err(DecodeError::mismatch(expected, None)),
        }
    }

    /// Like [`Decoder::decode_value`], treating a redirection as a failure.
    pub fn extract_value<A: WireObject>(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
    ) -> Result<A, DecodeError> {
        match self.decode_value(raw, expected, factory, false)? {
            Either::Left(redirection) => Err(DecodeError::UnexpectedRedirection(Box::new(
                redirection,
            ))),
            Either::Right(value) => Ok(value),
        }
    }

    pub fn extract_value_or_redirect<A: WireObject>(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
    ) -> Result<Either<Redirection, A>, DecodeError> {
        self.decode_value(raw, expected, factory, false)
    }

    pub fn extract_list<A: WireObject>(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
    ) -> Result<Vec<A>, DecodeError> {
        match self.decode_list(raw, expected, factory, false)? {
            Either::Left(redirection) => Err(DecodeError::UnexpectedRedirection(Box::new(
                redirection,
            ))),
            Either::Right(values) => Ok(values),
        }
    }

    /// Untyped entry point. Panics raised by custom factories are converted
    /// into `FactoryFailure` here so callers see a single failure channel.
    pub fn decode(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
        ignore_redirection: bool,
    ) -> Result<Either<Redirection, Decoded>, DecodeError> {
        catch_unwind(AssertUnwindSafe(|| {
            self.decode_envelope(raw, expected, factory, ignore_redirection)
        }))
        .unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "decoder panicked".to_string());
            Err(DecodeError::factory(expected, message))
        })
    }

    fn decode_envelope(
        &self,
        raw: Option<&Value>,
        expected: &str,
        factory: &dyn ObjectFactory,
        ignore_redirection: bool,
    ) -> Result<Either<Redirection, Decoded>, DecodeError> {
        let raw = match raw {
            Some(Value::Null) | None => {
                return Err(DecodeError::NullInput {
                    expected: expected.to_string(),
                })
            }
            Some(raw) => raw,
        };

        let map = match raw {
            Value::Array(items) => {
                let element = element_tag(expected).ok_or_else(|| DecodeError::ListTypeExpected {
                    expected: expected.to_string(),
                })?;
                let checks = ElementChecks::Envelope { ignore_redirection };
                return self
                    .decode_elements(items, element, factory, checks)
                    .map(|items| Either::Right(Decoded::List(items)));
            }
            Value::Object(map) => map,
            _ => return Err(DecodeError::mismatch(expected, None)),
        };

        if map.contains_key(LIST_TYPE_KEY) {
            if let Some(exception) = present(map, EXCEPTION_KEY) {
                return Err(DecodeError::ServerException(
                    self.decode_exception(exception, factory),
                ));
            }
            if !ignore_redirection {
                if let Some(redirection) = present(map, REDIRECTION_KEY) {
                    return self
                        .decode_redirection(redirection, factory)
                        .map(Either::Left);
                }
            }
            let checks = ElementChecks::Envelope { ignore_redirection };
            return self
                .decode_list_envelope(map, Some(expected), factory, checks)
                .map(|items| Either::Right(Decoded::List(items)));
        }

        let declared = declared_tag(map).map(|(_, tag)| tag);
        match declared {
            Some(declared) if self.registry.accepts(expected, declared) => {}
            _ => return Err(DecodeError::mismatch(expected, declared)),
        }

        if let Some(exception) = present(map, EXCEPTION_KEY) {
            return Err(DecodeError::ServerException(
                self.decode_exception(exception, factory),
            ));
        }

        if !ignore_redirection {
            if let Some(redirection) = present(map, REDIRECTION_KEY) {
                return self
                    .decode_redirection(redirection, factory)
                    .map(Either::Left);
            }
        }

        self.decode_object(map, expected, factory)
            .map(|object| Either::Right(Decoded::Object(object)))
    }

    /// Best effort: an exception payload that does not decode is kept as raw text.
    fn decode_exception(&self, raw: &Value, factory: &dyn ObjectFactory) -> DialogException {
        let decoded = self
            .decode_envelope(Some(raw), EXCEPTION_TAG, factory, true)
            .and_then(|outcome| match outcome {
                Either::Right(decoded) => into_typed::<DialogException>(decoded, EXCEPTION_TAG),
                Either::Left(_) => Err(DecodeError::mismatch(EXCEPTION_TAG, None)),
            });
        decoded.unwrap_or_else(|err| {
            warn!(error = %err, "exception payload did not decode; keeping raw text");
            DialogException::from_raw(raw.to_string())
        })
    }

    fn decode_redirection(
        &self,
        raw: &Value,
        factory: &dyn ObjectFactory,
    ) -> Result<Redirection, DecodeError> {
        match self.decode_envelope(Some(raw), REDIRECTION_TAG, factory, true)? {
            Either::Right(decoded) => into_typed(decoded, REDIRECTION_TAG),
            Either::Left(redirection) => Ok(redirection),
        }
    }

    /// Builds one object through `factory`, then any factory registered for
    /// `tag`, and finally the generic field copy.
    pub fn decode_object(
        &self,
        raw: &Map<String, Value>,
        tag: &str,
        factory: &dyn ObjectFactory,
    ) -> Result<Box<dyn WireObject>, DecodeError> {
        let ctx = FactoryContext {
            decoder: self,
            factory,
            tag,
            raw,
        };
        if let Some(result) = factory
            .create(&ctx)
            .or_else(|| self.registry.create(&ctx))
        {
            return result;
        }

        let mut object = self
            .registry
            .construct(tag)
            .or_else(|| ctx.declared_tag().and_then(|declared| self.registry.construct(declared)))
            .ok_or_else(|| DecodeError::factory(tag, "no type registered for tag"))?;
        self.copy_fields(object.as_mut(), tag, raw, factory)?;
        Ok(object)
    }

    /// Copies every wire field of `raw` into the matching slot of `object`,
    /// decoding nested tagged objects and lists first. Unknown fields are
    /// skipped.
    pub fn copy_fields(
        &self,
        object: &mut dyn WireObject,
        tag: &str,
        raw: &Map<String, Value>,
        factory: &dyn ObjectFactory,
    ) -> Result<(), DecodeError> {
        let tag_key = declared_tag(raw).map(|(key, _)| key);
        for (name, value) in raw {
            if Some(name.as_str()) == tag_key {
                continue;
            }
            let internal = format!("_{name}");
            let slot = if object.has_slot(&internal) {
                internal.as_str()
            } else if object.has_slot(name) {
                name.as_str()
            } else {
                debug!(tag, field = %name, "skipping unknown field");
                continue;
            };
            let decoded = self.decode_field(value, factory)?;
            object.assign(tag, slot, decoded)?;
        }
        Ok(())
    }

    fn decode_field(&self, value: &Value, factory: &dyn ObjectFactory) -> Result<Decoded, DecodeError> {
        match value {
            Value::Object(map) if map.contains_key(LIST_TYPE_KEY) => self
                .decode_list_envelope(map, None, factory, ElementChecks::Skip)
                .map(Decoded::List),
            Value::Object(map) => match declared_tag(map) {
                Some((_, declared)) => self.decode_object(map, declared, factory).map(Decoded::Object),
                None => Ok(Decoded::Scalar(value.clone())),
            },
            Value::Array(items) if items.first().is_some_and(is_tagged) => items
                .iter()
                .map(|item| self.decode_field(item, factory))
                .collect::<Result<_, _>>()
                .map(Decoded::List),
            _ => Ok(Decoded::Scalar(value.clone())),
        }
    }

    /// `{WS_LTYPE: E, values: [...]}`. With an expected `List<X>` tag, `X`
    /// must be `E`; with a plain expected tag, elements are held to it.
    fn decode_list_envelope(
        &self,
        map: &Map<String, Value>,
        expected: Option<&str>,
        factory: &dyn ObjectFactory,
        checks: ElementChecks,
    ) -> Result<Vec<Decoded>, DecodeError> {
        let declared = map.get(LIST_TYPE_KEY).and_then(Value::as_str);
        let element = match (expected, declared) {
            (Some(expected), declared) => match element_tag(expected) {
                Some(element) if Some(element) == declared => element,
                Some(_) => return Err(DecodeError::mismatch(expected, declared.map(list_tag).as_deref())),
                None => expected,
            },
            (None, Some(declared)) => declared,
            (None, None) => return Err(DecodeError::mismatch(LIST_TYPE_KEY, None)),
        };

        match map.get(LIST_VALUES_KEY) {
            Some(Value::Array(items)) => self.decode_elements(items, element, factory, checks),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(DecodeError::InvalidField {
                tag: list_tag(element),
                field: LIST_VALUES_KEY.to_string(),
                message: "expected an array".to_string(),
            }),
        }
    }

    /// Fails fast: the first element that does not decode fails the list.
    fn decode_elements(
        &self,
        items: &[Value],
        element: &str,
        factory: &dyn ObjectFactory,
        checks: ElementChecks,
    ) -> Result<Vec<Decoded>, DecodeError> {
        items
            .iter()
            .map(|item| self.decode_element(item, element, factory, checks))
            .collect()
    }

    /// Top-level elements get the same exception and redirection checks as
    /// a single envelope. A redirecting element cannot stand in a list, so it
    /// fails the list with `UnexpectedRedirection`.
    fn decode_element(
        &self,
        item: &Value,
        element: &str,
        factory: &dyn ObjectFactory,
        checks: ElementChecks,
    ) -> Result<Decoded, DecodeError> {
        match item {
            Value::Null => Err(DecodeError::NullInput {
                expected: element.to_string(),
            }),
            Value::Object(map) if map.contains_key(LIST_TYPE_KEY) => self
                .decode_list_envelope(map, None, factory, checks)
                .map(Decoded::List),
            Value::Object(map) => match checks {
                ElementChecks::Envelope { ignore_redirection } => {
                    match self.decode_envelope(Some(item), element, factory, ignore_redirection)? {
                        Either::Right(decoded) => Ok(decoded),
                        Either::Left(redirection) => {
                            Err(DecodeError::UnexpectedRedirection(Box::new(redirection)))
                        }
                    }
                }
                ElementChecks::Skip => {
                    let declared = declared_tag(map).map(|(_, tag)| tag);
                    match declared {
                        Some(declared) if self.registry.accepts(element, declared) => {
                            self.decode_object(map, element, factory).map(Decoded::Object)
                        }
                        _ => Err(DecodeError::mismatch(element, declared)),
                    }
                }
            },
            scalar => Ok(Decoded::Scalar(scalar.clone())),
        }
    }
}

/// Whether list elements are checked like top-level envelopes. Lists nested
/// inside fields are not.
#[derive(Debug, Clone, Copy)]
enum ElementChecks {
    Envelope { ignore_redirection: bool },
    Skip,
}

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn is_tagged(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| declared_tag(map).is_some() || map.contains_key(LIST_TYPE_KEY))
}

fn into_typed<A: WireObject>(decoded: Decoded, expected: &str) -> Result<A, DecodeError> {
    match decoded {
        Decoded::Object(object) => downcast::<A>(object).ok_or_else(|| {
            DecodeError::factory(
                expected,
                format!("decoded object is not a {}", type_name::<A>()),
            )
        }),
        Decoded::List(_) => Err(DecodeError::mismatch(
            expected,
            Some(list_tag(expected).as_str()),
        )),
        Decoded::Scalar(value) => Err(DecodeError::factory(
            expected,
            format!("expected an object, found {value}"),
        )),
    }
}

#[cfg(test)]
#[path = "tests/decoder_tests.rs"]
mod tests;
