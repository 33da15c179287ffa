use std::collections::HashMap;

use serde_json::{Map, Value};
use shared::protocol::TAG_KEYS;

use crate::{
    decoder::Decoder,
    error::DecodeError,
    wire::WireObject,
};

pub type Constructor = fn() -> Box<dyn WireObject>;
pub type FactoryFn = fn(&FactoryContext<'_>) -> Result<Box<dyn WireObject>, DecodeError>;

/// Everything a factory needs to build one object from its wire form.
pub struct FactoryContext<'a> {
    pub decoder: &'a Decoder,
    pub factory: &'a dyn ObjectFactory,
    pub tag: &'a str,
    pub raw: &'a Map<String, Value>,
}

impl FactoryContext<'_> {
    pub fn declared_tag(&self) -> Option<&str> {
        declared_tag(self.raw).map(|(_, tag)| tag)
    }

    /// Builds `T` through the generic field-copy path.
    pub fn fields<T: WireObject + Default>(&self, tag: &str) -> Result<T, DecodeError> {
        let mut object = T::default();
        self.decoder
            .copy_fields(&mut object, tag, self.raw, self.factory)?;
        Ok(object)
    }
}

/// Custom construction hook consulted before the generic field copy.
///
/// `None` means "no custom handling for this tag".
pub trait ObjectFactory: Send + Sync {
    fn create(&self, ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>>;
}

pub struct NoFactory;

impl ObjectFactory for NoFactory {
    fn create(&self, _ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>> {
        None
    }
}

enum Entry {
    Constructor(Constructor),
    Factory(FactoryFn),
}

/// Wire tag table, populated once at startup and read-only afterwards.
#[derive(Default)]
pub struct TypeRegistry {
    entries: HashMap<String, Entry>,
    unions: HashMap<String, Vec<String>>,
}

fn construct<T: WireObject + Default>() -> Box<dyn WireObject> {
    Box::<T>::default()
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: WireObject + Default>(&mut self, tag: &str) -> &mut Self {
        self.entries
            .insert(tag.to_string(), Entry::Constructor(construct::<T>));
        self
    }

    pub fn register_factory(&mut self, tag: &str, factory: FactoryFn) -> &mut Self {
        self.entries.insert(tag.to_string(), Entry::Factory(factory));
        self
    }

    /// Declares `tag` as a union whose wire objects carry one of `members`.
    pub fn register_union(&mut self, tag: &str, members: &[&str]) -> &mut Self {
        self.unions.insert(
            tag.to_string(),
            members.iter().map(|member| member.to_string()).collect(),
        );
        self
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Whether an object declaring `declared` satisfies a request for `expected`.
    pub fn accepts(&self, expected: &str, declared: &str) -> bool {
        expected == declared
            || self
                .unions
                .get(expected)
                .is_some_and(|members| members.iter().any(|member| member == declared))
    }

    pub fn construct(&self, tag: &str) -> Option<Box<dyn WireObject>> {
        match self.entries.get(tag)? {
            Entry::Constructor(constructor) => Some(constructor()),
            Entry::Factory(_) => None,
        }
    }
}

impl ObjectFactory for TypeRegistry {
    fn create(&self, ctx: &FactoryContext<'_>) -> Option<Result<Box<dyn WireObject>, DecodeError>> {
        match self.entries.get(ctx.tag)? {
            Entry::Factory(factory) => Some(factory(ctx)),
            Entry::Constructor(_) => None,
        }
    }
}

/// Reads the declared tag, returning the key it was found under.
pub fn declared_tag(raw: &Map<String, Value>) -> Option<(&'static str, &str)> {
    TAG_KEYS
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str).map(|tag| (*key, tag)))
}
