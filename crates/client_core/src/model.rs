use std::{any::Any, fmt};

use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{DialogHandle, RecordId, TenantId},
    protocol::{
        ACTION_RESULT_TAG, DATA_ANNOTATION_TAG, DIALOG_REDIRECTION_TAG, EXCEPTION_TAG,
        NULL_REDIRECTION_TAG, PROPERTY_TAG, QUERY_RESULT_TAG, RECORD_TAG, REDIRECTION_TAG,
        WEB_REDIRECTION_TAG, WORKBENCH_REDIRECTION_TAG,
    },
};

use crate::{
    error::DecodeError,
    registry::{FactoryContext, TypeRegistry},
    wire::{wire_object, Decoded, WireObject},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataAnnotation {
    pub name: String,
    pub value: String,
}

wire_object!(DataAnnotation {
    "name" => name: scalar,
    "value" => value: scalar,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
    pub annotations: Vec<DataAnnotation>,
}

wire_object!(Property {
    "name" => name: scalar,
    "value" => value: scalar,
    "_annotations" => annotations: list,
});

/// One row of a query. Treated as an immutable value once decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub properties: Vec<Property>,
    pub annotations: Vec<DataAnnotation>,
}

wire_object!(Record {
    "_id" => id: scalar,
    "_properties" => properties: list,
    "_annotations" => annotations: list,
});

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.property(name).map(|property| &property.value)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub has_more: bool,
    pub default_action_id: Option<String>,
}

wire_object!(RecordSet {
    "_records" => records: list,
    "hasMore" => has_more: scalar,
    "defaultActionId" => default_action_id: scalar,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DialogException {
    pub message: String,
    pub name: Option<String>,
    pub stack_trace: Option<String>,
    pub cause: Option<Box<DialogException>>,
    /// Undecodable exception payload, kept verbatim.
    pub raw: Option<String>,
}

wire_object!(DialogException {
    "message" => message: scalar,
    "name" => name: scalar,
    "stackTrace" => stack_trace: scalar,
    "cause" => cause: boxed,
});

impl DialogException {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            message: raw.clone(),
            raw: Some(raw),
            ..Self::default()
        }
    }
}

impl fmt::Display for DialogException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message)?,
            None => f.write_str(&self.message)?,
        }
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {cause})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DialogRedirection {
    pub dialog_handle: DialogHandle,
    pub dialog_type: String,
    pub dialog_mode: Option<String>,
    pub object_id: Option<RecordId>,
    pub tenant_id: Option<TenantId>,
    pub open: bool,
}

wire_object!(DialogRedirection {
    "dialogHandle" => dialog_handle: scalar,
    "dialogType" => dialog_type: scalar,
    "dialogMode" => dialog_mode: scalar,
    "objectId" => object_id: scalar,
    "tenantId" => tenant_id: scalar,
    "open" => open: scalar,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebRedirection {
    pub url: String,
    pub open: bool,
}

wire_object!(WebRedirection {
    "webURL" => url: scalar,
    "open" => open: scalar,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkbenchRedirection {
    pub workbench_id: String,
    pub open: bool,
}

wire_object!(WorkbenchRedirection {
    "workbenchId" => workbench_id: scalar,
    "open" => open: scalar,
});

/// A navigation instruction returned in place of an expected value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Redirection {
    Dialog(DialogRedirection),
    Web(WebRedirection),
    Workbench(WorkbenchRedirection),
    Null,
}

impl WireObject for Redirection {
    fn slots(&self) -> &'static [&'static str] {
        &[]
    }

    fn assign(&mut self, tag: &str, slot: &str, _value: Decoded) -> Result<(), DecodeError> {
        Err(DecodeError::InvalidField {
            tag: tag.to_string(),
            field: slot.to_string(),
            message: "redirections are built by their factory".to_string(),
        })
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

fn redirection_factory(ctx: &FactoryContext<'_>) -> Result<Box<dyn WireObject>, DecodeError> {
    let declared = ctx.declared_tag().unwrap_or(ctx.tag);
    let redirection = match declared {
        DIALOG_REDIRECTION_TAG => Redirection::Dialog(ctx.fields(declared)?),
        WEB_REDIRECTION_TAG => Redirection::Web(ctx.fields(declared)?),
        WORKBENCH_REDIRECTION_TAG => Redirection::Workbench(ctx.fields(declared)?),
        NULL_REDIRECTION_TAG => Redirection::Null,
        other => {
            return Err(DecodeError::mismatch(REDIRECTION_TAG, Some(other)));
        }
    };
    Ok(Box::new(redirection))
}

/// Result of an action that did not navigate elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionResult {
    pub message: Option<String>,
    pub redirection: Option<Redirection>,
}

wire_object!(ActionResult {
    "message" => message: scalar,
    "redirection" => redirection: object,
});

/// Registers every model type this crate knows how to decode.
pub fn register_models(registry: &mut TypeRegistry) -> &mut TypeRegistry {
    let members = [
        DIALOG_REDIRECTION_TAG,
        WEB_REDIRECTION_TAG,
        WORKBENCH_REDIRECTION_TAG,
        NULL_REDIRECTION_TAG,
    ];
    registry
        .register::<DataAnnotation>(DATA_ANNOTATION_TAG)
        .register::<Property>(PROPERTY_TAG)
        .register::<Record>(RECORD_TAG)
        .register::<RecordSet>(QUERY_RESULT_TAG)
        .register::<DialogException>(EXCEPTION_TAG)
        .register::<ActionResult>(ACTION_RESULT_TAG)
        .register_union(REDIRECTION_TAG, &members)
        .register_factory(REDIRECTION_TAG, redirection_factory);
    for member in members {
        registry.register_factory(member, redirection_factory);
    }
    registry
}

pub fn default_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    register_models(&mut registry);
    registry
}
