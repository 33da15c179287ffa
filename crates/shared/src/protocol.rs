use serde::{Deserialize, Serialize};

use crate::domain::{QueryDirection, RecordId};

/// Object tag key used by the legacy protocol variant.
pub const OBJECT_TYPE_KEY: &str = "WS_OTYPE";
/// Object tag key used by the current protocol variant.
pub const TYPE_KEY: &str = "type";
pub const TAG_KEYS: [&str; 2] = [OBJECT_TYPE_KEY, TYPE_KEY];
pub const LIST_TYPE_KEY: &str = "WS_LTYPE";
pub const LIST_VALUES_KEY: &str = "values";
pub const EXCEPTION_KEY: &str = "exception";
pub const REDIRECTION_KEY: &str = "redirection";

pub const EXCEPTION_TAG: &str = "WSException";
pub const REDIRECTION_TAG: &str = "WSRedirection";
pub const DIALOG_REDIRECTION_TAG: &str = "WSDialogRedirection";
pub const WEB_REDIRECTION_TAG: &str = "WSWebRedirection";
pub const WORKBENCH_REDIRECTION_TAG: &str = "WSWorkbenchRedirection";
pub const NULL_REDIRECTION_TAG: &str = "WSNullRedirection";
pub const RECORD_TAG: &str = "WSRecord";
pub const PROPERTY_TAG: &str = "WSProp";
pub const DATA_ANNOTATION_TAG: &str = "WSDataAnno";
pub const QUERY_RESULT_TAG: &str = "WSQueryResult";
pub const ACTION_RESULT_TAG: &str = "WSActionResult";

const LIST_PREFIX: &str = "List<";
const LIST_SUFFIX: &str = ">";

pub fn list_tag(element: &str) -> String {
    format!("{LIST_PREFIX}{element}{LIST_SUFFIX}")
}

/// Returns the element tag of a `List<...>` tag.
pub fn element_tag(tag: &str) -> Option<&str> {
    tag.strip_prefix(LIST_PREFIX)?
        .strip_suffix(LIST_SUFFIX)
        .filter(|element| !element.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub max_rows: usize,
    pub direction: QueryDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_object_id: Option<RecordId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ids: Vec<RecordId>,
}
