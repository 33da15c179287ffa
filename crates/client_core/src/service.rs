//! Calls against a dialog service session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{DialogHandle, QueryDirection, RecordId, SessionId, TenantId, UserId},
    error::ApiError,
    protocol::{
        ActionRequest, QueryRequest, ACTION_RESULT_TAG, EXCEPTION_KEY, EXCEPTION_TAG,
        QUERY_RESULT_TAG, REDIRECTION_TAG,
    },
};
use tracing::{debug, info};

use crate::{
    decoder::Decoder,
    either::Either,
    error::{ClientError, DecodeError, TransportError},
    model::{default_registry, ActionResult, DialogException, RecordSet, Redirection},
    scroller::{QueryMarkerOption, QueryProvider, QueryScroller},
    transport::{HttpClient, JsonResponse, StatusBand},
    wire::WireObject,
};

/// Identifies one signed-in session. Passed explicitly to every call.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub server_url: String,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    last_maintenance_time: Option<DateTime<Utc>>,
}

impl SessionContext {
    pub fn new(server_url: impl Into<String>, tenant_id: TenantId, session_id: SessionId) -> Self {
        Self {
            server_url: server_url.into(),
            tenant_id,
            session_id,
            user_id: None,
            last_maintenance_time: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// When this session last changed data on the server.
    pub fn last_maintenance_time(&self) -> Option<DateTime<Utc>> {
        self.last_maintenance_time
    }

    /// Moves the maintenance time forward to `at`. Returns whether it moved.
    pub fn record_maintenance(&mut self, at: DateTime<Utc>) -> bool {
        if self.last_maintenance_time.is_some_and(|last| last >= at) {
            return false;
        }
        self.last_maintenance_time = Some(at);
        true
    }

    fn dialog_path(&self, dialog_handle: &DialogHandle, leaf: &str) -> String {
        format!(
            "tenants/{}/sessions/{}/dialogs/{}/{leaf}",
            self.tenant_id, self.session_id, dialog_handle
        )
    }
}

/// What an action produced, and when it finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub result: Either<Redirection, ActionResult>,
    pub completed_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn redirection(&self) -> Option<&Redirection> {
        match &self.result {
            Either::Left(redirection) => Some(redirection),
            Either::Right(result) => result.redirection.as_ref(),
        }
    }
}

#[derive(Clone)]
pub struct DialogService {
    http: Arc<dyn HttpClient>,
    decoder: Decoder,
}

impl DialogService {
    pub fn new(http: Arc<dyn HttpClient>, decoder: Decoder) -> Self {
        Self { http, decoder }
    }

    /// A service decoding the built-in model types.
    pub fn with_default_models(http: Arc<dyn HttpClient>) -> Self {
        Self::new(http, Decoder::new(default_registry()))
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Fetches one page of a dialog's query. A redirection in place of the
    /// page is reported as `UnexpectedRedirection`.
    pub async fn query(
        &self,
        session: &SessionContext,
        dialog_handle: &DialogHandle,
        page_size: usize,
        direction: QueryDirection,
        anchor: Option<RecordId>,
    ) -> Result<RecordSet, ClientError> {
        let path = session.dialog_path(dialog_handle, "query");
        let request = QueryRequest {
            max_rows: page_size,
            direction,
            from_object_id: anchor,
        };
        let response = self.post(session, &path, &request).await?;
        match self.decode_response::<RecordSet>(response, QUERY_RESULT_TAG)? {
            Either::Left(redirection) => {
                Err(DecodeError::UnexpectedRedirection(Box::new(redirection)).into())
            }
            Either::Right(page) => {
                debug!(
                    dialog = %dialog_handle,
                    %direction,
                    records = page.records.len(),
                    has_more = page.has_more,
                    "query page decoded"
                );
                Ok(page)
            }
        }
    }

    /// Runs `action_id` against `target_ids`. The caller records
    /// `completed_at` on its session with [`SessionContext::record_maintenance`].
    pub async fn perform_action(
        &self,
        session: &SessionContext,
        dialog_handle: &DialogHandle,
        action_id: &str,
        target_ids: Vec<RecordId>,
    ) -> Result<ActionOutcome, ClientError> {
        let path = session.dialog_path(dialog_handle, "actions");
        let request = ActionRequest {
            action_id: action_id.to_string(),
            target_ids,
        };
        let response = self.post(session, &path, &request).await?;
        let result = self.decode_response::<ActionResult>(response, ACTION_RESULT_TAG)?;
        info!(
            dialog = %dialog_handle,
            action_id,
            redirected = result.is_left(),
            "action completed"
        );
        Ok(ActionOutcome {
            result,
            completed_at: Utc::now(),
        })
    }

    async fn post<B: Serialize>(
        &self,
        session: &SessionContext,
        path: &str,
        body: &B,
    ) -> Result<JsonResponse, TransportError> {
        let body = serde_json::to_value(body).map_err(|err| TransportError::Request {
            url: path.to_string(),
            message: format!("request body could not be encoded: {err}"),
        })?;
        self.http.post(&session.server_url, path, &body).await
    }

    fn decode_response<A: WireObject>(
        &self,
        response: JsonResponse,
        expected: &str,
    ) -> Result<Either<Redirection, A>, DecodeError> {
        let registry = self.decoder.registry();
        match response.band() {
            StatusBand::Success => {
                self.decoder
                    .extract_value_or_redirect(Some(&response.value), expected, registry)
            }
            StatusBand::Redirection => self
                .decoder
                .extract_value::<Redirection>(Some(&response.value), REDIRECTION_TAG, registry)
                .map(Either::Left),
            StatusBand::Failure => Err(self.failure(response)),
        }
    }

    /// A 4xx/5xx body: a tagged exception (bare or under `exception`), else a
    /// plain `ApiError`, else raw text.
    fn failure(&self, response: JsonResponse) -> DecodeError {
        if is_blank(&response.value) {
            return DecodeError::ServerException(DialogException {
                message: format!("HTTP {} with an empty body", response.status_code),
                ..DialogException::default()
            });
        }
        let body = response
            .value
            .get(EXCEPTION_KEY)
            .filter(|exception| !exception.is_null())
            .unwrap_or(&response.value);
        let exception = match self.decoder.extract_value::<DialogException>(
            Some(body),
            EXCEPTION_TAG,
            self.decoder.registry(),
        ) {
            Ok(exception) => exception,
            Err(_) => match serde_json::from_value::<ApiError>(response.value.clone()) {
                Ok(api_error) => DialogException {
                    message: api_error.message,
                    name: Some(format!("{:?}", api_error.code)),
                    ..DialogException::default()
                },
                Err(_) => {
                    debug!(
                        status_code = response.status_code,
                        "failure body is neither an exception nor an api error"
                    );
                    match response.value {
                        Value::String(text) => DialogException::from_raw(text),
                        other => DialogException::from_raw(other.to_string()),
                    }
                }
            },
        };
        DecodeError::ServerException(exception)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// The [`QueryProvider`] for one dialog of one session.
#[derive(Clone)]
pub struct QueryContext {
    service: DialogService,
    session: SessionContext,
    dialog_handle: DialogHandle,
}

impl QueryContext {
    pub fn new(service: DialogService, session: SessionContext, dialog_handle: DialogHandle) -> Self {
        Self {
            service,
            session,
            dialog_handle,
        }
    }

    pub fn dialog_handle(&self) -> &DialogHandle {
        &self.dialog_handle
    }

    pub fn into_scroller(
        self,
        first_object_id: Option<RecordId>,
        marker_options: Vec<QueryMarkerOption>,
    ) -> QueryScroller {
        QueryScroller::with_markers(Arc::new(self), first_object_id, marker_options)
    }
}

#[async_trait]
impl QueryProvider for QueryContext {
    async fn fetch_page(
        &self,
        page_size: usize,
        direction: QueryDirection,
        anchor: Option<RecordId>,
    ) -> Result<RecordSet, ClientError> {
        self.service
            .query(&self.session, &self.dialog_handle, page_size, direction, anchor)
            .await
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
