//! Client SDK for the dialog service.
//!
//! [`decoder::Decoder`] turns tagged server payloads into typed values, a
//! redirection, or a failure. [`scroller::QueryScroller`] keeps a buffered,
//! bidirectional window over a dialog's query. [`service::DialogService`]
//! ties both to HTTP.

pub mod decoder;
pub mod either;
pub mod error;
pub mod model;
pub mod registry;
pub mod scroller;
pub mod service;
pub mod transport;
pub mod wire;

pub use decoder::Decoder;
pub use either::Either;
pub use error::{ClientError, DecodeError, TransportError};
pub use model::{
    default_registry, register_models, ActionResult, DataAnnotation, DialogException,
    DialogRedirection, Property, Record, RecordSet, Redirection, WebRedirection,
    WorkbenchRedirection,
};
pub use registry::{FactoryContext, NoFactory, ObjectFactory, TypeRegistry};
pub use scroller::{QueryMarkerOption, QueryProvider, QueryScroller, ScrollEntry};
pub use service::{ActionOutcome, DialogService, QueryContext, SessionContext};
pub use transport::{HttpClient, JsonResponse, ReqwestClient, StatusBand};
pub use wire::{Decoded, WireObject};
