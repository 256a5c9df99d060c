#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// JSON request client with timeouts, retries and a response cache.
///
/// See [`ApiClient`](client::ApiClient) for the entry point.
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub use sitekit_client as client;

/// Declarative form state and validation.
///
/// See [`FormEngine`](form::FormEngine) for the entry point.
#[cfg(feature = "form")]
#[cfg_attr(docsrs, doc(cfg(feature = "form")))]
pub use sitekit_form as form;

#[cfg(feature = "client")]
pub use sitekit_client::{ApiClient, ApiError, RequestConfig, RequestOptions};

#[cfg(feature = "form")]
pub use sitekit_form::{FieldConfig, FormEngine, FormState, SubmitOutcome};

/// The most used types of both components.
pub mod prelude {
    #[cfg(feature = "client")]
    pub use sitekit_client::{
        ApiClient, ApiError, CachePolicy, ErrorCode, QueryParams, RequestConfig, RequestHandle,
        RequestOptions, Severity,
    };

    #[cfg(feature = "form")]
    pub use sitekit_form::{
        ErrorKind, FieldConfig, FieldError, FieldType, FormEngine, FormState, FormValues, Rule,
        RuleSchema, Schema, SchemaIssue, SubmitOutcome, SubmitStatus,
    };
}
