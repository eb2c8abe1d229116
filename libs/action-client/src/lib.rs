//! # nsc-action-client
//!
//! Remote action execution against applications deployed by the orchestrator.
//!
//! An *action* is a named operation exposed by a managed application. It takes
//! a parameter map, runs on the application's leader unit, and either completes
//! with an output map or fails. Every call is bounded by a caller-supplied
//! timeout; exceeding it surfaces as [`ActionError::Timeout`], never a hang.
//!
//! ## Addressing
//!
//! Applications are addressed through an [`ApplicationLocator`]
//! (`nsr-name`, VDU id, member index). The locator derives the runtime
//! application name the orchestrator deployed the charm under; see
//! [`ApplicationLocator::application_name`].
//!
//! ## Implementations
//!
//! - [`HttpActionClient`]: talks to the orchestrator's action endpoint.
//! - [`ScriptedActionClient`]: in-memory client with scripted responses and a
//!   call log, for tests and dry runs.

mod client;
mod error;
mod http;
mod locator;
mod mock;

pub use client::{ActionOutput, ActionParams, RemoteActionClient};
pub use error::{ActionError, LocatorError};
pub use http::{HttpActionClient, HttpActionClientConfig};
pub use locator::{format_application_name, ApplicationLocator};
pub use mock::{output, RecordedCall, ScriptedActionClient};
