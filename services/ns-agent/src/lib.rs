//! Network Service Agent Library
//!
//! The agent manages the lifecycle of a network service unit and provisions
//! subscribers across two downstream applications deployed in the same
//! network service: a user-registration application and a policy-enforcement
//! application.
//!
//! ## Architecture
//!
//! ```text
//! LifecycleController           (hook / action dispatch tables)
//! ├── StatusReporter            (unit status sink)
//! └── ProvisioningCoordinator   (add-user -> set-policy)
//!     └── RemoteActionClient    (nsc-action-client)
//! ```
//!
//! ## Modules
//!
//! - `config`: Layered configuration (file + environment)
//! - `coordinator`: Two-phase provisioning
//! - `lifecycle`: Hook and action dispatch
//! - `status`: Unit status model and reporters
//! - `hook_tools`: Orchestrator hook tool bridge

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hook_tools;
pub mod lifecycle;
pub mod request;
pub mod status;

// Re-export commonly used types
pub use config::CharmConfig;
pub use coordinator::{Cancellation, ProvisionPhase, ProvisioningCoordinator};
pub use error::{ErrorKind, ProvisionError};
pub use lifecycle::{ActionOutcome, HookEvent, LifecycleController};
pub use request::{ProvisionRequest, ProvisionResult, UserId};
pub use status::{StatusReporter, UnitStatus};
