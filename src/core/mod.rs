//! Core pipeline primitives (orchestration, reconciliation, scheduling, API)

pub mod bootstrap;
pub mod cancel;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod validation;

pub use cancel::{CancelHandle, CancelSignal};
pub use error::{PipelineError, UnitError};
pub use http::{create_router, start_server, AppState, HealthStatus};
pub use orchestrator::{BatchOrchestrator, RunRequest};
pub use reconciler::{BackfillPlan, GapReconciler, Segment};
pub use retry::RetryPolicy;
pub use scheduler::{daily_request, DailyScheduler};
pub use validation::{validate_bars, DataIntegrityError};
