//! The KPI review engine: synchronous pure computation, no I/O.
//!
//! The command layer feeds it rows loaded from storage and writes back what
//! it computes; nothing in here touches the database or retries anything.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod normalize;
pub mod stage;
pub mod state;

pub use aggregate::{aggregate, percentage_obtained, Aggregate, RaterRole, RatingInput};
pub use config::{CalculationMethod, CalculationSettings, Period};
pub use error::EngineError;
pub use normalize::{normalize, rating_label, ALLOWED_SELF_RATINGS};
pub use stage::{derive_stage, Stage, StageCategory};
pub use state::{
    ConfirmationAction, KpiStatus, ResolutionStatus, ReviewStatus,
};
