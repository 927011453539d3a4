//! Multi-step family intake wizard.
//!
//! A session owns one [`IntakeForm`] and a [`WizardState`] cursor over the
//! [`StepRegistry`]. Field edits go through the binder by dotted path
//! (`m1.demographics.DOB`); steps are rendered into view models by the
//! registered [`StepRenderer`]s.

pub mod binder;
pub mod manager;
pub mod model;
pub mod path;
pub mod render;
pub mod routes;
pub mod session;
pub mod steps;

pub use binder::FieldValue;
pub use manager::{IntakeEvent, IntakeManager, SessionLimits, StepProgress, spawn_expiry_task};
pub use model::{Demographics, FamilyMember, Gender, IncomeSource, IntakeForm};
pub use path::{DemographicField, FieldPath};
pub use render::{RenderedStep, RendererSet, StepContent, StepRenderer};
pub use routes::intake_routes;
pub use session::{IntakeSession, SessionStatus};
pub use steps::{Direction, Step, StepRegistry, WizardState};
