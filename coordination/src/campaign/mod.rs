//! Campaign data model and per-lead step scheduling
//!
//! A campaign is an ordered list of [`Step`]s. Each lead enrolled in a
//! campaign gets an [`Enrollment`] whose cursor walks those steps, firing
//! each one `delay_days` after the previous step was sent:
//!
//! ```text
//! steps:   [ d0 ,  d1 ,  d2 ]
//! fires:   T0+d0   T0+d0+d1   T0+d0+d1+d2      (earliest)
//! ```
//!
//! Fire times are earliest, not exact: a failed step is retried on a later
//! tick and all following steps shift by the slip.

pub mod enrollment;
pub mod template;
pub mod types;

pub use enrollment::{
    cumulative_offsets, earliest_fire_times, Enrollment, EnrollmentId, EnrollmentState,
    FailureDisposition, IllegalTransition, TransitionRecord,
};
pub use template::{render, unresolved};
pub use types::{
    Campaign, CampaignId, CampaignSettings, CampaignStatus, CampaignValidationError, Channel,
    Lead, LeadId, LeadStatus, QualificationCriteria, Step, MAX_STEP_DELAY_DAYS,
};
