//! Event-driven observation of the outbound pipeline
//!
//! Breaker transitions, step deliveries, enrollment terminations, decisions
//! and tick summaries are published on a Tokio broadcast bus. Producers never
//! block on consumers and publishing with no subscribers is a no-op.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Breakers /  │────▶│  Event Bus   │────▶│  Subscribers │
//! │  Scheduler   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus,
};
pub use types::OutreachEvent;
