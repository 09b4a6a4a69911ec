//! Service protection and model selection
//!
//! - [`circuit_breaker`]: per-service failure isolation for Twilio, Mailgun
//!   and OpenRouter.
//! - [`tiering`]: complexity scoring, tier → model table and the fallback
//!   ladder walked inside one guarded call.
//!
//! ```text
//! request ──▶ ComplexityScorer ──▶ ModelTier ──▶ TierModelTable ──▶ primary model
//!                                                                     │
//!                                      FallbackLadder [primary, alt…] ◀┘
//!                                                │
//!                               CircuitBreaker(openrouter).execute(..)
//! ```

pub mod circuit_breaker;
pub mod tiering;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState,
    ServiceName,
};
pub use tiering::{
    ComplexityAssessment, ComplexityFactors, ComplexityInput, ComplexityScorer, FallbackLadder,
    ModelPreference, ModelTier, TierModelTable, AUTO_MODEL,
};
