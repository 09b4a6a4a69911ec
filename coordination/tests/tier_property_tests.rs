//! Complexity scoring property tests: sweep inputs and check the scorer's
//! ordering guarantees.
//!
//! Tests verify:
//! - Score is monotonic non-decreasing in prompt length and history length
//! - Turning on business-critical or reasoning flags never lowers the score
//! - Overlord + critical + reasoning + strategic always lands in the expert tier
//! - Tier is a monotonic function of score

use coordination::decision::{AgentType, DecisionType};
use coordination::router::{ComplexityInput, ComplexityScorer, ModelTier};

const AGENTS: [Option<AgentType>; 6] = [
    None,
    Some(AgentType::Overlord),
    Some(AgentType::Email),
    Some(AgentType::Sms),
    Some(AgentType::Chat),
    Some(AgentType::Scheduler),
];

const DECISIONS: [Option<DecisionType>; 4] = [
    None,
    Some(DecisionType::Strategic),
    Some(DecisionType::Tactical),
    Some(DecisionType::Operational),
];

fn all_base_inputs() -> Vec<ComplexityInput> {
    let mut out = Vec::new();
    for agent_type in AGENTS {
        for decision_type in DECISIONS {
            for business_critical in [false, true] {
                for requires_reasoning in [false, true] {
                    out.push(ComplexityInput {
                        prompt_chars: 0,
                        history_messages: 0,
                        business_critical,
                        requires_reasoning,
                        agent_type,
                        decision_type,
                    });
                }
            }
        }
    }
    out
}

// ── Property: monotonic in prompt length ───────────────────────────

#[test]
fn prop_score_monotonic_in_prompt_length() {
    for base in all_base_inputs() {
        let mut previous = f64::MIN;
        for chars in (0..5_000).step_by(37) {
            let input = ComplexityInput {
                prompt_chars: chars,
                ..base.clone()
            };
            let score = ComplexityScorer::score(&input).score;
            assert!(
                score >= previous,
                "score dropped from {} to {} at {} chars",
                previous,
                score,
                chars
            );
            previous = score;
        }
    }
}

// ── Property: monotonic in history length ──────────────────────────

#[test]
fn prop_score_monotonic_in_history() {
    for base in all_base_inputs() {
        let mut previous = f64::MIN;
        for messages in 0..40 {
            let input = ComplexityInput {
                history_messages: messages,
                ..base.clone()
            };
            let score = ComplexityScorer::score(&input).score;
            assert!(score >= previous);
            previous = score;
        }
    }
}

// ── Property: flags never lower the score ──────────────────────────

#[test]
fn prop_flags_never_lower_score() {
    for base in all_base_inputs() {
        for chars in [0, 250, 1_900, 10_000] {
            let without = ComplexityInput {
                prompt_chars: chars,
                business_critical: false,
                requires_reasoning: false,
                ..base.clone()
            };
            let critical = ComplexityInput {
                business_critical: true,
                ..without.clone()
            };
            let reasoning = ComplexityInput {
                requires_reasoning: true,
                ..without.clone()
            };
            let both = ComplexityInput {
                business_critical: true,
                requires_reasoning: true,
                ..without.clone()
            };

            let s0 = ComplexityScorer::score(&without).score;
            assert!(ComplexityScorer::score(&critical).score > s0);
            assert!(ComplexityScorer::score(&reasoning).score > s0);
            assert!(ComplexityScorer::score(&both).score >= ComplexityScorer::score(&critical).score);
        }
    }
}

// ── Property: decision requests always reach expert ────────────────

#[test]
fn prop_overlord_strategic_critical_is_expert() {
    for chars in (0..3_000).step_by(101) {
        for messages in 0..8 {
            let input = ComplexityInput {
                prompt_chars: chars,
                history_messages: messages,
                business_critical: true,
                requires_reasoning: true,
                agent_type: Some(AgentType::Overlord),
                decision_type: Some(DecisionType::Strategic),
            };
            let assessment = ComplexityScorer::score(&input);
            assert!(assessment.score >= 70.0);
            assert_eq!(assessment.tier, ModelTier::Expert);
        }
    }
}

// ── Property: tier monotonic in score ──────────────────────────────

#[test]
fn prop_tier_monotonic_in_score() {
    let mut previous = ModelTier::Basic;
    for tenths in 0..1_200 {
        let tier = ModelTier::from_score(tenths as f64 / 10.0);
        assert!(tier >= previous);
        previous = tier;
    }
    assert_eq!(previous, ModelTier::Expert);
}
