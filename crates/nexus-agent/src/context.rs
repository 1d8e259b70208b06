//! Context-window resolution — which token budget applies to a request.
//!
//! Candidates are consulted in strict priority order: the model's own
//! declaration, the models-config table, the agent's configured default,
//! then the gateway fallback. The winning source is recorded so operators
//! can see *why* a budget applies, and a guard pass flags windows that are
//! small enough to warn on or refuse outright.

use serde::Serialize;

/// Lookup into the models configuration table (provider + model → tokens).
pub trait ModelsConfigSource: Send + Sync {
    fn context_tokens(&self, provider_id: &str, model_id: &str) -> Option<f64>;
}

/// Lookup into the agent's own configuration.
pub trait AgentConfigSource: Send + Sync {
    fn default_context_tokens(&self) -> Option<f64>;
}

/// Where the effective token budget came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextWindowSource {
    Model,
    ModelsConfig,
    AgentContextTokens,
    Default,
}

impl ContextWindowSource {
    /// Diagnostic string as surfaced in logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::ModelsConfig => "modelsConfig",
            Self::AgentContextTokens => "agentContextTokens",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for ContextWindowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective token budget plus its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextWindowInfo {
    pub tokens: u64,
    pub source: ContextWindowSource,
}

/// Normalize a candidate: non-finite values floor to 0, fractions round
/// down, and anything non-positive is discarded as 0.
fn normalize(candidate: f64) -> u64 {
    if !candidate.is_finite() || candidate <= 0.0 {
        return 0;
    }
    candidate.floor() as u64
}

/// Resolve the effective context window for an agent/model pair.
///
/// The first candidate that normalizes to a positive value wins. When every
/// candidate is non-positive the result is `{0, Default}`.
pub fn resolve_context_window(
    models_config: Option<&dyn ModelsConfigSource>,
    agent_config: Option<&dyn AgentConfigSource>,
    provider_id: &str,
    model_id: &str,
    model_declared_tokens: f64,
    default_tokens: f64,
) -> ContextWindowInfo {
    let declared = normalize(model_declared_tokens);
    if declared > 0 {
        return ContextWindowInfo {
            tokens: declared,
            source: ContextWindowSource::Model,
        };
    }

    if let Some(models) = models_config {
        let configured = normalize(
            models
                .context_tokens(provider_id, model_id)
                .unwrap_or(0.0),
        );
        if configured > 0 {
            return ContextWindowInfo {
                tokens: configured,
                source: ContextWindowSource::ModelsConfig,
            };
        }
    }

    if let Some(agent) = agent_config {
        let configured = normalize(agent.default_context_tokens().unwrap_or(0.0));
        if configured > 0 {
            return ContextWindowInfo {
                tokens: configured,
                source: ContextWindowSource::AgentContextTokens,
            };
        }
    }

    ContextWindowInfo {
        tokens: normalize(default_tokens),
        source: ContextWindowSource::Default,
    }
}

/// Default warn threshold: below this the window is cramped.
pub const DEFAULT_WARN_BELOW: u64 = 32_000;
/// Default hard minimum: below this the agent should not run at all.
pub const DEFAULT_HARD_MIN: u64 = 16_000;

/// Guard thresholds; explicit overrides are coerced to at least 1.
#[derive(Debug, Clone, Copy)]
pub struct GuardThresholds {
    pub warn_below: u64,
    pub hard_min: u64,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self {
            warn_below: DEFAULT_WARN_BELOW,
            hard_min: DEFAULT_HARD_MIN,
        }
    }
}

impl GuardThresholds {
    pub fn new(warn_below: Option<u64>, hard_min: Option<u64>) -> Self {
        Self {
            warn_below: warn_below.map_or(DEFAULT_WARN_BELOW, |v| v.max(1)),
            hard_min: hard_min.map_or(DEFAULT_HARD_MIN, |v| v.max(1)),
        }
    }
}

/// Outcome of the guard pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GuardVerdict {
    pub tokens: u64,
    pub source: ContextWindowSource,
    pub should_warn: bool,
    pub should_block: bool,
}

/// Evaluate the guard: negative token counts clamp to 0, and flags only fire
/// for positive windows (an unresolved window of 0 is a separate failure the
/// caller already sees).
pub fn evaluate_guard(
    tokens: i64,
    source: ContextWindowSource,
    thresholds: &GuardThresholds,
) -> GuardVerdict {
    let tokens = tokens.max(0) as u64;
    let should_warn = tokens > 0 && tokens < thresholds.warn_below;
    let should_block = tokens > 0 && tokens < thresholds.hard_min;
    GuardVerdict {
        tokens,
        source,
        should_warn,
        should_block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Models(Option<f64>);
    impl ModelsConfigSource for Models {
        fn context_tokens(&self, _provider: &str, _model: &str) -> Option<f64> {
            self.0
        }
    }

    struct Agent(Option<f64>);
    impl AgentConfigSource for Agent {
        fn default_context_tokens(&self) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn model_declaration_wins() {
        let info = resolve_context_window(
            Some(&Models(Some(100_000.0))),
            Some(&Agent(Some(64_000.0))),
            "anthropic",
            "opus",
            50_000.0,
            80_000.0,
        );
        assert_eq!(info.tokens, 50_000);
        assert_eq!(info.source, ContextWindowSource::Model);
    }

    #[test]
    fn falls_through_to_models_config() {
        let info = resolve_context_window(
            Some(&Models(Some(100_000.0))),
            Some(&Agent(Some(64_000.0))),
            "anthropic",
            "opus",
            0.0,
            80_000.0,
        );
        assert_eq!(info.tokens, 100_000);
        assert_eq!(info.source, ContextWindowSource::ModelsConfig);
    }

    #[test]
    fn falls_through_to_agent_config() {
        let info = resolve_context_window(
            Some(&Models(None)),
            Some(&Agent(Some(64_000.0))),
            "anthropic",
            "opus",
            0.0,
            80_000.0,
        );
        assert_eq!(info.tokens, 64_000);
        assert_eq!(info.source, ContextWindowSource::AgentContextTokens);
    }

    #[test]
    fn nil_providers_fall_to_default() {
        let info = resolve_context_window(None, None, "anthropic", "opus", 0.0, 80_000.0);
        assert_eq!(info.tokens, 80_000);
        assert_eq!(info.source, ContextWindowSource::Default);
    }

    #[test]
    fn fractional_and_nonfinite_candidates_normalize() {
        let info = resolve_context_window(None, None, "p", "m", f64::NAN, 1234.9);
        assert_eq!(info.tokens, 1234);
        assert_eq!(info.source, ContextWindowSource::Default);

        let info = resolve_context_window(None, None, "p", "m", f64::INFINITY, 10.0);
        assert_eq!(info.tokens, 10);
        assert_eq!(info.source, ContextWindowSource::Default);
    }

    #[test]
    fn negative_candidates_are_discarded() {
        let info = resolve_context_window(
            Some(&Models(Some(-5.0))),
            Some(&Agent(Some(-1.0))),
            "p",
            "m",
            -100.0,
            80_000.0,
        );
        assert_eq!(info.tokens, 80_000);
        assert_eq!(info.source, ContextWindowSource::Default);
    }

    #[test]
    fn everything_zero_yields_zero_default() {
        let info = resolve_context_window(None, None, "p", "m", 0.0, 0.0);
        assert_eq!(info.tokens, 0);
        assert_eq!(info.source, ContextWindowSource::Default);
    }

    #[test]
    fn guard_block_implies_warn() {
        let t = GuardThresholds::default();
        for tokens in [1i64, 8_000, 15_999, 16_000, 31_999, 32_000, 200_000] {
            let v = evaluate_guard(tokens, ContextWindowSource::Model, &t);
            if v.should_block {
                assert!(v.should_warn, "block must imply warn at {tokens}");
            }
        }
    }

    #[test]
    fn guard_zero_fires_nothing() {
        let v = evaluate_guard(0, ContextWindowSource::Default, &GuardThresholds::default());
        assert!(!v.should_warn);
        assert!(!v.should_block);
    }

    #[test]
    fn guard_negative_clamps_to_zero() {
        let v = evaluate_guard(-42, ContextWindowSource::Default, &GuardThresholds::default());
        assert_eq!(v.tokens, 0);
        assert!(!v.should_warn);
        assert!(!v.should_block);
    }

    #[test]
    fn guard_override_coerced_to_one() {
        let t = GuardThresholds::new(Some(0), Some(0));
        assert_eq!(t.warn_below, 1);
        assert_eq!(t.hard_min, 1);
        // With floor thresholds of 1, no positive window ever fires.
        let v = evaluate_guard(1, ContextWindowSource::Model, &t);
        assert!(!v.should_warn);
        assert!(!v.should_block);
    }

    #[test]
    fn guard_thresholds_boundaries() {
        let t = GuardThresholds::default();
        let v = evaluate_guard(16_000, ContextWindowSource::Model, &t);
        assert!(v.should_warn);
        assert!(!v.should_block);

        let v = evaluate_guard(15_999, ContextWindowSource::Model, &t);
        assert!(v.should_warn);
        assert!(v.should_block);

        let v = evaluate_guard(32_000, ContextWindowSource::Model, &t);
        assert!(!v.should_warn);
    }
}
