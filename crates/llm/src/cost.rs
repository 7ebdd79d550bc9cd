/// Per-model cost table, dollars per 1K tokens (prompt, completion). Unknown
/// models fall back to a conservative default and log once at the caller's
/// discretion.
const RATES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.00025, 0.00125),
];

const DEFAULT_RATE: (f64, f64) = (0.01, 0.03);

pub fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (prompt_rate, completion_rate) = RATES
        .iter()
        .find(|(name, _, _)| model.contains(name))
        .map(|(_, p, c)| (*p, *c))
        .unwrap_or(DEFAULT_RATE);
    (prompt_tokens as f64 / 1000.0) * prompt_rate + (completion_tokens as f64 / 1000.0) * completion_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_rate() {
        let cost = estimate_cost("gpt-4o-2024-05-13", 1000, 1000);
        assert!((cost - 0.02).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_default_rate() {
        let cost = estimate_cost("some-future-model", 1000, 0);
        assert!((cost - DEFAULT_RATE.0).abs() < 1e-9);
    }
}
