/// Cloud model pricing per 1K tokens, USD: (model, input, output).
const PRICING: &[(&str, f64, f64)] = &[
    ("claude-opus-4-5-20251101", 0.015, 0.075),
    ("claude-3-5-sonnet-20241022", 0.003, 0.015),
    ("claude-3-5-haiku-20241022", 0.0008, 0.004),
    ("claude-3-opus-20240229", 0.015, 0.075),
    ("claude-3-sonnet-20240229", 0.003, 0.015),
    ("claude-3-haiku-20240307", 0.00025, 0.00125),
];

/// Rates applied to models missing from the table, per 1K tokens.
const DEFAULT_INPUT_RATE: f64 = 0.003;
const DEFAULT_OUTPUT_RATE: f64 = 0.015;

/// Compute the cost in USD of a call against a cloud model.
///
/// Unknown models are billed at the default rates rather than failing the
/// call; the accounting is best-effort and must never block a generation.
pub fn cost(model: &str, tokens_input: u64, tokens_output: u64) -> f64 {
    let (input_rate, output_rate) = PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map_or((DEFAULT_INPUT_RATE, DEFAULT_OUTPUT_RATE), |(_, input, output)| {
            (*input, *output)
        });
    (tokens_input as f64 / 1000.0) * input_rate + (tokens_output as f64 / 1000.0) * output_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sonnet_cost() {
        // 1000 in at $0.003/1K + 2000 out at $0.015/1K
        let c = cost("claude-3-5-sonnet-20241022", 1000, 2000);
        assert!((c - 0.033).abs() < 1e-9);
    }

    #[test]
    fn test_opus_cost() {
        let c = cost("claude-opus-4-5-20251101", 500, 100);
        assert!((c - (0.0075 + 0.0075)).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_default_rates() {
        // Same rates as claude-3-5-sonnet-20241022.
        let unknown = cost("mystery-model", 1000, 2000);
        let sonnet = cost("claude-3-5-sonnet-20241022", 1000, 2000);
        assert!((unknown - sonnet).abs() < 1e-9);
        assert!((unknown - 0.033).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        assert_eq!(cost("claude-3-5-haiku-20241022", 0, 0), 0.0);
    }
}
