//! Classification of evaluator verdict text.

/// Outcome of evaluating one generated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Rejected; the full verdict text is retained as regeneration feedback.
    NeedsRegen { feedback: String },
}

/// Classify verdict text against the acceptance token.
///
/// ACCEPTED only when the text begins with the token (leading whitespace
/// ignored). Anything else, including unexpected verdict formats, is
/// conservatively treated as a failure, never silently accepted.
pub fn classify(text: &str, acceptance_token: &str) -> Verdict {
    if text.trim_start().starts_with(acceptance_token) {
        Verdict::Accepted
    } else {
        Verdict::NeedsRegen {
            feedback: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_token_prefix() {
        assert_eq!(classify("Yes.", "Yes"), Verdict::Accepted);
        assert_eq!(classify("  Yes, fine", "Yes"), Verdict::Accepted);
    }

    #[test]
    fn rejects_with_feedback() {
        let verdict = classify("No. too long", "Yes");
        assert_eq!(
            verdict,
            Verdict::NeedsRegen {
                feedback: "No. too long".to_string()
            }
        );
    }

    #[test]
    fn unexpected_format_is_treated_as_failure() {
        assert!(matches!(
            classify("The response is acceptable. Yes", "Yes"),
            Verdict::NeedsRegen { .. }
        ));
        assert!(matches!(classify("", "Yes"), Verdict::NeedsRegen { .. }));
    }
}
