//! Input and output policy gates
//!
//! Both gates are independent of the numeric ground truth:
//! - Input: reject a query containing any configured forbidden term
//! - Output: make sure the final text carries a risk disclaimer
//!
//! Matching is case-sensitive substring containment. No tokenization,
//! no normalization; widen the configured lists for broader coverage.

use crate::config::GuardrailConfig;
use crate::models::GuardrailDecision;

pub struct Guardrails {
    config: GuardrailConfig,
}

impl Guardrails {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    /// Reject on the first forbidden term, in configured order
    pub fn validate_input(&self, query: &str) -> GuardrailDecision {
        match self
            .config
            .forbidden_keywords
            .iter()
            .find(|kw| !kw.is_empty() && query.contains(kw.as_str()))
        {
            Some(kw) => GuardrailDecision::reject(format!("Sensitive term detected: {}", kw)),
            None => GuardrailDecision::allow(),
        }
    }

    /// Append the canonical disclaimer unless one is already present.
    /// Applying this twice gives the same text as applying it once.
    pub fn validate_output(&self, response: &str) -> String {
        if self.is_compliant(response) {
            return response.to_string();
        }
        format!("{}{}", response, self.config.disclaimer_block)
    }

    /// Caveat for responses that failed the consistency check
    pub fn annotate_unverified(&self, response: &str) -> String {
        format!("{}{}", response, self.config.unverified_caveat)
    }

    fn is_compliant(&self, response: &str) -> bool {
        self.config
            .required_disclaimers
            .iter()
            .any(|d| !d.is_empty() && response.contains(d.as_str()))
            || response.contains(self.config.disclaimer_block.trim())
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new(GuardrailConfig::default())
    }
}
