//! Report prompt construction
//!
//! Renders one instruction document around the computed ground truth.
//! The aggregate PnL and return-rate tokens are rendered through
//! `engine::format`, the same path the verifier uses to look for them.

use crate::engine::format_amount;
use crate::models::{PnLReport, RetrievedDocument, RiskReport};
use serde::Serialize;

fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Build the portfolio report prompt. Pure; same inputs, same string.
pub fn build_report_prompt(
    pnl: &PnLReport,
    risk: &RiskReport,
    documents: &[RetrievedDocument],
) -> String {
    let total_pnl = format_amount(pnl.total_pnl);
    let total_return = pnl.total_return_rate.as_str();

    format!(
        r#"# Role
You are a professional equity analyst who combines quantitative portfolio data with market sentiment.

# Hard constraints (CRITICAL)
1. **No hallucination**: every figure you state must come from the data below.
2. **Mandatory citation**: the report must state the total PnL {total_pnl} and the total return {total_return} exactly as written.
3. **Self-check**: before answering, confirm every amount and percentage matches the data below.
4. **No invented values**: do not introduce any number that does not appear in the data below.

# Input data

## 1. Account PnL (computed ground truth)
```json
{pnl_json}
```

## 2. Position risk (risk model)
```json
{risk_json}
```

## 3. Market context (retrieved, advisory only)
```json
{docs_json}
```

# Task
Write the report with these sections:

1. **PnL overview**
   - State the total PnL: {total_pnl}
   - State the total return: {total_return}
   - Summarize overall performance ({summary})

2. **Attribution**
   - Explain the main positions' moves using the per-position PnL above
   - Use the market context to explain causes

3. **Risk Disclaimer**
   - Point out risks based on the risk model data
   - State the risk level: {risk_level}

4. **Suggested actions**
   - Base suggestions only on the quantitative analysis above

# Output format
- Markdown
- Professional, concise language
- Must end with a section titled "Risk Disclaimer"

# Self-check list (confirm each before replying)
- [ ] Is the total PnL exactly {total_pnl}?
- [ ] Is the total return exactly {total_return}?
- [ ] Does every per-position figure match the data above?
- [ ] Have you avoided every value not present in the data above?
"#,
        total_pnl = total_pnl,
        total_return = total_return,
        pnl_json = pretty_json(pnl),
        risk_json = pretty_json(risk),
        docs_json = pretty_json(documents),
        summary = pnl.summary,
        risk_level = risk.risk_level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{calculate_attribution, calculate_portfolio_risk, RiskWeights};
    use crate::models::{Holding, MarketQuote};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn fixtures() -> (PnLReport, RiskReport, Vec<RetrievedDocument>) {
        let holdings = vec![
            Holding::new("0700.HK", dec!(300.0), 100),
            Holding::new("BABA", dec!(80.0), 50),
            Holding::new("AAPL", dec!(150.0), 20),
        ];
        let quotes: HashMap<_, _> = [("0700.HK", dec!(345.0)), ("BABA", dec!(85.0)), ("AAPL", dec!(165.0))]
            .into_iter()
            .map(|(t, p)| (t.to_string(), MarketQuote::live(t, p, dec!(0), 0)))
            .collect();

        let pnl = calculate_attribution(&holdings, &quotes);
        let risk = calculate_portfolio_risk(&holdings, &RiskWeights::default());
        let docs = vec![RetrievedDocument {
            content: "Tencent quarterly revenue beats expectations".to_string(),
            source: "News".to_string(),
            relevance: 0.9,
        }];
        (pnl, risk, docs)
    }

    #[test]
    fn test_prompt_embeds_ground_truth_tokens() {
        let (pnl, risk, docs) = fixtures();
        let prompt = build_report_prompt(&pnl, &risk, &docs);

        assert!(prompt.contains("5050.0"));
        assert!(prompt.contains("13.65%"));
        assert!(prompt.contains("LOW"));
        assert!(prompt.contains("Tencent quarterly revenue beats expectations"));
    }

    #[test]
    fn test_prompt_carries_anti_hallucination_directives() {
        let (pnl, risk, docs) = fixtures();
        let prompt = build_report_prompt(&pnl, &risk, &docs);

        assert!(prompt.contains("No hallucination"));
        assert!(prompt.contains("Mandatory citation"));
        assert!(prompt.contains("do not introduce any number"));
        assert!(prompt.contains("Risk Disclaimer"));
        assert!(prompt.contains("Self-check list"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let (pnl, risk, docs) = fixtures();
        assert_eq!(
            build_report_prompt(&pnl, &risk, &docs),
            build_report_prompt(&pnl, &risk, &docs)
        );
    }

    #[test]
    fn test_json_block_uses_same_literal_as_citation() {
        let (pnl, risk, docs) = fixtures();
        let prompt = build_report_prompt(&pnl, &risk, &docs);

        assert!(prompt.contains("\"total_pnl\": 5050.0"));
    }
}
