//! The fixed report outline. Order is significant: the document lists the
//! sections exactly as they appear here.

/// One heading of the report and the instruction used to write its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub title: &'static str,
    pub instruction: &'static str,
}

pub const SECTIONS: [Section; 7] = [
    Section {
        title: "Executive Summary",
        instruction: "Provide a high-level overview of the financial structure, historical performance, and current financial strategy.",
    },
    Section {
        title: "1. Revenue Analysis",
        instruction: "Evaluate revenue streams, identify trends, and comment on revenue stability and growth opportunities.",
    },
    Section {
        title: "2. Cost Structure & Efficiency",
        instruction: "Break down cost components and assess opportunities for reducing unnecessary expenditures.",
    },
    Section {
        title: "3. Financial Ratios & Metrics",
        instruction: "Analyze key financial indicators such as profitability ratios, liquidity ratios, and efficiency metrics.",
    },
    Section {
        title: "4. Cash Flow & Forecasting",
        instruction: "Assess cash flow management, recurring expenses, and generate future cash flow scenarios.",
    },
    Section {
        title: "5. Recommendations & Optimization",
        instruction: "Provide improvement suggestions based on pure financial data and operational insights (not legal or tax advice).",
    },
    Section {
        title: "Conclusion",
        instruction: "Summarize the financial outlook and action-oriented steps to boost fiscal performance.",
    },
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_outline_starts_with_summary_and_ends_with_conclusion() {
        assert_eq!(SECTIONS.first().map(|s| s.title), Some("Executive Summary"));
        assert_eq!(SECTIONS.last().map(|s| s.title), Some("Conclusion"));
    }

    #[test]
    fn test_titles_are_unique_and_instructions_present() {
        let titles: HashSet<_> = SECTIONS.iter().map(|s| s.title).collect();
        assert_eq!(titles.len(), SECTIONS.len());
        assert!(SECTIONS.iter().all(|s| !s.instruction.trim().is_empty()));
    }
}
