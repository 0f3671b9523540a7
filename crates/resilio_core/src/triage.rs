use crate::domain::{Category, Severity};

/// Terms that escalate a report to Critical regardless of category.
pub const CRITICAL_KEYWORDS: [&str; 6] = [
    "fire",
    "blast",
    "accident",
    "bleeding",
    "trapped",
    "unconscious",
];

/// Assign a severity tier to a fresh report.
///
/// Keyword hits win over the category rule. `Fake` is never produced here; only an authority
/// re-triage can set it.
pub fn classify(category: Category, description: Option<&str>) -> Severity {
    if let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) {
        let lowered = text.to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return Severity::Critical;
        }
    }

    match category {
        Category::Medical | Category::Disaster => Severity::Serious,
        _ => Severity::Minor,
    }
}
