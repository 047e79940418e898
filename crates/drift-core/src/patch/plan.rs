//! Heuristic patch plan, used when the planner agent is unavailable.

use crate::domain::{
    BaselineReport, Evidence, ExtractedContext, PatchPlan, PatchStyle, PlanSource,
};

/// Stale references win: replace them in the sections where they occur.
/// Otherwise add a note to the best-scoring section.
pub fn heuristic_plan(
    evidence: &Evidence,
    context: &ExtractedContext,
    baseline: &BaselineReport,
) -> PatchPlan {
    let stale_lines: Vec<usize> = baseline.stale_references().map(|m| m.line).collect();

    if !stale_lines.is_empty() {
        let mut targets: Vec<String> = context
            .sections
            .iter()
            .filter(|s| stale_lines.iter().any(|l| (s.start_line..=s.end_line).contains(l)))
            .map(|s| s.heading.clone())
            .collect();
        targets.dedup();
        return PatchPlan {
            target_sections: targets,
            intent: format!(
                "replace stale references: {}",
                pairs(evidence).join(", ")
            ),
            style: PatchStyle::ReplaceStaleReference,
            source: PlanSource::Heuristic,
        };
    }

    PatchPlan {
        target_sections: context
            .sections
            .iter()
            .max_by_key(|s| s.score)
            .map(|s| vec![s.heading.clone()])
            .unwrap_or_default(),
        intent: format!("note the change: {}", evidence.summary),
        style: PatchStyle::AddNote,
        source: PlanSource::Heuristic,
    }
}

fn pairs(evidence: &Evidence) -> Vec<String> {
    evidence
        .old_terms
        .iter()
        .zip(&evidence.new_terms)
        .map(|(old, new)| format!("{old} -> {new}"))
        .collect()
}
