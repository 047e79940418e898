//! Validator suite run against a freshly generated proposal.
//!
//! Every check runs and is reported; the proposal passes only if all do.

use crate::domain::{FetchedDoc, PatchProposal, ValidationCheck, ValidationReport};

use super::diff::UnifiedDiff;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationLimits {
    pub max_changed_lines: usize,
    pub min_confidence: f64,
}

pub fn validate_proposal(
    proposal: &PatchProposal,
    doc: &FetchedDoc,
    limits: ValidationLimits,
) -> ValidationReport {
    let mut checks = Vec::new();

    checks.push(check(
        "targets_fetched_doc",
        proposal.doc_system == doc.doc_system && proposal.doc_id == doc.doc_id,
        || format!("proposal targets {}:{}", proposal.doc_system, proposal.doc_id),
    ));

    checks.push(check("non_empty", !proposal.unified_diff.trim().is_empty(), || {
        "diff is empty".to_string()
    }));

    let parsed = UnifiedDiff::parse(&proposal.unified_diff);
    checks.push(match &parsed {
        Ok(_) => pass("parses"),
        Err(e) => fail("parses", e.to_string()),
    });

    match &parsed {
        Ok(diff) => {
            checks.push(match diff.apply(&doc.content) {
                Ok(_) => pass("applies_cleanly"),
                Err(e) => fail("applies_cleanly", e.to_string()),
            });
            let changed = diff.changed_lines();
            checks.push(check(
                "within_change_limit",
                changed <= limits.max_changed_lines,
                || format!("{changed} changed lines > {}", limits.max_changed_lines),
            ));
        }
        Err(_) => {
            checks.push(fail("applies_cleanly", "diff did not parse"));
            checks.push(fail("within_change_limit", "diff did not parse"));
        }
    }

    checks.push(check(
        "confidence_floor",
        proposal.confidence >= limits.min_confidence,
        || {
            format!(
                "confidence {:.2} < {:.2}",
                proposal.confidence, limits.min_confidence
            )
        },
    ));

    ValidationReport {
        proposal_id: proposal.id,
        checks,
    }
}

fn check(name: &str, passed: bool, detail: impl FnOnce() -> String) -> ValidationCheck {
    if passed {
        pass(name)
    } else {
        fail(name, detail())
    }
}

fn pass(name: &str) -> ValidationCheck {
    ValidationCheck {
        name: name.to_string(),
        passed: true,
        detail: String::new(),
    }
}

fn fail(name: &str, detail: impl Into<String>) -> ValidationCheck {
    ValidationCheck {
        name: name.to_string(),
        passed: false,
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateId, DocSystem, PatchStyle, TenantId};
    use crate::patch::diff::render_diff;
    use chrono::Utc;
    use ulid::Ulid;

    const CONTENT: &str = "# Runbook\n\nRestart with `svc restart --legacy`.\n";

    fn doc() -> FetchedDoc {
        FetchedDoc {
            doc_system: DocSystem::Confluence,
            doc_id: "RB-1".into(),
            title: "Runbook".into(),
            content: CONTENT.into(),
            revision: "3".into(),
            fetched_at: Utc::now(),
        }
    }

    fn proposal(diff: String, confidence: f64) -> PatchProposal {
        let tenant = TenantId::new("t1");
        let drift = CandidateId::from_ulid(Ulid::new());
        PatchProposal {
            id: PatchProposal::id_for(&tenant, drift, 0),
            tenant_id: tenant,
            drift_id: drift,
            doc_system: DocSystem::Confluence,
            doc_id: "RB-1".into(),
            doc_title: "Runbook".into(),
            patch_style: PatchStyle::ReplaceStaleReference,
            unified_diff: diff,
            confidence,
            summary: "drop --legacy".into(),
            created_at: Utc::now(),
        }
    }

    fn limits() -> ValidationLimits {
        ValidationLimits {
            max_changed_lines: 10,
            min_confidence: 0.3,
        }
    }

    #[test]
    fn good_proposal_passes_every_check() {
        let diff = render_diff("RB-1", CONTENT, &CONTENT.replace(" --legacy", ""));
        let report = validate_proposal(&proposal(diff, 0.8), &doc(), limits());
        assert!(report.passed(), "{:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(report.checks.len(), 6);
    }

    #[test]
    fn empty_diff_fails_downstream_checks_too() {
        let report = validate_proposal(&proposal(String::new(), 0.8), &doc(), limits());
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(
            failed,
            vec!["non_empty", "parses", "applies_cleanly", "within_change_limit"]
        );
    }

    #[test]
    fn stale_base_and_low_confidence_are_reported() {
        let other_base = "# Runbook\n\nRestart with `svc restart`.\n";
        let diff = render_diff("RB-1", other_base, "# Runbook\n\nRestart with `svc reload`.\n");
        let report = validate_proposal(&proposal(diff, 0.1), &doc(), limits());
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["applies_cleanly", "confidence_floor"]);
    }

    #[test]
    fn large_diffs_are_rejected() {
        let base: String = (0..30).map(|i| format!("row {i}\n")).collect();
        let updated: String = (0..30).map(|i| format!("row {}\n", i + 100)).collect();
        let mut d = doc();
        d.content = base.clone();
        let report = validate_proposal(&proposal(render_diff("RB-1", &base, &updated), 0.9), &d, limits());
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["within_change_limit"]);
    }
}
