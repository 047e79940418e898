//! Stage artifacts: the candidate's working memory.
//!
//! Downstream stages read what upstream stages produced, so the candidate
//! carries an ordered list of findings. Each variant is owned by exactly one
//! stage and is replaced wholesale when that stage re-runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ProposalId;

/// Document systems we know how to fetch from / write back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocSystem {
    Confluence,
    Notion,
    Github,
}

impl fmt::Display for DocSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocSystem::Confluence => "confluence",
            DocSystem::Notion => "notion",
            DocSystem::Github => "github",
        })
    }
}

/// A document the resolver thinks is affected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocCandidate {
    pub doc_system: DocSystem,
    pub doc_id: String,
    pub title: String,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedDoc {
    pub doc_system: DocSystem,
    pub doc_id: String,
    pub title: String,
    pub content: String,
    /// Revision at fetch time; the base for optimistic writeback.
    pub revision: String,
    pub fetched_at: DateTime<Utc>,
}

/// A bounded, citable slice of the fetched doc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub heading: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContext {
    pub doc_id: String,
    pub sections: Vec<DocSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// An old term still appears in the doc.
    StaleReference,
    /// A new term is already documented.
    AlreadyDocumented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMatch {
    pub term: String,
    pub kind: MatchKind,
    pub line: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaselineReport {
    pub matches: Vec<BaselineMatch>,
}

impl BaselineReport {
    pub fn stale_references(&self) -> impl Iterator<Item = &BaselineMatch> {
        self.matches
            .iter()
            .filter(|m| m.kind == MatchKind::StaleReference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStyle {
    ReplaceStaleReference,
    AddNote,
    RewriteSection,
}

impl fmt::Display for PatchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchStyle::ReplaceStaleReference => "replace_stale_reference",
            PatchStyle::AddNote => "add_note",
            PatchStyle::RewriteSection => "rewrite_section",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Agent,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchPlan {
    /// Headings of the sections the patch should touch.
    pub target_sections: Vec<String>,
    pub intent: String,
    pub style: PatchStyle,
    pub source: PlanSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub proposal_id: ProposalId,
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// One stage artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageFinding {
    FetchedDoc(FetchedDoc),
    ExtractedContext(ExtractedContext),
    BaselineMatch(BaselineReport),
    PatchPlan(PatchPlan),
    Validation(ValidationReport),
}

impl StageFinding {
    /// Findings of the same kind replace each other.
    pub fn same_kind(&self, other: &StageFinding) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
