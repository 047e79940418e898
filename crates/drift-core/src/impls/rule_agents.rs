//! Rule-based agents: deterministic stand-ins for the LLM agents.
//!
//! Used by the CLI demo and the tests. Each agent can be told to fail its
//! next N calls, which is how the retry and fallback paths get exercised.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::domain::{
    DocCandidate, Evidence, FetchedDoc, PatchStyle, RiskLevel, SignalEvent, SourceType,
};
use crate::patch::{UnifiedDiff, heuristic_plan, render_diff};
use crate::ports::{
    Agent, AgentResponse, Agents, DocResolveInput, DocResolveOutput, EditInput, GenerateInput,
    GeneratedPatch, PlanInput, PlanOutput, TriageInput, TriageOutput,
};

/// Countdown of injected failures.
#[derive(Debug, Default)]
pub struct FailureBudget {
    remaining: AtomicU32,
}

impl FailureBudget {
    pub fn fail_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Classifies from the fields the ingestion side extracted.
///
/// Recognized keys: `title`, `summary`, `old_terms`, `new_terms`,
/// `drift_type`, `domains`, `confidence`, `risk`, `merged`.
#[derive(Default)]
pub struct RuleTriageAgent {
    pub failures: FailureBudget,
}

impl RuleTriageAgent {
    fn classify(signal: &SignalEvent) -> TriageOutput {
        let old_terms = signal.extracted_strings("old_terms");
        let new_terms = signal.extracted_strings("new_terms");
        let summary = signal
            .extracted_str("summary")
            .or_else(|| signal.extracted_str("title"))
            .unwrap_or_default()
            .to_string();

        if old_terms.is_empty() && new_terms.is_empty() {
            return TriageOutput {
                is_drift: false,
                drift_type: String::new(),
                drift_domains: Vec::new(),
                confidence: 0.0,
                drift_score: 0.0,
                risk_level: RiskLevel::Low,
                evidence: Evidence {
                    summary,
                    ..Evidence::default()
                },
            };
        }

        let drift_type = signal
            .extracted_str("drift_type")
            .map(str::to_string)
            .unwrap_or_else(|| infer_drift_type(&old_terms));

        let mut domains = signal.extracted_strings("domains");
        if domains.is_empty() {
            domains.extend(signal.service.clone());
        }

        // merged PRs with paired terms score highest when no confidence was extracted
        let confidence = signal
            .extracted
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or_else(|| {
                let merged = if signal.extracted_bool("merged") == Some(true) { 0.1 } else { 0.0 };
                let pairs = old_terms.len().min(new_terms.len()) as f64;
                (source_base_confidence(&signal.source_type) + merged + (0.05 * pairs).min(0.15))
                    .min(0.95)
            });

        let risk_level = match (signal.extracted_str("risk"), &signal.source_type) {
            (Some("critical"), _) => RiskLevel::Critical,
            (Some("high"), _) => RiskLevel::High,
            (Some("medium"), _) | (None, SourceType::Incident) => RiskLevel::Medium,
            _ => RiskLevel::Low,
        };

        TriageOutput {
            is_drift: true,
            drift_type,
            drift_domains: domains,
            confidence,
            drift_score: confidence,
            risk_level,
            evidence: Evidence {
                summary,
                old_terms,
                new_terms,
            },
        }
    }
}

fn source_base_confidence(source_type: &SourceType) -> f64 {
    match source_type {
        SourceType::GithubPr => 0.6,
        SourceType::Incident => 0.55,
        SourceType::Deploy => 0.45,
        SourceType::SlackThread => 0.4,
        SourceType::Other(_) => 0.3,
    }
}

fn infer_drift_type(old_terms: &[String]) -> String {
    if old_terms.iter().any(|t| t.starts_with('/')) {
        "endpoint_change"
    } else if old_terms.iter().any(|t| t.starts_with("--")) {
        "cli_change"
    } else {
        "behavior_change"
    }
    .to_string()
}

#[async_trait]
impl Agent<TriageInput, TriageOutput> for RuleTriageAgent {
    async fn call(&self, input: &TriageInput) -> AgentResponse<TriageOutput> {
        if self.failures.take() {
            return AgentResponse::failed("triage model overloaded");
        }
        AgentResponse::ok(Self::classify(&input.signal))
    }
}

#[derive(Debug, Clone)]
pub struct DocIndexEntry {
    pub doc: DocCandidate,
    pub keywords: Vec<String>,
}

/// Keyword index over known docs.
#[derive(Default)]
pub struct RuleDocResolver {
    index: Vec<DocIndexEntry>,
    pub failures: FailureBudget,
}

impl RuleDocResolver {
    pub fn new(index: Vec<DocIndexEntry>) -> Self {
        Self {
            index,
            failures: FailureBudget::default(),
        }
    }
}

#[async_trait]
impl Agent<DocResolveInput, DocResolveOutput> for RuleDocResolver {
    async fn call(&self, input: &DocResolveInput) -> AgentResponse<DocResolveOutput> {
        if self.failures.take() {
            return AgentResponse::failed("doc search unavailable");
        }

        let terms: Vec<String> = input
            .key_tokens
            .iter()
            .chain(&input.drift_domains)
            .chain(input.service.iter())
            .map(|t| t.to_lowercase())
            .collect();

        let mut candidates: Vec<DocCandidate> = self
            .index
            .iter()
            .filter(|e| input.doc_systems.contains(&e.doc.doc_system))
            .filter_map(|e| {
                let hits: Vec<&String> = e
                    .keywords
                    .iter()
                    .filter(|k| terms.contains(&k.to_lowercase()))
                    .collect();
                if hits.is_empty() {
                    return None;
                }
                let mut doc = e.doc.clone();
                doc.confidence = (0.4 + 0.15 * hits.len() as f64).min(0.95);
                doc.reason = format!(
                    "matched {}",
                    hits.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(", ")
                );
                Some(doc)
            })
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        AgentResponse::ok(DocResolveOutput { candidates })
    }
}

#[derive(Default)]
pub struct RulePlanner {
    pub failures: FailureBudget,
}

#[async_trait]
impl Agent<PlanInput, PlanOutput> for RulePlanner {
    async fn call(&self, input: &PlanInput) -> AgentResponse<PlanOutput> {
        if self.failures.take() {
            return AgentResponse::failed("planner timed out");
        }
        let plan = heuristic_plan(&input.evidence, &input.context, &input.baseline);
        AgentResponse::ok(PlanOutput {
            target_sections: plan.target_sections,
            intent: plan.intent,
            style: plan.style,
        })
    }
}

/// Replace stale terms, or add a note under the target section.
#[derive(Default)]
pub struct RuleGenerator {
    pub failures: FailureBudget,
}

#[async_trait]
impl Agent<GenerateInput, GeneratedPatch> for RuleGenerator {
    async fn call(&self, input: &GenerateInput) -> AgentResponse<GeneratedPatch> {
        if self.failures.take() {
            return AgentResponse::failed("generator returned no completion");
        }

        let doc = &input.doc;
        if input.plan.style == PatchStyle::ReplaceStaleReference {
            let (updated, replaced) = replace_terms(&doc.content, &input.evidence);
            if replaced > 0 {
                return AgentResponse::ok(GeneratedPatch {
                    unified_diff: render_diff(&doc.doc_id, &doc.content, &updated),
                    summary: format!(
                        "Replace stale references ({replaced} occurrence(s)): {}",
                        input.plan.intent
                    ),
                    confidence: 0.8,
                });
            }
        }

        let note = format!("> Note: {}", input.evidence.summary);
        let updated = insert_after_heading(&doc.content, input.plan.target_sections.first(), &note);
        AgentResponse::ok(GeneratedPatch {
            unified_diff: render_diff(&doc.doc_id, &doc.content, &updated),
            summary: format!("Add note: {}", input.evidence.summary),
            confidence: 0.5,
        })
    }
}

/// Applies `replace <a> with <b>` instructions on top of the current proposal;
/// anything else becomes a note appended to it.
#[derive(Default)]
pub struct RuleEditor {
    pub failures: FailureBudget,
}

#[async_trait]
impl Agent<EditInput, GeneratedPatch> for RuleEditor {
    async fn call(&self, input: &EditInput) -> AgentResponse<GeneratedPatch> {
        if self.failures.take() {
            return AgentResponse::failed("editor timed out");
        }

        let doc: &FetchedDoc = &input.doc;
        let proposed = match UnifiedDiff::parse(&input.current.unified_diff)
            .and_then(|d| d.apply(&doc.content))
        {
            Ok(text) => text,
            Err(e) => return AgentResponse::failed(format!("current proposal unusable: {e}")),
        };

        let updated = match parse_replace(&input.instructions) {
            Some((from, to)) if proposed.contains(&from) => proposed.replace(&from, &to),
            _ => format!(
                "{}{}> Note: {}\n",
                proposed,
                if proposed.ends_with('\n') || proposed.is_empty() { "" } else { "\n" },
                input.instructions.trim()
            ),
        };

        AgentResponse::ok(GeneratedPatch {
            unified_diff: render_diff(&doc.doc_id, &doc.content, &updated),
            summary: format!("{} (edited: {})", input.current.summary, input.instructions.trim()),
            confidence: input.current.confidence,
        })
    }
}

fn replace_terms(content: &str, evidence: &Evidence) -> (String, usize) {
    let mut text = content.to_string();
    let mut replaced = 0;
    for (old, new) in evidence.old_terms.iter().zip(&evidence.new_terms) {
        if old.is_empty() {
            continue;
        }
        replaced += text.matches(old.as_str()).count();
        text = text.replace(old.as_str(), new);
    }
    (text, replaced)
}

fn insert_after_heading(content: &str, heading: Option<&String>, note: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    let position = heading
        .and_then(|h| {
            lines
                .iter()
                .position(|l| l.trim_start_matches('#').trim() == h.as_str())
        })
        .map_or(lines.len(), |i| i + 1);
    lines.insert(position, note);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `replace "a" with "b"` or `replace a with b`.
fn parse_replace(instructions: &str) -> Option<(String, String)> {
    let rest = instructions.trim().strip_prefix("replace ")?;
    let (from, to) = rest.split_once(" with ")?;
    let unquote = |s: &str| s.trim().trim_matches(|c| c == '"' || c == '`').to_string();
    let (from, to) = (unquote(from), unquote(to));
    (!from.is_empty()).then_some((from, to))
}

/// Rule agents wired into an [`Agents`] bundle, with handles kept for fault injection.
pub struct RuleAgents {
    pub triage: Arc<RuleTriageAgent>,
    pub doc_resolver: Arc<RuleDocResolver>,
    pub planner: Arc<RulePlanner>,
    pub generator: Arc<RuleGenerator>,
    pub editor: Arc<RuleEditor>,
}

impl RuleAgents {
    pub fn new(index: Vec<DocIndexEntry>) -> Self {
        Self {
            triage: Arc::new(RuleTriageAgent::default()),
            doc_resolver: Arc::new(RuleDocResolver::new(index)),
            planner: Arc::new(RulePlanner::default()),
            generator: Arc::new(RuleGenerator::default()),
            editor: Arc::new(RuleEditor::default()),
        }
    }

    pub fn agents(&self) -> Agents {
        Agents {
            triage: self.triage.clone(),
            doc_resolver: self.doc_resolver.clone(),
            planner: self.planner.clone(),
            generator: self.generator.clone(),
            editor: self.editor.clone(),
        }
    }
}
