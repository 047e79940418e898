//! Dedup, doc resolution, fetch, context slicing and the baseline check.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::app::dispatcher::StageHandler;
use crate::app::services::StageContext;
use crate::domain::{
    BaselineMatch, BaselineReport, CandidateState, DocCandidate, DocSection, DriftCandidate,
    ErrorCode, Evidence, ExtractedContext, FetchedDoc, MatchKind, Resolution, StageError,
    StageFinding,
};
use crate::fingerprint::{check_duplicate, compute_fingerprint, evidence_tokens};
use crate::ports::{Clock, DocResolveInput, FingerprintClaim};

use super::{doc_error, fetched_doc, load_signal, missing, store_unavailable};

const EXCERPT_CHARS: usize = 160;

/// Fingerprint, dedup, claim, then resolve target docs.
///
/// The fingerprint is only written (claimed) once the dedup check passed; a
/// lost claim means another candidate got there first and this one is a
/// duplicate of it.
pub struct DedupAndResolveStage;

#[async_trait]
impl StageHandler for DedupAndResolveStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let services = ctx.services;
        let config = &services.config;
        let signal = load_signal(candidate, ctx).await?;
        let drift_type = candidate.drift_type.clone().unwrap_or_default();
        let key_tokens = evidence_tokens(&candidate.evidence, config.key_token_limit);

        let fingerprint = compute_fingerprint(
            &candidate.tenant_id,
            signal.service.as_deref(),
            &drift_type,
            &candidate.drift_domains,
            &key_tokens,
            config.key_token_limit,
        );

        let holder = services
            .store
            .fingerprint_holder(&candidate.tenant_id, &fingerprint)
            .await
            .map_err(store_unavailable)?;
        let check = check_duplicate(candidate, holder.as_ref(), config.renotify_confidence_delta);

        if check.is_duplicate
            && !check.should_notify
            && let Some(of) = check.existing_candidate_id
        {
            info!(duplicate_of = %of, reason = %check.reason, "duplicate suppressed");
            candidate.duplicate_of = Some(of);
            return Ok(candidate.complete_with(Resolution::Duplicate { of }));
        }

        let supersedes = check.existing_candidate_id.filter(|_| check.is_duplicate);
        let claim = services
            .store
            .claim_fingerprint(&candidate.tenant_id, &fingerprint, candidate.id, supersedes)
            .await
            .map_err(store_unavailable)?;
        if let FingerprintClaim::HeldBy(of) = claim {
            info!(duplicate_of = %of, "fingerprint claimed by another candidate");
            candidate.duplicate_of = Some(of);
            return Ok(candidate.complete_with(Resolution::Duplicate { of }));
        }

        if candidate.fingerprint.is_none() {
            candidate.fingerprint = Some(fingerprint);
        }
        if let Some(of) = supersedes {
            info!(duplicate_of = %of, reason = %check.reason, "re-notifying duplicate");
            candidate.duplicate_of = Some(of);
        }

        let doc_systems: Vec<_> = ctx
            .capabilities
            .doc_systems
            .iter()
            .copied()
            .filter(|s| services.docs.supports(*s))
            .collect();
        let input = DocResolveInput {
            service: signal.service.clone(),
            repo: signal.repo.clone(),
            drift_type: candidate.drift_type.clone(),
            drift_domains: candidate.drift_domains.clone(),
            key_tokens,
            doc_systems: doc_systems.clone(),
        };

        let explicit: Vec<DocCandidate> = config
            .mappings
            .docs_for(signal.service.as_deref())
            .iter()
            .filter(|m| doc_systems.contains(&m.doc_system))
            .map(|m| DocCandidate {
                doc_system: m.doc_system,
                doc_id: m.doc_id.clone(),
                title: m.title.clone(),
                confidence: 1.0,
                reason: "explicit service mapping".to_string(),
            })
            .collect();

        let resolved = match services.agents.doc_resolver.call(&input).await.into_result() {
            Ok(output) => output.candidates,
            Err(e) if explicit.is_empty() => {
                return Err(StageError::terminal(
                    ErrorCode::NoDocMapping,
                    format!("doc resolver failed ({e}) and no explicit mapping exists"),
                ));
            }
            Err(e) => {
                debug!(error = %e, "doc resolver failed, using explicit mappings");
                Vec::new()
            }
        };

        let mut docs = explicit;
        for doc in resolved {
            let known = docs
                .iter()
                .any(|d| d.doc_system == doc.doc_system && d.doc_id == doc.doc_id);
            if !known && doc_systems.contains(&doc.doc_system) {
                docs.push(doc);
            }
        }
        docs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!(docs = docs.len(), "docs resolved");
        candidate.doc_candidates = docs;
        Ok(CandidateState::DocsResolved)
    }
}

/// Fetch the best doc candidate above the confidence floor.
pub struct FetchStage;

#[async_trait]
impl StageHandler for FetchStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let services = ctx.services;
        let best = candidate
            .doc_candidates
            .iter()
            .filter(|d| d.confidence >= services.config.doc_min_confidence)
            .find(|d| ctx.capabilities.allows(d.doc_system) && services.docs.supports(d.doc_system))
            .cloned();
        let Some(best) = best else {
            return Ok(candidate.complete_with(Resolution::NoDocs));
        };

        let adapter = services.docs.get(best.doc_system).ok_or_else(|| {
            StageError::terminal(
                ErrorCode::NoDocMapping,
                format!("no adapter for {}", best.doc_system),
            )
        })?;
        let content = adapter.fetch(&best.doc_id).await.map_err(doc_error)?;

        debug!(doc_id = %best.doc_id, revision = %content.revision, "doc fetched");
        candidate.set_finding(StageFinding::FetchedDoc(FetchedDoc {
            doc_system: best.doc_system,
            doc_id: best.doc_id,
            title: if content.title.is_empty() { best.title } else { content.title },
            content: content.content,
            revision: content.revision,
            fetched_at: services.clock.now(),
        }));
        Ok(CandidateState::DocsFetched)
    }
}

pub struct ContextStage;

#[async_trait]
impl StageHandler for ContextStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let config = &ctx.services.config;
        let doc = fetched_doc(candidate)?;
        let context = extract_context(
            doc,
            &candidate.evidence,
            config.context_max_sections,
            config.context_max_section_chars,
        );
        candidate.set_finding(StageFinding::ExtractedContext(context));
        Ok(CandidateState::DocContextExtracted)
    }
}

pub struct BaselineStage;

#[async_trait]
impl StageHandler for BaselineStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        _ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let doc = fetched_doc(candidate)?;
        if candidate.extracted_context().is_none() {
            return Err(missing("extracted context"));
        }
        let report = baseline_report(&doc.content, &candidate.evidence);
        debug!(
            stale = report.stale_references().count(),
            matches = report.matches.len(),
            "baseline checked"
        );
        candidate.set_finding(StageFinding::BaselineMatch(report));
        Ok(CandidateState::BaselineChecked)
    }
}

/// Slice markdown into heading-delimited sections and keep the most relevant.
///
/// A section's score is the number of evidence-term occurrences in it. The
/// top `max_sections` by score are kept (earlier sections win ties) and
/// returned in document order, each truncated to `max_chars`.
pub fn extract_context(
    doc: &FetchedDoc,
    evidence: &Evidence,
    max_sections: usize,
    max_chars: usize,
) -> ExtractedContext {
    let terms: Vec<String> = evidence
        .old_terms
        .iter()
        .chain(&evidence.new_terms)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    let mut sections: Vec<DocSection> = Vec::new();
    let mut current: Option<(String, usize, Vec<&str>)> = None;

    for (idx, line) in doc.content.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(heading) = heading_text(line) {
            if let Some((h, start, body)) = current.take() {
                sections.push(section(h, start, line_no - 1, &body, &terms, max_chars));
            }
            current = Some((heading.to_string(), line_no, vec![line]));
        } else {
            match current.as_mut() {
                Some((_, _, body)) => body.push(line),
                None => current = Some((String::new(), line_no, vec![line])),
            }
        }
    }
    if let Some((h, start, body)) = current.take() {
        let end = start + body.len() - 1;
        sections.push(section(h, start, end, &body, &terms, max_chars));
    }

    let mut ranked: Vec<usize> = (0..sections.len()).collect();
    ranked.sort_by(|&a, &b| sections[b].score.cmp(&sections[a].score).then(a.cmp(&b)));
    ranked.truncate(max_sections);
    ranked.sort_unstable();

    ExtractedContext {
        doc_id: doc.doc_id.clone(),
        sections: ranked.into_iter().map(|i| sections[i].clone()).collect(),
    }
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed.trim_start_matches('#');
    let level = trimmed.len() - rest.len();
    ((1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(' ')))
        .then(|| rest.trim())
}

fn section(
    heading: String,
    start_line: usize,
    end_line: usize,
    body: &[&str],
    terms: &[String],
    max_chars: usize,
) -> DocSection {
    let text = body.join("\n");
    let lower = text.to_lowercase();
    let score = terms
        .iter()
        .map(|t| lower.matches(t.as_str()).count() as u32)
        .sum();
    DocSection {
        heading,
        start_line,
        end_line,
        text: text.chars().take(max_chars).collect(),
        score,
    }
}

/// Line-level scan for old terms (stale) and new terms (already documented).
pub fn baseline_report(content: &str, evidence: &Evidence) -> BaselineReport {
    let mut matches = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let tagged = evidence
            .old_terms
            .iter()
            .map(|t| (t, MatchKind::StaleReference))
            .chain(evidence.new_terms.iter().map(|t| (t, MatchKind::AlreadyDocumented)));
        for (term, kind) in tagged {
            if !term.is_empty() && line.contains(term.as_str()) {
                matches.push(BaselineMatch {
                    term: term.clone(),
                    kind,
                    line: idx + 1,
                    excerpt: line.trim().chars().take(EXCERPT_CHARS).collect(),
                });
            }
        }
    }
    BaselineReport { matches }
}
