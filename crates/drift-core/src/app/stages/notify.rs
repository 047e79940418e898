//! Ownership, routing, notification and the human gate.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::app::dispatcher::StageHandler;
use crate::app::services::StageContext;
use crate::domain::{
    CandidateState, DriftCandidate, ErrorCode, NotificationReceipt, OwnerTarget, PatchProposal,
    Resolution, RoutingAction, RoutingDecision, SourceType, StageError,
};
use crate::ports::Clock;

use super::{latest_proposal, load_signal, missing};

/// Fails on an invalid validation report, otherwise resolves the owner.
pub struct OwnerStage;

#[async_trait]
impl StageHandler for OwnerStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let report = candidate
            .validation()
            .ok_or_else(|| missing("validation report"))?;
        if !report.passed() {
            let failed: Vec<String> = report
                .failures()
                .map(|c| format!("{} ({})", c.name, c.detail))
                .collect();
            return Err(StageError::terminal(
                ErrorCode::PatchValidationFailed,
                failed.join("; "),
            ));
        }

        let signal = load_signal(candidate, ctx).await?;
        let resolution = ctx.services.ownership.resolve_owner(
            signal.service.as_deref(),
            signal.repo.as_deref(),
            ctx.capabilities,
        );
        debug!(
            primary = resolution.primary.as_ref().map(OwnerTarget::as_str),
            fallback = resolution.fallback.as_ref().map(OwnerTarget::as_str),
            "owner resolved"
        );
        candidate.owner_resolution = Some(resolution);
        Ok(CandidateState::OwnerResolved)
    }
}

/// Routes the candidate and, for notifying actions, messages the owner.
/// Digest-band candidates get a short digest entry and complete.
///
/// The fallback owner is tried when the primary send fails; if both fail
/// the stage is retried.
pub struct RouteAndSendStage;

#[async_trait]
impl StageHandler for RouteAndSendStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let services = ctx.services;
        let signal = load_signal(candidate, ctx).await?;
        let owners = candidate.owner_resolution.clone().unwrap_or_default();

        let decision = services.router.route(
            candidate.confidence,
            candidate.risk_level,
            owners.primary.as_ref(),
            &signal.source_type,
        );
        debug!(action = ?decision.action, priority = ?decision.priority, reason = %decision.reason, "routed");
        candidate.routing = Some(decision.clone());

        if !ctx.capabilities.notifications_enabled {
            return Ok(candidate.complete_with(Resolution::RoutingSuppressed {
                reason: "notifications_disabled".to_string(),
            }));
        }
        match decision.action {
            RoutingAction::Ignore => {
                return Ok(candidate.complete_with(Resolution::RoutingSuppressed {
                    reason: decision.reason,
                }));
            }
            RoutingAction::Digest => {
                let (text, blocks) = render_digest(candidate, &signal.source_type, &decision);
                // owner first, then the shared digest channel
                let targets = owners
                    .primary
                    .iter()
                    .chain(owners.fallback.iter())
                    .chain(std::iter::once(&services.config.digest_channel));
                candidate.notification = Some(deliver(ctx, targets, &text, &blocks).await?);
                info!("added to digest");
                return Ok(candidate.complete_with(Resolution::Digest));
            }
            RoutingAction::Notify | RoutingAction::AutoApprove => {}
        }

        let proposal = latest_proposal(candidate, ctx).await?;
        let (text, blocks) = render_message(candidate, &proposal, &decision);

        let targets = decision.channel.iter().chain(owners.fallback.iter());
        candidate.notification = Some(deliver(ctx, targets, &text, &blocks).await?);
        Ok(CandidateState::SlackSent)
    }
}

/// Sends to each distinct target in turn until one accepts.
async fn deliver<'t>(
    ctx: &StageContext<'_>,
    targets: impl Iterator<Item = &'t OwnerTarget>,
    text: &str,
    blocks: &[serde_json::Value],
) -> Result<NotificationReceipt, StageError> {
    let services = ctx.services;
    let mut tried: Vec<&OwnerTarget> = Vec::new();
    let mut last_error = String::from("no notification target");
    for target in targets {
        if tried.contains(&target) {
            continue;
        }
        tried.push(target);

        let result = services.notifier.send(target, text, blocks).await;
        if result.ok {
            info!(channel = %target, "notified");
            return Ok(NotificationReceipt {
                target: target.clone(),
                ts: result.ts,
                sent_at: services.clock.now(),
            });
        }
        last_error = result.error.unwrap_or_else(|| "send failed".to_string());
        warn!(channel = %target, error = %last_error, "notification failed");
    }
    Err(StageError::retryable(ErrorCode::NotificationFailed, last_error))
}

/// Hands the candidate to a human, unless auto-approval applies.
pub struct GateStage;

#[async_trait]
impl StageHandler for GateStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let auto = candidate
            .routing
            .as_ref()
            .is_some_and(|r| r.action == RoutingAction::AutoApprove);
        if auto && ctx.services.config.auto_approve_writeback {
            info!("auto-approved");
            return Ok(CandidateState::Approved);
        }
        Ok(CandidateState::AwaitingHuman)
    }
}

fn render_message(
    candidate: &DriftCandidate,
    proposal: &PatchProposal,
    decision: &RoutingDecision,
) -> (String, Vec<serde_json::Value>) {
    let text = format!(
        "[{:?}] Documentation drift in {}: {} (confidence {:.2})",
        decision.priority, proposal.doc_title, proposal.summary, candidate.confidence
    );
    let mut blocks = vec![
        json!({ "type": "section", "text": text }),
        json!({ "type": "diff", "doc_id": proposal.doc_id, "diff": proposal.unified_diff }),
        json!({
            "type": "actions",
            "candidate_id": candidate.id.to_string(),
            "actions": ["approve", "edit", "reject"],
        }),
    ];
    if let Some(of) = candidate.duplicate_of {
        blocks.push(json!({ "type": "context", "text": format!("supersedes {of}") }));
    }
    (text, blocks)
}

fn render_digest(
    candidate: &DriftCandidate,
    source_type: &SourceType,
    decision: &RoutingDecision,
) -> (String, Vec<serde_json::Value>) {
    let doc = candidate.fetched_doc();
    let text = format!(
        "Digest: possible {} drift in {} from {} (confidence {:.2})",
        candidate.drift_type.as_deref().unwrap_or("doc"),
        doc.map_or("an unresolved doc", |d| d.title.as_str()),
        source_type.as_str(),
        candidate.confidence
    );
    let blocks = vec![json!({
        "type": "digest",
        "candidate_id": candidate.id.to_string(),
        "doc_id": doc.map(|d| d.doc_id.as_str()),
        "reason": decision.reason,
    })];
    (text, blocks)
}
