//! Agent ports - 分析エージェントの境界
//!
//! エージェント（triage / doc-resolver / patch-planner / patch-generator /
//! editor-helper）はすべて同じ形: `call(input) -> AgentResponse<O>`。
//! 失敗の扱い（リトライ / フォールバック）はステージ側が決める。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{
    BaselineReport, DocCandidate, DocSystem, Evidence, ExtractedContext, FetchedDoc, PatchPlan,
    PatchProposal, PatchStyle, RiskLevel, SignalEvent,
};

/// Envelope every agent answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> AgentResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// `success` without `data` counts as a failure.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("agent reported success without data".to_string()),
            (false, _) => Err(self.error.unwrap_or_else(|| "agent failed".to_string())),
        }
    }
}

#[async_trait]
pub trait Agent<I: Sync, O: Send>: Send + Sync {
    async fn call(&self, input: &I) -> AgentResponse<O>;
}

// ========================================
// triage
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageInput {
    pub signal: SignalEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutput {
    pub is_drift: bool,
    #[serde(default)]
    pub drift_type: String,
    #[serde(default)]
    pub drift_domains: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub drift_score: f64,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub evidence: Evidence,
}

// ========================================
// doc resolver
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocResolveInput {
    pub service: Option<String>,
    pub repo: Option<String>,
    pub drift_type: Option<String>,
    pub drift_domains: Vec<String>,
    pub key_tokens: Vec<String>,
    /// Only these systems may be proposed.
    pub doc_systems: Vec<DocSystem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocResolveOutput {
    pub candidates: Vec<DocCandidate>,
}

// ========================================
// patch planner
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInput {
    pub drift_type: Option<String>,
    pub evidence: Evidence,
    pub context: ExtractedContext,
    pub baseline: BaselineReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub target_sections: Vec<String>,
    pub intent: String,
    pub style: PatchStyle,
}

// ========================================
// patch generator / editor helper
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInput {
    pub doc: FetchedDoc,
    pub plan: PatchPlan,
    pub evidence: Evidence,
    pub context: ExtractedContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditInput {
    pub doc: FetchedDoc,
    pub current: PatchProposal,
    pub instructions: String,
}

/// What both the generator and the editor produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPatch {
    pub unified_diff: String,
    pub summary: String,
    pub confidence: f64,
}

/// The five agents a stage set needs.
#[derive(Clone)]
pub struct Agents {
    pub triage: Arc<dyn Agent<TriageInput, TriageOutput>>,
    pub doc_resolver: Arc<dyn Agent<DocResolveInput, DocResolveOutput>>,
    pub planner: Arc<dyn Agent<PlanInput, PlanOutput>>,
    pub generator: Arc<dyn Agent<GenerateInput, GeneratedPatch>>,
    pub editor: Arc<dyn Agent<EditInput, GeneratedPatch>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_treats_missing_data_as_failure() {
        let empty: AgentResponse<u32> = AgentResponse {
            success: true,
            data: None,
            error: None,
        };
        assert!(empty.into_result().is_err());

        assert_eq!(AgentResponse::ok(7).into_result(), Ok(7));
        assert_eq!(
            AgentResponse::<u32>::failed("rate limited").into_result(),
            Err("rate limited".to_string())
        );
    }

    #[test]
    fn response_uses_success_data_error_shape() {
        let json = serde_json::to_value(AgentResponse::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 1 }));
    }
}
