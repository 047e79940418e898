//! Notification router: confidence band + risk + owner -> routing decision.

use crate::config::RoutingConfig;
use crate::domain::{OwnerTarget, Priority, RiskLevel, RoutingAction, RoutingDecision, SourceType};
use crate::error::ConfigError;

pub struct NotificationRouter {
    config: RoutingConfig,
}

impl NotificationRouter {
    /// Fails if any threshold set is not strictly descending.
    pub fn new(config: RoutingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn route(
        &self,
        confidence: f64,
        risk_level: RiskLevel,
        owner: Option<&OwnerTarget>,
        source_type: &SourceType,
    ) -> RoutingDecision {
        let t = self.config.thresholds_for(source_type);

        let (mut action, mut priority, mut reason) = if confidence >= t.auto_approve {
            (
                RoutingAction::AutoApprove,
                Priority::Normal,
                format!("confidence {confidence:.2} >= auto_approve {:.2}", t.auto_approve),
            )
        } else if confidence >= t.slack_notify {
            (
                RoutingAction::Notify,
                Priority::Normal,
                format!("confidence {confidence:.2} >= slack_notify {:.2}", t.slack_notify),
            )
        } else if confidence >= t.digest_only {
            (
                RoutingAction::Digest,
                Priority::Normal,
                format!("confidence {confidence:.2} >= digest_only {:.2}", t.digest_only),
            )
        } else if confidence >= t.ignore {
            (
                RoutingAction::Digest,
                Priority::Low,
                format!("confidence {confidence:.2} >= ignore {:.2}", t.ignore),
            )
        } else {
            (
                RoutingAction::Ignore,
                Priority::Low,
                format!("confidence {confidence:.2} < ignore {:.2}", t.ignore),
            )
        };

        if action == RoutingAction::AutoApprove && risk_level.is_elevated() {
            action = RoutingAction::Notify;
            reason.push_str("; auto-approve downgraded for elevated risk");
        }

        if action != RoutingAction::Ignore {
            priority = priority.max(match risk_level {
                RiskLevel::Critical => Priority::Urgent,
                RiskLevel::High => Priority::High,
                RiskLevel::Medium | RiskLevel::Low => Priority::Low,
            });
        }

        let notifies_owner = matches!(action, RoutingAction::Notify | RoutingAction::AutoApprove);
        if notifies_owner && owner.is_none() {
            action = RoutingAction::Digest;
            reason = "no_owner".to_string();
        }

        let channel = match action {
            RoutingAction::Notify | RoutingAction::AutoApprove => owner.cloned(),
            RoutingAction::Digest | RoutingAction::Ignore => None,
        };

        RoutingDecision {
            action,
            should_notify: action != RoutingAction::Ignore,
            channel,
            priority,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingThresholds;
    use rstest::rstest;

    fn router() -> NotificationRouter {
        NotificationRouter::new(RoutingConfig::default()).unwrap()
    }

    fn owner() -> OwnerTarget {
        OwnerTarget::new("#docs")
    }

    #[rstest]
    #[case(0.95, RoutingAction::AutoApprove, Priority::Normal, true)]
    #[case(0.90, RoutingAction::AutoApprove, Priority::Normal, true)]
    #[case(0.75, RoutingAction::Notify, Priority::Normal, true)]
    #[case(0.45, RoutingAction::Digest, Priority::Normal, true)]
    #[case(0.25, RoutingAction::Digest, Priority::Low, true)]
    #[case(0.10, RoutingAction::Ignore, Priority::Low, false)]
    fn confidence_bands(
        #[case] confidence: f64,
        #[case] action: RoutingAction,
        #[case] priority: Priority,
        #[case] should_notify: bool,
    ) {
        let owner = owner();
        let d = router().route(confidence, RiskLevel::Low, Some(&owner), &SourceType::GithubPr);
        assert_eq!(d.action, action);
        assert_eq!(d.priority, priority);
        assert_eq!(d.should_notify, should_notify);
    }

    #[rstest]
    #[case(RiskLevel::High, RoutingAction::Notify, Priority::High)]
    #[case(RiskLevel::Critical, RoutingAction::Notify, Priority::Urgent)]
    #[case(RiskLevel::Medium, RoutingAction::AutoApprove, Priority::Normal)]
    fn risk_adjusts_auto_approve(
        #[case] risk: RiskLevel,
        #[case] action: RoutingAction,
        #[case] priority: Priority,
    ) {
        let owner = owner();
        let d = router().route(0.97, risk, Some(&owner), &SourceType::GithubPr);
        assert_eq!(d.action, action);
        assert_eq!(d.priority, priority);
    }

    #[test]
    fn missing_owner_degrades_to_digest() {
        let d = router().route(0.8, RiskLevel::Low, None, &SourceType::GithubPr);
        assert_eq!(d.action, RoutingAction::Digest);
        assert_eq!(d.reason, "no_owner");
        assert_eq!(d.channel, None);
    }

    #[test]
    fn per_source_thresholds_apply() {
        let owner = owner();
        let d = router().route(0.95, RiskLevel::Low, Some(&owner), &SourceType::Incident);
        assert_eq!(d.action, RoutingAction::Notify);
        assert_eq!(d.channel, Some(owner));
    }

    #[test]
    fn router_is_monotonic_in_confidence() {
        let router = router();
        let owner = owner();
        for risk in [RiskLevel::Low, RiskLevel::High] {
            for source in [SourceType::GithubPr, SourceType::Incident] {
                for with_owner in [true, false] {
                    let target = with_owner.then_some(&owner);
                    let mut last = 0;
                    for step in 0..=100 {
                        let c = step as f64 / 100.0;
                        let a = router.route(c, risk, target, &source).action.aggressiveness();
                        assert!(a >= last, "not monotonic at {c} ({risk:?}, {source})");
                        last = a;
                    }
                }
            }
        }
    }

    #[test]
    fn constructor_rejects_unordered_thresholds() {
        let config = RoutingConfig {
            default: RoutingThresholds {
                auto_approve: 0.5,
                slack_notify: 0.6,
                digest_only: 0.4,
                ignore: 0.2,
            },
            ..RoutingConfig::default()
        };
        assert!(NotificationRouter::new(config).is_err());
    }
}
