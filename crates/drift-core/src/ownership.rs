//! Ownership resolver.
//!
//! Sources in priority order: explicit service mapping, repository metadata
//! (longest repo prefix), workspace default. First hit is `primary`; the next
//! hit with a different target is `fallback`.

use crate::config::ServiceMappings;
use crate::domain::{OwnerHit, OwnerResolution, OwnerSourceKind};
use crate::ports::TenantCapabilities;

pub struct OwnershipResolver {
    mappings: ServiceMappings,
}

impl OwnershipResolver {
    pub fn new(mappings: ServiceMappings) -> Self {
        Self { mappings }
    }

    pub fn resolve_owner(
        &self,
        service: Option<&str>,
        repo: Option<&str>,
        capabilities: &TenantCapabilities,
    ) -> OwnerResolution {
        let mut sources = Vec::new();

        if let Some(service) = service
            && let Some(target) = self.mappings.owners.get(service)
        {
            sources.push(OwnerHit {
                source: OwnerSourceKind::ExplicitMapping,
                target: target.clone(),
                matched: service.to_string(),
            });
        }

        if let Some(repo) = repo
            && let Some(rule) = self
                .mappings
                .repo_owners
                .iter()
                .filter(|r| repo.starts_with(&r.prefix))
                // max_by_key keeps the last max; rev() makes the first listed rule win ties
                .rev()
                .max_by_key(|r| r.prefix.len())
        {
            sources.push(OwnerHit {
                source: OwnerSourceKind::RepoMetadata,
                target: rule.target.clone(),
                matched: rule.prefix.clone(),
            });
        }

        if let Some(target) = &capabilities.workspace_default_owner {
            sources.push(OwnerHit {
                source: OwnerSourceKind::WorkspaceDefault,
                target: target.clone(),
                matched: "workspace".to_string(),
            });
        }

        let primary = sources.first().map(|h| h.target.clone());
        let fallback = primary.as_ref().and_then(|p| {
            sources
                .iter()
                .map(|h| &h.target)
                .find(|t| *t != p)
                .cloned()
        });

        OwnerResolution {
            primary,
            fallback,
            sources,
        }
    }
}
