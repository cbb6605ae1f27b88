use std::collections::HashMap;

use mender_config::ProvidersConfig;
use mender_core::{Fix, Issue, Language};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::validator::is_structurally_valid;

/// Read-only inputs handed to a provider for one issue.
#[derive(Debug, Clone, Copy)]
pub struct FixContext<'a> {
    pub file_content: &'a str,
    pub file_path: &'a str,
    pub language: Option<Language>,
    pub issue: &'a Issue,
    pub config: &'a ProvidersConfig,
}

/// A source of fixes for a static set of issue types.
///
/// Providers are stateless: `generate_fix` must derive everything from the
/// context and never touch the filesystem.
pub trait FixProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_types(&self) -> &'static [&'static str];

    fn can_fix(&self, issue: &Issue) -> bool {
        self.supported_types().contains(&issue.issue_type.as_str())
    }

    /// `Ok(None)` means no fix applies to this particular instance.
    fn generate_fix(
        &self,
        issue: &Issue,
        context: &FixContext<'_>,
    ) -> Result<Option<Fix>, ProviderError>;

    fn validate_fix(&self, fix: &Fix) -> bool {
        is_structurally_valid(fix)
    }
}

/// Name-keyed providers in registration order, with an index from issue type
/// to the first provider that claimed it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn FixProvider>>,
    by_type: HashMap<&'static str, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering a name that already exists replaces that provider in place,
    /// keeping its original position.
    pub fn register(&mut self, provider: Box<dyn FixProvider>) {
        let name = provider.name();
        match self.providers.iter().position(|existing| existing.name() == name) {
            Some(index) => {
                debug!(provider = name, "replacing registered fix provider");
                self.providers[index] = provider;
            }
            None => self.providers.push(provider),
        }
        self.rebuild_index();
    }

    pub fn get(&self, name: &str) -> Option<&dyn FixProvider> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
            .map(Box::as_ref)
    }

    /// First registered provider that can fix `issue`.
    pub fn provider_for(&self, issue: &Issue) -> Option<&dyn FixProvider> {
        let index = *self.by_type.get(issue.issue_type.as_str())?;
        let provider = self.providers.get(index)?;
        provider.can_fix(issue).then_some(provider.as_ref())
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn FixProvider> {
        self.providers
            .iter()
            .map(|provider| -> &dyn FixProvider { provider.as_ref() })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn rebuild_index(&mut self) {
        self.by_type.clear();
        for (index, provider) in self.providers.iter().enumerate() {
            for issue_type in provider.supported_types() {
                match self.by_type.get(issue_type) {
                    Some(&owner) => warn!(
                        issue_type = *issue_type,
                        provider = provider.name(),
                        owner = self.providers[owner].name(),
                        "issue type already claimed by an earlier provider; shadowed"
                    ),
                    None => {
                        self.by_type.insert(*issue_type, index);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
