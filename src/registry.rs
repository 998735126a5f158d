use std::collections::HashSet;
use std::sync::Arc;

use sms_core::{ProviderAdapter, SmsError};
use tracing::{debug, warn};

use crate::config::{DispatchConfig, ProvidersConfig};

/// Ordered set of gateways the engine may dispatch to.
///
/// Adapters are registered once and shared as `Arc` singletons; every lookup
/// hands out the same instance.
#[derive(Clone)]
pub struct ProviderRegistry {
    entries: Vec<(String, Arc<dyn ProviderAdapter>)>,
    default: usize,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_all())
            .field("default", &self.default_id())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build every configured provider and register them in `dispatch.order`.
    ///
    /// Configured providers missing from the order are appended after it.
    pub fn from_config(
        providers: &ProvidersConfig,
        dispatch: &DispatchConfig,
    ) -> Result<Self, SmsError> {
        let mut configured = providers.build_adapters()?;
        let mut builder = Self::builder();

        for name in &dispatch.order {
            if let Some(pos) = configured.iter().position(|a| a.provider() == name.as_str()) {
                builder = builder.register_adapter(configured.remove(pos));
            } else {
                debug!("provider {} listed in dispatch order but not configured", name);
            }
        }
        for adapter in configured {
            builder = builder.register_adapter(adapter);
        }

        builder.default_provider(&dispatch.default_provider).build()
    }

    /// Resolve `name` to its adapter, falling back to the default for unknown names.
    pub fn resolve(&self, name: &str) -> Arc<dyn ProviderAdapter> {
        Arc::clone(&self.entries[self.index_of(name)].1)
    }

    /// The registered id `resolve(name)` maps to.
    pub fn resolve_id(&self, name: &str) -> &str {
        &self.entries[self.index_of(name)].0
    }

    pub fn default_id(&self) -> &str {
        &self.entries[self.default].0
    }

    pub fn default_adapter(&self) -> Arc<dyn ProviderAdapter> {
        Arc::clone(&self.entries[self.default].1)
    }

    /// Known ids in declared order.
    pub fn list_all(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether `name` may be chosen as a failover target. Unknown names are not.
    pub fn is_eligible_for_failover(&self, name: &str) -> bool {
        self.position(name)
            .map(|idx| self.entries[idx].1.allows_failover())
            .unwrap_or(false)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(id, _)| id == name)
    }

    fn index_of(&self, name: &str) -> usize {
        match self.position(name) {
            Some(idx) => idx,
            None => {
                warn!(
                    "unknown provider {:?}, falling back to default {}",
                    name,
                    self.default_id()
                );
                self.default
            }
        }
    }
}

/// Builder for [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    entries: Vec<(String, Arc<dyn ProviderAdapter>)>,
    default: Option<String>,
}

impl ProviderRegistryBuilder {
    /// Register `adapter` under an explicit id.
    pub fn register(mut self, id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.entries.push((id.into(), adapter));
        self
    }

    /// Register `adapter` under its own provider key.
    pub fn register_adapter(self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let id = adapter.provider();
        self.register(id, adapter)
    }

    /// Provider used when no driver, or an unknown one, is requested.
    /// Defaults to the first registered provider.
    pub fn default_provider(mut self, id: impl Into<String>) -> Self {
        self.default = Some(id.into());
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, SmsError> {
        if self.entries.is_empty() {
            return Err(SmsError::Configuration("no SMS provider configured".into()));
        }

        let mut seen = HashSet::new();
        for (id, _) in &self.entries {
            if !seen.insert(id.as_str()) {
                return Err(SmsError::Configuration(format!(
                    "provider {id} registered twice"
                )));
            }
        }

        let default = match &self.default {
            Some(name) => self
                .entries
                .iter()
                .position(|(id, _)| id == name)
                .ok_or_else(|| {
                    SmsError::Configuration(format!("default provider {name} is not registered"))
                })?,
            None => 0,
        };

        Ok(ProviderRegistry {
            entries: self.entries,
            default,
        })
    }
}
