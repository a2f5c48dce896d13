//! Source registry
//!
//! Built mutably at startup, then frozen into an `Arc` and shared read-only
//! by every lookup. There is no way to register a source through the frozen
//! handle, so concurrent lookups never need a lock.

use crate::descriptor::{SourceCategory, SourceDescriptor, SourceInfo};
use crate::errors::{NormalizationError, RegistryError};
use crate::normalizer::Payload;
use agroadb_data::SubjectKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability filter for [`SourceRegistry::list_sources`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    RequiresNoCredentials,
    RequiresCredentials,
    Category(SourceCategory),
    Accepts(SubjectKind),
}

impl SourceFilter {
    pub fn matches(&self, descriptor: &SourceDescriptor) -> bool {
        match self {
            SourceFilter::RequiresNoCredentials => !descriptor.requires_credentials(),
            SourceFilter::RequiresCredentials => descriptor.requires_credentials(),
            SourceFilter::Category(category) => descriptor.category() == *category,
            SourceFilter::Accepts(kind) => descriptor.accepts(*kind),
        }
    }

    /// Parse the query-string form: `no_credentials`, `credentials`,
    /// `cpf`, `cnpj` or a category name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "no_credentials" | "requires_no_credentials" => Some(Self::RequiresNoCredentials),
            "credentials" | "requires_credentials" => Some(Self::RequiresCredentials),
            "cpf" => Some(Self::Accepts(SubjectKind::Cpf)),
            "cnpj" => Some(Self::Accepts(SubjectKind::Cnpj)),
            other => other.parse().ok().map(Self::Category),
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
    index: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source; its position becomes its report position
    pub fn register(&mut self, descriptor: SourceDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateSource(descriptor.name().to_string()));
        }

        debug!(
            source = descriptor.name(),
            strategies = descriptor.strategies().len(),
            position = self.sources.len(),
            "Source registered"
        );
        self.index
            .insert(descriptor.name().to_string(), self.sources.len());
        self.sources.push(descriptor);
        Ok(())
    }

    /// End of initialization; the registry is read-only from here on
    pub fn freeze(self) -> Arc<SourceRegistry> {
        Arc::new(self)
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.index.get(name).map(|&i| &self.sources[i])
    }

    /// Registration position of a source
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get_index(&self, index: usize) -> Option<&SourceDescriptor> {
        self.sources.get(index)
    }

    /// Sources in registration order, optionally filtered
    pub fn list_sources(&self, filter: Option<&SourceFilter>) -> Vec<&SourceDescriptor> {
        self.sources
            .iter()
            .filter(|d| filter.map_or(true, |f| f.matches(d)))
            .collect()
    }

    pub fn infos(&self, filter: Option<&SourceFilter>) -> Vec<SourceInfo> {
        self.list_sources(filter)
            .into_iter()
            .map(SourceDescriptor::info)
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(SourceDescriptor::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Run the named source's normalizer over a raw payload
    pub fn normalize(
        &self,
        source_name: &str,
        raw: &serde_json::Value,
    ) -> Result<Payload, NormalizationError> {
        let descriptor = self
            .get(source_name)
            .ok_or_else(|| NormalizationError::UnknownSource(source_name.to_string()))?;
        (descriptor.normalizer())(raw)
    }
}
