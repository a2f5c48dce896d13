//! Source descriptors and the strategy trait

use crate::errors::{RegistryError, StrategyError};
use crate::normalizer::Normalizer;
use agroadb_data::{Subject, SubjectKind};
use agroadb_resilience::RateLimitConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One concrete way of reaching a source
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short label used in logs and in `Success.strategy`
    fn name(&self) -> &str;

    /// Fetch the raw payload for a subject
    async fn fetch(&self, subject: &Subject) -> Result<serde_json::Value, StrategyError>;
}

/// Broad family a source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    TaxRegistry,
    LandRegistry,
    Environmental,
    Judicial,
    Sanctions,
    Credit,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 6] = [
        SourceCategory::TaxRegistry,
        SourceCategory::LandRegistry,
        SourceCategory::Environmental,
        SourceCategory::Judicial,
        SourceCategory::Sanctions,
        SourceCategory::Credit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::TaxRegistry => "tax_registry",
            SourceCategory::LandRegistry => "land_registry",
            SourceCategory::Environmental => "environmental",
            SourceCategory::Judicial => "judicial",
            SourceCategory::Sanctions => "sanctions",
            SourceCategory::Credit => "credit",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Static description of one external source
///
/// Built once at startup through [`SourceDescriptor::builder`] and never
/// mutated afterwards.
#[derive(Clone)]
pub struct SourceDescriptor {
    name: String,
    display_name: String,
    category: SourceCategory,
    strategies: Vec<Arc<dyn Strategy>>,
    requires_credentials: bool,
    subject_kinds: Vec<SubjectKind>,
    normalizer: Normalizer,
    rate_limit: Option<RateLimitConfig>,
}

impl SourceDescriptor {
    pub fn builder(name: impl Into<String>, normalizer: Normalizer) -> SourceDescriptorBuilder {
        let name = name.into();
        SourceDescriptorBuilder {
            display_name: name.clone(),
            name,
            category: SourceCategory::TaxRegistry,
            strategies: Vec::new(),
            requires_credentials: false,
            subject_kinds: SubjectKind::ALL.to_vec(),
            normalizer,
            rate_limit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> SourceCategory {
        self.category
    }

    /// Fallback chain in declared order
    pub fn strategies(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    pub fn requires_credentials(&self) -> bool {
        self.requires_credentials
    }

    pub fn subject_kinds(&self) -> &[SubjectKind] {
        &self.subject_kinds
    }

    pub fn accepts(&self, kind: SubjectKind) -> bool {
        self.subject_kinds.contains(&kind)
    }

    pub fn normalizer(&self) -> Normalizer {
        self.normalizer
    }

    pub fn rate_limit(&self) -> Option<&RateLimitConfig> {
        self.rate_limit.as_ref()
    }

    /// Serializable summary for listings
    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            category: self.category,
            requires_credentials: self.requires_credentials,
            subject_kinds: self.subject_kinds.clone(),
            strategies: self.strategies.iter().map(|s| s.name().to_string()).collect(),
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("requires_credentials", &self.requires_credentials)
            .field("subject_kinds", &self.subject_kinds)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

pub struct SourceDescriptorBuilder {
    name: String,
    display_name: String,
    category: SourceCategory,
    strategies: Vec<Arc<dyn Strategy>>,
    requires_credentials: bool,
    subject_kinds: Vec<SubjectKind>,
    normalizer: Normalizer,
    rate_limit: Option<RateLimitConfig>,
}

impl SourceDescriptorBuilder {
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn category(mut self, category: SourceCategory) -> Self {
        self.category = category;
        self
    }

    /// Append a strategy to the fallback chain
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn requires_credentials(mut self, requires: bool) -> Self {
        self.requires_credentials = requires;
        self
    }

    /// Restrict to the given subject kinds (default: both)
    pub fn subject_kinds(mut self, kinds: &[SubjectKind]) -> Self {
        self.subject_kinds = kinds.to_vec();
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn build(self) -> Result<SourceDescriptor, RegistryError> {
        if self.strategies.is_empty() {
            return Err(RegistryError::NoStrategies(self.name));
        }
        if self.subject_kinds.is_empty() {
            return Err(RegistryError::NoSubjectKinds(self.name));
        }

        Ok(SourceDescriptor {
            name: self.name,
            display_name: self.display_name,
            category: self.category,
            strategies: self.strategies,
            requires_credentials: self.requires_credentials,
            subject_kinds: self.subject_kinds,
            normalizer: self.normalizer,
            rate_limit: self.rate_limit,
        })
    }
}

/// Listing view of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub display_name: String,
    pub category: SourceCategory,
    pub requires_credentials: bool,
    pub subject_kinds: Vec<SubjectKind>,
    pub strategies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::identity;

    struct Fixed(&'static str);

    #[async_trait]
    impl Strategy for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch(&self, _subject: &Subject) -> Result<serde_json::Value, StrategyError> {
            Ok(serde_json::json!({}))
        }
    }

    #[test]
    fn test_builder_requires_strategy() {
        let err = SourceDescriptor::builder("empty", identity).build().unwrap_err();
        assert_eq!(err, RegistryError::NoStrategies("empty".into()));

        let err = SourceDescriptor::builder("nokind", identity)
            .strategy(Arc::new(Fixed("api")))
            .subject_kinds(&[])
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::NoSubjectKinds("nokind".into()));
    }

    #[test]
    fn test_builder_keeps_strategy_order() {
        let descriptor = SourceDescriptor::builder("receita_cnpj", identity)
            .display_name("Receita Federal - CNPJ")
            .subject_kinds(&[SubjectKind::Cnpj])
            .strategy(Arc::new(Fixed("brasilapi")))
            .strategy(Arc::new(Fixed("receitaws")))
            .build()
            .unwrap();

        let info = descriptor.info();
        assert_eq!(info.strategies, vec!["brasilapi", "receitaws"]);
        assert!(descriptor.accepts(SubjectKind::Cnpj));
        assert!(!descriptor.accepts(SubjectKind::Cpf));
        assert_eq!(info.display_name, "Receita Federal - CNPJ");
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in SourceCategory::ALL {
            assert_eq!(category.as_str().parse::<SourceCategory>(), Ok(category));
        }
        assert!("weather".parse::<SourceCategory>().is_err());
    }
}
