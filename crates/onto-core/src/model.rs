//! Ontology data model
//!
//! Entities, relationships, the ontology graph that owns them, derived
//! statistics, and the critic's score record. Field names are the exchange
//! shape and only evolve additively.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExtractionStrategy;

/// Property key recording which matcher family produced an entity
pub const PROP_MATCHER: &str = "matcher";
/// Property key recording whether a domain-specific (not generic) pattern matched
pub const PROP_DOMAIN_SPECIFIC: &str = "domain_specific";
/// Property key listing surface forms merged into a canonical entity
pub const PROP_ALIASES: &str = "aliases";
/// Property key listing every `[start, end]` occurrence of a repeated mention
pub const PROP_MENTIONS: &str = "mentions";

/// Clamp a confidence value into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Entity Types
// ============================================================================

/// Entity types recognized by the engine.
///
/// The set is closed for the built-in domains and extensible through
/// `Custom`, which carries the upper-cased type label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    // Generic
    Person,
    Organization,
    Date,
    Location,
    Money,
    Percentage,
    Duration,
    Role,

    // Legal
    Statute,
    Court,
    CaseCitation,

    // Medical
    Condition,
    Medication,
    Dosage,
    Procedure,

    // Business
    Product,

    /// Domain-specific extension
    Custom(String),
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Date => "DATE",
            Self::Location => "LOCATION",
            Self::Money => "MONEY",
            Self::Percentage => "PERCENTAGE",
            Self::Duration => "DURATION",
            Self::Role => "ROLE",
            Self::Statute => "STATUTE",
            Self::Court => "COURT",
            Self::CaseCitation => "CASE_CITATION",
            Self::Condition => "CONDITION",
            Self::Medication => "MEDICATION",
            Self::Dosage => "DOSAGE",
            Self::Procedure => "PROCEDURE",
            Self::Product => "PRODUCT",
            Self::Custom(label) => label,
        }
    }

    /// Parse a type label, case-insensitively; unknown labels become `Custom`
    pub fn parse(label: &str) -> Self {
        let upper = label.trim().to_uppercase().replace([' ', '-'], "_");
        match upper.as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORGANIZATION" | "ORGANISATION" | "ORG" => Self::Organization,
            "DATE" => Self::Date,
            "LOCATION" | "LOC" | "GPE" => Self::Location,
            "MONEY" => Self::Money,
            "PERCENTAGE" | "PERCENT" => Self::Percentage,
            "DURATION" => Self::Duration,
            "ROLE" => Self::Role,
            "STATUTE" => Self::Statute,
            "COURT" => Self::Court,
            "CASE_CITATION" => Self::CaseCitation,
            "CONDITION" => Self::Condition,
            "MEDICATION" => Self::Medication,
            "DOSAGE" => Self::Dosage,
            "PROCEDURE" => Self::Procedure,
            "PRODUCT" => Self::Product,
            _ => Self::Custom(upper),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for EntityType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<&str> for EntityType {
    fn from(label: &str) -> Self {
        Self::parse(label)
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

// ============================================================================
// Entities and Relationships
// ============================================================================

/// Character offsets of a mention in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two spans share at least one character
    pub fn overlaps(&self, other: &SourceSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A typed, confidence-scored mention extracted from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within one ontology
    pub id: String,

    /// Surface form
    pub text: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Surrounding text snippet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_span: Option<SourceSpan>,
}

impl Entity {
    /// Create a new entity; confidence is clamped into range
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        entity_type: EntityType,
        confidence: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entity_type,
            confidence: clamp_confidence(confidence),
            properties: BTreeMap::new(),
            context: None,
            source_span: None,
        }
    }

    /// Set the source span
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.source_span = Some(SourceSpan::new(start, end));
        self
    }

    /// Set the surrounding context snippet
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Whether a domain-specific pattern (rather than a generic one) matched
    pub fn is_domain_specific(&self) -> bool {
        self.properties
            .get(PROP_DOMAIN_SPECIFIC)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Normalized surface form used as semantic identity
    pub fn normalized_text(&self) -> String {
        normalize_surface(&self.text)
    }
}

/// Lowercase, strip trailing punctuation and collapse whitespace
pub fn normalize_surface(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ',', ';', ':'])
        .to_lowercase()
}

/// A typed, confidence-scored directed edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,

    /// Relationship type (open, domain-extensible)
    #[serde(rename = "type")]
    pub relationship_type: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Character gap between the two endpoint mentions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<usize>,
}

impl Relationship {
    /// Create a new relationship; confidence is clamped into range
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            confidence: clamp_confidence(confidence),
            properties: BTreeMap::new(),
            context: None,
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: usize) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

// ============================================================================
// Ontology
// ============================================================================

/// Extraction metadata attached to an ontology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyMetadata {
    pub domain: String,
    pub data_type: String,
    pub strategy: ExtractionStrategy,
    /// Wall-clock extraction time in milliseconds
    pub extraction_ms: u64,
    #[serde(default)]
    pub backend_failures: usize,
    #[serde(default)]
    pub omitted_spans: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl OntologyMetadata {
    pub fn new(
        domain: impl Into<String>,
        data_type: impl Into<String>,
        strategy: ExtractionStrategy,
    ) -> Self {
        Self {
            domain: domain.into(),
            data_type: data_type.into(),
            strategy,
            extraction_ms: 0,
            backend_failures: 0,
            omitted_spans: 0,
            created_at: Utc::now(),
            extra: BTreeMap::new(),
        }
    }
}

/// Derived graph statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of unique entity ids
    pub entity_count: usize,
    pub relationship_count: usize,
    /// `relationships / unique entity ids`, clamped to 1.0
    pub density: f32,
    pub mean_entity_confidence: f32,
    pub mean_relationship_confidence: f32,
    pub type_distribution: BTreeMap<String, usize>,
}

/// What `Ontology::enforce_integrity` removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub self_loops_dropped: usize,
    pub dangling_dropped: usize,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.self_loops_dropped == 0 && self.dangling_dropped == 0
    }
}

/// The combined entity + relationship graph extracted from a text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OntologyMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

impl Ontology {
    /// Create an ontology from entities and relationships
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_metadata(mut self, metadata: OntologyMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Look up an entity by id
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// The deduplicated set of entity ids
    pub fn unique_entity_ids(&self) -> BTreeSet<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }

    /// Relationship density against unique entity ids, never above 1.0
    pub fn density(&self) -> f32 {
        let unique = self.unique_entity_ids().len();
        if unique == 0 {
            return 0.0;
        }
        (self.relationships.len() as f32 / unique as f32).min(1.0)
    }

    /// Relationships whose endpoints do not resolve to a live entity
    pub fn dangling_relationships(&self) -> Vec<&Relationship> {
        let ids: HashSet<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        self.relationships
            .iter()
            .filter(|r| {
                !ids.contains(r.source_id.as_str()) || !ids.contains(r.target_id.as_str())
            })
            .collect()
    }

    /// Relationships whose source and target coincide
    pub fn self_loops(&self) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.is_self_loop())
            .collect()
    }

    /// Entity ids that appear more than once
    pub fn duplicate_entity_ids(&self) -> BTreeSet<&str> {
        let mut seen = HashSet::new();
        self.entities
            .iter()
            .filter(|e| !seen.insert(e.id.as_str()))
            .map(|e| e.id.as_str())
            .collect()
    }

    /// Drop self-loops and dangling relationships in place
    pub fn enforce_integrity(&mut self) -> IntegrityReport {
        let ids: HashSet<String> = self.entities.iter().map(|e| e.id.clone()).collect();
        let mut report = IntegrityReport::default();

        self.relationships.retain(|r| {
            if r.is_self_loop() {
                report.self_loops_dropped += 1;
                false
            } else if !ids.contains(&r.source_id) || !ids.contains(&r.target_id) {
                report.dangling_dropped += 1;
                false
            } else {
                true
            }
        });

        report
    }

    /// Compute derived statistics
    pub fn compute_statistics(&self) -> Statistics {
        let mut type_distribution = BTreeMap::new();
        for entity in &self.entities {
            *type_distribution
                .entry(entity.entity_type.to_string())
                .or_insert(0) += 1;
        }

        Statistics {
            entity_count: self.unique_entity_ids().len(),
            relationship_count: self.relationships.len(),
            density: self.density(),
            mean_entity_confidence: mean(self.entities.iter().map(|e| e.confidence)),
            mean_relationship_confidence: mean(self.relationships.iter().map(|r| r.confidence)),
            type_distribution,
        }
    }

    /// Recompute and store statistics
    pub fn refresh_statistics(&mut self) {
        self.statistics = Some(self.compute_statistics());
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

// ============================================================================
// Critic Score
// ============================================================================

/// Category of a critic finding; drives the refinement action table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    LowCompleteness,
    LowConsistency,
    LowClarity,
    TooSparse,
    TooDense,
    LowRelationshipCoherence,
    MissingRelationships,
    LowDomainAlignment,
    DuplicateIds,
    ConflictingTypes,
    DanglingRelationship,
    SelfLoop,
}

/// A typed weakness reported by the critic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FindingCategory,
    /// How far below the acceptable level the dimension sits (0.0 - 1.0)
    pub severity: f32,
    pub message: String,
}

impl Finding {
    pub fn new(category: FindingCategory, severity: f32, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: clamp_confidence(severity),
            message: message.into(),
        }
    }
}

/// Multi-dimensional quality score of an ontology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticScore {
    pub overall: f32,
    pub completeness: f32,
    pub consistency: f32,
    pub clarity: f32,
    pub granularity: f32,
    pub relationship_coherence: f32,
    pub domain_alignment: f32,
    pub recommendations: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CriticScore {
    /// Whether the critic reported a finding of the given category
    pub fn has_finding(&self, category: FindingCategory) -> bool {
        self.findings.iter().any(|f| f.category == category)
    }

    /// The six sub-dimensions, in a fixed order
    pub fn dimensions(&self) -> [(&'static str, f32); 6] {
        [
            ("completeness", self.completeness),
            ("consistency", self.consistency),
            ("clarity", self.clarity),
            ("granularity", self.granularity),
            ("relationship_coherence", self.relationship_coherence),
            ("domain_alignment", self.domain_alignment),
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================
