//! Pattern Library
//!
//! Holds one compiled matcher per (domain, entity type) and one per
//! (domain, relationship type). Every alternative registered for a class is
//! folded into a single alternation regex, so classifying a class costs one
//! scan of the text instead of one scan per probe. Named groups record
//! which alternative fired (and therefore its confidence and whether it was
//! domain-specific).
//!
//! The library is built once, is immutable afterwards, and is passed by
//! reference into every extraction call.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use onto_core::{EntityType, ExtractionConfig, OntoError, Result, GENERIC_DOMAIN};

use crate::builtin;
use crate::ExtractedSpan;

/// Placeholder group marking the sub-span to keep (e.g. the place after "in")
const SPAN_GROUP: &str = "(?P<span>";

/// Word starts re-scanned inside each match
const MAX_NESTED_STARTS: usize = 3;

/// Bytes past the enclosing match visible to a nested search
const NESTED_LOOKAHEAD: usize = 64;

// ============================================================================
// Pattern Specifications
// ============================================================================

/// One alternative for an entity class
#[derive(Debug, Clone)]
pub struct EntityPatternSpec {
    pub entity_type: EntityType,
    /// Regex source; may contain one `(?P<span>...)` group narrowing the mention
    pub pattern: String,
    pub confidence: f32,
}

impl EntityPatternSpec {
    pub fn new(entity_type: EntityType, pattern: impl Into<String>, confidence: f32) -> Self {
        Self {
            entity_type,
            pattern: pattern.into(),
            confidence,
        }
    }
}

/// One alternative for a relationship class, matched against the text
/// between two entity mentions
#[derive(Debug, Clone)]
pub struct RelationPatternSpec {
    pub relationship_type: String,
    pub pattern: String,
    /// Allowed source types; empty means any
    pub subject_types: Vec<EntityType>,
    /// Allowed target types; empty means any
    pub object_types: Vec<EntityType>,
    pub confidence: f32,
    /// The phrase reads object-first ("Acme hired Alice")
    pub inverse: bool,
}

impl RelationPatternSpec {
    pub fn new(relationship_type: &str, pattern: impl Into<String>, confidence: f32) -> Self {
        Self {
            relationship_type: relationship_type.to_string(),
            pattern: pattern.into(),
            subject_types: Vec::new(),
            object_types: Vec::new(),
            confidence,
            inverse: false,
        }
    }

    /// Restrict endpoint types
    pub fn between(mut self, subjects: &[EntityType], objects: &[EntityType]) -> Self {
        self.subject_types = subjects.to_vec();
        self.object_types = objects.to_vec();
        self
    }

    /// Mark as an object-first phrasing
    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }
}

/// Pattern set of one domain
#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub name: String,
    /// Types a complete ontology of this domain is expected to contain
    pub expected_types: Vec<EntityType>,
    pub entities: Vec<EntityPatternSpec>,
    pub relations: Vec<RelationPatternSpec>,
    /// Also compile the generic patterns (flagged non-domain-specific)
    pub include_generic: bool,
}

impl DomainSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            expected_types: Vec::new(),
            entities: Vec::new(),
            relations: Vec::new(),
            include_generic: true,
        }
    }

    pub fn expects(mut self, types: &[EntityType]) -> Self {
        self.expected_types = types.to_vec();
        self
    }

    pub fn entity(mut self, entity_type: EntityType, pattern: &str, confidence: f32) -> Self {
        self.entities
            .push(EntityPatternSpec::new(entity_type, pattern, confidence));
        self
    }

    pub fn relation(mut self, spec: RelationPatternSpec) -> Self {
        self.relations.push(spec);
        self
    }

    pub fn standalone(mut self) -> Self {
        self.include_generic = false;
        self
    }
}

// ============================================================================
// Compiled Matchers
// ============================================================================

#[derive(Debug, Clone)]
struct EntityAlternative {
    group: String,
    span_group: Option<String>,
    confidence: f32,
    domain_specific: bool,
}

/// Combined alternation matcher for one entity class
#[derive(Debug)]
pub struct EntityMatcher {
    entity_type: EntityType,
    regex: Regex,
    alternatives: Vec<EntityAlternative>,
}

impl EntityMatcher {
    fn compile(entity_type: EntityType, specs: &[(&EntityPatternSpec, bool)]) -> Result<Self> {
        let mut sources = Vec::with_capacity(specs.len());
        let mut alternatives = Vec::with_capacity(specs.len());

        for (i, (spec, domain_specific)) in specs.iter().enumerate() {
            let group = format!("a{i}");
            let (pattern, span_group) = if spec.pattern.contains(SPAN_GROUP) {
                let name = format!("s{i}");
                (
                    spec.pattern.replacen(SPAN_GROUP, &format!("(?P<{name}>"), 1),
                    Some(name),
                )
            } else {
                (spec.pattern.clone(), None)
            };

            sources.push(format!("(?P<{group}>{pattern})"));
            alternatives.push(EntityAlternative {
                group,
                span_group,
                confidence: spec.confidence,
                domain_specific: *domain_specific,
            });
        }

        let regex = Regex::new(&sources.join("|")).map_err(|e| {
            OntoError::Configuration(format!("invalid pattern for {entity_type}: {e}"))
        })?;

        Ok(Self {
            entity_type,
            regex,
            alternatives,
        })
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Number of alternatives folded into this matcher
    pub fn alternative_count(&self) -> usize {
        self.alternatives.len()
    }

    /// Scan the text with the combined matcher.
    ///
    /// One non-overlapping pass over the text. A stronger candidate can start
    /// inside a longer match ("in Boston", "Patient Maria Lopez"), so the first
    /// few word starts of every match are searched again. Those searches see
    /// at most `NESTED_LOOKAHEAD` bytes past the enclosing match, which keeps
    /// the scan linear. Overlapping results are left for the caller to resolve.
    pub fn scan(&self, text: &str) -> Vec<ExtractedSpan> {
        let mut spans = Vec::new();

        for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            spans.extend(self.span_from(&caps));

            let limit = floor_char_boundary(text, whole.end() + NESTED_LOOKAHEAD);
            let bounded = &text[..limit];
            let mut from = whole.start();
            for _ in 0..MAX_NESTED_STARTS {
                let Some(start) = next_word_start(&text[..whole.end()], from) else {
                    break;
                };
                let Some(nested) = self.regex.captures_at(bounded, start) else {
                    break;
                };
                let Some(m) = nested.get(0) else {
                    break;
                };
                if m.start() >= whole.end() {
                    break;
                }
                // A match reaching the cut may be a truncation of a longer one.
                if m.end() < limit || limit == text.len() {
                    spans.extend(self.span_from(&nested));
                }
                from = m.start();
            }
        }

        spans
    }

    fn span_from(&self, caps: &Captures<'_>) -> Option<ExtractedSpan> {
        let alt = self
            .alternatives
            .iter()
            .find(|a| caps.name(&a.group).is_some())?;

        let m = alt
            .span_group
            .as_deref()
            .and_then(|g| caps.name(g))
            .or_else(|| caps.name(&alt.group))?;

        let surface = m.as_str().trim_end();
        if surface.trim().is_empty() {
            return None;
        }

        Some(ExtractedSpan {
            text: surface.to_string(),
            entity_type: self.entity_type.clone(),
            start: m.start(),
            end: m.start() + surface.len(),
            confidence: alt.confidence,
            domain_specific: alt.domain_specific,
        })
    }
}

/// Start of the first word after `from` that begins before the end of `text`
fn next_word_start(text: &str, from: usize) -> Option<usize> {
    let rest = text.get(from..)?;
    let gap = rest.find(char::is_whitespace)?;
    let after_gap = &rest[gap..];
    let word = after_gap.find(|c: char| !c.is_whitespace())?;
    Some(from + gap + word)
}

fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[derive(Debug, Clone)]
struct RelationAlternative {
    group: String,
    subject_types: Vec<EntityType>,
    object_types: Vec<EntityType>,
    confidence: f32,
    inverse: bool,
    domain_specific: bool,
}

impl RelationAlternative {
    fn accepts(&self, source: &EntityType, target: &EntityType) -> bool {
        type_allowed(&self.subject_types, source) && type_allowed(&self.object_types, target)
    }
}

fn type_allowed(allowed: &[EntityType], candidate: &EntityType) -> bool {
    allowed.is_empty() || allowed.contains(candidate)
}

/// A relationship phrase found between two mentions
#[derive(Debug, Clone, PartialEq)]
pub struct RelationHit {
    /// The earlier mention is the source of the edge
    pub source_is_first: bool,
    pub confidence: f32,
    /// Length of the matched phrase in bytes
    pub matched_len: usize,
    pub domain_specific: bool,
}

/// Combined alternation matcher for one relationship class
#[derive(Debug)]
pub struct RelationMatcher {
    relationship_type: String,
    regex: Regex,
    alternatives: Vec<RelationAlternative>,
}

impl RelationMatcher {
    fn compile(relationship_type: &str, specs: &[(&RelationPatternSpec, bool)]) -> Result<Self> {
        let mut sources = Vec::with_capacity(specs.len());
        let mut alternatives = Vec::with_capacity(specs.len());

        for (i, (spec, domain_specific)) in specs.iter().enumerate() {
            let group = format!("r{i}");
            sources.push(format!("(?P<{group}>{})", spec.pattern));
            alternatives.push(RelationAlternative {
                group,
                subject_types: spec.subject_types.clone(),
                object_types: spec.object_types.clone(),
                confidence: spec.confidence,
                inverse: spec.inverse,
                domain_specific: *domain_specific,
            });
        }

        let regex = Regex::new(&sources.join("|")).map_err(|e| {
            OntoError::Configuration(format!("invalid pattern for {relationship_type}: {e}"))
        })?;

        Ok(Self {
            relationship_type: relationship_type.to_string(),
            regex,
            alternatives,
        })
    }

    pub fn relationship_type(&self) -> &str {
        &self.relationship_type
    }

    /// Whether an edge `source -> target` of this type has compatible endpoints
    pub fn accepts(&self, source: &EntityType, target: &EntityType) -> bool {
        self.alternatives.iter().any(|a| a.accepts(source, target))
    }

    /// Best type-compatible phrase in the text between `first` and `second`
    pub fn best_match(
        &self,
        between: &str,
        first: &EntityType,
        second: &EntityType,
    ) -> Option<RelationHit> {
        let mut best: Option<RelationHit> = None;

        for caps in self.regex.captures_iter(between) {
            let Some((alt, m)) = self
                .alternatives
                .iter()
                .find_map(|a| caps.name(&a.group).map(|m| (a, m)))
            else {
                continue;
            };

            let compatible = if alt.inverse {
                alt.accepts(second, first)
            } else {
                alt.accepts(first, second)
            };
            if !compatible {
                continue;
            }

            let hit = RelationHit {
                source_is_first: !alt.inverse,
                confidence: alt.confidence,
                matched_len: m.len(),
                domain_specific: alt.domain_specific,
            };
            if best.as_ref().map_or(true, |b| hit.confidence > b.confidence) {
                best = Some(hit);
            }
        }

        best
    }
}

// ============================================================================
// Domain Patterns
// ============================================================================

/// All compiled matchers of one domain
#[derive(Debug)]
pub struct DomainPatterns {
    name: String,
    entity_matchers: BTreeMap<EntityType, EntityMatcher>,
    relation_matchers: BTreeMap<String, RelationMatcher>,
    expected_types: Vec<EntityType>,
    specific_types: BTreeSet<EntityType>,
}

impl DomainPatterns {
    fn compile(spec: &DomainSpec, generic: Option<&DomainSpec>) -> Result<Self> {
        let is_generic = spec.name == GENERIC_DOMAIN;

        // Domain alternatives first so they win ties at the same offset.
        let mut entity_specs: BTreeMap<EntityType, Vec<(&EntityPatternSpec, bool)>> =
            BTreeMap::new();
        for e in &spec.entities {
            entity_specs
                .entry(e.entity_type.clone())
                .or_default()
                .push((e, true));
        }

        let mut relation_specs: BTreeMap<String, Vec<(&RelationPatternSpec, bool)>> =
            BTreeMap::new();
        for r in &spec.relations {
            relation_specs
                .entry(r.relationship_type.clone())
                .or_default()
                .push((r, true));
        }

        if let (Some(generic), true, false) = (generic, spec.include_generic, is_generic) {
            for e in &generic.entities {
                entity_specs
                    .entry(e.entity_type.clone())
                    .or_default()
                    .push((e, false));
            }
            for r in &generic.relations {
                relation_specs
                    .entry(r.relationship_type.clone())
                    .or_default()
                    .push((r, false));
            }
        }

        let mut entity_matchers = BTreeMap::new();
        for (entity_type, specs) in &entity_specs {
            entity_matchers.insert(
                entity_type.clone(),
                EntityMatcher::compile(entity_type.clone(), specs)?,
            );
        }

        let mut relation_matchers = BTreeMap::new();
        for (relationship_type, specs) in &relation_specs {
            relation_matchers.insert(
                relationship_type.clone(),
                RelationMatcher::compile(relationship_type, specs)?,
            );
        }

        let specific_types = spec.entities.iter().map(|e| e.entity_type.clone()).collect();

        Ok(Self {
            name: spec.name.clone(),
            entity_matchers,
            relation_matchers,
            expected_types: spec.expected_types.clone(),
            specific_types,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_generic(&self) -> bool {
        self.name == GENERIC_DOMAIN
    }

    /// Mapping of entity type to its combined matcher
    pub fn entity_matchers(&self) -> &BTreeMap<EntityType, EntityMatcher> {
        &self.entity_matchers
    }

    /// Mapping of relationship type to its combined matcher
    pub fn relation_matchers(&self) -> &BTreeMap<String, RelationMatcher> {
        &self.relation_matchers
    }

    pub fn expected_types(&self) -> &[EntityType] {
        &self.expected_types
    }

    /// Whether the domain defines its own patterns for this type
    pub fn is_specific_type(&self, entity_type: &EntityType) -> bool {
        self.specific_types.contains(entity_type)
    }

    /// Endpoint compatibility of an edge; `None` when the type is unknown here
    pub fn relation_compatible(
        &self,
        relationship_type: &str,
        source: &EntityType,
        target: &EntityType,
    ) -> Option<bool> {
        self.relation_matchers
            .get(relationship_type)
            .map(|m| m.accepts(source, target))
    }

    /// Run every entity matcher once over the text
    pub fn scan(&self, text: &str) -> Vec<ExtractedSpan> {
        self.entity_matchers
            .values()
            .flat_map(|m| m.scan(text))
            .collect()
    }
}

// ============================================================================
// Pattern Library
// ============================================================================

/// Immutable, process-wide set of compiled matchers
#[derive(Debug)]
pub struct PatternLibrary {
    domains: BTreeMap<String, DomainPatterns>,
    allow_generic_fallback: bool,
}

impl PatternLibrary {
    /// Library with the built-in generic, legal, medical and business sets
    pub fn builtin() -> Result<Self> {
        Self::builder().with_builtin_domains().build()
    }

    /// Built-in library honoring fallback and mandatory-domain settings
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .with_builtin_domains()
            .allow_generic_fallback(config.allow_generic_fallback);
        for domain in &config.mandatory_domains {
            builder = builder.mandatory(domain);
        }
        builder.build()
    }

    pub fn builder() -> PatternLibraryBuilder {
        PatternLibraryBuilder::default()
    }

    /// Compiled matchers for a domain, falling back to the generic set
    pub fn compiled_matchers(&self, domain: &str) -> Result<&DomainPatterns> {
        let key = domain.trim().to_lowercase();
        if let Some(patterns) = self.domains.get(&key) {
            return Ok(patterns);
        }

        if self.allow_generic_fallback {
            if let Some(generic) = self.domains.get(GENERIC_DOMAIN) {
                debug!(domain = %key, "No pattern set for domain, using generic");
                return Ok(generic);
            }
        }

        Err(OntoError::UnknownDomain(key))
    }

    /// Whether `compiled_matchers` would succeed for the domain
    pub fn resolves(&self, domain: &str) -> bool {
        self.compiled_matchers(domain).is_ok()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }
}

/// Builder for `PatternLibrary`
#[derive(Debug)]
pub struct PatternLibraryBuilder {
    generic: Option<DomainSpec>,
    domains: Vec<DomainSpec>,
    mandatory: Vec<String>,
    allow_generic_fallback: bool,
}

impl Default for PatternLibraryBuilder {
    fn default() -> Self {
        Self {
            generic: None,
            domains: Vec::new(),
            mandatory: Vec::new(),
            allow_generic_fallback: true,
        }
    }
}

impl PatternLibraryBuilder {
    /// Register the built-in domains
    pub fn with_builtin_domains(mut self) -> Self {
        self.generic = Some(builtin::generic_domain());
        self.domains.extend(builtin::specialized_domains());
        self
    }

    /// Register or replace a domain; a spec named "generic" becomes the fallback set
    pub fn domain(mut self, spec: DomainSpec) -> Self {
        if spec.name == GENERIC_DOMAIN {
            self.generic = Some(spec);
        } else {
            self.domains.retain(|d| d.name != spec.name);
            self.domains.push(spec);
        }
        self
    }

    /// Fail the build if this domain ends up without patterns
    pub fn mandatory(mut self, domain: &str) -> Self {
        self.mandatory.push(domain.trim().to_lowercase());
        self
    }

    pub fn allow_generic_fallback(mut self, allow: bool) -> Self {
        self.allow_generic_fallback = allow;
        self
    }

    /// Compile every matcher; configuration problems surface here, not at first use
    pub fn build(self) -> Result<PatternLibrary> {
        let mut domains = BTreeMap::new();

        if let Some(generic) = &self.generic {
            if generic.entities.is_empty() {
                warn!("Generic pattern set has no entity patterns, skipping");
            } else {
                domains.insert(
                    GENERIC_DOMAIN.to_string(),
                    DomainPatterns::compile(generic, None)?,
                );
            }
        }

        for spec in &self.domains {
            let has_generic = spec.include_generic && domains.contains_key(GENERIC_DOMAIN);
            if spec.entities.is_empty() && !has_generic {
                warn!(domain = %spec.name, "Domain has no patterns, skipping");
                continue;
            }
            domains.insert(
                spec.name.clone(),
                DomainPatterns::compile(spec, self.generic.as_ref())?,
            );
        }

        for required in &self.mandatory {
            if !domains.contains_key(required) {
                return Err(OntoError::Configuration(format!(
                    "mandatory domain '{required}' has no pattern set"
                )));
            }
        }

        let matcher_count: usize = domains
            .values()
            .map(|d: &DomainPatterns| d.entity_matchers.len() + d.relation_matchers.len())
            .sum();
        info!(
            domains = domains.len(),
            matchers = matcher_count,
            "Pattern library compiled"
        );

        Ok(PatternLibrary {
            domains,
            allow_generic_fallback: self.allow_generic_fallback,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_library_has_all_domains() {
        let library = PatternLibrary::builtin().unwrap();
        let domains: Vec<&str> = library.domains().collect();
        assert_eq!(domains, vec!["business", "generic", "legal", "medical"]);
    }

    #[test]
    fn test_one_matcher_per_type() {
        let library = PatternLibrary::builtin().unwrap();
        let generic = library.compiled_matchers("generic").unwrap();
        let person = generic.entity_matchers().get(&EntityType::Person).unwrap();

        // Titled names, known given names and initials share one regex.
        assert!(person.alternative_count() >= 3);
        assert_eq!(person.entity_type(), &EntityType::Person);
    }

    #[test]
    fn test_unknown_domain_falls_back_to_generic() {
        let library = PatternLibrary::builtin().unwrap();
        let patterns = library.compiled_matchers("astronomy").unwrap();
        assert!(patterns.is_generic());
    }

    #[test]
    fn test_unknown_domain_without_fallback_fails() {
        let library = PatternLibrary::builder()
            .with_builtin_domains()
            .allow_generic_fallback(false)
            .build()
            .unwrap();

        let err = library.compiled_matchers("astronomy").unwrap_err();
        assert!(matches!(err, OntoError::UnknownDomain(d) if d == "astronomy"));
        assert!(library.resolves("legal"));
    }

    #[test]
    fn test_mandatory_domain_missing_fails_at_build() {
        let err = PatternLibrary::builder()
            .with_builtin_domains()
            .mandatory("tax")
            .build()
            .unwrap_err();
        assert!(matches!(err, OntoError::Configuration(_)));
    }

    #[test]
    fn test_invalid_regex_fails_at_build() {
        let bad = DomainSpec::new("broken")
            .standalone()
            .entity(EntityType::Product, r"(unclosed", 0.5);
        let err = PatternLibrary::builder().domain(bad).build().unwrap_err();
        assert!(matches!(err, OntoError::Configuration(_)));
    }

    #[test]
    fn test_span_group_narrows_mention() {
        let spec = DomainSpec::new(GENERIC_DOMAIN).entity(
            EntityType::Location,
            r"\bin\s+(?P<span>[A-Z][a-z]+)",
            0.5,
        );
        let library = PatternLibrary::builder().domain(spec).build().unwrap();
        let spans = library
            .compiled_matchers("generic")
            .unwrap()
            .scan("She lives in Lisbon now.");

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Lisbon");
        assert_eq!(&"She lives in Lisbon now."[spans[0].start..spans[0].end], "Lisbon");
    }

    #[test]
    fn test_long_capitalized_run_yields_bounded_spans() {
        let library = PatternLibrary::builtin().unwrap();
        let organizations = library
            .compiled_matchers("generic")
            .unwrap()
            .entity_matchers()
            .get(&EntityType::Organization)
            .unwrap();

        let words: Vec<String> = (0..2000).map(|i| format!("Word{i}")).collect();
        let text = format!("{} Corp", words.join(" "));
        let spans = organizations.scan(&text);

        assert!(!spans.is_empty());
        assert!(spans.len() <= 1 + MAX_NESTED_STARTS);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, text.len());
    }

    #[test]
    fn test_nested_candidate_inside_longer_match() {
        let library = PatternLibrary::builtin().unwrap();
        let generic = library.compiled_matchers("generic").unwrap();

        let organizations = generic
            .entity_matchers()
            .get(&EntityType::Organization)
            .unwrap()
            .scan("Yesterday Acme Corp announced results.");
        assert!(organizations.iter().any(|s| s.text == "Yesterday Acme Corp"));
        assert!(organizations.iter().any(|s| s.text == "Acme Corp"));

        let locations = generic
            .entity_matchers()
            .get(&EntityType::Location)
            .unwrap()
            .scan("She lives in Boston.");
        assert!(locations
            .iter()
            .any(|s| s.text == "Boston" && (s.confidence - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_nested_candidate_may_extend_past_enclosing_match() {
        let library = PatternLibrary::builtin().unwrap();
        let people = library
            .compiled_matchers("generic")
            .unwrap()
            .entity_matchers()
            .get(&EntityType::Person)
            .unwrap()
            .scan("Patient Maria Lopez was discharged.");

        assert!(people.iter().any(|s| s.text == "Patient Maria"));
        assert!(people
            .iter()
            .any(|s| s.text == "Maria Lopez" && (s.confidence - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_domain_specific_flag() {
        let library = PatternLibrary::builtin().unwrap();
        let medical = library.compiled_matchers("medical").unwrap();
        let spans = medical.scan("Alice was prescribed metformin.");

        let med = spans
            .iter()
            .find(|s| s.entity_type == EntityType::Medication)
            .unwrap();
        assert!(med.domain_specific);

        let person = spans
            .iter()
            .find(|s| s.entity_type == EntityType::Person)
            .unwrap();
        assert!(!person.domain_specific);
    }

    #[test]
    fn test_relation_inverse_phrase() {
        let library = PatternLibrary::builtin().unwrap();
        let generic = library.compiled_matchers("generic").unwrap();
        let employed = generic.relation_matchers().get("EMPLOYED_BY").unwrap();

        let forward = employed
            .best_match(" works for ", &EntityType::Person, &EntityType::Organization)
            .unwrap();
        assert!(forward.source_is_first);

        let inverse = employed
            .best_match(" hired ", &EntityType::Organization, &EntityType::Person)
            .unwrap();
        assert!(!inverse.source_is_first);

        assert!(employed
            .best_match(" works for ", &EntityType::Date, &EntityType::Money)
            .is_none());
    }

    #[test]
    fn test_relation_compatibility_lookup() {
        let library = PatternLibrary::builtin().unwrap();
        let generic = library.compiled_matchers("generic").unwrap();

        assert_eq!(
            generic.relation_compatible(
                "EMPLOYED_BY",
                &EntityType::Person,
                &EntityType::Organization
            ),
            Some(true)
        );
        assert_eq!(
            generic.relation_compatible("EMPLOYED_BY", &EntityType::Date, &EntityType::Person),
            Some(false)
        );
        assert_eq!(
            generic.relation_compatible("SUPERVISES", &EntityType::Person, &EntityType::Person),
            None
        );
    }
}
