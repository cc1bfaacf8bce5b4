//! Named Entity Recognition (NER) engine
//!
//! Provides three strategies, selected by the context's strategy tag:
//! - Pattern-based: the compiled pattern library only, fully deterministic
//! - Pattern with fallback: low-confidence spans are re-classified by the
//!   generative backend
//! - Fully generative: classification is delegated to the backend
//!
//! Backend failures never abort extraction. A timed-out span is omitted;
//! any other failure keeps the pattern result for that span.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use onto_core::{
    clamp_confidence, normalize_surface, BackendError, Entity, EntityType, ExtractionConfig,
    ExtractionContext, ExtractionStrategy, GenerativeBackend, OntoError, Result,
    PROP_DOMAIN_SPECIFIC, PROP_MATCHER, PROP_MENTIONS,
};

use crate::merge::IdAllocator;
use crate::patterns::{DomainPatterns, PatternLibrary};
use crate::ExtractedSpan;

const CLASSIFY_PROMPT: &str = include_str!("prompts/classify_span.txt");
const EXTRACT_PROMPT: &str = include_str!("prompts/extract_entities.txt");

/// Concurrent backend calls while re-classifying spans
const FALLBACK_CONCURRENCY: usize = 4;

/// Confidence assumed when the backend omits one
const GENERATIVE_DEFAULT_CONFIDENCE: f32 = 0.7;

// ============================================================================
// Parameters and Report
// ============================================================================

/// Per-call extraction knobs; the refinement mediator adjusts these between rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionParams {
    pub min_confidence: f32,
    pub fallback_threshold: f32,
    pub max_entities: usize,
    /// Characters of surrounding text kept as entity context
    pub context_window: usize,
    /// Resolve overlaps across entity types, not only within one type
    pub strict_overlaps: bool,
    pub backend_timeout: Duration,
}

impl ExtractionParams {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            fallback_threshold: config.fallback_threshold,
            max_entities: config.max_entities,
            context_window: config.context_window,
            strict_overlaps: false,
            backend_timeout: Duration::from_millis(config.backend_timeout_ms),
        }
    }
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Counters describing one extraction call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub strategy: ExtractionStrategy,
    pub domain: String,
    pub elapsed_ms: u64,
    /// Raw matcher hits before overlap resolution
    pub pattern_matches: usize,
    pub overlaps_resolved: usize,
    /// Spans dropped for falling under `min_confidence`
    pub below_threshold: usize,
    /// Spans sent to the backend for re-classification
    pub forwarded: usize,
    pub reclassified: usize,
    /// Spans the backend declared not to be entities
    pub rejected: usize,
    /// Spans left unresolved because the backend timed out
    pub omitted: usize,
    pub backend_failures: usize,
    /// Entities cut by `max_entities`
    pub truncated: usize,
}

/// Entities plus the report of the call that produced them
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub entities: Vec<Entity>,
    pub report: ExtractionReport,
}

// ============================================================================
// Candidates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Pattern,
    Reclassified,
    Generative,
}

impl Origin {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Reclassified => "reclassified",
            Self::Generative => "generative",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    span: ExtractedSpan,
    origin: Origin,
}

/// Keep the highest-confidence span among overlaps, then the longer one.
///
/// Non-strict mode only resolves overlaps within one entity type.
fn resolve_overlaps(mut candidates: Vec<Candidate>, strict: bool) -> (Vec<Candidate>, usize) {
    candidates.sort_by(|a, b| {
        b.span
            .confidence
            .total_cmp(&a.span.confidence)
            .then_with(|| b.span.len().cmp(&a.span.len()))
            .then_with(|| a.span.start.cmp(&b.span.start))
            .then_with(|| a.span.entity_type.cmp(&b.span.entity_type))
    });

    // lane -> (start -> end) of accepted, pairwise disjoint spans
    let mut lanes: HashMap<Option<EntityType>, BTreeMap<usize, usize>> = HashMap::new();
    let mut kept = Vec::with_capacity(candidates.len());
    let mut dropped = 0;

    for candidate in candidates {
        let lane_key = (!strict).then(|| candidate.span.entity_type.clone());
        let lane = lanes.entry(lane_key).or_default();

        let clashes = lane
            .range(..candidate.span.end)
            .next_back()
            .is_some_and(|(_, &end)| end > candidate.span.start);
        if clashes {
            dropped += 1;
            continue;
        }

        lane.insert(candidate.span.start, candidate.span.end);
        kept.push(candidate);
    }

    kept.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| a.span.end.cmp(&b.span.end))
            .then_with(|| a.span.entity_type.cmp(&b.span.entity_type))
    });
    (kept, dropped)
}

/// Whitespace-normalized text around a span, cut on char boundaries
fn context_snippet(text: &str, start: usize, end: usize, window: usize) -> String {
    let begin = if window == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .take(window)
            .last()
            .map_or(start, |(i, _)| i)
    };
    let finish = text[end..]
        .char_indices()
        .nth(window)
        .map_or(text.len(), |(i, _)| end + i);

    text[begin..finish]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Backend Contract
// ============================================================================

#[derive(Debug, Deserialize)]
struct SpanVerdict {
    #[serde(rename = "type", alias = "entity_type")]
    entity_type: String,
    #[serde(default)]
    confidence: Option<f32>,
}

impl SpanVerdict {
    fn is_rejection(&self) -> bool {
        matches!(
            self.entity_type.trim().to_uppercase().as_str(),
            "" | "NONE" | "O" | "NULL"
        )
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedEntity {
    text: String,
    #[serde(rename = "type", alias = "entity_type")]
    entity_type: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse the outermost JSON value delimited by `open`/`close`
fn parse_json_payload<T: DeserializeOwned>(
    response: &str,
    open: char,
    close: char,
) -> std::result::Result<T, BackendError> {
    match (response.find(open), response.rfind(close)) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&response[start..=end])
            .map_err(|e| BackendError::Malformed(e.to_string())),
        _ => Err(BackendError::Malformed(format!(
            "no JSON payload in response of {} bytes",
            response.len()
        ))),
    }
}

/// Bound a backend call by the per-call timeout
async fn call_backend(
    backend: &dyn GenerativeBackend,
    prompt: &str,
    timeout: Duration,
) -> std::result::Result<String, BackendError> {
    match tokio::time::timeout(timeout, backend.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

fn type_list(patterns: &DomainPatterns) -> String {
    let types: Vec<String> = patterns
        .entity_matchers()
        .keys()
        .map(|t| t.to_string())
        .collect();
    types.join(", ")
}

/// Whether `text[start..end]` is not part of a longer word
fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

// ============================================================================
// Extraction Engine
// ============================================================================

/// What one call will do, decided before any matching work
enum Plan<'a> {
    Patterns {
        patterns: &'a DomainPatterns,
        fallback: Option<&'a Arc<dyn GenerativeBackend>>,
    },
    Generative {
        backend: &'a Arc<dyn GenerativeBackend>,
        patterns: &'a DomainPatterns,
    },
}

/// Converts text into a flat entity list
#[derive(Clone)]
pub struct ExtractionEngine {
    library: Arc<PatternLibrary>,
    backend: Option<Arc<dyn GenerativeBackend>>,
}

impl ExtractionEngine {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self {
            library,
            backend: None,
        }
    }

    /// Attach the generative backend used by the fallback and generative strategies
    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    fn plan(&self, context: &ExtractionContext, domain: &str) -> Result<Plan<'_>> {
        match context.strategy {
            ExtractionStrategy::PatternBased => Ok(Plan::Patterns {
                patterns: self.library.compiled_matchers(domain)?,
                fallback: None,
            }),
            ExtractionStrategy::PatternWithFallback => {
                let patterns = self.library.compiled_matchers(domain)?;
                if self.backend.is_none() {
                    warn!(domain, "Fallback strategy without a backend, using patterns only");
                }
                Ok(Plan::Patterns {
                    patterns,
                    fallback: self.backend.as_ref(),
                })
            }
            ExtractionStrategy::FullyGenerative => {
                let backend = self.backend.as_ref().ok_or_else(|| {
                    OntoError::Configuration(
                        "fully generative extraction requires a generative backend".to_string(),
                    )
                })?;
                Ok(Plan::Generative {
                    backend,
                    patterns: self.library.compiled_matchers(domain)?,
                })
            }
        }
    }

    /// Extract entities from text.
    ///
    /// Context problems are reported before any matching; empty text yields
    /// an empty result. Ids come from `ids` in text order.
    pub async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
        params: &ExtractionParams,
        ids: &mut IdAllocator,
    ) -> Result<ExtractionOutput> {
        context.validate()?;
        let started = Instant::now();
        let domain = context.domain_label();
        let plan = self.plan(context, &domain)?;

        let mut report = ExtractionReport {
            strategy: context.strategy,
            domain: domain.clone(),
            ..Default::default()
        };

        if text.trim().is_empty() {
            debug!(domain = %domain, "Empty text, nothing to extract");
            return Ok(ExtractionOutput {
                entities: Vec::new(),
                report,
            });
        }

        let candidates = match plan {
            Plan::Patterns { patterns, fallback } => {
                let candidates = self.pattern_pass(text, patterns, params, &mut report);
                match fallback {
                    Some(backend) => {
                        let reclassified = self
                            .reclassify(backend, text, candidates, patterns, params, &mut report)
                            .await;
                        let (kept, dropped) =
                            resolve_overlaps(reclassified, params.strict_overlaps);
                        report.overlaps_resolved += dropped;
                        kept
                    }
                    None => candidates,
                }
            }
            Plan::Generative { backend, patterns } => {
                self.generative_pass(backend, text, &domain, patterns, params, &mut report)
                    .await
            }
        };

        let before = candidates.len();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.span.confidence >= params.min_confidence)
            .collect();
        report.below_threshold = before - candidates.len();

        let entities = build_entities(text, candidates, params, ids, &mut report);
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            domain = %domain,
            strategy = %context.strategy,
            entities = entities.len(),
            matches = report.pattern_matches,
            omitted = report.omitted,
            backend_failures = report.backend_failures,
            elapsed_ms = report.elapsed_ms,
            "Entity extraction complete"
        );

        Ok(ExtractionOutput { entities, report })
    }

    fn pattern_pass(
        &self,
        text: &str,
        patterns: &DomainPatterns,
        params: &ExtractionParams,
        report: &mut ExtractionReport,
    ) -> Vec<Candidate> {
        let spans = patterns.scan(text);
        report.pattern_matches = spans.len();

        let candidates = spans
            .into_iter()
            .map(|span| Candidate {
                span,
                origin: Origin::Pattern,
            })
            .collect();

        let (kept, dropped) = resolve_overlaps(candidates, params.strict_overlaps);
        report.overlaps_resolved = dropped;
        kept
    }

    async fn reclassify(
        &self,
        backend: &Arc<dyn GenerativeBackend>,
        text: &str,
        candidates: Vec<Candidate>,
        patterns: &DomainPatterns,
        params: &ExtractionParams,
        report: &mut ExtractionReport,
    ) -> Vec<Candidate> {
        let (low, mut kept): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|c| c.span.confidence < params.fallback_threshold);
        if low.is_empty() {
            return kept;
        }
        report.forwarded = low.len();

        let types = type_list(patterns);
        let timeout = params.backend_timeout;
        let calls = low.into_iter().map(|candidate| {
            let prompt = CLASSIFY_PROMPT
                .replace("{domain}", patterns.name())
                .replace("{span}", &candidate.span.text)
                .replace(
                    "{context}",
                    &context_snippet(
                        text,
                        candidate.span.start,
                        candidate.span.end,
                        params.context_window,
                    ),
                )
                .replace("{candidate}", candidate.span.entity_type.as_str())
                .replace("{types}", &types);
            async move {
                let outcome = call_backend(backend.as_ref(), &prompt, timeout).await;
                (candidate, outcome)
            }
        });

        let outcomes: Vec<_> = stream::iter(calls)
            .buffered(FALLBACK_CONCURRENCY)
            .collect()
            .await;

        for (candidate, outcome) in outcomes {
            let verdict =
                outcome.and_then(|response| parse_json_payload::<SpanVerdict>(&response, '{', '}'));

            match verdict {
                Ok(verdict) if verdict.is_rejection() => {
                    report.rejected += 1;
                }
                Ok(verdict) => {
                    let entity_type = EntityType::parse(&verdict.entity_type);
                    report.reclassified += 1;
                    kept.push(Candidate {
                        span: ExtractedSpan {
                            domain_specific: patterns.is_specific_type(&entity_type),
                            entity_type,
                            confidence: clamp_confidence(
                                verdict.confidence.unwrap_or(GENERATIVE_DEFAULT_CONFIDENCE),
                            ),
                            ..candidate.span
                        },
                        origin: Origin::Reclassified,
                    });
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        span = %candidate.span.text,
                        error = %e,
                        "Backend timed out, span omitted"
                    );
                    report.omitted += 1;
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        span = %candidate.span.text,
                        error = %e,
                        "Backend failed, keeping pattern result"
                    );
                    report.backend_failures += 1;
                    kept.push(candidate);
                }
            }
        }

        kept
    }

    async fn generative_pass(
        &self,
        backend: &Arc<dyn GenerativeBackend>,
        text: &str,
        domain: &str,
        patterns: &DomainPatterns,
        params: &ExtractionParams,
        report: &mut ExtractionReport,
    ) -> Vec<Candidate> {
        let prompt = EXTRACT_PROMPT
            .replace("{domain}", domain)
            .replace("{types}", &type_list(patterns))
            .replace("{text}", text);

        let outcome = call_backend(backend.as_ref(), &prompt, params.backend_timeout)
            .await
            .and_then(|response| parse_json_payload::<Vec<GeneratedEntity>>(&response, '[', ']'));

        let generated = match outcome {
            Ok(generated) => generated,
            Err(e) if e.is_timeout() => {
                warn!(domain, error = %e, "Generative extraction timed out, text left unresolved");
                report.omitted += 1;
                return Vec::new();
            }
            Err(e) => {
                warn!(backend = backend.name(), domain, error = %e, "Generative extraction failed");
                report.backend_failures += 1;
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for item in generated {
            let mention = item.text.trim();
            if mention.is_empty() {
                continue;
            }
            let entity_type = EntityType::parse(&item.entity_type);
            let confidence =
                clamp_confidence(item.confidence.unwrap_or(GENERATIVE_DEFAULT_CONFIDENCE));
            let domain_specific = patterns.is_specific_type(&entity_type);

            // Only mentions that occur verbatim get a span; nothing is guessed.
            for (start, found) in text
                .match_indices(mention)
                .filter(|(start, found)| is_whole_word(text, *start, start + found.len()))
            {
                candidates.push(Candidate {
                    span: ExtractedSpan {
                        text: found.to_string(),
                        entity_type: entity_type.clone(),
                        start,
                        end: start + found.len(),
                        confidence,
                        domain_specific,
                    },
                    origin: Origin::Generative,
                });
            }
        }

        let (kept, dropped) = resolve_overlaps(candidates, params.strict_overlaps);
        report.overlaps_resolved = dropped;
        kept
    }
}

/// Collapse repeated mentions, apply the entity cap and assign ids in text order
fn build_entities(
    text: &str,
    candidates: Vec<Candidate>,
    params: &ExtractionParams,
    ids: &mut IdAllocator,
    report: &mut ExtractionReport,
) -> Vec<Entity> {
    let mut index: HashMap<(EntityType, String), usize> = HashMap::new();
    let mut groups: Vec<Vec<Candidate>> = Vec::new();

    for candidate in candidates {
        let key = (
            candidate.span.entity_type.clone(),
            normalize_surface(&candidate.span.text),
        );
        match index.get(&key) {
            Some(&i) => groups[i].push(candidate),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![candidate]);
            }
        }
    }

    // Canonical mention: highest confidence, earliest on ties.
    let mut chosen: Vec<(Candidate, Vec<[usize; 2]>)> = groups
        .into_iter()
        .filter_map(|mentions| {
            let spans: Vec<[usize; 2]> = mentions
                .iter()
                .map(|c| [c.span.start, c.span.end])
                .collect();
            let canonical = mentions.into_iter().reduce(|best, c| {
                if c.span.confidence > best.span.confidence {
                    c
                } else {
                    best
                }
            })?;
            Some((canonical, spans))
        })
        .collect();

    if chosen.len() > params.max_entities {
        chosen.sort_by(|(a, _), (b, _)| {
            b.span
                .confidence
                .total_cmp(&a.span.confidence)
                .then_with(|| a.span.start.cmp(&b.span.start))
        });
        report.truncated = chosen.len() - params.max_entities;
        chosen.truncate(params.max_entities);
    }
    chosen.sort_by_key(|(c, _)| (c.span.start, c.span.end));

    chosen
        .into_iter()
        .map(|(candidate, spans)| {
            let span = candidate.span;
            let snippet = context_snippet(text, span.start, span.end, params.context_window);
            let mut entity = Entity::new(
                ids.entity_id(),
                span.text,
                span.entity_type,
                span.confidence,
            )
            .with_span(span.start, span.end)
            .with_context(snippet)
                .with_property(PROP_MATCHER, candidate.origin.as_str())
                .with_property(PROP_DOMAIN_SPECIFIC, span.domain_specific);
            if spans.len() > 1 {
                entity = entity.with_property(PROP_MENTIONS, serde_json::json!(spans));
            }
            entity
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        reply: std::result::Result<String, BackendError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: BackendError) -> Self {
            Self {
                reply: Err(error),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    fn engine() -> ExtractionEngine {
        ExtractionEngine::new(Arc::new(PatternLibrary::builtin().unwrap()))
    }

    async fn run(
        engine: &ExtractionEngine,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<ExtractionOutput> {
        engine
            .extract(text, context, &ExtractionParams::default(), &mut IdAllocator::new())
            .await
    }

    #[tokio::test]
    async fn test_person_and_organization() {
        let output = run(&engine(), "Alice works for Acme Corp.", &ExtractionContext::generic())
            .await
            .unwrap();

        let found: Vec<(&str, &EntityType)> = output
            .entities
            .iter()
            .map(|e| (e.text.as_str(), &e.entity_type))
            .collect();
        assert!(found.contains(&("Alice", &EntityType::Person)));
        assert!(found.contains(&("Acme Corp.", &EntityType::Organization)));
        assert_eq!(output.entities[0].id, "e1");
        assert_eq!(output.entities[0].source_span.unwrap().start, 0);
    }

    #[tokio::test]
    async fn test_pattern_extraction_is_deterministic() {
        let engine = engine();
        let text = "Dr. Sarah Chen joined Globex Corporation in Boston on March 3, 2021 for $120,000.";
        let first = run(&engine, text, &ExtractionContext::generic()).await.unwrap();
        let second = run(&engine, text, &ExtractionContext::generic()).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first.entities).unwrap(),
            serde_json::to_string(&second.entities).unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_text_yields_empty_result() {
        let output = run(&engine(), "", &ExtractionContext::generic()).await.unwrap();
        assert!(output.entities.is_empty());

        let output = run(&engine(), "   \n", &ExtractionContext::new("legal")).await.unwrap();
        assert!(output.entities.is_empty());
    }

    #[tokio::test]
    async fn test_context_validated_before_matching() {
        let err = run(&engine(), "", &ExtractionContext::new("  ")).await.unwrap_err();
        assert!(matches!(err, OntoError::InvalidInput(_)));

        let strict = ExtractionEngine::new(Arc::new(
            PatternLibrary::builder()
                .with_builtin_domains()
                .allow_generic_fallback(false)
                .build()
                .unwrap(),
        ));
        let err = run(&strict, "", &ExtractionContext::new("astronomy"))
            .await
            .unwrap_err();
        assert!(matches!(err, OntoError::UnknownDomain(_)));
    }

    #[tokio::test]
    async fn test_max_entities_keeps_highest_confidence() {
        let params = ExtractionParams {
            max_entities: 1,
            ..Default::default()
        };
        let output = engine()
            .extract(
                "Alice works for Acme Corp.",
                &ExtractionContext::generic(),
                &params,
                &mut IdAllocator::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.entities.len(), 1);
        assert_eq!(output.entities[0].entity_type, EntityType::Organization);
        assert_eq!(output.report.truncated, 1);
    }

    #[tokio::test]
    async fn test_repeated_mentions_collapse() {
        let output = run(
            &engine(),
            "Alice met Bob. Later Alice called Bob again.",
            &ExtractionContext::generic(),
        )
        .await
        .unwrap();

        let alice: Vec<&Entity> = output
            .entities
            .iter()
            .filter(|e| e.text == "Alice")
            .collect();
        assert_eq!(alice.len(), 1);
        assert_eq!(
            alice[0].properties[PROP_MENTIONS],
            serde_json::json!([[0, 5], [21, 26]])
        );
    }

    #[tokio::test]
    async fn test_cross_type_overlap_only_resolved_when_strict() {
        let text = "The order came from Acme Corp. yesterday.";
        let loose = run(&engine(), text, &ExtractionContext::generic()).await.unwrap();
        assert!(loose.entities.iter().any(|e| e.entity_type == EntityType::Location));

        let params = ExtractionParams {
            strict_overlaps: true,
            ..Default::default()
        };
        let strict = engine()
            .extract(text, &ExtractionContext::generic(), &params, &mut IdAllocator::new())
            .await
            .unwrap();
        assert!(strict.entities.iter().all(|e| e.entity_type != EntityType::Location));
    }

    #[tokio::test]
    async fn test_fallback_reclassifies_low_confidence_span() {
        let backend = Arc::new(ScriptedBackend::replying(
            r#"Sure: {"type": "LOCATION", "confidence": 0.92}"#,
        ));
        let engine = engine().with_backend(backend.clone());
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::PatternWithFallback);

        let output = run(&engine, "She moved from Springfield last year.", &context)
            .await
            .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.report.forwarded, 1);
        assert_eq!(output.report.reclassified, 1);
        let place = &output.entities[0];
        assert_eq!(place.text, "Springfield");
        assert!((place.confidence - 0.92).abs() < 1e-6);
        assert_eq!(place.properties[PROP_MATCHER], "reclassified");
    }

    #[tokio::test]
    async fn test_fallback_failure_keeps_pattern_result() {
        let backend = Arc::new(ScriptedBackend::failing(BackendError::CircuitOpen));
        let engine = engine().with_backend(backend);
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::PatternWithFallback);

        let output = run(&engine, "She moved from Springfield last year.", &context)
            .await
            .unwrap();

        assert_eq!(output.report.backend_failures, 1);
        assert_eq!(output.entities.len(), 1);
        assert_eq!(output.entities[0].properties[PROP_MATCHER], "pattern");
    }

    #[tokio::test]
    async fn test_fallback_malformed_response_keeps_pattern_result() {
        let engine =
            engine().with_backend(Arc::new(ScriptedBackend::replying("LOCATION, probably")));
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::PatternWithFallback);

        let output = run(&engine, "She moved from Springfield last year.", &context)
            .await
            .unwrap();
        assert_eq!(output.report.backend_failures, 1);
        assert_eq!(output.entities.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_timeout_omits_span() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedBackend::replying(r#"{"type": "LOCATION"}"#)
        };
        let engine = engine().with_backend(Arc::new(backend));
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::PatternWithFallback);
        let params = ExtractionParams {
            backend_timeout: Duration::from_millis(20),
            ..Default::default()
        };

        let output = engine
            .extract(
                "Alice moved from Springfield last year.",
                &context,
                &params,
                &mut IdAllocator::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.report.omitted, 1);
        assert_eq!(output.entities.len(), 1);
        assert_eq!(output.entities[0].text, "Alice");
    }

    #[tokio::test]
    async fn test_generative_requires_backend() {
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::FullyGenerative);
        let err = run(&engine(), "Alice", &context).await.unwrap_err();
        assert!(matches!(err, OntoError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_generative_locates_mentions() {
        let backend = ScriptedBackend::replying(
            r#"[{"text": "Alice", "type": "person", "confidence": 0.9},
                {"text": "Atlantis", "type": "LOCATION"}]"#,
        );
        let engine = engine().with_backend(Arc::new(backend));
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::FullyGenerative);

        let output = run(&engine, "Alice met Alice.", &context).await.unwrap();

        assert_eq!(output.entities.len(), 1);
        assert_eq!(output.entities[0].entity_type, EntityType::Person);
        assert_eq!(output.entities[0].properties[PROP_MATCHER], "generative");
        assert!(output.entities[0].properties.contains_key(PROP_MENTIONS));
    }

    #[tokio::test]
    async fn test_generative_mentions_match_whole_words() {
        let backend = ScriptedBackend::replying(r#"[{"text": "Al", "type": "PERSON"}]"#);
        let engine = engine().with_backend(Arc::new(backend));
        let context =
            ExtractionContext::generic().with_strategy(ExtractionStrategy::FullyGenerative);

        let output = run(&engine, "Alice met Al.", &context).await.unwrap();

        assert_eq!(output.entities.len(), 1);
        let span = output.entities[0].source_span.unwrap();
        assert_eq!((span.start, span.end), (10, 12));
    }

    #[tokio::test]
    async fn test_generative_unknown_domain_is_an_error() {
        let library = PatternLibrary::builder()
            .with_builtin_domains()
            .allow_generic_fallback(false)
            .build()
            .unwrap();
        let backend = ScriptedBackend::replying("[]");
        let engine = ExtractionEngine::new(Arc::new(library)).with_backend(Arc::new(backend));
        let context =
            ExtractionContext::new("astronomy").with_strategy(ExtractionStrategy::FullyGenerative);

        let err = run(&engine, "Vega is bright.", &context).await.unwrap_err();
        assert!(matches!(err, OntoError::UnknownDomain(_)));
    }

    #[test]
    fn test_context_snippet_respects_char_boundaries() {
        let text = "Zoë joined Ünicorp AG in Zürich";
        let start = text.find("Ünicorp").unwrap();
        let snippet = context_snippet(text, start, start + "Ünicorp".len(), 4);
        assert_eq!(snippet, "ned Ünicorp AG");
    }
}
