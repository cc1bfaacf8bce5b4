//! Weakness to refinement action table
//!
//! Each critic finding category maps to zero or more actions that adjust
//! the next round's pipeline parameters. New categories are handled by
//! adding rows to [`ACTION_TABLE`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use onto_core::{CriticScore, FindingCategory, RefinementConfig};
use onto_extractor::PipelineParams;

/// Lowest entity confidence floor an action will set
pub const MIN_ENTITY_CONFIDENCE: f32 = 0.05;
/// Highest entity or relationship confidence floor an action will set
pub const MAX_CONFIDENCE_FLOOR: f32 = 0.9;
/// Lowest similarity threshold deduplication is pushed to
pub const MIN_SIMILARITY_THRESHOLD: f32 = 0.7;
/// Widest proximity window, in bytes
pub const MAX_PROXIMITY_WINDOW: usize = 1000;
const MIN_RELATION_CONFIDENCE: f32 = 0.05;

/// Parameter an action adjusts; at most one action touches a knob per round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Knob {
    EntityConfidence,
    SimilarityThreshold,
    StrictOverlaps,
    ProximityWindow,
    RelationConfidence,
}

/// Adjusts params in place; `None` when the knob is already at its limit
pub type ActionFn = fn(&mut PipelineParams, &RefinementConfig) -> Option<String>;

/// One row of the action table
#[derive(Debug, Clone, Copy)]
pub struct RefinementAction {
    pub category: FindingCategory,
    pub name: &'static str,
    pub knob: Knob,
    pub apply: ActionFn,
}

/// An action that changed the parameters of a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
    pub name: String,
    pub category: FindingCategory,
    pub knob: Knob,
    pub detail: String,
}

const fn row(
    category: FindingCategory,
    name: &'static str,
    knob: Knob,
    apply: ActionFn,
) -> RefinementAction {
    RefinementAction {
        category,
        name,
        knob,
        apply,
    }
}

pub const ACTION_TABLE: &[RefinementAction] = &[
    row(
        FindingCategory::LowCompleteness,
        "lower_entity_confidence",
        Knob::EntityConfidence,
        lower_entity_confidence,
    ),
    row(
        FindingCategory::TooSparse,
        "lower_entity_confidence",
        Knob::EntityConfidence,
        lower_entity_confidence,
    ),
    row(
        FindingCategory::TooDense,
        "raise_entity_confidence",
        Knob::EntityConfidence,
        raise_entity_confidence,
    ),
    row(
        FindingCategory::LowDomainAlignment,
        "raise_entity_confidence",
        Knob::EntityConfidence,
        raise_entity_confidence,
    ),
    row(
        FindingCategory::LowConsistency,
        "lower_similarity_threshold",
        Knob::SimilarityThreshold,
        lower_similarity_threshold,
    ),
    row(
        FindingCategory::DuplicateIds,
        "lower_similarity_threshold",
        Knob::SimilarityThreshold,
        lower_similarity_threshold,
    ),
    row(
        FindingCategory::LowClarity,
        "strict_overlaps",
        Knob::StrictOverlaps,
        enable_strict_overlaps,
    ),
    row(
        FindingCategory::ConflictingTypes,
        "strict_overlaps",
        Knob::StrictOverlaps,
        enable_strict_overlaps,
    ),
    row(
        FindingCategory::MissingRelationships,
        "widen_proximity_window",
        Knob::ProximityWindow,
        widen_proximity_window,
    ),
    row(
        FindingCategory::MissingRelationships,
        "lower_relation_confidence",
        Knob::RelationConfidence,
        lower_relation_confidence,
    ),
    row(
        FindingCategory::LowRelationshipCoherence,
        "raise_relation_confidence",
        Knob::RelationConfidence,
        raise_relation_confidence,
    ),
];

/// Actions registered for a category, in table order
pub fn actions_for(category: FindingCategory) -> impl Iterator<Item = &'static RefinementAction> {
    ACTION_TABLE.iter().filter(move |a| a.category == category)
}

/// Apply the actions the score's findings call for, most severe first.
///
/// Actions named in `exhausted` are skipped, as is any action whose knob
/// was already adjusted this round.
pub fn plan_actions(
    score: &CriticScore,
    params: &mut PipelineParams,
    config: &RefinementConfig,
    exhausted: &BTreeSet<String>,
) -> Vec<AppliedAction> {
    let mut findings: Vec<_> = score.findings.iter().collect();
    findings.sort_by(|a, b| {
        b.severity
            .total_cmp(&a.severity)
            .then_with(|| a.category.cmp(&b.category))
    });

    let mut touched = BTreeSet::new();
    let mut applied = Vec::new();
    for finding in findings {
        for action in actions_for(finding.category) {
            if touched.contains(&action.knob) || exhausted.contains(action.name) {
                continue;
            }
            if let Some(detail) = (action.apply)(params, config) {
                touched.insert(action.knob);
                applied.push(AppliedAction {
                    name: action.name.to_string(),
                    category: finding.category,
                    knob: action.knob,
                    detail,
                });
            }
        }
    }
    applied
}

fn step_down(value: &mut f32, step: f32, floor: f32) -> Option<(f32, f32)> {
    let next = (*value - step).max(floor);
    if next >= *value - f32::EPSILON {
        return None;
    }
    let previous = std::mem::replace(value, next);
    Some((previous, next))
}

fn step_up(value: &mut f32, step: f32, ceiling: f32) -> Option<(f32, f32)> {
    let next = (*value + step).min(ceiling);
    if next <= *value + f32::EPSILON {
        return None;
    }
    let previous = std::mem::replace(value, next);
    Some((previous, next))
}

fn lower_entity_confidence(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    step_down(
        &mut params.extraction.min_confidence,
        config.confidence_step,
        MIN_ENTITY_CONFIDENCE,
    )
    .map(|(from, to)| format!("entity min_confidence {from:.2} -> {to:.2}"))
}

fn raise_entity_confidence(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    step_up(
        &mut params.extraction.min_confidence,
        config.confidence_step,
        MAX_CONFIDENCE_FLOOR,
    )
    .map(|(from, to)| format!("entity min_confidence {from:.2} -> {to:.2}"))
}

fn lower_similarity_threshold(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    step_down(
        &mut params.similarity_threshold,
        config.similarity_step,
        MIN_SIMILARITY_THRESHOLD,
    )
    .map(|(from, to)| format!("similarity_threshold {from:.2} -> {to:.2}"))
}

fn enable_strict_overlaps(
    params: &mut PipelineParams,
    _config: &RefinementConfig,
) -> Option<String> {
    if params.extraction.strict_overlaps {
        return None;
    }
    params.extraction.strict_overlaps = true;
    Some("strict overlap resolution enabled".to_string())
}

fn widen_proximity_window(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    let current = params.relations.proximity_window;
    let next = ((current as f32 * config.window_growth).round() as usize)
        .max(current + 1)
        .min(MAX_PROXIMITY_WINDOW);
    if next <= current {
        return None;
    }
    params.relations.proximity_window = next;
    Some(format!("proximity_window {current} -> {next}"))
}

fn lower_relation_confidence(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    step_down(
        &mut params.relations.min_confidence,
        config.confidence_step,
        MIN_RELATION_CONFIDENCE,
    )
    .map(|(from, to)| format!("relation min_confidence {from:.2} -> {to:.2}"))
}

fn raise_relation_confidence(
    params: &mut PipelineParams,
    config: &RefinementConfig,
) -> Option<String> {
    step_up(
        &mut params.relations.min_confidence,
        config.confidence_step,
        MAX_CONFIDENCE_FLOOR,
    )
    .map(|(from, to)| format!("relation min_confidence {from:.2} -> {to:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use onto_core::Finding;

    fn score_with(findings: &[(FindingCategory, f32)]) -> CriticScore {
        CriticScore {
            findings: findings
                .iter()
                .map(|(c, s)| Finding::new(*c, *s, "test"))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_category_with_a_fix_has_a_row() {
        for category in [
            FindingCategory::LowCompleteness,
            FindingCategory::LowConsistency,
            FindingCategory::LowClarity,
            FindingCategory::TooSparse,
            FindingCategory::TooDense,
            FindingCategory::MissingRelationships,
            FindingCategory::LowRelationshipCoherence,
            FindingCategory::LowDomainAlignment,
        ] {
            assert!(actions_for(category).next().is_some(), "{category:?}");
        }
        assert!(actions_for(FindingCategory::SelfLoop).next().is_none());
    }

    #[test]
    fn test_low_completeness_lowers_floor() {
        let mut params = PipelineParams::default();
        let applied = plan_actions(
            &score_with(&[(FindingCategory::LowCompleteness, 0.5)]),
            &mut params,
            &RefinementConfig::default(),
            &BTreeSet::new(),
        );

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].knob, Knob::EntityConfidence);
        assert!((params.extraction.min_confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_one_adjustment_per_knob() {
        let mut params = PipelineParams::default();
        let applied = plan_actions(
            &score_with(&[
                (FindingCategory::TooDense, 0.9),
                (FindingCategory::LowCompleteness, 0.4),
            ]),
            &mut params,
            &RefinementConfig::default(),
            &BTreeSet::new(),
        );

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "raise_entity_confidence");
        assert!((params.extraction.min_confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_limits_make_actions_inapplicable() {
        let mut params = PipelineParams::default();
        params.similarity_threshold = MIN_SIMILARITY_THRESHOLD;
        params.extraction.strict_overlaps = true;

        let applied = plan_actions(
            &score_with(&[
                (FindingCategory::LowConsistency, 0.5),
                (FindingCategory::LowClarity, 0.5),
            ]),
            &mut params,
            &RefinementConfig::default(),
            &BTreeSet::new(),
        );
        assert!(applied.is_empty());
    }

    #[test]
    fn test_missing_relationships_widens_window_and_lowers_floor() {
        let mut params = PipelineParams::default();
        let applied = plan_actions(
            &score_with(&[(FindingCategory::MissingRelationships, 1.0)]),
            &mut params,
            &RefinementConfig::default(),
            &BTreeSet::new(),
        );

        assert_eq!(applied.len(), 2);
        assert_eq!(params.relations.proximity_window, 225);
        assert!((params.relations.min_confidence - 0.1).abs() < 1e-6);

        params.relations.proximity_window = MAX_PROXIMITY_WINDOW;
        assert!(widen_proximity_window(&mut params, &RefinementConfig::default()).is_none());
    }

    #[test]
    fn test_exhausted_actions_are_skipped() {
        let mut params = PipelineParams::default();
        let exhausted = BTreeSet::from(["lower_entity_confidence".to_string()]);
        let applied = plan_actions(
            &score_with(&[(FindingCategory::LowCompleteness, 0.5)]),
            &mut params,
            &RefinementConfig::default(),
            &exhausted,
        );
        assert!(applied.is_empty());
        assert_eq!(params, PipelineParams::default());
    }
}
