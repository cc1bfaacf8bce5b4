//! Refinement mediator
//!
//! Drives the generate, critique, refine loop for one session. Rounds run
//! strictly one after another; each round builds a fresh candidate
//! ontology, scores it, and either adopts it or keeps the previous one.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use onto_core::{
    CriticScore, EmbeddingProvider, EngineConfig, ExtractionContext, GenerativeBackend, OntoError,
    Ontology, RefinementConfig, Result,
};
use onto_extractor::{
    ExtractionEngine, IdAllocator, OntologyPipeline, PatternLibrary, PipelineParams,
    RelationshipInferencer, SemanticDeduplicator,
};

use crate::actions::{plan_actions, AppliedAction};
use crate::critic::OntologyCritic;
use crate::trend::ScoreTrend;

// ============================================================================
// State
// ============================================================================

/// Phase of a refinement cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementPhase {
    Init,
    Extracting,
    Critiquing,
    Refining,
    Converged,
    RoundLimit,
    Failed,
    Cancelled,
}

impl RefinementPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Converged | Self::RoundLimit | Self::Failed | Self::Cancelled
        )
    }
}

impl std::fmt::Display for RefinementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::Extracting => "extracting",
            Self::Critiquing => "critiquing",
            Self::Refining => "refining",
            Self::Converged => "converged",
            Self::RoundLimit => "round_limit",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// What happened in one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    /// Parameters the candidate was built with
    pub params: PipelineParams,
    pub overall: f32,
    /// EWMA of `overall` after this round
    pub smoothed: f32,
    /// Whether the candidate replaced the current ontology
    pub accepted: bool,
    pub entities: usize,
    pub relationships: usize,
    /// Adjustments chosen for the next round
    pub actions: Vec<AppliedAction>,
    pub elapsed_ms: u64,
}

/// Session-scoped state, owned by the mediator for the length of one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementState {
    pub session_id: Uuid,
    /// Best accepted ontology so far
    pub ontology: Ontology,
    /// Completed rounds
    pub round: usize,
    /// Critic score of every completed round, in order
    pub history: Vec<CriticScore>,
    pub converged: bool,
    pub phase: RefinementPhase,
    pub trend: ScoreTrend,
    pub best_round: Option<usize>,
    pub rounds: Vec<RoundRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RefinementState {
    fn new(ewma_alpha: f32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            ontology: Ontology::default(),
            round: 0,
            history: Vec::new(),
            converged: false,
            phase: RefinementPhase::Init,
            trend: ScoreTrend::new(ewma_alpha),
            best_round: None,
            rounds: Vec::new(),
            stop_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Score of the currently adopted ontology
    pub fn best_score(&self) -> Option<&CriticScore> {
        self.best_round
            .and_then(|round| self.history.get(round.checked_sub(1)?))
    }

    fn enter(&mut self, phase: RefinementPhase) {
        debug!(
            session = %self.session_id,
            round = self.round,
            from = %self.phase,
            to = %phase,
            "Phase transition"
        );
        self.phase = phase;
    }

    fn finish(&mut self, phase: RefinementPhase, reason: impl Into<String>) {
        let reason = reason.into();
        self.phase = phase;
        self.converged = phase == RefinementPhase::Converged;
        self.finished_at = Some(Utc::now());
        info!(
            session = %self.session_id,
            phase = %phase,
            rounds = self.round,
            best_round = ?self.best_round,
            overall = ?self.best_score().map(|s| s.overall),
            reason = %reason,
            "Refinement cycle finished"
        );
        self.stop_reason = Some(reason);
    }
}

/// Cooperative cancellation flag, checked between phases
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts consecutive rounds whose `overall` improved on the round before
/// by less than `delta`
#[derive(Debug, Clone)]
struct StallCounter {
    delta: f32,
    previous: Option<f32>,
    stalled: usize,
}

impl StallCounter {
    fn new(delta: f32) -> Self {
        Self {
            delta,
            previous: None,
            stalled: 0,
        }
    }

    /// Record one round's raw score and return the current stall count
    fn observe(&mut self, overall: f32) -> usize {
        if let Some(previous) = self.previous {
            if overall - previous < self.delta {
                self.stalled += 1;
            } else {
                self.stalled = 0;
            }
        }
        self.previous = Some(overall);
        self.stalled
    }
}

// ============================================================================
// Mediator
// ============================================================================

/// Runs refinement cycles over a fixed pipeline and critic
#[derive(Clone)]
pub struct RefinementMediator {
    pipeline: OntologyPipeline,
    critic: OntologyCritic,
    config: RefinementConfig,
    params: PipelineParams,
}

impl RefinementMediator {
    pub fn new(
        pipeline: OntologyPipeline,
        critic: OntologyCritic,
        config: RefinementConfig,
        params: PipelineParams,
    ) -> Self {
        Self {
            pipeline,
            critic,
            config,
            params,
        }
    }

    /// Build the pattern library and every component from configuration.
    ///
    /// Missing mandatory domains and invalid settings fail here, before any
    /// cycle runs.
    pub fn from_config(
        config: &EngineConfig,
        backend: Option<Arc<dyn GenerativeBackend>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let library = Arc::new(PatternLibrary::from_config(&config.extraction)?);

        let mut engine = ExtractionEngine::new(library.clone());
        if let Some(backend) = backend {
            engine = engine.with_backend(backend);
        }
        let pipeline = OntologyPipeline::new(
            engine,
            RelationshipInferencer::new(library.clone()),
            SemanticDeduplicator::new(embedder),
        );
        let critic = OntologyCritic::new(library, config.critic.clone());

        Ok(Self::new(
            pipeline,
            critic,
            config.refinement.clone(),
            PipelineParams::from_config(config),
        ))
    }

    pub fn initial_params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run one cycle to completion, blocking the calling thread.
    ///
    /// Owns a current-thread runtime, so it must not be called from inside
    /// an async context; use [`Self::run_refinement_cycle_async`] there.
    pub fn run_refinement_cycle(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<RefinementState> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OntoError::Other(anyhow::Error::new(e)))?;
        runtime.block_on(self.run_refinement_cycle_async(text, context))
    }

    pub async fn run_refinement_cycle_async(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<RefinementState> {
        self.run_with_cancel(text, context, &CancelHandle::new()).await
    }

    /// Run one cycle, stopping at the next phase boundary once `cancel` fires.
    ///
    /// Only input problems are errors. Non-convergence ends in
    /// `RoundLimit`, extraction errors in `Failed`; a cancelled cycle keeps
    /// the last adopted ontology.
    pub async fn run_with_cancel(
        &self,
        text: &str,
        context: &ExtractionContext,
        cancel: &CancelHandle,
    ) -> Result<RefinementState> {
        context.validate()?;
        let domain = context.domain_label();
        self.pipeline.engine().library().compiled_matchers(&domain)?;

        let mut state = RefinementState::new(self.config.ewma_alpha);
        info!(
            session = %state.session_id,
            domain = %domain,
            strategy = %context.strategy,
            max_rounds = self.config.max_rounds,
            "Refinement cycle started"
        );

        let mut params = self.params.clone();
        let mut best_params = params.clone();
        let mut exhausted: BTreeSet<String> = BTreeSet::new();
        let mut stall = StallCounter::new(self.config.convergence_delta);

        loop {
            if cancel.is_cancelled() {
                state.finish(RefinementPhase::Cancelled, "cancelled before round");
                break;
            }

            let round = state.round + 1;
            let started = Instant::now();
            state.enter(RefinementPhase::Extracting);

            let mut ids = IdAllocator::new();
            let candidate = match self.pipeline.build(text, context, &params, &mut ids).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(session = %state.session_id, round, error = %e, "Extraction failed");
                    state.finish(RefinementPhase::Failed, e.to_string());
                    break;
                }
            };

            if cancel.is_cancelled() {
                state.finish(RefinementPhase::Cancelled, "cancelled during extraction");
                break;
            }

            state.enter(RefinementPhase::Critiquing);
            let score = self.critic.evaluate(&candidate, context, text);
            let previous_best = state.best_score().map(|s| s.overall);
            let smoothed = state.trend.observe(score.overall);
            state.history.push(score.clone());
            state.round = round;

            let accepted = previous_best.map_or(true, |best| score.overall >= best);
            let entities = candidate.entities.len();
            let relationships = candidate.relationships.len();
            if accepted {
                state.ontology = candidate.with_version(round as u32);
                state.best_round = Some(round);
                best_params = params.clone();
                exhausted.clear();
            } else {
                info!(
                    session = %state.session_id,
                    round,
                    overall = score.overall,
                    best = ?previous_best,
                    "Candidate rejected, keeping previous ontology"
                );
                if let Some(last) = state.rounds.last() {
                    exhausted.extend(last.actions.iter().map(|a| a.name.clone()));
                }
            }

            let stalled = stall.observe(score.overall);

            info!(
                session = %state.session_id,
                round,
                overall = score.overall,
                smoothed,
                accepted,
                entities,
                relationships,
                "Round critiqued"
            );

            state.rounds.push(RoundRecord {
                round,
                params: params.clone(),
                overall: score.overall,
                smoothed,
                accepted,
                entities,
                relationships,
                actions: Vec::new(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            if text.trim().is_empty() {
                state.finish(RefinementPhase::Converged, "empty input");
                break;
            }
            if stalled >= self.config.patience {
                let reason = format!(
                    "improvement below {} for {stalled} rounds",
                    self.config.convergence_delta
                );
                state.finish(RefinementPhase::Converged, reason);
                break;
            }
            if round >= self.config.max_rounds {
                state.finish(RefinementPhase::RoundLimit, "round limit reached");
                break;
            }

            state.enter(RefinementPhase::Refining);
            params = best_params.clone();
            let actions = match state.best_score() {
                Some(basis) => plan_actions(basis, &mut params, &self.config, &exhausted),
                None => Vec::new(),
            };
            if actions.is_empty() {
                state.finish(RefinementPhase::Converged, "no applicable refinement actions");
                break;
            }

            for action in &actions {
                debug!(
                    session = %state.session_id,
                    round,
                    action = %action.name,
                    detail = %action.detail,
                    "Refinement action"
                );
            }
            if let Some(record) = state.rounds.last_mut() {
                record.actions = actions;
            }
        }

        Ok(state)
    }
}
