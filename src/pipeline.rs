//! End-to-end decomposition pipeline.
//!
//! ```text
//! source ──► extract ──► graph ──► profile ──► resolve ──► generate ──► report
//!                                    (advisor, metered)      (finalized plan)
//! ```
//!
//! Each stage is also callable on its own; the CLI runs them separately
//! with a human review step between `resolve` and `generate`.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::accounting::TokenAccountant;
use crate::advisor::{AdvisorGate, Consultation, EntityProfile, HttpBoundaryAdvisor};
use crate::codegen::{ArtifactSet, CodeGenerator};
use crate::extractor::extractor_for;
use crate::graph::{build_from_model, compute_metrics, CouplingMetrics, DependencyGraph};
use crate::model::{EntityId, ExtractedModel, UnitId};
use crate::plan::DecompositionPlan;
use crate::report::GenerationReport;
use crate::resolver::{AdvisorPolicy, BoundaryResolver, Resolution, ResolveConstraints};
use crate::Config;

/// Everything one full run produced.
#[derive(Debug)]
pub struct PipelineOutput {
    pub model: ExtractedModel,
    pub graph: Arc<DependencyGraph>,
    pub metrics: CouplingMetrics,
    pub resolution: Resolution,
    /// `None` when the proposed plan still has unassigned entities
    pub artifacts: Option<ArtifactSet>,
    pub report: Option<GenerationReport>,
}

/// Entity descriptions gathered by the profiling phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profiles {
    pub descriptions: BTreeMap<EntityId, String>,
    pub budget_truncated: bool,
}

pub struct DecompositionPipeline {
    config: Config,
    accountant: Arc<TokenAccountant>,
    gate: AdvisorGate,
}

impl DecompositionPipeline {
    /// Pipeline with the HTTP advisor from `config` (or none if disabled).
    pub fn new(config: Config) -> Self {
        let gate = match HttpBoundaryAdvisor::from_config(&config.advisor) {
            Some(advisor) => AdvisorGate::new(
                Arc::new(advisor),
                Duration::from_secs(config.advisor.timeout_secs.max(1)),
            ),
            None => AdvisorGate::disabled(),
        };
        Self::with_gate(config, gate)
    }

    pub fn with_gate(config: Config, gate: AdvisorGate) -> Self {
        let accountant = Arc::new(TokenAccountant::new(config.budget.max_total_tokens));
        Self {
            config,
            accountant,
            gate,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn accountant(&self) -> &Arc<TokenAccountant> {
        &self.accountant
    }

    pub fn extract(&self, source: &Path) -> Result<ExtractedModel> {
        let extractor = extractor_for(source, self.config.extraction.workers);
        let model = extractor
            .extract(source)
            .with_context(|| format!("{} extraction of {}", extractor.name(), source.display()))?;
        Ok(model)
    }

    pub fn build_graph(&self, model: &ExtractedModel) -> Result<Arc<DependencyGraph>> {
        let graph = build_from_model(model).context("Failed to build dependency graph")?;
        Ok(Arc::new(graph))
    }

    /// Ask the advisor to describe every entity, at most `parallelism`
    /// requests in flight. Stops on budget exhaustion.
    pub async fn profile(&self, graph: &DependencyGraph) -> Profiles {
        let mut profiles = Profiles::default();
        if !self.gate.is_enabled() {
            return profiles;
        }

        // One unit per source file; it is attributed through its lowest entity.
        let mut anchored: BTreeSet<String> = BTreeSet::new();
        let requests: Vec<(UnitId, EntityProfile)> = graph
            .entities
            .values()
            .map(|entity| {
                let unit = match entity.source_path.as_deref() {
                    Some(path) => {
                        let unit = UnitId::file(path);
                        if anchored.insert(path.to_string()) {
                            self.accountant.anchor(unit.clone(), entity.id);
                        }
                        unit
                    }
                    None => UnitId::entity(entity.id),
                };
                let profile = EntityProfile {
                    entity_id: entity.id,
                    name: entity.name.clone(),
                    attributes: entity
                        .attributes
                        .iter()
                        .map(|a| format!("{}: {}", a.name, a.semantic_type))
                        .collect(),
                    related: graph
                        .neighbors(entity.id)
                        .into_iter()
                        .filter_map(|(id, _)| graph.entity(id).map(|e| e.name.clone()))
                        .collect(),
                    source_path: entity.source_path.clone(),
                };
                (unit, profile)
            })
            .collect();

        let parallelism = self.config.advisor.parallelism.max(1);
        let gate = &self.gate;
        let accountant = self.accountant.as_ref();
        let mut answers = stream::iter(requests)
            .map(|(unit, profile)| async move {
                let answer = gate.describe(unit, &profile, accountant).await;
                (profile.entity_id, answer)
            })
            .buffer_unordered(parallelism);

        while let Some((entity, answer)) = answers.next().await {
            match answer {
                Consultation::Answered(d) => {
                    profiles.descriptions.insert(entity, d.description);
                }
                Consultation::BudgetExhausted => {
                    if !profiles.budget_truncated {
                        warn!(entity = %entity, "Token budget exhausted during profiling");
                    }
                    profiles.budget_truncated = true;
                }
                Consultation::Unavailable(reason) => {
                    debug!(entity = %entity, reason = %reason, "No description");
                }
            }
        }

        info!(
            described = profiles.descriptions.len(),
            entities = graph.node_count(),
            truncated = profiles.budget_truncated,
            "Entity profiling complete"
        );
        profiles
    }

    pub async fn resolve(&self, graph: &DependencyGraph, profiles: Profiles) -> Result<Resolution> {
        let resolver = BoundaryResolver::new()
            .with_advisor(self.gate.clone(), AdvisorPolicy::from(&self.config.advisor))
            .with_descriptions(profiles.descriptions);
        let constraints = ResolveConstraints::from(&self.config.budget);
        let mut resolution = resolver
            .resolve(graph, &self.accountant, &constraints)
            .await
            .context("Boundary resolution failed")?;
        resolution.plan.budget_truncated |= profiles.budget_truncated;

        let assignments = resolution.plan.assignments();
        self.accountant
            .attribute_entities(|e| assignments.get(&e).copied());
        Ok(resolution)
    }

    pub fn generate(
        &self,
        graph: Arc<DependencyGraph>,
        plan: &DecompositionPlan,
    ) -> Result<ArtifactSet> {
        let generator = CodeGenerator::new(graph, self.config.generation.clone());
        let artifacts = generator
            .generate(plan)
            .with_context(|| format!("Code generation for plan v{}", plan.version))?;
        Ok(artifacts)
    }

    pub fn report(&self, artifacts: &ArtifactSet, plan: &DecompositionPlan) -> GenerationReport {
        let assignments = plan.assignments();
        self.accountant
            .attribute_entities(|e| assignments.get(&e).copied());
        GenerationReport::build(
            artifacts,
            &self.accountant.summarize(self.config.report.top_files),
            plan,
        )
    }

    /// Run every stage, accepting the proposed plan without review.
    pub async fn run(&self, source: &Path) -> Result<PipelineOutput> {
        self.accountant.reset();

        let model = self.extract(source)?;
        let graph = self.build_graph(&model)?;
        let metrics = compute_metrics(&graph);
        info!(
            entities = graph.node_count(),
            edges = graph.edge_count(),
            components = metrics.component_count,
            "Dependency graph built"
        );

        let profiles = self.profile(&graph).await;
        let resolution = self.resolve(&graph, profiles).await?;

        let (artifacts, report) = if resolution.plan.is_valid() {
            let artifacts = self.generate(Arc::clone(&graph), &resolution.plan)?;
            let report = self.report(&artifacts, &resolution.plan);
            (Some(artifacts), Some(report))
        } else {
            warn!(
                unassigned = resolution.plan.unassigned_entities.len(),
                "Plan has unassigned entities; review it before generating"
            );
            (None, None)
        };

        Ok(PipelineOutput {
            model,
            graph,
            metrics,
            resolution,
            artifacts,
            report,
        })
    }
}
