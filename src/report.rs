//! Generation Report.
//!
//! Aggregates the accountant's token summary with per-file statistics of
//! the generated artifact set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::accounting::{TokenStats, TokenUsageSummary};
use crate::codegen::{ArtifactKind, ArtifactOwner, ArtifactSet, Layer};
use crate::plan::DecompositionPlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub relative_path: String,
    pub service_id: ArtifactOwner,
    pub layer: Layer,
    pub kind: ArtifactKind,
    pub lines: usize,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStats {
    pub files: usize,
    pub lines: usize,
    pub bytes: usize,
}

impl SizeStats {
    fn add(&mut self, file: &FileStats) {
        self.files += 1;
        self.lines += file.lines;
        self.bytes += file.bytes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer: Layer,
    #[serde(flatten)]
    pub size: SizeStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service_id: ArtifactOwner,
    pub name: String,
    pub entities: usize,
    pub outbound_dependencies: usize,
    #[serde(flatten)]
    pub size: SizeStats,
    /// Analysis tokens attributed to this service
    pub tokens: TokenStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub plan_version: u64,
    pub budget_truncated: bool,
    pub totals: SizeStats,
    pub services: Vec<ServiceReport>,
    pub layers: Vec<LayerStats>,
    pub files: Vec<FileStats>,
    pub token_usage: TokenUsageSummary,
}

fn file_stats(artifact: &crate::codegen::GenerationArtifact) -> FileStats {
    FileStats {
        relative_path: artifact.relative_path.clone(),
        service_id: artifact.owner,
        layer: artifact.layer,
        kind: artifact.kind,
        lines: artifact.content.lines().count(),
        bytes: artifact.content.len(),
        sha256: hex::encode(Sha256::digest(artifact.content.as_bytes())),
    }
}

impl GenerationReport {
    /// Deterministic for identical inputs; stamp it with
    /// [`GenerationReport::stamped`] when a timestamp is wanted.
    pub fn build(
        artifacts: &ArtifactSet,
        usage: &TokenUsageSummary,
        plan: &DecompositionPlan,
    ) -> Self {
        let files: Vec<FileStats> = artifacts.iter().map(file_stats).collect();

        let mut totals = SizeStats::default();
        let mut layers: BTreeMap<Layer, SizeStats> = BTreeMap::new();
        let mut owners: BTreeMap<ArtifactOwner, SizeStats> = BTreeMap::new();
        for file in &files {
            totals.add(file);
            layers.entry(file.layer).or_default().add(file);
            owners.entry(file.service_id).or_default().add(file);
        }

        let tokens: BTreeMap<_, _> = usage
            .microservice_stats
            .iter()
            .map(|s| (s.service_id, s.stats.clone()))
            .collect();

        let mut services: Vec<ServiceReport> = plan
            .services
            .iter()
            .map(|s| {
                let owner = ArtifactOwner::Service(s.id);
                ServiceReport {
                    service_id: owner,
                    name: s.proposed_name.clone(),
                    entities: s.member_entity_ids.len(),
                    outbound_dependencies: s.outbound_edges().count(),
                    size: owners.remove(&owner).unwrap_or_default(),
                    tokens: tokens.get(&s.id).cloned().unwrap_or_default(),
                }
            })
            .collect();
        if let Some(size) = owners.remove(&ArtifactOwner::Gateway) {
            services.push(ServiceReport {
                service_id: ArtifactOwner::Gateway,
                name: "gateway".into(),
                entities: 0,
                outbound_dependencies: plan.services.len(),
                size,
                tokens: TokenStats::default(),
            });
        }

        Self {
            generated_at: None,
            plan_version: plan.version,
            budget_truncated: plan.budget_truncated,
            totals,
            services,
            layers: layers
                .into_iter()
                .map(|(layer, size)| LayerStats { layer, size })
                .collect(),
            files,
            token_usage: usage.clone(),
        }
    }

    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Generation report (plan v{})", self.plan_version);
        if self.budget_truncated {
            let _ = writeln!(out, "  plan is budget-truncated");
        }
        let _ = writeln!(
            out,
            "  {} files, {} lines, {} bytes",
            self.totals.files, self.totals.lines, self.totals.bytes
        );
        let _ = writeln!(out, "\nServices:");
        for s in &self.services {
            let _ = writeln!(
                out,
                "  {:<8} {:<24} entities={:<3} files={:<3} lines={:<6} tokens={}",
                s.service_id.to_string(),
                s.name,
                s.entities,
                s.size.files,
                s.size.lines,
                s.tokens.total_tokens()
            );
        }
        let _ = writeln!(out, "\nLayers:");
        for l in &self.layers {
            let _ = writeln!(
                out,
                "  {:<13} files={:<3} lines={}",
                l.layer.to_string(),
                l.size.files,
                l.size.lines
            );
        }
        let u = &self.token_usage;
        let _ = writeln!(
            out,
            "\nTokens: {} used ({} prompt / {} response, {} requests), {} of {} remaining{}",
            u.total_tokens,
            u.total_prompt_tokens,
            u.total_response_tokens,
            u.total_requests,
            u.remaining,
            u.max_total_tokens,
            if u.exhausted { ", budget exhausted" } else { "" }
        );
        if !u.top_consuming_files.is_empty() {
            let _ = writeln!(out, "Top consumers:");
            for unit in &u.top_consuming_files {
                let _ = writeln!(out, "  {:<40} {}", unit.unit_id.as_str(), unit.total_tokens);
            }
        }
        out
    }
}
