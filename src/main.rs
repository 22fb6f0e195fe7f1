//! Monolith Decomposer - CLI
//!
//! Extract entities, propose service boundaries, review the plan and
//! generate the service scaffolding.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monolith_decomposer::codegen::ArtifactSet;
use monolith_decomposer::model::ExtractedModel;
use monolith_decomposer::plan::{load_snapshot, save_snapshot, PlanEdit, PlanEditor, PlanStore};
use monolith_decomposer::report::GenerationReport;
use monolith_decomposer::{Config, DecompositionPipeline};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "decomposer")]
#[command(about = "Decompose a monolith into microservices")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, env = "DECOMPOSER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the entity model from a source tree or model document
    Extract {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long, default_value = "model.json")]
        out: PathBuf,
    },

    /// Propose a decomposition plan for an extracted model
    Resolve {
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,
        #[arg(short, long, default_value = "plan.json")]
        out: PathBuf,
    },

    /// Apply one reviewer edit to a saved plan
    Edit {
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,
        #[arg(short, long, default_value = "plan.json")]
        plan: PathBuf,
        /// Edit as JSON, e.g. '{"op":"rename_service","service":1,"name":"Billing"}'
        #[arg(short, long)]
        edit: String,
        /// Version the edit was made against (defaults to the saved version)
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Check that a plan is complete and ready for generation
    Finalize {
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,
        #[arg(short, long, default_value = "plan.json")]
        plan: PathBuf,
    },

    /// Generate services and gateway from a finalized plan
    Generate {
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,
        #[arg(short, long, default_value = "plan.json")]
        plan: PathBuf,
        #[arg(short, long, default_value = "generated")]
        out: PathBuf,
    },

    /// Extract, resolve and generate without a review step
    Run {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long, default_value = "generated")]
        out: PathBuf,
    },

    /// Print a saved generation report
    Report {
        #[arg(short, long, default_value = "generated/report.json")]
        path: PathBuf,
        /// Print the raw JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,monolith_decomposer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract { source, out } => {
            let pipeline = DecompositionPipeline::new(config);
            let model = pipeline.extract(&source)?;
            write_json(&out, &model)?;
            tracing::info!("Extracted {} entities to {}", model.entities.len(), out.display());
            Ok(())
        }
        Commands::Resolve { model, out } => run_resolve(config, &model, &out).await,
        Commands::Edit {
            model,
            plan,
            edit,
            expected_version,
        } => run_edit(config, &model, &plan, &edit, expected_version),
        Commands::Finalize { model, plan } => {
            let store = open_store(&config, &model, &plan)?;
            let finalized = store.finalize()?;
            println!(
                "Plan v{} is final: {} services",
                finalized.version,
                finalized.services.len()
            );
            Ok(())
        }
        Commands::Generate { model, plan, out } => run_generate(config, &model, &plan, &out),
        Commands::Run { source, out } => run_all(config, &source, &out).await,
        Commands::Report { path, json } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if json {
                println!("{}", raw);
            } else {
                let report: GenerationReport = serde_json::from_str(&raw)?;
                print!("{}", report.render_text());
            }
            Ok(())
        }
    }
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn read_model(path: &Path) -> Result<ExtractedModel> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    let model: ExtractedModel = serde_json::from_str(&raw)?;
    Ok(ExtractedModel::new(model.entities, model.relationships))
}

fn open_store(config: &Config, model: &Path, plan: &Path) -> Result<PlanStore> {
    let pipeline = DecompositionPipeline::new(config.clone());
    let graph = pipeline.build_graph(&read_model(model)?)?;
    let snapshot = load_snapshot(plan)?;
    Ok(PlanStore::from_snapshot(PlanEditor::new(graph), snapshot))
}

async fn run_resolve(config: Config, model: &Path, out: &Path) -> Result<()> {
    let pipeline = DecompositionPipeline::new(config);
    let graph = pipeline.build_graph(&read_model(model)?)?;
    let profiles = pipeline.profile(&graph).await;
    let resolution = pipeline.resolve(&graph, profiles).await?;

    let store = PlanStore::new(PlanEditor::new(graph), resolution.plan);
    save_snapshot(out, &store.snapshot())?;

    tracing::info!(
        "Proposed {} services (cross-service weight {}, {} advisor calls) -> {}",
        store.current().services.len(),
        resolution.cross_service_weight,
        resolution.advisor_calls,
        out.display()
    );
    Ok(())
}

fn run_edit(
    config: Config,
    model: &Path,
    plan: &Path,
    edit: &str,
    expected_version: Option<u64>,
) -> Result<()> {
    let edit: PlanEdit = serde_json::from_str(edit).context("Invalid edit JSON")?;
    let store = open_store(&config, model, plan)?;
    let expected = expected_version.unwrap_or_else(|| store.version());
    let updated = store.apply(expected, &edit)?;
    save_snapshot(plan, &store.snapshot())?;
    println!(
        "Applied {} -> plan v{} ({} services, {} unassigned)",
        edit.op(),
        updated.version,
        updated.services.len(),
        updated.unassigned_entities.len()
    );
    Ok(())
}

fn write_output(
    pipeline: &DecompositionPipeline,
    artifacts: &ArtifactSet,
    report: &GenerationReport,
    out: &Path,
) -> Result<()> {
    artifacts.write_to(out)?;
    let report = report.clone().stamped(chrono::Utc::now());
    write_json(&out.join("report.json"), &report)?;
    print!("{}", report.render_text());
    tracing::debug!(
        "Token budget: {} of {} used",
        pipeline.accountant().used(),
        pipeline.accountant().max_total_tokens()
    );
    Ok(())
}

fn run_generate(config: Config, model: &Path, plan: &Path, out: &Path) -> Result<()> {
    let store = open_store(&config, model, plan)?;
    let plan = store.finalize()?;
    let pipeline = DecompositionPipeline::new(config);
    let graph = pipeline.build_graph(&read_model(model)?)?;
    let artifacts = pipeline.generate(graph, &plan)?;
    let report = pipeline.report(&artifacts, &plan);
    write_output(&pipeline, &artifacts, &report, out)
}

async fn run_all(config: Config, source: &Path, out: &Path) -> Result<()> {
    let pipeline = DecompositionPipeline::new(config);
    let output = pipeline.run(source).await?;
    write_json(&out.join("plan.json"), &output.resolution.plan)?;
    match (&output.artifacts, &output.report) {
        (Some(artifacts), Some(report)) => write_output(&pipeline, artifacts, report, out),
        _ => anyhow::bail!(
            "Plan has {} unassigned entities; review {} and run `generate`",
            output.resolution.plan.unassigned_entities.len(),
            out.join("plan.json").display()
        ),
    }
}
