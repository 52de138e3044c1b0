use clap::Parser;
use hearthpay::application::coordinator::PaymentCoordinator;
use hearthpay::application::engine::MilestoneEngine;
use hearthpay::domain::milestone::{MilestoneId, MilestoneUpdate, ProjectId};
use hearthpay::domain::ports::MilestoneStoreBox;
use hearthpay::error::EngineError;
use hearthpay::infrastructure::gateway::SimulatedGateway;
use hearthpay::infrastructure::in_memory::InMemoryMilestoneStore;
use hearthpay::interfaces::csv::command_reader::{CommandOp, CommandReader, CommandRecord};
use hearthpay::interfaces::csv::summary_writer::SummaryWriter;
use miette::{IntoDiagnostic, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Bound on each payment-gateway interaction, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    gateway_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let (engine_store, coordinator_store) = build_stores(&cli)?;
    let gateway = SimulatedGateway::new();

    let engine = MilestoneEngine::new(engine_store);
    let coordinator = PaymentCoordinator::with_timeout(
        coordinator_store,
        Box::new(gateway.clone()),
        Duration::from_millis(cli.gateway_timeout_ms),
    );

    // Labels are a harness convenience: milestone ids are engine-generated,
    // so command rows reference milestones through the label registered by
    // their create row.
    let mut labels: HashMap<String, MilestoneId> = HashMap::new();
    let mut projects: BTreeSet<ProjectId> = BTreeSet::new();

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for row in reader.commands() {
        match row {
            Ok(command) => {
                if let Err(e) =
                    apply_command(&engine, &coordinator, &gateway, &mut labels, &mut projects, command)
                        .await
                {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let mut summaries = Vec::with_capacity(projects.len());
    for project_id in projects {
        let summary = coordinator
            .get_project_summary(&project_id)
            .await
            .into_diagnostic()?;
        summaries.push((project_id, summary));
    }

    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_summaries(summaries).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn build_stores(cli: &Cli) -> Result<(MilestoneStoreBox, MilestoneStoreBox)> {
    use hearthpay::infrastructure::rocksdb::RocksDbMilestoneStore;

    if let Some(db_path) = &cli.db_path {
        let store = RocksDbMilestoneStore::open(db_path).into_diagnostic()?;
        Ok((Box::new(store.clone()), Box::new(store)))
    } else {
        let store = InMemoryMilestoneStore::new();
        Ok((Box::new(store.clone()), Box::new(store)))
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn build_stores(cli: &Cli) -> Result<(MilestoneStoreBox, MilestoneStoreBox)> {
    if cli.db_path.is_some() {
        miette::bail!("this build has no persistent storage; rebuild with --features storage-rocksdb");
    }
    let store = InMemoryMilestoneStore::new();
    Ok((Box::new(store.clone()), Box::new(store)))
}

async fn apply_command(
    engine: &MilestoneEngine,
    coordinator: &PaymentCoordinator,
    gateway: &SimulatedGateway,
    labels: &mut HashMap<String, MilestoneId>,
    projects: &mut BTreeSet<ProjectId>,
    command: CommandRecord,
) -> hearthpay::error::Result<()> {
    match command.op {
        CommandOp::Create => {
            let project = command
                .project
                .ok_or_else(|| EngineError::Validation("create requires a project".to_string()))?;
            let name = command
                .name
                .ok_or_else(|| EngineError::Validation("create requires a name".to_string()))?;
            let amount = command
                .amount
                .ok_or_else(|| EngineError::Validation("create requires an amount".to_string()))?;

            let milestone = engine
                .create(
                    ProjectId(project),
                    &name,
                    command.description.as_deref().unwrap_or(""),
                    amount,
                    command.due,
                )
                .await?;
            projects.insert(milestone.project_id.clone());
            labels.insert(command.label, milestone.id);
        }
        CommandOp::Complete => {
            let id = lookup(labels, &command.label)?;
            engine.mark_completed(id).await?;
        }
        CommandOp::Update => {
            let id = lookup(labels, &command.label)?;
            engine
                .update(
                    id,
                    MilestoneUpdate {
                        name: command.name,
                        description: command.description,
                        due_date: command.due,
                    },
                )
                .await?;
        }
        CommandOp::Pay => {
            let id = lookup(labels, &command.label)?;
            if let Some(outcome) = command.outcome {
                gateway.script(outcome).await;
            }
            coordinator.pay_milestone(id).await?;
        }
    }
    Ok(())
}

fn lookup(
    labels: &HashMap<String, MilestoneId>,
    label: &str,
) -> hearthpay::error::Result<MilestoneId> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| EngineError::Validation(format!("unknown milestone label '{label}'")))
}
