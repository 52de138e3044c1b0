use crate::error::{EngineError, Result};
use crate::infrastructure::gateway::ScriptedOutcome;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandOp {
    Create,
    Complete,
    Update,
    Pay,
}

/// One row of the command CSV driving the CLI harness.
///
/// Milestone ids are engine-generated, so rows reference milestones through a
/// caller-chosen `label`: a `create` row registers it, later rows look it up.
/// The `outcome` column scripts the simulated gateway for `pay` rows.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub op: CommandOp,
    pub project: Option<String>,
    pub label: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub due: Option<NaiveDate>,
    pub outcome: Option<ScriptedOutcome>,
}

/// Reads commands from a CSV source.
///
/// Wraps `csv::Reader` with trimming and flexible record lengths, and yields
/// rows lazily so large files stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EngineError::from))
    }
}
