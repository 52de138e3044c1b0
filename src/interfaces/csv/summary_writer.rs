use crate::domain::milestone::ProjectId;
use crate::domain::project::ProjectSummary;
use crate::error::Result;
use std::io::Write;

/// Writes per-project summaries as CSV:
/// `project,committed,completed,paid,progress`.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(sink),
        }
    }

    pub fn write_summaries(
        &mut self,
        summaries: impl IntoIterator<Item = (ProjectId, ProjectSummary)>,
    ) -> Result<()> {
        self.writer
            .write_record(["project", "committed", "completed", "paid", "progress"])?;
        for (project_id, summary) in summaries {
            self.writer.write_record([
                project_id.to_string(),
                summary.total_committed.normalize().to_string(),
                summary.total_completed.normalize().to_string(),
                summary.total_paid.normalize().to_string(),
                summary.progress_percent.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_normalized_rows() {
        let mut out = Vec::new();
        {
            let mut writer = SummaryWriter::new(&mut out);
            writer
                .write_summaries([(
                    ProjectId::from("p1"),
                    ProjectSummary {
                        total_committed: dec!(3500.00),
                        total_completed: dec!(1500.0),
                        total_paid: dec!(1000),
                        progress_percent: 43,
                    },
                )])
                .unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "project,committed,completed,paid,progress\np1,3500,1500,1000,43\n");
    }
}
