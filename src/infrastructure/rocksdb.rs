use crate::domain::milestone::{Milestone, MilestoneId, MilestonePatch, MilestoneStatus, ProjectId};
use crate::domain::ports::MilestoneStore;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for milestone records.
pub const CF_MILESTONES: &str = "milestones";

/// A persistent milestone store backed by RocksDB.
///
/// Records are stored as JSON under the milestone id. RocksDB gives
/// per-record atomic puts but no compare-and-swap, so every
/// read-modify-write (`conditional_update`, `delete`) is serialized through
/// a store-level mutex; plain reads go straight to the DB.
///
/// `Clone` shares the underlying `Arc<DB>` and the write lock.
#[derive(Clone)]
pub struct RocksDbMilestoneStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbMilestoneStore {
    /// Opens or creates a RocksDB instance at `path`, ensuring the
    /// milestones column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_milestones = ColumnFamilyDescriptor::new(CF_MILESTONES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_milestones]).map_err(internal)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_MILESTONES).ok_or_else(|| {
            EngineError::Internal(Box::new(std::io::Error::other(
                "milestones column family not found",
            )))
        })
    }

    fn read(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, id.as_bytes()).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    fn write(&self, milestone: &Milestone) -> Result<()> {
        let cf = self.cf()?;
        let value = serde_json::to_vec(milestone).map_err(internal)?;
        self.db
            .put_cf(cf, milestone.id.as_bytes(), value)
            .map_err(internal)
    }
}

fn internal<E: std::error::Error + Send + Sync + 'static>(e: E) -> EngineError {
    EngineError::Internal(Box::new(e))
}

#[async_trait]
impl MilestoneStore for RocksDbMilestoneStore {
    async fn create(&self, milestone: Milestone) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(&milestone)
    }

    async fn get(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        self.read(id)
    }

    async fn list(&self, project_id: &ProjectId) -> Result<Vec<Milestone>> {
        let cf = self.cf()?;
        let mut milestones = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(internal)?;
            let milestone: Milestone = serde_json::from_slice(&value).map_err(internal)?;
            if &milestone.project_id == project_id {
                milestones.push(milestone);
            }
        }
        Ok(milestones)
    }

    async fn conditional_update(
        &self,
        id: MilestoneId,
        expected_status: MilestoneStatus,
        patch: MilestonePatch,
    ) -> Result<Milestone> {
        let _guard = self.write_lock.lock().await;
        let mut milestone = self
            .read(id)?
            .ok_or(EngineError::NotFound { milestone_id: id })?;
        if milestone.status != expected_status {
            return Err(EngineError::Conflict {
                milestone_id: id,
                expected: expected_status,
                actual: milestone.status,
            });
        }
        patch.apply(&mut milestone);
        self.write(&milestone)?;
        Ok(milestone)
    }

    async fn delete(&self, id: MilestoneId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let milestone = self
            .read(id)?
            .ok_or(EngineError::NotFound { milestone_id: id })?;
        if milestone.status.is_frozen() {
            return Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: milestone.status,
                action: "delete",
            });
        }
        self.db.delete_cf(self.cf()?, id.as_bytes()).map_err(internal)
    }
}
