use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{Job, JobRecord, JobStatus, JobSummary, NewJob, Node};
use crate::schema::{jobs, nodes};
use crate::store::{JobStore, StoreError};

/// Rows per INSERT statement; keeps node batches far below Postgres' bind-parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// [`JobStore`] backed by Postgres through a diesel-async connection pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn into_jobs(records: Vec<JobRecord>) -> Result<Vec<Job>, StoreError> {
    records
        .into_iter()
        .map(|record| Job::try_from(record).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::pending(new_job);
        let record = job.to_record()?;

        let mut conn = self.pool.get().await?;
        diesel::insert_into(jobs::table)
            .values(&record)
            .execute(&mut conn)
            .await?;

        Ok(job)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        summary: Option<JobSummary>,
    ) -> Result<(), StoreError> {
        let summary = summary.as_ref().map(serde_json::to_string).transpose()?;

        let mut conn = self.pool.get().await?;
        let updated = diesel::update(jobs::table.find(id))
            .set((
                jobs::status.eq(status),
                jobs::error_message.eq(error_message),
                jobs::summary.eq(summary),
                jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;

        if updated == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut conn = self.pool.get().await?;
        let record = jobs::table
            .find(id)
            .select(JobRecord::as_select())
            .first::<JobRecord>(&mut conn)
            .await
            .optional()?;

        match record {
            Some(record) => Ok(Some(Job::try_from(record)?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.pool.get().await?;
        let records = jobs::table
            .order((jobs::created_at.desc(), jobs::id.asc()))
            .select(JobRecord::as_select())
            .load::<JobRecord>(&mut conn)
            .await?;

        into_jobs(records)
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.pool.get().await?;
        let records = jobs::table
            .filter(
                jobs::status
                    .eq(JobStatus::Pending)
                    .or(jobs::status.eq(JobStatus::Processing)),
            )
            .order((jobs::created_at.desc(), jobs::id.asc()))
            .select(JobRecord::as_select())
            .load::<JobRecord>(&mut conn)
            .await?;

        into_jobs(records)
    }

    async fn count_active_jobs(&self) -> Result<i64, StoreError> {
        let mut conn = self.pool.get().await?;
        let count = jobs::table
            .filter(
                jobs::status
                    .eq(JobStatus::Pending)
                    .or(jobs::status.eq(JobStatus::Processing)),
            )
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn insert_nodes(&self, batch: &[Node]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        // Parent references are checked at commit (DEFERRABLE), so chunk boundaries may split a subtree.
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                for chunk in batch.chunks(INSERT_CHUNK_SIZE) {
                    diesel::insert_into(nodes::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn list_nodes(&self, job_id: Uuid) -> Result<Vec<Node>, StoreError> {
        let mut conn = self.pool.get().await?;
        let mut found = nodes::table
            .filter(nodes::job_id.eq(job_id))
            .order(nodes::relative_path.asc())
            .select(Node::as_select())
            .load::<Node>(&mut conn)
            .await?;

        // The database collation may not be byte order.
        found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(found)
    }

    async fn delete_job_cascade(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                diesel::delete(nodes::table.filter(nodes::job_id.eq(id)))
                    .execute(conn)
                    .await?;

                let deleted = diesel::delete(jobs::table.find(id)).execute(conn).await?;
                if deleted == 0 {
                    // rolls back the node deletion
                    return Err(StoreError::JobNotFound(id));
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
