//! Turns keyword spreadsheets into batch jobs, posts and editorial plans.

pub mod spreadsheet;

use chrono::{Days, NaiveDate, Utc};
use tracing::info;

use crate::db::{BatchCreate, BatchCreated, DbActorHandle, DbProject};
use crate::error::ForgeError;
use spreadsheet::ParsedSheet;

/// A batch that was written and is ready to be enqueued.
#[derive(Debug, Clone)]
pub struct Submission {
    pub created: BatchCreated,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct BatchProcessor {
    db: DbActorHandle,
}

impl BatchProcessor {
    pub fn new(db: DbActorHandle) -> Self {
        Self { db }
    }

    pub async fn submit_csv(
        &self,
        project: &DbProject,
        source_name: &str,
        data: &[u8],
        plan_name: Option<String>,
    ) -> Result<Submission, ForgeError> {
        let sheet = spreadsheet::parse_csv(data)?;
        self.submit(project, source_name, plan_name, None, sheet).await
    }

    pub async fn submit_keywords(
        &self,
        project: &DbProject,
        keywords: &[String],
        plan_name: Option<String>,
        start_date: Option<NaiveDate>,
    ) -> Result<Submission, ForgeError> {
        let sheet = spreadsheet::from_keywords(keywords);
        self.submit(project, "webhook", plan_name, start_date, sheet)
            .await
    }

    async fn submit(
        &self,
        project: &DbProject,
        source_name: &str,
        plan_name: Option<String>,
        start_date: Option<NaiveDate>,
        sheet: ParsedSheet,
    ) -> Result<Submission, ForgeError> {
        if sheet.rows.is_empty() {
            return Err(ForgeError::BadRequest(format!(
                "no usable keywords ({} skipped)",
                sheet.skipped
            )));
        }

        let today = Utc::now().date_naive();
        let start = start_date.unwrap_or_else(|| today.checked_add_days(Days::new(1)).unwrap_or(today));
        let items = spreadsheet::schedule(sheet.rows, start, project.settings.0.posts_per_day);
        let plan_name = plan_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{} plan {}", source_name, start.format("%Y-%m-%d")));

        let created = self
            .db
            .create_batch(BatchCreate {
                project_id: project.id.clone(),
                source_name: source_name.to_string(),
                plan_name,
                items,
            })
            .await?;

        info!(
            project_id = %project.id,
            batch_id = %created.batch.id,
            posts = created.posts.len(),
            skipped = sheet.skipped,
            "batch submitted"
        );

        Ok(Submission {
            created,
            skipped: sheet.skipped,
        })
    }

    /// Marks the batch running and returns its post ids. Runs of finished posts are no-ops.
    pub async fn start(&self, batch_id: &str) -> Result<Vec<String>, ForgeError> {
        let batch = self.db.mark_batch_running(batch_id).await?;
        let posts = self.db.list_batch_posts(batch_id).await?;

        let pending: Vec<String> = posts.into_iter().map(|p| p.id).collect();

        info!(
            batch_id,
            attempt = batch.attempts,
            pending = pending.len(),
            "batch started"
        );
        Ok(pending)
    }
}
