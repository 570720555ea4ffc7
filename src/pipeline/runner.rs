use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use wpforge_schema::{ArticleOutput, ResearchOutput, StrategyOutput, WpPostRequest};

use crate::db::{
    ArtifactBlob, ArtifactCreate, DbActorHandle, DbPost, DbPostArtifact, DbProject, ErrorEntry,
    PlanItemStatus, PostPatch, PostStatus,
};
use crate::error::ForgeError;
use crate::pipeline::prompts::{article_messages, parse_output, research_messages, strategy_messages};
use crate::pipeline::{CostEstimator, Guarded, IdempotencyGuard, Step};
use crate::providers::{Completion, Upstreams, WpSite};

/// What a WordPress publish produced; stored as the idempotency result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub wp_post_id: u64,
    /// Title sent to WordPress.
    #[serde(default)]
    pub title: String,
    pub link: Option<String>,
    pub media_id: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteOutcome {
    pub deleted: usize,
    pub remote_deleted: usize,
    pub not_found: usize,
    /// Owned posts whose delete failed; they are left in place.
    pub failed: usize,
}

/// Stored result of a guarded completion: the billed usage plus the parsed step output.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StepCompletion {
    completion: Completion,
    content: Value,
}

#[derive(Clone)]
pub struct PipelineRunner {
    db: DbActorHandle,
    upstreams: Upstreams,
    costs: Arc<CostEstimator>,
    guard: IdempotencyGuard,
}

impl PipelineRunner {
    pub fn new(
        db: DbActorHandle,
        upstreams: Upstreams,
        costs: Arc<CostEstimator>,
        guard: IdempotencyGuard,
    ) -> Self {
        Self {
            db,
            upstreams,
            costs,
            guard,
        }
    }

    pub fn costs(&self) -> &CostEstimator {
        &self.costs
    }

    /// Runs every generation step that has no active artifact yet, then publishes when the
    /// project auto-publishes.
    pub async fn run(&self, post_id: &str) -> Result<DbPost, ForgeError> {
        let post = self.db.get_post(post_id).await?;
        let project = self.db.get_project(&post.project_id).await?;
        let settings = &project.settings.0;

        if let Err(e) = self.costs.check_budget(settings) {
            self.record_failure(post_id, None, &e).await;
            return Err(e);
        }

        let mut ran_any = false;
        for step in Step::GENERATION {
            if self.db.active_artifact(post_id, step).await?.is_some() {
                continue;
            }
            self.execute_step(&post, &project, step).await?;
            ran_any = true;
        }

        if ran_any || post.status != PostStatus::Published {
            self.mark_ready(post_id).await?;
        }

        if settings.auto_publish && (ran_any || post.status != PostStatus::Published) {
            self.publish(post_id).await?;
        }

        info!(post_id, ran_any, "pipeline run finished");
        self.db.get_post(post_id).await
    }

    /// Re-runs `step` and every later generation step, producing new artifact versions.
    pub async fn regenerate(&self, post_id: &str, step: Step) -> Result<DbPost, ForgeError> {
        if step == Step::Publish {
            return Err(ForgeError::BadRequest(
                "publish cannot be regenerated; publish the post instead".to_string(),
            ));
        }

        let post = self.db.get_post(post_id).await?;
        let project = self.db.get_project(&post.project_id).await?;

        if let Err(e) = self.costs.check_budget(&project.settings.0) {
            self.record_failure(post_id, None, &e).await;
            return Err(e);
        }

        for step in step.and_downstream() {
            self.execute_step(&post, &project, step).await?;
        }
        self.mark_ready(post_id).await?;

        info!(post_id, from = %step, "post regenerated");
        self.db.get_post(post_id).await
    }

    /// Pushes the active article (and image) to WordPress, at most once per artifact set.
    pub async fn publish(&self, post_id: &str) -> Result<PublishReceipt, ForgeError> {
        let post = self.db.get_post(post_id).await?;
        let project = self.db.get_project(&post.project_id).await?;

        let res = self.publish_inner(&post, &project).await;
        match res {
            Ok(guarded) => {
                let replayed = guarded.is_replayed();
                let receipt = guarded.into_inner();
                self.db
                    .patch_post(
                        post_id,
                        PostPatch {
                            status: Some(PostStatus::Published),
                            wp_post_id: i64::try_from(receipt.wp_post_id).ok(),
                            wp_link: receipt.link.clone(),
                            ..PostPatch::default()
                        },
                    )
                    .await?;
                self.db
                    .set_plan_item_status(post_id, PlanItemStatus::Published)
                    .await?;

                info!(
                    post_id,
                    wp_post_id = receipt.wp_post_id,
                    replayed,
                    "post published"
                );
                if !replayed {
                    self.notify_published(&project, &post, &receipt).await;
                }
                Ok(receipt)
            }
            Err(e) => {
                self.fail_step(post_id, Some(Step::Publish), &e, post.status)
                    .await;
                Err(e)
            }
        }
    }

    async fn publish_inner(
        &self,
        post: &DbPost,
        project: &DbProject,
    ) -> Result<Guarded<PublishReceipt>, ForgeError> {
        let (article_row, article) = self.input::<ArticleOutput>(&post.id, Step::Article).await?;
        let (_, strategy) = self.input::<StrategyOutput>(&post.id, Step::Strategy).await?;
        let image_row = self.db.active_artifact(&post.id, Step::Image).await?;

        self.set_status(&post.id, PostStatus::Publishing).await?;

        let values = [
            post.id.clone(),
            article_row.id.clone(),
            image_row
                .as_ref()
                .map(|a| a.id.clone())
                .unwrap_or_else(|| "none".to_string()),
        ];

        self.guard
            .run("wordpress.publish", &values, || {
                self.push_to_wordpress(post, project, &strategy, &article, image_row.as_ref())
            })
            .await
    }

    async fn push_to_wordpress(
        &self,
        post: &DbPost,
        project: &DbProject,
        strategy: &StrategyOutput,
        article: &ArticleOutput,
        image: Option<&DbPostArtifact>,
    ) -> Result<PublishReceipt, ForgeError> {
        let settings = &project.settings.0;
        let site = WpSite::from_project(project)?;
        let wordpress = &self.upstreams.wordpress;

        let slug = strategy
            .slug
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&post.keyword));

        let image = image.filter(|a| !is_skipped(a));
        let media_id = match image {
            Some(image) => {
                let ArtifactBlob {
                    content_type,
                    bytes,
                } = self.db.artifact_blob(&image.id).await?.ok_or_else(|| {
                    ForgeError::MissingArtifact {
                        post_id: post.id.clone(),
                        step: Step::Image,
                    }
                })?;
                let ext = content_type.strip_prefix("image/").unwrap_or("jpeg");
                let media = wordpress
                    .upload_media(&site, &format!("{slug}.{ext}"), &content_type, bytes)
                    .await?;
                Some(media.id)
            }
            None => None,
        };

        // A title given with the keyword wins; otherwise the active strategy's title.
        let title = post
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| strategy.title.clone());

        let request = WpPostRequest {
            title: title.clone(),
            content: article.html.clone(),
            excerpt: strategy.meta_description.clone(),
            slug: Some(slug),
            status: settings.wp_status.clone(),
            featured_media: media_id,
            categories: settings.wp_category_ids.clone(),
        };

        let existing = post.wp_post_id.and_then(|id| u64::try_from(id).ok());
        let written = match existing {
            Some(wp_post_id) => wordpress.update_post(&site, wp_post_id, &request).await?,
            None => wordpress.create_post(&site, &request).await?,
        };

        Ok(PublishReceipt {
            wp_post_id: written.id,
            title,
            link: written.link,
            media_id,
            status: written.status,
        })
    }

    pub async fn activate_artifact(
        &self,
        post_id: &str,
        artifact_id: &str,
    ) -> Result<DbPostArtifact, ForgeError> {
        self.db.activate_artifact(post_id, artifact_id).await
    }

    /// Deletes the post locally and, when `remote` and it was published, in WordPress.
    ///
    /// Returns whether a WordPress post was deleted. The remote delete happens first so a
    /// failure leaves the local row in place.
    pub async fn delete_post(&self, post_id: &str, remote: bool) -> Result<bool, ForgeError> {
        let post = self.db.get_post(post_id).await?;

        let wp_post_id = post
            .wp_post_id
            .and_then(|id| u64::try_from(id).ok())
            .filter(|_| remote);

        let mut remote_deleted = false;
        if let Some(wp_post_id) = wp_post_id {
            let project = self.db.get_project(&post.project_id).await?;
            let site = WpSite::from_project(&project)?;
            remote_deleted = self
                .upstreams
                .wordpress
                .delete_post(&site, wp_post_id)
                .await?;
        }

        self.db.delete_post(post_id).await?;
        info!(post_id, remote_deleted, "post deleted");
        Ok(remote_deleted)
    }

    /// Deletes every listed post owned by `project_id`; others count as not found.
    pub async fn bulk_delete(
        &self,
        project_id: &str,
        post_ids: &[String],
        remote: bool,
    ) -> Result<BulkDeleteOutcome, ForgeError> {
        let mut outcome = BulkDeleteOutcome::default();
        let mut seen = ahash::AHashSet::new();

        for post_id in post_ids {
            if !seen.insert(post_id.as_str()) {
                continue;
            }
            match self.db.get_post(post_id).await {
                Ok(post) if post.project_id == project_id => {
                    match self.delete_post(post_id, remote).await {
                        Ok(remote_deleted) => {
                            outcome.deleted += 1;
                            if remote_deleted {
                                outcome.remote_deleted += 1;
                            }
                        }
                        Err(e) => {
                            warn!(post_id, error = %e, "bulk delete skipped post");
                            outcome.failed += 1;
                        }
                    }
                }
                Ok(_) | Err(ForgeError::NotFound { .. }) => outcome.not_found += 1,
                Err(e) => {
                    warn!(post_id, error = %e, "bulk delete lookup failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            project_id,
            deleted = outcome.deleted,
            remote_deleted = outcome.remote_deleted,
            not_found = outcome.not_found,
            failed = outcome.failed,
            "bulk delete finished"
        );
        Ok(outcome)
    }

    async fn execute_step(
        &self,
        post: &DbPost,
        project: &DbProject,
        step: Step,
    ) -> Result<DbPostArtifact, ForgeError> {
        let previous = self.db.get_post(&post.id).await?.status;
        self.set_status(&post.id, PostStatus::running(step)).await?;

        let res = if step.is_llm() {
            self.llm_step(post, project, step).await
        } else {
            self.image_step(post, project).await
        };

        match res {
            Ok(artifact) => {
                info!(
                    post_id = %post.id,
                    step = %step,
                    version = artifact.version,
                    cost_usd = artifact.cost_usd,
                    "step finished"
                );
                Ok(artifact)
            }
            Err(e) => {
                self.fail_step(&post.id, Some(step), &e, previous).await;
                Err(e)
            }
        }
    }

    async fn llm_step(
        &self,
        post: &DbPost,
        project: &DbProject,
        step: Step,
    ) -> Result<DbPostArtifact, ForgeError> {
        let settings = &project.settings.0;
        let model = self
            .costs
            .model_for(settings, step)
            .ok_or_else(|| ForgeError::UnexpectedError(format!("{step} has no model")))?
            .to_string();

        let messages = match step {
            Step::Research => research_messages(&post.keyword, settings),
            Step::Strategy => {
                let (_, research) = self.input::<ResearchOutput>(&post.id, Step::Research).await?;
                strategy_messages(&post.keyword, settings, &research)
            }
            Step::Article => {
                let (_, strategy) = self.input::<StrategyOutput>(&post.id, Step::Strategy).await?;
                article_messages(&post.keyword, settings, &strategy)
            }
            Step::Image | Step::Publish => {
                return Err(ForgeError::UnexpectedError(format!(
                    "{step} is not a language-model step"
                )));
            }
        };

        let version = self.db.next_artifact_version(&post.id, step).await?;
        let values = [post.id.clone(), step.to_string(), version.to_string()];
        let openrouter = &self.upstreams.openrouter;
        let model_id = model.as_str();

        let guarded = self
            .guard
            .run(&format!("openrouter.{step}"), &values, move || async move {
                let completion = openrouter.chat(step, model_id, messages, None).await?;
                let content = parse_step_output(step, &completion.content)?;
                Ok(StepCompletion {
                    completion,
                    content,
                })
            })
            .await?;
        if guarded.is_replayed() {
            info!(post_id = %post.id, step = %step, version, "reusing paid completion");
        }
        let StepCompletion {
            completion,
            content,
        } = guarded.into_inner();

        let cost_usd = self
            .costs
            .cost(&model, completion.tokens_in, completion.tokens_out);
        self.db
            .insert_artifact(ArtifactCreate {
                post_id: post.id.clone(),
                step,
                content,
                model: Some(completion.model),
                tokens_in: completion.tokens_in as i64,
                tokens_out: completion.tokens_out as i64,
                cost_usd,
                blob: None,
            })
            .await
    }

    async fn image_step(
        &self,
        post: &DbPost,
        project: &DbProject,
    ) -> Result<DbPostArtifact, ForgeError> {
        if !project.settings.0.generate_images {
            return self
                .db
                .insert_artifact(ArtifactCreate {
                    post_id: post.id.clone(),
                    step: Step::Image,
                    content: json!({ "skipped": true }),
                    model: None,
                    tokens_in: 0,
                    tokens_out: 0,
                    cost_usd: 0.0,
                    blob: None,
                })
                .await;
        }

        let (_, strategy) = self.input::<StrategyOutput>(&post.id, Step::Strategy).await?;
        let prompt = strategy
            .image_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("editorial header photo for: {}", strategy.title));

        let pollinations = &self.upstreams.pollinations;
        let image = pollinations.generate(&prompt).await?;

        self.db
            .insert_artifact(ArtifactCreate {
                post_id: post.id.clone(),
                step: Step::Image,
                content: json!({
                    "prompt": prompt,
                    "source_url": image.source_url.as_str(),
                    "content_type": image.content_type,
                    "bytes": image.bytes.len(),
                }),
                model: Some("pollinations".to_string()),
                tokens_in: 0,
                tokens_out: 0,
                cost_usd: self.costs.image_cost(),
                blob: Some(ArtifactBlob {
                    content_type: image.content_type,
                    bytes: image.bytes,
                }),
            })
            .await
    }

    /// Active artifact of `step` decoded as its output type.
    async fn input<T: DeserializeOwned>(
        &self,
        post_id: &str,
        step: Step,
    ) -> Result<(DbPostArtifact, T), ForgeError> {
        let artifact = self
            .db
            .active_artifact(post_id, step)
            .await?
            .ok_or_else(|| ForgeError::MissingArtifact {
                post_id: post_id.to_string(),
                step,
            })?;
        let parsed = serde_json::from_value(artifact.content.0.clone())?;
        Ok((artifact, parsed))
    }

    async fn set_status(&self, post_id: &str, status: PostStatus) -> Result<(), ForgeError> {
        self.db
            .patch_post(
                post_id,
                PostPatch {
                    status: Some(status),
                    ..PostPatch::default()
                },
            )
            .await
    }

    async fn mark_ready(&self, post_id: &str) -> Result<(), ForgeError> {
        self.set_status(post_id, PostStatus::Ready).await?;
        self.db
            .set_plan_item_status(post_id, PlanItemStatus::Generated)
            .await
    }

    /// A duplicate in flight is not a failure of this post: put back the status it had
    /// before the step and let the queue come back later.
    async fn fail_step(
        &self,
        post_id: &str,
        step: Option<Step>,
        err: &ForgeError,
        previous: PostStatus,
    ) {
        if matches!(err, ForgeError::DuplicateInFlight { .. }) {
            if let Err(e) = self.set_status(post_id, previous).await {
                warn!(post_id, error = %e, "failed to restore post status");
            }
            return;
        }
        self.record_failure(post_id, step, err).await;
    }

    /// Marks the post failed and appends to its `error_log`. Never fails itself.
    async fn record_failure(&self, post_id: &str, step: Option<Step>, err: &ForgeError) {
        warn!(post_id, step = ?step, code = err.code(), error = %err, "pipeline step failed");

        let entry = ErrorEntry {
            step,
            code: err.code().to_string(),
            message: err.to_string(),
            at: Utc::now(),
        };
        if let Err(e) = self.set_status(post_id, PostStatus::Failed).await {
            warn!(post_id, error = %e, "failed to mark post failed");
        }
        if let Err(e) = self.db.append_post_error(post_id, entry).await {
            warn!(post_id, error = %e, "failed to append post error");
        }
    }

    async fn notify_published(&self, project: &DbProject, post: &DbPost, receipt: &PublishReceipt) {
        let (Some(wuzapi), Some(phone)) = (
            self.upstreams.wuzapi.as_ref(),
            project.whatsapp_phone.as_deref().filter(|p| !p.trim().is_empty()),
        ) else {
            return;
        };

        let title = receipt.title.as_str();
        let body = match &receipt.link {
            Some(link) => format!("[{}] Published: {title}\n{link}", project.name),
            None => format!("[{}] Published: {title}", project.name),
        };

        if let Err(e) = wuzapi.send_text(phone, body).await {
            warn!(post_id = %post.id, error = %e, "publish notification failed");
            let entry = ErrorEntry {
                step: Some(Step::Publish),
                code: "NOTIFY_FAILED".to_string(),
                message: e.to_string(),
                at: Utc::now(),
            };
            if let Err(e) = self.db.append_post_error(&post.id, entry).await {
                warn!(post_id = %post.id, error = %e, "failed to append post error");
            }
        }
    }
}

fn parse_step_output(step: Step, raw: &str) -> Result<Value, ForgeError> {
    let value = match step {
        Step::Research => serde_json::to_value(parse_output::<ResearchOutput>(step, raw)?)?,
        Step::Strategy => serde_json::to_value(parse_output::<StrategyOutput>(step, raw)?)?,
        Step::Article => {
            let mut article = parse_output::<ArticleOutput>(step, raw)?;
            if article.html.trim().is_empty() {
                return Err(ForgeError::MalformedOutput {
                    step,
                    reason: "article html is empty".to_string(),
                });
            }
            if article.word_count.is_none() {
                article.word_count = Some(count_words(&article.html));
            }
            serde_json::to_value(article)?
        }
        Step::Image | Step::Publish => {
            return Err(ForgeError::UnexpectedError(format!(
                "{step} has no language-model output"
            )));
        }
    };
    Ok(value)
}

/// Image placeholder written when a project does not generate images.
fn is_skipped(artifact: &DbPostArtifact) -> bool {
    artifact.content.0.get("skipped").and_then(Value::as_bool) == Some(true)
}

/// Words in an HTML fragment, ignoring tags.
fn count_words(html: &str) -> u32 {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().count() as u32
}

pub(crate) fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Best Hiking Trails: Lisbon 2025! "), "best-hiking-trails-lisbon-2025");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn count_words_ignores_markup() {
        assert_eq!(count_words("<h2>Intro</h2><p>Hello <b>big</b> world</p>"), 4);
    }

    #[test]
    fn article_output_fills_missing_word_count() {
        let v = parse_step_output(Step::Article, r#"{"html":"<p>one two three</p>"}"#).unwrap();
        assert_eq!(v["word_count"], 3);
        assert!(parse_step_output(Step::Article, r#"{"html":"  "}"#).is_err());
    }
}
