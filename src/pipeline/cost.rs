use ahash::AHashMap;
use serde::Serialize;
use tracing::warn;

use crate::config::{Config, ModelPrice, StepModels, TokenEstimate, TokenEstimates};
use crate::db::ProjectSettings;
use crate::error::ForgeError;
use crate::pipeline::Step;

/// Article output tokens per requested word.
const TOKENS_PER_WORD: f64 = 1.4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEstimate {
    pub step: Step,
    pub model: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostEstimate {
    pub steps: Vec<StepEstimate>,
    pub total_usd: f64,
    /// Models with no price entry; they were counted as free.
    pub unpriced_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEstimate {
    pub posts: u32,
    pub per_post_usd: f64,
    pub total_usd: f64,
    pub per_post: PostEstimate,
}

/// Price and token arithmetic for billing artifacts and dry-run estimates.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    prices: AHashMap<String, ModelPrice>,
    estimates: TokenEstimates,
    models: StepModels,
    price_per_image: f64,
}

impl CostEstimator {
    pub fn new(
        prices: impl IntoIterator<Item = (String, ModelPrice)>,
        estimates: TokenEstimates,
        models: StepModels,
        price_per_image: f64,
    ) -> Self {
        Self {
            prices: prices.into_iter().collect(),
            estimates,
            models,
            price_per_image,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let openrouter = &cfg.providers.openrouter;
        Self::new(
            openrouter.prices.clone(),
            openrouter.estimates.clone(),
            openrouter.models.clone(),
            cfg.providers.pollinations.price_per_image,
        )
    }

    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }

    /// USD for one completion. Unknown models cost 0.
    pub fn cost(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        match self.price(model) {
            Some(price) => {
                (tokens_in as f64 * price.input_per_mtok + tokens_out as f64 * price.output_per_mtok)
                    / 1_000_000.0
            }
            None => {
                warn!(model, "no price configured for model, billing 0");
                0.0
            }
        }
    }

    pub fn image_cost(&self) -> f64 {
        self.price_per_image
    }

    /// Model for an LLM step: the project's override, else the configured default.
    pub fn model_for<'a>(&'a self, settings: &'a ProjectSettings, step: Step) -> Option<&'a str> {
        let (project, default) = match step {
            Step::Research => (&settings.research_model, &self.models.research),
            Step::Strategy => (&settings.strategy_model, &self.models.strategy),
            Step::Article => (&settings.article_model, &self.models.article),
            Step::Image | Step::Publish => return None,
        };
        Some(
            project
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(default.as_str()),
        )
    }

    /// Expected token use of an LLM step under `settings`.
    pub fn tokens_for(&self, settings: &ProjectSettings, step: Step) -> TokenEstimate {
        match step {
            Step::Research => self.estimates.research,
            Step::Strategy => self.estimates.strategy,
            Step::Article => {
                let output_tokens = match settings.word_count {
                    0 => self.estimates.article.output_tokens,
                    words => (f64::from(words) * TOKENS_PER_WORD).ceil() as u64,
                };
                TokenEstimate {
                    input_tokens: self.estimates.article.input_tokens,
                    output_tokens,
                }
            }
            Step::Image | Step::Publish => TokenEstimate {
                input_tokens: 0,
                output_tokens: 0,
            },
        }
    }

    pub fn estimate_post(&self, settings: &ProjectSettings) -> PostEstimate {
        let mut unpriced_models = Vec::new();
        let steps: Vec<StepEstimate> = Step::GENERATION
            .into_iter()
            .map(|step| match self.model_for(settings, step) {
                Some(model) => {
                    let tokens = self.tokens_for(settings, step);
                    let cost_usd = match self.price(model) {
                        Some(_) => self.cost(model, tokens.input_tokens, tokens.output_tokens),
                        None => {
                            if !unpriced_models.iter().any(|m| m == model) {
                                unpriced_models.push(model.to_string());
                            }
                            0.0
                        }
                    };
                    StepEstimate {
                        step,
                        model: Some(model.to_string()),
                        tokens_in: tokens.input_tokens,
                        tokens_out: tokens.output_tokens,
                        cost_usd,
                    }
                }
                None => StepEstimate {
                    step,
                    model: None,
                    tokens_in: 0,
                    tokens_out: 0,
                    cost_usd: if settings.generate_images {
                        self.image_cost()
                    } else {
                        0.0
                    },
                },
            })
            .collect();

        let total_usd = steps.iter().map(|s| s.cost_usd).sum();
        PostEstimate {
            steps,
            total_usd,
            unpriced_models,
        }
    }

    pub fn estimate_batch(&self, settings: &ProjectSettings, posts: u32) -> BatchEstimate {
        let per_post = self.estimate_post(settings);
        BatchEstimate {
            posts,
            per_post_usd: per_post.total_usd,
            total_usd: per_post.total_usd * posts as f64,
            per_post,
        }
    }

    /// Fails with `BudgetExceeded` when the post estimate is over the project's limit.
    pub fn check_budget(&self, settings: &ProjectSettings) -> Result<PostEstimate, ForgeError> {
        let estimate = self.estimate_post(settings);
        match settings.max_cost_per_post_usd {
            Some(limit_usd) if estimate.total_usd > limit_usd => Err(ForgeError::BudgetExceeded {
                estimate_usd: estimate.total_usd,
                limit_usd,
            }),
            _ => Ok(estimate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> CostEstimator {
        CostEstimator::new(
            [
                (
                    "light".to_string(),
                    ModelPrice {
                        input_per_mtok: 1.0,
                        output_per_mtok: 2.0,
                    },
                ),
                (
                    "heavy".to_string(),
                    ModelPrice {
                        input_per_mtok: 3.0,
                        output_per_mtok: 15.0,
                    },
                ),
            ],
            TokenEstimates {
                research: TokenEstimate {
                    input_tokens: 1_000,
                    output_tokens: 1_000,
                },
                strategy: TokenEstimate {
                    input_tokens: 2_000,
                    output_tokens: 1_000,
                },
                article: TokenEstimate {
                    input_tokens: 2_000,
                    output_tokens: 1_000,
                },
            },
            StepModels {
                research: "light".to_string(),
                strategy: "light".to_string(),
                article: "heavy".to_string(),
            },
            0.01,
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn cost_is_per_million_tokens() {
        let est = estimator();
        assert!(close(est.cost("light", 1_000_000, 0), 1.0));
        assert!(close(est.cost("heavy", 2_000, 1_000), 0.006 + 0.015));
        assert_eq!(est.cost("unknown/model", 10_000, 10_000), 0.0);
    }

    #[test]
    fn article_output_follows_word_count() {
        let est = estimator();
        let settings = ProjectSettings {
            word_count: 2_000,
            ..ProjectSettings::default()
        };
        assert_eq!(est.tokens_for(&settings, Step::Article).output_tokens, 2_800);

        let short = ProjectSettings {
            word_count: 300,
            ..ProjectSettings::default()
        };
        assert_eq!(est.tokens_for(&short, Step::Article).output_tokens, 420);

        let unset = ProjectSettings {
            word_count: 0,
            ..ProjectSettings::default()
        };
        assert_eq!(est.tokens_for(&unset, Step::Article).output_tokens, 1_000);
    }

    #[test]
    fn post_and_batch_estimates_add_up() {
        let est = estimator();
        let settings = ProjectSettings {
            word_count: 1_000,
            ..ProjectSettings::default()
        };
        let post = est.estimate_post(&settings);

        // research 0.003, strategy 0.004, article 0.006 + 1400*15/1e6 = 0.027, image 0.01
        assert!(close(post.total_usd, 0.003 + 0.004 + 0.027 + 0.01));
        assert_eq!(post.steps.len(), 4);
        assert!(post.unpriced_models.is_empty());
        let image = post.steps.iter().find(|s| s.step == Step::Image).unwrap();
        assert!(close(image.cost_usd, est.image_cost()));

        let batch = est.estimate_batch(&settings, 10);
        assert!(close(batch.total_usd, post.total_usd * 10.0));
        assert_eq!(batch.posts, 10);
    }

    #[test]
    fn project_overrides_and_unpriced_models() {
        let est = estimator();
        let settings = ProjectSettings {
            article_model: Some("vendor/new-model".to_string()),
            generate_images: false,
            ..ProjectSettings::default()
        };
        let post = est.estimate_post(&settings);
        assert_eq!(post.unpriced_models, vec!["vendor/new-model".to_string()]);
        let image = post.steps.iter().find(|s| s.step == Step::Image).unwrap();
        assert_eq!(image.cost_usd, 0.0);
    }

    #[test]
    fn budget_check_rejects_expensive_posts() {
        let est = estimator();
        let strict = ProjectSettings {
            max_cost_per_post_usd: Some(0.001),
            ..ProjectSettings::default()
        };
        assert!(matches!(
            est.check_budget(&strict),
            Err(ForgeError::BudgetExceeded { .. })
        ));

        let loose = ProjectSettings {
            max_cost_per_post_usd: Some(5.0),
            ..ProjectSettings::default()
        };
        assert!(est.check_budget(&loose).is_ok());
    }
}
