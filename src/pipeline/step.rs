use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// One stage of the content pipeline, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Step {
    Research,
    Strategy,
    Article,
    Image,
    Publish,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Research,
        Step::Strategy,
        Step::Article,
        Step::Image,
        Step::Publish,
    ];

    /// Steps that produce content (everything except the WordPress side effect).
    pub const GENERATION: [Step; 4] = [Step::Research, Step::Strategy, Step::Article, Step::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Research => "research",
            Step::Strategy => "strategy",
            Step::Article => "article",
            Step::Image => "image",
            Step::Publish => "publish",
        }
    }

    /// Whether the step is served by the language model.
    pub fn is_llm(self) -> bool {
        matches!(self, Step::Research | Step::Strategy | Step::Article)
    }

    /// Generation steps from `self` (inclusive) to the end of the generation chain.
    pub fn and_downstream(self) -> impl Iterator<Item = Step> {
        Step::GENERATION.into_iter().filter(move |s| *s >= self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pipeline step: {s}"))
    }
}
