//! Prompt construction and output parsing for the language-model steps.

use serde::de::DeserializeOwned;
use wpforge_schema::{ChatMessage, ResearchOutput, StrategyOutput};

use crate::db::ProjectSettings;
use crate::error::ForgeError;
use crate::pipeline::Step;

const SYSTEM: &str = "You are a senior content strategist and SEO writer. \
Always answer with a single JSON object and nothing else.";

pub fn research_messages(keyword: &str, settings: &ProjectSettings) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM),
        ChatMessage::user(format!(
            "Research the topic \"{keyword}\" for a blog article written in {lang}.\n\
             Return JSON: {{\"summary\": string, \"key_points\": [string], \
             \"questions\": [string], \"sources\": [string]}}.\n\
             `questions` are what readers search for; `sources` are reputable references.",
            lang = settings.language,
        )),
    ]
}

pub fn strategy_messages(
    keyword: &str,
    settings: &ProjectSettings,
    research: &ResearchOutput,
) -> Vec<ChatMessage> {
    let key_points = bullet_list(&research.key_points);
    let questions = bullet_list(&research.questions);
    vec![
        ChatMessage::system(SYSTEM),
        ChatMessage::user(format!(
            "Plan an SEO article about \"{keyword}\" in {lang} with a {tone} tone.\n\
             Research summary: {summary}\n\
             Key points:\n{key_points}\n\
             Reader questions:\n{questions}\n\
             Return JSON: {{\"title\": string, \"slug\": string, \"meta_description\": string \
             (max 155 characters), \"outline\": [{{\"heading\": string, \"points\": [string]}}], \
             \"image_prompt\": string}}. The image prompt describes a photographic header \
             image without any text.",
            lang = settings.language,
            tone = settings.tone,
            summary = research.summary,
        )),
    ]
}

pub fn article_messages(
    keyword: &str,
    settings: &ProjectSettings,
    strategy: &StrategyOutput,
) -> Vec<ChatMessage> {
    let outline = strategy
        .outline
        .iter()
        .map(|section| {
            format!(
                "## {}\n{}",
                section.heading,
                bullet_list(&section.points)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ChatMessage::system(SYSTEM),
        ChatMessage::user(format!(
            "Write the article \"{title}\" targeting the keyword \"{keyword}\".\n\
             Language: {lang}. Tone: {tone}. Length: about {words} words.\n\
             Follow this outline:\n{outline}\n\
             Use semantic HTML (<h2>, <h3>, <p>, <ul>) without <html>, <head> or <h1>.\n\
             Return JSON: {{\"html\": string, \"word_count\": number}}.",
            title = strategy.title,
            lang = settings.language,
            tone = settings.tone,
            words = settings.word_count,
        )),
    ]
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The JSON object inside a completion, ignoring code fences and chatter around it.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub fn parse_output<T: DeserializeOwned>(step: Step, raw: &str) -> Result<T, ForgeError> {
    serde_json::from_str(extract_json(raw)).map_err(|e| ForgeError::MalformedOutput {
        step,
        reason: e.to_string(),
    })
}
