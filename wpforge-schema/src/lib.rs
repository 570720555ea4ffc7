pub mod content;
pub mod openrouter;
pub mod webhook;
pub mod wordpress;
pub mod wuzapi;

pub use content::{ArticleOutput, OutlineSection, ResearchOutput, StrategyOutput};
pub use openrouter::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OpenRouterErrorBody,
    ResponseFormat, Usage,
};
pub use wordpress::{WpErrorBody, WpMedia, WpPost, WpPostRequest};
pub use wuzapi::{WuzapiResponse, WuzapiSendText};
