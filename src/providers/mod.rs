//! HTTP clients for the services the pipeline talks to.

pub mod openrouter;
pub mod pollinations;
pub mod wordpress;
pub mod wuzapi;

mod bootstrap;
mod policy;
mod upstream_retry;

pub use bootstrap::{Upstreams, build_client};
pub use openrouter::{Completion, OpenRouterClient};
pub use policy::{UPSTREAM_BODY_PREVIEW_CHARS, UpstreamErrorBody};
pub use pollinations::{GeneratedImage, PollinationsClient};
pub use wordpress::{WordPressClient, WpSite};
pub use wuzapi::WuzapiClient;
