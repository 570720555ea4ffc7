#![allow(dead_code)]

//! One local axum server standing in for OpenRouter, Pollinations, WordPress and Wuzapi.

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use url::Url;
use wpforge::{
    batch::BatchProcessor,
    config::{Config, ModelPrice, StepModels},
    db::{self, AgencyCreate, DbActorHandle, DbProject, ProjectCreate, ProjectSettings},
    pipeline::{CostEstimator, IdempotencyGuard, PipelineRunner},
    providers::Upstreams,
};

pub const RESEARCH_MODEL: &str = "test/research";
pub const STRATEGY_MODEL: &str = "test/strategy";
pub const ARTICLE_MODEL: &str = "test/article";

pub const MEDIA_ID: u64 = 55;
pub const WP_POST_ID: u64 = 101;
/// WordPress answers 404 when asked to delete this id.
pub const MISSING_WP_POST_ID: u64 = 404;
/// WordPress answers 500 when asked to delete this id.
pub const FAILING_WP_POST_ID: u64 = 500;

pub const FIRST_TITLE: &str = "A Practical Guide to Async Rust";
/// Strategy title from the second strategy completion on.
pub const REGENERATED_TITLE: &str = "Async Rust, Revisited";

#[derive(Default)]
pub struct Hits {
    pub chat: AtomicUsize,
    pub images: AtomicUsize,
    pub media: AtomicUsize,
    pub post_creates: AtomicUsize,
    pub post_updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub notifications: AtomicUsize,
    pub strategy_calls: AtomicUsize,
    pub delete_queries: Mutex<Vec<String>>,
    /// Titles sent in post creates and updates, in order.
    pub titles: Mutex<Vec<String>>,

    /// Chat calls still to answer with 503.
    pub chat_failures: AtomicUsize,
    pub chat_delay_ms: AtomicU64,
    /// Held once by the next post create.
    pub create_delay_ms: AtomicU64,
    pub fail_notifications: AtomicBool,
}

impl Hits {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn last_title(&self) -> Option<String> {
        self.titles.lock().expect("poisoned").last().cloned()
    }

    fn record_title(&self, body: &Value) {
        if let (Ok(mut titles), Some(title)) = (self.titles.lock(), body["title"].as_str()) {
            titles.push(title.to_string());
        }
    }
}

pub struct MockUpstream {
    pub base: Url,
    pub hits: Arc<Hits>,
}

fn completion(model: &str, content: Value) -> Value {
    json!({
        "id": "gen-test",
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150 }
    })
}

fn strategy_title(hits: &Hits) -> &'static str {
    if hits.strategy_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        FIRST_TITLE
    } else {
        REGENERATED_TITLE
    }
}

async fn chat(State(hits): State<Arc<Hits>>, Json(body): Json<Value>) -> impl IntoResponse {
    hits.chat.fetch_add(1, Ordering::SeqCst);
    let delay = hits.chat_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let failing = hits
        .chat_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "code": 503, "message": "overloaded" } })),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let content = match model.as_str() {
        RESEARCH_MODEL => json!({
            "summary": "Async Rust runs futures on an executor.",
            "key_points": ["futures are lazy", "tokio is the common runtime"],
            "questions": ["what is pinning?"],
            "sources": []
        }),
        STRATEGY_MODEL => json!({
            "title": strategy_title(&hits),
            "slug": "practical-async-rust",
            "meta_description": "Learn async Rust step by step.",
            "outline": [{ "heading": "Why async", "points": ["throughput"] }],
            "image_prompt": "a crab juggling futures"
        }),
        ARTICLE_MODEL => json!({
            "html": "<h2>Why async</h2><p>Futures do nothing until polled.</p>",
            "word_count": 7
        }),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "code": 400, "message": "unknown model" } })),
            )
                .into_response();
        }
    };
    Json(completion(&model, content)).into_response()
}

async fn image(State(hits): State<Arc<Hits>>, Path(_prompt): Path<String>) -> impl IntoResponse {
    hits.images.fetch_add(1, Ordering::SeqCst);
    ([(CONTENT_TYPE, "image/png")], vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3])
}

async fn upload_media(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    hits.media.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(json!({ "id": MEDIA_ID, "source_url": "http://wp.test/uploads/img.png" })),
    )
}

async fn create_post(State(hits): State<Arc<Hits>>, Json(body): Json<Value>) -> impl IntoResponse {
    hits.post_creates.fetch_add(1, Ordering::SeqCst);
    hits.record_title(&body);
    let delay = hits.create_delay_ms.swap(0, Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let status = body["status"].clone();
    (
        StatusCode::CREATED,
        Json(json!({
            "id": WP_POST_ID,
            "link": format!("http://wp.test/?p={WP_POST_ID}"),
            "status": status
        })),
    )
}

async fn update_post(
    State(hits): State<Arc<Hits>>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    hits.post_updates.fetch_add(1, Ordering::SeqCst);
    hits.record_title(&body);
    let status = body["status"].clone();
    Json(json!({ "id": id, "link": format!("http://wp.test/?p={id}"), "status": status }))
}

async fn delete_post(
    State(hits): State<Arc<Hits>>,
    Path(id): Path<u64>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    hits.deletes.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut queries) = hits.delete_queries.lock() {
        queries.push(query.unwrap_or_default());
    }
    if id == FAILING_WP_POST_ID {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": "db_error", "message": "database went away" })),
        )
            .into_response();
    }
    if id == MISSING_WP_POST_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "rest_post_invalid_id", "message": "Invalid post ID." })),
        )
            .into_response();
    }
    Json(json!({ "deleted": true, "previous": { "id": id } })).into_response()
}

async fn send_text(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    hits.notifications.fetch_add(1, Ordering::SeqCst);
    if hits.fail_notifications.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": 500, "success": false, "error": "not logged in" })),
        )
            .into_response();
    }
    Json(json!({ "code": 200, "success": true, "data": { "Id": "msg-1" } })).into_response()
}

pub async fn spawn_mock_upstream() -> MockUpstream {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/api/v1/chat/completions", post(chat))
        .route("/prompt/{*prompt}", get(image))
        .route("/wp-json/wp/v2/media", post(upload_media))
        .route("/wp-json/wp/v2/posts", post(create_post))
        .route(
            "/wp-json/wp/v2/posts/{id}",
            post(update_post).delete(delete_post),
        )
        .route("/chat/send/text", post(send_text))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock upstream crashed");
    });

    MockUpstream {
        base: Url::parse(&format!("http://{addr}/")).expect("valid mock url"),
        hits,
    }
}

pub fn temp_database(tag: &str) -> (String, PathBuf) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "wpforge-{}-{}-{}.sqlite",
        tag,
        std::process::id(),
        nanos
    ));
    (format!("sqlite:{}", temp_path.display()), temp_path)
}

pub async fn remove_database(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = tokio::fs::remove_file(PathBuf::from(file)).await;
    }
}

pub fn test_config(mock: &MockUpstream) -> Config {
    let mut cfg = Config::default();
    cfg.basic.admin_key = "admin-secret".to_string();
    cfg.pipeline.max_attempts = 1;
    cfg.pipeline.retry_min_delay_ms = 10;
    cfg.pipeline.retry_max_delay_ms = 20;

    cfg.providers.defaults.retry_max_times = 0;

    let openrouter = &mut cfg.providers.openrouter;
    openrouter.api_url = mock.base.join("api/v1/").expect("valid api url");
    openrouter.api_key = "or-test-key".to_string();
    openrouter.requests_per_second = 100;
    openrouter.models = StepModels {
        research: RESEARCH_MODEL.to_string(),
        strategy: STRATEGY_MODEL.to_string(),
        article: ARTICLE_MODEL.to_string(),
    };
    for model in [RESEARCH_MODEL, STRATEGY_MODEL, ARTICLE_MODEL] {
        openrouter.prices.insert(
            model.to_string(),
            ModelPrice {
                input_per_mtok: 1.0,
                output_per_mtok: 2.0,
            },
        );
    }

    cfg.providers.pollinations.image_url = mock.base.join("prompt").expect("valid image url");
    cfg.providers.pollinations.price_per_image = 0.0;

    cfg.providers.wuzapi.api_url = Some(mock.base.clone());
    cfg.providers.wuzapi.token = Some("wuz-token".to_string());
    cfg
}

pub struct Harness {
    pub cfg: Config,
    pub db: DbActorHandle,
    pub runner: PipelineRunner,
    pub batches: BatchProcessor,
    pub project: DbProject,
    pub mock: MockUpstream,
    pub db_path: PathBuf,
}

impl Harness {
    pub async fn new(tag: &str, settings: ProjectSettings) -> Self {
        Self::with_config(tag, settings, |_| {}).await
    }

    /// Like [`Harness::new`], with `tweak` applied to the test config first.
    pub async fn with_config(
        tag: &str,
        settings: ProjectSettings,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let mock = spawn_mock_upstream().await;
        let mut cfg = test_config(&mock);
        tweak(&mut cfg);
        let (database_url, db_path) = temp_database(tag);
        let db = db::spawn(&database_url).await.expect("failed to spawn db");

        let upstreams = Upstreams::from_config(&cfg).expect("failed to build upstreams");
        let costs = Arc::new(CostEstimator::from_config(&cfg));
        let guard = IdempotencyGuard::new(db.clone(), cfg.pipeline.idempotency_ttl());
        let runner = PipelineRunner::new(db.clone(), upstreams, costs, guard);
        let batches = BatchProcessor::new(db.clone());

        let project = create_project(&db, &mock, "lic-primary", settings).await;

        Self {
            cfg,
            db,
            runner,
            batches,
            project,
            mock,
            db_path,
        }
    }

    pub async fn cleanup(self) {
        remove_database(&self.db_path).await;
    }
}

pub async fn create_project(
    db: &DbActorHandle,
    mock: &MockUpstream,
    license_key: &str,
    settings: ProjectSettings,
) -> DbProject {
    let agency = db
        .create_agency(AgencyCreate {
            name: format!("agency for {license_key}"),
        })
        .await
        .expect("failed to create agency");
    db.create_project(ProjectCreate {
        agency_id: agency.id,
        name: format!("blog {license_key}"),
        wp_url: mock.base.to_string(),
        wp_username: "editor".to_string(),
        wp_app_password: "abcd efgh ijkl".to_string(),
        license_key: Some(license_key.to_string()),
        settings,
        whatsapp_phone: Some("+55 (11) 99999-0000".to_string()),
    })
    .await
    .expect("failed to create project")
}
