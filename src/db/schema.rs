//! SQL DDL for initializing the database schema.
//! SQLite-first design; ids are UUID strings, JSON columns are TEXT.

/// SQLite schema includes:
/// - `agencies`, `projects` (tenant and bound WordPress site)
/// - `batch_jobs`, `posts`, `post_artifacts` (pipeline state)
/// - `artifact_blobs` (binary payloads of artifacts, e.g. generated images)
/// - `idempotency_keys` (exactly-once guard rows)
/// - `editorial_plans`, `editorial_plan_items`
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS agencies (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY NOT NULL,
    agency_id TEXT NOT NULL REFERENCES agencies(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    wp_url TEXT NOT NULL,
    wp_username TEXT NOT NULL,
    wp_app_password TEXT NOT NULL,
    license_key TEXT NOT NULL UNIQUE,
    settings TEXT NOT NULL DEFAULT '{}',
    whatsapp_phone TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_agency ON projects(agency_id);

-- ---------------------------------------------------------------------------
-- Pipeline
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS batch_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    source_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    total INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    batch_job_id TEXT NULL REFERENCES batch_jobs(id) ON DELETE SET NULL,
    keyword TEXT NOT NULL,
    title TEXT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    wp_post_id INTEGER NULL,
    wp_link TEXT NULL,
    tokens_in INTEGER NOT NULL DEFAULT 0,
    tokens_out INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0,
    error_log TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_project ON posts(project_id);
CREATE INDEX IF NOT EXISTS idx_posts_batch ON posts(batch_job_id);

CREATE TABLE IF NOT EXISTS post_artifacts (
    id TEXT PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    step TEXT NOT NULL,
    version INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    content TEXT NOT NULL,
    model TEXT NULL,
    tokens_in INTEGER NOT NULL DEFAULT 0,
    tokens_out INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(post_id, step, version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_post_artifacts_active
    ON post_artifacts(post_id, step) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS artifact_blobs (
    artifact_id TEXT PRIMARY KEY NOT NULL REFERENCES post_artifacts(id) ON DELETE CASCADE,
    content_type TEXT NOT NULL,
    bytes BLOB NOT NULL
);

-- ---------------------------------------------------------------------------
-- Exactly-once guard
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS idempotency_keys (
    id TEXT PRIMARY KEY NOT NULL,
    scope TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    result TEXT NULL,
    error TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ---------------------------------------------------------------------------
-- Editorial plans
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS editorial_plans (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    batch_job_id TEXT NULL REFERENCES batch_jobs(id) ON DELETE SET NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS editorial_plan_items (
    id TEXT PRIMARY KEY NOT NULL,
    plan_id TEXT NOT NULL REFERENCES editorial_plans(id) ON DELETE CASCADE,
    post_id TEXT NULL REFERENCES posts(id) ON DELETE SET NULL,
    keyword TEXT NOT NULL,
    position INTEGER NOT NULL,
    scheduled_for TEXT NOT NULL, -- YYYY-MM-DD
    status TEXT NOT NULL DEFAULT 'planned'
);

CREATE INDEX IF NOT EXISTS idx_plan_items_plan ON editorial_plan_items(plan_id);
CREATE INDEX IF NOT EXISTS idx_plan_items_post ON editorial_plan_items(post_id);
"#;
