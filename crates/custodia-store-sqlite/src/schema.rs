//! SQL schema for the Custodia SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The audit ledger is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS ledger_entries (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT,
    action      TEXT NOT NULL,
    actor_id    TEXT,
    actor_type  TEXT NOT NULL,   -- 'USER' | 'SYSTEM'
    timestamp   TEXT NOT NULL,   -- ISO 8601 UTC
    diff        TEXT NOT NULL,   -- compact JSON
    metadata    TEXT NOT NULL,   -- compact JSON
    prev_hash   TEXT,            -- NULL for the first entry of a chain
    hash        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_runs (
    id             TEXT PRIMARY KEY,
    tenant_id      TEXT NOT NULL,
    job_name       TEXT NOT NULL,
    status         TEXT NOT NULL,   -- 'RUNNING' | 'SUCCESS' | 'FAILED'
    correlation_id TEXT,
    started_at     TEXT NOT NULL,
    finished_at    TEXT,
    error_message  TEXT
);

CREATE TABLE IF NOT EXISTS retention_policies (
    tenant_id           TEXT NOT NULL,
    artifact_type       TEXT NOT NULL,
    retention_days      INTEGER NOT NULL,
    delete_mode         TEXT NOT NULL,   -- 'SOFT_DELETE' | 'HARD_DELETE'
    legal_hold_respects INTEGER NOT NULL,
    enabled             INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, artifact_type)
);

CREATE TABLE IF NOT EXISTS legal_holds (
    tenant_id TEXT NOT NULL,
    case_id   TEXT NOT NULL,
    enabled   INTEGER NOT NULL,
    reason    TEXT,
    PRIMARY KEY (tenant_id, case_id)
);

CREATE TABLE IF NOT EXISTS artifacts (
    id              TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    artifact_type   TEXT NOT NULL,
    case_id         TEXT,
    storage_key     TEXT,
    created_at      TEXT NOT NULL,
    soft_deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS deletion_jobs (
    id                TEXT NOT NULL PRIMARY KEY,
    tenant_id         TEXT NOT NULL,
    status            TEXT NOT NULL,
    triggered_by      TEXT NOT NULL,   -- 'USER' | 'SYSTEM'
    triggered_user_id TEXT,
    started_at        TEXT NOT NULL,
    finished_at       TEXT,
    evaluated         INTEGER NOT NULL DEFAULT 0,
    deleted           INTEGER NOT NULL DEFAULT 0,
    blocked           INTEGER NOT NULL DEFAULT 0,
    errors            TEXT NOT NULL DEFAULT '[]'
);

-- Deletion events are immutable evidence; never updated or removed.
CREATE TABLE IF NOT EXISTS deletion_events (
    id                 TEXT PRIMARY KEY,
    tenant_id          TEXT NOT NULL,
    artifact_type      TEXT NOT NULL,
    artifact_id        TEXT NOT NULL,
    case_id            TEXT,
    storage_key        TEXT,
    deleted_at         TEXT NOT NULL,
    deletion_method    TEXT NOT NULL,   -- 'SOFT' | 'HARD'
    checksum_before    TEXT,
    proof_hash         TEXT NOT NULL,
    job_id             TEXT NOT NULL REFERENCES deletion_jobs(id),
    legal_hold_blocked INTEGER NOT NULL,
    reason             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sod_policies (
    tenant_id TEXT PRIMARY KEY,
    enabled   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sod_rules (
    id          TEXT NOT NULL,
    tenant_id   TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL,
    enabled     INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, id)
);

CREATE TABLE IF NOT EXISTS approval_requests (
    id           TEXT PRIMARY KEY,
    tenant_id    TEXT NOT NULL,
    scope_type   TEXT NOT NULL,
    scope_id     TEXT NOT NULL,
    requested_by TEXT NOT NULL,
    status       TEXT NOT NULL,   -- 'PENDING' | 'APPROVED' | 'REJECTED'
    reason       TEXT NOT NULL,
    approved_by  TEXT,
    approved_at  TEXT
);

CREATE INDEX IF NOT EXISTS ledger_tenant_ts_idx   ON ledger_entries(tenant_id, timestamp);
CREATE INDEX IF NOT EXISTS job_runs_dedup_idx     ON job_runs(tenant_id, job_name, correlation_id);
CREATE INDEX IF NOT EXISTS artifacts_discover_idx ON artifacts(tenant_id, artifact_type, created_at);
CREATE INDEX IF NOT EXISTS deletion_events_tenant_idx ON deletion_events(tenant_id, deleted_at);
CREATE INDEX IF NOT EXISTS deletion_events_job_idx    ON deletion_events(job_id);
CREATE INDEX IF NOT EXISTS approvals_tenant_idx   ON approval_requests(tenant_id, status);

PRAGMA user_version = 1;
";
