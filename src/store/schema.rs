//! Embedded, idempotent schema. Every statement is `CREATE TABLE IF NOT
//! EXISTS`, so startup migration is just "run this against a possibly
//! already-initialized database" (grounded in the sqlite adapter pattern
//! used across the cloudillo storage layer).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    directory_url TEXT NOT NULL,
    email TEXT NOT NULL,
    key_type TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    account_key_enc TEXT
);

CREATE TABLE IF NOT EXISTS dns_providers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    type_tag TEXT NOT NULL,
    config_enc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS certificates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    san TEXT NOT NULL DEFAULT '[]',
    challenge_type TEXT NOT NULL DEFAULT 'dns-01',
    dns_provider_id INTEGER REFERENCES dns_providers(id),
    workspace_id INTEGER REFERENCES workspaces(id),
    cert_pem BLOB,
    key_pem BLOB,
    issuer_pem BLOB,
    fullchain_pem BLOB,
    fingerprint TEXT,
    issued_at TEXT,
    expires_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    renew_fail_count INTEGER NOT NULL DEFAULT 0,
    next_retry_at TEXT,
    last_renew_attempt TEXT
);

CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    signature TEXT NOT NULL,
    name TEXT NOT NULL,
    poll_interval INTEGER NOT NULL DEFAULT 300,
    last_seen TEXT,
    ip TEXT,
    version TEXT
);

CREATE TABLE IF NOT EXISTS agent_certs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    certificate_id INTEGER NOT NULL REFERENCES certificates(id),
    deploy_path TEXT NOT NULL,
    file_mapping TEXT NOT NULL DEFAULT '{}',
    reload_cmd TEXT,
    last_sync TEXT,
    last_fingerprint TEXT,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    UNIQUE(agent_id, certificate_id)
);

CREATE TABLE IF NOT EXISTS notification_channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    type_tag TEXT NOT NULL DEFAULT 'string',
    category TEXT NOT NULL DEFAULT 'general',
    description TEXT
);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    module TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT,
    operator TEXT,
    direct_ip TEXT,
    forwarded_ip TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS task_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS task_status (
    task_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_logs_task_id ON task_logs(task_id);
CREATE INDEX IF NOT EXISTS idx_agent_certs_agent ON agent_certs(agent_id);
CREATE INDEX IF NOT EXISTS idx_agent_certs_cert ON agent_certs(certificate_id);
CREATE INDEX IF NOT EXISTS idx_certificates_next_retry ON certificates(next_retry_at);
"#;
