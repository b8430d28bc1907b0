//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS pool_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS epochs (
    epoch_id INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    acc_rps TEXT NOT NULL,
    acc_sps TEXT NOT NULL,
    total_liquidity TEXT NOT NULL,
    earning_liquidity TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    principal TEXT NOT NULL,
    entered_epoch INTEGER NOT NULL,
    exited_epoch INTEGER NOT NULL DEFAULT 0,
    reward_debt_epoch INTEGER NOT NULL,
    is_valid INTEGER NOT NULL DEFAULT 1,
    opened_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_positions_owner ON positions(owner);

CREATE TABLE IF NOT EXISTS policies (
    id INTEGER PRIMARY KEY,
    beneficiary TEXT NOT NULL,
    coverage TEXT NOT NULL,
    fee TEXT NOT NULL,
    settle_deposit TEXT NOT NULL,
    entered_epoch INTEGER NOT NULL,
    duration_days INTEGER NOT NULL,
    standard_risk TEXT NOT NULL,
    risk_level TEXT NOT NULL,
    sps TEXT NOT NULL,
    minted_at INTEGER NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_policies_entered ON policies(entered_epoch);

CREATE TABLE IF NOT EXISTS epoch_index (
    kind TEXT NOT NULL,
    epoch INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (kind, epoch)
);
"#;
