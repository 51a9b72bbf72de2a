pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS retrieval_stats_daily (
    day TEXT PRIMARY KEY,
    total INTEGER NOT NULL,
    successful INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_participants (
    day TEXT NOT NULL,
    participant TEXT NOT NULL,
    PRIMARY KEY (day, participant)
);
CREATE INDEX IF NOT EXISTS idx_daily_participants_day
    ON daily_participants(day);

CREATE TABLE IF NOT EXISTS daily_reward_transfers (
    day TEXT NOT NULL,
    recipient TEXT NOT NULL,
    amount REAL NOT NULL,
    PRIMARY KEY (day, recipient)
);
CREATE INDEX IF NOT EXISTS idx_daily_reward_transfers_day
    ON daily_reward_transfers(day);

CREATE TABLE IF NOT EXISTS reward_transfer_checkpoint (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_checked_block INTEGER
);
"#;
