// src/db.rs

use sqlx::SqlitePool;

/// Embedded schema, applied at startup (and by the test harness).
///
/// Timestamps are always bound from Rust (via the injected clock) rather than
/// SQL defaults, so every stored value round-trips through sqlx's chrono
/// encoding and window decisions never depend on the database's clock.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    options TEXT NOT NULL,
    answer TEXT NOT NULL,
    analysis TEXT,
    category TEXT,
    subcategory TEXT,
    difficulty TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    join_code TEXT,
    created_by INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contest_questions (
    contest_id INTEGER NOT NULL REFERENCES contests(id),
    question_id INTEGER NOT NULL REFERENCES questions(id),
    position INTEGER NOT NULL,
    PRIMARY KEY (contest_id, position),
    UNIQUE (contest_id, question_id)
);

CREATE TABLE IF NOT EXISTS participations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contest_id INTEGER NOT NULL REFERENCES contests(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    joined_at TEXT NOT NULL,
    submitted_at TEXT,
    submitted_by TEXT,
    auto_submitted INTEGER NOT NULL DEFAULT 0,
    violation_count INTEGER NOT NULL DEFAULT 0,
    draft_answers TEXT,
    UNIQUE (contest_id, user_id)
);

CREATE TABLE IF NOT EXISTS answer_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    participation_id INTEGER NOT NULL REFERENCES participations(id),
    question_id INTEGER NOT NULL REFERENCES questions(id),
    selected TEXT,
    is_correct INTEGER NOT NULL,
    UNIQUE (participation_id, question_id)
);

CREATE TABLE IF NOT EXISTS violation_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    participation_id INTEGER NOT NULL REFERENCES participations(id),
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_participations_contest ON participations(contest_id);
CREATE INDEX IF NOT EXISTS idx_answer_records_participation ON answer_records(participation_id);
CREATE INDEX IF NOT EXISTS idx_violation_events_participation ON violation_events(participation_id);
CREATE INDEX IF NOT EXISTS idx_contests_join_code ON contests(join_code);
"#;

/// Creates all tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
