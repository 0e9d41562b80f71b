use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "gradeledger.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Readers keep going while a budget-checked write holds the lock.
    conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get::<_, String>(0))?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_periods(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(school_year_id, ordinal)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_academic_periods_year ON academic_periods(school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            class_id TEXT,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            base_tuition TEXT NOT NULL DEFAULT '0',
            grades_visible INTEGER NOT NULL DEFAULT 0,
            ledger_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, school_year_id)
        )",
        [],
    )?;
    ensure_enrollments_ledger_version(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_year_class ON enrollments(school_year_id, class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollment_payments(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            amount TEXT NOT NULL,
            paid_on TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
            UNIQUE(enrollment_id, position)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollment_adjustments(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            amount TEXT NOT NULL,
            reason TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
            UNIQUE(enrollment_id, position)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_tuition(
            class_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            PRIMARY KEY(class_id, school_year_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_entries(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            budget REAL NOT NULL DEFAULT 100,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(school_year_id, class_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            name TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            graded_on TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(period_id) REFERENCES academic_periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_key ON grades(enrollment_id, subject_id, period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS appreciations(
            enrollment_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            text TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(enrollment_id, subject_id, period_id),
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(period_id) REFERENCES academic_periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS general_appreciations(
            enrollment_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            text TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(enrollment_id, period_id),
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
            FOREIGN KEY(period_id) REFERENCES academic_periods(id)
        )",
        [],
    )?;

    Ok(conn)
}

// Stores opened before optimistic ledger versioning lack the column.
fn ensure_enrollments_ledger_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "enrollments", "ledger_version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE enrollments ADD COLUMN ledger_version INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    // A corrupt value reads as absent; callers fall back to defaults.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
