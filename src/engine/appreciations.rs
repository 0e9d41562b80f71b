use super::error::EngineResult;
use super::{directory, now_stamp};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

/// Saves the subject appreciation for a period. Blank text clears it.
pub fn set_subject_appreciation(
    conn: &Connection,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
    text: &str,
) -> EngineResult<()> {
    let ctx = directory::resolve_enrollment(conn, enrollment_id)?;
    directory::resolve_period(conn, period_id, &ctx.school_year_id)?;
    directory::require_subject(conn, subject_id)?;
    let text = text.trim();
    if text.is_empty() {
        conn.execute(
            "DELETE FROM appreciations WHERE enrollment_id = ? AND subject_id = ? AND period_id = ?",
            (enrollment_id, subject_id, period_id),
        )?;
        return Ok(());
    }
    conn.execute(
        "INSERT INTO appreciations(enrollment_id, subject_id, period_id, text, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(enrollment_id, subject_id, period_id) DO UPDATE SET
           text = excluded.text,
           updated_at = excluded.updated_at",
        (enrollment_id, subject_id, period_id, text, now_stamp()),
    )?;
    Ok(())
}

pub fn set_general_appreciation(
    conn: &Connection,
    enrollment_id: &str,
    period_id: &str,
    text: &str,
) -> EngineResult<()> {
    let ctx = directory::resolve_enrollment(conn, enrollment_id)?;
    directory::resolve_period(conn, period_id, &ctx.school_year_id)?;
    let text = text.trim();
    if text.is_empty() {
        conn.execute(
            "DELETE FROM general_appreciations WHERE enrollment_id = ? AND period_id = ?",
            (enrollment_id, period_id),
        )?;
        return Ok(());
    }
    conn.execute(
        "INSERT INTO general_appreciations(enrollment_id, period_id, text, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(enrollment_id, period_id) DO UPDATE SET
           text = excluded.text,
           updated_at = excluded.updated_at",
        (enrollment_id, period_id, text, now_stamp()),
    )?;
    Ok(())
}

/// Subject id -> appreciation text for one period.
pub fn subject_appreciations(
    conn: &Connection,
    enrollment_id: &str,
    period_id: &str,
) -> EngineResult<HashMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, text FROM appreciations WHERE enrollment_id = ? AND period_id = ?",
    )?;
    let rows = stmt
        .query_map((enrollment_id, period_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn general_appreciation(
    conn: &Connection,
    enrollment_id: &str,
    period_id: &str,
) -> EngineResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT text FROM general_appreciations WHERE enrollment_id = ? AND period_id = ?",
            (enrollment_id, period_id),
            |r| r.get(0),
        )
        .optional()?)
}
