//! Tenant settings: passing threshold and per-class default tuition.

use super::error::{parse_decimal, EngineError, EngineResult};
use super::{directory, finance};
use crate::calc::DEFAULT_PASSING_THRESHOLD;
use crate::db;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::debug;

const GRADING_KEY: &str = "grading";

pub fn configured_threshold(conn: &Connection) -> EngineResult<Option<f64>> {
    let value = db::settings_get_json(conn, GRADING_KEY)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.get("passingThreshold"))
        .and_then(|v| v.as_f64()))
}

/// The tenant's passing threshold. An unconfigured tenant gets the default.
pub fn passing_threshold(conn: &Connection) -> EngineResult<f64> {
    match configured_threshold(conn)? {
        Some(t) => Ok(t),
        None => {
            debug!(
                default = DEFAULT_PASSING_THRESHOLD,
                "passing threshold not configured, using default"
            );
            Ok(DEFAULT_PASSING_THRESHOLD)
        }
    }
}

pub fn set_passing_threshold(conn: &Connection, threshold: f64) -> EngineResult<()> {
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(EngineError::Invalid(
            "passingThreshold must be between 0 and 100".to_string(),
        ));
    }
    let mut current = db::settings_get_json(conn, GRADING_KEY)?.unwrap_or_else(|| json!({}));
    if !current.is_object() {
        current = json!({});
    }
    current["passingThreshold"] = json!(threshold);
    db::settings_set_json(conn, GRADING_KEY, &current)?;
    Ok(())
}

/// Class default for the year, falling back to zero.
pub fn default_tuition(conn: &Connection, class_id: &str, school_year_id: &str) -> EngineResult<Decimal> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT amount FROM class_tuition WHERE class_id = ? AND school_year_id = ?",
            (class_id, school_year_id),
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => parse_decimal(&s),
        None => Ok(Decimal::ZERO),
    }
}

pub fn set_class_default_tuition(
    conn: &Connection,
    class_id: &str,
    school_year_id: &str,
    amount: Decimal,
) -> EngineResult<()> {
    directory::class_name(conn, class_id)?;
    directory::require_year(conn, school_year_id)?;
    finance::ensure_non_negative(amount, "default tuition")?;
    conn.execute(
        "INSERT INTO class_tuition(class_id, school_year_id, amount) VALUES(?, ?, ?)
         ON CONFLICT(class_id, school_year_id) DO UPDATE SET amount = excluded.amount",
        (class_id, school_year_id, amount.to_string()),
    )?;
    Ok(())
}
