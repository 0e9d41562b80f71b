//! Financial ledger: base tuition, signed adjustments and payments per
//! enrollment. Both lists are replaced wholesale; the ledger version guards
//! against lost updates when the caller passes the version it last read.

use super::directory;
use super::error::{invalid_amount, parse_decimal, EngineError, EngineResult};
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub amount: Decimal,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialStatement {
    pub enrollment_id: String,
    pub base_tuition: Decimal,
    pub adjustments: Vec<Adjustment>,
    pub payments: Vec<Payment>,
    pub adjusted_amount_due: Decimal,
    pub total_paid: Decimal,
    pub balance: Decimal,
    pub ledger_version: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRow {
    pub enrollment_id: String,
    pub student_id: String,
    pub student_name: String,
    pub adjusted_amount_due: Decimal,
    pub total_paid: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatement {
    pub school_year_id: String,
    pub class_id: String,
    pub rows: Vec<StatementRow>,
    pub total_due: Decimal,
    pub total_paid: Decimal,
    pub total_balance: Decimal,
}

fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> EngineResult<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount)
            .ok_or_else(|| invalid_amount("ledger total is out of range"))
    })
}

pub fn adjusted_amount_due(base_tuition: Decimal, adjustments: &[Adjustment]) -> EngineResult<Decimal> {
    checked_sum(std::iter::once(base_tuition).chain(adjustments.iter().map(|a| a.amount)))
}

pub fn total_paid(payments: &[Payment]) -> EngineResult<Decimal> {
    checked_sum(payments.iter().map(|p| p.amount))
}

/// Negative when the family has paid more than is due.
pub fn balance(
    base_tuition: Decimal,
    adjustments: &[Adjustment],
    payments: &[Payment],
) -> EngineResult<Decimal> {
    adjusted_amount_due(base_tuition, adjustments)?
        .checked_sub(total_paid(payments)?)
        .ok_or_else(|| invalid_amount("ledger balance is out of range"))
}

pub(crate) fn ensure_non_negative(amount: Decimal, what: &str) -> EngineResult<()> {
    if amount < Decimal::ZERO {
        return Err(invalid_amount(format!("{} must not be negative", what)));
    }
    Ok(())
}

fn load_lists(conn: &Connection, enrollment_id: &str) -> EngineResult<(Vec<Adjustment>, Vec<Payment>)> {
    let mut stmt = conn.prepare(
        "SELECT amount, reason FROM enrollment_adjustments
         WHERE enrollment_id = ? ORDER BY position",
    )?;
    let raw_adjustments = stmt
        .query_map([enrollment_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let adjustments = raw_adjustments
        .into_iter()
        .map(|(amount, reason)| {
            Ok(Adjustment {
                amount: parse_decimal(&amount)?,
                reason,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT amount, paid_on FROM enrollment_payments
         WHERE enrollment_id = ? ORDER BY position",
    )?;
    let raw_payments = stmt
        .query_map([enrollment_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let payments = raw_payments
        .into_iter()
        .map(|(amount, paid_on)| {
            Ok(Payment {
                amount: parse_decimal(&amount)?,
                date: paid_on.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    Ok((adjustments, payments))
}

pub fn statement(conn: &Connection, enrollment_id: &str) -> EngineResult<FinancialStatement> {
    let enrollment = directory::get_enrollment(conn, enrollment_id)?;
    let (adjustments, payments) = load_lists(conn, enrollment_id)?;
    Ok(FinancialStatement {
        enrollment_id: enrollment.id,
        base_tuition: enrollment.base_tuition,
        adjusted_amount_due: adjusted_amount_due(enrollment.base_tuition, &adjustments)?,
        total_paid: total_paid(&payments)?,
        balance: balance(enrollment.base_tuition, &adjustments, &payments)?,
        adjustments,
        payments,
        ledger_version: enrollment.ledger_version,
    })
}

fn current_version(conn: &Connection, enrollment_id: &str) -> EngineResult<i64> {
    conn.query_row(
        "SELECT ledger_version FROM enrollments WHERE id = ?",
        [enrollment_id],
        |r| r.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => EngineError::EnrollmentNotFound {
            enrollment_id: enrollment_id.to_string(),
        },
        other => other.into(),
    })
}

fn check_version(conn: &Connection, enrollment_id: &str, expected: Option<i64>) -> EngineResult<()> {
    let current = current_version(conn, enrollment_id)?;
    if let Some(expected) = expected {
        if expected != current {
            warn!(enrollment_id, expected, current, "ledger write rejected: stale version");
            return Err(EngineError::VersionConflict { expected, current });
        }
    }
    Ok(())
}

/// Replaces both lists in one write. Without `expected_version` the last
/// writer wins.
pub fn set_payments_and_adjustments(
    conn: &Connection,
    enrollment_id: &str,
    payments: &[Payment],
    adjustments: &[Adjustment],
    expected_version: Option<i64>,
) -> EngineResult<FinancialStatement> {
    for p in payments {
        if p.amount <= Decimal::ZERO {
            return Err(invalid_amount("payment amounts must be positive"));
        }
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    check_version(&tx, enrollment_id, expected_version)?;
    tx.execute(
        "DELETE FROM enrollment_payments WHERE enrollment_id = ?",
        [enrollment_id],
    )?;
    tx.execute(
        "DELETE FROM enrollment_adjustments WHERE enrollment_id = ?",
        [enrollment_id],
    )?;
    for (i, p) in payments.iter().enumerate() {
        tx.execute(
            "INSERT INTO enrollment_payments(id, enrollment_id, position, amount, paid_on)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                enrollment_id,
                i as i64,
                p.amount.to_string(),
                p.date.map(|d| d.format("%Y-%m-%d").to_string()),
            ),
        )?;
    }
    for (i, a) in adjustments.iter().enumerate() {
        tx.execute(
            "INSERT INTO enrollment_adjustments(id, enrollment_id, position, amount, reason)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                enrollment_id,
                i as i64,
                a.amount.to_string(),
                a.reason.trim(),
            ),
        )?;
    }
    tx.execute(
        "UPDATE enrollments SET ledger_version = ledger_version + 1 WHERE id = ?",
        [enrollment_id],
    )?;
    // Totals are computed before commit so an out-of-range ledger never lands.
    let replaced = statement(&tx, enrollment_id)?;
    tx.commit()?;
    info!(
        enrollment_id,
        payments = payments.len(),
        adjustments = adjustments.len(),
        "ledger replaced"
    );
    Ok(replaced)
}

pub fn set_base_tuition(
    conn: &Connection,
    enrollment_id: &str,
    amount: Decimal,
    expected_version: Option<i64>,
) -> EngineResult<FinancialStatement> {
    ensure_non_negative(amount, "base tuition")?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    check_version(&tx, enrollment_id, expected_version)?;
    tx.execute(
        "UPDATE enrollments SET base_tuition = ?, ledger_version = ledger_version + 1 WHERE id = ?",
        (amount.to_string(), enrollment_id),
    )?;
    let updated = statement(&tx, enrollment_id)?;
    tx.commit()?;
    Ok(updated)
}

pub fn class_statement(conn: &Connection, school_year_id: &str, class_id: &str) -> EngineResult<ClassStatement> {
    directory::class_name(conn, class_id)?;
    let mut rows = Vec::new();
    for enrollment in directory::list_enrollments(conn, school_year_id, Some(class_id))? {
        let (adjustments, payments) = load_lists(conn, &enrollment.id)?;
        rows.push(StatementRow {
            adjusted_amount_due: adjusted_amount_due(enrollment.base_tuition, &adjustments)?,
            total_paid: total_paid(&payments)?,
            balance: balance(enrollment.base_tuition, &adjustments, &payments)?,
            enrollment_id: enrollment.id,
            student_id: enrollment.student_id,
            student_name: enrollment.student_name,
        });
    }
    Ok(ClassStatement {
        school_year_id: school_year_id.to_string(),
        class_id: class_id.to_string(),
        total_due: checked_sum(rows.iter().map(|r| r.adjusted_amount_due))?,
        total_paid: checked_sum(rows.iter().map(|r| r.total_paid))?,
        total_balance: checked_sum(rows.iter().map(|r| r.balance))?,
        rows,
    })
}
