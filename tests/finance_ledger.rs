mod common;

use common::{str_field, Sidecar};
use serde_json::json;

struct Setup {
    year_id: String,
    class_id: String,
}

fn setup(sc: &mut Sidecar) -> Setup {
    let year = sc.ok("years.create", json!({ "name": "2025-2026" }));
    let class = sc.ok("classes.create", json!({ "name": "Grade 4" }));
    Setup {
        year_id: str_field(&year, "id"),
        class_id: str_field(&class, "id"),
    }
}

fn new_enrollment(sc: &mut Sidecar, s: &Setup, last: &str, tuition: Option<&str>) -> String {
    let student = sc.ok(
        "students.create",
        json!({ "lastName": last, "firstName": "Kid", "classId": s.class_id }),
    );
    let mut params = json!({ "studentId": str_field(&student, "id"), "schoolYearId": s.year_id });
    if let Some(t) = tuition {
        params["baseTuition"] = json!(t);
    }
    let enrollment = sc.ok("enrollments.create", params);
    str_field(&enrollment, "id")
}

#[test]
fn tuition_defaults_come_from_the_class_table_then_zero() {
    let mut sc = Sidecar::start();
    let s = setup(&mut sc);

    let bare = new_enrollment(&mut sc, &s, "Early", None);
    let statement = sc.ok("finance.get", json!({ "enrollmentId": bare }));
    assert_eq!(statement["baseTuition"], json!("0"));

    sc.ok(
        "tuition.setClassDefault",
        json!({ "schoolYearId": s.year_id, "classId": s.class_id, "amount": "1500.00" }),
    );
    let defaulted = new_enrollment(&mut sc, &s, "Later", None);
    let statement = sc.ok("finance.get", json!({ "enrollmentId": defaulted }));
    assert_eq!(statement["baseTuition"], json!("1500.00"));

    let explicit = new_enrollment(&mut sc, &s, "Custom", Some("900"));
    let statement = sc.ok("finance.get", json!({ "enrollmentId": explicit }));
    assert_eq!(statement["baseTuition"], json!("900"));

    sc.fail(
        "tuition.setClassDefault",
        json!({ "schoolYearId": s.year_id, "classId": s.class_id, "amount": "-1" }),
        "invalid_amount",
    );
}

#[test]
fn balance_follows_signed_adjustments_and_payments() {
    let mut sc = Sidecar::start();
    let s = setup(&mut sc);
    let e = new_enrollment(&mut sc, &s, "Payer", Some("1000.00"));

    let statement = sc.ok(
        "finance.setLedger",
        json!({
            "enrollmentId": e,
            "adjustments": [
                { "amount": "-250.00", "reason": "Scholarship" },
                { "amount": "40", "reason": "Lab fee" }
            ],
            "payments": [
                { "amount": "500", "date": "2025-09-01" },
                { "amount": 400.5 }
            ]
        }),
    );
    assert_eq!(statement["adjustedAmountDue"], json!("790.00"));
    assert_eq!(statement["totalPaid"], json!("900.5"));
    assert_eq!(statement["balance"], json!("-110.50"));
    assert_eq!(statement["ledgerVersion"], json!(1));
    assert_eq!(statement["payments"][0]["date"], json!("2025-09-01"));
    assert_eq!(statement["adjustments"][0]["reason"], json!("Scholarship"));

    // Full replace: the old entries are gone.
    let replaced = sc.ok(
        "finance.setLedger",
        json!({ "enrollmentId": e, "payments": [{ "amount": "100" }] }),
    );
    assert_eq!(replaced["adjustments"], json!([]));
    assert_eq!(replaced["balance"], json!("900.00"));

    sc.fail(
        "finance.setLedger",
        json!({ "enrollmentId": e, "payments": [{ "amount": "-5" }] }),
        "invalid_amount",
    );
}

#[test]
fn stale_versions_are_rejected() {
    let mut sc = Sidecar::start();
    let s = setup(&mut sc);
    let e = new_enrollment(&mut sc, &s, "Racer", Some("300"));

    sc.ok(
        "finance.setLedger",
        json!({ "enrollmentId": e, "payments": [{ "amount": "100" }], "expectedVersion": 0 }),
    );
    let conflict = sc.fail(
        "finance.setLedger",
        json!({ "enrollmentId": e, "payments": [{ "amount": "50" }], "expectedVersion": 0 }),
        "version_conflict",
    );
    assert_eq!(conflict.pointer("/details/currentVersion"), Some(&json!(1)));

    let tuition = sc.ok(
        "finance.setBaseTuition",
        json!({ "enrollmentId": e, "amount": "350", "expectedVersion": 1 }),
    );
    assert_eq!(tuition["balance"], json!("250"));
    assert_eq!(tuition["ledgerVersion"], json!(2));
}

#[test]
fn class_statement_totals() {
    let mut sc = Sidecar::start();
    let s = setup(&mut sc);
    let a = new_enrollment(&mut sc, &s, "Alpha", Some("100"));
    new_enrollment(&mut sc, &s, "Beta", Some("200"));
    sc.ok(
        "finance.setLedger",
        json!({ "enrollmentId": a, "payments": [{ "amount": "150" }] }),
    );

    let statement = sc.ok(
        "finance.classStatement",
        json!({ "schoolYearId": s.year_id, "classId": s.class_id }),
    );
    assert_eq!(statement["rows"].as_array().map(|r| r.len()), Some(2));
    assert_eq!(statement["totalDue"], json!("300"));
    assert_eq!(statement["totalPaid"], json!("150"));
    assert_eq!(statement["totalBalance"], json!("150"));
    assert_eq!(statement["rows"][0]["balance"], json!("-50"));
}
