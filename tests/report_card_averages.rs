mod common;

use common::{f64_field, record, seed_school, str_field, Sidecar};
use serde_json::json;

#[test]
fn period_report_is_budget_weighted_and_null_without_grades() {
    let mut sc = Sidecar::start();
    let s = seed_school(&mut sc);
    let params = json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id });

    let empty = sc.ok("reports.period", params.clone());
    assert!(empty["periodAverage"].is_null());
    assert_eq!(empty["subjects"].as_array().map(|a| a.len()), Some(2));

    record(&mut sc, &s.enrollment_id, &s.math_id, &s.period_id, "T1", 18.0, 20.0);
    record(&mut sc, &s.enrollment_id, &s.math_id, &s.period_id, "T2", 9.0, 10.0);
    let report = sc.ok("reports.period", params.clone());
    // Only Mathematics has points: 90 of 100.
    assert!((f64_field(&report, "periodAverage") - 90.0).abs() < 1e-9);

    record(&mut sc, &s.enrollment_id, &s.science_id, &s.period_id, "Lab", 6.0, 20.0);
    let report = sc.ok("reports.period", params);
    // 90 + 15 points over 150 budget.
    assert!((f64_field(&report, "periodAverage") - 70.0).abs() < 1e-9);
    let subjects = report["subjects"].as_array().expect("subjects");
    let science = subjects
        .iter()
        .find(|line| str_field(line, "subjectId") == s.science_id)
        .expect("science line");
    assert!((f64_field(science, "average") - 15.0).abs() < 1e-9);
}

#[test]
fn annual_average_is_unweighted_and_shown_on_final_period() {
    let mut sc = Sidecar::start();
    let s = seed_school(&mut sc);
    sc.ok("settings.update", json!({ "passingThreshold": 60 }));
    let term2 = sc.ok(
        "periods.create",
        json!({ "schoolYearId": s.year_id, "name": "Term 2" }),
    );
    let term2_id = str_field(&term2, "id");

    // Mathematics 50% across both terms, Science 80% in term 2 only.
    record(&mut sc, &s.enrollment_id, &s.math_id, &s.period_id, "Exam 1", 10.0, 40.0);
    record(&mut sc, &s.enrollment_id, &s.math_id, &term2_id, "Exam 2", 30.0, 40.0);
    record(&mut sc, &s.enrollment_id, &s.science_id, &term2_id, "Lab", 16.0, 20.0);

    let annual = sc.ok("reports.annualAverage", json!({ "enrollmentId": s.enrollment_id }));
    assert!((f64_field(&annual, "average") - 65.0).abs() < 1e-9);
    assert_eq!(annual["passed"], json!(true));

    let term1 = sc.ok(
        "reports.period",
        json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id }),
    );
    assert!(term1.get("annual").is_none());
    let final_report = sc.ok(
        "reports.period",
        json!({ "enrollmentId": s.enrollment_id, "periodId": term2_id }),
    );
    assert_eq!(final_report["period"]["isFinal"], json!(true));
    assert!((f64_field(&final_report["annual"], "average") - 65.0).abs() < 1e-9);

    sc.ok("settings.update", json!({ "passingThreshold": 70 }));
    let annual = sc.ok("reports.annualAverage", json!({ "enrollmentId": s.enrollment_id }));
    assert_eq!(annual["passed"], json!(false));
}

#[test]
fn threshold_defaults_to_sixty() {
    let mut sc = Sidecar::start();
    let settings = sc.ok("settings.get", json!({}));
    assert_eq!(f64_field(&settings, "passingThreshold"), 60.0);
    assert_eq!(settings["passingThresholdConfigured"], json!(false));
    sc.fail("settings.update", json!({ "passingThreshold": 140 }), "bad_params");
}

#[test]
fn appreciations_upsert_and_clear() {
    let mut sc = Sidecar::start();
    let s = seed_school(&mut sc);
    let report_params = json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id });

    sc.ok(
        "appreciations.set",
        json!({ "enrollmentId": s.enrollment_id, "subjectId": s.math_id, "periodId": s.period_id, "text": "Good start" }),
    );
    sc.ok(
        "appreciations.set",
        json!({ "enrollmentId": s.enrollment_id, "subjectId": s.math_id, "periodId": s.period_id, "text": "Excellent work" }),
    );
    sc.ok(
        "appreciations.setGeneral",
        json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id, "text": "Keep it up" }),
    );

    let report = sc.ok("reports.period", report_params.clone());
    assert_eq!(report["generalAppreciation"], json!("Keep it up"));
    let math = report["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|line| str_field(line, "subjectId") == s.math_id)
        .cloned()
        .expect("math");
    assert_eq!(math["appreciation"], json!("Excellent work"));

    sc.ok(
        "appreciations.setGeneral",
        json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id, "text": "  " }),
    );
    let report = sc.ok("reports.period", report_params);
    assert!(report["generalAppreciation"].is_null());
}

#[test]
fn student_view_is_gated() {
    let mut sc = Sidecar::start();
    let s = seed_school(&mut sc);
    let params = json!({ "enrollmentId": s.enrollment_id, "periodId": s.period_id });

    let hidden = sc.ok("reports.studentView", params.clone());
    assert_eq!(hidden["gradesVisible"], json!(false));
    assert!(hidden.get("report").is_none());

    sc.ok(
        "enrollments.setGradesVisible",
        json!({ "enrollmentId": s.enrollment_id, "visible": true }),
    );
    let shown = sc.ok("reports.studentView", params);
    assert_eq!(shown["gradesVisible"], json!(true));
    assert!(shown["report"]["subjects"].is_array());
}
