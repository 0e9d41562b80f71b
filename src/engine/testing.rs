use super::{curriculum, directory};
use crate::db;
use rusqlite::Connection;
use tempfile::TempDir;

/// One tenant store with a year, a first period, class "Grade 1", two
/// assigned subjects (budgets 100 and 50), one unassigned subject and one
/// enrolled student.
pub struct Fixture {
    dir: TempDir,
    pub year_id: String,
    pub period_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub second_subject_id: String,
    pub unassigned_subject_id: String,
    pub student_id: String,
    pub enrollment_id: String,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let conn = db::open_db(dir.path()).expect("open db");
        let year = directory::create_year(&conn, "2025-2026").expect("year");
        let period = directory::create_period(&conn, &year.id, "Term 1", None).expect("period");
        let class = directory::create_class(&conn, "Grade 1").expect("class");
        let math = directory::create_subject(&conn, "Mathematics").expect("math");
        let science = directory::create_subject(&conn, "Science").expect("science");
        let art = directory::create_subject(&conn, "Art").expect("art");
        curriculum::assign(&conn, &year.id, &class.id, &math.id, None).expect("assign math");
        curriculum::assign(&conn, &year.id, &class.id, &science.id, Some(50.0)).expect("assign science");
        let student = directory::create_student(&conn, "Doe", "Ada", Some(class.id.as_str())).expect("student");
        let enrollment = directory::create_enrollment(
            &conn,
            &directory::NewEnrollment {
                student_id: student.id.clone(),
                school_year_id: year.id.clone(),
                ..Default::default()
            },
        )
        .expect("enrollment");

        Self {
            dir,
            year_id: year.id,
            period_id: period.id,
            class_id: class.id,
            subject_id: math.id,
            second_subject_id: science.id,
            unassigned_subject_id: art.id,
            student_id: student.id,
            enrollment_id: enrollment.id,
        }
    }

    /// A fresh connection to the fixture store.
    pub fn conn(&self) -> Connection {
        db::open_db(self.dir.path()).expect("open db")
    }

    pub fn add_period(&self, name: &str) -> String {
        directory::create_period(&self.conn(), &self.year_id, name, None)
            .expect("period")
            .id
    }

    pub fn enroll_student(&self, last_name: &str, first_name: &str) -> String {
        let conn = self.conn();
        let student = directory::create_student(&conn, last_name, first_name, Some(self.class_id.as_str()))
            .expect("student");
        directory::create_enrollment(
            &conn,
            &directory::NewEnrollment {
                student_id: student.id,
                school_year_id: self.year_id.clone(),
                ..Default::default()
            },
        )
        .expect("enrollment")
        .id
    }
}
