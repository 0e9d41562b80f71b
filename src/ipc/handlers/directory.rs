use crate::engine::directory::{self, NewEnrollment};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_decimal, get_optional_i64, get_optional_str, get_required_bool, get_required_str,
    to_json, with_workspace,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn years_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    to_json(&directory::create_year(conn, &name)?)
}

fn years_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({ "years": directory::list_years(conn)? }))
}

fn periods_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let name = get_required_str(params, "name")?;
    let ordinal = get_optional_i64(params, "ordinal")?;
    to_json(&directory::create_period(conn, &year_id, &name, ordinal)?)
}

fn periods_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    Ok(json!({ "periods": directory::list_periods(conn, &year_id)? }))
}

fn classes_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    to_json(&directory::create_class(conn, &name)?)
}

fn classes_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({ "classes": directory::list_classes(conn)? }))
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    to_json(&directory::create_subject(conn, &name)?)
}

fn subjects_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({ "subjects": directory::list_subjects(conn)? }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_optional_str(params, "firstName")?.unwrap_or_default();
    let class_id = get_optional_str(params, "classId")?;
    to_json(&directory::create_student(
        conn,
        &last_name,
        &first_name,
        class_id.as_deref(),
    )?)
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    to_json(&directory::get_student(conn, &student_id)?)
}

fn enrollments_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let new = NewEnrollment {
        student_id: get_required_str(params, "studentId")?,
        school_year_id: get_required_str(params, "schoolYearId")?,
        class_id: get_optional_str(params, "classId")?,
        base_tuition: get_optional_decimal(params, "baseTuition")?,
    };
    to_json(&directory::create_enrollment(conn, &new)?)
}

fn enrollments_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    to_json(&directory::get_enrollment(conn, &enrollment_id)?)
}

fn enrollments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = get_optional_str(params, "classId")?;
    Ok(json!({
        "enrollments": directory::list_enrollments(conn, &year_id, class_id.as_deref())?
    }))
}

fn enrollments_transfer_class(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let class_id = get_required_str(params, "classId")?;
    to_json(&directory::transfer_class(conn, &enrollment_id, &class_id)?)
}

fn enrollments_set_grades_visible(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let visible = get_required_bool(params, "visible")?;
    directory::set_grades_visible(conn, &enrollment_id, visible)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "years.create" => years_create,
        "years.list" => years_list,
        "periods.create" => periods_create,
        "periods.list" => periods_list,
        "classes.create" => classes_create,
        "classes.list" => classes_list,
        "subjects.create" => subjects_create,
        "subjects.list" => subjects_list,
        "students.create" => students_create,
        "students.get" => students_get,
        "enrollments.create" => enrollments_create,
        "enrollments.get" => enrollments_get,
        "enrollments.list" => enrollments_list,
        "enrollments.transferClass" => enrollments_transfer_class,
        "enrollments.setGradesVisible" => enrollments_set_grades_visible,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
