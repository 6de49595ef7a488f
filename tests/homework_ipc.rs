mod test_support;

use serde_json::json;
use test_support::{
    create_student, error_code, id_of, open_as_admin, request_err, request_ok,
    spawn_sidecar_with_config, student_login, subject_named, temp_dir, NO_DEMO_CONFIG,
};

#[test]
fn due_dates_display_as_day_month_year_and_feed_the_calendar() {
    let workspace = temp_dir("classtrack-homework-dates");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_config(&workspace, NO_DEMO_CONFIG);
    let admin = open_as_admin(&mut stdin, &mut reader, &workspace);
    let math = subject_named(&mut stdin, &mut reader, &admin, "Mathematics");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "homework.create",
        json!({ "subjectId": math, "title": "Fractions", "dueDate": "2025-03-15" }),
        Some(&admin),
    );
    let hw = id_of(&created, "homeworkId");
    assert_eq!(created["dueDate"], "15-03-2025");

    let list = request_ok(&mut stdin, &mut reader, "2", "homework.list", json!({}), Some(&admin));
    assert_eq!(list["homework"][0]["dueDate"], "15-03-2025");
    assert_eq!(list["homework"][0]["subject"], "Mathematics");

    let events = request_ok(&mut stdin, &mut reader, "3", "homework.events", json!({}), Some(&admin));
    let ev = &events["events"][0];
    assert_eq!(id_of(ev, "homeworkId"), hw);
    assert_eq!(ev["start"], "2025-03-15");
    assert_eq!(ev["title"], "Fractions");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "homework.update",
        json!({
            "homeworkId": hw,
            "subjectId": math,
            "title": "Fractions II",
            "description": "p. 12",
            "dueDate": "20-03-2025",
        }),
        Some(&admin),
    );
    let manage = request_ok(&mut stdin, &mut reader, "5", "homework.manage", json!({}), Some(&admin));
    assert_eq!(manage["homework"][0]["title"], "Fractions II");
    assert_eq!(manage["homework"][0]["dueDate"], "20-03-2025");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "homework.create",
        json!({ "subjectId": math, "title": "Bad", "dueDate": "2025/03/15" }),
        Some(&admin),
    );
    assert_eq!(error_code(&e), "bad_params");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "homework.create",
        json!({ "subjectId": 9999, "title": "Orphan", "dueDate": "2025-03-15" }),
        Some(&admin),
    );
    assert_eq!(error_code(&e), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn grading_without_a_submission_creates_a_graded_row() {
    let workspace = temp_dir("classtrack-homework-grade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_config(&workspace, NO_DEMO_CONFIG);
    let admin = open_as_admin(&mut stdin, &mut reader, &workspace);
    let math = subject_named(&mut stdin, &mut reader, &admin, "Mathematics");
    let asha = create_student(&mut stdin, &mut reader, &admin, "R1", "Asha");
    let hw = id_of(
        &request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "homework.create",
            json!({ "subjectId": math, "title": "Ratios", "dueDate": "2025-04-01" }),
            Some(&admin),
        ),
        "homeworkId",
    );

    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "homework.grade",
        json!({ "homeworkId": hw, "studentId": asha, "grade": 88 }),
        Some(&admin),
    );
    assert_eq!(graded["status"], "Graded");

    let status = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "homework.status",
        json!({ "studentId": asha }),
        Some(&admin),
    );
    assert_eq!(status["homework"][0]["status"], "Graded");
    assert_eq!(status["homework"][0]["grade"], 88);

    let manage = request_ok(&mut stdin, &mut reader, "4", "homework.manage", json!({}), Some(&admin));
    assert_eq!(manage["submissions"][hw.to_string()][asha.to_string()], 88);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "homework.grade",
        json!({ "homeworkId": hw, "studentId": asha, "grade": 101 }),
        Some(&admin),
    );
    assert_eq!(error_code(&e), "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn students_submit_but_cannot_grade_themselves() {
    let workspace = temp_dir("classtrack-homework-submit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_config(&workspace, NO_DEMO_CONFIG);
    let admin = open_as_admin(&mut stdin, &mut reader, &workspace);
    let math = subject_named(&mut stdin, &mut reader, &admin, "Mathematics");
    let asha = create_student(&mut stdin, &mut reader, &admin, "R1", "Asha");
    let mut ids = Vec::new();
    for (i, due) in ["2025-05-02", "2025-05-01"].iter().enumerate() {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("hw-{}", i),
            "homework.create",
            json!({ "subjectId": math, "title": format!("Sheet {}", i), "dueDate": due }),
            Some(&admin),
        );
        ids.push(id_of(&res, "homeworkId"));
    }
    let student = student_login(&mut stdin, &mut reader, &admin, "asha", asha);

    let before = request_ok(&mut stdin, &mut reader, "1", "homework.status", json!({}), Some(&student));
    let rows = before["homework"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    // Earliest due date first; nothing submitted reads as Pending.
    assert_eq!(rows[0]["title"], "Sheet 1");
    assert!(rows.iter().all(|r| r["status"] == "Pending"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "homework.submit",
        json!({ "homeworkId": ids[0] }),
        Some(&student),
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "homework.submit",
        json!({ "homeworkId": ids[0], "status": "Graded" }),
        Some(&student),
    );
    assert_eq!(error_code(&e), "bad_params");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "homework.grade",
        json!({ "homeworkId": ids[0], "studentId": asha, "grade": 100 }),
        Some(&student),
    );
    assert_eq!(error_code(&e), "forbidden");

    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "homework.myGrade",
        json!({ "homeworkId": ids[0] }),
        Some(&student),
    );
    assert!(mine["grade"].is_null());

    let dash = request_ok(&mut stdin, &mut reader, "6", "dashboard.student", json!({}), Some(&student));
    let hw = &dash["dashboard"]["homework"];
    assert_eq!(hw["submitted"], 1);
    assert_eq!(hw["pending"], 1);
    assert_eq!(hw["graded"], 0);
    assert_eq!(hw["total"], 2);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "homework.grade",
        json!({ "homeworkId": ids[0], "studentId": asha, "grade": 72 }),
        Some(&admin),
    );
    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "homework.myGrade",
        json!({ "homeworkId": ids[0] }),
        Some(&student),
    );
    assert_eq!(mine["grade"], 72);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn deleting_homework_removes_its_submissions_and_doubts() {
    let workspace = temp_dir("classtrack-homework-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_config(&workspace, NO_DEMO_CONFIG);
    let admin = open_as_admin(&mut stdin, &mut reader, &workspace);
    let math = subject_named(&mut stdin, &mut reader, &admin, "Mathematics");
    let asha = create_student(&mut stdin, &mut reader, &admin, "R1", "Asha");
    let hw = id_of(
        &request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "homework.create",
            json!({ "subjectId": math, "title": "Gone", "dueDate": "2025-06-01" }),
            Some(&admin),
        ),
        "homeworkId",
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "homework.grade",
        json!({ "homeworkId": hw, "studentId": asha, "grade": 50 }),
        Some(&admin),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "doubts.ask",
        json!({ "homeworkId": hw, "studentId": asha, "question": "Why?" }),
        Some(&admin),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "homework.delete",
        json!({ "homeworkId": hw }),
        Some(&admin),
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "homework.delete",
        json!({ "homeworkId": hw }),
        Some(&admin),
    );
    assert_eq!(error_code(&e), "not_found");

    let doubts = request_ok(&mut stdin, &mut reader, "6", "doubts.list", json!({}), Some(&admin));
    assert_eq!(doubts["stats"]["total"], 0);

    drop(stdin);
    let _ = child.wait();

    let conn = rusqlite::Connection::open(workspace.join("classtrack.sqlite3")).expect("open db");
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM homework_submissions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(n, 0);
}
