mod test_support;

use serde_json::json;
use test_support::{admin, error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn record_upserts_and_summary_computes_percentages() {
    let workspace = temp_dir("santrid-assessments");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "halaqah.create",
        json!({ "name": "Halaqah An-Nas", "currentUser": admin() }),
    );
    let halaqah_id = created["halaqahId"].as_str().expect("halaqah").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Umar", "halaqahId": halaqah_id, "guardianPhone": "089876543210", "currentUser": admin() }),
    );
    let student_id = student["studentId"].as_str().expect("student").to_string();
    let guru = json!({ "role": "guru", "assignedHalaqahIds": [halaqah_id] });

    let days = [
        ("2026-05-01", true, true, true, true),
        ("2026-05-02", true, false, true, false),
        ("2026-05-03", false, false, false, false),
        // Re-recording a day replaces it.
        ("2026-05-03", true, true, true, true),
    ];
    for (i, (date, present, on_time, prayer, manners)) in days.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{i}"),
            "assessments.record",
            json!({
                "studentId": student_id,
                "date": date,
                "present": present,
                "onTime": on_time,
                "prayer": prayer,
                "manners": manners,
                "currentUser": guru,
            }),
        );
    }

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assessments.summary",
        json!({ "studentId": student_id, "currentUser": { "role": "wali", "phone": "6289876543210" } }),
    );
    let s = &summary["students"][0]["summary"];
    assert_eq!(s["days"], 3);
    assert_eq!(s["presentDays"], 3);
    assert_eq!(s["attendancePercent"], 100.0);
    assert_eq!(s["onTimePercent"], 66.7);
    assert_eq!(s["compliancePercent"], 83.3);
    assert_eq!(s["meetsMinimum"], true);

    let early = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assessments.summary",
        json!({ "halaqahId": halaqah_id, "to": "2026-04-30", "currentUser": guru }),
    );
    let s = &early["students"][0]["summary"];
    assert_eq!(s["days"], 0);
    assert_eq!(s["attendancePercent"], 0.0);
    assert_eq!(s["meetsMinimum"], false);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "setup.update",
        json!({ "section": "attendance", "patch": { "minimumPercent": 100 }, "currentUser": admin() }),
    );
    let two_days = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "assessments.summary",
        json!({ "studentId": student_id, "from": "2026-05-01", "to": "2026-05-02", "currentUser": admin() }),
    );
    assert_eq!(two_days["students"][0]["summary"]["meetsMinimum"], true);

    let missing_flag = request(
        &mut stdin,
        &mut reader,
        "8",
        "assessments.record",
        json!({ "studentId": student_id, "date": "2026-05-04", "present": true, "currentUser": admin() }),
    );
    assert_eq!(error_code(&missing_flag), "bad_params");

    let bad_range = request(
        &mut stdin,
        &mut reader,
        "9",
        "assessments.summary",
        json!({ "studentId": student_id, "from": "2026-06-01", "to": "2026-05-01", "currentUser": admin() }),
    );
    assert_eq!(error_code(&bad_range), "bad_params");
}
