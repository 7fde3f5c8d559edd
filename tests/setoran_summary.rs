mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{admin, error_code, request, request_ok, spawn_sidecar, temp_dir};

fn seed(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> (String, String, String) {
    let created = request_ok(
        stdin,
        reader,
        "s1",
        "halaqah.create",
        json!({ "name": "Halaqah Al-Fatihah", "currentUser": admin() }),
    );
    let halaqah_id = created["halaqahId"].as_str().expect("halaqah").to_string();
    let a = request_ok(
        stdin,
        reader,
        "s2",
        "students.create",
        json!({ "name": "Ahmad", "halaqahId": halaqah_id, "guardianPhone": "081234567890", "currentUser": admin() }),
    );
    let b = request_ok(
        stdin,
        reader,
        "s3",
        "students.create",
        json!({ "name": "Bilal", "halaqahId": halaqah_id, "currentUser": admin() }),
    );
    (
        halaqah_id,
        a["studentId"].as_str().expect("a").to_string(),
        b["studentId"].as_str().expect("b").to_string(),
    )
}

#[test]
fn summary_totals_ayat_mistakes_and_tier() {
    let workspace = temp_dir("santrid-setoran-summary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (halaqah_id, ahmad, _bilal) = seed(&mut stdin, &mut reader);
    let guru = json!({ "role": "guru", "assignedHalaqahIds": [halaqah_id] });

    let entries = [
        ("2026-03-01", 1, 7, 2, 90.0),
        ("2026-03-02", 8, 15, 0, 85.0),
        ("2026-04-01", 16, 20, 4, 60.0),
    ];
    for (i, (date, from, to, mistakes, score)) in entries.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "setoran.create",
            json!({
                "studentId": ahmad,
                "date": date,
                "surah": "Al-Baqarah",
                "ayatFrom": from,
                "ayatTo": to,
                "mistakes": mistakes,
                "score": score,
                "currentUser": guru,
            }),
        );
    }

    let march = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setoran.summary",
        json!({ "studentId": ahmad, "from": "2026-03-01", "to": "2026-03-31", "currentUser": guru }),
    );
    let s = &march["students"][0]["summary"];
    assert_eq!(s["count"], 2);
    assert_eq!(s["averageScore"], 87.5);
    assert_eq!(s["totalAyat"], 15);
    assert_eq!(s["totalMistakes"], 2);
    assert_eq!(s["tier"], "mutqin");

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setoran.summary",
        json!({ "halaqahId": halaqah_id, "currentUser": admin() }),
    );
    let students = all["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["summary"]["count"], 3);
    assert_eq!(students[0]["summary"]["averageScore"], 78.3);
    assert_eq!(students[0]["summary"]["tier"], "mutawassith");
    assert_eq!(students[1]["summary"]["count"], 0);
    assert!(students[1]["summary"]["tier"].is_null());

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setoran.list",
        json!({ "studentId": ahmad, "currentUser": { "role": "wali", "phone": "6281234567890" } }),
    );
    let dates = list["setoran"]
        .as_array()
        .expect("setoran")
        .iter()
        .map(|r| r["date"].as_str().unwrap_or("").to_string())
        .collect::<Vec<_>>();
    assert_eq!(dates, vec!["2026-04-01", "2026-03-02", "2026-03-01"]);
}

#[test]
fn create_validates_ranges_and_permissions() {
    let workspace = temp_dir("santrid-setoran-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (halaqah_id, ahmad, _) = seed(&mut stdin, &mut reader);

    let base = json!({
        "studentId": ahmad,
        "date": "2026-03-01",
        "surah": "An-Naba",
        "ayatFrom": 5,
        "ayatTo": 10,
        "mistakes": 0,
        "score": 80,
        "currentUser": admin(),
    });
    let bad_cases = [
        ("ayatTo", json!(4)),
        ("ayatFrom", json!(0)),
        ("mistakes", json!(-1)),
        ("ayatTo", json!(287)),
        ("mistakes", json!(1000)),
        ("score", json!(101)),
        ("date", json!("01/03/2026")),
    ];
    for (i, (key, value)) in bad_cases.into_iter().enumerate() {
        let mut params = base.clone();
        params[key] = value;
        let res = request(&mut stdin, &mut reader, &format!("b{i}"), "setoran.create", params);
        assert_eq!(error_code(&res), "bad_params", "{key}");
    }

    let mut other_guru = base.clone();
    other_guru["currentUser"] = json!({ "role": "guru", "assignedHalaqahIds": ["elsewhere"] });
    let res = request(&mut stdin, &mut reader, "g1", "setoran.create", other_guru);
    assert_eq!(error_code(&res), "forbidden");

    let mut wali = base.clone();
    wali["currentUser"] = json!({ "role": "wali", "phone": "081234567890" });
    let res = request(&mut stdin, &mut reader, "g2", "setoran.create", wali);
    assert_eq!(error_code(&res), "forbidden");

    let wali_group = request(
        &mut stdin,
        &mut reader,
        "g3",
        "setoran.summary",
        json!({ "halaqahId": halaqah_id, "currentUser": { "role": "wali", "phone": "081234567890" } }),
    );
    assert_eq!(error_code(&wali_group), "forbidden");
}

#[test]
fn oversized_counts_are_rejected_and_summary_keeps_answering() {
    let workspace = temp_dir("santrid-setoran-oversized");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (_halaqah_id, ahmad, _) = seed(&mut stdin, &mut reader);

    for i in 0..2 {
        let res = request(
            &mut stdin,
            &mut reader,
            &format!("big{i}"),
            "setoran.create",
            json!({
                "studentId": ahmad,
                "date": "2026-03-01",
                "surah": "Al-Baqarah",
                "ayatFrom": 1,
                "ayatTo": i64::MAX,
                "mistakes": i64::MAX,
                "score": 90,
                "currentUser": admin(),
            }),
        );
        assert_eq!(error_code(&res), "bad_params");
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setoran.create",
        json!({
            "studentId": ahmad,
            "date": "2026-03-01",
            "surah": "Al-Baqarah",
            "ayatFrom": 1,
            "ayatTo": 286,
            "mistakes": 999,
            "score": 90,
            "currentUser": admin(),
        }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setoran.summary",
        json!({ "studentId": ahmad, "currentUser": admin() }),
    );
    let s = &summary["students"][0]["summary"];
    assert_eq!(s["count"], 1);
    assert_eq!(s["totalAyat"], 286);
    assert_eq!(s["totalMistakes"], 999);

    // The sidecar is still alive after the summary.
    let _ = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    drop(stdin);
    let _ = child.wait();
}
