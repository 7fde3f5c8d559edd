use crate::calc::TierThresholds;
use crate::db;
use crate::import::{ImportSettings, DEFAULT_BATCH_SIZE};
use crate::ipc::error::ok;
use crate::ipc::helpers::{require_admin, require_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::phone::DEFAULT_COUNTRY_CODE;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "Assalamu'alaikum {guardian}, kami dari {halaqah} ingin menyampaikan kabar tentang ananda {student}.";

#[derive(Clone, Copy)]
enum SetupSection {
    Import,
    Setoran,
    Attendance,
    Notify,
}

impl SetupSection {
    const ALL: [SetupSection; 4] = [
        SetupSection::Import,
        SetupSection::Setoran,
        SetupSection::Attendance,
        SetupSection::Notify,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "setoran" => Some(Self::Setoran),
            "attendance" => Some(Self::Attendance),
            "notify" => Some(Self::Notify),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Setoran => "setoran",
            Self::Attendance => "attendance",
            Self::Notify => "notify",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Import => "setup.import",
            Self::Setoran => "setup.setoran",
            Self::Attendance => "setup.attendance",
            Self::Notify => "setup.notify",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "batchSize": DEFAULT_BATCH_SIZE,
            "countryCode": DEFAULT_COUNTRY_CODE
        }),
        SetupSection::Setoran => json!({
            "mutqinMinScore": 85,
            "mutawassithMinScore": 70
        }),
        SetupSection::Attendance => json!({
            "minimumPercent": 75
        }),
        SetupSection::Notify => json!({
            "messageTemplate": DEFAULT_MESSAGE_TEMPLATE
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "batchSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "countryCode" => {
                    let s = parse_string_max(v, k, 4)?;
                    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                        return Err("countryCode must be 1-4 digits".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
            SetupSection::Setoran => match k.as_str() {
                "mutqinMinScore" | "mutawassithMinScore" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                _ => return Err(format!("unknown setoran field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "minimumPercent" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
            SetupSection::Notify => match k.as_str() {
                "messageTemplate" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 500)?));
                }
                _ => return Err(format!("unknown notify field: {}", k)),
            },
        }
    }
    if let SetupSection::Setoran = section {
        let mutqin = obj.get("mutqinMinScore").and_then(|v| v.as_i64()).unwrap_or(85);
        let mutawassith = obj
            .get("mutawassithMinScore")
            .and_then(|v| v.as_i64())
            .unwrap_or(70);
        if mutqin < mutawassith {
            return Err("mutqinMinScore must be >= mutawassithMinScore".into());
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults rather than failing reads.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

fn field_i64(section: &Value, key: &str, default: i64) -> i64 {
    section.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

pub fn import_settings(conn: &Connection) -> anyhow::Result<ImportSettings> {
    let section = load_section(conn, SetupSection::Import)?;
    Ok(ImportSettings {
        batch_size: field_i64(&section, "batchSize", DEFAULT_BATCH_SIZE as i64) as usize,
        country_code: section
            .get("countryCode")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_COUNTRY_CODE)
            .to_string(),
    })
}

pub fn country_code(conn: &Connection) -> anyhow::Result<String> {
    Ok(import_settings(conn)?.country_code)
}

pub fn tier_thresholds(conn: &Connection) -> anyhow::Result<TierThresholds> {
    let section = load_section(conn, SetupSection::Setoran)?;
    Ok(TierThresholds {
        mutqin_min: field_i64(&section, "mutqinMinScore", 85) as f64,
        mutawassith_min: field_i64(&section, "mutawassithMinScore", 70) as f64,
    })
}

pub fn attendance_minimum(conn: &Connection) -> anyhow::Result<f64> {
    let section = load_section(conn, SetupSection::Attendance)?;
    Ok(field_i64(&section, "minimumPercent", 75) as f64)
}

pub fn message_template(conn: &Connection) -> anyhow::Result<String> {
    let section = load_section(conn, SetupSection::Notify)?;
    Ok(section
        .get("messageTemplate")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_MESSAGE_TEMPLATE)
        .to_string())
}

fn setup_get(conn: &Connection) -> Result<Value, HandlerErr> {
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let value = load_section(conn, section).map_err(HandlerErr::db_query)?;
        out.insert(section.name().to_string(), value);
    }
    Ok(Value::Object(out))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_admin(params)?;
    let Some(section_raw) = params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing section"));
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section).map_err(HandlerErr::db_query)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tracing::info!(section = section.name(), "setup updated");
    let mut out = json!({ "ok": true });
    out[section.name()] = current;
    Ok(out)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(setup_get) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    match require_conn(state).and_then(|conn| setup_update(conn, &req.params)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
