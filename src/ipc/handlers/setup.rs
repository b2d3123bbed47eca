use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::GradeBands;
use crate::upload::HeaderMode;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    BulkUpload,
    Grading,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "bulkUpload" => Some(Self::BulkUpload),
            "grading" => Some(Self::Grading),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::BulkUpload => "setup.bulkUpload",
            Self::Grading => "setup.grading",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::BulkUpload => json!({
            "headerMode": "positional",
            "defaultActor": null,
            "processingDelayMs": null
        }),
        SetupSection::Grading => json!({
            "aPlus": 90.0,
            "a": 80.0,
            "b": 70.0,
            "c": 60.0
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
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

fn parse_percent(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=100.0).contains(&n) {
        return Err(format!("{} must be in 0..=100", key));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::BulkUpload => match k.as_str() {
                "headerMode" => {
                    let raw = parse_string_max(v, k, 16)?;
                    let Some(mode) = HeaderMode::parse(&raw) else {
                        return Err("headerMode must be one of: positional, detect".into());
                    };
                    obj.insert(k.clone(), Value::String(mode.as_str().to_string()));
                }
                "defaultActor" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 120)?);
                }
                "processingDelayMs" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 10_000)?));
                    }
                }
                _ => return Err(format!("unknown bulkUpload field: {}", k)),
            },
            SetupSection::Grading => match k.as_str() {
                "aPlus" | "a" | "b" | "c" => {
                    obj.insert(k.clone(), Value::from(parse_percent(v, k)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
        }
    }
    if let SetupSection::Grading = section {
        let bands = GradeBands::from_json(current);
        if !(bands.a_plus >= bands.a && bands.a >= bands.b && bands.b >= bands.c) {
            return Err("grade thresholds must be non-increasing: aPlus >= a >= b >= c".into());
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkUploadSettings {
    pub header_mode: HeaderMode,
    pub default_actor: Option<String>,
    pub processing_delay_ms: Option<u64>,
}

pub fn bulk_upload_settings(conn: &rusqlite::Connection) -> anyhow::Result<BulkUploadSettings> {
    let v = load_section(conn, SetupSection::BulkUpload)?;
    Ok(BulkUploadSettings {
        header_mode: v
            .get("headerMode")
            .and_then(|m| m.as_str())
            .and_then(HeaderMode::parse)
            .unwrap_or_default(),
        default_actor: v
            .get("defaultActor")
            .and_then(|a| a.as_str())
            .map(str::to_string),
        processing_delay_ms: v.get("processingDelayMs").and_then(|d| d.as_u64()),
    })
}

pub fn grade_bands(conn: &rusqlite::Connection) -> anyhow::Result<GradeBands> {
    let v = load_section(conn, SetupSection::Grading)?;
    Ok(GradeBands::from_json(&v))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let bulk_upload = match load_section(conn, SetupSection::BulkUpload) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grading = match load_section(conn, SetupSection::Grading) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "bulkUpload": bulk_upload,
            "grading": grading
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
