//! HAR capture filter for the listing API.
//!
//! A browser HAR of a bachhoaxanh.com session holds the exact
//! `Category/AjaxProduct` calls with live headers and payloads. This
//! pulls the beer ones out into a readable report, which is where the
//! payload constants in [`crate::fetcher`] come from.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

const API_PATH_MARKER: &str = "Category/AjaxProduct";

pub fn load_har(path: &Path) -> Result<Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading HAR {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing HAR {}", path.display()))
}

/// True when the entry is a listing API call for `category_id`.
pub fn is_beer_request(entry: &Value, category_id: u32) -> bool {
    let request = &entry["request"];
    let url = request["url"].as_str().unwrap_or("");
    if !url.contains(API_PATH_MARKER) {
        return false;
    }

    let body = request["postData"]["text"].as_str().unwrap_or("");
    if body.is_empty() {
        return false;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if parsed["CategoryId"] == category_id {
            return true;
        }
    }
    // Form-encoded payloads keep the id as a raw substring.
    body.contains(&format!("\"CategoryId\":{category_id}"))
        || body.contains(&format!("CategoryId={category_id}"))
}

/// Filters the HAR down to the listing calls for `category_id`.
pub fn beer_entries(har: &Value, category_id: u32) -> Vec<&Value> {
    har["log"]["entries"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| is_beer_request(entry, category_id))
                .collect()
        })
        .unwrap_or_default()
}

/// HAR headers come as `[{name, value}]` rows; a map reads better.
fn header_map(list: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(rows) = list.as_array() {
        for row in rows {
            if let (Some(name), Some(value)) = (row["name"].as_str(), row["value"].as_str()) {
                map.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }
    map
}

fn export_entry(entry: &Value) -> Value {
    let request = &entry["request"];
    let response = &entry["response"];
    json!({
        "url": request["url"],
        "method": request["method"],
        "request_headers": header_map(&request["headers"]),
        "request_body": request["postData"]["text"],
        "response_status": response["status"],
        "response_status_text": response["statusText"],
        "response_headers": header_map(&response["headers"]),
        "response_body": response["content"]["text"],
    })
}

/// Writes each matched call as a numbered pretty-JSON block.
pub fn write_report(path: &Path, entries: &[&Value]) -> Result<()> {
    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate() {
        let block = serde_json::to_string_pretty(&export_entry(entry))?;
        out.push_str(&format!("===== BIA REQUEST #{} =====\n", index + 1));
        out.push_str(&block);
        out.push_str("\n\n----------------------------------------\n\n");
    }
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_har() -> Value {
        json!({
            "log": {
                "version": "1.2",
                "entries": [
                    {
                        "request": {
                            "method": "POST",
                            "url": "https://apibhx.tgdd.vn/Category/AjaxProduct",
                            "headers": [
                                { "name": "xapikey", "value": "bhx-api-core-2022" },
                                { "name": "platform", "value": "webnew" }
                            ],
                            "postData": {
                                "mimeType": "application/json;charset=UTF-8",
                                "text": "{\"provinceId\":1027,\"CategoryId\":2282,\"PageIndex\":1,\"PageSize\":10}"
                            }
                        },
                        "response": {
                            "status": 200,
                            "statusText": "OK",
                            "headers": [
                                { "name": "content-type", "value": "application/json" }
                            ],
                            "content": { "text": "{\"code\":0,\"data\":{\"total\":87}}" }
                        }
                    },
                    {
                        "request": {
                            "method": "POST",
                            "url": "https://apibhx.tgdd.vn/Category/AjaxProduct",
                            "headers": [],
                            "postData": { "text": "{\"CategoryId\":3050,\"PageIndex\":1}" }
                        },
                        "response": {
                            "status": 200,
                            "statusText": "OK",
                            "headers": [],
                            "content": {}
                        }
                    },
                    {
                        "request": {
                            "method": "GET",
                            "url": "https://www.bachhoaxanh.com/bia",
                            "headers": []
                        },
                        "response": {
                            "status": 200,
                            "statusText": "OK",
                            "headers": [],
                            "content": {}
                        }
                    }
                ]
            }
        })
    }

    #[test]
    fn only_matching_category_calls_survive() {
        let har = sample_har();
        assert_eq!(beer_entries(&har, 2282).len(), 1);
        assert_eq!(beer_entries(&har, 3050).len(), 1);
        assert!(beer_entries(&har, 9999).is_empty());
    }

    #[test]
    fn raw_body_fallback_matches_form_payloads() {
        let entry = json!({
            "request": {
                "url": "https://apibhx.tgdd.vn/Category/AjaxProduct",
                "postData": { "text": "CategoryId=2282&PageIndex=4" }
            }
        });
        assert!(is_beer_request(&entry, 2282));
        assert!(!is_beer_request(&entry, 2283));

        let empty_body = json!({
            "request": {
                "url": "https://apibhx.tgdd.vn/Category/AjaxProduct",
                "postData": { "text": "" }
            }
        });
        assert!(!is_beer_request(&empty_body, 2282));
    }

    #[test]
    fn report_blocks_carry_the_flattened_call() {
        let har = sample_har();
        let matched = beer_entries(&har, 2282);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bhx_bia_api.txt");
        write_report(&path, &matched).unwrap();

        let report = fs::read_to_string(&path).unwrap();
        assert!(report.starts_with("===== BIA REQUEST #1 =====\n"));
        assert!(report.contains("----------------------------------------"));

        let block = report
            .lines()
            .skip(1)
            .take_while(|line| !line.starts_with("-----"))
            .collect::<Vec<_>>()
            .join("\n");
        let parsed: Value = serde_json::from_str(block.trim()).unwrap();
        assert_eq!(parsed["url"], "https://apibhx.tgdd.vn/Category/AjaxProduct");
        assert_eq!(parsed["method"], "POST");
        assert_eq!(parsed["request_headers"]["xapikey"], "bhx-api-core-2022");
        assert_eq!(parsed["response_status"], 200);
        assert_eq!(parsed["response_body"], "{\"code\":0,\"data\":{\"total\":87}}");
    }
}
