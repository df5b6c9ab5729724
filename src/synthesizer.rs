//! Response synthesis.
//!
//! Builds the payload for a matched rule whose simulation proceeded:
//! either a business envelope (2xx/3xx) or a raw HTTP-error body
//! (status >= 400), with field omission applied when configured.

use crate::config::Rule;
use crate::omission;
use crate::rng::Entropy;
use rand::RngCore;
use serde::Serialize;

/// Reference timezone stamped into every envelope.
const TIME_ZONE_ID: &str = "Asia/Shanghai";
const TIME_ZONE_OFFSET_SECS: i32 = 28_800;

/// The synthesized reply for a matched request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Wire shape of a synthesized business response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub err_no: i64,
    pub err_msg: String,
    pub detail_err_msg: String,
    pub result: serde_json::Value,
    pub sync: bool,
    pub time_stamp: i64,
    pub time_zone_id: String,
    pub time_zone_offset: i32,
    pub trace_id: String,
}

/// Build the response for a rule, applying field omission if enabled.
pub fn synthesize(rule: &Rule, entropy: &dyn Entropy) -> SynthesizedResponse {
    let response = &rule.response;

    let body = if response.status >= 400 {
        match &response.error_body {
            Some(body) => body.clone(),
            None => serde_json::json!({
                "error": status_text(response.status),
                "message": format!("HTTP {}", response.status),
            }),
        }
    } else {
        let envelope = ResponseEnvelope {
            err_no: response.err_no,
            err_msg: response.err_msg.clone(),
            detail_err_msg: response.detail_err_msg.clone(),
            result: response.result.clone(),
            sync: true,
            time_stamp: chrono::Utc::now().timestamp_millis(),
            time_zone_id: TIME_ZONE_ID.to_string(),
            time_zone_offset: TIME_ZONE_OFFSET_SECS,
            trace_id: trace_id(entropy),
        };
        // Serialization of a plain struct cannot fail
        serde_json::to_value(envelope).unwrap_or(serde_json::Value::Null)
    };

    // Omission sees the full body; protecting envelope fields requires
    // explicit exclusion
    let body = omission::omit(&body, &rule.field_omit, entropy);

    SynthesizedResponse {
        status: response.status,
        body,
    }
}

/// Best-effort unique trace identifier: short random hex in brackets.
fn trace_id(entropy: &dyn Entropy) -> String {
    let mut rng = entropy.rng();
    let hi = rng.next_u32();
    let lo = rng.next_u32() & 0xFFFF;
    format!("[{:08x}{:04x}]", hi, lo)
}

/// Status text for common codes; unmapped codes read "Unknown".
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
