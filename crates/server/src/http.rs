//! The §6.1 HTTP surface. A thin JSON/form layer over the `router` (reads)
//! and `raft` (writes) — the server never touches the engine directly
//! except through the adapters in `adapters.rs`.

use crate::AppState;
use engine::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
use raft::{Command, RaftError};
use serde_json::json;
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, StatusCode};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Rejects an empty or oversized key before it's ever proposed to raft — an
/// empty-key put/delete is a 400-class request error, not the apply-time
/// consistency violation it would otherwise surface as.
fn validate_key(key: &[u8]) -> Result<(), String> {
    if key.is_empty() {
        return Err("key must not be empty".to_string());
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(format!("key too large: {} bytes (max {MAX_KEY_SIZE})", key.len()));
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> Result<(), String> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(format!("value too large: {} bytes (max {MAX_VALUE_SIZE})", value.len()));
    }
    Ok(())
}

pub fn dispatch(state: &AppState, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_path_and_query(&url);

    let result = match (&method, path.as_str()) {
        (Method::Get, "/health") => Ok(json_response(200, &json!({"status": "OK"}))),
        (Method::Get, "/metrics") => Ok(text_response(200, &metrics_body(state))),
        (Method::Put, "/api/string") => handle_put(state, &mut request),
        (Method::Get, "/api/string") => handle_get(state, &query),
        (Method::Delete, "/api") => handle_delete(state, &query),
        (Method::Post, "/api/internal/raft") => handle_internal_raft(state, &mut request),
        _ => Ok(json_response(404, &json!({"status": "error", "message": "unknown route"}))),
    };

    let response = result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "server: handler failed to build a response");
        json_response(500, &json!({"status": "error", "message": e.to_string()}))
    });

    if let Err(e) = request_respond(request, response) {
        tracing::warn!(error = %e, "server: failed to write response");
    }
}

fn split_path_and_query(url: &str) -> (String, String) {
    match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (url.to_string(), String::new()),
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k.as_ref() == name).map(|(_, v)| v.into_owned())
}

fn read_body(request: &mut Request) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    request.as_reader().take(MAX_BODY_BYTES).read_to_end(&mut buf)?;
    Ok(buf)
}

fn json_response(status: u16, body: &serde_json::Value) -> Response<std::io::Cursor<Vec<u8>>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
    Response::from_data(bytes).with_status_code(StatusCode(status)).with_header(header)
}

fn text_response(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let header = Header::from_bytes(&b"Content-Type"[..], &b"text/plain"[..]).unwrap();
    Response::from_data(body.as_bytes().to_vec()).with_status_code(StatusCode(status)).with_header(header)
}

fn redirect_response(location: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let header = Header::from_bytes(&b"Location"[..], location.as_bytes()).unwrap();
    Response::from_data(Vec::new()).with_status_code(StatusCode(307)).with_header(header)
}

/// Translates the raft module's `NotLeader`/leader-hint outcome into
/// either a redirect to the known leader or a 500 if no leader is known
/// yet (spec.md §7: "responded to by a temporary redirect if the leader
/// is known, else a retryable error").
fn leader_redirect_or_error(state: &AppState, leader_hint: Option<String>, path: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    match leader_hint.and_then(|id| state.id_to_public_addr.get(&id).cloned()) {
        Some(addr) => redirect_response(&format!("http://{addr}{path}")),
        None => json_response(503, &json!({"status": "error", "message": "no leader known yet"})),
    }
}

fn handle_put(state: &AppState, request: &mut Request) -> anyhow::Result<Response<std::io::Cursor<Vec<u8>>>> {
    let body = read_body(request)?;
    let form: std::collections::HashMap<String, String> = form_urlencoded::parse(&body).into_owned().collect();
    let (Some(key), Some(value)) = (form.get("key"), form.get("value")) else {
        return Ok(json_response(400, &json!({"status": "error", "message": "missing key or value"})));
    };
    if let Err(message) = validate_key(key.as_bytes()) {
        return Ok(json_response(400, &json!({"status": "error", "message": message})));
    }
    if let Err(message) = validate_value(value.as_bytes()) {
        return Ok(json_response(400, &json!({"status": "error", "message": message})));
    }

    match state.raft.execute(Command::Put { key: key.as_bytes().to_vec(), value: value.as_bytes().to_vec() }) {
        Ok(()) => Ok(json_response(200, &json!({"status": "success"}))),
        Err(RaftError::NotLeader { leader_hint }) => Ok(leader_redirect_or_error(state, leader_hint, "/api/string")),
        Err(e) => Ok(json_response(500, &json!({"status": "error", "message": e.to_string()}))),
    }
}

fn handle_delete(state: &AppState, query: &str) -> anyhow::Result<Response<std::io::Cursor<Vec<u8>>>> {
    let Some(key) = query_param(query, "key") else {
        return Ok(json_response(400, &json!({"status": "error", "message": "missing key"})));
    };
    if let Err(message) = validate_key(key.as_bytes()) {
        return Ok(json_response(400, &json!({"status": "error", "message": message})));
    }

    match state.raft.execute(Command::Delete { key: key.as_bytes().to_vec() }) {
        Ok(()) => Ok(json_response(200, &json!({"status": "success"}))),
        Err(RaftError::NotLeader { leader_hint }) => Ok(leader_redirect_or_error(state, leader_hint, &format!("/api?key={key}"))),
        Err(e) => Ok(json_response(500, &json!({"status": "error", "message": e.to_string()}))),
    }
}

fn handle_get(state: &AppState, query: &str) -> anyhow::Result<Response<std::io::Cursor<Vec<u8>>>> {
    let Some(key) = query_param(query, "key") else {
        return Ok(json_response(400, &json!({"status": "error", "message": "missing key"})));
    };

    match state.router.get(key.as_bytes()) {
        Ok(Some(value)) => Ok(json_response(200, &json!({"status": "success", "value": String::from_utf8_lossy(&value)}))),
        Ok(None) => Ok(json_response(404, &json!({"status": "error", "message": "not found"}))),
        Err(e) => Ok(json_response(500, &json!({"status": "error", "message": e.to_string()}))),
    }
}

fn handle_internal_raft(state: &AppState, request: &mut Request) -> anyhow::Result<Response<std::io::Cursor<Vec<u8>>>> {
    let body = read_body(request)?;
    let envelope: raft::Envelope = serde_json::from_slice(&body)?;
    state.raft.handle(envelope);
    Ok(json_response(200, &json!({"status": "ok"})))
}

fn metrics_body(state: &AppState) -> String {
    format!(
        "engine_seq {}\nengine_sstable_count {}\nengine_memtable_entries {}\nraft_is_leader {}\n",
        state.engine.seq(),
        state.engine.sstable_count(),
        state.engine.memtable_entries(),
        u8::from(state.raft.is_leader()),
    )
}

fn request_respond(request: Request, response: Response<std::io::Cursor<Vec<u8>>>) -> std::io::Result<()> {
    request.respond(response)
}
