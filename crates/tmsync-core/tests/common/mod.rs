//! In-memory stand-in for the remote service.
//!
//! Serves the endpoints the handlers use from plain JSON records, logs every
//! request and can be told to fail chosen endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tmsync_core::handlers::Handlers;
use tmsync_core::{ApiResponse, Transport};

pub const SINGLE_SUITE: i64 = 1;
pub const MULTIPLE_SUITES: i64 = 3;

pub const AUTOMATION_FIELD: &str = "custom_automation_id";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub uri: String,
    pub body: Option<Value>,
}

impl Call {
    /// Endpoint name, e.g. `add_case` for `add_case/7`.
    pub fn action(&self) -> &str {
        split_uri(&self.uri).0
    }
}

#[derive(Default)]
struct State {
    next_id: i64,
    projects: Vec<Value>,
    suites: Vec<Value>,
    sections: Vec<Value>,
    cases: Vec<Value>,
    runs: Vec<Value>,
    tests: Vec<Value>,
    results: Vec<Value>,
    calls: Vec<Call>,
    counts: HashMap<String, usize>,
    /// Endpoint to the call number that fails, `None` for every call.
    failures: HashMap<String, Option<usize>>,
    page_size: Option<usize>,
    /// Endpoint to the field whose echo is changed.
    mangled: HashMap<String, String>,
    /// Endpoint and call number that raise the interrupt and never answer.
    interrupt: Option<(String, usize, watch::Sender<bool>)>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Fake service; clones share the same state.
#[derive(Clone, Default)]
pub struct FakeService {
    state: Arc<Mutex<State>>,
}

impl FakeService {
    pub fn new() -> Self {
        let service = Self::default();
        service.lock().next_id = 1000;
        service
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn handlers(&self) -> Handlers {
        Handlers::remote(Arc::new(self.clone()), false)
    }

    /// Handlers that verify the echo of created entities.
    pub fn verifying_handlers(&self) -> Handlers {
        Handlers::remote(Arc::new(self.clone()), true)
    }

    pub fn with_project(self, id: i64, name: &str, suite_mode: i64) -> Self {
        self.lock()
            .projects
            .push(json!({"id": id, "name": name, "suite_mode": suite_mode}));
        self
    }

    pub fn with_suite(self, project_id: i64, id: i64, name: &str) -> Self {
        self.lock()
            .suites
            .push(json!({"id": id, "name": name, "project_id": project_id}));
        self
    }

    pub fn with_section(self, suite_id: i64, id: i64, name: &str, parent_id: Option<i64>) -> Self {
        self.lock().sections.push(
            json!({"id": id, "name": name, "suite_id": suite_id, "parent_id": parent_id}),
        );
        self
    }

    pub fn with_case(self, suite_id: i64, section_id: i64, id: i64, title: &str, automation_id: Option<&str>) -> Self {
        let mut case = json!({"id": id, "title": title, "suite_id": suite_id, "section_id": section_id});
        if let Some(automation_id) = automation_id {
            case[AUTOMATION_FIELD] = json!(automation_id);
        }
        self.lock().cases.push(case);
        self
    }

    pub fn with_run(self, id: i64, suite_id: i64, description: &str, case_ids: &[i64]) -> Self {
        {
            let mut state = self.lock();
            state.runs.push(json!({
                "id": id,
                "name": "Existing run",
                "description": description,
                "suite_id": suite_id,
                "plan_id": null,
                "config_ids": [],
            }));
            for case_id in case_ids {
                let test_id = state.id();
                state.tests.push(json!({"id": test_id, "case_id": case_id, "run_id": id}));
            }
        }
        self
    }

    /// Serve list endpoints in pages of `size` records.
    pub fn with_page_size(self, size: usize) -> Self {
        self.lock().page_size = Some(size);
        self
    }

    /// Store what `action` creates as sent, but echo `field` as "mangled".
    pub fn mangle_echo(&self, action: &str, field: &str) {
        self.lock().mangled.insert(action.to_string(), field.to_string());
    }

    /// Raise the returned interrupt on the `n`-th POST to `action`, which then never completes.
    pub fn interrupt_on(&self, action: &str, n: usize) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock().interrupt = Some((action.to_string(), n, tx));
        rx
    }

    /// Fail every call to `action`.
    pub fn fail_on(&self, action: &str) {
        self.lock().failures.insert(action.to_string(), None);
    }

    /// Fail only the `n`-th call (1-based) to `action`.
    pub fn fail_nth(&self, action: &str, n: usize) {
        self.lock().failures.insert(action.to_string(), Some(n));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// URIs of the POST requests, in order.
    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "POST")
            .map(|c| c.uri)
            .collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.calls().iter().filter(|c| c.action() == action).count()
    }

    pub fn last_body(&self, action: &str) -> Option<Value> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.action() == action)
            .and_then(|c| c.body)
    }

    pub fn suites(&self) -> Vec<Value> {
        self.lock().suites.clone()
    }

    pub fn sections(&self) -> Vec<Value> {
        self.lock().sections.clone()
    }

    pub fn cases(&self) -> Vec<Value> {
        self.lock().cases.clone()
    }

    pub fn runs(&self) -> Vec<Value> {
        self.lock().runs.clone()
    }

    fn handle(&self, method: &'static str, uri: &str, body: Option<&Value>) -> ApiResponse {
        let mut response = self.serve(method, uri, body);
        let (action, _, _) = split_uri(uri);
        if let Some(field) = self.lock().mangled.get(action) {
            if response.is_success() {
                response.body[field.as_str()] = json!("mangled");
            }
        }
        response
    }

    /// Whether this POST to `uri` is the one that raises the interrupt.
    fn interrupts(&self, uri: &str) -> bool {
        let state = self.lock();
        let Some((action, n, tx)) = &state.interrupt else {
            return false;
        };
        let (called, _, _) = split_uri(uri);
        let earlier = state.calls.iter().filter(|c| c.action() == called).count();
        if called == action.as_str() && earlier + 1 == *n {
            let _ = tx.send(true);
            return true;
        }
        false
    }

    fn serve(&self, method: &'static str, uri: &str, body: Option<&Value>) -> ApiResponse {
        let mut state = self.lock();
        state.calls.push(Call {
            method,
            uri: uri.to_string(),
            body: body.cloned(),
        });

        let (action, target, query) = split_uri(uri);
        let n = {
            let count = state.counts.entry(action.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(when) = state.failures.get(action) {
            if when.map_or(true, |nth| nth == n) {
                return ApiResponse::failed(400, format!("Injected failure for {action}"));
            }
        }

        let id: i64 = target.parse().unwrap_or_default();
        let body = body.cloned().unwrap_or(Value::Null);
        match action {
            "get_projects" => list(&state, "projects", state.projects.clone(), uri, &query),
            "get_case_fields" => ApiResponse::ok(
                200,
                json!([{"system_name": AUTOMATION_FIELD, "is_active": true, "configs": []}]),
            ),
            "get_suites" => {
                let suites = filter(&state.suites, "project_id", id);
                ApiResponse::ok(200, Value::Array(suites))
            }
            "add_suite" => {
                let suite_id = state.id();
                let mut suite = body;
                suite["id"] = json!(suite_id);
                suite["project_id"] = json!(id);
                state.suites.push(suite.clone());
                ApiResponse::ok(200, suite)
            }
            "delete_suite" => {
                state.suites.retain(|s| s["id"] != json!(id));
                ApiResponse::ok(200, Value::Null)
            }
            "get_sections" => {
                let suite_id = param(&query, "suite_id");
                let sections = filter(&state.sections, "suite_id", suite_id);
                list(&state, "sections", sections, uri, &query)
            }
            "add_section" => {
                let section_id = state.id();
                let mut section = body;
                section["id"] = json!(section_id);
                if section.get("parent_id").is_none() {
                    section["parent_id"] = Value::Null;
                }
                state.sections.push(section.clone());
                ApiResponse::ok(200, section)
            }
            "delete_section" => {
                state.sections.retain(|s| s["id"] != json!(id));
                ApiResponse::ok(200, Value::Null)
            }
            "get_cases" => {
                let suite_id = param(&query, "suite_id");
                let cases = filter(&state.cases, "suite_id", suite_id);
                list(&state, "cases", cases, uri, &query)
            }
            "get_case" => match state.cases.iter().find(|c| c["id"] == json!(id)) {
                Some(case) => ApiResponse::ok(200, case.clone()),
                None => ApiResponse::failed(400, "Field :case_id is not a valid test case."),
            },
            "add_case" => {
                let suite_id = state
                    .sections
                    .iter()
                    .find(|s| s["id"] == json!(id))
                    .map(|s| s["suite_id"].clone());
                let Some(suite_id) = suite_id else {
                    return ApiResponse::failed(400, "Field :section_id is not a valid section.");
                };
                let case_id = state.id();
                let mut case = body;
                case["id"] = json!(case_id);
                case["section_id"] = json!(id);
                case["suite_id"] = suite_id;
                state.cases.push(case.clone());
                ApiResponse::ok(200, case)
            }
            "update_case" => match state.cases.iter_mut().find(|c| c["id"] == json!(id)) {
                Some(case) => {
                    if let (Some(case), Value::Object(fields)) = (case.as_object_mut(), body) {
                        case.extend(fields);
                    }
                    ApiResponse::ok(200, case.clone())
                }
                None => ApiResponse::failed(400, "Field :case_id is not a valid test case."),
            },
            "delete_cases" => {
                let ids = body["case_ids"].as_array().cloned().unwrap_or_default();
                state.cases.retain(|c| !ids.contains(&c["id"]));
                ApiResponse::ok(200, Value::Null)
            }
            "add_run" => {
                let run_id = state.id();
                let mut run = body.clone();
                run["id"] = json!(run_id);
                run["plan_id"] = Value::Null;
                run["config_ids"] = json!([]);
                state.runs.push(run.clone());
                let case_ids = body["case_ids"].as_array().cloned().unwrap_or_default();
                for case_id in case_ids {
                    let test_id = state.id();
                    state
                        .tests
                        .push(json!({"id": test_id, "case_id": case_id, "run_id": run_id}));
                }
                ApiResponse::ok(200, run)
            }
            "get_run" => match state.runs.iter().find(|r| r["id"] == json!(id)) {
                Some(run) => ApiResponse::ok(200, run.clone()),
                None => ApiResponse::failed(400, "Field :run_id is not a valid test run."),
            },
            "update_run" => {
                let existing: Vec<i64> = state
                    .tests
                    .iter()
                    .filter(|t| t["run_id"] == json!(id))
                    .filter_map(|t| t["case_id"].as_i64())
                    .collect();
                let case_ids = body["case_ids"].as_array().cloned().unwrap_or_default();
                for case_id in case_ids.iter().filter_map(Value::as_i64) {
                    if !existing.contains(&case_id) {
                        let test_id = state.id();
                        state.tests.push(json!({"id": test_id, "case_id": case_id, "run_id": id}));
                    }
                }
                ApiResponse::ok(200, body)
            }
            "close_run" => ApiResponse::ok(200, json!({"id": id, "is_completed": true})),
            "delete_run" => {
                state.runs.retain(|r| r["id"] != json!(id));
                state.tests.retain(|t| t["run_id"] != json!(id));
                ApiResponse::ok(200, Value::Null)
            }
            "get_tests" => {
                let tests = filter(&state.tests, "run_id", id);
                list(&state, "tests", tests, uri, &query)
            }
            "add_results_for_cases" => {
                let mut created = Vec::new();
                for result in body["results"].as_array().cloned().unwrap_or_default() {
                    let test_id = state
                        .tests
                        .iter()
                        .find(|t| t["run_id"] == json!(id) && t["case_id"] == result["case_id"])
                        .map(|t| t["id"].clone());
                    let Some(test_id) = test_id else {
                        return ApiResponse::failed(400, "Case is not part of the run.");
                    };
                    let result_id = state.id();
                    let stored = json!({"id": result_id, "test_id": test_id, "status_id": result["status_id"]});
                    state.results.push(stored.clone());
                    created.push(stored);
                }
                ApiResponse::ok(200, Value::Array(created))
            }
            "add_attachment_to_result" => ApiResponse::ok(200, json!({"attachment_id": id})),
            other => ApiResponse::failed(400, format!("Unknown method '{other}'")),
        }
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn get(&self, uri: &str) -> ApiResponse {
        self.handle("GET", uri, None)
    }

    async fn post(&self, uri: &str, body: &Value) -> ApiResponse {
        if self.interrupts(uri) {
            std::future::pending::<()>().await;
        }
        self.handle("POST", uri, Some(body))
    }

    async fn post_file(&self, uri: &str, path: &Path) -> ApiResponse {
        self.handle("POST", uri, Some(&json!({"file": path.display().to_string()})))
    }
}

/// Split `get_cases/1&suite_id=2` into `("get_cases", "1", [("suite_id", "2")])`.
fn split_uri(uri: &str) -> (&str, &str, Vec<(String, String)>) {
    let (path, query) = uri.split_once('&').unwrap_or((uri, ""));
    let (action, target) = path.split_once('/').unwrap_or((path, ""));
    let query = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (action, target, query)
}

fn param(query: &[(String, String)], name: &str) -> i64 {
    query
        .iter()
        .find(|(k, _)| k == name)
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or_default()
}

fn filter(records: &[Value], key: &str, id: i64) -> Vec<Value> {
    records.iter().filter(|r| r[key] == json!(id)).cloned().collect()
}

/// A bare array, or one page object with a `next` link when paging is on.
fn list(state: &State, key: &str, records: Vec<Value>, uri: &str, query: &[(String, String)]) -> ApiResponse {
    let Some(size) = state.page_size else {
        return ApiResponse::ok(200, Value::Array(records));
    };
    let offset = param(query, "offset") as usize;
    let page: Vec<Value> = records.iter().skip(offset).take(size).cloned().collect();
    let next = if offset + size < records.len() {
        let base = uri.split("&limit=").next().unwrap_or(uri);
        Value::String(format!("/api/v2/{base}&limit={size}&offset={}", offset + size))
    } else {
        Value::Null
    };
    let mut body = json!({"offset": offset, "limit": size, "size": page.len(), "_links": {"next": next}});
    body[key] = Value::Array(page);
    ApiResponse::ok(200, body)
}

/// Prompt that records every question and gives a fixed answer.
#[derive(Default)]
pub struct RecordingPrompt {
    pub answer: bool,
    pub questions: Mutex<Vec<String>>,
}

impl RecordingPrompt {
    pub fn answering(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            questions: Mutex::new(Vec::new()),
        })
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl tmsync_core::Prompt for RecordingPrompt {
    fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.answer
    }
}
