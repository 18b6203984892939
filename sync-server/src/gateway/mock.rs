//! Scripted gateway double for tests.
//!
//! Endpoints are stubbed with either a fixed response or an ordered queue of
//! one-shot responses (queued responses win). Every call is recorded so tests
//! can assert on call counts and parameters.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{empty_result, ApiMethod, ErpGateway, RemoteFile};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: ApiMethod,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
pub struct MockGateway {
    fixed: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Value>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `value` on every call to `endpoint`.
    pub fn stub(&self, endpoint: &str, value: Value) {
        self.fixed
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), value);
    }

    /// Queue a one-shot response for `endpoint`; consumed in FIFO order
    /// before any fixed stub.
    pub fn push(&self, endpoint: &str, value: Value) {
        self.queued
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(value);
    }

    /// Register a downloadable file by remote name.
    pub fn add_file(&self, name: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .collect()
    }
}

#[async_trait]
impl ErpGateway for MockGateway {
    async fn call(&self, method: ApiMethod, endpoint: &str, params: &[(String, String)]) -> Value {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            endpoint: endpoint.to_string(),
            params: params.to_vec(),
        });

        if let Some(queue) = self.queued.lock().unwrap().get_mut(endpoint)
            && let Some(value) = queue.pop_front()
        {
            return value;
        }
        self.fixed
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(empty_result)
    }

    fn file_url(&self, name: &str) -> String {
        format!("mock://files/{}", name.trim())
    }

    async fn fetch_file(&self, name: &str) -> Option<RemoteFile> {
        let bytes = self.files.lock().unwrap().get(name).cloned()?;
        let content_type = mime_guess::from_path(name).first().map(|m| m.to_string());
        Some(RemoteFile {
            bytes,
            content_type,
        })
    }
}
