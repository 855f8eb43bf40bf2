//! A scripted [`Transport`] for tests: canned responses in order, every
//! request recorded, no network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::HeaderName;

use crate::remote::{RemoteRequest, RemoteResponse, Transport, TransportError};

/// Replays queued responses in FIFO order.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RemoteResponse, TransportError>>>,
    seen: Mutex<Vec<RemoteRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: RemoteResponse) -> &Self {
        self.lock_script().push_back(Ok(response));
        self
    }

    pub fn respond(&self, status: u16, body: &str) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(RemoteResponse::new(status, "https://scripted.invalid/", body))
    }

    pub fn respond_json(&self, status: u16, body: &serde_json::Value) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(
            RemoteResponse::new(status, "https://scripted.invalid/", body.to_string())
                .with_header(HeaderName::from_static("content-type"), "application/json"),
        )
    }

    /// Queue a transport failure (no response received).
    pub fn fail(&self, reason: &str) -> &Self {
        self.lock_script().push_back(Err(TransportError(reason.to_string())));
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    /// Responses queued but not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock_script().len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<RemoteResponse, TransportError>>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, TransportError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }

        match self.lock_script().pop_front() {
            Some(Ok(mut response)) => {
                response.url = request.url.clone();
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError(format!("no scripted response for {}", request.url))),
        }
    }
}
