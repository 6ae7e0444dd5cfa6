// src/ingest/providers/scripted.rs
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::ingest::error::PageError;
use crate::ingest::types::{PageRequest, PageSource, RawPage};

/// Replays a fixed script of page responses in order, whatever the requested offset.
/// Once the script runs out every request gets an empty page.
/// Lets the fetcher and the HTTP surface run without a network.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<RawPage, PageError>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<RawPage, PageError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_pages(pages: Vec<Vec<serde_json::Value>>) -> Self {
        Self::new(pages.into_iter().map(|p| Ok(RawPage::from_values(p))).collect())
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, req: &PageRequest) -> Result<RawPage, PageError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(RawPage::default()))
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}
