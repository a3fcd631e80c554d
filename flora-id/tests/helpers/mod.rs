//! Shared test doubles for flora-id integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flora_id::config::{EnsembleConfig, SourceWeight};
use flora_id::types::{
    DetailClient, EnrichmentError, GenerationError, GenerationProvider, GenerationRequest,
    PlantDetail, SourceClient, SourceError, SourceMatch,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Two sources "A" (0.6) and "B" (0.4) with short timeouts
pub fn test_ensemble_config() -> EnsembleConfig {
    EnsembleConfig {
        sources: vec![SourceWeight::new("A", 0.6), SourceWeight::new("B", 0.4)],
        source_timeout: Duration::from_millis(200),
        enrichment_timeout: Duration::from_millis(200),
        ..EnsembleConfig::default()
    }
}

/// Source with a scripted reply
pub struct MockSource {
    id: String,
    reply: Result<Vec<SourceMatch>, String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl MockSource {
    pub fn returning(id: &str, matches: Vec<SourceMatch>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            reply: Ok(matches),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            reply: Err("503 Service Unavailable".to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            reply: Ok(vec![SourceMatch::new("Never returned", 1.0)]),
            delay: Some(Duration::from_secs(30)),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn identify(&self, _image: &[u8], _top_k: usize) -> Result<Vec<SourceMatch>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(SourceError::Api)
    }
}

/// Detail client recording every looked-up name
#[derive(Default)]
pub struct RecordingDetail {
    pub names: Mutex<Vec<String>>,
}

#[async_trait]
impl DetailClient for RecordingDetail {
    async fn fetch_detail(&self, canonical_name: &str) -> Result<PlantDetail, EnrichmentError> {
        self.names.lock().unwrap().push(canonical_name.to_string());
        Ok(PlantDetail {
            description: Some(format!("{} is a flowering plant.", canonical_name)),
            common_names: vec![format!("{} common", canonical_name)],
            ..PlantDetail::default()
        })
    }
}

/// Generation provider with a scripted reply
pub struct MockProvider {
    reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<GenerationRequest>>,
}

impl MockProvider {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err("HTTP 500".to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.reply.clone().map_err(GenerationError::Api)
    }
}

/// Smallest byte sequence `infer` recognizes as a JPEG
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]
}
