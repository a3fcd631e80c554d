//! Identification pipeline integration tests
//!
//! Exercise the full request path (fan-out → merge → validation →
//! enrichment → context → generation) against in-process test doubles.

mod helpers;

use flora_id::ensemble::SourceFanout;
use flora_id::generation::{GenerationChain, NO_MATCH_MESSAGE};
use flora_id::config::{ProviderDescriptor, ProviderKind};
use flora_id::pipeline::{PipelineError, CHAT_UNAVAILABLE_MESSAGE};
use flora_id::types::{SourceClient, SourceMatch};
use flora_id::validation::{InMemoryRegistry, RegistryRecord};
use flora_id::IdentificationPipeline;
use helpers::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn registry_with(names: &[&str]) -> Arc<InMemoryRegistry> {
    let records = names
        .iter()
        .map(|name| RegistryRecord {
            scientific_name: name.to_string(),
            common_name: None,
            family: Some("Rosaceae".to_string()),
            symbol: Some("ROCA3".to_string()),
        })
        .collect();
    Arc::new(InMemoryRegistry::from_records(records))
}

fn descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name, ProviderKind::OpenaiCompatible, "http://localhost", "m")
        .with_timeout(Duration::from_millis(200))
}

fn pipeline(sources: Vec<Arc<dyn SourceClient>>, chain: GenerationChain) -> IdentificationPipeline {
    IdentificationPipeline::new(
        Arc::new(test_ensemble_config()),
        SourceFanout::new(sources),
        Arc::new(InMemoryRegistry::default()),
        chain,
    )
}

fn rose_sources() -> Vec<Arc<dyn SourceClient>> {
    vec![
        MockSource::returning(
            "A",
            vec![
                SourceMatch::new("Rosa canina", 0.8),
                SourceMatch::new("Rosa rubiginosa", 0.3),
            ],
        ),
        MockSource::returning(
            "B",
            vec![
                SourceMatch::new("rosa  CANINA", 0.5).with_common_name("Dog rose"),
                SourceMatch::new("Aloe vera", 0.9),
            ],
        ),
    ]
}

#[tokio::test]
async fn test_full_identification_flow() {
    let provider = MockProvider::replying("This is a dog rose.");
    let detail = Arc::new(RecordingDetail::default());

    let pipeline = IdentificationPipeline::new(
        Arc::new(test_ensemble_config()),
        SourceFanout::new(rose_sources()),
        registry_with(&["Rosa canina"]),
        GenerationChain::new().with_provider(descriptor("p1"), provider.clone()),
    )
    .with_detail_client(detail.clone());

    let report = pipeline.identify(&jpeg_bytes(), "").await;

    let names: Vec<_> = report
        .ranked_candidates
        .iter()
        .map(|c| c.canonical_name.as_str())
        .collect();
    assert_eq!(names, vec!["Rosa canina", "Aloe vera", "Rosa rubiginosa"]);
    assert_eq!(report.total_matches, 3);
    assert_eq!(report.generated_text, "This is a dog rose.");
    assert_eq!(report.generated_by, "p1");

    let top = &report.ranked_candidates[0];
    assert!((top.weighted_score() - 0.68).abs() < 1e-9);
    assert!(top.validated);
    assert_eq!(top.registry_symbol.as_deref(), Some("ROCA3"));
    assert_eq!(top.common_name.as_deref(), Some("Dog rose"));
    assert_eq!(top.family.as_deref(), Some("Rosaceae"));
    assert_eq!(top.provenance(), "A+B");
    assert!(top.detail.is_some());
    assert!(!report.ranked_candidates[1].validated);

    assert_eq!(detail.names.lock().unwrap().len(), 3);

    let request = provider.last_request.lock().unwrap().clone().unwrap();
    assert!(request.context.contains("#1 Rosa canina"));
    assert!(request.user_prompt.contains(&request.context));
    assert!((report.highest_confidence() - 0.68).abs() < 1e-9);
}

#[tokio::test]
async fn test_source_summary_counts_candidates_before_exposure_cut() {
    let pipeline = IdentificationPipeline::new(
        Arc::new(test_ensemble_config()),
        SourceFanout::new(rose_sources()),
        registry_with(&["Rosa canina", "Aloe vera"]),
        GenerationChain::new(),
    );

    let report = pipeline.identify(&jpeg_bytes(), "").await;

    assert_eq!(report.sources.count_for("A"), 2);
    assert_eq!(report.sources.count_for("B"), 2);
    assert_eq!(report.sources.count_for("C"), 0);
    assert_eq!(report.sources.validated, 2);
    let order: Vec<_> = report.sources.per_source.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(order, vec!["A", "B"]);
}

#[tokio::test]
async fn test_all_sources_empty_reports_no_match() {
    let provider = MockProvider::replying("should not be used");
    let sources: Vec<Arc<dyn SourceClient>> = vec![
        MockSource::returning("A", vec![]),
        MockSource::returning("B", vec![]),
    ];
    let pipeline = pipeline(
        sources,
        GenerationChain::new().with_provider(descriptor("p1"), provider.clone()),
    );

    let report = pipeline.identify(&jpeg_bytes(), "what is this").await;

    assert!(report.ranked_candidates.is_empty());
    assert_eq!(report.total_matches, 0);
    assert_eq!(report.generated_text, NO_MATCH_MESSAGE);
    assert_eq!(report.generated_by, "template");
    assert_eq!(report.highest_confidence(), 0.0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_no_sources_registered_reports_no_match() {
    let report = pipeline(Vec::new(), GenerationChain::new())
        .identify(&jpeg_bytes(), "")
        .await;
    assert_eq!(report.generated_text, NO_MATCH_MESSAGE);
}

#[tokio::test]
async fn test_source_failure_equals_empty_source() {
    let b_matches = vec![SourceMatch::new("Aloe vera", 0.9), SourceMatch::new("Agave americana", 0.4)];

    let failing: Vec<Arc<dyn SourceClient>> = vec![
        MockSource::failing("A"),
        MockSource::returning("B", b_matches.clone()),
    ];
    let empty: Vec<Arc<dyn SourceClient>> = vec![
        MockSource::returning("A", vec![]),
        MockSource::returning("B", b_matches),
    ];

    let with_failure = pipeline(failing, GenerationChain::new())
        .identify(&jpeg_bytes(), "")
        .await;
    let with_empty = pipeline(empty, GenerationChain::new())
        .identify(&jpeg_bytes(), "")
        .await;

    assert_eq!(with_failure.ranked_candidates, with_empty.ranked_candidates);
    assert_eq!(with_failure.generated_text, with_empty.generated_text);
    assert_eq!(with_failure.total_matches, 2);
}

#[tokio::test]
async fn test_hanging_source_bounded_by_timeout() {
    let sources: Vec<Arc<dyn SourceClient>> = vec![
        MockSource::hanging("A"),
        MockSource::returning("B", vec![SourceMatch::new("Aloe vera", 0.9)]),
    ];

    let started = Instant::now();
    let report = pipeline(sources, GenerationChain::new())
        .identify(&jpeg_bytes(), "")
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.total_matches, 1);
    assert_eq!(report.ranked_candidates[0].canonical_name, "Aloe vera");
    assert_eq!(report.ranked_candidates[0].provenance(), "B");
}

#[tokio::test]
async fn test_provider_chain_short_circuits() {
    let p1 = MockProvider::failing();
    let p2 = MockProvider::replying("second answers");
    let p3 = MockProvider::replying("third never asked");

    let chain = GenerationChain::new()
        .with_provider(descriptor("p1"), p1.clone())
        .with_provider(descriptor("p2"), p2.clone())
        .with_provider(descriptor("p3"), p3.clone());

    let report = pipeline(rose_sources(), chain).identify(&jpeg_bytes(), "").await;

    assert_eq!(report.generated_text, "second answers");
    assert_eq!(report.generated_by, "p2");
    assert_eq!(p1.calls(), 1);
    assert_eq!(p2.calls(), 1);
    assert_eq!(p3.calls(), 0);
}

#[tokio::test]
async fn test_all_providers_fail_uses_template_from_context() {
    let chain = GenerationChain::new()
        .with_provider(descriptor("p1"), MockProvider::failing())
        .with_provider(descriptor("p2"), MockProvider::failing());

    let report = pipeline(rose_sources(), chain).identify(&jpeg_bytes(), "").await;

    assert_eq!(report.generated_by, "template");
    assert!(report.generated_text.contains("#1 Rosa canina"));
    assert!(report.generated_text.contains("#2 Aloe vera"));
}

#[tokio::test]
async fn test_exposure_cut_keeps_total() {
    let matches = ["Acer campestre", "Betula pendula", "Carpinus betulus", "Fagus sylvatica", "Quercus robur"]
        .iter()
        .enumerate()
        .map(|(i, name)| SourceMatch::new(*name, 0.9 - i as f64 * 0.1))
        .collect();
    let sources: Vec<Arc<dyn SourceClient>> = vec![MockSource::returning("A", matches)];

    let report = pipeline(sources, GenerationChain::new()).identify(&jpeg_bytes(), "").await;

    assert_eq!(report.total_matches, 5);
    assert_eq!(report.ranked_candidates.len(), 3);
    assert_eq!(report.ranked_candidates[0].canonical_name, "Acer campestre");
    assert!(!report.generated_text.contains("Fagus sylvatica"));
}

#[tokio::test]
async fn test_enrichment_bounded_to_top_k() {
    let a: Vec<_> = (0..5).map(|i| SourceMatch::new(format!("Genus a{}", i), 0.5)).collect();
    let b: Vec<_> = (0..5).map(|i| SourceMatch::new(format!("Genus b{}", i), 0.5)).collect();
    let sources: Vec<Arc<dyn SourceClient>> =
        vec![MockSource::returning("A", a), MockSource::returning("B", b)];
    let detail = Arc::new(RecordingDetail::default());

    let pipeline = pipeline(sources, GenerationChain::new()).with_detail_client(detail.clone());
    let report = pipeline.identify(&jpeg_bytes(), "").await;

    assert_eq!(report.total_matches, 10);
    assert_eq!(detail.names.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_question_reaches_provider() {
    let provider = MockProvider::replying("Yes, the hips are edible.");
    let chain = GenerationChain::new().with_provider(descriptor("p1"), provider.clone());

    pipeline(rose_sources(), chain)
        .identify(&jpeg_bytes(), "Are the hips edible?")
        .await;

    let request = provider.last_request.lock().unwrap().clone().unwrap();
    assert!(request.user_prompt.contains("Are the hips edible?"));
}

#[tokio::test]
async fn test_identical_requests_identical_reports() {
    let pipeline = pipeline(rose_sources(), GenerationChain::new());
    let first = pipeline.identify(&jpeg_bytes(), "").await;
    let second = pipeline.identify(&jpeg_bytes(), "").await;

    assert_eq!(first.ranked_candidates, second.ranked_candidates);
    assert_eq!(first.generated_text, second.generated_text);
}

#[tokio::test]
async fn test_cancellation_abandons_request() {
    let sources: Vec<Arc<dyn SourceClient>> = vec![MockSource::hanging("A")];
    let pipeline = IdentificationPipeline::new(
        Arc::new(flora_id::config::EnsembleConfig {
            source_timeout: Duration::from_secs(30),
            ..test_ensemble_config()
        }),
        SourceFanout::new(sources),
        Arc::new(InMemoryRegistry::default()),
        GenerationChain::new(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = pipeline.identify_with_cancel(&jpeg_bytes(), "", cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_chat_without_providers() {
    let reply = pipeline(Vec::new(), GenerationChain::new()).chat("How do I repot a fern?").await;
    assert_eq!(reply.text, CHAT_UNAVAILABLE_MESSAGE);
    assert_eq!(reply.generated_by, "template");
}

#[tokio::test]
async fn test_chat_uses_provider_without_context() {
    let provider = MockProvider::replying("Repot in spring.");
    let chain = GenerationChain::new().with_provider(descriptor("p1"), provider.clone());

    let reply = pipeline(Vec::new(), chain).chat("How do I repot a fern?").await;

    assert_eq!(reply.text, "Repot in spring.");
    assert_eq!(reply.generated_by, "p1");
    let request = provider.last_request.lock().unwrap().clone().unwrap();
    assert!(request.context.is_empty());
}
