//! End-to-end tests for the answer pipeline.

#[cfg(test)]
mod tests {
    use crate::events::{names, CollectingEventSink};
    use crate::pipeline::{
        AnswerPipeline, AnswerTier, AskConfig, DocumentBatch, Embedder, FallbackChain, InMemoryVectorStore,
        JitterStrategy, LlmBackend, PageStage, PipelineConfig, RetryConfig, VectorStore,
    };
    use crate::ranking::RankedResult;
    use crate::testing::{
        fixtures, HashEmbedder, MockLlm, MockPageFetcher, MockSearchEngine, ScriptedTransport, StaticProxySource,
    };
    use crate::websearch::{
        FetchAgent, FetchConfig, GoogleSearch, HttpResponse, ProxyProfile, ProxySource, SearchConfig,
        SearchResultItem,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const QUESTION: &str = "Ai chế tạo ra bom nguyên tử?";
    const HOC247: &str = "https://www.hoc247.net/hoi-dap/cha-de-bom-nguyen-tu";
    const WIKI: &str = "https://vi.wikipedia.org/wiki/Bom_nguyên_tử";

    fn hoc247_result() -> SearchResultItem {
        SearchResultItem::new(
            "Ai là cha đẻ của bom nguyên tử?",
            HOC247,
            "Robert Oppenheimer được coi là cha đẻ của bom nguyên tử",
        )
    }

    fn wiki_result() -> SearchResultItem {
        SearchResultItem::new(
            "Bom nguyên tử – Wikipedia tiếng Việt",
            WIKI,
            "Bom nguyên tử là loại vũ khí hạt nhân, nhà vật lý Robert Oppenheimer",
        )
    }

    fn config_with(pipeline: PipelineConfig) -> AskConfig {
        AskConfig {
            pipeline,
            ..AskConfig::default()
        }
    }

    fn chain(llm: &Arc<MockLlm>) -> Arc<FallbackChain> {
        Arc::new(FallbackChain::new(vec![Arc::clone(llm) as Arc<dyn LlmBackend>]))
    }

    #[tokio::test]
    async fn test_crawl_answers_from_article() {
        let search = Arc::new(MockSearchEngine::new(vec![hoc247_result()]));
        let fetcher = Arc::new(MockPageFetcher::new().with_page(HOC247, fixtures::ARTICLE_PAGE));
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedder::new(16));
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(&AskConfig::default(), search.clone(), fetcher.clone())
            .unwrap()
            .with_store(store.clone(), embedder)
            .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Crawl);
        assert!(!outcome.results.is_empty());
        assert!(outcome
            .results
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
        let best = outcome.best().unwrap();
        assert_eq!(best.source_domain, "hoc247.net");
        assert!(best.text.contains("Robert Oppenheimer"));
        assert!(best.score >= 0.4);
        assert_eq!(search.questions(), vec![QUESTION.to_string()]);
        assert_eq!(fetcher.fetched(), vec![HOC247.to_string()]);

        let crawl = outcome.crawl.as_ref().unwrap();
        assert_eq!(crawl.completed_pages, 1);
        assert!(!crawl.has_failures());

        assert_eq!(
            events.event_types(),
            vec![
                names::CACHE_SKIPPED,
                names::CRAWL_STARTED,
                names::PAGE_COMPLETED,
                names::CRAWL_COMPLETED,
            ]
        );
        assert_eq!(
            events.events_of_type(names::CACHE_SKIPPED)[0].1,
            Some(serde_json::json!({"reason": "cold"}))
        );

        pipeline.flush_writes().await;
        assert!(store.count().await.unwrap() > 0);
        assert_eq!(store.count_by_source().keys().collect::<Vec<_>>(), vec!["hoc247.net"]);
    }

    #[tokio::test]
    async fn test_complete_snippet_skips_crawl() {
        let search = Arc::new(MockSearchEngine::new(vec![SearchResultItem::new(
            "Bom nguyên tử",
            "https://loigiaihay.com/bom-nguyen-tu",
            "Robert Oppenheimer là người chế tạo ra bom nguyên tử.",
        )]));
        let fetcher = Arc::new(MockPageFetcher::new());
        let pipeline = AnswerPipeline::new(&AskConfig::default(), search, fetcher.clone()).unwrap();

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Snippet);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].source_domain, "loigiaihay.com");
        assert_eq!(fetcher.calls(), 0);
        assert!(outcome.crawl.is_none());
    }

    #[tokio::test]
    async fn test_zero_results_go_straight_to_fallback() {
        let llm = Arc::new(MockLlm::answering("bing", "Robert Oppenheimer.[^1^]"));
        let fetcher = Arc::new(MockPageFetcher::new());
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(
            &AskConfig::default(),
            Arc::new(MockSearchEngine::new(Vec::new())),
            fetcher.clone(),
        )
        .unwrap()
        .with_fallback(chain(&llm))
        .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Fallback);
        assert_eq!(
            outcome.results,
            vec![RankedResult::from_bot("Robert Oppenheimer.", "bing")]
        );
        assert_eq!(llm.calls(), 1);
        assert_eq!(llm.prompts(), vec![QUESTION.to_string()]);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(events.count(names::FALLBACK_INVOKED), 1);
        assert_eq!(outcome.crawl.as_ref().map(|c| c.total_pages), Some(0));
    }

    #[tokio::test]
    async fn test_warm_cache_answers_without_network() {
        let embedder = Arc::new(HashEmbedder::new(16));
        let store = Arc::new(InMemoryVectorStore::new());
        let mut batch = DocumentBatch::new();
        batch.push(QUESTION, "hoc247.net", QUESTION);
        for i in 0..24 {
            batch.push(
                format!("Câu {i} nói về lịch sử thế giới năm {}.", 1900 + i),
                "vi.wikipedia.org",
                "",
            );
        }
        store.insert(batch.embed(embedder.as_ref()).await.unwrap()).await.unwrap();
        let embeds_before = embedder.calls();

        let search = Arc::new(MockSearchEngine::new(vec![hoc247_result()]));
        let fetcher = Arc::new(MockPageFetcher::new());
        let llm = Arc::new(MockLlm::answering("bing", "Robert Oppenheimer."));
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(&AskConfig::default(), search.clone(), fetcher.clone())
            .unwrap()
            .with_store(store, embedder.clone())
            .with_fallback(chain(&llm))
            .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Cache);
        let best = outcome.best().unwrap();
        assert_eq!(best.text, QUESTION);
        assert_eq!(best.source_domain, "hoc247.net");
        assert!((best.score - 1.0).abs() < 1e-6);
        assert_eq!(embedder.calls(), embeds_before + 1);
        assert_eq!(search.calls(), 0);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(llm.calls(), 0);
        assert_eq!(events.event_types(), vec![names::CACHE_HIT]);
    }

    #[tokio::test]
    async fn test_all_pages_failing_invokes_fallback_once() {
        let search = Arc::new(MockSearchEngine::new(vec![wiki_result(), hoc247_result()]));
        let llm = Arc::new(MockLlm::answering("bing", "Robert Oppenheimer."));
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(
            &AskConfig::default(),
            search,
            Arc::new(MockPageFetcher::new()),
        )
        .unwrap()
        .with_fallback(chain(&llm))
        .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Fallback);
        assert_eq!(events.count(names::PAGE_FAILED), 2);
        assert_eq!(events.count(names::FALLBACK_INVOKED), 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(
            llm.prompts(),
            vec![format!(
                "Ai chế tạo ra bom nguyên tử? {}",
                wiki_result().snippet
            )]
        );
        let crawl = outcome.crawl.unwrap();
        assert!(crawl.all_failed());
        assert_eq!(crawl.failed_pages, 2);
        assert!(crawl.failures.iter().all(|f| f.stage == PageStage::Fetch));
    }

    #[tokio::test]
    async fn test_all_pages_failing_without_fallback_is_exhausted() {
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(
            &AskConfig::default(),
            Arc::new(MockSearchEngine::new(vec![wiki_result(), hoc247_result()])),
            Arc::new(MockPageFetcher::new()),
        )
        .unwrap()
        .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Exhausted);
        assert_eq!(outcome.results, vec![RankedResult::no_match()]);
        assert_eq!(events.count(names::PAGE_FAILED), 2);
        assert_eq!(events.count(names::FALLBACK_INVOKED), 0);
        assert_eq!(events.count(names::ANSWER_EXHAUSTED), 1);
    }

    #[tokio::test]
    async fn test_one_failing_page_does_not_sink_the_crawl() {
        let fetcher = MockPageFetcher::new()
            .with_page(HOC247, fixtures::ARTICLE_PAGE)
            .with_failure(WIKI, crate::errors::FetchError::Timeout { url: WIKI.to_string() });
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(
            &AskConfig::default(),
            Arc::new(MockSearchEngine::new(vec![wiki_result(), hoc247_result()])),
            Arc::new(fetcher),
        )
        .unwrap()
        .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Crawl);
        assert_eq!(outcome.best().unwrap().source_domain, "hoc247.net");
        let crawl = outcome.crawl.unwrap();
        assert_eq!(crawl.completed_pages, 1);
        assert_eq!(crawl.failed_pages, 1);
        assert_eq!(crawl.failures[0].url, WIKI);
        assert_eq!(events.count(names::PAGE_FAILED), 1);
    }

    #[tokio::test]
    async fn test_deadline_settles_slow_pages() {
        let fetcher = MockPageFetcher::new()
            .with_page(HOC247, fixtures::ARTICLE_PAGE)
            .with_slow_page(WIKI, fixtures::WIKI_PAGE, Duration::from_secs(5));
        let config = config_with(PipelineConfig::default().with_deadline_seconds(0.2));
        let pipeline = AnswerPipeline::new(
            &config,
            Arc::new(MockSearchEngine::new(vec![hoc247_result(), wiki_result()])),
            Arc::new(fetcher),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let outcome = pipeline.answer(QUESTION).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.tier, AnswerTier::Crawl);
        let crawl = outcome.crawl.unwrap();
        assert_eq!(crawl.completed_pages, 1);
        assert_eq!(crawl.failures.len(), 1);
        assert_eq!(crawl.failures[0].url, WIKI);
        assert_eq!(crawl.failures[0].stage, PageStage::Deadline);
    }

    #[tokio::test]
    async fn test_full_stack_recovers_from_rate_limit() {
        const ENDPOINT: &str = "https://www.google.com/search";

        let transport = Arc::new(ScriptedTransport::new());
        transport.push(ENDPOINT, HttpResponse::html(fixtures::GOOGLE_RESULTS_PAGE));
        transport.push(WIKI, HttpResponse::status(429));
        transport.push(WIKI, HttpResponse::html(fixtures::WIKI_PAGE));

        let source: Arc<dyn ProxySource> = Arc::new(StaticProxySource::new(vec![
            ProxyProfile::new("10.0.0.1:8080", 300),
            ProxyProfile::new("10.0.0.2:8080", 900),
        ]));
        let fetch_config = FetchConfig::default().with_retry(
            RetryConfig::new()
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
        );
        let agent = Arc::new(FetchAgent::new(fetch_config, transport.clone(), vec![source]));
        let search = Arc::new(GoogleSearch::new(SearchConfig::default(), Arc::clone(&agent)));
        let pipeline = AnswerPipeline::new(&AskConfig::default(), search, agent.clone()).unwrap();

        let outcome = pipeline.answer(QUESTION).await;

        assert_eq!(outcome.tier, AnswerTier::Crawl);
        assert_eq!(outcome.best().unwrap().source_domain, "vi.wikipedia.org");
        assert!(outcome.best().unwrap().text.contains("Oppenheimer"));
        assert_eq!(agent.state().generation(), 2);
        assert_eq!(transport.requests_to(WIKI).len(), 2);
        assert!(transport
            .requests_to(WIKI)
            .iter()
            .all(|request| request.proxy.is_some()));
    }

    #[tokio::test]
    async fn test_embedder_failure_is_a_cache_miss() {
        struct BrokenEmbedder;

        #[async_trait::async_trait]
        impl Embedder for BrokenEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::errors::StoreError> {
                Err(crate::errors::StoreError::Embedding("model not loaded".to_string()))
            }
        }

        let store = Arc::new(InMemoryVectorStore::new());
        let seed = HashEmbedder::new(4);
        let mut batch = DocumentBatch::new();
        for i in 0..20 {
            batch.push(format!("Tài liệu số {i}."), "a.vn", "");
        }
        store.insert(batch.embed(&seed).await.unwrap()).await.unwrap();

        let events = Arc::new(CollectingEventSink::new());
        let pipeline = AnswerPipeline::new(
            &AskConfig::default(),
            Arc::new(MockSearchEngine::new(vec![hoc247_result()])),
            Arc::new(MockPageFetcher::new().with_page(HOC247, fixtures::ARTICLE_PAGE)),
        )
        .unwrap()
        .with_store(store.clone(), Arc::new(BrokenEmbedder))
        .with_event_sink(events.clone());

        let outcome = pipeline.answer(QUESTION).await;
        pipeline.flush_writes().await;

        assert_eq!(outcome.tier, AnswerTier::Crawl);
        assert_eq!(
            events.events_of_type(names::CACHE_SKIPPED)[0].1,
            Some(serde_json::json!({"reason": "embedding_error"}))
        );
        assert_eq!(events.count(names::STORE_PERSIST_FAILED), 1);
        assert_eq!(store.count().await.unwrap(), 20);
    }
}
