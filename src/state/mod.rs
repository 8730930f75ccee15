use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, ConfigService, RagSettings};
use crate::core::errors::RagError;
use crate::llm::{CachedEmbedder, Embedder, Generator, HttpRelevanceScorer, OpenAiCompatibleProvider};
use crate::rag::{
    BaseRetriever, BuildStrategy, Built, ChunkerConfig, CompressionFilter, ContextAssemblerConfig,
    DocumentIngestor, IndexStats, KeywordOverlapScorer, QueryConfig, QueryOrchestrator,
    RelevanceScorer, Reranker, VectorIndex,
};

pub mod error;

use error::InitializationError;

/// Shared state handed to every route.
///
/// The vector index is built separately via [`AppState::index_documents`];
/// queries issued before that answer with the "not ready" message.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<RagSettings>,
    pub index: Arc<VectorIndex>,
    pub orchestrator: Arc<QueryOrchestrator>,
}

impl AppState {
    /// Loads configuration and wires the model providers into the query pipeline.
    pub fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config.load_settings().map_err(InitializationError::Config)?;

        let embedder = build_embedder(&settings).map_err(InitializationError::Provider)?;
        let generator = build_generator(&settings).map_err(InitializationError::Provider)?;
        let scorer = build_scorer(&settings).map_err(InitializationError::Provider)?;

        let query_embedder = Arc::new(CachedEmbedder::new(
            embedder.clone(),
            settings.embedding.cache_size,
        ));
        let index = Arc::new(VectorIndex::new(embedder.clone()).with_query_embedder(query_embedder));
        let filter_embedder = settings.retrieval.filter_enabled.then(|| embedder.clone());
        let orchestrator = build_orchestrator(&settings, index.clone(), generator, filter_embedder, scorer);

        Ok(Arc::new(Self::from_parts(paths, config, settings, index, orchestrator)))
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: RagSettings,
        index: Arc<VectorIndex>,
        orchestrator: QueryOrchestrator,
    ) -> Self {
        Self {
            paths,
            config,
            settings: Arc::new(settings),
            index,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Directory scanned for `.txt` / `.md` documents.
    pub fn docs_dir(&self) -> PathBuf {
        match &self.settings.ingestion.docs_dir {
            Some(dir) => {
                let dir = PathBuf::from(dir);
                if dir.is_absolute() {
                    dir
                } else {
                    self.paths.project_root.join(dir)
                }
            }
            None => self.paths.docs_dir.clone(),
        }
    }

    /// Ingests the documents directory and (re)builds the vector index.
    pub async fn index_documents(
        &self,
    ) -> Result<Built<BuildStrategy, IndexStats>, InitializationError> {
        let ingestion = &self.settings.ingestion;
        let ingestor = DocumentIngestor::new(ChunkerConfig {
            chunk_size: ingestion.chunk_size,
            chunk_overlap: ingestion.chunk_overlap,
            min_chunk_length: ingestion.min_chunk_length,
        });

        let docs_dir = self.docs_dir();
        tracing::info!("Loading documents from {}", docs_dir.display());
        let chunks = ingestor
            .ingest_dir(&docs_dir)
            .map_err(InitializationError::Ingestion)?;

        self.index
            .build(chunks)
            .await
            .map_err(InitializationError::Index)
    }
}

pub fn build_orchestrator(
    settings: &RagSettings,
    index: Arc<VectorIndex>,
    generator: Arc<dyn Generator>,
    filter_embedder: Option<Arc<dyn Embedder>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
) -> QueryOrchestrator {
    let config = QueryConfig {
        k: settings.retrieval.k,
        score_threshold: settings.retrieval.score_threshold,
        filter_threshold: settings.retrieval.filter_threshold,
        stage_timeout: Duration::from_secs(settings.llm.timeout_secs),
        temperature: Some(settings.llm.temperature),
        verification_enabled: settings.verification.enabled,
    };

    let mut orchestrator =
        QueryOrchestrator::new(Arc::new(BaseRetriever::new(index)), generator, config).with_context(
            ContextAssemblerConfig {
                max_context_length: settings.context.max_context_length,
            },
        );

    if settings.retrieval.filter_enabled {
        match CompressionFilter::new(filter_embedder) {
            Ok(filter) => orchestrator = orchestrator.with_filter(filter),
            Err(err) => tracing::warn!("Compression filter disabled: {}", err),
        }
    }
    if let Some(scorer) = scorer {
        orchestrator = orchestrator.with_reranker(Reranker::new(scorer));
    }
    orchestrator
}

fn build_generator(settings: &RagSettings) -> Result<Arc<dyn Generator>, RagError> {
    let llm = &settings.llm;
    let base_url = require(&llm.base_url, "llm.base_url")?;
    let model = require(&llm.model, "llm.model")?;

    let provider = OpenAiCompatibleProvider::new(
        base_url,
        llm.api_key.clone(),
        model,
        Duration::from_secs(llm.timeout_secs),
    )?;
    tracing::info!("Generator: {} at {}", model, base_url);
    Ok(Arc::new(provider))
}

/// Embedding endpoint and key fall back to the LLM ones when unset.
fn build_embedder(settings: &RagSettings) -> Result<Arc<dyn Embedder>, RagError> {
    let embedding = &settings.embedding;
    let base_url = embedding
        .base_url
        .as_ref()
        .or(settings.llm.base_url.as_ref())
        .cloned();
    let base_url = require(&base_url, "embedding.base_url")?;
    let model = require(&embedding.model, "embedding.model")?;
    let api_key = embedding.api_key.clone().or_else(|| settings.llm.api_key.clone());

    let provider = OpenAiCompatibleProvider::new(
        base_url,
        api_key,
        model,
        Duration::from_secs(embedding.timeout_secs),
    )?;
    tracing::info!("Embedder: {} at {}", model, base_url);
    Ok(Arc::new(provider))
}

/// Cross-encoder endpoint when configured, keyword overlap otherwise.
fn build_scorer(settings: &RagSettings) -> Result<Option<Arc<dyn RelevanceScorer>>, RagError> {
    let reranker = &settings.reranker;
    if !reranker.enabled {
        tracing::info!("Reranker disabled");
        return Ok(None);
    }

    match reranker.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(base_url) => {
            let scorer = HttpRelevanceScorer::new(
                base_url,
                reranker.api_key.clone(),
                reranker.model.clone(),
                Duration::from_secs(reranker.timeout_secs),
            )?;
            tracing::info!("Reranker: cross-encoder at {}", base_url);
            Ok(Some(Arc::new(scorer)))
        }
        None => {
            tracing::info!("Reranker: keyword overlap (no endpoint configured)");
            Ok(Some(Arc::new(KeywordOverlapScorer)))
        }
    }
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, RagError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RagError::Config(format!("{} is required", key)))
}
