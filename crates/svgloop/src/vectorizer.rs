use std::path::Path;
use std::sync::Arc;
use svgloop_core::batch::BatchProgress;
use svgloop_core::{
    BatchInput, BatchOptions, BatchResult, CompletionBackend, CostEstimate, CostEstimator,
    FinalResult, MarkupGenerator, RefinementLoop, Renderer, ResponseCache, Result, Scorer,
    VectorizerConfig, VisionAnalyzer, run_batch,
};
use svgloop_render::{RenderChain, SimilarityScorer};

type SharedBackend = Arc<dyn CompletionBackend>;

/// Wires a backend, the response cache, the render chain and the scorer into one object.
///
/// This stays runtime-agnostic: the async entry point simply runs the blocking loop.
pub struct Vectorizer {
    config: VectorizerConfig,
    analyzer: VisionAnalyzer<SharedBackend>,
    generator: MarkupGenerator<SharedBackend>,
    renderer: Arc<dyn Renderer>,
    scorer: Arc<dyn Scorer>,
}

impl Vectorizer {
    /// Builds the backend named by `config.provider`.
    #[cfg(feature = "http")]
    pub fn from_config(config: VectorizerConfig) -> Result<Self> {
        config.validate()?;
        let backend = svgloop_core::backend_from_settings(&config.backend_settings())?;
        Self::with_backend(config, backend)
    }

    /// Uses `backend` for both analysis and generation, with the standard render chain.
    pub fn with_backend(config: VectorizerConfig, backend: SharedBackend) -> Result<Self> {
        Self::with_parts(
            config,
            backend,
            Arc::new(RenderChain::default()),
            Arc::new(SimilarityScorer::default()),
        )
    }

    pub fn with_parts(
        config: VectorizerConfig,
        backend: SharedBackend,
        renderer: Arc<dyn Renderer>,
        scorer: Arc<dyn Scorer>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = ResponseCache::from_config(&config.cache)?;
        let analyzer = VisionAnalyzer::new(backend.clone())
            .with_retry(config.retry_policy())
            .with_detail(config.detail_level)
            .with_few_shot(config.few_shot)
            .with_cache(cache);
        let generator = MarkupGenerator::new(backend)
            .with_retry(config.retry_policy())
            .with_style(config.style.clone());
        tracing::debug!(
            provider = %config.provider,
            model = %config.model_or_default(),
            "vectorizer ready"
        );
        Ok(Self {
            config,
            analyzer,
            generator,
            renderer,
            scorer,
        })
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    fn refinement_loop(&self) -> RefinementLoop<'_> {
        RefinementLoop::new(
            &self.analyzer,
            &self.generator,
            self.renderer.as_ref(),
            self.scorer.as_ref(),
        )
        .with_options(self.config.loop_options())
    }

    /// Synchronous vectorization (executor-free).
    pub fn vectorize_sync(
        &self,
        input: &Path,
        output: &Path,
        on_progress: Option<&mut dyn FnMut(u32, f64)>,
    ) -> Result<FinalResult> {
        let mut result = self.refinement_loop().run(input, output, on_progress)?;
        result
            .metadata
            .insert("provider".to_string(), self.config.provider.as_str().into());
        result
            .metadata
            .insert("model".to_string(), self.config.model_or_default().into());
        Ok(result)
    }

    pub async fn vectorize(&self, input: &Path, output: &Path) -> Result<FinalResult> {
        self.vectorize_sync(input, output, None)
    }

    pub fn vectorize_batch(
        &self,
        input: &BatchInput,
        output_dir: &Path,
        options: &BatchOptions,
        on_item: Option<&BatchProgress<'_>>,
    ) -> Result<BatchResult> {
        run_batch(
            input,
            output_dir,
            options,
            |src: &Path, dst: &Path| self.vectorize_sync(src, dst, None),
            on_item,
        )
    }

    pub async fn vectorize_batch_async(
        &self,
        input: &BatchInput,
        output_dir: &Path,
        options: &BatchOptions,
    ) -> Result<BatchResult> {
        self.vectorize_batch(input, output_dir, options, None)
    }

    /// Upper-bound cost of one run with the configured iteration budget.
    pub fn estimate_cost(&self) -> CostEstimate {
        CostEstimator::new(self.config.provider, self.config.model_or_default())
            .estimate(self.config.max_iterations)
    }
}
