//! Application orchestration for composing, generating and saving table images.

use crate::ai::{GeminiRemixClient, RemixService};
use crate::composer;
use crate::demux::{DemuxReport, DemuxState, ResponseDemultiplexer};
use crate::models::{Config, GenerationOutcome, GenerationRequest, SourceImage, TableSelection};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Runs the compose → stream → demultiplex pipeline against one output directory.
pub struct Remixer {
    service: Option<Box<dyn RemixService>>,
    output_dir: PathBuf,
}

impl Remixer {
    /// Build a remixer from a concrete service.
    ///
    /// `None` models a missing credential: every generation then fails with
    /// [`Error::Configuration`] before anything is sent.
    pub fn with_service(service: Option<Box<dyn RemixService>>, output_dir: PathBuf) -> Self {
        Self {
            service,
            output_dir,
        }
    }

    /// Construct a remixer from configuration, creating the output directory.
    pub fn new(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)?;
        info!("Using output directory: {}", config.output_dir.display());

        let service: Option<Box<dyn RemixService>> = match &config.gemini_api_key {
            Some(api_key) => {
                info!("Image provider: Gemini (model: {})", config.image_model);
                Some(Box::new(GeminiRemixClient::new(
                    api_key.clone(),
                    config.image_model.clone(),
                )))
            }
            None => {
                warn!("GEMINI_API_KEY not set; generation requests will be rejected");
                None
            }
        };

        Ok(Self::with_service(service, config.output_dir.clone()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Compose and run the shape/base/finish(/room) workflow.
    pub async fn generate_table(&self, selection: TableSelection) -> Result<GenerationOutcome> {
        let service = self.service()?;
        info!("Generating table ({:?})", selection.mode());
        let request = composer::compose_table(selection)?;
        self.run(service, &request).await?.into_result()
    }

    /// Compose and run a free-form remix of 1-5 images.
    pub async fn generate_freeform(
        &self,
        images: Vec<SourceImage>,
        prompt: Option<String>,
    ) -> Result<GenerationOutcome> {
        let service = self.service()?;
        let request = composer::compose_freeform(images, prompt)?;
        self.run(service, &request).await?.into_result()
    }

    /// Send an already composed request and return the raw stream report.
    pub async fn remix(&self, request: &GenerationRequest) -> Result<DemuxReport> {
        let service = self.service()?;
        self.run(service, request).await
    }

    fn service(&self) -> Result<&dyn RemixService> {
        self.service.as_deref().ok_or_else(|| {
            Error::Configuration("GEMINI_API_KEY environment variable not set".to_string())
        })
    }

    async fn run(&self, service: &dyn RemixService, request: &GenerationRequest) -> Result<DemuxReport> {
        let demux = ResponseDemultiplexer::new(&self.output_dir);

        let stream = service.stream_generate(request).await.map_err(|e| {
            error!("Failed to open generation stream: {}", e);
            e
        })?;
        let report = demux.consume(stream).await;

        match report.state {
            DemuxState::Done if report.artifacts.is_empty() => {
                warn!("Generation finished without producing an image");
            }
            DemuxState::Done => {
                info!("Generation produced {} image(s)", report.artifacts.len());
            }
            DemuxState::Failed => {
                error!(
                    "Generation failed; keeping {} image(s) already written",
                    report.artifacts.len()
                );
            }
            DemuxState::Streaming => {
                return Err(Error::Invariant(
                    "Response stream ended without a terminal state".to_string(),
                ));
            }
        }

        Ok(report)
    }
}
