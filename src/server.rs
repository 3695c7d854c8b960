//! HTTP API for browsing the catalog and generating tables.

use crate::ai::mime::{mime_for_artifact, mime_for_name};
use crate::app::Remixer;
use crate::catalog::{resolve_artifact, Catalog};
use crate::models::{
    Category, Config, LegCount, SourceImage, TableSelection, DEFAULT_ALLOWED_ORIGINS,
};
use crate::{Error, Result};
use axum::extract::multipart::MultipartError;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, info, instrument, warn};

const SERVICE_NAME: &str = "RAUW Tafel Designer API";
const DEFAULT_ROOM_NAME: &str = "room_photo.jpg";
const RATE_LIMIT_CLEANUP_EVERY: Duration = Duration::from_secs(60);

/// Error body returned to clients as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg),
            Error::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "Access denied"),
            Error::PayloadTooLarge(msg) => Self::new(StatusCode::PAYLOAD_TOO_LARGE, msg),
            Error::Configuration(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "GEMINI_API_KEY not configured. Please set environment variable.",
            ),
            Error::EmptyResult => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Image generation failed - no output produced",
            ),
            err if err.is_transport() => {
                Self::new(StatusCode::BAD_GATEWAY, format!("Generation failed: {}", err))
            }
            err => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Generation failed: {}", err),
            ),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn per(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Per-client-IP limits for the rate-limited endpoints.
pub struct RateLimits {
    list: DefaultKeyedRateLimiter<IpAddr>,
    preview: DefaultKeyedRateLimiter<IpAddr>,
    generate: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimits {
    pub fn new(list: Quota, preview: Quota, generate: Quota) -> Self {
        Self {
            list: RateLimiter::keyed(list),
            preview: RateLimiter::keyed(preview),
            generate: RateLimiter::keyed(generate),
        }
    }

    fn check(limiter: &DefaultKeyedRateLimiter<IpAddr>, ip: IpAddr) -> ApiResult<()> {
        limiter.check_key(&ip).map_err(|_| {
            warn!("Rate limit exceeded for {}", ip);
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
        })
    }

    /// Forget clients whose quota has fully replenished.
    pub fn retain_recent(&self) {
        for limiter in [&self.list, &self.preview, &self.generate] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of client keys currently held across all limiters.
    pub fn tracked_clients(&self) -> usize {
        self.list.len() + self.preview.len() + self.generate.len()
    }
}

impl Default for RateLimits {
    /// 30/minute for listings, 60/minute for previews, 5/hour for generation.
    fn default() -> Self {
        Self::new(
            Quota::per_minute(per(30)),
            Quota::per_minute(per(60)),
            Quota::per_hour(per(5)),
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    remixer: Arc<Remixer>,
    catalog: Catalog,
    limits: Arc<RateLimits>,
    max_upload_bytes: usize,
    allowed_origins: Vec<HeaderValue>,
}

impl AppState {
    pub fn new(
        remixer: Remixer,
        catalog: Catalog,
        limits: RateLimits,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            remixer: Arc::new(remixer),
            catalog,
            limits: Arc::new(limits),
            max_upload_bytes,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| HeaderValue::from_static(*origin))
                .collect(),
        }
    }

    /// Replace the browser origins allowed by CORS.
    pub fn with_allowed_origins(mut self, origins: &[String]) -> Result<Self> {
        self.allowed_origins = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| {
                    Error::Configuration(format!("Invalid origin in ALLOWED_ORIGINS: {}", origin))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Periodically prune idle clients from the rate limiters.
    pub fn spawn_rate_limit_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let limits = Arc::clone(&self.limits);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                limits.retain_recent();
                debug!("Rate limiters now track {} client(s)", limits.tracked_clients());
            }
        })
    }
}

fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Creates the API router. Serve it with connect info so rate limits can key on the peer IP.
pub fn create_router(state: AppState) -> Router {
    // Multipart framing on top of the upload itself.
    let body_limit = state.max_upload_bytes + 1024 * 1024;
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/api/categories/:category", get(list_category_images))
        .route("/api/images/:category/:filename", get(get_category_image))
        .route(
            "/api/generate",
            post(generate_table).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/output/:filename", get(get_output_image))
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config) -> Result<()> {
    let remixer = Remixer::new(config)?;
    let state = AppState::new(
        remixer,
        Catalog::new(config.catalog_dir.clone()),
        RateLimits::default(),
        config.max_upload_bytes,
    )
    .with_allowed_origins(&config.allowed_origins)?;
    state.spawn_rate_limit_cleanup(RATE_LIMIT_CLEANUP_EVERY);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

fn image_response(content_type: &'static str, bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

/// API info and health check.
async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "status": "operational",
        "endpoints": {
            "list_images": "GET /api/categories/{category}",
            "preview_image": "GET /api/images/{category}/{filename}",
            "generate_table": "POST /api/generate",
            "get_result": "GET /api/output/{filename}"
        }
    }))
}

#[instrument(skip(state))]
async fn list_category_images(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(category): Path<String>,
) -> ApiResult<Json<Value>> {
    RateLimits::check(&state.limits.list, addr.ip())?;
    let category: Category = category.parse()?;
    let images = state.catalog.list(category).await?;

    Ok(Json(json!({
        "category": category,
        "count": images.len(),
        "images": images,
    })))
}

#[instrument(skip(state))]
async fn get_category_image(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((category, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    RateLimits::check(&state.limits.preview, addr.ip())?;
    let category: Category = category.parse()?;
    let image = state.catalog.load(category, &filename).await?;
    let content_type = mime_for_name(&image.name).unwrap_or("application/octet-stream");
    Ok(image_response(content_type, image.bytes))
}

#[instrument(skip(state))]
async fn get_output_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = resolve_artifact(state.remixer.output_dir(), &filename).await?;
    let bytes = tokio::fs::read(&path).await.map_err(Error::from)?;
    Ok(image_response(mime_for_artifact(&filename), bytes))
}

/// Form fields of a generate request before catalog lookup.
#[derive(Default)]
struct GenerateForm {
    shape: Option<String>,
    base: Option<String>,
    finish: Option<String>,
    legs: Option<LegCount>,
    room: Option<SourceImage>,
}

impl GenerateForm {
    async fn read(mut multipart: Multipart, max_upload_bytes: usize) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "vorm" => form.shape = Some(field.text().await?),
                "onderstel" => form.base = Some(field.text().await?),
                "kleur" => form.finish = Some(field.text().await?),
                "legs" => form.legs = LegCount::parse_optional(&field.text().await?)?,
                "room_photo" => {
                    let file_name = field
                        .file_name()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or(DEFAULT_ROOM_NAME)
                        .to_string();
                    let bytes = field.bytes().await?;
                    if bytes.is_empty() {
                        continue;
                    }
                    if bytes.len() > max_upload_bytes {
                        return Err(Error::PayloadTooLarge(format!(
                            "File exceeds {}MB limit",
                            max_upload_bytes / (1024 * 1024)
                        ))
                        .into());
                    }
                    form.room = Some(SourceImage::new(file_name, bytes.to_vec()));
                }
                other => debug!("Ignoring unknown form field '{}'", other),
            }
        }

        Ok(form)
    }

    fn required(value: Option<String>, field: &str) -> Result<String> {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("Missing form field: {}", field)))
    }
}

#[instrument(skip_all)]
async fn generate_table(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    RateLimits::check(&state.limits.generate, addr.ip())?;

    let form = GenerateForm::read(multipart, state.max_upload_bytes).await?;
    let shape = GenerateForm::required(form.shape, Category::Shape.dir_name())?;
    let base = GenerateForm::required(form.base, Category::Base.dir_name())?;
    let finish = GenerateForm::required(form.finish, Category::Finish.dir_name())?;

    let selection = TableSelection {
        shape: state.catalog.load(Category::Shape, &shape).await?,
        base: state.catalog.load(Category::Base, &base).await?,
        finish: state.catalog.load(Category::Finish, &finish).await?,
        room: form.room,
        legs: form.legs,
    };

    let outcome = state.remixer.generate_table(selection).await?;
    let filename = outcome
        .artifacts
        .first()
        .cloned()
        .ok_or(Error::EmptyResult)?;

    Ok(Json(json!({
        "success": true,
        "output_url": format!("/api/output/{}", filename),
        "filename": filename,
        "filenames": outcome.artifacts,
        "text": outcome.texts.join("\n"),
        "message": "Table generated successfully",
    })))
}
