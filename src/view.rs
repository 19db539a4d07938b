//! The thumbnail view
//!
//! Input bytes arrive in the request context ([`ImageStash`] in the
//! request extensions, or the upload body). The view runs the pipeline
//! and writes the result as the whole response body.

use std::{path::Path, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, Request},
    middleware::map_request_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use image::GenericImageView;
use serde::Deserialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    codec::{CodecImplA, ScaleFilter},
    config::ViewConfig,
    pipeline::{self, PipelineError, Thumbnail, ThumbnailOptions},
    primitive::{
        anyhow::{self, Context},
        httpdate,
        tracing::instrument,
        Result, UnifiedError,
    },
    source::{self, ImageStash, RealPath},
};

/// Application State
#[derive(Debug, Clone)]
pub struct AppState {
    /// Process-wide defaults (read-only)
    pub config: Arc<ViewConfig>,
    /// Directory served under `/thumb/`
    pub root: RealPath,
}

/// Options as they arrive in the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThumbnailQuery {
    #[serde(alias = "size")]
    pub target_size: Option<u32>,
    pub square: Option<bool>,
    #[serde(alias = "type")]
    pub output_type: Option<String>,
    pub force: Option<bool>,
    #[serde(alias = "quality")]
    pub jpeg_quality: Option<u8>,
    pub max_decode_bytes: Option<u64>,
    pub scaling_qtype: Option<ScaleFilter>,
}

impl ThumbnailQuery {
    /// Convert to typed options. An unknown `output_type` fails here,
    /// before any image work. `target_size=0` counts as unset and
    /// `jpeg_quality` is clamped to 100.
    pub fn into_options(self) -> std::result::Result<ThumbnailOptions, PipelineError> {
        let output_type = self
            .output_type
            .map(|t| t.parse())
            .transpose()
            .map_err(|e: crate::format::UnknownType| {
                PipelineError::UnsupportedFormat(format!("unknown output type {:?}", e.name))
            })?;
        Ok(ThumbnailOptions {
            target_size: self.target_size.filter(|&t| t > 0),
            square: self.square.unwrap_or(false),
            output_type,
            force: self.force.unwrap_or(false),
            jpeg_quality: self.jpeg_quality.map(|q| q.min(100)),
            max_decode_bytes: self.max_decode_bytes,
            scaling_qtype: self.scaling_qtype,
        })
    }
}

impl From<PipelineError> for UnifiedError {
    fn from(e: PipelineError) -> Self {
        let status_for = match e {
            PipelineError::MissingInput => UnifiedError::NotFound,
            PipelineError::UnsupportedFormat(_) => UnifiedError::UnsupportedMediaType,
            PipelineError::DecodeFailed(_) => UnifiedError::Unprocessable,
            PipelineError::EncodeFailed(_) => UnifiedError::InternalServerError,
        };
        status_for(anyhow::Error::new(e))
    }
}

/// Build the app.
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/thumb", get(render))
        .route("/thumb/", get(render))
        .route("/thumb/*userpath", get(render))
        .route_layer(map_request_with_state(state.clone(), stash_file))
        .route("/thumbnail", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Use as middleware to put the file named by the path into the request
/// context. Anything that goes wrong leaves the context empty.
#[instrument(skip(state, request), fields(path = %userpath.as_ref().map(|x| x.as_str()).unwrap_or("/")))]
pub async fn stash_file<B>(
    State(state): State<AppState>,
    userpath: Option<axum::extract::Path<String>>,
    mut request: Request<B>,
) -> Request<B> {
    if let Some(userpath) = userpath {
        match source::stash_from_root(Path::new(userpath.as_str()), &state.root).await {
            Ok(stash) => {
                tracing::trace!("Stashed {} bytes", stash.bytes.len());
                request.extensions_mut().insert(stash);
            }
            Err(e) => tracing::debug!("Nothing stashed: {e:#}"),
        }
    }
    request
}

/// Render whatever image the request context holds.
#[instrument(err, skip(state, stash))]
pub async fn render(
    State(state): State<AppState>,
    Query(query): Query<ThumbnailQuery>,
    stash: Option<Extension<ImageStash>>,
) -> Result<Response> {
    respond(&state, query, stash.map(|Extension(stash)| stash)).await
}

/// Render the uploaded body.
#[instrument(err, skip(state, body), fields(len = body.len()))]
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<ThumbnailQuery>,
    body: Bytes,
) -> Result<Response> {
    respond(&state, query, ImageStash::from_body(body)).await
}

/// Run the pipeline and write the response. Nothing is written unless
/// the whole pipeline succeeded.
async fn respond(
    state: &AppState,
    query: ThumbnailQuery,
    stash: Option<ImageStash>,
) -> Result<Response> {
    let ImageStash { bytes, lastmod } = stash.ok_or(PipelineError::MissingInput)?;
    let options = query.into_options()?;
    let config = state.config.clone();

    // Image work is CPU-bound; keep it off the async workers.
    let thumb = tokio::task::spawn_blocking(move || {
        pipeline::run(CodecImplA, bytes, &options, &config)
    })
    .await
    .context("pipeline: thread join fail")??;

    if let Thumbnail::Transformed { image, mime, .. } = &thumb {
        let (w, h) = image.dimensions();
        tracing::info!("Rendered {w}x{h} {mime}");
    }

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, thumb.mime())
        .header(
            "X-Thumbnail",
            if thumb.is_transformed() {
                "transformed"
            } else {
                "unchanged"
            },
        );
    if let Some(lastmod) = lastmod {
        builder = builder.header(header::LAST_MODIFIED, httpdate(&lastmod));
    }
    let response = builder
        .body(axum::body::Body::from(thumb.bytes().clone()))
        .context("thumbnail send make response")?
        .into_response();
    Ok(response)
}
