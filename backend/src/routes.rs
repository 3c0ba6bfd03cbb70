use std::path::PathBuf;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::{ErrorResponse, HealthResponse, PredictionResponse, SessionId, UploadResponse};

use crate::guidance::guidance;
use crate::imaging::{DeclaredType, UploadError, UploadedImage};
use crate::pipeline::{InferencePipeline, PipelineError, Session, SessionState};
use crate::sessions::{ScoringGuard, SessionError, SessionStore};

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
enum UploadFailure {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/guidance").route(web::get().to(get_guidance)))
        .service(web::resource("/api/uploads").route(web::post().to(handle_upload)))
        .service(
            web::resource("/api/uploads/{session_id}/predict")
                .route(web::post().to(handle_predict)),
        );

    if let Some(dir) = static_dir {
        cfg.service(Files::new("/", dir).index_file("index.html"));
    }
}

fn error_json(error: impl ToString) -> ErrorResponse {
    ErrorResponse {
        error: error.to_string(),
    }
}

fn upload_error_response(err: &UploadError) -> HttpResponse {
    let body = error_json(err);
    match err {
        UploadError::Empty | UploadError::Decode(_) => HttpResponse::BadRequest().json(body),
        UploadError::TooLarge { .. } => HttpResponse::PayloadTooLarge().json(body),
        UploadError::UnsupportedFormat(_) => HttpResponse::UnsupportedMediaType().json(body),
    }
}

async fn health(pipeline: web::Data<InferencePipeline>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        classifier: pipeline.classifier_name().to_string(),
        plausibility_check: pipeline.options().plausibility_check,
    })
}

async fn get_guidance() -> HttpResponse {
    HttpResponse::Ok().json(guidance())
}

async fn handle_upload(
    pipeline: web::Data<InferencePipeline>,
    store: web::Data<SessionStore>,
    limits: web::Data<UploadLimits>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let max_bytes = limits.max_bytes;
    let mut upload: Option<(Vec<u8>, DeclaredType)> = None;

    while let Some(mut field) = payload.try_next().await? {
        let declared = DeclaredType {
            file_name: field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string),
            content_type: field.content_type().map(|m| m.essence_str().to_string()),
        };

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            if image_data.len() + data.len() > max_bytes {
                let err = UploadError::TooLarge {
                    size: image_data.len() + data.len(),
                    limit: max_bytes,
                };
                warn!("Upload refused: {}", err);
                return Ok(upload_error_response(&err));
            }
            image_data.extend_from_slice(&data);
        }

        if upload.is_none() && !image_data.is_empty() {
            upload = Some((image_data, declared));
        }
    }

    let Some((bytes, declared)) = upload else {
        return Ok(upload_error_response(&UploadError::Empty));
    };

    let worker_pipeline = pipeline.clone();
    let outcome = web::block(move || -> Result<Session, UploadFailure> {
        let image = UploadedImage::decode(&bytes, &declared, max_bytes)?;
        let mut session = Session::new();
        session.upload(&worker_pipeline, image)?;
        Ok(session)
    })
    .await;

    let session = match outcome {
        Ok(Ok(session)) => session,
        Ok(Err(UploadFailure::Upload(e))) => {
            warn!("Upload refused: {}", e);
            return Ok(upload_error_response(&e));
        }
        Ok(Err(e)) => {
            error!("Upload processing failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(error_json(e)));
        }
        Err(e) => {
            error!("Upload worker failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(error_json(e)));
        }
    };

    let (width, height, channels) = match session.state() {
        SessionState::Rejected(rejection) => {
            return Ok(HttpResponse::Ok().json(UploadResponse::Rejected {
                message: rejection.message.clone(),
                detail: rejection.detail.clone(),
            }));
        }
        SessionState::Ready(prepared) => (prepared.width, prepared.height, prepared.channels),
        other => {
            error!("Upload left session in state {}", other.name());
            return Ok(HttpResponse::InternalServerError()
                .json(error_json("Unexpected session state")));
        }
    };

    match store.insert(session) {
        Ok(session_id) => {
            info!(
                "Accepted {}x{} upload ({} channel) as session {}",
                width, height, channels, session_id
            );
            Ok(HttpResponse::Ok().json(UploadResponse::Ready {
                session_id,
                width,
                height,
                channels,
            }))
        }
        Err(e) => {
            error!("Failed to store session: {}", e);
            Ok(HttpResponse::InternalServerError().json(error_json(e)))
        }
    }
}

async fn handle_predict(
    pipeline: web::Data<InferencePipeline>,
    store: web::Data<SessionStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let raw_id = path.into_inner();
    let session_id = match SessionId::parse(&raw_id) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest().json(error_json("Invalid session id format"));
        }
    };

    let prepared = match store.begin_scoring(session_id) {
        Ok(prepared) => prepared,
        Err(e @ SessionError::NotFound(_)) => {
            warn!("{}", e);
            return HttpResponse::NotFound().json(error_json(e));
        }
        Err(e @ SessionError::Conflict { .. }) => {
            warn!("{}", e);
            return HttpResponse::Conflict().json(error_json(e));
        }
        Err(e) => {
            error!("{}", e);
            return HttpResponse::InternalServerError().json(error_json(e));
        }
    };

    // discards the session on failure or when this future is dropped
    let guard = ScoringGuard::new(store.get_ref().clone(), session_id);

    let worker_pipeline = pipeline.clone();
    let outcome = web::block(move || worker_pipeline.score(&prepared)).await;

    let failure = match outcome {
        Ok(Ok(verdict)) => {
            if let Err(e) = guard.finish(verdict) {
                warn!("Could not close session {}: {}", session_id, e);
            }
            return HttpResponse::Ok().json(PredictionResponse::new(session_id, verdict));
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };

    error!("Prediction failed for session {}: {}", session_id, failure);
    drop(guard);
    HttpResponse::InternalServerError().json(error_json(format!(
        "Model inference error: {failure}"
    )))
}
