use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse, ResponseError, Result};
use futures_util::StreamExt;
use log::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Stage};
use crate::models::{HealthResponse, Prediction, PredictionResponse};
use crate::pipeline::{self, Diagnosis};
use crate::preprocess;
use crate::render;
use crate::AppState;

const TOP_K: usize = 3;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict_page)))
        .service(web::resource("/api/predict").route(web::post().to(predict_json)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// The first file field of a multipart form, held in memory.
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Reads the first file field, refusing anything past `limit` bytes.
pub async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, PipelineError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| PipelineError::Upload(e.to_string()))?;
        let disposition = field.content_disposition();
        let filename = disposition.get_filename().map(str::to_string);
        let is_file = filename.is_some() || disposition.get_name() == Some("file");

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| PipelineError::Upload(e.to_string()))?;
            if bytes.len() + data.len() > limit {
                return Err(PipelineError::TooLarge { limit });
            }
            bytes.extend_from_slice(&data);
        }

        if !is_file {
            continue;
        }
        if let Some(name) = filename.as_deref().filter(|n| !n.is_empty()) {
            preprocess::check_extension(name)?;
        }
        if bytes.is_empty() {
            return Err(PipelineError::MissingUpload);
        }
        return Ok(Upload { filename, bytes });
    }

    Err(PipelineError::MissingUpload)
}

/// Runs the pipeline on the blocking pool so the worker keeps serving I/O.
async fn run_pipeline(
    state: web::Data<AppState>,
    bytes: Vec<u8>,
    request_id: String,
) -> Result<Prediction, PipelineError> {
    web::block(move || pipeline::diagnose(state.classifier.as_ref(), &bytes, &request_id))
        .await
        .map_err(|e| PipelineError::Inference(e.to_string()))?
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render::page(""))
}

pub async fn predict_page(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let request_id = Uuid::new_v4().to_string();

    let mut preview = None;
    let result = match read_upload(payload, state.max_upload_bytes).await {
        Ok(upload) => {
            preview = preprocess::preview_mime(&upload.bytes)
                .map(|mime| render::preview(&upload.bytes, mime));
            run_pipeline(state.clone(), upload.bytes, request_id.clone()).await
        }
        Err(e) => Err(e),
    };

    let diagnosis = Diagnosis::resolve(&state.table, result);
    let status = log_outcome(&request_id, &diagnosis);

    // Bytes that never decoded would only show up as a broken image.
    if matches!(&diagnosis, Diagnosis::Failed(e) if e.stage() == Stage::Decode) {
        preview = None;
    }

    let results = preview.unwrap_or_default() + &render::diagnosis(&diagnosis);
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(render::page(&results))
}

pub async fn predict_json(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4().to_string();

    let result = match read_upload(payload, state.max_upload_bytes).await {
        Ok(upload) => run_pipeline(state.clone(), upload.bytes, request_id.clone()).await,
        Err(e) => Err(e),
    };

    let diagnosis = Diagnosis::resolve(&state.table, result);
    log_outcome(&request_id, &diagnosis);

    let (prediction, disease) = match diagnosis {
        Diagnosis::Identified { prediction, record } => (prediction, Some(record.clone())),
        Diagnosis::Unmapped { prediction } => (prediction, None),
        Diagnosis::Failed(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok().json(PredictionResponse {
        request_id,
        class_index: prediction.class_index,
        confidence: prediction.confidence,
        top: prediction.top(TOP_K),
        disease,
    }))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        classes: state.classifier.num_classes(),
        table_entries: state.table.len(),
    })
}

fn log_outcome(request_id: &str, diagnosis: &Diagnosis<'_>) -> StatusCode {
    match diagnosis {
        Diagnosis::Identified { prediction, record } => {
            info!(
                "[{request_id}] {} ({:.2}%)",
                record.disease, prediction.confidence
            );
            StatusCode::OK
        }
        Diagnosis::Unmapped { prediction } => {
            warn!(
                "[{request_id}] class {} has no disease table entry",
                prediction.class_index
            );
            StatusCode::OK
        }
        Diagnosis::Failed(e) => {
            warn!("[{request_id}] failed at {} stage: {e}", e.stage());
            e.status_code()
        }
    }
}
