use crate::get_batch_tuple;
use crate::layers::auth::AuthedUser;
use crate::models::api::prelude::*;
use crate::models::attachment::NewMessageAttachment;
use crate::models::const_val::{MAX_BATCH_LINK_MESSAGE, MAX_BATCH_UPLOAD_FILES};
use crate::models::dyn_setting::{
    AllowMimeTypes, MaxAudioSize, MaxDocumentSize, MaxImageSize, MaxOtherSize, MaxVideoSize,
};
use crate::models::file::FileRecord;
use crate::models::token::{IssueTokenOptions, Permission};
use crate::services::states::FileCoreState;
use crate::services::states::db::{PageQueryBinder, PageQueryCursor, PageQueryInner};
use crate::services::transcoder::{QualityPreset, Transcoder};
use crate::services::validation::{SizeCeilings, is_web_compatible_video, needs_conversion, validate_upload};
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub type FilesRouterState = State<Arc<FileCoreState>>;

async fn mime_allow_list_and_ceilings(
    state: &FileCoreState,
) -> ApiResult<(Option<Vec<std::borrow::Cow<'static, str>>>, SizeCeilings)> {
    let (allow, image, audio, document, video, other) = get_batch_tuple!(
        state.db.dyn_settings(),
        AllowMimeTypes,
        MaxImageSize,
        MaxAudioSize,
        MaxDocumentSize,
        MaxVideoSize,
        MaxOtherSize
    )
    .map_err(|e| internal!(e, "Failed to read upload settings"))?;
    Ok((
        allow,
        SizeCeilings {
            image,
            audio,
            document,
            video,
            other,
        },
    ))
}

#[derive(Debug, Serialize)]
pub struct UploadedFileResp {
    pub id: Uuid,
    pub original_name: String,
    pub declared_mime: String,
    pub byte_size: i64,
    pub is_new: bool,
}

impl From<(FileRecord, bool)> for UploadedFileResp {
    fn from((record, is_new): (FileRecord, bool)) -> Self {
        Self {
            id: record.id,
            original_name: record.original_name,
            declared_mime: record.declared_mime,
            byte_size: record.byte_size,
            is_new,
        }
    }
}

/// `POST /files/upload`: single-shot multipart upload, field `file`.
pub async fn upload(
    State(state): FilesRouterState,
    AuthedUser(user_id): AuthedUser,
    mut multipart: Multipart,
) -> ApiResult<Json<GeneralResponse<UploadedFileResp>>> {
    let mut bytes: Option<bytes::Bytes> = None;
    let mut original_name = String::new();
    let mut declared_mime = String::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request!(e, "Invalid multipart body"))?
    {
        if field.name() == Some("file") {
            original_name = field.file_name().unwrap_or("upload.bin").to_string();
            declared_mime = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request!(e, "Failed to read multipart field"))?,
            );
        }
    }
    let bytes = bytes.ok_or(bad_request!("Missing 'file' field"))?;
    let (allow_list, ceilings) = mime_allow_list_and_ceilings(&state).await?;
    validate_upload(
        &original_name,
        &declared_mime,
        bytes.len() as u64,
        allow_list.as_deref(),
        &ceilings,
        Some(&bytes),
    )
    .map_err(|e| match e {
        crate::services::validation::ValidationError::Rejected(reasons) => {
            validation!("Upload rejected").with_reasons(reasons)
        }
    })?;
    let ext = infer::get(&bytes).map(|t| t.extension().to_string()).unwrap_or_default();
    let result = state
        .file_store
        .put_single_shot(&state.db, &bytes, original_name, declared_mime, &ext, user_id)
        .await
        .map_err(|e| internal!(e, "Failed to store file"))?;
    Ok(general_json_res!("Uploaded", UploadedFileResp::from(result)))
}

#[derive(Debug, Serialize)]
pub struct BatchUploadItem {
    pub file_name: String,
    pub result: Option<UploadedFileResp>,
    pub error: Option<String>,
}

/// `POST /files/upload/batch`: up to `MAX_BATCH_UPLOAD_FILES` independent files.
pub async fn upload_batch(
    State(state): FilesRouterState,
    AuthedUser(user_id): AuthedUser,
    mut multipart: Multipart,
) -> ApiResult<Json<GeneralResponse<Vec<BatchUploadItem>>>> {
    let (allow_list, ceilings) = mime_allow_list_and_ceilings(&state).await?;
    let mut results = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request!(e, "Invalid multipart body"))?
    {
        if field.name() != Some("files") {
            continue;
        }
        if results.len() >= MAX_BATCH_UPLOAD_FILES {
            return Err(bad_request!(format!(
                "At most {MAX_BATCH_UPLOAD_FILES} files per batch"
            )));
        }
        let original_name = field.file_name().unwrap_or("upload.bin").to_string();
        let declared_mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let item = match field.bytes().await {
            Ok(bytes) => {
                match validate_upload(
                    &original_name,
                    &declared_mime,
                    bytes.len() as u64,
                    allow_list.as_deref(),
                    &ceilings,
                    Some(&bytes),
                ) {
                    Ok(()) => {
                        let ext = infer::get(&bytes).map(|t| t.extension().to_string()).unwrap_or_default();
                        match state
                            .file_store
                            .put_single_shot(&state.db, &bytes, original_name.clone(), declared_mime, &ext, user_id)
                            .await
                        {
                            Ok(result) => BatchUploadItem {
                                file_name: original_name,
                                result: Some(result.into()),
                                error: None,
                            },
                            Err(e) => BatchUploadItem {
                                file_name: original_name,
                                result: None,
                                error: Some(e.to_string()),
                            },
                        }
                    }
                    Err(crate::services::validation::ValidationError::Rejected(reasons)) => {
                        BatchUploadItem {
                            file_name: original_name,
                            result: None,
                            error: Some(reasons.join("; ")),
                        }
                    }
                }
            }
            Err(e) => BatchUploadItem {
                file_name: original_name,
                result: None,
                error: Some(e.to_string()),
            },
        };
        results.push(item);
    }
    Ok(general_json_res!("Batch upload processed", results))
}

#[derive(Debug, Deserialize)]
pub struct DownloadUrlReq {
    pub expires_in_secs: Option<i64>,
    pub max_downloads: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DownloadUrlResp {
    pub token: String,
}

/// `POST /files/{id}/download-url`.
pub async fn mint_download_url(
    State(state): FilesRouterState,
    AuthedUser(user_id): AuthedUser,
    Path(file_id): Path<Uuid>,
    Json(req): Json<DownloadUrlReq>,
) -> ApiResult<Json<GeneralResponse<DownloadUrlResp>>> {
    state
        .file_store
        .get(&state.db, file_id)
        .await
        .map_err(|e| not_found!(e, "File not found"))?;
    let token = state
        .tokens
        .issue(
            file_id,
            user_id,
            IssueTokenOptions {
                expires_in: req.expires_in_secs.map(time::Duration::seconds),
                permissions: vec![Permission::Read, Permission::Download],
                max_uses: req.max_downloads,
                ip_pin: None,
            },
        )
        .await
        .map_err(|e| internal!(e, "Failed to issue token"))?;
    Ok(general_json_res!("Token issued", DownloadUrlResp { token }))
}

#[derive(Debug, Deserialize)]
pub struct LinkMessageReq {
    pub message_id: i64,
    pub caption: Option<String>,
}

/// `POST /files/{id}/link-message`.
pub async fn link_message(
    State(state): FilesRouterState,
    AuthedUser(_user_id): AuthedUser,
    Path(file_id): Path<Uuid>,
    Json(req): Json<LinkMessageReq>,
) -> ApiResult<Json<GeneralResponse<()>>> {
    state
        .db
        .attachments()
        .link(
            NewMessageAttachment {
                message_id: req.message_id,
                file_id,
                caption: req.caption,
                ordering_index: 0,
            },
            state.db.pool(),
        )
        .await
        .map_err(|e| internal!(e, "Failed to link attachment"))?;
    Ok(general_json_res!("Linked"))
}

#[derive(Debug, Deserialize)]
pub struct BatchLinkItem {
    pub file_id: Uuid,
    pub message_id: i64,
    pub caption: Option<String>,
    pub ordering_index: i32,
}

/// `POST /files/batch/link-message`: up to `MAX_BATCH_LINK_MESSAGE` attachments.
pub async fn batch_link_message(
    State(state): FilesRouterState,
    AuthedUser(_user_id): AuthedUser,
    Json(items): Json<Vec<BatchLinkItem>>,
) -> ApiResult<Json<GeneralResponse<()>>> {
    if items.len() > MAX_BATCH_LINK_MESSAGE {
        return Err(bad_request!(format!(
            "At most {MAX_BATCH_LINK_MESSAGE} attachments per call"
        )));
    }
    for item in items {
        state
            .db
            .attachments()
            .link(
                NewMessageAttachment {
                    message_id: item.message_id,
                    file_id: item.file_id,
                    caption: item.caption,
                    ordering_index: item.ordering_index,
                },
                state.db.pool(),
            )
            .await
            .map_err(|e| internal!(e, "Failed to link attachment"))?;
    }
    Ok(general_json_res!("Linked"))
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default)]
    pub start_after: i64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    20
}

/// `GET /files`: list own files, paginated.
pub async fn list_files(
    State(state): FilesRouterState,
    AuthedUser(user_id): AuthedUser,
    Query(q): Query<ListFilesQuery>,
) -> ApiResult<Json<GeneralResponse<crate::services::states::db::PageQueryResult<FileRecord>>>> {
    let binder = PageQueryBinder {
        start_after: q.start_after,
        page_size: q.page_size,
    };
    let result = binder
        .query_page_ctx(|inner: PageQueryInner| state.db.files().list_by_uploader(user_id, inner))
        .await
        .map_err(|e| internal!(e, "Failed to list files"))?;
    Ok(general_json_res!("Files", result))
}

/// `GET /files/{id}`: metadata.
pub async fn get_file(
    State(state): FilesRouterState,
    AuthedUser(_user_id): AuthedUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<GeneralResponse<FileRecord>>> {
    let record = state
        .file_store
        .get(&state.db, file_id)
        .await
        .map_err(|e| not_found!(e, "File not found"))?;
    Ok(general_json_res!("File", record))
}

/// `DELETE /files/{id}`: soft delete, owner only.
pub async fn delete_file(
    State(state): FilesRouterState,
    AuthedUser(user_id): AuthedUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<GeneralResponse<()>>> {
    state
        .file_store
        .soft_delete(&state.db, file_id, user_id)
        .await
        .map_err(|e| match e {
            crate::services::file_store::FileStoreError::NotOwner => forbidden!("Not the uploader"),
            other => internal!(other, "Failed to delete file"),
        })?;
    Ok(general_json_res!("Deleted"))
}

/// `GET /files/message/{message_id}/attachments`.
pub async fn message_attachments(
    State(state): FilesRouterState,
    AuthedUser(_user_id): AuthedUser,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<GeneralResponse<Vec<crate::models::attachment::MessageAttachment>>>> {
    let attachments = state
        .db
        .attachments()
        .list_by_message(message_id)
        .await
        .map_err(|e| internal!(e, "Failed to list attachments"))?;
    Ok(general_json_res!("Attachments", attachments))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// `GET /files/download/{id}?token=...`: always full body, attachment disposition.
pub async fn download(
    State(state): FilesRouterState,
    Path(file_id): Path<Uuid>,
    Query(q): Query<TokenQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let client_ip = client_ip_of(&headers);
    state
        .tokens
        .validate(&q.token, file_id, Permission::Download, client_ip.as_deref())
        .await
        .map_err(token_err_to_api)?;
    let record = state
        .file_store
        .get(&state.db, file_id)
        .await
        .map_err(|e| not_found!(e, "File not found"))?;
    let file = state
        .file_store
        .read_bytes(&record)
        .await
        .map_err(|e| internal!(e, "Failed to open file"))?;
    let body = Body::from_stream(tokio_util_compat_stream(file));
    let _ = state.db.files().record_download(file_id, time::OffsetDateTime::now_utc()).await;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, record.declared_mime)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", record.original_name),
        )
        .header(header::CACHE_CONTROL, "private, no-cache")
        .body(body)
        .map_err(|e| internal!(e, "Failed to build response"))?)
}

fn tokio_util_compat_stream(file: tokio::fs::File) -> tokio_util::io::ReaderStream<tokio::fs::File> {
    tokio_util::io::ReaderStream::new(file)
}

fn client_ip_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}

fn token_err_to_api(e: crate::services::token_service::TokenServiceError) -> ApiError {
    use crate::services::token_service::TokenServiceError as E;
    match e {
        E::Invalid | E::WrongFile => unauthorized!("Invalid or expired token"),
        E::PermissionDenied => forbidden!("Token does not grant this permission"),
        E::IpMismatch => forbidden!("Token is pinned to a different client"),
        E::UsesExhausted => forbidden!("Token has exhausted its uses"),
        E::FastKv(err) => internal!(err, "Token store error"),
    }
}

struct ParsedRange {
    start: u64,
    end: u64,
}

/// Parses a single-range `Range` header per spec §4.F's grammar. Only the
/// first valid spec is honoured; everything else yields `None` (unsatisfiable).
fn parse_range(header_val: &str, total: u64) -> Option<ParsedRange> {
    let spec = header_val.strip_prefix("bytes=")?.split(',').next()?.trim();
    if let Some(suffix) = spec.strip_prefix('-') {
        let len: u64 = suffix.parse().ok()?;
        if len == 0 || total == 0 {
            return None;
        }
        let len = len.min(total);
        return Some(ParsedRange {
            start: total - len,
            end: total - 1,
        });
    }
    let (start_s, end_s) = spec.split_once('-')?;
    let start: u64 = start_s.parse().ok()?;
    let end = if end_s.is_empty() {
        total.checked_sub(1)?
    } else {
        end_s.parse().ok()?
    };
    if start > end || end >= total {
        return None;
    }
    Some(ParsedRange { start, end })
}

/// `GET /files/preview/{id}?token=...`: inline preview with Range support and
/// on-demand video transcoding.
pub async fn preview(
    State(state): FilesRouterState,
    Path(file_id): Path<Uuid>,
    Query(q): Query<TokenQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let client_ip = client_ip_of(&headers);
    let binding = state
        .tokens
        .validate(&q.token, file_id, Permission::Read, client_ip.as_deref())
        .await
        .map_err(token_err_to_api)?;
    if binding.file_id != file_id {
        return Err(forbidden!("Token does not grant this file"));
    }
    let record = state
        .file_store
        .get(&state.db, file_id)
        .await
        .map_err(|e| not_found!(e, "File not found"))?;

    let mut bytes = tokio::fs::read(
        state
            .file_store
            .store()
            .absolute_path(&record.storage_path)
            .map_err(|e| internal!(e, "Failed to resolve storage path"))?,
    )
    .await
    .map_err(|e| internal!(e, "Failed to read file"))?;
    let mut mime = record.declared_mime.clone();
    let mut converted = false;
    let original_mime = record.declared_mime.clone();

    if needs_conversion(&mime) {
        let transcoder = Transcoder::new(state.config.transcoder.clone());
        match transcoder.transcode(&bytes, QualityPreset::Medium).await {
            Ok(outcome) => {
                bytes = outcome.bytes;
                mime = "video/mp4".to_string();
                converted = true;
            }
            Err(e) => {
                tracing::warn!(file_id = %file_id, error = %e, "on-demand transcode failed, serving original");
            }
        }
    }

    if mime.starts_with("video/") && !is_web_compatible_video(&mime) {
        return Err(bad_request!(
            "This video format cannot be previewed in-browser; download instead"
        ));
    }

    let total = bytes.len() as u64;
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    if let Some(raw) = range_header
        && mime.starts_with("video/")
    {
        let Some(range) = parse_range(raw, total) else {
            return Ok(Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total}"))
                .body(Body::empty())
                .map_err(|e| internal!(e, "Failed to build response"))?);
        };
        let slice = bytes[range.start as usize..=range.end as usize].to_vec();
        let mut builder = Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, &mime)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{total}", range.start, range.end),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, slice.len().to_string())
            .header(header::CACHE_CONTROL, "private, max-age=3600");
        if converted {
            builder = builder
                .header("x-video-converted", "true")
                .header("x-original-format", original_mime);
        }
        return Ok(builder
            .body(Body::from(slice))
            .map_err(|e| internal!(e, "Failed to build response"))?);
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &mime)
        .header(header::CONTENT_DISPOSITION, "inline")
        .header(header::CACHE_CONTROL, "private, max-age=3600");
    if mime.starts_with("video/") || mime.starts_with("audio/") {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }
    if converted {
        builder = builder
            .header("x-video-converted", "true")
            .header("x-original-format", original_mime);
    }
    Ok(builder
        .body(Body::from(bytes))
        .map_err(|e| internal!(e, "Failed to build response"))?)
}

pub fn router() -> Router<Arc<FileCoreState>> {
    let authed_layer = crate::filecore_layer_builder!(u);
    Router::new()
        .route("/upload", post(upload))
        .route("/upload/batch", post(upload_batch))
        .route("/{id}/download-url", post(mint_download_url))
        .route("/{id}/link-message", post(link_message))
        .route("/batch/link-message", post(batch_link_message))
        .route("/", get(list_files))
        .route("/{id}", get(get_file).delete(delete_file))
        .route("/message/{message_id}/attachments", get(message_attachments))
        .layer(authed_layer())
        .merge(
            Router::new()
                .route("/download/{id}", get(download))
                .route("/preview/{id}", get(preview)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bounded_range() {
        let r = parse_range("bytes=0-99", 1000).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 99);
    }

    #[test]
    fn parses_an_open_ended_range() {
        let r = parse_range("bytes=500-", 1000).unwrap();
        assert_eq!(r.start, 500);
        assert_eq!(r.end, 999);
    }

    #[test]
    fn parses_a_suffix_range() {
        let r = parse_range("bytes=-100", 1000).unwrap();
        assert_eq!(r.start, 900);
        assert_eq!(r.end, 999);
    }

    #[test]
    fn suffix_range_is_clamped_to_total() {
        let r = parse_range("bytes=-5000", 1000).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 999);
    }

    #[test]
    fn rejects_missing_bytes_prefix() {
        assert!(parse_range("0-99", 1000).is_none());
    }

    #[test]
    fn rejects_start_past_end() {
        assert!(parse_range("bytes=500-100", 1000).is_none());
    }

    #[test]
    fn rejects_end_beyond_total() {
        assert!(parse_range("bytes=0-1000", 1000).is_none());
    }

    #[test]
    fn only_the_first_of_multiple_ranges_is_honoured() {
        let r = parse_range("bytes=0-9,20-29", 1000).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 9);
    }

    #[test]
    fn zero_length_suffix_is_rejected() {
        assert!(parse_range("bytes=-0", 1000).is_none());
    }
}
