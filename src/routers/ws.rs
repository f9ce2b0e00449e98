use crate::layers::auth::AuthedUser;
use crate::services::states::FileCoreState;
use crate::services::ws_channel::{InboundEvent, OutboundEvent};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> axum::Router<Arc<FileCoreState>> {
    let authed_layer = crate::filecore_layer_builder!(u);
    axum::Router::new()
        .route("/", axum::routing::get(upgrade))
        .layer(authed_layer())
}

pub async fn upgrade(
    State(state): State<Arc<FileCoreState>>,
    AuthedUser(user_id): AuthedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<FileCoreState>, user_id: i64) {
    let (mut sink, mut stream) = socket.split();
    let (socket_id, mut outbound_rx) = state.ws_hub.register(user_id).await;

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, socket_id, user_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = &mut writer => break,
        }
    }

    writer.abort();
    let uploads = &state.uploads;
    state
        .ws_hub
        .unregister(socket_id, |session_id, owner_user_id| async move {
            let _ = uploads.cancel(session_id, owner_user_id).await;
        })
        .await;
}

async fn handle_inbound(state: &Arc<FileCoreState>, socket_id: Uuid, user_id: i64, text: &str) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            state
                .ws_hub
                .send_to_socket(
                    socket_id,
                    OutboundEvent::UploadError {
                        upload_id: None,
                        session_id: None,
                        message: format!("malformed message: {e}"),
                    },
                )
                .await;
            return;
        }
    };
    match event {
        InboundEvent::InitiateUpload {
            upload_id,
            original_name,
            declared_mime,
            total_size,
            chunk_size,
        } => {
            let Some(chunk_size) = NonZeroU32::new(chunk_size) else {
                emit_error(state, socket_id, Some(upload_id), None, "chunk_size must be nonzero").await;
                return;
            };
            match state
                .uploads
                .initiate(&state.db, user_id, original_name, declared_mime, total_size, chunk_size)
                .await
            {
                Ok(session) => {
                    state.ws_hub.track_session(socket_id, session.session_id).await;
                    state
                        .ws_hub
                        .send_to_socket(
                            socket_id,
                            OutboundEvent::UploadInitiated {
                                upload_id,
                                session_id: session.session_id,
                                total_chunks: session.total_chunks,
                            },
                        )
                        .await;
                }
                Err(e) => emit_error(state, socket_id, Some(upload_id), None, &e.to_string()).await,
            }
        }
        InboundEvent::UploadChunk {
            upload_id,
            session_id,
            chunk_index,
            data,
            checksum_sha256,
        } => {
            let Ok(bytes) = BASE64.decode(&data) else {
                emit_error(state, socket_id, Some(upload_id), Some(session_id), "invalid base64 chunk payload").await;
                return;
            };
            let Ok(expected) = hex::decode(&checksum_sha256).and_then(|v| {
                v.try_into().map_err(|_| hex::FromHexError::InvalidStringLength)
            }) else {
                emit_error(state, socket_id, Some(upload_id), Some(session_id), "invalid chunk checksum").await;
                return;
            };
            match state
                .uploads
                .accept_chunk(session_id, user_id, chunk_index, &bytes, expected)
                .await
            {
                Ok(progress) => {
                    state
                        .ws_hub
                        .send_to_socket(
                            socket_id,
                            OutboundEvent::ChunkUploaded {
                                upload_id,
                                session_id,
                                chunk_index,
                                completed_count: progress.completed_count,
                            },
                        )
                        .await;
                    state
                        .ws_hub
                        .send_to_user(user_id, OutboundEvent::UploadProgress { session_id, progress })
                        .await;
                }
                Err(e) => emit_error(state, socket_id, Some(upload_id), Some(session_id), &e.to_string()).await,
            }
        }
        InboundEvent::CompleteUpload {
            upload_id,
            session_id,
            whole_file_sha256,
        } => {
            let whole_file_sha256 = match whole_file_sha256 {
                Some(hex_str) => match hex::decode(&hex_str).and_then(|v| {
                    v.try_into().map_err(|_| hex::FromHexError::InvalidStringLength)
                }) {
                    Ok(arr) => Some(arr),
                    Err(_) => {
                        emit_error(state, socket_id, Some(upload_id), Some(session_id), "invalid whole-file checksum").await;
                        return;
                    }
                },
                None => None,
            };
            let (allow, ceilings) = match crate::get_batch_tuple!(
                state.db.dyn_settings(),
                crate::models::dyn_setting::AllowMimeTypes,
                crate::models::dyn_setting::MaxImageSize,
                crate::models::dyn_setting::MaxAudioSize,
                crate::models::dyn_setting::MaxDocumentSize,
                crate::models::dyn_setting::MaxVideoSize,
                crate::models::dyn_setting::MaxOtherSize
            ) {
                Ok((allow, image, audio, document, video, other)) => (
                    allow,
                    crate::services::validation::SizeCeilings {
                        image,
                        audio,
                        document,
                        video,
                        other,
                    },
                ),
                Err(e) => {
                    emit_error(state, socket_id, Some(upload_id), Some(session_id), &e.to_string()).await;
                    return;
                }
            };
            match state
                .uploads
                .complete(
                    &state.db,
                    &state.file_store,
                    &ceilings,
                    allow.as_deref(),
                    session_id,
                    user_id,
                    whole_file_sha256,
                )
                .await
            {
                Ok((record, is_new)) => {
                    state.ws_hub.untrack_session(socket_id, session_id).await;
                    state
                        .ws_hub
                        .send_to_socket(
                            socket_id,
                            OutboundEvent::UploadCompleted {
                                upload_id,
                                session_id,
                                file_id: record.id,
                                is_new,
                            },
                        )
                        .await;
                    state
                        .ws_hub
                        .send_to_user(
                            user_id,
                            OutboundEvent::FileUploaded {
                                file_id: record.id,
                                uploader_id: record.uploader_id,
                            },
                        )
                        .await;
                }
                Err(e) => emit_error(state, socket_id, Some(upload_id), Some(session_id), &e.to_string()).await,
            }
        }
        InboundEvent::CancelUpload { upload_id, session_id } => {
            match state.uploads.cancel(session_id, user_id).await {
                Ok(()) => {
                    state.ws_hub.untrack_session(socket_id, session_id).await;
                    state
                        .ws_hub
                        .send_to_socket(socket_id, OutboundEvent::UploadCancelled { upload_id, session_id })
                        .await;
                }
                Err(e) => emit_error(state, socket_id, Some(upload_id), Some(session_id), &e.to_string()).await,
            }
        }
        InboundEvent::GetProgress { session_id } => match state.uploads.progress(session_id, user_id).await {
            Ok(progress) => {
                state
                    .ws_hub
                    .send_to_socket(socket_id, OutboundEvent::UploadProgressResponse { session_id, progress })
                    .await;
            }
            Err(e) => emit_error(state, socket_id, None, Some(session_id), &e.to_string()).await,
        },
        InboundEvent::UploadSmallFile {
            upload_id,
            original_name,
            declared_mime,
            declared_size,
            data,
        } => {
            let Ok(bytes) = BASE64.decode(&data) else {
                emit_error(state, socket_id, Some(upload_id), None, "invalid base64 payload").await;
                return;
            };
            if bytes.len() as u64 != declared_size {
                emit_error(
                    state,
                    socket_id,
                    Some(upload_id),
                    None,
                    "declared size does not match payload length",
                )
                .await;
                return;
            }
            let (allow, ceilings) = match crate::get_batch_tuple!(
                state.db.dyn_settings(),
                crate::models::dyn_setting::AllowMimeTypes,
                crate::models::dyn_setting::MaxImageSize,
                crate::models::dyn_setting::MaxAudioSize,
                crate::models::dyn_setting::MaxDocumentSize,
                crate::models::dyn_setting::MaxVideoSize,
                crate::models::dyn_setting::MaxOtherSize
            ) {
                Ok((allow, image, audio, document, video, other)) => (
                    allow,
                    crate::services::validation::SizeCeilings {
                        image,
                        audio,
                        document,
                        video,
                        other,
                    },
                ),
                Err(e) => {
                    emit_error(state, socket_id, Some(upload_id), None, &e.to_string()).await;
                    return;
                }
            };
            if let Err(e) = crate::services::validation::validate_upload(
                &original_name,
                &declared_mime,
                declared_size,
                allow.as_deref(),
                &ceilings,
                Some(&bytes),
            ) {
                emit_error(state, socket_id, Some(upload_id), None, &e.to_string()).await;
                return;
            }
            let ext = infer::get(&bytes).map(|t| t.extension().to_string()).unwrap_or_default();
            match state
                .file_store
                .put_single_shot(&state.db, &bytes, original_name, declared_mime, &ext, user_id)
                .await
            {
                Ok((record, is_new)) => {
                    state
                        .ws_hub
                        .send_to_socket(
                            socket_id,
                            OutboundEvent::UploadCompleted {
                                upload_id,
                                session_id: Uuid::nil(),
                                file_id: record.id,
                                is_new,
                            },
                        )
                        .await;
                    state
                        .ws_hub
                        .send_to_user(
                            user_id,
                            OutboundEvent::FileUploaded {
                                file_id: record.id,
                                uploader_id: record.uploader_id,
                            },
                        )
                        .await;
                }
                Err(e) => emit_error(state, socket_id, Some(upload_id), None, &e.to_string()).await,
            }
        }
    }
}

async fn emit_error(
    state: &Arc<FileCoreState>,
    socket_id: Uuid,
    upload_id: Option<String>,
    session_id: Option<Uuid>,
    message: &str,
) {
    state
        .ws_hub
        .send_to_socket(
            socket_id,
            OutboundEvent::UploadError {
                upload_id,
                session_id,
                message: message.to_string(),
            },
        )
        .await;
}
