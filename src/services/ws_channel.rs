//! Upload notification hub (component H): per-socket bookkeeping plus
//! same-user multi-device fanout. Grounded on the teacher's `ClientInfoLayer`
//! tower-service shape for the "wrap the connection, stash some state"
//! pattern, reassembled around a `scc`-backed socket registry instead of a
//! single in-request extension (a socket long outlives one request).
use crate::models::chunk_session::ChunkSessionProgress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    UploadInitiated {
        upload_id: String,
        session_id: Uuid,
        total_chunks: u32,
    },
    ChunkUploaded {
        upload_id: String,
        session_id: Uuid,
        chunk_index: u32,
        completed_count: u32,
    },
    UploadProgress {
        session_id: Uuid,
        progress: ChunkSessionProgress,
    },
    UploadCompleted {
        upload_id: String,
        session_id: Uuid,
        file_id: Uuid,
        is_new: bool,
    },
    FileUploaded {
        file_id: Uuid,
        uploader_id: i64,
    },
    UploadCancelled {
        upload_id: String,
        session_id: Uuid,
    },
    UploadError {
        upload_id: Option<String>,
        session_id: Option<Uuid>,
        message: String,
    },
    UploadProgressResponse {
        session_id: Uuid,
        progress: ChunkSessionProgress,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Priority {
    High,
    Normal,
}

impl OutboundEvent {
    /// Terminal/ack events (upload finished, cancelled, errored, or a file
    /// became visible to the user) drain ahead of in-flight progress chatter.
    fn priority(&self) -> Priority {
        match self {
            Self::UploadCompleted { .. }
            | Self::UploadCancelled { .. }
            | Self::UploadError { .. }
            | Self::FileUploaded { .. } => Priority::High,
            Self::UploadInitiated { .. }
            | Self::ChunkUploaded { .. }
            | Self::UploadProgress { .. }
            | Self::UploadProgressResponse { .. } => Priority::Normal,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    InitiateUpload {
        upload_id: String,
        original_name: String,
        declared_mime: String,
        total_size: u64,
        chunk_size: u32,
    },
    UploadChunk {
        upload_id: String,
        session_id: Uuid,
        chunk_index: u32,
        /// base64-encoded chunk payload.
        data: String,
        checksum_sha256: String,
    },
    CompleteUpload {
        upload_id: String,
        session_id: Uuid,
        whole_file_sha256: Option<String>,
    },
    CancelUpload {
        upload_id: String,
        session_id: Uuid,
    },
    GetProgress {
        session_id: Uuid,
    },
    UploadSmallFile {
        upload_id: String,
        original_name: String,
        declared_mime: String,
        declared_size: u64,
        /// base64-encoded payload.
        data: String,
    },
}

struct SocketHandle {
    user_id: i64,
    active_sessions: Mutex<HashSet<Uuid>>,
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

const PENDING_QUEUE_CAP: usize = 64;

/// Per-user overflow queue split into high/normal priority tiers; the high
/// tier always drains first, both on reconnect flush and on the periodic
/// sweep.
#[derive(Default)]
struct PendingQueue {
    high: VecDeque<OutboundEvent>,
    normal: VecDeque<OutboundEvent>,
}

impl PendingQueue {
    fn push(&mut self, event: OutboundEvent) {
        let queue = match event.priority() {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
        };
        queue.push_back(event);
        while queue.len() > PENDING_QUEUE_CAP {
            queue.pop_front();
        }
    }

    fn pop_front(&mut self) -> Option<OutboundEvent> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }
}

/// Registry of live upload sockets plus a small per-user overflow queue for
/// fanout events that arrive while the user has no socket connected.
#[derive(Default)]
pub struct WsHub {
    sockets: scc::HashMap<Uuid, std::sync::Arc<SocketHandle>>,
    by_user: scc::HashMap<i64, scc::HashSet<Uuid>>,
    pending: scc::HashMap<i64, Mutex<PendingQueue>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: i64) -> (Uuid, mpsc::UnboundedReceiver<OutboundEvent>) {
        let socket_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = std::sync::Arc::new(SocketHandle {
            user_id,
            active_sessions: Mutex::new(HashSet::new()),
            sender: tx,
        });
        let _ = self.sockets.insert_async(socket_id, handle).await;
        match self.by_user.entry_async(user_id).await {
            scc::hash_map::Entry::Occupied(o) => {
                let _ = o.get().insert(socket_id);
            }
            scc::hash_map::Entry::Vacant(v) => {
                let set = scc::HashSet::new();
                let _ = set.insert(socket_id);
                v.insert_entry(set);
            }
        }
        if let Some(queue_entry) = self.pending.get_async(&user_id).await {
            let mut queue = queue_entry.lock().expect("pending queue poisoned");
            while let Some(event) = queue.pop_front() {
                if let Some(socket) = self.sockets.get_async(&socket_id).await {
                    let _ = socket.sender.send(event);
                }
            }
        }

        (socket_id, rx)
    }

    /// Cancels every session the socket still had open, then drops its
    /// registry entry. Cancellation errors are swallowed: the session may
    /// already be terminal, which is not a failure on disconnect.
    pub async fn unregister<F, Fut>(&self, socket_id: Uuid, cancel: F)
    where
        F: Fn(Uuid, i64) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let Some((_, handle)) = self.sockets.remove_async(&socket_id).await else {
            return;
        };
        if let Some(sessions) = self.by_user.get_async(&handle.user_id).await {
            sessions.remove(&socket_id);
        }
        let sessions: Vec<Uuid> = handle
            .active_sessions
            .lock()
            .expect("active sessions poisoned")
            .iter()
            .copied()
            .collect();
        for session_id in sessions {
            cancel(session_id, handle.user_id).await;
        }
    }

    pub async fn track_session(&self, socket_id: Uuid, session_id: Uuid) {
        if let Some(socket) = self.sockets.get_async(&socket_id).await {
            socket
                .active_sessions
                .lock()
                .expect("active sessions poisoned")
                .insert(session_id);
        }
    }

    pub async fn untrack_session(&self, socket_id: Uuid, session_id: Uuid) {
        if let Some(socket) = self.sockets.get_async(&socket_id).await {
            socket
                .active_sessions
                .lock()
                .expect("active sessions poisoned")
                .remove(&session_id);
        }
    }

    /// Sends to one socket only, used for ack-style replies correlated to the
    /// originating connection (e.g. `chunk_uploaded`).
    pub async fn send_to_socket(&self, socket_id: Uuid, event: OutboundEvent) {
        if let Some(socket) = self.sockets.get_async(&socket_id).await {
            let _ = socket.sender.send(event);
        }
    }

    /// Fans out to every socket belonging to `user_id`. If the user currently
    /// has no sockets, the event is queued (capped) for delivery on the next
    /// `register`.
    pub async fn send_to_user(&self, user_id: i64, event: OutboundEvent) {
        let mut delivered = false;
        if let Some(sessions) = self.by_user.get_async(&user_id).await {
            sessions.scan(|socket_id| {
                if let Some(sender) = self.clone_sender_sync(*socket_id) {
                    let _ = sender.send(event.clone());
                    delivered = true;
                }
            });
        }
        if !delivered {
            self.queue_for_user(user_id, event).await;
        }
    }

    fn clone_sender_sync(&self, socket_id: Uuid) -> Option<mpsc::UnboundedSender<OutboundEvent>> {
        self.sockets.get(&socket_id).map(|s| s.sender.clone())
    }

    async fn queue_for_user(&self, user_id: i64, event: OutboundEvent) {
        match self.pending.entry_async(user_id).await {
            scc::hash_map::Entry::Occupied(o) => {
                o.get().lock().expect("pending queue poisoned").push(event);
            }
            scc::hash_map::Entry::Vacant(v) => {
                let mut q = PendingQueue::default();
                q.push(event);
                v.insert_entry(Mutex::new(q));
            }
        }
    }

    /// Drops every pending queue entry for users that still have no socket,
    /// logging how many were discarded. Called by the periodic cleanup task;
    /// queues for users that reconnected are already empty by then.
    pub async fn drain_queued(&self) -> usize {
        let mut drained = 0usize;
        let stale: Vec<i64> = {
            let mut ids = Vec::new();
            self.pending.scan_async(|user_id, _| ids.push(*user_id)).await;
            ids
        };
        for user_id in stale {
            if self.by_user.contains_async(&user_id).await {
                continue;
            }
            if let Some((_, queue)) = self.pending.remove_async(&user_id).await {
                drained += queue.into_inner().expect("pending queue poisoned").len();
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> OutboundEvent {
        OutboundEvent::FileUploaded {
            file_id: Uuid::new_v4(),
            uploader_id: 1,
        }
    }

    #[tokio::test]
    async fn send_to_socket_delivers_to_its_receiver() {
        let hub = WsHub::new();
        let (socket_id, mut rx) = hub.register(1).await;
        hub.send_to_socket(socket_id, sample_event()).await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_to_user_fans_out_to_every_registered_socket() {
        let hub = WsHub::new();
        let (_, mut rx_a) = hub.register(1).await;
        let (_, mut rx_b) = hub.register(1).await;
        hub.send_to_user(1, sample_event()).await;
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_to_user_with_no_socket_queues_and_flushes_on_register() {
        let hub = WsHub::new();
        hub.send_to_user(42, sample_event()).await;
        let (_, mut rx) = hub.register(42).await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unregister_invokes_cancel_for_each_tracked_session() {
        let hub = WsHub::new();
        let (socket_id, _rx) = hub.register(5).await;
        let session_id = Uuid::new_v4();
        hub.track_session(socket_id, session_id).await;
        let cancelled = std::sync::Arc::new(Mutex::new(Vec::new()));
        let cancelled_clone = cancelled.clone();
        hub.unregister(socket_id, move |sid, uid| {
            let cancelled = cancelled_clone.clone();
            async move {
                cancelled.lock().unwrap().push((sid, uid));
            }
        })
        .await;
        assert_eq!(cancelled.lock().unwrap().as_slice(), &[(session_id, 5)]);
    }

    #[tokio::test]
    async fn untrack_session_prevents_its_cancel_callback() {
        let hub = WsHub::new();
        let (socket_id, _rx) = hub.register(5).await;
        let session_id = Uuid::new_v4();
        hub.track_session(socket_id, session_id).await;
        hub.untrack_session(socket_id, session_id).await;
        let cancelled = std::sync::Arc::new(Mutex::new(Vec::new()));
        let cancelled_clone = cancelled.clone();
        hub.unregister(socket_id, move |sid, uid| {
            let cancelled = cancelled_clone.clone();
            async move {
                cancelled.lock().unwrap().push((sid, uid));
            }
        })
        .await;
        assert!(cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_queued_only_drops_queues_for_users_still_without_a_socket() {
        let hub = WsHub::new();
        hub.send_to_user(1, sample_event()).await;
        hub.send_to_user(2, sample_event()).await;
        let (_, _rx) = hub.register(1).await;
        let drained = hub.drain_queued().await;
        assert_eq!(drained, 1);
    }

    fn sample_progress_event() -> OutboundEvent {
        OutboundEvent::UploadProgress {
            session_id: Uuid::new_v4(),
            progress: ChunkSessionProgress {
                session_id: Uuid::new_v4(),
                status: crate::models::chunk_session::ChunkSessionStatus::Uploading,
                completed_count: 1,
                total_chunks: 4,
                failed: Vec::new(),
                percentage: 25,
                terminal: false,
            },
        }
    }

    #[tokio::test]
    async fn high_priority_events_flush_before_normal_on_reconnect() {
        let hub = WsHub::new();
        hub.send_to_user(7, sample_progress_event()).await;
        hub.send_to_user(7, sample_event()).await;
        let (_, mut rx) = hub.register(7).await;
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, OutboundEvent::FileUploaded { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, OutboundEvent::UploadProgress { .. }));
    }
}
