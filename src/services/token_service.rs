//! Capability token service (component E). Opaque bearer tokens: the token
//! string itself is 256 bits of randomness and is never parsed for claims,
//! grounded on spec §4.E and generalised from the teacher's session-token
//! generation pattern (`rand`-backed random identifiers) onto a fast-store
//! binding record instead of a signed cookie.
use crate::models::const_val::{
    DOWNLOAD_EVENTS_PER_FILE_CAP, DOWNLOAD_EVENTS_PER_FILE_TTL, DOWNLOAD_EVENTS_PER_USER_CAP,
    DOWNLOAD_EVENTS_PER_USER_TTL, ONE_TIME_TOKEN_TTL_MAX, TOKEN_TTL_DEFAULT, TOKEN_TTL_MAX,
    TOKEN_TTL_MIN, USER_TOKEN_INDEX_TTL,
};
use crate::models::token::{DownloadEvent, IssueTokenOptions, Permission, TokenBinding};
use crate::services::states::fastkv::{FastKv, FastKvError, MokaFastKv};
use rand::RngCore;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenServiceError {
    #[error("token is missing, expired, or revoked")]
    Invalid,
    #[error("token does not grant the required permission")]
    PermissionDenied,
    #[error("token is pinned to a different client IP")]
    IpMismatch,
    #[error("token has exhausted its allowed uses")]
    UsesExhausted,
    #[error("token does not belong to the requested file")]
    WrongFile,
    #[error(transparent)]
    FastKv(#[from] FastKvError),
}

pub type TokenServiceResult<T> = Result<T, TokenServiceError>;

fn token_key(token: &str) -> String {
    format!("download_token:{token}")
}
fn user_index_key(user_id: i64) -> String {
    format!("user_tokens:{user_id}")
}
fn file_events_key(file_id: Uuid) -> String {
    format!("download_events:{file_id}")
}
fn user_events_key(user_id: i64) -> String {
    format!("user_downloads:{user_id}")
}

/// 256 bits of randomness, hex-encoded: 64 URL-safe characters, well past
/// the spec's 20-character floor.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct TokenService {
    kv: MokaFastKv,
}

impl TokenService {
    pub fn new(kv: MokaFastKv) -> Self {
        Self { kv }
    }

    pub async fn issue(
        &self,
        file_id: Uuid,
        subject_user_id: i64,
        options: IssueTokenOptions,
    ) -> TokenServiceResult<String> {
        let ttl = options
            .expires_in
            .unwrap_or(TOKEN_TTL_DEFAULT)
            .clamp(TOKEN_TTL_MIN, TOKEN_TTL_MAX);
        let now = OffsetDateTime::now_utc();
        let binding = TokenBinding {
            file_id,
            subject_user_id,
            permissions: options.permissions,
            expires_at: now + ttl,
            max_uses: options.max_uses,
            use_count: 0,
            ip_pin: options.ip_pin,
            created_at: now,
        };
        let token = generate_token();
        let ttl_std: std::time::Duration = ttl.try_into().unwrap_or_default();
        self.kv.hash_set(&token_key(&token), &binding, Some(ttl_std)).await?;
        self.kv
            .set_add(
                &user_index_key(subject_user_id),
                token.clone(),
                Some(USER_TOKEN_INDEX_TTL.try_into().unwrap_or_default()),
            )
            .await;
        Ok(token)
    }

    /// A read-only token with a short default TTL, used for inline previews.
    pub async fn issue_preview(&self, file_id: Uuid, subject_user_id: i64) -> TokenServiceResult<String> {
        self.issue(
            file_id,
            subject_user_id,
            IssueTokenOptions {
                expires_in: Some(TOKEN_TTL_MIN),
                permissions: vec![Permission::Read],
                max_uses: None,
                ip_pin: None,
            },
        )
        .await
    }

    /// A single-use token for one download, expiring within at most 5 minutes.
    pub async fn issue_one_time(
        &self,
        file_id: Uuid,
        subject_user_id: i64,
        ip_pin: Option<String>,
    ) -> TokenServiceResult<String> {
        self.issue(
            file_id,
            subject_user_id,
            IssueTokenOptions {
                expires_in: Some(ONE_TIME_TOKEN_TTL_MAX),
                permissions: vec![Permission::Download],
                max_uses: Some(1),
                ip_pin,
            },
        )
        .await
    }

    /// Validates the token against `file_id`/`required`/`client_ip`. A
    /// successful *download* validation increments the use counter and logs
    /// the event; *read* validations are not counted.
    pub async fn validate(
        &self,
        token: &str,
        file_id: Uuid,
        required: Permission,
        client_ip: Option<&str>,
    ) -> TokenServiceResult<TokenBinding> {
        let ttl_std: std::time::Duration = TOKEN_TTL_MAX.try_into().unwrap_or_default();
        let result = self
            .kv
            .hash_update::<TokenBinding, _, _>(&token_key(token), Some(ttl_std), |current| {
                let Some(mut binding) = current else {
                    return (None, Err(TokenServiceError::Invalid));
                };
                if OffsetDateTime::now_utc() >= binding.expires_at {
                    return (None, Err(TokenServiceError::Invalid));
                }
                if binding.file_id != file_id {
                    let prev = binding.clone();
                    return (Some(prev), Err(TokenServiceError::WrongFile));
                }
                if !binding.has_permission(required) {
                    let prev = binding.clone();
                    return (Some(prev), Err(TokenServiceError::PermissionDenied));
                }
                if let (Some(pin), Some(ip)) = (&binding.ip_pin, client_ip)
                    && pin != ip
                {
                    let prev = binding.clone();
                    return (Some(prev), Err(TokenServiceError::IpMismatch));
                }
                if let Some(max) = binding.max_uses
                    && binding.use_count >= max
                {
                    let prev = binding.clone();
                    return (Some(prev), Err(TokenServiceError::UsesExhausted));
                }
                if required == Permission::Download {
                    binding.use_count += 1;
                }
                let snapshot = binding.clone();
                (Some(binding), Ok(snapshot))
            })
            .await??;

        if required == Permission::Download {
            self.kv
                .list_push_capped(
                    &file_events_key(file_id),
                    &DownloadEvent {
                        file_id,
                        user_id: result.subject_user_id,
                        at: OffsetDateTime::now_utc(),
                    },
                    DOWNLOAD_EVENTS_PER_FILE_CAP,
                    DOWNLOAD_EVENTS_PER_FILE_TTL.try_into().unwrap_or_default(),
                )
                .await?;
            self.kv
                .list_push_capped(
                    &user_events_key(result.subject_user_id),
                    &DownloadEvent {
                        file_id,
                        user_id: result.subject_user_id,
                        at: OffsetDateTime::now_utc(),
                    },
                    DOWNLOAD_EVENTS_PER_USER_CAP,
                    DOWNLOAD_EVENTS_PER_USER_TTL.try_into().unwrap_or_default(),
                )
                .await?;
        }
        Ok(result)
    }

    pub async fn revoke(&self, token: &str, requesting_user: Option<i64>) -> TokenServiceResult<()> {
        if let Some(user) = requesting_user {
            let Some(binding) = self.kv.hash_get::<TokenBinding>(&token_key(token)).await? else {
                return Ok(());
            };
            if binding.subject_user_id != user {
                return Err(TokenServiceError::Invalid);
            }
            self.kv.set_remove(&user_index_key(user), token).await;
        }
        self.kv.delete(&token_key(token)).await;
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: i64) -> Vec<String> {
        self.kv.set_members(&user_index_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(MokaFastKv::new())
    }

    fn opts(permissions: Vec<Permission>, max_uses: Option<u32>, ip_pin: Option<String>) -> IssueTokenOptions {
        IssueTokenOptions {
            expires_in: None,
            permissions,
            max_uses,
            ip_pin,
        }
    }

    #[tokio::test]
    async fn issued_token_validates_for_its_file_and_permission() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc
            .issue(file_id, 7, opts(vec![Permission::Read], None, None))
            .await
            .unwrap();
        let binding = svc.validate(&token, file_id, Permission::Read, None).await.unwrap();
        assert_eq!(binding.subject_user_id, 7);
    }

    #[tokio::test]
    async fn validate_rejects_wrong_file() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let token = svc
            .issue(file_id, 1, opts(vec![Permission::Read], None, None))
            .await
            .unwrap();
        let err = svc.validate(&token, other, Permission::Read, None).await.unwrap_err();
        assert!(matches!(err, TokenServiceError::WrongFile));
    }

    #[tokio::test]
    async fn validate_rejects_missing_permission() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc
            .issue(file_id, 1, opts(vec![Permission::Read], None, None))
            .await
            .unwrap();
        let err = svc
            .validate(&token, file_id, Permission::Download, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenServiceError::PermissionDenied));
    }

    #[tokio::test]
    async fn ip_pinned_token_rejects_mismatched_client() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc
            .issue(
                file_id,
                1,
                opts(vec![Permission::Download], None, Some("1.2.3.4".to_string())),
            )
            .await
            .unwrap();
        let err = svc
            .validate(&token, file_id, Permission::Download, Some("9.9.9.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenServiceError::IpMismatch));
        svc.validate(&token, file_id, Permission::Download, Some("1.2.3.4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_time_token_is_exhausted_after_single_download() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc.issue_one_time(file_id, 1, None).await.unwrap();
        svc.validate(&token, file_id, Permission::Download, None).await.unwrap();
        let err = svc
            .validate(&token, file_id, Permission::Download, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenServiceError::UsesExhausted));
    }

    #[tokio::test]
    async fn revoke_removes_token_and_user_index_entry() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc
            .issue(file_id, 3, opts(vec![Permission::Read], None, None))
            .await
            .unwrap();
        assert_eq!(svc.list_for_user(3).await, vec![token.clone()]);
        svc.revoke(&token, Some(3)).await.unwrap();
        assert!(svc.list_for_user(3).await.is_empty());
        let err = svc.validate(&token, file_id, Permission::Read, None).await.unwrap_err();
        assert!(matches!(err, TokenServiceError::Invalid));
    }

    #[tokio::test]
    async fn revoke_by_non_owner_is_rejected() {
        let svc = service();
        let file_id = Uuid::new_v4();
        let token = svc
            .issue(file_id, 3, opts(vec![Permission::Read], None, None))
            .await
            .unwrap();
        let err = svc.revoke(&token, Some(99)).await.unwrap_err();
        assert!(matches!(err, TokenServiceError::Invalid));
    }
}
