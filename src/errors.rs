/// Client-facing numeric error code, attached to select variants via
/// `#[derive(BusinessError)]` + `#[code(N)]`. Variants without a code
/// surface as a generic `Internal`/`Validation` shape with no machine-
/// readable discriminant.
pub trait BusinessErrorCode {
    fn code(&self) -> Option<u32>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileCoreError {
    #[error(transparent)]
    DataBase(#[from] crate::services::states::db::DataBaseError),
    #[error(transparent)]
    FileStore(#[from] crate::services::file_store::FileStoreError),
    #[error(transparent)]
    ChunkSession(#[from] crate::services::upload_session::ChunkSessionError),
    #[error(transparent)]
    Token(#[from] crate::services::token_service::TokenServiceError),
    #[error(transparent)]
    Validation(#[from] crate::services::validation::ValidationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] Box<figment::Error>),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type FileCoreResult<T> = Result<T, FileCoreError>;
