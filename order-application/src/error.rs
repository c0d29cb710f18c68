use order_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("infra: {0}")]
    Infra(String),
}

impl AppError {
    /// 底层领域错误（若有）
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppError::Domain(DomainError::DuplicateEntity { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Domain(DomainError::NotFound { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::ConcurrencyConflict { .. })
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
