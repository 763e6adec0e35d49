use thiserror::Error;

/**
 * \brief 表单校验失败；阻止保存，不向外传播更多信息。
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("endpoint must be an absolute http(s) URL in direct mode: {0}")]
    InvalidEndpoint(String),
    #[error("{field} is not a hex color: {value}")]
    InvalidColor { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("model {0} not found")]
    UnknownModel(String),
    #[error("the built-in model cannot be deleted")]
    BuiltInModel,
}
