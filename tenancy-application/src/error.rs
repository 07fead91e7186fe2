use tenancy_domain::error::ProvisioningError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("provisioning: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("config: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}
