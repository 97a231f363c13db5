use thiserror::Error;

use crate::model::{ModelError, ParseIdError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
