use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("env region is too small to hold a header")]
    InvalidSize,
    #[error("no space left in env payload")]
    OutOfSpace,
}
