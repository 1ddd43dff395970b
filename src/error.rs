use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::ApplyError;
use crate::ilp::SolverError;
use crate::network::{ModelError, NetworkIdx};
use crate::paths::PathError;

// fatal outcome of an embedding run. A request that merely does not fit is
// not an error, `execute` reports it as `Ok(false)`.
#[derive(Error,Debug,Clone,PartialEq)]
pub enum EmbeddingError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("no virtual network was requested")]
    EmptyRequest,
    #[error("execute was called before prepare")]
    NotPrepared,
    #[error("a pipeline needs at least one stage")]
    NoStages,
    #[error("network {network} was requested twice")]
    DuplicateRequest{network:NetworkIdx},
    #[error("network {network} is not a virtual network")]
    NotVirtual{network:String},
    #[error("network {network} is already embedded on the target substrate")]
    AlreadyEmbedded{network:String},
    #[error("network {network} is embedded on another substrate, {host}")]
    HostedElsewhere{network:String,host:String},
    #[error("substrate {substrate} has no paths, but the request has links to place")]
    MissingPaths{substrate:String},
}

pub type Result<T> = std::result::Result<T,EmbeddingError>;
