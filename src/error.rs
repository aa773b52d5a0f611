//! Rich diagnostic error types for the jamspread engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly what
//! went wrong and whether the fault lies with the request or with the engine.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the jamspread engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum JamError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Diffusion(#[from] DiffusionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bottleneck(#[from] BottleneckError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

impl JamError {
    /// Whether the error was caused by the request rather than by the engine.
    ///
    /// The routing layer maps client errors to a 4xx response and everything
    /// else to an internal error.
    pub fn is_client_error(&self) -> bool {
        match self {
            JamError::Diffusion(e) => e.is_client_error(),
            JamError::Bottleneck(e) => e.is_client_error(),
            JamError::Learn(e) => e.is_client_error(),
            JamError::Config(_) => true,
            JamError::Dataset(DatasetError::Parse { .. } | DatasetError::Graph(_)) => true,
            JamError::Graph(GraphError::SelfLoop { .. }) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(jam::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(jam::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(jam::store::serde),
        help(
            "Failed to serialize or deserialize stored data. \
             The stored format may have changed between versions; \
             re-learn the influence probabilities to rebuild it."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("segment not found: {segment_id}")]
    #[diagnostic(
        code(jam::graph::segment_not_found),
        help(
            "The segment has no node in the road graph. \
             Insert the segment before adding adjacencies that reference it."
        )
    )]
    SegmentNotFound { segment_id: u64 },

    #[error("self-loop adjacency on segment {segment_id}")]
    #[diagnostic(
        code(jam::graph::self_loop),
        help("Adjacencies connect two distinct segments. Drop the self-referencing edge.")
    )]
    SelfLoop { segment_id: u64 },

    #[error("duplicate segment: {segment_id}")]
    #[diagnostic(
        code(jam::graph::duplicate_segment),
        help("Segments are immutable once ingested. Each id may appear only once per dataset.")
    )]
    DuplicateSegment { segment_id: u64 },
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error("failed to read dataset file: {path}")]
    #[diagnostic(
        code(jam::dataset::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset: {message}")]
    #[diagnostic(
        code(jam::dataset::parse),
        help(
            "Datasets are JSON objects with `segments`, `adjacencies` and `observations` \
             arrays. Check field names (camelCase) and value ranges."
        )
    )]
    Parse { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Learner errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("no time horizons requested")]
    #[diagnostic(
        code(jam::learn::no_horizons),
        help("Provide at least one time horizon in minutes, e.g. [5, 15, 30].")
    )]
    NoHorizons,

    #[error("time horizon must be positive, got {minutes}")]
    #[diagnostic(
        code(jam::learn::zero_horizon),
        help("A zero-minute horizon has no look-ahead window. Use a positive number of minutes.")
    )]
    ZeroHorizon { minutes: u32 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl LearnError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LearnError::Store(_))
    }
}

// ---------------------------------------------------------------------------
// Diffusion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DiffusionError {
    #[error("invalid model type: \"{value}\"")]
    #[diagnostic(
        code(jam::diffusion::invalid_model),
        help("Valid model types are: LIM, LTM, SIR, SIS.")
    )]
    InvalidModelType { value: String },

    #[error("unknown seed segment: {segment_id}")]
    #[diagnostic(
        code(jam::diffusion::unknown_seed),
        help("Seed segments must exist in the dataset's road graph.")
    )]
    UnknownSeed { segment_id: u64 },

    #[error("malformed influence edge {from} -> {to}: {reason}")]
    #[diagnostic(
        code(jam::diffusion::malformed_edge),
        help(
            "The influence table holds an edge the simulators cannot use. \
             Re-learn the influence probabilities for this dataset."
        )
    )]
    MalformedEdge { from: u64, to: u64, reason: String },

    #[error("number of simulations must be positive")]
    #[diagnostic(
        code(jam::diffusion::zero_simulations),
        help("Monte Carlo models need at least one trial. Omit the field to use the default.")
    )]
    ZeroSimulations,
}

impl DiffusionError {
    /// Whether the error stems from the request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, DiffusionError::MalformedEdge { .. })
    }
}

// ---------------------------------------------------------------------------
// Bottleneck errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum BottleneckError {
    #[error("k must be at least 1")]
    #[diagnostic(
        code(jam::bottleneck::zero_k),
        help("Request one or more bottlenecks.")
    )]
    ZeroK,

    #[error("no fixed segments given for what-if analysis")]
    #[diagnostic(
        code(jam::bottleneck::no_fixed_segments),
        help("Name at least one segment to remediate.")
    )]
    NoFixedSegments,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Diffusion(#[from] DiffusionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl BottleneckError {
    /// Whether the error stems from the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            BottleneckError::ZeroK | BottleneckError::NoFixedSegments => true,
            BottleneckError::Diffusion(e) => e.is_client_error(),
            BottleneckError::Store(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(jam::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(jam::config::parse),
        help("Check the TOML syntax. Print the defaults with `jamspread config`.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(jam::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(jam::config::invalid), help("{message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("data directory error: {path}")]
    #[diagnostic(
        code(jam::engine::data_dir),
        help(
            "The data directory could not be accessed. \
             Ensure the path exists and has read/write permissions."
        )
    )]
    DataDir { path: String },

    #[error("cannot register dataset \"{dataset_id}\": datasets come from an external provider")]
    #[diagnostic(
        code(jam::engine::external_provider),
        help(
            "This engine reads datasets through a caller-supplied provider. \
             Add the dataset to that provider instead."
        )
    )]
    ExternalProvider { dataset_id: String },
}

/// Convenience alias for functions returning jamspread results.
pub type JamResult<T> = std::result::Result<T, JamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_jam_error() {
        let err = StoreError::Redb {
            message: "boom".into(),
        };
        let jam: JamError = err.into();
        assert!(matches!(jam, JamError::Store(StoreError::Redb { .. })));
        assert!(!jam.is_client_error());
    }

    #[test]
    fn invalid_model_type_is_client_error() {
        let err: JamError = DiffusionError::InvalidModelType {
            value: "XYZ".into(),
        }
        .into();
        assert!(err.is_client_error());
        assert!(format!("{err}").contains("XYZ"));
    }

    #[test]
    fn malformed_edge_is_internal() {
        let err: JamError = BottleneckError::Diffusion(DiffusionError::MalformedEdge {
            from: 1,
            to: 2,
            reason: "probability NaN".into(),
        })
        .into();
        assert!(!err.is_client_error());
    }

    #[test]
    fn learn_error_wraps_store_error() {
        let err: LearnError = StoreError::Serialization {
            message: "bad".into(),
        }
        .into();
        assert!(matches!(err, LearnError::Store(StoreError::Serialization { .. })));
        assert!(!JamError::from(err).is_client_error());
    }

    #[test]
    fn bad_horizons_and_malformed_uploads_are_client_errors() {
        assert!(JamError::from(LearnError::NoHorizons).is_client_error());
        assert!(JamError::from(LearnError::ZeroHorizon { minutes: 0 }).is_client_error());

        let duplicate: JamError = DatasetError::Graph(GraphError::DuplicateSegment {
            segment_id: 7,
        })
        .into();
        assert!(duplicate.is_client_error());
    }
}
