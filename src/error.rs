use core::fmt;

/// Result alias for `parcel`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by partition and optimiser operations.
///
/// All of these are fail-fast usage errors: every operation signals its
/// condition before mutating any state, and the optimiser never catches or
/// retries them. "No improving move found" is not an error — it is the
/// normal convergence signal and is reported through return values.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty (zero-vertex graph or empty partition list).
    EmptyInput,

    /// Vertex index outside `[0, n)`.
    VertexOutOfRange {
        /// Offending vertex index.
        vertex: usize,
        /// Number of vertices in the graph.
        n: usize,
    },

    /// Community id beyond the partition's current community count.
    CommunityOutOfRange {
        /// Offending community id.
        community: usize,
        /// Current number of community slots.
        n_communities: usize,
    },

    /// Mismatched collection lengths (usize).
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Found length.
        found: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Internal invariant violated (defensive checks).
    InvariantViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::VertexOutOfRange { vertex, n } => {
                write!(f, "vertex {vertex} out of range for graph with {n} vertices")
            }
            Error::CommunityOutOfRange {
                community,
                n_communities,
            } => {
                write!(
                    f,
                    "community {community} out of range for partition with {n_communities} communities"
                )
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
