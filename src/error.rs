use thiserror::Error;

/// Raised while wiring a body; fatal to that organism's construction only.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("rod {rod} endpoint is unassigned")]
    UnassignedEndpoint { rod: usize },
    #[error("rod {rod} endpoint {point} out of range (body has {len} points)")]
    EndpointOutOfRange { rod: usize, point: usize, len: usize },
    #[error("rod {rod} connects point {point} to itself")]
    DegenerateRod { rod: usize, point: usize },
    #[error("joint {joint} references rod {rod} which does not exist")]
    MissingRod { joint: usize, rod: usize },
    #[error("joint {joint} rod {rod} is not incident to pivot {pivot}")]
    RodNotAtPivot { joint: usize, rod: usize, pivot: usize },
    #[error("point {point} has non-positive mass {mass}")]
    InvalidMass { point: usize, mass: f64 },
    #[error("body has no point masses")]
    EmptyBody,
}

/// Malformed genotype serialization or a genome that cannot be expressed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenomeError {
    #[error("unexpected end of genotype data at byte {offset}")]
    Truncated { offset: usize },
    #[error("negative length {len} at byte {offset}")]
    NegativeLength { len: i32, offset: usize },
    #[error("invalid UTF-16 mutation-rate key")]
    InvalidKey,
    #[error("expected {expected} '{delimiter}' delimiter(s), found {found}")]
    DelimiterCount {
        delimiter: char,
        expected: usize,
        found: usize,
    },
    #[error("bad hex field {field:?} in instruction {index}")]
    BadHex { index: usize, field: String },
    #[error("bad compatibility distance {0:?}")]
    BadDistance(String),
    #[error("unknown opcode {opcode:?} in instruction {index}")]
    UnknownOpcode { index: usize, opcode: char },
    #[error("instruction {index} has {found} hex digits, expected {expected}")]
    FieldWidth {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("edge references unknown node {0}")]
    UnknownNode(i32),
    #[error("unknown genome kind tag {0}")]
    UnknownKind(u8),
    #[error("trailing {0} byte(s) after genotype")]
    TrailingBytes(usize),
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// `cross` was attempted between genomes that fail the compatibility predicate.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("incompatible parents: distance {distance} >= threshold {threshold}")]
pub struct IncompatibleParents {
    pub distance: u32,
    pub threshold: u32,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
    #[error("snapshot organism {index} failed to restore: {source}")]
    Organism {
        index: usize,
        #[source]
        source: GenomeError,
    },
    #[error("snapshot organism {index} does not match its genome: {part}")]
    Mismatch { index: usize, part: &'static str },
}
