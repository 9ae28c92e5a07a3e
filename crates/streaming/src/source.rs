use futures_util::future::LocalBoxFuture;

use catalog::TileFormat;
use healpix::TileId;

/// Why a tile could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Network(String),
    Http(u16),
    NotFound,
    Decode(String),
    /// The tile is not addressable in its survey (order too deep, bad index).
    InvalidTileId,
    UnknownSurvey,
    Aborted,
}

impl FetchError {
    /// Maps an HTTP status to the matching error.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => FetchError::NotFound,
            other => FetchError::Http(other),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "network error: {msg}"),
            FetchError::Http(status) => write!(f, "http status {status}"),
            FetchError::NotFound => write!(f, "tile not found"),
            FetchError::Decode(msg) => write!(f, "tile decode failed: {msg}"),
            FetchError::InvalidTileId => write!(f, "tile id not available in survey"),
            FetchError::UnknownSurvey => write!(f, "unknown survey"),
            FetchError::Aborted => write!(f, "fetch aborted"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Where tile bytes come from (HTTP, disk, a test fixture).
///
/// Returned futures must not borrow the source; they are polled by the
/// loader after `fetch` returns.
pub trait TileSource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// A decoded tile plus its memory footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<P> {
    pub payload: P,
    pub bytes: usize,
}

impl<P> Decoded<P> {
    pub fn new(payload: P, bytes: usize) -> Self {
        Self { payload, bytes }
    }
}

/// Turns fetched bytes into the payload the compositor consumes.
pub trait TileDecoder<P> {
    fn decode(&self, tile: &TileId, format: TileFormat, bytes: Vec<u8>)
    -> Result<Decoded<P>, FetchError>;
}

/// Keeps the encoded bytes as the payload.
#[derive(Debug, Default, Copy, Clone)]
pub struct RawBytes;

impl TileDecoder<Vec<u8>> for RawBytes {
    fn decode(
        &self,
        _tile: &TileId,
        _format: TileFormat,
        bytes: Vec<u8>,
    ) -> Result<Decoded<Vec<u8>>, FetchError> {
        if bytes.is_empty() {
            return Err(FetchError::Decode("empty tile".to_string()));
        }
        let len = bytes.len();
        Ok(Decoded::new(bytes, len))
    }
}
