use catalog::CatalogError;
use foundation::math::CoordParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewError {
    /// Viewer configuration could not be read.
    Config(String),
    Coord(CoordParseError),
    Catalog(CatalogError),
}

impl std::fmt::Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewError::Config(msg) => write!(f, "invalid viewer config: {msg}"),
            ViewError::Coord(err) => write!(f, "invalid target: {err}"),
            ViewError::Catalog(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<CoordParseError> for ViewError {
    fn from(err: CoordParseError) -> Self {
        ViewError::Coord(err)
    }
}

impl From<CatalogError> for ViewError {
    fn from(err: CatalogError) -> Self {
        ViewError::Catalog(err)
    }
}
