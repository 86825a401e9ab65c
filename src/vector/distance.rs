use crate::BridgeError;
use std::fmt;
use std::str::FromStr;

/// Vector-similarity metric selected per table/query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceStrategy {
    #[default]
    EuclideanDistance,
    DotProduct,
    Cosine,
}

impl DistanceStrategy {
    /// The engine's native distance function token.
    #[inline]
    pub fn function_token(&self) -> &'static str {
        match self {
            DistanceStrategy::EuclideanDistance => "EUCLIDEAN",
            DistanceStrategy::DotProduct => "DOT",
            DistanceStrategy::Cosine => "COSINE",
        }
    }

    /// The pgvector distance operator used in generated SQL.
    #[inline]
    pub fn operator(&self) -> &'static str {
        match self {
            DistanceStrategy::EuclideanDistance => "<->",
            DistanceStrategy::DotProduct => "<#>",
            DistanceStrategy::Cosine => "<=>",
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceStrategy::EuclideanDistance => "EUCLIDEAN_DISTANCE",
            DistanceStrategy::DotProduct => "DOT_PRODUCT",
            DistanceStrategy::Cosine => "COSINE",
        }
    }
}

impl FromStr for DistanceStrategy {
    type Err = BridgeError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EUCLIDEAN_DISTANCE" => Ok(DistanceStrategy::EuclideanDistance),
            "DOT_PRODUCT" => Ok(DistanceStrategy::DotProduct),
            "COSINE" => Ok(DistanceStrategy::Cosine),
            other => Err(BridgeError::UnsupportedStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for DistanceStrategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
