// Artifact domain types

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// What kind of output an agent produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Code,
    Test,
    Doc,
    Plan,
    Review,
    Other,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactType::Code => "code",
            ArtifactType::Test => "test",
            ArtifactType::Doc => "doc",
            ArtifactType::Plan => "plan",
            ArtifactType::Review => "review",
            ArtifactType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ArtifactType::Code),
            "test" => Ok(ArtifactType::Test),
            "doc" => Ok(ArtifactType::Doc),
            "plan" => Ok(ArtifactType::Plan),
            "review" => Ok(ArtifactType::Review),
            "other" => Ok(ArtifactType::Other),
            other => Err(format!("unknown artifact type: {}", other)),
        }
    }
}
