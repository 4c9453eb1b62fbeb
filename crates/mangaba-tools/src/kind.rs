use serde::{Deserialize, Serialize};

/// Tool sub-types a tool node can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "web-search")]
    WebSearch,
    #[serde(rename = "database")]
    Database,
    #[serde(rename = "api", alias = "api-call")]
    Api,
    #[serde(rename = "calculator")]
    Calculator,
}

impl ToolKind {
    /// Parse a tool name as used in node tags and `config.toolType`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "web-search" => Some(Self::WebSearch),
            "database" => Some(Self::Database),
            "api" | "api-call" => Some(Self::Api),
            "calculator" => Some(Self::Calculator),
            _ => None,
        }
    }

    /// Wire name sent to remote tool backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSearch => "web-search",
            Self::Database => "database",
            Self::Api => "api",
            Self::Calculator => "calculator",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
