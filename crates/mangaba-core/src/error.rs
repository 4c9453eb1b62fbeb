use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Graph errors
    #[error("No input nodes found")]
    NoEntryPoint,

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node '{node_id}' visited {visits} times, exceeding the visit limit")]
    CycleLimit { node_id: String, visits: usize },

    #[error("Invalid flow graph: {0}")]
    InvalidGraph(String),

    // Model errors
    #[error("Failed to process with {service}: {message}")]
    ModelInvocation { service: String, message: String },

    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model response parse error: {0}")]
    ModelParse(String),

    #[error("Model request timed out after {0}s")]
    ModelTimeout(u64),

    #[error("No API key configured for {0}")]
    MissingCredential(String),

    // Tool errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Unknown tool type: {0}")]
    UnknownToolType(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
