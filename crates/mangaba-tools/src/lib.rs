pub mod calculator;
pub mod kind;
pub mod mock;
pub mod remote;

use std::sync::Arc;

use mangaba_core::config::{ToolBackend, ToolsConfig};
use mangaba_core::error::{FlowError, Result};
use mangaba_core::traits::ToolService;

pub use kind::ToolKind;
pub use mock::MockToolService;
pub use remote::RemoteToolService;

/// Create the tool backend selected by `config`.
pub fn create_service(config: &ToolsConfig) -> Result<Arc<dyn ToolService>> {
    match config.backend {
        ToolBackend::Mock => Ok(Arc::new(MockToolService::new())),
        ToolBackend::Remote => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                FlowError::Config("tools.endpoint is required for the remote backend".into())
            })?;
            Ok(Arc::new(RemoteToolService::new(
                endpoint,
                config.api_key.clone(),
                config.timeout_secs,
            )))
        }
    }
}
