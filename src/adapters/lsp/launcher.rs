use std::path::Path;

use async_trait::async_trait;

use super::client::{LspClient, LspSessionOptions};
use crate::domain::errors::StartupError;
use crate::domain::models::{Checker, ProtocolDialect};
use crate::domain::ports::{CheckerLauncher, CheckerSession};

/// Launches checkers that speak LSP over stdio.
#[derive(Debug, Clone, Default)]
pub struct LspLauncher {
    options: LspSessionOptions,
}

impl LspLauncher {
    pub const fn new(options: LspSessionOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &LspSessionOptions {
        &self.options
    }
}

#[async_trait]
impl CheckerLauncher for LspLauncher {
    async fn start(
        &self,
        checker: &Checker,
        workspace_root: &Path,
    ) -> Result<Box<dyn CheckerSession>, StartupError> {
        match checker.config.dialect {
            ProtocolDialect::Lsp => {
                let client = LspClient::start(checker, workspace_root, self.options).await?;
                Ok(Box::new(client))
            }
        }
    }
}
