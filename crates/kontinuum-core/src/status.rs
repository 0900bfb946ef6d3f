//! Commit status reporting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{CommitState, CommitStatus, Result, WorkPackage};

/// Product namespace prefixed to every status context.
pub const DEFAULT_PRODUCT: &str = "kontinuum";

/// Context used for the checkout step.
pub const CHECKOUT_CONTEXT: &str = "checkout";

/// Remote API accepting commit statuses keyed by repository and commit.
#[async_trait]
pub trait CommitStatusSink: Send + Sync {
    async fn set_status(
        &self,
        project: &str,
        commit_hash: &str,
        status: &CommitStatus,
        installation_id: u64,
    ) -> Result<()>;
}

/// Maps (work package, url, verdict, description, context) onto a single
/// sink call. No retry and no batching; sink errors are returned as-is.
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn CommitStatusSink>,
    product: String,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn CommitStatusSink>) -> Self {
        Self::with_product(sink, DEFAULT_PRODUCT)
    }

    pub fn with_product(sink: Arc<dyn CommitStatusSink>, product: impl Into<String>) -> Self {
        Self {
            sink,
            product: product.into(),
        }
    }

    /// `<product>/<context>`
    pub fn namespaced(&self, context: &str) -> String {
        format!("{}/{}", self.product, context)
    }

    pub async fn report(
        &self,
        work_package: &WorkPackage,
        url: &str,
        state: CommitState,
        description: &str,
        context: &str,
    ) -> Result<()> {
        let status = CommitStatus {
            state,
            target_url: url.to_string(),
            description: description.to_string(),
            context: self.namespaced(context),
        };
        debug!(
            package = %work_package.label(),
            context = %status.context,
            state = %state,
            "reporting commit status"
        );
        self.sink
            .set_status(
                &work_package.project,
                &work_package.commit_hash,
                &status,
                work_package.installation_id,
            )
            .await
    }
}
