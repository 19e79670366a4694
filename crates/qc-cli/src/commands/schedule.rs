use anyhow::{Context, bail};
use qc_jobs::{PollSettings, SubmissionScheduler};

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

/// Handle `qcf schedule`.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let config = &ctx.config.scheduler;
    if !config.is_configured() {
        bail!("scheduler is not configured: set scheduler.project_id and scheduler.module_order");
    }

    let scheduler = SubmissionScheduler::new(
        &ctx.db,
        config,
        PollSettings::from(&ctx.config.poll),
        ctx.cancel.clone(),
    );
    let report = scheduler
        .run()
        .await
        .with_context(|| format!("failed to schedule submissions for {}", config.project_id))?;
    output(&report, flags.format)
}
