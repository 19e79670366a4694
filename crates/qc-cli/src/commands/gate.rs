use anyhow::bail;
use qc_core::entities::GateEntry;
use qc_core::traits::GateRepository;
use serde::Serialize;

use crate::cli::{GateCommands, GlobalFlags};
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct GateCleared {
    participant: String,
    module: String,
    cleared: bool,
}

/// Handle `qcf gate`.
pub async fn handle(action: &GateCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        GateCommands::Show { participant, module } => {
            let snapshot = ctx.db.load_gate(participant, module).await?;
            output(&snapshot, flags.format)
        }
        GateCommands::Clear { participant, module } => {
            let cleared = clear(ctx, participant, module).await?;
            output(
                &GateCleared {
                    participant: participant.clone(),
                    module: module.to_uppercase(),
                    cleared,
                },
                flags.format,
            )
        }
    }
}

/// Reset the gate whatever file it records. Returns whether anything was
/// recorded.
async fn clear(ctx: &AppContext, participant: &str, module: &str) -> anyhow::Result<bool> {
    let attempts = ctx.config.coordinator.gate_retries.max(1);
    for _ in 0..attempts {
        let snapshot = ctx.db.load_gate(participant, module).await?;
        if snapshot.entry.is_open() {
            return Ok(false);
        }
        if ctx
            .db
            .store_gate(participant, module, &GateEntry::default(), snapshot.revision)
            .await?
        {
            tracing::info!(participant, module, "gate cleared by operator");
            return Ok(true);
        }
    }
    bail!("gate for {participant}/{module} is contended; try again")
}
