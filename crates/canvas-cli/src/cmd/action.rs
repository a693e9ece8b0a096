use crate::output::{print_json, print_receipt};
use anyhow::{bail, Context};
use canvas_cli::{executor, prompt};
use canvas_core::action::ActionDraft;
use canvas_core::bus::{BusEvent, Submission};
use canvas_core::context::CanvasContext;
use canvas_core::receipt::Receipt;
use canvas_core::telemetry::TracingSink;
use canvas_core::types::{RiskTier, RunwayState};
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Submit an action and see it through to its receipt
    Submit {
        /// Action type, e.g. invoice.create
        #[arg(long = "type", value_name = "TYPE")]
        action_type: String,
        /// GREEN, YELLOW or RED (default: the tier the manifest declares)
        #[arg(long)]
        tier: Option<String>,
        /// Payload entry as key=value; repeatable
        #[arg(long = "payload", value_name = "KEY=VALUE")]
        payload: Vec<String>,
        /// Widget the action belongs to
        #[arg(long)]
        widget: Option<String>,
        /// Who is asking
        #[arg(long)]
        actor: Option<String>,
        /// Approve YELLOW confirmations without asking (RED always asks)
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ActionSubcommand::Submit {
            action_type,
            tier,
            payload,
            widget,
            actor,
            yes,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(async {
                let ctx = open_context(root)?;
                let tier = match tier {
                    Some(t) => t.parse::<RiskTier>()?,
                    None => ctx
                        .declared_tier(&action_type)
                        .with_context(|| format!("unknown action type: {action_type}"))?,
                };
                let mut draft = ActionDraft::new(&action_type, tier);
                draft.payload = prompt::parse_payload(&payload)?;
                draft.widget_id = widget;
                draft.actor_id = actor;
                govern(&ctx, yes, |ctx| ctx.bus().submit(draft)).await
            });
            // Don't wait on a prompt still blocked on stdin.
            runtime.shutdown_background();
            report(&result?, json)
        }
    }
}

/// Build a context for `root` with the configured executor.
pub(crate) fn open_context(root: &Path) -> anyhow::Result<CanvasContext> {
    let builder = CanvasContext::open(root).context("failed to open workspace")?;
    let executor = executor::from_config(builder.config())?;
    Ok(builder
        .executor(executor)
        .telemetry(Arc::new(TracingSink))
        .build()?)
}

/// Submit through `submit` and answer any confirmation it raises on the
/// terminal, until the action has a receipt.
pub(crate) async fn govern<F>(ctx: &CanvasContext, assume_yes: bool, submit: F) -> anyhow::Result<Receipt>
where
    F: FnOnce(&CanvasContext) -> canvas_core::Result<Submission>,
{
    // Subscribe first so the confirmation request cannot be missed.
    let mut events = ctx.bus().subscribe();
    let mut submission = submit(ctx)?;
    let action_id = submission.action_id();

    loop {
        tokio::select! {
            receipt = &mut submission => return Ok(receipt?),
            event = events.recv() => match event {
                Some(BusEvent::ConfirmationRequested { request }) if request.action_id == action_id => {
                    let tier = request.risk_tier;
                    let answer = tokio::task::spawn_blocking(move || {
                        let stdin = std::io::stdin();
                        prompt::ask(&request, assume_yes, &mut stdin.lock(), &mut std::io::stderr())
                    })
                    .await??;
                    let applied = match answer {
                        prompt::Answer::Approve => ctx.bus().approve(action_id, tier),
                        prompt::Answer::Deny => ctx.bus().deny(action_id, tier),
                    };
                    if !applied {
                        eprintln!("confirmation is no longer pending");
                    }
                }
                Some(_) => {}
                None => return Ok(submission.await?),
            },
        }
    }
}

pub(crate) fn report(receipt: &Receipt, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(receipt)?;
    } else {
        print_receipt(receipt);
    }
    if receipt.final_status == RunwayState::Error {
        bail!(
            "action failed: {}",
            receipt.detail.as_deref().unwrap_or("no detail recorded")
        );
    }
    Ok(())
}
