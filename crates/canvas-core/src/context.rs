//! One explicitly constructed workspace instance: config, manifest, action
//! bus and widget surface. Nothing here is global, so several contexts can
//! live side by side.

use crate::action::{Action, ActionDraft};
use crate::bus::{ActionBus, Submission};
use crate::config::Config;
use crate::error::{CanvasError, Result};
use crate::executor::{AcceptAll, ExecutionResult, Executor, NoPreflight, Preflight, Rejection};
use crate::manifest::TileManifest;
use crate::paths;
use crate::receipt::{ReceiptDb, ReceiptRecorder};
use crate::telemetry::{NullSink, TelemetrySink};
use crate::types::RiskTier;
use crate::workspace::Workspace;
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Action type for closing a widget.
pub const WIDGET_REMOVE: &str = "widget.remove";

/// Wraps the caller's executor so an approved `widget.remove` also takes the
/// widget off the surface.
struct WorkspaceExecutor {
    workspace: Arc<Mutex<Workspace>>,
    inner: Arc<dyn Executor>,
}

impl WorkspaceExecutor {
    fn target(action: &Action) -> Option<String> {
        action.widget_id.clone().or_else(|| {
            action
                .payload
                .get("widget_id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
    }
}

impl Executor for WorkspaceExecutor {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            let result = self.inner.execute(action).await?;
            if action.action_type != WIDGET_REMOVE {
                return Ok(result);
            }
            let Some(id) = Self::target(action) else {
                return Err(Rejection::new("widget.remove without a widget id"));
            };
            self.workspace
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_widget(&id)
                .map_err(|e| Rejection::new(e.to_string()))?;
            tracing::info!(widget = %id, "widget closed");
            Ok(result)
        })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ContextBuilder {
    config: Config,
    manifest: TileManifest,
    executor: Arc<dyn Executor>,
    preflight: Arc<dyn Preflight>,
    recorder: Option<ReceiptRecorder>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ContextBuilder {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn recorder(mut self, recorder: ReceiptRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn build(self) -> Result<CanvasContext> {
        let workspace = Arc::new(Mutex::new(
            Workspace::from_settings(&self.config.workspace)?
                .with_telemetry(Arc::clone(&self.telemetry)),
        ));
        let executor = Arc::new(WorkspaceExecutor {
            workspace: Arc::clone(&workspace),
            inner: self.executor,
        });
        let recorder = match self.recorder {
            Some(recorder) => recorder,
            None => ReceiptRecorder::new(
                Box::new(crate::receipt::MemoryReceiptStore::new()),
                self.config.redaction.redactor()?,
            ),
        };
        let bus = ActionBus::builder(self.manifest)
            .config(&self.config)?
            .executor(executor)
            .preflight(self.preflight)
            .recorder(recorder)
            .telemetry(self.telemetry)
            .build();
        Ok(CanvasContext {
            config: self.config,
            bus,
            workspace,
        })
    }
}

// ---------------------------------------------------------------------------
// CanvasContext
// ---------------------------------------------------------------------------

pub struct CanvasContext {
    config: Config,
    bus: ActionBus,
    workspace: Arc<Mutex<Workspace>>,
}

impl CanvasContext {
    pub fn builder(config: Config, manifest: TileManifest) -> ContextBuilder {
        ContextBuilder {
            config,
            manifest,
            executor: Arc::new(AcceptAll),
            preflight: Arc::new(NoPreflight),
            recorder: None,
            telemetry: Arc::new(NullSink),
        }
    }

    /// Builder preloaded from an initialized root: config, manifest and the
    /// durable receipt store.
    pub fn open(root: &Path) -> Result<ContextBuilder> {
        let config = Config::load(root)?;
        let manifest = TileManifest::load(root)?;
        let db = ReceiptDb::open(&paths::receipts_db_path(root))?;
        let recorder = ReceiptRecorder::new(Box::new(db), config.redaction.redactor()?);
        Ok(Self::builder(config, manifest).recorder(recorder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manifest(&self) -> &TileManifest {
        self.bus.manifest()
    }

    pub fn bus(&self) -> &ActionBus {
        &self.bus
    }

    pub fn workspace(&self) -> MutexGuard<'_, Workspace> {
        self.workspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shared_workspace(&self) -> Arc<Mutex<Workspace>> {
        Arc::clone(&self.workspace)
    }

    /// Ask to close a widget. The removal is a governed action: the widget
    /// stays until the action is approved and executed.
    pub fn close_widget(&self, widget_id: &str) -> Result<Submission> {
        if self.workspace().widget(widget_id).is_none() {
            return Err(CanvasError::WidgetNotFound(widget_id.to_string()));
        }
        let tier = self
            .manifest()
            .find_verb(WIDGET_REMOVE)
            .map(|hit| hit.verb.risk_tier)
            .ok_or_else(|| CanvasError::UnknownActionType(WIDGET_REMOVE.to_string()))?;
        self.bus.submit(
            ActionDraft::new(WIDGET_REMOVE, tier)
                .widget(widget_id)
                .payload("widget_id", widget_id),
        )
    }

    /// Tier the manifest declares for `action_type`, if it knows it.
    pub fn declared_tier(&self, action_type: &str) -> Option<RiskTier> {
        self.manifest()
            .find_verb(action_type)
            .map(|hit| hit.verb.risk_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEvent;
    use crate::executor::FnExecutor;
    use crate::types::RunwayState;
    use crate::workspace::{Position, Size, Widget};
    use tempfile::TempDir;

    fn context() -> CanvasContext {
        let ctx = CanvasContext::builder(Config::default(), TileManifest::starter())
            .build()
            .unwrap();
        ctx.workspace()
            .add_widget(Widget::new("notes", Position::new(0, 0), Size::new(128, 128)))
            .unwrap();
        ctx
    }

    async fn wait_for_confirmation(ctx: &CanvasContext) {
        let mut sub = ctx.bus().subscribe();
        if ctx.bus().visible_confirmation().is_some() {
            return;
        }
        while let Some(event) = sub.recv().await {
            if matches!(event, BusEvent::ConfirmationRequested { .. }) {
                return;
            }
        }
    }

    #[tokio::test]
    async fn close_widget_removes_after_approval() {
        let ctx = context();
        let submission = ctx.close_widget("notes").unwrap();
        let id = submission.action_id();
        wait_for_confirmation(&ctx).await;
        assert!(ctx.workspace().widget("notes").is_some());

        assert!(ctx.bus().approve(id, RiskTier::Yellow));
        let receipt = submission.await.unwrap();
        assert_eq!(receipt.final_status, RunwayState::ReceiptReady);
        assert!(ctx.workspace().widget("notes").is_none());
    }

    #[tokio::test]
    async fn denied_close_keeps_widget() {
        let ctx = context();
        let submission = ctx.close_widget("notes").unwrap();
        let id = submission.action_id();
        wait_for_confirmation(&ctx).await;
        assert!(ctx.bus().deny(id, RiskTier::Yellow));
        assert_eq!(submission.await.unwrap().final_status, RunwayState::Cancelled);
        assert!(ctx.workspace().widget("notes").is_some());
    }

    #[tokio::test]
    async fn failed_backend_keeps_widget() {
        let ctx = CanvasContext::builder(Config::default(), TileManifest::starter())
            .executor(Arc::new(FnExecutor(|_: &Action| Err(Rejection::new("offline")))))
            .build()
            .unwrap();
        ctx.workspace()
            .add_widget(Widget::new("notes", Position::new(0, 0), Size::new(64, 64)))
            .unwrap();
        let submission = ctx.close_widget("notes").unwrap();
        let id = submission.action_id();
        wait_for_confirmation(&ctx).await;
        ctx.bus().approve(id, RiskTier::Yellow);
        assert_eq!(submission.await.unwrap().final_status, RunwayState::Error);
        assert!(ctx.workspace().widget("notes").is_some());
    }

    #[tokio::test]
    async fn closing_unknown_widget_fails_fast() {
        let ctx = context();
        assert!(matches!(
            ctx.close_widget("ghost"),
            Err(CanvasError::WidgetNotFound(_))
        ));
        assert!(ctx.bus().actions().is_empty());
    }

    #[tokio::test]
    async fn closing_without_manifest_entry_is_denied() {
        let ctx = CanvasContext::builder(Config::default(), TileManifest::default())
            .build()
            .unwrap();
        ctx.workspace()
            .add_widget(Widget::new("notes", Position::new(0, 0), Size::new(64, 64)))
            .unwrap();
        assert!(matches!(
            ctx.close_widget("notes"),
            Err(CanvasError::UnknownActionType(_))
        ));
    }

    #[test]
    fn contexts_are_independent() {
        let a = context();
        let b = CanvasContext::builder(Config::default(), TileManifest::starter())
            .build()
            .unwrap();
        assert_eq!(a.workspace().widgets().len(), 1);
        assert!(b.workspace().widgets().is_empty());
    }

    #[test]
    fn open_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            CanvasContext::open(dir.path()),
            Err(CanvasError::NotInitialized)
        ));
    }
}
