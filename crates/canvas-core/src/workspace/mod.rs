//! Spatial workspace: widget geometry, grid snapping, collision checks and
//! the single-pointer drag lifecycle.
//!
//! Every stored position is a multiple of the grid unit. Under
//! [`CollisionPolicy::Reject`] no two widgets overlap at rest; a drop that
//! would collide reverts to where the drag started.

pub mod geometry;
pub mod layout;

pub use geometry::{snap, Point, Position, Rect, Size};
pub use layout::{FileLayoutStore, LayoutStore, MemoryLayoutStore};

use crate::config::{WorkspaceSettings, DEFAULT_GRID_UNIT};
use crate::error::{CanvasError, Result};
use crate::paths;
use crate::telemetry::{self, NullSink, TelemetrySink};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError, Weak};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub z_index: i32,
}

impl Widget {
    pub fn new(id: impl Into<String>, position: Position, size: Size) -> Self {
        Self {
            id: id.into(),
            position,
            size,
            z_index: 0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.position, self.size)
    }
}

/// What happens when a widget would come to rest on top of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Refuse the move; a colliding drop snaps back to its pre-drag position.
    #[default]
    Reject,
    /// Allow the move and only report the collision.
    Advisory,
}

impl CollisionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CollisionPolicy::Reject => "reject",
            CollisionPolicy::Advisory => "advisory",
        }
    }
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live drag feedback. `position` is not snapped yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DragPreview {
    pub widget_id: String,
    pub position: Point,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DragOutcome {
    Committed {
        widget_id: String,
        from: Position,
        to: Position,
        /// Only ever true under [`CollisionPolicy::Advisory`].
        collided: bool,
    },
    Reverted {
        widget_id: String,
        position: Position,
        attempted: Position,
    },
}

impl DragOutcome {
    pub fn widget_id(&self) -> &str {
        match self {
            DragOutcome::Committed { widget_id, .. } | DragOutcome::Reverted { widget_id, .. } => {
                widget_id
            }
        }
    }

    pub fn position(&self) -> Position {
        match self {
            DragOutcome::Committed { to, .. } => *to,
            DragOutcome::Reverted { position, .. } => *position,
        }
    }
}

/// Passed to position listeners after a committed move.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionChange {
    pub widget_id: String,
    pub from: Position,
    pub to: Position,
}

#[derive(Debug, Clone)]
struct ActiveDrag {
    widget_id: String,
    origin: Position,
    origin_z: i32,
    /// Pointer offset from the widget's top-left corner at drag start.
    grab: (f64, f64),
    preview: Point,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

type Listener = Arc<dyn Fn(&PositionChange) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Returned by [`Workspace::on_position_change`]. Dropping it keeps the
/// listener registered; call `unsubscribe` to remove it.
pub struct ListenerHandle {
    id: u64,
    set: Weak<Mutex<ListenerSet>>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(set) = self.set.upgrade() {
            set.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

pub struct Workspace {
    grid_unit: u32,
    policy: CollisionPolicy,
    widgets: Vec<Widget>,
    drag: Option<ActiveDrag>,
    listeners: Arc<Mutex<ListenerSet>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::empty(DEFAULT_GRID_UNIT, CollisionPolicy::default())
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("grid_unit", &self.grid_unit)
            .field("policy", &self.policy)
            .field("widgets", &self.widgets)
            .field("dragging", &self.dragging())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// A zero grid unit is refused: nothing could be aligned to it.
    pub fn new(grid_unit: u32, policy: CollisionPolicy) -> Result<Self> {
        if grid_unit == 0 {
            return Err(CanvasError::InvalidGridUnit);
        }
        Ok(Self::empty(grid_unit, policy))
    }

    fn empty(grid_unit: u32, policy: CollisionPolicy) -> Self {
        Self {
            grid_unit,
            policy,
            widgets: Vec::new(),
            drag: None,
            listeners: Arc::default(),
            telemetry: Arc::new(NullSink),
        }
    }

    pub fn from_settings(settings: &WorkspaceSettings) -> Result<Self> {
        Self::new(settings.grid_unit, settings.collision_policy)
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn grid_unit(&self) -> u32 {
        self.grid_unit
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Widgets in insertion order.
    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }

    /// Id of the widget being dragged, if any.
    pub fn dragging(&self) -> Option<&str> {
        self.drag.as_ref().map(|d| d.widget_id.as_str())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Place a widget, snapping its position and putting it on top.
    pub fn add_widget(&mut self, widget: Widget) -> Result<Widget> {
        paths::validate_key(&widget.id)?;
        if widget.size.is_empty() {
            return Err(CanvasError::InvalidSize {
                width: widget.size.width,
                height: widget.size.height,
            });
        }
        if self.widget(&widget.id).is_some() {
            return Err(CanvasError::WidgetExists(widget.id));
        }
        let position = widget.position.snapped(self.grid_unit);
        if self.policy == CollisionPolicy::Reject
            && self.check_collision(position.into(), widget.size, None)
        {
            return Err(CanvasError::Collision(widget.id));
        }

        let placed = Widget {
            position,
            z_index: self.top_z() + 1,
            ..widget
        };
        tracing::debug!(widget = %placed.id, position = %placed.position, size = %placed.size, "widget added");
        self.widgets.push(placed.clone());
        Ok(placed)
    }

    /// Remove a widget. Removing the dragged widget ends the drag.
    pub fn remove_widget(&mut self, id: &str) -> Result<Widget> {
        let index = self
            .widgets
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| CanvasError::WidgetNotFound(id.to_string()))?;
        if self.dragging() == Some(id) {
            self.drag = None;
        }
        let removed = self.widgets.remove(index);
        tracing::debug!(widget = %removed.id, "widget removed");
        Ok(removed)
    }

    /// Move a widget outside of a drag. The position is snapped first.
    pub fn update_widget_position(&mut self, id: &str, position: Position) -> Result<Position> {
        let widget = self
            .widget(id)
            .ok_or_else(|| CanvasError::WidgetNotFound(id.to_string()))?;
        let (from, size) = (widget.position, widget.size);
        let to = position.snapped(self.grid_unit);
        if self.check_collision(to.into(), size, Some(id)) {
            match self.policy {
                CollisionPolicy::Reject => return Err(CanvasError::Collision(id.to_string())),
                CollisionPolicy::Advisory => {
                    tracing::warn!(widget = id, position = %to, "widget moved onto another")
                }
            }
        }
        self.commit(id, from, to);
        Ok(to)
    }

    /// True if a widget of `size` at `position` would overlap any widget
    /// other than `exclude`.
    pub fn check_collision(&self, position: Point, size: Size, exclude: Option<&str>) -> bool {
        let candidate = Rect::new(position, size);
        self.widgets
            .iter()
            .filter(|w| Some(w.id.as_str()) != exclude)
            .any(|w| w.rect().overlaps(&candidate))
    }

    /// First free grid slot for `size`, scanning row by row across
    /// `columns` grid cells. Falls back to the first row below every widget.
    pub fn find_free_position(&self, size: Size, columns: u32) -> Position {
        let unit = self.grid_unit.max(1);
        let span = f64::from(columns.max(1)) * f64::from(unit);
        let floor = self
            .widgets
            .iter()
            .map(|w| w.rect().bottom())
            .fold(0.0_f64, f64::max);

        let mut row = 0u32;
        while f64::from(row * unit) < floor {
            for col in 0..columns.max(1) {
                let x = col * unit;
                if f64::from(x) + f64::from(size.width) > span && col > 0 {
                    break;
                }
                let candidate = Position::new(x as i32, (row * unit) as i32);
                if !self.check_collision(candidate.into(), size, None) {
                    return candidate;
                }
            }
            row += 1;
        }
        Position::new(0, (row * unit) as i32)
    }

    // -----------------------------------------------------------------------
    // Drag lifecycle
    // -----------------------------------------------------------------------

    /// Start dragging `id` from `pointer`. Returns `false`, changing nothing,
    /// while another drag is active.
    pub fn begin_drag(&mut self, id: &str, pointer: Point) -> Result<bool> {
        if let Some(active) = &self.drag {
            tracing::debug!(active = %active.widget_id, ignored = id, "drag already active");
            return Ok(false);
        }
        let top = self.top_z();
        let widget = self
            .widgets
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| CanvasError::WidgetNotFound(id.to_string()))?;
        let origin = widget.position;
        let origin_z = widget.z_index;
        if widget.z_index < top || top == 0 {
            widget.z_index = top + 1;
        }
        self.drag = Some(ActiveDrag {
            widget_id: id.to_string(),
            origin,
            origin_z,
            grab: (pointer.x - f64::from(origin.x), pointer.y - f64::from(origin.y)),
            preview: origin.into(),
        });
        Ok(true)
    }

    /// Move the preview with the pointer. `None` when no drag is active.
    pub fn update_drag(&mut self, pointer: Point) -> Option<DragPreview> {
        let drag = self.drag.as_mut()?;
        drag.preview = Point::new(pointer.x - drag.grab.0, pointer.y - drag.grab.1);
        let (widget_id, preview) = (drag.widget_id.clone(), drag.preview);
        let size = self.widget(&widget_id)?.size;
        let valid = !self.check_collision(preview, size, Some(&widget_id));
        Some(DragPreview {
            widget_id,
            position: preview,
            valid,
        })
    }

    /// Finish the drag: snap the preview and commit it, or revert under
    /// [`CollisionPolicy::Reject`] if it would collide.
    pub fn end_drag(&mut self) -> Option<DragOutcome> {
        let drag = self.drag.take()?;
        let size = self.widget(&drag.widget_id)?.size;
        let to = drag.preview.snapped(self.grid_unit);
        let collided = self.check_collision(to.into(), size, Some(&drag.widget_id));

        let outcome = if collided && self.policy == CollisionPolicy::Reject {
            if let Some(w) = self.widgets.iter_mut().find(|w| w.id == drag.widget_id) {
                w.z_index = drag.origin_z;
            }
            DragOutcome::Reverted {
                widget_id: drag.widget_id.clone(),
                position: drag.origin,
                attempted: to,
            }
        } else {
            self.commit(&drag.widget_id, drag.origin, to);
            DragOutcome::Committed {
                widget_id: drag.widget_id.clone(),
                from: drag.origin,
                to,
                collided,
            }
        };

        tracing::info!(widget = %drag.widget_id, position = %outcome.position(), collided, "drag ended");
        telemetry::emit(
            self.telemetry.as_ref(),
            "workspace.drag_commit",
            json!(outcome),
        );
        Some(outcome)
    }

    /// Abandon the drag, restoring the widget's z-order. Nothing is committed.
    pub fn cancel_drag(&mut self) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        if let Some(w) = self.widgets.iter_mut().find(|w| w.id == drag.widget_id) {
            w.z_index = drag.origin_z;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn on_position_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&PositionChange) + Send + Sync + 'static,
    {
        let mut set = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        set.next_id += 1;
        let id = set.next_id;
        set.entries.push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            set: Arc::downgrade(&self.listeners),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn persist(&self, store: &dyn LayoutStore, key: &str) -> Result<()> {
        store.save(key, &self.widgets)
    }

    /// Replace the widget set with the layout saved under `key`. Positions
    /// are snapped; under `Reject`, widgets that would overlap an earlier one
    /// are dropped. Returns how many widgets were placed, or `None` when
    /// nothing was saved under `key`.
    pub fn restore(&mut self, store: &dyn LayoutStore, key: &str) -> Result<Option<usize>> {
        let Some(saved) = store.load(key)? else {
            return Ok(None);
        };
        self.drag = None;
        self.widgets.clear();
        for mut widget in saved {
            widget.position = widget.position.snapped(self.grid_unit);
            if widget.size.is_empty() || self.widget(&widget.id).is_some() {
                tracing::warn!(widget = %widget.id, "skipping invalid widget in saved layout");
                continue;
            }
            if self.policy == CollisionPolicy::Reject
                && self.check_collision(widget.position.into(), widget.size, None)
            {
                tracing::warn!(widget = %widget.id, "skipping overlapping widget in saved layout");
                continue;
            }
            self.widgets.push(widget);
        }
        Ok(Some(self.widgets.len()))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn top_z(&self) -> i32 {
        self.widgets.iter().map(|w| w.z_index).max().unwrap_or(0)
    }

    fn commit(&mut self, id: &str, from: Position, to: Position) {
        if let Some(w) = self.widgets.iter_mut().find(|w| w.id == id) {
            w.position = to;
        }
        if from == to {
            return;
        }
        let change = PositionChange {
            widget_id: id.to_string(),
            from,
            to,
        };
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
