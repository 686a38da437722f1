//! Viewport module for pan/zoom transforms and canvas sizing.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Quiet period before a requested resize is applied.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Change notifications emitted by the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    /// Offset or zoom changed.
    Changed,
    /// The canvas size changed.
    Resized(Size),
}

type Listener = Box<dyn FnMut(&ViewportEvent)>;

/// Most recent resize request not yet applied.
#[derive(Debug, Clone, Copy)]
struct PendingResize {
    size: Size,
    requested_at: Instant,
}

/// Viewport manages the view transform for the canvas.
///
/// Canvas units map to screen pixels through `translate(offset) * scale(zoom)`.
#[derive(Serialize, Deserialize)]
pub struct Viewport {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current zoom level (1.0 = one canvas unit per pixel).
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Visible canvas size in screen pixels.
    size: Size,
    #[serde(skip)]
    pending_resize: Option<PendingResize>,
    #[serde(skip)]
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("offset", &self.offset)
            .field("zoom", &self.zoom)
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .field("size", &self.size)
            .field("pending_resize", &self.pending_resize)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.1,
            max_zoom: 10.0,
            size: Size::ZERO,
            pending_resize: None,
            listeners: Vec::new(),
        }
    }
}

impl Viewport {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Override the zoom range. The current zoom is clamped into it.
    pub fn with_zoom_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        self
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Register a change callback. Callbacks run in registration order.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ViewportEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: ViewportEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts canvas coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Get the inverse transform for input handling.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn screen_to_canvas(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn canvas_to_screen(&self, canvas_point: Point) -> Point {
        self.transform() * canvas_point
    }

    /// Canvas-space rectangle currently visible on screen.
    pub fn visible_canvas_rect(&self) -> Rect {
        let p0 = self.screen_to_canvas(Point::ZERO);
        let p1 = self.screen_to_canvas(Point::new(self.size.width, self.size.height));
        Rect::from_points(p0, p1)
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        self.offset += delta;
        self.emit(ViewportEvent::Changed);
    }

    /// Zoom, keeping the given screen point fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        let canvas_point = self.screen_to_canvas(screen_point);
        self.zoom = new_zoom;

        // Adjust offset so canvas_point stays under screen_point
        let new_screen = self.canvas_to_screen(canvas_point);
        self.offset += screen_point - new_screen;
        self.emit(ViewportEvent::Changed);
    }

    /// Set the zoom around the viewport center.
    pub fn set_zoom(&mut self, zoom: f64) {
        let center = Point::new(self.size.width / 2.0, self.size.height / 2.0);
        self.zoom_at(center, zoom / self.zoom);
    }

    /// Reset to the default position and zoom.
    pub fn reset(&mut self) {
        if self.offset == Vec2::ZERO && self.zoom == 1.0 {
            return;
        }
        self.offset = Vec2::ZERO;
        self.zoom = 1.0_f64.clamp(self.min_zoom, self.max_zoom);
        self.emit(ViewportEvent::Changed);
    }

    /// Fit the view to show the given canvas bounds.
    pub fn fit_to_bounds(&mut self, bounds: Rect, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let padded = Size::new(
            (self.size.width - padding * 2.0).max(1.0),
            (self.size.height - padding * 2.0).max(1.0),
        );

        let scale_x = padded.width / bounds.width();
        let scale_y = padded.height / bounds.height();
        self.zoom = scale_x.min(scale_y).clamp(self.min_zoom, self.max_zoom);

        // Center the bounds in the viewport
        let bounds_center = bounds.center();
        self.offset = Vec2::new(
            self.size.width / 2.0 - bounds_center.x * self.zoom,
            self.size.height / 2.0 - bounds_center.y * self.zoom,
        );
        self.emit(ViewportEvent::Changed);
    }

    /// Apply a size immediately, bypassing the debounce.
    pub fn resize(&mut self, size: Size) {
        self.pending_resize = None;
        if size == self.size {
            return;
        }
        log::debug!("Viewport resized to {}x{}", size.width, size.height);
        self.size = size;
        self.emit(ViewportEvent::Resized(size));
    }

    /// Record a resize to apply once [`RESIZE_DEBOUNCE`] has passed without
    /// further requests. Later requests replace earlier ones.
    pub fn request_resize(&mut self, size: Size, now: Instant) {
        self.pending_resize = Some(PendingResize {
            size,
            requested_at: now,
        });
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending_resize.is_some()
    }

    /// Apply a pending resize whose quiet period has elapsed. Returns whether
    /// the size changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(pending) = self.pending_resize else {
            return false;
        };
        if now.saturating_duration_since(pending.requested_at) < RESIZE_DEBOUNCE {
            return false;
        }
        let changed = pending.size != self.size;
        self.resize(pending.size);
        changed
    }
}
