//! Renderer trait abstraction.

use inkgraph_core::store::ElementStore;
use inkgraph_core::viewport::Viewport;
use kurbo::{Affine, Size};
use peniko::Color;

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// The scene to render.
    pub store: &'a ElementStore,
    /// Pan and zoom applied to canvas units.
    pub viewport: &'a Viewport,
    /// Viewport size in physical pixels.
    pub viewport_size: Size,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    pub background_color: Color,
    /// Selection highlight color.
    pub selection_color: Color,
    /// Draw selection outlines and handles.
    pub show_selection: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(store: &'a ElementStore, viewport: &'a Viewport) -> Self {
        Self {
            store,
            viewport,
            viewport_size: viewport.size(),
            scale_factor: 1.0,
            background_color: Color::from_rgba8(250, 250, 250, 255),
            selection_color: Color::from_rgba8(59, 130, 246, 255), // Blue
            show_selection: true,
        }
    }

    /// Override the surface size (defaults to the viewport size).
    pub fn with_viewport_size(mut self, size: Size) -> Self {
        self.viewport_size = size;
        self
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }

    /// Hide selection chrome, e.g. for exports.
    pub fn without_selection(mut self) -> Self {
        self.show_selection = false;
        self
    }

    /// Canvas units to physical pixels.
    pub fn view_transform(&self) -> Affine {
        Affine::scale(self.scale_factor) * self.viewport.transform()
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Build the scene/command buffer for a frame.
    ///
    /// Called once per frame; prepares all drawing commands.
    fn build_scene(&mut self, ctx: &RenderContext);

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Point, Vec2};

    #[test]
    fn test_context_defaults_follow_viewport() {
        let store = ElementStore::new();
        let viewport = Viewport::new(Size::new(640.0, 480.0));
        let ctx = RenderContext::new(&store, &viewport);
        assert_eq!(ctx.viewport_size, Size::new(640.0, 480.0));
        assert!(ctx.show_selection);
        assert!(!ctx.without_selection().show_selection);
    }

    #[test]
    fn test_view_transform_includes_scale_factor() {
        let store = ElementStore::new();
        let mut viewport = Viewport::new(Size::new(640.0, 480.0));
        viewport.offset = Vec2::new(10.0, 0.0);
        viewport.zoom = 2.0;

        let ctx = RenderContext::new(&store, &viewport).with_scale_factor(2.0);
        let p = ctx.view_transform() * Point::new(5.0, 5.0);
        assert!((p.x - 40.0).abs() < 1e-9);
        assert!((p.y - 20.0).abs() < 1e-9);
    }
}
