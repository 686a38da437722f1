//! Vello-based renderer implementation.

use crate::renderer::{RenderContext, Renderer};
use inkgraph_core::color::parse_color;
use inkgraph_core::element::{DrawContext, Fill as ElementFill};
use inkgraph_core::matrix;
use inkgraph_core::store::ElementStore;
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape, Stroke};
use peniko::{Color, Fill, Gradient};
use vello::Scene;

/// Outline drawn for rectangles without a fill.
const UNFILLED_OUTLINE: Color = Color::from_rgba8(160, 160, 160, 255);
const PLACEHOLDER_FILL: Color = Color::from_rgba8(200, 200, 200, 255);
const PLACEHOLDER_STROKE: Color = Color::from_rgba8(150, 150, 150, 255);

fn parse_or_log(color: &str) -> Option<Color> {
    let parsed = parse_color(color).map(Color::from);
    if parsed.is_none() {
        log::debug!("Unrecognized fill color '{}'", color);
    }
    parsed
}

/// [`DrawContext`] over a Vello scene.
///
/// Vello has no save/restore of its own, so the transform stack lives here
/// and each draw call carries the current transform.
pub struct SceneContext<'s> {
    scene: &'s mut Scene,
    current: Affine,
    stack: Vec<Affine>,
}

impl<'s> SceneContext<'s> {
    pub fn new(scene: &'s mut Scene, base: Affine) -> Self {
        Self {
            scene,
            current: base,
            stack: Vec::new(),
        }
    }

    /// Transform applied to the next draw call.
    pub fn current_transform(&self) -> Affine {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Stroke width in local units that comes out `pixels` wide on screen
    /// under the current transform, element scale included.
    pub fn hairline_width(&self, pixels: f64) -> f64 {
        let scale = matrix::determinant(self.current).abs().sqrt();
        pixels / scale.max(f64::EPSILON)
    }

    fn outline(&mut self, rect: Rect, color: Color) {
        let stroke = Stroke::new(self.hairline_width(1.0));
        self.scene
            .stroke(&stroke, self.current, color, None, &rect.to_path(0.1));
    }

    /// Gray box with an X, for image fills (not fetched by the renderer).
    fn image_placeholder(&mut self, rect: Rect) {
        let path = rect.to_path(0.1);
        self.scene
            .fill(Fill::NonZero, self.current, PLACEHOLDER_FILL, None, &path);

        let mut x_path = BezPath::new();
        x_path.move_to(Point::new(rect.x0, rect.y0));
        x_path.line_to(Point::new(rect.x1, rect.y1));
        x_path.move_to(Point::new(rect.x1, rect.y0));
        x_path.line_to(Point::new(rect.x0, rect.y1));
        let stroke = Stroke::new(self.hairline_width(2.0));
        self.scene
            .stroke(&stroke, self.current, PLACEHOLDER_STROKE, None, &x_path);
        self.scene
            .stroke(&stroke, self.current, PLACEHOLDER_STROKE, None, &path);
    }
}

impl DrawContext for SceneContext<'_> {
    fn save(&mut self) {
        self.stack.push(self.current);
    }

    fn restore(&mut self) {
        match self.stack.pop() {
            Some(transform) => self.current = transform,
            None => log::warn!("SceneContext::restore without matching save"),
        }
    }

    fn transform(&mut self, m: Affine) {
        self.current = self.current * m;
    }

    fn fill_rect(&mut self, rect: Rect, fill: Option<&ElementFill>) {
        if rect.is_zero_area() {
            return;
        }
        match fill {
            None => self.outline(rect, UNFILLED_OUTLINE),
            Some(ElementFill::Solid { color }) => match parse_or_log(color) {
                Some(color) => {
                    self.scene
                        .fill(Fill::NonZero, self.current, color, None, &rect)
                }
                None => self.outline(rect, UNFILLED_OUTLINE),
            },
            Some(ElementFill::Gradient { color, color_end }) => {
                let Some(start) = parse_or_log(color) else {
                    self.outline(rect, UNFILLED_OUTLINE);
                    return;
                };
                match color_end.as_deref().and_then(parse_or_log) {
                    Some(end) => {
                        let gradient = Gradient::new_linear(
                            Point::new(rect.x0, rect.y0),
                            Point::new(rect.x1, rect.y1),
                        )
                        .with_stops([start, end]);
                        self.scene
                            .fill(Fill::NonZero, self.current, &gradient, None, &rect);
                    }
                    None => self
                        .scene
                        .fill(Fill::NonZero, self.current, start, None, &rect),
                }
            }
            Some(ElementFill::Image { .. }) => self.image_placeholder(rect),
        }
    }
}

/// Vello-based renderer for GPU-accelerated 2D graphics.
pub struct VelloRenderer {
    /// The Vello scene being built.
    scene: Scene,
    /// Selection highlight color.
    selection_color: Color,
    /// Current zoom level (for zoom-independent UI elements).
    zoom: f64,
}

impl Default for VelloRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl VelloRenderer {
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            selection_color: Color::from_rgba8(59, 130, 246, 255),
            zoom: 1.0,
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    /// Outline each selected element along its (possibly rotated) corners,
    /// then the axis-aligned selection box with corner handles.
    fn render_selection(&mut self, store: &ElementStore, transform: Affine) {
        let stroke = Stroke::new(1.5 / self.zoom);
        for element in store.selected_elements() {
            let [tl, tr, br, bl] = element.world_corners(store);
            let mut path = BezPath::new();
            path.move_to(tl);
            path.line_to(tr);
            path.line_to(br);
            path.line_to(bl);
            path.close_path();
            self.scene
                .stroke(&stroke, transform, self.selection_color, None, &path);
        }

        if let Some(bounds) = store.select_box() {
            self.render_selection_handles(bounds, transform);
        }
    }

    fn render_selection_handles(&mut self, bounds: Rect, transform: Affine) {
        let handle_size = 8.0 / self.zoom;
        let stroke = Stroke::new(1.0 / self.zoom);
        self.scene.stroke(
            &stroke,
            transform,
            self.selection_color,
            None,
            &bounds.to_path(0.1),
        );

        let corners = [
            Point::new(bounds.x0, bounds.y0),
            Point::new(bounds.x1, bounds.y0),
            Point::new(bounds.x1, bounds.y1),
            Point::new(bounds.x0, bounds.y1),
        ];
        for corner in corners {
            let handle_rect = Rect::new(
                corner.x - handle_size / 2.0,
                corner.y - handle_size / 2.0,
                corner.x + handle_size / 2.0,
                corner.y + handle_size / 2.0,
            );
            self.scene
                .fill(Fill::NonZero, transform, Color::WHITE, None, &handle_rect);
            self.scene
                .stroke(&stroke, transform, self.selection_color, None, &handle_rect);
        }
    }

    /// Render the marquee: translucent fill with a dashed outline.
    fn render_selection_rect(&mut self, rect: Rect, transform: Affine) {
        let fill_color = Color::from_rgba8(59, 130, 246, 25);
        self.scene
            .fill(Fill::NonZero, transform, fill_color, None, &rect);

        let stroke_width = 1.0 / self.zoom;
        let dash_len = 4.0 / self.zoom;
        let stroke = Stroke::new(stroke_width).with_dashes(0.0, &[dash_len, dash_len]);
        self.scene
            .stroke(&stroke, transform, self.selection_color, None, &rect);
    }
}

impl Renderer for VelloRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) {
        self.scene.reset();
        self.selection_color = ctx.selection_color;
        self.zoom = ctx.viewport.zoom * ctx.scale_factor;

        let background = Rect::new(0.0, 0.0, ctx.viewport_size.width, ctx.viewport_size.height);
        self.scene.fill(
            Fill::NonZero,
            Affine::IDENTITY,
            ctx.background_color,
            None,
            &background,
        );

        let view = ctx.view_transform();
        {
            let mut scene_ctx = SceneContext::new(&mut self.scene, view);
            ctx.store.render(&mut scene_ctx);
        }

        if ctx.show_selection {
            self.render_selection(ctx.store, view);
            if let Some(marquee) = ctx.store.marquee_rect() {
                self.render_selection_rect(marquee, view);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkgraph_core::element::ElementKind;
    use inkgraph_core::viewport::Viewport;
    use kurbo::Size;

    fn populated_store() -> ElementStore {
        let mut store = ElementStore::new();
        let group = store
            .create_element(ElementKind::Group, 300.0, 300.0)
            .with_matrix(matrix::rotate(0.25));
        let group = store.add(group, None, None).unwrap();

        let fills = [
            None,
            Some(ElementFill::solid("#3b82f6")),
            Some(ElementFill::gradient("#ff0000", "#0000ff")),
            Some(ElementFill::image("https://example.com/cat.png")),
            Some(ElementFill::solid("not-a-color")),
        ];
        for (i, fill) in fills.into_iter().enumerate() {
            let mut element = store
                .create_element(ElementKind::Rect, 40.0, 30.0)
                .with_matrix(matrix::translate(i as f64 * 50.0, 10.0));
            if let Some(fill) = fill {
                element = element.with_fill(fill);
            }
            store.add(element, Some(&group), None).unwrap();
        }
        store
    }

    #[test]
    fn test_renderer_creation() {
        let renderer = VelloRenderer::new();
        assert!(renderer.scene().encoding().is_empty());
    }

    #[test]
    fn test_build_empty_scene() {
        let mut renderer = VelloRenderer::new();
        let store = ElementStore::new();
        let viewport = Viewport::new(Size::new(800.0, 600.0));
        let ctx = RenderContext::new(&store, &viewport);

        renderer.build_scene(&ctx);
        // Background only.
        assert!(!renderer.scene().encoding().is_empty());
    }

    #[test]
    fn test_build_scene_with_elements_and_selection() {
        let mut renderer = VelloRenderer::new();
        let mut store = populated_store();
        store.select_by_marquee(0.0, 0.0, 1000.0, 1000.0);
        store.set_marquee_rect(Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let viewport = Viewport::new(Size::new(800.0, 600.0));

        renderer.build_scene(&RenderContext::new(&store, &viewport).with_scale_factor(2.0));
        assert!(!renderer.scene().encoding().is_empty());

        let scene = renderer.take_scene();
        assert!(!scene.encoding().is_empty());
        assert!(renderer.scene().encoding().is_empty());
    }

    #[test]
    fn test_scene_context_transform_stack() {
        let mut scene = Scene::new();
        let base = matrix::scale(2.0, 2.0);
        let mut ctx = SceneContext::new(&mut scene, base);

        ctx.save();
        ctx.transform(matrix::translate(10.0, 0.0));
        assert_eq!(ctx.current_transform(), base * matrix::translate(10.0, 0.0));
        assert_eq!(ctx.depth(), 1);
        ctx.fill_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Some(&ElementFill::solid("#000")));
        ctx.restore();

        assert_eq!(ctx.current_transform(), base);
        assert_eq!(ctx.depth(), 0);
        // Unbalanced restore keeps the base transform.
        ctx.restore();
        assert_eq!(ctx.current_transform(), base);
        assert!(!scene.encoding().is_empty());
    }

    #[test]
    fn test_zero_area_rect_draws_nothing() {
        let mut scene = Scene::new();
        let mut ctx = SceneContext::new(&mut scene, Affine::IDENTITY);
        ctx.fill_rect(Rect::new(0.0, 0.0, 0.0, 10.0), Some(&ElementFill::solid("#000")));
        assert!(scene.encoding().is_empty());
    }

    #[test]
    fn test_hairline_width_tracks_element_scale() {
        let mut scene = Scene::new();
        // Viewport zoom of 2.
        let mut ctx = SceneContext::new(&mut scene, matrix::scale(2.0, 2.0));
        assert!((ctx.hairline_width(1.0) - 0.5).abs() < 1e-9);

        ctx.save();
        ctx.transform(matrix::scale(5.0, 5.0) * matrix::rotate(0.3));
        assert!((ctx.hairline_width(1.0) - 0.1).abs() < 1e-9);
        assert!((ctx.hairline_width(2.0) - 0.2).abs() < 1e-9);
        ctx.restore();

        assert!((ctx.hairline_width(1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hairline_width_on_singular_transform_is_finite() {
        let mut scene = Scene::new();
        let ctx = SceneContext::new(&mut scene, matrix::scale(0.0, 1.0));
        assert!(ctx.hairline_width(1.0).is_finite());
    }
}
