//! Scene elements.
//!
//! An [`Element`] is a node of the scene tree: it owns its geometry and local
//! transform, and refers to its parent and children by id. Lookups of other
//! nodes go through an [`ElementResolver`] (normally the
//! [`ElementStore`](crate::store::ElementStore)), which also supplies the epoch
//! used to validate each element's cached world matrix.

use crate::matrix;
use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Stable element identifier, unique within a store.
pub type ElementId = String;

/// Reserved id of the synthetic root node.
pub const ROOT_ID: &str = "root";

/// Element variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Rect,
    /// Non-drawing container.
    Group,
}

impl ElementKind {
    /// Label used for auto-generated names.
    pub fn label(self) -> &'static str {
        match self {
            ElementKind::Rect => "Rectangle",
            ElementKind::Group => "Group",
        }
    }

    /// Whether the element paints anything itself.
    pub fn draws(self) -> bool {
        match self {
            ElementKind::Rect => true,
            ElementKind::Group => false,
        }
    }
}

/// Fill style of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Fill {
    Solid {
        #[serde(default)]
        color: String,
    },
    Image {
        #[serde(rename = "imageUrl", default)]
        image_url: String,
    },
    /// Linear gradient from the left edge (`color`) to the right edge
    /// (`color_end`, defaulting to `color`).
    Gradient {
        #[serde(default)]
        color: String,
        #[serde(rename = "colorEnd", default, skip_serializing_if = "Option::is_none")]
        color_end: Option<String>,
    },
}

impl Fill {
    pub fn solid(color: impl Into<String>) -> Self {
        Fill::Solid {
            color: color.into(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Fill::Image {
            image_url: url.into(),
        }
    }

    pub fn gradient(from: impl Into<String>, to: impl Into<String>) -> Self {
        Fill::Gradient {
            color: from.into(),
            color_end: Some(to.into()),
        }
    }
}

/// Access to other elements and to the store-wide cache epoch.
pub trait ElementResolver {
    fn resolve(&self, id: &str) -> Option<&Element>;

    /// Current cache epoch. Any change invalidates every cached world matrix.
    fn epoch(&self) -> u64;
}

/// Drawing surface used by [`Element::render`].
///
/// Implementations keep a transform stack: `save` pushes the current
/// transform, `restore` pops it, and `transform` post-multiplies the current
/// transform (`current = current * m`).
pub trait DrawContext {
    fn save(&mut self);
    fn restore(&mut self);
    fn transform(&mut self, m: Affine);
    /// Paint `rect` (in current local units) with `fill`. `None` means
    /// unfilled; the context decides how to show it.
    fn fill_rect(&mut self, rect: Rect, fill: Option<&Fill>);
}

#[derive(Debug, Clone, Copy)]
struct WorldCache {
    epoch: u64,
    world: Affine,
    inverse: Option<Affine>,
}

/// A node of the scene tree.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) id: ElementId,
    kind: ElementKind,
    name: String,
    width: f64,
    height: f64,
    local: Affine,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    visible: bool,
    pub(crate) selected: bool,
    fill: Option<Fill>,
    cache: Cell<Option<WorldCache>>,
}

impl Element {
    /// Create a detached element with an identity transform.
    ///
    /// The name defaults to the kind label; stores hand out numbered names
    /// through [`ElementStore::create_element`](crate::store::ElementStore::create_element).
    pub fn new(id: impl Into<ElementId>, kind: ElementKind, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            name: kind.label().to_string(),
            width: width.max(0.0),
            height: height.max(0.0),
            local: Affine::IDENTITY,
            parent: None,
            children: Vec::new(),
            visible: true,
            selected: false,
            fill: None,
            cache: Cell::new(None),
        }
    }

    pub(crate) fn root() -> Self {
        let mut root = Self::new(ROOT_ID, ElementKind::Group, 0.0, 0.0);
        root.name = "Root".to_string();
        root
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_matrix(mut self, matrix: Affine) -> Self {
        self.set_local_matrix(matrix);
        self
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Parent id; `None` only for the root (or a detached element).
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Child ids in render order (last is front-most).
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    pub fn fill(&self) -> Option<&Fill> {
        self.fill.as_ref()
    }

    /// Local drawable extent `[0,w]×[0,h]`.
    pub fn local_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// Parent-relative transform.
    pub fn local_matrix(&self) -> Affine {
        self.local
    }

    pub fn set_local_matrix(&mut self, matrix: Affine) {
        self.local = matrix;
        self.invalidate();
    }

    /// Translate in the parent's coordinate system, regardless of this
    /// element's own rotation or scale.
    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.set_local_matrix(matrix::multiply(matrix::translate(dx, dy), self.local));
    }

    /// Replace the translation components, keeping rotation/scale/shear.
    pub fn set_translation(&mut self, x: f64, y: f64) {
        let [a, b, c, d, _, _] = self.local.as_coeffs();
        self.set_local_matrix(Affine::new([a, b, c, d, x, y]));
    }

    /// Negative and NaN sizes are clamped to zero.
    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_fill(&mut self, fill: Option<Fill>) {
        self.fill = fill;
    }

    pub(crate) fn invalidate(&self) {
        self.cache.set(None);
    }

    fn world_cache<R: ElementResolver + ?Sized>(&self, resolver: &R) -> WorldCache {
        let epoch = resolver.epoch();
        if let Some(cache) = self.cache.get() {
            if cache.epoch == epoch {
                return cache;
            }
        }

        // The root contributes identity; a dangling parent truncates the chain.
        let world = match self.parent.as_deref() {
            None | Some(ROOT_ID) => self.local,
            Some(parent_id) => match resolver.resolve(parent_id) {
                Some(parent) => matrix::multiply(parent.world_matrix(resolver), self.local),
                None => self.local,
            },
        };
        let cache = WorldCache {
            epoch,
            world,
            inverse: matrix::invert(world).ok(),
        };
        self.cache.set(Some(cache));
        cache
    }

    /// Local → world transform: the product of ancestor local matrices from
    /// the root down to this element.
    pub fn world_matrix<R: ElementResolver + ?Sized>(&self, resolver: &R) -> Affine {
        self.world_cache(resolver).world
    }

    /// World → local transform, or `None` when the world matrix is singular.
    pub fn inverse_world_matrix<R: ElementResolver + ?Sized>(&self, resolver: &R) -> Option<Affine> {
        self.world_cache(resolver).inverse
    }

    /// Corners of the local rectangle in world space: top-left, top-right,
    /// bottom-right, bottom-left.
    pub fn world_corners<R: ElementResolver + ?Sized>(&self, resolver: &R) -> [Point; 4] {
        let world = self.world_matrix(resolver);
        let (w, h) = (self.width, self.height);
        [
            world * Point::new(0.0, 0.0),
            world * Point::new(w, 0.0),
            world * Point::new(w, h),
            world * Point::new(0.0, h),
        ]
    }

    /// Axis-aligned bounds of the four world corners.
    pub fn world_aabb<R: ElementResolver + ?Sized>(&self, resolver: &R) -> Rect {
        let corners = self.world_corners(resolver);
        let mut aabb = Rect::from_points(corners[0], corners[0]);
        for corner in &corners[1..] {
            aabb = aabb.union_pt(*corner);
        }
        aabb
    }

    /// Exact hit test against the local rectangle (edges inclusive).
    pub fn hit_test<R: ElementResolver + ?Sized>(&self, point: Point, resolver: &R) -> bool {
        let Some(inverse) = self.inverse_world_matrix(resolver) else {
            return false;
        };
        let local = inverse * point;
        local.x >= 0.0 && local.x <= self.width && local.y >= 0.0 && local.y <= self.height
    }

    /// Draw this element and its subtree.
    pub fn render<C, R>(&self, ctx: &mut C, resolver: &R)
    where
        C: DrawContext + ?Sized,
        R: ElementResolver + ?Sized,
    {
        if !self.visible {
            return;
        }
        ctx.save();
        ctx.transform(self.local);
        if self.kind.draws() {
            ctx.fill_rect(self.local_rect(), self.fill.as_ref());
        }
        for child_id in &self.children {
            if let Some(child) = resolver.resolve(child_id) {
                child.render(ctx, resolver);
            }
        }
        ctx.restore();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::f64::consts::FRAC_PI_2;

    /// Minimal resolver over a flat map, independent of the store.
    #[derive(Default)]
    pub(crate) struct MapResolver {
        pub elements: HashMap<ElementId, Element>,
        pub epoch: u64,
    }

    impl MapResolver {
        pub fn insert(&mut self, mut element: Element, parent: Option<&str>) {
            element.parent = parent.map(str::to_string);
            if let Some(parent) = parent.and_then(|p| self.elements.get_mut(p)) {
                parent.children.push(element.id.clone());
            }
            self.elements.insert(element.id.clone(), element);
        }
    }

    impl ElementResolver for MapResolver {
        fn resolve(&self, id: &str) -> Option<&Element> {
            self.elements.get(id)
        }

        fn epoch(&self) -> u64 {
            self.epoch
        }
    }

    /// Records draw calls with the transform active at the time.
    #[derive(Default)]
    pub(crate) struct RecordingContext {
        current: Affine,
        stack: Vec<Affine>,
        pub fills: Vec<(Affine, Rect)>,
        pub depth_max: usize,
    }

    impl DrawContext for RecordingContext {
        fn save(&mut self) {
            self.stack.push(self.current);
            self.depth_max = self.depth_max.max(self.stack.len());
        }

        fn restore(&mut self) {
            self.current = self.stack.pop().unwrap_or(Affine::IDENTITY);
        }

        fn transform(&mut self, m: Affine) {
            self.current = self.current * m;
        }

        fn fill_rect(&mut self, rect: Rect, _fill: Option<&Fill>) {
            self.fills.push((self.current, rect));
        }
    }

    fn assert_rect(rect: Rect, x0: f64, y0: f64, x1: f64, y1: f64) {
        const EPS: f64 = 1e-9;
        assert!((rect.x0 - x0).abs() < EPS, "x0 {} != {}", rect.x0, x0);
        assert!((rect.y0 - y0).abs() < EPS, "y0 {} != {}", rect.y0, y0);
        assert!((rect.x1 - x1).abs() < EPS, "x1 {} != {}", rect.x1, x1);
        assert!((rect.y1 - y1).abs() < EPS, "y1 {} != {}", rect.y1, y1);
    }

    #[test]
    fn test_world_aabb_identity() {
        let mut resolver = MapResolver::default();
        resolver.insert(Element::new("r1", ElementKind::Rect, 100.0, 50.0), Some(ROOT_ID));
        let aabb = resolver.elements["r1"].world_aabb(&resolver);
        assert_rect(aabb, 0.0, 0.0, 100.0, 50.0);
    }

    #[test]
    fn test_world_aabb_rotated() {
        let mut resolver = MapResolver::default();
        let rect = Element::new("r1", ElementKind::Rect, 100.0, 50.0)
            .with_matrix(matrix::rotate(FRAC_PI_2));
        resolver.insert(rect, Some(ROOT_ID));
        let aabb = resolver.elements["r1"].world_aabb(&resolver);
        assert_rect(aabb, -50.0, 0.0, 0.0, 100.0);
    }

    #[test]
    fn test_world_corners_winding() {
        let mut resolver = MapResolver::default();
        let rect = Element::new("r1", ElementKind::Rect, 10.0, 20.0)
            .with_matrix(matrix::translate(5.0, 5.0));
        resolver.insert(rect, Some(ROOT_ID));
        let corners = resolver.elements["r1"].world_corners(&resolver);
        assert_eq!(corners[0], Point::new(5.0, 5.0));
        assert_eq!(corners[1], Point::new(15.0, 5.0));
        assert_eq!(corners[2], Point::new(15.0, 25.0));
        assert_eq!(corners[3], Point::new(5.0, 25.0));
    }

    #[test]
    fn test_world_matrix_composition() {
        let la = matrix::multiply(matrix::translate(10.0, 20.0), matrix::rotate(0.4));
        let lb = matrix::multiply(matrix::translate(3.0, 4.0), matrix::scale(2.0, 0.5));
        let mut resolver = MapResolver::default();
        resolver.insert(Element::new("a", ElementKind::Group, 50.0, 50.0).with_matrix(la), Some(ROOT_ID));
        resolver.insert(Element::new("b", ElementKind::Rect, 5.0, 5.0).with_matrix(lb), Some("a"));
        let world = resolver.elements["b"].world_matrix(&resolver);
        assert!(matrix::approx_eq(world, matrix::multiply(la, lb), 1e-9));
    }

    #[test]
    fn test_world_cache_follows_epoch() {
        let mut resolver = MapResolver::default();
        resolver.insert(Element::new("a", ElementKind::Group, 50.0, 50.0), Some(ROOT_ID));
        resolver.insert(Element::new("b", ElementKind::Rect, 5.0, 5.0), Some("a"));
        assert_eq!(resolver.elements["b"].world_matrix(&resolver), Affine::IDENTITY);

        resolver
            .elements
            .get_mut("a")
            .unwrap()
            .set_local_matrix(matrix::translate(7.0, 0.0));
        // Same epoch: the child's cache is still considered valid.
        assert_eq!(resolver.elements["b"].world_matrix(&resolver), Affine::IDENTITY);

        resolver.epoch += 1;
        assert_eq!(
            resolver.elements["b"].world_matrix(&resolver),
            matrix::translate(7.0, 0.0)
        );
    }

    #[test]
    fn test_dangling_parent_truncates_chain() {
        let mut resolver = MapResolver::default();
        let child = Element::new("c", ElementKind::Rect, 5.0, 5.0).with_matrix(matrix::translate(1.0, 2.0));
        resolver.insert(child, Some("missing"));
        assert_eq!(
            resolver.elements["c"].world_matrix(&resolver),
            matrix::translate(1.0, 2.0)
        );
    }

    #[test]
    fn test_move_by_is_in_parent_space() {
        let mut rect = Element::new("r", ElementKind::Rect, 10.0, 10.0)
            .with_matrix(matrix::rotate(FRAC_PI_2));
        rect.move_by(5.0, 0.0);
        let [_, _, _, _, e, f] = rect.local_matrix().as_coeffs();
        assert!((e - 5.0).abs() < 1e-9);
        assert!(f.abs() < 1e-9);
    }

    #[test]
    fn test_set_translation_keeps_linear_part() {
        let mut rect = Element::new("r", ElementKind::Rect, 10.0, 10.0)
            .with_matrix(matrix::multiply(matrix::translate(1.0, 1.0), matrix::scale(2.0, 3.0)));
        rect.set_translation(40.0, 50.0);
        assert_eq!(rect.local_matrix().as_coeffs(), [2.0, 0.0, 0.0, 3.0, 40.0, 50.0]);
    }

    #[test]
    fn test_hit_test_local_space() {
        let mut resolver = MapResolver::default();
        let rect = Element::new("r", ElementKind::Rect, 100.0, 50.0)
            .with_matrix(matrix::rotate(FRAC_PI_2));
        resolver.insert(rect, Some(ROOT_ID));
        let rect = &resolver.elements["r"];
        assert!(rect.hit_test(Point::new(-25.0, 50.0), &resolver));
        assert!(!rect.hit_test(Point::new(25.0, 50.0), &resolver));
    }

    #[test]
    fn test_hit_test_singular_matrix_misses() {
        let mut resolver = MapResolver::default();
        let rect = Element::new("r", ElementKind::Rect, 100.0, 50.0)
            .with_matrix(matrix::scale(0.0, 1.0));
        resolver.insert(rect, Some(ROOT_ID));
        assert!(!resolver.elements["r"].hit_test(Point::new(0.0, 0.0), &resolver));
    }

    #[test]
    fn test_negative_size_clamped() {
        let rect = Element::new("r", ElementKind::Rect, -4.0, 3.0);
        assert_eq!(rect.width(), 0.0);
        assert_eq!(rect.height(), 3.0);
    }

    #[test]
    fn test_render_isolates_sibling_transforms() {
        let mut resolver = MapResolver::default();
        resolver.insert(
            Element::new("g", ElementKind::Group, 0.0, 0.0).with_matrix(matrix::translate(100.0, 0.0)),
            Some(ROOT_ID),
        );
        resolver.insert(
            Element::new("a", ElementKind::Rect, 10.0, 10.0).with_matrix(matrix::translate(0.0, 5.0)),
            Some("g"),
        );
        resolver.insert(
            Element::new("b", ElementKind::Rect, 10.0, 10.0).with_matrix(matrix::translate(0.0, 7.0)),
            Some("g"),
        );
        resolver.insert(
            Element::new("hidden", ElementKind::Rect, 10.0, 10.0).with_visible(false),
            Some("g"),
        );

        let mut ctx = RecordingContext::default();
        resolver.elements["g"].render(&mut ctx, &resolver);

        // The group paints nothing; the hidden rect is skipped.
        assert_eq!(ctx.fills.len(), 2);
        assert_eq!(ctx.fills[0].0, matrix::translate(100.0, 5.0));
        assert_eq!(ctx.fills[1].0, matrix::translate(100.0, 7.0));
        assert_eq!(ctx.depth_max, 2);
    }

    #[test]
    fn test_fill_serialization_shape() {
        let json = serde_json::to_value(Fill::image("cat.png")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "image", "imageUrl": "cat.png"}));
        let fill: Fill = serde_json::from_str(r##"{"type":"solid","color":"#ff0000"}"##).unwrap();
        assert_eq!(fill, Fill::solid("#ff0000"));
    }
}
