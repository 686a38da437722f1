//! Tool system for the editor.
//!
//! Pointer input arrives in screen pixels; the active tool converts it to
//! canvas units through the [`Viewport`] and drives the [`ElementStore`].

use crate::store::ElementStore;
use crate::viewport::Viewport;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Pan,
}

/// State of a pointer gesture.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ToolState {
    /// Waiting for a pointer down.
    #[default]
    Idle,
    /// Dragging out a selection rectangle (canvas units).
    MarqueeSelecting { start: Point, current: Point },
    /// Moving the selection; `last` is the previous canvas position.
    Dragging { last: Point },
    /// Panning the view; `last` is the previous screen position.
    Panning { last: Point },
}

/// Manages the current tool and its gesture state.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    state: ToolState,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != ToolState::Idle
    }

    /// Switch tools. Any gesture in progress is cancelled.
    pub fn set_tool(&mut self, tool: ToolKind, store: &mut ElementStore) {
        self.cancel(store);
        self.current_tool = tool;
    }

    /// Abandon the current gesture without committing a marquee.
    pub fn cancel(&mut self, store: &mut ElementStore) {
        match self.state {
            ToolState::MarqueeSelecting { .. } => store.set_marquee_rect(None),
            ToolState::Dragging { .. } => {
                store.calc_select_box();
            }
            ToolState::Idle | ToolState::Panning { .. } => {}
        }
        self.state = ToolState::Idle;
    }

    /// Begin a gesture. With `additive` (shift) set, clicks and marquees add
    /// to the selection instead of replacing it.
    pub fn pointer_down(
        &mut self,
        screen_point: Point,
        additive: bool,
        store: &mut ElementStore,
        viewport: &Viewport,
    ) {
        if self.current_tool == ToolKind::Pan {
            self.state = ToolState::Panning { last: screen_point };
            return;
        }

        let point = viewport.screen_to_canvas(screen_point);
        match store.hit_test(point) {
            Some(id) => {
                if !store.is_selected(&id) {
                    if additive {
                        store.add_to_selection(&id);
                    } else {
                        store.select(&id);
                    }
                }
                self.state = ToolState::Dragging { last: point };
            }
            None if store.hit_selection(point) => {
                self.state = ToolState::Dragging { last: point };
            }
            None => {
                if !additive {
                    store.clear_selection();
                }
                store.set_marquee_rect(Some(Rect::from_points(point, point)));
                self.state = ToolState::MarqueeSelecting {
                    start: point,
                    current: point,
                };
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        screen_point: Point,
        store: &mut ElementStore,
        viewport: &mut Viewport,
    ) {
        match self.state {
            ToolState::Idle => {}
            ToolState::Panning { last } => {
                viewport.pan(screen_point - last);
                self.state = ToolState::Panning { last: screen_point };
            }
            ToolState::MarqueeSelecting { start, .. } => {
                let current = viewport.screen_to_canvas(screen_point);
                store.set_marquee_rect(Some(Rect::from_points(start, current)));
                self.state = ToolState::MarqueeSelecting { start, current };
            }
            ToolState::Dragging { last } => {
                let point = viewport.screen_to_canvas(screen_point);
                let delta = point - last;
                store.move_selected_element(delta.x, delta.y);
                store.hit_top_exclude_selected(point);
                self.state = ToolState::Dragging { last: point };
            }
        }
    }

    /// End the gesture. Only pointer-up commits a marquee selection.
    pub fn pointer_up(&mut self, store: &mut ElementStore) {
        match self.state {
            ToolState::MarqueeSelecting { start, current } => {
                let rect = Rect::from_points(start, current);
                store.select_by_marquee(rect.x0, rect.y0, rect.x1, rect.y1);
                store.set_marquee_rect(None);
            }
            ToolState::Dragging { .. } => {
                store.calc_select_box();
            }
            ToolState::Idle | ToolState::Panning { .. } => {}
        }
        self.state = ToolState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::matrix;
    use kurbo::{Affine, Size, Vec2};

    fn setup() -> (ElementStore, Viewport, ToolManager) {
        (
            ElementStore::new(),
            Viewport::new(Size::new(800.0, 600.0)),
            ToolManager::new(),
        )
    }

    fn add_rect(store: &mut ElementStore, w: f64, h: f64, m: Affine, parent: Option<&str>) -> String {
        let element = store.create_element(ElementKind::Rect, w, h).with_matrix(m);
        store.add(element, parent, None).unwrap()
    }

    #[test]
    fn test_default_tool() {
        let tools = ToolManager::new();
        assert_eq!(tools.current_tool, ToolKind::Select);
        assert_eq!(tools.state(), ToolState::Idle);
        assert!(!tools.is_active());
    }

    #[test]
    fn test_marquee_gesture_selects_on_pointer_up() {
        let (mut store, mut viewport, mut tools) = setup();
        let r1 = add_rect(&mut store, 100.0, 50.0, matrix::translate(100.0, 100.0), None);

        tools.pointer_down(Point::new(10.0, 10.0), false, &mut store, &viewport);
        assert!(matches!(tools.state(), ToolState::MarqueeSelecting { .. }));

        tools.pointer_move(Point::new(150.0, 120.0), &mut store, &mut viewport);
        assert_eq!(store.marquee_rect(), Some(Rect::new(10.0, 10.0, 150.0, 120.0)));
        assert!(store.selected_ids().is_empty());

        tools.pointer_up(&mut store);
        assert_eq!(store.selected_ids(), &[r1]);
        assert_eq!(store.marquee_rect(), None);
        assert_eq!(tools.state(), ToolState::Idle);
    }

    #[test]
    fn test_click_empty_area_clears_selection() {
        let (mut store, viewport, mut tools) = setup();
        let r1 = add_rect(&mut store, 10.0, 10.0, Affine::IDENTITY, None);
        store.select(&r1);

        tools.pointer_down(Point::new(500.0, 500.0), false, &mut store, &viewport);
        tools.pointer_up(&mut store);
        assert!(store.selected_ids().is_empty());
    }

    #[test]
    fn test_additive_click_keeps_selection() {
        let (mut store, viewport, mut tools) = setup();
        let a = add_rect(&mut store, 10.0, 10.0, Affine::IDENTITY, None);
        let b = add_rect(&mut store, 10.0, 10.0, matrix::translate(50.0, 0.0), None);

        tools.pointer_down(Point::new(5.0, 5.0), false, &mut store, &viewport);
        tools.pointer_up(&mut store);
        tools.pointer_down(Point::new(55.0, 5.0), true, &mut store, &viewport);
        tools.pointer_up(&mut store);
        assert_eq!(store.selected_ids(), &[a, b]);
    }

    #[test]
    fn test_drag_moves_selection_in_canvas_units() {
        let (mut store, mut viewport, mut tools) = setup();
        viewport.zoom = 2.0;
        let r = add_rect(&mut store, 10.0, 10.0, Affine::IDENTITY, None);

        // Screen (10, 10) is canvas (5, 5) at 2x zoom.
        tools.pointer_down(Point::new(10.0, 10.0), false, &mut store, &viewport);
        assert!(store.is_selected(&r));
        assert!(matches!(tools.state(), ToolState::Dragging { .. }));

        tools.pointer_move(Point::new(30.0, 50.0), &mut store, &mut viewport);
        tools.pointer_up(&mut store);

        assert_eq!(store.get(&r).unwrap().local_matrix(), matrix::translate(10.0, 20.0));
        let bbox = store.select_box().unwrap();
        assert!((bbox.x0 - 10.0).abs() < 1e-9);
        assert!((bbox.y1 - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_into_group_reparents() {
        let (mut store, mut viewport, mut tools) = setup();
        let group = store
            .create_element(ElementKind::Group, 200.0, 200.0)
            .with_matrix(matrix::translate(300.0, 0.0));
        let group = store.add(group, None, None).unwrap();
        let r = add_rect(&mut store, 10.0, 10.0, Affine::IDENTITY, None);

        tools.pointer_down(Point::new(5.0, 5.0), false, &mut store, &viewport);
        tools.pointer_move(Point::new(355.0, 55.0), &mut store, &mut viewport);
        tools.pointer_up(&mut store);

        assert_eq!(store.parent_of(&r), Some(group.as_str()));
        let world = store.get(&r).unwrap().world_matrix(&store);
        assert!(matrix::approx_eq(world, matrix::translate(350.0, 50.0), 1e-9));
    }

    #[test]
    fn test_pan_tool_moves_viewport() {
        let (mut store, mut viewport, mut tools) = setup();
        tools.set_tool(ToolKind::Pan, &mut store);

        tools.pointer_down(Point::new(100.0, 100.0), false, &mut store, &viewport);
        tools.pointer_move(Point::new(130.0, 90.0), &mut store, &mut viewport);
        tools.pointer_up(&mut store);
        assert_eq!(viewport.offset, Vec2::new(30.0, -10.0));
    }

    #[test]
    fn test_cancel_drops_marquee() {
        let (mut store, mut viewport, mut tools) = setup();
        add_rect(&mut store, 10.0, 10.0, Affine::IDENTITY, None);

        tools.pointer_down(Point::new(-50.0, -50.0), false, &mut store, &viewport);
        tools.pointer_move(Point::new(50.0, 50.0), &mut store, &mut viewport);
        tools.cancel(&mut store);
        assert_eq!(store.marquee_rect(), None);
        assert!(store.selected_ids().is_empty());
        assert!(!tools.is_active());
    }
}
