/// Position and drag state of the overlay window.
///
/// Cursor positions are window-relative, as the windowing system reports
/// them. While dragging, the window moves by the cursor's offset from the
/// anchor, so the grabbed point stays under the cursor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowState {
    position: (i32, i32),
    size: (u32, u32),
    drag_active: bool,
    drag_anchor: (f64, f64),
}

impl WindowState {
    pub fn new(position: (i32, i32), size: (u32, u32)) -> Self {
        Self {
            position,
            size,
            ..Self::default()
        }
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_active
    }

    pub fn set_position(&mut self, position: (i32, i32)) {
        self.position = position;
    }

    pub fn set_size(&mut self, size: (u32, u32)) {
        self.size = size;
    }

    pub fn begin_drag(&mut self, cursor: (f64, f64)) {
        self.drag_active = true;
        self.drag_anchor = cursor;
    }

    /// New window position for a cursor move, or `None` when not dragging.
    pub fn drag_to(&mut self, cursor: (f64, f64)) -> Option<(i32, i32)> {
        if !self.drag_active {
            return None;
        }
        let dx = (cursor.0 - self.drag_anchor.0).round() as i32;
        let dy = (cursor.1 - self.drag_anchor.1).round() as i32;
        if dx == 0 && dy == 0 {
            return None;
        }
        self.position = (self.position.0 + dx, self.position.1 + dy);
        Some(self.position)
    }

    pub fn end_drag(&mut self) {
        self.drag_active = false;
    }
}
