//! The `Layer` contract: panes, dialogs, and overlays all implement it.

use super::renderer::{Event, Key, Renderer};

pub trait Layer: Send {
    fn handle_key_event(&mut self, key: Key) -> bool;
    fn handle_char_event(&mut self, ch: char) -> bool;
    fn render(&self, renderer: &mut dyn Renderer);
    fn needs_redraw(&self) -> bool;
    fn mark_dirty(&mut self);
    fn clear_dirty(&mut self);
    fn is_full_screen(&self) -> bool {
        false
    }
    fn should_close(&self) -> bool {
        false
    }
    /// Modal dialogs absorb every event they don't explicitly recognize,
    /// preventing "action bleed" into the pane view below.
    fn is_modal(&self) -> bool {
        false
    }
    /// A layer is dismissable by a bare ESC when no task is active.
    fn is_dismissable(&self) -> bool {
        false
    }
}

pub fn dispatch_event(layer: &mut dyn Layer, event: Event) -> bool {
    match event {
        Event::Key(key) => layer.handle_key_event(key),
        Event::Char(ch) => layer.handle_char_event(ch),
        _ => false,
    }
}
