//! Layered UI input/render model: a stack of panes, dialogs, and
//! overlays with deterministic top-down input routing.

pub mod dialog;
pub mod layer;
pub mod renderer;

use layer::Layer;
use renderer::{Key, Renderer};

/// Routes input top-down, renders bottom-up (stopping at the first
/// full-screen layer), and pops layers that self-close after the
/// current frame.
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// `task_active`: when true, ESC is privileged and never reaches a
    /// layer — it cancels the task instead. Returns `true` if something
    /// consumed the key at the layer level (the caller checks
    /// `task_active` separately to know whether ESC was intercepted).
    pub fn handle_key_event(&mut self, key: Key, task_active: bool) -> bool {
        if key == Key::Escape && task_active {
            return false;
        }
        if key == Key::Escape {
            let top_dismissable = self.layers.last().map(|l| l.is_dismissable()).unwrap_or(false);
            if top_dismissable {
                self.layers.pop();
                return true;
            }
        }

        for layer in self.layers.iter_mut().rev() {
            let consumed = layer.handle_key_event(key);
            if consumed {
                return true;
            }
            if layer.is_modal() {
                // A modal layer absorbs everything even if its own
                // handler returned false, so lower layers never see it.
                return true;
            }
        }
        false
    }

    pub fn handle_char_event(&mut self, ch: char) -> bool {
        for layer in self.layers.iter_mut().rev() {
            let consumed = layer.handle_char_event(ch);
            if consumed {
                return true;
            }
            if layer.is_modal() {
                return true;
            }
        }
        false
    }

    /// Renders from the deepest visible layer upward; a full-screen
    /// layer hides everything beneath it.
    pub fn render(&self, renderer: &mut dyn Renderer) {
        let start = self
            .layers
            .iter()
            .rposition(|l| l.is_full_screen())
            .unwrap_or(0);
        for layer in &self.layers[start..] {
            layer.render(renderer);
        }
    }

    pub fn needs_redraw(&self) -> bool {
        self.layers.iter().any(|l| l.needs_redraw())
    }

    pub fn clear_dirty(&mut self) {
        for layer in &mut self.layers {
            layer.clear_dirty();
        }
    }

    /// Pops every layer that has flagged itself closed; called once per
    /// frame, after input handling and rendering.
    pub fn reap_closed(&mut self) {
        self.layers.retain(|l| !l.should_close());
    }
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialog::ChoiceDialog;

    struct CountingPane {
        dirty: bool,
        key_presses: usize,
    }

    impl Layer for CountingPane {
        fn handle_key_event(&mut self, _key: Key) -> bool {
            self.key_presses += 1;
            true
        }
        fn handle_char_event(&mut self, _ch: char) -> bool {
            true
        }
        fn render(&self, _renderer: &mut dyn Renderer) {}
        fn needs_redraw(&self) -> bool {
            self.dirty
        }
        fn mark_dirty(&mut self) {
            self.dirty = true;
        }
        fn clear_dirty(&mut self) {
            self.dirty = false;
        }
    }

    #[test]
    fn modal_dialog_absorbs_keys_that_bleed_to_pane_below() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(CountingPane { dirty: false, key_presses: 0 }));
        stack.push(Box::new(ChoiceDialog::new("confirm?", vec!["yes".into(), "no".into()])));

        stack.handle_key_event(Key::Up, false);
        // The pane below must never see the key; only the dialog consumed it.
        assert_eq!(stack.layers[0].needs_redraw(), false);
    }

    #[test]
    fn escape_pops_dismissable_layer_when_no_task_active() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(ChoiceDialog::new("confirm?", vec!["yes".into()])));
        stack.handle_key_event(Key::Escape, false);
        stack.reap_closed();
        assert!(stack.is_empty());
    }

    #[test]
    fn escape_does_not_reach_layers_when_task_active() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(ChoiceDialog::new("confirm?", vec!["yes".into()])));
        let consumed = stack.handle_key_event(Key::Escape, true);
        assert!(!consumed);
        assert_eq!(stack.len(), 1);
    }
}
