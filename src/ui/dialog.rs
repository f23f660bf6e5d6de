//! Generic dialog contract: confirmation and choice dialogs, plus the
//! `content_changed` coordination point a background scan thread and
//! the main render loop both serialize on.

use super::layer::Layer;
use super::renderer::{Key, Renderer, ColorPair, Attributes};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum DialogResult {
    Confirmed,
    Declined,
    Choice(usize),
    Cancelled,
}

/// A confirmation dialog with a fixed set of choices (e.g. the conflict
/// resolution options: overwrite this / overwrite all / skip this /
/// skip all / cancel task).
pub struct ChoiceDialog {
    pub message: String,
    pub choices: Vec<String>,
    pub selected: usize,
    pub result: Option<DialogResult>,
    dirty: bool,
}

impl ChoiceDialog {
    pub fn new(message: impl Into<String>, choices: Vec<String>) -> Self {
        Self { message: message.into(), choices, selected: 0, result: None, dirty: true }
    }
}

impl Layer for ChoiceDialog {
    fn handle_key_event(&mut self, key: Key) -> bool {
        match key {
            Key::Left => {
                self.selected = self.selected.saturating_sub(1);
                self.dirty = true;
                true
            }
            Key::Right => {
                self.selected = (self.selected + 1).min(self.choices.len().saturating_sub(1));
                self.dirty = true;
                true
            }
            Key::Enter => {
                self.result = Some(DialogResult::Choice(self.selected));
                true
            }
            Key::Escape => {
                self.result = Some(DialogResult::Cancelled);
                true
            }
            // A modal dialog absorbs everything it doesn't handle above.
            _ => true,
        }
    }

    fn handle_char_event(&mut self, _ch: char) -> bool {
        true
    }

    fn render(&self, renderer: &mut dyn Renderer) {
        let (_, cols) = renderer.get_dimensions();
        renderer.draw_text(0, 0, &self.message, ColorPair(0), Attributes::default());
        let mut col = 0u16;
        for (i, choice) in self.choices.iter().enumerate() {
            let attrs = Attributes { reverse: i == self.selected, ..Attributes::default() };
            renderer.draw_text(1, col.min(cols.saturating_sub(1)), choice, ColorPair(0), attrs);
            col += choice.len() as u16 + 2;
        }
    }

    fn needs_redraw(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn should_close(&self) -> bool {
        self.result.is_some()
    }

    fn is_modal(&self) -> bool {
        true
    }

    fn is_dismissable(&self) -> bool {
        true
    }
}

/// Shared mutable content for a dialog fed by a background scan thread
/// (directory diff, search). Both the worker (setting `content_changed`)
/// and the main loop (clearing it after render) serialize on this lock,
/// so an update can never land between the check and the clear.
pub struct ScanningDialogContent {
    pub lines: Vec<String>,
    pub content_changed: bool,
    pub scan_complete: bool,
}

pub struct ScanningDialog {
    pub title: String,
    content: Mutex<ScanningDialogContent>,
}

impl ScanningDialog {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Mutex::new(ScanningDialogContent { lines: Vec::new(), content_changed: false, scan_complete: false }),
        }
    }

    /// Called from the scan thread.
    pub fn push_line(&self, line: String) {
        let mut content = self.content.lock().unwrap();
        content.lines.push(line);
        content.content_changed = true;
    }

    pub fn mark_scan_complete(&self) {
        let mut content = self.content.lock().unwrap();
        content.scan_complete = true;
        content.content_changed = true;
    }
}

impl Layer for ScanningDialog {
    fn handle_key_event(&mut self, _key: Key) -> bool {
        true
    }

    fn handle_char_event(&mut self, _ch: char) -> bool {
        true
    }

    fn render(&self, renderer: &mut dyn Renderer) {
        let content = self.content.lock().unwrap();
        renderer.draw_text(0, 0, &self.title, ColorPair(0), Attributes::default());
        for (i, line) in content.lines.iter().enumerate() {
            renderer.draw_text(1 + i as u16, 0, line, ColorPair(0), Attributes::default());
        }
    }

    /// Polled by the main loop, then immediately cleared under the same
    /// lock the worker sets it under — this is the serialization point
    /// spec.md's render rules require.
    fn needs_redraw(&self) -> bool {
        let mut content = self.content.lock().unwrap();
        let changed = content.content_changed;
        content.content_changed = false;
        changed
    }

    fn mark_dirty(&mut self) {
        self.content.lock().unwrap().content_changed = true;
    }

    fn clear_dirty(&mut self) {
        self.content.lock().unwrap().content_changed = false;
    }

    fn is_modal(&self) -> bool {
        true
    }

    fn is_dismissable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_dialog_arrow_keys_clamp_selection() {
        let mut dialog = ChoiceDialog::new("pick one", vec!["a".into(), "b".into()]);
        dialog.handle_key_event(Key::Left);
        assert_eq!(dialog.selected, 0);
        dialog.handle_key_event(Key::Right);
        dialog.handle_key_event(Key::Right);
        assert_eq!(dialog.selected, 1);
    }

    #[test]
    fn choice_dialog_closes_after_enter() {
        let mut dialog = ChoiceDialog::new("pick one", vec!["a".into()]);
        assert!(!dialog.should_close());
        dialog.handle_key_event(Key::Enter);
        assert!(dialog.should_close());
    }

    #[test]
    fn scanning_dialog_needs_redraw_clears_after_poll() {
        let dialog = ScanningDialog::new("scanning");
        dialog.push_line("found a.txt".into());
        assert!(dialog.needs_redraw());
        assert!(!dialog.needs_redraw());
    }

    #[test]
    fn scanning_dialog_settles_after_scan_completes() {
        let dialog = ScanningDialog::new("scanning");
        dialog.mark_scan_complete();
        let mut hits = 0;
        for _ in 0..10 {
            if dialog.needs_redraw() {
                hits += 1;
            }
        }
        assert!(hits <= 1, "dialog kept reporting dirty after settling");
    }
}
