//! Pane model: two independent directory views plus an active selector.

use crate::cursor_history::{CursorHistory, PaneSide};
use crate::listing::{list_directory, SortMode};
use crate::path::TfmPath;
use std::collections::HashSet;
use std::sync::Arc;

pub struct PaneState {
    pub path: TfmPath,
    pub files: Vec<TfmPath>,
    pub focused_index: usize,
    pub scroll_offset: usize,
    pub selected_files: HashSet<String>,
    pub sort_mode: SortMode,
    pub sort_reverse: bool,
    pub filter_pattern: Option<String>,
    pub show_hidden: bool,
}

impl PaneState {
    pub fn new(path: TfmPath, show_hidden: bool) -> Self {
        Self {
            path,
            files: Vec::new(),
            focused_index: 0,
            scroll_offset: 0,
            selected_files: HashSet::new(),
            sort_mode: SortMode::Name,
            sort_reverse: false,
            filter_pattern: None,
            show_hidden,
        }
    }

    pub fn focused(&self) -> Option<&TfmPath> {
        self.files.get(self.focused_index)
    }

    pub fn is_selected(&self, path: &TfmPath) -> bool {
        self.selected_files.contains(&path.to_display_string())
    }

    /// Keeps `focused_index` visible inside a `viewport_height`-row
    /// window, with `margin` rows of lookahead before the edge scrolls.
    fn clamp_scroll(&mut self, viewport_height: usize, margin: usize) {
        if self.files.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let margin = margin.min(viewport_height / 2);
        if self.focused_index < self.scroll_offset + margin {
            self.scroll_offset = self.focused_index.saturating_sub(margin);
        }
        let bottom = self.scroll_offset + viewport_height;
        if self.focused_index + margin >= bottom {
            self.scroll_offset = (self.focused_index + margin + 1).saturating_sub(viewport_height);
        }
        let max_offset = self.files.len().saturating_sub(viewport_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn to_cursor_side(self) -> PaneSide {
        match self {
            Side::Left => PaneSide::Left,
            Side::Right => PaneSide::Right,
        }
    }
}

pub struct PaneManager {
    pub left: PaneState,
    pub right: PaneState,
    pub active: Side,
    history: Arc<CursorHistory>,
}

impl PaneManager {
    pub fn new(left_path: TfmPath, right_path: TfmPath, show_hidden: bool, history: Arc<CursorHistory>) -> Self {
        Self {
            left: PaneState::new(left_path, show_hidden),
            right: PaneState::new(right_path, show_hidden),
            active: Side::Left,
            history,
        }
    }

    pub fn pane(&self, side: Side) -> &PaneState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn pane_mut(&mut self, side: Side) -> &mut PaneState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn active_pane(&self) -> &PaneState {
        self.pane(self.active)
    }

    /// Refresh the listing, clear selection, and restore the remembered
    /// cursor. Backspacing into a parent always focuses the child
    /// directory just left, overriding any remembered history for it.
    pub fn navigate(&mut self, side: Side, target_path: TfmPath, child_just_left: Option<&TfmPath>) {
        let previous_path = self.pane(side).path.clone();
        if let Some(focused) = self.pane(side).focused() {
            self.history.record(side.to_cursor_side(), &previous_path, &focused.name());
        }

        let pane = self.pane_mut(side);
        pane.path = target_path.clone();
        pane.selected_files.clear();
        pane.files = list_directory(
            &target_path,
            pane.show_hidden,
            pane.filter_pattern.as_deref(),
            pane.sort_mode,
            pane.sort_reverse,
        )
        .unwrap_or_default();

        let restore_name = child_just_left
            .map(|c| c.name())
            .or_else(|| self.history.lookup(side.to_cursor_side(), &target_path));

        let pane = self.pane_mut(side);
        pane.focused_index = restore_name
            .and_then(|name| pane.files.iter().position(|f| f.name() == name))
            .unwrap_or(0);
    }

    pub fn move_cursor(&mut self, side: Side, delta: isize, viewport_height: usize, margin: usize) {
        let pane = self.pane_mut(side);
        if pane.files.is_empty() {
            pane.focused_index = 0;
            return;
        }
        let len = pane.files.len() as isize;
        let target = (pane.focused_index as isize + delta).clamp(0, len - 1);
        pane.focused_index = target as usize;
        pane.clamp_scroll(viewport_height, margin);
    }

    pub fn toggle_select(&mut self, side: Side) {
        let pane = self.pane_mut(side);
        if let Some(focused) = pane.files.get(pane.focused_index).cloned() {
            toggle(&mut pane.selected_files, &focused);
        }
    }

    /// Inverts membership for every non-directory entry.
    pub fn toggle_select_all_files(&mut self, side: Side) {
        let pane = self.pane_mut(side);
        let files: Vec<TfmPath> = pane.files.iter().filter(|p| !p.is_dir()).cloned().collect();
        for file in files {
            toggle(&mut pane.selected_files, &file);
        }
    }

    /// Inverts membership for every entry, directories included.
    pub fn toggle_select_all_items(&mut self, side: Side) {
        let pane = self.pane_mut(side);
        let files = pane.files.clone();
        for file in files {
            toggle(&mut pane.selected_files, &file);
        }
    }

    /// Re-lists the current directory, drops selections that vanished,
    /// and preserves focus by name when possible, else by clamped index.
    pub fn refresh(&mut self, side: Side) {
        let pane = self.pane_mut(side);
        let focused_name = pane.focused().map(|p| p.name());
        pane.files = list_directory(
            &pane.path,
            pane.show_hidden,
            pane.filter_pattern.as_deref(),
            pane.sort_mode,
            pane.sort_reverse,
        )
        .unwrap_or_default();

        let present: HashSet<String> = pane.files.iter().map(|f| f.to_display_string()).collect();
        pane.selected_files.retain(|f| present.contains(f));

        pane.focused_index = focused_name
            .and_then(|name| pane.files.iter().position(|f| f.name() == name))
            .unwrap_or_else(|| pane.focused_index.min(pane.files.len().saturating_sub(1)));
    }
}

fn toggle(selected: &mut HashSet<String>, path: &TfmPath) {
    let key = path.to_display_string();
    if !selected.remove(&key) {
        selected.insert(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn manager_with_dir(dir: &std::path::Path) -> PaneManager {
        let history = Arc::new(CursorHistory::new());
        let mut manager = PaneManager::new(TfmPath::local(dir), TfmPath::local(dir), true, history);
        manager.navigate(Side::Left, TfmPath::local(dir), None);
        manager
    }

    #[test]
    fn move_cursor_clamps_to_bounds() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let mut manager = manager_with_dir(dir.path());
        manager.move_cursor(Side::Left, -10, 20, 2);
        assert_eq!(manager.left.focused_index, 0);
        manager.move_cursor(Side::Left, 10, 20, 2);
        assert_eq!(manager.left.focused_index, 0); // only one file
    }

    #[test]
    fn toggle_select_all_items_is_its_own_inverse() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        fs::write(dir.path().join("b.txt"), b"y").unwrap();
        let mut manager = manager_with_dir(dir.path());
        let before = manager.left.selected_files.clone();
        manager.toggle_select_all_items(Side::Left);
        manager.toggle_select_all_items(Side::Left);
        assert_eq!(manager.left.selected_files, before);
    }

    #[test]
    fn refresh_drops_vanished_selection() {
        let dir = tempdir().unwrap();
        let doomed = dir.path().join("doomed.txt");
        fs::write(&doomed, b"x").unwrap();
        let mut manager = manager_with_dir(dir.path());
        manager.toggle_select(Side::Left);
        assert_eq!(manager.left.selected_files.len(), 1);
        fs::remove_file(&doomed).unwrap();
        manager.refresh(Side::Left);
        assert!(manager.left.selected_files.is_empty());
    }
}
