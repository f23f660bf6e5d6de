//! Application shell: owns the event loop, layer stack, and the single
//! task slot, wiring together every other module.

use crate::cache::{BackendCache, CacheCoordinator};
use crate::cli::{quote_selection, Cli};
use crate::config::TfmConfig;
use crate::cursor_history::CursorHistory;
use crate::pane::{PaneManager, Side};
use crate::path::registry::BackendRegistry;
use crate::path::TfmPath;
use crate::task::coordinator::TaskCoordinator;
use crate::ui::renderer::{Event, Key, Renderer};
use crate::ui::LayerStack;
use std::sync::Arc;
use std::time::Duration;

pub struct AppShell {
    pub panes: PaneManager,
    pub layers: LayerStack,
    pub task_coordinator: Arc<TaskCoordinator>,
    pub cache: Arc<CacheCoordinator>,
    pub registry: Arc<BackendRegistry>,
    pub config: TfmConfig,
    pub history: Arc<CursorHistory>,
    running: bool,
}

impl AppShell {
    pub fn new(cli: &Cli, config: TfmConfig) -> Self {
        let backend_cache = Arc::new(BackendCache::new(1024, Duration::from_secs(30)));
        let registry = Arc::new(BackendRegistry::with_cache(backend_cache.clone()));
        let history = Arc::new(CursorHistory::new());
        history.purge_missing_local();

        let left_path = cli
            .left
            .as_deref()
            .map(|raw| TfmPath::parse(raw, registry.clone()))
            .unwrap_or_else(|| TfmPath::local(std::env::current_dir().unwrap_or_default()));
        let right_path = cli
            .right
            .as_deref()
            .map(|raw| TfmPath::parse(raw, registry.clone()))
            .unwrap_or_else(|| TfmPath::local(std::env::current_dir().unwrap_or_default()));

        let mut panes = PaneManager::new(left_path.clone(), right_path.clone(), config.show_hidden_default, history.clone());
        panes.navigate(Side::Left, left_path, None);
        panes.navigate(Side::Right, right_path, None);

        let cache = Arc::new(CacheCoordinator::new(backend_cache));
        let task_coordinator = Arc::new(TaskCoordinator::new(config.progress_interval_ms));

        std::fs::create_dir_all(&config.ssh_socket_dir).ok();

        Self { panes, layers: LayerStack::new(), task_coordinator, cache, registry, config, history, running: true }
    }

    /// Environment variables exported to subshells and external-program
    /// invocations, per §6.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let left = &self.panes.left;
        let right = &self.panes.right;
        let (this, other) = match self.panes.active {
            Side::Left => (left, right),
            Side::Right => (right, left),
        };

        let selected_names = |pane: &crate::pane::PaneState| -> Vec<String> {
            if pane.selected_files.is_empty() {
                pane.focused().map(|p| vec![p.name()]).unwrap_or_default()
            } else {
                pane.files.iter().filter(|p| pane.is_selected(p)).map(|p| p.name()).collect()
            }
        };

        vec![
            ("TFM_LEFT_DIR".to_string(), left.path.to_display_string()),
            ("TFM_RIGHT_DIR".to_string(), right.path.to_display_string()),
            ("TFM_THIS_DIR".to_string(), this.path.to_display_string()),
            ("TFM_OTHER_DIR".to_string(), other.path.to_display_string()),
            ("TFM_LEFT_SELECTED".to_string(), quote_selection(&selected_names(left))),
            ("TFM_RIGHT_SELECTED".to_string(), quote_selection(&selected_names(right))),
            ("TFM_THIS_SELECTED".to_string(), quote_selection(&selected_names(this))),
            ("TFM_OTHER_SELECTED".to_string(), quote_selection(&selected_names(other))),
            ("TFM_ACTIVE".to_string(), "1".to_string()),
        ]
    }

    /// Routes one input event. ESC is privileged: while a task is
    /// active it cancels the task before any layer sees it.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(Key::Escape) if self.task_coordinator.is_busy() => {
                self.task_coordinator.cancel_active();
            }
            Event::Key(key) => {
                let task_active = self.task_coordinator.is_busy();
                if !self.layers.handle_key_event(key, task_active) {
                    self.handle_pane_key(key);
                }
            }
            Event::Char(ch) => {
                self.layers.handle_char_event(ch);
            }
            Event::Resize(_, _) => {
                self.layers.clear_dirty();
            }
            Event::Drop(_) | Event::Tick => {}
        }
        self.layers.reap_closed();
        self.task_coordinator.join_if_finished();
    }

    fn handle_pane_key(&mut self, key: Key) {
        match key {
            Key::Up => self.panes.move_cursor(self.panes.active, -1, 20, 2),
            Key::Down => self.panes.move_cursor(self.panes.active, 1, 20, 2),
            Key::Tab => {
                self.panes.active = match self.panes.active {
                    Side::Left => Side::Right,
                    Side::Right => Side::Left,
                };
            }
            _ => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn request_quit(&mut self) {
        self.running = false;
    }

    /// Drives the cooperative event loop. The main thread suspends only
    /// in `get_input`; all other work here is non-blocking.
    pub fn run(&mut self, renderer: &mut dyn dyn_renderer::DynRenderer) {
        while self.running {
            if let Some(event) = renderer.poll_input(Duration::from_millis(50)) {
                if matches!(event, Event::Key(Key::Function(10))) {
                    self.request_quit();
                    continue;
                }
                self.handle_event(event);
            }
            if self.layers.needs_redraw() {
                renderer.render_frame(&self.layers);
                self.layers.clear_dirty();
            }
        }
    }
}

/// Thin seam so `AppShell::run` can take `&mut dyn Renderer` without
/// pulling the renderer's exact type into this module's signature —
/// the renderer backend implements this locally.
pub mod dyn_renderer {
    use super::*;

    pub trait DynRenderer {
        fn poll_input(&mut self, timeout: Duration) -> Option<Event>;
        fn render_frame(&mut self, layers: &LayerStack);
    }

    impl<T: Renderer> DynRenderer for T {
        fn poll_input(&mut self, timeout: Duration) -> Option<Event> {
            self.get_input(timeout)
        }

        fn render_frame(&mut self, layers: &LayerStack) {
            self.clear();
            layers.render(self);
            self.present();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cli() -> Cli {
        Cli { left: None, right: None, remote_log_port: None, log_file: None, verbose: false }
    }

    #[test]
    fn env_vars_include_active_pane_shortcuts() {
        let shell = AppShell::new(&test_cli(), TfmConfig::default());
        let vars: std::collections::HashMap<_, _> = shell.env_vars().into_iter().collect();
        assert_eq!(vars.get("TFM_ACTIVE"), Some(&"1".to_string()));
        assert_eq!(vars.get("TFM_THIS_DIR"), vars.get("TFM_LEFT_DIR"));
    }

    #[test]
    fn escape_with_active_task_cancels_rather_than_reaching_layers() {
        let mut shell = AppShell::new(&test_cli(), TfmConfig::default());
        shell.task_coordinator.start(
            crate::task::TaskKind::Delete,
            vec![],
            None,
            crate::task::TaskOptions::default(),
            false,
        );
        shell.handle_event(Event::Key(Key::Escape));
        let cancelled = shell
            .task_coordinator
            .active()
            .map(|t| t.lock().unwrap().as_ref().map(|task| task.cancel_flag.is_set()).unwrap_or(true))
            .unwrap_or(false);
        assert!(!shell.task_coordinator.is_busy() || cancelled);
    }

    #[test]
    fn tab_switches_active_pane() {
        let mut shell = AppShell::new(&test_cli(), TfmConfig::default());
        assert_eq!(shell.panes.active, Side::Left);
        shell.handle_event(Event::Key(Key::Tab));
        assert_eq!(shell.panes.active, Side::Right);
    }
}
