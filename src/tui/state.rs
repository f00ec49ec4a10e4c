use crate::model::ConfigField;

pub const TAB_DASHBOARD: usize = 0;
pub const TAB_HELP: usize = 1;

/// Presentation-only state. Run data lives in the store.
pub struct UiState {
    pub tab: usize,
    /// Form field receiving keystrokes.
    pub focus: ConfigField,
    /// Status bar message.
    pub info: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: TAB_DASHBOARD,
            focus: ConfigField::RepositoryUrl,
            info: "Fill in the form and press Enter to start a run".into(),
        }
    }
}

impl UiState {
    pub fn toggle_help(&mut self) {
        self.tab = if self.tab == TAB_HELP {
            TAB_DASHBOARD
        } else {
            TAB_HELP
        };
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }
}
