/// How a table window was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    Editable,
    /// Rows can be shown but not created, cloned or deleted.
    ReadOnly,
    /// A database view: no selection tracking and no mutations.
    View,
}

impl AccessMode {
    pub fn from_flags(view_mode: bool, read_only: bool) -> Self {
        match (view_mode, read_only) {
            (true, _) => AccessMode::View,
            (false, true) => AccessMode::ReadOnly,
            (false, false) => AccessMode::Editable,
        }
    }

    pub fn allows_mutation(self) -> bool {
        self == AccessMode::Editable
    }

    pub fn tracks_selection(self) -> bool {
        self != AccessMode::View
    }

    pub fn caption(self, table_name: &str) -> String {
        match self {
            AccessMode::View => format!("View: {table_name}"),
            AccessMode::Editable | AccessMode::ReadOnly => format!("Table: {table_name}"),
        }
    }
}

/// Toolbar buttons, in display order. The cell context menu reuses
/// [`ToolbarAction::CONTEXT_MENU`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolbarAction {
    New,
    Edit,
    Clone,
    Delete,
    Refresh,
    Export,
    Print,
    Search,
}

impl ToolbarAction {
    pub const ALL: [ToolbarAction; 8] = [
        ToolbarAction::New,
        ToolbarAction::Edit,
        ToolbarAction::Clone,
        ToolbarAction::Delete,
        ToolbarAction::Refresh,
        ToolbarAction::Export,
        ToolbarAction::Print,
        ToolbarAction::Search,
    ];

    pub const CONTEXT_MENU: [ToolbarAction; 3] =
        [ToolbarAction::Edit, ToolbarAction::Delete, ToolbarAction::Clone];

    pub fn label(self, mode: AccessMode) -> &'static str {
        match self {
            ToolbarAction::New => "New",
            ToolbarAction::Edit if mode == AccessMode::ReadOnly => "Show",
            ToolbarAction::Edit => "Edit",
            ToolbarAction::Clone => "Clone",
            ToolbarAction::Delete => "Delete",
            ToolbarAction::Refresh => "Refresh",
            ToolbarAction::Export => "Export",
            ToolbarAction::Print => "Print",
            ToolbarAction::Search => "Search",
        }
    }

    pub fn is_present(self, mode: AccessMode) -> bool {
        match self {
            ToolbarAction::New | ToolbarAction::Clone | ToolbarAction::Delete => {
                mode.allows_mutation()
            }
            _ => true,
        }
    }

    /// Buttons shown for `mode`, in order. A spacer separates the record
    /// actions from [`ToolbarAction::Refresh`] onwards.
    pub fn toolbar(mode: AccessMode) -> Vec<ToolbarAction> {
        Self::ALL
            .into_iter()
            .filter(|action| action.is_present(mode))
            .collect()
    }
}

/// Enablement of the selection-bound actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Affordances {
    pub edit: bool,
    pub clone: bool,
    pub delete: bool,
}

impl Affordances {
    pub fn derive(can_edit: bool, can_delete: bool, has_selection: bool) -> Self {
        Self {
            edit: has_selection && can_edit,
            clone: has_selection && can_edit,
            delete: has_selection && can_delete,
        }
    }

    pub fn is_enabled(&self, action: ToolbarAction, mode: AccessMode) -> bool {
        if !action.is_present(mode) {
            return false;
        }
        match action {
            ToolbarAction::Edit => self.edit,
            ToolbarAction::Clone => self.clone,
            ToolbarAction::Delete => self.delete,
            ToolbarAction::New | ToolbarAction::Refresh | ToolbarAction::Search => true,
            ToolbarAction::Export | ToolbarAction::Print => false,
        }
    }
}
