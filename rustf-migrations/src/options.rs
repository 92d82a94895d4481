//! Typed argument sets for the commands that take more than a couple of flags

/// Default target for `upgrade`
pub const DEFAULT_UPGRADE_TARGET: &str = "head";
/// Default target for `downgrade`: one step below the current revision
pub const DEFAULT_DOWNGRADE_TARGET: &str = "-1";
/// Range `downgrade` uses in SQL mode when the default target was kept
pub const OFFLINE_DOWNGRADE_RANGE: &str = "head:-1";
/// Default revision for `edit`
pub const DEFAULT_EDIT_TARGET: &str = "current";
/// Default revision for `show` and `stamp`
pub const DEFAULT_SHOW_TARGET: &str = "head";
/// Default base revision for new revisions
pub const DEFAULT_HEAD: &str = "head";

/// Arguments of `revision` / `autogenerate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionOptions {
    pub message: Option<String>,
    pub autogenerate: bool,
    pub sql: bool,
    pub head: String,
    pub splice: bool,
    pub branch_label: Option<String>,
    pub version_path: Option<String>,
    pub rev_id: Option<String>,
}

impl Default for RevisionOptions {
    fn default() -> Self {
        Self {
            message: None,
            autogenerate: false,
            sql: false,
            head: DEFAULT_HEAD.to_string(),
            splice: false,
            branch_label: None,
            version_path: None,
            rev_id: None,
        }
    }
}

impl RevisionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn autogenerate(mut self, autogenerate: bool) -> Self {
        self.autogenerate = autogenerate;
        self
    }

    pub fn sql(mut self, sql: bool) -> Self {
        self.sql = sql;
        self
    }

    pub fn head(mut self, head: impl Into<String>) -> Self {
        self.head = head.into();
        self
    }

    pub fn splice(mut self, splice: bool) -> Self {
        self.splice = splice;
        self
    }

    pub fn branch_label(mut self, label: impl Into<String>) -> Self {
        self.branch_label = Some(label.into());
        self
    }

    pub fn version_path(mut self, path: impl Into<String>) -> Self {
        self.version_path = Some(path.into());
        self
    }

    pub fn rev_id(mut self, rev_id: impl Into<String>) -> Self {
        self.rev_id = Some(rev_id.into());
        self
    }
}

/// Arguments of `merge`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub revisions: Vec<String>,
    pub message: Option<String>,
    pub branch_label: Option<String>,
    pub rev_id: Option<String>,
}

impl MergeOptions {
    pub fn new<I, S>(revisions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            revisions: revisions.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn branch_label(mut self, label: impl Into<String>) -> Self {
        self.branch_label = Some(label.into());
        self
    }

    pub fn rev_id(mut self, rev_id: impl Into<String>) -> Self {
        self.rev_id = Some(rev_id.into());
        self
    }
}

/// Arguments of `history`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    pub rev_range: Option<String>,
    pub verbose: bool,
    pub indicate_current: bool,
}

impl HistoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rev_range(mut self, range: impl Into<String>) -> Self {
        self.rev_range = Some(range.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn indicate_current(mut self, indicate_current: bool) -> Self {
        self.indicate_current = indicate_current;
        self
    }
}
