use thiserror::Error;

/// Errors caused by how the app script uses the API.
///
/// These surface to the end user as a rendered exception element; they never
/// tear down the session or the worker thread. Internal consistency failures
/// are not represented here; those are defects and panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error(
        "there are multiple `{widget_type}` widgets with the same generated identity; \
         pass a unique `key` argument to each to disambiguate them"
    )]
    DuplicateWidgetId { widget_type: String },

    #[error(
        "there are multiple `{widget_type}` widgets with the same key `{key}`; \
         widget keys must be unique within a run"
    )]
    DuplicateWidgetKey { widget_type: String, key: String },

    #[error("invalid arguments for `{widget_type}`: {message}")]
    InvalidWidgetArgs {
        widget_type: &'static str,
        message: String,
    },

    #[error("add_rows target `{coordinate}` was never created or cannot accept rows")]
    BadAppendTarget { coordinate: String },
}

impl UsageError {
    pub fn invalid_args(widget_type: &'static str, message: impl Into<String>) -> Self {
        UsageError::InvalidWidgetArgs {
            widget_type,
            message: message.into(),
        }
    }
}
