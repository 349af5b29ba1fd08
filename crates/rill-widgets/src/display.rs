use rill_core::{Element, LockedCursor, UsageError, Value};
use rill_runtime::with_run_ctx;

/// Renders a block of text at the current position.
pub fn text(body: impl Into<String>) {
    let element = Element::Text { body: body.into() };
    with_run_ctx(|ctx| {
        ctx.enqueue_element(element);
    });
}

/// Renders an error as an exception element, the same presentation the
/// runtime uses for usage errors and script panics.
pub fn exception<E: std::error::Error>(error: &E) {
    let full = std::any::type_name::<E>();
    let exception_type = full.rsplit("::").next().unwrap_or(full).to_owned();
    let element = Element::Exception {
        exception_type,
        message: error.to_string(),
    };
    with_run_ctx(|ctx| {
        ctx.enqueue_element(element);
    });
}

/// Handle to a rendered dataframe, usable to append rows to it later in the
/// same run.
pub struct DataFrameHandle {
    cursor: LockedCursor,
    columns: usize,
}

impl DataFrameHandle {
    /// Appends `rows` to the dataframe in place, without re-sending the
    /// existing data.
    pub fn add_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), UsageError> {
        validate_row_widths("dataframe", self.columns, &rows)?;
        with_run_ctx(|ctx| ctx.add_rows(&self.cursor, rows))
    }
}

fn validate_row_widths(
    widget_type: &'static str,
    columns: usize,
    rows: &[Vec<Value>],
) -> Result<(), UsageError> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns {
            return Err(UsageError::invalid_args(
                widget_type,
                format!(
                    "row {i} has {} values but the dataframe has {columns} columns",
                    row.len()
                ),
            ));
        }
    }
    Ok(())
}

/// Renders a table of rows and returns a handle for appending more.
pub fn dataframe<S: Into<String>>(
    columns: impl IntoIterator<Item = S>,
    rows: Vec<Vec<Value>>,
) -> Result<DataFrameHandle, UsageError> {
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    validate_row_widths("dataframe", columns.len(), &rows)?;
    let width = columns.len();
    let element = Element::DataFrame { columns, rows };
    let cursor = with_run_ctx(|ctx| ctx.enqueue_element(element));
    Ok(DataFrameHandle {
        cursor,
        columns: width,
    })
}

/// Runs `body` inside a nested block: every element it emits is addressed
/// relative to the block, so code before and after the container cannot
/// shift the block's interior coordinates.
pub fn container(body: impl FnOnce() -> Result<(), UsageError>) -> Result<(), UsageError> {
    with_run_ctx(|ctx| ctx.enter_block());
    let result = body();
    with_run_ctx(|ctx| ctx.exit_block());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_width_validation_names_the_offending_row() {
        let rows = vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(3)],
        ];
        let err = validate_row_widths("dataframe", 2, &rows).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn empty_rows_always_validate() {
        assert!(validate_row_widths("dataframe", 3, &[]).is_ok());
    }
}
