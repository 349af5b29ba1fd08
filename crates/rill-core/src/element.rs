use crate::value::Value;

/// Wire payload of one leaf element.
///
/// For widgets the payload carries the *initial render* configuration: a
/// slider's `default` is the first-run value, not the live one, which
/// travels back through widget states instead.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Text {
        body: String,
    },
    Exception {
        exception_type: String,
        message: String,
    },
    Button {
        label: String,
    },
    Checkbox {
        label: String,
        default: bool,
    },
    Slider {
        label: String,
        min: f64,
        max: f64,
        default: f64,
        step: f64,
        integral: bool,
    },
    TextInput {
        label: String,
        default: String,
    },
    Selectbox {
        label: String,
        options: Vec<String>,
        default_index: u32,
    },
    DataFrame {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
}

impl Element {
    /// Whether later `add_rows` deltas may target this element.
    pub fn accepts_rows(&self) -> bool {
        matches!(self, Element::DataFrame { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Element::Text { .. } => "text",
            Element::Exception { .. } => "exception",
            Element::Button { .. } => "button",
            Element::Checkbox { .. } => "checkbox",
            Element::Slider { .. } => "slider",
            Element::TextInput { .. } => "text_input",
            Element::Selectbox { .. } => "selectbox",
            Element::DataFrame { .. } => "dataframe",
        }
    }
}
