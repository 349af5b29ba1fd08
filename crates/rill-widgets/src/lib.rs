#![doc = r"Widget and display element APIs for Rill scripts."]

mod display;
mod input;
mod protocol;

pub use display::{container, dataframe, exception, text, DataFrameHandle};
pub use input::{
    button, checkbox, selectbox, slider, text_input, Button, Checkbox, Selectbox, Slider,
    SliderNumber, TextInput,
};

// Script-level control flow and session state live in the runtime crate;
// re-exported so scripts can depend on this crate alone.
pub use rill_runtime::{fragment, query_string, rerun, session_get, session_set, stop};
