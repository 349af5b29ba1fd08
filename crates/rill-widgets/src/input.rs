use std::sync::Arc;

use rill_core::{ChangeCallback, Element, UsageError, Value, WidgetId};

use crate::protocol::register_widget;

/// A push button. Its value is a trigger: `true` for exactly the run caused
/// by the press, `false` on every run after that.
pub struct Button {
    label: String,
    key: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl Button {
    pub fn new(label: impl Into<String>) -> Self {
        Button {
            label: label.into(),
            key: None,
            on_change: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// The identity this invocation registers under, usable from tests to
    /// address the widget in a simulated client batch.
    pub fn widget_id(&self) -> WidgetId {
        WidgetId::derive("button", &self.label, self.key.as_deref())
    }

    pub fn call(self) -> Result<bool, UsageError> {
        let id = self.widget_id();
        let element = Element::Button {
            label: self.label.clone(),
        };
        let value = register_widget(
            "button",
            id,
            self.key.as_deref(),
            element,
            Value::Bool(false),
            Some(Value::Bool(false)),
            self.on_change,
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

pub fn button(label: impl Into<String>) -> Result<bool, UsageError> {
    Button::new(label).call()
}

pub struct Checkbox {
    label: String,
    default: bool,
    key: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl Checkbox {
    pub fn new(label: impl Into<String>, default: bool) -> Self {
        Checkbox {
            label: label.into(),
            default,
            key: None,
            on_change: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    pub fn widget_id(&self) -> WidgetId {
        WidgetId::derive("checkbox", &(&self.label, self.default), self.key.as_deref())
    }

    pub fn call(self) -> Result<bool, UsageError> {
        let id = self.widget_id();
        let element = Element::Checkbox {
            label: self.label.clone(),
            default: self.default,
        };
        let value = register_widget(
            "checkbox",
            id,
            self.key.as_deref(),
            element,
            Value::Bool(self.default),
            None,
            self.on_change,
        )?;
        Ok(value.as_bool().unwrap_or(self.default))
    }
}

pub fn checkbox(label: impl Into<String>, default: bool) -> Result<bool, UsageError> {
    Checkbox::new(label, default).call()
}

/// Numeric domain a slider can range over. Implemented for `i64` and `f64`;
/// all-int arguments give an int-valued slider, anything else a float one.
pub trait SliderNumber: Copy {
    const INTEGRAL: bool;
    fn to_f64(self) -> f64;
    fn from_value(value: &Value) -> Option<Self>;
}

impl SliderNumber for i64 {
    const INTEGRAL: bool = true;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            // Client transports may report every number as a float.
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

impl SliderNumber for f64 {
    const INTEGRAL: bool = false;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

pub struct Slider<T: SliderNumber> {
    label: String,
    min: T,
    max: T,
    default: T,
    step: Option<T>,
    key: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl<T: SliderNumber> Slider<T> {
    pub fn new(label: impl Into<String>, min: T, max: T, default: T) -> Self {
        Slider {
            label: label.into(),
            min,
            max,
            default,
            step: None,
            key: None,
            on_change: None,
        }
    }

    pub fn step(mut self, step: T) -> Self {
        self.step = Some(step);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    fn step_or_default(&self) -> f64 {
        match &self.step {
            Some(step) => step.to_f64(),
            None if T::INTEGRAL => 1.0,
            None => 0.01,
        }
    }

    pub fn widget_id(&self) -> WidgetId {
        let config = (
            &self.label,
            self.min.to_f64().to_bits(),
            self.max.to_f64().to_bits(),
            self.default.to_f64().to_bits(),
            self.step_or_default().to_bits(),
            T::INTEGRAL,
        );
        WidgetId::derive("slider", &config, self.key.as_deref())
    }

    fn validate(&self) -> Result<(), UsageError> {
        let (min, max, default, step) = (
            self.min.to_f64(),
            self.max.to_f64(),
            self.default.to_f64(),
            self.step_or_default(),
        );
        if !min.is_finite() || !max.is_finite() || !default.is_finite() || !step.is_finite() {
            return Err(UsageError::invalid_args(
                "slider",
                "min, max, default, and step must all be finite",
            ));
        }
        if min >= max {
            return Err(UsageError::invalid_args(
                "slider",
                format!("min ({min}) must be less than max ({max})"),
            ));
        }
        if default < min || default > max {
            return Err(UsageError::invalid_args(
                "slider",
                format!("default ({default}) must lie between min ({min}) and max ({max})"),
            ));
        }
        if step <= 0.0 {
            return Err(UsageError::invalid_args(
                "slider",
                format!("step ({step}) must be positive"),
            ));
        }
        Ok(())
    }

    pub fn call(self) -> Result<T, UsageError> {
        self.validate()?;
        let id = self.widget_id();
        let element = Element::Slider {
            label: self.label.clone(),
            min: self.min.to_f64(),
            max: self.max.to_f64(),
            default: self.default.to_f64(),
            step: self.step_or_default(),
            integral: T::INTEGRAL,
        };
        let default_value = if T::INTEGRAL {
            Value::Int(self.default.to_f64() as i64)
        } else {
            Value::Float(self.default.to_f64())
        };
        let default = self.default;
        let value = register_widget(
            "slider",
            id,
            self.key.as_deref(),
            element,
            default_value,
            None,
            self.on_change,
        )?;
        Ok(T::from_value(&value).unwrap_or(default))
    }
}

pub fn slider<T: SliderNumber>(
    label: impl Into<String>,
    min: T,
    max: T,
    default: T,
) -> Result<T, UsageError> {
    Slider::new(label, min, max, default).call()
}

pub struct TextInput {
    label: String,
    default: String,
    key: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl TextInput {
    pub fn new(label: impl Into<String>, default: impl Into<String>) -> Self {
        TextInput {
            label: label.into(),
            default: default.into(),
            key: None,
            on_change: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    pub fn widget_id(&self) -> WidgetId {
        WidgetId::derive(
            "text_input",
            &(&self.label, &self.default),
            self.key.as_deref(),
        )
    }

    pub fn call(self) -> Result<String, UsageError> {
        let id = self.widget_id();
        let element = Element::TextInput {
            label: self.label.clone(),
            default: self.default.clone(),
        };
        let default = self.default.clone();
        let value = register_widget(
            "text_input",
            id,
            self.key.as_deref(),
            element,
            Value::Text(self.default),
            None,
            self.on_change,
        )?;
        Ok(match value {
            Value::Text(text) => text,
            _ => default,
        })
    }
}

pub fn text_input(
    label: impl Into<String>,
    default: impl Into<String>,
) -> Result<String, UsageError> {
    TextInput::new(label, default).call()
}

pub struct Selectbox {
    label: String,
    options: Vec<String>,
    default_index: usize,
    key: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl Selectbox {
    pub fn new<S: Into<String>>(
        label: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        default_index: usize,
    ) -> Self {
        Selectbox {
            label: label.into(),
            options: options.into_iter().map(Into::into).collect(),
            default_index,
            key: None,
            on_change: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    pub fn widget_id(&self) -> WidgetId {
        WidgetId::derive(
            "selectbox",
            &(&self.label, &self.options, self.default_index),
            self.key.as_deref(),
        )
    }

    fn validate(&self) -> Result<(), UsageError> {
        if self.options.is_empty() {
            return Err(UsageError::invalid_args(
                "selectbox",
                "options must not be empty",
            ));
        }
        if self.default_index >= self.options.len() {
            return Err(UsageError::invalid_args(
                "selectbox",
                format!(
                    "default index {} is out of range for {} options",
                    self.default_index,
                    self.options.len()
                ),
            ));
        }
        Ok(())
    }

    /// Returns the selected option index.
    pub fn call(self) -> Result<usize, UsageError> {
        self.validate()?;
        let id = self.widget_id();
        let element = Element::Selectbox {
            label: self.label.clone(),
            options: self.options.clone(),
            default_index: self.default_index as u32,
        };
        let value = register_widget(
            "selectbox",
            id,
            self.key.as_deref(),
            element,
            Value::Int(self.default_index as i64),
            None,
            self.on_change,
        )?;
        let index = value
            .as_i64()
            .filter(|i| (0..self.options.len() as i64).contains(i))
            .unwrap_or(self.default_index as i64);
        Ok(index as usize)
    }
}

pub fn selectbox<S: Into<String>>(
    label: impl Into<String>,
    options: impl IntoIterator<Item = S>,
    default_index: usize,
) -> Result<usize, UsageError> {
    Selectbox::new(label, options, default_index).call()
}
