//! Declared Call Signatures
//!
//! Binding rules: positionals fill parameters in declaration order, each
//! keyword must name a parameter not already filled, and every required
//! parameter must end up bound. Anything else is a signature mismatch.

use std::collections::HashMap;

use crate::application::ports::{ArgValue, CallArgs, CallError, EventCallback, InstrumentSpec};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    required: bool,
}

impl Parameter {
    /// A parameter that must be bound.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    /// A parameter with a default.
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the parameter has no default.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }
}

/// Ordered parameter list of a constructor or method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// Signature with the given parameters.
    #[must_use]
    pub const fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    /// Signature taking no arguments.
    #[must_use]
    pub const fn empty() -> Self {
        Self { params: Vec::new() }
    }

    /// Declared parameter names in order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Bind call arguments to parameter names.
    ///
    /// # Errors
    ///
    /// Returns `CallError::SignatureMismatch` if the arguments do not fit.
    pub fn bind(&self, args: CallArgs) -> Result<BoundArgs, CallError> {
        if args.positional.len() > self.params.len() {
            return Err(CallError::SignatureMismatch(format!(
                "takes {} positional arguments but {} were given",
                self.params.len(),
                args.positional.len()
            )));
        }

        let mut values: HashMap<String, ArgValue> = self
            .params
            .iter()
            .zip(args.positional)
            .map(|(param, value)| (param.name.clone(), value))
            .collect();

        for (name, value) in args.named {
            if !self.params.iter().any(|p| p.name == name) {
                return Err(CallError::SignatureMismatch(format!(
                    "unexpected keyword argument '{name}'"
                )));
            }
            if values.contains_key(&name) {
                return Err(CallError::SignatureMismatch(format!(
                    "multiple values for argument '{name}'"
                )));
            }
            values.insert(name, value);
        }

        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !values.contains_key(&p.name))
        {
            return Err(CallError::SignatureMismatch(format!(
                "missing required argument '{}'",
                missing.name
            )));
        }

        Ok(BoundArgs { values })
    }
}

/// Arguments after a successful bind, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    values: HashMap<String, ArgValue>,
}

impl BoundArgs {
    /// Raw bound value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Text value of a parameter.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Instrument list of a parameter.
    #[must_use]
    pub fn instruments(&self, name: &str) -> Option<&[InstrumentSpec]> {
        match self.values.get(name) {
            Some(ArgValue::Instruments(list)) => Some(list),
            _ => None,
        }
    }

    /// Callback bound to a parameter.
    #[must_use]
    pub fn callback(&self, name: &str) -> Option<EventCallback> {
        match self.values.get(name) {
            Some(ArgValue::Callback(cb)) => Some(cb.clone()),
            _ => None,
        }
    }

    /// Number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctor() -> Signature {
        Signature::new(vec![
            Parameter::required("client_id"),
            Parameter::required("access_token"),
            Parameter::required("instruments"),
            Parameter::optional("version"),
        ])
    }

    #[test]
    fn positionals_fill_in_order() {
        let bound = ctor()
            .bind(
                CallArgs::new()
                    .arg("100")
                    .arg("tok")
                    .arg(ArgValue::Instruments(vec![])),
            )
            .unwrap();
        assert_eq!(bound.text("client_id"), Some("100"));
        assert_eq!(bound.text("access_token"), Some("tok"));
        assert!(bound.text("version").is_none());
    }

    #[test]
    fn keywords_bind_by_name() {
        let bound = ctor()
            .bind(
                CallArgs::new()
                    .kwarg("instruments", ArgValue::Instruments(vec![]))
                    .kwarg("access_token", "tok")
                    .kwarg("client_id", "100")
                    .kwarg("version", "v2"),
            )
            .unwrap();
        assert_eq!(bound.text("version"), Some("v2"));
        assert_eq!(bound.len(), 4);
    }

    #[test]
    fn unknown_keyword_is_mismatch() {
        let err = ctor()
            .bind(CallArgs::new().kwarg("clientId", "100"))
            .unwrap_err();
        assert!(matches!(err, CallError::SignatureMismatch(_)));
    }

    #[test]
    fn too_many_positionals_is_mismatch() {
        let err = Signature::empty()
            .bind(CallArgs::new().arg("x"))
            .unwrap_err();
        assert!(err.to_string().contains("takes 0 positional"));
    }

    #[test]
    fn duplicate_binding_is_mismatch() {
        let err = ctor()
            .bind(CallArgs::new().arg("100").kwarg("client_id", "100"))
            .unwrap_err();
        assert!(err.to_string().contains("multiple values"));
    }

    #[test]
    fn missing_required_is_mismatch() {
        let err = ctor().bind(CallArgs::new().arg("100")).unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }
}
