//! Inline literal values attached to ports
//!
//! A literal substitutes for a missing incoming connection on an input
//! port, or holds a default/name on an output port. Literals persist as a
//! serialized string plus an `is_set` flag.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScadGraphError};

/// Kind of literal editor a port carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    #[default]
    None,
    Number,
    String,
    Boolean,
    /// An identifier, e.g. a loop variable name
    Name,
    Vector2,
    Vector3,
}

/// Typed literal payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LiteralValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Name(String),
    Vector2([f64; 2]),
    Vector3([f64; 3]),
}

impl LiteralValue {
    pub fn kind(&self) -> LiteralKind {
        match self {
            LiteralValue::Number(_) => LiteralKind::Number,
            LiteralValue::String(_) => LiteralKind::String,
            LiteralValue::Boolean(_) => LiteralKind::Boolean,
            LiteralValue::Name(_) => LiteralKind::Name,
            LiteralValue::Vector2(_) => LiteralKind::Vector2,
            LiteralValue::Vector3(_) => LiteralKind::Vector3,
        }
    }
}

/// A literal value plus its "is set" flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    value: LiteralValue,
    pub is_set: bool,
}

impl Literal {
    /// Build an unset literal with the zero value of `kind`.
    ///
    /// Returns `None` for [`LiteralKind::None`].
    pub fn new(kind: LiteralKind) -> Option<Self> {
        let value = match kind {
            LiteralKind::None => return None,
            LiteralKind::Number => LiteralValue::Number(0.0),
            LiteralKind::String => LiteralValue::String(String::new()),
            LiteralKind::Boolean => LiteralValue::Boolean(false),
            LiteralKind::Name => LiteralValue::Name(String::new()),
            LiteralKind::Vector2 => LiteralValue::Vector2([0.0; 2]),
            LiteralKind::Vector3 => LiteralValue::Vector3([0.0; 3]),
        };
        Some(Self {
            value,
            is_set: false,
        })
    }

    /// Literal holding `value` with `is_set` on
    pub fn set(value: LiteralValue) -> Self {
        Self {
            value,
            is_set: true,
        }
    }

    /// Parse the serialized form produced by [`Literal::serialized_value`]
    pub fn from_serialized(kind: LiteralKind, text: &str, is_set: bool) -> Result<Self> {
        let broken =
            |e: serde_json::Error| ScadGraphError::broken(format!("bad {:?} literal '{}': {}", kind, text, e));
        let value = match kind {
            LiteralKind::None => {
                return Err(ScadGraphError::broken(format!(
                    "literal value '{}' on a port without literal",
                    text
                )))
            }
            LiteralKind::Number => LiteralValue::Number(serde_json::from_str(text).map_err(broken)?),
            LiteralKind::String => LiteralValue::String(serde_json::from_str(text).map_err(broken)?),
            LiteralKind::Boolean => LiteralValue::Boolean(serde_json::from_str(text).map_err(broken)?),
            LiteralKind::Name => LiteralValue::Name(serde_json::from_str(text).map_err(broken)?),
            LiteralKind::Vector2 => LiteralValue::Vector2(serde_json::from_str(text).map_err(broken)?),
            LiteralKind::Vector3 => LiteralValue::Vector3(serde_json::from_str(text).map_err(broken)?),
        };
        Ok(Self { value, is_set })
    }

    pub fn kind(&self) -> LiteralKind {
        self.value.kind()
    }

    pub fn value(&self) -> &LiteralValue {
        &self.value
    }

    /// Replace the payload; the kind must stay the same
    pub fn set_value(&mut self, value: LiteralValue) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(ScadGraphError::invariant(format!(
                "cannot store a {:?} value in a {:?} literal",
                value.kind(),
                self.kind()
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Serialized payload (JSON text of the inner value)
    pub fn serialized_value(&self) -> String {
        let json = match &self.value {
            LiteralValue::Number(n) => serde_json::json!(n),
            LiteralValue::String(s) | LiteralValue::Name(s) => serde_json::json!(s),
            LiteralValue::Boolean(b) => serde_json::json!(b),
            LiteralValue::Vector2(v) => serde_json::json!(v),
            LiteralValue::Vector3(v) => serde_json::json!(v),
        };
        json.to_string()
    }

    /// Render as OpenSCAD source text
    pub fn render(&self) -> String {
        match &self.value {
            LiteralValue::Number(n) => render_number(*n),
            LiteralValue::String(s) => quote(s),
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Name(s) => s.clone(),
            LiteralValue::Vector2(v) => render_vector(v),
            LiteralValue::Vector3(v) => render_vector(v),
        }
    }

    /// A name literal that holds a non-blank identifier
    pub fn has_name(&self) -> bool {
        self.is_set && matches!(&self.value, LiteralValue::Name(s) if !s.trim().is_empty())
    }
}

fn render_number(n: f64) -> String {
    if n.is_finite() {
        format!("{}", n)
    } else {
        "undef".to_string()
    }
}

fn render_vector(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| render_number(*v)).collect();
    format!("[{}]", parts.join(", "))
}

/// Quote a string for OpenSCAD source
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_literal_is_unset() {
        let lit = Literal::new(LiteralKind::Number).unwrap();
        assert!(!lit.is_set);
        assert_eq!(lit.render(), "0");
        assert!(Literal::new(LiteralKind::None).is_none());
    }

    #[test]
    fn test_render_values() {
        assert_eq!(Literal::set(LiteralValue::Number(1.5)).render(), "1.5");
        assert_eq!(Literal::set(LiteralValue::Number(-2.0)).render(), "-2");
        assert_eq!(Literal::set(LiteralValue::Number(f64::NAN)).render(), "undef");
        assert_eq!(
            Literal::set(LiteralValue::String("say \"hi\"".into())).render(),
            "\"say \\\"hi\\\"\""
        );
        assert_eq!(Literal::set(LiteralValue::Boolean(true)).render(), "true");
        assert_eq!(
            Literal::set(LiteralValue::Vector3([1.0, 2.5, 0.0])).render(),
            "[1, 2.5, 0]"
        );
    }

    #[test]
    fn test_serialized_value_parses_back() {
        let lit = Literal::set(LiteralValue::Vector2([3.0, 4.25]));
        let text = lit.serialized_value();
        let back = Literal::from_serialized(LiteralKind::Vector2, &text, true).unwrap();
        assert_eq!(back, lit);

        let name = Literal::set(LiteralValue::Name("i".into()));
        let back =
            Literal::from_serialized(LiteralKind::Name, &name.serialized_value(), false).unwrap();
        assert_eq!(back.value(), name.value());
        assert!(!back.is_set);
    }

    #[test]
    fn test_corrupt_serialized_value_is_broken_file() {
        let err = Literal::from_serialized(LiteralKind::Number, "\"abc\"", true).unwrap_err();
        assert!(matches!(err, ScadGraphError::BrokenFile(_)));
    }

    #[test]
    fn test_set_value_rejects_other_kind() {
        let mut lit = Literal::new(LiteralKind::Number).unwrap();
        assert!(lit.set_value(LiteralValue::Boolean(true)).is_err());
        lit.set_value(LiteralValue::Number(7.0)).unwrap();
        assert_eq!(lit.render(), "7");
    }

    #[test]
    fn test_has_name_requires_identifier() {
        let mut lit = Literal::new(LiteralKind::Name).unwrap();
        assert!(!lit.has_name());
        lit.set_value(LiteralValue::Name("  ".into())).unwrap();
        lit.is_set = true;
        assert!(!lit.has_name());
        lit.set_value(LiteralValue::Name("row".into())).unwrap();
        assert!(lit.has_name());
    }
}
