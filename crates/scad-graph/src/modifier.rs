//! OpenSCAD debug modifiers applied to statement nodes

use serde::{Deserialize, Serialize};

use crate::literal::quote;

/// Bit set of modifiers applied to a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    /// `#` highlight
    pub const DEBUG: Modifiers = Modifiers(1);
    /// `!` show only this subtree
    pub const ROOT: Modifiers = Modifiers(2);
    /// `%` transparent background
    pub const BACKGROUND: Modifiers = Modifiers(4);
    /// `*` disabled
    pub const DISABLE: Modifiers = Modifiers(8);
    /// `color(...)` wrapper
    pub const COLOR: Modifiers = Modifiers(16);

    /// The prefix-style modifiers, mutually exclusive
    pub const PREFIXES: Modifiers = Modifiers(1 | 2 | 4 | 8);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Modifiers) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }

    /// Enable or disable one modifier, keeping prefix modifiers exclusive
    pub fn toggle(&mut self, modifier: Modifiers, enable: bool) {
        if !enable {
            self.remove(modifier);
            return;
        }
        if Modifiers::PREFIXES.contains(modifier) {
            self.remove(Modifiers::PREFIXES);
        }
        self.insert(modifier);
    }

    fn prefix(self) -> &'static str {
        if self.contains(Modifiers::ROOT) {
            "!"
        } else if self.contains(Modifiers::DEBUG) {
            "#"
        } else if self.contains(Modifiers::BACKGROUND) {
            "%"
        } else if self.contains(Modifiers::DISABLE) {
            "*"
        } else {
            ""
        }
    }

    /// Wrap a rendered statement in the modifier template
    pub fn apply(self, statement: &str, color: Option<&str>) -> String {
        if statement.is_empty() {
            return String::new();
        }
        let body = match color {
            Some(c) if self.contains(Modifiers::COLOR) => format!("color({}) {}", quote(c), statement),
            _ => statement.to_string(),
        };
        format!("{}{}", self.prefix(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_modifiers_are_exclusive() {
        let mut m = Modifiers::NONE;
        m.toggle(Modifiers::DEBUG, true);
        m.toggle(Modifiers::COLOR, true);
        m.toggle(Modifiers::ROOT, true);
        assert!(m.contains(Modifiers::ROOT));
        assert!(!m.contains(Modifiers::DEBUG));
        assert!(m.contains(Modifiers::COLOR));
    }

    #[test]
    fn test_apply_template() {
        let mut m = Modifiers::NONE;
        assert_eq!(m.apply("cube();", None), "cube();");
        m.toggle(Modifiers::BACKGROUND, true);
        assert_eq!(m.apply("cube();", None), "%cube();");
        m.toggle(Modifiers::COLOR, true);
        assert_eq!(m.apply("cube();", Some("red")), "%color(\"red\") cube();");
        m.toggle(Modifiers::BACKGROUND, false);
        assert_eq!(m.apply("cube();", Some("red")), "color(\"red\") cube();");
        assert_eq!(m.apply("", Some("red")), "");
    }

    #[test]
    fn test_from_bits_masks_unknown() {
        assert_eq!(Modifiers::from_bits(0xFF).bits(), 0b1_1111);
    }
}
