//! Safe SQL identifier handling.
//!
//! Table names, column names, selector keys, and ORDER BY entries are
//! interpolated into SQL text, so they are validated against
//! `[A-Za-z_][A-Za-z0-9_$]*` before any query is generated. Quoted or dotted
//! identifiers are not part of this layer's surface.

use crate::error::{OrmError, OrmResult};

/// Validate a bare SQL identifier.
pub fn check_ident(name: &str) -> OrmResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(OrmError::validation(format!("invalid identifier '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["animal", "animal_id", "_tmp", "qoh2", "a$b"] {
            assert!(check_ident(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_injection_shapes() {
        for bad in ["", "1col", "name;--", "a b", "name'", "legs DESC", "animal.id"] {
            assert!(check_ident(bad).is_err(), "{bad}");
        }
    }
}
