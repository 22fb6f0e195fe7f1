//! Identifier derivation.
//!
//! Every generated identifier comes from [`Identifier::new`]: one pure
//! function from a source name to its case variants. Templates never
//! re-case strings themselves.

use convert_case::{Case, Casing};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{DecompositionError, DecompositionResult};

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while",
];

/// Case variants of one source name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Identifier {
    source: String,
    pascal: String,
    camel: String,
    snake: String,
    kebab: String,
}

impl Identifier {
    pub fn new(source: &str) -> Self {
        let cleaned: String = source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
            .collect();
        let mut cleaned = cleaned.trim().to_string();
        if cleaned.is_empty() {
            cleaned = "unnamed".into();
        }
        if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
            cleaned = format!("n {}", cleaned);
        }

        Self {
            source: source.to_string(),
            pascal: cleaned.to_case(Case::Pascal),
            camel: cleaned.to_case(Case::Camel),
            snake: cleaned.to_case(Case::Snake),
            kebab: cleaned.to_case(Case::Kebab),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `OrderLine`: types, messages, RPC names
    pub fn pascal(&self) -> &str {
        &self.pascal
    }

    pub fn camel(&self) -> &str {
        &self.camel
    }

    /// `order_line`: modules, files, proto fields
    pub fn snake(&self) -> &str {
        &self.snake
    }

    /// `order-line`: directories, routes
    pub fn kebab(&self) -> &str {
        &self.kebab
    }

    /// Snake form safe as a Rust field / binding name.
    pub fn field(&self) -> String {
        if RUST_KEYWORDS.contains(&self.snake.as_str()) {
            format!("{}_", self.snake)
        } else {
            self.snake.clone()
        }
    }
}

/// Hands out identifiers within one scope (a service, the gateway) and
/// rejects two different source names that derive the same identifier.
#[derive(Debug, Default)]
pub struct NameRegistry {
    claimed: BTreeMap<String, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, source: &str) -> DecompositionResult<Identifier> {
        let ident = Identifier::new(source);
        match self.claimed.get(ident.snake()) {
            Some(first) if first != source => Err(DecompositionError::NamingCollision {
                identifier: ident.snake().to_string(),
                first: first.clone(),
                second: source.to_string(),
            }),
            Some(_) => Ok(ident),
            None => {
                self.claimed
                    .insert(ident.snake().to_string(), source.to_string());
                Ok(ident)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_variants() {
        let id = Identifier::new("OrderLine");
        assert_eq!(id.pascal(), "OrderLine");
        assert_eq!(id.camel(), "orderLine");
        assert_eq!(id.snake(), "order_line");
        assert_eq!(id.kebab(), "order-line");
    }

    #[test]
    fn test_punctuation_and_digits() {
        let id = Identifier::new("customer-accounts.v2");
        assert_eq!(id.pascal(), "CustomerAccountsV2");
        assert!(Identifier::new("2fa").pascal().starts_with('N'));
        assert_eq!(Identifier::new("  ").snake(), "unnamed");
    }

    #[test]
    fn test_keyword_fields() {
        assert_eq!(Identifier::new("Type").field(), "type_");
        assert_eq!(Identifier::new("Name").field(), "name");
    }

    #[test]
    fn test_derivation_is_stable() {
        assert_eq!(Identifier::new("Order Item"), Identifier::new("Order Item"));
    }

    #[test]
    fn test_registry_collision() {
        let mut names = NameRegistry::new();
        names.claim("OrderLine").unwrap();
        names.claim("OrderLine").unwrap();
        let err = names.claim("order_line").unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::NamingCollision { ref identifier, .. } if identifier == "order_line"
        ));
    }
}
