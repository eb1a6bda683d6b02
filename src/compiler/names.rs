// src/compiler/names.rs
//! Identifier synthesis for extension operators
//!
//! Each compile call owns one [`NameResolver`]. Identical keys get the same
//! identifier, distinct keys get distinct identifiers, and no identifier is a
//! reserved word or a support routine name.

use crate::runtime::support::Support;
use ahash::{HashMap, HashSet};

const KEYWORDS: &[&str] = &[
    "null", "undefined", "true", "false", "if", "else", "switch", "function", "default", "break",
    "return", "continue", "case", "for", "while", "do", "class", "isinstance", "goto", "extends",
    "in", "throw", "super", "typeof", "yield", "export", "import", "from", "var", "let", "const",
    "this", "with", "delete", "new", "void", "try", "catch", "finally", "debugger",
];

/// Names bound by evaluator scopes
const SCOPE_NAMES: &[&str] = &[
    "arg", "item", "accumulator", "context", "key", "current", "data", "index",
];

const HOST_NAMES: &[&str] = &["hasOwnProperty", "String", "Array", "Object", "Math", "console"];

pub fn is_reserved(name: &str) -> bool {
    KEYWORDS.contains(&name)
        || SCOPE_NAMES.contains(&name)
        || HOST_NAMES.contains(&name)
        || Support::ALL.iter().any(|support| support.name() == name)
}

/// Matches `[_a-zA-Z$][_a-zA-Z0-9$]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// Drop each `-` and upper-case the character after it, if that character
/// is an ASCII letter or digit.
fn kebab_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '-' {
            out.push(c);
            continue;
        }
        if let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
        }
    }
    out
}

/// One resolved binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub identifier: String,
    /// Position in first-reference order
    pub slot: usize,
}

#[derive(Debug, Default)]
pub struct NameResolver {
    bindings: HashMap<String, Binding>,
    claimed: HashSet<String>,
    positional: usize,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for `key`, binding it on first use.
    pub fn resolve(&mut self, key: &str) -> &Binding {
        if !self.bindings.contains_key(key) {
            let identifier = self.synthesize(key);
            self.claimed.insert(identifier.clone());
            let slot = self.bindings.len();
            self.bindings
                .insert(key.to_string(), Binding { identifier, slot });
        }
        &self.bindings[key]
    }

    fn synthesize(&mut self, key: &str) -> String {
        let candidate = if is_identifier(key) {
            key.to_string()
        } else {
            kebab_to_camel(key)
        };
        if !is_identifier(&candidate) {
            return self.next_positional();
        }
        let candidate = if is_reserved(&candidate) {
            format!("_{}", candidate)
        } else {
            candidate
        };
        if self.claimed.contains(&candidate) {
            self.next_positional()
        } else {
            candidate
        }
    }

    fn next_positional(&mut self) -> String {
        loop {
            let name = format!("_{}", self.positional);
            self.positional += 1;
            if !self.claimed.contains(&name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_grammar() {
        assert!(is_identifier("abc"));
        assert!(is_identifier("$a_1"));
        assert!(is_identifier("_"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("is-nan"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("ünïcode"));
    }

    #[test]
    fn test_plain_keys_are_kept() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("double").identifier, "double");
        assert_eq!(names.resolve("double").slot, 0);
        assert_eq!(names.resolve("triple").slot, 1);
    }

    #[test]
    fn test_reserved_words_get_prefixed() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("typeof").identifier, "_typeof");
        assert_eq!(names.resolve("data").identifier, "_data");
        assert_eq!(names.resolve("truthy").identifier, "_truthy");
        assert_eq!(names.resolve("substr").identifier, "_substr");
        assert_eq!(names.resolve("Math").identifier, "_Math");
    }

    #[test]
    fn test_kebab_case_is_camelized() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("is-nan").identifier, "isNan");
        assert_eq!(names.resolve("time-since").identifier, "timeSince");
        assert_eq!(names.resolve("trailing-").identifier, "trailing");
        assert_eq!(names.resolve("-in").identifier, "In");
    }

    #[test]
    fn test_colliding_candidates_get_distinct_names() {
        let mut names = NameResolver::new();
        let first = names.resolve("is-nan").identifier.clone();
        let second = names.resolve("isNan").identifier.clone();
        let third = names.resolve("is--nan").identifier.clone();

        assert_eq!(first, "isNan");
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }

    #[test]
    fn test_prefixed_reserved_name_does_not_steal_existing_binding() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("_data").identifier, "_data");
        assert_ne!(names.resolve("data").identifier, "_data");
    }

    #[test]
    fn test_unreadable_keys_fall_back_to_positional() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("+").identifier, "_0");
        assert_eq!(names.resolve("a b").identifier, "_1");
        assert_eq!(names.resolve("+").identifier, "_0");
    }

    #[test]
    fn test_positional_names_skip_claimed_ones() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("_0").identifier, "_0");
        assert_eq!(names.resolve("?").identifier, "_1");
    }
}
