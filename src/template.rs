//! `{key}` placeholder substitution against the session variable store.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::state::VariableStore;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern"));

/// Substitutes each `{key}` with the stored variable rendered as text,
/// left-to-right. Substitution is non-recursive: a substituted value is not
/// itself re-scanned for placeholders. Unset keys render as the empty string.
pub fn resolve(template: &str, vars: &VariableStore) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| vars.get(&caps[1]).render())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Variable;

    #[test]
    fn test_basic_substitution() {
        let vars = VariableStore::new();
        vars.set("name", Variable::Text("Ana".into()));
        assert_eq!(resolve("Hello {name}", &vars), "Hello Ana");
    }

    #[test]
    fn test_unset_placeholder_renders_empty() {
        let vars = VariableStore::new();
        assert_eq!(resolve("Hello {name}", &vars), "Hello ");
    }

    #[test]
    fn test_substitution_is_not_recursive() {
        let vars = VariableStore::new();
        vars.set("a", Variable::Text("{b}".into()));
        vars.set("b", Variable::Text("boom".into()));
        assert_eq!(resolve("{a}", &vars), "{b}");
    }

    #[test]
    fn test_multiple_placeholders_left_to_right() {
        let vars = VariableStore::new();
        vars.set("count", Variable::Number(3.0));
        vars.set("ok", Variable::Boolean(true));
        assert_eq!(resolve("{count} items, ok={ok}", &vars), "3 items, ok=true");
    }

    #[test]
    fn test_text_without_placeholders_passes_through() {
        let vars = VariableStore::new();
        assert_eq!(resolve("plain text", &vars), "plain text");
    }
}
