//! Structural diff between two `Value` trees, producing the dotted-path
//! change list `diff`/`commit` report.

use jack_core::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Walk `old`/`new` in lockstep, recursing through matching objects and
/// reporting a leaf change wherever a key's value differs in kind or
/// content. Lists are compared as whole leaves: jack's namespaces use
/// lists for small ordered sets (bridge ports, CLI command arrays) where
/// an element-wise diff isn't more informative than the full before/after.
pub fn diff_values(prefix: &str, old: Option<&Value>, new: Option<&Value>, out: &mut Vec<Change>) {
    match (old, new) {
        (Some(Value::Object(o)), Some(Value::Object(n))) => {
            for key in o.keys().chain(n.keys().filter(|k| !o.contains_key(*k))) {
                let child_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                diff_values(&child_prefix, o.get(key), n.get(key), out);
            }
        }
        (old, new) if old == new => {}
        (old, new) => out.push(Change {
            path: prefix.to_string(),
            old: old.map(Value::to_stable_text),
            new: new.map(Value::to_stable_text),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_subtree_produces_no_changes() {
        let mut a = Value::object();
        a.set_path(&["br-lan", "mtu"], Value::Int(1500)).unwrap();
        let b = a.clone();
        let mut out = Vec::new();
        diff_values("interfaces", Some(&a), Some(&b), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn changed_leaf_reports_dotted_path() {
        let mut a = Value::object();
        a.set_path(&["br-lan", "mtu"], Value::Int(1500)).unwrap();
        let mut b = Value::object();
        b.set_path(&["br-lan", "mtu"], Value::Int(9000)).unwrap();
        let mut out = Vec::new();
        diff_values("interfaces", Some(&a), Some(&b), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "interfaces.br-lan.mtu");
        assert_eq!(out[0].old.as_deref(), Some("1500"));
        assert_eq!(out[0].new.as_deref(), Some("9000"));
    }

    #[test]
    fn added_key_has_no_old_value() {
        let a = Value::object();
        let mut b = Value::object();
        b.set_path(&["wan", "enabled"], Value::Bool(true)).unwrap();
        let mut out = Vec::new();
        diff_values("interfaces", Some(&a), Some(&b), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].old, None);
    }
}
