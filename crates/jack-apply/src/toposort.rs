//! Kahn's-algorithm topological sort, generalized over `String` nodes
//! so both VLAN-after-parent interface ordering and plugin-dependency
//! ordering can share it. Grounded on the teacher's
//! `DisasterRecoveryExport::apply_order` idea of deriving an apply
//! sequence from a dependency list, reimplemented as an explicit graph
//! sort rather than the teacher's ad hoc Vec scan.

use std::collections::{HashMap, HashSet, VecDeque};

use jack_core::{JackError, Result};

/// `edges` are `(node, depends_on)` pairs: `depends_on` must appear
/// before `node` in the returned order. Edges referencing a node not in
/// `nodes` are ignored — a plugin dependency on a namespace that isn't
/// itself one of the nodes being sorted (e.g. a built-in namespace
/// already applied earlier) imposes no ordering constraint here.
pub fn toposort(nodes: Vec<String>, edges: Vec<(String, String)>) -> Result<Vec<String>> {
    let node_set: HashSet<&str> = nodes.iter().map(String::as_str).collect();
    let mut depends_on: HashMap<&str, Vec<&str>> = nodes.iter().map(|n| (n.as_str(), Vec::new())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = nodes.iter().map(|n| (n.as_str(), Vec::new())).collect();

    for (node, dep) in &edges {
        if !node_set.contains(node.as_str()) || !node_set.contains(dep.as_str()) || node == dep {
            continue;
        }
        depends_on.get_mut(node.as_str()).unwrap().push(dep.as_str());
        dependents.get_mut(dep.as_str()).unwrap().push(node.as_str());
    }

    let mut remaining: HashMap<&str, usize> =
        depends_on.iter().map(|(n, deps)| (*n, deps.len())).collect();
    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(String::as_str)
        .filter(|n| remaining[n] == 0)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        for dependent in &dependents[node] {
            let count = remaining.get_mut(dependent).unwrap();
            *count -= 1;
            if *count == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = nodes
            .iter()
            .map(String::as_str)
            .filter(|n| !order.iter().any(|o| o == n))
            .collect();
        return Err(JackError::Validation(vec![format!(
            "circular dependency among: {}",
            stuck.join(", ")
        )]));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_nodes_keep_stable_relative_order() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sorted = toposort(nodes, vec![]).unwrap();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn dependency_is_ordered_before_dependent() {
        let nodes = vec!["vlan10".to_string(), "eth0".to_string()];
        let edges = vec![("vlan10".to_string(), "eth0".to_string())];
        let sorted = toposort(nodes, edges).unwrap();
        let vlan_pos = sorted.iter().position(|n| n == "vlan10").unwrap();
        let eth_pos = sorted.iter().position(|n| n == "eth0").unwrap();
        assert!(eth_pos < vlan_pos);
    }

    #[test]
    fn cycle_is_rejected() {
        let nodes = vec!["a".to_string(), "b".to_string()];
        let edges = vec![("a".to_string(), "b".to_string()), ("b".to_string(), "a".to_string())];
        let err = toposort(nodes, edges).unwrap_err();
        assert!(matches!(err, JackError::Validation(_)));
    }

    #[test]
    fn edge_referencing_unknown_node_is_ignored() {
        let nodes = vec!["a".to_string()];
        let edges = vec![("a".to_string(), "ghost".to_string())];
        let sorted = toposort(nodes, edges).unwrap();
        assert_eq!(sorted, vec!["a"]);
    }
}
