//! Aliases bound by a query compilation.

use hashbrown::HashMap;

#[derive(Clone, Debug)]
struct AliasNode {
    table: String,
    children: HashMap<String, String>,
}

/// Every alias of a compiled query, with the relationship edges that
/// connect them. Dotted predicate paths are resolved by walking the edges
/// from the root alias.
#[derive(Clone, Debug)]
pub struct AliasGraph {
    root: String,
    nodes: HashMap<String, AliasNode>,
}

impl AliasGraph {
    /// Creates a graph with its root alias.
    pub fn new(root: impl Into<String>, table: impl Into<String>) -> Self {
        let root = root.into();
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            AliasNode {
                table: table.into(),
                children: HashMap::new(),
            },
        );
        Self { root, nodes }
    }

    /// The root alias.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Binds an alias to a table.
    pub fn add(&mut self, alias: impl Into<String>, table: impl Into<String>) {
        self.nodes.insert(
            alias.into(),
            AliasNode {
                table: table.into(),
                children: HashMap::new(),
            },
        );
    }

    /// Records that `relation` of `parent` is bound to `child`.
    pub fn link(&mut self, parent: &str, relation: impl Into<String>, child: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.insert(relation.into(), child.into());
        }
    }

    /// Table an alias is bound to.
    pub fn table_of(&self, alias: &str) -> Option<&str> {
        self.nodes.get(alias).map(|n| n.table.as_str())
    }

    /// Alias of a relationship of `alias`.
    pub fn child(&self, alias: &str, relation: &str) -> Option<&str> {
        self.nodes
            .get(alias)?
            .children
            .get(relation)
            .map(String::as_str)
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk() {
        let mut graph = AliasGraph::new("post@0", "post");
        graph.add("user@0", "user");
        graph.link("post@0", "owner", "user@0");
        assert_eq!(graph.root(), "post@0");
        assert_eq!(graph.child("post@0", "owner"), Some("user@0"));
        assert_eq!(graph.table_of("user@0"), Some("user"));
        assert_eq!(graph.child("user@0", "owner"), None);
        assert_eq!(graph.len(), 2);
    }
}
