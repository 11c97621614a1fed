//! Forest helpers over flat category rows
//!
//! Nothing here touches storage. Rows are grouped by parent once and every
//! traversal walks that index, so assembly is linear in the number of rows.
//! All traversals carry a visited set, so rows that already form a cycle
//! cannot make them loop.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::entity::category::{self, PATH_SEPARATOR};

/// Tree node used in API responses
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: category::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_count: Option<u64>,
    pub children: Vec<CategoryTree>,
}

impl From<category::Model> for CategoryTree {
    fn from(category: category::Model) -> Self {
        Self {
            category,
            product_count: None,
            children: Vec::new(),
        }
    }
}

/// Sibling order used by trees and child listings
pub fn by_name(a: &category::Model, b: &category::Model) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then(a.id.cmp(&b.id))
}

/// Level and materialized path of a node named `name` under `parent`
pub fn hierarchy_for(parent: Option<&category::Model>, name: &str) -> (i32, String) {
    match parent {
        Some(p) => child_hierarchy(p.level, &p.path, name),
        None => (1, name.to_string()),
    }
}

pub fn child_hierarchy(parent_level: i32, parent_path: &str, name: &str) -> (i32, String) {
    (
        parent_level + 1,
        format!("{}{}{}", parent_path, PATH_SEPARATOR, name),
    )
}

/// Borrowed parent -> children multimap
pub struct ParentIndex<'a> {
    by_parent: HashMap<Option<i64>, Vec<&'a category::Model>>,
}

impl<'a> ParentIndex<'a> {
    pub fn new(nodes: &'a [category::Model]) -> Self {
        let mut by_parent: HashMap<Option<i64>, Vec<&'a category::Model>> = HashMap::new();
        for node in nodes {
            by_parent.entry(node.parent_id).or_default().push(node);
        }
        for children in by_parent.values_mut() {
            children.sort_by(|a, b| by_name(a, b));
        }
        Self { by_parent }
    }

    pub fn children_of(&self, parent_id: Option<i64>) -> &[&'a category::Model] {
        self.by_parent
            .get(&parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every id reachable below `root`, excluding `root` itself
    pub fn descendants(&self, root: i64) -> HashSet<i64> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for child in self.children_of(Some(id)) {
                if child.id != root && seen.insert(child.id) {
                    stack.push(child.id);
                }
            }
        }
        seen
    }
}

/// Assemble flat rows into a forest.
///
/// Rows without a parent, and rows whose parent is not part of `nodes`,
/// become roots. Siblings keep their relative order from `nodes`.
pub fn assemble(nodes: Vec<category::Model>) -> Vec<CategoryTree> {
    let present: HashSet<i64> = nodes.iter().map(|n| n.id).collect();

    let mut roots = Vec::new();
    let mut by_parent: HashMap<i64, Vec<category::Model>> = HashMap::new();
    for node in nodes {
        match node.parent_id {
            Some(parent_id) if present.contains(&parent_id) => {
                by_parent.entry(parent_id).or_default().push(node)
            }
            _ => roots.push(node),
        }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut by_parent))
        .collect()
}

// Each group is removed from the index when it is attached, so a row can be
// placed at most once.
fn attach(node: category::Model, by_parent: &mut HashMap<i64, Vec<category::Model>>) -> CategoryTree {
    let children = by_parent.remove(&node.id).unwrap_or_default();
    let mut tree = CategoryTree::from(node);
    tree.children = children
        .into_iter()
        .map(|child| attach(child, by_parent))
        .collect();
    tree
}

/// Visit every node of the forest, parents before children
pub fn for_each_mut(forest: &mut [CategoryTree], f: &mut impl FnMut(&mut CategoryTree)) {
    for node in forest {
        f(node);
        for_each_mut(&mut node.children, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(id: i64, parent_id: Option<i64>, name: &str) -> category::Model {
        let now = Utc::now();
        category::Model {
            id,
            name: name.to_string(),
            description: None,
            code: None,
            parent_id,
            level: 1,
            path: name.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Depth-first, pre-order
    fn flatten(forest: &[CategoryTree]) -> Vec<&category::Model> {
        let mut out = Vec::new();
        let mut stack: Vec<&CategoryTree> = forest.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(&node.category);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    fn sample() -> Vec<category::Model> {
        vec![
            node(1, None, "Eletrônicos"),
            node(2, Some(1), "Notebooks"),
            node(3, Some(1), "Celulares"),
            node(4, Some(2), "Gamer"),
            node(5, None, "Alimentos"),
            node(6, Some(5), "Bebidas"),
        ]
    }

    #[test]
    fn test_hierarchy_for() {
        assert_eq!(hierarchy_for(None, "Eletrônicos"), (1, "Eletrônicos".to_string()));
        let mut parent = node(1, None, "Eletrônicos");
        parent.level = 2;
        parent.path = "Loja > Eletrônicos".to_string();
        assert_eq!(
            hierarchy_for(Some(&parent), "Notebooks"),
            (3, "Loja > Eletrônicos > Notebooks".to_string())
        );
    }

    #[test]
    fn test_assemble_keeps_input_order() {
        let mut rows = sample();
        rows.sort_by(by_name);
        let forest = assemble(rows);
        let roots: Vec<&str> = forest.iter().map(|t| t.category.name.as_str()).collect();
        assert_eq!(roots, vec!["Alimentos", "Eletrônicos"]);

        let eletronicos = &forest[1];
        let children: Vec<&str> = eletronicos
            .children
            .iter()
            .map(|t| t.category.name.as_str())
            .collect();
        assert_eq!(children, vec!["Celulares", "Notebooks"]);
        assert_eq!(eletronicos.children[1].children[0].category.id, 4);

        let mut reversed = sample();
        reversed.sort_by(|a, b| by_name(b, a));
        let forest = assemble(reversed);
        assert_eq!(forest[0].category.name, "Eletrônicos");
    }

    #[test]
    fn test_assemble_then_flatten_preserves_ids_and_links() {
        let rows = sample();
        let forest = assemble(rows.clone());
        let flat = flatten(&forest);

        let mut ids: Vec<i64> = flat.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

        for row in &rows {
            let back = flat.iter().find(|n| n.id == row.id).unwrap();
            assert_eq!(back.parent_id, row.parent_id);
        }

        // pre-order: every parent appears before its children
        let position: HashMap<i64, usize> = flat.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        for n in &flat {
            if let Some(p) = n.parent_id {
                assert!(position[&p] < position[&n.id]);
            }
        }
    }

    #[test]
    fn test_assemble_promotes_orphans() {
        let rows = vec![node(2, Some(1), "Notebooks"), node(4, Some(2), "Gamer")];
        let forest = assemble(rows);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].category.id, 2);
        assert_eq!(forest[0].children[0].category.id, 4);
    }

    #[test]
    fn test_assemble_survives_cyclic_rows() {
        let rows = vec![
            node(1, None, "Raiz"),
            node(2, Some(3), "A"),
            node(3, Some(2), "B"),
        ];
        let forest = assemble(rows);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn test_descendants() {
        let rows = sample();
        let index = ParentIndex::new(&rows);
        let below: HashSet<i64> = index.descendants(1);
        assert_eq!(below, HashSet::from([2, 3, 4]));
        assert!(index.descendants(4).is_empty());
        assert_eq!(index.children_of(None).len(), 2);
    }

    #[test]
    fn test_descendants_terminates_on_cycle() {
        let rows = vec![node(1, Some(3), "A"), node(2, Some(1), "B"), node(3, Some(2), "C")];
        let index = ParentIndex::new(&rows);
        assert_eq!(index.descendants(1), HashSet::from([2, 3]));
    }

    #[test]
    fn test_for_each_mut_visits_all() {
        let mut forest = assemble(sample());
        let mut visited = 0;
        for_each_mut(&mut forest, &mut |n| {
            n.product_count = Some(0);
            visited += 1;
        });
        assert_eq!(visited, 6);
        assert!(flatten(&forest).len() == 6);
    }
}
