/// Browse taxonomy nodes
use serde::{Deserialize, Serialize};

/// A node of a collection's browse taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Machine key used in browse paths
    pub value: String,

    /// Localized display label
    pub label: String,

    pub description: Option<String>,

    /// Whether the remote reported child levels below this node
    ///
    /// Can be true with empty `children` when expansion stopped at the depth cap.
    pub has_children: bool,

    pub children: Vec<Section>,
}

impl Section {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            description: None,
            has_children: false,
            children: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Number of levels in the subtree rooted here (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + tree_depth(&self.children)
    }

    /// Number of nodes in the subtree rooted here, including this one
    pub fn node_count(&self) -> usize {
        1 + count_nodes(&self.children)
    }
}

/// Depth of a forest of sections; an empty forest has depth 0
pub fn tree_depth(sections: &[Section]) -> usize {
    sections.iter().map(Section::depth).max().unwrap_or(0)
}

/// Total nodes in a forest of sections
pub fn count_nodes(sections: &[Section]) -> usize {
    sections.iter().map(Section::node_count).sum()
}

/// Follows a path of section values down the tree
pub fn find_section<'a>(sections: &'a [Section], path: &[&str]) -> Option<&'a Section> {
    let (first, rest) = path.split_first()?;
    let section = sections.iter().find(|s| s.value == *first)?;
    if rest.is_empty() {
        Some(section)
    } else {
        find_section(&section.children, rest)
    }
}
