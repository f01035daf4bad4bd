//! Item trees
//!
//! Every URL discovered from a seed lives in the seed's [`ItemTree`]. Nodes
//! are stored in an arena and refer to their parent and children by
//! [`NodeId`], so the tree can be walked both ways without shared ownership.
//! Node `0` is always the seed.

mod status;

pub use status::{ItemSource, ItemStatus};

use crate::urls::CrawlUrl;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// Index of a node inside its tree
pub type NodeId = usize;

/// Errors raised by tree operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("Operation requires a seed item")]
    NotASeed,
    #[error("Invalid item: {0}")]
    InvalidItem(String),
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

/// A URL in a seed's tree
#[derive(Debug)]
pub struct Item {
    id: Uuid,
    pub url: CrawlUrl,
    pub status: ItemStatus,
    pub source: ItemSource,
    /// Redirect target, when the item got redirected
    pub redirection: Option<NodeId>,
    /// URL of the item this seed was found in, for outlinks
    pub seed_via: Option<String>,
    /// Last error recorded while processing the item
    pub error: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Item {
    pub fn new(url: CrawlUrl, source: ItemSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            status: ItemStatus::Fresh,
            source,
            redirection: None,
            seed_via: None,
            error: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_seed_via(mut self, seed_via: impl Into<String>) -> Self {
        self.seed_via = Some(seed_via.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// First five characters of the id, for log lines
    pub fn short_id(&self) -> String {
        self.id.to_string().chars().take(5).collect()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_seed(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena-backed tree rooted at a seed
#[derive(Debug)]
pub struct ItemTree {
    nodes: Vec<Item>,
}

impl ItemTree {
    /// Root node id
    pub const ROOT: NodeId = 0;

    /// New tree whose root is `seed`
    pub fn new(seed: Item) -> Result<Self, ItemError> {
        if seed.parent.is_some() || !seed.children.is_empty() {
            return Err(ItemError::InvalidItem(
                "a seed must be created without parent or children".to_string(),
            ));
        }
        Ok(Self { nodes: vec![seed] })
    }

    pub fn root(&self) -> &Item {
        &self.nodes[Self::ROOT]
    }

    pub fn root_mut(&mut self) -> &mut Item {
        &mut self.nodes[Self::ROOT]
    }

    pub fn get(&self, id: NodeId) -> Result<&Item, ItemError> {
        self.nodes.get(id).ok_or(ItemError::UnknownNode(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Item, ItemError> {
        self.nodes.get_mut(id).ok_or(ItemError::UnknownNode(id))
    }

    /// Consume the tree, returning the seed item
    pub fn into_root(self) -> Item {
        let mut nodes = self.nodes;
        nodes.swap_remove(Self::ROOT)
    }

    /// Structural invariants of a node
    pub fn check_consistency(&self, id: NodeId) -> Result<(), ItemError> {
        let item = self.get(id)?;
        if item.id.is_nil() {
            return Err(ItemError::InvalidItem("id is empty".to_string()));
        }
        match item.parent {
            None if id != Self::ROOT => Err(ItemError::InvalidItem(format!(
                "node {id} is detached from the tree"
            ))),
            Some(_) if id == Self::ROOT => {
                Err(ItemError::InvalidItem("seed has a parent".to_string()))
            }
            Some(_) if item.seed_via.is_some() => Err(ItemError::InvalidItem(
                "seed_via is only allowed on seeds".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Attach `child` under `parent` and move the parent to `transition`.
    ///
    /// A `GotRedirected` transition also records the child as the parent's
    /// redirection.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mut child: Item,
        transition: ItemStatus,
    ) -> Result<NodeId, ItemError> {
        self.get(parent)?;
        if child.seed_via.is_some() {
            return Err(ItemError::InvalidItem(
                "a child cannot carry seed_via".to_string(),
            ));
        }

        let id = self.nodes.len();
        child.parent = Some(parent);
        child.children.clear();
        self.nodes.push(child);

        let parent_item = &mut self.nodes[parent];
        parent_item.children.push(id);
        parent_item.status = transition;
        if transition == ItemStatus::GotRedirected {
            parent_item.redirection = Some(id);
        }
        Ok(id)
    }

    /// Nodes reachable from `id`, depth first, `id` included
    pub fn dfs(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let Some(item) = self.nodes.get(node) else {
                continue;
            };
            order.push(node);
            stack.extend(item.children.iter().rev());
        }
        order
    }

    /// Number of parent edges up to the seed
    pub fn depth(&self, id: NodeId) -> Result<usize, ItemError> {
        Ok(self.ancestors(id)?.len())
    }

    /// Depth counting only ancestors that were not redirected
    pub fn depth_without_redirections(&self, id: NodeId) -> Result<usize, ItemError> {
        Ok(self
            .ancestors(id)?
            .into_iter()
            .filter(|&a| self.nodes[a].status != ItemStatus::GotRedirected)
            .count())
    }

    /// Distance from `id` to its deepest descendant
    pub fn max_depth(&self, id: NodeId) -> Result<usize, ItemError> {
        let item = self.get(id)?;
        let mut deepest = 0;
        for &child in &item.children {
            deepest = deepest.max(1 + self.max_depth(child)?);
        }
        Ok(deepest)
    }

    /// Parents of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, ItemError> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.get(parent)?.parent;
        }
        Ok(ancestors)
    }

    /// Nodes exactly `level` edges below the seed
    pub fn nodes_at_level(&self, id: NodeId, level: usize) -> Result<Vec<NodeId>, ItemError> {
        if !self.get(id)?.is_seed() {
            return Err(ItemError::NotASeed);
        }

        let mut found = Vec::new();
        let mut queue = VecDeque::from([(id, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if depth == level {
                found.push(node);
                continue;
            }
            for &child in &self.nodes[node].children {
                queue.push_back((child, depth + 1));
            }
        }
        Ok(found)
    }

    /// Remove duplicate URLs from the tree.
    ///
    /// Among nodes sharing a URL, a `Completed` one is kept over any other,
    /// else the first in DFS order, unless a duplicate is its ancestor, in
    /// which case that ancestor is kept. The others are detached from their
    /// parents. Afterwards every `GotChildren` node whose children are all
    /// `Completed` becomes `Completed`.
    pub fn dedupe_items(&mut self, id: NodeId) -> Result<(), ItemError> {
        if !self.get(id)?.is_seed() {
            return Err(ItemError::NotASeed);
        }

        let order = self.dfs(id);
        let mut groups: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for &node in &order {
            groups.entry(self.nodes[node].url.raw()).or_default().push(node);
        }

        let mut losers = Vec::new();
        for nodes in groups.values().filter(|nodes| nodes.len() > 1) {
            let mut keep = if nodes.contains(&id) {
                id
            } else {
                nodes
                    .iter()
                    .copied()
                    .find(|&n| self.nodes[n].status == ItemStatus::Completed)
                    .unwrap_or(nodes[0])
            };
            // Detaching an ancestor would take `keep` with it
            let ancestors = self.ancestors(keep)?;
            if let Some(&top) = nodes.iter().find(|&&n| ancestors.contains(&n)) {
                keep = top;
            }
            losers.extend(nodes.iter().copied().filter(|&n| n != keep));
        }

        for loser in losers {
            self.detach(loser);
        }

        self.complete_finished_parents(id);
        Ok(())
    }

    /// Mark `id` and its ancestors `Completed` once nothing is left pending.
    ///
    /// A node completes when it has no children and no redirection, or when
    /// every child has completed.
    pub fn propagate_completion(&mut self, id: NodeId) -> Result<(), ItemError> {
        let mut current = Some(id);
        while let Some(node) = current {
            let item = self.get(node)?;
            if item.status == ItemStatus::Failed || item.status == ItemStatus::Completed {
                current = item.parent;
                continue;
            }
            let done = if item.children.is_empty() {
                item.redirection.is_none()
                    && matches!(item.status, ItemStatus::PostProcessed | ItemStatus::GotChildren)
            } else {
                item.children
                    .iter()
                    .all(|&c| self.nodes[c].status == ItemStatus::Completed)
            };
            if !done {
                break;
            }
            let parent = item.parent;
            self.nodes[node].status = ItemStatus::Completed;
            current = parent;
        }
        Ok(())
    }

    /// Whether every node under the seed has completed or failed
    pub fn is_finished(&self) -> bool {
        self.dfs(Self::ROOT).into_iter().all(|n| {
            matches!(
                self.nodes[n].status,
                ItemStatus::Completed | ItemStatus::Failed
            )
        })
    }

    /// Detach a node (and its subtree) from its parent
    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(id).and_then(|i| i.parent) else {
            return;
        };
        let parent_item = &mut self.nodes[parent];
        parent_item.children.retain(|&c| c != id);
        if parent_item.redirection == Some(id) {
            parent_item.redirection = None;
        }
        self.nodes[id].parent = None;
    }

    /// Post-order pass turning finished `GotChildren` nodes into `Completed`
    fn complete_finished_parents(&mut self, id: NodeId) {
        let mut visited = HashSet::new();
        for node in self.dfs(id).into_iter().rev() {
            if !visited.insert(node) {
                continue;
            }
            let item = &self.nodes[node];
            if item.status == ItemStatus::GotChildren
                && !item.children.is_empty()
                && item
                    .children
                    .iter()
                    .all(|&c| self.nodes[c].status == ItemStatus::Completed)
            {
                self.nodes[node].status = ItemStatus::Completed;
            }
        }
    }
}
