//! Arena-backed binary expression tree.
//!
//! Nodes live in a `Vec` and are addressed by [`NodeId`], so a scheduled task
//! can hold a stable index instead of a reference into the tree. Contraction
//! overwrites an operator slot in place with a leaf; the orphaned child slots
//! stay in the arena and are never visited again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::operator::Operator;

/// Stable index of a node inside its [`ExprTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf(f64),
    Internal {
        op: Operator,
        left: NodeId,
        right: NodeId,
        /// A task for the current children is outstanding.
        dispatched: bool,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Node::Leaf(v) => Some(*v),
            Node::Internal { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprTree {
    slots: Vec<Slot>,
    root: NodeId,
}

impl ExprTree {
    /// A tree that is already solved.
    pub fn leaf(value: f64) -> Self {
        let mut tree = Self::empty();
        tree.root = tree.push_leaf(value);
        tree
    }

    pub(crate) fn empty() -> Self {
        Self {
            slots: Vec::new(),
            root: NodeId(0),
        }
    }

    pub(crate) fn push_leaf(&mut self, value: f64) -> NodeId {
        self.push(Node::Leaf(value))
    }

    pub(crate) fn push_internal(&mut self, op: Operator, left: NodeId, right: NodeId) -> NodeId {
        let id = self.push(Node::Internal {
            op,
            left,
            right,
            dispatched: false,
        });
        self.slots[left.0 as usize].parent = Some(id);
        self.slots[right.0 as usize].parent = Some(id);
        id
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { node, parent: None });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0 as usize).map(|s| &s.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0 as usize).and_then(|s| s.parent)
    }

    /// Whether the whole expression has contracted to one value.
    pub fn is_solved(&self) -> bool {
        self.root_value().is_some()
    }

    pub fn root_value(&self) -> Option<f64> {
        self.node(self.root).and_then(Node::value)
    }

    /// Operator node whose children are both leaves and which has no task yet.
    pub fn is_ready(&self, id: NodeId) -> bool {
        match self.node(id) {
            Some(Node::Internal {
                left,
                right,
                dispatched: false,
                ..
            }) => self.is_leaf(*left) && self.is_leaf(*right),
            _ => false,
        }
    }

    fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(Node::is_leaf)
    }

    /// Operator and resolved operand values of an operator node with leaf children.
    pub fn operands(&self, id: NodeId) -> Option<(Operator, f64, f64)> {
        match self.node(id)? {
            Node::Internal { op, left, right, .. } => {
                let l = self.node(*left)?.value()?;
                let r = self.node(*right)?.value()?;
                Some((*op, l, r))
            }
            Node::Leaf(_) => None,
        }
    }

    /// Ready nodes in depth-first, left-then-right, post-order.
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        let mut ready = Vec::new();
        // (node, children already pushed)
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(Node::Internal { left, right, .. }) = self.node(id) else {
                continue;
            };
            if expanded {
                if self.is_ready(id) {
                    ready.push(id);
                }
            } else {
                stack.push((id, true));
                stack.push((*right, false));
                stack.push((*left, false));
            }
        }
        ready
    }

    pub fn set_dispatched(&mut self, id: NodeId, value: bool) -> Result<(), TreeError> {
        match self.slots.get_mut(id.0 as usize).map(|s| &mut s.node) {
            Some(Node::Internal { dispatched, .. }) => {
                *dispatched = value;
                Ok(())
            }
            Some(Node::Leaf(_)) => Err(TreeError::NotReady(id)),
            None => Err(TreeError::MissingNode(id)),
        }
    }

    /// Replace an operator node whose operands are both known with a leaf.
    ///
    /// Returns the parent when the contraction made it ready.
    pub fn contract(&mut self, id: NodeId, value: f64) -> Result<Option<NodeId>, TreeError> {
        if self.node(id).is_none() {
            return Err(TreeError::MissingNode(id));
        }
        if self.operands(id).is_none() {
            return Err(TreeError::NotReady(id));
        }
        self.slots[id.0 as usize].node = Node::Leaf(value);
        Ok(self.parent(id).filter(|p| self.is_ready(*p)))
    }

    /// Operator nodes still reachable from the root.
    pub fn pending_operations(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(Node::Internal { left, right, .. }) = self.node(id) {
                count += 1;
                stack.push(*left);
                stack.push(*right);
            }
        }
        count
    }
}

enum Render {
    Node(NodeId),
    Op(Operator),
    Close,
}

/// Fully parenthesized infix rendering, e.g. `(3 + (4 * 2))`.
impl fmt::Display for ExprTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![Render::Node(self.root)];
        while let Some(step) = stack.pop() {
            match step {
                Render::Node(id) => match self.node(id) {
                    Some(Node::Leaf(v)) => write!(f, "{v}")?,
                    Some(Node::Internal { op, left, right, .. }) => {
                        write!(f, "(")?;
                        stack.push(Render::Close);
                        stack.push(Render::Node(*right));
                        stack.push(Render::Op(*op));
                        stack.push(Render::Node(*left));
                    }
                    None => write!(f, "?")?,
                },
                Render::Op(op) => write!(f, " {op} ")?,
                Render::Close => write!(f, ")")?,
            }
        }
        Ok(())
    }
}
