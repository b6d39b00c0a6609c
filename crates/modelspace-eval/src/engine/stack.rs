use rustc_hash::FxHashMap;

use super::node::Node;

/// Nodes currently being evaluated, outermost first.
///
/// A node appears at most once; the position index makes the reentrancy
/// check constant time.
#[derive(Debug, Default)]
pub(crate) struct CallStack {
    frames: Vec<Node>,
    index: FxHashMap<Node, usize>,
}

impl CallStack {
    /// Returns the position of `node` if it is already on the stack.
    pub fn push(&mut self, node: Node) -> Result<(), usize> {
        if let Some(&pos) = self.index.get(&node) {
            return Err(pos);
        }
        self.index.insert(node.clone(), self.frames.len());
        self.frames.push(node);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Node> {
        let node = self.frames.pop()?;
        self.index.remove(&node);
        Some(node)
    }

    pub fn top(&self) -> Option<&Node> {
        self.frames.last()
    }

    pub fn nodes_from(&self, pos: usize) -> &[Node] {
        &self.frames[pos.min(self.frames.len())..]
    }

    pub fn frames(&self) -> &[Node] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
