//! Call-stack evaluator and invalidation.
//!
//! `evaluate_cell` is the only place formula bodies run. Every cached read
//! that happens while a node is on the stack is recorded as an edge from the
//! stack top to the node read; `invalidate` walks those edges forward.

use std::collections::VecDeque;

use modelspace_common::{CellId, ModelError, RefId, SpaceId, Value};
use rustc_hash::FxHashSet;

use super::model::Model;
use super::node::{ArgKey, EntityId, Node, make_key};
use crate::context::EvalContext;
use crate::formula::bind_arguments;

impl Model {
    /// Bind call arguments of `cell` into its canonical key.
    pub(crate) fn bind_cell_args(
        &self,
        cell: CellId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<ArgKey, ModelError> {
        let data = self.cell(cell)?;
        let bound = match &data.formula {
            Some(formula) => {
                bind_arguments(formula.params(), args, kwargs, || self.cell_label(cell))?
            }
            None if kwargs.is_empty() => args.to_vec(),
            None => {
                return Err(ModelError::InvalidArguments {
                    target: self.cell_label(cell),
                    detail: "cells without a formula take positional arguments only".into(),
                });
            }
        };
        make_key(&bound)
    }

    pub(crate) fn eval_cell(
        &mut self,
        cell: CellId,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<Value, ModelError> {
        let key = self.bind_cell_args(cell, args, kwargs)?;
        self.evaluate_cell(cell, key)
    }

    pub(crate) fn evaluate_cell(&mut self, cell: CellId, key: ArgKey) -> Result<Value, ModelError> {
        let node = Node::cell(cell, key.clone());

        let data = self.cell(cell)?;
        if let Some(value) = data.cache.get(&key) {
            let value = value.clone();
            self.record_read(&node);
            return Ok(value);
        }
        let formula = data.formula.clone();
        let space = data.space;

        if self.stack.len() >= self.config.max_depth {
            return Err(ModelError::DeepReference {
                depth: self.stack.len() + 1,
                max: self.config.max_depth,
            });
        }
        if let Err(pos) = self.stack.push(node.clone()) {
            let cycle = self
                .stack
                .nodes_from(pos)
                .iter()
                .map(|n| self.node_label(n))
                .collect();
            return Err(ModelError::CircularReference { cycle });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(node = %self.node_label(&node), depth = self.stack.len(), "evaluate");

        let result = match formula {
            Some(formula) => {
                let mut ctx = EvalContext::new(self, space);
                formula.invoke(&mut ctx, &key)
            }
            None => Ok(Value::Empty),
        };
        let result = result
            .map_err(|err| self.wrap_formula_error(err))
            .and_then(|value| self.apply_none_policy(cell, &node, value));
        self.stack.pop();

        match result {
            Ok(value) => {
                if !self.cell_mut(cell)?.cache.put(key, value.clone()) {
                    return Err(ModelError::OverriddenInput {
                        node: self.node_label(&node),
                    });
                }
                self.record_read(&node);
                Ok(value)
            }
            Err(err) => {
                self.graph.remove_precedents(&node);
                Err(err)
            }
        }
    }

    /// Record that the node on top of the stack read `node`.
    pub(crate) fn record_read(&mut self, node: &Node) {
        if let Some(top) = self.stack.top() {
            let top = top.clone();
            self.graph.add_edge(&top, node);
        }
    }

    /// Failures raised in a body are re-signalled with the call stack as it
    /// stood when they surfaced; failures already carrying a trace unwind
    /// unchanged.
    pub(crate) fn wrap_formula_error(&self, err: ModelError) -> ModelError {
        if err.passes_through_formulas() {
            return err;
        }
        ModelError::FormulaExecution {
            cause: Box::new(err),
            trace: self
                .stack
                .frames()
                .iter()
                .map(|n| self.node_label(n))
                .collect(),
        }
    }

    /// Cells setting, then enclosing spaces (through static counterparts),
    /// then the model default.
    fn allows_none(&self, cell: CellId) -> bool {
        let Some(data) = self.cells.get(cell) else {
            return self.config.allow_none;
        };
        if let Some(flag) = data.allow_none {
            return flag;
        }
        let Ok(start) = self.static_of(data.space) else {
            return self.config.allow_none;
        };
        self.lineage(start)
            .into_iter()
            .filter_map(|s| self.spaces.get(s).and_then(|d| d.allow_none))
            .next()
            .unwrap_or(self.config.allow_none)
    }

    fn apply_none_policy(&self, cell: CellId, node: &Node, value: Value) -> Result<Value, ModelError> {
        if value.is_empty() && !self.allows_none(cell) {
            return Err(ModelError::NoneReturned {
                node: self.node_label(node),
            });
        }
        Ok(value)
    }

    /// Evict `start` and everything that transitively read it.
    ///
    /// Returns the number of computed values evicted. Inputs are
    /// definitions and are never evicted here.
    pub(crate) fn invalidate(&mut self, start: &Node) -> usize {
        let mut queue = VecDeque::from([start.clone()]);
        let mut visited: FxHashSet<Node> = FxHashSet::default();
        let mut evicted = 0;

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            if let EntityId::Cell(cell) = node.entity
                && let Some(data) = self.cells.get_mut(cell)
                && data.cache.evict(&node.args)
            {
                evicted += 1;
            }
            queue.extend(self.graph.dependents_of(&node));
            self.graph.remove_precedents(&node);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(node = %self.node_label(start), evicted, "invalidate");
        evicted
    }

    /// Every node of a cells object: computed, input or graph-only.
    fn cell_nodes(&self, cell: CellId) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.graph.nodes_of(EntityId::Cell(cell));
        if let Some(data) = self.cells.get(cell) {
            let known: FxHashSet<ArgKey> = nodes.iter().map(|n| n.args.clone()).collect();
            nodes.extend(
                data.cache
                    .keys()
                    .cloned()
                    .chain(data.cache.input_keys())
                    .filter(|k| !known.contains(k))
                    .map(|k| Node::cell(cell, k)),
            );
        }
        nodes
    }

    pub(crate) fn invalidate_cell(&mut self, cell: CellId) -> usize {
        self.cell_nodes(cell)
            .iter()
            .map(|node| self.invalidate(node))
            .sum()
    }

    /// Names in `space` may now resolve differently: drop everything its
    /// cells computed.
    pub(crate) fn invalidate_space_cells(&mut self, space: SpaceId) -> usize {
        let cells: Vec<CellId> = match self.spaces.get(space) {
            Some(data) => data.cells.values().copied().collect(),
            None => return 0,
        };
        cells.into_iter().map(|c| self.invalidate_cell(c)).sum()
    }

    pub(crate) fn destroy_cell(&mut self, cell: CellId) {
        self.invalidate_cell(cell);
        self.graph.prune_entity(EntityId::Cell(cell));
        self.cells.remove(cell);
    }

    pub(crate) fn destroy_ref(&mut self, id: RefId) {
        self.invalidate(&Node::reference(id));
        self.graph.prune_entity(EntityId::Ref(id));
        self.refs.remove(id);
    }
}
