//! Inheritance engine.
//!
//! A static space derives every member it does not author from its bases:
//! explicit bases in declaration order, then implicit bases (the same-named
//! children of its parent's bases). The first base defining a name decides
//! what gets mirrored; bases defining the same name as different kinds of
//! member conflict.
//!
//! Any change to a static space is followed by [`Model::propagate`], which
//! re-derives every space downstream of it in topological order: a space is
//! only re-derived once none of its bases, nor its parent, is still waiting
//! in the same wave.

use std::collections::{BTreeMap, VecDeque};

use modelspace_common::{CellId, ModelError, RefId, SpaceId};
use rustc_hash::FxHashSet;

use super::model::Model;
use super::node::Node;
use super::space::{CellData, ParamSpec, RefData, SpaceData, SpaceKind};
use crate::formula::Formula;

/// Outcome of one propagation wave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationSummary {
    /// Spaces re-derived.
    pub spaces: usize,
    /// Derived members created.
    pub created: usize,
    /// Derived members whose definition changed in place.
    pub updated: usize,
    /// Derived members removed.
    pub removed: usize,
}

impl DerivationSummary {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MemberKind {
    Cells,
    Space,
    Reference,
}

impl MemberKind {
    fn describe(self) -> &'static str {
        match self {
            MemberKind::Cells => "cells",
            MemberKind::Space => "a space",
            MemberKind::Reference => "a reference",
        }
    }
}

#[derive(Debug, Default)]
struct Plan {
    cells: BTreeMap<String, CellId>,
    refs: BTreeMap<String, RefId>,
    spaces: BTreeMap<String, Vec<SpaceId>>,
    params: Option<ParamSpec>,
}

fn same_formula(a: &Option<Formula>, b: &Option<Formula>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        (None, None) => true,
        _ => false,
    }
}

impl Model {
    fn inheritance_conflict(
        &self,
        space: SpaceId,
        name: &str,
        first: (MemberKind, String),
        second: (MemberKind, String),
    ) -> ModelError {
        ModelError::InheritanceConflict {
            name: name.to_string(),
            space: self.full_name(space),
            reason: format!(
                "it is {} in {} but {} in {}",
                first.0.describe(),
                first.1,
                second.0.describe(),
                second.1
            ),
        }
    }

    /// What `space` would inherit from its current bases.
    fn plan_derivation(&self, space: SpaceId) -> Result<Plan, ModelError> {
        let mut plan = Plan::default();
        let mut kinds: BTreeMap<String, (MemberKind, SpaceId)> = BTreeMap::new();

        for base in self.effective_bases(space) {
            let data = self.space(base)?;
            let members = data
                .cells
                .keys()
                .map(|n| (n, MemberKind::Cells))
                .chain(data.spaces.keys().map(|n| (n, MemberKind::Space)))
                .chain(data.refs.keys().map(|n| (n, MemberKind::Reference)));
            for (name, kind) in members {
                match kinds.get(name) {
                    Some((seen, from)) if *seen != kind => {
                        return Err(self.inheritance_conflict(
                            space,
                            name,
                            (*seen, self.full_name(*from)),
                            (kind, self.full_name(base)),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        kinds.insert(name.clone(), (kind, base));
                    }
                }
            }
            for (name, cell) in &data.cells {
                plan.cells.entry(name.clone()).or_insert(*cell);
            }
            for (name, reference) in &data.refs {
                plan.refs.entry(name.clone()).or_insert(*reference);
            }
            for (name, child) in &data.spaces {
                plan.spaces.entry(name.clone()).or_default().push(*child);
            }
            if plan.params.is_none() {
                plan.params = data.params.clone();
            }
        }

        // Authored members must agree in kind with what the bases define.
        let data = self.space(space)?;
        let authored = data
            .cells
            .iter()
            .filter(|(_, c)| self.cells.get(**c).is_some_and(|c| !c.derived))
            .map(|(n, _)| (n, MemberKind::Cells))
            .chain(
                data.refs
                    .iter()
                    .filter(|(_, r)| self.refs.get(**r).is_some_and(|r| !r.derived))
                    .map(|(n, _)| (n, MemberKind::Reference)),
            )
            .chain(
                data.spaces
                    .iter()
                    .filter(|(_, s)| self.spaces.get(**s).is_some_and(|s| !s.is_derived()))
                    .map(|(n, _)| (n, MemberKind::Space)),
            );
        for (name, kind) in authored {
            if let Some((inherited, base)) = kinds.get(name)
                && *inherited != kind
            {
                return Err(self.inheritance_conflict(
                    space,
                    name,
                    (kind, self.full_name(space)),
                    (*inherited, self.full_name(*base)),
                ));
            }
        }
        Ok(plan)
    }

    /// Bring the derived members of `space` in line with its bases.
    /// Returns spaces that need deriving in turn.
    fn derive_space(
        &mut self,
        space: SpaceId,
        summary: &mut DerivationSummary,
    ) -> Result<Vec<SpaceId>, ModelError> {
        if !self.space(space)?.is_static() {
            return Ok(Vec::new());
        }
        let plan = self.plan_derivation(space)?;
        let mut structural = false;
        let mut redefined = false;
        let mut follow = Vec::new();
        let mut destroyed = false;

        // cells
        for (name, source) in &plan.cells {
            let src = self.cell(*source)?;
            let (formula, allow_none) = (src.formula.clone(), src.allow_none);
            match self.space(space)?.cells.get(name).copied() {
                None => {
                    let mut data = CellData::new(name, space, formula, true);
                    data.allow_none = allow_none;
                    let id = self.cells.insert(data);
                    self.space_mut(space)?.cells.insert(name.clone(), id);
                    self.shadow_global(name);
                    summary.created += 1;
                    structural = true;
                }
                Some(id) => {
                    let current = self.cell(id)?;
                    if current.derived
                        && (!same_formula(&current.formula, &formula)
                            || current.allow_none != allow_none)
                    {
                        let current = self.cell_mut(id)?;
                        current.formula = formula;
                        current.allow_none = allow_none;
                        self.invalidate_cell(id);
                        summary.updated += 1;
                        redefined = true;
                    }
                }
            }
        }
        let existing: Vec<(String, CellId)> = self
            .space(space)?
            .cells
            .iter()
            .map(|(n, c)| (n.clone(), *c))
            .collect();
        for (name, id) in existing {
            if !plan.cells.contains_key(&name) && self.cell(id)?.derived {
                self.space_mut(space)?.cells.remove(&name);
                self.destroy_cell(id);
                summary.removed += 1;
                structural = true;
            }
        }

        // references
        for (name, source) in &plan.refs {
            let src = self.reference(*source)?;
            let (value, mode, relative, origin) =
                (src.value.clone(), src.mode, src.relative, src.origin);
            match self.space(space)?.refs.get(name).copied() {
                None => {
                    let id = self.refs.insert(RefData {
                        name: name.clone(),
                        owner: Some(space),
                        value,
                        mode,
                        relative,
                        origin,
                        derived: true,
                    });
                    self.space_mut(space)?.refs.insert(name.clone(), id);
                    self.shadow_global(name);
                    summary.created += 1;
                    structural = true;
                }
                Some(id) => {
                    let current = self.reference(id)?;
                    if current.derived
                        && (current.value != value
                            || current.mode != mode
                            || current.origin != origin)
                    {
                        let current = self.reference_mut(id)?;
                        current.value = value;
                        current.mode = mode;
                        current.relative = relative;
                        current.origin = origin;
                        self.invalidate(&Node::reference(id));
                        summary.updated += 1;
                    }
                }
            }
        }
        let existing: Vec<(String, RefId)> = self
            .space(space)?
            .refs
            .iter()
            .map(|(n, r)| (n.clone(), *r))
            .collect();
        for (name, id) in existing {
            if !plan.refs.contains_key(&name) && self.reference(id)?.derived {
                self.space_mut(space)?.refs.remove(&name);
                self.destroy_ref(id);
                summary.removed += 1;
                structural = true;
            }
        }

        // child spaces
        for (name, sources) in &plan.spaces {
            match self.space(space)?.spaces.get(name).copied() {
                None => {
                    let mut data = SpaceData::new_static(name, Some(space), true);
                    if let SpaceKind::Static { implicit_bases, .. } = &mut data.kind {
                        *implicit_bases = sources.clone();
                    }
                    let id = self.spaces.insert(data);
                    self.space_mut(space)?.spaces.insert(name.clone(), id);
                    self.shadow_global(name);
                    summary.created += 1;
                    structural = true;
                    follow.push(id);
                }
                Some(child) => {
                    if let SpaceKind::Static { implicit_bases, .. } = &mut self.space_mut(child)?.kind
                        && implicit_bases != sources
                    {
                        *implicit_bases = sources.clone();
                        follow.push(child);
                    }
                }
            }
        }
        let existing: Vec<(String, SpaceId)> = self
            .space(space)?
            .spaces
            .iter()
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        for (name, child) in existing {
            if plan.spaces.contains_key(&name) {
                continue;
            }
            if self.space(child)?.is_derived() {
                self.space_mut(space)?.spaces.remove(&name);
                self.destroy_space_tree(child);
                summary.removed += 1;
                structural = true;
                destroyed = true;
            } else if let SpaceKind::Static { implicit_bases, .. } = &mut self.space_mut(child)?.kind
                && !implicit_bases.is_empty()
            {
                implicit_bases.clear();
                follow.push(child);
            }
        }

        // parameters
        let data = self.space(space)?;
        if !data.params_local {
            let changed = match (&data.params, &plan.params) {
                (Some(a), Some(b)) => !a.same_as(b),
                (None, None) => false,
                _ => true,
            };
            if changed {
                self.space_mut(space)?.params = plan.params;
                structural = true;
            }
        }

        if structural {
            self.invalidate_space_cells(space);
        }
        if structural || redefined {
            self.touch_instances(space)?;
        }
        if destroyed {
            follow.extend(self.scrub_dead_bases());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            space = %self.full_name(space),
            structural,
            redefined,
            "derive"
        );
        Ok(follow)
    }

    /// Static spaces that list `space` among their bases.
    pub(crate) fn subs_of(&self, space: SpaceId) -> Vec<SpaceId> {
        self.spaces
            .iter()
            .filter(|(_, data)| match &data.kind {
                SpaceKind::Static {
                    bases,
                    implicit_bases,
                    ..
                } => bases.contains(&space) || implicit_bases.contains(&space),
                _ => false,
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Drop base links to spaces that no longer exist; returns the spaces
    /// that lost a base.
    pub(crate) fn scrub_dead_bases(&mut self) -> Vec<SpaceId> {
        let live: FxHashSet<SpaceId> = self.spaces.ids().collect();
        let mut touched = Vec::new();
        let ids: Vec<SpaceId> = live.iter().copied().collect();
        for id in ids {
            if let Some(SpaceData {
                kind:
                    SpaceKind::Static {
                        bases,
                        implicit_bases,
                        ..
                    },
                ..
            }) = self.spaces.get_mut(id)
            {
                let before = bases.len() + implicit_bases.len();
                bases.retain(|b| live.contains(b));
                implicit_bases.retain(|b| live.contains(b));
                if bases.len() + implicit_bases.len() != before {
                    touched.push(id);
                }
            }
        }
        touched
    }

    fn waits_on_pending(&self, space: SpaceId, pending: &FxHashSet<SpaceId>) -> bool {
        let parent_pending = self
            .spaces
            .get(space)
            .and_then(|d| d.parent)
            .is_some_and(|p| pending.contains(&p));
        parent_pending
            || self
                .effective_bases(space)
                .iter()
                .any(|b| *b != space && pending.contains(b))
    }

    /// Re-derive `starts` and everything downstream of them.
    pub(crate) fn propagate(&mut self, starts: Vec<SpaceId>) -> Result<DerivationSummary, ModelError> {
        let mut summary = DerivationSummary::default();
        let mut pending: FxHashSet<SpaceId> = FxHashSet::default();
        let mut queue: VecDeque<SpaceId> = VecDeque::new();

        let mut frontier = starts;
        while let Some(space) = frontier.pop() {
            if !self.spaces.contains(space) || !pending.insert(space) {
                continue;
            }
            queue.push_back(space);
            frontier.extend(self.subs_of(space));
        }

        // A full rotation without progress means only waiting spaces are
        // left; take the head regardless.
        let mut stalled = 0;
        while let Some(space) = queue.pop_front() {
            if !self.spaces.contains(space) {
                pending.remove(&space);
                continue;
            }
            if stalled <= queue.len() && self.waits_on_pending(space, &pending) {
                queue.push_back(space);
                stalled += 1;
                continue;
            }
            stalled = 0;
            pending.remove(&space);
            summary.spaces += 1;

            let follow = self.derive_space(space, &mut summary)?;
            for next in follow.into_iter().chain(self.subs_of(space)) {
                if pending.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            spaces = summary.spaces,
            created = summary.created,
            updated = summary.updated,
            removed = summary.removed,
            "propagate"
        );
        Ok(summary)
    }

    /// True when `space` inherits from `ancestor`, directly or not.
    fn inherits_from(&self, space: SpaceId, ancestor: SpaceId) -> bool {
        let mut seen: FxHashSet<SpaceId> = FxHashSet::default();
        let mut stack = vec![space];
        while let Some(s) = stack.pop() {
            if !seen.insert(s) {
                continue;
            }
            for b in self.effective_bases(s) {
                if b == ancestor {
                    return true;
                }
                stack.push(b);
            }
        }
        false
    }

    // ---- public surface -------------------------------------------------

    /// Append `base` to the bases of `space` and re-derive.
    ///
    /// On a conflict the base is taken back out and the model is left as it
    /// was before the call.
    pub fn add_base(&mut self, space: SpaceId, base: SpaceId) -> Result<DerivationSummary, ModelError> {
        self.require_static(space)?;
        if !self.space(base)?.is_static() {
            return Err(ModelError::InvalidArguments {
                target: self.full_name(space),
                detail: format!("{} is not a static space", self.full_name(base)),
            });
        }
        if self.bases(space)?.contains(&base) {
            return Ok(DerivationSummary::default());
        }
        if base == space
            || self.is_ancestor(base, space)
            || self.is_ancestor(space, base)
            || self.inherits_from(base, space)
        {
            return Err(ModelError::CyclicInheritance {
                space: self.full_name(space),
                base: self.full_name(base),
            });
        }

        if let SpaceKind::Static { bases, .. } = &mut self.space_mut(space)?.kind {
            bases.push(base);
        }
        match self.propagate(vec![space]) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if let SpaceKind::Static { bases, .. } = &mut self.space_mut(space)?.kind {
                    bases.retain(|b| *b != base);
                }
                self.propagate(vec![space])?;
                Err(err)
            }
        }
    }

    pub fn remove_base(&mut self, space: SpaceId, base: SpaceId) -> Result<DerivationSummary, ModelError> {
        self.require_static(space)?;
        if !self.bases(space)?.contains(&base) {
            return Err(ModelError::InvalidArguments {
                target: self.full_name(space),
                detail: format!("{} is not a base", self.full_name(base)),
            });
        }
        if let SpaceKind::Static { bases, .. } = &mut self.space_mut(space)?.kind {
            bases.retain(|b| *b != base);
        }
        self.propagate(vec![space])
    }

    /// Explicit bases, in declaration order.
    pub fn bases(&self, space: SpaceId) -> Result<Vec<SpaceId>, ModelError> {
        Ok(match &self.space(space)?.kind {
            SpaceKind::Static { bases, .. } => bases.clone(),
            _ => Vec::new(),
        })
    }

    /// Drop a local override: the cells goes back to mirroring its base.
    pub fn revert_cells(&mut self, cell: CellId) -> Result<DerivationSummary, ModelError> {
        let data = self.cell(cell)?;
        let (space, name, derived) = (data.space, data.name.clone(), data.derived);
        self.require_static(space)?;
        if derived {
            return Ok(DerivationSummary::default());
        }
        if !self.plan_derivation(space)?.cells.contains_key(&name) {
            return Err(ModelError::NameNotFound {
                name,
                scope: format!("the bases of {}", self.full_name(space)),
            });
        }
        self.cell_mut(cell)?.derived = true;
        self.propagate(vec![space])
    }
}
