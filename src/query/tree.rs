use std::any::TypeId;
use std::ops::ControlFlow;

use compact_str::CompactString;
use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::operation::{Hook, Hooks, Operation};

/// Handle of an operation inside an [`OperationTree`].
///
/// Carries the generation of its slot: once the operation is removed and
/// the slot reused, the old handle no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId {
    index: u32,
    generation: u32,
}

impl OpId {
    fn index(self) -> usize {
        self.index as usize
    }
}

/// One slot of the tree. The metadata is copied out of the operation so the
/// node can be matched while its operation is checked out for a hook call.
pub(crate) struct Node {
    op: Option<Box<dyn Operation>>,
    pub(crate) name: CompactString,
    pub(crate) kinds: SmallVec<[TypeId; 2]>,
    pub(crate) hooks: Hooks,
    parent: Option<OpId>,
    children: Vec<OpId>,
    /// The hook that was running when the operation was added
    adder: Option<Hook>,
}

impl Node {
    fn new(op: Box<dyn Operation>) -> Self {
        Self {
            name: op.name().into(),
            kinds: op.kinds(),
            hooks: op.hooks(),
            op: Some(op),
            parent: None,
            children: Vec::new(),
            adder: None,
        }
    }

    pub(crate) fn op(&self) -> Option<&dyn Operation> {
        self.op.as_deref()
    }

    pub(crate) fn adder(&self) -> Option<Hook> {
        self.adder
    }
}

/// Arena of operations. The builder's root operations are kept in order,
/// operations added from inside a hook hang under the operation whose hook
/// added them.
///
/// Slots of removed operations go on a free list and are handed out again
/// by [`alloc`](Self::alloc).
#[derive(Default)]
pub(crate) struct OperationTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<OpId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

impl OperationTree {
    /// Stores `op` without attaching it anywhere.
    pub fn alloc(&mut self, op: Box<dyn Operation>) -> OpId {
        let node = Some(Node::new(op));
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = node;
            return OpId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node,
        });
        OpId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: OpId) -> Option<&Slot> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn node(&self, id: OpId) -> Option<&Node> {
        self.slot(id)?.node.as_ref()
    }

    fn node_mut(&mut self, id: OpId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)?
            .node
            .as_mut()
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: OpId) -> Option<&dyn Operation> {
        self.node(id)?.op()
    }

    pub fn get_mut(&mut self, id: OpId) -> Option<&mut dyn Operation> {
        let node = self.node_mut(id)?;
        Some(node.op.as_deref_mut()?)
    }

    /// `true` when the node exists, implements `hook` and is not checked out.
    pub fn is_callable(&self, id: OpId, hook: Hook) -> bool {
        self.node(id)
            .is_some_and(|node| node.op.is_some() && node.hooks.contains(hook.flag()))
    }

    /// Takes the operation out of its slot for a hook call.
    pub fn checkout(&mut self, id: OpId) -> Option<Box<dyn Operation>> {
        self.node_mut(id)?.op.take()
    }

    /// Puts a checked out operation back. Dropped when the node was removed
    /// in the meantime.
    pub fn checkin(&mut self, id: OpId, op: Box<dyn Operation>) {
        if let Some(node) = self.node_mut(id) {
            node.op = Some(op);
        }
    }

    pub fn roots(&self) -> &[OpId] {
        &self.roots
    }

    pub fn children(&self, id: OpId) -> &[OpId] {
        self.node(id).map_or(&[], |node| &node.children)
    }

    pub fn parent(&self, id: OpId) -> Option<OpId> {
        self.node(id)?.parent
    }

    pub fn push_root(&mut self, id: OpId) {
        self.roots.push(id);
    }

    pub fn unshift_root(&mut self, id: OpId) {
        self.roots.insert(0, id);
    }

    pub fn attach(&mut self, parent: OpId, hook: Hook, id: OpId) {
        if let Some(node) = self.node_mut(id) {
            node.parent = Some(parent);
            node.adder = Some(hook);
        }
        if let Some(parent) = self.node_mut(parent) {
            parent.children.push(id);
        }
    }

    /// Detaches `id` and frees it together with its descendants.
    pub fn remove(&mut self, id: OpId) {
        match self.parent(id) {
            Some(parent) => {
                if let Some(parent) = self.node_mut(parent) {
                    parent.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        self.free(id);
    }

    fn free(&mut self, id: OpId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        for child in node.children {
            self.free(child);
        }
    }

    /// Puts `op` where `id` was. The new operation keeps the parent and the
    /// adder hook of the old one; the old subtree is freed.
    pub fn replace(&mut self, id: OpId, op: Box<dyn Operation>) -> OpId {
        let new_id = self.alloc(op);
        let (parent, adder) = match self.node(id) {
            Some(old) => (old.parent, old.adder),
            None => return new_id,
        };

        if let Some(node) = self.node_mut(new_id) {
            node.parent = parent;
            node.adder = adder;
        }
        match parent {
            Some(parent) => {
                if let Some(parent) = self.node_mut(parent) {
                    swap_id(&mut parent.children, id, new_id);
                }
            }
            None => swap_id(&mut self.roots, id, new_id),
        }

        self.free(id);
        new_id
    }

    /// Removes the children of `id` that were added by `hook`.
    pub fn remove_children_added_by(&mut self, id: OpId, hook: Hook) {
        let added: Vec<OpId> = self
            .children(id)
            .iter()
            .copied()
            .filter(|c| self.node(*c).is_some_and(|n| n.adder == Some(hook)))
            .collect();
        for child in added {
            self.remove(child);
        }
    }

    pub fn is_ancestor_in_set(&self, id: OpId, set: &HashSet<OpId>) -> bool {
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            if set.contains(&ancestor) {
                return true;
            }
            current = self.parent(ancestor);
        }
        false
    }

    /// Visits the nodes depth first, each node before its children.
    pub fn walk(&self, f: &mut dyn FnMut(OpId, &Node) -> ControlFlow<()>) {
        let mut stack: Vec<OpId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if f(id, node).is_break() {
                return;
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    pub fn pre_order(&self) -> Vec<OpId> {
        let mut ids = Vec::new();
        self.walk(&mut |id, _| {
            ids.push(id);
            ControlFlow::Continue(())
        });
        ids
    }

    /// Deep copy. A checked out operation has no value to copy; `current`
    /// supplies it.
    pub fn deep_clone(&self, current: Option<(OpId, &dyn Operation)>) -> Self {
        let slots = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| Slot {
                generation: slot.generation,
                node: slot.node.as_ref().map(|node| {
                    let this = OpId {
                        index: index as u32,
                        generation: slot.generation,
                    };
                    let op = match (&node.op, current) {
                        (Some(op), _) => Some(op.clone_op()),
                        (None, Some((id, op))) if id == this => Some(op.clone_op()),
                        (None, _) => None,
                    };
                    Node {
                        op,
                        name: node.name.clone(),
                        kinds: node.kinds.clone(),
                        hooks: node.hooks,
                        parent: node.parent,
                        children: node.children.clone(),
                        adder: node.adder,
                    }
                }),
            })
            .collect();

        Self {
            slots,
            free: self.free.clone(),
            roots: self.roots.clone(),
        }
    }

    /// Copies the subtree at `id` of `other` into this tree as a new root.
    /// The copy forgets its parent and adder hook.
    pub fn copy_root_from(&mut self, other: &OperationTree, id: OpId) {
        if let Some(copy) = self.copy_subtree(other, id) {
            self.roots.push(copy);
        }
    }

    fn copy_subtree(&mut self, other: &OperationTree, id: OpId) -> Option<OpId> {
        let source = other.node(id)?;
        let op = source.op()?.clone_op();
        let copy = self.alloc(op);
        for child in &source.children {
            if let Some(child_copy) = self.copy_subtree(other, *child) {
                if let Some(node) = self.node_mut(child_copy) {
                    node.parent = Some(copy);
                    node.adder = other.node(*child).and_then(|n| n.adder);
                }
                if let Some(node) = self.node_mut(copy) {
                    node.children.push(child_copy);
                }
            }
        }
        Some(copy)
    }
}

fn swap_id(ids: &mut [OpId], old: OpId, new: OpId) {
    if let Some(slot) = ids.iter_mut().find(|s| **s == old) {
        *slot = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::KnexOperation;

    fn op(name: &str) -> Box<dyn Operation> {
        Box::new(KnexOperation::new(name))
    }

    fn names(tree: &OperationTree) -> Vec<String> {
        tree.pre_order()
            .into_iter()
            .filter_map(|id| tree.node(id).map(|n| n.name.to_string()))
            .collect()
    }

    #[test]
    fn children_follow_their_parent() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);
        let b = tree.alloc(op("b"));
        tree.push_root(b);
        let c = tree.alloc(op("c"));
        tree.attach(a, Hook::OnBuild, c);
        let z = tree.alloc(op("z"));
        tree.unshift_root(z);

        assert_eq!(names(&tree), ["z", "a", "c", "b"]);
        assert_eq!(tree.parent(c), Some(a));
        assert_eq!(tree.node(c).and_then(Node::adder), Some(Hook::OnBuild));
    }

    #[test]
    fn removing_frees_descendants() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);
        let c = tree.alloc(op("c"));
        tree.attach(a, Hook::OnBuild, c);
        let d = tree.alloc(op("d"));
        tree.attach(a, Hook::OnAdd, d);

        tree.remove_children_added_by(a, Hook::OnBuild);
        assert!(!tree.contains(c));
        assert_eq!(names(&tree), ["a", "d"]);

        tree.remove(a);
        assert!(!tree.contains(d));
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn replace_keeps_position_and_adder() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);
        let b = tree.alloc(op("b"));
        tree.attach(a, Hook::OnBefore1, b);
        let e = tree.alloc(op("e"));
        tree.attach(a, Hook::OnBefore1, e);

        let x = tree.replace(b, op("x"));
        assert_eq!(names(&tree), ["a", "x", "e"]);
        assert_eq!(tree.node(x).and_then(Node::adder), Some(Hook::OnBefore1));
        assert!(!tree.contains(b));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);
        for _ in 0..100 {
            let added = tree.alloc(op("tmp"));
            tree.attach(a, Hook::OnBuild, added);
            tree.remove_children_added_by(a, Hook::OnBuild);
        }
        assert_eq!(tree.slots.len(), 2);

        let b = tree.alloc(op("b"));
        tree.remove(b);
        let c = tree.alloc(op("c"));
        assert_eq!(b.index, c.index);
        assert!(!tree.contains(b));
        assert_eq!(tree.node(c).map(|n| n.name.as_str()), Some("c"));
    }

    #[test]
    fn stale_handles_do_not_touch_the_new_occupant() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);

        let taken = tree.checkout(a).unwrap();
        tree.remove(a);
        let b = tree.alloc(op("b"));
        tree.push_root(b);

        tree.checkin(a, taken);
        assert_eq!(tree.get(b).map(|op| op.name().to_string()), Some("b".to_string()));
        tree.remove(a);
        assert_eq!(names(&tree), ["b"]);
    }

    #[test]
    fn checked_out_nodes_keep_their_metadata() {
        let mut tree = OperationTree::default();
        let a = tree.alloc(op("a"));
        tree.push_root(a);

        let taken = tree.checkout(a).unwrap();
        assert!(tree.get(a).is_none());
        assert_eq!(tree.node(a).map(|n| n.name.as_str()), Some("a"));

        let copy = tree.deep_clone(Some((a, taken.as_ref())));
        assert!(copy.get(a).is_some());

        tree.checkin(a, taken);
        assert!(tree.get(a).is_some());
    }
}
