use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use dataflow_profiler::{DiaBaseEvent, DiaId as ProfileDiaId, ProfileRecorder};

use crate::dia_id::DiaId;

/// The four operator flavors the planner distinguishes (spec §4.5 / Design
/// Notes §9's "tagged variant" resolution of the original's polymorphic
/// `DIABase` hierarchy).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeKind {
    /// Composes into a child's function stack; never materializes on its
    /// own (e.g. a per-item map or filter).
    LOp,
    /// Materializes its output to a file and may open streams to do so
    /// (e.g. sort, reduce-by-key).
    DOp,
    /// Triggers execution of its whole scope; has no children.
    Action,
    /// A transparent pass-through that erases type parameters at a join
    /// point. Carries no state: its `push_data` re-invokes its parent every
    /// time, even after the parent itself is `Executed`.
    Collapse,
}

/// Where a node sits in its own lifecycle (spec §4.5):
/// `New -> Executed -> Disposed`, with `push_data` re-enterable from
/// `Executed` as many times as it has live children.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeState {
    New,
    Executed,
    Disposed,
}

/// The behavior a concrete operator (Map, Sort, ReduceByKey, ...) plugs in
/// underneath the shared node bookkeeping. `dataflow-core` only ever calls
/// these three methods; it has no notion of what a Map or a Sort actually
/// does (spec §1 keeps the collection operator surface itself out of
/// scope).
pub trait Operator: fmt::Debug {
    fn execute(&self) -> Result<(), dataflow_common::Error> {
        Ok(())
    }

    fn push_data(&self) -> Result<(), dataflow_common::Error> {
        Ok(())
    }

    /// Frees whatever `execute` materialized. Called once the node's
    /// `consume_on_push` refcount reaches zero.
    fn dispose(&self) {}
}

struct Inner {
    id: DiaId,
    label: String,
    kind: NodeKind,
    state: Cell<NodeState>,
    /// Owning: a node needs its parents' materialized output to exist for
    /// as long as it might still call back into them (spec §9 "Cyclic
    /// references between parent and child operators").
    parents: Vec<DiaNode>,
    /// Weak back-references used only for planner traversal; never kept
    /// alive by them alone.
    children: RefCell<Vec<Weak<Inner>>>,
    consume_on_push: Cell<bool>,
    /// Number of outstanding consumers (children plus any `keep()` extra)
    /// that must each call `push_data` once before this node's output can
    /// be disposed.
    pending_consumers: Cell<u32>,
    operator: Box<dyn Operator>,
    recorder: Arc<ProfileRecorder>,
}

/// A handle to one operator in the DAG. Cloning is cheap (`Rc` clone) and
/// all clones refer to the same underlying node.
#[derive(Clone)]
pub struct DiaNode(Rc<Inner>);

impl DiaNode {
    pub fn new(
        id: DiaId,
        label: impl Into<String>,
        kind: NodeKind,
        operator: Box<dyn Operator>,
        parents: Vec<DiaNode>,
        recorder: Arc<ProfileRecorder>,
    ) -> Self {
        let label = label.into();
        let parent_ids: Vec<ProfileDiaId> = parents.iter().map(|p| ProfileDiaId::from(p.id().0)).collect();
        let node = DiaNode(Rc::new(Inner {
            id,
            label: label.clone(),
            kind,
            state: Cell::new(NodeState::New),
            parents: parents.clone(),
            children: RefCell::new(Vec::new()),
            consume_on_push: Cell::new(true),
            pending_consumers: Cell::new(0),
            operator,
            recorder,
        }));
        for parent in &parents {
            parent.0.children.borrow_mut().push(Rc::downgrade(&node.0));
            parent.add_pending_consumer();
        }
        node.0.recorder.record_dia_base(
            DiaBaseEvent::Create,
            ProfileDiaId::from(id.0),
            label,
            format!("{kind:?}"),
            parent_ids,
        );
        node
    }

    pub(crate) fn recorder(&self) -> &Arc<ProfileRecorder> {
        &self.0.recorder
    }

    fn add_pending_consumer(&self) {
        self.0.pending_consumers.set(self.0.pending_consumers.get() + 1);
    }

    /// Allows `n` additional pushes beyond what child registration already
    /// accounts for — the user explicitly holding on to a handle past its
    /// natural consumers (spec §4.5 "consume_on_push").
    pub fn keep(&self, n: u32) {
        self.0.pending_consumers.set(self.0.pending_consumers.get() + n);
    }

    pub fn disable_consume_on_push(&self) {
        self.0.consume_on_push.set(false);
    }

    pub fn id(&self) -> DiaId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn state(&self) -> NodeState {
        self.0.state.get()
    }

    pub fn parents(&self) -> &[DiaNode] {
        &self.0.parents
    }

    pub fn children(&self) -> Vec<DiaNode> {
        self.0
            .children
            .borrow()
            .iter()
            .filter_map(|weak| weak.upgrade().map(DiaNode))
            .collect()
    }

    #[instrument(skip(self), fields(id = %self.id(), label = %self.label()), level = "debug")]
    pub fn execute(&self) -> Result<(), dataflow_common::Error> {
        self.0.operator.execute()?;
        self.0.state.set(NodeState::Executed);
        Ok(())
    }

    /// Pushes this node's output downstream, then — if `consume_on_push` is
    /// enabled and every expected consumer has now pulled — disposes the
    /// materialized output (spec §4.5).
    #[instrument(skip(self), fields(id = %self.id(), label = %self.label()), level = "debug")]
    pub fn push_data(&self) -> Result<(), dataflow_common::Error> {
        let profile_id = ProfileDiaId::from(self.id().0);
        self.0.recorder.record_dia_base(DiaBaseEvent::PushdataStart, profile_id, self.label(), format!("{:?}", self.kind()), Vec::new());
        self.0.operator.push_data()?;
        if self.0.consume_on_push.get() {
            let remaining = self.0.pending_consumers.get().saturating_sub(1);
            self.0.pending_consumers.set(remaining);
            if remaining == 0 && self.0.state.get() != NodeState::Disposed {
                self.0.operator.dispose();
                self.0.state.set(NodeState::Disposed);
                self.0.recorder.record_dia_base(DiaBaseEvent::Dispose, profile_id, self.label(), format!("{:?}", self.kind()), Vec::new());
            }
        }
        self.0.recorder.record_dia_base(DiaBaseEvent::PushdataEnd, profile_id, self.label(), format!("{:?}", self.kind()), Vec::new());
        Ok(())
    }

    /// Severs this node's forward (parent -> child) bookkeeping edges, but
    /// only once the node is actually `Disposed`. A multi-child ancestor's
    /// duplicate stage-list entries (one per incoming edge, see
    /// `find_stages`) each call `push_data` in turn; `run_scope`'s
    /// `Executed` branch decides whether a later duplicate still owes a
    /// push by reading `children()`, so clearing it on an earlier,
    /// not-yet-fully-consumed visit would make every subsequent visit look
    /// like it needs no push and permanently strand `pending_consumers`
    /// above zero (spec §4.6).
    pub fn unregister_childs(&self) {
        if self.0.state.get() == NodeState::Disposed {
            self.0.children.borrow_mut().clear();
        }
    }
}

impl PartialEq for DiaNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DiaNode {}

impl std::hash::Hash for DiaNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DiaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiaNode")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("kind", &self.0.kind)
            .field("state", &self.0.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dia_id::DiaIdAllocator;
    use dataflow_common::HostRank;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    fn test_recorder() -> Arc<ProfileRecorder> {
        Arc::new(ProfileRecorder::new(HostRank(0), None))
    }

    #[derive(Debug)]
    struct RecordingOp {
        log: StdRc<StdRefCell<Vec<&'static str>>>,
    }

    impl Operator for RecordingOp {
        fn execute(&self) -> Result<(), dataflow_common::Error> {
            self.log.borrow_mut().push("execute");
            Ok(())
        }
        fn push_data(&self) -> Result<(), dataflow_common::Error> {
            self.log.borrow_mut().push("push_data");
            Ok(())
        }
        fn dispose(&self) {
            self.log.borrow_mut().push("dispose");
        }
    }

    #[test]
    fn disposes_only_after_every_child_has_pushed() {
        let ids = DiaIdAllocator::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let recorder = test_recorder();
        let parent = DiaNode::new(ids.allocate(), "source", NodeKind::DOp, Box::new(RecordingOp { log: log.clone() }), vec![], recorder.clone());
        let child_a = DiaNode::new(ids.allocate(), "a", NodeKind::LOp, Box::new(RecordingOp { log: log.clone() }), vec![parent.clone()], recorder.clone());
        let child_b = DiaNode::new(ids.allocate(), "b", NodeKind::LOp, Box::new(RecordingOp { log: log.clone() }), vec![parent.clone()], recorder.clone());

        parent.execute().unwrap();
        parent.push_data().unwrap();
        assert_eq!(parent.state(), NodeState::Executed);

        parent.push_data().unwrap();
        assert_eq!(parent.state(), NodeState::Disposed);
        assert_eq!(log.borrow().iter().filter(|e| **e == "dispose").count(), 1);

        drop(child_a);
        drop(child_b);
    }

    #[test]
    fn keep_requires_exactly_as_many_pushes_as_requested() {
        let ids = DiaIdAllocator::new();
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let node = DiaNode::new(ids.allocate(), "solo", NodeKind::DOp, Box::new(RecordingOp { log }), vec![], test_recorder());
        node.keep(2);
        node.execute().unwrap();
        node.push_data().unwrap();
        assert_eq!(node.state(), NodeState::Executed);
        node.push_data().unwrap();
        assert_eq!(node.state(), NodeState::Disposed);
    }
}
