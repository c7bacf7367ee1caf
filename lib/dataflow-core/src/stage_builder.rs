use std::collections::VecDeque;

use dataflow_common::WorkerRank;
use dataflow_profiler::{DiaId as ProfileDiaId, StageBuilderEvent};

use crate::node::{DiaNode, NodeKind, NodeState};

/// Reverse-BFS over parent edges starting at `root`, collecting every stage
/// that must run before `root` can produce a result (spec §4.6).
///
/// Grounded line for line in `original_source/thrill/core/stage_builder.hpp`'s
/// `FindStages`: a node with more than one child is deliberately appended
/// once per incoming edge rather than deduplicated. That duplication is
/// what lets a shared ancestor's `consume_on_push` refcount actually reach
/// zero later in `run_scope` — each appearance gives it one more chance to
/// be revisited and pushed again once it is no longer `New`.
pub fn find_stages(root: &DiaNode) -> Vec<DiaNode> {
    let mut stages = vec![root.clone()];
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(n) = queue.pop_front() {
        for parent in n.parents() {
            stages.push(parent.clone());
            if parent.state() != NodeState::Executed || parent.kind() == NodeKind::Collapse {
                queue.push_back(parent.clone());
            }
        }
    }
    stages
}

/// Executes every stage needed to produce `root`'s result, in reverse
/// discovery order (the most distant ancestors — the actual data sources —
/// run first), matching `RunScope` in the original. `worker_rank` identifies
/// which worker on this host is driving the scope, for the `StageBuilder`
/// profile event class.
pub fn run_scope(root: &DiaNode, worker_rank: WorkerRank) -> Result<(), dataflow_common::Error> {
    let mut stages = find_stages(root);
    stages.reverse();

    for stage in &stages {
        let recorder = stage.recorder();
        let profile_id = ProfileDiaId::from(stage.id().0);
        match stage.state() {
            NodeState::New => {
                recorder.record_stage_builder(StageBuilderEvent::ExecuteStart, worker_rank, profile_id, stage.label());
                stage.execute()?;
                recorder.record_stage_builder(StageBuilderEvent::ExecuteEnd, worker_rank, profile_id, stage.label());

                recorder.record_stage_builder(StageBuilderEvent::PushdataStart, worker_rank, profile_id, stage.label());
                stage.push_data()?;
                recorder.record_stage_builder(StageBuilderEvent::PushdataEnd, worker_rank, profile_id, stage.label());
                stage.unregister_childs();
            }
            NodeState::Executed => {
                let needs_push = stage
                    .children()
                    .iter()
                    .any(|child| child.state() != NodeState::Executed || child.kind() == NodeKind::Collapse);
                if needs_push {
                    recorder.record_stage_builder(StageBuilderEvent::PushdataStart, worker_rank, profile_id, stage.label());
                    stage.push_data()?;
                    recorder.record_stage_builder(StageBuilderEvent::PushdataEnd, worker_rank, profile_id, stage.label());
                    stage.unregister_childs();
                }
            }
            NodeState::Disposed => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dia_id::DiaIdAllocator;
    use crate::node::Operator;
    use dataflow_common::HostRank;
    use dataflow_profiler::ProfileRecorder;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn test_recorder() -> Arc<ProfileRecorder> {
        Arc::new(ProfileRecorder::new(HostRank(0), None))
    }

    #[derive(Debug)]
    struct TraceOp {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Operator for TraceOp {
        fn execute(&self) -> Result<(), dataflow_common::Error> {
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    fn node(
        ids: &DiaIdAllocator,
        name: &'static str,
        kind: NodeKind,
        parents: Vec<DiaNode>,
        log: &Rc<RefCell<Vec<&'static str>>>,
        recorder: &Arc<ProfileRecorder>,
    ) -> DiaNode {
        DiaNode::new(ids.allocate(), name, kind, Box::new(TraceOp { name, log: log.clone() }), parents, recorder.clone())
    }

    /// source -> map -> action: a straight-line pipeline executes its
    /// source before its consumers.
    #[test]
    fn executes_ancestors_before_descendants() {
        let ids = DiaIdAllocator::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = test_recorder();
        let source = node(&ids, "source", NodeKind::DOp, vec![], &log, &recorder);
        let mapped = node(&ids, "map", NodeKind::LOp, vec![source.clone()], &log, &recorder);
        let action = node(&ids, "action", NodeKind::Action, vec![mapped.clone()], &log, &recorder);

        run_scope(&action, WorkerRank(0)).unwrap();

        assert_eq!(*log.borrow(), vec!["source", "map", "action"]);
        assert_eq!(source.state(), NodeState::Disposed);
        assert_eq!(mapped.state(), NodeState::Disposed);
        assert_eq!(action.state(), NodeState::Disposed);
    }

    /// A shared ancestor feeding two branches is only executed once, and
    /// disposed only once both branches have pushed from it.
    #[test]
    fn shared_ancestor_executes_once_and_disposes_after_both_branches() {
        let ids = DiaIdAllocator::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = test_recorder();
        let source = node(&ids, "source", NodeKind::DOp, vec![], &log, &recorder);
        let left = node(&ids, "left", NodeKind::LOp, vec![source.clone()], &log, &recorder);
        let right = node(&ids, "right", NodeKind::LOp, vec![source.clone()], &log, &recorder);
        let join = node(&ids, "join", NodeKind::Action, vec![left.clone(), right.clone()], &log, &recorder);

        run_scope(&join, WorkerRank(0)).unwrap();

        assert_eq!(log.borrow().iter().filter(|e| **e == "source").count(), 1);
        assert_eq!(source.state(), NodeState::Disposed);
    }

    /// A node with two children appears once per incoming edge, matching
    /// the original planner's behavior exactly (see `find_stages`'s doc
    /// comment for why that duplication matters).
    #[test]
    fn find_stages_lists_shared_ancestor_once_per_child_edge() {
        let ids = DiaIdAllocator::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = test_recorder();
        let source = node(&ids, "source", NodeKind::DOp, vec![], &log, &recorder);
        let left = node(&ids, "left", NodeKind::LOp, vec![source.clone()], &log, &recorder);
        let right = node(&ids, "right", NodeKind::LOp, vec![source.clone()], &log, &recorder);
        let join = node(&ids, "join", NodeKind::Action, vec![left, right], &log, &recorder);

        let stages = find_stages(&join);
        assert_eq!(stages.len(), 5);
        assert_eq!(stages.iter().filter(|n| n.label() == "source").count(), 2);
    }
}
