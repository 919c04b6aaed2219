use std::collections::VecDeque;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, BagUnpackError, PackableBag, UnpackableBag,
    require_supported_stuff_version,
};
use crate::components::layers::LayerUid;
use crate::error::IllegalArgument;
use crate::graphics::action::{GraphicsAction, GraphicsActionPair};

/// Upper bound on kept steps unless the caller asks for another one.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

// ============================================================================
// HISTORY ACTION
// ============================================================================

/// One replayable unit inside a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryAction {
    /// Select the layer the user paints on.
    CurrentLayer(LayerUid),
    Graphics(GraphicsAction),
}

impl HistoryAction {
    const TYPE_CURRENT_LAYER: i32 = 1;
    // 2 and 4 belonged to selection state and selection transform.
    const TYPE_GRAPHICS: i32 = 3;

    pub fn type_id(&self) -> i32 {
        match self {
            HistoryAction::CurrentLayer(_) => Self::TYPE_CURRENT_LAYER,
            HistoryAction::Graphics(_) => Self::TYPE_GRAPHICS,
        }
    }
}

impl BagStuffPacker for HistoryAction {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.type_id());
        bag.put_stuff_with(1, |bag| match self {
            HistoryAction::CurrentLayer(uid) => bag.put_string(uid.as_str()),
            HistoryAction::Graphics(action) => bag.put_stuff(action),
        });
    }
}

impl BagStuffUnpacker for HistoryAction {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("HistoryAction", 1, version)?;

        let ty = bag.get_int()?;
        bag.get_stuff_with(|version, bag| {
            require_supported_stuff_version("HistoryAction", 1, version)?;

            match ty {
                Self::TYPE_CURRENT_LAYER => Ok(HistoryAction::CurrentLayer(LayerUid(bag.get_string()?))),
                Self::TYPE_GRAPHICS => Ok(HistoryAction::Graphics(bag.get_stuff()?)),
                _ => Err(BagUnpackError::UnknownPolymorphicType { kind: "HistoryAction", ty }),
            }
        })
    }
}

// ============================================================================
// HISTORY STEP
// ============================================================================

/// Everything one user edit did, and how to take it back.
/// `undo_actions` are listed in the order they must run.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct HistoryStep {
    pub actions: Vec<HistoryAction>,
    pub undo_actions: Vec<HistoryAction>,
}

impl HistoryStep {
    pub fn new(actions: Vec<HistoryAction>, undo_actions: Vec<HistoryAction>) -> Self {
        Self { actions, undo_actions }
    }

    pub fn from_pair(pair: GraphicsActionPair) -> Self {
        Self::new(vec![HistoryAction::Graphics(pair.action)], vec![HistoryAction::Graphics(pair.undo_action)])
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.undo_actions.is_empty()
    }

    /// Fold `inner` into this step: its actions run after ours, and its undo
    /// actions run before ours.
    pub fn merge(self, inner: HistoryStep) -> HistoryStep {
        let mut actions = self.actions;
        actions.extend(inner.actions);

        let mut undo_actions = inner.undo_actions;
        undo_actions.extend(self.undo_actions);

        HistoryStep { actions, undo_actions }
    }
}

impl BagStuffPacker for HistoryStep {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_list(&self.actions, |bag, action| bag.put_stuff(action));
        bag.put_list(&self.undo_actions, |bag, action| bag.put_stuff(action));
    }
}

impl BagStuffUnpacker for HistoryStep {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("HistoryStep", 1, version)?;

        let actions = bag.get_list(|bag| bag.get_stuff())?;
        let undo_actions = bag.get_list(|bag| bag.get_stuff())?;
        Ok(HistoryStep { actions, undo_actions })
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// Undo and redo stacks. The most recent step sits at the back of each stack.
#[derive(Clone, Debug)]
pub struct History {
    undo_stack: VecDeque<HistoryStep>,
    redo_stack: VecDeque<HistoryStep>,
    max_steps: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl History {
    pub fn new(max_steps: usize) -> Self {
        Self { undo_stack: VecDeque::new(), redo_stack: VecDeque::new(), max_steps: max_steps.max(1) }
    }

    /// Rebuild from chronological steps where the first `position` are undoable.
    pub fn from_steps(steps: Vec<HistoryStep>, position: usize, max_steps: usize) -> Self {
        let mut history = Self::new(max_steps);
        let position = position.min(steps.len());

        let mut steps = steps.into_iter();
        history.undo_stack.extend(steps.by_ref().take(position));
        history.redo_stack.extend(steps.rev());

        history.prune();
        history
    }

    /// Push a new step. Drops anything that could have been redone.
    /// Returns `false` for an empty step, which is not kept.
    pub fn record(&mut self, step: HistoryStep) -> bool {
        if step.is_empty() {
            return false;
        }

        self.redo_stack.clear();
        self.undo_stack.push_back(step);

        self.prune();
        true
    }

    /// Run the undo actions of the latest step through `apply`.
    pub fn undo(&mut self, mut apply: impl FnMut(&HistoryAction)) -> bool {
        match self.undo_stack.pop_back() {
            Some(step) => {
                step.undo_actions.iter().for_each(&mut apply);
                self.redo_stack.push_back(step);
                true
            }
            None => false,
        }
    }

    /// Replay the actions of the latest undone step through `apply`.
    pub fn redo(&mut self, mut apply: impl FnMut(&HistoryAction)) -> bool {
        match self.redo_stack.pop_back() {
            Some(step) => {
                step.actions.iter().for_each(&mut apply);
                self.undo_stack.push_back(step);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len() + self.redo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Number of undoable steps; the index of the next redo in [`History::steps`].
    pub fn position(&self) -> usize {
        self.undo_stack.len()
    }

    /// All steps, oldest first.
    pub fn steps(&self) -> impl Iterator<Item = &HistoryStep> {
        self.undo_stack.iter().chain(self.redo_stack.iter().rev())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Write the steps and the position, keeping at most `limit` steps.
    /// Oldest steps go first; redo steps go too when the position would fall
    /// before the kept window. A negative limit keeps everything.
    pub fn pack_limited(&self, bag: &mut PackableBag, limit: i32) {
        let steps: Vec<&HistoryStep> = self.steps().collect();
        let (kept, position) = limit_steps(&steps, self.position(), limit);

        bag.put_list(kept, |bag, step| bag.put_stuff(*step));
        bag.put_int(position as i32);
    }

    /// Read what [`History::pack_limited`] wrote.
    pub fn unpack(bag: &mut UnpackableBag, max_steps: usize) -> BagResult<Self> {
        let steps: Vec<HistoryStep> = bag.get_list(|bag| bag.get_stuff())?;
        let position = bag.get_int()?;

        if position < 0 || position as usize > steps.len() {
            return Err(IllegalArgument(format!(
                "History position={} is outside 0..={}",
                position,
                steps.len()
            ))
            .into());
        }

        Ok(Self::from_steps(steps, position as usize, max_steps))
    }

    fn prune(&mut self) {
        while self.len() > self.max_steps {
            if self.undo_stack.pop_front().is_none() {
                self.redo_stack.pop_back();
            }
        }
    }
}

fn limit_steps<'a, T>(steps: &'a [T], position: usize, limit: i32) -> (&'a [T], usize) {
    if limit < 0 || steps.len() <= limit as usize {
        return (steps, position);
    }
    if limit == 0 {
        return (&steps[..0], 0);
    }

    // The newest window holding the position, so redo still chains from the current state.
    let start = (steps.len() - limit as usize).min(position);
    (&steps[start..start + limit as usize], position - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagFormat, pack_stuff, unpack_stuff};
    use crate::cell::SciiColor;

    fn border(value: i32) -> HistoryAction {
        HistoryAction::Graphics(GraphicsAction::SetBackgroundBorder { color: SciiColor(value) })
    }

    fn step(forward: i32, backward: i32) -> HistoryStep {
        HistoryStep::new(vec![border(forward)], vec![border(backward)])
    }

    fn chronological(history: &History) -> Vec<HistoryStep> {
        history.steps().cloned().collect()
    }

    #[test]
    fn merge_runs_inner_last_and_undoes_it_first() {
        let outer = HistoryStep::new(vec![border(1), border(2)], vec![border(-1), border(-2)]);
        let merged = outer.merge(step(3, -3));

        assert_eq!(merged.actions, vec![border(1), border(2), border(3)]);
        assert_eq!(merged.undo_actions, vec![border(-3), border(-1), border(-2)]);
    }

    #[test]
    fn undo_and_redo_walk_the_stacks() {
        let mut history = History::default();
        assert!(history.record(step(1, 0)));
        assert!(history.record(step(2, 1)));

        let mut applied = Vec::new();
        assert!(history.undo(|action| applied.push(action.clone())));
        assert!(history.undo(|action| applied.push(action.clone())));
        assert!(!history.undo(|_| panic!("nothing left to undo")));
        assert_eq!(applied, vec![border(1), border(0)]);

        applied.clear();
        assert!(history.redo(|action| applied.push(action.clone())));
        assert_eq!(applied, vec![border(1)]);
        assert_eq!((history.undo_count(), history.redo_count()), (1, 1));
    }

    #[test]
    fn recording_drops_the_redo_branch() {
        let mut history = History::default();
        history.record(step(1, 0));
        history.record(step(2, 1));
        history.undo(|_| {});

        history.record(step(3, 1));
        assert!(!history.can_redo());
        assert_eq!(chronological(&history), vec![step(1, 0), step(3, 1)]);
    }

    #[test]
    fn empty_steps_are_ignored() {
        let mut history = History::default();
        history.record(step(1, 0));
        history.undo(|_| {});

        assert!(!history.record(HistoryStep::default()));
        assert!(history.can_redo());
    }

    #[test]
    fn oldest_steps_fall_off() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.record(step(i, i - 1));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(chronological(&history)[0], step(2, 1));
    }

    #[test]
    fn steps_are_chronological_around_the_position() {
        let mut history = History::default();
        for i in 0..4 {
            history.record(step(i, i - 1));
        }
        history.undo(|_| {});
        history.undo(|_| {});

        assert_eq!(history.position(), 2);
        let steps = chronological(&history);
        assert_eq!(steps, (0..4).map(|i| step(i, i - 1)).collect::<Vec<_>>());

        let rebuilt = History::from_steps(steps.clone(), 2, DEFAULT_MAX_STEPS);
        assert_eq!(chronological(&rebuilt), steps);
        assert_eq!((rebuilt.undo_count(), rebuilt.redo_count()), (2, 2));
    }

    #[test]
    fn limiting_keeps_the_newest_steps() {
        let steps = [10, 11, 12, 13, 14];

        assert_eq!(limit_steps(&steps, 3, -1), (&steps[..], 3));
        assert_eq!(limit_steps(&steps, 3, 5), (&steps[..], 3));
        assert_eq!(limit_steps(&steps, 3, 0), (&[][..], 0));
        assert_eq!(limit_steps(&steps, 3, 2), (&steps[3..], 0));
        assert_eq!(limit_steps(&steps, 4, 3), (&steps[2..], 2));
    }

    #[test]
    fn limiting_never_skips_past_the_position() {
        let steps = [10, 11, 12, 13, 14];

        assert_eq!(limit_steps(&steps, 1, 2), (&steps[1..3], 0));
        assert_eq!(limit_steps(&steps, 0, 3), (&steps[..3], 0));
        assert_eq!(limit_steps(&steps, 2, 3), (&steps[2..], 0));
    }

    #[test]
    fn limited_history_redoes_from_the_current_state() {
        let mut history = History::default();
        for i in 0..4 {
            history.record(step(i + 1, i));
        }
        for _ in 0..3 {
            history.undo(|_| {});
        }

        let mut bag = PackableBag::new();
        history.pack_limited(&mut bag, 2);
        let mut bag = UnpackableBag::new(&bag.into_string()).unwrap();
        let restored = History::unpack(&mut bag, 10).unwrap();

        assert_eq!((restored.undo_count(), restored.redo_count()), (0, 2));
        assert_eq!(chronological(&restored), vec![step(2, 1), step(3, 2)]);
    }

    #[test]
    fn packed_history_reloads_with_its_position() {
        let mut history = History::default();
        for i in 0..3 {
            history.record(step(i, i - 1));
        }
        history.undo(|_| {});

        for format in [BagFormat::Legacy, BagFormat::Bitstream] {
            let mut bag = PackableBag::with_format(format);
            history.pack_limited(&mut bag, 2);
            let packed = bag.into_string();

            let mut bag = UnpackableBag::new(&packed).unwrap();
            let restored = History::unpack(&mut bag, DEFAULT_MAX_STEPS).unwrap();
            assert_eq!(chronological(&restored), vec![step(1, 0), step(2, 1)]);
            assert_eq!(restored.position(), 1);
        }
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let mut bag = PackableBag::new();
        bag.put_list(&[step(1, 0)], |bag, step| bag.put_stuff(step));
        bag.put_int(2);
        let packed = bag.into_string();

        let mut bag = UnpackableBag::new(&packed).unwrap();
        assert!(matches!(History::unpack(&mut bag, DEFAULT_MAX_STEPS), Err(BagUnpackError::IllegalArgument(_))));
    }

    #[test]
    fn steps_survive_the_bag() {
        let step = HistoryStep::new(
            vec![border(2), HistoryAction::CurrentLayer(LayerUid::new("layer-1"))],
            vec![HistoryAction::CurrentLayer(LayerUid::background()), border(1)],
        );

        for format in [BagFormat::Legacy, BagFormat::Bitstream] {
            assert_eq!(unpack_stuff::<HistoryStep>(&pack_stuff(&step, format)).unwrap(), step);
        }
    }

    #[test]
    fn reserved_action_types_do_not_load() {
        for ty in [2, 4, 9] {
            let mut bag = PackableBag::new();
            bag.put_stuff_with(1, |bag| {
                bag.put_int(ty);
                bag.put_stuff_with(1, |bag| bag.put_string("x"));
            });

            let result = unpack_stuff::<HistoryAction>(&bag.into_string());
            assert_eq!(result, Err(BagUnpackError::UnknownPolymorphicType { kind: "HistoryAction", ty }));
        }
    }
}
