//! The editable action pipeline with undo/redo and immutable snapshots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::core::{Action, Fingerprint};
use crate::utils::{FileIo, QueueError, TransformError};

/// Current preset schema version
pub const PRESET_VERSION: u32 = 1;

/// A recorded mutation. Applying an edit's inverse restores the previous state.
#[derive(Debug, Clone)]
enum Edit {
    Insert { index: usize, action: Action },
    Remove { index: usize, action: Action },
    Move { from: usize, to: usize },
    Toggle { index: usize },
    Replace { index: usize, before: Action, after: Action },
}

impl Edit {
    fn inverse(&self) -> Edit {
        match self {
            Edit::Insert { index, action } => Edit::Remove { index: *index, action: action.clone() },
            Edit::Remove { index, action } => Edit::Insert { index: *index, action: action.clone() },
            Edit::Move { from, to } => Edit::Move { from: *to, to: *from },
            Edit::Toggle { index } => Edit::Toggle { index: *index },
            Edit::Replace { index, before, after } => Edit::Replace {
                index: *index,
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    /// Applies an edit that has already been bounds-checked
    fn apply(&self, actions: &mut Vec<Action>) {
        match self {
            Edit::Insert { index, action } => actions.insert(*index, action.clone()),
            Edit::Remove { index, .. } => {
                actions.remove(*index);
            }
            Edit::Move { from, to } => {
                let action = actions.remove(*from);
                actions.insert(*to, action);
            }
            Edit::Toggle { index } => {
                let action = &mut actions[*index];
                let enabled = action.is_enabled();
                action.set_enabled(!enabled);
            }
            Edit::Replace { index, after, .. } => actions[*index] = after.clone(),
        }
    }
}

/// Ordered, mutable list of actions owned by one editing session.
///
/// Order defines execution order. Disabled actions stay in place and are skipped
/// at execution time.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    name: Option<String>,
    actions: Vec<Action>,
    undo_stack: Vec<Edit>,
    redo_stack: Vec<Edit>,
}

impl PartialEq for ActionQueue {
    /// Queues are equal when their names and action sequences are; history is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.actions == other.actions
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    /// Builds a queue from actions without recording history
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions, ..Self::default() }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Enabled actions in execution order
    pub fn enabled_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.is_enabled())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    // ── Mutations ─────────────────────────────────────────────────────────────────────

    /// Inserts `action` so that it ends up at `index` (`index == len` appends)
    pub fn insert(&mut self, index: usize, action: Action) -> Result<(), QueueError> {
        self.check_index(index, self.actions.len() + 1)?;
        self.record(Edit::Insert { index, action });
        Ok(())
    }

    /// Appends `action` at the end of the queue
    pub fn push(&mut self, action: Action) {
        let index = self.actions.len();
        self.record(Edit::Insert { index, action });
    }

    /// Removes and returns the action at `index`
    pub fn remove(&mut self, index: usize) -> Result<Action, QueueError> {
        self.check_index(index, self.actions.len())?;
        let action = self.actions[index].clone();
        self.record(Edit::Remove { index, action: action.clone() });
        Ok(action)
    }

    /// Moves the action at `from` so that it ends up at `to`
    pub fn move_action(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        self.check_index(from, self.actions.len())?;
        self.check_index(to, self.actions.len())?;
        if from == to {
            return Ok(());
        }
        self.record(Edit::Move { from, to });
        Ok(())
    }

    /// Flips the enabled flag of the action at `index`
    pub fn toggle(&mut self, index: usize) -> Result<(), QueueError> {
        self.check_index(index, self.actions.len())?;
        self.record(Edit::Toggle { index });
        Ok(())
    }

    /// Replaces the action at `index`, typically after a parameter edit
    pub fn replace(&mut self, index: usize, action: Action) -> Result<(), QueueError> {
        self.check_index(index, self.actions.len())?;
        let before = self.actions[index].clone();
        self.record(Edit::Replace { index, before, after: action });
        Ok(())
    }

    /// Reverts the most recent mutation. No-op when there is nothing to undo.
    pub fn undo(&mut self) {
        if let Some(edit) = self.undo_stack.pop() {
            edit.inverse().apply(&mut self.actions);
            self.redo_stack.push(edit);
        }
    }

    /// Re-applies the most recently undone mutation. No-op when there is nothing to redo.
    pub fn redo(&mut self) {
        if let Some(edit) = self.redo_stack.pop() {
            edit.apply(&mut self.actions);
            self.undo_stack.push(edit);
        }
    }

    fn record(&mut self, edit: Edit) {
        edit.apply(&mut self.actions);
        self.undo_stack.push(edit);
        self.redo_stack.clear();
    }

    fn check_index(&self, index: usize, bound: usize) -> Result<(), QueueError> {
        if index >= bound {
            return Err(QueueError::OutOfRange { index, len: self.actions.len() });
        }
        Ok(())
    }

    // ── Fingerprints and snapshots ──────────────────────────────────────────────────

    /// Fingerprint over the ordered enabled actions.
    ///
    /// Disabled actions do not contribute, so toggling one that stays disabled
    /// or editing a disabled action's parameters leaves the fingerprint alone.
    pub fn snapshot_fingerprint(&self) -> Fingerprint {
        self.enabled_actions()
            .fold(Fingerprint::empty_prefix(), |fp, action| fp.chain(action))
    }

    /// Immutable copy of the enabled pipeline for submission to a batch
    pub fn snapshot(&self) -> QueueSnapshot {
        let snapshot = QueueSnapshot::from_actions(self.enabled_actions().cloned());
        debug!("Snapshot of {} enabled actions, fingerprint {}", snapshot.len(), snapshot.fingerprint);
        snapshot
    }

    // ── Preset serialization ───────────────────────────────────────────────────────

    pub fn to_serializable(&self) -> SerializableQueue {
        SerializableQueue {
            version: PRESET_VERSION,
            name: self.name.clone(),
            actions: self.actions.clone(),
        }
    }

    /// Rebuilds a queue from its serialized form with an empty history
    pub fn from_serializable(data: SerializableQueue) -> Result<Self, QueueError> {
        if data.version > PRESET_VERSION {
            return Err(QueueError::invalid(format!(
                "Preset version {} is newer than supported version {}",
                data.version, PRESET_VERSION
            )));
        }
        // Deserialized actions are validated already; this covers values built in code
        for action in &data.actions {
            action.kind().validate()?;
        }
        Ok(Self {
            name: data.name,
            actions: data.actions,
            ..Self::default()
        })
    }
}

/// Serialized preset form of a queue (kind, parameters and enabled flag per action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableQueue {
    #[serde(default = "preset_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub actions: Vec<Action>,
}

fn preset_version() -> u32 { PRESET_VERSION }

/// One enabled action together with the fingerprint of the queue prefix ending at it.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    pub action: Action,
    pub prefix: Fingerprint,
}

/// Immutable snapshot of the enabled actions of a queue at submission time.
///
/// Cheap to clone and share between Jobs; later edits to the queue do not
/// reach it.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    steps: Arc<[PipelineStep]>,
    fingerprint: Fingerprint,
}

impl QueueSnapshot {
    fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut prefix = Fingerprint::empty_prefix();
        let steps: Vec<PipelineStep> = actions
            .into_iter()
            .map(|action| {
                prefix = prefix.chain(&action);
                PipelineStep { action, prefix }
            })
            .collect();
        Self { steps: steps.into(), fingerprint: prefix }
    }

    /// Loads every file the steps reference through `io`.
    ///
    /// The contents are chained into the prefix fingerprints, so results
    /// computed with an older version of the file never match.
    pub fn bind_assets(&self, io: &dyn FileIo) -> Result<Self, TransformError> {
        let mut loaded: HashMap<PathBuf, Arc<[u8]>> = HashMap::new();
        let mut actions = Vec::with_capacity(self.steps.len());
        for step in self.steps.iter() {
            let Some(path) = step.action.asset_path() else {
                actions.push(step.action.clone());
                continue;
            };
            let bytes = match loaded.get(path) {
                Some(bytes) => Arc::clone(bytes),
                None => {
                    let bytes: Arc<[u8]> = io.read_source(path)?.into();
                    loaded.insert(path.to_path_buf(), Arc::clone(&bytes));
                    bytes
                }
            };
            actions.push(step.action.clone().with_asset(bytes));
        }
        Ok(Self::from_actions(actions))
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionKind, ResizeMode};
    use crate::utils::ImageFormat;
    use pretty_assertions::assert_eq;

    fn resize(percent: f32) -> Action {
        Action::new(ActionKind::Resize { mode: ResizeMode::Scale(percent), enlarge: false }).unwrap()
    }

    fn rotate(degrees: i32) -> Action {
        Action::new(ActionKind::Rotate { degrees }).unwrap()
    }

    fn convert(format: ImageFormat) -> Action {
        Action::new(ActionKind::ConvertFormat { format, quality: None }).unwrap()
    }

    #[test]
    fn undo_all_restores_original_and_redo_replays() {
        let mut queue = ActionQueue::from_actions(vec![resize(50.0), rotate(90)]);
        let original = queue.clone();

        queue.push(convert(ImageFormat::Png));
        queue.move_action(2, 0).unwrap();
        queue.toggle(1).unwrap();
        queue.remove(2).unwrap();
        queue.replace(0, convert(ImageFormat::WebP)).unwrap();
        let edited = queue.clone();

        for _ in 0..5 {
            queue.undo();
        }
        assert_eq!(queue, original);
        assert!(!queue.can_undo());

        for _ in 0..5 {
            queue.redo();
        }
        assert_eq!(queue, edited);
    }

    #[test]
    fn new_mutation_clears_redo() {
        let mut queue = ActionQueue::new();
        queue.push(resize(50.0));
        queue.undo();
        assert!(queue.can_redo());

        queue.push(rotate(180));
        assert!(!queue.can_redo());
        queue.redo();
        assert_eq!(queue.actions(), &[rotate(180)]);
    }

    #[test]
    fn undo_and_redo_on_empty_stacks_are_noops() {
        let mut queue = ActionQueue::from_actions(vec![rotate(90)]);
        queue.undo();
        queue.redo();
        assert_eq!(queue.actions(), &[rotate(90)]);
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut queue = ActionQueue::from_actions(vec![rotate(90)]);
        assert_eq!(
            queue.remove(3).unwrap_err(),
            QueueError::OutOfRange { index: 3, len: 1 }
        );
        assert!(queue.insert(1, rotate(180)).is_ok());
        assert!(queue.insert(5, rotate(180)).is_err());
        assert!(queue.move_action(0, 2).is_err());
    }

    #[test]
    fn disabled_actions_do_not_affect_fingerprint() {
        let mut queue = ActionQueue::from_actions(vec![
            resize(50.0),
            rotate(90).with_enabled(false),
            convert(ImageFormat::Png),
        ]);
        let before = queue.snapshot_fingerprint();

        queue.replace(1, rotate(270).with_enabled(false)).unwrap();
        assert_eq!(queue.snapshot_fingerprint(), before);

        let plain = ActionQueue::from_actions(vec![resize(50.0), convert(ImageFormat::Png)]);
        assert_eq!(plain.snapshot_fingerprint(), before);

        // Enabling the step changes what runs, so it must change the fingerprint
        queue.toggle(1).unwrap();
        assert_ne!(queue.snapshot_fingerprint(), before);
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = ActionQueue::from_actions(vec![resize(50.0), rotate(90)]);
        let b = ActionQueue::from_actions(vec![rotate(90), resize(50.0)]);
        assert_ne!(a.snapshot_fingerprint(), b.snapshot_fingerprint());
    }

    #[test]
    fn snapshot_prefixes_chain_to_queue_fingerprint() {
        let queue = ActionQueue::from_actions(vec![
            resize(50.0),
            rotate(90).with_enabled(false),
            convert(ImageFormat::Png),
        ]);
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.steps()[1].prefix, queue.snapshot_fingerprint());
        assert_eq!(snapshot.fingerprint(), queue.snapshot_fingerprint());

        let shorter = ActionQueue::from_actions(vec![resize(50.0)]);
        assert_eq!(snapshot.steps()[0].prefix, shorter.snapshot_fingerprint());
    }

    #[test]
    fn serialized_preset_restores_pipeline() {
        let mut queue = ActionQueue::named("web export");
        queue.push(resize(50.0));
        queue.push(rotate(90).with_enabled(false));
        queue.push(convert(ImageFormat::Png));

        let json = serde_json::to_string(&queue.to_serializable()).unwrap();
        let restored =
            ActionQueue::from_serializable(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored, queue);
        assert_eq!(restored.snapshot_fingerprint(), queue.snapshot_fingerprint());
        assert!(!restored.can_undo());
    }

    /// Serves one fixed file
    struct OneFile(PathBuf, Vec<u8>);

    impl FileIo for OneFile {
        fn read_source(&self, path: &std::path::Path) -> Result<Vec<u8>, TransformError> {
            if path == self.0 {
                Ok(self.1.clone())
            } else {
                Err(TransformError::io(format!("missing {}", path.display())))
            }
        }

        fn write_output(&self, _: &std::path::Path, _: &[u8]) -> Result<(), TransformError> {
            Ok(())
        }
    }

    fn watermark(path: &str) -> Action {
        Action::new(ActionKind::Watermark {
            image: PathBuf::from(path),
            position: Default::default(),
            opacity: 0.5,
            scale: 0.2,
            margin: 0,
        })
        .unwrap()
    }

    #[test]
    fn bound_watermark_contents_drive_the_prefix() {
        let queue = ActionQueue::from_actions(vec![resize(50.0), watermark("mark.png"), rotate(90)]);
        let snapshot = queue.snapshot();

        let red = snapshot.bind_assets(&OneFile("mark.png".into(), b"red".to_vec())).unwrap();
        let blue = snapshot.bind_assets(&OneFile("mark.png".into(), b"blue".to_vec())).unwrap();
        let red_again = snapshot.bind_assets(&OneFile("mark.png".into(), b"red".to_vec())).unwrap();

        assert_eq!(red.steps()[1].action.asset(), Some(&b"red"[..]));
        assert_eq!(red.steps()[0].prefix, snapshot.steps()[0].prefix);
        assert_ne!(red.steps()[1].prefix, blue.steps()[1].prefix);
        assert_ne!(red.fingerprint(), blue.fingerprint());
        assert_eq!(red.fingerprint(), red_again.fingerprint());
    }

    #[test]
    fn unreadable_watermark_fails_binding() {
        let snapshot = ActionQueue::from_actions(vec![watermark("gone.png")]).snapshot();
        let err = snapshot.bind_assets(&OneFile("mark.png".into(), vec![])).unwrap_err();
        assert!(matches!(err, TransformError::IoFailure(_)));
    }

    #[test]
    fn newer_preset_versions_are_rejected() {
        let data = SerializableQueue { version: PRESET_VERSION + 1, name: None, actions: vec![] };
        assert!(ActionQueue::from_serializable(data).is_err());
    }
}
