use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::scene::{CueTiming, Scene};
use crate::error::{EngineError, Result};
use crate::types::{SceneId, SequenceId};

/// An ordered list of cues. Steps are positions in key order; keys are
/// continuous so a cue can be inserted between two others.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,
    scenes: BTreeMap<SceneId, Scene>,
    selected: SceneId,
}

impl Sequence {
    /// A new sequence holds a single empty cue 0.
    pub fn new(id: SequenceId, name: impl Into<String>, timing: CueTiming) -> Self {
        let scene0 = Scene::new(SceneId(0.0), timing);
        let mut scenes = BTreeMap::new();
        scenes.insert(scene0.id, scene0);

        Self {
            id,
            name: name.into(),
            scenes,
            selected: SceneId(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn contains(&self, key: SceneId) -> bool {
        self.scenes.contains_key(&key)
    }

    pub fn scene(&self, key: SceneId) -> Result<&Scene> {
        self.scenes.get(&key).ok_or(EngineError::UnknownScene {
            sequence: self.id,
            scene: key,
        })
    }

    pub fn scene_mut(&mut self, key: SceneId) -> Result<&mut Scene> {
        let sequence = self.id;
        self.scenes.get_mut(&key).ok_or(EngineError::UnknownScene {
            sequence,
            scene: key,
        })
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn keys(&self) -> Vec<SceneId> {
        self.scenes.keys().copied().collect()
    }

    pub fn step_of(&self, key: SceneId) -> Option<usize> {
        self.scenes.keys().position(|k| *k == key)
    }

    pub fn key_at(&self, step: usize) -> Result<SceneId> {
        self.scenes
            .keys()
            .nth(step)
            .copied()
            .ok_or(EngineError::UnknownStep {
                sequence: self.id,
                step,
            })
    }

    pub fn selected(&self) -> SceneId {
        self.selected
    }

    pub fn selected_step(&self) -> usize {
        self.step_of(self.selected).unwrap_or(0)
    }

    pub(crate) fn select(&mut self, key: SceneId) -> Result<()> {
        self.scene(key)?;
        self.selected = key;
        Ok(())
    }

    /// The cue after the selected one.
    pub fn next_key(&self) -> Option<SceneId> {
        self.key_at(self.selected_step() + 1).ok()
    }

    pub fn previous_key(&self) -> Option<SceneId> {
        self.selected_step()
            .checked_sub(1)
            .and_then(|step| self.key_at(step).ok())
    }

    /// Key for a cue recorded right after `key`: the next whole number when
    /// it falls before the following cue, the midpoint otherwise.
    pub fn next_key_after(&self, key: SceneId) -> SceneId {
        let whole = SceneId(key.0.floor() + 1.0);
        let following = self
            .scenes
            .keys()
            .find(|k| **k > key)
            .copied();

        match following {
            Some(following) if whole >= following => SceneId((key.0 + following.0) / 2.0),
            _ => whole,
        }
    }

    pub(crate) fn insert(&mut self, scene: Scene) -> Result<()> {
        if self.scenes.contains_key(&scene.id) {
            return Err(EngineError::DuplicateScene {
                sequence: self.id,
                scene: scene.id,
            });
        }
        self.scenes.insert(scene.id, scene);
        Ok(())
    }

    /// Remove a cue. The last cue of a sequence can't be removed; removing the
    /// selected cue selects the one before it, or the new first cue.
    pub(crate) fn remove(&mut self, key: SceneId) -> Result<Scene> {
        self.scene(key)?;
        if self.scenes.len() == 1 {
            return Err(EngineError::LastScene(self.id));
        }

        if key == self.selected {
            let step = self.selected_step();
            let fallback = if step > 0 { step - 1 } else { 1 };
            self.selected = self.key_at(fallback)?;
        }

        self.scenes.remove(&key).ok_or(EngineError::UnknownScene {
            sequence: self.id,
            scene: key,
        })
    }
}
