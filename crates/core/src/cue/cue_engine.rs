use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::crossfade::{Crossfade, Fade};
use super::scene::{CueTiming, Scene};
use super::sequence::Sequence;
use crate::channel::ChannelRegistry;
use crate::error::{EngineError, Result};
use crate::types::{
    merge_levels, ChannelId, ChannelLevel, SceneId, SceneRef, SequenceId, DMX_MAX, DMX_NULL,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Back,
}

/// Result of advancing playback by one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CueTick {
    /// Scene contributions to apply to the channel registry.
    pub levels: Vec<ChannelLevel>,
    /// Set on the tick a crossfade finished, once.
    pub completed: Option<SceneRef>,
}

/// Plays back cues of the main sequence and runs crossfades.
///
/// Mutators return scene contributions in the order they must be applied to
/// the channel registry.
#[derive(Clone, Debug)]
pub struct CueEngine {
    sequences: Vec<Sequence>,
    main_sequence: SequenceId,
    selected_cue: SceneId,
    active_cues: BTreeSet<SceneRef>,
    subscriptions: BTreeSet<SequenceId>,
    crossfade: Option<Crossfade>,
    default_timing: CueTiming,
}

impl CueEngine {
    /// Create `sequence_count` sequences (at least one). The first is main
    /// and its cue 0 is live.
    pub fn new(sequence_count: usize, default_timing: CueTiming) -> Self {
        let sequences: Vec<Sequence> = (0..sequence_count.max(1))
            .map(|index| {
                let id = SequenceId(index as u16);
                Sequence::new(id, format!("Sequence {}", index), default_timing)
            })
            .collect();

        let mut engine = Self {
            sequences,
            main_sequence: SequenceId(0),
            selected_cue: SceneId(0.0),
            active_cues: BTreeSet::new(),
            subscriptions: BTreeSet::new(),
            crossfade: None,
            default_timing,
        };
        engine.subscriptions.insert(SequenceId(0));
        engine.arm_first_scene();
        engine
    }

    pub fn sequence(&self, id: SequenceId) -> Result<&Sequence> {
        self.sequences
            .get(id.0 as usize)
            .ok_or(EngineError::UnknownSequence(id))
    }

    fn sequence_mut(&mut self, id: SequenceId) -> Result<&mut Sequence> {
        self.sequences
            .get_mut(id.0 as usize)
            .ok_or(EngineError::UnknownSequence(id))
    }

    fn main_mut(&mut self) -> &mut Sequence {
        let index = self.main_sequence.0 as usize;
        &mut self.sequences[index]
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn main_sequence(&self) -> SequenceId {
        self.main_sequence
    }

    pub fn main(&self) -> &Sequence {
        &self.sequences[self.main_sequence.0 as usize]
    }

    pub fn selected_cue(&self) -> SceneId {
        self.selected_cue
    }

    pub fn selected_step(&self) -> usize {
        self.main().selected_step()
    }

    pub fn active_cues(&self) -> impl Iterator<Item = &SceneRef> {
        self.active_cues.iter()
    }

    pub fn is_active(&self, scene: SceneRef) -> bool {
        self.active_cues.contains(&scene)
    }

    pub fn crossfade(&self) -> Option<&Crossfade> {
        self.crossfade.as_ref()
    }

    pub fn is_fading(&self) -> bool {
        self.crossfade.is_some()
    }

    pub fn default_timing(&self) -> CueTiming {
        self.default_timing
    }

    /// Append a sequence holding only cue 0.
    pub fn add_sequence(&mut self, name: Option<String>) -> SequenceId {
        let id = SequenceId(self.sequences.len() as u16);
        let name = name.unwrap_or_else(|| format!("Sequence {}", id));
        self.sequences
            .push(Sequence::new(id, name, self.default_timing));
        log::info!("Added sequence {}", id);
        id
    }

    // Scene levels

    /// Set a cue's master level and return its scaled contributions. Cues of
    /// sequences that aren't followed only store the level.
    pub fn set_scene_level(&mut self, scene: SceneRef, level: u8) -> Result<Vec<ChannelLevel>> {
        let subscribed = self.subscriptions.contains(&scene.sequence);
        let target = self.sequence_mut(scene.sequence)?.scene_mut(scene.scene)?;
        target.set_level(level);
        Ok(if subscribed {
            target.contributions()
        } else {
            Vec::new()
        })
    }

    fn arm_first_scene(&mut self) -> Vec<ChannelLevel> {
        let sequence = self.main_sequence;
        let first = match self.main().key_at(0) {
            Ok(key) => key,
            Err(_) => return Vec::new(),
        };
        let _ = self.main_mut().select(first);
        self.on_sequence_changed(sequence);
        self.activate(SceneRef::new(sequence, first))
    }

    fn activate(&mut self, scene: SceneRef) -> Vec<ChannelLevel> {
        self.active_cues.insert(scene);
        self.set_scene_level(scene, DMX_MAX).unwrap_or_default()
    }

    fn deactivate(&mut self, scene: SceneRef) -> Vec<ChannelLevel> {
        self.active_cues.remove(&scene);
        self.set_scene_level(scene, DMX_NULL).unwrap_or_default()
    }

    /// Keep the selected cue in step with the main sequence.
    pub fn on_sequence_changed(&mut self, sequence: SequenceId) {
        if sequence != self.main_sequence {
            return;
        }
        self.selected_cue = self.main().selected();
    }

    /// Drop active entries whose cue no longer exists.
    pub fn prune_active_cues(&mut self) {
        let sequences = &self.sequences;
        self.active_cues.retain(|active| {
            let exists = sequences
                .get(active.sequence.0 as usize)
                .map(|s| s.contains(active.scene))
                .unwrap_or(false);
            if !exists {
                log::warn!(
                    "Dropping stale active cue {} of sequence {}",
                    active.scene,
                    active.sequence
                );
            }
            exists
        });
    }

    // Selection

    pub fn set_main_sequence(&mut self, id: SequenceId) -> Result<Vec<ChannelLevel>> {
        self.sequence(id)?;
        self.cancel_crossfade();

        // Every live cue goes out, including cues of other sequences.
        let mut live: BTreeSet<SceneRef> = self.active_cues.clone();
        live.insert(SceneRef::new(self.main_sequence, self.selected_cue));
        let mut changes = Vec::new();
        for scene in live {
            merge_levels(&mut changes, self.deactivate(scene));
        }
        self.subscriptions.remove(&self.main_sequence);

        self.main_sequence = id;
        self.subscriptions.insert(id);
        merge_levels(&mut changes, self.arm_first_scene());
        log::info!("Main sequence is now {}", id);
        Ok(changes)
    }

    pub fn set_selected_cue(&mut self, key: SceneId) -> Result<Vec<ChannelLevel>> {
        self.main().scene(key)?;
        self.cancel_crossfade();

        let sequence = self.main_sequence;
        let mut changes = self.deactivate(SceneRef::new(sequence, self.selected_cue));
        self.main_mut().select(key)?;
        self.on_sequence_changed(sequence);
        merge_levels(&mut changes, self.activate(SceneRef::new(sequence, key)));
        Ok(changes)
    }

    pub fn set_selected_cue_step(&mut self, step: usize) -> Result<Vec<ChannelLevel>> {
        let key = self.main().key_at(step)?;
        self.set_selected_cue(key)
    }

    pub fn step_plus(&mut self) -> Result<Vec<ChannelLevel>> {
        let key = self
            .main()
            .next_key()
            .ok_or(EngineError::NoNextScene(self.main_sequence))?;
        self.set_selected_cue(key)
    }

    pub fn step_minus(&mut self) -> Result<Vec<ChannelLevel>> {
        let key = self
            .main()
            .previous_key()
            .ok_or(EngineError::NoPreviousScene(self.main_sequence))?;
        self.set_selected_cue(key)
    }

    // Recording

    /// Store `snapshot` as a new cue. Without a key the cue goes right after
    /// the selected one. A cue recorded into the main sequence becomes the
    /// selected cue; in another sequence it only goes live.
    pub fn record_cue(
        &mut self,
        snapshot: &[(ChannelId, u8)],
        at: Option<SceneId>,
        sequence: Option<SequenceId>,
    ) -> Result<(SceneRef, Vec<ChannelLevel>)> {
        let sequence = sequence.unwrap_or(self.main_sequence);
        let timing = self.default_timing;
        let target = self.sequence_mut(sequence)?;
        let key = at.unwrap_or_else(|| target.next_key_after(target.selected()));
        if !key.0.is_finite() || key.0.is_sign_negative() {
            return Err(EngineError::InvalidScene(key));
        }
        target.insert(Scene::new(key, timing).with_channels(snapshot))?;
        self.subscriptions.insert(sequence);

        let scene = SceneRef::new(sequence, key);
        log::info!(
            "Recorded cue {} in sequence {} ({} channels)",
            key,
            sequence,
            snapshot.len()
        );

        let changes = if sequence == self.main_sequence {
            self.set_selected_cue(key)?
        } else {
            self.activate(scene)
        };
        Ok((scene, changes))
    }

    /// Replace the stored levels of a cue of the main sequence, the selected
    /// cue by default. A live cue publishes its new levels.
    pub fn update_cue(
        &mut self,
        snapshot: &[(ChannelId, u8)],
        key: Option<SceneId>,
    ) -> Result<(SceneRef, Vec<ChannelLevel>)> {
        let key = key.unwrap_or(self.selected_cue);
        let scene = SceneRef::new(self.main_sequence, key);
        self.main_mut().scene_mut(key)?.set_channels(snapshot);
        log::info!("Updated cue {} ({} channels)", key, snapshot.len());

        let fading = self
            .crossfade
            .as_ref()
            .map(|xf| xf.references(scene))
            .unwrap_or(false);
        // A running crossfade settles on the new levels when it completes.
        let changes = if self.active_cues.contains(&scene) && !fading {
            let level = self.main().scene(key)?.level();
            self.set_scene_level(scene, level)?
        } else {
            Vec::new()
        };
        Ok((scene, changes))
    }

    /// Remove a cue from the main sequence, the selected cue by default. A
    /// crossfade using it is cancelled and its contribution is released.
    pub fn delete_cue(&mut self, key: Option<SceneId>) -> Result<(SceneRef, Vec<ChannelLevel>)> {
        let sequence = self.main_sequence;
        let key = key.unwrap_or(self.selected_cue);
        let scene = SceneRef::new(sequence, key);
        self.main().scene(key)?;
        if self.main().len() == 1 {
            return Err(EngineError::LastScene(sequence));
        }

        if self
            .crossfade
            .as_ref()
            .map(|xf| xf.references(scene))
            .unwrap_or(false)
        {
            self.cancel_crossfade();
        }

        let was_selected = key == self.selected_cue;
        let mut changes = self.deactivate(scene);
        self.main_mut().remove(key)?;
        self.on_sequence_changed(sequence);
        self.prune_active_cues();

        if was_selected {
            let selected = SceneRef::new(sequence, self.selected_cue);
            merge_levels(&mut changes, self.activate(selected));
        }
        log::info!("Deleted cue {} of sequence {}", key, sequence);
        Ok((scene, changes))
    }

    pub fn delete_step(&mut self, step: usize) -> Result<(SceneRef, Vec<ChannelLevel>)> {
        let key = self.main().key_at(step)?;
        self.delete_cue(Some(key))
    }

    // Timing

    pub fn set_time_in(&mut self, time: Duration, key: Option<SceneId>) -> Result<SceneRef> {
        self.update_timing(key, |timing| timing.time_in = time)
    }

    pub fn set_time_out(&mut self, time: Duration, key: Option<SceneId>) -> Result<SceneRef> {
        self.update_timing(key, |timing| timing.time_out = time)
    }

    pub fn set_delay_in(&mut self, delay: Duration, key: Option<SceneId>) -> Result<SceneRef> {
        self.update_timing(key, |timing| timing.delay_in = delay)
    }

    pub fn set_delay_out(&mut self, delay: Duration, key: Option<SceneId>) -> Result<SceneRef> {
        self.update_timing(key, |timing| timing.delay_out = delay)
    }

    /// Timing edits without a key target the cue the next go fades into.
    fn update_timing<F>(&mut self, key: Option<SceneId>, edit: F) -> Result<SceneRef>
    where
        F: FnOnce(&mut CueTiming),
    {
        let sequence = self.main_sequence;
        let key = match key {
            Some(key) => key,
            None => self
                .main()
                .next_key()
                .ok_or(EngineError::NoNextScene(sequence))?,
        };
        edit(&mut self.main_mut().scene_mut(key)?.timing);
        Ok(SceneRef::new(sequence, key))
    }

    // Playback

    /// Crossfade from the selected cue to the next one.
    pub fn go(&mut self, channels: &mut ChannelRegistry) -> Result<Vec<ChannelLevel>> {
        self.launch(Direction::Forward, channels)
    }

    /// Crossfade from the selected cue to the previous one.
    pub fn go_back(&mut self, channels: &mut ChannelRegistry) -> Result<Vec<ChannelLevel>> {
        self.launch(Direction::Back, channels)
    }

    /// Freeze the running crossfade. Returns false if nothing is running.
    pub fn go_pause(&mut self) -> bool {
        match self.crossfade.as_mut() {
            Some(crossfade) if !crossfade.is_paused() => {
                crossfade.pause();
                log::info!("Crossfade to cue {} paused", crossfade.to.scene);
                true
            }
            _ => false,
        }
    }

    /// Advance the running crossfade by `delta`.
    pub fn tick(&mut self, delta: Duration) -> CueTick {
        let Some(crossfade) = self.crossfade.as_mut() else {
            return CueTick::default();
        };

        let mut levels = crossfade.advance(delta);
        if !crossfade.is_complete() || crossfade.is_paused() {
            return CueTick {
                levels,
                completed: None,
            };
        }

        let completed = self.crossfade.take().map(|crossfade| {
            self.commit(crossfade.from, crossfade.to);
            merge_levels(&mut levels, self.settle(&crossfade));
            crossfade.to
        });
        CueTick { levels, completed }
    }

    /// Stop the running crossfade where it is.
    pub fn cancel_crossfade(&mut self) -> Option<Crossfade> {
        let cancelled = self.crossfade.take();
        if let Some(crossfade) = &cancelled {
            log::debug!("Crossfade to cue {} cancelled", crossfade.to.scene);
        }
        cancelled
    }

    /// Final levels of a finished crossfade, read from the target as it is
    /// stored now. Faded channels the target doesn't hold go to 0.
    fn settle(&self, crossfade: &Crossfade) -> Vec<ChannelLevel> {
        let target = match self
            .sequence(crossfade.to.sequence)
            .and_then(|sequence| sequence.scene(crossfade.to.scene))
        {
            Ok(target) => target,
            Err(_) => return Vec::new(),
        };
        let mut levels: Vec<ChannelLevel> = crossfade
            .fades()
            .iter()
            .filter(|fade| !target.channels().contains_key(&fade.channel))
            .map(|fade| ChannelLevel::new(fade.channel, DMX_NULL))
            .collect();
        levels.extend(target.contributions());
        levels
    }

    /// Make `to` the selected and only live cue of its sequence without
    /// publishing anything: the fades already left the channels there.
    fn commit(&mut self, from: SceneRef, to: SceneRef) {
        let sequence = to.sequence;
        if let Ok(seq) = self.sequence_mut(sequence) {
            if let Ok(scene) = seq.scene_mut(from.scene) {
                scene.set_level(DMX_NULL);
            }
            if let Ok(scene) = seq.scene_mut(to.scene) {
                scene.set_level(DMX_MAX);
            }
            let _ = seq.select(to.scene);
        }
        self.on_sequence_changed(sequence);
        self.active_cues.retain(|active| active.sequence != sequence);
        self.active_cues.insert(to);
        log::info!("Crossfade complete, cue {} of sequence {} is live", to.scene, sequence);
    }

    fn launch(
        &mut self,
        direction: Direction,
        channels: &mut ChannelRegistry,
    ) -> Result<Vec<ChannelLevel>> {
        let sequence = self.main_sequence;
        // A crossfade in flight counts as arrived at its target.
        let origin = self
            .crossfade
            .as_ref()
            .map(|xf| xf.to.scene)
            .unwrap_or(self.selected_cue);
        let origin_step = self
            .main()
            .step_of(origin)
            .ok_or(EngineError::UnknownScene {
                sequence,
                scene: origin,
            })?;
        let target = match direction {
            Direction::Forward => self
                .main()
                .key_at(origin_step + 1)
                .map_err(|_| EngineError::NoNextScene(sequence))?,
            Direction::Back => origin_step
                .checked_sub(1)
                .and_then(|step| self.main().key_at(step).ok())
                .ok_or(EngineError::NoPreviousScene(sequence))?,
        };

        let in_flight: BTreeMap<ChannelId, u8> = match self.crossfade.take() {
            Some(previous) => {
                let levels = previous.levels();
                self.commit(previous.from, previous.to);
                levels.into_iter().map(|l| (l.channel, l.level)).collect()
            }
            None => BTreeMap::new(),
        };

        let from = self.main().scene(origin)?.clone();
        let to = self.main().scene(target)?.clone();
        let mut fades = Vec::new();
        let mut fade = |channel: ChannelId, start: u8, end: u8| {
            let (delay, duration) = to.timing.for_target(end);
            fades.push(Fade {
                channel,
                start,
                end,
                delay,
                duration,
            });
        };

        for channel in from.channels().keys() {
            let start = match channels.reclaim_for_scene(*channel)? {
                Some(direct) => direct,
                None => match in_flight.get(channel) {
                    Some(level) => *level,
                    None => channels.channel(*channel)?.scene_level(),
                },
            };
            fade(*channel, start, to.stored_level(*channel).unwrap_or(DMX_NULL));
        }

        for (channel, stored) in to.channels() {
            if from.channels().contains_key(channel) {
                continue;
            }
            let start = match channels.reclaim_for_scene(*channel)? {
                Some(direct) => direct,
                None => in_flight.get(channel).copied().unwrap_or(DMX_NULL),
            };
            fade(*channel, start, *stored);
        }

        // Channels left behind by a superseded crossfade go out.
        for (channel, level) in &in_flight {
            if !from.channels().contains_key(channel) && !to.channels().contains_key(channel) {
                fade(*channel, *level, DMX_NULL);
            }
        }

        let from_ref = SceneRef::new(sequence, origin);
        let to_ref = SceneRef::new(sequence, target);
        let crossfade = Crossfade::new(from_ref, to_ref, fades);
        let start_levels = crossfade.levels();
        self.active_cues.insert(to_ref);
        log::info!(
            "Crossfade from cue {} to cue {} ({} channels)",
            origin,
            target,
            crossfade.fades().len()
        );
        self.crossfade = Some(crossfade);
        Ok(start_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(ms: u64) -> CueTiming {
        CueTiming {
            time_in: Duration::from_millis(ms),
            time_out: Duration::from_millis(ms),
            delay_in: Duration::ZERO,
            delay_out: Duration::ZERO,
        }
    }

    fn apply(channels: &mut ChannelRegistry, levels: &[ChannelLevel]) {
        for l in levels {
            channels.on_scene_level(l.channel, l.level).unwrap();
        }
    }

    /// Cue 1: ch0=50 ch1=80. Cue 2: ch0=200 ch2=30. Selected cue 1.
    fn two_cue_engine() -> (CueEngine, ChannelRegistry) {
        let mut engine = CueEngine::new(1, timing(1000));
        let mut channels = ChannelRegistry::new(8);
        let (_, changes) = engine
            .record_cue(&[(ChannelId(0), 50), (ChannelId(1), 80)], None, None)
            .unwrap();
        apply(&mut channels, &changes);
        engine
            .record_cue(&[(ChannelId(0), 200), (ChannelId(2), 30)], None, None)
            .unwrap();
        let changes = engine.set_selected_cue(SceneId(1.0)).unwrap();
        apply(&mut channels, &changes);
        (engine, channels)
    }

    #[test]
    fn test_new_engine_arms_cue_zero() {
        let engine = CueEngine::new(2, CueTiming::default());
        assert_eq!(engine.sequences().len(), 2);
        assert_eq!(engine.selected_cue(), SceneId(0.0));
        assert!(engine.is_active(SceneRef::new(SequenceId(0), SceneId(0.0))));
    }

    #[test]
    fn test_record_selects_new_cue() {
        let mut engine = CueEngine::new(1, CueTiming::default());
        let (scene, changes) = engine
            .record_cue(&[(ChannelId(3), 90)], None, None)
            .unwrap();
        assert_eq!(scene.scene, SceneId(1.0));
        assert_eq!(engine.selected_step(), 1);
        assert_eq!(changes, vec![ChannelLevel::new(ChannelId(3), 90)]);
        assert_eq!(engine.active_cues().count(), 1);

        let (scene, _) = engine
            .record_cue(&[(ChannelId(3), 10)], Some(SceneId(0.5)), None)
            .unwrap();
        assert_eq!(scene.scene, SceneId(0.5));
        assert_eq!(engine.selected_step(), 1);

        assert!(matches!(
            engine.record_cue(&[], Some(SceneId(1.0)), None),
            Err(EngineError::DuplicateScene { .. })
        ));
    }

    #[test]
    fn test_selecting_cue_swaps_contributions() {
        let (mut engine, _) = two_cue_engine();
        let changes = engine.set_selected_cue(SceneId(2.0)).unwrap();
        assert_eq!(
            changes,
            vec![
                ChannelLevel::new(ChannelId(0), 200),
                ChannelLevel::new(ChannelId(1), 0),
                ChannelLevel::new(ChannelId(2), 30)
            ]
        );
        assert!(!engine.is_active(SceneRef::new(SequenceId(0), SceneId(1.0))));
        assert_eq!(engine.active_cues().count(), 1);
    }

    #[test]
    fn test_step_out_of_range_keeps_selection() {
        let (mut engine, _) = two_cue_engine();
        engine.step_plus().unwrap();
        assert_eq!(engine.step_plus(), Err(EngineError::NoNextScene(SequenceId(0))));
        assert_eq!(engine.selected_step(), 2);
        engine.set_selected_cue_step(0).unwrap();
        assert_eq!(
            engine.step_minus(),
            Err(EngineError::NoPreviousScene(SequenceId(0)))
        );
        assert_eq!(
            engine.set_selected_cue_step(7),
            Err(EngineError::UnknownStep {
                sequence: SequenceId(0),
                step: 7
            })
        );
    }

    #[test]
    fn test_go_reaches_target_levels() {
        let (mut engine, mut channels) = two_cue_engine();
        let start = engine.go(&mut channels).unwrap();
        assert_eq!(
            start,
            vec![
                ChannelLevel::new(ChannelId(0), 50),
                ChannelLevel::new(ChannelId(1), 80),
                ChannelLevel::new(ChannelId(2), 0)
            ]
        );

        let half = engine.tick(Duration::from_millis(500));
        assert_eq!(half.completed, None);
        assert_eq!(half.levels[0], ChannelLevel::new(ChannelId(0), 125));

        let done = engine.tick(Duration::from_millis(500));
        assert_eq!(done.completed, Some(SceneRef::new(SequenceId(0), SceneId(2.0))));
        assert_eq!(
            done.levels,
            vec![
                ChannelLevel::new(ChannelId(0), 200),
                ChannelLevel::new(ChannelId(1), 0),
                ChannelLevel::new(ChannelId(2), 30)
            ]
        );
        assert_eq!(engine.selected_step(), 2);
        assert_eq!(
            engine.active_cues().copied().collect::<Vec<_>>(),
            vec![SceneRef::new(SequenceId(0), SceneId(2.0))]
        );
        assert_eq!(engine.tick(Duration::from_millis(10)), CueTick::default());
    }

    #[test]
    fn test_go_past_last_cue_is_rejected() {
        let (mut engine, mut channels) = two_cue_engine();
        engine.step_plus().unwrap();
        assert_eq!(
            engine.go(&mut channels),
            Err(EngineError::NoNextScene(SequenceId(0)))
        );
        assert!(!engine.is_fading());
    }

    #[test]
    fn test_go_reclaims_direct_channels() {
        let (mut engine, mut channels) = two_cue_engine();
        channels.set_direct_level(ChannelId(1), 10).unwrap();
        channels.set_direct_level(ChannelId(2), 99).unwrap();

        let start = engine.go(&mut channels).unwrap();
        assert!(start.contains(&ChannelLevel::new(ChannelId(1), 10)));
        assert!(start.contains(&ChannelLevel::new(ChannelId(2), 99)));
        assert!(!channels.channel(ChannelId(1)).unwrap().is_direct());
    }

    #[test]
    fn test_go_back_fades_to_previous_cue() {
        let (mut engine, mut channels) = two_cue_engine();
        engine.go_back(&mut channels).unwrap();
        let done = engine.tick(Duration::from_secs(1));
        assert_eq!(done.completed, Some(SceneRef::new(SequenceId(0), SceneId(0.0))));
        assert_eq!(engine.selected_step(), 0);
        assert!(done.levels.iter().all(|l| l.level == 0));
    }

    #[test]
    fn test_pause_freezes_and_go_supersedes() {
        let (mut engine, mut channels) = two_cue_engine();
        engine
            .record_cue(&[(ChannelId(5), 100)], Some(SceneId(3.0)), None)
            .unwrap();
        engine.set_selected_cue(SceneId(1.0)).unwrap();
        assert!(!engine.go_pause());

        engine.go(&mut channels).unwrap();
        let levels = engine.tick(Duration::from_millis(500)).levels;
        apply(&mut channels, &levels);
        assert!(engine.go_pause());
        assert!(engine.tick(Duration::from_secs(5)).levels.is_empty());
        assert_eq!(engine.selected_step(), 1);

        // Superseding lands on cue 2 and fades on to cue 3 from where cue 2 stood.
        let start = engine.go(&mut channels).unwrap();
        assert_eq!(engine.selected_step(), 2);
        assert!(start.contains(&ChannelLevel::new(ChannelId(0), 125)));
        assert!(start.contains(&ChannelLevel::new(ChannelId(1), 40)));
        assert!(start.contains(&ChannelLevel::new(ChannelId(5), 0)));

        let done = engine.tick(Duration::from_secs(1));
        assert_eq!(done.completed, Some(SceneRef::new(SequenceId(0), SceneId(3.0))));
        assert!(done.levels.contains(&ChannelLevel::new(ChannelId(1), 0)));
        assert!(done.levels.contains(&ChannelLevel::new(ChannelId(5), 100)));
    }

    #[test]
    fn test_timing_defaults_to_next_cue() {
        let (mut engine, _) = two_cue_engine();
        let scene = engine.set_time_in(Duration::from_millis(2000), None).unwrap();
        assert_eq!(scene.scene, SceneId(2.0));
        assert_eq!(
            engine.main().scene(SceneId(2.0)).unwrap().timing.time_in,
            Duration::from_millis(2000)
        );
        engine.step_plus().unwrap();
        assert_eq!(
            engine.set_delay_out(Duration::ZERO, None),
            Err(EngineError::NoNextScene(SequenceId(0)))
        );
    }

    #[test]
    fn test_delete_selected_cue_selects_previous() {
        let (mut engine, _) = two_cue_engine();
        let (deleted, changes) = engine.delete_cue(None).unwrap();
        assert_eq!(deleted.scene, SceneId(1.0));
        assert_eq!(engine.selected_cue(), SceneId(0.0));
        assert_eq!(
            changes,
            vec![ChannelLevel::new(ChannelId(0), 0), ChannelLevel::new(ChannelId(1), 0)]
        );
        assert!(engine.active_cues().all(|a| engine.main().contains(a.scene)));
    }

    #[test]
    fn test_delete_cancels_crossfade_using_cue() {
        let (mut engine, mut channels) = two_cue_engine();
        engine.go(&mut channels).unwrap();
        engine.delete_step(2).unwrap();
        assert!(!engine.is_fading());
        assert!(!engine.is_active(SceneRef::new(SequenceId(0), SceneId(2.0))));
    }

    #[test]
    fn test_last_cue_cannot_be_deleted() {
        let mut engine = CueEngine::new(1, CueTiming::default());
        assert_eq!(
            engine.delete_cue(None),
            Err(EngineError::LastScene(SequenceId(0)))
        );
    }

    #[test]
    fn test_set_main_sequence() {
        let (mut engine, _) = two_cue_engine();
        let changes = engine.set_main_sequence(SequenceId(0)).unwrap();
        assert!(changes.contains(&ChannelLevel::new(ChannelId(0), 0)));
        assert_eq!(engine.selected_step(), 0);

        assert_eq!(
            engine.set_main_sequence(SequenceId(3)),
            Err(EngineError::UnknownSequence(SequenceId(3)))
        );

        let id = engine.add_sequence(None);
        engine.set_main_sequence(id).unwrap();
        assert_eq!(engine.main_sequence(), id);
        assert_eq!(
            engine.active_cues().copied().collect::<Vec<_>>(),
            vec![SceneRef::new(id, SceneId(0.0))]
        );
    }

    #[test]
    fn test_record_rejects_invalid_keys() {
        let mut engine = CueEngine::new(1, CueTiming::default());
        for key in [f64::NAN, f64::INFINITY, -1.0, -0.0] {
            assert_eq!(
                engine.record_cue(&[(ChannelId(0), 10)], Some(SceneId(key)), None),
                Err(EngineError::InvalidScene(SceneId(key)))
            );
        }
        assert_eq!(engine.main().len(), 1);
        assert_eq!(engine.selected_cue(), SceneId(0.0));
    }

    #[test]
    fn test_set_main_sequence_releases_other_live_cues() {
        let mut engine = CueEngine::new(2, timing(1000));
        let (scene, changes) = engine
            .record_cue(&[(ChannelId(7), 90)], None, Some(SequenceId(1)))
            .unwrap();
        assert_eq!(changes, vec![ChannelLevel::new(ChannelId(7), 90)]);

        let changes = engine.set_main_sequence(SequenceId(0)).unwrap();
        assert!(changes.contains(&ChannelLevel::new(ChannelId(7), 0)));
        assert!(!engine.is_active(scene));
        let stored = engine.sequence(SequenceId(1)).unwrap().scene(scene.scene).unwrap();
        assert_eq!(stored.level(), 0);
        assert!(engine.active_cues().all(|a| a.sequence == SequenceId(0)));
    }

    #[test]
    fn test_update_during_crossfade_settles_on_completion() {
        let (mut engine, mut channels) = two_cue_engine();
        engine.go(&mut channels).unwrap();
        engine.tick(Duration::from_millis(500));

        let (_, changes) = engine
            .update_cue(&[(ChannelId(0), 220), (ChannelId(3), 40)], Some(SceneId(2.0)))
            .unwrap();
        assert!(changes.is_empty());

        let done = engine.tick(Duration::from_millis(500));
        assert_eq!(done.completed, Some(SceneRef::new(SequenceId(0), SceneId(2.0))));
        assert!(done.levels.contains(&ChannelLevel::new(ChannelId(0), 220)));
        assert!(done.levels.contains(&ChannelLevel::new(ChannelId(2), 0)));
        assert!(done.levels.contains(&ChannelLevel::new(ChannelId(3), 40)));
    }

    #[test]
    fn test_record_into_other_sequence_keeps_main_selection() {
        let (mut engine, _) = two_cue_engine();
        let (scene, changes) = engine
            .record_cue(&[(ChannelId(7), 60)], None, Some(SequenceId(0)))
            .unwrap();
        assert_eq!(scene.sequence, SequenceId(0));
        assert_eq!(changes.len(), 3);

        let other = engine.add_sequence(Some("Specials".into()));
        let (scene, changes) = engine
            .record_cue(&[(ChannelId(6), 60)], None, Some(other))
            .unwrap();
        assert_eq!(scene, SceneRef::new(other, SceneId(1.0)));
        assert_eq!(changes, vec![ChannelLevel::new(ChannelId(6), 60)]);
        assert_eq!(engine.main_sequence(), SequenceId(0));
        assert!(engine.is_active(scene));
    }
}
