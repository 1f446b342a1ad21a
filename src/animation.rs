use glam::{Quat, Vec3};
use gltf::animation::util::ReadOutputs;

use crate::model::Buffers;
use crate::scene_graph::{ObjectId, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

#[derive(Debug, Clone)]
pub enum ChannelValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

/// Keyframes driving one property of one asset node.
#[derive(Debug, Clone)]
pub struct Channel {
    pub node: usize,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|channel| channel.times.last().copied())
            .fold(0.0, f32::max);

        Self {
            name: name.into(),
            duration,
            channels,
        }
    }

    /// Reads the node transform channels of a glTF animation. Morph target
    /// weights are not supported and are dropped.
    pub fn from_gltf(animation: gltf::Animation, buffers: Buffers) -> anyhow::Result<Self> {
        let name = animation
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("Animation {}", animation.index()));

        let mut channels = Vec::new();

        for channel in animation.channels() {
            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let node = channel.target().node().index();

            let times: Vec<f32> = reader
                .read_inputs()
                .ok_or_else(|| anyhow::anyhow!("Channel of {} has no keyframe times", name))?
                .collect();

            let outputs = reader
                .read_outputs()
                .ok_or_else(|| anyhow::anyhow!("Channel of {} has no keyframe values", name))?;

            let (interpolation, cubic) = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Linear => (Interpolation::Linear, false),
                gltf::animation::Interpolation::Step => (Interpolation::Step, false),
                gltf::animation::Interpolation::CubicSpline => (Interpolation::Linear, true),
            };

            let values = match outputs {
                ReadOutputs::Translations(values) => {
                    ChannelValues::Translation(keyframe_values(values.map(Vec3::from), cubic))
                }
                ReadOutputs::Rotations(values) => ChannelValues::Rotation(keyframe_values(
                    values.into_f32().map(Quat::from_array),
                    cubic,
                )),
                ReadOutputs::Scales(values) => {
                    ChannelValues::Scale(keyframe_values(values.map(Vec3::from), cubic))
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    log::debug!("Skipping morph target channel in {}", name);
                    continue;
                }
            };

            if values.len() != times.len() {
                return Err(anyhow::anyhow!(
                    "Channel of {} has {} times but {} values",
                    name,
                    times.len(),
                    values.len()
                ));
            }

            channels.push(Channel {
                node,
                interpolation,
                times,
                values,
            });
        }

        Ok(Self::new(name, channels))
    }
}

impl ChannelValues {
    pub fn len(&self) -> usize {
        match self {
            ChannelValues::Translation(values) | ChannelValues::Scale(values) => values.len(),
            ChannelValues::Rotation(values) => values.len(),
        }
    }
}

/// Cubic spline outputs are (in tangent, value, out tangent) triplets, only the
/// value is kept.
fn keyframe_values<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values.skip(1).step_by(3).collect()
    } else {
        values.collect()
    }
}

fn sample<T: Copy>(
    times: &[f32],
    values: &[T],
    time: f32,
    interpolation: Interpolation,
    mix: impl Fn(T, T, f32) -> T,
) -> Option<T> {
    let (&first_time, &last_time) = (times.first()?, times.last()?);

    if time <= first_time {
        return values.first().copied();
    }

    if time >= last_time {
        return values.last().copied();
    }

    let next = times.partition_point(|&keyframe| keyframe <= time);
    // NaN keyframe times break the ordering partition_point relies on
    let previous = next.checked_sub(1)?;
    let (from, to) = (*values.get(previous)?, *values.get(next)?);

    match interpolation {
        Interpolation::Step => Some(from),
        Interpolation::Linear => {
            let (start, end) = (*times.get(previous)?, *times.get(next)?);
            let span = end - start;
            let factor = if span > 0.0 {
                (time - start) / span
            } else {
                0.0
            };
            Some(mix(from, to, factor))
        }
    }
}

impl Channel {
    fn apply(&self, time: f32, target: ObjectId, scene: &mut Scene) {
        match &self.values {
            ChannelValues::Translation(values) => {
                if let Some(value) = sample(&self.times, values, time, self.interpolation, Vec3::lerp)
                {
                    scene.set_object_translation(target, value);
                }
            }
            ChannelValues::Rotation(values) => {
                if let Some(value) = sample(&self.times, values, time, self.interpolation, Quat::slerp)
                {
                    scene.set_object_rotation(target, value.normalize());
                }
            }
            ChannelValues::Scale(values) => {
                if let Some(value) = sample(&self.times, values, time, self.interpolation, Vec3::lerp)
                {
                    scene.set_object_scale(target, value);
                }
            }
        }
    }
}

/// Playback state of one clip inside a mixer. Actions loop until stopped.
#[derive(Debug, Clone)]
pub struct AnimationAction {
    clip: AnimationClip,
    time: f32,
    running: bool,
}

impl AnimationAction {
    pub fn play(&mut self) -> &mut Self {
        self.running = true;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.running = false;
        self.time = 0.0;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    #[allow(dead_code)]
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }
}

/// Drives the actions of one spawned asset. `bindings[i]` is the scene object
/// animated by channels targeting asset node `i`.
pub struct AnimationMixer {
    bindings: Vec<ObjectId>,
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    pub fn new(bindings: Vec<ObjectId>) -> Self {
        Self {
            bindings,
            actions: Vec::new(),
        }
    }

    /// Returns the action for `clip`, creating it stopped if the mixer has none yet.
    pub fn clip_action(&mut self, clip: &AnimationClip) -> &mut AnimationAction {
        let index = match self
            .actions
            .iter()
            .position(|action| action.clip.name == clip.name)
        {
            Some(index) => index,
            None => {
                self.actions.push(AnimationAction {
                    clip: clip.clone(),
                    time: 0.0,
                    running: false,
                });
                self.actions.len() - 1
            }
        };

        &mut self.actions[index]
    }

    #[allow(dead_code)]
    pub fn actions(&self) -> &[AnimationAction] {
        &self.actions
    }

    pub fn running_actions(&self) -> impl Iterator<Item = &AnimationAction> {
        self.actions.iter().filter(|action| action.running)
    }

    pub fn update(&mut self, delta: f32, scene: &mut Scene) {
        for action in self.actions.iter_mut().filter(|action| action.is_running()) {
            action.time += delta;

            if action.clip.duration > 0.0 {
                action.time = action.time.rem_euclid(action.clip.duration);
            }

            for channel in &action.clip.channels {
                let Some(&target) = self.bindings.get(channel.node) else {
                    continue;
                };

                channel.apply(action.time, target, scene);
            }
        }
    }

    pub fn stop_all_action(&mut self) {
        for action in &mut self.actions {
            action.stop();
        }
    }
}
