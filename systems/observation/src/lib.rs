#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-frame observation state machine for the observer cone.
//!
//! Every active frame the tracker tests each registered target against the
//! cone, extends direct hits by a short grace window so that targets near the
//! cone's rim do not flicker, and propagates beacon observations to every
//! entanglement receiver sharing the beacon's key.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use strange_places_core::{
    Event, RayCaster, ShapeId, TargetId, TargetRegistration, TargetRegistry, Vec2,
};
use strange_places_system_visibility::{ConeConfig, VisibilityField};

/// Tunable parameters of the observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObserverConfig {
    /// Maximum distance at which targets can be observed.
    pub max_distance: f32,
    /// Full opening angle of the cone in degrees.
    pub cone_angle_degrees: f32,
    /// How long a direct observation keeps a target observed.
    pub grace: Duration,
    /// Whether occluders hide targets.
    pub require_line_of_sight: bool,
    /// Offset applied to ray origins so rays leave the observer's body.
    pub ray_start_bias: f32,
    /// Additional samples placed evenly along each edge of a target's box.
    pub perimeter_samples_per_edge: u32,
    /// Interval between registry refresh attempts while no targets are known.
    pub auto_refresh_interval: Duration,
    /// Observer's own shape, excluded from occlusion.
    pub self_shape: Option<ShapeId>,
}

impl ObserverConfig {
    /// Half of the cone's opening angle.
    #[must_use]
    pub fn half_angle_degrees(&self) -> f32 {
        self.cone_angle_degrees * 0.5
    }

    fn cone(&self) -> ConeConfig {
        ConeConfig {
            max_distance: self.max_distance,
            require_line_of_sight: self.require_line_of_sight,
            ray_start_bias: self.ray_start_bias,
            perimeter_samples_per_edge: self.perimeter_samples_per_edge,
            self_shape: self.self_shape,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            max_distance: 7.0,
            cone_angle_degrees: 60.0,
            grace: Duration::from_millis(80),
            require_line_of_sight: true,
            ray_start_bias: 0.15,
            perimeter_samples_per_edge: 1,
            auto_refresh_interval: Duration::from_secs(1),
            self_shape: None,
        }
    }
}

/// Observer pose for a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObserverPose {
    /// World-space position of the observer.
    pub origin: Vec2,
    /// Aim direction; need not be normalised.
    pub aim: Vec2,
    /// Whether observation is switched on this frame.
    pub active: bool,
}

/// Tracks which targets are observed and reports changes as events.
#[derive(Debug)]
pub struct ObservationTracker {
    config: ObserverConfig,
    field: VisibilityField,
    registrations: Vec<TargetRegistration>,
    last_direct: HashMap<TargetId, Duration>,
    reported: HashMap<TargetId, bool>,
    group_reported: HashMap<TargetId, bool>,
    group_index: HashMap<String, usize>,
    groups: Vec<Option<usize>>,
    beacon_groups: Vec<bool>,
    live: HashSet<TargetId>,
    last_refresh: Option<Duration>,
}

impl ObservationTracker {
    /// Creates a tracker with an empty registry.
    #[must_use]
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            config,
            field: VisibilityField::new(config.cone()),
            registrations: Vec::new(),
            last_direct: HashMap::new(),
            reported: HashMap::new(),
            group_reported: HashMap::new(),
            group_index: HashMap::new(),
            groups: Vec::new(),
            beacon_groups: Vec::new(),
            live: HashSet::new(),
            last_refresh: None,
        }
    }

    /// Number of targets captured by the last refresh.
    #[must_use]
    pub fn registered_len(&self) -> usize {
        self.registrations.len()
    }

    /// Time of the last direct observation of `target`, if any is remembered.
    #[must_use]
    pub fn last_direct_observation(&self, target: TargetId) -> Option<Duration> {
        self.last_direct.get(&target).copied()
    }

    /// Last observed state reported to `target`.
    #[must_use]
    pub fn is_observed(&self, target: TargetId) -> bool {
        self.reported.get(&target).copied().unwrap_or(false)
    }

    /// Last group-observed state reported to the entanglement receiver `target`.
    #[must_use]
    pub fn is_group_observed(&self, target: TargetId) -> bool {
        self.group_reported.get(&target).copied().unwrap_or(false)
    }

    /// Rebuilds the registry from the live target population.
    ///
    /// Debounce timestamps and reported states of targets that disappeared
    /// are discarded.
    pub fn refresh_targets<R>(&mut self, now: Duration, registry: &R)
    where
        R: TargetRegistry + ?Sized,
    {
        self.registrations.clear();
        registry.registrations(&mut self.registrations);
        self.last_refresh = Some(now);

        self.group_index.clear();
        self.groups.clear();
        for registration in &self.registrations {
            let group = registration
                .entanglement
                .as_ref()
                .map(|member| group_of(&mut self.group_index, member.key()));
            self.groups.push(group);
        }

        self.live.clear();
        self.live
            .extend(self.registrations.iter().map(|entry| entry.target));
        let live = &self.live;
        self.last_direct.retain(|target, _| live.contains(target));
        self.reported.retain(|target, _| live.contains(target));
        self.group_reported.retain(|target, _| live.contains(target));

        tracing::debug!(
            targets = self.registrations.len(),
            "refreshed observation targets"
        );
    }

    /// Advances the tracker by one frame.
    ///
    /// Reports the observed state to every registered target and the
    /// group-observed state to every entanglement receiver, then appends an
    /// event for each reported value that differs from the previous report.
    pub fn tick<R, C>(
        &mut self,
        now: Duration,
        pose: ObserverPose,
        registry: &mut R,
        scene: &C,
        out: &mut Vec<Event>,
    ) where
        R: TargetRegistry + ?Sized,
        C: RayCaster + ?Sized,
    {
        if self.needs_refresh(now) {
            self.refresh_targets(now, registry);
        }

        if pose.active {
            self.observe(now, pose, registry, scene, out);
        } else {
            self.release_all(registry, out);
        }
    }

    fn needs_refresh(&self, now: Duration) -> bool {
        if !self.registrations.is_empty() {
            return false;
        }

        match self.last_refresh {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.auto_refresh_interval,
        }
    }

    fn observe<R, C>(
        &mut self,
        now: Duration,
        pose: ObserverPose,
        registry: &mut R,
        scene: &C,
        out: &mut Vec<Event>,
    ) where
        R: TargetRegistry + ?Sized,
        C: RayCaster + ?Sized,
    {
        let half_angle = self.config.half_angle_degrees();
        let grace = self.config.grace;
        self.beacon_groups.clear();
        self.beacon_groups.resize(self.group_index.len(), false);

        for (registration, &group) in self.registrations.iter().zip(&self.groups) {
            let id = registration.target;
            let Some(target) = registry.target_mut(id) else {
                continue;
            };

            let direct =
                self.field
                    .is_target_visible(pose.origin, pose.aim, half_angle, &*target, scene);
            if direct {
                let _ = self.last_direct.insert(id, now);
            }

            let within_grace = !grace.is_zero()
                && self
                    .last_direct
                    .get(&id)
                    .is_some_and(|&seen| now.saturating_sub(seen) <= grace);
            let observed = direct || within_grace;

            target.set_observed(observed);
            report_target(&mut self.reported, id, observed, out);

            let beacon = registration
                .entanglement
                .as_ref()
                .is_some_and(|member| member.is_beacon());
            if observed && beacon {
                if let Some(flag) = group.and_then(|group| self.beacon_groups.get_mut(group)) {
                    *flag = true;
                }
            }
        }

        for (registration, &group) in self.registrations.iter().zip(&self.groups) {
            let id = registration.target;
            let Some(target) = registry.target_mut(id) else {
                continue;
            };
            let Some(receiver) = target.as_entanglement_receiver() else {
                continue;
            };

            let group_observed = group
                .and_then(|group| self.beacon_groups.get(group).copied())
                .unwrap_or(false);
            receiver.set_group_observed(group_observed);
            report_group(&mut self.group_reported, id, group_observed, out);
        }
    }

    fn release_all<R>(&mut self, registry: &mut R, out: &mut Vec<Event>)
    where
        R: TargetRegistry + ?Sized,
    {
        for registration in &self.registrations {
            let id = registration.target;
            let Some(target) = registry.target_mut(id) else {
                continue;
            };

            target.set_observed(false);
            report_target(&mut self.reported, id, false, out);

            if let Some(receiver) = target.as_entanglement_receiver() {
                receiver.set_group_observed(false);
                report_group(&mut self.group_reported, id, false, out);
            }
        }
    }
}

impl Default for ObservationTracker {
    fn default() -> Self {
        Self::new(ObserverConfig::default())
    }
}

fn group_of(index: &mut HashMap<String, usize>, key: &str) -> usize {
    if let Some(&group) = index.get(key) {
        return group;
    }

    let group = index.len();
    let _ = index.insert(key.to_owned(), group);
    group
}

fn report_target(
    reported: &mut HashMap<TargetId, bool>,
    target: TargetId,
    observed: bool,
    out: &mut Vec<Event>,
) {
    let previous = reported.insert(target, observed).unwrap_or(false);
    if previous != observed {
        tracing::debug!(target = target.get(), observed, "observation changed");
        out.push(Event::TargetObservationChanged { target, observed });
    }
}

fn report_group(
    reported: &mut HashMap<TargetId, bool>,
    target: TargetId,
    observed: bool,
    out: &mut Vec<Event>,
) {
    let previous = reported.insert(target, observed).unwrap_or(false);
    if previous != observed {
        tracing::debug!(target = target.get(), observed, "entanglement changed");
        out.push(Event::EntanglementObservationChanged { target, observed });
    }
}
