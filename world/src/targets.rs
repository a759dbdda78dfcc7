//! Observation targets owned by the world and the registry that exposes them.

use std::{collections::BTreeMap, time::Duration};

use strange_places_core::{
    Aabb, BoundingShape, EntanglementMember, EntanglementReceiver, Event, MultiplierLookup,
    ObservationTarget, Obstacle, QuantumDoorSpec, QuantumPlatformSpec, ShapeId, SpeedMediumSpec,
    TargetId, TargetRegistration, TargetRegistry, Vec2,
};

/// Trigger zone whose speed multiplier depends on being observed.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedMedium {
    shape: ShapeId,
    bounds: Aabb,
    slow_multiplier: f32,
    fast_multiplier: f32,
    observed_forces_fast: bool,
    observed: bool,
    current_multiplier: f32,
    pending_change: bool,
}

impl SpeedMedium {
    fn from_spec(spec: &SpeedMediumSpec) -> Self {
        Self {
            shape: spec.shape,
            bounds: spec.bounds,
            slow_multiplier: spec.slow_multiplier,
            fast_multiplier: spec.fast_multiplier,
            observed_forces_fast: spec.observed_forces_fast,
            observed: false,
            current_multiplier: spec.slow_multiplier,
            pending_change: false,
        }
    }

    /// Multiplier currently applied to edges bound to this medium.
    #[must_use]
    pub const fn current_multiplier(&self) -> f32 {
        self.current_multiplier
    }

    /// Last observed state reported by the observer.
    #[must_use]
    pub const fn is_observed(&self) -> bool {
        self.observed
    }

    /// Reports whether the medium is running at its fast multiplier.
    #[must_use]
    pub fn is_fast(&self) -> bool {
        self.current_multiplier >= (self.slow_multiplier + self.fast_multiplier) * 0.5
    }

    fn obstacle(&self) -> Obstacle {
        Obstacle {
            shape: self.shape,
            bounds: self.bounds,
            pass_through: true,
        }
    }
}

impl ObservationTarget for SpeedMedium {
    fn observation_point(&self) -> Vec2 {
        self.bounds.center()
    }

    fn bounding_shape(&self) -> Option<BoundingShape> {
        Some(BoundingShape {
            shape: self.shape,
            bounds: self.bounds,
        })
    }

    fn owns_shape(&self, shape: ShapeId) -> bool {
        shape == self.shape
    }

    fn set_observed(&mut self, observed: bool) {
        if self.observed == observed {
            return;
        }

        self.observed = observed;
        let multiplier = if observed && self.observed_forces_fast {
            self.fast_multiplier
        } else {
            self.slow_multiplier
        };
        if multiplier != self.current_multiplier {
            self.current_multiplier = multiplier;
            self.pending_change = true;
        }
    }
}

/// Door that flickers open and shut until someone looks at it.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumDoor {
    shape: ShapeId,
    bounds: Aabb,
    switch_interval: Duration,
    observed_forces_closed: bool,
    observed: bool,
    closed: bool,
    latched_open: bool,
    until_switch: Duration,
    pending_change: bool,
}

impl QuantumDoor {
    fn from_spec(spec: &QuantumDoorSpec) -> Self {
        Self {
            shape: spec.shape,
            bounds: spec.bounds,
            switch_interval: spec.switch_interval,
            observed_forces_closed: spec.observed_forces_closed,
            observed: false,
            closed: spec.start_closed,
            latched_open: false,
            until_switch: spec.switch_interval,
            pending_change: false,
        }
    }

    /// Whether the door currently blocks passage and sight.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a receiver opened the door for good.
    #[must_use]
    pub const fn is_latched_open(&self) -> bool {
        self.latched_open
    }

    /// Last observed state reported by the observer.
    #[must_use]
    pub const fn is_observed(&self) -> bool {
        self.observed
    }

    fn advance(&mut self, dt: Duration) {
        if self.observed || self.latched_open || self.switch_interval.is_zero() {
            return;
        }

        let mut remaining = dt;
        while remaining >= self.until_switch {
            remaining -= self.until_switch;
            self.closed = !self.closed;
            self.until_switch = self.switch_interval;
            self.pending_change = true;
        }
        self.until_switch -= remaining;
    }

    fn latch_open(&mut self) -> bool {
        if self.latched_open {
            return false;
        }

        self.latched_open = true;
        if self.closed {
            self.closed = false;
            self.pending_change = true;
        }
        true
    }

    fn obstacle(&self) -> Obstacle {
        Obstacle {
            shape: self.shape,
            bounds: self.bounds,
            pass_through: !self.closed,
        }
    }
}

impl ObservationTarget for QuantumDoor {
    fn observation_point(&self) -> Vec2 {
        self.bounds.center()
    }

    fn bounding_shape(&self) -> Option<BoundingShape> {
        Some(BoundingShape {
            shape: self.shape,
            bounds: self.bounds,
        })
    }

    fn owns_shape(&self, shape: ShapeId) -> bool {
        shape == self.shape
    }

    fn set_observed(&mut self, observed: bool) {
        if self.observed == observed {
            return;
        }

        self.observed = observed;
        if self.latched_open {
            return;
        }

        if observed && self.observed_forces_closed && !self.closed {
            self.closed = true;
            self.pending_change = true;
        }

        if !observed {
            self.until_switch = self.switch_interval;
        }
    }
}

/// Platform that hops between candidate positions until collapsed.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumPlatform {
    shape: ShapeId,
    size: Vec2,
    positions: Vec<Vec2>,
    index: usize,
    switch_interval: Duration,
    until_switch: Duration,
    allow_direct_observation: bool,
    solid_only_when_observed: bool,
    direct_observed: bool,
    group_observed: bool,
    collapsed: bool,
    pending_change: bool,
}

impl QuantumPlatform {
    fn from_spec(spec: &QuantumPlatformSpec) -> Option<Self> {
        if spec.positions.is_empty() {
            return None;
        }

        Some(Self {
            shape: spec.shape,
            size: spec.size,
            positions: spec.positions.clone(),
            index: 0,
            switch_interval: spec.switch_interval,
            until_switch: spec.switch_interval,
            allow_direct_observation: spec.allow_direct_observation,
            solid_only_when_observed: spec.solid_only_when_observed,
            direct_observed: false,
            group_observed: false,
            collapsed: false,
            pending_change: false,
        })
    }

    /// Centre of the platform at its current candidate position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.positions[self.index]
    }

    /// Whether the platform is frozen at a definite position.
    #[must_use]
    pub const fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Whether the entangled group currently holds the platform.
    #[must_use]
    pub const fn is_group_observed(&self) -> bool {
        self.group_observed
    }

    fn bounds(&self) -> Aabb {
        Aabb::from_center_size(self.position(), self.size)
    }

    fn advance(&mut self, dt: Duration) {
        if self.collapsed || self.positions.len() < 2 || self.switch_interval.is_zero() {
            return;
        }

        let mut remaining = dt;
        while remaining >= self.until_switch {
            remaining -= self.until_switch;
            self.index = (self.index + 1) % self.positions.len();
            self.until_switch = self.switch_interval;
        }
        self.until_switch -= remaining;
    }

    fn apply_observation(&mut self) {
        let effective =
            (self.allow_direct_observation && self.direct_observed) || self.group_observed;
        if effective == self.collapsed {
            return;
        }

        self.collapsed = effective;
        if !effective {
            self.until_switch = self.switch_interval;
        }
        self.pending_change = true;
    }

    fn obstacle(&self) -> Obstacle {
        Obstacle {
            shape: self.shape,
            bounds: self.bounds(),
            pass_through: self.solid_only_when_observed && !self.collapsed,
        }
    }
}

impl ObservationTarget for QuantumPlatform {
    fn observation_point(&self) -> Vec2 {
        self.position()
    }

    fn bounding_shape(&self) -> Option<BoundingShape> {
        Some(BoundingShape {
            shape: self.shape,
            bounds: self.bounds(),
        })
    }

    fn owns_shape(&self, shape: ShapeId) -> bool {
        shape == self.shape
    }

    fn set_observed(&mut self, observed: bool) {
        if self.direct_observed == observed {
            return;
        }

        self.direct_observed = observed;
        self.apply_observation();
    }

    fn as_entanglement_receiver(&mut self) -> Option<&mut dyn EntanglementReceiver> {
        Some(self)
    }
}

impl EntanglementReceiver for QuantumPlatform {
    fn set_group_observed(&mut self, observed: bool) {
        if self.group_observed == observed {
            return;
        }

        self.group_observed = observed;
        self.apply_observation();
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TargetState {
    Medium(SpeedMedium),
    Door(QuantumDoor),
    Platform(QuantumPlatform),
}

#[derive(Clone, Debug, PartialEq)]
struct TargetEntry {
    state: TargetState,
    entanglement: Option<EntanglementMember>,
}

/// Registry of every observation target placed in the world.
#[derive(Clone, Debug, Default)]
pub struct TargetPool {
    entries: BTreeMap<TargetId, TargetEntry>,
}

impl TargetPool {
    pub(crate) fn insert_medium(&mut self, spec: &SpeedMediumSpec) {
        self.insert(
            spec.id,
            TargetState::Medium(SpeedMedium::from_spec(spec)),
            spec.entanglement.clone(),
        );
    }

    pub(crate) fn insert_door(&mut self, spec: &QuantumDoorSpec) {
        self.insert(
            spec.id,
            TargetState::Door(QuantumDoor::from_spec(spec)),
            spec.entanglement.clone(),
        );
    }

    pub(crate) fn insert_platform(&mut self, spec: &QuantumPlatformSpec) -> bool {
        let Some(platform) = QuantumPlatform::from_spec(spec) else {
            return false;
        };
        self.insert(
            spec.id,
            TargetState::Platform(platform),
            spec.entanglement.clone(),
        );
        true
    }

    fn insert(
        &mut self,
        id: TargetId,
        state: TargetState,
        entanglement: Option<EntanglementMember>,
    ) {
        let _ = self.entries.insert(
            id,
            TargetEntry {
                state,
                entanglement,
            },
        );
    }

    /// Looks up a speed medium.
    #[must_use]
    pub fn speed_medium(&self, id: TargetId) -> Option<&SpeedMedium> {
        match self.entries.get(&id).map(|entry| &entry.state) {
            Some(TargetState::Medium(medium)) => Some(medium),
            _ => None,
        }
    }

    /// Looks up a quantum door.
    #[must_use]
    pub fn door(&self, id: TargetId) -> Option<&QuantumDoor> {
        match self.entries.get(&id).map(|entry| &entry.state) {
            Some(TargetState::Door(door)) => Some(door),
            _ => None,
        }
    }

    /// Looks up a quantum platform.
    #[must_use]
    pub fn platform(&self, id: TargetId) -> Option<&QuantumPlatform> {
        match self.entries.get(&id).map(|entry| &entry.state) {
            Some(TargetState::Platform(platform)) => Some(platform),
            _ => None,
        }
    }

    pub(crate) fn latch_door_open(&mut self, id: TargetId) -> bool {
        match self.entries.get_mut(&id).map(|entry| &mut entry.state) {
            Some(TargetState::Door(door)) => door.latch_open(),
            _ => false,
        }
    }

    pub(crate) fn advance(&mut self, dt: Duration) {
        for entry in self.entries.values_mut() {
            match &mut entry.state {
                TargetState::Medium(_) => {}
                TargetState::Door(door) => door.advance(dt),
                TargetState::Platform(platform) => platform.advance(dt),
            }
        }
    }

    pub(crate) fn append_obstacles(&self, out: &mut Vec<Obstacle>) {
        for entry in self.entries.values() {
            out.push(match &entry.state {
                TargetState::Medium(medium) => medium.obstacle(),
                TargetState::Door(door) => door.obstacle(),
                TargetState::Platform(platform) => platform.obstacle(),
            });
        }
    }

    pub(crate) fn drain_changes(&mut self, out: &mut Vec<Event>) {
        for (&id, entry) in &mut self.entries {
            match &mut entry.state {
                TargetState::Medium(medium) => {
                    if std::mem::take(&mut medium.pending_change) {
                        out.push(Event::MediumMultiplierChanged {
                            medium: id,
                            multiplier: medium.current_multiplier,
                        });
                    }
                }
                TargetState::Door(door) => {
                    if std::mem::take(&mut door.pending_change) {
                        out.push(Event::DoorStateChanged {
                            door: id,
                            closed: door.closed,
                        });
                    }
                }
                TargetState::Platform(platform) => {
                    if std::mem::take(&mut platform.pending_change) {
                        out.push(Event::PlatformStateChanged {
                            platform: id,
                            collapsed: platform.collapsed,
                            position: platform.position(),
                        });
                    }
                }
            }
        }
    }
}

impl TargetRegistry for TargetPool {
    fn registrations(&self, out: &mut Vec<TargetRegistration>) {
        out.extend(self.entries.iter().map(|(&target, entry)| TargetRegistration {
            target,
            entanglement: entry.entanglement.clone(),
        }));
    }

    fn target_mut(&mut self, target: TargetId) -> Option<&mut dyn ObservationTarget> {
        let entry = self.entries.get_mut(&target)?;
        let resolved: &mut dyn ObservationTarget = match &mut entry.state {
            TargetState::Medium(medium) => medium,
            TargetState::Door(door) => door,
            TargetState::Platform(platform) => platform,
        };
        Some(resolved)
    }
}

impl MultiplierLookup for TargetPool {
    fn current_multiplier(&self, medium: TargetId) -> Option<f32> {
        self.speed_medium(medium).map(SpeedMedium::current_multiplier)
    }
}
