use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use strange_places_core::{
    Aabb, Command, EntanglementMember, Event, Obstacle, QuantumDoorSpec, QuantumPlatformSpec,
    ShapeId, SpeedMediumSpec, TargetId, Vec2,
};
use strange_places_system_observation::{ObservationTracker, ObserverPose};
use strange_places_world::{self as world, query, World};

const MEDIUM: TargetId = TargetId::new(1);
const DOOR: TargetId = TargetId::new(2);
const PLATFORM: TargetId = TargetId::new(3);
const FRAME: Duration = Duration::from_millis(16);

#[test]
fn deterministic_replay_produces_identical_logs() {
    let first = replay();
    let second = replay();

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn replay_collapses_targets_while_they_are_watched() {
    let outcome = replay();

    assert!(outcome.events.contains(&Event::TargetObservationChanged {
        target: DOOR,
        observed: true
    }));
    assert!(outcome.events.contains(&Event::EntanglementObservationChanged {
        target: PLATFORM,
        observed: true
    }));
    assert!(outcome.events.contains(&Event::MediumMultiplierChanged {
        medium: MEDIUM,
        multiplier: 1.75
    }));
    assert!(outcome.events.contains(&Event::MediumMultiplierChanged {
        medium: MEDIUM,
        multiplier: 0.35
    }));
    assert!(!outcome.medium_fast);
    assert!(!outcome.platform_collapsed);
}

fn replay() -> ReplayOutcome {
    let mut world = World::new();
    let mut tracker = ObservationTracker::default();
    let mut log = Vec::new();

    for command in scripted_setup() {
        world::apply(&mut world, command, &mut log);
    }

    for frame in 0..90_u32 {
        let mut events = Vec::new();
        world::apply(&mut world, Command::Tick { dt: FRAME }, &mut events);

        let now = query::elapsed(&world);
        let pose = scripted_pose(frame);
        let (scene, targets) = world::observation_parts(&mut world);
        tracker.tick(now, pose, targets, &scene, &mut events);
        world::flush_target_changes(&mut world, &mut events);

        log.extend(events);
    }

    let medium_fast = query::speed_medium(&world, MEDIUM)
        .map(|medium| medium.is_fast())
        .unwrap_or(true);
    let platform_collapsed = query::platform(&world, PLATFORM)
        .map(|platform| platform.is_collapsed())
        .unwrap_or(true);

    ReplayOutcome {
        events: log,
        medium_fast,
        platform_collapsed,
    }
}

fn scripted_pose(frame: u32) -> ObserverPose {
    let origin = Vec2::new(2.5, -0.8);
    match frame {
        0..=29 => ObserverPose {
            origin,
            aim: Vec2::X,
            active: true,
        },
        30..=59 => ObserverPose {
            origin,
            aim: -Vec2::X,
            active: true,
        },
        _ => ObserverPose {
            origin,
            aim: Vec2::X,
            active: false,
        },
    }
}

fn scripted_setup() -> Vec<Command> {
    vec![
        Command::AddObstacle {
            obstacle: Obstacle {
                shape: ShapeId::new(1),
                bounds: Aabb::from_center_size(Vec2::new(0.0, -2.2), Vec2::new(20.0, 1.0)),
                pass_through: false,
            },
        },
        Command::AddSpeedMedium(SpeedMediumSpec {
            id: MEDIUM,
            shape: ShapeId::new(10),
            bounds: Aabb::from_center_size(Vec2::new(0.0, -0.6), Vec2::new(6.0, 2.0)),
            slow_multiplier: 0.35,
            fast_multiplier: 1.75,
            observed_forces_fast: true,
            entanglement: None,
        }),
        Command::AddQuantumDoor(QuantumDoorSpec {
            id: DOOR,
            shape: ShapeId::new(20),
            bounds: Aabb::from_center_size(Vec2::new(8.2, -0.8), Vec2::new(1.0, 3.0)),
            switch_interval: Duration::from_millis(350),
            start_closed: true,
            observed_forces_closed: true,
            entanglement: EntanglementMember::new("bridge", true),
        }),
        Command::AddQuantumPlatform(QuantumPlatformSpec {
            id: PLATFORM,
            shape: ShapeId::new(30),
            size: Vec2::new(2.0, 0.3),
            positions: vec![Vec2::new(5.0, 3.0), Vec2::new(5.0, 4.0)],
            switch_interval: Duration::from_millis(180),
            allow_direct_observation: false,
            solid_only_when_observed: true,
            entanglement: EntanglementMember::new("bridge", false),
        }),
    ]
}

#[derive(Debug, PartialEq)]
struct ReplayOutcome {
    events: Vec<Event>,
    medium_fast: bool,
    platform_collapsed: bool,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for event in &self.events {
            format!("{event:?}").hash(&mut hasher);
        }
        self.medium_fast.hash(&mut hasher);
        self.platform_collapsed.hash(&mut hasher);
        hasher.finish()
    }
}
