#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative level state for Strange Places.
//!
//! The world owns the routing graph, the static occluders, the observation
//! targets and the probe receivers. It is mutated exclusively through
//! [`apply`] and read through [`query`]; the observation system borrows it
//! through [`observation_parts`], which hands out the occluder set and the
//! target registry as disjoint borrows.

mod graph;
mod targets;

use std::time::Duration;

use strange_places_core::{Aabb, Command, Event, Obstacle, ObstacleView, TargetId, Vec2};

pub use graph::{GraphEdge, GraphNode, WeightedGraph};
pub use targets::{QuantumDoor, QuantumPlatform, SpeedMedium, TargetPool};

/// Represents the authoritative Strange Places level state.
#[derive(Debug, Default)]
pub struct World {
    graph: WeightedGraph,
    static_obstacles: Vec<Obstacle>,
    targets: TargetPool,
    receivers: Vec<Receiver>,
    scene: Vec<Obstacle>,
    elapsed: Duration,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild_scene(&mut self) {
        self.scene.clear();
        self.scene.extend_from_slice(&self.static_obstacles);
        self.targets.append_obstacles(&mut self.scene);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Receiver {
    bounds: Aabb,
    door: TargetId,
    opened: bool,
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::AddNode { node, position } => {
            world.graph.insert_node(node, position);
        }
        Command::SetEdges { node, edges } => {
            if !world.graph.set_edges(node, &edges) {
                tracing::warn!(node = node.get(), "ignoring edges for unknown node");
            }
        }
        Command::AddObstacle { obstacle } => {
            world.static_obstacles.push(obstacle);
        }
        Command::AddSpeedMedium(spec) => {
            world.targets.insert_medium(&spec);
        }
        Command::AddQuantumDoor(spec) => {
            world.targets.insert_door(&spec);
        }
        Command::AddQuantumPlatform(spec) => {
            if !world.targets.insert_platform(&spec) {
                tracing::warn!(
                    platform = spec.id.get(),
                    "ignoring quantum platform without candidate positions"
                );
            }
        }
        Command::AddReceiver(spec) => {
            world.receivers.push(Receiver {
                bounds: spec.bounds,
                door: spec.door,
                opened: false,
            });
        }
        Command::Tick { dt } => {
            world.elapsed = world.elapsed.saturating_add(dt);
            out_events.push(Event::TimeAdvanced { dt });
            world.targets.advance(dt);
            world.targets.drain_changes(out_events);
        }
        Command::ProbeMoved { position } => {
            probe_moved(world, position, out_events);
        }
    }
}

fn probe_moved(world: &mut World, position: Vec2, out_events: &mut Vec<Event>) {
    for receiver in &mut world.receivers {
        if receiver.opened || !receiver.bounds.contains(position) {
            continue;
        }

        receiver.opened = true;
        if world.targets.latch_door_open(receiver.door) {
            tracing::info!(door = receiver.door.get(), "probe reached receiver");
            out_events.push(Event::ReceiverOpened {
                door: receiver.door,
            });
        }
    }
    world.targets.drain_changes(out_events);
}

/// Splits the world into the occluder set and the mutable target registry.
///
/// The occluder set is rebuilt from the static obstacles and the current
/// shape of every target, so doors and platforms that changed state since the
/// previous frame are reflected immediately.
pub fn observation_parts(world: &mut World) -> (ObstacleView<'_>, &mut TargetPool) {
    world.rebuild_scene();
    (ObstacleView::new(&world.scene), &mut world.targets)
}

/// Drains state changes caused by observation reports into events.
///
/// Speed media report `MediumMultiplierChanged`, which drivers forward to the
/// router as a replan request.
pub fn flush_target_changes(world: &mut World, out_events: &mut Vec<Event>) {
    world.targets.drain_changes(out_events);
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::{QuantumDoor, QuantumPlatform, SpeedMedium, TargetPool, WeightedGraph, World};
    use strange_places_core::TargetId;

    /// Provides read-only access to the routing graph.
    #[must_use]
    pub fn graph(world: &World) -> &WeightedGraph {
        &world.graph
    }

    /// Live multiplier source for medium-driven edges.
    #[must_use]
    pub fn medium_multipliers(world: &World) -> &TargetPool {
        &world.targets
    }

    /// Looks up a speed medium.
    #[must_use]
    pub fn speed_medium(world: &World, id: TargetId) -> Option<&SpeedMedium> {
        world.targets.speed_medium(id)
    }

    /// Looks up a quantum door.
    #[must_use]
    pub fn door(world: &World, id: TargetId) -> Option<&QuantumDoor> {
        world.targets.door(id)
    }

    /// Looks up a quantum platform.
    #[must_use]
    pub fn platform(world: &World, id: TargetId) -> Option<&QuantumPlatform> {
        world.targets.platform(id)
    }

    /// Number of receivers the probe has already triggered.
    #[must_use]
    pub fn opened_receivers(world: &World) -> usize {
        world
            .receivers
            .iter()
            .filter(|receiver| receiver.opened)
            .count()
    }

    /// Total simulated time applied through `Tick` commands.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strange_places_core::{
        EdgeMultiplier, EdgeSpec, MultiplierLookup, NodeId, QuantumDoorSpec, ReceiverSpec, ShapeId,
        SpeedMediumSpec, TargetRegistry,
    };

    fn door_command() -> Command {
        Command::AddQuantumDoor(QuantumDoorSpec {
            id: TargetId::new(2),
            shape: ShapeId::new(20),
            bounds: Aabb::from_center_size(Vec2::new(8.2, -0.8), Vec2::new(1.0, 3.0)),
            switch_interval: Duration::from_millis(350),
            start_closed: true,
            observed_forces_closed: true,
            entanglement: None,
        })
    }

    fn medium_command() -> Command {
        Command::AddSpeedMedium(SpeedMediumSpec {
            id: TargetId::new(1),
            shape: ShapeId::new(10),
            bounds: Aabb::from_center_size(Vec2::new(0.0, -0.6), Vec2::new(6.0, 2.0)),
            slow_multiplier: 0.35,
            fast_multiplier: 1.75,
            observed_forces_fast: true,
            entanglement: None,
        })
    }

    #[test]
    fn edges_for_unknown_nodes_are_ignored() {
        let mut world = World::new();
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::SetEdges {
                node: NodeId::new(4),
                edges: vec![EdgeSpec {
                    target: NodeId::new(5),
                    multiplier: EdgeMultiplier::Fixed(1.0),
                }],
            },
            &mut events,
        );

        assert!(query::graph(&world).is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn tick_advances_clock_and_flickers_doors() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, door_command(), &mut events);

        apply(
            &mut world,
            Command::Tick {
                dt: Duration::from_millis(400),
            },
            &mut events,
        );

        assert_eq!(query::elapsed(&world), Duration::from_millis(400));
        assert_eq!(
            events,
            vec![
                Event::TimeAdvanced {
                    dt: Duration::from_millis(400)
                },
                Event::DoorStateChanged {
                    door: TargetId::new(2),
                    closed: false
                },
            ]
        );
    }

    #[test]
    fn observing_medium_reports_multiplier_change() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, medium_command(), &mut events);

        let (_, targets) = observation_parts(&mut world);
        targets
            .target_mut(TargetId::new(1))
            .expect("medium registered")
            .set_observed(true);
        flush_target_changes(&mut world, &mut events);

        assert_eq!(
            events,
            vec![Event::MediumMultiplierChanged {
                medium: TargetId::new(1),
                multiplier: 1.75
            }]
        );
        assert_eq!(
            query::medium_multipliers(&world).current_multiplier(TargetId::new(1)),
            Some(1.75)
        );
    }

    #[test]
    fn scene_reflects_door_state() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, door_command(), &mut events);
        apply(
            &mut world,
            Command::AddObstacle {
                obstacle: Obstacle {
                    shape: ShapeId::new(1),
                    bounds: Aabb::from_center_size(Vec2::new(0.0, -2.2), Vec2::new(20.0, 1.0)),
                    pass_through: false,
                },
            },
            &mut events,
        );

        let (scene, _) = observation_parts(&mut world);
        let door = scene
            .iter()
            .find(|obstacle| obstacle.shape == ShapeId::new(20))
            .expect("door contributes a shape");
        assert!(!door.pass_through);
        assert_eq!(scene.iter().count(), 2);
    }

    #[test]
    fn probe_entering_receiver_opens_door_once() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, door_command(), &mut events);
        apply(
            &mut world,
            Command::AddReceiver(ReceiverSpec {
                bounds: Aabb::from_center_size(Vec2::new(7.0, -0.8), Vec2::new(0.7, 0.7)),
                door: TargetId::new(2),
            }),
            &mut events,
        );

        apply(
            &mut world,
            Command::ProbeMoved {
                position: Vec2::new(7.1, -0.8),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::ProbeMoved {
                position: Vec2::new(7.0, -0.8),
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::ReceiverOpened {
                    door: TargetId::new(2)
                },
                Event::DoorStateChanged {
                    door: TargetId::new(2),
                    closed: false
                },
            ]
        );
        assert_eq!(query::opened_receivers(&world), 1);
        let door = query::door(&world, TargetId::new(2)).expect("door exists");
        assert!(door.is_latched_open());
    }

    #[test]
    fn probe_outside_receiver_changes_nothing() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(&mut world, door_command(), &mut events);
        apply(
            &mut world,
            Command::AddReceiver(ReceiverSpec {
                bounds: Aabb::from_center_size(Vec2::new(7.0, -0.8), Vec2::new(0.7, 0.7)),
                door: TargetId::new(2),
            }),
            &mut events,
        );

        apply(
            &mut world,
            Command::ProbeMoved {
                position: Vec2::new(-6.0, -0.8),
            },
            &mut events,
        );

        assert!(events.is_empty());
        assert_eq!(query::opened_receivers(&world), 0);
    }
}
