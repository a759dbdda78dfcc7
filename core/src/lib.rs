#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Strange Places engines.
//!
//! This crate defines the message surface and capability traits that connect
//! the authoritative world, the pure observation and routing systems, and the
//! adapters that drive them. Adapters submit [`Command`] values describing
//! desired mutations, the world executes those commands via its `apply` entry
//! point, and then broadcasts [`Event`] values. Systems never reach into a
//! global scene: they receive targets through [`TargetRegistry`], occluders
//! through [`RayCaster`], and dynamic edge speeds through [`MultiplierLookup`].

use std::time::Duration;

pub use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Smallest multiplier an edge may report; keeps time costs finite.
pub const MIN_EDGE_MULTIPLIER: f32 = 0.01;

/// Unique identifier assigned to an observation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(u32);

impl TargetId {
    /// Creates a new target identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a collision shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(u32);

impl ShapeId {
    /// Creates a new shape identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a routing graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new node identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Axis-aligned bounding box expressed in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    min: Vec2,
    max: Vec2,
}

impl Aabb {
    /// Creates a box from two opposite corners, normalising their order.
    #[must_use]
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box centred on `center` with the provided full extents.
    #[must_use]
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Geometric centre of the box.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Corners in counter-clockwise order starting at the minimum corner.
    #[must_use]
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Reports whether the point lies inside or on the boundary of the box.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Point on or inside the box nearest to `point`.
    #[must_use]
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min, self.max)
    }

    /// Distance along a unit direction at which a ray enters the box.
    ///
    /// Rays starting inside the box report a distance of zero. Hits beyond
    /// `max_distance` are ignored.
    #[must_use]
    pub fn ray_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32> {
        let origin = origin.to_array();
        let direction = direction.to_array();
        let lower = self.min.to_array();
        let upper = self.max.to_array();

        let mut t_enter = 0.0_f32;
        let mut t_exit = max_distance;

        for axis in 0..2 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < f32::EPSILON {
                if o < lower[axis] || o > upper[axis] {
                    return None;
                }
                continue;
            }

            let inverse = 1.0 / d;
            let mut near = (lower[axis] - o) * inverse;
            let mut far = (upper[axis] - o) * inverse;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }

            t_enter = t_enter.max(near);
            t_exit = t_exit.min(far);
            if t_enter > t_exit {
                return None;
            }
        }

        Some(t_enter)
    }
}

/// Collision shape exposed by a target for visibility sampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingShape {
    /// Identifier of the shape used to attribute ray hits.
    pub shape: ShapeId,
    /// World-space bounds of the shape.
    pub bounds: Aabb,
}

/// Shape that rays may intersect while testing line of sight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    /// Identifier of the shape.
    pub shape: ShapeId,
    /// World-space bounds of the shape.
    pub bounds: Aabb,
    /// Trigger volumes only count as hits for the target that owns them.
    pub pass_through: bool,
}

/// Single intersection reported by a [`RayCaster`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Shape that the ray intersected.
    pub shape: ShapeId,
    /// Distance from the ray origin to the entry point.
    pub distance: f32,
    /// Whether the intersected shape is a trigger volume.
    pub pass_through: bool,
}

/// Source of ray intersections used for occlusion testing.
pub trait RayCaster {
    /// Clears `out` and fills it with every shape hit by the ray.
    ///
    /// `direction` is expected to be a unit vector.
    fn cast_all(&self, origin: Vec2, direction: Vec2, max_distance: f32, out: &mut Vec<RayHit>);
}

/// Read-only view over a slice of obstacles.
#[derive(Clone, Copy, Debug)]
pub struct ObstacleView<'a> {
    obstacles: &'a [Obstacle],
}

impl<'a> ObstacleView<'a> {
    /// Captures a new view backed by the provided obstacles.
    #[must_use]
    pub const fn new(obstacles: &'a [Obstacle]) -> Self {
        Self { obstacles }
    }

    /// An empty scene with nothing to hit.
    #[must_use]
    pub const fn empty() -> Self {
        Self { obstacles: &[] }
    }

    /// Iterator over the captured obstacles.
    pub fn iter(&self) -> impl Iterator<Item = &'a Obstacle> {
        self.obstacles.iter()
    }
}

impl RayCaster for ObstacleView<'_> {
    fn cast_all(&self, origin: Vec2, direction: Vec2, max_distance: f32, out: &mut Vec<RayHit>) {
        out.clear();
        for obstacle in self.obstacles {
            let bounds = obstacle.bounds;
            if let Some(distance) = bounds.ray_distance(origin, direction, max_distance) {
                out.push(RayHit {
                    shape: obstacle.shape,
                    distance,
                    pass_through: obstacle.pass_through,
                });
            }
        }
    }
}

/// Capability implemented by anything the observer cone can collapse.
pub trait ObservationTarget {
    /// Fallback sample point used when no bounding shape exists.
    fn observation_point(&self) -> Vec2;

    /// Primary collision shape, if the target currently has one.
    fn bounding_shape(&self) -> Option<BoundingShape>;

    /// Reports whether the shape belongs to this target.
    fn owns_shape(&self, shape: ShapeId) -> bool;

    /// Receives the observed state computed for the current frame.
    fn set_observed(&mut self, observed: bool);

    /// Optional entanglement capability.
    fn as_entanglement_receiver(&mut self) -> Option<&mut dyn EntanglementReceiver> {
        None
    }
}

/// Capability implemented by targets that react to their group being observed.
pub trait EntanglementReceiver {
    /// Receives whether any beacon sharing this target's key is observed.
    fn set_group_observed(&mut self, observed: bool);
}

/// Entanglement metadata attached to a target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntanglementMember {
    key: String,
    beacon: bool,
}

impl EntanglementMember {
    /// Creates membership for the trimmed key, or `None` when the key is blank.
    #[must_use]
    pub fn new(key: &str, beacon: bool) -> Option<Self> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(Self {
            key: trimmed.to_owned(),
            beacon,
        })
    }

    /// Group key shared by every member of the entangled group.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether observing this member observes its whole group.
    #[must_use]
    pub const fn is_beacon(&self) -> bool {
        self.beacon
    }
}

/// Entry describing a live target during a registry refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetRegistration {
    /// Identifier of the target.
    pub target: TargetId,
    /// Entanglement group membership, if any.
    pub entanglement: Option<EntanglementMember>,
}

/// Externally populated population of observation targets.
pub trait TargetRegistry {
    /// Appends one registration per live target to `out`.
    fn registrations(&self, out: &mut Vec<TargetRegistration>);

    /// Resolves a target identifier, returning `None` for unknown targets.
    fn target_mut(&mut self, target: TargetId) -> Option<&mut dyn ObservationTarget>;
}

/// Speed multiplier applied while traversing a graph edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EdgeMultiplier {
    /// Constant multiplier.
    Fixed(f32),
    /// Multiplier read live from a speed medium.
    Medium {
        /// Target whose current multiplier drives the edge.
        medium: TargetId,
        /// Multiplier used when the medium cannot be resolved.
        fallback: f32,
    },
}

impl EdgeMultiplier {
    /// Resolves the multiplier, floored to [`MIN_EDGE_MULTIPLIER`].
    #[must_use]
    pub fn resolve<L>(&self, lookup: &L) -> f32
    where
        L: MultiplierLookup + ?Sized,
    {
        let raw = match *self {
            Self::Fixed(value) => value,
            Self::Medium { medium, fallback } => {
                lookup.current_multiplier(medium).unwrap_or(fallback)
            }
        };

        if raw.is_nan() {
            return MIN_EDGE_MULTIPLIER;
        }
        raw.max(MIN_EDGE_MULTIPLIER)
    }
}

/// Source of live speed multipliers for medium-driven edges.
pub trait MultiplierLookup {
    /// Current multiplier of the medium, if it exists.
    fn current_multiplier(&self, medium: TargetId) -> Option<f32>;
}

/// Lookup that knows no media; every medium edge uses its fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMedia;

impl MultiplierLookup for NoMedia {
    fn current_multiplier(&self, _medium: TargetId) -> Option<f32> {
        None
    }
}

/// Outgoing edge description used when configuring the graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeSpec {
    /// Node the edge leads to.
    pub target: NodeId,
    /// Multiplier source for the edge.
    pub multiplier: EdgeMultiplier,
}

/// Placement parameters for a speed medium.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedMediumSpec {
    /// Identifier assigned to the medium.
    pub id: TargetId,
    /// Shape identifier of the medium's trigger volume.
    pub shape: ShapeId,
    /// Bounds of the trigger volume.
    pub bounds: Aabb,
    /// Multiplier while unobserved.
    pub slow_multiplier: f32,
    /// Multiplier while observed.
    pub fast_multiplier: f32,
    /// Whether observation switches the medium to its fast multiplier.
    pub observed_forces_fast: bool,
    /// Entanglement membership, if any.
    pub entanglement: Option<EntanglementMember>,
}

/// Placement parameters for a quantum door.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumDoorSpec {
    /// Identifier assigned to the door.
    pub id: TargetId,
    /// Shape identifier of the door panel.
    pub shape: ShapeId,
    /// Bounds of the door panel.
    pub bounds: Aabb,
    /// Time between open/closed flips while unobserved.
    pub switch_interval: Duration,
    /// Initial state of the door.
    pub start_closed: bool,
    /// Whether observation collapses the door to closed.
    pub observed_forces_closed: bool,
    /// Entanglement membership, if any.
    pub entanglement: Option<EntanglementMember>,
}

/// Placement parameters for a quantum platform.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumPlatformSpec {
    /// Identifier assigned to the platform.
    pub id: TargetId,
    /// Shape identifier of the platform body.
    pub shape: ShapeId,
    /// Extents of the platform body.
    pub size: Vec2,
    /// Candidate centres visited while in superposition.
    pub positions: Vec<Vec2>,
    /// Time spent at each candidate while unobserved.
    pub switch_interval: Duration,
    /// Whether the cone may collapse the platform directly.
    pub allow_direct_observation: bool,
    /// Whether the body blocks only while collapsed.
    pub solid_only_when_observed: bool,
    /// Entanglement membership, if any.
    pub entanglement: Option<EntanglementMember>,
}

/// Placement parameters for a probe receiver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReceiverSpec {
    /// Trigger area the probe must enter.
    pub bounds: Aabb,
    /// Door opened by the receiver.
    pub door: TargetId,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Adds or moves a routing graph node.
    AddNode {
        /// Identifier of the node.
        node: NodeId,
        /// World-space position of the node.
        position: Vec2,
    },
    /// Replaces the outgoing edges of a node.
    SetEdges {
        /// Node whose edges are replaced.
        node: NodeId,
        /// New outgoing edges.
        edges: Vec<EdgeSpec>,
    },
    /// Adds a static obstacle such as a wall or the ground.
    AddObstacle {
        /// Obstacle to insert.
        obstacle: Obstacle,
    },
    /// Adds a speed medium target.
    AddSpeedMedium(SpeedMediumSpec),
    /// Adds a quantum door target.
    AddQuantumDoor(QuantumDoorSpec),
    /// Adds a quantum platform target.
    AddQuantumPlatform(QuantumPlatformSpec),
    /// Adds a receiver that opens a door when the probe arrives.
    AddReceiver(ReceiverSpec),
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Reports the probe's latest position.
    ProbeMoved {
        /// Current probe position.
        position: Vec2,
    },
}

/// Events broadcast by the world and systems.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// A target's reported observed state changed.
    TargetObservationChanged {
        /// Target whose state changed.
        target: TargetId,
        /// Newly reported state, grace window included.
        observed: bool,
    },
    /// A receiver's group-observed state changed.
    EntanglementObservationChanged {
        /// Receiver whose state changed.
        target: TargetId,
        /// Newly reported group state.
        observed: bool,
    },
    /// A speed medium switched multiplier.
    MediumMultiplierChanged {
        /// Medium that changed.
        medium: TargetId,
        /// Multiplier now in effect.
        multiplier: f32,
    },
    /// A quantum door flipped between open and closed.
    DoorStateChanged {
        /// Door that flipped.
        door: TargetId,
        /// Whether the door is now closed.
        closed: bool,
    },
    /// A quantum platform collapsed onto or left a definite position.
    PlatformStateChanged {
        /// Platform that changed.
        platform: TargetId,
        /// Whether the platform is now collapsed.
        collapsed: bool,
        /// Centre of the platform after the change.
        position: Vec2,
    },
    /// A receiver detected the probe and opened its door.
    ReceiverOpened {
        /// Door that was opened.
        door: TargetId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn ids_round_trip_through_bincode() {
        assert_round_trip(&TargetId::new(7));
        assert_round_trip(&ShapeId::new(31));
        assert_round_trip(&NodeId::new(4));
    }

    #[test]
    fn entanglement_member_round_trips_through_bincode() {
        let member = EntanglementMember::new(" bridge ", true).expect("key is not blank");
        assert_round_trip(&member);
    }

    #[test]
    fn ray_hits_box_ahead() {
        let bounds = Aabb::from_center_size(Vec2::new(3.0, 0.0), Vec2::new(1.0, 5.0));
        let distance = bounds.ray_distance(Vec2::ZERO, Vec2::X, 10.0);
        assert_eq!(distance, Some(2.5));
    }

    #[test]
    fn ray_misses_box_beside_path() {
        let bounds = Aabb::from_center_size(Vec2::new(3.0, 4.0), Vec2::new(1.0, 1.0));
        assert_eq!(bounds.ray_distance(Vec2::ZERO, Vec2::X, 10.0), None);
    }

    #[test]
    fn ray_stops_before_distant_box() {
        let bounds = Aabb::from_center_size(Vec2::new(9.0, 0.0), Vec2::new(1.0, 1.0));
        assert_eq!(bounds.ray_distance(Vec2::ZERO, Vec2::X, 5.0), None);
    }

    #[test]
    fn ray_starting_inside_reports_zero() {
        let bounds = Aabb::from_center_size(Vec2::ZERO, Vec2::new(2.0, 2.0));
        assert_eq!(bounds.ray_distance(Vec2::ZERO, Vec2::Y, 5.0), Some(0.0));
    }

    #[test]
    fn degenerate_box_is_still_hit() {
        let bounds = Aabb::from_corners(Vec2::new(6.5, -0.2), Vec2::new(6.5, 0.2));
        assert_eq!(bounds.ray_distance(Vec2::ZERO, Vec2::X, 7.0), Some(6.5));
    }

    #[test]
    fn closest_point_clamps_to_boundary() {
        let bounds = Aabb::from_corners(Vec2::new(1.0, 1.0), Vec2::new(3.0, 2.0));
        assert_eq!(bounds.closest_point(Vec2::ZERO), Vec2::new(1.0, 1.0));
        let inside = Vec2::new(2.0, 1.5);
        assert_eq!(bounds.closest_point(inside), inside);
    }

    #[test]
    fn obstacle_view_reports_every_hit() {
        let obstacles = [
            Obstacle {
                shape: ShapeId::new(1),
                bounds: Aabb::from_center_size(Vec2::new(2.0, 0.0), Vec2::ONE),
                pass_through: false,
            },
            Obstacle {
                shape: ShapeId::new(2),
                bounds: Aabb::from_center_size(Vec2::new(4.0, 0.0), Vec2::ONE),
                pass_through: true,
            },
            Obstacle {
                shape: ShapeId::new(3),
                bounds: Aabb::from_center_size(Vec2::new(0.0, 4.0), Vec2::ONE),
                pass_through: false,
            },
        ];
        let mut hits = vec![RayHit {
            shape: ShapeId::new(99),
            distance: 0.0,
            pass_through: false,
        }];

        let view = ObstacleView::new(&obstacles);
        view.cast_all(Vec2::ZERO, Vec2::X, 10.0, &mut hits);

        let shapes: Vec<_> = hits.iter().map(|hit| hit.shape.get()).collect();
        assert_eq!(shapes, vec![1, 2]);
        assert!(hits[1].pass_through);
    }

    #[test]
    fn blank_entanglement_keys_are_rejected() {
        assert!(EntanglementMember::new("   ", true).is_none());
        let member = EntanglementMember::new("  K ", false).expect("key is not blank");
        assert_eq!(member.key(), "K");
        assert!(!member.is_beacon());
    }

    #[test]
    fn edge_multiplier_is_floored() {
        let resolve = |value: f32| EdgeMultiplier::Fixed(value).resolve(&NoMedia);
        assert_eq!(resolve(0.0), MIN_EDGE_MULTIPLIER);
        assert_eq!(resolve(-4.0), MIN_EDGE_MULTIPLIER);
        assert_eq!(resolve(2.0), 2.0);
    }

    #[test]
    fn medium_edge_uses_fallback_when_unresolved() {
        let edge = EdgeMultiplier::Medium {
            medium: TargetId::new(4),
            fallback: 1.0,
        };
        assert_eq!(edge.resolve(&NoMedia), 1.0);
    }
}
