//! TOML level description and its translation into world commands.

use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use strange_places_core::{
    Aabb, Command, EdgeMultiplier, EdgeSpec, EntanglementMember, NodeId, Obstacle, QuantumDoorSpec,
    QuantumPlatformSpec, ReceiverSpec, ShapeId, SpeedMediumSpec, TargetId, Vec2,
};
use strange_places_system_observation::ObserverConfig;
use strange_places_system_routing::RouterConfig;
use thiserror::Error;

/// Level shipped with the binary.
pub(crate) const FERMAT_DEMO: &str = include_str!("../levels/fermat_demo.toml");

/// Errors raised while loading a level description.
#[derive(Debug, Error)]
pub(crate) enum LevelError {
    /// The document is not valid TOML or does not match the level schema.
    #[error("failed to parse level: {0}")]
    Parse(#[from] toml::de::Error),
    /// Two entries of the same kind share a name.
    #[error("duplicate {kind} name `{name}`")]
    DuplicateName {
        /// Kind of entry that was duplicated.
        kind: &'static str,
        /// Offending name.
        name: String,
    },
    /// An edge or the probe references a node that was never declared.
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    /// An edge references a medium that was never declared.
    #[error("unknown medium `{0}`")]
    UnknownMedium(String),
    /// A receiver references a door that was never declared.
    #[error("unknown door `{0}`")]
    UnknownDoor(String),
    /// An edge declares both a fixed multiplier and a medium.
    #[error("edge `{from}` -> `{to}` declares both a multiplier and a medium")]
    AmbiguousEdge {
        /// Source node of the edge.
        from: String,
        /// Target node of the edge.
        to: String,
    },
    /// A platform has no candidate positions.
    #[error("platform `{0}` has no positions")]
    EmptyPlatform(String),
    /// The observer schedule is not sorted by time.
    #[error("observer schedule must be sorted by `until_ms`")]
    UnsortedSchedule,
}

/// Fully resolved level, ready to be fed to the simulation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Level {
    /// World commands that build the level.
    pub(crate) commands: Vec<Command>,
    /// Observer configuration.
    pub(crate) observer: ObserverConfig,
    /// Scripted observer poses.
    pub(crate) script: ObserverScript,
    /// Probe configuration.
    pub(crate) probe: ProbeSetup,
    /// Node names indexed by node identifier.
    pub(crate) node_names: Vec<String>,
    /// Target names indexed by target identifier.
    pub(crate) target_names: Vec<String>,
}

impl Level {
    /// Name of a node, or its numeric identifier when unnamed.
    pub(crate) fn node_name(&self, node: NodeId) -> String {
        usize::try_from(node.get())
            .ok()
            .and_then(|index| self.node_names.get(index))
            .cloned()
            .unwrap_or_else(|| format!("#{}", node.get()))
    }

    /// Name of a target, or its numeric identifier when unnamed.
    pub(crate) fn target_name(&self, target: TargetId) -> String {
        usize::try_from(target.get())
            .ok()
            .and_then(|index| self.target_names.get(index))
            .cloned()
            .unwrap_or_else(|| format!("#{}", target.get()))
    }
}

/// Route endpoints and movement parameters of the probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ProbeSetup {
    /// Node the probe starts on.
    pub(crate) start: NodeId,
    /// Node the probe travels to.
    pub(crate) goal: NodeId,
    /// Movement parameters.
    pub(crate) config: RouterConfig,
}

/// Piecewise-constant observer pose over time.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ObserverScript {
    origin: Vec2,
    segments: Vec<ScriptSegment>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ScriptSegment {
    until: Duration,
    aim: Vec2,
    active: bool,
}

impl ObserverScript {
    /// Observer position.
    pub(crate) const fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Aim and activity at `now`; the last segment holds forever.
    pub(crate) fn pose_at(&self, now: Duration) -> (Vec2, bool) {
        self.segments
            .iter()
            .find(|segment| now < segment.until)
            .or_else(|| self.segments.last())
            .map_or((Vec2::X, false), |segment| (segment.aim, segment.active))
    }
}

/// Parses and validates a level document.
pub(crate) fn parse(source: &str) -> Result<Level, LevelError> {
    let document: LevelDocument = toml::from_str(source)?;
    document.resolve()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelDocument {
    #[serde(default)]
    observer: ObserverDocument,
    probe: ProbeDocument,
    nodes: Vec<NodeDocument>,
    #[serde(default)]
    edges: Vec<EdgeDocument>,
    #[serde(default)]
    obstacles: Vec<BoxDocument>,
    #[serde(default)]
    media: Vec<MediumDocument>,
    #[serde(default)]
    doors: Vec<DoorDocument>,
    #[serde(default)]
    platforms: Vec<PlatformDocument>,
    #[serde(default)]
    receivers: Vec<ReceiverDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ObserverDocument {
    position: [f32; 2],
    max_distance: f32,
    cone_angle_degrees: f32,
    grace_ms: u64,
    require_line_of_sight: bool,
    ray_start_bias: f32,
    perimeter_samples_per_edge: u32,
    auto_refresh_ms: u64,
    schedule: Vec<ScheduleDocument>,
}

impl Default for ObserverDocument {
    fn default() -> Self {
        let config = ObserverConfig::default();
        Self {
            position: [0.0, 0.0],
            max_distance: config.max_distance,
            cone_angle_degrees: config.cone_angle_degrees,
            grace_ms: duration_ms(config.grace),
            require_line_of_sight: config.require_line_of_sight,
            ray_start_bias: config.ray_start_bias,
            perimeter_samples_per_edge: config.perimeter_samples_per_edge,
            auto_refresh_ms: duration_ms(config.auto_refresh_interval),
            schedule: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleDocument {
    until_ms: u64,
    aim: [f32; 2],
    #[serde(default = "enabled")]
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeDocument {
    start: String,
    goal: String,
    #[serde(default)]
    base_speed: Option<f32>,
    #[serde(default)]
    arrive_distance: Option<f32>,
    #[serde(default)]
    min_replan_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDocument {
    name: String,
    position: [f32; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EdgeDocument {
    from: String,
    to: String,
    #[serde(default)]
    multiplier: Option<f32>,
    #[serde(default)]
    medium: Option<String>,
    #[serde(default = "unit_multiplier")]
    fallback: f32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoxDocument {
    center: [f32; 2],
    size: [f32; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntanglementDocument {
    key: String,
    #[serde(default)]
    beacon: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MediumDocument {
    name: String,
    center: [f32; 2],
    size: [f32; 2],
    #[serde(default = "slow_multiplier")]
    slow_multiplier: f32,
    #[serde(default = "fast_multiplier")]
    fast_multiplier: f32,
    #[serde(default = "enabled")]
    observed_forces_fast: bool,
    #[serde(default)]
    entanglement: Option<EntanglementDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DoorDocument {
    name: String,
    center: [f32; 2],
    size: [f32; 2],
    #[serde(default = "door_switch_ms")]
    switch_ms: u64,
    #[serde(default = "enabled")]
    start_closed: bool,
    #[serde(default = "enabled")]
    observed_forces_closed: bool,
    #[serde(default)]
    entanglement: Option<EntanglementDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlatformDocument {
    name: String,
    size: [f32; 2],
    positions: Vec<[f32; 2]>,
    #[serde(default = "platform_switch_ms")]
    switch_ms: u64,
    #[serde(default = "enabled")]
    allow_direct_observation: bool,
    #[serde(default = "enabled")]
    solid_only_when_observed: bool,
    #[serde(default)]
    entanglement: Option<EntanglementDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReceiverDocument {
    center: [f32; 2],
    size: [f32; 2],
    door: String,
}

const fn enabled() -> bool {
    true
}

const fn unit_multiplier() -> f32 {
    1.0
}

const fn slow_multiplier() -> f32 {
    0.35
}

const fn fast_multiplier() -> f32 {
    1.75
}

const fn door_switch_ms() -> u64 {
    350
}

const fn platform_switch_ms() -> u64 {
    180
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn vec2(value: [f32; 2]) -> Vec2 {
    Vec2::from_array(value)
}

fn entanglement(document: Option<&EntanglementDocument>) -> Option<EntanglementMember> {
    document.and_then(|entry| EntanglementMember::new(&entry.key, entry.beacon))
}

#[derive(Debug)]
struct Names<I> {
    ids: HashMap<String, I>,
    ordered: Vec<String>,
}

impl<I: Copy> Names<I> {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    fn declare(
        &mut self,
        kind: &'static str,
        name: &str,
        make: impl FnOnce(u32) -> I,
    ) -> Result<I, LevelError> {
        if self.ids.contains_key(name) {
            return Err(LevelError::DuplicateName {
                kind,
                name: name.to_owned(),
            });
        }

        let index = u32::try_from(self.ordered.len()).unwrap_or(u32::MAX);
        let id = make(index);
        let _ = self.ids.insert(name.to_owned(), id);
        self.ordered.push(name.to_owned());
        Ok(id)
    }

    fn get(&self, name: &str) -> Option<I> {
        self.ids.get(name).copied()
    }
}

impl LevelDocument {
    fn resolve(self) -> Result<Level, LevelError> {
        let mut commands = Vec::new();
        let mut nodes: Names<NodeId> = Names::new();
        let mut targets: Names<TargetId> = Names::new();
        let mut media = HashMap::new();
        let mut doors = HashMap::new();
        let mut next_shape = 0_u32;
        let mut shape = || {
            next_shape += 1;
            ShapeId::new(next_shape)
        };

        for node in &self.nodes {
            let id = nodes.declare("node", &node.name, NodeId::new)?;
            commands.push(Command::AddNode {
                node: id,
                position: vec2(node.position),
            });
        }

        for obstacle in &self.obstacles {
            commands.push(Command::AddObstacle {
                obstacle: Obstacle {
                    shape: shape(),
                    bounds: Aabb::from_center_size(vec2(obstacle.center), vec2(obstacle.size)),
                    pass_through: false,
                },
            });
        }

        for medium in &self.media {
            let id = targets.declare("target", &medium.name, TargetId::new)?;
            let _ = media.insert(medium.name.as_str(), id);
            commands.push(Command::AddSpeedMedium(SpeedMediumSpec {
                id,
                shape: shape(),
                bounds: Aabb::from_center_size(vec2(medium.center), vec2(medium.size)),
                slow_multiplier: medium.slow_multiplier,
                fast_multiplier: medium.fast_multiplier,
                observed_forces_fast: medium.observed_forces_fast,
                entanglement: entanglement(medium.entanglement.as_ref()),
            }));
        }

        for door in &self.doors {
            let id = targets.declare("target", &door.name, TargetId::new)?;
            let _ = doors.insert(door.name.as_str(), id);
            commands.push(Command::AddQuantumDoor(QuantumDoorSpec {
                id,
                shape: shape(),
                bounds: Aabb::from_center_size(vec2(door.center), vec2(door.size)),
                switch_interval: Duration::from_millis(door.switch_ms),
                start_closed: door.start_closed,
                observed_forces_closed: door.observed_forces_closed,
                entanglement: entanglement(door.entanglement.as_ref()),
            }));
        }

        for platform in &self.platforms {
            if platform.positions.is_empty() {
                return Err(LevelError::EmptyPlatform(platform.name.clone()));
            }
            let id = targets.declare("target", &platform.name, TargetId::new)?;
            commands.push(Command::AddQuantumPlatform(QuantumPlatformSpec {
                id,
                shape: shape(),
                size: vec2(platform.size),
                positions: platform.positions.iter().copied().map(vec2).collect(),
                switch_interval: Duration::from_millis(platform.switch_ms),
                allow_direct_observation: platform.allow_direct_observation,
                solid_only_when_observed: platform.solid_only_when_observed,
                entanglement: entanglement(platform.entanglement.as_ref()),
            }));
        }

        for receiver in &self.receivers {
            let door = doors
                .get(receiver.door.as_str())
                .copied()
                .ok_or_else(|| LevelError::UnknownDoor(receiver.door.clone()))?;
            commands.push(Command::AddReceiver(ReceiverSpec {
                bounds: Aabb::from_center_size(vec2(receiver.center), vec2(receiver.size)),
                door,
            }));
        }

        let mut outgoing: Vec<(NodeId, Vec<EdgeSpec>)> = Vec::new();
        for edge in &self.edges {
            let from = nodes
                .get(&edge.from)
                .ok_or_else(|| LevelError::UnknownNode(edge.from.clone()))?;
            let to = nodes
                .get(&edge.to)
                .ok_or_else(|| LevelError::UnknownNode(edge.to.clone()))?;
            let multiplier = match (edge.multiplier, edge.medium.as_deref()) {
                (Some(_), Some(_)) => {
                    return Err(LevelError::AmbiguousEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                    });
                }
                (Some(value), None) => EdgeMultiplier::Fixed(value),
                (None, Some(name)) => EdgeMultiplier::Medium {
                    medium: media
                        .get(name)
                        .copied()
                        .ok_or_else(|| LevelError::UnknownMedium(name.to_owned()))?,
                    fallback: edge.fallback,
                },
                (None, None) => EdgeMultiplier::Fixed(1.0),
            };

            let spec = EdgeSpec {
                target: to,
                multiplier,
            };
            match outgoing.iter_mut().find(|(node, _)| *node == from) {
                Some((_, specs)) => specs.push(spec),
                None => outgoing.push((from, vec![spec])),
            }
        }
        commands.extend(
            outgoing
                .into_iter()
                .map(|(node, edges)| Command::SetEdges { node, edges }),
        );

        let probe = ProbeSetup {
            start: nodes
                .get(&self.probe.start)
                .ok_or_else(|| LevelError::UnknownNode(self.probe.start.clone()))?,
            goal: nodes
                .get(&self.probe.goal)
                .ok_or_else(|| LevelError::UnknownNode(self.probe.goal.clone()))?,
            config: self.probe.config(),
        };

        let (observer, script) = self.observer.resolve()?;

        Ok(Level {
            commands,
            observer,
            script,
            probe,
            node_names: nodes.ordered,
            target_names: targets.ordered,
        })
    }
}

impl ProbeDocument {
    fn config(&self) -> RouterConfig {
        let defaults = RouterConfig::default();
        RouterConfig {
            base_speed: self.base_speed.unwrap_or(defaults.base_speed),
            arrive_distance: self.arrive_distance.unwrap_or(defaults.arrive_distance),
            min_replan_interval: self
                .min_replan_ms
                .map_or(defaults.min_replan_interval, Duration::from_millis),
        }
    }
}

impl ObserverDocument {
    fn resolve(self) -> Result<(ObserverConfig, ObserverScript), LevelError> {
        let sorted = self
            .schedule
            .windows(2)
            .all(|pair| pair[0].until_ms <= pair[1].until_ms);
        if !sorted {
            return Err(LevelError::UnsortedSchedule);
        }

        let config = ObserverConfig {
            max_distance: self.max_distance,
            cone_angle_degrees: self.cone_angle_degrees,
            grace: Duration::from_millis(self.grace_ms),
            require_line_of_sight: self.require_line_of_sight,
            ray_start_bias: self.ray_start_bias,
            perimeter_samples_per_edge: self.perimeter_samples_per_edge,
            auto_refresh_interval: Duration::from_millis(self.auto_refresh_ms),
            self_shape: None,
        };
        let script = ObserverScript {
            origin: vec2(self.position),
            segments: self
                .schedule
                .iter()
                .map(|segment| ScriptSegment {
                    until: Duration::from_millis(segment.until_ms),
                    aim: vec2(segment.aim),
                    active: segment.active,
                })
                .collect(),
        };
        Ok((config, script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [probe]
        start = "a"
        goal = "b"

        [[nodes]]
        name = "a"
        position = [0.0, 0.0]

        [[nodes]]
        name = "b"
        position = [4.0, 0.0]

        [[edges]]
        from = "a"
        to = "b"
    "#;

    const EMPTY_PLATFORM: &str = r#"
        [[platforms]]
        name = "ghost"
        size = [1.0, 1.0]
        positions = []
    "#;

    const BLANK_KEY_DOOR: &str = r#"
        [[doors]]
        name = "d"
        center = [1.0, 0.0]
        size = [1.0, 1.0]
        entanglement = { key = "  ", beacon = true }
    "#;

    #[test]
    fn demo_level_resolves() {
        let level = parse(FERMAT_DEMO).expect("demo level is valid");

        assert_eq!(level.node_names.len(), 5);
        assert_eq!(level.target_names, vec!["lens", "exit", "bridge"]);
        assert_eq!(level.node_name(level.probe.start), "start");
        assert_eq!(level.node_name(level.probe.goal), "goal");
        assert_eq!(level.probe.config, RouterConfig::default());
        assert_eq!(level.observer.half_angle_degrees(), 30.0);

        let medium_edges = level
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::SetEdges { edges, .. } => Some(edges),
                _ => None,
            })
            .flatten()
            .filter(|edge| matches!(edge.multiplier, EdgeMultiplier::Medium { .. }))
            .count();
        assert_eq!(medium_edges, 2);
    }

    #[test]
    fn minimal_level_uses_defaults() {
        let level = parse(MINIMAL).expect("minimal level is valid");

        assert_eq!(level.observer, ObserverConfig::default());
        assert_eq!(level.script.pose_at(Duration::ZERO), (Vec2::X, false));
        assert!(level.commands.contains(&Command::SetEdges {
            node: NodeId::new(0),
            edges: vec![EdgeSpec {
                target: NodeId::new(1),
                multiplier: EdgeMultiplier::Fixed(1.0),
            }],
        }));
    }

    #[test]
    fn schedule_holds_its_last_segment() {
        let level = parse(FERMAT_DEMO).expect("demo level is valid");
        let script = &level.script;

        assert_eq!(script.origin(), Vec2::new(0.0, 3.5));
        assert!(!script.pose_at(Duration::from_millis(100)).1);
        assert!(script.pose_at(Duration::from_millis(300)).1);
        assert!(script.pose_at(Duration::from_secs(3_600)).1);
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let source = MINIMAL.replace("to = \"b\"", "to = \"c\"");
        let error = parse(&source).expect_err("edge target is undeclared");
        assert!(matches!(error, LevelError::UnknownNode(name) if name == "c"));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let source = MINIMAL.replace("name = \"b\"", "name = \"a\"");
        let error = parse(&source).expect_err("node names collide");
        assert!(matches!(error, LevelError::DuplicateName { kind: "node", .. }));
    }

    #[test]
    fn edges_need_a_single_multiplier_source() {
        let source = format!("{MINIMAL}\nmultiplier = 2.0\nmedium = \"lens\"\n");
        let error = parse(&source).expect_err("edge is ambiguous");
        assert!(matches!(error, LevelError::AmbiguousEdge { .. }));
    }

    #[test]
    fn unknown_medium_is_rejected() {
        let source = format!("{MINIMAL}\nmedium = \"lens\"\n");
        let error = parse(&source).expect_err("medium is undeclared");
        assert!(matches!(error, LevelError::UnknownMedium(name) if name == "lens"));
    }

    #[test]
    fn empty_platform_is_rejected() {
        let source = format!("{MINIMAL}{EMPTY_PLATFORM}");
        let error = parse(&source).expect_err("platform has nowhere to be");
        assert!(matches!(error, LevelError::EmptyPlatform(name) if name == "ghost"));
    }

    #[test]
    fn blank_entanglement_key_is_ignored() {
        let source = format!("{MINIMAL}{BLANK_KEY_DOOR}");
        let level = parse(&source).expect("level is valid");
        let door = level
            .commands
            .iter()
            .find_map(|command| match command {
                Command::AddQuantumDoor(spec) => Some(spec),
                _ => None,
            })
            .expect("door command present");
        assert!(door.entanglement.is_none());
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let error = parse("probe = [").expect_err("not toml");
        assert!(matches!(error, LevelError::Parse(_)));
    }
}
