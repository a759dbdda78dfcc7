//! Headless frame loop that wires the world, the observer and the probe.

use std::{fmt, time::Duration};

use clap::ValueEnum;
use strange_places_core::{Command, Event, TargetId, Vec2};
use strange_places_system_observation::{ObservationTracker, ObserverPose};
use strange_places_system_routing::{ConfigureOutcome, ShortestTimeRouter};
use strange_places_world::{self as world, query, World};

use crate::level::Level;

/// Overrides the activity of the scripted observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ObserveMode {
    /// Follow the level's observer schedule.
    Scripted,
    /// Keep the observer switched on with the scripted aim.
    Always,
    /// Keep the observer switched off.
    Never,
}

/// Drives one level frame by frame.
#[derive(Debug)]
pub(crate) struct Simulation {
    level: Level,
    mode: ObserveMode,
    world: World,
    tracker: ObservationTracker,
    router: ShortestTimeRouter,
    events: Vec<Event>,
    replan_pending: bool,
    tally: EventTally,
    frames: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct EventTally {
    observation_changes: u32,
    entanglement_changes: u32,
    medium_changes: u32,
    door_changes: u32,
    platform_changes: u32,
    receivers_opened: u32,
}

impl EventTally {
    fn record(&mut self, event: &Event) {
        match event {
            Event::TimeAdvanced { .. } => {}
            Event::TargetObservationChanged { .. } => self.observation_changes += 1,
            Event::EntanglementObservationChanged { .. } => self.entanglement_changes += 1,
            Event::MediumMultiplierChanged { .. } => self.medium_changes += 1,
            Event::DoorStateChanged { .. } => self.door_changes += 1,
            Event::PlatformStateChanged { .. } => self.platform_changes += 1,
            Event::ReceiverOpened { .. } => self.receivers_opened += 1,
        }
    }
}

impl Simulation {
    /// Builds the level and places the probe on its start node.
    pub(crate) fn new(level: Level, mode: ObserveMode) -> Self {
        let mut world = World::new();
        let mut events = Vec::new();
        for command in level.commands.iter().cloned() {
            world::apply(&mut world, command, &mut events);
        }

        let mut router = ShortestTimeRouter::new(level.probe.config);
        let outcome = router.configure(
            level.probe.start,
            level.probe.goal,
            query::graph(&world),
            query::medium_multipliers(&world),
        );
        if outcome != ConfigureOutcome::Applied {
            tracing::warn!(?outcome, "probe route was not configured");
        }
        world::apply(
            &mut world,
            Command::ProbeMoved {
                position: router.current_position(),
            },
            &mut events,
        );
        events.clear();

        Self {
            tracker: ObservationTracker::new(level.observer),
            level,
            mode,
            world,
            router,
            events,
            replan_pending: false,
            tally: EventTally::default(),
            frames: 0,
        }
    }

    /// Advances the whole level by one frame.
    pub(crate) fn step(&mut self, dt: Duration) {
        self.events.clear();
        world::apply(&mut self.world, Command::Tick { dt }, &mut self.events);

        let now = query::elapsed(&self.world);
        let pose = self.pose_at(now);
        let (scene, targets) = world::observation_parts(&mut self.world);
        self.tracker
            .tick(now, pose, targets, &scene, &mut self.events);
        world::flush_target_changes(&mut self.world, &mut self.events);

        if self
            .events
            .iter()
            .any(|event| matches!(event, Event::MediumMultiplierChanged { .. }))
        {
            self.replan_pending = true;
        }

        let graph = query::graph(&self.world);
        let lookup = query::medium_multipliers(&self.world);
        if self.replan_pending && self.router.request_replan(graph, lookup).is_some() {
            self.replan_pending = false;
        }
        self.router.tick(dt, graph, lookup);

        world::apply(
            &mut self.world,
            Command::ProbeMoved {
                position: self.router.current_position(),
            },
            &mut self.events,
        );

        for event in &self.events {
            self.tally.record(event);
        }
        self.frames += 1;
    }

    /// Runs frames of `dt` until `duration` of world time elapsed.
    pub(crate) fn run(&mut self, duration: Duration, dt: Duration) -> Report {
        while query::elapsed(&self.world) < duration {
            self.step(dt);
        }
        self.report()
    }

    fn pose_at(&self, now: Duration) -> ObserverPose {
        let (aim, scripted_active) = self.level.script.pose_at(now);
        let active = match self.mode {
            ObserveMode::Scripted => scripted_active,
            ObserveMode::Always => true,
            ObserveMode::Never => false,
        };

        ObserverPose {
            origin: self.level.script.origin(),
            aim,
            active,
        }
    }

    fn report(&self) -> Report {
        let mut collapsed_platforms = Vec::new();
        let mut open_doors = Vec::new();
        for id in self.target_ids() {
            if let Some(platform) = query::platform(&self.world, id) {
                if platform.is_collapsed() {
                    collapsed_platforms.push(self.level.target_name(id));
                }
            }
            if let Some(door) = query::door(&self.world, id) {
                if !door.is_closed() {
                    open_doors.push(self.level.target_name(id));
                }
            }
        }

        Report {
            frames: self.frames,
            elapsed: query::elapsed(&self.world),
            reached_goal: self.router.reached_goal(),
            position: self.router.current_position(),
            plans: self.router.plan_count(),
            path: self
                .router
                .path()
                .iter()
                .map(|&node| self.level.node_name(node))
                .collect(),
            collapsed_platforms,
            open_doors,
            tally: self.tally,
        }
    }

    fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        (0..self.level.target_names.len())
            .filter_map(|index| u32::try_from(index).ok())
            .map(TargetId::new)
    }
}

/// Summary printed after a run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Report {
    frames: u64,
    elapsed: Duration,
    reached_goal: bool,
    position: Vec2,
    plans: u64,
    path: Vec<String>,
    collapsed_platforms: Vec<String>,
    open_doors: Vec<String>,
    tally: EventTally,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "simulated {} frames ({:.2}s)",
            self.frames,
            self.elapsed.as_secs_f32()
        )?;
        writeln!(
            f,
            "probe at ({:.2}, {:.2}), goal reached: {}",
            self.position.x, self.position.y, self.reached_goal
        )?;
        writeln!(
            f,
            "route after {} plans: {}",
            self.plans,
            self.path.join(" -> ")
        )?;
        writeln!(
            f,
            "observation changes: {}, entanglement changes: {}, medium changes: {}",
            self.tally.observation_changes,
            self.tally.entanglement_changes,
            self.tally.medium_changes
        )?;
        writeln!(
            f,
            "door changes: {}, platform changes: {}, receivers opened: {}",
            self.tally.door_changes, self.tally.platform_changes, self.tally.receivers_opened
        )?;
        writeln!(
            f,
            "collapsed platforms: [{}]",
            self.collapsed_platforms.join(", ")
        )?;
        write!(f, "open doors: [{}]", self.open_doors.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{self, FERMAT_DEMO};

    const FRAME: Duration = Duration::from_millis(16);

    fn run_demo(mode: ObserveMode, seconds: u64) -> Report {
        let level = level::parse(FERMAT_DEMO).expect("demo level is valid");
        let mut simulation = Simulation::new(level, mode);
        simulation.run(Duration::from_secs(seconds), FRAME)
    }

    #[test]
    fn unobserved_medium_keeps_the_probe_on_the_upper_route() {
        let report = run_demo(ObserveMode::Never, 6);

        assert!(report.reached_goal);
        assert_eq!(report.path, vec!["start", "top_left", "top_right", "goal"]);
        assert_eq!(report.plans, 1);
        assert_eq!(report.tally.medium_changes, 0);
        assert!(report.collapsed_platforms.is_empty());
    }

    #[test]
    fn watching_the_medium_reroutes_through_it() {
        let report = run_demo(ObserveMode::Scripted, 6);

        assert!(report.reached_goal);
        assert_eq!(report.path, vec!["start", "bottom", "goal"]);
        assert_eq!(report.plans, 2);
        assert_eq!(report.tally.medium_changes, 1);
        assert_eq!(report.position, Vec2::new(6.0, -0.8));
    }

    #[test]
    fn watched_beacon_collapses_its_entangled_platform() {
        let report = run_demo(ObserveMode::Always, 2);

        assert_eq!(report.collapsed_platforms, vec!["bridge"]);
        assert!(report.tally.entanglement_changes >= 1);
    }

    #[test]
    fn arriving_at_the_receiver_opens_the_exit() {
        let report = run_demo(ObserveMode::Scripted, 6);

        assert_eq!(report.tally.receivers_opened, 1);
        assert_eq!(report.open_doors, vec!["exit"]);
    }

    #[test]
    fn report_lists_the_route() {
        let report = run_demo(ObserveMode::Never, 1);
        let rendered = report.to_string();

        let route = "route after 1 plans: start -> top_left -> top_right -> goal";
        assert!(rendered.contains(route));
        assert!(rendered.contains("goal reached: false"));
    }
}
