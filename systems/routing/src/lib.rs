#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Least-time routing over the weighted level graph.
//!
//! The router plans with Dijkstra's algorithm, minimising the accumulated
//! travel time rather than the travelled distance, and then walks the agent
//! along the planned polyline at a speed scaled by the live multiplier of the
//! edge it is traversing.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
    time::Duration,
};

use strange_places_core::{MultiplierLookup, NodeId, Vec2};
use strange_places_world::WeightedGraph;

const POSITION_TOLERANCE: f32 = 1e-5;
const MIN_DIRECTION_LENGTH: f32 = 1e-4;

/// Tunable parameters of the agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouterConfig {
    /// Speed along an edge whose multiplier is one.
    pub base_speed: f32,
    /// Distance below which the agent snaps onto its next node.
    pub arrive_distance: f32,
    /// Minimum time between two honoured replan requests.
    pub min_replan_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_speed: 4.5,
            arrive_distance: 0.08,
            min_replan_interval: Duration::from_millis(50),
        }
    }
}

/// Result of a [`ShortestTimeRouter::configure`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// The new endpoints were stored and the agent restarted from the start.
    Applied,
    /// The endpoints already matched; nothing changed.
    Unchanged,
    /// The agent is mid-traversal, so the endpoints were left untouched.
    Deferred,
}

/// Result of the most recent planning pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlanOutcome {
    /// A route was found.
    Planned {
        /// Number of nodes on the route, including both endpoints.
        nodes: usize,
        /// Accumulated travel-time cost of the route.
        cost: f32,
    },
    /// The goal is unreachable or an endpoint is missing.
    NoPath,
    /// Planning started on the goal itself.
    AlreadyAtGoal,
}

#[derive(Clone, Copy, Debug)]
struct Frontier {
    cost: f32,
    node: NodeId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Plans least-time routes and moves a single agent along them.
#[derive(Debug)]
pub struct ShortestTimeRouter {
    config: RouterConfig,
    start: Option<NodeId>,
    goal: Option<NodeId>,
    position: Vec2,
    current: Option<NodeId>,
    next: Option<NodeId>,
    path: Vec<NodeId>,
    cursor: usize,
    reached_goal: bool,
    clock: Duration,
    last_plan_time: Option<Duration>,
    plan_count: u64,
    last_plan: Option<PlanOutcome>,
    costs: HashMap<NodeId, f32>,
    previous: HashMap<NodeId, NodeId>,
    frontier: BinaryHeap<Reverse<Frontier>>,
    candidate: Vec<NodeId>,
}

impl ShortestTimeRouter {
    /// Creates an unconfigured router whose agent rests at the origin.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            start: None,
            goal: None,
            position: Vec2::ZERO,
            current: None,
            next: None,
            path: Vec::new(),
            cursor: 0,
            reached_goal: false,
            clock: Duration::ZERO,
            last_plan_time: None,
            plan_count: 0,
            last_plan: None,
            costs: HashMap::new(),
            previous: HashMap::new(),
            frontier: BinaryHeap::new(),
            candidate: Vec::new(),
        }
    }

    /// Sets the start and goal nodes and restarts the agent.
    ///
    /// An agent that already left its start node keeps its traversal and the
    /// request is deferred.
    pub fn configure<L>(
        &mut self,
        start: NodeId,
        goal: NodeId,
        graph: &WeightedGraph,
        lookup: &L,
    ) -> ConfigureOutcome
    where
        L: MultiplierLookup + ?Sized,
    {
        if self.start == Some(start) && self.goal == Some(goal) {
            return ConfigureOutcome::Unchanged;
        }

        if !self.resting_at_start(graph) {
            tracing::warn!(
                start = start.get(),
                goal = goal.get(),
                "deferring route configuration while the agent is travelling"
            );
            return ConfigureOutcome::Deferred;
        }

        self.start = Some(start);
        self.goal = Some(goal);
        let _ = self.restart_from_start(graph, lookup);
        ConfigureOutcome::Applied
    }

    /// Moves the agent back onto the start node and plans a fresh route.
    pub fn restart_from_start<L>(&mut self, graph: &WeightedGraph, lookup: &L) -> PlanOutcome
    where
        L: MultiplierLookup + ?Sized,
    {
        self.reached_goal = false;
        self.current = self.start;
        if let Some(position) = self.start.and_then(|start| graph.position(start)) {
            self.position = position;
        }
        self.plan_from(self.current, graph, lookup)
    }

    /// Replans from the agent's current node unless a plan ran too recently.
    ///
    /// Returns the outcome of the new plan, or `None` when throttled.
    pub fn request_replan<L>(&mut self, graph: &WeightedGraph, lookup: &L) -> Option<PlanOutcome>
    where
        L: MultiplierLookup + ?Sized,
    {
        if let Some(last) = self.last_plan_time {
            if self.clock.saturating_sub(last) < self.config.min_replan_interval {
                tracing::debug!("replan request throttled");
                return None;
            }
        }

        Some(self.plan_from(self.current, graph, lookup))
    }

    /// Advances the router clock and moves the agent along its route.
    pub fn tick<L>(&mut self, dt: Duration, graph: &WeightedGraph, lookup: &L)
    where
        L: MultiplierLookup + ?Sized,
    {
        self.clock = self.clock.saturating_add(dt);

        if self.reached_goal {
            return;
        }
        let Some(next) = self.next else {
            return;
        };
        let Some(target) = graph.position(next) else {
            tracing::warn!(node = next.get(), "next node vanished from the graph");
            self.next = None;
            return;
        };

        let delta = target - self.position;
        let distance = delta.length();
        if distance <= self.config.arrive_distance {
            self.position = target;
            self.advance();
            return;
        }

        let direction = delta / distance.max(MIN_DIRECTION_LENGTH);
        let speed = self.config.base_speed * self.edge_rate(next, graph, lookup);
        let step = (speed * dt.as_secs_f32()).min(distance);
        self.position += direction * step;
    }

    /// Current agent position.
    #[must_use]
    pub const fn current_position(&self) -> Vec2 {
        self.position
    }

    /// Whether the agent arrived at the configured goal.
    #[must_use]
    pub const fn reached_goal(&self) -> bool {
        self.reached_goal
    }

    /// Nodes of the active route, empty when no route exists.
    #[must_use]
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Node the agent is heading towards.
    #[must_use]
    pub const fn next_node(&self) -> Option<NodeId> {
        self.next
    }

    /// Node the agent last departed from or arrived at.
    #[must_use]
    pub const fn current_node(&self) -> Option<NodeId> {
        self.current
    }

    /// Configured start node.
    #[must_use]
    pub const fn start(&self) -> Option<NodeId> {
        self.start
    }

    /// Configured goal node.
    #[must_use]
    pub const fn goal(&self) -> Option<NodeId> {
        self.goal
    }

    /// Number of planning passes executed so far.
    #[must_use]
    pub const fn plan_count(&self) -> u64 {
        self.plan_count
    }

    /// Outcome of the most recent planning pass.
    #[must_use]
    pub const fn last_plan(&self) -> Option<PlanOutcome> {
        self.last_plan
    }

    /// Time accumulated through [`Self::tick`].
    #[must_use]
    pub const fn clock(&self) -> Duration {
        self.clock
    }

    fn resting_at_start(&self, graph: &WeightedGraph) -> bool {
        let (Some(start), Some(_)) = (self.start, self.goal) else {
            return true;
        };

        graph.position(start).map_or(true, |position| {
            self.position.abs_diff_eq(position, POSITION_TOLERANCE)
        })
    }

    fn plan_from<L>(
        &mut self,
        from: Option<NodeId>,
        graph: &WeightedGraph,
        lookup: &L,
    ) -> PlanOutcome
    where
        L: MultiplierLookup + ?Sized,
    {
        self.last_plan_time = Some(self.clock);
        self.plan_count += 1;
        self.next = None;
        self.cursor = 0;

        let outcome = match (from, self.goal) {
            (Some(from), Some(goal)) if from == goal => {
                self.path.clear();
                self.reached_goal = true;
                PlanOutcome::AlreadyAtGoal
            }
            (Some(from), Some(goal)) => match self.search(from, goal, graph, lookup) {
                Some(cost) => {
                    std::mem::swap(&mut self.path, &mut self.candidate);
                    self.current = self.path.first().copied();
                    self.next = self.path.get(1).copied();
                    tracing::info!(
                        from = from.get(),
                        goal = goal.get(),
                        nodes = self.path.len(),
                        cost,
                        "planned least-time route"
                    );
                    PlanOutcome::Planned {
                        nodes: self.path.len(),
                        cost,
                    }
                }
                None => {
                    self.path.clear();
                    tracing::info!(from = from.get(), goal = goal.get(), "no route to goal");
                    PlanOutcome::NoPath
                }
            },
            _ => {
                self.path.clear();
                PlanOutcome::NoPath
            }
        };

        self.last_plan = Some(outcome);
        outcome
    }

    fn search<L>(
        &mut self,
        from: NodeId,
        goal: NodeId,
        graph: &WeightedGraph,
        lookup: &L,
    ) -> Option<f32>
    where
        L: MultiplierLookup + ?Sized,
    {
        self.costs.clear();
        self.previous.clear();
        self.frontier.clear();
        self.candidate.clear();

        if graph.node(from).is_none() {
            return None;
        }
        let _ = self.costs.insert(from, 0.0);
        self.frontier.push(Reverse(Frontier {
            cost: 0.0,
            node: from,
        }));

        while let Some(Reverse(Frontier { cost, node })) = self.frontier.pop() {
            if self.costs.get(&node).is_some_and(|&best| cost > best) {
                continue;
            }

            if node == goal {
                self.reconstruct(goal);
                return Some(cost);
            }

            for edge in graph.edges(node) {
                let Some(step) = graph.edge_time_cost(node, edge, lookup) else {
                    continue;
                };
                let target = edge.target();
                let candidate = cost + step;
                let improves = self
                    .costs
                    .get(&target)
                    .map_or(true, |&best| candidate < best);
                if improves {
                    let _ = self.costs.insert(target, candidate);
                    let _ = self.previous.insert(target, node);
                    self.frontier.push(Reverse(Frontier {
                        cost: candidate,
                        node: target,
                    }));
                }
            }
        }

        None
    }

    fn reconstruct(&mut self, goal: NodeId) {
        self.candidate.push(goal);
        let mut cursor = goal;
        while let Some(&previous) = self.previous.get(&cursor) {
            self.candidate.push(previous);
            cursor = previous;
        }
        self.candidate.reverse();
    }

    fn advance(&mut self) {
        if self.path.is_empty() {
            return;
        }

        self.cursor += 1;
        if self.cursor + 1 >= self.path.len() {
            if self.next.is_some() && self.next == self.goal {
                self.reached_goal = true;
                tracing::info!(position = ?self.position, "agent reached goal");
            }
            self.current = self.next;
            self.next = None;
            return;
        }

        self.current = Some(self.path[self.cursor]);
        self.next = Some(self.path[self.cursor + 1]);
    }

    fn edge_rate<L>(&self, next: NodeId, graph: &WeightedGraph, lookup: &L) -> f32
    where
        L: MultiplierLookup + ?Sized,
    {
        self.current
            .and_then(|current| graph.edge_between(current, next))
            .map_or(1.0, |edge| graph.edge_rate(edge, lookup))
    }
}

impl Default for ShortestTimeRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
