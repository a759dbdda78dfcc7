#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure geometric predicates that decide whether the observer cone sees a target.
//!
//! A target is visible when any sampled point of its bounding shape lies inside
//! the cone and the nearest blocking ray hit towards that point belongs to the
//! target itself. Sampling is deliberately generous so that long, thin
//! platforms count as seen when only a sliver enters the cone.

use strange_places_core::{ObservationTarget, RayCaster, RayHit, ShapeId, Vec2};

/// Distances below this are treated as coincident points.
pub const MIN_SAMPLE_DISTANCE: f32 = 0.001;

const MIN_CLOSEST_POINT_DISTANCE_SQ: f32 = 0.0001;

/// Tunable parameters of the cone test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConeConfig {
    /// Maximum distance at which points can be observed.
    pub max_distance: f32,
    /// Whether occluders are consulted at all.
    pub require_line_of_sight: bool,
    /// Offset applied to ray origins so rays leave the observer's body.
    pub ray_start_bias: f32,
    /// Additional samples placed evenly along each box edge.
    pub perimeter_samples_per_edge: u32,
    /// Observer's own shape, never treated as an occluder.
    pub self_shape: Option<ShapeId>,
}

impl Default for ConeConfig {
    fn default() -> Self {
        Self {
            max_distance: 7.0,
            require_line_of_sight: true,
            ray_start_bias: 0.15,
            perimeter_samples_per_edge: 1,
            self_shape: None,
        }
    }
}

/// Visibility tester that reuses scratch buffers to avoid per-frame allocations.
#[derive(Debug, Default)]
pub struct VisibilityField {
    config: ConeConfig,
    hits: Vec<RayHit>,
    samples: Vec<Vec2>,
}

impl VisibilityField {
    /// Creates a new visibility field with empty scratch buffers.
    #[must_use]
    pub fn new(config: ConeConfig) -> Self {
        Self {
            config,
            hits: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Reports whether `point` lies within range and inside the cone.
    ///
    /// Points closer than [`MIN_SAMPLE_DISTANCE`] and zero-length aim vectors
    /// have no defined angle and are reported as outside the cone.
    #[must_use]
    pub fn within_cone(
        &self,
        observer: Vec2,
        aim: Vec2,
        half_angle_degrees: f32,
        point: Vec2,
    ) -> bool {
        let to_point = point - observer;
        let distance = to_point.length();
        if distance > self.config.max_distance || distance < MIN_SAMPLE_DISTANCE {
            return false;
        }

        let aim_length = aim.length();
        if aim_length < MIN_SAMPLE_DISTANCE {
            return false;
        }

        let cosine = (aim / aim_length).dot(to_point / distance).clamp(-1.0, 1.0);
        cosine.acos().to_degrees() <= half_angle_degrees
    }

    /// Reports whether the nearest blocking shape between the observer and
    /// `point` belongs to `target`.
    ///
    /// The observer's own shape is skipped, as are trigger volumes the target
    /// does not own. When nothing blocks the ray the point is visible.
    pub fn is_unoccluded<R>(
        &mut self,
        observer: Vec2,
        point: Vec2,
        target: &dyn ObservationTarget,
        scene: &R,
    ) -> bool
    where
        R: RayCaster + ?Sized,
    {
        if !self.config.require_line_of_sight {
            return true;
        }

        let to_point = point - observer;
        let distance = to_point.length();
        if distance < MIN_SAMPLE_DISTANCE {
            return true;
        }

        let direction = to_point / distance;
        let origin = observer + direction * self.config.ray_start_bias;
        scene.cast_all(origin, direction, distance, &mut self.hits);

        let self_shape = self.config.self_shape;
        let nearest = self
            .hits
            .iter()
            .filter(|hit| Some(hit.shape) != self_shape)
            .filter(|hit| !hit.pass_through || target.owns_shape(hit.shape))
            .min_by(|a, b| a.distance.total_cmp(&b.distance));

        match nearest {
            None => true,
            Some(hit) => target.owns_shape(hit.shape),
        }
    }

    /// Reports whether any sampled point of the target is both inside the
    /// cone and unoccluded.
    ///
    /// Targets without a bounding shape are tested at their observation point.
    pub fn is_target_visible<R>(
        &mut self,
        observer: Vec2,
        aim: Vec2,
        half_angle_degrees: f32,
        target: &dyn ObservationTarget,
        scene: &R,
    ) -> bool
    where
        R: RayCaster + ?Sized,
    {
        let Some(shape) = target.bounding_shape() else {
            let point = target.observation_point();
            return self.visible_at(observer, aim, half_angle_degrees, target, point, scene);
        };

        self.prepare_samples(shape.bounds.corners(), shape.bounds.center());
        for index in 0..self.samples.len() {
            let point = self.samples[index];
            if self.visible_at(observer, aim, half_angle_degrees, target, point, scene) {
                return true;
            }
        }

        let closest = shape.bounds.closest_point(observer);
        if (closest - observer).length_squared() > MIN_CLOSEST_POINT_DISTANCE_SQ {
            return self.visible_at(observer, aim, half_angle_degrees, target, closest, scene);
        }

        false
    }

    fn visible_at<R>(
        &mut self,
        observer: Vec2,
        aim: Vec2,
        half_angle_degrees: f32,
        target: &dyn ObservationTarget,
        point: Vec2,
        scene: &R,
    ) -> bool
    where
        R: RayCaster + ?Sized,
    {
        self.within_cone(observer, aim, half_angle_degrees, point)
            && self.is_unoccluded(observer, point, target, scene)
    }

    fn prepare_samples(&mut self, corners: [Vec2; 4], center: Vec2) {
        self.samples.clear();
        self.samples.push(center);
        self.samples.extend_from_slice(&corners);

        let per_edge = self.config.perimeter_samples_per_edge;
        if per_edge == 0 {
            return;
        }

        let steps = per_edge as f32 + 1.0;
        for (index, &start) in corners.iter().enumerate() {
            let end = corners[(index + 1) % corners.len()];
            for step in 1..=per_edge {
                self.samples.push(start.lerp(end, step as f32 / steps));
            }
        }
    }
}
