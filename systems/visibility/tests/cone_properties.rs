use proptest::prelude::*;
use strange_places_core::{BoundingShape, ObservationTarget, ObstacleView, ShapeId, Vec2};
use strange_places_system_visibility::VisibilityField;

struct Marker(Vec2);

impl ObservationTarget for Marker {
    fn observation_point(&self) -> Vec2 {
        self.0
    }

    fn bounding_shape(&self) -> Option<BoundingShape> {
        None
    }

    fn owns_shape(&self, _shape: ShapeId) -> bool {
        false
    }

    fn set_observed(&mut self, _observed: bool) {}
}

fn polar(angle_degrees: f32, distance: f32) -> Vec2 {
    Vec2::from_angle(angle_degrees.to_radians()) * distance
}

proptest! {
    #[test]
    fn points_beyond_range_are_never_seen(
        heading in -180.0f32..180.0,
        offset in -25.0f32..25.0,
        distance in 7.1f32..40.0,
    ) {
        let mut field = VisibilityField::default();
        let observer = Vec2::new(1.5, -2.0);
        let target = Marker(observer + polar(heading + offset, distance));

        prop_assert!(!field.is_target_visible(
            observer,
            polar(heading, 1.0),
            30.0,
            &target,
            &ObstacleView::empty(),
        ));
    }

    #[test]
    fn moving_closer_along_a_ray_keeps_a_point_visible(
        heading in -180.0f32..180.0,
        offset in -25.0f32..25.0,
        far in 0.05f32..6.9,
        fraction in 0.05f32..1.0,
    ) {
        let mut field = VisibilityField::default();
        let aim = polar(heading, 1.0);
        let far_target = Marker(polar(heading + offset, far));
        let near_target = Marker(polar(heading + offset, far * fraction));
        let scene = ObstacleView::empty();

        prop_assert!(field.is_target_visible(Vec2::ZERO, aim, 30.0, &far_target, &scene));
        prop_assert!(field.is_target_visible(Vec2::ZERO, aim, 30.0, &near_target, &scene));
    }

    #[test]
    fn points_outside_the_angle_are_rejected(
        heading in -180.0f32..180.0,
        offset in 35.0f32..180.0,
        distance in 0.5f32..6.5,
        mirrored in any::<bool>(),
    ) {
        let field = VisibilityField::default();
        let signed = if mirrored { -offset } else { offset };
        let point = polar(heading + signed, distance);

        prop_assert!(!field.within_cone(Vec2::ZERO, polar(heading, 2.0), 30.0, point));
    }
}
