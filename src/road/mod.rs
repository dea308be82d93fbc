use nalgebra::Vector2;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::geo::GeoPoint;

pub mod pipeline;
pub mod polyline;

pub use pipeline::*;
pub use polyline::*;

pub type Vec2 = Vector2<f32>;

/// Segments shorter than this (squared, m^2) project onto their start point.
const DEGENERATE_LENGTH_SQ: f32 = 1e-6;

static NEXT_ROUTE_REVISION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoadError {
    #[error("lane count must be at least 1, got {0}")]
    InvalidLaneCount(u32),
    #[error("lane width must be positive, got {0} m")]
    InvalidLaneWidth(f32),
    #[error("segment endpoints must be finite")]
    NonFinitePoint,
}

/// One straight piece of road in local (east, north) metres.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    start: Vec2,
    end: Vec2,
    lane_count: u32,
    lane_width_m: f32,
    source: Option<GeoPoint>,
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    pub point: Vec2,
    /// Parametric position along the segment, clamped to `[0, 1]`.
    pub t: f32,
    pub distance_sq: f32,
}

impl SegmentProjection {
    pub fn distance(&self) -> f32 {
        self.distance_sq.sqrt()
    }
}

impl RoadSegment {
    pub fn new(start: Vec2, end: Vec2, lane_count: u32, lane_width_m: f32) -> Result<Self, RoadError> {
        if lane_count == 0 {
            return Err(RoadError::InvalidLaneCount(lane_count));
        }
        if !(lane_width_m > 0.0) || !lane_width_m.is_finite() {
            return Err(RoadError::InvalidLaneWidth(lane_width_m));
        }
        if !(start.iter().all(|c| c.is_finite()) && end.iter().all(|c| c.is_finite())) {
            return Err(RoadError::NonFinitePoint);
        }

        Ok(Self {
            start,
            end,
            lane_count,
            lane_width_m,
            source: None,
        })
    }

    // Callers guarantee the invariants checked in `new`.
    pub(crate) fn new_unchecked(start: Vec2, end: Vec2, lane_count: u32, lane_width_m: f32) -> Self {
        Self {
            start,
            end,
            lane_count,
            lane_width_m,
            source: None,
        }
    }

    /// Attach the geographic point this segment starts at.
    pub fn with_source(mut self, source: GeoPoint) -> Self {
        self.source = Some(source);
        self
    }

    pub fn start(&self) -> Vec2 {
        self.start
    }

    pub fn end(&self) -> Vec2 {
        self.end
    }

    pub fn lane_count(&self) -> u32 {
        self.lane_count
    }

    pub fn lane_width(&self) -> f32 {
        self.lane_width_m
    }

    pub fn source(&self) -> Option<GeoPoint> {
        self.source
    }

    pub fn length(&self) -> f32 {
        (self.end - self.start).norm()
    }

    /// Half the painted road width.
    pub fn base_half_width(&self) -> f32 {
        self.lane_count as f32 * self.lane_width_m * 0.5
    }

    /// Unit direction from start to end; north for a degenerate segment.
    pub fn direction(&self) -> Vec2 {
        let d = self.end - self.start;
        if d.norm_squared() < DEGENERATE_LENGTH_SQ {
            Vec2::new(0.0, 1.0)
        } else {
            d.normalize()
        }
    }

    /// Unit vector pointing to the right of the direction of travel.
    pub fn right(&self) -> Vec2 {
        let d = self.direction();
        Vec2::new(d.y, -d.x)
    }

    pub fn point_at(&self, t: f32) -> Vec2 {
        self.start + (self.end - self.start) * t.clamp(0.0, 1.0)
    }

    /// Closest point on the segment to `p` (clamped parametric projection).
    pub fn project(&self, p: &Vec2) -> SegmentProjection {
        let ab = self.end - self.start;
        let len_sq = ab.norm_squared();

        if len_sq < DEGENERATE_LENGTH_SQ {
            return SegmentProjection {
                point: self.start,
                t: 0.0,
                distance_sq: (p - self.start).norm_squared(),
            };
        }

        let t = ((p - self.start).dot(&ab) / len_sq).clamp(0.0, 1.0);
        let point = self.start + ab * t;

        SegmentProjection {
            point,
            t,
            distance_sq: (p - point).norm_squared(),
        }
    }
}

/// An ordered, immutable list of road segments.
///
/// Cloning is cheap and shares the segments. Every constructed route gets a
/// fresh revision, so holders can tell a replacement apart from the same list.
#[derive(Debug, Clone)]
pub struct Route {
    segments: Arc<[RoadSegment]>,
    // length_after[i] = total length of segments i+1..
    length_after: Arc<[f32]>,
    revision: u64,
}

impl Route {
    pub fn new(segments: Vec<RoadSegment>) -> Self {
        let mut length_after = vec![0.0f32; segments.len()];
        let mut acc = 0.0f32;
        for i in (0..segments.len()).rev() {
            length_after[i] = acc;
            acc += segments[i].length();
        }

        Self {
            segments: segments.into(),
            length_after: length_after.into(),
            revision: NEXT_ROUTE_REVISION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when both values are the same revision of the same list.
    pub fn same_as(&self, other: &Route) -> bool {
        self.revision == other.revision
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&RoadSegment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_length(&self) -> f32 {
        match self.segments.first() {
            Some(first) => first.length() + self.length_after[0],
            None => 0.0,
        }
    }

    /// Road left from progress `t` on segment `index` to the end of the route.
    pub fn remaining_from(&self, index: usize, t: f32) -> Option<f32> {
        let segment = self.segments.get(index)?;
        Some((1.0 - t.clamp(0.0, 1.0)) * segment.length() + self.length_after[index])
    }

    /// Closest segment to `p`, preferring segments near `anchor` in route order.
    ///
    /// Each segment scores its squared distance plus `index_penalty` per index
    /// step away from `anchor`, so a road that loops back near itself does not
    /// steal the match from the stretch being driven.
    pub fn closest_segment(&self, p: &Vec2, anchor: Option<usize>, index_penalty: f32) -> Option<(usize, SegmentProjection)> {
        let mut best: Option<(usize, SegmentProjection, f32)> = None;

        for (i, segment) in self.segments.iter().enumerate() {
            let projection = segment.project(p);
            let score = hysteresis_score(projection.distance_sq, i, anchor, index_penalty);

            let better = match &best {
                None => true,
                Some((_, best_projection, best_score)) => {
                    score < *best_score || (score == *best_score && projection.distance_sq < best_projection.distance_sq)
                }
            };
            if better {
                best = Some((i, projection, score));
            }
        }

        best.map(|(i, projection, _)| (i, projection))
    }

    /// Walks `distance` metres forward along the route from (`index`, `t`).
    ///
    /// Returns the reached point and the direction of the segment it lies on.
    /// Running past the end stops at the final endpoint.
    pub fn point_ahead(&self, index: usize, t: f32, distance: f32) -> Option<(Vec2, Vec2)> {
        let mut index = index;
        let mut segment = self.segments.get(index)?;
        let mut t = t.clamp(0.0, 1.0);
        let mut left = distance.max(0.0);

        loop {
            let length = segment.length();
            let available = (1.0 - t) * length;

            if left <= available && length > 0.0 {
                return Some((segment.point_at(t + left / length), segment.direction()));
            }

            left -= available;
            match self.segments.get(index + 1) {
                Some(next) => {
                    index += 1;
                    segment = next;
                    t = 0.0;
                }
                None => return Some((segment.end(), segment.direction())),
            }
        }
    }
}

/// Squared distance plus a penalty for drifting away from `anchor` in route order.
pub fn hysteresis_score(distance_sq: f32, index: usize, anchor: Option<usize>, index_penalty: f32) -> f32 {
    match anchor {
        Some(anchor) => distance_sq + index.abs_diff(anchor) as f32 * index_penalty,
        None => distance_sq,
    }
}

impl Default for Route {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(ax: f32, ay: f32, bx: f32, by: f32) -> RoadSegment {
        RoadSegment::new(Vec2::new(ax, ay), Vec2::new(bx, by), 2, 3.0).unwrap()
    }

    #[test]
    fn rejects_invalid_lanes() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(0.0, 10.0);
        assert_eq!(RoadSegment::new(a, b, 0, 3.0), Err(RoadError::InvalidLaneCount(0)));
        assert_eq!(RoadSegment::new(a, b, 1, 0.0), Err(RoadError::InvalidLaneWidth(0.0)));
        assert_eq!(RoadSegment::new(a, b, 1, -2.0), Err(RoadError::InvalidLaneWidth(-2.0)));
        assert_eq!(
            RoadSegment::new(Vec2::new(f32::NAN, 0.0), b, 1, 3.0),
            Err(RoadError::NonFinitePoint)
        );
    }

    #[test]
    fn projection_clamps_to_endpoints() {
        let s = seg(0.0, 0.0, 0.0, 100.0);

        let mid = s.project(&Vec2::new(3.0, 40.0));
        assert!((mid.t - 0.4).abs() < 1e-6);
        assert!((mid.distance() - 3.0).abs() < 1e-5);

        let before = s.project(&Vec2::new(0.0, -10.0));
        assert_eq!(before.t, 0.0);
        assert_eq!(before.point, Vec2::new(0.0, 0.0));

        let after = s.project(&Vec2::new(1.0, 150.0));
        assert_eq!(after.t, 1.0);
        assert_eq!(after.point, Vec2::new(0.0, 100.0));
    }

    #[test]
    fn degenerate_segment_projects_to_start() {
        let s = seg(5.0, 5.0, 5.0, 5.0);
        let p = s.project(&Vec2::new(8.0, 9.0));
        assert_eq!(p.t, 0.0);
        assert_eq!(p.point, Vec2::new(5.0, 5.0));
        assert!((p.distance() - 5.0).abs() < 1e-5);
        assert_eq!(s.direction(), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn right_hand_direction() {
        let north = seg(0.0, 0.0, 0.0, 10.0);
        assert_eq!(north.right(), Vec2::new(1.0, 0.0));
        let east = seg(0.0, 0.0, 10.0, 0.0);
        assert_eq!(east.right(), Vec2::new(0.0, -1.0));
    }

    #[test]
    fn remaining_distance_sums_following_segments() {
        let route = Route::new(vec![seg(0.0, 0.0, 0.0, 100.0), seg(0.0, 100.0, 100.0, 100.0)]);
        assert_eq!(route.total_length(), 200.0);
        assert_eq!(route.remaining_from(0, 0.0), Some(200.0));
        assert_eq!(route.remaining_from(0, 0.25), Some(175.0));
        assert_eq!(route.remaining_from(1, 1.0), Some(0.0));
        assert_eq!(route.remaining_from(2, 0.0), None);
    }

    #[test]
    fn point_ahead_crosses_segment_boundaries() {
        let route = Route::new(vec![seg(0.0, 0.0, 0.0, 100.0), seg(0.0, 100.0, 100.0, 100.0)]);

        let (p, dir) = route.point_ahead(0, 0.5, 10.0).unwrap();
        assert!((p - Vec2::new(0.0, 60.0)).norm() < 1e-4);
        assert_eq!(dir, Vec2::new(0.0, 1.0));

        let (p, dir) = route.point_ahead(0, 0.95, 8.0).unwrap();
        assert!((p - Vec2::new(3.0, 100.0)).norm() < 1e-3);
        assert_eq!(dir, Vec2::new(1.0, 0.0));

        let (p, _) = route.point_ahead(1, 0.9, 50.0).unwrap();
        assert_eq!(p, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn closest_segment_prefers_route_order_on_ties() {
        // Out along y = 0 and back along y = 1: both legs are equally close to (5, 0.5)
        let route = Route::new(vec![
            seg(0.0, 0.0, 10.0, 0.0),
            seg(10.0, 0.0, 10.0, 1.0),
            seg(10.0, 1.0, 0.0, 1.0),
        ]);
        let p = Vec2::new(5.0, 0.5);

        let (near_start, _) = route.closest_segment(&p, Some(0), 0.05).unwrap();
        assert_eq!(near_start, 0);
        let (near_end, _) = route.closest_segment(&p, Some(2), 0.05).unwrap();
        assert_eq!(near_end, 2);

        assert!(Route::empty().closest_segment(&p, None, 0.05).is_none());
    }

    #[test]
    fn every_route_gets_a_new_revision() {
        let a = Route::new(vec![seg(0.0, 0.0, 0.0, 10.0)]);
        let b = Route::new(vec![seg(0.0, 0.0, 0.0, 10.0)]);
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }
}
