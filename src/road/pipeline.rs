//! Geo polyline to road segments.

use log::debug;

use super::{RoadError, RoadSegment, Route, Vec2};
use crate::config::RoadConfig;
use crate::geo::{GeoPoint, GeoProjector};

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct RoadBuild {
    pub route: Route,
    /// Projection used for this route; `None` when the input had no usable point.
    pub projector: Option<GeoProjector>,
    /// The geographic samples that survived down-sampling.
    pub kept_points: Vec<GeoPoint>,
}

impl RoadBuild {
    fn empty() -> Self {
        Self {
            route: Route::empty(),
            projector: None,
            kept_points: Vec::new(),
        }
    }
}

/// Turns an ordered list of geographic points into metric road segments.
#[derive(Debug, Clone)]
pub struct RoadPipeline {
    lane_count: u32,
    lane_width_m: f32,
    sample_every_m: f32,
    min_segment_length_m: f32,
}

impl RoadPipeline {
    pub fn new(lane_count: u32, lane_width_m: f32, sample_every_m: f32) -> Result<Self, RoadError> {
        if lane_count == 0 {
            return Err(RoadError::InvalidLaneCount(lane_count));
        }
        if !(lane_width_m > 0.0) || !lane_width_m.is_finite() {
            return Err(RoadError::InvalidLaneWidth(lane_width_m));
        }

        Ok(Self {
            lane_count,
            lane_width_m,
            sample_every_m: sample_every_m.max(0.0),
            min_segment_length_m: 0.05,
        })
    }

    pub fn from_config(config: &RoadConfig) -> Result<Self, RoadError> {
        let mut pipeline = Self::new(config.default_lane_count, config.default_lane_width_m, config.sample_every_m)?;
        pipeline.min_segment_length_m = config.min_segment_length_m.max(0.0);
        Ok(pipeline)
    }

    pub fn lane_count(&self) -> u32 {
        self.lane_count
    }

    pub fn lane_width(&self) -> f32 {
        self.lane_width_m
    }

    /// Runs the pipeline with the first usable point as projection origin.
    ///
    /// Fewer than two usable points yields an empty route. Non-finite points
    /// are skipped.
    pub fn build(&self, points: &[GeoPoint]) -> RoadBuild {
        match points.iter().find(|p| p.is_finite()) {
            Some(origin) => self.build_in_frame(points, GeoProjector::new(*origin)),
            None => RoadBuild::empty(),
        }
    }

    /// Runs the pipeline in an existing local frame, so a replacement route
    /// lines up with the one the vehicle is already driving on.
    ///
    /// A point is kept when it is at least `sample_every_m` from the last kept
    /// point, and the final point is always kept.
    pub fn build_in_frame(&self, points: &[GeoPoint], projector: GeoProjector) -> RoadBuild {
        let mut usable = points.iter().filter(|p| p.is_finite());

        let first = match usable.next() {
            Some(first) => *first,
            None => return RoadBuild::empty(),
        };

        let mut kept: Vec<(GeoPoint, Vec2)> = vec![(first, projector.to_local(&first))];
        let mut last_seen: Option<(GeoPoint, Vec2)> = None;

        for point in usable {
            let local = projector.to_local(point);
            let (_, last_kept) = kept[kept.len() - 1];

            if (local - last_kept).norm() >= self.sample_every_m {
                kept.push((*point, local));
                last_seen = None;
            } else {
                last_seen = Some((*point, local));
            }
        }

        // The route has to reach the true end of the polyline.
        if let Some(last) = last_seen {
            kept.push(last);
        }

        let segments: Vec<RoadSegment> = kept
            .windows(2)
            .filter_map(|pair| {
                let (geo, start) = pair[0];
                let (_, end) = pair[1];
                if (end - start).norm() < self.min_segment_length_m {
                    return None;
                }
                Some(RoadSegment::new_unchecked(start, end, self.lane_count, self.lane_width_m).with_source(geo))
            })
            .collect();

        debug!(
            "Road pipeline: {} input points, {} kept, {} segments",
            points.len(),
            kept.len(),
            segments.len()
        );

        let route = if segments.is_empty() {
            Route::empty()
        } else {
            Route::new(segments)
        };

        RoadBuild {
            route,
            projector: Some(projector),
            kept_points: kept.into_iter().map(|(geo, _)| geo).collect(),
        }
    }
}
