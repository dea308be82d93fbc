//! The mapping collaborator: where more road comes from, and the worker
//! thread that fetches it without stalling the tick loop.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

use crate::geo::GeoPoint;
use crate::simulation::{RigidBody, RoadRequest, VehicleController};

pub trait RouteSource: Send + 'static {
    /// Road ahead of the requested position, as an ordered geographic polyline.
    fn fetch_route(&mut self, request: &RoadRequest) -> Result<Vec<GeoPoint>>;
    fn get_name(&self) -> &'static str;
}

/// Serves windows of a fixed polyline, starting at the point nearest to the
/// request.
#[derive(Debug, Clone)]
pub struct PolylineRouteSource {
    points: Vec<GeoPoint>,
    window_m: f64,
}

impl PolylineRouteSource {
    pub fn new(points: Vec<GeoPoint>, window_m: f64) -> Self {
        Self {
            points: points.into_iter().filter(GeoPoint::is_finite).collect(),
            window_m: window_m.max(0.0),
        }
    }

    /// First window, from the start of the polyline.
    pub fn initial_window(&self) -> Vec<GeoPoint> {
        self.window_from(0)
    }

    fn nearest_index(&self, position: &GeoPoint) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance_m(position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    fn window_from(&self, start: usize) -> Vec<GeoPoint> {
        let mut window = Vec::new();
        let mut travelled = 0.0;

        for (i, point) in self.points.iter().enumerate().skip(start) {
            if i > start {
                travelled += self.points[i - 1].distance_m(point);
            }
            window.push(*point);
            if travelled >= self.window_m {
                break;
            }
        }

        window
    }
}

impl RouteSource for PolylineRouteSource {
    fn fetch_route(&mut self, request: &RoadRequest) -> Result<Vec<GeoPoint>> {
        let nearest = self
            .nearest_index(&request.position())
            .ok_or_else(|| anyhow!("Polyline has no points"))?;

        if nearest + 1 >= self.points.len() {
            return Err(anyhow!(
                "No road beyond ({:.5}, {:.5})",
                request.latitude,
                request.longitude
            ));
        }

        // One point back so the vehicle sits on the first segment, not before it
        let start = nearest.saturating_sub(1);
        let window = self.window_from(start);

        debug!("Serving {} polyline points from index {}", window.len(), start);
        Ok(window)
    }

    fn get_name(&self) -> &'static str {
        "polyline"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Delivered(Vec<GeoPoint>),
    Failed(String),
}

impl FeedEvent {
    /// Hands the result to the controller on the tick thread.
    pub fn apply_to<B: RigidBody>(self, controller: &mut VehicleController<B>) {
        match self {
            FeedEvent::Delivered(points) => {
                if controller.accept_geo_route(&points) == 0 {
                    controller.road_request_failed("delivered route has no usable segments");
                }
            }
            FeedEvent::Failed(reason) => controller.road_request_failed(&reason),
        }
    }
}

enum FeedCommand {
    Fetch(RoadRequest),
    Stop,
}

/// Runs a [`RouteSource`] on its own thread. Requests go in over one
/// channel, results come back over another and are drained with
/// [`RouteFeed::try_next`], which never blocks.
pub struct RouteFeed {
    name: &'static str,
    sender: Sender<FeedCommand>,
    receiver: Receiver<FeedEvent>,
    worker: Option<JoinHandle<()>>,
}

impl RouteFeed {
    pub fn spawn<S: RouteSource>(mut source: S) -> Result<Self> {
        let name = source.get_name();
        let (sender, worker_receiver) = channel();
        let (worker_sender, receiver) = channel();

        let worker = thread::Builder::new()
            .name(format!("route-feed::{}", name))
            .spawn(move || {
                while let Ok(command) = worker_receiver.recv() {
                    let request = match command {
                        FeedCommand::Stop => break,
                        FeedCommand::Fetch(request) => request,
                    };

                    let event = match source.fetch_route(&request) {
                        Ok(points) => FeedEvent::Delivered(points),
                        Err(e) => FeedEvent::Failed(format!("{:#}", e)),
                    };

                    if worker_sender.send(event).is_err() {
                        break;
                    }
                }
            })
            .with_context(|| format!("Failed to start route feed worker '{}'", name))?;

        Ok(Self {
            name,
            sender,
            receiver,
            worker: Some(worker),
        })
    }

    pub fn get_name(&self) -> &'static str {
        self.name
    }

    pub fn request(&self, request: RoadRequest) -> Result<()> {
        self.sender
            .send(FeedCommand::Fetch(request))
            .map_err(|_| anyhow!("Route feed worker '{}' has stopped", self.name))
    }

    pub fn try_next(&self) -> Option<FeedEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("Route feed worker '{}' disconnected", self.name);
                None
            }
        }
    }
}

impl Drop for RouteFeed {
    fn drop(&mut self) {
        let _ = self.sender.send(FeedCommand::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Route feed worker '{}' panicked", self.name);
            }
        }
    }
}
