//! Ephemeral identities for person boxes when the detector supplies none.
//!
//! Greedy IoU association against constant-velocity box predictions. A track
//! that goes unmatched for more than `max_age` frames is deleted; unmatched
//! boxes open new tracks with fresh ids. Ids are never reused.

use tracing::debug;

use crate::detection::Detection;
use crate::geometry::BoundingBox;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Frames a track survives without a match
    pub max_age: u32,
    /// Minimum IoU for a box to continue a track
    pub iou_threshold: f64,
    /// Weight of the newest displacement in the velocity estimate
    pub velocity_smoothing: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_age: 15,
            iou_threshold: 0.2,
            velocity_smoothing: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct BoxTrack {
    track_id: u32,
    bbox: BoundingBox,
    velocity: (f64, f64),
    time_since_update: u32,
}

impl BoxTrack {
    fn predicted(&self) -> BoundingBox {
        let steps = (self.time_since_update + 1) as f64;
        BoundingBox::new(
            self.bbox.x + self.velocity.0 * steps,
            self.bbox.y + self.velocity.1 * steps,
            self.bbox.width,
            self.bbox.height,
        )
    }
}

#[derive(Debug)]
pub struct IouTracker {
    config: IdentityConfig,
    tracks: Vec<BoxTrack>,
    next_track_id: u32,
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(IdentityConfig::default())
    }
}

impl IouTracker {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_track_id: 1,
        }
    }

    /// Fill in `track_id` for every detection in this frame.
    pub fn assign(&mut self, detections: &mut [Detection]) {
        let predictions: Vec<BoundingBox> = self.tracks.iter().map(BoxTrack::predicted).collect();

        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (t, predicted) in predictions.iter().enumerate() {
            for (d, det) in detections.iter().enumerate() {
                let iou = predicted.iou(&det.bbox);
                if iou >= self.config.iou_threshold {
                    candidates.push((t, d, iou));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        for (t, d, _) in candidates {
            if track_matched[t] || det_matched[d] {
                continue;
            }
            track_matched[t] = true;
            det_matched[d] = true;

            let track = &mut self.tracks[t];
            let (old, new) = (track.bbox.center(), detections[d].bbox.center());
            let steps = (track.time_since_update + 1) as f64;
            let a = self.config.velocity_smoothing;
            track.velocity = (
                a * (new.x - old.x) / steps + (1.0 - a) * track.velocity.0,
                a * (new.y - old.y) / steps + (1.0 - a) * track.velocity.1,
            );
            track.bbox = detections[d].bbox;
            track.time_since_update = 0;
            detections[d].track_id = Some(track.track_id);
        }

        for (t, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[t].time_since_update += 1;
            }
        }
        let max_age = self.config.max_age;
        self.tracks.retain(|t| t.time_since_update <= max_age);

        for (d, det) in detections.iter_mut().enumerate() {
            if det_matched[d] {
                continue;
            }
            let track_id = self.next_track_id;
            self.next_track_id += 1;
            debug!(track_id, "New person track");
            self.tracks.push(BoxTrack {
                track_id,
                bbox: det.bbox,
                velocity: (0.0, 0.0),
                time_since_update: 0,
            });
            det.track_id = Some(track_id);
        }
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }
}
