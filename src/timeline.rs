// src/timeline.rs
use log::debug;
use serde::{Deserialize, Serialize};

/// Clip identifiers are epoch milliseconds at creation, kept strictly increasing.
pub type ClipId = u64;

// One entry of the edit sequence. Serialized with the field names the
// processing service expects inside `clips`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineClip {
    pub id: ClipId,
    pub video_name: String,
    pub start_time: f64, // seconds into the source video
    pub end_time: f64,   // seconds into the source video
    pub duration: f64,   // end_time - start_time, negative when marks were inverted
}

impl TimelineClip {
    pub fn new(id: ClipId, video_name: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            id,
            video_name: video_name.into(),
            start_time,
            end_time,
            duration: end_time - start_time,
        }
    }
}

/// Ordered clip sequence. Order is export order; every mutation is keyed by
/// clip id so callers never juggle indices across a remove/insert.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    clips: Vec<TimelineClip>,
    last_id: ClipId,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self) -> &[TimelineClip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, id: ClipId) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id == id)
    }

    /// Sum of clip durations, i.e. the length of the rendered sequence.
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration).sum()
    }

    fn next_id(&mut self) -> ClipId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let id = now.max(self.last_id + 1);
        self.last_id = id;
        id
    }

    /// Appends a clip cut from `video_name` and returns a copy of it.
    pub fn append(&mut self, video_name: impl Into<String>, start: f64, end: f64) -> TimelineClip {
        let clip = TimelineClip::new(self.next_id(), video_name, start, end);
        debug!(
            "[Timeline] append clip {} ({} {:.2}s..{:.2}s)",
            clip.id, clip.video_name, clip.start_time, clip.end_time
        );
        self.clips.push(clip.clone());
        clip
    }

    pub fn remove(&mut self, id: ClipId) -> Option<TimelineClip> {
        let index = self.position(id)?;
        Some(self.clips.remove(index))
    }

    /// Detaches the clip and reinserts it at `target_index` of the remaining
    /// sequence (clamped to its end). Returns the final index.
    pub fn move_clip(&mut self, id: ClipId, target_index: usize) -> Option<usize> {
        let from = self.position(id)?;
        let clip = self.clips.remove(from);
        let to = target_index.min(self.clips.len());
        self.clips.insert(to, clip);
        debug!("[Timeline] moved clip {} from {} to {}", id, from, to);
        Some(to)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.clips.len();
        self.clips.clear();
        removed
    }
}
