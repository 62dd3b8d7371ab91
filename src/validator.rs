// src/validator.rs
use crate::config::CutMarkPolicy;
use crate::playback::CutMark;
use crate::timeline::Timeline;
use log::warn;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("cut start {start:.2}s is after cut end {end:.2}s")]
    InvertedMarks { start: f64, end: f64 },
    #[error("no video is selected")]
    NoSelection,
    #[error("timeline contains no clips")]
    EmptyTimeline,
}

/// Applies the configured policy to a cut about to become a clip.
pub fn apply_cut_policy(mark: CutMark, policy: CutMarkPolicy) -> Result<CutMark, ValidationError> {
    if !mark.is_inverted() {
        return Ok(mark);
    }
    match policy {
        CutMarkPolicy::Allow => {
            warn!(
                "[Validator] inverted cut {:.2}s..{:.2}s kept as is",
                mark.start, mark.end
            );
            Ok(mark)
        }
        CutMarkPolicy::Swap => Ok(CutMark::new(mark.end, mark.start)),
        CutMarkPolicy::Reject => Err(ValidationError::InvertedMarks {
            start: mark.start,
            end: mark.end,
        }),
    }
}

/// Checks a timeline before it is sent for rendering.
pub fn validate_timeline(timeline: &Timeline) -> Result<(), ValidationError> {
    if timeline.is_empty() {
        return Err(ValidationError::EmptyTimeline);
    }
    for clip in timeline.clips().iter().filter(|c| c.duration < 0.0) {
        warn!(
            "[Validator] clip {} from {} has negative duration {:.2}s",
            clip.id, clip.video_name, clip.duration
        );
    }
    Ok(())
}
