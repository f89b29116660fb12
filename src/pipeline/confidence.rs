//! Cheap length/structure proxy for vision extraction quality.
//!
//! This is not a calibrated probability. Swap [`heuristic_confidence`] out without touching the
//! pipeline if a better signal becomes available.

const CEILING: f32 = 0.95;
const FLOOR: f32 = 0.1;
const CHARS_FOR_CEILING: f32 = 100.0;
const STRUCTURE_BONUS: f32 = 0.1;
const STRUCTURED_WORD_COUNT: usize = 5;

/// Score text returned by the vision model.
pub fn heuristic_confidence(text: &str) -> f32 {
    let length = text.trim().chars().count() as f32;
    let mut confidence = (length / CHARS_FOR_CEILING).clamp(FLOOR, CEILING);

    if text.contains('\n') || text.split_whitespace().count() > STRUCTURED_WORD_COUNT {
        confidence = (confidence + STRUCTURE_BONUS).min(CEILING);
    }
    confidence
}
