//! Where a new note lands on the board.
//!
//! Candidates are drawn uniformly from the usable area and the first one far
//! enough from every existing note wins. A crowded board falls back to the
//! last candidate, so placement always terminates.

use rand::Rng;

/// Lowest coordinate (percent) a note may be placed at.
pub const AREA_MIN: f64 = 5.0;
/// Width of the usable band, so positions fall in `[5, 75)`.
pub const AREA_SPAN: f64 = 70.0;
/// Minimum distance, in percentage points, between two note origins.
pub const MIN_GAP: f64 = 12.0;
pub const MAX_ATTEMPTS: usize = 50;

pub fn pick_position<R: Rng + ?Sized>(rng: &mut R, existing: &[(f64, f64)]) -> (f64, f64) {
    let mut candidate = random_point(rng);
    for _ in 0..MAX_ATTEMPTS {
        if existing.iter().all(|&(x, y)| distance((x, y), candidate) >= MIN_GAP) {
            return candidate;
        }
        candidate = random_point(rng);
    }
    candidate
}

/// Slight tilt in `[-5, 5)` degrees.
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(-5.0..5.0)
}

/// Keep a dragged note on the board.
pub fn clamp_to_board(x: f64, y: f64) -> (f64, f64) {
    (x.clamp(0.0, 100.0), y.clamp(0.0, 100.0))
}

fn random_point<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    (
        rng.gen_range(AREA_MIN..AREA_MIN + AREA_SPAN),
        rng.gen_range(AREA_MIN..AREA_MIN + AREA_SPAN),
    )
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
