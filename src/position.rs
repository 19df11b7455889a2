use rand::Rng;
use serde::{Deserialize, Serialize};

pub const NOMINAL_CARD_WIDTH: f32 = 350.0;
pub const NOMINAL_CARD_HEIGHT: f32 = 150.0;
pub const MAX_ROTATION_DEGREES: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterPosition {
    pub x: f32,
    pub y: f32,
    pub rotation_degrees: f32,
}

/// Picks a whole-pixel placement that keeps the card inside the viewport and a
/// small tilt in `[-5, 5]` degrees.
pub fn assign_position<R: Rng + ?Sized>(
    viewport_width: f32,
    viewport_height: f32,
    element_width: f32,
    element_height: f32,
    rng: &mut R,
) -> ScatterPosition {
    ScatterPosition {
        x: pick_offset(viewport_width - element_width, rng),
        y: pick_offset(viewport_height - element_height, rng),
        rotation_degrees: rng.gen_range(-MAX_ROTATION_DEGREES..=MAX_ROTATION_DEGREES),
    }
}

pub fn assign_card_position<R: Rng + ?Sized>(viewport: Viewport, rng: &mut R) -> ScatterPosition {
    assign_position(
        viewport.width,
        viewport.height,
        NOMINAL_CARD_WIDTH,
        NOMINAL_CARD_HEIGHT,
        rng,
    )
}

fn pick_offset<R: Rng + ?Sized>(span: f32, rng: &mut R) -> f32 {
    if span.is_nan() || span <= 0.0 {
        return 0.0;
    }
    (rng.gen::<f32>() * span).floor().min((span - 1.0).max(0.0))
}
