use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Side a participant plays for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Moves first.
    White,
    /// Moves second.
    Black,
}

impl Color {
    /// The other side of the board.
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<shakmaty::Color> for Color {
    fn from(value: shakmaty::Color) -> Self {
        match value {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

/// Source of creator colors.
///
/// Seeded pickers replay the same sequence, which keeps color assignment
/// deterministic in tests and reproducible from configuration.
pub struct ColorPicker {
    rng: Mutex<StdRng>,
}

impl ColorPicker {
    /// Picker backed by operating-system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Picker replaying the sequence derived from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Build a picker from an optional configured seed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Draw a color uniformly at random.
    pub fn pick(&self) -> Color {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.random_bool(0.5) {
            Color::White
        } else {
            Color::Black
        }
    }
}

impl Default for ColorPicker {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::Black.opposite(), Color::White);
        assert_eq!(Color::White.opposite().opposite(), Color::White);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Color::White).unwrap(), "\"white\"");
        assert_eq!(serde_json::to_string(&Color::Black).unwrap(), "\"black\"");
    }

    #[test]
    fn seeded_pickers_agree() {
        let first = ColorPicker::seeded(42);
        let second = ColorPicker::seeded(42);
        let a: Vec<Color> = (0..32).map(|_| first.pick()).collect();
        let b: Vec<Color> = (0..32).map(|_| second.pick()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn picker_yields_both_colors() {
        let picker = ColorPicker::seeded(7);
        let picks: Vec<Color> = (0..64).map(|_| picker.pick()).collect();
        assert!(picks.contains(&Color::White));
        assert!(picks.contains(&Color::Black));
    }
}
