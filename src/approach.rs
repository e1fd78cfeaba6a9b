use crate::math::Vector2d;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

/// One of the four arms of the junction, indexed clockwise from north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

/// A pair of opposing approaches which share a green phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    NorthSouth,
    EastWest,
}

/// The kind of movement a vehicle makes through the junction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnType {
    /// The short turn into the adjacent arm clockwise of the origin.
    Right,
    Straight,
    /// The long turn across oncoming traffic.
    Left,
}

impl Approach {
    /// All approaches in clockwise order.
    pub const ALL: [Approach; 4] = [
        Approach::North,
        Approach::East,
        Approach::South,
        Approach::West,
    ];

    /// The clockwise index of the approach, in `0..4`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Gets the approach with the given clockwise index, wrapping modulo 4.
    pub fn from_index(idx: usize) -> Self {
        Self::ALL[idx % 4]
    }

    /// The approach directly across the junction.
    pub fn opposite(self) -> Self {
        Self::from_index(self.index() + 2)
    }

    /// The signal axis the approach belongs to.
    pub fn axis(self) -> Axis {
        match self {
            Approach::North | Approach::South => Axis::NorthSouth,
            Approach::East | Approach::West => Axis::EastWest,
        }
    }

    /// A unit vector pointing from the junction centre out along this arm.
    /// Canvas coordinates have the y-axis pointing down (south).
    pub fn outward(self) -> Vector2d {
        match self {
            Approach::North => Vector2d::new(0.0, -1.0),
            Approach::East => Vector2d::new(1.0, 0.0),
            Approach::South => Vector2d::new(0.0, 1.0),
            Approach::West => Vector2d::new(-1.0, 0.0),
        }
    }

    /// The heading angle of a vehicle driving out along this arm, in radians.
    pub fn heading(self) -> f64 {
        match self {
            Approach::East => 0.0,
            Approach::South => FRAC_PI_2,
            Approach::West => PI,
            Approach::North => 3.0 * FRAC_PI_2,
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Approach::North => "north",
            Approach::East => "east",
            Approach::South => "south",
            Approach::West => "west",
        };
        f.write_str(name)
    }
}

impl Axis {
    /// The other axis.
    pub fn other(self) -> Self {
        match self {
            Axis::NorthSouth => Axis::EastWest,
            Axis::EastWest => Axis::NorthSouth,
        }
    }
}

impl TurnType {
    /// Classifies the movement from `from` to `to` by `(to - from) mod 4`.
    /// Returns `None` for a U-turn.
    pub fn between(from: Approach, to: Approach) -> Option<Self> {
        match (to.index() + 4 - from.index()) % 4 {
            1 => Some(TurnType::Right),
            2 => Some(TurnType::Straight),
            3 => Some(TurnType::Left),
            _ => None,
        }
    }
}
