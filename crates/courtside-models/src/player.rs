//! Player identity and court-space coordinates.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Persistent player slot in a singles match.
///
/// Serialized as the integer `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlayerNumber {
    One,
    Two,
}

/// Raised when an integer outside `{1, 2}` is converted into a [`PlayerNumber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid player number: {0} (expected 1 or 2)")]
pub struct InvalidPlayerNumber(pub u8);

impl PlayerNumber {
    pub const BOTH: [PlayerNumber; 2] = [PlayerNumber::One, PlayerNumber::Two];

    /// The other player.
    pub fn opponent(self) -> Self {
        match self {
            PlayerNumber::One => PlayerNumber::Two,
            PlayerNumber::Two => PlayerNumber::One,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            PlayerNumber::One => 1,
            PlayerNumber::Two => 2,
        }
    }
}

impl TryFrom<u8> for PlayerNumber {
    type Error = InvalidPlayerNumber;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayerNumber::One),
            2 => Ok(PlayerNumber::Two),
            other => Err(InvalidPlayerNumber(other)),
        }
    }
}

impl From<PlayerNumber> for u8 {
    fn from(value: PlayerNumber) -> Self {
        value.as_u8()
    }
}

impl fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl JsonSchema for PlayerNumber {
    fn schema_name() -> String {
        "PlayerNumber".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <u8>::json_schema(gen)
    }
}

/// A point on the court plane in meters.
///
/// Origin is the far-left corner of the court as seen from the camera; `x` runs across the
/// court (0..=10.97) and `y` runs along it (0..=23.77). Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CourtPosition(pub f64, pub f64);

impl CourtPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self(x, y)
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.0
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.1
    }

    pub fn distance_to(&self, other: &CourtPosition) -> f64 {
        ((self.0 - other.0).powi(2) + (self.1 - other.1).powi(2)).sqrt()
    }
}

/// Real-world court dimensions used for calibration and court-space rules.
pub mod court {
    /// Court width in meters.
    pub const WIDTH_M: f64 = 10.97;
    /// Court length (baseline to baseline) in meters.
    pub const LENGTH_M: f64 = 23.77;
    /// Distance from the far baseline to the net.
    pub const NET_Y_M: f64 = LENGTH_M / 2.0;
    /// Distance from the net to each service line.
    pub const SERVICE_LINE_FROM_NET_M: f64 = 6.40;
    /// X coordinate of the centre service line.
    pub const CENTER_X_M: f64 = WIDTH_M / 2.0;

    /// Y coordinate of the far service line.
    pub fn far_service_line_y() -> f64 {
        NET_Y_M - SERVICE_LINE_FROM_NET_M
    }

    /// Y coordinate of the near service line.
    pub fn near_service_line_y() -> f64 {
        NET_Y_M + SERVICE_LINE_FROM_NET_M
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_number_serializes_as_integer() {
        let json = serde_json::to_string(&PlayerNumber::Two).unwrap();
        assert_eq!(json, "2");

        let parsed: PlayerNumber = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, PlayerNumber::One);
    }

    #[test]
    fn test_player_number_rejects_out_of_range() {
        assert!(serde_json::from_str::<PlayerNumber>("3").is_err());
        assert_eq!(PlayerNumber::try_from(0), Err(InvalidPlayerNumber(0)));
    }

    #[test]
    fn test_opponent() {
        assert_eq!(PlayerNumber::One.opponent(), PlayerNumber::Two);
        assert_eq!(PlayerNumber::Two.opponent(), PlayerNumber::One);
    }

    #[test]
    fn test_court_position_serializes_as_pair() {
        let json = serde_json::to_string(&CourtPosition::new(1.5, 20.0)).unwrap();
        assert_eq!(json, "[1.5,20.0]");
    }

    #[test]
    fn test_service_lines() {
        assert!((court::far_service_line_y() - 5.485).abs() < 1e-9);
        assert!((court::near_service_line_y() - 18.285).abs() < 1e-9);
    }
}
