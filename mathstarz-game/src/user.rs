//! Player identity and score bookkeeping
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::constants::DEFAULT_PLAYER_NAME;

/// Numeric user identifier shared with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Score category attached to every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Triangle,
    Square,
}

impl Shape {
    /// Parse a category label case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "triangle" => Some(Self::Triangle),
            "square" => Some(Self::Square),
            _ => None,
        }
    }
}

/// Per-category score breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeStats {
    #[serde(default)]
    pub triangle: i32,
    #[serde(default)]
    pub square: i32,
}

impl ShapeStats {
    /// Points recorded for a single category.
    #[must_use]
    pub const fn points(&self, shape: Shape) -> i32 {
        match shape {
            Shape::Triangle => self.triangle,
            Shape::Square => self.square,
        }
    }

    fn add(&mut self, shape: Shape, points: i32) {
        let slot = match shape {
            Shape::Triangle => &mut self.triangle,
            Shape::Square => &mut self.square,
        };
        *slot = slot.saturating_add(points);
    }
}

/// Full user document as exchanged with the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Backend storage identifier, omitted when unknown.
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub document_id: String,
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub user_type: i32,
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub shapes: ShapeStats,
    #[serde(default)]
    pub is_logged_in: bool,
}

impl UserRecord {
    /// Minimal record for a user known only by id and first name.
    #[must_use]
    pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            first_name: first_name.into(),
            is_logged_in: true,
            ..Self::default()
        }
    }

    /// Numeric id used for puzzle scoping and backend calls.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored id is not a non-negative integer.
    pub fn user_id(&self) -> Result<UserId, ParseIntError> {
        self.id.parse()
    }

    /// Copy safe to write to local storage: the password is cleared.
    #[must_use]
    pub fn without_credentials(&self) -> Self {
        Self {
            password: String::new(),
            ..self.clone()
        }
    }

    /// Name used when personalising NPC greetings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let name = self.first_name.trim();
        if name.is_empty() {
            DEFAULT_PLAYER_NAME
        } else {
            name
        }
    }

    /// Add points to the running total and the matching category.
    ///
    /// Unknown categories still count toward the total.
    pub fn award(&mut self, points: i32, category: &str) -> Option<Shape> {
        self.total_points = self.total_points.saturating_add(points);
        let shape = Shape::parse(category);
        match shape {
            Some(shape) => self.shapes.add(shape, points),
            None => log::warn!("Unknown shape '{category}', only total points updated"),
        }
        shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_updates_total_and_category() {
        let mut user = UserRecord::new(UserId(7), "Noa");
        assert_eq!(user.award(10, "Triangle"), Some(Shape::Triangle));
        assert_eq!(user.award(5, " square "), Some(Shape::Square));
        assert_eq!(user.award(3, "hexagon"), None);
        assert_eq!(user.total_points, 18);
        assert_eq!(user.shapes.triangle, 10);
        assert_eq!(user.shapes.square, 5);
    }

    #[test]
    fn display_name_falls_back_to_player() {
        let user = UserRecord::new(UserId(1), "  ");
        assert_eq!(user.display_name(), "Player");
        let named = UserRecord::new(UserId(1), "Dana");
        assert_eq!(named.display_name(), "Dana");
    }

    #[test]
    fn user_record_uses_backend_field_names() {
        let json = r#"{
            "_id": "65f0",
            "id": "7",
            "firstName": "Noa",
            "lastName": "Levi",
            "username": "noa",
            "password": "secret",
            "userType": 1,
            "totalPoints": 40,
            "shapes": {"triangle": 30, "square": 10},
            "isLoggedIn": true
        }"#;
        let user: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(user.user_id().unwrap(), UserId(7));
        assert_eq!(user.shapes.points(Shape::Triangle), 30);

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["totalPoints"], 40);
        assert_eq!(value["_id"], "65f0");
        assert_eq!(value["isLoggedIn"], true);
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let user = UserRecord {
            id: "abc".to_string(),
            ..UserRecord::default()
        };
        assert!(user.user_id().is_err());
    }
}
