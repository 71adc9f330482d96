//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted rating
pub const MIN_RATING: i64 = 1;
/// Highest accepted rating
pub const MAX_RATING: i64 = 5;
/// Longest accepted comment, in characters
pub const MAX_COMMENT_LEN: usize = 2000;

/// A customer's rating of a product. One per customer per product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub product_id: i64,
    pub user_id: i64,
    /// Reviewer's name at the time of writing
    pub user_name: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for writing a review
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewInput {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

/// Request body for editing a review
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReviewInput {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

/// Average rating rounded to one decimal, 0 for no ratings
pub fn average_rating(ratings: &[i64]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().sum();
    let avg = sum as f64 / ratings.len() as f64;
    (avg * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5]), 5.0);
        assert_eq!(average_rating(&[4, 5]), 4.5);
        assert_eq!(average_rating(&[5, 4, 4]), 4.3);
    }
}
