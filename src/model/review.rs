use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Two-way review: farmer reviews operator, operator reviews farmer. One per
/// (booking, reviewer).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookingReview {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i16,
    pub punctuality_rating: Option<i16>,
    pub quality_rating: Option<i16>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub booking_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i16,
    pub punctuality_rating: Option<i16>,
    pub quality_rating: Option<i16>,
    pub comment: Option<String>,
}

impl CreateReviewRequest {
    pub fn validate(&self) -> Result<()> {
        check_rating("rating", self.rating)?;
        if let Some(r) = self.punctuality_rating {
            check_rating("punctuality_rating", r)?;
        }
        if let Some(r) = self.quality_rating {
            check_rating("quality_rating", r)?;
        }
        if self.reviewer_id == self.reviewee_id {
            return Err(Error::validation("reviewer and reviewee must differ"));
        }
        Ok(())
    }

    /// Reviewer and reviewee must be the two opposing parties of the booking:
    /// the farmer's user reviewing the operator's user, or the other way
    /// around.
    pub fn check_parties(&self, farmer_user_id: Uuid, operator_user_id: Uuid) -> Result<()> {
        let farmer_reviews_operator =
            self.reviewer_id == farmer_user_id && self.reviewee_id == operator_user_id;
        let operator_reviews_farmer =
            self.reviewer_id == operator_user_id && self.reviewee_id == farmer_user_id;
        if !farmer_reviews_operator && !operator_reviews_farmer {
            return Err(Error::validation(
                "reviewer and reviewee must be the farmer and operator of this booking",
            ));
        }
        Ok(())
    }
}

fn check_rating(field: &str, value: i16) -> Result<()> {
    if !(1..=5).contains(&value) {
        return Err(Error::validation(format!("{} must be between 1 and 5", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reviewer_id: Uuid, reviewee_id: Uuid, rating: i16) -> CreateReviewRequest {
        CreateReviewRequest {
            booking_id: Uuid::new_v4(),
            reviewer_id,
            reviewee_id,
            rating,
            punctuality_rating: None,
            quality_rating: None,
            comment: None,
        }
    }

    #[test]
    fn rating_out_of_range() {
        let req = request(Uuid::new_v4(), Uuid::new_v4(), 6);
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
        let req = request(Uuid::new_v4(), Uuid::new_v4(), 0);
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn parties_must_oppose() {
        let farmer = Uuid::new_v4();
        let operator = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(request(farmer, operator, 5).check_parties(farmer, operator).is_ok());
        assert!(request(operator, farmer, 4).check_parties(farmer, operator).is_ok());
        // a third party cannot review
        assert!(request(stranger, operator, 3)
            .check_parties(farmer, operator)
            .is_err());
        // both ids on the same side is no good either
        assert!(request(farmer, farmer, 3).validate().is_err());
    }
}
