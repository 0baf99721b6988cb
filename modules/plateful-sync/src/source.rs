//! Read-only access to the source-of-record tables. The worker never writes
//! any of these; the graph is always derived from what they currently say.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecipeHistoryRow {
    pub recipe_id: String,
    pub event_type: String,
    pub event_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SavedRecipeRow {
    pub recipe_id: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecipeRatingRow {
    pub recipe_id: String,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductInteractionRow {
    pub product_id: String,
    pub interaction_type: String,
    pub rating: Option<i32>,
    pub quantity: Option<i32>,
    pub price_paid: Option<f64>,
    pub interaction_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorUserRow {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorActionRow {
    pub product_id: Option<String>,
    pub action_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchFeedbackRow {
    pub source_product_id: String,
    pub target_product_id: String,
    pub feedback_type: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SourceReader {
    pool: PgPool,
}

impl SourceReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn customer(&self, user_id: &str) -> Result<Option<CustomerRow>, sqlx::Error> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, email, full_name, updated_at FROM b2c_customers WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn recipe_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecipeHistoryRow>, sqlx::Error> {
        sqlx::query_as::<_, RecipeHistoryRow>(
            "SELECT recipe_id, event_type, event_at FROM recipe_history WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn saved_recipes(&self, user_id: &str) -> Result<Vec<SavedRecipeRow>, sqlx::Error> {
        sqlx::query_as::<_, SavedRecipeRow>(
            "SELECT recipe_id, saved_at FROM saved_recipes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn recipe_ratings(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecipeRatingRow>, sqlx::Error> {
        sqlx::query_as::<_, RecipeRatingRow>(
            "SELECT recipe_id, rating, created_at FROM recipe_ratings WHERE b2c_customer_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn product_interactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<ProductInteractionRow>, sqlx::Error> {
        sqlx::query_as::<_, ProductInteractionRow>(
            r#"
            SELECT product_id, interaction_type, rating, quantity, price_paid,
                   interaction_timestamp
            FROM customer_product_interactions
            WHERE b2c_customer_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn vendor_user(&self, user_id: &str) -> Result<Option<VendorUserRow>, sqlx::Error> {
        sqlx::query_as::<_, VendorUserRow>(
            "SELECT id, email, role, updated_at FROM vendor_users WHERE id = $1",
        )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn vendor_actions(
        &self,
        user_id: &str,
    ) -> Result<Vec<VendorActionRow>, sqlx::Error> {
        sqlx::query_as::<_, VendorActionRow>(
            r#"
            SELECT product_id, action_type, created_at
            FROM vendor_user_actions
            WHERE vendor_user_id = $1 AND product_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn match_feedback(
        &self,
        user_id: &str,
    ) -> Result<Vec<MatchFeedbackRow>, sqlx::Error> {
        sqlx::query_as::<_, MatchFeedbackRow>(
            r#"
            SELECT source_product_id, target_product_id, feedback_type, reason, created_at
            FROM match_feedback
            WHERE vendor_user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
