use std::sync::Arc;

use tracing::info;

use crate::domain::interaction::{Interaction, InteractionKind};
use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::recommendations::ports::{DataSources, InteractionStore, ProductStore, RecordOutcome};
use crate::recommendations::RecommendationError;

/// Appends view and click events; views also bump the product's view counter.
#[derive(Clone)]
pub struct InteractionRecorder {
    products: Arc<dyn ProductStore>,
    interactions: Arc<dyn InteractionStore>,
}

impl InteractionRecorder {
    pub fn new(sources: &DataSources) -> Self {
        Self { products: sources.products.clone(), interactions: sources.interactions.clone() }
    }

    pub async fn record_view(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<Interaction, RecommendationError> {
        self.ensure_product(product_id).await?;

        let interaction = Interaction::new(user_id.clone(), product_id.clone(), InteractionKind::View);
        match self.interactions.record_view(&interaction).await? {
            RecordOutcome::Recorded => {
                info!(
                    event_name = "interaction.view.recorded",
                    user_id = %user_id,
                    product_id = %product_id,
                    "product view recorded"
                );
                Ok(interaction)
            }
            // deleted between the existence check and the write
            RecordOutcome::ProductMissing => {
                Err(RecommendationError::product_not_found(product_id.as_str()))
            }
        }
    }

    pub async fn record_click(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<Interaction, RecommendationError> {
        self.ensure_product(product_id).await?;

        let interaction =
            Interaction::new(user_id.clone(), product_id.clone(), InteractionKind::Click);
        self.interactions.record(&interaction).await?;
        info!(
            event_name = "interaction.click.recorded",
            user_id = %user_id,
            product_id = %product_id,
            "product click recorded"
        );
        Ok(interaction)
    }

    async fn ensure_product(&self, product_id: &ProductId) -> Result<(), RecommendationError> {
        match self.products.find_by_id(product_id).await? {
            Some(_) => Ok(()),
            None => Err(RecommendationError::product_not_found(product_id.as_str())),
        }
    }
}
