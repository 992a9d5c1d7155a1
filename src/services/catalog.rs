use crate::{
    entities::{
        product::{self, ProductKind},
        Product,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// URL slug from a title: lowercase, alphanumerics kept, everything else
/// collapsed to single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub stock: i32,
    pub trending: bool,
    pub kind: ProductKind,
    pub event_start: Option<DateTime<Utc>>,
    pub event_end: Option<DateTime<Utc>>,
    pub event_location: Option<String>,
}

/// The catalog store: products, stock and pricing. Stock decrements and
/// sales counting happen inside the order service's paid transition, not
/// here.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        if input.kind == ProductKind::Event && input.event_start.is_none() {
            return Err(ServiceError::Validation(
                "event products require event_start".to_string(),
            ));
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title.clone()),
            slug: Set(slugify(&input.title)),
            description: Set(input.description),
            price: Set(input.price),
            discounted_price: Set(input.discounted_price),
            cost: Set(input.cost),
            stock: Set(input.stock),
            sales_count: Set(0),
            trending: Set(input.trending),
            kind: Set(input.kind),
            event_start: Set(input.event_start),
            event_end: Set(input.event_end),
            event_location: Set(input.event_location),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Strange Tales #1"), "strange-tales-1");
        assert_eq!(slugify("  Free  Comic Book Day! "), "free-comic-book-day");
        assert_eq!(slugify("ALL CAPS"), "all-caps");
    }
}
