use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use rfpflow_core::domain::product::{PricingTier, Product, ProductId};

use super::codec::{parse_decimal, parse_json, parse_optional_u32, parse_u32, to_json};
use super::{ProductRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_tiers(&self, product_id: &str) -> Result<Vec<PricingTier>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT min_quantity, max_quantity, unit_price
             FROM product_pricing_tier
             WHERE product_id = ?
             ORDER BY min_quantity ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tier_from_row).collect()
    }

    async fn with_tiers(&self, row: SqliteRow) -> Result<Product, RepositoryError> {
        let mut product = product_from_row(row)?;
        product.pricing_tiers = self.load_tiers(&product.id.0).await?;
        Ok(product)
    }
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sku, name, category, specifications_json, base_price, active
             FROM product WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_tiers(row).await?)),
            None => Ok(None),
        }
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let specifications = to_json("specifications_json", &product.specifications)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO product (id, sku, name, category, specifications_json, base_price,
                                  active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 sku = excluded.sku,
                 name = excluded.name,
                 category = excluded.category,
                 specifications_json = excluded.specifications_json,
                 base_price = excluded.base_price,
                 active = excluded.active",
        )
        .bind(&product.id.0)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(specifications)
        .bind(product.base_price.to_string())
        .bind(product.active)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || format!("sku `{}` already exists", product.sku))
        })?;

        sqlx::query("DELETE FROM product_pricing_tier WHERE product_id = ?")
            .bind(&product.id.0)
            .execute(&mut *tx)
            .await?;

        for tier in &product.pricing_tiers {
            sqlx::query(
                "INSERT INTO product_pricing_tier (product_id, min_quantity, max_quantity, unit_price)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&product.id.0)
            .bind(i64::from(tier.min_quantity))
            .bind(tier.max_quantity.map(i64::from))
            .bind(tier.unit_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sku, name, category, specifications_json, base_price, active
             FROM product
             WHERE active = 1
             ORDER BY sku ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(self.with_tiers(row).await?);
        }
        Ok(products)
    }
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    let specifications_raw = row.try_get::<String, _>("specifications_json")?;

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        specifications: parse_json::<BTreeMap<String, String>>(
            "specifications_json",
            &specifications_raw,
        )?,
        base_price: parse_decimal("base_price", row.try_get("base_price")?)?,
        active: row.try_get("active")?,
        pricing_tiers: Vec::new(),
    })
}

fn tier_from_row(row: SqliteRow) -> Result<PricingTier, RepositoryError> {
    Ok(PricingTier {
        min_quantity: parse_u32("min_quantity", row.try_get("min_quantity")?)?,
        max_quantity: parse_optional_u32("max_quantity", row.try_get("max_quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use rfpflow_core::domain::product::{PricingTier, Product, ProductId};

    use super::SqlProductRepository;
    use crate::repositories::{ProductRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    fn product(id: &str, sku: &str, active: bool) -> Product {
        Product {
            id: ProductId(id.to_string()),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            category: "cable".to_string(),
            specifications: BTreeMap::from([("voltage".to_string(), "11kV".to_string())]),
            base_price: Decimal::new(260, 0),
            active,
            pricing_tiers: vec![
                PricingTier {
                    min_quantity: 10,
                    max_quantity: Some(49),
                    unit_price: Decimal::new(245, 0),
                },
                PricingTier { min_quantity: 100, max_quantity: None, unit_price: Decimal::new(196, 0) },
            ],
        }
    }

    #[tokio::test]
    async fn product_round_trip_keeps_tiers_and_specifications() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProductRepository::new(pool);
        let item = product("P-1", "CBL-11KV", true);

        repo.save(item.clone()).await.expect("save");
        let found = repo.find_by_id(&item.id).await.expect("find");

        assert_eq!(found, Some(item));
    }

    #[tokio::test]
    async fn list_active_skips_inactive_products() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProductRepository::new(pool);

        repo.save(product("P-1", "B-SKU", true)).await.expect("save 1");
        repo.save(product("P-2", "A-SKU", true)).await.expect("save 2");
        repo.save(product("P-3", "C-SKU", false)).await.expect("save 3");

        let active = repo.list_active().await.expect("list");
        let skus = active.iter().map(|item| item.sku.as_str()).collect::<Vec<_>>();
        assert_eq!(skus, vec!["A-SKU", "B-SKU"]);
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProductRepository::new(pool);

        repo.save(product("P-1", "DUP", true)).await.expect("save 1");
        let error = repo.save(product("P-2", "DUP", true)).await.expect_err("duplicate sku");

        assert!(matches!(error, RepositoryError::Conflict(_)));
    }
}
