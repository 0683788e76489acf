//! Built-in rules for the marketplace schema.

use super::{ComputeFn, Computation, LookupSpec, Registry, TableMigrationConfig};

impl Registry {
    /// Rules for every table of the marketplace application.
    ///
    /// Cart items in older databases carry no user id, so `cart_items.user_id`
    /// is derived from the owning cart through the `cart_owner` lookup.
    pub fn marketplace() -> Self {
        let mut registry = Registry::empty();

        registry.add_lookup(LookupSpec::new("cart_owner", "carts", "id", "user_id"));

        registry.insert(TableMigrationConfig::new("users").primary_key("id"));

        registry.insert(
            TableMigrationConfig::new("stores")
                .primary_key("id")
                .reference_from("owner_id", "users", "user_id")
                .compute(
                    "slug",
                    Computation {
                        function: ComputeFn::Slugify,
                        inputs: vec!["name".into()],
                        reference: None,
                    },
                ),
        );

        registry.insert(TableMigrationConfig::new("categories").primary_key("id"));

        registry.insert(
            TableMigrationConfig::new("products")
                .primary_key("id")
                .reference("store_id", "stores")
                .reference("category_id", "categories")
                .default_value("is_active", true)
                .default_value("stock", 0i64),
        );

        registry.insert(
            TableMigrationConfig::new("carts")
                .primary_key("id")
                .reference("user_id", "users"),
        );

        registry.insert(
            TableMigrationConfig::new("cart_items")
                .primary_key("id")
                .reference("cart_id", "carts")
                .reference("product_id", "products")
                .compute(
                    "user_id",
                    Computation {
                        function: ComputeFn::Lookup {
                            lookup: "cart_owner".into(),
                        },
                        inputs: vec!["cart_id".into()],
                        reference: Some("users".into()),
                    },
                )
                .default_value("quantity", 1i64),
        );

        registry.insert(
            TableMigrationConfig::new("orders")
                .primary_key("id")
                .reference("user_id", "users")
                .reference("store_id", "stores")
                .default_value("status", "pending"),
        );

        registry.insert(
            TableMigrationConfig::new("order_items")
                .primary_key("id")
                .reference("order_id", "orders")
                .reference("product_id", "products")
                .compute(
                    "unit_price",
                    Computation {
                        function: ComputeFn::Coalesce,
                        inputs: vec!["unit_price".into(), "price".into()],
                        reference: None,
                    },
                ),
        );

        registry.insert(
            TableMigrationConfig::new("reviews")
                .primary_key("id")
                .reference("product_id", "products")
                .reference("user_id", "users"),
        );

        // Keyed by store, so the primary key is not remapped.
        registry.insert(
            TableMigrationConfig::new("store_customizations")
                .reference("store_id", "stores")
                .default_value("theme", "default"),
        );

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    #[test]
    fn test_marketplace_registry_is_valid() {
        let registry = Registry::marketplace();
        registry.validate().unwrap();
        assert_eq!(registry.table_names().len(), 10);
        assert_eq!(registry.lookups().len(), 1);
    }

    #[test]
    fn test_cart_items_user_comes_from_lookup() {
        let registry = Registry::marketplace();
        let cart_items = registry.config_for("cart_items");
        let refs = cart_items.references();
        assert_eq!(refs["user_id"], "users");
        assert_eq!(refs["cart_id"], "carts");
        assert_eq!(
            cart_items.override_for("quantity").unwrap().default_value,
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn test_store_customizations_keep_their_keys() {
        let registry = Registry::marketplace();
        let config = registry.config_for("store_customizations");
        assert!(config.primary_key_column.is_none());
        assert_eq!(config.references()["store_id"], "stores");
    }
}
