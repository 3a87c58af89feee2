use std::collections::HashMap;

use tracing::debug;

use iapkit_core::{CatalogError, CatalogResult, ProductId};

use crate::product::ProductDefinition;

/// Read-only set of product definitions keyed by id.
///
/// Iteration follows registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCatalog {
    products: Vec<ProductDefinition>,
    index: HashMap<ProductId, usize>,
}

impl ProductCatalog {
    /// Build a catalog from `products`.
    ///
    /// Fails with `EmptyCatalog` for an empty sequence and `DuplicateId` on the
    /// first repeated id.
    pub fn register<I>(products: I) -> CatalogResult<Self>
    where
        I: IntoIterator<Item = ProductDefinition>,
    {
        let products: Vec<ProductDefinition> = products.into_iter().collect();
        if products.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }

        let mut index = HashMap::with_capacity(products.len());
        for (pos, product) in products.iter().enumerate() {
            if index.insert(product.id().clone(), pos).is_some() {
                return Err(CatalogError::DuplicateId(product.id().clone()));
            }
            debug!(product_id = %product.id(), kind = %product.kind(), "registered product");
        }

        Ok(Self { products, index })
    }

    pub fn lookup(&self, id: &ProductId) -> Option<&ProductDefinition> {
        self.index.get(id).map(|&pos| &self.products[pos])
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductDefinition> {
        self.products.iter()
    }

    /// Products a store may re-deliver on restore.
    pub fn entitlements(&self) -> impl Iterator<Item = &ProductDefinition> {
        self.products.iter().filter(|p| p.kind().is_entitlement())
    }
}

impl<'a> IntoIterator for &'a ProductCatalog {
    type Item = &'a ProductDefinition;
    type IntoIter = core::slice::Iter<'a, ProductDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.products.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductKind;

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    #[test]
    fn register_rejects_empty_sequence() {
        let err = ProductCatalog::register(Vec::new()).unwrap_err();
        assert_eq!(err, CatalogError::EmptyCatalog);
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let err = ProductCatalog::register(vec![
            ProductDefinition::consumable(pid("coins")),
            ProductDefinition::non_consumable(pid("rmads")),
            ProductDefinition::non_consumable(pid("coins")),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateId(pid("coins")));
    }

    #[test]
    fn lookup_returns_registered_definition() {
        let catalog = ProductCatalog::register(vec![
            ProductDefinition::consumable(pid("coins")),
            ProductDefinition::non_consumable(pid("rmads")),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.lookup(&pid("rmads")).unwrap().kind(), ProductKind::NonConsumable);
        assert!(catalog.lookup(&pid("missing")).is_none());
        assert!(catalog.contains(&pid("coins")));
    }

    #[test]
    fn iteration_follows_registration_order() {
        let catalog = ProductCatalog::register(vec![
            ProductDefinition::subscription(pid("c")),
            ProductDefinition::consumable(pid("a")),
            ProductDefinition::non_consumable(pid("b")),
        ])
        .unwrap();

        let ids: Vec<&str> = catalog.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let entitlements: Vec<&str> = catalog.entitlements().map(|p| p.id().as_str()).collect();
        assert_eq!(entitlements, vec!["c", "b"]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            /// Property: registration succeeds iff ids are unique, and every id is found.
            #[test]
            fn register_accepts_exactly_unique_sets(ids in proptest::collection::vec("[a-z]{1,3}", 1..20)) {
                let defs: Vec<ProductDefinition> = ids
                    .iter()
                    .map(|s| ProductDefinition::consumable(pid(s)))
                    .collect();
                let unique: HashSet<&String> = ids.iter().collect();

                match ProductCatalog::register(defs) {
                    Ok(catalog) => {
                        prop_assert_eq!(unique.len(), ids.len());
                        prop_assert_eq!(catalog.len(), ids.len());
                        for s in &ids {
                            prop_assert!(catalog.lookup(&pid(s)).is_some());
                        }
                    }
                    Err(CatalogError::DuplicateId(dup)) => {
                        prop_assert!(unique.len() < ids.len());
                        prop_assert!(ids.iter().filter(|s| s.as_str() == dup.as_str()).count() > 1);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }
        }
    }
}
