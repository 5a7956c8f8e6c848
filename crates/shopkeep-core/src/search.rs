//! # Local Search Matching
//!
//! Case-insensitive substring matching over the locally cached lists. The
//! debounced remote fallback lives in the backoffice app; this module only
//! answers "does anything I already hold match?".
//!
//! ## Matched Fields
//! ```text
//! Product   → product_name, product_id, brand, category
//! Supplier  → name, contact_person, email, phone
//! ```

use crate::types::{Product, Supplier};

/// A record that can be found by the search box.
pub trait Searchable {
    /// Identity used to de-duplicate merged results.
    fn search_key(&self) -> &str;

    /// Text fields the query is matched against.
    fn search_fields(&self) -> Vec<&str>;
}

impl Searchable for Product {
    fn search_key(&self) -> &str {
        self.id.as_str()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            &self.product_name,
            &self.product_id,
            &self.brand,
            &self.category,
        ]
    }
}

impl Searchable for Supplier {
    fn search_key(&self) -> &str {
        self.id.as_str()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(
            [&self.contact_person, &self.email, &self.phone]
                .into_iter()
                .filter_map(|f| f.as_deref()),
        );
        fields
    }
}

/// Lower-cased, trimmed form of a query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Whether any field of `item` contains `query` (case-insensitive).
///
/// An empty query matches everything.
pub fn matches<T: Searchable>(item: &T, query: &str) -> bool {
    let needle = normalize_query(query);
    if needle.is_empty() {
        return true;
    }
    item.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Items of `items` matching `query`, in their original order.
///
/// ```rust
/// use shopkeep_core::search::{filter_local, Searchable};
///
/// struct Tag(&'static str);
/// impl Searchable for Tag {
///     fn search_key(&self) -> &str { self.0 }
///     fn search_fields(&self) -> Vec<&str> { vec![self.0] }
/// }
///
/// let tags = [Tag("Basmati Rice"), Tag("Brown Sugar")];
/// let hits = filter_local(&tags, "rice");
/// assert_eq!(hits.len(), 1);
/// ```
pub fn filter_local<'a, T: Searchable>(items: &'a [T], query: &str) -> Vec<&'a T> {
    items.iter().filter(|item| matches(*item, query)).collect()
}

/// Appends the records of `incoming` not already in `cache` (by key).
///
/// Returns how many records were added.
pub fn merge_unique<T: Searchable>(cache: &mut Vec<T>, incoming: Vec<T>) -> usize {
    let before = cache.len();
    for item in incoming {
        let known = cache
            .iter()
            .any(|existing| existing.search_key() == item.search_key());
        if !known {
            cache.push(item);
        }
    }
    cache.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn product(id: &str, name: &str, brand: &str) -> Product {
        Product {
            id: RecordId::Committed(id.to_string()),
            product_id: format!("SKU-{}", id),
            product_name: name.to_string(),
            brand: brand.to_string(),
            category: "Grocery".to_string(),
            rack_number: String::new(),
            description: String::new(),
            supplier: None,
            inventories: Vec::new(),
        }
    }

    #[test]
    fn test_matches_any_field_case_insensitive() {
        let p = product("1", "Basmati Rice", "Falak");
        assert!(matches(&p, "RICE"));
        assert!(matches(&p, "falak"));
        assert!(matches(&p, "sku-1"));
        assert!(matches(&p, "  grocery "));
        assert!(!matches(&p, "XZQ99"));
    }

    #[test]
    fn test_filter_local_keeps_order() {
        let items = vec![
            product("1", "Rice", "A"),
            product("2", "Sugar", "B"),
            product("3", "Rice Flour", "C"),
        ];
        let hits: Vec<&str> = filter_local(&items, "rice")
            .iter()
            .map(|p| p.search_key())
            .collect();
        assert_eq!(hits, vec!["1", "3"]);
    }

    #[test]
    fn test_merge_unique_by_key() {
        let mut cache = vec![product("1", "Rice", "A")];
        let added = merge_unique(
            &mut cache,
            vec![product("1", "Rice (dup)", "A"), product("9", "Salt", "Z")],
        );
        assert_eq!(added, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].product_name, "Rice");
    }

    #[test]
    fn test_supplier_optional_fields() {
        let supplier = Supplier {
            id: RecordId::Committed("s1".into()),
            name: "Acme Traders".into(),
            contact_person: Some("Sana".into()),
            email: None,
            phone: Some("0300-1234567".into()),
            address: None,
            notes: None,
        };
        assert!(matches(&supplier, "sana"));
        assert!(matches(&supplier, "1234"));
        assert!(!matches(&supplier, "karachi"));
    }
}
