//! Query-space enumeration.
//!
//! A [`QuerySpace`] is the configured set of search building blocks; its
//! [`build`](QuerySpace::build) method expands them into an ordered,
//! deduplicated sequence of [`QueryDescriptor`]s. The order is stable across
//! runs for the same configuration, but resumption keys by canonical identity,
//! never by position.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One canonical combination of search filters, representing a single query
/// to the external API.
///
/// Identity is the canonical serialization of the fields with keys in sorted
/// order; the fields below are declared in that order so the serde output is
/// the canonical form. Two descriptors with identical field values are the
/// same query for deduplication and checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub colors: String,
    pub image_type: String,
    pub min_width: u32,
    pub order: String,
    pub orientation: String,
    pub q: String,
}

impl QueryDescriptor {
    /// Canonical identity used in the checkpoint's `processed` set.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).expect("descriptor fields always serialize")
    }
}

/// The configured search building blocks, expanded by [`build`](Self::build)
/// into the Cartesian product of all lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpace {
    /// Free-text search terms
    pub terms: Vec<String>,

    /// Color filters; an empty string means "no filter"
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,

    /// Orientation filters
    #[serde(default = "default_orientations")]
    pub orientations: Vec<String>,

    /// Image-type filters
    #[serde(default = "default_image_types")]
    pub image_types: Vec<String>,

    /// Sort orders
    #[serde(default = "default_orders")]
    pub orders: Vec<String>,

    /// Minimum-width thresholds; 0 means "no threshold"
    #[serde(default = "default_min_widths")]
    pub min_widths: Vec<u32>,
}

fn default_colors() -> Vec<String> {
    vec![String::new()]
}

fn default_orientations() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_image_types() -> Vec<String> {
    vec!["photo".to_string()]
}

fn default_orders() -> Vec<String> {
    vec!["popular".to_string(), "latest".to_string()]
}

fn default_min_widths() -> Vec<u32> {
    vec![0]
}

impl Default for QuerySpace {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            colors: default_colors(),
            orientations: default_orientations(),
            image_types: default_image_types(),
            orders: default_orders(),
            min_widths: default_min_widths(),
        }
    }
}

impl QuerySpace {
    /// Creates a query space over `terms` with the default modifier lists.
    pub fn with_terms(terms: Vec<String>) -> Self {
        Self {
            terms,
            ..Self::default()
        }
    }

    /// Enumerates the Cartesian product of all configured lists.
    ///
    /// The degenerate combination (color, orientation and image type all
    /// empty with a zero width threshold) collapses to one canonical
    /// all-empty descriptor per (term, order) pair. Exact duplicates are then
    /// removed by canonical identity, keeping first occurrences, so the
    /// result is a stable ordered sequence for any given configuration.
    pub fn build(&self) -> Vec<QueryDescriptor> {
        let mut descriptors = Vec::new();
        for term in &self.terms {
            for color in &self.colors {
                for orientation in &self.orientations {
                    for image_type in &self.image_types {
                        for order in &self.orders {
                            for &min_width in &self.min_widths {
                                let degenerate = color.is_empty()
                                    && orientation.is_empty()
                                    && image_type.is_empty()
                                    && min_width == 0;
                                if degenerate {
                                    descriptors.push(QueryDescriptor {
                                        colors: String::new(),
                                        image_type: String::new(),
                                        min_width: 0,
                                        order: order.clone(),
                                        orientation: String::new(),
                                        q: term.clone(),
                                    });
                                } else {
                                    descriptors.push(QueryDescriptor {
                                        colors: color.clone(),
                                        image_type: image_type.clone(),
                                        min_width,
                                        order: order.clone(),
                                        orientation: orientation.clone(),
                                        q: term.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        descriptors.retain(|d| seen.insert(d.canonical_key()));
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(terms: &[&str]) -> QuerySpace {
        QuerySpace::with_terms(terms.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = space(&["makeup", "skincare"]);
        assert_eq!(s.build(), s.build());
    }

    #[test]
    fn test_build_counts_product() {
        // 2 terms x 1 color x 1 orientation x 1 type x 2 orders x 1 width
        let s = space(&["makeup", "skincare"]);
        assert_eq!(s.build().len(), 4);
    }

    #[test]
    fn test_duplicate_terms_are_collapsed() {
        let s = space(&["makeup", "makeup"]);
        assert_eq!(s.build().len(), 2);
    }

    #[test]
    fn test_degenerate_combo_collapses_per_term_and_order() {
        let s = QuerySpace {
            terms: vec!["makeup".to_string()],
            colors: vec![String::new(), "red".to_string()],
            orientations: vec![String::new()],
            image_types: vec![String::new()],
            orders: vec!["popular".to_string()],
            min_widths: vec![0],
        };
        let built = s.build();
        // One all-empty descriptor plus one with the red filter.
        assert_eq!(built.len(), 2);
        assert!(built.iter().any(|d| d.colors.is_empty()
            && d.orientation.is_empty()
            && d.image_type.is_empty()
            && d.min_width == 0));
        assert!(built.iter().any(|d| d.colors == "red"));
    }

    #[test]
    fn test_canonical_key_has_sorted_fields() {
        let d = QueryDescriptor {
            colors: "red".to_string(),
            image_type: "photo".to_string(),
            min_width: 800,
            order: "popular".to_string(),
            orientation: "all".to_string(),
            q: "makeup".to_string(),
        };
        assert_eq!(
            d.canonical_key(),
            r#"{"colors":"red","image_type":"photo","min_width":800,"order":"popular","orientation":"all","q":"makeup"}"#
        );
    }

    #[test]
    fn test_equal_fields_share_identity() {
        let s = space(&["makeup"]);
        let a = s.build();
        let b = s.build();
        assert_eq!(a[0].canonical_key(), b[0].canonical_key());
    }
}
