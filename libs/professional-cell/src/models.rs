use serde::{Deserialize, Serialize};

/// Search filters of the professionals listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfessionalFilters {
    /// Free-text query; switches the listing to `/professionals/search`.
    pub search: Option<String>,
    pub specialty: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
}

impl ProfessionalFilters {
    pub fn search(query: &str) -> Self {
        Self {
            search: Some(query.to_string()),
            ..Self::default()
        }
    }

    pub fn has_search(&self) -> bool {
        self.search.as_deref().is_some_and(|q| !q.trim().is_empty())
    }

    /// Query pairs in the form the API expects; empty filters are omitted.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(q) = self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query.push(("q", q.to_string()));
        }
        if let Some(specialty) = self.specialty.as_deref().filter(|s| !s.is_empty()) {
            query.push(("specialty", specialty.to_string()));
        }
        if let Some(min_price) = self.min_price {
            query.push(("min_price", min_price.to_string()));
        }
        if let Some(max_price) = self.max_price {
            query.push(("max_price", max_price.to_string()));
        }
        if let Some(min_rating) = self.min_rating {
            query.push(("min_rating", min_rating.to_string()));
        }
        query
    }
}
