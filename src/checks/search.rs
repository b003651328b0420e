//! Atlas Search and Vector Search endpoint checks
//!
//! Search results depend on index state that a direct query cannot reproduce
//! outside Atlas, so these compare response shape only.

use serde_json::{json, Value};

use super::{Check, CheckContext, CheckFailure};

const MAX_SEARCH_RESULTS: usize = 10;
const FACET_NAMES: [&str; 3] = ["amenities", "property_type", "beds"];

fn expect_result_count(items: &[Value]) -> Result<(), CheckFailure> {
    if items.is_empty() {
        return Err(CheckFailure::mismatch("search returned no results"));
    }
    if items.len() > MAX_SEARCH_RESULTS {
        return Err(CheckFailure::mismatch(format!(
            "expected at most {} results but got {}; add a $limit stage",
            MAX_SEARCH_RESULTS,
            items.len()
        )));
    }
    Ok(())
}

/// Autocomplete results carry a non-empty `name` and no `_id`
pub fn validate_autocomplete(items: &[Value]) -> Result<(), CheckFailure> {
    expect_result_count(items)?;

    for (i, item) in items.iter().enumerate() {
        let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() {
            return Err(CheckFailure::parse(format!(
                "result {} has no non-empty 'name'",
                i
            )));
        }
        if item.get("_id").is_some() {
            return Err(CheckFailure::mismatch(format!(
                "result {} includes '_id'; project only the name",
                i
            )));
        }
    }
    Ok(())
}

/// A single facet document with bucketed facets and a lower-bound count
pub fn validate_facets(items: &[Value]) -> Result<(), CheckFailure> {
    if items.len() != 1 {
        return Err(CheckFailure::mismatch(format!(
            "expected exactly 1 facet result but got {}",
            items.len()
        )));
    }
    let result = &items[0];

    let facet = result
        .get("facet")
        .and_then(Value::as_object)
        .ok_or_else(|| CheckFailure::parse("facet result has no 'facet' object"))?;

    for name in FACET_NAMES {
        let buckets = facet
            .get(name)
            .and_then(|f| f.get("buckets"))
            .and_then(Value::as_array)
            .ok_or_else(|| CheckFailure::parse(format!("facet '{}' has no buckets", name)))?;
        if buckets.is_empty() {
            return Err(CheckFailure::mismatch(format!("facet '{}' has empty buckets", name)));
        }
        if let Some(i) = buckets
            .iter()
            .position(|b| b.get("_id").is_none() || b.get("count").is_none())
        {
            return Err(CheckFailure::parse(format!(
                "bucket {} of facet '{}' needs '_id' and 'count'",
                i, name
            )));
        }
    }

    if result
        .get("count")
        .and_then(|c| c.get("lowerBound"))
        .is_none()
    {
        return Err(CheckFailure::parse("facet result has no count.lowerBound"));
    }
    Ok(())
}

/// Vector search results carry `_id` and `description` and honour the filter
pub fn validate_vector_results(items: &[Value], property_type: &str) -> Result<(), CheckFailure> {
    expect_result_count(items)?;

    for (i, item) in items.iter().enumerate() {
        if item.get("_id").is_none() {
            return Err(CheckFailure::parse(format!("result {} has no '_id'", i)));
        }
        if item.get("description").is_none() {
            return Err(CheckFailure::parse(format!("result {} has no 'description'", i)));
        }
        if let Some(pt) = item.get("property_type") {
            if pt.as_str() != Some(property_type) {
                return Err(CheckFailure::mismatch(format!(
                    "result {} has property_type {} but the filter was '{}'",
                    i, pt, property_type
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// search-1
// ============================================================================

pub struct Autocomplete {
    ctx: CheckContext,
}

impl Autocomplete {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for Autocomplete {
    async fn run(&self) -> Result<(), CheckFailure> {
        let resp = self
            .ctx
            .client
            .post("autocomplete", &json!({ "query": "hawaii" }))
            .await?;
        resp.expect_status(201)?;
        validate_autocomplete(&resp.parse_array()?)
    }
}

// ============================================================================
// search-2
// ============================================================================

pub struct FacetSearch {
    ctx: CheckContext,
}

impl FacetSearch {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for FacetSearch {
    async fn run(&self) -> Result<(), CheckFailure> {
        let resp = self
            .ctx
            .client
            .post("facet", &json!({ "query": "hawaii" }))
            .await?;
        resp.expect_status(201)?;
        validate_facets(&resp.parse_array()?)
    }
}

// ============================================================================
// vector-search-1
// ============================================================================

const VECTOR_PROPERTY_TYPE: &str = "Apartment";

pub struct VectorSearch {
    ctx: CheckContext,
}

impl VectorSearch {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for VectorSearch {
    async fn run(&self) -> Result<(), CheckFailure> {
        let body = json!({
            "query": "cozy apartment near beach",
            "property_type": VECTOR_PROPERTY_TYPE,
        });
        let resp = self.ctx.client.post("vectorsearch", &body).await?;
        resp.expect_status(201)?;
        validate_vector_results(&resp.parse_array()?, VECTOR_PROPERTY_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet_result() -> Value {
        json!({
            "facet": {
                "amenities": { "buckets": [{ "_id": "Wifi", "count": 40 }] },
                "property_type": { "buckets": [{ "_id": "Apartment", "count": 30 }] },
                "beds": { "buckets": [{ "_id": 1, "count": 20 }] },
            },
            "count": { "lowerBound": 52 },
        })
    }

    #[test]
    fn test_autocomplete_shapes() {
        assert!(validate_autocomplete(&[json!({ "name": "Hawaii Hideaway" })]).is_ok());
        assert!(validate_autocomplete(&[]).is_err());
        assert!(validate_autocomplete(&[json!({ "name": "x", "_id": "1" })]).is_err());
        assert!(validate_autocomplete(&[json!({ "name": "" })]).is_err());

        let eleven: Vec<Value> = (0..11).map(|i| json!({ "name": format!("n{}", i) })).collect();
        assert!(validate_autocomplete(&eleven).is_err());
    }

    #[test]
    fn test_facets_require_buckets_and_count() {
        assert!(validate_facets(&[facet_result()]).is_ok());

        let mut no_count = facet_result();
        no_count.as_object_mut().unwrap().remove("count");
        assert!(validate_facets(&[no_count]).is_err());

        let mut empty = facet_result();
        empty["facet"]["beds"]["buckets"] = json!([]);
        assert!(validate_facets(&[empty]).is_err());

        assert!(validate_facets(&[facet_result(), facet_result()]).is_err());
    }

    #[test]
    fn test_vector_results_honour_filter() {
        let ok = [json!({ "_id": "1", "description": "d", "property_type": "Apartment" })];
        assert!(validate_vector_results(&ok, "Apartment").is_ok());

        let wrong = [json!({ "_id": "1", "description": "d", "property_type": "House" })];
        assert!(matches!(
            validate_vector_results(&wrong, "Apartment"),
            Err(CheckFailure::Mismatch(_))
        ));

        let missing = [json!({ "_id": "1" })];
        assert!(validate_vector_results(&missing, "Apartment").is_err());
    }
}
