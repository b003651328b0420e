//! Aggregation pipeline checks

use bson::{doc, Document};
use futures::TryStreamExt;
use serde_json::Value;

use super::compare::{approx_eq, bson_number, expect_count, numeric_value, require_fields, EPSILON};
use super::{Check, CheckContext, CheckFailure};

/// Average price per bed count, ordered by bed count
fn price_by_beds_pipeline() -> Vec<Document> {
    vec![
        doc! { "$match": { "beds": { "$exists": true }, "price": { "$exists": true } } },
        doc! { "$group": { "_id": "$beds", "price": { "$avg": "$price" } } },
        doc! { "$sort": { "_id": 1 } },
        doc! { "$project": { "_id": 0, "beds": "$_id", "price": 1 } },
    ]
}

/// Superhost versus regular host performance
fn superhost_pipeline() -> Vec<Document> {
    vec![
        doc! { "$match": { "price": { "$gt": 0 }, "number_of_reviews": { "$gt": 0 } } },
        doc! { "$addFields": {
            "isSuperhost": { "$ifNull": ["$host.host_is_superhost", false] }
        } },
        doc! { "$group": {
            "_id": "$isSuperhost",
            "avgRating": { "$avg": "$review_scores.review_scores_rating" },
            "avgReviews": { "$avg": "$number_of_reviews" },
            "avgListings": { "$avg": "$host.host_total_listings_count" },
            "avgPrice": { "$avg": "$price" },
            "totalProperties": { "$sum": 1 },
            "avgResponseRate": { "$avg": "$host.host_response_rate" },
        } },
        doc! { "$project": {
            "_id": 0,
            "hostType": { "$cond": ["$_id", "Superhost", "Regular Host"] },
            "avgRating": { "$round": ["$avgRating", 1] },
            "avgReviews": { "$round": ["$avgReviews", 0] },
            "avgListings": { "$round": ["$avgListings", 0] },
            "avgPrice": { "$round": ["$avgPrice", 2] },
            "totalProperties": "$totalProperties",
            "avgResponseRate": { "$round": ["$avgResponseRate", 1] },
        } },
        doc! { "$sort": { "avgRating": -1 } },
    ]
}

const SUPERHOST_FIELDS: [&str; 7] = [
    "hostType",
    "avgRating",
    "avgReviews",
    "avgListings",
    "avgPrice",
    "totalProperties",
    "avgResponseRate",
];

/// Rounded averages may legitimately differ by one rounding step
const RATING_TOLERANCE: f64 = 0.1;

fn json_number(item: &Value, field: &str, index: usize) -> Result<f64, CheckFailure> {
    item.get(field).and_then(numeric_value).ok_or_else(|| {
        CheckFailure::parse(format!("'{}' in result {} is not numeric", field, index))
    })
}

// ============================================================================
// pipeline-1
// ============================================================================

/// `GET statistics` matches the average price per bed count
pub struct PriceStatistics {
    ctx: CheckContext,
}

impl PriceStatistics {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for PriceStatistics {
    async fn run(&self) -> Result<(), CheckFailure> {
        let resp = self.ctx.client.get("statistics").await?;
        resp.expect_status(200)?;
        let items = resp.parse_array()?;

        if items.is_empty() {
            return Err(CheckFailure::mismatch("statistics returned no groups"));
        }
        for (i, item) in items.iter().enumerate() {
            json_number(item, "beds", i)?;
            json_number(item, "price", i)?;
        }

        let expected: Vec<Document> = self
            .ctx
            .listings()?
            .aggregate(price_by_beds_pipeline())
            .await?
            .try_collect()
            .await?;

        let first = expected
            .first()
            .ok_or_else(|| CheckFailure::mismatch("ground truth returned no groups"))?;
        let expected_beds = first.get("beds").and_then(bson_number);
        let expected_price = first.get("price").and_then(bson_number);
        let actual_beds = json_number(&items[0], "beds", 0)?;
        let actual_price = json_number(&items[0], "price", 0)?;

        if expected_beds != Some(actual_beds) {
            return Err(CheckFailure::mismatch(format!(
                "first group should be for {:?} beds but service returned {}",
                expected_beds, actual_beds
            )));
        }
        match expected_price {
            Some(p) if approx_eq(p, actual_price, EPSILON) => Ok(()),
            _ => Err(CheckFailure::mismatch(format!(
                "average price for {} beds should be {:?} but service returned {}",
                actual_beds, expected_price, actual_price
            ))),
        }
    }
}

// ============================================================================
// pipeline-2
// ============================================================================

/// `GET superhost-analytics` matches the host type comparison
pub struct SuperhostAnalytics {
    ctx: CheckContext,
}

impl SuperhostAnalytics {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for SuperhostAnalytics {
    async fn run(&self) -> Result<(), CheckFailure> {
        let resp = self.ctx.client.get("superhost-analytics").await?;
        resp.expect_status(200)?;
        let items = resp.parse_array()?;

        if items.len() != 2 {
            return Err(CheckFailure::mismatch(format!(
                "expected exactly 2 host types (Superhost and Regular Host) but got {}",
                items.len()
            )));
        }

        for (i, item) in items.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| CheckFailure::parse(format!("result {} is not an object", i)))?;
            require_fields(obj, &SUPERHOST_FIELDS, &format!("result {}", i))?;

            let host_type = obj.get("hostType").and_then(Value::as_str).unwrap_or_default();
            if host_type != "Superhost" && host_type != "Regular Host" {
                return Err(CheckFailure::mismatch(format!(
                    "invalid hostType '{}' in result {}",
                    host_type, i
                )));
            }
            for field in &SUPERHOST_FIELDS[1..] {
                json_number(item, field, i)?;
            }
        }

        let expected: Vec<Document> = self
            .ctx
            .listings()?
            .aggregate(superhost_pipeline())
            .await?
            .try_collect()
            .await?;
        expect_count("host type group", expected.len(), items.len())?;

        for item in &items {
            let host_type = item.get("hostType").and_then(Value::as_str).unwrap_or_default();
            let truth = expected
                .iter()
                .find(|d| d.get_str("hostType").map(|t| t == host_type).unwrap_or(false))
                .ok_or_else(|| {
                    CheckFailure::mismatch(format!("no ground-truth group for '{}'", host_type))
                })?;

            let actual = json_number(item, "avgRating", 0)?;
            let wanted = truth.get("avgRating").and_then(bson_number);
            match wanted {
                Some(w) if approx_eq(w, actual, RATING_TOLERANCE) => {}
                _ => {
                    return Err(CheckFailure::mismatch(format!(
                        "avgRating for {} should be {:?} but service returned {}",
                        host_type, wanted, actual
                    )))
                }
            }

            let actual_total = json_number(item, "totalProperties", 0)?;
            let wanted_total = truth.get("totalProperties").and_then(bson_number);
            if wanted_total != Some(actual_total) {
                return Err(CheckFailure::mismatch(format!(
                    "totalProperties for {} should be {:?} but service returned {}",
                    host_type, wanted_total, actual_total
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_price_pipeline_projects_beds_and_price() {
        let pipeline = price_by_beds_pipeline();
        let project = pipeline.last().unwrap().get_document("$project").unwrap();
        assert_eq!(project.get_str("beds").unwrap(), "$_id");
        assert_eq!(project.get_i32("_id").unwrap(), 0);
    }

    #[test]
    fn test_superhost_pipeline_sorts_by_rating() {
        let pipeline = superhost_pipeline();
        let sort = pipeline.last().unwrap().get_document("$sort").unwrap();
        assert_eq!(sort.get_i32("avgRating").unwrap(), -1);
    }

    #[test]
    fn test_json_number_accepts_decimal() {
        let item = json!({ "price": { "$numberDecimal": "88.25" }, "beds": "two" });
        assert_eq!(json_number(&item, "price", 0).unwrap(), 88.25);
        assert!(matches!(
            json_number(&item, "beds", 0),
            Err(CheckFailure::Parse(_))
        ));
    }
}
