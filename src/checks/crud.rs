//! CRUD checks against the listings resource

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::compare::{bson_id, bson_number, expect_count, json_doc_id, json_id, require_fields};
use super::{unique_suffix, Check, CheckContext, CheckFailure};

// ============================================================================
// Shared helpers
// ============================================================================

fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// First listing in natural order, with its `_id`
async fn first_listing(ctx: &CheckContext) -> Result<(Bson, String), CheckFailure> {
    let listings = ctx.listings()?;
    let item = listings
        .find_one(doc! {})
        .await?
        .ok_or_else(|| CheckFailure::config("listingsAndReviews collection is empty"))?;
    let id = item
        .get("_id")
        .cloned()
        .ok_or_else(|| CheckFailure::config("listing without _id"))?;
    let id_str = bson_id(&id);
    Ok((id, id_str))
}

fn is_acknowledged(result: &Map<String, Value>) -> bool {
    result.get("acknowledged").and_then(Value::as_bool) == Some(true)
}

fn count_field(result: &Map<String, Value>, field: &str) -> Option<i64> {
    result.get(field).and_then(Value::as_i64)
}

/// Validate a write result carrying `acknowledged`, `matchedCount` and `modifiedCount`
fn expect_update_result(result: &Map<String, Value>, op: &str) -> Result<(), CheckFailure> {
    if !is_acknowledged(result) {
        return Err(CheckFailure::mismatch(format!("{} was not acknowledged", op)));
    }
    if count_field(result, "matchedCount").unwrap_or(0) == 0 {
        return Err(CheckFailure::mismatch(format!(
            "{} matched no documents; check the _id used in the filter",
            op
        )));
    }
    if count_field(result, "modifiedCount").unwrap_or(0) == 0 {
        return Err(CheckFailure::mismatch(format!(
            "{} modified no documents",
            op
        )));
    }
    Ok(())
}

fn compare_first_ids(expected: &[Document], actual: &[Value]) -> Result<(), CheckFailure> {
    let expected_id = expected
        .first()
        .and_then(|d| d.get("_id"))
        .map(bson_id)
        .ok_or_else(|| CheckFailure::mismatch("ground truth returned no documents"))?;
    let actual_id = actual.first().and_then(json_doc_id);

    if actual_id.as_deref() != Some(expected_id.as_str()) {
        return Err(CheckFailure::mismatch(format!(
            "first document _id should be '{}' but service returned '{}'",
            expected_id,
            actual_id.unwrap_or_else(|| "<none>".to_string())
        )));
    }
    Ok(())
}

// ============================================================================
// crud-1: paged find
// ============================================================================

/// `GET ?query={}&skip=0&limit=5` matches a paged find sorted by `_id`
pub struct PagedFind {
    ctx: CheckContext,
}

impl PagedFind {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for PagedFind {
    async fn run(&self) -> Result<(), CheckFailure> {
        let path = format!("?query={}&skip=0&limit=5", urlencoding::encode("{}"));
        let resp = self.ctx.client.get(&path).await?;
        resp.expect_status(200)?;
        let items = resp.parse_array()?;

        let expected: Vec<Document> = self
            .ctx
            .listings()?
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .skip(0)
            .limit(5)
            .await?
            .try_collect()
            .await?;

        expect_count("listing", expected.len(), items.len())?;
        if items.is_empty() {
            return Err(CheckFailure::mismatch("no listings returned"));
        }
        compare_first_ids(&expected, &items)
    }
}

// ============================================================================
// crud-2: find by id
// ============================================================================

/// `GET {id}` of a sampled listing returns that listing
pub struct FindById {
    ctx: CheckContext,
}

impl FindById {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for FindById {
    async fn run(&self) -> Result<(), CheckFailure> {
        let sampled: Vec<Document> = self
            .ctx
            .listings()?
            .aggregate(vec![doc! { "$sample": { "size": 1 } }])
            .await?
            .try_collect()
            .await?;
        let id = sampled
            .first()
            .and_then(|d| d.get("_id"))
            .map(bson_id)
            .ok_or_else(|| CheckFailure::config("listingsAndReviews collection is empty"))?;

        let resp = self.ctx.client.get(&encode_id(&id)).await?;
        resp.expect_status(200)?;
        let item = resp.parse_object()?;

        let returned = item.get("_id").and_then(json_id);
        if returned.as_deref() != Some(id.as_str()) {
            return Err(CheckFailure::mismatch(format!(
                "expected listing '{}' but service returned '{}'",
                id,
                returned.unwrap_or_else(|| "<none>".to_string())
            )));
        }
        require_fields(&item, &["name", "property_type"], "returned listing")
    }
}

// ============================================================================
// crud-3: distinct
// ============================================================================

/// `GET distinct?field=bedrooms` matches the distinct values in the collection
pub struct DistinctValues {
    ctx: CheckContext,
}

impl DistinctValues {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for DistinctValues {
    async fn run(&self) -> Result<(), CheckFailure> {
        let resp = self.ctx.client.get("distinct?field=bedrooms").await?;
        resp.expect_status(200)?;
        let values = resp.parse_array()?;

        if values.is_empty() {
            return Err(CheckFailure::mismatch(
                "no distinct values returned for 'bedrooms'",
            ));
        }

        let expected = self
            .ctx
            .listings()?
            .distinct("bedrooms", doc! {})
            .await?;
        expect_count("distinct bedrooms value", expected.len(), values.len())
    }
}

// ============================================================================
// crud-4: filter
// ============================================================================

const FILTER_AMENITIES: [&str; 2] = ["24-hour check-in", "Accessible-height bed"];
const FILTER_PROPERTY_TYPE: &str = "Apartment";
const FILTER_PAGE_SIZE: i64 = 12;

/// `POST filter` matches the equivalent find for amenities, type and bed range
pub struct FilteredFind {
    ctx: CheckContext,
}

impl FilteredFind {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for FilteredFind {
    async fn run(&self) -> Result<(), CheckFailure> {
        let body = json!({
            "limit": FILTER_PAGE_SIZE,
            "page": 1,
            "filters": {
                "amenities": FILTER_AMENITIES,
                "propertyType": FILTER_PROPERTY_TYPE,
                "beds": "1-2",
            }
        });
        let resp = self.ctx.client.post("filter", &body).await?;
        resp.expect_status(201)?;
        let items = resp.parse_array()?;

        if items.is_empty() {
            return Err(CheckFailure::mismatch(
                "no results for amenities, property type and beds 1-2",
            ));
        }

        let expected: Vec<Document> = self
            .ctx
            .listings()?
            .find(doc! {
                "amenities": { "$all": FILTER_AMENITIES.to_vec() },
                "property_type": FILTER_PROPERTY_TYPE,
                "beds": { "$gte": 1, "$lte": 2 },
            })
            .skip(0)
            .limit(FILTER_PAGE_SIZE)
            .await?
            .try_collect()
            .await?;

        expect_count("filtered listing", expected.len(), items.len())?;
        compare_first_ids(&expected, &items)
    }
}

// ============================================================================
// crud-5: insert
// ============================================================================

/// `POST` with `{item}` creates the listing and reports its id
pub struct InsertListing {
    ctx: CheckContext,
}

impl InsertListing {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl InsertListing {
    async fn create(&self, body: &Value) -> Result<(), CheckFailure> {
        let resp = self.ctx.client.post("", body).await?;
        resp.expect_status(201)?;
        let result = resp.parse_object()?;

        if !is_acknowledged(&result) {
            return Err(CheckFailure::mismatch("insert was not acknowledged"));
        }
        match result.get("insertedId").and_then(json_id) {
            Some(id) if !id.is_empty() => Ok(()),
            _ => Err(CheckFailure::mismatch("insert result has no insertedId")),
        }
    }
}

#[async_trait::async_trait]
impl Check for InsertListing {
    async fn run(&self) -> Result<(), CheckFailure> {
        let listings = self.ctx.listings()?;
        let test_id = format!("test-crud-5-{}", unique_suffix());
        let body = json!({
            "item": {
                "_id": test_id,
                "name": "Test Property for CRUD-5",
                "property_type": "Apartment",
                "bedrooms": 2,
                "beds": 2,
                "bathrooms": 1,
                "amenities": ["WiFi", "Kitchen"],
            }
        });

        let outcome = self.create(&body).await;

        if let Err(e) = listings.delete_one(doc! { "_id": test_id.as_str() }).await {
            warn!(id = %test_id, error = %e, "Failed to clean up inserted listing");
        }
        outcome
    }
}

// ============================================================================
// crud-6: update field
// ============================================================================

const UPDATE_FIELD: &str = "accommodates";

/// `PATCH {id}` with `{key, value}` sets the field in the database
pub struct UpdateField {
    ctx: CheckContext,
}

impl UpdateField {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for UpdateField {
    async fn run(&self) -> Result<(), CheckFailure> {
        let listings = self.ctx.listings()?;
        let (id, id_str) = first_listing(&self.ctx).await?;

        // A listing left at 9 by an earlier attempt would report modifiedCount 0
        let current = listings
            .find_one(doc! { "_id": id.clone() })
            .await?
            .and_then(|d| d.get(UPDATE_FIELD).and_then(bson_number));
        let value: i32 = if current == Some(9.0) { 10 } else { 9 };

        let body = json!({ "key": UPDATE_FIELD, "value": value });
        let resp = self.ctx.client.patch(&encode_id(&id_str), &body).await?;
        resp.expect_status(201)?;
        let result = resp.parse_object()?;
        expect_update_result(&result, "update")?;

        let updated = listings
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| CheckFailure::mismatch("updated listing no longer exists"))?;
        let stored = updated.get(UPDATE_FIELD).and_then(bson_number);
        if stored != Some(f64::from(value)) {
            return Err(CheckFailure::mismatch(format!(
                "'{}' should be {} after the update but is {:?}",
                UPDATE_FIELD, value, stored
            )));
        }
        Ok(())
    }
}

// ============================================================================
// crud-7: push review
// ============================================================================

/// `POST {id}/reviews` appends the review to the listing
pub struct AddReview {
    ctx: CheckContext,
}

impl AddReview {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for AddReview {
    async fn run(&self) -> Result<(), CheckFailure> {
        let listings = self.ctx.listings()?;
        let (id, id_str) = first_listing(&self.ctx).await?;
        let reviewer_id = format!("test_reviewer_{}", unique_suffix());

        let body = json!({
            "review": {
                "reviewer_name": "Test Reviewer",
                "date": "2024-01-01",
                "listing_id": id_str,
                "reviewer_id": reviewer_id,
                "comments": "Test review added by the lab validator",
            }
        });
        let resp = self
            .ctx
            .client
            .post(&format!("{}/reviews", encode_id(&id_str)), &body)
            .await?;
        resp.expect_status(201)?;
        let result = resp.parse_object()?;
        expect_update_result(&result, "review insert")?;

        let found = listings
            .find_one(doc! { "_id": id, "reviews.reviewer_id": reviewer_id.as_str() })
            .await?;
        if found.is_none() {
            return Err(CheckFailure::mismatch(
                "review was not added to the listing's reviews array",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// crud-8: delete
// ============================================================================

/// `DELETE {id}` of a seeded listing removes exactly that listing
pub struct DeleteListing {
    ctx: CheckContext,
}

impl DeleteListing {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

fn dummy_listing(id: &str) -> Document {
    doc! {
        "_id": id,
        "name": "Test Listing for CRUD-8",
        "description": "Listing seeded by the lab validator for delete testing",
        "property_type": "Apartment",
        "room_type": "Entire home/apt",
        "accommodates": 2,
        "bedrooms": 1,
        "beds": 1,
        "bathrooms": 1.0,
        "price": 100.0,
        "minimum_nights": 1,
        "maximum_nights": 30,
        "availability_365": 365,
    }
}

impl DeleteListing {
    async fn delete_seeded(
        &self,
        listings: &mongodb::Collection<Document>,
        test_id: &str,
    ) -> Result<(), CheckFailure> {
        let resp = self.ctx.client.delete(&encode_id(test_id)).await?;
        resp.expect_status(202)?;
        let result = resp.parse_object()?;

        if !is_acknowledged(&result) {
            return Err(CheckFailure::mismatch("delete was not acknowledged"));
        }
        match count_field(&result, "deletedCount") {
            Some(1) => {}
            Some(n) => {
                return Err(CheckFailure::mismatch(format!(
                    "expected deletedCount 1 but got {}",
                    n
                )))
            }
            None => return Err(CheckFailure::parse("delete result has no deletedCount")),
        }

        if listings.find_one(doc! { "_id": test_id }).await?.is_some() {
            return Err(CheckFailure::mismatch(
                "listing still exists after the delete",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Check for DeleteListing {
    async fn run(&self) -> Result<(), CheckFailure> {
        let listings = self.ctx.listings()?;
        let test_id = format!("test-crud-8-{}", unique_suffix());
        listings.insert_one(dummy_listing(&test_id)).await?;

        let outcome = self.delete_seeded(&listings, &test_id).await;

        // Runs whether or not the service deleted it
        if let Err(e) = listings.delete_one(doc! { "_id": test_id.as_str() }).await {
            warn!(id = %test_id, error = %e, "Failed to clean up seeded listing");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_update_result_requires_modification() {
        let ok = obj(json!({ "acknowledged": true, "matchedCount": 1, "modifiedCount": 1 }));
        assert!(expect_update_result(&ok, "update").is_ok());

        let unmodified = obj(json!({ "acknowledged": true, "matchedCount": 1, "modifiedCount": 0 }));
        assert!(matches!(
            expect_update_result(&unmodified, "update"),
            Err(CheckFailure::Mismatch(_))
        ));

        let unacked = obj(json!({ "matchedCount": 1, "modifiedCount": 1 }));
        assert!(expect_update_result(&unacked, "update").is_err());
    }

    #[test]
    fn test_first_id_comparison() {
        let expected = vec![doc! { "_id": "10006546" }, doc! { "_id": "10009999" }];
        assert!(compare_first_ids(&expected, &[json!({ "_id": "10006546" })]).is_ok());

        let err = compare_first_ids(&expected, &[json!({ "_id": "10009999" })]).unwrap_err();
        assert!(err.reason().contains("10006546"));
    }

    #[test]
    fn test_ids_are_path_encoded() {
        assert_eq!(encode_id("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn test_dummy_listing_uses_given_id() {
        assert_eq!(dummy_listing("test-crud-8-1").get_str("_id").unwrap(), "test-crud-8-1");
    }
}
