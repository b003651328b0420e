//! Index configuration checks
//!
//! These inspect the principal's collection directly; no HTTP call is made.

use bson::{Bson, Document};
use futures::TryStreamExt;

use super::compare::field_type_includes;
use super::{Check, CheckContext, CheckFailure};

pub const COMPOUND_INDEX_NAME: &str = "beds_1_price_1";
pub const SEARCH_INDEX_NAMES: [&str; 2] = ["search_index", "default"];
pub const VECTOR_INDEX_NAME: &str = "vector_index";

/// Search index definitions on the listings collection
async fn search_indexes(ctx: &CheckContext) -> Result<Vec<Document>, CheckFailure> {
    let indexes: Vec<Document> = ctx
        .listings()?
        .list_search_indexes()
        .await?
        .try_collect()
        .await?;
    Ok(indexes)
}

fn find_index<'a>(indexes: &'a [Document], names: &[&str]) -> Option<&'a Document> {
    indexes
        .iter()
        .find(|idx| idx.get_str("name").map(|n| names.contains(&n)).unwrap_or(false))
}

fn latest_definition(index: &Document) -> Result<&Document, CheckFailure> {
    index
        .get_document("latestDefinition")
        .map_err(|_| CheckFailure::config("index has no latestDefinition"))
}

/// Mapping object for `ty`, whether the field is mapped once or as a list
fn mapping_of_type<'a>(mapping: &'a Bson, ty: &str) -> Option<&'a Document> {
    match mapping {
        Bson::Document(doc) if doc.get_str("type").ok() == Some(ty) => Some(doc),
        Bson::Array(items) => items.iter().find_map(|item| mapping_of_type(item, ty)),
        _ => None,
    }
}

/// Validate `latestDefinition.mappings.fields` of the text search index
pub fn validate_search_definition(definition: &Document) -> Result<(), CheckFailure> {
    let mappings = definition
        .get_document("mappings")
        .map_err(|_| CheckFailure::config("search index has no mappings"))?;

    let fields = match mappings.get("fields") {
        Some(Bson::Document(doc)) => doc,
        Some(Bson::Array(items)) => match items.first() {
            Some(Bson::Document(doc)) => doc,
            Some(_) => {
                return Err(CheckFailure::config(
                    "first entry of mappings.fields is not a document",
                ))
            }
            None => return Err(CheckFailure::config("mappings.fields is empty")),
        },
        Some(_) => return Err(CheckFailure::config("mappings.fields has an unexpected type")),
        None => return Err(CheckFailure::config("search index has no field mappings")),
    };

    let field = |name: &str| {
        fields.get(name).ok_or_else(|| {
            CheckFailure::config(format!("'{}' is not mapped in the search index", name))
        })
    };

    if !field_type_includes(field("amenities")?, "token") {
        return Err(CheckFailure::config("'amenities' must be mapped with type token"));
    }
    if !field_type_includes(field("beds")?, "number") {
        return Err(CheckFailure::config("'beds' must be mapped with type number"));
    }
    if !field_type_includes(field("property_type")?, "token") {
        return Err(CheckFailure::config(
            "'property_type' must be mapped with type token",
        ));
    }

    let name = mapping_of_type(field("name")?, "autocomplete").ok_or_else(|| {
        CheckFailure::config("'name' must be mapped with type autocomplete")
    })?;
    if name.get_str("analyzer").ok() != Some("lucene.english") {
        return Err(CheckFailure::config(
            "'name' autocomplete mapping must use the lucene.english analyzer",
        ));
    }
    Ok(())
}

/// Validate `latestDefinition.fields` of the vector search index
pub fn validate_vector_definition(definition: &Document) -> Result<(), CheckFailure> {
    let fields: Vec<&Document> = match definition.get_array("fields") {
        Ok(items) => items.iter().filter_map(Bson::as_document).collect(),
        Err(_) => Vec::new(),
    };
    if fields.len() != 2 {
        return Err(CheckFailure::config(
            "vector_index must define exactly two fields (description and property_type)",
        ));
    }

    let expect = |path: &str, ty: &str| -> Result<(), CheckFailure> {
        let field = fields
            .iter()
            .find(|f| f.get_str("path").ok() == Some(path))
            .ok_or_else(|| {
                CheckFailure::config(format!("vector_index has no field with path '{}'", path))
            })?;
        if field.get_str("type").ok() != Some(ty) {
            return Err(CheckFailure::config(format!(
                "vector_index field '{}' must have type {}",
                path, ty
            )));
        }
        Ok(())
    };

    expect("description", "text")?;
    expect("property_type", "filter")
}

// ============================================================================
// index
// ============================================================================

/// Compound index on `beds` and `price` exists
pub struct CompoundIndex {
    ctx: CheckContext,
}

impl CompoundIndex {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for CompoundIndex {
    async fn run(&self) -> Result<(), CheckFailure> {
        let names = self.ctx.listings()?.list_index_names().await?;
        if names.iter().any(|n| n == COMPOUND_INDEX_NAME) {
            Ok(())
        } else {
            Err(CheckFailure::config(format!(
                "index '{}' not found on listingsAndReviews",
                COMPOUND_INDEX_NAME
            )))
        }
    }
}

// ============================================================================
// search-index
// ============================================================================

/// Atlas Search index with the expected field mappings
pub struct SearchIndex {
    ctx: CheckContext,
}

impl SearchIndex {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for SearchIndex {
    async fn run(&self) -> Result<(), CheckFailure> {
        let indexes = search_indexes(&self.ctx).await?;
        let index = find_index(&indexes, &SEARCH_INDEX_NAMES).ok_or_else(|| {
            CheckFailure::config("search index 'search_index' or 'default' not found")
        })?;
        validate_search_definition(latest_definition(index)?)
    }
}

// ============================================================================
// vector-search-index
// ============================================================================

/// Vector search index over `description` filtered by `property_type`
pub struct VectorSearchIndex {
    ctx: CheckContext,
}

impl VectorSearchIndex {
    pub fn new(ctx: &CheckContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait::async_trait]
impl Check for VectorSearchIndex {
    async fn run(&self) -> Result<(), CheckFailure> {
        let indexes = search_indexes(&self.ctx).await?;
        let index = find_index(&indexes, &[VECTOR_INDEX_NAME])
            .ok_or_else(|| CheckFailure::config("search index 'vector_index' not found"))?;
        validate_vector_definition(latest_definition(index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn search_definition(fields: Bson) -> Document {
        doc! { "mappings": { "dynamic": false, "fields": fields } }
    }

    fn good_fields() -> Document {
        doc! {
            "amenities": [{ "type": "stringFacet" }, { "type": "token" }],
            "beds": { "type": "number" },
            "name": { "type": "autocomplete", "analyzer": "lucene.english" },
            "property_type": { "type": "token" },
        }
    }

    #[test]
    fn test_search_definition_accepts_expected_mappings() {
        let def = search_definition(Bson::Document(good_fields()));
        assert!(validate_search_definition(&def).is_ok());

        let as_list = search_definition(Bson::Array(vec![Bson::Document(good_fields())]));
        assert!(validate_search_definition(&as_list).is_ok());
    }

    #[test]
    fn test_search_definition_rejects_wrong_analyzer() {
        let mut fields = good_fields();
        fields.insert("name", doc! { "type": "autocomplete", "analyzer": "lucene.standard" });
        let err = validate_search_definition(&search_definition(Bson::Document(fields)))
            .unwrap_err();
        assert!(err.reason().contains("lucene.english"));
    }

    #[test]
    fn test_search_definition_requires_beds() {
        let mut fields = good_fields();
        fields.remove("beds");
        assert!(matches!(
            validate_search_definition(&search_definition(Bson::Document(fields))),
            Err(CheckFailure::Config(_))
        ));
    }

    #[test]
    fn test_vector_definition() {
        let good = doc! { "fields": [
            { "type": "text", "path": "description", "model": "voyage-3-large" },
            { "type": "filter", "path": "property_type" },
        ] };
        assert!(validate_vector_definition(&good).is_ok());

        let wrong_type = doc! { "fields": [
            { "type": "vector", "path": "description" },
            { "type": "filter", "path": "property_type" },
        ] };
        assert!(validate_vector_definition(&wrong_type).is_err());

        let missing = doc! { "fields": [{ "type": "text", "path": "description" }] };
        assert!(validate_vector_definition(&missing).is_err());
    }

    #[test]
    fn test_find_index_by_name() {
        let indexes = vec![doc! { "name": "vector_index" }, doc! { "name": "default" }];
        assert!(find_index(&indexes, &SEARCH_INDEX_NAMES).is_some());
        assert!(find_index(&indexes[..1], &SEARCH_INDEX_NAMES).is_none());
    }
}
