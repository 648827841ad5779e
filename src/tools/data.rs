//! Synthetic Data Tools
//!
//! Generates demo users, products and transactions into named in-memory
//! collections, and queries, aggregates and clears them. Every collection is
//! also exposed as a `data://<name>` resource.

use chrono::{Duration, Local, NaiveDateTime};
use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{ToolError, ToolResult};
use crate::core::protocol::{MCPResource, MCPTool, ResourceContents};
use crate::core::registry::{ToolContext, ToolRegistry, context_handler, sync_handler};
use crate::core::server::ResourceProvider;
use crate::core::utils::{
    AppConfig, format_number, optional_count, optional_str, required_str, round_to,
};
use crate::tools::filter::{Record, compare, matches, sort_records};

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Wilson", "Martinez",
];
const CITIES: &[&str] = &[
    "New York", "Los Angeles", "Chicago", "Houston", "Phoenix", "Philadelphia", "San Antonio",
    "San Diego", "Dallas", "Austin",
];
const PRODUCTS: &[&str] = &[
    "Laptop", "Phone", "Tablet", "Monitor", "Keyboard", "Mouse", "Headphones", "Camera", "Printer",
    "Speaker",
];
const DEPARTMENTS: &[&str] = &[
    "Engineering", "Sales", "Marketing", "HR", "Finance", "Operations", "Support", "Research",
    "Legal", "Admin",
];
const PRODUCT_TIERS: &[&str] = &["Pro", "Ultra", "Mini", "Max", "Plus"];
const CATEGORIES: &[&str] = &["Electronics", "Accessories", "Computing", "Audio"];
const EMAIL_DOMAINS: &[&str] = &["email.com", "mail.co", "inbox.net", "post.org"];
const STATUSES: &[&str] = &["completed", "pending", "shipped"];

pub const USER_FIELDS: &[&str] = &["name", "email", "age", "city", "department", "salary"];
const DEFAULT_USER_FIELDS: &[&str] = &["name", "email", "age", "city"];

const DEFAULT_MAX_COUNT: u64 = 10_000;
const DATA_SCHEME: &str = "data://";

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn to_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn generate_email<R: Rng>(rng: &mut R, first: &str, last: &str) -> String {
    format!(
        "{}.{}@{}",
        first.to_lowercase(),
        last.to_lowercase(),
        pick(rng, EMAIL_DOMAINS)
    )
}

/// Users with an `id` plus the requested fields.
pub fn generate_users<R: Rng>(rng: &mut R, count: u64, fields: &[String]) -> Vec<Record> {
    let has = |f: &str| fields.iter().any(|x| x == f);
    (1..=count)
        .map(|id| {
            let first = pick(rng, FIRST_NAMES);
            let last = pick(rng, LAST_NAMES);
            let mut user = Map::new();
            user.insert("id".into(), json!(id));
            if has("name") {
                user.insert("name".into(), json!(format!("{first} {last}")));
            }
            if has("email") {
                user.insert("email".into(), json!(generate_email(rng, first, last)));
            }
            if has("age") {
                user.insert("age".into(), json!(rng.gen_range(22..=65)));
            }
            if has("city") {
                user.insert("city".into(), json!(pick(rng, CITIES)));
            }
            if has("department") {
                user.insert("department".into(), json!(pick(rng, DEPARTMENTS)));
            }
            if has("salary") {
                user.insert("salary".into(), json!(rng.gen_range(40_000..=150_000)));
            }
            user
        })
        .collect()
}

/// Uniform float between the bounds, in either order.
fn uniform<R: Rng>(rng: &mut R, a: f64, b: f64) -> f64 {
    a + (b - a) * rng.r#gen::<f64>()
}

/// Products priced uniformly between `min_price` and `max_price`.
pub fn generate_products<R: Rng>(rng: &mut R, count: u64, min_price: f64, max_price: f64) -> Vec<Record> {
    (1..=count)
        .map(|id| {
            let name = format!("{} {}", pick(rng, PRODUCT_TIERS), pick(rng, PRODUCTS));
            to_record(json!({
                "id": id,
                "name": name,
                "price": round_to(uniform(rng, min_price, max_price), 2),
                "stock": rng.gen_range(0..=100),
                "category": pick(rng, CATEGORIES),
                "rating": round_to(rng.gen_range(3.0..=5.0), 1),
            }))
        })
        .collect()
}

/// Transactions joining random users and products, dated within the
/// `days_back` days before `now`.
pub fn generate_transactions<R: Rng>(
    rng: &mut R,
    count: u64,
    days_back: u64,
    users: &[Record],
    products: &[Record],
    now: NaiveDateTime,
) -> Result<Vec<Record>, ToolError> {
    if count > 0 && (users.is_empty() || products.is_empty()) {
        return Err(ToolError::Failed(
            "Cannot choose from an empty sequence".to_string(),
        ));
    }
    let start = now - Duration::days(days_back as i64);

    let mut transactions = Vec::with_capacity(count as usize);
    for id in 1..=count {
        let user = &users[rng.gen_range(0..users.len())];
        let product = &products[rng.gen_range(0..products.len())];
        let quantity: u32 = rng.gen_range(1..=5);
        let price = product.get("price").and_then(Value::as_f64).unwrap_or(0.0);
        let date = start + Duration::days(rng.gen_range(0..=days_back) as i64);

        transactions.push(to_record(json!({
            "id": id,
            "user_id": user.get("id").cloned().unwrap_or(Value::Null),
            "user_name": user.get("name").cloned().unwrap_or_else(|| json!("Unknown")),
            "product_id": product.get("id").cloned().unwrap_or(Value::Null),
            "product_name": product.get("name").cloned().unwrap_or(Value::Null),
            "quantity": quantity,
            "price": product.get("price").cloned().unwrap_or(Value::Null),
            "total": round_to(price * quantity as f64, 2),
            "date": date.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "status": pick(rng, STATUSES),
        })));
    }
    Ok(transactions)
}

/// Aggregation over a collection. Returns Ok(None) for an invalid
/// operation/field combination, including `group_by` without a group field.
pub fn aggregate(
    records: &[Record],
    operation: &str,
    field: Option<&str>,
    group_field: Option<&str>,
) -> Result<Option<Value>, ToolError> {
    match (operation, field) {
        ("count", _) => Ok(Some(json!(records.len()))),
        ("sum" | "avg" | "min" | "max", Some(field)) => {
            let values: Vec<&Value> = records.iter().filter_map(|r| r.get(field)).collect();
            if values.is_empty() {
                return Ok(Some(json!(0)));
            }
            match operation {
                "min" | "max" => extreme(&values, operation == "max").map(Some),
                _ => {
                    let sum = numeric_sum(&values, field)?;
                    if operation == "sum" {
                        Ok(Some(sum))
                    } else {
                        let total = sum.as_f64().unwrap_or(0.0);
                        Ok(Some(json!(total / values.len() as f64)))
                    }
                }
            }
        }
        ("group_by", _) => {
            let Some(group_field) = group_field else {
                return Ok(None);
            };
            let mut groups: Map<String, Value> = Map::new();
            for record in records {
                let key = match record.get(group_field) {
                    None => "Unknown".to_string(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                let count = groups.get(&key).and_then(Value::as_u64).unwrap_or(0);
                groups.insert(key, json!(count + 1));
            }
            Ok(Some(Value::Object(groups)))
        }
        _ => Ok(None),
    }
}

/// Integer sum when every value is an integer, float sum otherwise.
fn numeric_sum(values: &[&Value], field: &str) -> Result<Value, ToolError> {
    let not_numeric = || ToolError::Failed(format!("field '{field}' is not numeric"));
    if values.iter().all(|v| v.is_i64()) {
        let total = values.iter().filter_map(|v| v.as_i64()).map(i128::from).sum::<i128>();
        return Ok(i64::try_from(total).map_or_else(|_| json!(total as f64), |t| json!(t)));
    }
    let mut total = 0.0;
    for v in values {
        total += v.as_f64().ok_or_else(not_numeric)?;
    }
    Ok(json!(total))
}

fn extreme(values: &[&Value], want_max: bool) -> Result<Value, ToolError> {
    let mut best = values[0];
    for v in &values[1..] {
        let ord = compare(v, best).ok_or_else(|| {
            ToolError::Failed("values are not comparable".to_string())
        })?;
        if (want_max && ord.is_gt()) || (!want_max && ord.is_lt()) {
            best = v;
        }
    }
    Ok(best.clone())
}

fn pretty(value: &impl serde::Serialize) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::Failed(e.to_string()))
}

/// In-memory named collections.
pub struct DataStore {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace a collection. Returns true when the collection is new.
    pub fn insert(&self, name: &str, records: Vec<Record>) -> bool {
        self.collections.lock().insert(name.to_string(), records).is_none()
    }

    pub fn get(&self, name: &str) -> Option<Vec<Record>> {
        self.collections.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.collections.lock().remove(name).is_some()
    }

    fn store(&self, name: &str, records: Vec<Record>, ctx: &ToolContext) {
        let count = records.len();
        if self.insert(name, records) {
            ctx.notifier.resources_changed();
        }
        tracing::debug!(collection = name, count, "collection stored");
    }

    pub fn generate_users(&self, args: &Value, ctx: &ToolContext, max_count: u64) -> ToolResult {
        let count = optional_count(args, "count", 10, max_count)?;
        let fields: Vec<String> = match args.get("include_fields").filter(|v| !v.is_null()) {
            None => DEFAULT_USER_FIELDS.iter().map(|f| f.to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ToolError::invalid("include_fields", "expected a list of strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(ToolError::invalid("include_fields", "expected a list of strings")),
        };

        let users = generate_users(&mut rand::thread_rng(), count, &fields);
        self.store("users", users, ctx);
        Ok(format!("Generated {} users with fields: {}", count, fields.join(", ")))
    }

    pub fn generate_products(&self, args: &Value, ctx: &ToolContext, max_count: u64) -> ToolResult {
        let count = optional_count(args, "count", 10, max_count)?;
        let range = args.get("price_range").filter(|v| !v.is_null());
        if range.is_some_and(|r| !r.is_object()) {
            return Err(ToolError::invalid("price_range", "expected an object with min and max"));
        }
        let bound = |key: &str, default: i64| -> Result<(f64, String), ToolError> {
            match range.and_then(|r| r.get(key)).filter(|v| !v.is_null()) {
                None => Ok((default as f64, default.to_string())),
                Some(Value::Number(n)) => {
                    let value = n.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
                        ToolError::invalid("price_range", "bounds must be finite numbers")
                    })?;
                    Ok((value, format_number(n)))
                }
                Some(_) => Err(ToolError::invalid("price_range", "bounds must be numbers")),
            }
        };
        let (min, min_text) = bound("min", 10)?;
        let (max, max_text) = bound("max", 1000)?;
        if !(max - min).is_finite() {
            return Err(ToolError::invalid("price_range", "range is too wide"));
        }

        let products = generate_products(&mut rand::thread_rng(), count, min, max);
        self.store("products", products, ctx);
        Ok(format!(
            "Generated {count} products with prices ${min_text}-${max_text}"
        ))
    }

    pub fn generate_transactions(&self, args: &Value, ctx: &ToolContext, max_count: u64) -> ToolResult {
        let count = optional_count(args, "count", 20, max_count)?;
        let days_back = optional_count(args, "days_back", 30, 36_500)?;

        let (Some(users), Some(products)) = (self.get("users"), self.get("products")) else {
            return Ok("Please generate users and products first".to_string());
        };

        let now = Local::now().naive_local();
        let transactions =
            generate_transactions(&mut rand::thread_rng(), count, days_back, &users, &products, now)?;
        self.store("transactions", transactions, ctx);
        Ok(format!(
            "Generated {count} transactions over the last {days_back} days"
        ))
    }

    pub fn query(&self, args: &Value) -> ToolResult {
        let collection = required_str(args, "collection")?;
        let Some(mut data) = self.get(collection) else {
            return Ok(format!("Collection '{collection}' not found"));
        };

        match args.get("filter") {
            None | Some(Value::Null) => {}
            Some(Value::Object(filter)) => {
                if !filter.is_empty() {
                    let mut kept = Vec::with_capacity(data.len());
                    for item in data {
                        if matches(&item, filter)? {
                            kept.push(item);
                        }
                    }
                    data = kept;
                }
            }
            Some(_) => return Err(ToolError::invalid("filter", "expected an object")),
        }

        let sort_by = optional_str(args, "sort_by", "")?;
        if !sort_by.is_empty() {
            sort_records(&mut data, sort_by)?;
        }

        let limit = optional_count(args, "limit", 10, u32::MAX as u64)? as usize;
        data.truncate(limit);
        pretty(&data)
    }

    pub fn aggregate(&self, args: &Value) -> ToolResult {
        let collection = required_str(args, "collection")?;
        let operation = required_str(args, "operation")?;
        let field = optional_str(args, "field", "")?;
        let group_field = optional_str(args, "group_field", "")?;

        let Some(data) = self.get(collection) else {
            return Ok(format!("Collection '{collection}' not found"));
        };

        if operation == "group_by" && group_field.is_empty() {
            return Ok("group_field required for group_by".to_string());
        }

        let field = (!field.is_empty()).then_some(field);
        let group_field = (!group_field.is_empty()).then_some(group_field);
        match aggregate(&data, operation, field, group_field)? {
            Some(result) => Ok(format!("{} result: {}", operation, pretty(&result)?)),
            None => Ok("Invalid operation or missing field".to_string()),
        }
    }

    pub fn clear(&self, args: &Value, ctx: &ToolContext) -> ToolResult {
        let collection = required_str(args, "collection")?;
        if self.remove(collection) {
            ctx.notifier.resources_changed();
            Ok(format!("Cleared collection '{collection}'"))
        } else {
            Ok(format!("Collection '{collection}' not found"))
        }
    }
}

impl ResourceProvider for DataStore {
    fn list_resources(&self) -> Vec<MCPResource> {
        self.collections
            .lock()
            .iter()
            .map(|(name, items)| MCPResource {
                uri: format!("{DATA_SCHEME}{name}"),
                name: format!("{name} Collection"),
                description: format!("Collection with {} items", items.len()),
                mime_type: "application/json".to_string(),
            })
            .collect()
    }

    fn read_resource(&self, uri: &str) -> Option<ResourceContents> {
        let name = uri.strip_prefix(DATA_SCHEME)?;
        let contents = match self.get(name) {
            Some(data) => ResourceContents {
                uri: uri.to_string(),
                mime_type: "application/json".to_string(),
                text: serde_json::to_string_pretty(&data).unwrap_or_else(|_| "[]".to_string()),
            },
            None => ResourceContents {
                uri: uri.to_string(),
                mime_type: "text/plain".to_string(),
                text: format!("Collection '{name}' not found"),
            },
        };
        Some(contents)
    }
}

/// Register the data tools. The returned store doubles as the `data://`
/// resource provider.
pub fn register(registry: &ToolRegistry, config: &AppConfig) -> Arc<DataStore> {
    let store = Arc::new(DataStore::new());
    let max_count = |tool: &str| config.tool_u64(tool, "max_count", DEFAULT_MAX_COUNT);

    let s = store.clone();
    let max = max_count("generate_users");
    registry.register(
        MCPTool::new(
            "generate_users",
            "Generate sample user data",
            json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of users to generate",
                        "default": 10
                    },
                    "include_fields": {
                        "type": "array",
                        "items": {"type": "string", "enum": USER_FIELDS},
                        "description": "Fields to include: name, email, age, city, department, salary",
                        "default": DEFAULT_USER_FIELDS
                    }
                },
                "required": []
            }),
        ),
        context_handler(move |args, ctx| s.generate_users(&args, ctx, max)),
    );

    let s = store.clone();
    let max = max_count("generate_products");
    registry.register(
        MCPTool::new(
            "generate_products",
            "Generate sample product data",
            json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of products to generate",
                        "default": 10
                    },
                    "price_range": {
                        "type": "object",
                        "properties": {
                            "min": {"type": "number", "default": 10},
                            "max": {"type": "number", "default": 1000}
                        }
                    }
                },
                "required": []
            }),
        ),
        context_handler(move |args, ctx| s.generate_products(&args, ctx, max)),
    );

    let s = store.clone();
    let max = max_count("generate_transactions");
    registry.register(
        MCPTool::new(
            "generate_transactions",
            "Generate sample transaction data",
            json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "description": "Number of transactions to generate",
                        "default": 20
                    },
                    "days_back": {
                        "type": "integer",
                        "description": "Generate transactions from the last N days",
                        "default": 30
                    }
                },
                "required": []
            }),
        ),
        context_handler(move |args, ctx| s.generate_transactions(&args, ctx, max)),
    );

    let s = store.clone();
    registry.register(
        MCPTool::new(
            "query_data",
            "Query data from a collection",
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Collection name"
                    },
                    "filter": {
                        "type": "object",
                        "description": "Filter criteria (e.g., {\"age\": {\"$gt\": 25}})"
                    },
                    "sort_by": {
                        "type": "string",
                        "description": "Field to sort by"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results to return",
                        "default": 10
                    }
                },
                "required": ["collection"]
            }),
        ),
        sync_handler(move |args| s.query(&args)),
    );

    let s = store.clone();
    registry.register(
        MCPTool::new(
            "aggregate_data",
            "Perform aggregations on data",
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Collection name"
                    },
                    "operation": {
                        "type": "string",
                        "enum": ["count", "sum", "avg", "min", "max", "group_by"],
                        "description": "Aggregation operation"
                    },
                    "field": {
                        "type": "string",
                        "description": "Field to aggregate on"
                    },
                    "group_field": {
                        "type": "string",
                        "description": "Field to group by (for group_by operation)"
                    }
                },
                "required": ["collection", "operation"]
            }),
        ),
        sync_handler(move |args| s.aggregate(&args)),
    );

    let s = store.clone();
    registry.register(
        MCPTool::new(
            "clear_data",
            "Clear a data collection",
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Collection name to clear"
                    }
                },
                "required": ["collection"]
            }),
        ),
        context_handler(move |args, ctx| s.clear(&args, ctx)),
    );

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::{Notifier, RESOURCES_LIST_CHANGED};
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ctx() -> (ToolContext, Notifier) {
        let notifier = Notifier::new();
        (ToolContext::new(notifier.clone(), None), notifier)
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn users_have_requested_fields_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let users = generate_users(&mut rng, 25, &fields(&["name", "email", "age", "salary"]));
        assert_eq!(users.len(), 25);
        for (i, user) in users.iter().enumerate() {
            assert_eq!(user["id"], json!(i + 1));
            let age = user["age"].as_i64().unwrap();
            assert!((22..=65).contains(&age));
            let salary = user["salary"].as_i64().unwrap();
            assert!((40_000..=150_000).contains(&salary));
            assert!(user.get("city").is_none());

            let name = user["name"].as_str().unwrap().to_lowercase().replace(' ', ".");
            assert!(user["email"].as_str().unwrap().starts_with(&format!("{name}@")));
        }
        let keys: Vec<_> = users[0].keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name", "email", "age", "salary"]);
    }

    #[test]
    fn products_respect_price_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let products = generate_products(&mut rng, 50, 100.0, 20.0);
        for p in &products {
            let price = p["price"].as_f64().unwrap();
            assert!((20.0..=100.0).contains(&price));
            let rating = p["rating"].as_f64().unwrap();
            assert!((3.0..=5.0).contains(&rating));
            assert!(CATEGORIES.contains(&p["category"].as_str().unwrap()));
        }
    }

    #[test]
    fn extreme_price_range_is_rejected() {
        let store = DataStore::new();
        let (ctx, _) = ctx();
        let args = json!({"count": 1, "price_range": {"min": -1e308, "max": 1e308}});
        assert_eq!(
            store.generate_products(&args, &ctx, 100),
            Err(ToolError::invalid("price_range", "range is too wide"))
        );
        assert!(store.get("products").is_none());

        let mut rng = StdRng::seed_from_u64(5);
        let products = generate_products(&mut rng, 3, 1e308, 1.7e308);
        for p in &products {
            let price = p["price"].as_f64().unwrap();
            assert!((1e308..=1.7e308).contains(&price));
        }
    }

    #[test]
    fn transactions_reference_existing_records() {
        let mut rng = StdRng::seed_from_u64(3);
        let users = generate_users(&mut rng, 3, &fields(&["name"]));
        let products = generate_products(&mut rng, 3, 10.0, 20.0);
        let txs = generate_transactions(&mut rng, 40, 10, &users, &products, now()).unwrap();
        assert_eq!(txs.len(), 40);
        for tx in &txs {
            let quantity = tx["quantity"].as_f64().unwrap();
            let price = tx["price"].as_f64().unwrap();
            assert!((tx["total"].as_f64().unwrap() - round_to(price * quantity, 2)).abs() < 1e-9);
            let date = NaiveDateTime::parse_from_str(tx["date"].as_str().unwrap(), "%Y-%m-%dT%H:%M:%S%.f")
                .unwrap();
            assert!(date >= now() - Duration::days(10) && date <= now());
            assert!(STATUSES.contains(&tx["status"].as_str().unwrap()));
        }

        assert!(generate_transactions(&mut rng, 1, 10, &[], &products, now()).is_err());
    }

    #[test]
    fn transactions_require_users_and_products() {
        let store = DataStore::new();
        let (ctx, _) = ctx();
        let out = store.generate_transactions(&json!({}), &ctx, 100).unwrap();
        assert_eq!(out, "Please generate users and products first");
    }

    #[test]
    fn generate_and_query_roundtrip() {
        let store = DataStore::new();
        let (ctx, notifier) = ctx();
        let mut rx = notifier.subscribe();

        let out = store
            .generate_users(&json!({"count": 5, "include_fields": ["name", "age"]}), &ctx, 100)
            .unwrap();
        assert_eq!(out, "Generated 5 users with fields: name, age");
        assert_eq!(rx.try_recv().unwrap().method, RESOURCES_LIST_CHANGED);

        let out = store
            .query(&json!({"collection": "users", "sort_by": "age", "limit": 3}))
            .unwrap();
        let rows: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0]["age"].as_i64() <= rows[1]["age"].as_i64());

        let out = store
            .query(&json!({"collection": "users", "filter": {"age": {"$gt": 100}}}))
            .unwrap();
        assert_eq!(out, "[]");

        assert_eq!(
            store.query(&json!({"collection": "nope"})).unwrap(),
            "Collection 'nope' not found"
        );
        assert!(store.generate_users(&json!({"count": 101}), &ctx, 100).is_err());
    }

    #[test]
    fn product_message_echoes_range() {
        let store = DataStore::new();
        let (ctx, _) = ctx();
        let out = store
            .generate_products(&json!({"count": 2, "price_range": {"min": 5, "max": 9.5}}), &ctx, 100)
            .unwrap();
        assert_eq!(out, "Generated 2 products with prices $5-$9.5");
        let out = store.generate_products(&json!({}), &ctx, 100).unwrap();
        assert_eq!(out, "Generated 10 products with prices $10-$1000");
    }

    #[test]
    fn aggregations() {
        let records: Vec<Record> = vec![
            to_record(json!({"city": "Austin", "age": 30, "score": 1.5})),
            to_record(json!({"city": "Dallas", "age": 40})),
            to_record(json!({"city": "Austin", "age": 20})),
            to_record(json!({"age": 10})),
        ];
        assert_eq!(aggregate(&records, "count", None, None).unwrap(), Some(json!(4)));
        assert_eq!(aggregate(&records, "sum", Some("age"), None).unwrap(), Some(json!(100)));
        assert_eq!(aggregate(&records, "avg", Some("age"), None).unwrap(), Some(json!(25.0)));
        assert_eq!(aggregate(&records, "max", Some("age"), None).unwrap(), Some(json!(40)));
        assert_eq!(aggregate(&records, "min", Some("city"), None).unwrap(), Some(json!("Austin")));
        assert_eq!(aggregate(&records, "sum", Some("score"), None).unwrap(), Some(json!(1.5)));
        assert_eq!(aggregate(&records, "sum", Some("missing"), None).unwrap(), Some(json!(0)));
        assert_eq!(aggregate(&records, "sum", None, None).unwrap(), None);
        assert_eq!(aggregate(&records, "group_by", None, None).unwrap(), None);
        assert!(aggregate(&records, "sum", Some("city"), None).is_err());

        let groups = aggregate(&records, "group_by", None, Some("city")).unwrap().unwrap();
        assert_eq!(groups, json!({"Austin": 2, "Dallas": 1, "Unknown": 1}));
        let keys: Vec<_> = groups.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Austin", "Dallas", "Unknown"]);
    }

    #[test]
    fn aggregate_tool_text() {
        let store = DataStore::new();
        store.insert("items", vec![to_record(json!({"n": 2})), to_record(json!({"n": 3}))]);
        assert_eq!(
            store.aggregate(&json!({"collection": "items", "operation": "sum", "field": "n"})).unwrap(),
            "sum result: 5"
        );
        assert_eq!(
            store.aggregate(&json!({"collection": "items", "operation": "group_by"})).unwrap(),
            "group_field required for group_by"
        );
        assert_eq!(
            store.aggregate(&json!({"collection": "items", "operation": "median", "field": "n"})).unwrap(),
            "Invalid operation or missing field"
        );
    }

    #[test]
    fn clear_and_resources() {
        let store = DataStore::new();
        let (ctx, _) = ctx();
        store.insert("users", vec![to_record(json!({"id": 1}))]);

        let resources = store.list_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, "data://users");
        assert_eq!(resources[0].description, "Collection with 1 items");

        let contents = store.read_resource("data://users").unwrap();
        assert_eq!(contents.mime_type, "application/json");
        assert!(store.read_resource("file://users").is_none());
        assert_eq!(
            store.read_resource("data://nope").unwrap().text,
            "Collection 'nope' not found"
        );

        assert_eq!(
            store.clear(&json!({"collection": "users"}), &ctx).unwrap(),
            "Cleared collection 'users'"
        );
        assert_eq!(
            store.clear(&json!({"collection": "users"}), &ctx).unwrap(),
            "Collection 'users' not found"
        );
        assert!(store.list_resources().is_empty());
    }
}
