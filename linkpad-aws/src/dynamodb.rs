/// DynamoDB metadata backend
///
/// One item per record, keyed by `code`. Item attributes:
///
/// | attribute | type | contents |
/// |-----------|------|----------|
/// | `code`    | S    | short code (partition key) |
/// | `typ`     | S    | `R`, `D` or `S` |
/// | `val`     | S    | URL or inline payload; empty for blob records |
/// | `ettl`    | N    | expiry in Unix seconds, omitted when unset (table TTL attribute) |
/// | `created` | N    | creation time in Unix seconds |
/// | `ip`      | S    | creator address |
/// | `owner`   | S    | owner token |

use crate::error::classify;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use linkpad_core::{BackendError, BackendResult, MetadataBackend, OwnerToken, Record, RecordKind};
use std::collections::HashMap;
use tracing::{debug, warn};

pub type Item = HashMap<String, AttributeValue>;

pub struct DynamoMetadataBackend {
    client: Client,
    table: String,
}

impl DynamoMetadataBackend {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl MetadataBackend for DynamoMetadataBackend {
    async fn put_if_absent(&self, record: &Record) -> BackendResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(record)))
            .condition_expression("attribute_not_exists(code)")
            .send()
            .await
            .map_err(|e| classify(&e))?;

        debug!("Put item for code {} into {}", record.code, self.table);
        Ok(())
    }

    async fn get(&self, code: &str) -> BackendResult<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("code", AttributeValue::S(code.to_string()))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        match output.item() {
            Some(item) => from_item(item).map(Some).map_err(|e| {
                warn!("Malformed item for code {}: {}", code, e);
                e
            }),
            None => Ok(None),
        }
    }

    async fn delete_if_owner(&self, code: &str, owner: &OwnerToken) -> BackendResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("code", AttributeValue::S(code.to_string()))
            .condition_expression("#owner = :owner")
            .expression_attribute_names("#owner", "owner")
            .expression_attribute_values(":owner", AttributeValue::S(owner.as_str().to_string()))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        debug!("Deleted item for code {} from {}", code, self.table);
        Ok(())
    }
}

/// Encodes a record as a table item.
pub fn to_item(record: &Record) -> Item {
    let mut item = HashMap::new();
    item.insert("code".to_string(), AttributeValue::S(record.code.clone()));
    item.insert("typ".to_string(), AttributeValue::S(record.kind.as_tag().to_string()));
    item.insert("val".to_string(), AttributeValue::S(record.value.clone()));
    if let Some(at) = record.expires_at {
        item.insert("ettl".to_string(), AttributeValue::N(at.to_string()));
    }
    item.insert("created".to_string(), AttributeValue::N(record.created_at.to_string()));
    item.insert("ip".to_string(), AttributeValue::S(record.creator_ip.clone()));
    item.insert("owner".to_string(), AttributeValue::S(record.owner.as_str().to_string()));
    item
}

/// Decodes a table item.
///
/// `code` and `typ` are required. Items written before ownership or
/// creator tracking existed decode with empty values for those fields.
pub fn from_item(item: &Item) -> BackendResult<Record> {
    let code = string_attr(item, "code")?
        .ok_or_else(|| malformed("missing code"))?;
    let tag = string_attr(item, "typ")?
        .ok_or_else(|| malformed("missing typ"))?;
    let kind = RecordKind::from_tag(&tag)
        .ok_or_else(|| malformed(&format!("unknown typ {:?}", tag)))?;

    let expires_at = number_attr(item, "ettl")?.and_then(Record::normalize_expiry);

    Ok(Record {
        code,
        kind,
        value: string_attr(item, "val")?.unwrap_or_default(),
        expires_at,
        created_at: number_attr(item, "created")?.unwrap_or(0),
        creator_ip: string_attr(item, "ip")?.unwrap_or_default(),
        owner: OwnerToken::new(string_attr(item, "owner")?.unwrap_or_default()),
    })
}

fn string_attr(item: &Item, name: &str) -> BackendResult<Option<String>> {
    match item.get(name) {
        None => Ok(None),
        Some(AttributeValue::S(s)) => Ok(Some(s.clone())),
        Some(other) => Err(malformed(&format!("{} is not a string: {:?}", name, other))),
    }
}

fn number_attr(item: &Item, name: &str) -> BackendResult<Option<i64>> {
    match item.get(name) {
        None => Ok(None),
        Some(AttributeValue::N(n)) => n
            .parse::<i64>()
            .map(Some)
            .map_err(|_| malformed(&format!("{} is not an integer: {}", name, n))),
        Some(other) => Err(malformed(&format!("{} is not a number: {:?}", name, other))),
    }
}

fn malformed(detail: &str) -> BackendError {
    BackendError::Other(format!("malformed item: {}", detail))
}
