//! Destroy and replace of resources: stateful stores, KMS keys and the
//! catch-all for everything else.

use crate::error::RuleFault;
use crate::explain::render_deltas;
use crate::model::{ActionKind, ResourceChange};
use crate::rules::network::is_network_infra;
use crate::rules::{replacement_cause, Rule, RuleContext};
use crate::types::Signal;

const DESTRUCTIVE: &[ActionKind] = &[ActionKind::Delete, ActionKind::Replace];

/// Types whose destruction loses stored data.
const STATEFUL_TYPES: &[&str] = &[
  "aws_db_instance",
  "aws_rds_cluster",
  "aws_dynamodb_table",
  "aws_s3_bucket",
  "aws_ebs_volume",
  "aws_efs_file_system",
  "aws_elasticache_cluster",
  "aws_elasticache_replication_group",
  "aws_redshift_cluster",
  "aws_docdb_cluster",
  "aws_neptune_cluster",
  "aws_opensearch_domain",
  "aws_elasticsearch_domain",
  "aws_kinesis_stream",
  "aws_sqs_queue",
  "google_sql_database_instance",
  "google_storage_bucket",
  "google_compute_disk",
  "google_bigquery_dataset",
  "azurerm_storage_account",
  "azurerm_mssql_database",
  "azurerm_postgresql_flexible_server",
  "azurerm_cosmosdb_account",
];

/// Name segments of storage and database families not listed above.
const STATEFUL_TOKENS: &[&str] = &[
  "database", "db", "sql", "mssql", "mysql", "postgresql", "mariadb", "rds", "memorydb",
  "dynamodb", "docdb", "cosmosdb", "redshift", "bigtable", "spanner", "firestore", "elasticache",
  "redis", "cache", "bucket", "volume", "disk", "table", "storage", "efs", "fsx",
];

/// Segments that mark a satellite of a store (its policy, subnet group, ...)
/// rather than the store itself.
const SATELLITE_TOKENS: &[&str] = &[
  "acl", "alias", "association", "attachment", "configuration", "cors", "endpoint",
  "firewall", "grant", "lifecycle", "logging", "notification", "option", "ownership",
  "parameter", "permission", "policy", "proxy", "public", "role", "route", "rule", "subnet",
  "subscription", "user", "versioning",
];

const KMS_TYPES: &[&str] = &["aws_kms_key", "aws_kms_alias"];

pub(crate) fn is_stateful(resource_type: &str) -> bool {
  if STATEFUL_TYPES.contains(&resource_type) {
    return true;
  }
  if is_network_infra(resource_type) || is_kms(resource_type) {
    return false;
  }
  let tokens: Vec<&str> = resource_type.split(['_', '-']).collect();
  tokens.iter().any(|t| STATEFUL_TOKENS.contains(t)) && !tokens.iter().any(|t| SATELLITE_TOKENS.contains(t))
}

pub(crate) fn is_kms(resource_type: &str) -> bool {
  KMS_TYPES.contains(&resource_type)
}

pub struct StatefulDestroy;

impl Rule for StatefulDestroy {
  fn id(&self) -> &'static str {
    "stateful-destroy"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    DESTRUCTIVE
  }

  fn default_weight(&self) -> u32 {
    60
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if !is_stateful(&change.resource_type) {
      return Ok(Vec::new());
    }
    let reason = format!(
      "{} will be {}{}: {} holds persistent state, so this means irreversible data loss unless it is backed up",
      change.address,
      change.action.participle(),
      replacement_cause(change),
      change.resource_type
    );
    let signal = ctx
      .signal(change, reason)
      .with_tags(&["data", "downtime"])
      .with_recommendations(&[
        "Take a snapshot or backup before applying",
        "Confirm rollback plan; expect downtime",
        "Verify data migration strategy",
      ])
      .with_details(render_deltas(change, ctx.config.max_diffs));
    Ok(vec![signal])
  }
}

pub struct KmsDestroy;

impl Rule for KmsDestroy {
  fn id(&self) -> &'static str {
    "kms-destroy"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    DESTRUCTIVE
  }

  fn default_weight(&self) -> u32 {
    60
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    if !is_kms(&change.resource_type) {
      return Ok(Vec::new());
    }
    let reason = format!(
      "KMS resource {} will be {}{}; data encrypted under it may become unreadable",
      change.address,
      change.action.participle(),
      replacement_cause(change)
    );
    let signal = ctx
      .signal(change, reason)
      .with_tags(&["security", "ops"])
      .with_recommendations(&[
        "Verify no data is encrypted with this key before destroying",
        "Consider scheduling key deletion with a waiting period",
        "Ensure key aliases are updated if the key is being replaced",
      ])
      .with_details(render_deltas(change, ctx.config.max_diffs));
    Ok(vec![signal])
  }
}

/// Destroy/replace of any type no dedicated destroy rule covers.
pub struct GenericDestroy;

impl Rule for GenericDestroy {
  fn id(&self) -> &'static str {
    "generic-destroy"
  }

  fn applies_to(&self) -> &'static [ActionKind] {
    DESTRUCTIVE
  }

  fn default_weight(&self) -> u32 {
    30
  }

  fn evaluate(&self, change: &ResourceChange, ctx: &RuleContext<'_>) -> Result<Vec<Signal>, RuleFault> {
    let t = change.resource_type.as_str();
    if is_stateful(t) || is_kms(t) || is_network_infra(t) {
      return Ok(Vec::new());
    }
    let signal = if change.action == ActionKind::Replace {
      ctx
        .signal(
          change,
          format!("{} will be destroyed and recreated{}", change.address, replacement_cause(change)),
        )
        .with_tags(&["downtime"])
        .with_recommendations(&[
          "Confirm rollback plan; expect downtime",
          "Verify no dependent resources will break",
        ])
    } else {
      ctx
        .signal(change, format!("{} will be destroyed", change.address))
        .with_tags(&["ops"])
        .with_recommendations(&[
          "Confirm the resource is safe to destroy",
          "Check for dependent resources or data loss",
        ])
    };
    Ok(vec![signal.with_details(render_deltas(change, ctx.config.max_diffs))])
  }
}
