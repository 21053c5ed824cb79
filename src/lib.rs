// veilsql - transparent column encryption for SQL statements
// Core library

pub mod config;
pub mod interceptor;
pub mod observability;
pub mod policy;
pub mod vault;

pub use veil_core::{
    BoundValue, ClauseKind, EncryptionMode, StatementKind, VeilError, VeilResult,
};
pub use veil_sql::{ConditionClause, ConditionParser, ParsedStatement, SqlDialectKind};

pub use config::{ObservabilityConfig, TypePolicyConfig, VeilConfig};
pub use interceptor::{
    BoundParam, BoundStatement, CallContext, FieldHandler, InterceptOutcome,
    InterceptionPipeline, ParamOrigin, PassthroughReason, StatementExecutor,
};
pub use policy::{
    EncryptedEntity, EncryptionPolicy, FieldDeclaration, PolicyMap, PolicyRegistry,
    PolicySource, StaticPolicySource, TypeDeclarations,
};
pub use vault::{FieldCipher, KeyMaterial, KeySource};
