//! DCmis Core Library
//!
//! Content repository engine with:
//! - Type registry (base types, subtypes, property definitions)
//! - Object services (documents, folders, relationships, policies)
//! - Versioning (check-out, check-in, version series)
//! - Filing and navigation (multi-filing, trees, paging)
//! - ACLs and policies
//! - Change log with resumable change tokens
//! - Query entry point for an external query engine

pub mod acl;
pub mod changelog;
pub mod config;
pub mod error;
pub mod navigation;
pub mod object;
pub mod paging;
pub mod properties;
pub mod query;
pub mod repository;
pub mod types;
pub mod value;
pub mod versioning;

mod state;

pub use acl::{Ace, Acl, AclPropagation, AclResult, BASIC_PERMISSIONS};
pub use changelog::{ChangeEvent, ChangeLogPage, ChangeType};
pub use config::{AclPropagationSupport, Capabilities, RepositoryConfig};
pub use error::{CmisError, ErrorKind, Result};
pub use object::{
    AllowableAction, ChangeToken, ContentStream, ContentStreamInfo, ObjectEntry, ObjectId,
    VersionInfo, VersionSeriesId, VersioningState,
};
pub use paging::{Inclusion, ListPage, Paging, PropertyFilter, RelationshipDirection, Tree};
pub use properties::{cmis_props, Properties, PropertyUpdate, PropertyUpdates};
pub use query::{QueryExecutor, QueryRequest};
pub use repository::{
    CreateDocument, CreateDocumentFromSource, CreateFolder, CreatePolicy, CreateRelationship,
    DeleteTreeOutcome, ObjectUpdate, RelationshipQuery, Repository, RepositoryInfo, Unfiling,
};
pub use types::{
    BaseType, Cardinality, ContentStreamAllowed, PropertyDefinition, TypeDefinition,
    TypeRegistry, TypeRegistryBuilder, Updatability,
};
pub use value::{PropertyType, PropertyValue, Value};
pub use versioning::{CheckIn, CheckOutResult, PWC_LABEL};
