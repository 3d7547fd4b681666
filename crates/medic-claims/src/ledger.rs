//! The Ledger collaborator: public identifiers, schemas and claim definitions.

use crate::types::{ClaimDefinition, Schema};
use async_trait::async_trait;
use medic_core::{keys, signing, Did, VerKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found on ledger: {0}")]
    NotFound(String),

    #[error("Conflicting record already published: {0}")]
    Conflict(String),

    #[error("Write not authorized: {0}")]
    Unauthorized(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A public identifier record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NymRecord {
    pub did: Did,
    pub verkey: VerKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn publish_identifier(&self, record: &NymRecord) -> Result<()>;
    async fn get_identifier(&self, did: &Did) -> Result<NymRecord>;
    async fn publish_schema(&self, schema: &Schema) -> Result<()>;
    async fn get_schema(&self, id: &str) -> Result<Schema>;
    /// Publish `definition`, authorized by `signature` over [`definition_digest`]
    /// made with the key of the issuer's published identifier.
    async fn publish_definition(
        &self,
        definition: &ClaimDefinition,
        signature: &[u8],
    ) -> Result<()>;
    async fn get_definition(&self, id: &str) -> Result<ClaimDefinition>;
}

/// Bytes an issuer signs to publish a claim definition.
pub fn definition_digest(definition: &ClaimDefinition) -> medic_core::Result<[u8; 32]> {
    signing::hash(definition)
}

#[derive(Default)]
struct Records {
    nyms: HashMap<Did, NymRecord>,
    schemas: HashMap<String, Schema>,
    definitions: HashMap<String, ClaimDefinition>,
}

/// A ledger kept in process memory, shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<RwLock<Records>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_count(&self) -> usize {
        self.records.read().schemas.len()
    }
}

/// Insert `value`, accepting an identical republish.
fn publish<K, V>(map: &mut HashMap<K, V>, key: K, value: &V) -> Result<()>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
    V: Clone + PartialEq,
{
    match map.get(&key) {
        Some(existing) if existing == value => Ok(()),
        Some(_) => Err(LedgerError::Conflict(key.to_string())),
        None => {
            map.insert(key, value.clone());
            Ok(())
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn publish_identifier(&self, record: &NymRecord) -> Result<()> {
        if !record.did.matches(&record.verkey) {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not derived from {}",
                record.did, record.verkey
            )));
        }
        let mut records = self.records.write();
        publish(&mut records.nyms, record.did.clone(), record)
    }

    async fn get_identifier(&self, did: &Did) -> Result<NymRecord> {
        self.records
            .read()
            .nyms
            .get(did)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(did.to_string()))
    }

    async fn publish_schema(&self, schema: &Schema) -> Result<()> {
        let mut records = self.records.write();
        publish(&mut records.schemas, schema.id.clone(), schema)
    }

    async fn get_schema(&self, id: &str) -> Result<Schema> {
        self.records
            .read()
            .schemas
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn publish_definition(
        &self,
        definition: &ClaimDefinition,
        signature: &[u8],
    ) -> Result<()> {
        let expected_id =
            ClaimDefinition::make_id(&definition.issuer_did, &definition.schema_id, &definition.tag);
        if definition.id != expected_id {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not named after its issuer",
                definition.id
            )));
        }
        let digest =
            definition_digest(definition).map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let mut records = self.records.write();
        let nym = records.nyms.get(&definition.issuer_did).ok_or_else(|| {
            LedgerError::Unauthorized(format!("{} has no public identifier", definition.issuer_did))
        })?;
        if keys::verify(&nym.verkey, &digest, signature).is_err() {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not signed by {}",
                definition.id, definition.issuer_did
            )));
        }
        publish(&mut records.definitions, definition.id.clone(), definition)
    }

    async fn get_definition(&self, id: &str) -> Result<ClaimDefinition> {
        self.records
            .read()
            .definitions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medic_core::LocalKey;

    fn steward() -> Did {
        LocalKey::generate().verkey().did()
    }

    #[tokio::test]
    async fn test_publish_and_get_schema() {
        let ledger = MemoryLedger::new();
        let schema = Schema::new(&steward(), "medical", "1.0", ["first_name", "degree"]);

        ledger.publish_schema(&schema).await.unwrap();
        assert_eq!(ledger.get_schema(&schema.id).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_republish_identical_is_ok() {
        let ledger = MemoryLedger::new();
        let schema = Schema::new(&steward(), "consent", "1.0", ["first_name"]);

        ledger.publish_schema(&schema).await.unwrap();
        ledger.publish_schema(&schema).await.unwrap();
        assert_eq!(ledger.schema_count(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_publish_rejected() {
        let ledger = MemoryLedger::new();
        let issuer = steward();
        let schema = Schema::new(&issuer, "consent", "1.0", ["first_name"]);
        let changed = Schema::new(&issuer, "consent", "1.0", ["last_name"]);

        ledger.publish_schema(&schema).await.unwrap();
        assert!(matches!(
            ledger.publish_schema(&changed).await,
            Err(LedgerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_not_found() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.get_definition("missing").await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.get_identifier(&steward()).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    fn nym(key: &LocalKey) -> NymRecord {
        NymRecord {
            did: key.verkey().did(),
            verkey: key.verkey(),
            role: Some("TRUST_ANCHOR".into()),
        }
    }

    fn definition(issuer: &Did, public_key: VerKey) -> ClaimDefinition {
        let schema = Schema::new(issuer, "medical", "1.0", ["degree"]);
        ClaimDefinition {
            id: ClaimDefinition::make_id(issuer, &schema.id, "TAG1"),
            schema_id: schema.id,
            issuer_did: issuer.clone(),
            tag: "TAG1".into(),
            attr_names: vec!["degree".into()],
            public_key,
        }
    }

    fn sign(key: &LocalKey, definition: &ClaimDefinition) -> Vec<u8> {
        key.sign(&definition_digest(definition).unwrap()).to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_definition_signed_by_issuer_is_published() {
        let ledger = MemoryLedger::new();
        let steward = LocalKey::generate();
        ledger.publish_identifier(&nym(&steward)).await.unwrap();

        let def = definition(&steward.verkey().did(), LocalKey::generate().verkey());
        ledger.publish_definition(&def, &sign(&steward, &def)).await.unwrap();
        assert_eq!(ledger.get_definition(&def.id).await.unwrap(), def);
    }

    #[tokio::test]
    async fn test_definition_naming_another_issuer_rejected() {
        let ledger = MemoryLedger::new();
        let steward = LocalKey::generate();
        let mallory = LocalKey::generate();
        ledger.publish_identifier(&nym(&steward)).await.unwrap();
        ledger.publish_identifier(&nym(&mallory)).await.unwrap();

        let forged = definition(&steward.verkey().did(), mallory.verkey());
        assert!(matches!(
            ledger.publish_definition(&forged, &sign(&mallory, &forged)).await,
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            ledger.get_definition(&forged.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_definition_needs_public_issuer() {
        let ledger = MemoryLedger::new();
        let issuer = LocalKey::generate();
        let def = definition(&issuer.verkey().did(), issuer.verkey());
        assert!(matches!(
            ledger.publish_definition(&def, &sign(&issuer, &def)).await,
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_definition_id_must_name_issuer() {
        let ledger = MemoryLedger::new();
        let steward = LocalKey::generate();
        ledger.publish_identifier(&nym(&steward)).await.unwrap();

        let mut def = definition(&steward.verkey().did(), steward.verkey());
        def.id = "did:medic:elsewhere:3:CL:medical:TAG1".into();
        assert!(matches!(
            ledger.publish_definition(&def, &sign(&steward, &def)).await,
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_nym_must_derive_from_key() {
        let ledger = MemoryLedger::new();
        let record = NymRecord {
            did: LocalKey::generate().verkey().did(),
            verkey: LocalKey::generate().verkey(),
            role: None,
        };
        assert!(matches!(
            ledger.publish_identifier(&record).await,
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_nym_shared_between_clones() {
        let ledger = MemoryLedger::new();
        let view = ledger.clone();
        let key = LocalKey::generate().verkey();
        let record = NymRecord {
            did: key.did(),
            verkey: key,
            role: Some("TRUST_ANCHOR".into()),
        };

        ledger.publish_identifier(&record).await.unwrap();
        assert_eq!(view.get_identifier(&key.did()).await.unwrap(), record);
    }
}
