//! The Claim-Engine collaborator and a signature-based reference engine.

use crate::encoding::AttributeValues;
use crate::error::{ClaimError, Result};
use crate::proof::{
    attribute_message, nonce_message, CandidateClaims, DisclosedAttribute, Identifier, Proof,
    ProofRequest, RequestedClaims, RequestedProof, RevealedAttribute, SubProof,
};
use crate::types::{
    Claim, ClaimDefinition, ClaimInfo, ClaimOffer, ClaimRequest, ClaimRequestMetadata, Schema,
    SignedAttribute,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use medic_core::{keys, signing, Did, LocalKey, VerKey};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Claim issuance and proof cryptography.
#[async_trait]
pub trait ClaimEngine: Send + Sync {
    /// Create (and keep the private half of) a claim definition for `schema`.
    async fn create_definition(
        &self,
        issuer_did: &Did,
        schema: &Schema,
        tag: &str,
    ) -> Result<ClaimDefinition>;

    /// Create the holder secret claims are bound to. Creating an existing name is a no-op.
    async fn create_link_secret(&self, name: &str) -> Result<()>;

    async fn create_offer(&self, definition_id: &str) -> Result<ClaimOffer>;

    async fn create_request(
        &self,
        offer: &ClaimOffer,
        definition: &ClaimDefinition,
        holder_did: &Did,
        secret_ref: &str,
    ) -> Result<(ClaimRequest, ClaimRequestMetadata)>;

    async fn issue(
        &self,
        definition_id: &str,
        offer: &ClaimOffer,
        request: &ClaimRequest,
        values: &AttributeValues,
    ) -> Result<Claim>;

    /// Store an issued claim; returns its referent.
    async fn store(
        &self,
        metadata: &ClaimRequestMetadata,
        claim: &Claim,
        definition: &ClaimDefinition,
    ) -> Result<String>;

    async fn search_for_predicate(&self, request: &ProofRequest) -> Result<CandidateClaims>;

    async fn build_proof(
        &self,
        request: &ProofRequest,
        selected: &RequestedClaims,
        secret_ref: &str,
        schemas: &BTreeMap<String, Schema>,
        definitions: &BTreeMap<String, ClaimDefinition>,
    ) -> Result<Proof>;

    async fn verify_proof(
        &self,
        request: &ProofRequest,
        proof: &Proof,
        schemas: &BTreeMap<String, Schema>,
        definitions: &BTreeMap<String, ClaimDefinition>,
    ) -> Result<bool>;
}

struct StoredClaim {
    info: ClaimInfo,
    claim: Claim,
}

#[derive(Default)]
struct EngineState {
    definition_keys: HashMap<String, LocalKey>,
    definitions: HashMap<String, ClaimDefinition>,
    open_offers: HashMap<String, ClaimOffer>,
    link_secrets: HashMap<String, LocalKey>,
    claims: Vec<StoredClaim>,
}

/// Reference engine built on per-attribute Ed25519 signatures.
///
/// Selective disclosure comes from signing every attribute separately; the
/// proof is not zero-knowledge and reveals the holder's link key.
#[derive(Default)]
pub struct MemoryEngine {
    state: RwLock<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim_count(&self) -> usize {
        self.state.read().claims.len()
    }
}

fn encode_sig(sig: [u8; 64]) -> String {
    STANDARD.encode(sig)
}

fn request_binding(cred_def_id: &str, offer_nonce: &str, prover_did: &Did) -> Result<Vec<u8>> {
    Ok(signing::canonicalize(&json!({
        "cred_def_id": cred_def_id,
        "offer_nonce": offer_nonce,
        "prover_did": prover_did,
    }))?)
}

fn verify_b64(key: &VerKey, message: &[u8], signature: &str) -> bool {
    STANDARD
        .decode(signature)
        .map(|sig| keys::verify(key, message, &sig).is_ok())
        .unwrap_or(false)
}

#[async_trait]
impl ClaimEngine for MemoryEngine {
    async fn create_definition(
        &self,
        issuer_did: &Did,
        schema: &Schema,
        tag: &str,
    ) -> Result<ClaimDefinition> {
        let id = ClaimDefinition::make_id(issuer_did, &schema.id, tag);
        let mut state = self.state.write();
        if let Some(existing) = state.definitions.get(&id) {
            return Ok(existing.clone());
        }

        let key = LocalKey::generate();
        let definition = ClaimDefinition {
            id: id.clone(),
            schema_id: schema.id.clone(),
            issuer_did: issuer_did.clone(),
            tag: tag.to_string(),
            attr_names: schema.attr_names.clone(),
            public_key: key.verkey(),
        };
        state.definition_keys.insert(id.clone(), key);
        state.definitions.insert(id.clone(), definition.clone());
        info!(cred_def_id = %id, "created claim definition");
        Ok(definition)
    }

    async fn create_link_secret(&self, name: &str) -> Result<()> {
        self.state
            .write()
            .link_secrets
            .entry(name.to_string())
            .or_insert_with(LocalKey::generate);
        Ok(())
    }

    async fn create_offer(&self, definition_id: &str) -> Result<ClaimOffer> {
        let mut state = self.state.write();
        let definition = state
            .definitions
            .get(definition_id)
            .ok_or_else(|| ClaimError::UnknownDefinition(definition_id.to_string()))?;

        let offer = ClaimOffer {
            schema_id: definition.schema_id.clone(),
            cred_def_id: definition.id.clone(),
            nonce: rand::random::<u64>().to_string(),
        };
        state.open_offers.insert(offer.nonce.clone(), offer.clone());
        Ok(offer)
    }

    async fn create_request(
        &self,
        offer: &ClaimOffer,
        definition: &ClaimDefinition,
        holder_did: &Did,
        secret_ref: &str,
    ) -> Result<(ClaimRequest, ClaimRequestMetadata)> {
        if offer.cred_def_id != definition.id || offer.schema_id != definition.schema_id {
            return Err(ClaimError::OfferMismatch(format!(
                "offer for {} does not match definition {}",
                offer.cred_def_id, definition.id
            )));
        }

        let state = self.state.read();
        let link = state
            .link_secrets
            .get(secret_ref)
            .ok_or_else(|| ClaimError::UnknownLinkSecret(secret_ref.to_string()))?;

        let binding = request_binding(&definition.id, &offer.nonce, holder_did)?;
        let nonce = rand::random::<u64>().to_string();
        let request = ClaimRequest {
            prover_did: holder_did.clone(),
            cred_def_id: definition.id.clone(),
            offer_nonce: offer.nonce.clone(),
            link_key: link.verkey(),
            binding: encode_sig(link.sign(&binding).to_bytes()),
            nonce: nonce.clone(),
        };
        let metadata = ClaimRequestMetadata {
            link_secret_name: secret_ref.to_string(),
            cred_def_id: definition.id.clone(),
            nonce,
        };
        Ok((request, metadata))
    }

    async fn issue(
        &self,
        definition_id: &str,
        offer: &ClaimOffer,
        request: &ClaimRequest,
        values: &AttributeValues,
    ) -> Result<Claim> {
        let mut state = self.state.write();
        let definition = state
            .definitions
            .get(definition_id)
            .ok_or_else(|| ClaimError::UnknownDefinition(definition_id.to_string()))?;

        if offer.cred_def_id != definition_id || request.cred_def_id != definition_id {
            return Err(ClaimError::OfferMismatch(definition_id.to_string()));
        }
        if request.offer_nonce != offer.nonce || !state.open_offers.contains_key(&offer.nonce) {
            return Err(ClaimError::OfferMismatch(format!(
                "request answers offer {}, not an open offer",
                request.offer_nonce
            )));
        }
        let binding = request_binding(definition_id, &offer.nonce, &request.prover_did)?;
        if !verify_b64(&request.link_key, &binding, &request.binding) {
            return Err(ClaimError::InvalidRequest("link key binding does not verify".into()));
        }

        let mut names: Vec<&String> = values.keys().collect();
        let mut expected: Vec<&String> = definition.attr_names.iter().collect();
        names.sort();
        expected.sort();
        if names != expected {
            return Err(ClaimError::AttributeMismatch(format!(
                "got {names:?}, definition has {expected:?}"
            )));
        }
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_consistent()) {
            return Err(ClaimError::AttributeMismatch(format!("{name} is mis-encoded")));
        }

        let key = state
            .definition_keys
            .get(definition_id)
            .ok_or_else(|| ClaimError::UnknownDefinition(definition_id.to_string()))?;

        let mut signed = BTreeMap::new();
        for (name, value) in values {
            let message = attribute_message(definition_id, &request.link_key, name, &value.encoded)?;
            signed.insert(
                name.clone(),
                SignedAttribute {
                    raw: value.raw.clone(),
                    encoded: value.encoded.clone(),
                    signature: encode_sig(key.sign(&message).to_bytes()),
                },
            );
        }

        let claim = Claim {
            schema_id: offer.schema_id.clone(),
            cred_def_id: definition_id.to_string(),
            link_key: request.link_key,
            values: signed,
        };
        state.open_offers.remove(&offer.nonce);
        info!(cred_def_id = %definition_id, prover = %request.prover_did, "issued claim");
        Ok(claim)
    }

    async fn store(
        &self,
        metadata: &ClaimRequestMetadata,
        claim: &Claim,
        definition: &ClaimDefinition,
    ) -> Result<String> {
        if claim.cred_def_id != definition.id || metadata.cred_def_id != definition.id {
            return Err(ClaimError::OfferMismatch(format!(
                "claim for {} stored under {}",
                claim.cred_def_id, definition.id
            )));
        }

        let mut state = self.state.write();
        let link = state
            .link_secrets
            .get(&metadata.link_secret_name)
            .ok_or_else(|| ClaimError::UnknownLinkSecret(metadata.link_secret_name.clone()))?;
        if link.verkey() != claim.link_key {
            return Err(ClaimError::InvalidRequest(
                "claim is bound to another link secret".into(),
            ));
        }

        for (name, value) in &claim.values {
            let message = attribute_message(&definition.id, &claim.link_key, name, &value.encoded)?;
            if !value.value().is_consistent()
                || !verify_b64(&definition.public_key, &message, &value.signature)
            {
                return Err(ClaimError::InvalidSignature(name.clone()));
            }
        }

        let referent = uuid::Uuid::now_v7().to_string();
        let info = ClaimInfo {
            referent: referent.clone(),
            schema_id: claim.schema_id.clone(),
            cred_def_id: claim.cred_def_id.clone(),
            issuer_did: definition.issuer_did.clone(),
            attrs: claim
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.raw.clone()))
                .collect(),
        };
        state.claims.push(StoredClaim {
            info,
            claim: claim.clone(),
        });
        debug!(referent = %referent, cred_def_id = %claim.cred_def_id, "stored claim");
        Ok(referent)
    }

    async fn search_for_predicate(&self, request: &ProofRequest) -> Result<CandidateClaims> {
        let state = self.state.read();
        let mut candidates = CandidateClaims::default();
        for (referent, info) in &request.requested_attributes {
            let matches = state
                .claims
                .iter()
                .filter(|c| c.info.attrs.contains_key(&info.name))
                .filter(|c| info.allows(&c.info.issuer_did, &c.info.cred_def_id))
                .map(|c| c.info.clone())
                .collect();
            candidates.attrs.insert(referent.clone(), matches);
        }
        Ok(candidates)
    }

    async fn build_proof(
        &self,
        request: &ProofRequest,
        selected: &RequestedClaims,
        secret_ref: &str,
        schemas: &BTreeMap<String, Schema>,
        definitions: &BTreeMap<String, ClaimDefinition>,
    ) -> Result<Proof> {
        let state = self.state.read();
        let link = state
            .link_secrets
            .get(secret_ref)
            .ok_or_else(|| ClaimError::UnknownLinkSecret(secret_ref.to_string()))?;

        let mut identifiers: Vec<Identifier> = Vec::new();
        let mut sub_proofs: Vec<SubProof> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut revealed_attrs = BTreeMap::new();

        for (referent, info) in &request.requested_attributes {
            let chosen = selected
                .requested_attributes
                .get(referent)
                .ok_or_else(|| ClaimError::MissingAttribute(referent.clone()))?;
            let stored = state
                .claims
                .iter()
                .find(|c| c.info.referent == chosen.cred_id)
                .ok_or_else(|| ClaimError::UnknownClaim(chosen.cred_id.clone()))?;
            if stored.claim.link_key != link.verkey() {
                return Err(ClaimError::UnknownLinkSecret(secret_ref.to_string()));
            }
            if !schemas.contains_key(&stored.claim.schema_id)
                || !definitions.contains_key(&stored.claim.cred_def_id)
            {
                return Err(ClaimError::UnknownDefinition(stored.claim.cred_def_id.clone()));
            }
            let value = stored
                .claim
                .values
                .get(&info.name)
                .ok_or_else(|| ClaimError::MissingAttribute(referent.clone()))?;

            let index = match index_of.get(&chosen.cred_id) {
                Some(&i) => i,
                None => {
                    let binding = nonce_message(&request.nonce, &stored.claim.cred_def_id)?;
                    identifiers.push(Identifier {
                        schema_id: stored.claim.schema_id.clone(),
                        cred_def_id: stored.claim.cred_def_id.clone(),
                    });
                    sub_proofs.push(SubProof {
                        link_key: link.verkey(),
                        attributes: BTreeMap::new(),
                        nonce_signature: encode_sig(link.sign(&binding).to_bytes()),
                    });
                    index_of.insert(chosen.cred_id.clone(), sub_proofs.len() - 1);
                    sub_proofs.len() - 1
                }
            };

            if chosen.revealed {
                sub_proofs[index].attributes.insert(
                    info.name.clone(),
                    DisclosedAttribute {
                        encoded: value.encoded.clone(),
                        signature: value.signature.clone(),
                    },
                );
                revealed_attrs.insert(
                    referent.clone(),
                    RevealedAttribute {
                        sub_proof_index: index,
                        raw: value.raw.clone(),
                        encoded: value.encoded.clone(),
                    },
                );
            }
        }

        Ok(Proof {
            requested_proof: RequestedProof { revealed_attrs },
            identifiers,
            proof: sub_proofs,
        })
    }

    async fn verify_proof(
        &self,
        request: &ProofRequest,
        proof: &Proof,
        schemas: &BTreeMap<String, Schema>,
        definitions: &BTreeMap<String, ClaimDefinition>,
    ) -> Result<bool> {
        crate::proof::verify(request, proof, schemas, definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::attribute_values;
    use crate::proof::Restriction;

    struct Fixture {
        issuer: MemoryEngine,
        holder: MemoryEngine,
        issuer_did: Did,
        holder_did: Did,
        schema: Schema,
        definition: ClaimDefinition,
    }

    async fn fixture() -> Fixture {
        let issuer = MemoryEngine::new();
        let holder = MemoryEngine::new();
        let issuer_did = LocalKey::generate().verkey().did();
        let holder_did = LocalKey::generate().verkey().did();
        let schema = Schema::new(
            &issuer_did,
            "medical",
            "1.0",
            ["first_name", "last_name", "degree", "status"],
        );
        let definition = issuer
            .create_definition(&issuer_did, &schema, "TAG1")
            .await
            .unwrap();
        holder.create_link_secret("link").await.unwrap();
        Fixture {
            issuer,
            holder,
            issuer_did,
            holder_did,
            schema,
            definition,
        }
    }

    fn values() -> AttributeValues {
        attribute_values([
            ("first_name", "Alice"),
            ("last_name", "Garcia"),
            ("degree", "MD"),
            ("status", "active"),
        ])
    }

    async fn issue_and_store(f: &Fixture) -> String {
        let offer = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let (request, metadata) = f
            .holder
            .create_request(&offer, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();
        let claim = f
            .issuer
            .issue(&f.definition.id, &offer, &request, &values())
            .await
            .unwrap();
        f.holder.store(&metadata, &claim, &f.definition).await.unwrap()
    }

    fn maps(f: &Fixture) -> (BTreeMap<String, Schema>, BTreeMap<String, ClaimDefinition>) {
        (
            BTreeMap::from([(f.schema.id.clone(), f.schema.clone())]),
            BTreeMap::from([(f.definition.id.clone(), f.definition.clone())]),
        )
    }

    #[tokio::test]
    async fn test_issue_store_prove_verify() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("Consent-Request", "0.1", 87393)
            .with_attributes(["first_name", "degree", "status"], &[f.issuer_did.clone()]);
        let candidates = f.holder.search_for_predicate(&request).await.unwrap();
        let selected = candidates.select_first(&request).unwrap();

        let (schemas, definitions) = maps(&f);
        let proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();

        assert_eq!(proof.identifiers.len(), 1);
        assert_eq!(
            proof.requested_proof.revealed_attrs["attr2_referent"].raw,
            "MD"
        );
        // last_name was not requested
        assert!(!proof.proof[0].attributes.contains_key("last_name"));

        let verifier = MemoryEngine::new();
        assert!(verifier
            .verify_proof(&request, &proof, &schemas, &definitions)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_proof_for_other_nonce_fails() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("r", "0.1", 1).with_attributes(["degree"], &[]);
        let selected = f
            .holder
            .search_for_predicate(&request)
            .await
            .unwrap()
            .select_first(&request)
            .unwrap();
        let (schemas, definitions) = maps(&f);
        let proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();

        let replayed = ProofRequest::new("r", "0.1", 2).with_attributes(["degree"], &[]);
        assert!(!crate::proof::verify(&replayed, &proof, &schemas, &definitions).unwrap());
    }

    #[tokio::test]
    async fn test_tampered_raw_value_fails() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("r", "0.1", 5).with_attributes(["degree"], &[]);
        let selected = f
            .holder
            .search_for_predicate(&request)
            .await
            .unwrap()
            .select_first(&request)
            .unwrap();
        let (schemas, definitions) = maps(&f);
        let mut proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();

        let revealed = proof
            .requested_proof
            .revealed_attrs
            .get_mut("attr1_referent")
            .unwrap();
        revealed.raw = "PhD".into();
        revealed.encoded = crate::encoding::encode("PhD");
        assert!(!crate::proof::verify(&request, &proof, &schemas, &definitions).unwrap());
    }

    #[tokio::test]
    async fn test_search_respects_trust_anchor() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let stranger = LocalKey::generate().verkey().did();
        let request =
            ProofRequest::new("r", "0.1", 1).with_attributes(["first_name"], &[stranger.clone()]);
        let candidates = f.holder.search_for_predicate(&request).await.unwrap();
        assert!(candidates.attrs["attr1_referent"].is_empty());
        assert_eq!(
            candidates.select_first(&request).unwrap_err(),
            "attr1_referent"
        );
        assert!(Restriction::issuer(&stranger).allows(&stranger, "any"));
    }

    #[tokio::test]
    async fn test_issue_rejects_unknown_offer() {
        let f = fixture().await;
        let offer = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let (request, _) = f
            .holder
            .create_request(&offer, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();

        let mut forged = offer.clone();
        forged.nonce = "42".into();
        assert!(matches!(
            f.issuer.issue(&f.definition.id, &forged, &request, &values()).await,
            Err(ClaimError::OfferMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_wrong_attributes() {
        let f = fixture().await;
        let offer = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let (request, _) = f
            .holder
            .create_request(&offer, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();

        let partial = attribute_values([("first_name", "Alice")]);
        assert!(matches!(
            f.issuer.issue(&f.definition.id, &offer, &request, &partial).await,
            Err(ClaimError::AttributeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_store_rejects_forged_attribute() {
        let f = fixture().await;
        let offer = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let (request, metadata) = f
            .holder
            .create_request(&offer, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();
        let mut claim = f
            .issuer
            .issue(&f.definition.id, &offer, &request, &values())
            .await
            .unwrap();

        let degree = claim.values.get_mut("degree").unwrap();
        degree.raw = "PhD".into();
        degree.encoded = crate::encoding::encode("PhD");
        assert!(matches!(
            f.holder.store(&metadata, &claim, &f.definition).await,
            Err(ClaimError::InvalidSignature(_))
        ));
        assert_eq!(f.holder.claim_count(), 0);
    }

    #[tokio::test]
    async fn test_verification_is_deterministic() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("r", "0.1", 9)
            .with_attributes(["first_name", "status"], &[f.issuer_did.clone()]);
        let selected = f
            .holder
            .search_for_predicate(&request)
            .await
            .unwrap()
            .select_first(&request)
            .unwrap();
        let (schemas, definitions) = maps(&f);
        let proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();
        let mut tampered = proof.clone();
        tampered.proof[0].nonce_signature = proof.proof[0].attributes["status"].signature.clone();

        let first = MemoryEngine::new();
        let second = MemoryEngine::new();
        for candidate in [&proof, &tampered] {
            let once = first
                .verify_proof(&request, candidate, &schemas, &definitions)
                .await
                .unwrap();
            let again = first
                .verify_proof(&request, candidate, &schemas, &definitions)
                .await
                .unwrap();
            let elsewhere = second
                .verify_proof(&request, candidate, &schemas, &definitions)
                .await
                .unwrap();
            assert_eq!(once, again);
            assert_eq!(once, elsewhere);
        }
        assert!(crate::proof::verify(&request, &proof, &schemas, &definitions).unwrap());
        assert!(!crate::proof::verify(&request, &tampered, &schemas, &definitions).unwrap());
    }

    #[tokio::test]
    async fn test_oversized_raw_value_fails() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("r", "0.1", 3).with_attributes(["degree"], &[]);
        let selected = f
            .holder
            .search_for_predicate(&request)
            .await
            .unwrap()
            .select_first(&request)
            .unwrap();
        let (schemas, definitions) = maps(&f);
        let mut proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();

        let revealed = proof
            .requested_proof
            .revealed_attrs
            .get_mut("attr1_referent")
            .unwrap();
        revealed.raw = "x".repeat(crate::encoding::MAX_RAW_LEN + 1);
        assert!(!crate::proof::verify(&request, &proof, &schemas, &definitions).unwrap());
    }

    #[tokio::test]
    async fn test_definition_id_must_name_issuer() {
        let f = fixture().await;
        issue_and_store(&f).await;

        let request = ProofRequest::new("r", "0.1", 4)
            .with_attributes(["degree"], &[f.issuer_did.clone()]);
        let selected = f
            .holder
            .search_for_predicate(&request)
            .await
            .unwrap()
            .select_first(&request)
            .unwrap();
        let (schemas, definitions) = maps(&f);
        let proof = f
            .holder
            .build_proof(&request, &selected, "link", &schemas, &definitions)
            .await
            .unwrap();

        // Same key and id, but the record claims another issuer
        let mut relabelled = definitions.clone();
        let definition = relabelled.get_mut(&f.definition.id).unwrap();
        definition.issuer_did = LocalKey::generate().verkey().did();
        assert!(!crate::proof::verify(&request, &proof, &schemas, &relabelled).unwrap());
    }

    #[tokio::test]
    async fn test_failed_issue_leaves_other_offers_open() {
        let f = fixture().await;
        let first = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let second = f.issuer.create_offer(&f.definition.id).await.unwrap();
        let (first_request, _) = f
            .holder
            .create_request(&first, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();
        let (second_request, metadata) = f
            .holder
            .create_request(&second, &f.definition, &f.holder_did, "link")
            .await
            .unwrap();

        let partial = attribute_values([("degree", "MD")]);
        assert!(f
            .issuer
            .issue(&f.definition.id, &first, &first_request, &partial)
            .await
            .is_err());

        let claim = f
            .issuer
            .issue(&f.definition.id, &second, &second_request, &values())
            .await
            .unwrap();
        f.holder.store(&metadata, &claim, &f.definition).await.unwrap();
        assert_eq!(f.holder.claim_count(), 1);

        // The failed offer is still open for a corrected attempt
        assert!(f
            .issuer
            .issue(&f.definition.id, &first, &first_request, &values())
            .await
            .is_ok());
    }
}
