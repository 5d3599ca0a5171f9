//! Declarative macros for FROST ciphersuite abstraction.
//!
//! `frost_secp256k1` and `frost_ed25519` expose separate, incompatible types
//! with identical APIs. Each macro expands one ceremony for a given crate.

/// Generate an in-process FROST DKG for a specific ciphersuite.
///
/// Runs part1, part2 and part3 for every party `1..=max_signers`, then
/// returns the hex group key and a serialized [`ShareBundle`].
macro_rules! impl_local_keygen {
    ($fn_name:ident, $frost:ident) => {
        fn $fn_name(max_signers: u16, min_signers: u16) -> Result<(String, ShareBundle), EngineError> {
            let identifiers = (1..=max_signers)
                .map(|index| {
                    $frost::Identifier::try_from(index)
                        .map(|id| (index, id))
                        .map_err(|e| EngineError::Protocol(format!("Invalid identifier {index}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut round1_secrets = BTreeMap::new();
            let mut round1_packages = BTreeMap::new();
            for (_, id) in &identifiers {
                let (secret, package) =
                    $frost::keys::dkg::part1(*id, max_signers, min_signers, OsRng)
                        .map_err(|e| EngineError::Protocol(format!("DKG round 1 failed: {e}")))?;
                round1_secrets.insert(*id, secret);
                round1_packages.insert(*id, package);
            }

            // Each party sees every round 1 package but its own. Lend the
            // shared map out with that one entry lifted instead of copying it.
            let mut round2_secrets = BTreeMap::new();
            let mut round2_outgoing = BTreeMap::new();
            for (id, secret) in round1_secrets {
                let own = round1_packages.remove(&id);
                let round2 = $frost::keys::dkg::part2(secret, &round1_packages);
                if let Some(own) = own {
                    round1_packages.insert(id, own);
                }
                let (secret, packages) = round2
                    .map_err(|e| EngineError::Protocol(format!("DKG round 2 failed: {e}")))?;
                round2_secrets.insert(id, secret);
                round2_outgoing.insert(id, packages);
            }

            let mut bundle = ShareBundle {
                min_signers,
                public_key_package: String::new(),
                key_packages: BTreeMap::new(),
            };
            let mut group_key = None;

            for (index, id) in &identifiers {
                let secret = round2_secrets
                    .get(id)
                    .ok_or_else(|| EngineError::Protocol(format!("Missing round 2 secret for {index}")))?;
                // Every round 2 package has exactly one recipient, so move it out.
                let received: BTreeMap<_, _> = round2_outgoing
                    .iter_mut()
                    .filter_map(|(from, packages)| packages.remove(id).map(|p| (*from, p)))
                    .collect();

                let own = round1_packages.remove(id);
                let finalized = $frost::keys::dkg::part3(secret, &round1_packages, &received);
                if let Some(own) = own {
                    round1_packages.insert(*id, own);
                }
                let (key_package, public_key_package) = finalized
                    .map_err(|e| EngineError::Protocol(format!("DKG finalize failed: {e}")))?;

                let key_bytes = Zeroizing::new(key_package.serialize().map_err(|e| {
                    EngineError::Protocol(format!("Failed to serialize key package: {e}"))
                })?);
                bundle.key_packages.insert(*index, BASE64.encode(key_bytes.as_slice()));

                if group_key.is_none() {
                    let pubkey_bytes = public_key_package.serialize().map_err(|e| {
                        EngineError::Protocol(format!("Failed to serialize public key package: {e}"))
                    })?;
                    bundle.public_key_package = BASE64.encode(&pubkey_bytes);

                    let verifying_key = public_key_package.verifying_key().serialize().map_err(|e| {
                        EngineError::Protocol(format!("Failed to serialize group key: {e}"))
                    })?;
                    group_key = Some(hex::encode(verifying_key));
                }
            }

            let group_key =
                group_key.ok_or_else(|| EngineError::Protocol("DKG produced no parties".to_string()))?;
            Ok((group_key, bundle))
        }
    };
}

/// Generate in-process FROST signing for a specific ciphersuite.
///
/// Every listed party commits, signs, and the shares are aggregated. The
/// aggregate is verified against the group key before it is returned as
/// `(group_key_bytes, signature_bytes)`.
macro_rules! impl_local_sign {
    ($fn_name:ident, $frost:ident) => {
        fn $fn_name(
            message: &[u8],
            bundle: &ShareBundle,
            signers: &[u16],
        ) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
            let pubkey_bytes = BASE64
                .decode(&bundle.public_key_package)
                .map_err(|e| EngineError::InvalidKeyMaterial(format!("Invalid public key package base64: {e}")))?;
            let public_key_package = $frost::keys::PublicKeyPackage::deserialize(&pubkey_bytes)
                .map_err(|e| EngineError::InvalidKeyMaterial(format!("Invalid public key package: {e}")))?;

            let mut key_packages = BTreeMap::new();
            for index in signers {
                let encoded = bundle.key_packages.get(index).ok_or_else(|| {
                    EngineError::InvalidKeyMaterial(format!("No key share for party {index}"))
                })?;
                let bytes = Zeroizing::new(BASE64.decode(encoded).map_err(|e| {
                    EngineError::InvalidKeyMaterial(format!("Invalid key share base64 for party {index}: {e}"))
                })?);
                let key_package = $frost::keys::KeyPackage::deserialize(&bytes).map_err(|e| {
                    EngineError::InvalidKeyMaterial(format!("Invalid key share for party {index}: {e}"))
                })?;
                key_packages.insert(*key_package.identifier(), key_package);
            }

            let mut nonces = BTreeMap::new();
            let mut commitments = BTreeMap::new();
            for (id, key_package) in &key_packages {
                let (signing_nonces, signing_commitments) =
                    $frost::round1::commit(key_package.signing_share(), &mut OsRng);
                nonces.insert(*id, signing_nonces);
                commitments.insert(*id, signing_commitments);
            }

            let signing_package = $frost::SigningPackage::new(commitments, message);

            let mut shares = BTreeMap::new();
            for (id, key_package) in &key_packages {
                let signing_nonces = nonces
                    .get(id)
                    .ok_or_else(|| EngineError::Protocol("Missing signing nonces".to_string()))?;
                let share = $frost::round2::sign(&signing_package, signing_nonces, key_package)
                    .map_err(|e| EngineError::Protocol(format!("Partial signing failed: {e}")))?;
                shares.insert(*id, share);
            }

            let signature = $frost::aggregate(&signing_package, &shares, &public_key_package)
                .map_err(|e| EngineError::Protocol(format!("Aggregation failed: {e}")))?;

            public_key_package
                .verifying_key()
                .verify(message, &signature)
                .map_err(|e| EngineError::Protocol(format!("Aggregate signature does not verify: {e}")))?;

            let signature_bytes = signature
                .serialize()
                .map_err(|e| EngineError::Protocol(format!("Failed to serialize signature: {e}")))?;
            let group_key = public_key_package
                .verifying_key()
                .serialize()
                .map_err(|e| EngineError::Protocol(format!("Failed to serialize group key: {e}")))?;

            Ok((group_key, signature_bytes))
        }
    };
}

pub(crate) use impl_local_keygen;
pub(crate) use impl_local_sign;
