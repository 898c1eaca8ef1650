use alloy::primitives::{keccak256, Address, Signature, B256, U256};

use tracing::warn;

/// Kinds packed into the Safe signature blob, in the contract's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeSignatureType {
    /// EIP-1271 signature from an owner contract; `r` carries the owner.
    ContractSignature = 0,
    /// Hash pre-approved on-chain via `approveHash`; `r` carries the owner.
    ApprovedHash = 1,
    /// Plain ECDSA over the safe tx hash, v in {27, 28}.
    Eoa = 2,
    /// ECDSA over the EIP-191 prefixed hash, v in {31, 32}.
    EthSign = 3,
}

#[derive(Debug, Clone)]
pub struct SafeSignature {
    pub owner: Address,
    pub signature: Vec<u8>,
    pub signature_type: SafeSignatureType,
}

fn recover(prehash: B256, r: U256, s: U256, v: u8) -> Option<Address> {
    if v != 27 && v != 28 {
        return None;
    }
    let signature = Signature::new(r, s, v == 28);
    signature.recover_address_from_prehash(&prehash).ok()
}

fn eth_sign_prehash(safe_tx_hash: B256) -> B256 {
    let mut message = b"\x19Ethereum Signed Message:\n32".to_vec();
    message.extend_from_slice(safe_tx_hash.as_slice());
    keccak256(&message)
}

/// Splits the packed signature blob into per-owner signatures.
///
/// The blob is a sequence of 65 byte `{r, s, v}` slots followed by a dynamic
/// tail; contract signatures point into the tail with `s` as a byte offset.
/// Entries that cannot be recovered are dropped with a warning rather than
/// failing the whole transaction.
pub fn parse_signatures(safe_tx_hash: B256, signatures: &[u8]) -> Vec<SafeSignature> {
    let mut parsed = Vec::new();
    let mut dynamic_start = signatures.len();
    let mut position = 0;

    while position + 65 <= dynamic_start {
        let slot = &signatures[position..position + 65];
        position += 65;

        let r = U256::from_be_slice(&slot[0..32]);
        let s = U256::from_be_slice(&slot[32..64]);
        let v = slot[64];

        match v {
            0 => {
                // Owner packed into r; s points at the EIP-1271 payload
                let owner = Address::from_slice(&slot[12..32]);
                let offset = usize::try_from(s).unwrap_or(usize::MAX);
                let contract_signature = signatures
                    .get(offset..offset + 32)
                    .map(|length_word| U256::from_be_slice(length_word))
                    .and_then(|length| usize::try_from(length).ok())
                    .and_then(|length| signatures.get(offset + 32..offset + 32 + length));
                match contract_signature {
                    Some(payload) => {
                        dynamic_start = dynamic_start.min(offset);
                        let mut signature = slot.to_vec();
                        signature.extend_from_slice(payload);
                        parsed.push(SafeSignature {
                            owner,
                            signature,
                            signature_type: SafeSignatureType::ContractSignature,
                        });
                    }
                    None => {
                        warn!(owner = %owner, "contract signature with out of range offset");
                    }
                }
            }
            1 => {
                parsed.push(SafeSignature {
                    owner: Address::from_slice(&slot[12..32]),
                    signature: slot.to_vec(),
                    signature_type: SafeSignatureType::ApprovedHash,
                });
            }
            v if v > 30 => match recover(eth_sign_prehash(safe_tx_hash), r, s, v - 4) {
                Some(owner) => parsed.push(SafeSignature {
                    owner,
                    signature: slot.to_vec(),
                    signature_type: SafeSignatureType::EthSign,
                }),
                None => warn!(v = v, "unrecoverable eth_sign signature"),
            },
            v => match recover(safe_tx_hash, r, s, v) {
                Some(owner) => parsed.push(SafeSignature {
                    owner,
                    signature: slot.to_vec(),
                    signature_type: SafeSignatureType::Eoa,
                }),
                None => warn!(v = v, "unrecoverable ecdsa signature"),
            },
        }
    }

    parsed
}

/// 65 byte `{r, s, v}` recovery for externally supplied signatures (delegates).
/// Accepts v in {0, 1, 27, 28}.
pub fn recover_address(prehash: B256, signature: &[u8]) -> Option<Address> {
    if signature.len() != 65 {
        return None;
    }
    let r = U256::from_be_slice(&signature[0..32]);
    let s = U256::from_be_slice(&signature[32..64]);
    let v = match signature[64] {
        v @ (27 | 28) => v,
        v @ (0 | 1) => v + 27,
        _ => return None,
    };
    recover(prehash, r, s, v)
}

#[cfg(test)]
mod tests {

    use super::{parse_signatures, recover_address, SafeSignatureType};
    use alloy::{
        primitives::{keccak256, Address, B256, U256},
        signers::{local::PrivateKeySigner, SignerSync},
    };

    fn signature_slot(signature: &alloy::primitives::Signature) -> Vec<u8> {
        let mut slot = signature.as_bytes().to_vec();
        assert_eq!(slot.len(), 65);
        // as_bytes yields v in {27, 28} already; keep it explicit for the test
        if slot[64] < 27 {
            slot[64] += 27;
        }
        slot
    }

    #[test]
    fn test_parse_eoa_signature() {
        let safe_tx_hash = keccak256(b"safe tx");
        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&safe_tx_hash).unwrap();

        let parsed = parse_signatures(safe_tx_hash, &signature_slot(&signature));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].owner, signer.address());
        assert_eq!(parsed[0].signature_type, SafeSignatureType::Eoa);
    }

    #[test]
    fn test_parse_eth_sign_signature() {
        let safe_tx_hash = keccak256(b"safe tx");
        let mut message = b"\x19Ethereum Signed Message:\n32".to_vec();
        message.extend_from_slice(safe_tx_hash.as_slice());
        let prefixed = keccak256(&message);

        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&prefixed).unwrap();
        let mut slot = signature_slot(&signature);
        // Safe encoding marks eth_sign by shifting v up by 4
        slot[64] += 4;

        let parsed = parse_signatures(safe_tx_hash, &slot);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].owner, signer.address());
        assert_eq!(parsed[0].signature_type, SafeSignatureType::EthSign);
    }

    #[test]
    fn test_parse_approved_hash_and_contract_signature() {
        let safe_tx_hash = keccak256(b"safe tx");
        let approver = Address::repeat_byte(0x21);
        let contract_owner = Address::repeat_byte(0x31);

        // Slot 0: contract signature pointing at the dynamic tail, slot 1: approved
        // hash. Tail: 32 byte length + payload.
        let payload = vec![0xEE; 40];
        let mut blob = Vec::new();

        let mut contract_slot = [0u8; 65];
        contract_slot[12..32].copy_from_slice(contract_owner.as_slice());
        contract_slot[32..64].copy_from_slice(&U256::from(130u64).to_be_bytes::<32>());
        contract_slot[64] = 0;
        blob.extend_from_slice(&contract_slot);

        let mut approved_slot = [0u8; 65];
        approved_slot[12..32].copy_from_slice(approver.as_slice());
        approved_slot[64] = 1;
        blob.extend_from_slice(&approved_slot);

        blob.extend_from_slice(&U256::from(payload.len() as u64).to_be_bytes::<32>());
        blob.extend_from_slice(&payload);

        let parsed = parse_signatures(safe_tx_hash, &blob);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].owner, contract_owner);
        assert_eq!(
            parsed[0].signature_type,
            SafeSignatureType::ContractSignature
        );
        assert_eq!(parsed[0].signature.len(), 65 + payload.len());
        assert_eq!(parsed[1].owner, approver);
        assert_eq!(parsed[1].signature_type, SafeSignatureType::ApprovedHash);
    }

    #[test]
    fn test_recover_address_variants() {
        let hash = keccak256(b"delegate");
        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&hash).unwrap();

        let mut slot = signature.as_bytes().to_vec();
        assert_eq!(recover_address(hash, &slot), Some(signer.address()));

        // Parity-style v in {0, 1} is normalized
        slot[64] = if slot[64] == 27 { 0 } else { 1 };
        assert_eq!(recover_address(hash, &slot), Some(signer.address()));

        assert_eq!(recover_address(hash, &slot[..64]), None);
    }
}
