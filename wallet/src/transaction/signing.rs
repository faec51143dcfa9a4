//! Owner proofs.
//!
//! Signing is a separate step from building: builders stay pure and
//! key-free, and the caller decides which account key authorises an order.

use super::codec::CodecResult;
use super::types::{OwnerProof, TransactionOrder};
use crate::crypto::Keypair;

/// Signs `order` in place with `keypair`, replacing any existing proof.
///
/// The signature covers [`TransactionOrder::signing_bytes`], so the order's
/// hash changes once the proof is attached. Hash the order after signing.
pub fn sign_order(order: &mut TransactionOrder, keypair: &Keypair) -> CodecResult<()> {
    let bytes = order.signing_bytes()?;
    order.owner_proof = Some(OwnerProof {
        public_key: keypair.public_key(),
        signature: keypair.sign(&bytes),
    });
    Ok(())
}

/// Convenience for the common build-then-sign pattern.
pub fn signed(mut order: TransactionOrder, keypair: &Keypair) -> CodecResult<TransactionOrder> {
    sign_order(&mut order, keypair)?;
    Ok(order)
}

/// Returns `true` when the order carries an owner proof whose signature is
/// valid over the order's signing bytes.
pub fn verify_owner_proof(order: &TransactionOrder) -> bool {
    let Some(proof) = &order.owner_proof else {
        return false;
    };
    let Ok(bytes) = order.signing_bytes() else {
        return false;
    };
    proof.public_key.verify(&bytes, &proof.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionId;
    use crate::transaction::types::{ClientMetadata, TxAttributes};
    use crate::unit::{LockReason, UnitId, UnitType};

    fn lock_order() -> TransactionOrder {
        TransactionOrder::new(
            PartitionId(1),
            UnitId::derive(b"bill", UnitType::Bill),
            TxAttributes::Lock {
                reason: LockReason::Manual,
                counter: 0,
            },
            ClientMetadata {
                timeout: 11,
                max_fee: 10,
                fee_credit_record_id: Some(UnitId::derive(b"fcr", UnitType::FeeCredit)),
            },
        )
    }

    #[test]
    fn unsigned_order_does_not_verify() {
        assert!(!verify_owner_proof(&lock_order()));
    }

    #[test]
    fn signed_order_verifies() {
        let kp = Keypair::generate();
        let order = signed(lock_order(), &kp).unwrap();
        assert!(order.is_signed());
        assert!(verify_owner_proof(&order));
        assert_eq!(order.owner_proof.unwrap().public_key, kp.public_key());
    }

    #[test]
    fn mutation_after_signing_breaks_proof() {
        let kp = Keypair::generate();
        let mut order = signed(lock_order(), &kp).unwrap();
        order.client_metadata.timeout += 1;
        assert!(!verify_owner_proof(&order));
    }

    #[test]
    fn resigning_replaces_proof() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let mut order = signed(lock_order(), &a).unwrap();
        sign_order(&mut order, &b).unwrap();
        assert!(verify_owner_proof(&order));
        assert_eq!(order.owner_proof.unwrap().public_key, b.public_key());
    }
}
