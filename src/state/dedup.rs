// DANS : src/state/dedup.rs

use solana_sdk::signature::Signature;
use std::{
    collections::{HashSet, VecDeque},
    sync::{Mutex, PoisonError},
};

pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Ensemble borné des signatures déjà réclamées pendant la durée de vie d'un abonnement.
///
/// `try_claim` est un check-and-insert atomique : deux livraisons concurrentes
/// de la même signature ne peuvent pas passer toutes les deux. Au-delà de la
/// capacité, les signatures les plus anciennes sont évincées (FIFO).
pub struct SignatureDedup {
    inner: Mutex<DedupInner>,
    capacity: usize,
}

struct DedupInner {
    seen: HashSet<Signature>,
    order: VecDeque<Signature>,
}

impl SignatureDedup {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(DedupInner {
                seen: HashSet::with_capacity(capacity.min(DEFAULT_DEDUP_CAPACITY)),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// `true` si la signature n'avait jamais été vue : l'appelant en devient responsable.
    pub fn try_claim(&self, signature: &Signature) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.seen.insert(*signature) {
            return false;
        }
        inner.order.push_back(*signature);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    /// Rend une signature dont le traitement n'a pas abouti, pour qu'une
    /// nouvelle livraison puisse la retenter.
    pub fn release(&self, signature: &Signature) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.seen.remove(signature) {
            inner.order.retain(|s| s != signature);
        }
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seen
            .contains(signature)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.seen.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureDedup {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_claim_is_rejected() {
        let dedup = SignatureDedup::default();
        let sig = Signature::new_unique();

        assert!(dedup.try_claim(&sig));
        assert!(!dedup.try_claim(&sig));
        assert!(dedup.contains(&sig));
    }

    #[test]
    fn released_signature_can_be_claimed_again() {
        let dedup = SignatureDedup::default();
        let sig = Signature::new_unique();

        assert!(dedup.try_claim(&sig));
        dedup.release(&sig);
        assert!(dedup.try_claim(&sig));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn oldest_signatures_are_evicted_beyond_capacity() {
        let dedup = SignatureDedup::new(2);
        let first = Signature::new_unique();
        let second = Signature::new_unique();
        let third = Signature::new_unique();

        dedup.try_claim(&first);
        dedup.try_claim(&second);
        dedup.try_claim(&third);

        assert_eq!(dedup.len(), 2);
        assert!(!dedup.contains(&first));
        assert!(dedup.contains(&second));
        assert!(dedup.contains(&third));
    }

    #[test]
    fn clear_forgets_everything() {
        let dedup = SignatureDedup::default();
        let sig = Signature::new_unique();
        dedup.try_claim(&sig);

        dedup.clear();

        assert!(dedup.is_empty());
        assert!(dedup.try_claim(&sig));
    }

    #[test]
    fn concurrent_claims_have_a_single_winner() {
        let dedup = Arc::new(SignatureDedup::default());
        let sig = Signature::new_unique();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dedup = dedup.clone();
                std::thread::spawn(move || dedup.try_claim(&sig))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
