// DANS : src/filtering/classifier.rs

/// Mots-clés recherchés dans les logs. "swapped" est couvert par "swap"
/// mais reste listé explicitement.
pub const SWAP_KEYWORDS: [&str; 4] = ["swap", "swapped", "exchange", "trade"];

/// Heuristique : le lot de logs mentionne-t-il un swap ?
///
/// Favorise le rappel : un faux positif ne coûte qu'un `getTransaction`,
/// un faux négatif perd un événement.
pub fn may_be_swap<S: AsRef<str>>(lines: &[S]) -> bool {
    lines.iter().any(|line| {
        let line = line.as_ref().to_ascii_lowercase();
        SWAP_KEYWORDS.iter().any(|keyword| line.contains(keyword))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_swapped_instruction_log() {
        assert!(may_be_swap(&["Program log: Instruction: Swapped"]));
    }

    #[test]
    fn is_case_insensitive() {
        assert!(may_be_swap(&["Program log: SWAP_BASE_IN"]));
        assert!(may_be_swap(&["program log: Exchange executed"]));
        assert!(may_be_swap(&["Program log: TradeEvent"]));
    }

    #[test]
    fn rejects_unrelated_logs() {
        let logs = [
            "Program 11111111111111111111111111111111 invoke [1]",
            "Program log: Instruction: Transfer",
            "Program 11111111111111111111111111111111 success",
        ];
        assert!(!may_be_swap(&logs));
    }

    #[test]
    fn empty_batch_is_not_a_swap() {
        let logs: Vec<String> = Vec::new();
        assert!(!may_be_swap(&logs));
    }
}
