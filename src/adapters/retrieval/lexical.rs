//! In-process lexical similarity over a case's turn log.
//!
//! Scores are Jaccard similarity over the union of word and word-bigram sets.
//! Crude next to embeddings, but needs nothing beyond the case store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseId, ScoredTurn, TurnId};
use crate::domain::ports::{CaseStore, RetrievalProvider};

/// Words shorter than this are ignored.
const MIN_WORD_LEN: usize = 2;

pub struct LexicalRetrievalProvider {
    store: Arc<dyn CaseStore>,
}

impl LexicalRetrievalProvider {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }
}

fn features(text: &str) -> HashSet<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_lowercase)
        .collect();

    let mut set: HashSet<String> = words.iter().cloned().collect();
    set.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    set
}

/// Jaccard similarity of the word and bigram sets of `a` and `b`, in [0, 1].
///
/// Two texts without any features score 0.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    jaccard(&features(a), &features(b))
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

#[async_trait]
impl RetrievalProvider for LexicalRetrievalProvider {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn search(
        &self,
        case_id: CaseId,
        query: &str,
        top_k: usize,
        excluding: &HashSet<TurnId>,
    ) -> DomainResult<Vec<ScoredTurn>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_features = features(query);
        if query_features.is_empty() {
            return Ok(Vec::new());
        }

        let turns = self.store.list_turns_since(case_id, TurnId::ORIGIN).await?;
        let mut scored: Vec<ScoredTurn> = turns
            .into_iter()
            .filter(|t| !excluding.contains(&t.ordinal))
            .filter_map(|turn| {
                let score = jaccard(&query_features, &features(&turn.content));
                (score > 0.0).then_some(ScoredTurn { score, turn })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.turn.ordinal.cmp(&a.turn.ordinal))
        });
        scored.truncate(top_k);

        tracing::trace!(%case_id, candidates = scored.len(), "Lexical retrieval finished");
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryCaseStore;
    use crate::domain::models::{Case, NewTurn, PhaseState};
    use chrono::Utc;

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(lexical_similarity("disk full on /var", "disk full on /var"), 1.0);
        assert_eq!(lexical_similarity("disk full", "network timeout"), 0.0);
        assert_eq!(lexical_similarity("", "anything"), 0.0);
        let partial = lexical_similarity("disk full on var", "var partition is full");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_bigrams_reward_word_order() {
        let ordered = lexical_similarity("connection refused by upstream", "upstream connection refused");
        let scrambled = lexical_similarity("connection refused by upstream", "refused upstream connection");
        assert!(ordered > scrambled);
    }

    #[tokio::test]
    async fn test_search_ranks_and_excludes() {
        let store = Arc::new(InMemoryCaseStore::new());
        let case = Case::new("vpn drops");
        store.create_case(&case, &PhaseState::default()).await.unwrap();
        let contents = [
            "vpn tunnel drops every hour",
            "printer is out of toner",
            "the vpn tunnel drops after rekey",
            "vpn tunnel drops every hour again",
        ];
        for (i, content) in contents.iter().enumerate() {
            let turn = NewTurn::user(*content).into_turn(case.id, TurnId(i as u64 + 1), Utc::now());
            store.append_turn(&turn).await.unwrap();
        }

        let provider = LexicalRetrievalProvider::new(store);
        let excluding: HashSet<TurnId> = [TurnId(4)].into_iter().collect();
        let results = provider
            .search(case.id, "vpn tunnel drops every hour", 5, &excluding)
            .await
            .unwrap();

        let ids: Vec<TurnId> = results.iter().map(|s| s.turn.ordinal).collect();
        assert_eq!(ids, vec![TurnId(1), TurnId(3)]);
        assert!(results[0].score > results[1].score);
        for result in &results {
            assert_eq!(
                result.score,
                lexical_similarity("vpn tunnel drops every hour", &result.turn.content)
            );
        }
    }
}
