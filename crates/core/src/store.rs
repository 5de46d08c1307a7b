use crate::models::ScoredEntry;

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let (mut dot, mut left_norm, mut right_norm) = (0f32, 0f32, 0f32);
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Orders hits by descending score, then by insertion position, and keeps `k`.
pub fn rank_hits(mut hits: Vec<(u64, ScoredEntry)>, k: usize) -> Vec<ScoredEntry> {
    hits.sort_by(|(left_position, left), (right_position, right)| {
        right
            .score
            .total_cmp(&left.score)
            .then(left_position.cmp(right_position))
    });
    hits.into_iter().take(k).map(|(_, hit)| hit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexedEntry, TextSegment};

    fn hit(sequence: usize, score: f32) -> ScoredEntry {
        ScoredEntry {
            entry: IndexedEntry {
                vector: Vec::new(),
                segment: TextSegment {
                    document_id: "doc".to_string(),
                    sequence,
                    text: String::new(),
                },
                filename: "cv.txt".to_string(),
            },
            score,
        }
    }

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let ranked = rank_hits(
            vec![(2, hit(2, 0.5)), (0, hit(0, 0.5)), (1, hit(1, 0.9))],
            3,
        );
        let order: Vec<usize> = ranked.iter().map(|hit| hit.entry.segment.sequence).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }
}
