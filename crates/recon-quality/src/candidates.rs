//! Candidate selection among alternative pairwise-match files
//!
//! A match file is a sequence of two-line records:
//!
//! ```text
//! 0 1                 <- ids of the two images
//! 12 40 13 41 17 52   <- correspondences, two feature indices each
//! ```
//!
//! A pair qualifies when it has at least `min_matches_per_pair`
//! correspondences; a file's score is its number of qualifying pairs.

use recon_core::{LogSink, ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Score given to unreadable or malformed candidates; never selected.
pub const UNUSABLE_SCORE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFileStats {
    pub total_pairs: usize,
    pub qualifying_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MatchFileStats>,
}

impl Candidate {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

pub fn score_match_file(path: &Path, min_matches_per_pair: usize) -> ReconResult<MatchFileStats> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ReconError::io(path.display().to_string(), e))?;
    score_match_text(&text, min_matches_per_pair)
        .map_err(|reason| ReconError::malformed(path, reason))
}

fn score_match_text(text: &str, min_matches_per_pair: usize) -> Result<MatchFileStats, String> {
    let mut stats = MatchFileStats {
        total_pairs: 0,
        qualifying_pairs: 0,
    };
    let mut lines = text.lines().enumerate();

    while let Some((idx, header)) = lines.next() {
        if header.trim().is_empty() {
            continue;
        }
        let ids: Vec<&str> = header.split_whitespace().collect();
        if ids.len() != 2 || ids.iter().any(|id| id.parse::<u64>().is_err()) {
            return Err(format!("line {}: expected two image ids, got {header:?}", idx + 1));
        }

        // An empty body line is a pair with zero correspondences.
        let (body_idx, body) = lines
            .next()
            .ok_or_else(|| format!("line {}: pair header without correspondences", idx + 1))?;
        let tokens: Vec<&str> = body.split_whitespace().collect();
        if tokens.len() % 2 != 0 {
            return Err(format!(
                "line {}: odd number of feature indices ({})",
                body_idx + 1,
                tokens.len()
            ));
        }
        if let Some(bad) = tokens.iter().find(|t| t.parse::<u64>().is_err()) {
            return Err(format!("line {}: bad feature index {bad:?}", body_idx + 1));
        }

        stats.total_pairs += 1;
        if tokens.len() / 2 >= min_matches_per_pair {
            stats.qualifying_pairs += 1;
        }
    }
    Ok(stats)
}

/// Scores every file and orders them by score, best first. The sort is
/// stable, so ties keep input order.
pub fn rank_candidates(
    paths: &[PathBuf],
    min_matches_per_pair: usize,
    sink: &dyn LogSink,
) -> Vec<(Candidate, Option<ReconError>)> {
    let step = "select-matches";
    let mut ranked: Vec<(Candidate, Option<ReconError>)> = paths
        .iter()
        .map(|path| match score_match_file(path, min_matches_per_pair) {
            Ok(stats) => {
                sink.info(
                    step,
                    &format!(
                        "{}: {} of {} pairs with >= {} matches",
                        path.display(),
                        stats.qualifying_pairs,
                        stats.total_pairs,
                        min_matches_per_pair
                    ),
                );
                (
                    Candidate {
                        path: path.clone(),
                        score: stats.qualifying_pairs as i64,
                        stats: Some(stats),
                    },
                    None,
                )
            }
            Err(e) => {
                sink.warn(step, &format!("{}: unusable candidate: {e}", path.display()));
                (
                    Candidate {
                        path: path.clone(),
                        score: UNUSABLE_SCORE,
                        stats: None,
                    },
                    Some(e),
                )
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.0.score.cmp(&a.0.score));
    ranked
}

/// Picks the highest-scoring candidate.
///
/// Fails with [`ReconError::InsufficientQuality`] when the best score is
/// below `min_score` or no candidate could be read. When only one
/// candidate was offered and it could not be read, its own error is
/// returned instead.
pub fn select_best(
    paths: &[PathBuf],
    min_score: i64,
    min_matches_per_pair: usize,
    sink: &dyn LogSink,
) -> ReconResult<Candidate> {
    if paths.is_empty() {
        return Err(ReconError::Config("no match candidates to select from".into()));
    }

    let mut ranked = rank_candidates(paths, min_matches_per_pair, sink);
    if ranked.len() == 1 {
        if let Some(err) = ranked[0].1.take() {
            return Err(err);
        }
    }

    let (best, _) = ranked.remove(0);
    // Unreadable files are never selected, whatever the floor.
    if best.score == UNUSABLE_SCORE || best.score < min_score {
        let scores = std::iter::once(&best)
            .chain(ranked.iter().map(|(c, _)| c))
            .map(|c| format!("{}={}", c.name(), c.score))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ReconError::insufficient(
            "valid_match_pairs",
            format!(
                "best candidate has {} qualifying pairs, need {min_score} (scores: {scores})",
                best.score
            ),
        ));
    }

    sink.info(
        "select-matches",
        &format!("selected {} ({} qualifying pairs)", best.path.display(), best.score),
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::MemorySink;

    fn match_file(dir: &Path, name: &str, pairs: &[usize]) -> PathBuf {
        let mut text = String::new();
        for (i, &count) in pairs.iter().enumerate() {
            text.push_str(&format!("{} {}\n", i, i + 1));
            let body: Vec<String> = (0..count).map(|k| format!("{k} {}", k + 100)).collect();
            text.push_str(&body.join(" "));
            text.push('\n');
        }
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_scoring_counts_qualifying_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = match_file(dir.path(), "m.txt", &[12, 9, 10, 0, 30]);
        let stats = score_match_file(&path, 10).unwrap();
        assert_eq!(stats.total_pairs, 5);
        assert_eq!(stats.qualifying_pairs, 3);
    }

    #[test]
    fn test_picks_higher_score() {
        let dir = tempfile::tempdir().unwrap();
        let a = match_file(dir.path(), "a.txt", &[10; 15]);
        let b = match_file(dir.path(), "b.txt", &[10; 8]);
        let sink = MemorySink::new();

        let best = select_best(&[a.clone(), b.clone()], 10, 10, &sink).unwrap();
        assert_eq!(best.path, a);
        assert_eq!(best.score, 15);

        let best = select_best(&[b, a.clone()], 10, 10, &sink).unwrap();
        assert_eq!(best.path, a);
    }

    #[test]
    fn test_aborts_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let a = match_file(dir.path(), "a.txt", &[10; 9]);
        let b = match_file(dir.path(), "b.txt", &[10; 8]);
        let err = select_best(&[a, b], 10, 10, &MemorySink::new()).unwrap_err();
        match err {
            ReconError::InsufficientQuality { metric, detail } => {
                assert_eq!(metric, "valid_match_pairs");
                assert!(detail.contains("a.txt=9"));
                assert!(detail.contains("b.txt=8"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_ties_favor_first_listed() {
        let dir = tempfile::tempdir().unwrap();
        let a = match_file(dir.path(), "a.txt", &[20; 12]);
        let b = match_file(dir.path(), "b.txt", &[11; 12]);
        let sink = MemorySink::new();

        for _ in 0..3 {
            assert_eq!(select_best(&[a.clone(), b.clone()], 1, 10, &sink).unwrap().path, a);
            assert_eq!(select_best(&[b.clone(), a.clone()], 1, 10, &sink).unwrap().path, b);
        }
    }

    #[test]
    fn test_malformed_candidate_ranks_last() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "0 1\n1 2 3\n").unwrap();
        let good = match_file(dir.path(), "good.txt", &[10; 2]);

        let ranked = rank_candidates(&[bad.clone(), good.clone()], 10, &MemorySink::new());
        assert_eq!(ranked[0].0.path, good);
        assert_eq!(ranked[1].0.score, UNUSABLE_SCORE);
        assert!(ranked[1].1.is_some());

        let best = select_best(&[bad, good.clone()], 1, 10, &MemorySink::new()).unwrap();
        assert_eq!(best.path, good);
    }

    #[test]
    fn test_unreadable_candidates_never_selected_with_negative_floor() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "0 1\n3 x\n").unwrap();
        std::fs::write(&b, "0 1 2\n").unwrap();

        let err = select_best(&[a, b], -5, 10, &MemorySink::new()).unwrap_err();
        match err {
            ReconError::InsufficientQuality { metric, detail } => {
                assert_eq!(metric, "valid_match_pairs");
                assert!(detail.contains("a.txt=-1, b.txt=-1"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_failure_lists_scores_best_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = match_file(dir.path(), "a.txt", &[10; 9]);
        let b = match_file(dir.path(), "b.txt", &[10; 8]);
        let c = match_file(dir.path(), "c.txt", &[10; 7]);

        let err = select_best(&[a, b, c], 10, 10, &MemorySink::new()).unwrap_err();
        assert!(err.to_string().contains("(scores: a.txt=9, b.txt=8, c.txt=7)"));
    }

    #[test]
    fn test_sole_malformed_candidate_propagates_its_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "zero one\n1 2\n").unwrap();

        let err = select_best(&[bad], 1, 10, &MemorySink::new()).unwrap_err();
        assert!(matches!(err, ReconError::MalformedArtifact { .. }));

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            select_best(&[missing], 1, 10, &MemorySink::new()).unwrap_err(),
            ReconError::Io { .. }
        ));
    }

    #[test]
    fn test_header_without_body_is_malformed() {
        assert!(score_match_text("0 1\n2 3 4 5\n1 2", 1).is_err());
        assert_eq!(score_match_text("", 1).unwrap().total_pairs, 0);
    }
}
