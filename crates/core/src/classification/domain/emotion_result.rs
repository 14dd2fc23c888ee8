use std::collections::HashMap;

use super::classifier::ClassifyError;

/// One classifier evaluation: per-label scores in percent and the label
/// with the highest score.
#[derive(Clone, Debug, PartialEq)]
pub struct EmotionResult {
    dominant_label: String,
    distribution: HashMap<String, f32>,
}

impl EmotionResult {
    /// Builds a result from raw scores.
    ///
    /// Scores must be finite and non-negative; they need not sum to 100.
    /// The dominant label is the highest score, ties going to the
    /// alphabetically first label.
    pub fn from_scores<I, S>(scores: I) -> Result<Self, ClassifyError>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut distribution = HashMap::new();
        for (label, score) in scores {
            let label = label.into();
            if !score.is_finite() || score < 0.0 {
                return Err(ClassifyError::InvalidScore { label, score });
            }
            distribution.insert(label, score);
        }

        let dominant_label = ranked(&distribution)
            .first()
            .map(|(label, _)| label.to_string())
            .ok_or(ClassifyError::EmptyDistribution)?;

        Ok(Self {
            dominant_label,
            distribution,
        })
    }

    pub fn dominant_label(&self) -> &str {
        &self.dominant_label
    }

    pub fn distribution(&self) -> &HashMap<String, f32> {
        &self.distribution
    }

    pub fn score(&self, label: &str) -> Option<f32> {
        self.distribution.get(label).copied()
    }

    /// Entries by descending score, ties broken by label.
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        ranked(&self.distribution)
    }
}

fn ranked(distribution: &HashMap<String, f32>) -> Vec<(&str, f32)> {
    let mut entries: Vec<(&str, f32)> = distribution
        .iter()
        .map(|(label, score)| (label.as_str(), *score))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dominant_is_highest_score() {
        let result =
            EmotionResult::from_scores([("sad", 10.0), ("happy", 80.0), ("neutral", 10.0)])
                .unwrap();
        assert_eq!(result.dominant_label(), "happy");
        assert_relative_eq!(result.score("sad").unwrap(), 10.0);
    }

    #[test]
    fn test_ranked_is_descending_with_label_tiebreak() {
        let result = EmotionResult::from_scores([
            ("surprise", 5.0),
            ("neutral", 30.0),
            ("angry", 30.0),
            ("happy", 35.0),
        ])
        .unwrap();

        let labels: Vec<&str> = result.ranked().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["happy", "angry", "neutral", "surprise"]);
    }

    #[test]
    fn test_tie_for_dominant_is_deterministic() {
        let result = EmotionResult::from_scores([("sad", 50.0), ("fear", 50.0)]).unwrap();
        assert_eq!(result.dominant_label(), "fear");
    }

    #[test]
    fn test_negative_score_rejected() {
        let err = EmotionResult::from_scores([("happy", -1.0)]).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidScore { .. }));
    }

    #[test]
    fn test_nan_score_rejected() {
        assert!(EmotionResult::from_scores([("happy", f32::NAN)]).is_err());
    }

    #[test]
    fn test_empty_distribution_rejected() {
        let err = EmotionResult::from_scores(Vec::<(String, f32)>::new()).unwrap_err();
        assert!(matches!(err, ClassifyError::EmptyDistribution));
    }

    #[test]
    fn test_scores_need_not_sum_to_100() {
        let result = EmotionResult::from_scores([("happy", 70.0), ("sad", 70.0)]).unwrap();
        assert_eq!(result.distribution().len(), 2);
    }
}
