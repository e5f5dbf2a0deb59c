use serde::Serialize;

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 5;

pub fn rating_in_range(v: i64) -> bool {
    (RATING_MIN..=RATING_MAX).contains(&v)
}

/// One feedback entry's three criterion ratings, each already validated to
/// lie in [1, 5].
#[derive(Debug, Clone, Copy)]
pub struct RatingTriple {
    pub teaching: i64,
    pub knowledge: i64,
    pub behavior: i64,
}

impl RatingTriple {
    pub fn mean(self) -> f64 {
        (self.teaching + self.knowledge + self.behavior) as f64 / 3.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Buckets an entry by the mean of its three ratings. The boundaries are
/// inclusive: mean >= 3.5 is positive and mean <= 2.5 is negative, leaving
/// the open interval (2.5, 3.5) as neutral. Downstream consumers depend on
/// exactly these cutoffs.
pub fn classify(mean: f64) -> Sentiment {
    if mean >= 3.5 {
        Sentiment::Positive
    } else if mean <= 2.5 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

/// Per-criterion averages formatted with two fraction digits, or "N/A" when
/// no feedback exists (no division by zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AverageRatings {
    pub teaching: String,
    pub knowledge: String,
    pub behavior: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub overall_sentiment: SentimentCounts,
    pub average_ratings: AverageRatings,
}

pub fn summarize(entries: &[RatingTriple]) -> AnalysisSummary {
    let mut sentiment = SentimentCounts::default();
    let mut teaching_sum: i64 = 0;
    let mut knowledge_sum: i64 = 0;
    let mut behavior_sum: i64 = 0;

    for e in entries {
        teaching_sum += e.teaching;
        knowledge_sum += e.knowledge;
        behavior_sum += e.behavior;
        match classify(e.mean()) {
            Sentiment::Positive => sentiment.positive += 1,
            Sentiment::Neutral => sentiment.neutral += 1,
            Sentiment::Negative => sentiment.negative += 1,
        }
    }

    let total = entries.len();
    AnalysisSummary {
        overall_sentiment: sentiment,
        average_ratings: AverageRatings {
            teaching: format_average(teaching_sum, total),
            knowledge: format_average(knowledge_sum, total),
            behavior: format_average(behavior_sum, total),
        },
    }
}

fn format_average(sum: i64, count: usize) -> String {
    if count == 0 {
        "N/A".to_string()
    } else {
        format!("{:.2}", sum as f64 / count as f64)
    }
}
