//! Intent Classifier
//!
//! Zero-latency rule engine bucketing questions before any oracle call.
//! Rules are an ordered table evaluated top to bottom; the first rule with
//! a matching pattern wins and the default is `complex`.

use once_cell::sync::Lazy;
use quarry_core::{ClassifiedIntent, IntentTag};
use regex::Regex;

/// One row of the rule table.
struct IntentRule {
    tag: IntentTag,
    confidence: f32,
    patterns: Vec<Regex>,
    table_hint: Option<&'static str>,
    reason: &'static str,
}

impl IntentRule {
    fn new(
        tag: IntentTag,
        confidence: f32,
        patterns: &[&str],
        table_hint: Option<&'static str>,
        reason: &'static str,
    ) -> Self {
        Self {
            tag,
            confidence,
            patterns: patterns.iter().map(|p| compile(p)).collect(),
            table_hint,
            reason,
        }
    }

    fn matches(&self, question: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(question))
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("classifier pattern is valid")
}

/// Domain anchors. Any of these means the question needs data, even when
/// it reads like a general-knowledge question. Matched as whole words with
/// an optional plural suffix.
const DOMAIN_ANCHORS: &[&str] = &[
    "skcet", "srec", "kcet", "kongu", "psg", "student", "students", "batch", "department",
    "dept", "college", "section", "enrollment", "cgpa", "marks", "score", "rank", "eligible",
    "placement", "performer", "assessment", "attendance", "leaderboard", "my", "how many",
    "list", "show", "find", "top", "who",
];

static ANCHORS: Lazy<Regex> = Lazy::new(|| {
    let alternation = DOMAIN_ANCHORS
        .iter()
        .map(|a| regex::escape(a).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"\b(?:{})(?:e?s)?\b", alternation))
});

static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule::new(
            IntentTag::GeneralKnowledge,
            0.85,
            &[
                r"\bwhat (is|are|does)\b.*\b(python|java|c\+\+|sql|array|loop|function|algorithm|data structure|oop|recursion|sorting|linked list|stack|queue|tree|graph)",
                r"\bexplain\b.*\b(concept|algorithm|pattern|principle)",
                r"\bhow (do|does|to)\b.*\b(work|function|implement|write|code)",
                r"\bdefine\b",
                r"\bdifference between\b.*\band\b",
                r"\bwhat is the (meaning|definition|purpose) of\b",
            ],
            None,
            "matched general knowledge pattern",
        ),
        IntentRule::new(
            IntentTag::TopPerformer,
            0.90,
            &[
                r"\b(top|best|highest|leading|rank)\b.*\b(performer|student|scorer|achiever)",
                r"\bwho (is|are) (the )?(top|best|highest|leading)\b",
                r"\b(top|best)\s+\d*\s*(performer|student|scorer)\b",
                r"\bwho (scored|performed|achieved) (the )?(highest|most|best)\b",
                r"\bleaderboard\b",
                r"\branking\b",
            ],
            Some("course_wise_segregations"),
            "matched top performer pattern",
        ),
        IntentRule::new(
            IntentTag::Assessment,
            0.88,
            &[
                r"\bhow many (assessments?|tests?|exams?)\b",
                r"\bassessments?\s+(conducted|done|completed|taken)\b",
                r"\b(assessment|test|exam)\s+count\b",
                r"\bnumber of (assessments?|tests?)\b",
            ],
            // Suffix only; the oracle prefixes the college and year
            Some("_test_data"),
            "matched assessment pattern",
        ),
        IntentRule::new(
            IntentTag::SimpleCount,
            0.85,
            &[
                r"\bhow many (students?|users?|colleges?|departments?|batch(es)?|sections?)\b",
                r"\btotal (number of|count of)?\s*(students?|users?|colleges?)\b",
                r"\bcount of\b",
            ],
            None,
            "matched simple count pattern",
        ),
        IntentRule::new(
            IntentTag::Comparison,
            0.80,
            &[
                r"\bvs\.?(\s|$)",
                r"\bversus\b",
                r"\bcompare\b",
                r"\bbetween\b.*\band\b.*\bcollege",
                r"\b(srec|skcet|kcet|kongu|psg)\b.*\b(vs|versus|compared|against)\b",
            ],
            None,
            "matched comparison pattern",
        ),
        IntentRule::new(
            IntentTag::Trend,
            0.80,
            &[
                r"\b(monthly|weekly|daily|yearly|over time|trend)\b",
                r"\bby (month|week|day|year)\b",
                r"\bprogress (over|across|through)\b",
                r"\bgrowth\b",
            ],
            None,
            "matched trend pattern",
        ),
    ]
});

/// Programming languages recorded for top-performer questions, checked in
/// order (`c++` before `c`).
static LANGUAGES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bjava\b", "java"),
        (r"\bc\+\+|\bcpp\b", "c++"),
        (r"\bpython\b", "python"),
        (r"\bhtml\b", "html"),
        (r"\breact\b", "react"),
        (r"\bc\b", "c"),
    ]
    .into_iter()
    .map(|(p, lang)| (compile(p), lang))
    .collect()
});

const COUNT_ENTITIES: &[(&str, &str)] = &[
    ("students", "student"),
    ("users", "user"),
    ("colleges", "college"),
    ("departments", "department"),
    ("batches", "batch"),
    ("sections", "section"),
];

const DEFAULT_COUNT_ENTITY: &str = "records";

/// Rule-based intent classifier. Pure and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a question. Always returns a value.
    pub fn classify(&self, question: &str) -> ClassifiedIntent {
        let q = question.trim().to_lowercase();
        let anchored = ANCHORS.is_match(&q);

        for rule in RULES.iter() {
            if rule.tag == IntentTag::GeneralKnowledge && anchored {
                continue;
            }
            if !rule.matches(&q) {
                continue;
            }

            let mut intent = ClassifiedIntent::new(rule.tag, rule.confidence)
                .with_metadata("reason", rule.reason);
            if let Some(table) = rule.table_hint {
                intent = intent.with_table_hint(table);
            }
            if let Some(hint) = prompt_hint(rule.tag) {
                intent = intent.with_prompt_hint(hint);
            }
            match rule.tag {
                IntentTag::TopPerformer => {
                    if let Some(lang) = extract_language(&q) {
                        intent = intent.with_metadata("language", lang);
                    }
                }
                IntentTag::SimpleCount => {
                    intent = intent.with_metadata("entity", extract_count_entity(&q));
                }
                _ => {}
            }

            tracing::debug!(intent = %rule.tag, confidence = rule.confidence, "classified question");
            return intent;
        }

        ClassifiedIntent::new(IntentTag::Complex, 1.0)
            .with_metadata("reason", "no pattern matched, using full pipeline")
    }

    /// Whether the question must go through the database pipeline.
    pub fn requires_database(&self, intent: &ClassifiedIntent) -> bool {
        intent.intent != IntentTag::GeneralKnowledge
    }
}

/// Short hint placed ahead of the question in the oracle prompt.
pub fn prompt_hint(tag: IntentTag) -> Option<&'static str> {
    match tag {
        IntentTag::TopPerformer => Some(
            "HINT: Use `course_wise_segregations` table (pre-computed ranks/scores). Join with `users` for name.",
        ),
        IntentTag::Assessment => Some(
            "HINT: Query `<college>_<year>_test_data` table. COUNT DISTINCT question_id for assessment count.",
        ),
        IntentTag::SimpleCount => {
            Some("HINT: Use COUNT(*) or COUNT(DISTINCT id). Keep query simple.")
        }
        IntentTag::Comparison => Some(
            "HINT: Use UNION ALL to compare across colleges. Alias all columns consistently.",
        ),
        IntentTag::Trend => Some(
            "HINT: GROUP BY MONTH(created_at) or YEAR(created_at). Use submission_tracks tables.",
        ),
        IntentTag::GeneralKnowledge | IntentTag::Complex => None,
    }
}

fn extract_language(q: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(pattern, _)| pattern.is_match(q))
        .map(|(_, lang)| *lang)
}

fn extract_count_entity(q: &str) -> &'static str {
    COUNT_ENTITIES
        .iter()
        .find(|(plural, singular)| q.contains(plural) || q.contains(singular))
        .map(|(plural, _)| *plural)
        .unwrap_or(DEFAULT_COUNT_ENTITY)
}
