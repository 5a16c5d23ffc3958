//! Collection schema: index settings, analyzers, and field mappings.
//!
//! The store validates this declaration when the collection is created.
//! `date.year` is a runtime keyword field computed from `date`, so the year
//! used for filtering and histograms can never drift from the stored date.
//!
//! | Field | Type | Analysis |
//! |-------|------|----------|
//! | `title` | text + `title.keyword` | standard |
//! | `explanation` | text | standard |
//! | `date` | date `yyyy-MM-dd` | none |
//! | `date.year` | runtime keyword | derived from `date` |
//! | `image_url` | keyword | none |
//! | `authors` | keyword | none |
//!
//! A character n-gram analyzer (3–4 grams over letters and digits) is
//! declared for partial-token matching but is not bound to a field.

use serde_json::{json, Value};

pub const TITLE_FIELD: &str = "title";
pub const TITLE_KEYWORD_FIELD: &str = "title.keyword";
pub const EXPLANATION_FIELD: &str = "explanation";
pub const DATE_FIELD: &str = "date";
pub const YEAR_FIELD: &str = "date.year";
pub const NGRAM_ANALYZER: &str = "ngram_analyzer";
pub const NGRAM_MIN: usize = 3;
pub const NGRAM_MAX: usize = 4;

pub fn settings() -> Value {
    json!({
        "index": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "refresh_interval": "5s"
        },
        "analysis": {
            "analyzer": {
                NGRAM_ANALYZER: {
                    "type": "custom",
                    "tokenizer": "ngram_tokenizer",
                    "filter": ["lowercase"]
                }
            },
            "tokenizer": {
                "ngram_tokenizer": {
                    "type": "ngram",
                    "min_gram": NGRAM_MIN,
                    "max_gram": NGRAM_MAX,
                    "token_chars": ["letter", "digit"]
                }
            }
        }
    })
}

pub fn mappings() -> Value {
    json!({
        "properties": {
            TITLE_FIELD: {
                "type": "text",
                "analyzer": "standard",
                "fields": {
                    "keyword": { "type": "keyword" }
                }
            },
            EXPLANATION_FIELD: {
                "type": "text",
                "analyzer": "standard"
            },
            DATE_FIELD: {
                "type": "date",
                "format": "yyyy-MM-dd"
            },
            "year": { "type": "keyword" },
            "image_url": { "type": "keyword" },
            "authors": { "type": "keyword" }
        },
        "runtime": {
            YEAR_FIELD: {
                "type": "keyword",
                "script": {
                    "source": "emit(doc['date'].value.year.toString())"
                }
            }
        }
    })
}

/// Body for the collection-creation request.
pub fn index_definition() -> Value {
    json!({
        "settings": settings(),
        "mappings": mappings(),
    })
}

/// Tokenize the way the standard analyzer does for plain prose: split on
/// anything that is not a letter or digit, then lowercase.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_is_runtime_keyword_from_date() {
        let m = mappings();
        let year = &m["runtime"][YEAR_FIELD];
        assert_eq!(year["type"], "keyword");
        assert!(year["script"]["source"]
            .as_str()
            .unwrap()
            .contains("doc['date'].value.year"));
        assert_eq!(m["properties"]["date"]["format"], "yyyy-MM-dd");
    }

    #[test]
    fn test_title_has_keyword_subfield() {
        let m = mappings();
        assert_eq!(m["properties"]["title"]["analyzer"], "standard");
        assert_eq!(m["properties"]["title"]["fields"]["keyword"]["type"], "keyword");
        assert_eq!(m["properties"]["authors"]["type"], "keyword");
        assert_eq!(m["properties"]["image_url"]["type"], "keyword");
    }

    #[test]
    fn test_ngram_tokenizer_bounds() {
        let s = settings();
        let tok = &s["analysis"]["tokenizer"]["ngram_tokenizer"];
        assert_eq!(tok["min_gram"], 3);
        assert_eq!(tok["max_gram"], 4);
        assert_eq!(tok["token_chars"], json!(["letter", "digit"]));
        assert_eq!(
            s["analysis"]["analyzer"][NGRAM_ANALYZER]["filter"],
            json!(["lowercase"])
        );
    }

    #[test]
    fn test_analyze_splits_and_lowercases() {
        assert_eq!(
            analyze("Solar Eclipse, Over ANDES!"),
            vec!["solar", "eclipse", "over", "andes"]
        );
        assert!(analyze("  --  ").is_empty());
    }
}
