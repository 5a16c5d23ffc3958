//! Query compilation.
//!
//! Turns free text plus an optional year filter into a typed boolean query,
//! a sort specification and a year histogram request. Compilation is pure:
//! the same inputs always produce the same [`CompiledQuery`], and nothing
//! here touches the network.
//!
//! # Relevance clauses
//!
//! When text is present, three clauses are OR'd together and at least one
//! must match:
//!
//! | Clause | Field(s) | Boost |
//! |--------|----------|-------|
//! | match | `title` | 4 |
//! | match_phrase | `title` | 10 |
//! | fuzzy multi_match (70% of terms) | `title`, `explanation` | 2, 1 |
//!
//! A year filter becomes a non-scoring `term` filter on `date.year`.
//!
//! # Sort
//!
//! With text: `_score` desc, then `date` desc. Without text: `date` desc.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::schema::{DATE_FIELD, EXPLANATION_FIELD, TITLE_FIELD, YEAR_FIELD};

pub const TITLE_MATCH_BOOST: f32 = 4.0;
pub const TITLE_PHRASE_BOOST: f32 = 10.0;
pub const FUZZY_TITLE_BOOST: f32 = 2.0;
pub const FUZZY_EXPLANATION_BOOST: f32 = 1.0;
pub const FUZZY_MIN_TERMS_PERCENT: u8 = 70;
pub const YEAR_AGG_NAME: &str = "years";
pub const YEAR_AGG_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    Bool(BoolQuery),
    Match {
        field: String,
        query: String,
        boost: f32,
    },
    MatchPhrase {
        field: String,
        query: String,
        boost: f32,
    },
    MultiMatch(MultiMatch),
    Term {
        field: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    /// Scoring clauses that must all match.
    pub must: Vec<Query>,
    /// Non-scoring clauses that must all match.
    pub filter: Vec<Query>,
    pub should: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

/// `best_fields` multi-field match: a document scores with its best field.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMatch {
    pub query: String,
    pub fields: Vec<(String, f32)>,
    pub fuzziness: Fuzziness,
    /// Share of query terms (percent, rounded down) that must match.
    pub minimum_terms_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuzziness {
    /// Edit distance scaled to term length.
    Auto,
}

impl Fuzziness {
    /// Maximum edits tolerated for a term of `len` characters.
    pub fn max_edits(self, len: usize) -> usize {
        match self {
            Fuzziness::Auto => match len {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Fuzziness::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Score,
    Field { field: String, order: SortOrder },
}

/// Terms aggregation ordered by bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsAggregation {
    pub name: String,
    pub field: String,
    pub size: usize,
    pub key_order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query: Query,
    pub sort: Vec<SortKey>,
    pub aggregation: TermsAggregation,
}

/// Full search request body: a compiled query plus a result window.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchBody {
    pub compiled: CompiledQuery,
    pub from: usize,
    pub size: usize,
    /// Ask the store for an exact total instead of a lower bound.
    pub track_total_hits: bool,
}

/// Compile free text and an optional year into a query, sort and
/// histogram request. Blank text and blank years count as absent.
pub fn compile(text: &str, year_filter: Option<&str>) -> CompiledQuery {
    let text = text.trim();
    let year = year_filter.map(str::trim).filter(|y| !y.is_empty());

    let mut should = Vec::new();
    if !text.is_empty() {
        should.push(Query::Match {
            field: TITLE_FIELD.to_string(),
            query: text.to_string(),
            boost: TITLE_MATCH_BOOST,
        });
        should.push(Query::MatchPhrase {
            field: TITLE_FIELD.to_string(),
            query: text.to_string(),
            boost: TITLE_PHRASE_BOOST,
        });
        should.push(Query::MultiMatch(MultiMatch {
            query: text.to_string(),
            fields: vec![
                (TITLE_FIELD.to_string(), FUZZY_TITLE_BOOST),
                (EXPLANATION_FIELD.to_string(), FUZZY_EXPLANATION_BOOST),
            ],
            fuzziness: Fuzziness::Auto,
            minimum_terms_percent: FUZZY_MIN_TERMS_PERCENT,
        }));
    }

    let filter: Vec<Query> = year
        .map(|y| Query::Term {
            field: YEAR_FIELD.to_string(),
            value: y.to_string(),
        })
        .into_iter()
        .collect();

    let query = if should.is_empty() && filter.is_empty() {
        Query::MatchAll
    } else {
        let minimum_should_match = if should.is_empty() { None } else { Some(1) };
        Query::Bool(BoolQuery {
            must: Vec::new(),
            filter,
            should,
            minimum_should_match,
        })
    };

    let date_desc = SortKey::Field {
        field: DATE_FIELD.to_string(),
        order: SortOrder::Desc,
    };
    let sort = if text.is_empty() {
        vec![date_desc]
    } else {
        vec![SortKey::Score, date_desc]
    };

    CompiledQuery {
        query,
        sort,
        aggregation: year_histogram(),
    }
}

fn year_histogram() -> TermsAggregation {
    TermsAggregation {
        name: YEAR_AGG_NAME.to_string(),
        field: YEAR_FIELD.to_string(),
        size: YEAR_AGG_SIZE,
        key_order: SortOrder::Desc,
    }
}

impl CompiledQuery {
    pub fn into_body(self, from: usize, size: usize) -> SearchBody {
        SearchBody {
            compiled: self,
            from,
            size,
            track_total_hits: true,
        }
    }
}

// ============ JSON rendering ============

impl Query {
    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Bool(b) => {
                let mut body = Map::new();
                for (key, clauses) in [("must", &b.must), ("filter", &b.filter), ("should", &b.should)] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.to_string(),
                            Value::Array(clauses.iter().map(Query::to_json).collect()),
                        );
                    }
                }
                if let Some(n) = b.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(n));
                }
                json!({ "bool": body })
            }
            Query::Match {
                field,
                query,
                boost,
            } => json!({ "match": { field.as_str(): { "query": query, "boost": boost } } }),
            Query::MatchPhrase {
                field,
                query,
                boost,
            } => json!({ "match_phrase": { field.as_str(): { "query": query, "boost": boost } } }),
            Query::MultiMatch(m) => {
                let fields: Vec<String> = m
                    .fields
                    .iter()
                    .map(|(name, boost)| {
                        if (*boost - 1.0).abs() < f32::EPSILON {
                            name.clone()
                        } else {
                            format!("{}^{}", name, boost)
                        }
                    })
                    .collect();
                json!({
                    "multi_match": {
                        "query": m.query,
                        "fields": fields,
                        "type": "best_fields",
                        "fuzziness": m.fuzziness.as_str(),
                        "minimum_should_match": format!("{}%", m.minimum_terms_percent)
                    }
                })
            }
            Query::Term { field, value } => json!({ "term": { field.as_str(): value } }),
        }
    }
}

impl SortKey {
    pub fn to_json(&self) -> Value {
        match self {
            SortKey::Score => json!("_score"),
            SortKey::Field { field, order } => json!({ field.as_str(): order.as_str() }),
        }
    }
}

impl TermsAggregation {
    pub fn to_json(&self) -> Value {
        json!({
            self.name.as_str(): {
                "terms": {
                    "field": self.field,
                    "size": self.size,
                    "order": { "_key": self.key_order.as_str() }
                }
            }
        })
    }
}

impl SearchBody {
    pub fn to_json(&self) -> Value {
        json!({
            "from": self.from,
            "size": self.size,
            "query": self.compiled.query.to_json(),
            "sort": self.compiled.sort.iter().map(SortKey::to_json).collect::<Vec<_>>(),
            "track_total_hits": self.track_total_hits,
            "aggs": self.compiled.aggregation.to_json(),
        })
    }
}

impl Serialize for SearchBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bool_query(compiled: &CompiledQuery) -> &BoolQuery {
        match &compiled.query {
            Query::Bool(b) => b,
            other => panic!("expected bool query, got {:?}", other),
        }
    }

    fn boosts(b: &BoolQuery) -> Vec<Vec<f32>> {
        b.should
            .iter()
            .map(|q| match q {
                Query::Match { boost, .. } | Query::MatchPhrase { boost, .. } => vec![*boost],
                Query::MultiMatch(m) => m.fields.iter().map(|(_, b)| *b).collect(),
                other => panic!("unexpected clause {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_empty_input_matches_everything() {
        let compiled = compile("", None);
        assert_eq!(compiled.query, Query::MatchAll);
        assert_eq!(compiled.query.to_json(), json!({ "match_all": {} }));

        let blank = compile("   ", Some(""));
        assert_eq!(blank.query, Query::MatchAll);
    }

    #[test]
    fn test_text_builds_three_boosted_clauses() {
        let compiled = compile("crab nebula", None);
        let b = bool_query(&compiled);
        assert_eq!(b.should.len(), 3);
        assert_eq!(b.minimum_should_match, Some(1));
        assert!(b.filter.is_empty());
        assert!(b.must.is_empty());
        assert_eq!(boosts(b), vec![vec![4.0], vec![10.0], vec![2.0, 1.0]]);
        assert!(matches!(&b.should[1], Query::MatchPhrase { field, .. } if field == "title"));
    }

    #[test]
    fn test_phrase_clause_outranks_other_boosts() {
        assert!(TITLE_PHRASE_BOOST > TITLE_MATCH_BOOST);
        assert!(TITLE_PHRASE_BOOST > FUZZY_TITLE_BOOST);
    }

    #[test]
    fn test_year_filter_adds_one_term_filter() {
        for text in ["", "galaxy"] {
            let compiled = compile(text, Some("2023"));
            let b = bool_query(&compiled);
            assert_eq!(
                b.filter,
                vec![Query::Term {
                    field: "date.year".into(),
                    value: "2023".into()
                }]
            );
        }
        let browse = compile("", Some("2023"));
        let b = bool_query(&browse);
        assert!(b.should.is_empty());
        assert_eq!(b.minimum_should_match, None);
    }

    #[test]
    fn test_sort_depends_on_text() {
        let date_desc = SortKey::Field {
            field: "date".into(),
            order: SortOrder::Desc,
        };
        assert_eq!(compile("moon", None).sort, vec![SortKey::Score, date_desc.clone()]);
        assert_eq!(compile("", Some("1999")).sort, vec![date_desc.clone()]);
        assert_eq!(compile("", None).sort, vec![date_desc]);
    }

    #[test]
    fn test_histogram_is_always_requested() {
        for (text, year) in [("", None), ("moon", Some("2001"))] {
            let agg = compile(text, year).aggregation;
            assert_eq!(agg.field, "date.year");
            assert_eq!(agg.size, 50);
            assert_eq!(agg.key_order, SortOrder::Desc);
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        assert_eq!(compile("moon", Some("2001")), compile("moon", Some("2001")));
    }

    #[test]
    fn test_body_json_shape() {
        let body = compile("Andes", Some("2023")).into_body(20, 10).to_json();
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["track_total_hits"], true);
        assert_eq!(body["sort"], json!(["_score", { "date": "desc" }]));
        assert_eq!(
            body["aggs"],
            json!({ "years": { "terms": { "field": "date.year", "size": 50, "order": { "_key": "desc" } } } })
        );

        let b = &body["query"]["bool"];
        assert_eq!(b["minimum_should_match"], 1);
        assert_eq!(b["filter"], json!([{ "term": { "date.year": "2023" } }]));
        assert_eq!(b["should"][0], json!({ "match": { "title": { "query": "Andes", "boost": 4.0 } } }));
        assert_eq!(
            b["should"][1],
            json!({ "match_phrase": { "title": { "query": "Andes", "boost": 10.0 } } })
        );
        assert_eq!(
            b["should"][2]["multi_match"],
            json!({
                "query": "Andes",
                "fields": ["title^2", "explanation"],
                "type": "best_fields",
                "fuzziness": "AUTO",
                "minimum_should_match": "70%"
            })
        );
    }

    #[test]
    fn test_auto_fuzziness_scales_with_length() {
        assert_eq!(Fuzziness::Auto.max_edits(2), 0);
        assert_eq!(Fuzziness::Auto.max_edits(4), 1);
        assert_eq!(Fuzziness::Auto.max_edits(9), 2);
    }
}
