//! Query service
//!
//! Read-only access to the equipment index: multi-field fuzzy text search
//! and text search composed with exact and range filters.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tantivy::{
    query::{
        AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, DisjunctionMaxQuery, FuzzyTermQuery,
        Occur, Query, RangeQuery, TermQuery,
    },
    schema::{Field, IndexRecordOption},
    Term,
};
use tracing::debug;

use crate::inventory::EquipmentId;

use super::document::EquipmentDoc;
use super::error::{SearchError, SearchResult};
use super::fuzzy::auto_fuzziness;
use super::highlight::highlight;
use super::index::{
    day_number, EquipmentIndex, ScoredDoc, SortOrder, ACQUISITION_DAY_FIELD,
    ACQUISITION_VALUE_FIELD,
};

/// Maximum accepted text query length in bytes
const MAX_QUERY_LENGTH: usize = 1_000;

/// Deepest result position a page may reach (`(page + 1) * size`)
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// Calendar date format accepted for date bounds
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Offset pagination with clamped bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub size: usize,
}

impl Pagination {
    /// Clamp `page` to at least zero and `size` to `1..=max_size`
    pub fn new(page: i64, size: i64, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            page: usize::try_from(page.max(0)).unwrap_or(0),
            size: usize::try_from(size.max(1)).unwrap_or(1).min(max_size),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// One past the last result position of this page; `None` on overflow
    pub fn window_end(&self) -> Option<usize> {
        self.page.checked_mul(self.size)?.checked_add(self.size)
    }
}

/// Filters for advanced search. Absent or blank fields add no clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub text: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub equipment_type: Option<String>,
    pub location: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Inclusive lower date bound, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Inclusive upper date bound, `YYYY-MM-DD`
    pub date_to: Option<String>,
}

/// A matching document with its relevance score and highlighted description
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: EquipmentDoc,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

/// A scored full-text clause plus the analyzed terms used for highlighting
struct TextClause {
    query: Box<dyn Query>,
    highlight_terms: Vec<String>,
}

/// Read-only search over the equipment index
pub struct QueryService {
    index: Arc<EquipmentIndex>,
    max_page_size: usize,
}

impl QueryService {
    pub fn new(index: Arc<EquipmentIndex>, max_page_size: usize) -> Self {
        Self {
            index,
            max_page_size,
        }
    }

    /// Build a clamped page for this service
    pub fn paginate(&self, page: i64, size: i64) -> Pagination {
        Pagination::new(page, size, self.max_page_size)
    }

    /// Fuzzy multi-field search ranked by relevance
    pub fn search_by_text(&self, text: &str, page: Pagination) -> SearchResult<Vec<SearchHit>> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Err(SearchError::validation("query must not be blank"));
        }
        check_length(text)?;
        check_window(page)?;

        let Some(clause) = self.text_clause(text)? else {
            return Ok(Vec::new());
        };

        let hits = self.index.search(
            clause.query.as_ref(),
            page.offset(),
            page.size,
            SortOrder::Relevance,
        )?;

        debug!(
            "Text search for '{}' (page={}, size={}): {} hits in {:?}",
            text,
            page.page,
            page.size,
            hits.len(),
            start.elapsed()
        );
        Ok(to_hits(hits, &clause.highlight_terms))
    }

    /// Optional scored text clause ANDed with non-scoring filters.
    ///
    /// Ranked by relevance when text is present, otherwise by id.
    pub fn search_advanced(
        &self,
        filters: &SearchFilters,
        page: Pagination,
    ) -> SearchResult<Vec<SearchHit>> {
        let start = Instant::now();
        check_window(page)?;
        let fields = *self.index.fields();

        let text = non_blank(&filters.text);
        let text_clause = match text {
            Some(text) => {
                check_length(text)?;
                match self.text_clause(text)? {
                    Some(clause) => Some(clause),
                    // Text that analyzes to nothing cannot match anything
                    None => return Ok(Vec::new()),
                }
            }
            None => None,
        };

        let mut filter_clauses: Vec<Box<dyn Query>> = Vec::new();

        if let Some(status) = non_blank(&filters.status) {
            filter_clauses.push(exact(fields.status, &status.to_uppercase()));
        }
        if let Some(equipment_type) = non_blank(&filters.equipment_type) {
            filter_clauses.push(exact(fields.equipment_type, &equipment_type.to_uppercase()));
        }
        if let Some(location) = non_blank(&filters.location) {
            filter_clauses.push(exact(fields.location_exact, location));
        }

        if filters.min_value.is_some() || filters.max_value.is_some() {
            if let (Some(min), Some(max)) = (filters.min_value, filters.max_value) {
                if min > max {
                    return Err(SearchError::validation(format!(
                        "minValue ({}) must not exceed maxValue ({})",
                        min, max
                    )));
                }
            }
            filter_clauses.push(Box::new(RangeQuery::new_f64_bounds(
                ACQUISITION_VALUE_FIELD.to_string(),
                inclusive(filters.min_value),
                inclusive(filters.max_value),
            )));
        }

        let date_from = parse_date("dateFrom", &filters.date_from)?;
        let date_to = parse_date("dateTo", &filters.date_to)?;
        if date_from.is_some() || date_to.is_some() {
            if let (Some(from), Some(to)) = (date_from, date_to) {
                if from > to {
                    return Err(SearchError::validation(format!(
                        "dateFrom ({}) must not be after dateTo ({})",
                        from, to
                    )));
                }
            }
            filter_clauses.push(Box::new(RangeQuery::new_i64_bounds(
                ACQUISITION_DAY_FIELD.to_string(),
                inclusive(date_from.map(day_number)),
                inclusive(date_to.map(day_number)),
            )));
        }

        let highlight_terms = text_clause
            .as_ref()
            .map(|c| c.highlight_terms.clone())
            .unwrap_or_default();
        let order = if text_clause.is_some() {
            SortOrder::Relevance
        } else {
            SortOrder::Id
        };

        let query: Box<dyn Query> = match (text_clause, filter_clauses.is_empty()) {
            (Some(clause), true) => clause.query,
            (None, true) => Box::new(AllQuery),
            (text_clause, false) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                if let Some(clause) = text_clause {
                    clauses.push((Occur::Must, clause.query));
                }
                for filter in filter_clauses {
                    clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(filter, 0.0))));
                }
                Box::new(BooleanQuery::new(clauses))
            }
        };

        let hits = self
            .index
            .search(query.as_ref(), page.offset(), page.size, order)?;

        debug!(
            "Advanced search {:?} (page={}, size={}): {} hits in {:?}",
            filters,
            page.page,
            page.size,
            hits.len(),
            start.elapsed()
        );
        Ok(to_hits(hits, &highlight_terms))
    }

    /// Single indexed document by id
    pub fn get(&self, id: EquipmentId) -> SearchResult<Option<EquipmentDoc>> {
        Ok(self.index.get(id)?)
    }

    /// Number of indexed documents
    pub fn count(&self) -> u64 {
        self.index.count()
    }

    /// Best-field disjunction over the weighted text fields. Each analyzed
    /// token matches exactly (scored) or fuzzily within its automatic edit
    /// distance.
    fn text_clause(&self, text: &str) -> SearchResult<Option<TextClause>> {
        let f = *self.index.fields();
        let weighted: [(Field, f32); 6] = [
            (f.asset_number, 3.0),
            (f.brand, 2.0),
            (f.model, 2.0),
            (f.responsible, 1.0),
            (f.location, 1.0),
            (f.description, 1.0),
        ];

        let mut per_field: Vec<Box<dyn Query>> = Vec::with_capacity(weighted.len());
        let mut highlight_terms = Vec::new();

        for (field, boost) in weighted {
            let tokens = self.index.analyze(field, text)?;
            if tokens.is_empty() {
                continue;
            }
            if field == f.description {
                highlight_terms = tokens.clone();
            }

            let token_clauses: Vec<(Occur, Box<dyn Query>)> = tokens
                .iter()
                .map(|token| (Occur::Should, token_query(field, token)))
                .collect();
            per_field.push(Box::new(BoostQuery::new(
                Box::new(BooleanQuery::new(token_clauses)),
                boost,
            )));
        }

        if per_field.is_empty() {
            return Ok(None);
        }

        Ok(Some(TextClause {
            query: Box::new(DisjunctionMaxQuery::new(per_field)),
            highlight_terms,
        }))
    }
}

fn token_query(field: Field, token: &str) -> Box<dyn Query> {
    let term = Term::from_field_text(field, token);
    let distance = auto_fuzziness(token.chars().count());

    let exact_match: Box<dyn Query> =
        Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs));
    if distance == 0 {
        return exact_match;
    }

    let fuzzy_match: Box<dyn Query> = Box::new(FuzzyTermQuery::new(term, distance, true));
    Box::new(BooleanQuery::new(vec![
        (Occur::Should, exact_match),
        (Occur::Should, fuzzy_match),
    ]))
}

fn exact(field: Field, value: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, value),
        IndexRecordOption::Basic,
    ))
}

fn inclusive<T>(bound: Option<T>) -> Bound<T> {
    match bound {
        Some(value) => Bound::Included(value),
        None => Bound::Unbounded,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn check_length(text: &str) -> SearchResult<()> {
    if text.len() > MAX_QUERY_LENGTH {
        return Err(SearchError::validation(format!(
            "query length {} exceeds maximum of {} bytes",
            text.len(),
            MAX_QUERY_LENGTH
        )));
    }
    Ok(())
}

fn check_window(page: Pagination) -> SearchResult<()> {
    match page.window_end() {
        Some(end) if end <= MAX_RESULT_WINDOW => Ok(()),
        _ => Err(SearchError::validation(format!(
            "page {} of size {} is beyond the result window of {}",
            page.page, page.size, MAX_RESULT_WINDOW
        ))),
    }
}

fn parse_date(name: &str, value: &Option<String>) -> SearchResult<Option<NaiveDate>> {
    match non_blank(value) {
        Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| {
                SearchError::validation(format!(
                    "{} must be an ISO date (YYYY-MM-DD), got '{}'",
                    name, raw
                ))
            }),
        None => Ok(None),
    }
}

fn to_hits(hits: Vec<ScoredDoc>, highlight_terms: &[String]) -> Vec<SearchHit> {
    hits.into_iter()
        .map(|hit| SearchHit {
            highlight: highlight(&hit.document.description, highlight_terms),
            score: hit.score,
            document: hit.document,
        })
        .collect()
}
