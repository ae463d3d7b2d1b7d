//! Turns [`SearchOptions`] into a validated SQL plan.
//!
//! The plan holds one filter predicate (`FROM ... WHERE ...`) that both the
//! count query and the page query are rendered from, so the total can never
//! disagree with what paging through the results yields.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;

use crate::config::{RelevancyFallback, SearchConfig};
use crate::error::QueryError;
use crate::store::ENTRY_COLUMNS;

use super::options::{AspectBucket, Order, ResolutionMode, SearchOptions, ASPECT_TOLERANCE};

/// What a search is ordered by once planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBasis {
    /// bm25 rank of the text match
    TextRank,
    /// Favorites added since a cutoff
    RecentFavorites,
    Favorites,
    Views,
    Date,
}

/// A validated search, ready to execute.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    from_where: String,
    filter_params: Vec<Value>,
    order_by: String,
    order_params: Vec<Value>,
    pub basis: OrderBasis,
    pub page: u32,
    pub page_size: u32,
}

impl QueryPlan {
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// `(page - 1) * page_size`
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) {}", self.from_where)
    }

    pub fn count_params(&self) -> &[Value] {
        &self.filter_params
    }

    pub fn page_sql(&self) -> String {
        format!(
            "SELECT {ENTRY_COLUMNS} {} ORDER BY {} LIMIT ? OFFSET ?",
            self.from_where, self.order_by
        )
    }

    pub fn page_params(&self) -> Vec<Value> {
        let mut params = self.filter_params.clone();
        params.extend(self.order_params.iter().cloned());
        params.push(Value::Integer(self.limit()));
        params.push(Value::Integer(self.offset()));
        params
    }
}

/// Validates search options and builds [`QueryPlan`]s.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    config: SearchConfig,
}

impl QueryPlanner {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, options: &SearchOptions) -> Result<QueryPlan, QueryError> {
        self.plan_at(options, Utc::now())
    }

    /// Plan relative to a fixed clock, used for the recent-favorites window.
    pub fn plan_at(&self, options: &SearchOptions, now: DateTime<Utc>) -> Result<QueryPlan, QueryError> {
        self.validate(options)?;

        let mut joins = String::new();
        let mut clauses = vec![
            "(e.board & ?) = e.board".to_string(),
            "(e.purity & ?) = e.purity".to_string(),
        ];
        let mut params = vec![
            Value::Integer(i64::from(options.boards.bits())),
            Value::Integer(i64::from(options.purity.bits())),
        ];

        let text = match &options.query {
            Some(q) => match_expression(q),
            None => None,
        };
        if let Some(expr) = &text {
            joins.push_str(" JOIN entry_text ON entry_text.rowid = e.id");
            clauses.push("entry_text MATCH ?".to_string());
            params.push(Value::Text(expr.clone()));
        }

        if let Some(res) = options.resolution {
            let op = match res.mode {
                ResolutionMode::Exact => "=",
                ResolutionMode::AtLeast => ">=",
            };
            clauses.push(format!("e.width {op} ? AND e.height {op} ?"));
            params.push(Value::Integer(i64::from(res.width)));
            params.push(Value::Integer(i64::from(res.height)));
        }

        if let Some(bucket) = options.aspect {
            match (bucket, bucket.canonical_ratio()) {
                (AspectBucket::Portrait, _) => clauses.push("e.width < e.height".to_string()),
                (AspectBucket::Ultrawide, _) => {
                    clauses.push("e.ratio >= ?".to_string());
                    params.push(Value::Real(super::options::ULTRAWIDE_MIN_RATIO));
                }
                (_, Some(ratio)) => {
                    clauses.push("e.ratio BETWEEN ? AND ?".to_string());
                    params.push(Value::Real(ratio - ASPECT_TOLERANCE));
                    params.push(Value::Real(ratio + ASPECT_TOLERANCE));
                }
                (_, None) => {}
            }
        }

        let from_where = format!("FROM entries e{joins} WHERE {}", clauses.join(" AND "));
        let (basis, order_by, order_params) = self.ordering(options, text.is_some(), now);

        tracing::trace!(
            "Planned search: {} / ORDER BY {} ({:?})",
            from_where,
            order_by,
            basis
        );

        Ok(QueryPlan {
            from_where,
            filter_params: params,
            order_by,
            order_params,
            basis,
            page: options.page,
            page_size: options.page_size,
        })
    }

    fn validate(&self, options: &SearchOptions) -> Result<(), QueryError> {
        let malformed = |msg: String| Err(QueryError::MalformedQuery(msg));

        if options.page < 1 {
            return malformed("page numbers start at 1".into());
        }
        if !self.config.page_sizes.contains(&options.page_size) {
            return malformed(format!(
                "page size {} is not one of {:?}",
                options.page_size, self.config.page_sizes
            ));
        }
        if options.boards.is_empty() {
            return malformed("at least one board must be requested".into());
        }
        if options.purity.is_empty() {
            return malformed("at least one purity level must be requested".into());
        }
        if let Some(q) = &options.query {
            let len = q.chars().count();
            if len > self.config.max_query_len {
                return malformed(format!(
                    "query is {} characters, limit is {}",
                    len, self.config.max_query_len
                ));
            }
            if !q.trim().is_empty() && match_expression(q).is_none() {
                return malformed(format!("query '{q}' has no searchable terms"));
            }
        }
        if let Some(res) = options.resolution {
            if res.width == 0 || res.height == 0 {
                return malformed("resolution dimensions must be non-zero".into());
            }
        }
        Ok(())
    }

    /// Every ordering ends with an id tie-break in the same direction.
    fn ordering(
        &self,
        options: &SearchOptions,
        has_text: bool,
        now: DateTime<Utc>,
    ) -> (OrderBasis, String, Vec<Value>) {
        let dir = options.direction.sql();
        let by = |expr: &str| format!("{expr} {dir}, e.id {dir}");

        match options.order {
            Order::Date => (OrderBasis::Date, by("e.created_at"), vec![]),
            Order::Views => (OrderBasis::Views, by("e.views"), vec![]),
            Order::Favorites => (OrderBasis::Favorites, by("e.favorites"), vec![]),
            Order::Relevancy if has_text => {
                // bm25 is lower for better matches.
                let rank_dir = options.direction.reverse().sql();
                (
                    OrderBasis::TextRank,
                    format!("bm25(entry_text) {rank_dir}, e.id {dir}"),
                    vec![],
                )
            }
            Order::Relevancy => match self.config.relevancy_fallback {
                RelevancyFallback::RecentFavorites => {
                    let cutoff = now - Duration::days(i64::from(self.config.recent_window_days));
                    (
                        OrderBasis::RecentFavorites,
                        by("(SELECT COUNT(*) FROM favorites f WHERE f.entry_id = e.id AND f.created_at >= ?)"),
                        vec![Value::Integer(cutoff.timestamp())],
                    )
                }
                RelevancyFallback::Favorites => (OrderBasis::Favorites, by("e.favorites"), vec![]),
                RelevancyFallback::Views => (OrderBasis::Views, by("e.views"), vec![]),
                RelevancyFallback::Date => (OrderBasis::Date, by("e.created_at"), vec![]),
            },
        }
    }
}

/// FTS5 expression for a free-text query: each alphanumeric run becomes a
/// quoted term, all required. `None` if the query has no terms.
pub fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{Board, BoardSet, Purity, PuritySet};
    use crate::search::options::ResolutionFilter;

    fn planner() -> QueryPlanner {
        QueryPlanner::new(SearchConfig::default())
    }

    fn malformed(options: &SearchOptions) -> bool {
        matches!(planner().plan(options), Err(QueryError::MalformedQuery(_)))
    }

    #[test]
    fn test_offset_from_page() {
        let plan = planner()
            .plan(&SearchOptions {
                page: 2,
                page_size: 24,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(plan.offset(), 24);
        assert_eq!(plan.limit(), 24);
    }

    #[test]
    fn test_rejects_invalid_options() {
        assert!(malformed(&SearchOptions {
            page: 0,
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            page_size: 25,
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            boards: BoardSet::empty(),
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            purity: PuritySet::empty(),
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            query: Some("!!! ???".into()),
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            query: Some("a".repeat(1000)),
            ..Default::default()
        }));
        assert!(malformed(&SearchOptions {
            resolution: Some(ResolutionFilter::exact(0, 600)),
            ..Default::default()
        }));
    }

    #[test]
    fn test_count_and_page_share_predicate() {
        let plan = planner()
            .plan(&SearchOptions {
                boards: BoardSet::only(Board::General),
                purity: [Purity::Sfw, Purity::Sketchy].into_iter().collect(),
                query: Some("blue sky".into()),
                resolution: Some(ResolutionFilter::at_least(1920, 1080)),
                aspect: Some(AspectBucket::Ratio16x9),
                ..Default::default()
            })
            .unwrap();

        let count = plan.count_sql();
        let page = plan.page_sql();
        let predicate = count.trim_start_matches("SELECT COUNT(*) ");
        assert!(page.contains(predicate));
        assert!(predicate.contains("entry_text MATCH ?"));
        assert!(predicate.contains("e.width >= ? AND e.height >= ?"));
        assert!(predicate.contains("e.ratio BETWEEN ? AND ?"));

        // board, purity, match, width, height, ratio lo, ratio hi
        assert_eq!(plan.count_params().len(), 7);
        assert_eq!(plan.page_params().len(), 9);
        assert_eq!(plan.count_params()[2], Value::Text("\"blue\" \"sky\"".into()));
    }

    #[test]
    fn test_relevancy_uses_text_rank_with_query() {
        let plan = planner()
            .plan(&SearchOptions {
                query: Some("sunset".into()),
                order: Order::Relevancy,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(plan.basis, OrderBasis::TextRank);
        assert!(plan.page_sql().contains("bm25(entry_text) ASC, e.id DESC"));
    }

    #[test]
    fn test_relevancy_falls_back_to_recent_favorites() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let plan = planner()
            .plan_at(
                &SearchOptions {
                    order: Order::Relevancy,
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(plan.basis, OrderBasis::RecentFavorites);
        let params = plan.page_params();
        // filters (2), cutoff, limit, offset
        assert_eq!(params.len(), 5);
        assert_eq!(params[2], Value::Integer(1_700_000_000 - 7 * 86_400));
    }

    #[test]
    fn test_relevancy_fallback_is_configurable() {
        let planner = QueryPlanner::new(SearchConfig {
            relevancy_fallback: RelevancyFallback::Views,
            ..Default::default()
        });
        let plan = planner
            .plan(&SearchOptions {
                order: Order::Relevancy,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(plan.basis, OrderBasis::Views);
        assert!(plan.page_sql().contains("e.views DESC, e.id DESC"));
    }

    #[test]
    fn test_blank_query_is_no_filter() {
        let plan = planner()
            .plan(&SearchOptions {
                query: Some("   ".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(!plan.count_sql().contains("MATCH"));
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(match_expression("Blue-Sky"), Some("\"blue\" \"sky\"".into()));
        assert_eq!(match_expression("\"); DROP"), Some("\"drop\"".into()));
        assert_eq!(match_expression("  "), None);
    }
}
