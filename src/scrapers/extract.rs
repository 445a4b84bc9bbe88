//! Round extraction from a score detail page.
//!
//! Required fields (date, golf place name) fault when every lookup expression
//! misses. Everything else degrades: a missing row becomes an empty sequence
//! and an unreadable cell becomes the no-data sentinel, noted in the
//! [`ParseReport`].

use crate::diagnostics::{Artifact, DiagnosticsSink};
use crate::error::ScrapeError;
use crate::models::{HOLES_PER_ROUND, HoleMark, HoleStat, RoundRecord};
use crate::selectors::{self, FieldSelectors, GOLF_PLACE_BREADCRUMB, HoleRow, ScoreDetailSelectors};
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument, warn};

/// Width of `YYYY/MM/DD`.
pub const MIN_DATE_WIDTH: usize = 10;

const HOLES_PER_HALF: usize = HOLES_PER_ROUND / 2;

static COURSE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*)コース").expect("valid regex"));

/// A cell that could not be read and was stored as the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub field: &'static str,
    pub hole: usize,
    pub raw: String,
}

/// Cells that fell back to the sentinel while extracting one page.
#[derive(Debug, Default, Clone)]
pub struct ParseReport {
    pub issues: Vec<ParseIssue>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Year, month and day sliced from fixed offsets of `YYYY/MM/DD`.
///
/// Offsets are character positions, so full-width separators don't shift them.
pub fn split_date(text: &str) -> Option<(String, String, String)> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.len() < MIN_DATE_WIDTH {
        return None;
    }
    let slice = |a: usize, b: usize| chars[a..b].iter().collect::<String>();
    Some((slice(0, 4), slice(5, 7), slice(8, 10)))
}

/// `"Name(Prefecture)"` into its two parts. Full-width parentheses are accepted.
pub fn split_golf_place(text: &str) -> (String, String) {
    let text = text.trim();
    match text.find(['(', '（']) {
        Some(pos) => {
            let name = text[..pos].trim().to_string();
            let rest = &text[pos..];
            let rest = rest.trim_start_matches(['(', '（']);
            let prefecture = rest.trim_end_matches([')', '）']).trim().to_string();
            (name, prefecture)
        }
        None => (text.to_string(), String::new()),
    }
}

/// `"OUTコース"` → `"OUT"`; anything without the suffix is returned as is.
pub fn course_name(text: &str) -> String {
    let text = text.trim();
    COURSE_SUFFIX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.to_string())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// True when the page renders the explicit no-data marker. A page that
/// merely lacks the detail block is not empty; see [`read_page`].
pub fn is_empty_state(html: &Html) -> Result<bool, ScrapeError> {
    let table = selectors::score_detail()?;
    Ok(table.empty_state.select_first(html).is_some())
}

/// Builds one [`RoundRecord`] from a parsed page.
pub struct RoundExtractor<'a> {
    table: &'static ScoreDetailSelectors,
    html: &'a Html,
    url: &'a str,
    report: ParseReport,
}

impl<'a> RoundExtractor<'a> {
    pub fn new(html: &'a Html, url: &'a str) -> Result<Self, ScrapeError> {
        Ok(RoundExtractor {
            table: selectors::score_detail()?,
            html,
            url,
            report: ParseReport::default(),
        })
    }

    fn required(&self, sel: &FieldSelectors) -> Result<(usize, ElementRef<'a>), ScrapeError> {
        sel.select_first(self.html).ok_or(ScrapeError::RequiredField {
            field: sel.field,
            url: self.url.to_string(),
        })
    }

    fn optional_text(&self, sel: &FieldSelectors) -> String {
        match sel.select_first(self.html) {
            Some((_, el)) => element_text(el),
            None => {
                debug!(field = sel.field, "Optional field absent");
                String::new()
            }
        }
    }

    /// Cells of one half-row, at most nine. Missing row yields nothing.
    fn half_cells(&self, sel: &FieldSelectors) -> Vec<ElementRef<'a>> {
        sel.select_all(self.html)
            .into_iter()
            .next()
            .map(|row| row.select(&self.table.cell).take(HOLES_PER_HALF).collect())
            .unwrap_or_default()
    }

    fn row_cells(&self, row: &HoleRow) -> Vec<ElementRef<'a>> {
        let mut cells = self.half_cells(&row.former);
        cells.extend(self.half_cells(&row.latter));
        cells
    }

    fn parse_stats(&mut self, field: &'static str, cells: &[ElementRef<'_>]) -> Vec<HoleStat> {
        cells
            .iter()
            .enumerate()
            .map(|(hole, cell)| {
                let raw = element_text(*cell);
                HoleStat::from_cell(&raw).unwrap_or_else(|| {
                    debug!(field, hole = hole + 1, %raw, "Unreadable cell stored as no data");
                    self.report.issues.push(ParseIssue { field, hole: hole + 1, raw });
                    HoleStat::NoData
                })
            })
            .collect()
    }

    fn stat_row(&mut self, row: &HoleRow) -> Vec<HoleStat> {
        let cells = self.row_cells(row);
        self.parse_stats(row.former.field, &cells)
    }

    fn text_row(&self, row: &HoleRow) -> Vec<HoleMark> {
        self.row_cells(row)
            .into_iter()
            .map(|cell| HoleMark::from_text(&element_text(cell)))
            .collect()
    }

    /// Rows whose value lives in the cell's class list (fairway keep, one-on).
    fn class_row(&self, row: &HoleRow) -> Vec<HoleMark> {
        self.row_cells(row)
            .into_iter()
            .map(|cell| {
                let class = cell.value().attr("class").unwrap_or_default();
                if class.split_whitespace().any(|c| c == "is-void") {
                    HoleMark::NoData
                } else {
                    HoleMark::from_text(class)
                }
            })
            .collect()
    }

    fn companions(&mut self) -> (Vec<String>, Vec<Vec<HoleStat>>) {
        let table = self.table;
        let member = &table.member;
        let former_rows = member.former.select_all(self.html);
        let latter_rows = member.latter.select_all(self.html);

        let names: Vec<String> = former_rows
            .iter()
            .map(|row| {
                row.select(&table.member_name)
                    .next()
                    .map(element_text)
                    .unwrap_or_default()
            })
            .collect();

        let mut scores = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            let mut cells: Vec<ElementRef<'_>> = former_rows[i]
                .select(&table.cell)
                .take(HOLES_PER_HALF)
                .collect();
            if let Some(row) = latter_rows.get(i) {
                cells.extend(row.select(&table.cell).take(HOLES_PER_HALF));
            }
            scores.push(self.parse_stats(member.former.field, &cells));
        }
        (names, scores)
    }

    /// Extract the round, consuming the extractor.
    pub fn extract(mut self) -> Result<(RoundRecord, ParseReport), ScrapeError> {
        let (_, date_el) = self.required(&self.table.date)?;
        let date_text = element_text(date_el);
        let (year, month, day) =
            split_date(&date_text).ok_or_else(|| ScrapeError::MalformedDate {
                url: self.url.to_string(),
                text: date_text.clone(),
            })?;

        let (place_idx, place_el) = self.required(&self.table.golf_place_name)?;
        let place_text = element_text(place_el);
        let (golf_place_name, prefecture) = if place_idx == GOLF_PLACE_BREADCRUMB {
            (place_text, String::new())
        } else {
            split_golf_place(&place_text)
        };
        if golf_place_name.is_empty() {
            return Err(ScrapeError::RequiredField {
                field: self.table.golf_place_name.field,
                url: self.url.to_string(),
            });
        }

        let mut record = RoundRecord::new(year, month, day, golf_place_name);
        record.prefecture = prefecture;
        record.weather = self.optional_text(&self.table.weather);
        record.wind = self.optional_text(&self.table.wind);
        record.green = self.optional_text(&self.table.green);
        record.tee = self.optional_text(&self.table.tee);
        record.course_former_half = course_name(&self.optional_text(&self.table.course_former_half));
        record.course_latter_half = course_name(&self.optional_text(&self.table.course_latter_half));

        let table = self.table;
        record.hall_scores = self.stat_row(&table.score);
        record.putt_scores = self.stat_row(&table.putt);
        record.teeshots = self.text_row(&table.teeshot);
        record.fairway_keeps = self.class_row(&table.fairway_keep);
        record.oneons = self.class_row(&table.oneon);
        record.obs = self.stat_row(&table.ob);
        record.bunkers = self.stat_row(&table.bunker);
        record.penaltys = self.stat_row(&table.penalty);
        record.par_scores = self.stat_row(&table.par);
        record.yard_scores = self.stat_row(&table.yard);

        let (names, scores) = self.companions();
        record.set_companions(names, scores);

        Ok((record, self.report))
    }
}

/// Parse `html` and extract one round.
///
/// Unreadable per-hole cells become the no-data sentinel and are logged as a
/// warning; only the date and golf place are required.
///
/// # Arguments
///
/// * `html` - Full document of a score detail page
/// * `url` - Where the page came from, for errors and diagnostics
/// * `diagnostics` - Receives a page snapshot when extraction fails
///
/// # Returns
///
/// The extracted [`RoundRecord`].
///
/// # Errors
///
/// [`ScrapeError::RequiredField`] or [`ScrapeError::MalformedDate`] naming the
/// field and URL; diagnostics are captured before returning.
#[instrument(level = "debug", skip_all, fields(%url))]
pub fn extract_round(
    html: &str,
    url: &str,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<RoundRecord, ScrapeError> {
    let document = Html::parse_document(html);
    extract_document(&document, html, url, diagnostics)
}

/// Like [`extract_round`], but `None` when the page is in the empty state.
///
/// A page with neither the no-data marker nor the detail block is never
/// taken as the end of the history: a login page means the session expired
/// ([`ScrapeError::Auth`]), anything else is a missing `detail_container`.
/// Both capture diagnostics.
#[instrument(level = "debug", skip_all, fields(%url))]
pub fn read_page(
    html: &str,
    url: &str,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<Option<RoundRecord>, ScrapeError> {
    let document = Html::parse_document(html);
    if is_empty_state(&document)? {
        return Ok(None);
    }

    let table = selectors::score_detail()?;
    if table.detail_container.select_first(&document).is_none() {
        let (context, err) = if table.login_link.select_first(&document).is_some() {
            (
                "session_expired",
                ScrapeError::Auth(format!("login page served instead of {url}; session expired")),
            )
        } else {
            (
                table.detail_container.field,
                ScrapeError::RequiredField {
                    field: table.detail_container.field,
                    url: url.to_string(),
                },
            )
        };
        warn!(%context, html = %truncate_for_log(html, 500), "Page is neither a round nor the empty state");
        diagnostics.capture_failure(
            context,
            Artifact {
                url: url.to_string(),
                html: html.to_string(),
            },
        );
        return Err(err);
    }
    extract_document(&document, html, url, diagnostics).map(Some)
}

fn extract_document(
    document: &Html,
    html: &str,
    url: &str,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<RoundRecord, ScrapeError> {
    let result = RoundExtractor::new(document, url).and_then(RoundExtractor::extract);

    match result {
        Ok((record, report)) => {
            if !report.is_clean() {
                warn!(
                    count = report.issues.len(),
                    issues = ?report.issues,
                    "Some cells were unreadable and stored as no data"
                );
            }
            Ok(record)
        }
        Err(e) => {
            let context = match &e {
                ScrapeError::RequiredField { field, .. } => (*field).to_string(),
                ScrapeError::MalformedDate { .. } => "date".to_string(),
                _ => "extract".to_string(),
            };
            debug!(%context, html = %truncate_for_log(html, 500), "Extraction failed on page");
            diagnostics.capture_failure(
                &context,
                Artifact {
                    url: url.to_string(),
                    html: html.to_string(),
                },
            );
            Err(e)
        }
    }
}
