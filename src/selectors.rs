//! CSS lookup tables for the GDO score site.
//!
//! Each logical field maps to an ordered list of expressions. Lookups try
//! them in order and the first one that matches a node wins, so a layout
//! change on the site usually means adding a fallback here and nothing else.
//!
//! Bump [`TABLE_VERSION`] whenever an expression changes.

use crate::error::ScrapeError;
use once_cell::sync::OnceCell;
use scraper::{ElementRef, Html, Selector};

pub const TABLE_VERSION: &str = "2025.2";

/// Root of the score detail block.
const BASE: &str = "#container > div.score > div.score__container > div.score__main > div.score__detail";

const FORMER_TABLE: &str = "table:nth-child(4)";
const LATTER_TABLE: &str = "table:nth-child(6)";

/// Selectors driven by the browser during login. These are handed to the
/// browser as strings, not parsed locally.
#[derive(Debug, Clone, Copy)]
pub struct LoginSelectors {
    pub login_button: &'static str,
    pub username_input: &'static str,
    pub password_input: &'static str,
    /// Tried in order; the submit control differs between campaign pages.
    pub submit_buttons: &'static [&'static str],
    pub modal_close_button: &'static str,
}

pub const LOGIN: LoginSelectors = LoginSelectors {
    login_button: "a.button.button--login",
    username_input: "input[name='username']",
    password_input: "input[name='password']",
    submit_buttons: &[
        ".parts_submit_btn input[type=\"image\"]",
        ".parts_submit_btn input[type=\"submit\"]",
        "input[type=\"submit\"]",
        "button[type=\"submit\"]",
    ],
    modal_close_button: "#karte-5322018 button",
};

/// One logical field and its parsed lookup expressions, in priority order.
#[derive(Debug)]
pub struct FieldSelectors {
    pub field: &'static str,
    exprs: Vec<(String, Selector)>,
}

impl FieldSelectors {
    pub fn new(field: &'static str, exprs: &[String]) -> Result<Self, ScrapeError> {
        let exprs = exprs
            .iter()
            .map(|expr| {
                Selector::parse(expr)
                    .map(|sel| (expr.clone(), sel))
                    .map_err(|e| ScrapeError::Selector {
                        selector: expr.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldSelectors { field, exprs })
    }

    /// First matching node and the index of the expression that found it.
    pub fn select_first<'a>(&self, root: &'a Html) -> Option<(usize, ElementRef<'a>)> {
        self.exprs
            .iter()
            .enumerate()
            .find_map(|(i, (_, sel))| root.select(sel).next().map(|el| (i, el)))
    }

    /// All nodes matched by the first expression that matches anything.
    pub fn select_all<'a>(&self, root: &'a Html) -> Vec<ElementRef<'a>> {
        self.exprs
            .iter()
            .map(|(_, sel)| root.select(sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.exprs.iter().map(|(expr, _)| expr.as_str())
    }
}

/// A per-hole row split across the front-nine and back-nine tables.
#[derive(Debug)]
pub struct HoleRow {
    pub former: FieldSelectors,
    pub latter: FieldSelectors,
}

impl HoleRow {
    fn new(field: &'static str, row_class: &str) -> Result<Self, ScrapeError> {
        Ok(HoleRow {
            former: FieldSelectors::new(field, &half_row(FORMER_TABLE, row_class))?,
            latter: FieldSelectors::new(field, &half_row(LATTER_TABLE, row_class))?,
        })
    }
}

fn half_row(table: &str, row_class: &str) -> Vec<String> {
    vec![
        format!("{BASE} {table} > tbody > tr.{row_class}"),
        format!("div.score__detail {table} tr.{row_class}"),
    ]
}

fn detail(exprs: &[&str]) -> Vec<String> {
    exprs.iter().map(|e| format!("{BASE} {e}")).collect()
}

/// Lookup table for the score detail page.
#[derive(Debug)]
pub struct ScoreDetailSelectors {
    pub detail_container: FieldSelectors,
    pub empty_state: FieldSelectors,
    /// Shown instead of the detail block once the session has expired.
    pub login_link: FieldSelectors,

    pub date: FieldSelectors,
    /// Link, then manual-entry div, then breadcrumb. The breadcrumb carries no
    /// prefecture.
    pub golf_place_name: FieldSelectors,

    pub weather: FieldSelectors,
    pub wind: FieldSelectors,
    pub green: FieldSelectors,
    pub tee: FieldSelectors,

    pub course_former_half: FieldSelectors,
    pub course_latter_half: FieldSelectors,

    pub score: HoleRow,
    pub putt: HoleRow,
    pub teeshot: HoleRow,
    pub fairway_keep: HoleRow,
    pub oneon: HoleRow,
    pub ob: HoleRow,
    pub bunker: HoleRow,
    pub penalty: HoleRow,
    pub par: HoleRow,
    pub yard: HoleRow,
    pub member: HoleRow,

    pub member_name: Selector,
    pub cell: Selector,
}

/// Index of the breadcrumb expression within `golf_place_name`.
pub const GOLF_PLACE_BREADCRUMB: usize = 2;

impl ScoreDetailSelectors {
    fn build() -> Result<Self, ScrapeError> {
        let parse = |expr: &str| {
            Selector::parse(expr).map_err(|e| ScrapeError::Selector {
                selector: expr.to_string(),
                reason: e.to_string(),
            })
        };

        Ok(ScoreDetailSelectors {
            detail_container: FieldSelectors::new(
                "detail_container",
                &[BASE.to_string(), "div.score__detail".to_string()],
            )?,
            empty_state: FieldSelectors::new(
                "empty_state",
                &[
                    ".score__detail .score__nodata".to_string(),
                    ".score__nodata".to_string(),
                    ".score__detail__empty".to_string(),
                ],
            )?,
            login_link: FieldSelectors::new("login_link", &[LOGIN.login_button.to_string()])?,
            date: FieldSelectors::new(
                "date",
                &[
                    detail(&[".score__detail__place__info > p"]),
                    vec![
                        ".score__detail__place__info > p".to_string(),
                        ".score__detail__date".to_string(),
                    ],
                ]
                .concat(),
            )?,
            golf_place_name: FieldSelectors::new(
                "golf_place_name",
                &[
                    format!("{BASE} .score__detail__place__info > a"),
                    format!("{BASE} .score__detail__place__info > div"),
                    "#container > div.score > div.score__breadcrumb > ul > li:nth-child(4) > span"
                        .to_string(),
                ],
            )?,
            weather: FieldSelectors::new(
                "weather",
                &detail(&[".score__detail__place__info__list__item.is-weather"]),
            )?,
            wind: FieldSelectors::new(
                "wind",
                &detail(&[".score__detail__place__info__list__item.is-wind"]),
            )?,
            green: FieldSelectors::new(
                "green",
                &detail(&[".score__detail__place__info__list__item.is-green"]),
            )?,
            tee: FieldSelectors::new(
                "tee",
                &detail(&[".score__detail__place__info__list__item.is-tee"]),
            )?,
            course_former_half: FieldSelectors::new(
                "course_former_half",
                &[format!("{BASE} {FORMER_TABLE} > caption")],
            )?,
            course_latter_half: FieldSelectors::new(
                "course_latter_half",
                &[format!("{BASE} {LATTER_TABLE} > caption")],
            )?,
            score: HoleRow::new("hall_scores", "is-myscore")?,
            putt: HoleRow::new("putt_scores", "is-putt")?,
            teeshot: HoleRow::new("teeshots", "is-teeshot")?,
            fairway_keep: HoleRow::new("fairway_keeps", "is-fairway-keep")?,
            oneon: HoleRow::new("oneons", "is-oneon")?,
            ob: HoleRow::new("obs", "is-ob")?,
            bunker: HoleRow::new("bunkers", "is-bunker")?,
            penalty: HoleRow::new("penaltys", "is-penalty")?,
            par: HoleRow::new("par_scores", "is-par")?,
            yard: HoleRow::new("yard_scores", "is-yard")?,
            member: HoleRow::new("accompany_member_scores", "is-member")?,
            member_name: parse("th")?,
            cell: parse("td")?,
        })
    }
}

static SCORE_DETAIL: OnceCell<ScoreDetailSelectors> = OnceCell::new();

/// The score detail table, parsed on first use.
pub fn score_detail() -> Result<&'static ScoreDetailSelectors, ScrapeError> {
    SCORE_DETAIL.get_or_try_init(ScoreDetailSelectors::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builds() {
        let table = score_detail().expect("selector table should parse");
        assert_eq!(table.date.field, "date");
        assert_eq!(table.golf_place_name.expressions().count(), 3);
        assert!(table.date.expressions().next().unwrap().starts_with("#container"));
    }

    #[test]
    fn test_first_matching_expression_wins() {
        let sel = FieldSelectors::new(
            "title",
            &["h1.missing".to_string(), "h2".to_string(), "p".to_string()],
        )
        .unwrap();
        let html = Html::parse_document("<h2>second</h2><p>third</p>");
        let (idx, el) = sel.select_first(&html).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(el.text().collect::<String>(), "second");
    }

    #[test]
    fn test_all_expressions_absent() {
        let sel = FieldSelectors::new("title", &["h1".to_string(), "h2".to_string()]).unwrap();
        let html = Html::parse_document("<p>nothing</p>");
        assert!(sel.select_first(&html).is_none());
        assert!(sel.select_all(&html).is_empty());
    }

    #[test]
    fn test_invalid_expression_is_reported() {
        let err = FieldSelectors::new("bad", &["td:::".to_string()]).unwrap_err();
        assert!(matches!(err, ScrapeError::Selector { .. }));
    }
}
