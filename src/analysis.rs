//! Cleanup and summary statistics over collected score files.
//!
//! - [`Normalizer`]: maps course and prefecture spellings onto canonical names
//! - [`RoundSummary`]: per-round totals, green-on rates and score outcomes
//!   on holes with an OB, a penalty or a bunker shot
//! - [`Report`]: merged, de-duplicated, date-ordered rounds with aggregates
//!   (overall, per weather, per wind, per month) rendered as plain-text tables

use crate::error::OutputError;
use crate::models::{HoleStat, RoundRecord};
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::ops::Add;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const GOLF_PLACE_MAPPING_FILE: &str = "golf_place_name_mapping.json";
pub const PREFECTURE_MAPPING_FILE: &str = "prefecture_mapping.yaml";
pub const DEFAULT_ROLLING_WINDOW: usize = 5;

static TEE_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*【[^】]*】\s*").expect("valid regex"));

/// Canonical-name lookups. Unknown names map to themselves.
#[derive(Debug, Default, Clone)]
pub struct Normalizer {
    golf_places: HashMap<String, String>,
    prefectures: HashMap<String, String>,
}

impl Normalizer {
    /// Load mapping files from `dir`. Either file may be absent.
    #[instrument(level = "debug", skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self, OutputError> {
        let golf_places = match read_optional(&dir.join(GOLF_PLACE_MAPPING_FILE))? {
            Some((path, text)) => serde_json::from_str(&text)
                .map_err(|source| OutputError::Json { path, source })?,
            None => HashMap::new(),
        };
        let prefectures = match read_optional(&dir.join(PREFECTURE_MAPPING_FILE))? {
            // An empty YAML document is an empty mapping.
            Some((path, text)) => serde_yaml::from_str::<Option<HashMap<String, String>>>(&text)
                .map_err(|source| OutputError::Yaml { path, source })?
                .unwrap_or_default(),
            None => HashMap::new(),
        };
        info!(
            golf_places = golf_places.len(),
            prefectures = prefectures.len(),
            "Loaded name mappings"
        );
        Ok(Normalizer { golf_places, prefectures })
    }

    pub fn golf_place_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.golf_places.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn prefecture<'a>(&'a self, prefecture: &'a str) -> &'a str {
        self.prefectures.get(prefecture).map(String::as_str).unwrap_or(prefecture)
    }

    /// Rewrite the name fields of `record` in place.
    pub fn apply(&self, record: &mut RoundRecord) {
        record.golf_place_name = self.golf_place_name(&record.golf_place_name).to_string();
        record.prefecture = self.prefecture(&record.prefecture).to_string();
        record.course_former_half = clean_course_name(&record.course_former_half);
        record.course_latter_half = clean_course_name(&record.course_latter_half);
    }
}

fn read_optional(path: &Path) -> Result<Option<(std::path::PathBuf, String)>, OutputError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some((path.to_path_buf(), text))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Mapping file not found; using identity mapping");
            Ok(None)
        }
        Err(source) => Err(OutputError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Drop `【...】` tee annotations: `"IN 【REGULARティー】"` → `"IN"`.
pub fn clean_course_name(name: &str) -> String {
    TEE_ANNOTATION.replace_all(name, "").trim().to_string()
}

/// Totals and rates for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub date: NaiveDate,
    pub golf_place_name: String,
    pub prefecture: String,
    /// Sum of recorded hole scores; `None` when no hole has one.
    pub total_score: Option<i32>,
    pub total_putt: Option<i32>,
    pub total_ob: i32,
    pub total_bunker: i32,
    pub total_penalty: i32,
    /// Share of holes on the green in regulation (`shots_to_green <= par - 2`).
    pub par_on_rate: Option<f64>,
    /// Share of holes on the green by `shots_to_green <= par`.
    pub bogey_on_rate: Option<f64>,
    /// Share of holes on the green by `shots_to_green <= par - 1`.
    pub one_on_rate: Option<f64>,
    pub weather: String,
    pub wind: String,
    pub conditional_rates: ConditionalRates,
}

/// Score outcomes on the holes where some trouble event happened.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TroubleOutcomes {
    /// Holes with a nonzero event count and valid score and par.
    pub holes: u32,
    pub par: u32,
    pub bogey: u32,
    pub double_bogey: u32,
}

impl TroubleOutcomes {
    fn tally(events: &[HoleStat], scores: &[HoleStat], pars: &[HoleStat]) -> TroubleOutcomes {
        let mut t = TroubleOutcomes::default();
        for ((event, score), par) in events.iter().zip(scores).zip(pars) {
            let (Some(n), Some(score), Some(par)) = (event.value(), score.value(), par.value()) else {
                continue;
            };
            if n == 0 {
                continue;
            }
            t.holes += 1;
            match score - par {
                0 => t.par += 1,
                1 => t.bogey += 1,
                2 => t.double_bogey += 1,
                _ => {}
            }
        }
        t
    }

    fn share(&self, n: u32) -> Option<f64> {
        (self.holes > 0).then(|| f64::from(n) / f64::from(self.holes))
    }

    pub fn par_rate(&self) -> Option<f64> {
        self.share(self.par)
    }

    pub fn bogey_rate(&self) -> Option<f64> {
        self.share(self.bogey)
    }

    pub fn double_bogey_rate(&self) -> Option<f64> {
        self.share(self.double_bogey)
    }
}

impl Add for TroubleOutcomes {
    type Output = TroubleOutcomes;

    fn add(self, other: TroubleOutcomes) -> TroubleOutcomes {
        TroubleOutcomes {
            holes: self.holes + other.holes,
            par: self.par + other.par,
            bogey: self.bogey + other.bogey,
            double_bogey: self.double_bogey + other.double_bogey,
        }
    }
}

/// [`TroubleOutcomes`] for OB, penalty and bunker holes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConditionalRates {
    pub ob: TroubleOutcomes,
    pub penalty: TroubleOutcomes,
    pub bunker: TroubleOutcomes,
}

impl ConditionalRates {
    fn from_record(record: &RoundRecord) -> ConditionalRates {
        let tally = |events: &[HoleStat]| TroubleOutcomes::tally(events, &record.hall_scores, &record.par_scores);
        ConditionalRates {
            ob: tally(&record.obs),
            penalty: tally(&record.penaltys),
            bunker: tally(&record.bunkers),
        }
    }
}

impl Add for ConditionalRates {
    type Output = ConditionalRates;

    fn add(self, other: ConditionalRates) -> ConditionalRates {
        ConditionalRates {
            ob: self.ob + other.ob,
            penalty: self.penalty + other.penalty,
            bunker: self.bunker + other.bunker,
        }
    }
}

fn sum_recorded(stats: &[HoleStat]) -> Option<i32> {
    stats.iter().filter_map(|s| s.value()).reduce(|a, b| a + b)
}

fn sum_or_zero(stats: &[HoleStat]) -> i32 {
    stats.iter().filter_map(|s| s.value()).sum()
}

impl RoundSummary {
    /// `None` when the record's date fields do not form a calendar date.
    pub fn from_record(record: &RoundRecord) -> Option<RoundSummary> {
        let date = record.date()?;

        let mut valid = 0u32;
        let (mut par_on, mut bogey_on, mut one_on) = (0u32, 0u32, 0u32);
        let holes = record
            .hall_scores
            .iter()
            .zip(&record.putt_scores)
            .zip(&record.par_scores);
        for ((score, putt), par) in holes {
            let (Some(score), Some(putt), Some(par)) = (score.value(), putt.value(), par.value())
            else {
                continue;
            };
            valid += 1;
            let shots_to_green = score - putt;
            par_on += u32::from(shots_to_green <= par - 2);
            one_on += u32::from(shots_to_green <= par - 1);
            bogey_on += u32::from(shots_to_green <= par);
        }
        let rate = |n: u32| (valid > 0).then(|| f64::from(n) / f64::from(valid));

        Some(RoundSummary {
            date,
            golf_place_name: record.golf_place_name.clone(),
            prefecture: record.prefecture.clone(),
            total_score: sum_recorded(&record.hall_scores),
            total_putt: sum_recorded(&record.putt_scores),
            total_ob: sum_or_zero(&record.obs),
            total_bunker: sum_or_zero(&record.bunkers),
            total_penalty: sum_or_zero(&record.penaltys),
            par_on_rate: rate(par_on),
            bogey_on_rate: rate(bogey_on),
            one_on_rate: rate(one_on),
            weather: record.weather.trim().to_string(),
            wind: record.wind.trim().to_string(),
            conditional_rates: ConditionalRates::from_record(record),
        })
    }
}

/// Aggregate statistics over total scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreStats {
    pub rounds: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two rounds.
    pub std_dev: Option<f64>,
    pub best: i32,
    pub worst: i32,
    pub mean_putts: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std_dev(values: &[f64], avg: f64) -> Option<f64> {
    (values.len() > 1).then(|| {
        let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
        var.sqrt()
    })
}

/// Round count and total-score spread for one group of rounds.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub rounds: usize,
    /// Over the rounds with a total score.
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl GroupStats {
    fn of(rounds: &[&RoundSummary]) -> GroupStats {
        let scores: Vec<f64> = rounds.iter().filter_map(|r| r.total_score).map(f64::from).collect();
        let avg = mean(&scores);
        GroupStats {
            rounds: rounds.len(),
            mean: avg,
            std_dev: avg.and_then(|m| sample_std_dev(&scores, m)),
        }
    }
}

/// Display order for known labels; anything else follows in text order.
const WEATHER_ORDER: [&str; 4] = ["晴れ", "曇り", "雨", "雪"];
const WIND_ORDER: [&str; 4] = ["微風", "弱", "中", "強"];

/// Rounds from one or more score files, ready to summarize.
#[derive(Debug, Clone)]
pub struct Report {
    rounds: Vec<RoundSummary>,
}

impl Report {
    /// Merge, de-duplicate (first occurrence of a date and course wins),
    /// normalize, filter by year and sort by date.
    #[instrument(level = "info", skip_all, fields(input = records.len()))]
    pub fn build(
        records: Vec<RoundRecord>,
        years: Option<&BTreeSet<i32>>,
        normalizer: &Normalizer,
    ) -> Report {
        let mut rounds: Vec<RoundSummary> = records
            .into_iter()
            .unique_by(|r| (r.year.clone(), r.month.clone(), r.day.clone(), r.golf_place_name.clone()))
            .filter_map(|mut r| {
                normalizer.apply(&mut r);
                let summary = RoundSummary::from_record(&r);
                if summary.is_none() {
                    warn!(year = %r.year, month = %r.month, day = %r.day, "Skipping round with invalid date");
                }
                summary
            })
            .filter(|s| years.is_none_or(|ys| ys.is_empty() || ys.contains(&s.date.year())))
            .collect();
        rounds.sort_by_key(|s| s.date);
        info!(rounds = rounds.len(), "Report built");
        Report { rounds }
    }

    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    fn scores(&self) -> Vec<i32> {
        self.rounds.iter().filter_map(|r| r.total_score).collect()
    }

    pub fn stats(&self) -> Option<ScoreStats> {
        let scores = self.scores();
        let as_f64: Vec<f64> = scores.iter().map(|&s| f64::from(s)).collect();
        let avg = mean(&as_f64)?;
        let std_dev = sample_std_dev(&as_f64, avg);
        let putts: Vec<f64> = self
            .rounds
            .iter()
            .filter_map(|r| r.total_putt)
            .map(f64::from)
            .collect();
        Some(ScoreStats {
            rounds: scores.len(),
            mean: avg,
            std_dev,
            best: scores.iter().copied().min()?,
            worst: scores.iter().copied().max()?,
            mean_putts: mean(&putts),
        })
    }

    /// Mean total score over each full window of `window` consecutive rounds,
    /// keyed by the date of the window's last round.
    pub fn rolling_mean(&self, window: usize) -> Vec<(NaiveDate, f64)> {
        if window == 0 {
            return Vec::new();
        }
        let scored: Vec<(NaiveDate, f64)> = self
            .rounds
            .iter()
            .filter_map(|r| r.total_score.map(|s| (r.date, f64::from(s))))
            .collect();
        scored
            .windows(window)
            .map(|w| {
                let sum: f64 = w.iter().map(|(_, s)| s).sum();
                (w[window - 1].0, sum / window as f64)
            })
            .collect()
    }

    /// Round counts per 10-stroke bucket, keyed by the bucket's lower bound.
    pub fn histogram(&self) -> BTreeMap<i32, usize> {
        self.scores().into_iter().counts_by(|s| s.div_euclid(10) * 10).into_iter().collect()
    }

    pub fn rounds_per_year(&self) -> BTreeMap<i32, usize> {
        self.rounds.iter().counts_by(|r| r.date.year()).into_iter().collect()
    }

    /// Outcomes on trouble holes, pooled over every round.
    pub fn conditional_rates(&self) -> ConditionalRates {
        self.rounds
            .iter()
            .map(|r| r.conditional_rates)
            .fold(ConditionalRates::default(), Add::add)
    }

    /// Rounds grouped by weather; rounds without one are left out.
    pub fn by_weather(&self) -> Vec<(String, GroupStats)> {
        self.grouped_by_label(|r| r.weather.as_str(), &WEATHER_ORDER)
    }

    /// Rounds grouped by wind; rounds without one are left out.
    pub fn by_wind(&self) -> Vec<(String, GroupStats)> {
        self.grouped_by_label(|r| r.wind.as_str(), &WIND_ORDER)
    }

    pub fn by_month(&self) -> BTreeMap<u32, GroupStats> {
        self.rounds
            .iter()
            .into_group_map_by(|r| r.date.month())
            .into_iter()
            .map(|(month, rounds)| (month, GroupStats::of(&rounds)))
            .collect()
    }

    fn grouped_by_label(
        &self,
        label: impl Fn(&RoundSummary) -> &str,
        order: &[&str],
    ) -> Vec<(String, GroupStats)> {
        self.rounds
            .iter()
            .filter(|r| !label(*r).is_empty())
            .into_group_map_by(|r| label(*r).to_string())
            .into_iter()
            .map(|(key, rounds)| (key, GroupStats::of(&rounds)))
            .sorted_by_key(|(key, _)| {
                let rank = order.iter().position(|o| *o == key.as_str()).unwrap_or(order.len());
                (rank, key.clone())
            })
            .collect()
    }

    /// Plain-text tables for the terminal.
    pub fn render(&self, window: usize) -> String {
        let mut out = String::new();
        let _ = self.render_into(&mut out, window);
        out
    }

    fn render_into(&self, out: &mut String, window: usize) -> std::fmt::Result {
        let pct = |r: Option<f64>| r.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v * 100.0));
        let num = |n: Option<i32>| n.map_or_else(|| "-".to_string(), |v| v.to_string());

        writeln!(out, "Rounds")?;
        writeln!(out, "{:<10}  {:>5}  {:>5}  {:>7}  {:>7}  {}", "date", "score", "putts", "par-on", "bogey-on", "course")?;
        for r in &self.rounds {
            writeln!(
                out,
                "{:<10}  {:>5}  {:>5}  {:>7}  {:>7}  {}",
                r.date,
                num(r.total_score),
                num(r.total_putt),
                pct(r.par_on_rate),
                pct(r.bogey_on_rate),
                r.golf_place_name
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Summary")?;
        match self.stats() {
            Some(s) => {
                writeln!(out, "  rounds      {}", s.rounds)?;
                writeln!(out, "  mean        {:.1}", s.mean)?;
                match s.std_dev {
                    Some(sd) => writeln!(out, "  std-dev     {sd:.1}")?,
                    None => writeln!(out, "  std-dev     -")?,
                }
                writeln!(out, "  best        {}", s.best)?;
                writeln!(out, "  worst       {}", s.worst)?;
                match s.mean_putts {
                    Some(p) => writeln!(out, "  mean putts  {p:.1}")?,
                    None => writeln!(out, "  mean putts  -")?,
                }
            }
            None => writeln!(out, "  no scored rounds")?,
        }

        let rolling = self.rolling_mean(window);
        if !rolling.is_empty() {
            writeln!(out)?;
            writeln!(out, "Rolling mean ({window} rounds)")?;
            for (date, m) in rolling {
                writeln!(out, "  {date}  {m:.1}")?;
            }
        }

        let histogram = self.histogram();
        if !histogram.is_empty() {
            writeln!(out)?;
            writeln!(out, "Score distribution")?;
            for (bucket, count) in histogram {
                writeln!(out, "  {:>3}-{:<3}  {:>3}  {}", bucket, bucket + 9, count, "#".repeat(count))?;
            }
        }

        writeln!(out)?;
        writeln!(out, "Rounds per year")?;
        for (year, count) in self.rounds_per_year() {
            writeln!(out, "  {year}  {count}")?;
        }

        let trouble = self.conditional_rates();
        writeln!(out)?;
        writeln!(out, "Trouble holes")?;
        writeln!(out, "  {:<8}  {:>5}  {:>6}  {:>6}  {:>6}", "event", "holes", "par", "bogey", "double")?;
        for (event, t) in [("OB", trouble.ob), ("penalty", trouble.penalty), ("bunker", trouble.bunker)] {
            writeln!(
                out,
                "  {:<8}  {:>5}  {:>6}  {:>6}  {:>6}",
                event,
                t.holes,
                pct(t.par_rate()),
                pct(t.bogey_rate()),
                pct(t.double_bogey_rate())
            )?;
        }

        let by_weather = self.by_weather();
        if !by_weather.is_empty() {
            writeln!(out)?;
            writeln!(out, "By weather")?;
            for (weather, g) in &by_weather {
                write_group(out, weather, g)?;
            }
        }
        let by_wind = self.by_wind();
        if !by_wind.is_empty() {
            writeln!(out)?;
            writeln!(out, "By wind")?;
            for (wind, g) in &by_wind {
                write_group(out, wind, g)?;
            }
        }
        let by_month = self.by_month();
        if !by_month.is_empty() {
            writeln!(out)?;
            writeln!(out, "By month")?;
            for (month, g) in &by_month {
                write_group(out, &format!("{month:02}"), g)?;
            }
        }
        Ok(())
    }
}

fn write_group(out: &mut String, label: &str, g: &GroupStats) -> std::fmt::Result {
    let fixed = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    writeln!(out, "  {:<6}  {:>3}  {:>6}  {:>6}", label, g.rounds, fixed(g.mean), fixed(g.std_dev))
}
