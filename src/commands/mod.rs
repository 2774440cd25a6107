//! Command implementations for the Faena CLI.
//!
//! Each command returns a result type implementing [`Output`], printed as
//! JSON by default or as text with `-H`. Commands that need the backend run
//! on an [`App`], which owns the backend, the query cache and the
//! notification center.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, UrlSigner};
use crate::config::{ConfigFiles, ResolvedSettings, STATE_KEYS, ValueSource, mask_secret};
use crate::documents::{check_ttl, expiry_after, refresh_interval_secs, sign_with_retry};
use crate::events::{BudgetBus, BudgetChanged, ParametricSync};
use crate::finance::{apply_discount, parse_amount};
use crate::models::{
    DEFAULT_REFERENCE_COLOR, GanttActivity, MAX_MONTH, MatrixOverride, MonthWeek, ParametricLine, ReferenceLine,
    ReferenceLineDraft,
};
use crate::notifications::{NotificationCenter, NotificationLevel, Notifier};
use crate::push::PushPayload;
use crate::schedule::{
    CellSource, Marker, MatrixCell, TimelineLayout, expand_range_to_month_week_cells, markers,
    month_columns, monthly_totals, reconcile, validate_month_week_range, weeks_between,
};
use crate::store::reference_lines::ReferenceLinePatch;
use crate::store::{ActivityStore, OverrideStore, ReferenceLineStore, activities::SyncSummary};
use crate::{Error, Result};

/// How long `budget set` waits for the schedule to resync.
const SYNC_WAIT: Duration = Duration::from_secs(30);

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

/// Parse `MONTH/WEEK` without range checks, so range validation can report them.
fn raw_position(s: &str) -> Result<MonthWeek> {
    let (m, w) = s
        .split_once(['/', '.'])
        .ok_or_else(|| Error::InvalidInput(format!("expected MONTH/WEEK, got '{}'", s)))?;
    let month = m
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid month '{}'", m.trim())))?;
    let week = w
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid week '{}'", w.trim())))?;
    Ok(MonthWeek { month, week })
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("expected YYYY-MM-DD, got '{}'", s)))
}

fn first_of_this_month() -> Result<NaiveDate> {
    let today = Utc::now().date_naive();
    NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
        .ok_or_else(|| Error::Other("could not compute the current month".to_string()))
}

// === Weeks ===

#[derive(Debug, Serialize)]
pub struct WeeksExpanded {
    pub start: MonthWeek,
    pub end: MonthWeek,
    pub weeks: u32,
    pub cells: Vec<MonthWeek>,
}

impl Output for WeeksExpanded {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let cells: Vec<String> = self.cells.iter().map(ToString::to_string).collect();
        format!(
            "{} -> {}: {} week(s)\n  {}",
            self.start,
            self.end,
            self.weeks,
            cells.join(" ")
        )
    }
}

pub fn weeks_expand(start: &str, end: &str) -> Result<WeeksExpanded> {
    let start = raw_position(start)?;
    let end = raw_position(end)?;
    let cells = expand_range_to_month_week_cells(start, end)?;
    Ok(WeeksExpanded {
        start,
        end,
        weeks: weeks_between(start, end),
        cells,
    })
}

#[derive(Debug, Serialize)]
pub struct WeeksBetween {
    pub start: MonthWeek,
    pub end: MonthWeek,
    pub weeks: u32,
}

impl Output for WeeksBetween {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("{} -> {}: {} week(s)", self.start, self.end, self.weeks)
    }
}

pub fn weeks_between_cmd(start: &str, end: &str) -> Result<WeeksBetween> {
    let start = MonthWeek::parse(start)?;
    let end = MonthWeek::parse(end)?;
    Ok(WeeksBetween {
        start,
        end,
        weeks: weeks_between(start, end),
    })
}

#[derive(Debug, Serialize)]
pub struct WeeksValidated {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Output for WeeksValidated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.error {
            None => "Range is valid".to_string(),
            Some(e) => format!("Invalid range: {}", e),
        }
    }
}

pub fn weeks_validate(start: &str, end: &str) -> Result<WeeksValidated> {
    let error = validate_month_week_range(raw_position(start)?, raw_position(end)?).err();
    Ok(WeeksValidated {
        valid: error.is_none(),
        error,
    })
}

// === Push ===

#[derive(Debug, Serialize)]
pub struct PushDecoded {
    pub payload: PushPayload,
    pub click_target: String,
}

impl Output for PushDecoded {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("{}\n{}", self.payload.title, self.payload.body);
        let _ = write!(out, "\n-> {}", self.click_target);
        out
    }
}

pub fn push_decode(raw: &str) -> PushDecoded {
    let payload = PushPayload::parse(raw);
    let click_target = payload.click_target().to_string();
    PushDecoded {
        payload,
        click_target,
    }
}

// === Config ===

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub config_path: String,
    pub state_path: String,
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigView {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("config: {}\nstate:  {}\n", self.config_path, self.state_path);
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "  {:<18} {} ({})",
                entry.key,
                entry.value.as_deref().unwrap_or("-"),
                entry.source.as_deref().unwrap_or("unset")
            );
        }
        out.trim_end().to_string()
    }
}

fn entry(key: &str, value: Option<String>, source: Option<&ValueSource>) -> ConfigEntry {
    ConfigEntry {
        key: key.to_string(),
        value,
        source: source.map(ToString::to_string),
    }
}

pub fn config_show(files: &ConfigFiles, settings: &ResolvedSettings) -> ConfigView {
    let columns: Vec<String> = settings.frozen_columns.value.iter().map(|w| w.to_string()).collect();
    let entries = vec![
        entry(
            "backend",
            Some(settings.backend.value.to_string()),
            Some(&settings.backend.source),
        ),
        entry(
            "remote-url",
            settings.remote_url.as_ref().map(|r| r.value.clone()),
            settings.remote_url.as_ref().map(|r| &r.source),
        ),
        entry(
            "api-key",
            settings.api_key.as_ref().map(|r| mask_secret(&r.value)),
            settings.api_key.as_ref().map(|r| &r.source),
        ),
        entry(
            "signed-url-ttl",
            Some(settings.signed_url_ttl.value.to_string()),
            Some(&settings.signed_url_ttl.source),
        ),
        entry(
            "refresh-interval",
            Some(settings.lease_options().refresh_interval().as_secs().to_string()),
            Some(
                settings
                    .refresh_interval
                    .as_ref()
                    .map(|r| &r.source)
                    .unwrap_or(&ValueSource::Default),
            ),
        ),
        entry(
            "retry-delay-ms",
            Some(settings.retry_delay_ms.value.to_string()),
            Some(&settings.retry_delay_ms.source),
        ),
        entry(
            "month-width",
            Some(settings.month_width.value.to_string()),
            Some(&settings.month_width.source),
        ),
        entry(
            "frozen-columns",
            Some(columns.join(" ")),
            Some(&settings.frozen_columns.source),
        ),
        entry(
            "output-format",
            Some(settings.output_format.value.to_string()),
            Some(&settings.output_format.source),
        ),
    ];
    ConfigView {
        config_path: files.config_path().display().to_string(),
        state_path: files.state_path().display().to_string(),
        entries,
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigUpdated {
    pub key: String,
    pub file: String,
    pub unset: bool,
}

impl Output for ConfigUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.unset {
            format!("Unset {} in {}", self.key, self.file)
        } else {
            format!("Set {} in {}", self.key, self.file)
        }
    }
}

/// Set a key in state.kdl (secrets) or config.kdl (everything else).
pub fn config_set(files: &ConfigFiles, key: &str, value: &str) -> Result<ConfigUpdated> {
    let path = if STATE_KEYS.contains(&key) {
        let mut state = files.read_state()?;
        state.set(key, value).map_err(Error::InvalidInput)?;
        files.write_state(&state)?;
        files.state_path()
    } else {
        let mut config = files.read_config()?;
        config.set(key, value).map_err(Error::InvalidInput)?;
        files.write_config(&config)?;
        files.config_path()
    };
    Ok(ConfigUpdated {
        key: key.to_string(),
        file: path.display().to_string(),
        unset: value.trim().is_empty(),
    })
}

// === Backend commands ===

#[derive(Debug, Serialize)]
pub struct OverrideList {
    pub count: usize,
    pub overrides: Vec<MatrixOverride>,
}

impl Output for OverrideList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.overrides.is_empty() {
            return "No overrides.".to_string();
        }
        let mut out = format!("{} override(s):\n", self.count);
        for o in &self.overrides {
            let _ = writeln!(out, "  {}  {:<12} {:>14}", o.month, o.concept, money(o.value));
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct OverrideSaved {
    #[serde(rename = "override")]
    pub saved: MatrixOverride,
}

impl Output for OverrideSaved {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Set {} / {} to {}",
            self.saved.month,
            self.saved.concept,
            money(self.saved.value)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub kind: &'static str,
    pub id: String,
    pub removed: bool,
}

impl Output for Removed {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.removed {
            format!("Removed {} {}", self.kind, self.id)
        } else {
            format!("No {} {}", self.kind, self.id)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReflineList {
    pub count: usize,
    pub lines: Vec<ReferenceLine>,
    pub markers: Vec<Marker>,
}

impl Output for ReflineList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.lines.is_empty() {
            return "No reference lines.".to_string();
        }
        let mut out = format!("{} reference line(s):\n", self.count);
        for marker in &self.markers {
            let Some(line) = self.lines.iter().find(|l| l.id == marker.id) else {
                continue;
            };
            let x = if marker.placed {
                format!("x={}", marker.x)
            } else {
                "off-grid".to_string()
            };
            let _ = writeln!(out, "  {}  {:<6} {:<10} {}  {}", line.id, line.position(), x, line.color, line.label);
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ReflineSaved {
    pub line: ReferenceLine,
}

impl Output for ReflineSaved {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Reference line {} at {} ({})",
            self.line.id,
            self.line.position(),
            self.line.label
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityList {
    pub count: usize,
    pub activities: Vec<GanttActivity>,
}

impl Output for ActivityList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.activities.is_empty() {
            return "No activities.".to_string();
        }
        let mut out = format!("{} activit(ies):\n", self.count);
        for a in &self.activities {
            let _ = writeln!(
                out,
                "  {:<8} {:<24} {} -> {}  {:>14}",
                a.mayor_id,
                a.label,
                a.start(),
                a.end(),
                money(a.amount)
            );
        }
        out.trim_end().to_string()
    }
}

/// One budget line as written in a `budget set` file.
#[derive(Debug, Deserialize)]
struct BudgetLineInput {
    mayor_id: String,
    #[serde(default)]
    label: String,
    amount: AmountInput,
    /// MONTH/WEEK
    start: String,
    /// MONTH/WEEK
    end: String,
    #[serde(default)]
    order: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountInput {
    Number(f64),
    Text(String),
}

impl BudgetLineInput {
    fn into_line(self, client_id: &str, project_id: &str) -> Result<ParametricLine> {
        let amount = match self.amount {
            AmountInput::Number(n) => parse_amount(&n.to_string())?,
            AmountInput::Text(s) => parse_amount(&s)?,
        };
        let start = MonthWeek::parse(&self.start)?;
        let end = MonthWeek::parse(&self.end)?;
        let label = if self.label.is_empty() {
            self.mayor_id.clone()
        } else {
            self.label
        };
        Ok(ParametricLine {
            client_id: client_id.to_string(),
            project_id: project_id.to_string(),
            mayor_id: self.mayor_id,
            label,
            amount,
            start_month: start.month,
            start_week: start.week,
            end_month: end.month,
            end_week: end.week,
            order: self.order,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetUpdated {
    pub lines: usize,
    pub activities: usize,
}

impl Output for BudgetUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Saved {} budget line(s); schedule has {} activit(ies)",
            self.lines, self.activities
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetLines {
    pub count: usize,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_total: Option<f64>,
    pub lines: Vec<ParametricLine>,
}

impl Output for BudgetLines {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.lines.is_empty() {
            return "No budget lines.".to_string();
        }
        let mut out = String::new();
        for l in &self.lines {
            let _ = writeln!(
                out,
                "  {:<8} {:<24} {} -> {}  {:>14}",
                l.mayor_id,
                l.label,
                l.start(),
                l.end(),
                money(l.amount)
            );
        }
        let _ = write!(out, "  total {:>49}", money(self.total));
        if let (Some(discount), Some(net)) = (self.discount, self.net_total) {
            let _ = write!(out, "\n  discount {:>46}\n  net {:>51}", money(discount), money(net));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct Synced {
    #[serde(flatten)]
    pub summary: SyncSummary,
}

impl Output for Synced {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Synchronized {} activit(ies), removed {}",
            self.summary.activities, self.summary.removed
        )
    }
}

#[derive(Debug, Serialize)]
pub struct MatrixView {
    pub months: Vec<String>,
    pub concepts: Vec<String>,
    pub cells: Vec<MatrixCell>,
}

impl Output for MatrixView {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.cells.is_empty() {
            return "Matrix is empty.".to_string();
        }
        let mut out = format!("{:<12}", "concept");
        for month in &self.months {
            let _ = write!(out, " {:>12}", month);
        }
        for concept in &self.concepts {
            let _ = write!(out, "\n{:<12}", concept);
            for month in &self.months {
                match self.cells.iter().find(|c| &c.concept == concept && &c.month == month) {
                    Some(cell) => {
                        let mark = if cell.source == CellSource::Override { "*" } else { "" };
                        let _ = write!(out, " {:>12}", format!("{}{}", mark, money(cell.value)));
                    }
                    None => {
                        let _ = write!(out, " {:>12}", "-");
                    }
                }
            }
        }
        out.push_str("\n(* manual override)");
        out
    }
}

#[derive(Debug, Serialize)]
pub struct Signed {
    pub bucket: String,
    pub path: String,
    pub url: String,
    pub ttl_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

impl Output for Signed {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{}\n(expires {}, refresh every {}s)",
            self.url,
            self.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.refresh_interval_seconds
        )
    }
}

/// Backend-bound command context.
pub struct App<B: Backend + UrlSigner> {
    backend: Arc<B>,
    cache: Arc<crate::store::QueryCache>,
    notifier: Arc<NotificationCenter>,
    settings: ResolvedSettings,
}

impl<B: Backend + UrlSigner> App<B> {
    pub fn new(backend: Arc<B>, settings: ResolvedSettings, notifier: Arc<NotificationCenter>) -> Self {
        Self {
            backend,
            cache: Arc::new(crate::store::QueryCache::new()),
            notifier,
            settings,
        }
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    fn overrides(&self) -> OverrideStore<B> {
        OverrideStore::new(self.backend.clone(), self.cache.clone(), self.notifier())
    }

    fn reference_lines(&self) -> ReferenceLineStore<B> {
        ReferenceLineStore::new(self.backend.clone(), self.cache.clone(), self.notifier())
    }

    fn activities(&self) -> ActivityStore<B> {
        ActivityStore::new(self.backend.clone(), self.cache.clone(), self.notifier())
    }

    pub async fn override_list(&self, client_id: &str, project_id: &str) -> Result<OverrideList> {
        let overrides = self.overrides().list(client_id, project_id).await?;
        Ok(OverrideList {
            count: overrides.len(),
            overrides,
        })
    }

    pub async fn override_set(
        &self,
        client_id: &str,
        project_id: &str,
        month: &str,
        concept: &str,
        value: &str,
    ) -> Result<OverrideSaved> {
        let value = parse_amount(value)?;
        let saved = self
            .overrides()
            .upsert(MatrixOverride::new(client_id, project_id, month, concept, value))
            .await?;
        Ok(OverrideSaved { saved })
    }

    pub async fn override_rm(&self, client_id: &str, project_id: &str, month: &str, concept: &str) -> Result<Removed> {
        let removed = self.overrides().delete(client_id, project_id, month, concept).await?;
        Ok(Removed {
            kind: "override",
            id: format!("{}/{}", month, concept),
            removed,
        })
    }

    pub async fn refline_list(&self, plan_id: &str, start: Option<&str>, months: u32) -> Result<ReflineList> {
        if months == 0 || months > MAX_MONTH {
            return Err(Error::InvalidInput(format!(
                "months must be between 1 and {}, got {}",
                MAX_MONTH, months
            )));
        }
        let start = match start {
            Some(s) => parse_date(s)?,
            None => first_of_this_month()?,
        };
        let lines = self.reference_lines().list(plan_id).await?;
        let layout = TimelineLayout::from_config(&self.settings.layout_config(), &month_columns(start, months));
        Ok(ReflineList {
            count: lines.len(),
            markers: markers(&layout, &lines),
            lines,
        })
    }

    pub async fn refline_add(&self, plan_id: &str, at: &str, label: &str, color: Option<String>) -> Result<ReflineSaved> {
        let line = self
            .reference_lines()
            .create(ReferenceLineDraft {
                plan_id: plan_id.to_string(),
                position: raw_position(at)?,
                label: label.to_string(),
                color: color.unwrap_or_else(|| DEFAULT_REFERENCE_COLOR.to_string()),
            })
            .await?;
        Ok(ReflineSaved { line })
    }

    pub async fn refline_update(
        &self,
        id: &str,
        at: Option<&str>,
        label: Option<String>,
        color: Option<String>,
    ) -> Result<ReflineSaved> {
        let patch = ReferenceLinePatch {
            position: at.map(raw_position).transpose()?,
            label,
            color,
        };
        let line = self.reference_lines().update(id, patch).await?;
        Ok(ReflineSaved { line })
    }

    pub async fn refline_rm(&self, id: &str) -> Result<Removed> {
        let removed = self.reference_lines().delete(id).await?;
        Ok(Removed {
            kind: "reference line",
            id: id.to_string(),
            removed,
        })
    }

    pub async fn activity_list(&self, client_id: &str, project_id: &str) -> Result<ActivityList> {
        let activities = self.activities().list(client_id, project_id).await?;
        Ok(ActivityList {
            count: activities.len(),
            activities,
        })
    }

    /// Replace the budget, announce the change and wait for the listener to
    /// resync the schedule.
    pub async fn budget_set(&self, client_id: &str, project_id: &str, file: &Path) -> Result<BudgetUpdated> {
        let text = std::fs::read_to_string(file)?;
        let inputs: Vec<BudgetLineInput> = serde_json::from_str(&text)?;
        let lines = inputs
            .into_iter()
            .map(|input| input.into_line(client_id, project_id))
            .collect::<Result<Vec<_>>>()?;

        let bus = BudgetBus::default();
        let sync = ParametricSync::spawn(
            &bus,
            self.backend.clone(),
            self.cache.clone(),
            self.notifier(),
            client_id,
            project_id,
        );
        let mut done = sync.completions();

        let saved = self.activities().replace_parametric(client_id, project_id, &lines).await?;
        let errors_before = self.error_count();
        bus.publish(BudgetChanged::new(client_id, project_id));

        match tokio::time::timeout(SYNC_WAIT, done.wait_for(|n| *n >= 1)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(Error::Other("schedule sync listener stopped".to_string())),
            Err(_) => return Err(Error::Other("timed out waiting for schedule sync".to_string())),
        }
        sync.stop();

        if let Some(message) = self.errors_since(errors_before) {
            return Err(Error::Other(message));
        }
        let activities = self.activities().list(client_id, project_id).await?.len();
        Ok(BudgetUpdated {
            lines: saved,
            activities,
        })
    }

    fn error_count(&self) -> usize {
        self.notifier
            .history()
            .iter()
            .filter(|e| e.level == NotificationLevel::Error)
            .count()
    }

    /// Newest error message reported after `before` errors had been seen.
    fn errors_since(&self, before: usize) -> Option<String> {
        let errors: Vec<String> = self
            .notifier
            .history()
            .into_iter()
            .filter(|e| e.level == NotificationLevel::Error)
            .map(|e| e.message)
            .collect();
        if errors.len() > before {
            errors.into_iter().next()
        } else {
            None
        }
    }

    pub async fn budget_show(
        &self,
        client_id: &str,
        project_id: &str,
        discount: Option<&str>,
    ) -> Result<BudgetLines> {
        let discount = discount.map(parse_amount).transpose()?;
        let lines = self.activities().parametric_lines(client_id, project_id).await?;
        let total: f64 = lines.iter().map(|l| l.amount).sum();
        let net_total = discount.map(|d| apply_discount(total, d)).transpose()?;
        Ok(BudgetLines {
            count: lines.len(),
            total,
            discount,
            net_total,
            lines,
        })
    }

    pub async fn budget_sync(&self, client_id: &str, project_id: &str) -> Result<Synced> {
        let summary = self.activities().sync(client_id, project_id).await?;
        Ok(Synced { summary })
    }

    pub async fn matrix_show(&self, client_id: &str, project_id: &str, start: &str) -> Result<MatrixView> {
        let start = parse_date(start)?;
        let activity_store = self.activities();
        let override_store = self.overrides();
        let (activities, overrides) = futures::future::try_join(
            activity_store.list(client_id, project_id),
            override_store.list(client_id, project_id),
        )
        .await?;
        let matrix = reconcile(&monthly_totals(&activities, start), &overrides);

        let months: BTreeSet<String> = matrix.cells.iter().map(|c| c.month.clone()).collect();
        let mut concepts: Vec<String> = Vec::new();
        for cell in &matrix.cells {
            if !concepts.contains(&cell.concept) {
                concepts.push(cell.concept.clone());
            }
        }
        Ok(MatrixView {
            months: months.into_iter().collect(),
            concepts,
            cells: matrix.cells,
        })
    }

    pub async fn sign(&self, bucket: &str, path: &str, ttl: Option<u64>) -> Result<Signed> {
        let options = self.settings.lease_options();
        let ttl_seconds = check_ttl(ttl.unwrap_or(options.ttl_seconds))?;
        let result = sign_with_retry(self.backend.as_ref(), bucket, path, ttl_seconds, options.retry_delay).await;
        let url = match result {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(bucket, path, error = %e, "failed to sign document URL");
                self.notifier.error(&format!("Failed to open document: {}", e.user_message()));
                return Err(e);
            }
        };
        Ok(Signed {
            bucket: bucket.to_string(),
            path: path.to_string(),
            url,
            ttl_seconds,
            refresh_interval_seconds: refresh_interval_secs(ttl_seconds, options.refresh_interval_seconds),
            expires_at: expiry_after(Utc::now(), ttl_seconds)?,
        })
    }
}
