use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use reporting_client::domain::{
    ComponentKind, ComponentTable, MasterTable, MicrogridDescriptor, QueryKey,
};
use serde::{Serialize, Serializer};

use crate::{
    error::ReportError,
    filters::{AppliedFilters, PageQuery},
    service::ReportService,
    session::SessionContext,
    summary::EnergySummary,
};

/// Navigable pages. Adding a page means adding a variant; the compiler
/// then points at every place that needs to know about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    Reporting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavEntry {
    pub key: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub order: u32,
}

impl Page {
    pub const ALL: [Page; 2] = [Page::Home, Page::Reporting];

    pub fn key(self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Reporting => "reporting_dashboard",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Reporting => "Reporting",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Page::Home => "🏠",
            Page::Reporting => "📈",
        }
    }

    pub fn order(self) -> u32 {
        match self {
            Page::Home => 0,
            Page::Reporting => 1,
        }
    }

    /// Pages sorted by `(order, lowercase title)`.
    pub fn sorted() -> Vec<Page> {
        let mut pages = Page::ALL.to_vec();
        pages.sort_by_key(|p| (p.order(), p.title().to_lowercase()));
        pages
    }

    pub fn navigation() -> Vec<NavEntry> {
        Page::sorted()
            .into_iter()
            .map(|p| NavEntry {
                key: p.key(),
                title: p.title(),
                icon: p.icon(),
                order: p.order(),
            })
            .collect()
    }

    pub fn from_key(key: &str) -> Option<Page> {
        Page::ALL.into_iter().find(|p| p.key() == key)
    }

    /// Strict lookup for callers that name a page explicitly.
    pub fn parse(key: &str) -> Result<Page, ReportError> {
        Page::from_key(key).ok_or_else(|| ReportError::UnknownPage(key.to_string()))
    }

    /// Page for `key`; unknown or missing keys fall back to the first page.
    pub fn resolve(key: Option<&str>) -> Page {
        key.and_then(Page::from_key)
            .unwrap_or_else(|| Page::sorted().first().copied().unwrap_or(Page::Home))
    }

    pub async fn render(
        self,
        session: &SessionContext,
        service: &ReportService,
        query: &PageQuery,
    ) -> Result<PageOutput, ReportError> {
        self.render_at(session, service, query, Utc::now()).await
    }

    /// Render with an explicit clock; `now` decides the default dates.
    pub async fn render_at(
        self,
        session: &SessionContext,
        service: &ReportService,
        query: &PageQuery,
        now: DateTime<Utc>,
    ) -> Result<PageOutput, ReportError> {
        match self {
            Page::Home => Ok(PageOutput::Home(HomeView::new(service))),
            Page::Reporting => render_reporting(session, service, query, now)
                .await
                .map(PageOutput::Reporting),
        }
    }
}

/// Microgrid listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicrogridInfo {
    pub id: u64,
    pub name: String,
    pub timezone: String,
    pub component_kinds: Vec<ComponentKind>,
}

impl From<&MicrogridDescriptor> for MicrogridInfo {
    fn from(d: &MicrogridDescriptor) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            timezone: d.timezone.name().to_string(),
            component_kinds: d.component_kinds(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum PageOutput {
    Home(HomeView),
    Reporting(ReportingView),
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeView {
    pub title: &'static str,
    pub tagline: &'static str,
    pub intro: &'static str,
    pub navigation: Vec<NavEntry>,
    pub microgrids: Vec<MicrogridInfo>,
}

impl HomeView {
    fn new(service: &ReportService) -> Self {
        Self {
            title: "Microgrid Reporting",
            tagline: "Operational intelligence at a glance.",
            intro: "Pick a microgrid, a date range and a resolution on the reporting \
                    page to see production, consumption and the energy mix.",
            navigation: Page::navigation(),
            microgrids: service.microgrids().iter().map(MicrogridInfo::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    NoData,
    Stale,
}

fn serialize_table<S: Serializer>(
    table: &Option<Arc<MasterTable>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    table.as_deref().serialize(serializer)
}

/// Identity of the data in a view: which microgrid and which local range
/// the table was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShownData {
    pub microgrid_id: u64,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub resolution_seconds: i64,
}

impl ShownData {
    fn new(key: &QueryKey, tz: Tz) -> Self {
        Self {
            microgrid_id: key.microgrid_id,
            start: key.start.with_timezone(&tz).fixed_offset(),
            end: key.end.with_timezone(&tz).fixed_offset(),
            resolution_seconds: key.resolution.num_seconds(),
        }
    }
}

/// Reporting page state. `filters` is the selection that was asked for;
/// `microgrid` and `shown` describe the data actually in `table`, which
/// differ from `filters` only when an earlier result is shown as stale.
#[derive(Debug, Clone, Serialize)]
pub struct ReportingView {
    pub filters: AppliedFilters,
    pub microgrid: MicrogridInfo,
    pub shown: Option<ShownData>,
    pub status: ReportStatus,
    /// Set when the shown data is an earlier result kept after a failure.
    pub stale: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub summary: Option<EnergySummary>,
    #[serde(serialize_with = "serialize_table")]
    pub table: Option<Arc<MasterTable>>,
    pub components: Vec<ComponentTable>,
}

impl ReportingView {
    fn with_table(
        filters: AppliedFilters,
        microgrid: &MicrogridDescriptor,
        key: &QueryKey,
        table: Arc<MasterTable>,
    ) -> Self {
        let shown = Some(ShownData::new(key, microgrid.timezone));
        let microgrid = MicrogridInfo::from(microgrid);
        if !table.has_data() {
            return Self {
                filters,
                microgrid,
                shown,
                status: ReportStatus::NoData,
                stale: false,
                error: None,
                notice: Some("No data for the selected filters.".to_string()),
                summary: None,
                table: None,
                components: Vec::new(),
            };
        }

        let components = ComponentKind::ALL
            .into_iter()
            .map(|kind| table.component_view(kind))
            .filter(ComponentTable::has_data)
            .collect();

        Self {
            filters,
            microgrid,
            shown,
            status: ReportStatus::Ok,
            stale: false,
            error: None,
            notice: None,
            summary: Some(EnergySummary::from_table(&table)),
            table: Some(table),
            components,
        }
    }

    fn stale(mut self, error: &ReportError) -> Self {
        self.status = ReportStatus::Stale;
        self.stale = true;
        self.error = Some(error.to_string());
        self
    }
}

async fn render_reporting(
    session: &SessionContext,
    service: &ReportService,
    query: &PageQuery,
    now: DateTime<Utc>,
) -> Result<ReportingView, ReportError> {
    let filters = query.resolve(service.microgrids(), now)?;
    let (start, end) = filters.fetch_range()?;
    let microgrids = service.microgrids();
    let microgrid = microgrids
        .get(filters.microgrid_id)
        .ok_or(ReportError::UnknownMicrogrid(filters.microgrid_id))?;
    let (key, _) = service.query_key(filters.microgrid_id, start, end, filters.resolution)?;

    match service.report_in(session, key.microgrid_id, key.start, key.end, key.resolution).await {
        Ok(table) => Ok(ReportingView::with_table(filters, microgrid, &key, table)),
        Err(e @ (ReportError::Auth(_) | ReportError::Upstream { .. })) => {
            let previous = session.last_good();
            let Some((previous, shown_microgrid)) = previous
                .and_then(|p| microgrids.get(p.key.microgrid_id).map(|m| (p, m)))
            else {
                return Err(e);
            };
            tracing::warn!(
                session = %session.id(),
                error = %e,
                shown_microgrid = previous.key.microgrid_id,
                shown_start = %previous.key.start,
                "report failed, keeping previous result"
            );
            Ok(ReportingView::with_table(
                filters,
                shown_microgrid,
                &previous.key,
                previous.payload,
            )
            .stale(&e))
        }
        Err(e) => Err(e),
    }
}
